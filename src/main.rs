use tracing::error;

#[tokio::main]
async fn main() {
    if let Err(error) = shop_payments::run().await {
        error!("Payment backend exited with error: {}", error);
        std::process::exit(1);
    }
}
