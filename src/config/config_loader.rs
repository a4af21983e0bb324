use anyhow::Result;

use super::config_model::{Database, DotEnvyConfig, MercadoPago, Payment, Server, Stripe};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let server = Server {
        port: std::env::var("SERVER_PORT")
            .expect("SERVER_PORT is invalid")
            .parse()?,
        body_limit: std::env::var("SERVER_BODY_LIMIT")
            .expect("SERVER_BODY_LIMIT is invalid")
            .parse()?,
        timeout: std::env::var("SERVER_TIMEOUT")
            .expect("SERVER_TIMEOUT is invalid")
            .parse()?,
    };

    let database = Database {
        url: std::env::var("DATABASE_URL").expect("DATABASE_URL is invalid"),
    };

    let payment = Payment {
        statement_descriptor: std::env::var("PAYMENT_STATEMENT_DESCRIPTOR")
            .unwrap_or_else(|_| "Online Shop".to_string()),
    };

    let mercado_pago = MercadoPago {
        access_token: std::env::var("MERCADOPAGO_ACCESS_TOKEN")
            .expect("MERCADOPAGO_ACCESS_TOKEN is invalid"),
        webhook_url: std::env::var("MERCADOPAGO_WEBHOOK_URL")
            .expect("MERCADOPAGO_WEBHOOK_URL is invalid"),
    };

    let stripe = Stripe {
        secret_key: std::env::var("STRIPE_SECRET_KEY").expect("STRIPE_SECRET_KEY is invalid"),
        webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
            .expect("STRIPE_WEBHOOK_SECRET is invalid"),
    };

    Ok(DotEnvyConfig {
        server,
        database,
        payment,
        mercado_pago,
        stripe,
    })
}
