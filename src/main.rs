mod server;
mod settings;
mod stripe;

use crate::stripe::StripeProvider;
use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load configuration from config.toml and environment
    let cfg = settings::Config::from_env();

    // Validate Stripe configuration
    if cfg.stripe.api_key.is_empty() {
        tracing::error!("STRIPE_API_KEY not set; exiting");
        return Ok(());
    }
    if cfg.shop.base_url.is_none() {
        tracing::warn!("SHOP_BASE_URL not set; every checkout will fail with a configuration error");
    }
    tracing::info!(
        allow_moto_transactions = cfg.shop.allow_moto_transactions,
        send_stripe_charge_emails = cfg.shop.send_stripe_charge_emails,
        customer_store = %cfg.customer_store_path.display(),
        "Starting Stripe checkout payment service"
    );

    let provider = StripeProvider::new(&cfg)?;
    server::run_server(cfg.server_port, provider).await
}
