// Stripe provider module

pub mod account;
pub mod checkout;
pub mod customers;
pub mod errors;
pub mod payment_methods;
pub mod redirect;
pub mod rest;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;

use crate::settings::{Config, ShopSettings};
use self::customers::CustomerStore;
use self::errors::StripeApiError;
use self::session::SessionStore;
use self::types::{
    Charge, ChargeIntent, ChargeIntentRequest, CreateChargeRequest, CreateCustomerRequest,
    Customer, PaymentIntent, PaymentIntentRequest, PaymentMethod, Source, SourceRequest,
};

/// Gateway client adapter. Every call is a single attempt; errors are returned, never retried.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_source(&self, request: &SourceRequest) -> Result<Source, StripeApiError>;

    async fn retrieve_source(&self, source_id: &str) -> Result<Source, StripeApiError>;

    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, StripeApiError>;

    async fn retrieve_payment_intent(&self, intent_id: &str)
        -> Result<PaymentIntent, StripeApiError>;

    async fn create_charge(&self, request: &CreateChargeRequest) -> Result<Charge, StripeApiError>;

    async fn retrieve_payment_method(
        &self,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, StripeApiError>;

    /// Irreversibly removes the payment method from its customer.
    async fn detach_payment_method(
        &self,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, StripeApiError>;

    async fn list_payment_methods(
        &self,
        customer_id: &str,
    ) -> Result<Vec<PaymentMethod>, StripeApiError>;

    async fn create_customer(
        &self,
        request: &CreateCustomerRequest,
    ) -> Result<Customer, StripeApiError>;
}

/// Sends a built charge-intent request through the matching gateway endpoint.
pub async fn submit_charge_intent(
    gateway: &dyn PaymentGateway,
    request: &ChargeIntentRequest,
) -> Result<ChargeIntent, StripeApiError> {
    match request {
        ChargeIntentRequest::Source(req) => gateway.create_source(req).await.map(ChargeIntent::Source),
        ChargeIntentRequest::PaymentIntent(req) => gateway
            .create_payment_intent(req)
            .await
            .map(ChargeIntent::PaymentIntent),
    }
}

#[derive(Clone)]
pub struct StripeProvider {
    pub(crate) gateway: Arc<dyn PaymentGateway>,
    pub(crate) shop: Arc<ShopSettings>,
    pub(crate) sessions: Arc<SessionStore>,
    pub(crate) customers: Arc<CustomerStore>,
}

impl StripeProvider {
    // Build reqwest client with rustls and timeout from cfg, open the customer store.
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let timeout_ms = if cfg.stripe.timeout_ms > 0 {
            cfg.stripe.timeout_ms
        } else {
            15_000
        };
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| StripeApiError::Http(e.to_string()))?;

        let stripe = &cfg.stripe;
        let rest = self::rest::StripeRestClient::new(http, stripe.api_key.clone())
            .with_account(if stripe.account_id.is_empty() { None } else { Some(stripe.account_id.clone()) })
            .with_version(if stripe.stripe_version.is_empty() { None } else { Some(stripe.stripe_version.clone()) });

        let sessions = SessionStore::new().with_ttl(cfg.session_ttl);
        let customers = CustomerStore::open(&cfg.customer_store_path)?;
        Ok(Self::with_gateway(Arc::new(rest), cfg.shop.clone(), sessions, customers))
    }

    pub fn with_gateway(
        gateway: Arc<dyn PaymentGateway>,
        shop: ShopSettings,
        sessions: SessionStore,
        customers: CustomerStore,
    ) -> Self {
        Self {
            gateway,
            shop: Arc::new(shop),
            sessions: Arc::new(sessions),
            customers: Arc::new(customers),
        }
    }

    pub fn gateway(&self) -> &dyn PaymentGateway {
        self.gateway.as_ref()
    }

    pub fn shop(&self) -> &ShopSettings {
        &self.shop
    }

    pub fn sessions(&self) -> Arc<SessionStore> {
        Arc::clone(&self.sessions)
    }

    pub fn customers(&self) -> &CustomerStore {
        &self.customers
    }
}
