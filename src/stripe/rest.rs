// Stripe REST client
// Form-encoded requests, one attempt per call; callers decide on retries.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{info, instrument, warn};

use crate::stripe::errors::{StripeApiError, StripeErrorEnvelope};
use crate::stripe::types::{
    is_gateway_id, Charge, CreateChargeRequest, CreateCustomerRequest, Customer, List,
    PaymentIntent, PaymentIntentRequest, PaymentMethod, Source, SourceRequest,
};
use crate::stripe::PaymentGateway;

const STRIPE_API_BASE: &str = "https://api.stripe.com";
const LIST_PAGE_LIMIT: &str = "100";

#[derive(Clone)]
pub struct StripeRestClient {
    pub(crate) http: Client,
    pub(crate) api_key: String,
    pub(crate) account_id: Option<String>,
    pub(crate) stripe_version: Option<String>,
    pub(crate) base_url: String,
}

impl StripeRestClient {
    pub fn new(http: Client, api_key: String) -> Self {
        Self {
            http,
            api_key,
            account_id: None,
            stripe_version: None,
            base_url: STRIPE_API_BASE.to_string(),
        }
    }

    pub fn with_account(mut self, acct: impl Into<Option<String>>) -> Self {
        self.account_id = acct.into();
        self
    }

    pub fn with_version(mut self, ver: impl Into<Option<String>>) -> Self {
        self.stripe_version = ver.into();
        self
    }

    fn apply_common_headers(&self, req: reqwest::RequestBuilder, idempotency_key: Option<&str>) -> reqwest::RequestBuilder {
        let mut req = req.bearer_auth(&self.api_key);
        if let Some(k) = idempotency_key {
            req = req.header("Idempotency-Key", k);
        }
        if let Some(v) = &self.stripe_version {
            if !v.is_empty() {
                req = req.header("Stripe-Version", v);
            }
        }
        if let Some(acct) = &self.account_id {
            if !acct.is_empty() {
                req = req.header("Stripe-Account", acct);
            }
        }
        req
    }

    fn map_error(status: StatusCode, body: &str) -> StripeApiError {
        if let Ok(env) = serde_json::from_str::<StripeErrorEnvelope>(body) {
            env.to_api_error_with_status(Some(status.as_u16()))
        } else if status == StatusCode::NOT_FOUND {
            StripeApiError::NotFound(body.to_string())
        } else {
            StripeApiError::Http(format!("status={} body={}", status.as_u16(), body))
        }
    }

    /// API URL from path segments. Each segment is percent-encoded on its own,
    /// so an id can never add segments or a query.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, StripeApiError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| StripeApiError::Http(format!("invalid base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| StripeApiError::Http("base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        idempotency_key: Option<&str>,
        desc: &str,
    ) -> Result<T, StripeApiError> {
        let req = self.apply_common_headers(req, idempotency_key);
        let resp = req.send().await.map_err(|e| {
            warn!(target: "stripe", desc = %desc, error = %e, "stripe transport error");
            StripeApiError::Http(e.to_string())
        })?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| StripeApiError::Decode(e.to_string()))?;
        if status.is_success() {
            serde_json::from_str::<T>(&text).map_err(|e| StripeApiError::Decode(e.to_string()))
        } else {
            let err = Self::map_error(status, &text);
            warn!(target: "stripe", desc = %desc, http_status = status.as_u16(), error = %err, "stripe request failed");
            Err(err)
        }
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        form: &[(String, String)],
        idempotency_key: Option<&str>,
        desc: &str,
    ) -> Result<T, StripeApiError> {
        let url = self.endpoint(segments)?;
        self.send(self.http.post(url).form(form), idempotency_key, desc).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
        desc: &str,
    ) -> Result<T, StripeApiError> {
        let url = self.endpoint(segments)?;
        self.send(self.http.get(url).query(query), None, desc).await
    }
}

/// Rejects ids from outside the service that could not name a gateway object.
fn checked_id(id: &str) -> Result<&str, StripeApiError> {
    if is_gateway_id(id) {
        Ok(id)
    } else {
        warn!(target: "stripe", id = %id, "Rejected malformed gateway id");
        Err(StripeApiError::NotFound(format!("malformed id {id:?}")))
    }
}

#[async_trait]
impl PaymentGateway for StripeRestClient {
    // POST /v1/sources
    #[instrument(skip(self, request), fields(method = "POST", path = "/v1/sources"))]
    async fn create_source(&self, request: &SourceRequest) -> Result<Source, StripeApiError> {
        info!(
            target: "stripe",
            method = "POST",
            path = "/v1/sources",
            source_type = %request.type_,
            amount_cents = request.amount,
            currency = %request.currency,
            "stripe request"
        );
        self.post_form(&["v1", "sources"], &request.to_form(), None, "create_source")
            .await
    }

    // GET /v1/sources/{id}
    #[instrument(skip(self), fields(method = "GET", path = "/v1/sources/{id}", source_id = %source_id))]
    async fn retrieve_source(&self, source_id: &str) -> Result<Source, StripeApiError> {
        info!(target: "stripe", method = "GET", path = "/v1/sources/{id}", source_id = %source_id, "stripe request");
        let source_id = checked_id(source_id)?;
        self.get_json(&["v1", "sources", source_id], &[], "retrieve_source")
            .await
    }

    // POST /v1/payment_intents
    #[instrument(skip(self, request), fields(method = "POST", path = "/v1/payment_intents"))]
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, StripeApiError> {
        info!(
            target: "stripe",
            method = "POST",
            path = "/v1/payment_intents",
            amount_cents = request.amount,
            currency = %request.currency,
            moto = request.moto,
            save_payment_method = request.save_payment_method,
            "stripe request"
        );
        self.post_form(
            &["v1", "payment_intents"],
            &request.to_form(),
            None,
            "create_payment_intent",
        )
        .await
    }

    // GET /v1/payment_intents/{id}
    #[instrument(skip(self), fields(method = "GET", path = "/v1/payment_intents/{id}", intent_id = %intent_id))]
    async fn retrieve_payment_intent(
        &self,
        intent_id: &str,
    ) -> Result<PaymentIntent, StripeApiError> {
        info!(target: "stripe", method = "GET", path = "/v1/payment_intents/{id}", intent_id = %intent_id, "stripe request");
        let intent_id = checked_id(intent_id)?;
        self.get_json(
            &["v1", "payment_intents", intent_id],
            &[],
            "retrieve_payment_intent",
        )
        .await
    }

    // POST /v1/charges
    #[instrument(skip(self, request), fields(method = "POST", path = "/v1/charges"))]
    async fn create_charge(&self, request: &CreateChargeRequest) -> Result<Charge, StripeApiError> {
        info!(
            target: "stripe",
            method = "POST",
            path = "/v1/charges",
            amount_cents = request.amount,
            currency = %request.currency,
            source_id = %request.source,
            "stripe request"
        );
        // One charge per source, even if the customer's return is replayed
        let idempotency_key = format!("charge_{}", request.source);
        self.post_form(
            &["v1", "charges"],
            &request.to_form(),
            Some(&idempotency_key),
            "create_charge",
        )
        .await
    }

    // GET /v1/payment_methods/{id}
    #[instrument(skip(self), fields(method = "GET", path = "/v1/payment_methods/{id}", payment_method_id = %payment_method_id))]
    async fn retrieve_payment_method(
        &self,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, StripeApiError> {
        info!(target: "stripe", method = "GET", path = "/v1/payment_methods/{id}", payment_method_id = %payment_method_id, "stripe request");
        let payment_method_id = checked_id(payment_method_id)?;
        self.get_json(
            &["v1", "payment_methods", payment_method_id],
            &[],
            "retrieve_payment_method",
        )
        .await
    }

    // POST /v1/payment_methods/{id}/detach
    #[instrument(skip(self), fields(method = "POST", path = "/v1/payment_methods/{id}/detach", payment_method_id = %payment_method_id))]
    async fn detach_payment_method(
        &self,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, StripeApiError> {
        info!(target: "stripe", method = "POST", path = "/v1/payment_methods/{id}/detach", payment_method_id = %payment_method_id, "stripe request");
        let payment_method_id = checked_id(payment_method_id)?;
        self.post_form(
            &["v1", "payment_methods", payment_method_id, "detach"],
            &[],
            None,
            "detach_payment_method",
        )
        .await
    }

    // GET /v1/payment_methods?customer=..&type=card
    #[instrument(skip(self), fields(method = "GET", path = "/v1/payment_methods", customer_id = %customer_id))]
    async fn list_payment_methods(
        &self,
        customer_id: &str,
    ) -> Result<Vec<PaymentMethod>, StripeApiError> {
        info!(target: "stripe", method = "GET", path = "/v1/payment_methods", customer_id = %customer_id, "stripe request");
        let mut cards = Vec::new();
        let mut starting_after: Option<String> = None;
        loop {
            let mut query = vec![("customer", customer_id), ("type", "card"), ("limit", LIST_PAGE_LIMIT)];
            if let Some(last) = starting_after.as_deref() {
                query.push(("starting_after", last));
            }
            let page: List<PaymentMethod> = self
                .get_json(&["v1", "payment_methods"], &query, "list_payment_methods")
                .await?;
            starting_after = page.data.last().map(|pm| pm.id.clone());
            cards.extend(page.data);
            if !page.has_more || starting_after.is_none() {
                break;
            }
        }
        Ok(cards)
    }

    // POST /v1/customers
    #[instrument(skip(self, request), fields(method = "POST", path = "/v1/customers"))]
    async fn create_customer(
        &self,
        request: &CreateCustomerRequest,
    ) -> Result<Customer, StripeApiError> {
        info!(
            target: "stripe",
            method = "POST",
            path = "/v1/customers",
            customer_number = %request.customer_number,
            "stripe request"
        );
        self.post_form(&["v1", "customers"], &request.to_form(), None, "create_customer")
            .await
    }
}
