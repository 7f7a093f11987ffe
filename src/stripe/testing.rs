// In-memory gateway and fixtures for unit tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::settings::ShopSettings;
use crate::stripe::errors::{StripeApiError, StripeErrorType};
use crate::stripe::payment_methods::{Actor, CheckoutContext, CustomerProfile};
use crate::stripe::types::{
    CardDetails, Charge, CreateChargeRequest, CreateCustomerRequest, Customer, Metadata,
    NextAction, PaymentIntent, PaymentIntentRequest, PaymentMethod, RedirectToUrl, Source,
    SourceRedirect, SourceRequest, ORDER_REFERENCE_KEY,
};
use crate::stripe::PaymentGateway;

pub(crate) fn shop_settings() -> ShopSettings {
    ShopSettings {
        base_url: Some("https://shop.example/shop".into()),
        shop_name: "Demo Shop".into(),
        statement_descriptor: "Demo Shop Descriptor".into(),
        allow_moto_transactions: false,
        send_stripe_charge_emails: false,
    }
}

pub(crate) fn customer() -> CustomerProfile {
    CustomerProfile {
        first_name: "Jane".into(),
        last_name: "Doe".into(),
        email: "jane.doe@example.com".into(),
        customer_number: "20001".into(),
    }
}

pub(crate) fn checkout_context<'a>(
    shop: &'a ShopSettings,
    customer: &'a CustomerProfile,
) -> CheckoutContext<'a> {
    CheckoutContext {
        shop,
        session_id: "sess_1",
        customer,
        order_reference: "10001",
        actor: Actor::Customer,
    }
}

pub(crate) fn card(id: &str, customer: &str) -> PaymentMethod {
    PaymentMethod {
        id: id.into(),
        type_: "card".into(),
        customer: Some(customer.into()),
        card: Some(CardDetails {
            brand: "visa".into(),
            last4: "4242".into(),
            exp_month: 12,
            exp_year: 2030,
        }),
    }
}

fn unavailable(desc: &str) -> StripeApiError {
    StripeApiError::Stripe {
        type_: StripeErrorType::ApiConnectionError,
        message: Some(format!("{desc} unavailable")),
        code: None,
        param: None,
        status: Some(503),
    }
}

#[derive(Default)]
struct FakeState {
    calls: usize,
    next_id: usize,
    customers_created: usize,
    sources: Vec<SourceRequest>,
    payment_intents: Vec<PaymentIntentRequest>,
    charges: Vec<CreateChargeRequest>,
    detached: Vec<String>,
    payment_methods: Vec<PaymentMethod>,
    stored_sources: HashMap<String, Source>,
    stored_intents: HashMap<String, PaymentIntent>,
    created_intent_status: Option<String>,
    created_intent_redirect: Option<String>,
    charge_status: Option<String>,
    fail_customer_creation: bool,
    fail_listing: bool,
    fail_retrieval: bool,
    fail_detach: bool,
}

/// Records every call; behaviour is configured per test.
#[derive(Default)]
pub(crate) struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub(crate) fn add_payment_method(&self, payment_method: PaymentMethod) {
        self.with_state(|s| s.payment_methods.push(payment_method));
    }

    pub(crate) fn insert_payment_intent(&self, id: &str, status: &str) {
        self.with_state(|s| {
            s.stored_intents.insert(
                id.to_string(),
                PaymentIntent {
                    id: id.to_string(),
                    status: status.to_string(),
                    amount: 1999,
                    currency: "eur".into(),
                    client_secret: None,
                    next_action: None,
                    customer: Some("cus_fake_1".into()),
                    metadata: Metadata::from([(ORDER_REFERENCE_KEY.to_string(), "10001".to_string())]),
                },
            );
        });
    }

    pub(crate) fn insert_source(&self, id: &str, status: &str) {
        self.with_state(|s| {
            s.stored_sources.insert(
                id.to_string(),
                Source {
                    id: id.to_string(),
                    status: status.to_string(),
                    type_: "bancontact".into(),
                    amount: Some(1999),
                    currency: Some("eur".into()),
                    redirect: None,
                    metadata: Metadata::from([(ORDER_REFERENCE_KEY.to_string(), "10001".to_string())]),
                },
            );
        });
    }

    /// Simulates the customer finishing (or abandoning) the bank redirect.
    pub(crate) fn set_source_status(&self, id: &str, status: &str) {
        self.with_state(|s| {
            if let Some(source) = s.stored_sources.get_mut(id) {
                source.status = status.to_string();
            }
        });
    }

    /// Status (and optional 3-D Secure redirect) of payment intents created from now on.
    pub(crate) fn respond_to_intents_with(&self, status: &str, redirect: Option<&str>) {
        self.with_state(|s| {
            s.created_intent_status = Some(status.to_string());
            s.created_intent_redirect = redirect.map(str::to_string);
        });
    }

    pub(crate) fn respond_to_charges_with(&self, status: &str) {
        self.with_state(|s| s.charge_status = Some(status.to_string()));
    }

    pub(crate) fn fail_customer_creation(&self) {
        self.with_state(|s| s.fail_customer_creation = true);
    }

    pub(crate) fn fail_listing(&self) {
        self.with_state(|s| s.fail_listing = true);
    }

    pub(crate) fn fail_retrieval(&self) {
        self.with_state(|s| s.fail_retrieval = true);
    }

    pub(crate) fn fail_detach(&self) {
        self.with_state(|s| s.fail_detach = true);
    }

    pub(crate) fn call_count(&self) -> usize {
        self.with_state(|s| s.calls)
    }

    pub(crate) fn customers_created(&self) -> usize {
        self.with_state(|s| s.customers_created)
    }

    pub(crate) fn created_payment_intents(&self) -> Vec<PaymentIntentRequest> {
        self.with_state(|s| s.payment_intents.clone())
    }

    pub(crate) fn created_sources(&self) -> Vec<SourceRequest> {
        self.with_state(|s| s.sources.clone())
    }

    pub(crate) fn created_charges(&self) -> Vec<CreateChargeRequest> {
        self.with_state(|s| s.charges.clone())
    }

    pub(crate) fn detached(&self) -> Vec<String> {
        self.with_state(|s| s.detached.clone())
    }
}

impl FakeState {
    fn record_call(&mut self) -> usize {
        self.calls += 1;
        self.next_id += 1;
        self.next_id
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_source(&self, request: &SourceRequest) -> Result<Source, StripeApiError> {
        self.with_state(|s| {
            let n = s.record_call();
            s.sources.push(request.clone());
            let id = format!("src_fake_{n}");
            let source = Source {
                id: id.clone(),
                status: "pending".into(),
                type_: request.type_.clone(),
                amount: Some(request.amount),
                currency: Some(request.currency.clone()),
                redirect: Some(SourceRedirect {
                    url: format!("https://stripe.example/redirect/{id}"),
                    return_url: Some(request.return_url.clone()),
                    status: Some("pending".into()),
                }),
                metadata: request.metadata.clone(),
            };
            s.stored_sources.insert(id, source.clone());
            Ok(source)
        })
    }

    async fn retrieve_source(&self, source_id: &str) -> Result<Source, StripeApiError> {
        self.with_state(|s| {
            s.record_call();
            if s.fail_retrieval {
                return Err(unavailable("retrieve_source"));
            }
            s.stored_sources
                .get(source_id)
                .cloned()
                .ok_or_else(|| StripeApiError::NotFound(source_id.to_string()))
        })
    }

    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, StripeApiError> {
        self.with_state(|s| {
            let n = s.record_call();
            s.payment_intents.push(request.clone());
            let id = format!("pi_fake_{n}");
            let intent = PaymentIntent {
                id: id.clone(),
                status: s
                    .created_intent_status
                    .clone()
                    .unwrap_or_else(|| "succeeded".into()),
                amount: request.amount,
                currency: request.currency.clone(),
                client_secret: Some(format!("{id}_secret")),
                next_action: s.created_intent_redirect.as_ref().map(|url| NextAction {
                    type_: "redirect_to_url".into(),
                    redirect_to_url: Some(RedirectToUrl {
                        url: url.clone(),
                        return_url: Some(request.return_url.clone()),
                    }),
                }),
                customer: Some(request.customer.clone()),
                metadata: request.metadata.clone(),
            };
            s.stored_intents.insert(id, intent.clone());
            Ok(intent)
        })
    }

    async fn retrieve_payment_intent(
        &self,
        intent_id: &str,
    ) -> Result<PaymentIntent, StripeApiError> {
        self.with_state(|s| {
            s.record_call();
            if s.fail_retrieval {
                return Err(unavailable("retrieve_payment_intent"));
            }
            s.stored_intents
                .get(intent_id)
                .cloned()
                .ok_or_else(|| StripeApiError::NotFound(intent_id.to_string()))
        })
    }

    async fn create_charge(&self, request: &CreateChargeRequest) -> Result<Charge, StripeApiError> {
        self.with_state(|s| {
            let n = s.record_call();
            s.charges.push(request.clone());
            Ok(Charge {
                id: format!("ch_fake_{n}"),
                status: s.charge_status.clone().unwrap_or_else(|| "succeeded".into()),
                amount: request.amount,
                currency: request.currency.clone(),
                failure_message: None,
            })
        })
    }

    async fn retrieve_payment_method(
        &self,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, StripeApiError> {
        self.with_state(|s| {
            s.record_call();
            s.payment_methods
                .iter()
                .find(|pm| pm.id == payment_method_id)
                .cloned()
                .ok_or_else(|| StripeApiError::NotFound(payment_method_id.to_string()))
        })
    }

    async fn detach_payment_method(
        &self,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, StripeApiError> {
        self.with_state(|s| {
            s.record_call();
            if s.fail_detach {
                return Err(unavailable("detach_payment_method"));
            }
            let pm = s
                .payment_methods
                .iter_mut()
                .find(|pm| pm.id == payment_method_id)
                .ok_or_else(|| StripeApiError::NotFound(payment_method_id.to_string()))?;
            pm.customer = None;
            let detached = pm.clone();
            s.detached.push(payment_method_id.to_string());
            Ok(detached)
        })
    }

    async fn list_payment_methods(
        &self,
        customer_id: &str,
    ) -> Result<Vec<PaymentMethod>, StripeApiError> {
        self.with_state(|s| {
            s.record_call();
            if s.fail_listing {
                return Err(unavailable("list_payment_methods"));
            }
            Ok(s.payment_methods
                .iter()
                .filter(|pm| pm.customer.as_deref() == Some(customer_id))
                .cloned()
                .collect())
        })
    }

    async fn create_customer(
        &self,
        request: &CreateCustomerRequest,
    ) -> Result<Customer, StripeApiError> {
        self.with_state(|s| {
            s.record_call();
            if s.fail_customer_creation {
                return Err(unavailable("create_customer"));
            }
            s.customers_created += 1;
            Ok(Customer {
                id: format!("cus_fake_{}", s.customers_created),
                email: Some(request.email.clone()),
            })
        })
    }
}
