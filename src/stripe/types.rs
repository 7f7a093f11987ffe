// Stripe DTOs for sources, payment intents, charges, customers and payment methods
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::stripe::errors::ValidationErrorCode;

/// Gateway limit for statement descriptors embedded in a charge.
pub const STATEMENT_DESCRIPTOR_MAX_CHARS: usize = 22;

pub type Metadata = BTreeMap<String, String>;

/// Metadata key tying a charge-intent to the shop order.
pub const ORDER_REFERENCE_KEY: &str = "order_reference";

/// Gateway object ids are alphanumeric with underscores (`pm_1Abc`, `src_...`).
pub fn is_gateway_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

// Helper to enforce positive minor units and an ISO-4217 code at the API boundary.
pub fn ensure_charge_amount(
    amount_in_cents: i64,
    currency_code: &str,
) -> Result<(), Vec<ValidationErrorCode>> {
    let mut errors = Vec::new();
    if amount_in_cents <= 0 {
        errors.push(ValidationErrorCode::InvalidAmount);
    }
    if !is_iso_currency_code(currency_code) {
        errors.push(ValidationErrorCode::InvalidCurrency);
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn is_iso_currency_code(currency_code: &str) -> bool {
    currency_code.len() == 3 && currency_code.chars().all(|c| c.is_ascii_alphabetic())
}

/// Truncate on character boundaries so multi-byte descriptors never split a code point.
pub fn truncate_statement_descriptor(descriptor: &str) -> String {
    descriptor
        .chars()
        .take(STATEMENT_DESCRIPTOR_MAX_CHARS)
        .collect()
}

// Request structs matching Stripe API forms

/// One-shot, redirect-based source (e.g. Bancontact).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRequest {
    #[serde(rename = "type")]
    pub type_: String,
    pub amount: i64,
    pub currency: String,
    pub owner_name: String,
    /// Carried in the method-specific sub-object, not in the charge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_descriptor: Option<String>,
    pub return_url: String,
    pub metadata: Metadata,
}

impl SourceRequest {
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form: Vec<(String, String)> = Vec::new();
        form.push(("type".into(), self.type_.clone()));
        form.push(("amount".into(), self.amount.to_string()));
        form.push(("currency".into(), self.currency.to_ascii_lowercase()));
        form.push(("owner[name]".into(), self.owner_name.clone()));
        if let Some(descriptor) = &self.statement_descriptor {
            form.push((
                format!("{}[statement_descriptor]", self.type_),
                descriptor.clone(),
            ));
        }
        form.push(("redirect[return_url]".into(), self.return_url.clone()));
        push_metadata(&mut form, &self.metadata);
        form
    }
}

/// Payment intent confirmed immediately against a stored card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntentRequest {
    pub amount: i64,
    pub currency: String,
    pub payment_method: String,
    pub customer: String,
    pub confirmation_method: String,
    pub confirm: bool,
    pub return_url: String,
    pub description: String,
    pub metadata: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_descriptor: Option<String>,
    pub moto: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_email: Option<String>,
    pub save_payment_method: bool,
}

impl PaymentIntentRequest {
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form: Vec<(String, String)> = Vec::new();
        form.push(("amount".into(), self.amount.to_string()));
        form.push(("currency".into(), self.currency.to_ascii_lowercase()));
        form.push(("payment_method".into(), self.payment_method.clone()));
        form.push(("customer".into(), self.customer.clone()));
        form.push((
            "confirmation_method".into(),
            self.confirmation_method.clone(),
        ));
        form.push(("confirm".into(), self.confirm.to_string()));
        form.push(("return_url".into(), self.return_url.clone()));
        form.push(("description".into(), self.description.clone()));
        if let Some(descriptor) = &self.statement_descriptor {
            form.push(("statement_descriptor".into(), descriptor.clone()));
        }
        if self.moto {
            form.push(("payment_method_options[card][moto]".into(), "true".into()));
        }
        if let Some(email) = &self.receipt_email {
            form.push(("receipt_email".into(), email.clone()));
        }
        if self.save_payment_method {
            form.push(("save_payment_method".into(), "true".into()));
        }
        push_metadata(&mut form, &self.metadata);
        form
    }
}

/// Request built by a payment method variant; transient, sent once then dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChargeIntentRequest {
    Source(SourceRequest),
    PaymentIntent(PaymentIntentRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateCustomerRequest {
    pub email: String,
    pub name: String,
    pub customer_number: String,
}

impl CreateCustomerRequest {
    pub fn to_form(&self) -> Vec<(String, String)> {
        vec![
            ("email".into(), self.email.clone()),
            ("name".into(), self.name.clone()),
            (
                "metadata[customer_number]".into(),
                self.customer_number.clone(),
            ),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateChargeRequest {
    pub source: String,
    pub amount: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_descriptor: Option<String>,
    pub metadata: Metadata,
}

impl CreateChargeRequest {
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form: Vec<(String, String)> = Vec::new();
        form.push(("source".into(), self.source.clone()));
        form.push(("amount".into(), self.amount.to_string()));
        form.push(("currency".into(), self.currency.to_ascii_lowercase()));
        if let Some(descriptor) = &self.statement_descriptor {
            form.push(("statement_descriptor".into(), descriptor.clone()));
        }
        push_metadata(&mut form, &self.metadata);
        form
    }
}

fn push_metadata(form: &mut Vec<(String, String)>, metadata: &Metadata) {
    for (k, v) in metadata {
        form.push((format!("metadata[{}]", k), v.clone()));
    }
}

// Response shapes (subset)

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRedirect {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub status: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub redirect: Option<SourceRedirect>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectToUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextAction {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub redirect_to_url: Option<RedirectToUrl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<NextAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardDetails {
    pub brand: String,
    pub last4: String,
    pub exp_month: i64,
    pub exp_year: i64,
}

/// Stored payment method as returned by the gateway; only cards are listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub card: Option<CardDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct List<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

/// Gateway-side charge-intent as returned by creation or retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChargeIntent {
    Source(Source),
    PaymentIntent(PaymentIntent),
}

impl ChargeIntent {
    pub fn id(&self) -> &str {
        match self {
            ChargeIntent::Source(s) => &s.id,
            ChargeIntent::PaymentIntent(pi) => &pi.id,
        }
    }

    pub fn status(&self) -> &str {
        match self {
            ChargeIntent::Source(s) => &s.status,
            ChargeIntent::PaymentIntent(pi) => &pi.status,
        }
    }

    /// External authentication page the customer must visit, if any.
    pub fn redirect_url(&self) -> Option<&str> {
        match self {
            ChargeIntent::Source(s) => s.redirect.as_ref().map(|r| r.url.as_str()),
            ChargeIntent::PaymentIntent(pi) => pi
                .next_action
                .as_ref()
                .and_then(|a| a.redirect_to_url.as_ref())
                .map(|r| r.url.as_str()),
        }
    }
}
