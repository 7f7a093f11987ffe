//! Payment method variants offered at checkout.
//!
//! Each variant turns an order amount into a gateway charge-intent request. The
//! set is closed: variants are selected by their method code and dispatched by
//! `match`, so adding a method means adding an arm everywhere it matters.

mod bancontact;
mod card;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::settings::ShopSettings;
use crate::stripe::errors::{PaymentError, ValidationErrorCode};
use crate::stripe::session::SessionPaymentState;
use crate::stripe::types::{ensure_charge_amount, ChargeIntentRequest, Metadata, ORDER_REFERENCE_KEY};
use crate::stripe::PaymentGateway;

pub const CARD_METHOD_CODE: &str = "stripe_payment_card";
pub const BANCONTACT_METHOD_CODE: &str = "stripe_payment_bancontact";

/// Path of the endpoint that receives customers returning from external authentication.
pub const REDIRECT_RETURN_PATH: &str = "stripe/complete-redirect-flow";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodVariant {
    /// Stored, reusable card confirmed through a payment intent.
    Card,
    /// One-shot bank redirect through a source.
    Bancontact,
}

/// Who initiated the checkout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    #[default]
    Customer,
    /// Shop operator placing the order on the customer's behalf from the backend.
    Administrator,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub customer_number: String,
}

impl CustomerProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

/// Raw checkout form input for the payment selection step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentData {
    #[serde(default)]
    pub selected_card: Option<String>,
    #[serde(default)]
    pub save_card_for_future_checkouts: bool,
}

/// Everything a variant reads besides the session state.
#[derive(Debug, Clone, Copy)]
pub struct CheckoutContext<'a> {
    pub shop: &'a ShopSettings,
    pub session_id: &'a str,
    pub customer: &'a CustomerProfile,
    pub order_reference: &'a str,
    pub actor: Actor,
}

impl PaymentMethodVariant {
    pub const ALL: [PaymentMethodVariant; 2] =
        [PaymentMethodVariant::Card, PaymentMethodVariant::Bancontact];

    pub fn from_code(code: &str) -> Result<Self, PaymentError> {
        Self::ALL
            .into_iter()
            .find(|variant| variant.code() == code)
            .ok_or_else(|| PaymentError::UnknownPaymentMethod(code.to_string()))
    }

    pub fn code(self) -> &'static str {
        match self {
            PaymentMethodVariant::Card => CARD_METHOD_CODE,
            PaymentMethodVariant::Bancontact => BANCONTACT_METHOD_CODE,
        }
    }

    /// Reusable methods carry the descriptor on the charge; one-shot methods on the source.
    pub fn includes_statement_descriptor_in_charge(self) -> bool {
        match self {
            PaymentMethodVariant::Card => true,
            PaymentMethodVariant::Bancontact => false,
        }
    }

    /// Pre-submission validation of checkout form input. Empty means valid.
    pub fn validate(self, payment_data: &PaymentData) -> Vec<ValidationErrorCode> {
        match self {
            PaymentMethodVariant::Card => card::validate(payment_data),
            PaymentMethodVariant::Bancontact => Vec::new(),
        }
    }

    /// Builds the gateway request for this method. May create and cache a gateway customer.
    pub async fn create_charge_intent(
        self,
        gateway: &dyn PaymentGateway,
        ctx: &CheckoutContext<'_>,
        session: &mut SessionPaymentState,
        amount_in_cents: i64,
        currency_code: &str,
    ) -> Result<ChargeIntentRequest, PaymentError> {
        ensure_charge_amount(amount_in_cents, currency_code).map_err(PaymentError::Validation)?;

        let request = match self {
            PaymentMethodVariant::Card => {
                card::create_payment_intent(self, gateway, ctx, session, amount_in_cents, currency_code)
                    .await?
            }
            PaymentMethodVariant::Bancontact => {
                bancontact::create_source(self, ctx, amount_in_cents, currency_code)?
            }
        };

        debug!(
            method = self.code(),
            order_reference = %ctx.order_reference,
            amount_cents = amount_in_cents,
            currency = %currency_code,
            "Built charge-intent request"
        );
        Ok(request)
    }
}

/// Return URL pointing at the redirect completion endpoint for this session.
pub(crate) fn assemble_return_url(
    ctx: &CheckoutContext<'_>,
    variant: PaymentMethodVariant,
) -> Result<String, PaymentError> {
    let base = ctx
        .shop
        .base_url
        .as_deref()
        .filter(|b| !b.trim().is_empty())
        .ok_or_else(|| PaymentError::Configuration("shop base_url is not configured".into()))?;

    let base = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    };
    let mut url = Url::parse(&base)
        .and_then(|b| b.join(REDIRECT_RETURN_PATH))
        .map_err(|e| PaymentError::Configuration(format!("invalid shop base_url: {e}")))?;
    url.query_pairs_mut()
        .append_pair("session", ctx.session_id)
        .append_pair("method", variant.code());
    Ok(url.into())
}

/// Metadata attached to every charge-intent so the order can be traced from the gateway.
pub(crate) fn charge_metadata(ctx: &CheckoutContext<'_>) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(ORDER_REFERENCE_KEY.into(), ctx.order_reference.to_string());
    metadata.insert("customer_number".into(), ctx.customer.customer_number.clone());
    metadata.insert("customer_email".into(), ctx.customer.email.clone());
    if !ctx.shop.shop_name.trim().is_empty() {
        metadata.insert("shop".into(), ctx.shop.shop_name.trim().to_string());
    }
    metadata
}
