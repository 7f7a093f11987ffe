//! Completion of charge-intents after the customer returns from external authentication.
//!
//! The returning browser request proves nothing about the payment. Only the
//! charge-intent this session's checkout created is accepted, its status is
//! always re-queried from the gateway, and the gateway's amount, currency and
//! order reference must still match what the checkout submitted. Status
//! queries are not retried; a transport error surfaces as
//! [`PaymentError::Gateway`] and the caller decides what to do.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::settings::ShopSettings;
use crate::stripe::errors::{PaymentError, MESSAGE_PAYMENT_FAILED};
use crate::stripe::payment_methods::PaymentMethodVariant;
use crate::stripe::session::SessionPaymentState;
use crate::stripe::types::{truncate_statement_descriptor, ChargeIntent, CreateChargeRequest, Source};
use crate::stripe::PaymentGateway;

pub const MESSAGE_REQUIRES_ACTION: &str =
    "The payment has not been authorized yet. Please retry the authentication.";

/// Lifecycle of one in-flight charge-intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeIntentState {
    Created,
    Returned,
    Succeeded,
    RequiresAction,
    Failed,
}

impl ChargeIntentState {
    /// Moves to `next` if the lifecycle allows it.
    pub fn transition(self, next: ChargeIntentState) -> Option<ChargeIntentState> {
        use ChargeIntentState::*;
        let allowed = match (self, next) {
            (Created, Returned) => true,
            // Confirmation may settle without any redirect
            (Created, Succeeded | RequiresAction | Failed) => true,
            (Returned, Succeeded | RequiresAction | Failed) => true,
            // Retrying authentication sends the customer out again
            (RequiresAction, Returned) => true,
            _ => false,
        };
        allowed.then_some(next)
    }
}

/// Query parameters of the gateway redirect back to the shop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectReturn {
    pub session: String,
    pub method: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl RedirectReturn {
    /// The returned id and whether it names a payment intent (otherwise a source).
    fn charge_intent_id(&self) -> Option<(&str, bool)> {
        if let Some(id) = self.payment_intent.as_deref().filter(|id| !id.is_empty()) {
            return Some((id, true));
        }
        self.source
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(|id| (id, false))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RedirectOutcome {
    /// The order can be finalized with `payment_id` as its transaction reference.
    Succeeded {
        charge_intent_id: String,
        payment_id: String,
    },
    /// Soft failure; the customer may retry authentication.
    RequiresAction {
        charge_intent_id: String,
        message: String,
    },
    Failed {
        charge_intent_id: String,
        message: String,
    },
}

impl RedirectOutcome {
    pub fn state(&self) -> ChargeIntentState {
        match self {
            RedirectOutcome::Succeeded { .. } => ChargeIntentState::Succeeded,
            RedirectOutcome::RequiresAction { .. } => ChargeIntentState::RequiresAction,
            RedirectOutcome::Failed { .. } => ChargeIntentState::Failed,
        }
    }

    pub fn charge_intent_id(&self) -> &str {
        match self {
            RedirectOutcome::Succeeded { charge_intent_id, .. }
            | RedirectOutcome::RequiresAction { charge_intent_id, .. }
            | RedirectOutcome::Failed { charge_intent_id, .. } => charge_intent_id,
        }
    }

    fn requires_action(charge_intent_id: &str) -> Self {
        RedirectOutcome::RequiresAction {
            charge_intent_id: charge_intent_id.to_string(),
            message: MESSAGE_REQUIRES_ACTION.to_string(),
        }
    }

    fn failed(charge_intent_id: &str) -> Self {
        RedirectOutcome::Failed {
            charge_intent_id: charge_intent_id.to_string(),
            message: MESSAGE_PAYMENT_FAILED.to_string(),
        }
    }
}

/// Maps a payment intent status onto the terminal states.
pub fn classify_payment_intent_status(status: &str) -> ChargeIntentState {
    match status {
        "succeeded" | "requires_capture" => ChargeIntentState::Succeeded,
        "requires_action" | "requires_confirmation" | "processing" => {
            ChargeIntentState::RequiresAction
        }
        _ => ChargeIntentState::Failed,
    }
}

/// Handles the gateway's return request for the given session state.
pub async fn complete_redirect_flow(
    gateway: &dyn PaymentGateway,
    shop: &ShopSettings,
    session: &mut SessionPaymentState,
    redirect: &RedirectReturn,
) -> Result<RedirectOutcome, PaymentError> {
    let variant = PaymentMethodVariant::from_code(&redirect.method)?;
    let (id, is_payment_intent) = redirect
        .charge_intent_id()
        .ok_or_else(|| PaymentError::NotFound("charge-intent id missing from redirect".into()))?;

    let pending = session
        .pending_charge_intent
        .clone()
        .filter(|pending| pending.id == id && pending.method == variant)
        .ok_or_else(|| {
            warn!(
                method = variant.code(),
                charge_intent_id = %id,
                "Redirect return for a charge-intent not pending in this session"
            );
            PaymentError::NotFound(format!("charge-intent {id}"))
        })?;
    let returned = pending
        .state
        .transition(ChargeIntentState::Returned)
        .ok_or_else(|| invalid_transition(id, pending.state, ChargeIntentState::Returned))?;

    let current = if is_payment_intent {
        ChargeIntent::PaymentIntent(gateway.retrieve_payment_intent(id).await?)
    } else {
        ChargeIntent::Source(gateway.retrieve_source(id).await?)
    };

    let outcome = if pending.matches(&current) {
        resolve_charge_intent(gateway, shop, variant, &current).await?
    } else {
        warn!(
            method = variant.code(),
            charge_intent_id = %id,
            order_reference = %pending.order_reference,
            "Charge-intent no longer matches the checkout amount or order"
        );
        RedirectOutcome::failed(id)
    };
    let state = settle(session, returned, &outcome)?;

    info!(
        method = variant.code(),
        charge_intent_id = %id,
        gateway_status = %current.status(),
        state = ?state,
        "Completed redirect flow"
    );
    Ok(outcome)
}

/// Derives the outcome of a charge-intent from its authoritative gateway status.
pub async fn resolve_charge_intent(
    gateway: &dyn PaymentGateway,
    shop: &ShopSettings,
    variant: PaymentMethodVariant,
    intent: &ChargeIntent,
) -> Result<RedirectOutcome, PaymentError> {
    match intent {
        ChargeIntent::PaymentIntent(pi) => Ok(match classify_payment_intent_status(&pi.status) {
            ChargeIntentState::Succeeded => RedirectOutcome::Succeeded {
                charge_intent_id: pi.id.clone(),
                payment_id: pi.id.clone(),
            },
            ChargeIntentState::RequiresAction => RedirectOutcome::requires_action(&pi.id),
            _ => RedirectOutcome::failed(&pi.id),
        }),
        ChargeIntent::Source(source) => match source.status.as_str() {
            "chargeable" => charge_source(gateway, shop, variant, source).await,
            "pending" => Ok(RedirectOutcome::requires_action(&source.id)),
            _ => Ok(RedirectOutcome::failed(&source.id)),
        },
    }
}

async fn charge_source(
    gateway: &dyn PaymentGateway,
    shop: &ShopSettings,
    variant: PaymentMethodVariant,
    source: &Source,
) -> Result<RedirectOutcome, PaymentError> {
    let (amount, currency) = match (source.amount, source.currency.as_deref()) {
        (Some(amount), Some(currency)) => (amount, currency.to_string()),
        _ => {
            warn!(source_id = %source.id, "Chargeable source without amount or currency");
            return Ok(RedirectOutcome::failed(&source.id));
        }
    };
    let statement_descriptor = if variant.includes_statement_descriptor_in_charge() {
        Some(truncate_statement_descriptor(shop.statement_descriptor())).filter(|d| !d.is_empty())
    } else {
        None
    };

    let charge = gateway
        .create_charge(&CreateChargeRequest {
            source: source.id.clone(),
            amount,
            currency,
            statement_descriptor,
            metadata: source.metadata.clone(),
        })
        .await?;

    match charge.status.as_str() {
        "succeeded" | "pending" => Ok(RedirectOutcome::Succeeded {
            charge_intent_id: source.id.clone(),
            payment_id: charge.id,
        }),
        _ => {
            warn!(
                source_id = %source.id,
                charge_id = %charge.id,
                failure = ?charge.failure_message,
                "Charging source failed"
            );
            Ok(RedirectOutcome::failed(&source.id))
        }
    }
}

fn invalid_transition(id: &str, from: ChargeIntentState, to: ChargeIntentState) -> PaymentError {
    warn!(charge_intent_id = %id, from = ?from, to = ?to, "Rejected charge-intent state change");
    PaymentError::NotFound(format!("charge-intent {id} cannot move from {from:?} to {to:?}"))
}

/// Moves the pending charge-intent from `from` into the outcome's state and applies
/// the session effects. Settled charge-intents leave the session.
pub(crate) fn settle(
    session: &mut SessionPaymentState,
    from: ChargeIntentState,
    outcome: &RedirectOutcome,
) -> Result<ChargeIntentState, PaymentError> {
    let state = from
        .transition(outcome.state())
        .ok_or_else(|| invalid_transition(outcome.charge_intent_id(), from, outcome.state()))?;

    match state {
        // Order completion and stale selections both drop the checkout choice
        ChargeIntentState::Succeeded | ChargeIntentState::Failed => {
            session.clear_checkout_selection();
            session.pending_charge_intent = None;
        }
        _ => {
            if let Some(pending) = session.pending_charge_intent.as_mut() {
                pending.state = state;
            }
        }
    }
    Ok(state)
}
