// Checkout entry points: payment selection and charge-intent submission

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::stripe::customers::CustomerStore;
use crate::stripe::errors::PaymentError;
use crate::stripe::payment_methods::{CheckoutContext, PaymentData, PaymentMethodVariant};
use crate::stripe::redirect::{resolve_charge_intent, settle, ChargeIntentState, RedirectOutcome};
use crate::stripe::session::{PendingChargeIntent, SelectedCard, SessionPaymentState};
use crate::stripe::{submit_charge_intent, PaymentGateway};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "next", rename_all = "snake_case")]
pub enum CheckoutStep {
    /// Send the customer to the gateway; completion happens on return.
    Redirect {
        charge_intent_id: String,
        url: String,
    },
    /// The gateway resolved the charge-intent without a redirect.
    Completed(RedirectOutcome),
}

/// Stores the validated payment selection from the checkout form.
pub fn select_payment(
    variant: PaymentMethodVariant,
    payment_data: &PaymentData,
    session: &mut SessionPaymentState,
) -> Result<(), PaymentError> {
    let errors = variant.validate(payment_data);
    if !errors.is_empty() {
        return Err(PaymentError::Validation(errors));
    }

    match variant {
        PaymentMethodVariant::Card => {
            session.selected_card = payment_data
                .selected_card
                .as_ref()
                .map(|id| SelectedCard { id: id.trim().to_string() });
            session.save_card_for_future_checkouts = payment_data.save_card_for_future_checkouts;
        }
        PaymentMethodVariant::Bancontact => session.clear_checkout_selection(),
    }
    Ok(())
}

/// Builds and submits the charge-intent for `method_code`.
///
/// The created charge-intent is recorded in the session; redirect completion
/// accepts nothing else. A gateway customer created along the way is kept in
/// `customers` for later checkouts of the same shop customer.
pub async fn start_payment(
    gateway: &dyn PaymentGateway,
    customers: &CustomerStore,
    ctx: &CheckoutContext<'_>,
    session: &mut SessionPaymentState,
    method_code: &str,
    amount_in_cents: i64,
    currency_code: &str,
) -> Result<CheckoutStep, PaymentError> {
    let variant = PaymentMethodVariant::from_code(method_code)?;
    customers
        .restore_into(session, &ctx.customer.customer_number)
        .map_err(|e| PaymentError::Storage(e.to_string()))?;

    let known_customer = session.stripe_customer.clone();
    let built = variant
        .create_charge_intent(gateway, ctx, session, amount_in_cents, currency_code)
        .await;
    if session.stripe_customer != known_customer {
        remember_customer(customers, ctx, session);
    }
    let request = built?;

    let intent = submit_charge_intent(gateway, &request).await.map_err(|e| {
        warn!(
            method = variant.code(),
            order_reference = %ctx.order_reference,
            error = %e,
            "Creating charge-intent failed"
        );
        PaymentError::from(e)
    })?;
    session.pending_charge_intent = Some(PendingChargeIntent {
        id: intent.id().to_string(),
        method: variant,
        amount: amount_in_cents,
        currency: currency_code.to_ascii_lowercase(),
        order_reference: ctx.order_reference.to_string(),
        state: ChargeIntentState::Created,
    });

    if let Some(url) = intent.redirect_url() {
        info!(
            method = variant.code(),
            charge_intent_id = %intent.id(),
            "Charge-intent requires customer redirect"
        );
        return Ok(CheckoutStep::Redirect {
            charge_intent_id: intent.id().to_string(),
            url: url.to_string(),
        });
    }

    let outcome = resolve_charge_intent(gateway, ctx.shop, variant, &intent).await?;
    let state = settle(session, ChargeIntentState::Created, &outcome)?;
    info!(
        method = variant.code(),
        charge_intent_id = %intent.id(),
        state = ?state,
        "Charge-intent resolved without redirect"
    );
    Ok(CheckoutStep::Completed(outcome))
}

// Failures are logged only; the session cache still holds the customer
fn remember_customer(customers: &CustomerStore, ctx: &CheckoutContext<'_>, session: &SessionPaymentState) {
    let customer_number = ctx.customer.customer_number.trim();
    let Some(customer_id) = session.stripe_customer.as_deref() else {
        return;
    };
    if customer_number.is_empty() {
        return;
    }
    if let Err(e) = customers.insert(customer_number, customer_id) {
        warn!(
            customer_id = %customer_id,
            customer_number = %ctx.customer.customer_number,
            error = %e,
            "Storing Stripe customer failed"
        );
    }
}
