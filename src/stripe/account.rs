//! Stored card management on the customer's account pages.
//!
//! Both operations fail soft: listing errors become an account error shown
//! with the (possibly empty) list, and deletion always ends in a redirect to
//! the listing, carrying its error through the session.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::stripe::errors::{PaymentError, MESSAGE_DELETE_CARD_FAILED, MESSAGE_LIST_CARDS_FAILED};
use crate::stripe::session::SessionPaymentState;
use crate::stripe::types::PaymentMethod;
use crate::stripe::PaymentGateway;

pub const CARD_LISTING_PATH: &str = "/account/stripe/cards";

/// Data rendered by the card listing page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardListView {
    pub cards: Vec<PaymentMethod>,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct DeleteCardOutcome {
    pub redirect_to: &'static str,
    pub error: Option<PaymentError>,
}

/// Loads the customer's stored cards and consumes any pending account error.
pub async fn list_cards(
    gateway: &dyn PaymentGateway,
    session: &mut SessionPaymentState,
) -> CardListView {
    let cards = match session.stripe_customer.clone() {
        // Neither the session nor the customer store knows a gateway customer
        None => Vec::new(),
        Some(customer_id) => match gateway.list_payment_methods(&customer_id).await {
            Ok(methods) => methods.into_iter().filter(|pm| pm.type_ == "card").collect(),
            Err(e) => {
                warn!(customer_id = %customer_id, error = %e, "Listing stored cards failed");
                session.push_account_error(MESSAGE_LIST_CARDS_FAILED);
                Vec::new()
            }
        },
    };

    CardListView {
        cards,
        error: session.take_account_error(),
    }
}

/// Detaches a stored card and redirects back to the listing.
pub async fn delete_card(
    gateway: &dyn PaymentGateway,
    session: &mut SessionPaymentState,
    card_id: Option<&str>,
) -> DeleteCardOutcome {
    let result = detach_owned_card(gateway, session, card_id).await;
    if let Err(e) = &result {
        warn!(card_id = ?card_id, error = %e, "Deleting stored card failed");
        session.account_error = Some(MESSAGE_DELETE_CARD_FAILED.to_string());
    }

    // The selection may point at the card we just touched, whatever the result
    session.clear_checkout_selection();

    DeleteCardOutcome {
        redirect_to: CARD_LISTING_PATH,
        error: result.err(),
    }
}

async fn detach_owned_card(
    gateway: &dyn PaymentGateway,
    session: &SessionPaymentState,
    card_id: Option<&str>,
) -> Result<(), PaymentError> {
    let card_id = card_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| PaymentError::NotFound("missing parameter \"cardId\"".into()))?;

    let payment_method = gateway.retrieve_payment_method(card_id).await?;
    let owner = session.stripe_customer.as_deref();
    if owner.is_none() || payment_method.customer.as_deref() != owner {
        return Err(PaymentError::NotFound(format!("card {card_id}")));
    }

    gateway.detach_payment_method(card_id).await?;
    info!(card_id = %card_id, "Detached stored card");
    Ok(())
}
