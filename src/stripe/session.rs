// Per-session checkout state that survives the external redirect round-trip

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::stripe::payment_methods::PaymentMethodVariant;
use crate::stripe::redirect::ChargeIntentState;
use crate::stripe::types::{ChargeIntent, ORDER_REFERENCE_KEY};

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600); // 1 hour

/// Stored card picked in the checkout's payment selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedCard {
    pub id: String,
}

/// Charge-intent created by this session's checkout that has not settled yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChargeIntent {
    pub id: String,
    pub method: PaymentMethodVariant,
    pub amount: i64,
    /// Lowercase, as sent to the gateway.
    pub currency: String,
    pub order_reference: String,
    pub state: ChargeIntentState,
}

impl PendingChargeIntent {
    /// Whether the gateway's copy of the charge-intent still describes this checkout.
    pub fn matches(&self, intent: &ChargeIntent) -> bool {
        let (amount, currency, metadata) = match intent {
            ChargeIntent::PaymentIntent(pi) => (Some(pi.amount), Some(pi.currency.as_str()), &pi.metadata),
            ChargeIntent::Source(source) => (source.amount, source.currency.as_deref(), &source.metadata),
        };
        intent.id() == self.id
            && amount == Some(self.amount)
            && currency.is_some_and(|c| c.eq_ignore_ascii_case(&self.currency))
            && metadata.get(ORDER_REFERENCE_KEY).map(String::as_str) == Some(self.order_reference.as_str())
    }
}

/// Payment selection and account feedback for one shop session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPaymentState {
    pub selected_card: Option<SelectedCard>,
    /// Consumed by the first charge-intent build that applies it.
    pub save_card_for_future_checkouts: bool,
    /// Consumed by the next render of the card listing.
    pub account_error: Option<String>,
    /// Cached gateway customer id, created lazily.
    pub stripe_customer: Option<String>,
    /// Set when a charge-intent is submitted, cleared once it succeeds or fails.
    #[serde(default)]
    pub pending_charge_intent: Option<PendingChargeIntent>,
}

impl SessionPaymentState {
    pub fn selected_card_id(&self) -> Option<&str> {
        self.selected_card
            .as_ref()
            .map(|c| c.id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// Returns the save-card request and clears it so a retry never reapplies it.
    pub fn take_save_card_request(&mut self) -> bool {
        std::mem::take(&mut self.save_card_for_future_checkouts)
    }

    pub fn take_account_error(&mut self) -> Option<String> {
        self.account_error.take()
    }

    /// Appends `message` after any pending account error.
    pub fn push_account_error(&mut self, message: &str) {
        self.account_error = Some(match self.account_error.take() {
            Some(pending) if !pending.is_empty() => format!("{pending}\n{message}"),
            _ => message.to_string(),
        });
    }

    /// Drops the card selection and save flag. Runs on logout, order completion and card deletion.
    pub fn clear_checkout_selection(&mut self) {
        self.selected_card = None;
        self.save_card_for_future_checkouts = false;
    }
}

struct SessionEntry {
    state: SessionPaymentState,
    touched_at: Instant,
}

impl SessionEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.touched_at.elapsed() > ttl
    }
}

/// In-process session store keyed by shop session id.
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    session_ttl: Duration,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Snapshot of the session state, or a fresh one for unknown/expired sessions.
    pub async fn load(&self, session_id: &str) -> SessionPaymentState {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .filter(|entry| !entry.is_expired(self.session_ttl))
            .map(|entry| entry.state.clone())
            .unwrap_or_default()
    }

    pub async fn save(&self, session_id: &str, state: SessionPaymentState) {
        let mut sessions = self.sessions.write().await;

        // Clean up expired sessions opportunistically
        self.cleanup_expired_sessions(&mut sessions);

        sessions.insert(
            session_id.to_string(),
            SessionEntry {
                state,
                touched_at: Instant::now(),
            },
        );
    }

    #[cfg(test)]
    pub async fn has_session(&self, session_id: &str) -> bool {
        let sessions = self.sessions.read().await;
        sessions.contains_key(session_id)
    }

    fn cleanup_expired_sessions(&self, sessions: &mut HashMap<String, SessionEntry>) {
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| entry.is_expired(self.session_ttl))
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            sessions.remove(&id);
            debug!(session_id = %id, "Cleaned up expired payment session");
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
