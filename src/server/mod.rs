// HTTP surface for the shop backend and the gateway's redirect return

use axum::{
    async_trait,
    extract::{FromRequestParts, Query, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{debug, error, info, warn};

use crate::stripe::account::{self, CardListView};
use crate::stripe::checkout::{self, CheckoutStep};
use crate::stripe::errors::{PaymentError, ValidationErrorCode};
use crate::stripe::payment_methods::{
    Actor, CheckoutContext, CustomerProfile, PaymentData, PaymentMethodVariant,
};
use crate::stripe::redirect::{self, RedirectOutcome, RedirectReturn};
use crate::stripe::session::SessionPaymentState;
use crate::stripe::StripeProvider;

pub const SESSION_HEADER: &str = "x-session-id";
/// Shop customer number of the logged-in customer, forwarded on account pages.
pub const CUSTOMER_HEADER: &str = "x-customer-number";

pub async fn run_server(port: u16, provider: StripeProvider) -> anyhow::Result<()> {
    let app = router(provider);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting checkout HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(provider: StripeProvider) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/checkout/selection", post(select_payment))
        .route("/checkout/payment", post(start_payment))
        .route("/checkout/logout", post(logout))
        .route("/stripe/complete-redirect-flow", get(complete_redirect_flow))
        .route(account::CARD_LISTING_PATH, get(manage_credit_cards))
        .route("/account/stripe/cards/delete", post(delete_card))
        .with_state(provider)
}

/// Shop session id forwarded by the shop backend.
pub struct SessionId(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for SessionId {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| SessionId(v.to_string()))
            .ok_or((StatusCode::BAD_REQUEST, "missing x-session-id header"))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    codes: Vec<ValidationErrorCode>,
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let status = match &self {
            PaymentError::Validation(_)
            | PaymentError::NoCardSelected
            | PaymentError::UnknownPaymentMethod(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
            PaymentError::Configuration(_) | PaymentError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            PaymentError::Gateway(_) => StatusCode::BAD_GATEWAY,
        };
        if self.is_user_correctable() {
            debug!(error = %self, "Rejected checkout input");
        } else if let PaymentError::Configuration(_) = &self {
            error!(error = %self, "Shop is misconfigured");
        } else if let PaymentError::Storage(_) = &self {
            error!(error = %self, "Customer store unavailable");
        } else {
            warn!(error = %self, "Gateway call failed");
        }
        let codes = match &self {
            PaymentError::Validation(codes) => codes.clone(),
            _ => Vec::new(),
        };
        let body = ErrorBody {
            error: self.user_message(),
            codes,
        };
        (status, Json(body)).into_response()
    }
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[derive(Debug, Deserialize)]
pub struct SelectionRequest {
    pub method: String,
    #[serde(flatten)]
    pub data: PaymentData,
}

async fn select_payment(
    State(provider): State<StripeProvider>,
    SessionId(session_id): SessionId,
    Json(req): Json<SelectionRequest>,
) -> Result<StatusCode, PaymentError> {
    let variant = PaymentMethodVariant::from_code(&req.method)?;
    let sessions = provider.sessions();
    let mut session = sessions.load(&session_id).await;
    checkout::select_payment(variant, &req.data, &mut session)?;
    sessions.save(&session_id, session).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct StartPaymentRequest {
    pub method: String,
    pub amount_in_cents: i64,
    pub currency: String,
    pub customer: CustomerProfile,
    pub order_reference: String,
    #[serde(default)]
    pub actor: Actor,
}

async fn start_payment(
    State(provider): State<StripeProvider>,
    SessionId(session_id): SessionId,
    Json(req): Json<StartPaymentRequest>,
) -> Result<Json<CheckoutStep>, PaymentError> {
    let ctx = CheckoutContext {
        shop: provider.shop(),
        session_id: &session_id,
        customer: &req.customer,
        order_reference: &req.order_reference,
        actor: req.actor,
    };
    let sessions = provider.sessions();
    let mut session = sessions.load(&session_id).await;
    let result = checkout::start_payment(
        provider.gateway(),
        provider.customers(),
        &ctx,
        &mut session,
        &req.method,
        req.amount_in_cents,
        &req.currency,
    )
    .await;
    sessions.save(&session_id, session).await;
    result.map(Json)
}

async fn logout(
    State(provider): State<StripeProvider>,
    SessionId(session_id): SessionId,
) -> StatusCode {
    let sessions = provider.sessions();
    let mut session = sessions.load(&session_id).await;
    session.clear_checkout_selection();
    sessions.save(&session_id, session).await;
    StatusCode::NO_CONTENT
}

async fn complete_redirect_flow(
    State(provider): State<StripeProvider>,
    Query(ret): Query<RedirectReturn>,
) -> Result<Json<RedirectOutcome>, PaymentError> {
    let sessions = provider.sessions();
    let mut session = sessions.load(&ret.session).await;
    let result =
        redirect::complete_redirect_flow(provider.gateway(), provider.shop(), &mut session, &ret)
            .await;
    sessions.save(&ret.session, session).await;
    result.map(Json)
}

/// Loads the session and fills its customer cache from the customer store.
async fn load_account_session(
    provider: &StripeProvider,
    session_id: &str,
    headers: &HeaderMap,
) -> SessionPaymentState {
    let mut session = provider.sessions().load(session_id).await;
    let customer_number = headers
        .get(CUSTOMER_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if let Err(e) = provider.customers().restore_into(&mut session, customer_number) {
        warn!(customer_number = %customer_number, error = %e, "Reading customer store failed");
    }
    session
}

async fn manage_credit_cards(
    State(provider): State<StripeProvider>,
    SessionId(session_id): SessionId,
    headers: HeaderMap,
) -> Json<CardListView> {
    let sessions = provider.sessions();
    let mut session = load_account_session(&provider, &session_id, &headers).await;
    let view = account::list_cards(provider.gateway(), &mut session).await;
    sessions.save(&session_id, session).await;
    Json(view)
}

#[derive(Debug, Deserialize)]
pub struct DeleteCardForm {
    #[serde(rename = "cardId", default)]
    pub card_id: Option<String>,
}

async fn delete_card(
    State(provider): State<StripeProvider>,
    SessionId(session_id): SessionId,
    headers: HeaderMap,
    Form(form): Form<DeleteCardForm>,
) -> Redirect {
    let sessions = provider.sessions();
    let mut session = load_account_session(&provider, &session_id, &headers).await;
    let outcome =
        account::delete_card(provider.gateway(), &mut session, form.card_id.as_deref()).await;
    sessions.save(&session_id, session).await;
    Redirect::to(outcome.redirect_to)
}
