// Stripe-specific error types and the checkout error taxonomy

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StripeErrorType {
    ApiConnectionError,
    ApiError,
    AuthenticationError,
    CardError,
    IdempotencyError,
    InvalidRequestError,
    RateLimitError,
    ValidationError,
    Unknown,
}

impl From<&str> for StripeErrorType {
    fn from(s: &str) -> Self {
        match s {
            "api_connection_error" => StripeErrorType::ApiConnectionError,
            "api_error" => StripeErrorType::ApiError,
            "authentication_error" => StripeErrorType::AuthenticationError,
            "card_error" => StripeErrorType::CardError,
            "idempotency_error" => StripeErrorType::IdempotencyError,
            "invalid_request_error" => StripeErrorType::InvalidRequestError,
            "rate_limit_error" => StripeErrorType::RateLimitError,
            "validation_error" => StripeErrorType::ValidationError,
            _ => StripeErrorType::Unknown,
        }
    }
}

// Stripe REST error envelope: { error: { type, code, decline_code, message, param } }
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeErrorEnvelope {
    pub error: StripeErrorDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeErrorDetails {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decline_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

impl StripeErrorEnvelope {
    pub fn to_api_error_with_status(self, status: Option<u16>) -> StripeApiError {
        if status == Some(404) || self.error.code.as_deref() == Some("resource_missing") {
            return StripeApiError::NotFound(
                self.error
                    .param
                    .or(self.error.message)
                    .unwrap_or_else(|| "resource".to_string()),
            );
        }
        StripeApiError::Stripe {
            type_: StripeErrorType::from(self.error.type_.as_str()),
            message: self.error.message,
            code: self.error.code,
            param: self.error.param,
            status,
        }
    }
}

/// Errors raised by the gateway client adapter.
#[derive(Debug, Error)]
pub enum StripeApiError {
    #[error("http error: {0}")]
    Http(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("stripe error: {type_:?} message={message:?} code={code:?} param={param:?}")]
    Stripe {
        type_: StripeErrorType,
        message: Option<String>,
        code: Option<String>,
        param: Option<String>,
        status: Option<u16>,
    },
    #[error("not found: {0}")]
    NotFound(String),
}

/// Codes returned by pre-submission validation of checkout form input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationErrorCode {
    #[serde(rename = "STRIPE_CARD_VALIDATION_FAILED")]
    CardValidationFailed,
    #[serde(rename = "INVALID_AMOUNT")]
    InvalidAmount,
    #[serde(rename = "INVALID_CURRENCY")]
    InvalidCurrency,
}

impl ValidationErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationErrorCode::CardValidationFailed => "STRIPE_CARD_VALIDATION_FAILED",
            ValidationErrorCode::InvalidAmount => "INVALID_AMOUNT",
            ValidationErrorCode::InvalidCurrency => "INVALID_CURRENCY",
        }
    }
}

impl fmt::Display for ValidationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

pub const MESSAGE_NO_CARD_SELECTED: &str = "Please select a credit card to pay with.";
pub const MESSAGE_GENERIC_PAYMENT_ERROR: &str =
    "An error occurred while processing your payment. Please try again later.";
pub const MESSAGE_PAYMENT_FAILED: &str =
    "Your payment could not be completed. Please choose another payment method.";
pub const MESSAGE_LIST_CARDS_FAILED: &str = "Failed to load credit cards.";
pub const MESSAGE_DELETE_CARD_FAILED: &str = "Failed to delete credit card.";

/// Error kinds surfaced by payment methods, redirect completion and the card manager.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("validation failed: {0:?}")]
    Validation(Vec<ValidationErrorCode>),
    #[error("no stored card selected")]
    NoCardSelected,
    #[error("unknown payment method: {0}")]
    UnknownPaymentMethod(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("customer store error: {0}")]
    Storage(String),
    #[error("gateway error: {0}")]
    Gateway(StripeApiError),
}

impl From<StripeApiError> for PaymentError {
    fn from(e: StripeApiError) -> Self {
        match e {
            StripeApiError::NotFound(what) => PaymentError::NotFound(what),
            other => PaymentError::Gateway(other),
        }
    }
}

impl PaymentError {
    /// Validation-level errors the customer can fix by correcting their input.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            PaymentError::Validation(_)
                | PaymentError::NoCardSelected
                | PaymentError::UnknownPaymentMethod(_)
                | PaymentError::NotFound(_)
        )
    }

    /// Text safe to show to the customer. Gateway and configuration details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            PaymentError::Validation(codes) => codes
                .iter()
                .map(ValidationErrorCode::code)
                .collect::<Vec<_>>()
                .join(", "),
            PaymentError::NoCardSelected => MESSAGE_NO_CARD_SELECTED.to_string(),
            PaymentError::UnknownPaymentMethod(code) => format!("Unknown payment method '{code}'."),
            PaymentError::NotFound(_) => MESSAGE_PAYMENT_FAILED.to_string(),
            PaymentError::Configuration(_) | PaymentError::Storage(_) | PaymentError::Gateway(_) => {
                MESSAGE_GENERIC_PAYMENT_ERROR.to_string()
            }
        }
    }
}
