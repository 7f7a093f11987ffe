// Stored card paid through a payment intent confirmed on creation

use tracing::{debug, info};

use super::{
    assemble_return_url, charge_metadata, Actor, CheckoutContext, PaymentData, PaymentMethodVariant,
};
use crate::stripe::errors::{PaymentError, ValidationErrorCode};
use crate::stripe::session::SessionPaymentState;
use crate::stripe::types::{
    truncate_statement_descriptor, ChargeIntentRequest, CreateCustomerRequest, PaymentIntentRequest,
};
use crate::stripe::PaymentGateway;

pub(super) fn validate(payment_data: &PaymentData) -> Vec<ValidationErrorCode> {
    let has_card = payment_data
        .selected_card
        .as_deref()
        .is_some_and(|id| !id.trim().is_empty());
    if has_card {
        Vec::new()
    } else {
        vec![ValidationErrorCode::CardValidationFailed]
    }
}

pub(super) async fn create_payment_intent(
    variant: PaymentMethodVariant,
    gateway: &dyn PaymentGateway,
    ctx: &CheckoutContext<'_>,
    session: &mut SessionPaymentState,
    amount_in_cents: i64,
    currency_code: &str,
) -> Result<ChargeIntentRequest, PaymentError> {
    let payment_method = session
        .selected_card_id()
        .ok_or(PaymentError::NoCardSelected)?
        .to_string();
    let return_url = assemble_return_url(ctx, variant)?;
    let customer = ensure_stripe_customer(gateway, ctx, session).await?;

    let statement_descriptor = if variant.includes_statement_descriptor_in_charge() {
        Some(truncate_statement_descriptor(ctx.shop.statement_descriptor())).filter(|d| !d.is_empty())
    } else {
        None
    };

    // MOTO only for operators ordering from the backend, never for the customer themselves
    let moto = ctx.shop.allow_moto_transactions && ctx.actor == Actor::Administrator;
    let receipt_email = ctx
        .shop
        .send_stripe_charge_emails
        .then(|| ctx.customer.email.clone());

    let request = PaymentIntentRequest {
        amount: amount_in_cents,
        currency: currency_code.to_ascii_lowercase(),
        payment_method,
        customer,
        confirmation_method: "automatic".into(),
        confirm: true,
        return_url,
        description: format!(
            "{} / Customer {}",
            ctx.customer.email, ctx.customer.customer_number
        ),
        metadata: charge_metadata(ctx),
        statement_descriptor,
        moto,
        receipt_email,
        save_payment_method: session.take_save_card_request(),
    };
    Ok(ChargeIntentRequest::PaymentIntent(request))
}

/// Returns the cached gateway customer, creating it on first use.
async fn ensure_stripe_customer(
    gateway: &dyn PaymentGateway,
    ctx: &CheckoutContext<'_>,
    session: &mut SessionPaymentState,
) -> Result<String, PaymentError> {
    if let Some(id) = session.stripe_customer.as_deref().filter(|id| !id.is_empty()) {
        debug!(customer_id = %id, "Reusing cached Stripe customer");
        return Ok(id.to_string());
    }

    let customer = gateway
        .create_customer(&CreateCustomerRequest {
            email: ctx.customer.email.clone(),
            name: ctx.customer.full_name(),
            customer_number: ctx.customer.customer_number.clone(),
        })
        .await?;
    info!(
        customer_id = %customer.id,
        customer_number = %ctx.customer.customer_number,
        "Created Stripe customer"
    );
    session.stripe_customer = Some(customer.id.clone());
    Ok(customer.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ShopSettings;
    use crate::stripe::session::SelectedCard;
    use crate::stripe::testing::{checkout_context, customer, shop_settings, FakeGateway};

    fn session_with_card() -> SessionPaymentState {
        SessionPaymentState {
            selected_card: Some(SelectedCard { id: "pm_card_1".into() }),
            ..Default::default()
        }
    }

    fn unwrap_intent(request: ChargeIntentRequest) -> PaymentIntentRequest {
        match request {
            ChargeIntentRequest::PaymentIntent(pi) => pi,
            other => panic!("expected payment intent request, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_requires_selected_card() {
        assert_eq!(
            validate(&PaymentData::default()),
            vec![ValidationErrorCode::CardValidationFailed]
        );
        assert_eq!(
            validate(&PaymentData {
                selected_card: Some("  ".into()),
                ..Default::default()
            }),
            vec![ValidationErrorCode::CardValidationFailed]
        );
        assert!(validate(&PaymentData {
            selected_card: Some("pm_card_1".into()),
            ..Default::default()
        })
        .is_empty());
    }

    #[tokio::test]
    async fn test_no_card_selected() {
        let gateway = FakeGateway::new();
        let shop = shop_settings();
        let customer = customer();
        let ctx = checkout_context(&shop, &customer);

        for (amount, currency) in [(1, "EUR"), (1999, "USD"), (250_000, "jpy")] {
            let mut session = SessionPaymentState::default();
            let err = PaymentMethodVariant::Card
                .create_charge_intent(&gateway, &ctx, &mut session, amount, currency)
                .await
                .unwrap_err();
            assert!(matches!(err, PaymentError::NoCardSelected));
        }
        assert_eq!(gateway.customers_created(), 0);
    }

    #[tokio::test]
    async fn test_missing_base_url_is_configuration_error() {
        let gateway = FakeGateway::new();
        let shop = ShopSettings {
            base_url: None,
            ..shop_settings()
        };
        let customer = customer();
        let ctx = checkout_context(&shop, &customer);
        let mut session = session_with_card();
        session.save_card_for_future_checkouts = true;

        let err = PaymentMethodVariant::Card
            .create_charge_intent(&gateway, &ctx, &mut session, 1999, "EUR")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Configuration(_)));
        assert!(session.save_card_for_future_checkouts);
        assert_eq!(gateway.customers_created(), 0);
    }

    #[tokio::test]
    async fn test_builds_payment_intent_request() {
        let gateway = FakeGateway::new();
        let shop = shop_settings();
        let customer = customer();
        let ctx = checkout_context(&shop, &customer);
        let mut session = session_with_card();

        let pi = unwrap_intent(
            PaymentMethodVariant::Card
                .create_charge_intent(&gateway, &ctx, &mut session, 1999, "EUR")
                .await
                .unwrap(),
        );

        assert_eq!(pi.amount, 1999);
        assert_eq!(pi.currency, "eur");
        assert_eq!(pi.payment_method, "pm_card_1");
        assert_eq!(pi.customer, "cus_fake_1");
        assert_eq!(pi.confirmation_method, "automatic");
        assert!(pi.confirm);
        assert_eq!(pi.description, "jane.doe@example.com / Customer 20001");
        assert!(pi
            .return_url
            .starts_with("https://shop.example/shop/stripe/complete-redirect-flow?"));
        assert_eq!(pi.statement_descriptor.as_deref(), Some("Demo Shop Descriptor"));
        assert!(!pi.moto);
        assert_eq!(pi.receipt_email, None);
        assert!(!pi.save_payment_method);
    }

    #[tokio::test]
    async fn test_statement_descriptor_truncated_to_gateway_limit() {
        let gateway = FakeGateway::new();
        let shop = ShopSettings {
            statement_descriptor: "A Very Long Shop Name For Statements GmbH".into(),
            ..shop_settings()
        };
        let customer = customer();
        let ctx = checkout_context(&shop, &customer);
        let mut session = session_with_card();

        let pi = unwrap_intent(
            PaymentMethodVariant::Card
                .create_charge_intent(&gateway, &ctx, &mut session, 1999, "EUR")
                .await
                .unwrap(),
        );
        let descriptor = pi.statement_descriptor.unwrap();
        assert!(descriptor.chars().count() <= 22);
        assert_eq!(descriptor, "A Very Long Shop Name ");
    }

    #[tokio::test]
    async fn test_moto_requires_config_and_administrator() {
        let gateway = FakeGateway::new();
        let customer = customer();
        let cases = [
            (false, Actor::Customer, false),
            (false, Actor::Administrator, false),
            (true, Actor::Customer, false),
            (true, Actor::Administrator, true),
        ];

        for (allow_moto, actor, expected) in cases {
            let shop = ShopSettings {
                allow_moto_transactions: allow_moto,
                ..shop_settings()
            };
            let ctx = CheckoutContext {
                actor,
                ..checkout_context(&shop, &customer)
            };
            let mut session = session_with_card();
            let pi = unwrap_intent(
                PaymentMethodVariant::Card
                    .create_charge_intent(&gateway, &ctx, &mut session, 1999, "EUR")
                    .await
                    .unwrap(),
            );
            assert_eq!(pi.moto, expected, "allow_moto={allow_moto} actor={actor:?}");
        }
    }

    #[tokio::test]
    async fn test_receipt_email_per_config() {
        let gateway = FakeGateway::new();
        let shop = ShopSettings {
            send_stripe_charge_emails: true,
            ..shop_settings()
        };
        let customer = customer();
        let ctx = checkout_context(&shop, &customer);
        let mut session = session_with_card();

        let pi = unwrap_intent(
            PaymentMethodVariant::Card
                .create_charge_intent(&gateway, &ctx, &mut session, 1999, "EUR")
                .await
                .unwrap(),
        );
        assert_eq!(pi.receipt_email.as_deref(), Some("jane.doe@example.com"));
    }

    #[tokio::test]
    async fn test_save_card_flag_consumed_once() {
        let gateway = FakeGateway::new();
        let shop = shop_settings();
        let customer = customer();
        let ctx = checkout_context(&shop, &customer);
        let mut session = session_with_card();
        session.save_card_for_future_checkouts = true;

        let first = unwrap_intent(
            PaymentMethodVariant::Card
                .create_charge_intent(&gateway, &ctx, &mut session, 1999, "EUR")
                .await
                .unwrap(),
        );
        assert!(first.save_payment_method);
        assert!(!session.save_card_for_future_checkouts);

        let second = unwrap_intent(
            PaymentMethodVariant::Card
                .create_charge_intent(&gateway, &ctx, &mut session, 1999, "EUR")
                .await
                .unwrap(),
        );
        assert!(!second.save_payment_method);
    }

    #[tokio::test]
    async fn test_customer_created_once_per_session() {
        let gateway = FakeGateway::new();
        let shop = shop_settings();
        let customer = customer();
        let ctx = checkout_context(&shop, &customer);
        let mut session = session_with_card();
        assert!(session.stripe_customer.is_none());

        let first = unwrap_intent(
            PaymentMethodVariant::Card
                .create_charge_intent(&gateway, &ctx, &mut session, 1999, "EUR")
                .await
                .unwrap(),
        );
        let second = unwrap_intent(
            PaymentMethodVariant::Card
                .create_charge_intent(&gateway, &ctx, &mut session, 1999, "EUR")
                .await
                .unwrap(),
        );

        assert_eq!(gateway.customers_created(), 1);
        assert_eq!(session.stripe_customer.as_deref(), Some("cus_fake_1"));
        assert_eq!(first.customer, second.customer);
    }

    #[tokio::test]
    async fn test_customer_creation_failure_is_gateway_error() {
        let gateway = FakeGateway::new();
        gateway.fail_customer_creation();
        let shop = shop_settings();
        let customer = customer();
        let ctx = checkout_context(&shop, &customer);
        let mut session = session_with_card();
        session.save_card_for_future_checkouts = true;

        let err = PaymentMethodVariant::Card
            .create_charge_intent(&gateway, &ctx, &mut session, 1999, "EUR")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Gateway(_)));
        assert!(session.stripe_customer.is_none());
        assert!(session.save_card_for_future_checkouts);
    }
}
