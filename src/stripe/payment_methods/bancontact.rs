// Bancontact: one-shot bank redirect through a source

use super::{assemble_return_url, charge_metadata, CheckoutContext, PaymentMethodVariant};
use crate::stripe::errors::PaymentError;
use crate::stripe::types::{truncate_statement_descriptor, ChargeIntentRequest, SourceRequest};

pub(super) fn create_source(
    variant: PaymentMethodVariant,
    ctx: &CheckoutContext<'_>,
    amount_in_cents: i64,
    currency_code: &str,
) -> Result<ChargeIntentRequest, PaymentError> {
    let return_url = assemble_return_url(ctx, variant)?;

    // The descriptor must be part of the source; the later charge carries none
    let statement_descriptor =
        Some(truncate_statement_descriptor(ctx.shop.statement_descriptor())).filter(|d| !d.is_empty());

    Ok(ChargeIntentRequest::Source(SourceRequest {
        type_: "bancontact".into(),
        amount: amount_in_cents,
        currency: currency_code.to_ascii_lowercase(),
        owner_name: ctx.customer.full_name(),
        statement_descriptor,
        return_url,
        metadata: charge_metadata(ctx),
    }))
}
