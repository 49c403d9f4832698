use serde::Deserialize;
use utoipa::ToSchema;

use crate::amount;
use crate::iban;

/// Raw payment request fields as received from a client, all free text.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(default, deny_unknown_fields)]
pub struct Input {
    pub scheme: String,
    pub name: String,
    pub iban: String,
    pub bic: String,
    pub amount: String,
    pub amount_format: String,
    pub purpose: String,
    pub remittance_reference: String,
    pub remittance_text: String,
    pub information: String,
}

/// Canonical form of a payment request after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clean {
    pub scheme: String,
    pub name: String,
    pub iban: String,
    pub bic: String,
    pub amount_cents: i64,
    pub purpose: String,
    pub remittance_reference: String,
    pub remittance_text: String,
    pub information: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unsupported scheme")]
    UnsupportedScheme,
    #[error("name is required")]
    NameRequired,
    #[error("iban is required")]
    IbanRequired,
    #[error("invalid iban")]
    InvalidIban,
    #[error("bic is required")]
    BicRequired,
    #[error("invalid bic")]
    InvalidBic,
    #[error("amount is required")]
    AmountRequired,
    #[error("invalid amount")]
    InvalidAmount,
    #[error("amount must be > 0")]
    AmountNotPositive,
    #[error("amount too large")]
    AmountTooLarge,
    #[error("unsupported currency: {0} (only EUR is allowed)")]
    UnsupportedCurrency(String),
    #[error("unsupported amount_format")]
    UnsupportedAmountFormat,
    #[error("remittance_reference and remittance_text are mutually exclusive")]
    RemittanceConflict,
    #[error("duplicate query parameter: {0}")]
    DuplicateQueryParam(String),
}

impl Error {
    /// Name of the input field a validation error refers to. Used to fill
    /// the `field` attribute of JSON error envelopes.
    pub fn field(&self) -> &str {
        match self {
            Error::UnsupportedScheme => "scheme",
            Error::NameRequired => "name",
            Error::IbanRequired | Error::InvalidIban => "iban",
            Error::BicRequired | Error::InvalidBic => "bic",
            Error::AmountRequired
            | Error::InvalidAmount
            | Error::AmountNotPositive
            | Error::AmountTooLarge
            | Error::UnsupportedCurrency(_) => "amount",
            Error::UnsupportedAmountFormat => "amount_format",
            Error::RemittanceConflict => "remittance_reference",
            Error::DuplicateQueryParam(name) => name,
        }
    }
}

pub const MAX_AMOUNT_CENTS: i64 = 99_999_999_999;

/// Turns a raw input record into its canonical form, or reports the first
/// validation failure.
///
/// Text limits count Unicode code points, not bytes: name and information
/// are capped at 70, the structured remittance reference at 25, the free
/// remittance text at 140, the purpose code at 4.
pub fn clean_and_validate(input: &Input) -> Result<Clean, Error> {
    let name = input.name.trim().to_string();
    let purpose = input.purpose.trim().to_string();
    let rem_ref = input.remittance_reference.trim().to_string();
    let rem_text = input.remittance_text.trim().to_string();
    let info = input.information.trim().to_string();

    let iban = input.iban.trim().replace(' ', "").to_uppercase();
    let bic = input.bic.trim().to_uppercase();

    let mut scheme = input.scheme.trim().to_lowercase();
    if scheme.is_empty() {
        scheme = "epc_sct".to_string();
    }
    if scheme != "epc_sct" {
        return Err(Error::UnsupportedScheme);
    }

    if name.is_empty() {
        return Err(Error::NameRequired);
    }
    if iban.is_empty() {
        return Err(Error::IbanRequired);
    }
    if !iban::valid_iban(&iban) {
        return Err(Error::InvalidIban);
    }

    // BIC is optional in the EPC layout itself, but this service requires it.
    if bic.is_empty() {
        return Err(Error::BicRequired);
    }
    if !iban::valid_bic(&bic) {
        return Err(Error::InvalidBic);
    }

    let amount_cents = amount::parse_amount_eur(&input.amount, &input.amount_format)?;
    if amount_cents <= 0 {
        return Err(Error::AmountNotPositive);
    }
    if amount_cents > MAX_AMOUNT_CENTS {
        return Err(Error::AmountTooLarge);
    }

    let name = truncate_chars(&name, 70);
    let purpose = if purpose.is_empty() {
        "GDDS".to_string()
    } else {
        truncate_chars(&purpose, 4).to_uppercase()
    };
    let rem_ref = truncate_chars(&rem_ref, 25);
    let rem_text = truncate_chars(&rem_text, 140);
    let info = truncate_chars(&info, 70);

    if !rem_ref.is_empty() && !rem_text.is_empty() {
        return Err(Error::RemittanceConflict);
    }

    Ok(Clean {
        scheme,
        name,
        iban,
        bic,
        amount_cents,
        purpose,
        remittance_reference: rem_ref,
        remittance_text: rem_text,
        information: info,
    })
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
