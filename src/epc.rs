use crate::validate::Clean;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EpcError {
    #[error("missing required fields")]
    MissingFields,
    #[error("remittance reference and text are mutually exclusive")]
    RemittanceConflict,
}

/// Assembles the 12-line EPC SCT payload, lines joined by `\n` with no
/// trailing newline:
///
/// ```text
/// BCD / 001 / 1 / SCT / bic / name / iban / EUR<amount> /
/// purpose / remittance reference / remittance text / information
/// ```
pub fn build_payload(c: &Clean) -> Result<String, EpcError> {
    if c.name.is_empty() || c.iban.is_empty() || c.bic.is_empty() || c.amount_cents <= 0 {
        return Err(EpcError::MissingFields);
    }
    if !c.remittance_reference.is_empty() && !c.remittance_text.is_empty() {
        return Err(EpcError::RemittanceConflict);
    }

    let amount = format!("EUR{}.{:02}", c.amount_cents / 100, c.amount_cents % 100);

    let lines = [
        "BCD",
        "001",
        "1",
        "SCT",
        c.bic.as_str(),
        c.name.as_str(),
        c.iban.as_str(),
        amount.as_str(),
        c.purpose.as_str(),
        c.remittance_reference.as_str(),
        c.remittance_text.as_str(),
        c.information.as_str(),
    ];

    Ok(lines.join("\n"))
}
