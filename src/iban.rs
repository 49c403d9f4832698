use once_cell::sync::Lazy;
use regex::Regex;

static RE_BIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{4}[A-Z]{2}[A-Z0-9]{2}([A-Z0-9]{3})?$").expect("valid regex"));

/// Mod-97 IBAN check. Expects the input already uppercased and stripped of
/// spaces; anything outside `[A-Z0-9]` or 15..=34 chars fails.
pub fn valid_iban(iban: &str) -> bool {
    if iban.len() < 15 || iban.len() > 34 {
        return false;
    }
    if !iban
        .bytes()
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    {
        return false;
    }

    // Move the first 4 chars to the end, then map letters to two-digit
    // numbers (A=10..Z=35) and fold mod 97 digit by digit.
    let rearranged = iban.bytes().skip(4).chain(iban.bytes().take(4));

    let mut rem: u32 = 0;
    for b in rearranged {
        if b.is_ascii_digit() {
            rem = (rem * 10 + u32::from(b - b'0')) % 97;
        } else {
            let val = u32::from(b - b'A') + 10;
            rem = (rem * 10 + val / 10) % 97;
            rem = (rem * 10 + val % 10) % 97;
        }
    }

    rem == 1
}

/// BIC syntax check (8 or 11 characters, uppercased input).
pub fn valid_bic(bic: &str) -> bool {
    RE_BIC.is_match(bic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_ibans() {
        for iban in [
            "DE12500105170648489890",
            "GB82WEST12345698765432",
            "FR1420041010050500013M02606",
            "NL91ABNA0417164300",
        ] {
            assert!(valid_iban(iban), "{iban}");
        }
    }

    #[test]
    fn rejects_malformed_ibans() {
        assert!(!valid_iban(""));
        assert!(!valid_iban("DE125001"));
        assert!(!valid_iban("de12500105170648489890"));
        assert!(!valid_iban("DE1250010517064848989O"));
        assert!(!valid_iban(&"D".repeat(35)));
    }

    #[test]
    fn single_char_mutation_flips_check() {
        let iban = "DE12500105170648489890";
        assert!(valid_iban(iban));
        // Bump each digit by one; the mod-97 check must catch every one.
        for i in 0..iban.len() {
            let bytes = iban.as_bytes();
            let b = bytes[i];
            if !b.is_ascii_digit() {
                continue;
            }
            let mut mutated = bytes.to_vec();
            mutated[i] = if b == b'9' { b'0' } else { b + 1 };
            let mutated = String::from_utf8(mutated).unwrap();
            assert!(!valid_iban(&mutated), "mutation at {i} slipped through");
        }
    }

    #[test]
    fn bic_syntax() {
        assert!(valid_bic("INGDDEFFXXX"));
        assert!(valid_bic("INGDDEFF"));
        assert!(!valid_bic("ingddeff"));
        assert!(!valid_bic("INGDDEFFXX"));
        assert!(!valid_bic("1NGDDEFF"));
        assert!(!valid_bic(""));
    }
}
