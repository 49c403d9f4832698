//! EUR amount parsing.
//!
//! Accepts several input profiles (`eur_dot`, `eur_comma`, grouped variants,
//! auto-detection) and yields integer cents. An optional process-wide lenient
//! mode additionally tolerates OCR digit confusion and glued free text.

use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::validate::Error;

static RE_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,12}([.,]\d{1,2})?$").expect("valid regex"));
static RE_EUR_DOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,12}(\.\d{1,2})?$").expect("valid regex"));
static RE_EUR_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,12}(,\d{1,2})?$").expect("valid regex"));
static RE_EUR_GROUPED_SPACE_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}( \d{3})*(,\d{1,2})?$").expect("valid regex"));
static RE_EUR_GROUPED_DOT_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(\.\d{3})*(,\d{1,2})?$").expect("valid regex"));

static AMOUNT_LENIENT_OCR: AtomicBool = AtomicBool::new(false);

/// Enables or disables lenient OCR amount parsing for the whole process.
/// Set once during startup; the parser reads it lock-free.
pub fn set_lenient_ocr(enabled: bool) {
    AMOUNT_LENIENT_OCR.store(enabled, Ordering::Relaxed);
}

pub fn lenient_ocr() -> bool {
    AMOUNT_LENIENT_OCR.load(Ordering::Relaxed)
}

/// Parses an EUR amount string into integer cents under the given format
/// profile. An empty profile means auto-detection.
pub fn parse_amount_eur(s: &str, amount_format: &str) -> Result<i64, Error> {
    let v = s.trim();
    if v.is_empty() {
        return Err(Error::AmountRequired);
    }
    let format = amount_format.trim().to_lowercase();

    let (normalized, currency) = match format.as_str() {
        "" | "auto" => {
            if lenient_ocr() {
                normalize_input_lenient(v)?
            } else {
                normalize_input(v)?
            }
        }
        "auto_eur_lenient" => {
            if !lenient_ocr() {
                return Err(Error::UnsupportedAmountFormat);
            }
            normalize_input_lenient(v)?
        }
        "eur_dot" | "eur_comma" | "eur_grouped_space_comma" | "eur_grouped_dot_comma" => {
            normalize_by_profile(v, &format)?
        }
        _ => return Err(Error::UnsupportedAmountFormat),
    };

    if !currency.is_empty() && currency != "EUR" {
        return Err(Error::UnsupportedCurrency(currency));
    }
    if !RE_AMOUNT.is_match(&normalized) {
        return Err(Error::InvalidAmount);
    }

    let normalized = normalized.replace(',', ".");
    let (whole, frac) = match normalized.split_once('.') {
        Some((w, f)) => (w, f),
        None => (normalized.as_str(), ""),
    };

    let frac = match frac.len() {
        0 => "00".to_string(),
        1 => format!("{frac}0"),
        _ => frac.to_string(),
    };

    let mut cents: i64 = 0;
    for c in whole.chars() {
        cents = cents * 10 + (c as i64 - '0' as i64);
    }
    cents *= 100;
    let fb = frac.as_bytes();
    cents += i64::from(fb[0] - b'0') * 10 + i64::from(fb[1] - b'0');
    Ok(cents)
}

fn normalize_by_profile(v: &str, format: &str) -> Result<(String, String), Error> {
    let (normalized, currency) = normalize_input(v)?;
    let normalized = normalized.trim().to_string();
    match format {
        "eur_dot" => {
            if !RE_EUR_DOT.is_match(&normalized) {
                return Err(Error::InvalidAmount);
            }
            Ok((normalized, currency))
        }
        "eur_comma" => {
            if !RE_EUR_COMMA.is_match(&normalized) {
                return Err(Error::InvalidAmount);
            }
            Ok((normalized, currency))
        }
        "eur_grouped_space_comma" => {
            if normalized.contains('.') {
                return Err(Error::InvalidAmount);
            }
            if normalized.contains(' ') {
                if !RE_EUR_GROUPED_SPACE_COMMA.is_match(&normalized) {
                    return Err(Error::InvalidAmount);
                }
            } else if !RE_EUR_COMMA.is_match(&normalized) {
                return Err(Error::InvalidAmount);
            }
            Ok((normalized.replace(' ', ""), currency))
        }
        "eur_grouped_dot_comma" => {
            if normalized.contains('.') {
                if !RE_EUR_GROUPED_DOT_COMMA.is_match(&normalized) {
                    return Err(Error::InvalidAmount);
                }
            } else if !RE_EUR_COMMA.is_match(&normalized) {
                return Err(Error::InvalidAmount);
            }
            Ok((normalized.replace('.', ""), currency))
        }
        _ => Err(Error::UnsupportedAmountFormat),
    }
}

fn normalize_input(v: &str) -> Result<(String, String), Error> {
    let upper = v.to_uppercase();
    let has_eur = upper.contains("EUR") || upper.contains("EURO") || v.contains('€');
    let has_usd = upper.contains("USD") || v.contains('$');
    if has_eur && has_usd {
        return Err(Error::InvalidAmount);
    }

    let mut currency = String::new();
    if has_eur {
        currency = "EUR".to_string();
    }
    if has_usd {
        currency = "USD".to_string();
    }

    let normalized = upper
        .replace("EURO", "")
        .replace("EUR", "")
        .replace("USD", "")
        .replace('€', "")
        .replace('$', "");
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

    if normalized.is_empty() {
        return Err(Error::InvalidAmount);
    }
    Ok((normalized, currency))
}

fn normalize_input_lenient(v: &str) -> Result<(String, String), Error> {
    let mapped = map_ocr_digits(v);
    let currency = detect_currency(&mapped);
    if !currency.is_empty() && currency != "EUR" {
        return Ok((String::new(), currency));
    }

    // Keep only digits and separators for amount reconstruction.
    let numeric: String = mapped
        .chars()
        .filter(|r| r.is_ascii_digit() || *r == '.' || *r == ',')
        .collect();
    if numeric.is_empty() {
        return Err(Error::InvalidAmount);
    }

    let normalized = normalize_numeric_separators(&numeric)?;
    Ok((normalized, currency))
}

fn map_ocr_digits(v: &str) -> String {
    let rs: Vec<char> = v.chars().collect();
    let mut out = String::with_capacity(rs.len());
    for (i, r) in rs.iter().enumerate() {
        match r {
            'O' | 'o' if has_numeric_neighbor(&rs, i) => out.push('0'),
            'I' | 'l' if has_numeric_neighbor(&rs, i) => out.push('1'),
            _ => out.push(*r),
        }
    }
    out
}

fn has_numeric_neighbor(rs: &[char], i: usize) -> bool {
    let neighbors = [i.checked_sub(1), i.checked_add(1)];
    for j in neighbors.into_iter().flatten() {
        if let Some(r) = rs.get(j) {
            if r.is_ascii_digit() || *r == '.' || *r == ',' || r.is_whitespace() {
                return true;
            }
        }
    }
    false
}

fn detect_currency(v: &str) -> String {
    let upper = v.to_uppercase();
    let has = |s: &str| upper.contains(s);

    if v.contains('€') || has("EUR") || has("EURO") {
        if v.contains('$') || has("USD") || has("US$") {
            return "USD".to_string();
        }
        return "EUR".to_string();
    }
    if v.contains('$') || has("USD") || has("US$") {
        return "USD".to_string();
    }
    if v.contains('£') || has("GBP") {
        return "GBP".to_string();
    }
    if v.contains('¥') || has("JPY") {
        return "JPY".to_string();
    }
    if has("CHF") {
        return "CHF".to_string();
    }
    String::new()
}

/// Picks one decimal separator out of a digits-and-separators string and
/// drops the rest as grouping noise.
fn normalize_numeric_separators(v: &str) -> Result<String, Error> {
    if !v.contains('.') && !v.contains(',') {
        return Ok(v.to_string());
    }

    let last_dot = v.rfind('.');
    let last_comma = v.rfind(',');

    // The rightmost separator wins; a lone separator is only decimal when at
    // most two digits follow it.
    let (dec_sep, dec_pos) = match (last_dot, last_comma) {
        (Some(d), Some(c)) => {
            if d > c {
                ('.', Some(d))
            } else {
                (',', Some(c))
            }
        }
        (Some(d), None) if v.len() - d - 1 <= 2 => ('.', Some(d)),
        (None, Some(c)) if v.len() - c - 1 <= 2 => (',', Some(c)),
        _ => ('\0', None),
    };

    let mut out = String::with_capacity(v.len());
    for (i, r) in v.char_indices() {
        if r.is_ascii_digit() {
            out.push(r);
            continue;
        }
        if (r == '.' || r == ',') && Some(i) == dec_pos && r == dec_sep {
            out.push('.');
        }
    }

    let mut n = out;
    if n.is_empty() || n == "." {
        return Err(Error::InvalidAmount);
    }
    if n.starts_with('.') {
        n.insert(0, '0');
    }
    if n.ends_with('.') {
        n.pop();
    }
    if n.matches('.').count() > 1 {
        return Err(Error::InvalidAmount);
    }

    let (whole, frac) = match n.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (n.as_str(), None),
    };
    if whole.is_empty() {
        return Err(Error::InvalidAmount);
    }
    if let Some(f) = frac {
        if f.is_empty() || f.len() > 2 {
            return Err(Error::InvalidAmount);
        }
    }
    Ok(n)
}
