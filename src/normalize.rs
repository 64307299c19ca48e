//! Locale-formatted price text to whole currency units.
//!
//! Listings are priced in es-ES format: `.` groups thousands, `,` starts the
//! cents. Cents are dropped, never rounded.
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("empty price text")]
    Empty,
    #[error("price text {0:?} has no leading digits")]
    NotNumeric(String),
    #[error("price text {0:?} does not fit an integer")]
    Overflow(String),
}

const DECIMAL_SEPARATOR: char = ',';
const THOUSANDS_SEPARATOR: char = '.';
const CURRENCY_GLYPH: char = '€';

fn is_noise(c: char) -> bool {
    c == CURRENCY_GLYPH || c == '\u{00a0}' || c == '\u{202f}' || c == ' '
}

pub fn normalize(raw_price: &str) -> Result<i64, FormatError> {
    let cleaned: String = raw_price.trim().chars().filter(|c| !is_noise(*c)).collect();
    if cleaned.is_empty() {
        return Err(FormatError::Empty);
    }

    let units = cleaned
        .split(DECIMAL_SEPARATOR)
        .next()
        .unwrap_or_default()
        .replace(THOUSANDS_SEPARATOR, "");
    if units.is_empty() || !units.chars().all(|c| c.is_ascii_digit()) {
        return Err(FormatError::NotNumeric(raw_price.to_string()));
    }

    units
        .parse::<i64>()
        .map_err(|_| FormatError::Overflow(raw_price.to_string()))
}
