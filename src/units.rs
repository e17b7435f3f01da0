/// Conversions between human-readable token amounts and atomic units.
///
/// Parsing goes through [`rust_decimal::Decimal`] for validation, then scales
/// the mantissa in `u128` so 18-decimal tokens never lose precision.
/// There is no `f64` path.
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::errors::CdpError;

/// Decimals of the native EVM token.
pub const ETHER_DECIMALS: u32 = 18;

/// Parse `"1.5"` with 6 decimals into `1_500_000`.
pub fn parse_units(value: &str, decimals: u32) -> Result<u128, CdpError> {
    let trimmed = value.trim();
    let d = Decimal::from_str(trimmed)
        .map_err(|e| CdpError::UserInputValidation(format!("Invalid amount '{value}': {e}")))?;
    if d.is_sign_negative() && !d.is_zero() {
        return Err(CdpError::UserInputValidation(format!(
            "Amount cannot be negative: {value}"
        )));
    }

    let d = d.normalize();
    let scale = d.scale();
    if scale > decimals {
        return Err(CdpError::UserInputValidation(format!(
            "Amount {value} has more than {decimals} decimal places"
        )));
    }

    let mantissa = d.mantissa().unsigned_abs();
    10u128
        .checked_pow(decimals - scale)
        .and_then(|factor| mantissa.checked_mul(factor))
        .ok_or_else(|| CdpError::UserInputValidation(format!("Amount {value} is too large")))
}

/// Parse an ether amount into wei.
pub fn parse_ether(value: &str) -> Result<u128, CdpError> {
    parse_units(value, ETHER_DECIMALS)
}

/// Format atomic units as a decimal string without trailing zeros.
pub fn format_units(amount: u128, decimals: u32) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let digits = amount.to_string();
    let width = decimals as usize;
    let padded = if digits.len() <= width {
        format!("{}{}", "0".repeat(width + 1 - digits.len()), digits)
    } else {
        digits
    };
    let (whole, fraction) = padded.split_at(padded.len() - width);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{fraction}")
    }
}

/// Format wei as ether.
pub fn format_ether(amount: u128) -> String {
    format_units(amount, ETHER_DECIMALS)
}

/// Parse an atomic amount as returned by the API (a decimal integer string).
pub fn parse_atomic(value: &str) -> Result<u128, CdpError> {
    value
        .trim()
        .parse::<u128>()
        .map_err(|e| CdpError::UserInputValidation(format!("Invalid atomic amount '{value}': {e}")))
}
