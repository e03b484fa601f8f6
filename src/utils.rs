// Shared validation and formatting helpers

use ethers::types::U256;

use crate::{
    constants::BALANCE_DISPLAY_DECIMALS,
    error::{AppError, Result},
};

/// Accepts exactly `0x` followed by 40 hex characters, case-insensitive.
pub fn is_valid_evm_address(address: &str) -> bool {
    match address.strip_prefix("0x") {
        Some(hex) => hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Rejects malformed addresses before any network call is made.
pub fn ensure_evm_address(address: &str) -> Result<()> {
    if is_valid_evm_address(address) {
        Ok(())
    } else {
        Err(AppError::BadRequest("Invalid address format".to_string()))
    }
}

/// Renders a base-unit balance as `raw / 10^decimals` with a fixed number of
/// fractional digits. Exact integer arithmetic; digits beyond the display
/// precision are truncated, not rounded.
pub fn format_base_units(raw: U256, decimals: u8) -> String {
    let scale = U256::exp10(decimals as usize);
    let whole = raw / scale;
    let frac = raw % scale;

    let mut frac_digits = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    if frac_digits.len() > BALANCE_DISPLAY_DECIMALS {
        frac_digits.truncate(BALANCE_DISPLAY_DECIMALS);
    } else {
        while frac_digits.len() < BALANCE_DISPLAY_DECIMALS {
            frac_digits.push('0');
        }
    }

    format!("{}.{}", whole, frac_digits)
}

/// Same as [`format_base_units`] for balances carried as decimal strings.
pub fn format_base_units_str(raw: &str, decimals: u8) -> Result<String> {
    let value = U256::from_dec_str(raw.trim())
        .map_err(|_| AppError::ProviderData(format!("Balance is not a base-unit integer: {raw}")))?;
    Ok(format_base_units(value, decimals))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_canonical_addresses() {
        assert!(is_valid_evm_address(
            "0xd8da6bf26964af9d7eed9e03e53415d37aa96045"
        ));
        assert!(is_valid_evm_address(
            "0xD8DA6BF26964AF9D7EED9E03E53415D37AA96045"
        ));
    }

    #[test]
    fn rejects_everything_else() {
        assert!(!is_valid_evm_address("0xd8da6bf2"));
        assert!(!is_valid_evm_address("d8da6bf26964af9d7eed9e03e53415d37aa96045"));
        assert!(!is_valid_evm_address(
            "0xg8da6bf26964af9d7eed9e03e53415d37aa96045"
        ));
        assert!(!is_valid_evm_address(
            "0xd8da6bf26964af9d7eed9e03e53415d37aa960450"
        ));
        assert!(!is_valid_evm_address(""));
    }

    #[test]
    fn formats_six_decimal_token_balances() {
        let formatted = format_base_units_str("1500000", 6).unwrap();
        assert_eq!(formatted, "1.500000");
    }

    #[test]
    fn truncates_eighteen_decimal_balances_to_display_precision() {
        let formatted = format_base_units_str("1234567890123456789", 18).unwrap();
        assert_eq!(formatted, "1.234567");
    }

    #[test]
    fn pads_low_decimal_balances() {
        assert_eq!(format_base_units(U256::from(150u64), 2), "1.500000");
        assert_eq!(format_base_units(U256::from(7u64), 0), "7.000000");
    }

    #[test]
    fn zero_balance_formats_cleanly() {
        assert_eq!(format_base_units(U256::zero(), 18), "0.000000");
    }

    #[test]
    fn rejects_non_integer_balance_strings() {
        assert!(format_base_units_str("1.5", 6).is_err());
        assert!(format_base_units_str("abc", 6).is_err());
    }
}
