/// Formats a decimal balance string for display: scientific notation below
/// 0.000001, `M` suffix above one million, otherwise at most six decimals
/// with trailing zeros removed.
pub fn format_balance(balance: &str) -> String {
    let balance = balance.trim();
    if balance.is_empty() || balance == "0" {
        return "0".to_string();
    }
    let Ok(num) = balance.parse::<f64>() else {
        return balance.to_string();
    };
    if num > 0.0 && num < 0.000001 {
        return format!("{:.3e}", num);
    }
    if num > 1_000_000.0 {
        return format!("{:.2}M", num / 1_000_000.0);
    }
    let formatted = format!("{:.6}", num);
    let trimmed = if formatted.contains('.') {
        formatted.trim_end_matches('0').trim_end_matches('.')
    } else {
        formatted.as_str()
    };
    if trimmed.is_empty() || trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_balance() {
        assert_eq!(format_balance(""), "0");
        assert_eq!(format_balance("0"), "0");
        assert_eq!(format_balance("0.0"), "0");
        assert_eq!(format_balance("1.0"), "1");
        assert_eq!(format_balance("0.996006981039903216"), "0.996007");
        assert_eq!(format_balance("1234.5000"), "1234.5");
        assert_eq!(format_balance("2500000"), "2.50M");
        assert_eq!(format_balance("0.0000001234"), "1.234e-7");
        assert_eq!(format_balance("n/a"), "n/a");
    }
}
