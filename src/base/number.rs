//! Locale-independent number parsing and formatting.
//!
//! CIF numbers must parse and print the same way regardless of the process
//! locale. Rust's `FromStr`/`Display` for the primitive types already are
//! locale-independent; the functions here bolt the CIF numeric grammar on
//! top so that values accepted by `FromStr` but not by CIF, like `inf`,
//! `NaN`, or `0x10`, are rejected.

/// Accepts `[+-]?digits`.
pub fn is_int(s: &str) -> bool {
    let rest = s.strip_prefix(['+', '-']).unwrap_or(s);
    !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())
}

/// Accepts `[+-]? ( digits [.digits?] | .digits ) ( [eE][+-]?digits )?`
/// with the extra requirement that a decimal point or exponent is present;
/// pure-integer forms classify as [`is_int`] instead.
pub fn is_float(s: &str) -> bool {
    let rest = s.strip_prefix(['+', '-']).unwrap_or(s);
    let bytes = rest.as_bytes();
    let mut i = 0;
    let mut digits_before = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        digits_before += 1;
        i += 1;
    }
    let mut saw_point = false;
    let mut digits_after = 0;
    if i < bytes.len() && bytes[i] == b'.' {
        saw_point = true;
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            digits_after += 1;
            i += 1;
        }
    }
    if digits_before + digits_after == 0 {
        return false;
    }
    let mut saw_exp = false;
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        saw_exp = true;
        i += 1;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        let exp_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return false;
        }
    }
    i == bytes.len() && (saw_point || saw_exp)
}

/// Parse a CIF integer. Rejects anything outside `[+-]?digits`.
pub fn parse_int(s: &str) -> Option<i64> {
    if is_int(s) { s.parse().ok() } else { None }
}

/// Parse a CIF number as `f64`. Accepts both integer and float forms.
pub fn parse_float(s: &str) -> Option<f64> {
    if is_int(s) || is_float(s) {
        s.parse().ok()
    } else {
        None
    }
}

/// General formatting: the shortest decimal representation that parses
/// back to the same `f64` (`Display` for `f64` guarantees round-tripping
/// for finite values).
pub fn format_float(value: f64) -> String {
    let s = format!("{value}");
    // Keep the output inside the CIF numeric grammar.
    if s.contains(['.', 'e', 'E']) || !value.is_finite() {
        s
    } else {
        format!("{s}.0")
    }
}

/// Fixed-precision formatting.
pub fn format_float_fixed(value: f64, precision: usize) -> String {
    format!("{value:.precision$}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1")]
    #[case("-12")]
    #[case("+3")]
    fn test_is_int(#[case] s: &str) {
        assert!(is_int(s), "{s} should be an int");
        assert!(!is_float(s), "{s} should not classify as float");
    }

    #[rstest]
    #[case("1.0")]
    #[case("-.2e11")]
    #[case("1.3e-10")]
    #[case("3.000000")]
    #[case("1e5")]
    #[case(".5")]
    fn test_is_float(#[case] s: &str) {
        assert!(is_float(s), "{s} should be a float");
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("-")]
    #[case("1.2.3")]
    #[case("1e")]
    #[case("0x10")]
    #[case("inf")]
    #[case("NaN")]
    #[case("aap")]
    fn test_not_numeric(#[case] s: &str) {
        assert!(!is_int(s));
        assert!(!is_float(s));
        assert!(parse_float(s).is_none());
    }

    #[test]
    fn test_parse_values() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int("1.0"), None);
        assert_eq!(parse_float("-.2e11"), Some(-0.2e11));
        assert_eq!(parse_float("1.3e-10"), Some(1.3e-10));
        assert_eq!(parse_float("3.000000"), Some(3.0));
    }

    #[test]
    fn test_format_round_trips() {
        for v in [0.1, -0.2e11, 1.3e-10, 3.0, 1234567.875] {
            let s = format_float(v);
            assert_eq!(parse_float(&s), Some(v), "{s} must round-trip");
        }
        assert_eq!(format_float(3.0), "3.0");
        assert_eq!(format_float_fixed(1.23456, 2), "1.23");
    }
}
