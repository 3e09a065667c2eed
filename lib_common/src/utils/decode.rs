//! # Tolerant Scalar Decoding
//!
//! Helpers that coerce a `serde_json::Value` into a `bool` or an `i64`
//! without failing. A value that cannot be interpreted decodes to `false`
//! or `0` and the miss is logged at debug level together with the field
//! name, so a malformed field never aborts a whole parse.

use serde_json::Value;

/// Returns `true` for the textual spellings of an enabled flag.
///
/// Accepts `on`, `true`, `t`, `y`, `yes` and `1`, ignoring case and
/// surrounding whitespace. Everything else is `false`.
pub fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "on" | "true" | "t" | "y" | "yes" | "1"
    )
}

/// Parses an integer literal the way a config or feed writer would spell it.
///
/// Supports an optional sign and the `0x`/`0o`/`0b` radix prefixes.
/// Returns `None` when the text is not an integer.
pub fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let lower = digits.to_ascii_lowercase();
    let (radix, body) = if let Some(rest) = lower.strip_prefix("0x") {
        (16, rest.to_string())
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (8, rest.to_string())
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (2, rest.to_string())
    } else {
        (10, lower)
    };

    if body.is_empty() {
        return None;
    }
    let magnitude = i64::from_str_radix(&body, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Decodes `value` as a boolean.
///
/// - native booleans pass through
/// - numbers are `true` when non-zero
/// - strings go through [`parse_bool`]
/// - anything else (including a missing field) is `false`
pub fn bool_value(key: &str, value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => parse_bool(s),
        Some(Value::Null) | None => false,
        Some(other) => {
            log::debug!("cannot decode '{}' as bool: {}", key, other);
            false
        }
    }
}

/// Decodes `value` as a signed integer.
///
/// - integers pass through, floats are truncated toward zero
/// - booleans become `0`/`1`
/// - strings are parsed with [`parse_int`], falling back to a float parse
/// - anything else (including a missing field) is `0`
pub fn int_value(key: &str, value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                i
            } else {
                n.as_f64().map(|f| f as i64).unwrap_or(0)
            }
        }
        Some(Value::Bool(b)) => i64::from(*b),
        Some(Value::String(s)) => match parse_int(s) {
            Some(i) => i,
            None => match s.trim().parse::<f64>() {
                Ok(f) => f as i64,
                Err(_) => {
                    log::debug!("cannot decode '{}' as int: {:?}", key, s);
                    0
                }
            },
        },
        Some(Value::Null) | None => 0,
        Some(other) => {
            log::debug!("cannot decode '{}' as int: {}", key, other);
            0
        }
    }
}

/// Returns the string at `key`, or `None` when the field is missing or not a string.
pub fn str_value<'a>(object: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bools_accept_every_upstream_spelling() {
        assert!(bool_value("a", Some(&json!(true))));
        assert!(bool_value("a", Some(&json!(1))));
        assert!(bool_value("a", Some(&json!("Yes"))));
        assert!(bool_value("a", Some(&json!(" on "))));
        assert!(!bool_value("a", Some(&json!(0))));
        assert!(!bool_value("a", Some(&json!("nope"))));
        assert!(!bool_value("a", Some(&json!([1]))));
        assert!(!bool_value("a", None));
    }

    #[test]
    fn ints_accept_numbers_strings_and_bools() {
        assert_eq!(int_value("a", Some(&json!(42))), 42);
        assert_eq!(int_value("a", Some(&json!(7.9))), 7);
        assert_eq!(int_value("a", Some(&json!("-15"))), -15);
        assert_eq!(int_value("a", Some(&json!("0x1f"))), 31);
        assert_eq!(int_value("a", Some(&json!("12.5"))), 12);
        assert_eq!(int_value("a", Some(&json!(true))), 1);
        assert_eq!(int_value("a", Some(&json!("abc"))), 0);
        assert_eq!(int_value("a", Some(&json!({}))), 0);
        assert_eq!(int_value("a", None), 0);
    }

    #[test]
    fn parse_int_rejects_bare_prefixes() {
        assert_eq!(parse_int("0x"), None);
        assert_eq!(parse_int(""), None);
        assert_eq!(parse_int("+8"), Some(8));
    }
}
