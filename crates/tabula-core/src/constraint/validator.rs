//! Property validators.
//!
//! Validators are declared as [`Validator`] values and compiled once when the
//! schema is registered, so setting a value never resolves anything by name.

use regex::Regex;
use tabula_proto::Value;

/// Signature of a custom validator.
///
/// Returns `Err(None)` for a plain rejection or `Err(Some(message))` to attach
/// a sub-message.
pub type CustomCheck = fn(&Value) -> Result<(), Option<String>>;

/// Hex color pattern: `#rgb` or `#rrggbb`.
const HEX_COLOR_PATTERN: &str = r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$";

/// A declared validator.
#[derive(Debug, Clone)]
pub enum Validator {
    /// String length (in characters) must not exceed the bound.
    MaxLength(usize),
    /// The value's text must match the regular expression.
    Pattern(String),
    /// The value must be a hex color.
    HexColor,
    /// The value must equal one of the listed values.
    OneOf(Vec<Value>),
    /// The numeric value must lie within the bounds (inclusive).
    Range { min: Option<f64>, max: Option<f64> },
    /// Arbitrary check.
    Custom(CustomCheck),
}

impl Validator {
    /// Compile the validator.
    pub fn compile(self) -> Result<CompiledValidator, regex::Error> {
        Ok(match self {
            Validator::MaxLength(max) => CompiledValidator::MaxLength(max),
            Validator::Pattern(pattern) => CompiledValidator::Pattern(Regex::new(&pattern)?),
            Validator::HexColor => CompiledValidator::Pattern(Regex::new(HEX_COLOR_PATTERN)?),
            Validator::OneOf(values) => CompiledValidator::OneOf(values),
            Validator::Range { min, max } => CompiledValidator::Range { min, max },
            Validator::Custom(check) => CompiledValidator::Custom(check),
        })
    }
}

/// A validator ready to run.
#[derive(Debug, Clone)]
pub enum CompiledValidator {
    MaxLength(usize),
    Pattern(Regex),
    OneOf(Vec<Value>),
    Range { min: Option<f64>, max: Option<f64> },
    Custom(CustomCheck),
}

impl CompiledValidator {
    /// Check a value. The error carries an optional sub-message.
    pub fn check(&self, value: &Value) -> Result<(), Option<String>> {
        match self {
            CompiledValidator::MaxLength(max) => {
                let len = value.to_string().chars().count();
                if len > *max {
                    return Err(Some(format!("longer than {} characters", max)));
                }
                Ok(())
            }
            CompiledValidator::Pattern(regex) => {
                if regex.is_match(&value.to_string()) {
                    Ok(())
                } else {
                    Err(Some(format!("does not match {}", regex.as_str())))
                }
            }
            CompiledValidator::OneOf(allowed) => {
                if allowed.iter().any(|a| a.loose_eq(value)) {
                    Ok(())
                } else {
                    Err(None)
                }
            }
            CompiledValidator::Range { min, max } => {
                let n = value
                    .as_f64()
                    .ok_or_else(|| Some("not a number".to_string()))?;
                if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                    return Err(Some("out of range".to_string()));
                }
                Ok(())
            }
            CompiledValidator::Custom(check) => check(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled(v: Validator) -> CompiledValidator {
        v.compile().unwrap()
    }

    #[test]
    fn test_hex_color() {
        let v = compiled(Validator::HexColor);
        assert!(v.check(&Value::from("#a0b1c2")).is_ok());
        assert!(v.check(&Value::from("#fff")).is_ok());
        assert!(v.check(&Value::from("a0b1c2")).is_err());
        assert!(v.check(&Value::from("#ggg")).is_err());
    }

    #[test]
    fn test_pattern() {
        let v = compiled(Validator::Pattern(r"^[^@\s]+@[^@\s]+$".into()));
        assert!(v.check(&Value::from("ada@example.com")).is_ok());
        assert!(v.check(&Value::from("not an email")).is_err());
    }

    #[test]
    fn test_one_of_and_range() {
        let v = compiled(Validator::OneOf(vec!["draft".into(), "live".into()]));
        assert!(v.check(&Value::from("live")).is_ok());
        assert_eq!(v.check(&Value::from("gone")), Err(None));

        let v = compiled(Validator::Range {
            min: Some(1.0),
            max: Some(5.0),
        });
        assert!(v.check(&Value::Int(3)).is_ok());
        assert!(v.check(&Value::Double(5.5)).is_err());
        assert!(v.check(&Value::from("x")).is_err());
    }

    #[test]
    fn test_custom() {
        fn even(value: &Value) -> Result<(), Option<String>> {
            match value.as_i64() {
                Some(n) if n % 2 == 0 => Ok(()),
                _ => Err(Some("must be even".into())),
            }
        }

        let v = compiled(Validator::Custom(even));
        assert!(v.check(&Value::Int(4)).is_ok());
        assert_eq!(v.check(&Value::Int(3)), Err(Some("must be even".into())));
    }

    #[test]
    fn test_max_length_counts_chars() {
        let v = compiled(Validator::MaxLength(3));
        assert!(v.check(&Value::from("äöü")).is_ok());
        assert!(v.check(&Value::from("abcd")).is_err());
    }
}
