//! Runtime values for sandboxed expressions.
//!
//! Coercions follow the loose conventions chat-command authors expect from
//! script snippets: `+` concatenates when either side is a string, the other
//! arithmetic operators coerce to numbers, and comparisons between two
//! strings are lexicographic.

use std::cmp::Ordering;
use std::fmt;

use crate::error::SandboxError;
use crate::value::format_number;

/// Upper bound on any string the sandbox builds, in characters.
pub const MAX_STRING_CHARS: usize = 10_000;

/// Fail if `s` is longer than [`MAX_STRING_CHARS`].
pub fn check_len(s: &str, what: &str) -> Result<(), SandboxError> {
    // Byte length bounds the char count from above.
    if s.len() > MAX_STRING_CHARS && s.chars().count() > MAX_STRING_CHARS {
        return Err(SandboxError::Eval(format!(
            "{what}: result longer than {MAX_STRING_CHARS} characters"
        )));
    }
    Ok(())
}

/// [`check_len`], then wrap `s`.
pub fn bounded_str(s: String, what: &str) -> Result<ScriptValue, SandboxError> {
    check_len(&s, what)?;
    Ok(ScriptValue::Str(s))
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
}

impl Default for ScriptValue {
    fn default() -> Self {
        ScriptValue::Undefined
    }
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::Undefined => f.write_str("undefined"),
            ScriptValue::Null => f.write_str("null"),
            ScriptValue::Bool(b) => write!(f, "{b}"),
            ScriptValue::Num(n) => f.write_str(&format_number(*n)),
            ScriptValue::Str(s) => f.write_str(s),
        }
    }
}

impl ScriptValue {
    /// `false`, `0`, `NaN`, `""`, `null` and `undefined` are falsy.
    pub fn as_bool(&self) -> bool {
        match self {
            ScriptValue::Undefined | ScriptValue::Null => false,
            ScriptValue::Bool(b) => *b,
            ScriptValue::Num(n) => *n != 0.0 && !n.is_nan(),
            ScriptValue::Str(s) => !s.is_empty(),
        }
    }

    /// Numeric coercion; unparseable strings give `NaN`.
    pub fn as_number(&self) -> f64 {
        match self {
            ScriptValue::Undefined => f64::NAN,
            ScriptValue::Null => 0.0,
            ScriptValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            ScriptValue::Num(n) => *n,
            ScriptValue::Str(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse().unwrap_or(f64::NAN)
                }
            }
        }
    }

    /// Text substituted into the template.  `undefined` renders as nothing.
    pub fn into_output(self) -> String {
        match self {
            ScriptValue::Undefined => String::new(),
            ScriptValue::Str(s) => s,
            other => other.to_string(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Undefined => "undefined",
            ScriptValue::Null => "object",
            ScriptValue::Bool(_) => "boolean",
            ScriptValue::Num(_) => "number",
            ScriptValue::Str(_) => "string",
        }
    }

    // ── Operators ─────────────────────────────────────────────────────────────

    /// Fails once a concatenation would exceed [`MAX_STRING_CHARS`].
    pub fn add(&self, rhs: &ScriptValue) -> Result<ScriptValue, SandboxError> {
        match (self, rhs) {
            (ScriptValue::Str(_), _) | (_, ScriptValue::Str(_)) => {
                bounded_str(format!("{self}{rhs}"), "string concatenation")
            }
            (a, b) => Ok(ScriptValue::Num(a.as_number() + b.as_number())),
        }
    }

    pub fn sub(&self, rhs: &ScriptValue) -> ScriptValue {
        ScriptValue::Num(self.as_number() - rhs.as_number())
    }

    pub fn mul(&self, rhs: &ScriptValue) -> ScriptValue {
        ScriptValue::Num(self.as_number() * rhs.as_number())
    }

    pub fn div(&self, rhs: &ScriptValue) -> ScriptValue {
        ScriptValue::Num(self.as_number() / rhs.as_number())
    }

    pub fn rem(&self, rhs: &ScriptValue) -> ScriptValue {
        ScriptValue::Num(self.as_number() % rhs.as_number())
    }

    pub fn neg(&self) -> ScriptValue {
        ScriptValue::Num(-self.as_number())
    }

    /// `===`
    pub fn strict_eq(&self, rhs: &ScriptValue) -> bool {
        match (self, rhs) {
            (ScriptValue::Num(a), ScriptValue::Num(b)) => a == b,
            (a, b) => a == b,
        }
    }

    /// `==`: `null == undefined`, otherwise numbers and strings compare
    /// after numeric coercion when the types differ.
    pub fn loose_eq(&self, rhs: &ScriptValue) -> bool {
        use ScriptValue::*;
        match (self, rhs) {
            (Undefined | Null, Undefined | Null) => true,
            (Undefined | Null, _) | (_, Undefined | Null) => false,
            (Str(a), Str(b)) => a == b,
            (a, b) => a.as_number() == b.as_number(),
        }
    }

    /// Relational comparison; `None` when either side is `NaN`.
    pub fn compare(&self, rhs: &ScriptValue) -> Option<Ordering> {
        match (self, rhs) {
            (ScriptValue::Str(a), ScriptValue::Str(b)) => Some(a.cmp(b)),
            (a, b) => a.as_number().partial_cmp(&b.as_number()),
        }
    }
}

impl From<f64> for ScriptValue {
    fn from(n: f64) -> Self {
        ScriptValue::Num(n)
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        ScriptValue::Str(s.to_owned())
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        ScriptValue::Str(s)
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        ScriptValue::Bool(b)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(ScriptValue::Num(42.0).to_string(), "42");
        assert_eq!(ScriptValue::Num(0.5).to_string(), "0.5");
        assert_eq!(ScriptValue::Bool(true).to_string(), "true");
        assert_eq!(ScriptValue::Undefined.to_string(), "undefined");
    }

    #[test]
    fn truthiness() {
        assert!(ScriptValue::from("x").as_bool());
        assert!(!ScriptValue::from("").as_bool());
        assert!(!ScriptValue::Num(0.0).as_bool());
        assert!(!ScriptValue::Num(f64::NAN).as_bool());
        assert!(!ScriptValue::Null.as_bool());
    }

    #[test]
    fn plus_concatenates_with_strings() {
        let a = ScriptValue::from("n=");
        assert_eq!(a.add(&ScriptValue::Num(3.0)), Ok(ScriptValue::from("n=3")));
        assert_eq!(
            ScriptValue::Num(1.0).add(&ScriptValue::Num(2.0)),
            Ok(ScriptValue::Num(3.0))
        );
    }

    #[test]
    fn concatenation_is_capped() {
        let half = ScriptValue::from("x".repeat(MAX_STRING_CHARS / 2));
        let full = half.add(&half).unwrap();
        assert_eq!(full.to_string().chars().count(), MAX_STRING_CHARS);
        assert!(matches!(full.add(&ScriptValue::from("x")), Err(SandboxError::Eval(_))));
        // Multi-byte text is measured in characters.
        let wide = ScriptValue::from("é".repeat(MAX_STRING_CHARS / 2));
        assert!(wide.add(&wide).is_ok());
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(ScriptValue::from(" 12 ").as_number(), 12.0);
        assert!(ScriptValue::from("abc").as_number().is_nan());
        assert_eq!(ScriptValue::from("6").mul(&ScriptValue::from("7")), ScriptValue::Num(42.0));
    }

    #[test]
    fn equality() {
        assert!(ScriptValue::from("1").loose_eq(&ScriptValue::Num(1.0)));
        assert!(!ScriptValue::from("1").strict_eq(&ScriptValue::Num(1.0)));
        assert!(ScriptValue::Null.loose_eq(&ScriptValue::Undefined));
        assert!(!ScriptValue::Num(f64::NAN).strict_eq(&ScriptValue::Num(f64::NAN)));
    }

    #[test]
    fn compare() {
        assert_eq!(
            ScriptValue::from("a").compare(&ScriptValue::from("b")),
            Some(Ordering::Less)
        );
        assert_eq!(ScriptValue::Num(2.0).compare(&ScriptValue::from("10")), Some(Ordering::Less));
        assert_eq!(ScriptValue::Num(f64::NAN).compare(&ScriptValue::Num(1.0)), None);
    }
}
