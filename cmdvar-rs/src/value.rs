//! Typed values stored in and produced by variable blocks.
//!
//! Every variable holds one of four shapes.  The store persists only
//! strings, numbers and sequences; a [`Value::UniqueSet`] is a transient
//! shape that is deduplicated and written back as a [`Value::Sequence`].
//!
//! Type inference for raw template tokens lives here too ([`infer`],
//! [`Value::from_raw`]) so the rules for "what is a number" and "what is a
//! collection" exist in exactly one place.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

// ── Scalar ────────────────────────────────────────────────────────────────────

/// One element of a [`Value::Sequence`] or [`Value::UniqueSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Number(f64),
}

impl Scalar {
    /// Classify a single collection element.
    pub fn from_raw(raw: &str) -> Self {
        let raw = raw.trim();
        if is_numeric(raw) {
            // is_numeric only admits what f64::from_str accepts.
            raw.parse().map(Scalar::Number).unwrap_or_else(|_| Scalar::String(raw.to_owned()))
        } else {
            Scalar::String(raw.to_owned())
        }
    }

    /// Interpret this element as a non-negative integer index.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Scalar::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as usize),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::String(s) => f.write_str(s),
            Scalar::Number(n) => write!(f, "{}", format_number(*n)),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_owned())
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::Number(n)
    }
}

// ── Datatype ──────────────────────────────────────────────────────────────────

/// The four datatypes a block or a stored entry can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Datatype {
    String,
    Number,
    Sequence,
    UniqueSet,
}

impl Datatype {
    /// Whether a block declared as `self` may operate on an entry stored as
    /// `stored`.  Sequence and UniqueSet are interchangeable; nothing else is.
    pub fn compatible_with(self, stored: Datatype) -> bool {
        self == stored || (self.is_collection() && stored.is_collection())
    }

    pub fn is_collection(self) -> bool {
        matches!(self, Datatype::Sequence | Datatype::UniqueSet)
    }

    /// Zero value used when a block fails without an explicit fallback.
    pub fn zero(self) -> Value {
        match self {
            Datatype::String => Value::String(String::new()),
            Datatype::Number => Value::Number(0.0),
            Datatype::Sequence => Value::Sequence(Vec::new()),
            Datatype::UniqueSet => Value::UniqueSet(Vec::new()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Datatype::String => "string",
            Datatype::Number => "number",
            Datatype::Sequence => "sequence",
            Datatype::UniqueSet => "set",
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Value ─────────────────────────────────────────────────────────────────────

/// A variable's value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Number(f64),
    Sequence(Vec<Scalar>),
    UniqueSet(Vec<Scalar>),
}

impl Default for Value {
    fn default() -> Self {
        Value::String(String::new())
    }
}

impl fmt::Display for Value {
    /// Collections render comma-joined with no padding (`a,b,c`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Sequence(items) | Value::UniqueSet(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl Value {
    /// Parse a raw template token into a typed value.
    pub fn from_raw(raw: &str) -> Self {
        let raw = raw.trim();
        match infer(raw) {
            Datatype::Sequence => Value::Sequence(split_items(&raw[1..raw.len() - 1])),
            Datatype::UniqueSet => {
                Value::UniqueSet(dedup(split_items(&raw[1..raw.len() - 1])))
            }
            Datatype::Number => raw
                .parse()
                .map(Value::Number)
                .unwrap_or_else(|_| Value::String(raw.to_owned())),
            Datatype::String => Value::String(raw.to_owned()),
        }
    }

    /// The datatype carried by this value's tag.
    pub fn datatype(&self) -> Datatype {
        match self {
            Value::String(_) => Datatype::String,
            Value::Number(_) => Datatype::Number,
            Value::Sequence(_) => Datatype::Sequence,
            Value::UniqueSet(_) => Datatype::UniqueSet,
        }
    }

    /// Borrow the elements of a collection value.
    pub fn items(&self) -> Option<&[Scalar]> {
        match self {
            Value::Sequence(items) | Value::UniqueSet(items) => Some(items),
            _ => None,
        }
    }

    /// Take the elements of a collection value.
    pub fn into_items(self) -> Option<Vec<Scalar>> {
        match self {
            Value::Sequence(items) | Value::UniqueSet(items) => Some(items),
            _ => None,
        }
    }

    /// The form the store persists: sets become deduplicated sequences.
    pub fn into_persisted(self) -> Value {
        match self {
            Value::UniqueSet(items) => Value::Sequence(dedup(items)),
            other => other,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

// ── Inference ─────────────────────────────────────────────────────────────────

fn numeric_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?[0-9]+(\.[0-9]+)?$").expect("static regex"))
}

/// Digits with an optional leading `-` and at most one decimal point.
/// `1,000` and `1e5` are not numbers.
pub fn is_numeric(raw: &str) -> bool {
    numeric_re().is_match(raw)
}

/// Classify a raw template token.
pub fn infer(raw: &str) -> Datatype {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('[') && raw.ends_with(']') {
        Datatype::Sequence
    } else if raw.len() >= 2 && raw.starts_with('(') && raw.ends_with(')') {
        Datatype::UniqueSet
    } else if is_numeric(raw) {
        Datatype::Number
    } else {
        Datatype::String
    }
}

fn split_items(inner: &str) -> Vec<Scalar> {
    if inner.trim().is_empty() {
        return Vec::new();
    }
    inner.split(',').map(Scalar::from_raw).collect()
}

/// Remove duplicates, keeping the first occurrence of each element.
pub fn dedup(items: Vec<Scalar>) -> Vec<Scalar> {
    let mut out: Vec<Scalar> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

/// Integral values print without a fraction (`6`, not `6.0`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".to_owned() } else { "-Infinity".to_owned() }
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        // -0 prints as 0
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
