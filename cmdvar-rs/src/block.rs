//! Variable blocks: the `{name<op>value|fallback}` unit of the macro language.
//!
//! | Form              | Operator                 |
//! |-------------------|--------------------------|
//! | `{name}`          | [`Operator::Reference`]  |
//! | `{name=value}`    | [`Operator::Assign`]     |
//! | `{name+value}`    | [`Operator::Add`]        |
//! | `{name-value}`    | [`Operator::Subtract`]   |
//! | `{name++}`        | [`Operator::Increment`]  |
//! | `{name--}`        | [`Operator::Decrement`]  |
//!
//! Any form may end with `|fallback`.  `{name=null}` deletes the variable.

use std::fmt;

use crate::value::{Datatype, Value};

/// Literal assign value that deletes a variable.
pub const NULL_SENTINEL: &str = "null";

// ── Operator ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Assign,
    Add,
    Subtract,
    Increment,
    Decrement,
    Reference,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Assign => "=",
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Increment => "++",
            Operator::Decrement => "--",
            Operator::Reference => "*",
        }
    }

    /// Whether the operator moves a numeric value downwards.
    pub fn is_negative(self) -> bool {
        matches!(self, Operator::Subtract | Operator::Decrement)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ── VariableBlock ─────────────────────────────────────────────────────────────

/// One parsed `{…}` occurrence.
///
/// Built fresh for every match, handed to the pre-lookup middleware chain,
/// resolved in place by [`crate::eval::resolve`], then discarded once its
/// [`output`](VariableBlock::output) has been substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableBlock {
    /// Store key, whitespace-normalized.
    pub name: String,
    pub operator: Operator,
    /// Right-hand operand.  `Number(1)` for `++`/`--`.
    pub value: Value,
    /// Raw right-hand text as written, before inference.
    pub raw_value: String,
    pub datatype: Datatype,
    pub fallback: Option<Value>,
    /// Set once the block has been resolved.
    pub output: Option<Value>,
}

impl VariableBlock {
    /// Parse the text between `{` and `}`.
    ///
    /// Returns `None` when there is no usable name (`{}`, `{=x}`), in which
    /// case the braces are left in the output untouched.
    pub fn parse(inner: &str) -> Option<Self> {
        let (body, fallback) = match inner.split_once('|') {
            Some((body, fb)) => (body, Some(Value::from_raw(fb))),
            None => (inner, None),
        };

        let (name, operator, raw_value) = match body.find(['=', '+', '-']) {
            None => (body, Operator::Reference, ""),
            Some(i) => {
                let (name, rest) = body.split_at(i);
                if rest.trim_end() == "++" {
                    (name, Operator::Increment, "")
                } else if rest.trim_end() == "--" {
                    (name, Operator::Decrement, "")
                } else {
                    let op = match rest.as_bytes()[0] {
                        b'=' => Operator::Assign,
                        b'+' => Operator::Add,
                        _ => Operator::Subtract,
                    };
                    (name, op, &rest[1..])
                }
            }
        };

        let name = normalize_name(name);
        if name.is_empty() {
            return None;
        }

        let mut block = VariableBlock {
            name,
            operator,
            value: Value::default(),
            raw_value: String::new(),
            datatype: Datatype::String,
            fallback,
            output: None,
        };
        match operator {
            Operator::Increment | Operator::Decrement => {
                block.raw_value = "1".to_owned();
                block.value = Value::Number(1.0);
                block.datatype = Datatype::Number;
            }
            _ => block.set_value(raw_value),
        }
        Some(block)
    }

    /// Replace the operand, re-running type inference.
    pub fn set_value(&mut self, raw: &str) {
        self.raw_value = raw.trim().to_owned();
        self.value = Value::from_raw(&self.raw_value);
        self.datatype = self.value.datatype();
    }

    /// Rename the target variable.
    pub fn set_name(&mut self, name: &str) {
        self.name = normalize_name(name);
    }

    /// `{name=null}`
    pub fn is_delete(&self) -> bool {
        self.operator == Operator::Assign && self.raw_value == NULL_SENTINEL
    }

    /// Value to substitute when resolution fails.
    pub fn fallback_or_zero(&self) -> Value {
        self.fallback.clone().unwrap_or_else(|| self.datatype.zero())
    }
}

/// Trim and turn inner whitespace runs into `_`.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join("_")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> VariableBlock {
        VariableBlock::parse(s).expect("block should parse")
    }

    #[test]
    fn reference() {
        let b = parse("counter");
        assert_eq!(b.name, "counter");
        assert_eq!(b.operator, Operator::Reference);
        assert_eq!(b.fallback, None);
    }

    #[test]
    fn assign_string() {
        let b = parse("stringVAR=test");
        assert_eq!(b.operator, Operator::Assign);
        assert_eq!(b.value, Value::String("test".into()));
        assert_eq!(b.datatype, Datatype::String);
    }

    #[test]
    fn add_and_subtract_numbers() {
        let b = parse("n+2");
        assert_eq!((b.operator, b.value), (Operator::Add, Value::Number(2.0)));
        let b = parse("n-2.5");
        assert_eq!((b.operator, b.value), (Operator::Subtract, Value::Number(2.5)));
    }

    #[test]
    fn increment_decrement() {
        let b = parse("hits++");
        assert_eq!(b.operator, Operator::Increment);
        assert_eq!(b.datatype, Datatype::Number);
        let b = parse("hits--");
        assert_eq!(b.operator, Operator::Decrement);
        assert_eq!(b.value, Value::Number(1.0));
    }

    #[test]
    fn fallback_is_typed() {
        let b = parse("n+1|7");
        assert_eq!(b.fallback, Some(Value::Number(7.0)));
        let b = parse("who|nobody");
        assert_eq!(b.operator, Operator::Reference);
        assert_eq!(b.fallback, Some(Value::String("nobody".into())));
    }

    #[test]
    fn spaces_in_name_become_underscores() {
        let b = parse(" my  fav thing =pie");
        assert_eq!(b.name, "my_fav_thing");
        assert_eq!(b.value, Value::String("pie".into()));
    }

    #[test]
    fn null_deletes() {
        assert!(parse("v=null").is_delete());
        assert!(!parse("v=nullx").is_delete());
        assert!(!parse("v+null").is_delete());
    }

    #[test]
    fn negative_assign_is_a_number() {
        let b = parse("v=-3");
        assert_eq!(b.operator, Operator::Assign);
        assert_eq!(b.value, Value::Number(-3.0));
    }

    #[test]
    fn empty_name_is_not_a_block() {
        assert!(VariableBlock::parse("").is_none());
        assert!(VariableBlock::parse("   ").is_none());
        assert!(VariableBlock::parse("=x").is_none());
    }

    #[test]
    fn set_value_reinfers() {
        let mut b = parse("v=abc");
        b.set_value("[1,2]");
        assert_eq!(b.datatype, Datatype::Sequence);
    }
}
