//! Operator evaluation against the store.
//!
//! [`apply`] performs one block's read-modify-write and reports value
//! failures as [`ResolveError`]; [`resolve`] wraps it with fallback handling
//! so that only store failures escape.

use crate::block::{Operator, VariableBlock};
use crate::error::{ResolveError, StoreError};
use crate::store::{variable_path, Store};
use crate::value::{dedup, Datatype, Scalar, Value};

/// Resolve `block` in place, setting [`VariableBlock::output`].
///
/// Value failures (type mismatch, unsupported operator, malformed operand)
/// substitute the fallback and leave the store untouched.  Store failures
/// propagate.
pub async fn resolve(
    block: &mut VariableBlock,
    store: &dyn Store,
    prefix: &str,
) -> Result<(), StoreError> {
    let output = match apply(block, store, prefix).await {
        Ok(v) => v,
        Err(ResolveError::Store(e)) => return Err(e),
        Err(e) => {
            tracing::warn!(block = %block.name, error = %e, "variable block fell back");
            block.fallback_or_zero()
        }
    };
    tracing::debug!(name = %block.name, operator = %block.operator, output = %output, "resolved block");
    block.output = Some(output);
    Ok(())
}

/// Evaluate `block` and persist the result.  Returns the output value.
pub async fn apply(
    block: &VariableBlock,
    store: &dyn Store,
    prefix: &str,
) -> Result<Value, ResolveError> {
    let path = variable_path(prefix, &block.name);

    if block.is_delete() {
        store.remove(&path).await?;
        return Ok(Value::String(String::new()));
    }

    let stored = store.get(&path).await?;

    let Some(stored) = stored else {
        if block.operator == Operator::Reference {
            return Err(ResolveError::Missing {
                name: block.name.clone(),
            });
        }
        let value = initial_value(block);
        store.set(&path, value.clone()).await?;
        return Ok(value);
    };

    if block.operator == Operator::Reference {
        return Ok(stored);
    }

    let stored_type = stored.datatype();
    if !block.datatype.compatible_with(stored_type) {
        return Err(ResolveError::Mismatch {
            name: block.name.clone(),
            stored: stored_type,
            declared: block.datatype,
        });
    }

    let result = match block.datatype {
        Datatype::Number => apply_number(block, stored)?,
        Datatype::String => apply_string(block, stored)?,
        Datatype::Sequence => apply_sequence(block, stored)?,
        Datatype::UniqueSet => apply_set(block, stored)?,
    };
    store.set(&path, result.clone()).await?;
    Ok(result)
}

/// Value written when the variable does not exist yet: the operand itself,
/// negated for `-`/`--` on numbers.
fn initial_value(block: &VariableBlock) -> Value {
    match &block.value {
        Value::Number(n) if block.operator.is_negative() => Value::Number(-n),
        other => other.clone(),
    }
}

fn unsupported(block: &VariableBlock) -> ResolveError {
    ResolveError::Unsupported {
        name: block.name.clone(),
        operator: block.operator,
        datatype: block.datatype,
    }
}

fn malformed(block: &VariableBlock, reason: impl Into<String>) -> ResolveError {
    ResolveError::Malformed {
        name: block.name.clone(),
        reason: reason.into(),
    }
}

// ── Per-datatype handlers ─────────────────────────────────────────────────────

fn apply_number(block: &VariableBlock, stored: Value) -> Result<Value, ResolveError> {
    let (Value::Number(current), Value::Number(operand)) = (stored, &block.value) else {
        return Err(unsupported(block));
    };
    let result = match block.operator {
        Operator::Assign => *operand,
        Operator::Add | Operator::Increment => current + operand,
        Operator::Subtract | Operator::Decrement => current - operand,
        Operator::Reference => return Err(unsupported(block)),
    };
    if !result.is_finite() {
        return Err(malformed(block, format!("{current} {} {operand} is not finite", block.operator)));
    }
    Ok(Value::Number(result))
}

fn apply_string(block: &VariableBlock, stored: Value) -> Result<Value, ResolveError> {
    let (Value::String(current), Value::String(operand)) = (stored, &block.value) else {
        return Err(unsupported(block));
    };
    match block.operator {
        Operator::Assign => Ok(Value::String(operand.clone())),
        Operator::Add => Ok(Value::String(current + operand)),
        _ => Err(unsupported(block)),
    }
}

fn apply_sequence(block: &VariableBlock, stored: Value) -> Result<Value, ResolveError> {
    let operand = block.value.items().ok_or_else(|| unsupported(block))?;
    let mut current = stored.into_items().ok_or_else(|| unsupported(block))?;
    match block.operator {
        Operator::Assign => Ok(Value::Sequence(operand.to_vec())),
        Operator::Add => {
            current.extend_from_slice(operand);
            Ok(Value::Sequence(current))
        }
        Operator::Subtract => {
            let mut indices = operand
                .iter()
                .map(|s| s.as_index().ok_or_else(|| malformed(block, format!("{s} is not an index"))))
                .collect::<Result<Vec<_>, _>>()?;
            // Highest index first so earlier removals don't shift later ones.
            indices.sort_unstable_by(|a, b| b.cmp(a));
            indices.dedup();
            for i in indices {
                if i < current.len() {
                    current.remove(i);
                }
            }
            Ok(Value::Sequence(current))
        }
        _ => Err(unsupported(block)),
    }
}

fn apply_set(block: &VariableBlock, stored: Value) -> Result<Value, ResolveError> {
    let operand = block.value.items().ok_or_else(|| unsupported(block))?;
    let current = dedup(stored.into_items().ok_or_else(|| unsupported(block))?);
    match block.operator {
        Operator::Assign => Ok(Value::UniqueSet(dedup(operand.to_vec()))),
        Operator::Add => {
            let mut union = current;
            union.extend_from_slice(operand);
            Ok(Value::UniqueSet(dedup(union)))
        }
        Operator::Subtract => Ok(Value::UniqueSet(
            current
                .into_iter()
                .filter(|item: &Scalar| !operand.contains(item))
                .collect(),
        )),
        _ => Err(unsupported(block)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
