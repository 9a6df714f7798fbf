//! Sandboxed expression blocks.
//!
//! `^( code )^` runs before variable blocks are scanned, so its output may
//! itself contain `{…}` blocks.  `$( code )$` runs after substitution.
//!
//! Code is evaluated by a small expression language (see [`expr`]) in a
//! fresh scope every time.  It can declare locals, do arithmetic and string
//! work, and call a fixed set of [`builtins`]; it cannot see the store, the
//! engine, or another block's locals.
//!
//! # Quick start
//!
//! ```rust
//! use cmdvar::sandbox;
//!
//! assert_eq!(sandbox::evaluate("var n = 6; n * 7").unwrap(), "42");
//! assert_eq!(sandbox::run_post_command("a $(1 + 1)$ b"), "a 2 b");
//! ```

pub mod builtins;
pub mod expr;
pub mod value;

pub use value::ScriptValue;

use crate::error::SandboxError;
use crate::scan::{self, Match};

/// Evaluate one block body and stringify the result.
pub fn evaluate(code: &str) -> Result<String, SandboxError> {
    expr::eval_str(code).map(ScriptValue::into_output)
}

/// Which stage a block belongs to; decides what a failure leaves behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pre,
    Post,
}

fn run(template: &str, matches: Vec<Match<'_>>, phase: Phase) -> String {
    if matches.is_empty() {
        return template.to_owned();
    }
    let mut ranges = Vec::with_capacity(matches.len());
    let mut outputs = Vec::with_capacity(matches.len());
    for m in matches {
        let output = match evaluate(m.inner) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(?phase, block = m.raw, error = %e, "sandboxed block failed");
                match phase {
                    Phase::Pre => m.raw.to_owned(),
                    Phase::Post => String::new(),
                }
            }
        };
        ranges.push(m.range);
        outputs.push(output);
    }
    scan::splice(template, &ranges, &outputs)
}

/// Replace every `^( … )^` block.  A failing block is left as written.
pub fn run_pre_command(template: &str) -> String {
    run(template, scan::pre_command_blocks(template), Phase::Pre)
}

/// Replace every `$( … )$` block.  A failing block becomes empty.
pub fn run_post_command(template: &str) -> String {
    run(template, scan::post_command_blocks(template), Phase::Post)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_command_template_literal() {
        assert_eq!(
            run_post_command("$(var cba='abc'; `I know my ${cba}'s`)$"),
            "I know my abc's"
        );
        assert_eq!(
            run_post_command("$(var cba='abc'; `I know my ${cba}'s`)"),
            "I know my abc's"
        );
    }

    #[test]
    fn pre_failure_keeps_text() {
        assert_eq!(run_pre_command("x ^(nope)^ y"), "x ^(nope)^ y");
    }

    #[test]
    fn post_failure_is_empty() {
        assert_eq!(run_post_command("x $(nope)$ y"), "x  y");
    }

    #[test]
    fn blocks_are_isolated() {
        assert_eq!(
            run_post_command("$(var a = 1; a)$ $(a)$"),
            "1 "
        );
    }

    #[test]
    fn multiple_blocks_right_to_left() {
        assert_eq!(
            run_pre_command("^('long result')^-^(1)^-^(upper('z'))^"),
            "long result-1-Z"
        );
    }

    #[test]
    fn no_blocks_is_identity() {
        assert_eq!(run_pre_command("plain {x}"), "plain {x}");
    }
}
