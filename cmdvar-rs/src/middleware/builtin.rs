//! Stock handlers, also the targets of the `/replace`, `/reject` and
//! `/set namespace` rc directives.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use async_trait::async_trait;

use super::{Flow, Input, Middleware, PreParse};
use crate::block::VariableBlock;
use crate::error::MiddlewareError;

// ── Replace ───────────────────────────────────────────────────────────────────

/// Pre-parse word substitution.
///
/// All patterns are matched in one pass, ASCII case-insensitively, longest
/// match first.  Replacement text is never rescanned.
#[derive(Debug, Clone)]
pub struct Replace {
    ac: AhoCorasick,
    replacements: Vec<String>,
}

impl Replace {
    /// Empty patterns are ignored.
    pub fn new<I, P, R>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (P, R)>,
        P: Into<String>,
        R: Into<String>,
    {
        let (patterns, replacements): (Vec<String>, Vec<String>) = pairs
            .into_iter()
            .map(|(p, r)| (p.into(), r.into()))
            .filter(|(p, _)| !p.is_empty())
            .unzip();
        let ac = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostLongest)
            .build(&patterns);
        Self { ac, replacements }
    }

    pub fn apply(&self, text: &str) -> String {
        if self.replacements.is_empty() {
            return text.to_owned();
        }
        self.ac.replace_all(text, &self.replacements)
    }
}

#[async_trait]
impl Middleware<PreParse> for Replace {
    fn name(&self) -> &str {
        "replace"
    }

    async fn handle(&self, ctx: &mut PreParse, _input: Option<&Input>) -> Result<Flow, MiddlewareError> {
        ctx.text = self.apply(&ctx.text);
        Ok(Flow::Continue)
    }
}

// ── RejectIf ──────────────────────────────────────────────────────────────────

type Predicate = Box<dyn Fn(Option<&Input>) -> bool + Send + Sync>;

/// Pre-parse guard: when the predicate holds, the parse is aborted with
/// [`BREAK`](super::BREAK) and the rest of the chain is skipped.
pub struct RejectIf {
    label: String,
    predicate: Predicate,
}

impl RejectIf {
    pub fn new<F>(label: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(Option<&Input>) -> bool + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            predicate: Box::new(predicate),
        }
    }

    /// Reject when the input's `text` field contains `word`, ignoring case.
    pub fn containing(word: impl Into<String>) -> Self {
        let word = word.into().to_lowercase();
        let label = format!("reject:{word}");
        Self::new(label, move |input| {
            input
                .and_then(|i| i.get("text"))
                .and_then(Input::as_str)
                .is_some_and(|t| t.to_lowercase().contains(&word))
        })
    }
}

impl std::fmt::Debug for RejectIf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RejectIf").field("label", &self.label).finish_non_exhaustive()
    }
}

#[async_trait]
impl Middleware<PreParse> for RejectIf {
    fn name(&self) -> &str {
        &self.label
    }

    async fn handle(&self, ctx: &mut PreParse, input: Option<&Input>) -> Result<Flow, MiddlewareError> {
        if (self.predicate)(input) {
            ctx.set_break();
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue)
    }
}

// ── Namespace ─────────────────────────────────────────────────────────────────

/// Pre-lookup handler that scopes every variable by an input field, so
/// `{count++}` with `{"channel": "general"}` touches `general.count`.
///
/// Blocks pass through unchanged when there is no input or the field is
/// absent or not a string or number.
#[derive(Debug, Clone)]
pub struct Namespace {
    field: String,
}

impl Namespace {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }

    fn scope(&self, input: Option<&Input>) -> Option<String> {
        match input?.get(&self.field)? {
            Input::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Input::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[async_trait]
impl Middleware<VariableBlock> for Namespace {
    fn name(&self) -> &str {
        "namespace"
    }

    async fn handle(
        &self,
        block: &mut VariableBlock,
        input: Option<&Input>,
    ) -> Result<Flow, MiddlewareError> {
        if let Some(scope) = self.scope(input) {
            let name = format!("{scope}.{}", block.name);
            block.set_name(&name);
        }
        Ok(Flow::Continue)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn replace_is_case_insensitive_and_longest_first() {
        let r = Replace::new([("brownies", "salad"), ("brown", "tan"), ("cake", "fruit")]);
        assert_eq!(r.apply("Brownies and CAKE, brown bag"), "salad and fruit, tan bag");
    }

    #[test]
    fn replace_does_not_rescan() {
        let r = Replace::new([("a", "b"), ("b", "c")]);
        assert_eq!(r.apply("ab"), "bc");
    }

    #[test]
    fn replace_ignores_empty_patterns() {
        let r = Replace::new([("", "x")]);
        assert_eq!(r.apply("abc"), "abc");
    }

    #[tokio::test]
    async fn reject_breaks() {
        let r = RejectIf::containing("Spoiler");
        let mut ctx = PreParse::new("{x}");
        let input = json!({ "text": "no SPOILERS please" });
        assert_eq!(r.handle(&mut ctx, Some(&input)).await.unwrap(), Flow::Stop);
        assert!(ctx.is_break());

        let mut ctx = PreParse::new("{x}");
        let input = json!({ "text": "hello" });
        assert_eq!(r.handle(&mut ctx, Some(&input)).await.unwrap(), Flow::Continue);
        assert_eq!(ctx.text, "{x}");
        assert_eq!(r.handle(&mut ctx, None).await.unwrap(), Flow::Continue);
    }

    #[tokio::test]
    async fn namespace_prefixes_names() {
        let ns = Namespace::new("channel");
        let mut block = VariableBlock::parse("count++").unwrap();
        ns.handle(&mut block, Some(&json!({ "channel": "general" }))).await.unwrap();
        assert_eq!(block.name, "general.count");

        let mut block = VariableBlock::parse("count++").unwrap();
        ns.handle(&mut block, Some(&json!({ "channel": 42 }))).await.unwrap();
        assert_eq!(block.name, "42.count");

        let mut block = VariableBlock::parse("count++").unwrap();
        ns.handle(&mut block, Some(&json!({ "other": "x" }))).await.unwrap();
        assert_eq!(block.name, "count");
    }
}
