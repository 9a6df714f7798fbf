//! Template scanner.
//!
//! Finds the three kinds of delimited regions a template may contain and
//! reports them with byte offsets so the orchestrator can splice results
//! back in afterwards:
//!
//! | Region        | Delimiters   | Stage                         |
//! |---------------|--------------|-------------------------------|
//! | variable      | `{` … `}`    | block scanning                |
//! | pre-command   | `^(` … `)^`  | before block scanning         |
//! | post-command  | `$(` … `)$`  | after substitution            |
//!
//! Templates are chat-command sized, so all matches are collected eagerly.

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

// ── Match ─────────────────────────────────────────────────────────────────────

/// A delimited region of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match<'t> {
    /// Byte range of the whole region, delimiters included.
    pub range: Range<usize>,
    /// The whole region as written.
    pub raw: &'t str,
    /// Text between the delimiters.
    pub inner: &'t str,
}

// ── Patterns ──────────────────────────────────────────────────────────────────

fn variable_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^{}]*)\}").expect("static regex"))
}

fn pre_command_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\^\((.*?)\)\^").expect("static regex"))
}

fn post_command_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // The closing `$` may be dropped when the block ends the template.
    RE.get_or_init(|| Regex::new(r"(?s)\$\((.*?)\)(?:\$|\z)").expect("static regex"))
}

fn collect<'t>(re: &Regex, template: &'t str) -> Vec<Match<'t>> {
    re.captures_iter(template)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let inner = caps.get(1)?;
            Some(Match {
                range: whole.range(),
                raw: whole.as_str(),
                inner: inner.as_str(),
            })
        })
        .collect()
}

// ── Scanning ──────────────────────────────────────────────────────────────────

/// Variable-block candidates, left to right, with script-looking braces
/// filtered out by [`is_script_brace`].
pub fn variable_blocks(template: &str) -> Vec<Match<'_>> {
    collect(variable_re(), template)
        .into_iter()
        .filter(|m| !is_script_brace(&template[..m.range.start], m.inner))
        .collect()
}

/// `^( … )^` regions.
pub fn pre_command_blocks(template: &str) -> Vec<Match<'_>> {
    collect(pre_command_re(), template)
}

/// `$( … )$` regions.
pub fn post_command_blocks(template: &str) -> Vec<Match<'_>> {
    collect(post_command_re(), template)
}

/// Heuristic escape for braces that belong to script text rather than to
/// the macro language: template-literal interpolation (`${x}`), function
/// bodies (`function(){`, `() => {`), and `){` inside a `$( … )$` block.
///
/// `before` is the template text preceding the `{`; `inner` the text
/// between the braces.
pub fn is_script_brace(before: &str, inner: &str) -> bool {
    const LEADS: [&str; 4] = ["$", "function()", "=>", "){"];
    if LEADS.iter().any(|lead| inner.starts_with(lead)) {
        return true;
    }
    if before.ends_with('$') || (before.ends_with(')') && in_post_command(before)) {
        return true;
    }
    let before = before.trim_end();
    before.ends_with("function()") || before.ends_with("=>")
}

/// Whether the end of `before` lies inside an unclosed `$(` region.
fn in_post_command(before: &str) -> bool {
    before
        .rfind("$(")
        .is_some_and(|open| !before[open..].contains(")$"))
}

/// Replace `matches` in `template` with `replacements`, last match first so
/// earlier offsets stay valid.
///
/// `matches` must be sorted by start offset and non-overlapping, and
/// `replacements` must be the same length.
pub fn splice(template: &str, matches: &[Range<usize>], replacements: &[String]) -> String {
    let mut out = template.to_owned();
    for (range, text) in matches.iter().zip(replacements).rev() {
        out.replace_range(range.clone(), text);
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn inners(v: Vec<Match<'_>>) -> Vec<&str> {
        v.into_iter().map(|m| m.inner).collect()
    }

    #[test]
    fn finds_variable_blocks_in_order() {
        let t = "a {x=1} b {y} c";
        let found = variable_blocks(t);
        assert_eq!(inners(found.clone()), vec!["x=1", "y"]);
        assert_eq!(found[0].range, 2..7);
        assert_eq!(&t[found[1].range.clone()], "{y}");
    }

    #[test]
    fn nested_braces_match_innermost() {
        assert_eq!(inners(variable_blocks("{a {b} c}")), vec!["b"]);
    }

    #[test]
    fn script_braces_are_skipped() {
        assert!(variable_blocks("`hi ${name}`").is_empty());
        assert!(variable_blocks("function(){ return 1 }").is_empty());
        assert!(variable_blocks("() => { go() }").is_empty());
        assert!(variable_blocks("$(if (x){y})$").is_empty());
        assert!(variable_blocks("$(if (x){y})").is_empty());
        assert!(variable_blocks("{$skip}").is_empty());
        assert!(variable_blocks("{=> x}").is_empty());
    }

    #[test]
    fn escape_predicate() {
        assert!(is_script_brace("abc$", "x"));
        assert!(is_script_brace("f = () =>  ", "x"));
        assert!(!is_script_brace("say ", "x"));
        assert!(!is_script_brace("$ ", "x"));
        assert!(!is_script_brace("hello (friend) ", "name"));
        assert!(!is_script_brace("Score (final)", "score"));
        assert!(is_script_brace("$(if (x)", "y"));
        assert!(!is_script_brace("$(1)$ then (x)", "y"));
    }

    #[test]
    fn close_paren_is_prose_outside_post_command() {
        assert_eq!(inners(variable_blocks("Score (final){score}")), vec!["score"]);
        assert_eq!(inners(variable_blocks("if (x){y}")), vec!["y"]);
        assert_eq!(
            inners(variable_blocks("(a){b} $(f(){c})$ (d){e}")),
            vec!["b", "e"]
        );
    }

    #[test]
    fn pre_command_spans_newlines() {
        let t = "^(1 +\n2)^ and ^(3)^";
        assert_eq!(inners(pre_command_blocks(t)), vec!["1 +\n2", "3"]);
    }

    #[test]
    fn post_command_blocks() {
        assert_eq!(inners(super::post_command_blocks("x $(1)$ y $(2)$")), vec!["1", "2"]);
        // unterminated at end of template
        assert_eq!(
            inners(super::post_command_blocks("$(var a='x'; a)")),
            vec!["var a='x'; a"]
        );
    }

    #[test]
    fn splice_right_to_left() {
        let t = "ab{x}cd{yy}e";
        let found = variable_blocks(t);
        let ranges: Vec<_> = found.iter().map(|m| m.range.clone()).collect();
        let out = splice(t, &ranges, &["1".to_owned(), "22222".to_owned()]);
        assert_eq!(out, "ab1cd22222e");
    }
}
