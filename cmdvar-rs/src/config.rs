//! `.cmdvarrc` configuration file parser.
//!
//! One directive per line:
//!
//! | Directive | Action |
//! |-----------|--------|
//! | `/set store=<path>` | JSON store location (`~` expanded) |
//! | `/set prefix=<name>` | store path prefix (default `variables`) |
//! | `/set pre_command=on\|off` | evaluate `^( … )^` blocks |
//! | `/set post_command=on\|off` | evaluate `$( … )$` blocks |
//! | `/set namespace=<field>` | scope variable names by an input field |
//! | `/replace <from> <to>` | pre-parse word replacement |
//! | `/reject <word>` | abort the parse when the input text contains `<word>` |
//! | Lines starting with `;` | comment, ignored |
//! | Any other `/command` | silently skipped |
//!
//! Arguments may be double-quoted to include spaces.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::Options;
use crate::middleware::{Namespace, Pipeline, RejectIf, Replace};

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

/// Everything an rc file can set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// JSON store location; `None` means the per-user default.
    pub store: Option<PathBuf>,
    pub options: Options,
    /// Input field used to scope variable names.
    pub namespace: Option<String>,
    /// `/replace` pairs, in file order.
    pub replacements: Vec<(String, String)>,
    /// `/reject` words, in file order.
    pub rejects: Vec<String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an rc string.
    ///
    /// Returns the config and a list of errors on recognised lines; a bad
    /// line is skipped and loading carries on.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            let Some(rest) = line.strip_prefix('/') else { continue };

            let (cmd, args_str) = rest
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((rest, ""));
            let tokens = split_args(args_str.trim());

            let result = match cmd {
                "set" => parse_set(&tokens, &mut config),
                "replace" => match tokens.as_slice() {
                    [from, to] if !from.is_empty() => {
                        config.replacements.push((from.clone(), to.clone()));
                        Ok(())
                    }
                    _ => Err("/replace: expected <from> <to>".to_owned()),
                },
                "reject" => match tokens.as_slice() {
                    [word] if !word.is_empty() => {
                        config.rejects.push(word.clone());
                        Ok(())
                    }
                    _ => Err("/reject: expected exactly one word".to_owned()),
                },
                _ => Ok(()),
            };
            if let Err(message) = result {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (config, errors)
    }

    /// Read and parse an rc file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Middleware chains described by this config.
    ///
    /// Rejections run before replacements, so `/reject` always sees the
    /// untouched input.
    pub fn pipeline(&self) -> Pipeline {
        let mut pipeline = Pipeline::default();
        for word in &self.rejects {
            pipeline.pre_parse.push(Arc::new(RejectIf::containing(word.as_str())));
        }
        if !self.replacements.is_empty() {
            pipeline
                .pre_parse
                .push(Arc::new(Replace::new(self.replacements.iter().cloned())));
        }
        if let Some(field) = &self.namespace {
            pipeline.pre_lookup.push(Arc::new(Namespace::new(field.as_str())));
        }
        pipeline
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Locate the rc file: `$CMDVAR_RC`, then `<config_dir>/cmdvar/cmdvarrc`,
/// then `./.cmdvarrc`.  Returns the first path that exists.
pub fn find_user_config() -> Option<PathBuf> {
    let env = std::env::var_os("CMDVAR_RC").map(PathBuf::from);
    let user = directories::ProjectDirs::from("", "", "cmdvar")
        .map(|dirs| dirs.config_dir().join("cmdvarrc"));
    [env, user, Some(PathBuf::from("./.cmdvarrc"))]
        .into_iter()
        .flatten()
        .find(|p| p.exists())
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let home = || directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf());
    if path == "~" {
        if let Some(h) = home() {
            return h;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(h) = home() {
            return h.join(rest);
        }
    }
    PathBuf::from(path)
}

// ── Argument tokenizer ────────────────────────────────────────────────────────

/// Split `s` into whitespace-delimited tokens, honouring double-quoted strings
/// and `\"` escapes within them.  `""` yields an empty token.
fn split_args(s: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if !in_quotes => {
                in_quotes = true;
                quoted = true;
            }
            '"' => in_quotes = false,
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    cur.push(escaped);
                }
            }
            c if c.is_ascii_whitespace() && !in_quotes => {
                if !cur.is_empty() || quoted {
                    args.push(std::mem::take(&mut cur));
                    quoted = false;
                }
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() || quoted {
        args.push(cur);
    }
    args
}

// ── /set ──────────────────────────────────────────────────────────────────────

fn parse_bool(name: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "1" | "true" | "yes" => Ok(true),
        "off" | "0" | "false" | "no" => Ok(false),
        _ => Err(format!("/set {name}: expected on or off, got '{value}'")),
    }
}

/// Parse `/set <name>=<value>` or `/set <name> <value>`.
fn parse_set(tokens: &[String], config: &mut Config) -> Result<(), String> {
    let Some(first) = tokens.first() else {
        return Err("/set: requires an argument".into());
    };

    let (name, value) = if let Some((name, value)) = first.split_once('=') {
        (name.to_owned(), value.to_owned())
    } else if tokens.len() >= 2 {
        (first.clone(), tokens[1..].join(" "))
    } else {
        return Err(format!("/set: missing value for '{first}'"));
    };

    match name.as_str() {
        "store" if value.is_empty() => return Err("/set store: path cannot be empty".into()),
        "store" => config.store = Some(expand_tilde(&value)),
        "prefix" => config.options.prefix = value,
        "pre_command" => config.options.pre_command = parse_bool(&name, &value)?,
        "post_command" => config.options.post_command = parse_bool(&name, &value)?,
        "namespace" if value.is_empty() => config.namespace = None,
        "namespace" => config.namespace = Some(value),
        "" => return Err("/set: setting name cannot be empty".into()),
        other => return Err(format!("/set: unknown setting '{other}'")),
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::PreParse;
    use serde_json::json;

    // -- split_args -----------------------------------------------------------

    #[test]
    fn split_simple() {
        assert_eq!(split_args("foo bar baz"), ["foo", "bar", "baz"]);
    }

    #[test]
    fn split_quoted_spaces() {
        assert_eq!(split_args(r#""ice cream" gelato"#), ["ice cream", "gelato"]);
    }

    #[test]
    fn split_escaped_quote_inside_quotes() {
        assert_eq!(split_args(r#""say \"hi\"""#), [r#"say "hi""#]);
    }

    #[test]
    fn split_empty_quotes() {
        assert_eq!(split_args(r#"swear """#), ["swear", ""]);
    }

    // -- /set -----------------------------------------------------------------

    #[test]
    fn set_equals_syntax() {
        let (cfg, errs) = Config::load_str("/set prefix=counters");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.options.prefix, "counters");
    }

    #[test]
    fn set_space_syntax() {
        let (cfg, errs) = Config::load_str("/set store /tmp/vars.json");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.store, Some(PathBuf::from("/tmp/vars.json")));
    }

    #[test]
    fn set_toggles() {
        let (cfg, errs) = Config::load_str("/set pre_command=off\n/set post_command=OFF");
        assert!(errs.is_empty(), "{errs:?}");
        assert!(!cfg.options.pre_command);
        assert!(!cfg.options.post_command);
    }

    #[test]
    fn set_bad_toggle_is_error() {
        let (cfg, errs) = Config::load_str("/set pre_command=maybe");
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].line, 1);
        assert!(cfg.options.pre_command);
    }

    #[test]
    fn set_unknown_setting_is_error() {
        let (_, errs) = Config::load_str("\n/set colour=blue");
        assert_eq!(errs[0].line, 2);
        assert!(errs[0].to_string().contains("colour"));
    }

    #[test]
    fn tilde_expands() {
        if let Some(dirs) = directories::BaseDirs::new() {
            assert_eq!(expand_tilde("~/vars.json"), dirs.home_dir().join("vars.json"));
        }
        assert_eq!(expand_tilde("/abs/x"), PathBuf::from("/abs/x"));
    }

    // -- Middleware directives ------------------------------------------------

    #[test]
    fn replace_and_reject() {
        let (cfg, errs) = Config::load_str(
            "/replace brownies salad\n\
             /replace \"ice cream\" sorbet\n\
             /reject spoiler",
        );
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.replacements.len(), 2);
        assert_eq!(cfg.replacements[1], ("ice cream".to_owned(), "sorbet".to_owned()));
        assert_eq!(cfg.rejects, ["spoiler"]);
    }

    #[test]
    fn replace_wrong_arity_is_error() {
        let (cfg, errs) = Config::load_str("/replace onlyone\n/reject a b");
        assert_eq!(errs.len(), 2);
        assert!(cfg.replacements.is_empty());
        assert!(cfg.rejects.is_empty());
    }

    #[tokio::test]
    async fn pipeline_from_config() {
        let (cfg, _) = Config::load_str(
            "/replace brownies salad\n/reject spoiler\n/set namespace=channel",
        );
        let pipeline = cfg.pipeline();
        assert_eq!(pipeline.pre_parse.len(), 2);
        assert_eq!(pipeline.pre_lookup.len(), 1);

        let mut ctx = PreParse::new("I really enjoy brownies");
        pipeline.pre_parse.dispatch(&mut ctx, None).await;
        assert_eq!(ctx.text, "I really enjoy salad");

        let mut ctx = PreParse::new("anything");
        let input = json!({ "text": "SPOILER alert" });
        pipeline.pre_parse.dispatch(&mut ctx, Some(&input)).await;
        assert!(ctx.is_break());
    }

    // -- Comments & skipping --------------------------------------------------

    #[test]
    fn comments_blank_lines_and_unknown_commands() {
        let src = "\
;; cmdvar settings\n\
\n\
; store lives next to the bot\n\
/set store=./vars.json\n\
/def -i something = ignored\n\
plain text is ignored too\n\
/set prefix=bot\n";
        let (cfg, errs) = Config::load_str(src);
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.store, Some(PathBuf::from("./vars.json")));
        assert_eq!(cfg.options.prefix, "bot");
    }

    #[test]
    fn load_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".cmdvarrc");
        std::fs::write(&path, "/set prefix=fromfile\n").unwrap();
        let (cfg, errs) = Config::load_file(&path).unwrap();
        assert!(errs.is_empty());
        assert_eq!(cfg.options.prefix, "fromfile");
        assert!(Config::load_file(&dir.path().join("missing")).is_err());
    }
}
