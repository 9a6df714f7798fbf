//! Command-line argument parsing.
//!
//! Usage:
//!   cmdvar [-f[<rc>]] [-s<store>] [-c<template>] [-i<json>] [-nd] [<template>...]

use std::path::PathBuf;

pub const USAGE: &str =
    "Usage: cmdvar [-f[<rc>]] [-s<store>] [-c<template>] [-i<json>] [-nd] [<template>...]";

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Config-file specification.
    pub config: ConfigFile,
    /// Store file override (`-s<store>`).
    pub store: Option<PathBuf>,
    /// Template to parse first (`-c<template>`).
    pub command: Option<String>,
    /// JSON side-channel input (`-i<json>`).
    pub input: Option<String>,
    /// Use a throwaway in-memory store (`-n`).
    pub dry_run: bool,
    /// Debug logging (`-d`).
    pub debug: bool,
    /// Positional templates.
    pub templates: Vec<String>,
}

impl CliArgs {
    /// Templates in execution order: `-c` first, then positionals.
    pub fn all_templates(&self) -> Vec<&str> {
        self.command
            .iter()
            .chain(&self.templates)
            .map(String::as_str)
            .collect()
    }
}

/// How to choose the rc file.
#[derive(Debug, Default)]
pub enum ConfigFile {
    /// Search `$CMDVAR_RC`, the user config dir, then `./.cmdvarrc` (default).
    #[default]
    Search,
    /// `-f` with no file argument: skip the rc file.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Value for a flag that takes one: the rest of this argument, or the next.
fn flag_value(
    flag: char,
    chars: &[char],
    j: &mut usize,
    argv: &[String],
    i: &mut usize,
) -> Result<String, String> {
    if *j + 1 < chars.len() {
        let s: String = chars[*j + 1..].iter().collect();
        *j = chars.len();
        Ok(s)
    } else if *i + 1 < argv.len() {
        *i += 1;
        Ok(argv[*i].clone())
    } else {
        Err(format!("-{flag} requires an argument"))
    }
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            args.templates.extend(argv[i + 1..].iter().cloned());
            break;
        }

        if !arg.starts_with('-') || arg == "-" {
            args.templates.push(arg.to_owned());
            i += 1;
            continue;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'd' => args.debug = true,
                'n' => args.dry_run = true,

                // -f[<rc>]
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.config = ConfigFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else if i + 1 < argv.len() && !argv[i + 1].starts_with('-') {
                        i += 1;
                        args.config = ConfigFile::Explicit(PathBuf::from(&argv[i]));
                    } else {
                        args.config = ConfigFile::Skip;
                    }
                }

                'c' => args.command = Some(flag_value('c', &chars, &mut j, argv, &mut i)?),
                'i' => args.input = Some(flag_value('i', &chars, &mut j, argv, &mut i)?),
                's' => {
                    let store = flag_value('s', &chars, &mut j, argv, &mut i)?;
                    args.store = Some(crate::config::expand_tilde(&store));
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    Ok(args)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn empty_args() {
        let a = parse_argv(&argv(&[])).unwrap();
        assert!(!a.dry_run);
        assert!(matches!(a.config, ConfigFile::Search));
        assert!(a.all_templates().is_empty());
    }

    #[test]
    fn positional_templates() {
        let a = parse_argv(&argv(&["{x++}", "{y}"])).unwrap();
        assert_eq!(a.templates, ["{x++}", "{y}"]);
    }

    #[test]
    fn bool_flags() {
        let a = parse_argv(&argv(&["-n", "-d"])).unwrap();
        assert!(a.dry_run);
        assert!(a.debug);
        let a = parse_argv(&argv(&["-nd"])).unwrap();
        assert!(a.dry_run && a.debug);
    }

    #[test]
    fn store_embedded_and_separate() {
        let a = parse_argv(&argv(&["-s/tmp/v.json"])).unwrap();
        assert_eq!(a.store, Some(PathBuf::from("/tmp/v.json")));
        let a = parse_argv(&argv(&["-s", "/tmp/v.json"])).unwrap();
        assert_eq!(a.store, Some(PathBuf::from("/tmp/v.json")));
    }

    #[test]
    fn config_skip() {
        let a = parse_argv(&argv(&["-f"])).unwrap();
        assert!(matches!(a.config, ConfigFile::Skip));
        let a = parse_argv(&argv(&["-f", "-n"])).unwrap();
        assert!(matches!(a.config, ConfigFile::Skip));
        assert!(a.dry_run);
    }

    #[test]
    fn config_explicit() {
        let a = parse_argv(&argv(&["-fmyrc"])).unwrap();
        assert!(matches!(&a.config, ConfigFile::Explicit(p) if p == &PathBuf::from("myrc")));
        let a = parse_argv(&argv(&["-f", "myrc"])).unwrap();
        assert!(matches!(&a.config, ConfigFile::Explicit(p) if p == &PathBuf::from("myrc")));
    }

    #[test]
    fn command_runs_first() {
        let a = parse_argv(&argv(&["{b}", "-c{a=1}"])).unwrap();
        assert_eq!(a.all_templates(), ["{a=1}", "{b}"]);
    }

    #[test]
    fn command_separate_may_start_with_dash() {
        let a = parse_argv(&argv(&["-c", "-{x}-"])).unwrap();
        assert_eq!(a.command.as_deref(), Some("-{x}-"));
    }

    #[test]
    fn input_json() {
        let a = parse_argv(&argv(&["-i", r#"{"text":"hi"}"#, "{x}"])).unwrap();
        assert_eq!(a.input.as_deref(), Some(r#"{"text":"hi"}"#));
        assert_eq!(a.templates, ["{x}"]);
    }

    #[test]
    fn double_dash_ends_flags() {
        let a = parse_argv(&argv(&["-n", "--", "-{x}", "-d"])).unwrap();
        assert_eq!(a.templates, ["-{x}", "-d"]);
        assert!(!a.debug);
    }

    #[test]
    fn missing_value() {
        assert!(parse_argv(&argv(&["-c"])).is_err());
        assert!(parse_argv(&argv(&["-i"])).is_err());
    }

    #[test]
    fn unknown_flag() {
        assert!(parse_argv(&argv(&["-z"])).is_err());
    }
}
