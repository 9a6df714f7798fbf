//! Built-in sandbox functions.
//!
//! Each function receives already-evaluated arguments.  Nothing here can
//! reach the store, the file system or the network.

use rand::seq::SliceRandom;
use rand::Rng;

use super::value::{bounded_str, ScriptValue, MAX_STRING_CHARS};
use crate::error::SandboxError;


/// Dispatch a built-in function call.
///
/// Returns `None` if `name` is not a built-in.
pub fn call_builtin(
    name: &str,
    args: Vec<ScriptValue>,
) -> Option<Result<ScriptValue, SandboxError>> {
    // Ok(None) → not a builtin; Ok(Some(v)) → success; Err → call failed.
    fn inner(name: &str, args: Vec<ScriptValue>) -> Result<Option<ScriptValue>, SandboxError> {
        Ok(Some(match name {
            // ── Strings ──────────────────────────────────────────────────────
            "len" => ScriptValue::Num(get_str(&args, 0, name)?.chars().count() as f64),
            "upper" => bounded_str(get_str(&args, 0, name)?.to_uppercase(), name)?,
            "lower" => bounded_str(get_str(&args, 0, name)?.to_lowercase(), name)?,
            "trim" => ScriptValue::Str(get_str(&args, 0, name)?.trim().to_owned()),
            "substr" => {
                let s = get_str(&args, 0, name)?;
                let chars: Vec<char> = s.chars().collect();
                let start = clamp_index(get_num(&args, 1, name)?, chars.len());
                let end = match args.get(2) {
                    Some(n) => start.saturating_add(clamp_index(n.as_number(), chars.len())),
                    None => chars.len(),
                }
                .min(chars.len());
                ScriptValue::Str(chars[start..end].iter().collect())
            }
            "replace" => {
                let s = get_str(&args, 0, name)?;
                let from = get_str(&args, 1, name)?;
                let to = get_str(&args, 2, name)?;
                if from.is_empty() {
                    ScriptValue::Str(s)
                } else {
                    bounded_str(s.replace(&from, &to), name)?
                }
            }
            "repeat" => {
                let s = get_str(&args, 0, name)?;
                let n = get_num(&args, 1, name)?;
                if !(n >= 0.0) || n.fract() != 0.0 {
                    return Err(SandboxError::Eval(format!("{name}: invalid count {n}")));
                }
                let n = n as usize;
                if s.chars().count().saturating_mul(n) > MAX_STRING_CHARS {
                    return Err(SandboxError::Eval(format!(
                        "{name}: result longer than {MAX_STRING_CHARS} characters"
                    )));
                }
                ScriptValue::Str(s.repeat(n))
            }
            "String" => ScriptValue::Str(
                args.into_iter().next().unwrap_or(ScriptValue::Str(String::new())).to_string(),
            ),
            "Number" => ScriptValue::Num(args.first().map(ScriptValue::as_number).unwrap_or(0.0)),

            // ── Math ─────────────────────────────────────────────────────────
            "abs" => ScriptValue::Num(get_num(&args, 0, name)?.abs()),
            "floor" => ScriptValue::Num(get_num(&args, 0, name)?.floor()),
            "ceil" => ScriptValue::Num(get_num(&args, 0, name)?.ceil()),
            "round" => ScriptValue::Num(get_num(&args, 0, name)?.round()),
            "min" => ScriptValue::Num(
                args.iter().map(ScriptValue::as_number).fold(f64::INFINITY, f64::min),
            ),
            "max" => ScriptValue::Num(
                args.iter().map(ScriptValue::as_number).fold(f64::NEG_INFINITY, f64::max),
            ),

            // ── Randomness ───────────────────────────────────────────────────
            "random" => ScriptValue::Num(rand::thread_rng().gen::<f64>()),
            "randint" => {
                let lo = get_num(&args, 0, name)?.ceil();
                let hi = get_num(&args, 1, name)?.floor();
                if !(lo <= hi) || !lo.is_finite() || !hi.is_finite() {
                    return Err(SandboxError::Eval(format!("{name}: empty range {lo}..={hi}")));
                }
                ScriptValue::Num(rand::thread_rng().gen_range(lo as i64..=hi as i64) as f64)
            }
            "pick" => args
                .choose(&mut rand::thread_rng())
                .cloned()
                .ok_or_else(|| SandboxError::Eval(format!("{name}: nothing to pick from")))?,

            _ => return Ok(None),
        }))
    }
    inner(name, args).transpose()
}

fn clamp_index(n: f64, len: usize) -> usize {
    if n.is_nan() || n <= 0.0 {
        0
    } else {
        (n as usize).min(len)
    }
}

fn get_str(args: &[ScriptValue], idx: usize, name: &str) -> Result<String, SandboxError> {
    args.get(idx)
        .map(|v| v.to_string())
        .ok_or_else(|| SandboxError::Eval(format!("{name}: argument {idx} missing")))
}

fn get_num(args: &[ScriptValue], idx: usize, name: &str) -> Result<f64, SandboxError> {
    args.get(idx)
        .map(ScriptValue::as_number)
        .ok_or_else(|| SandboxError::Eval(format!("{name}: argument {idx} missing")))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<ScriptValue>) -> ScriptValue {
        call_builtin(name, args)
            .expect("not a builtin")
            .expect("builtin failed")
    }

    fn s(v: &str) -> ScriptValue {
        ScriptValue::from(v)
    }

    fn n(v: f64) -> ScriptValue {
        ScriptValue::Num(v)
    }

    #[test]
    fn unknown_is_none() {
        assert!(call_builtin("exec", vec![]).is_none());
    }

    #[test]
    fn string_functions() {
        assert_eq!(call("len", vec![s("héllo")]), n(5.0));
        assert_eq!(call("upper", vec![s("abc")]), s("ABC"));
        assert_eq!(call("lower", vec![s("ABC")]), s("abc"));
        assert_eq!(call("trim", vec![s("  x ")]), s("x"));
        assert_eq!(call("replace", vec![s("a-b-c"), s("-"), s("+")]), s("a+b+c"));
        assert_eq!(call("String", vec![n(3.0)]), s("3"));
        assert_eq!(call("Number", vec![s("4.5")]), n(4.5));
    }

    #[test]
    fn substr_clamps() {
        assert_eq!(call("substr", vec![s("hello"), n(1.0), n(3.0)]), s("ell"));
        assert_eq!(call("substr", vec![s("hello"), n(3.0)]), s("lo"));
        assert_eq!(call("substr", vec![s("hello"), n(10.0), n(3.0)]), s(""));
        assert_eq!(call("substr", vec![s("hello"), n(-2.0), n(2.0)]), s("he"));
    }

    #[test]
    fn repeat_is_bounded() {
        assert_eq!(call("repeat", vec![s("ab"), n(3.0)]), s("ababab"));
        assert!(call_builtin("repeat", vec![s("ab"), n(1e9)]).unwrap().is_err());
        assert!(call_builtin("repeat", vec![s("ab"), n(-1.0)]).unwrap().is_err());
    }

    #[test]
    fn replace_and_case_mapping_are_bounded() {
        let xs = "x".repeat(100);
        let wide = "y".repeat(200);
        assert!(call_builtin("replace", vec![s(&xs), s("x"), s(&wide)]).unwrap().is_err());
        // 'ß' uppercases to "SS".
        let eszett = "ß".repeat(MAX_STRING_CHARS);
        assert!(call_builtin("upper", vec![s(&eszett)]).unwrap().is_err());
    }

    #[test]
    fn math() {
        assert_eq!(call("abs", vec![n(-2.0)]), n(2.0));
        assert_eq!(call("floor", vec![n(2.7)]), n(2.0));
        assert_eq!(call("ceil", vec![n(2.1)]), n(3.0));
        assert_eq!(call("round", vec![n(2.5)]), n(3.0));
        assert_eq!(call("min", vec![n(3.0), n(1.0), n(2.0)]), n(1.0));
        assert_eq!(call("max", vec![n(3.0), s("7")]), n(7.0));
    }

    #[test]
    fn randomness_stays_in_range() {
        for _ in 0..50 {
            let ScriptValue::Num(x) = call("random", vec![]) else { panic!() };
            assert!((0.0..1.0).contains(&x));
            let ScriptValue::Num(k) = call("randint", vec![n(1.0), n(6.0)]) else { panic!() };
            assert!((1.0..=6.0).contains(&k));
            let picked = call("pick", vec![s("a"), s("b")]);
            assert!(picked == s("a") || picked == s("b"));
        }
        assert!(call_builtin("randint", vec![n(5.0), n(1.0)]).unwrap().is_err());
        assert!(call_builtin("pick", vec![]).unwrap().is_err());
    }

    #[test]
    fn missing_argument() {
        assert_eq!(
            call_builtin("upper", vec![]),
            Some(Err(SandboxError::Eval("upper: argument 0 missing".into())))
        );
    }
}
