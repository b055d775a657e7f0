//! Field coercion helpers.
//!
//! Parsing pulls fields out of declaration tables with these helpers. A
//! coercion failure is reported as a `Malformed` value describing what was
//! expected; policy decides whether that aborts the load or degrades to a
//! default.

use std::fmt;

use crate::data::choosers::Chooser;
use crate::data::types::{Condition, DiceFormula, FactValues, Formattable, Formula};
use crate::script::value::{ChooserValue, DiceFormulaValue, FormulaValue, ScriptValue};

/// A field value that does not fit its expected shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Malformed {
    pub expected: &'static str,
    pub found: String,
}

impl Malformed {
    fn new(expected: &'static str, value: &ScriptValue) -> Malformed {
        Malformed {
            expected,
            found: value.type_name().to_string(),
        }
    }
}

impl fmt::Display for Malformed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, found {}", self.expected, self.found)
    }
}

pub fn string(value: &ScriptValue) -> Result<String, Malformed> {
    match value {
        ScriptValue::String(s) => Ok(s.clone()),
        other => Err(Malformed::new("string", other)),
    }
}

pub fn opt_string(value: Option<&ScriptValue>) -> Result<Option<String>, Malformed> {
    match value {
        None | Some(ScriptValue::Nil) => Ok(None),
        Some(v) => string(v).map(Some),
    }
}

pub fn integer(value: &ScriptValue) -> Result<i64, Malformed> {
    match value {
        ScriptValue::Integer(i) => Ok(*i),
        ScriptValue::Number(n) if n.fract() == 0.0 => Ok(*n as i64),
        other => Err(Malformed::new("integer", other)),
    }
}

pub fn opt_integer(value: Option<&ScriptValue>) -> Result<Option<i64>, Malformed> {
    match value {
        None | Some(ScriptValue::Nil) => Ok(None),
        Some(v) => integer(v).map(Some),
    }
}

pub fn opt_number(value: Option<&ScriptValue>) -> Result<Option<f64>, Malformed> {
    match value {
        None | Some(ScriptValue::Nil) => Ok(None),
        Some(ScriptValue::Integer(i)) => Ok(Some(*i as f64)),
        Some(ScriptValue::Number(n)) => Ok(Some(*n)),
        Some(other) => Err(Malformed::new("number", other)),
    }
}

pub fn opt_bool(value: Option<&ScriptValue>) -> Result<Option<bool>, Malformed> {
    match value {
        None | Some(ScriptValue::Nil) => Ok(None),
        Some(ScriptValue::Boolean(b)) => Ok(Some(*b)),
        Some(other) => Err(Malformed::new("boolean", other)),
    }
}

pub fn bool_or(value: Option<&ScriptValue>, default: bool) -> Result<bool, Malformed> {
    Ok(opt_bool(value)?.unwrap_or(default))
}

/// Coerce a monetary amount to integer cents.
///
/// Costs are written as decimal coin values; `1.5` becomes `150`.
pub fn cost_cents(value: &ScriptValue) -> Result<i64, Malformed> {
    let amount = match value {
        ScriptValue::Integer(i) => *i as f64,
        ScriptValue::Number(n) => *n,
        other => return Err(Malformed::new("number", other)),
    };
    Ok((amount * 100.0).round() as i64)
}

/// Coerce a list field. An absent field is an empty list.
pub fn sequence(value: Option<&ScriptValue>) -> Result<Vec<&ScriptValue>, Malformed> {
    match value {
        None | Some(ScriptValue::Nil) => Ok(Vec::new()),
        Some(ScriptValue::Sequence(items)) => Ok(items.iter().collect()),
        Some(other) => Err(Malformed::new("list", other)),
    }
}

/// Coerce a list of strings. An absent field is an empty list.
pub fn string_list(value: Option<&ScriptValue>) -> Result<Vec<String>, Malformed> {
    sequence(value)?.into_iter().map(string).collect()
}

/// Coerce a string-keyed table. An absent field is an empty map.
pub fn map_entries(
    value: Option<&ScriptValue>,
) -> Result<Vec<(&String, &ScriptValue)>, Malformed> {
    match value {
        None | Some(ScriptValue::Nil) => Ok(Vec::new()),
        Some(ScriptValue::Map(entries)) => {
            Ok(entries.iter().map(|(k, v)| (k, v)).collect())
        }
        // An empty Lua table classifies as an empty sequence.
        Some(ScriptValue::Sequence(items)) if items.is_empty() => Ok(Vec::new()),
        Some(other) => Err(Malformed::new("table", other)),
    }
}

/// Coerce a table of string-valued facts or qualities.
pub fn string_map(value: Option<&ScriptValue>) -> Result<FactValues, Malformed> {
    let mut map = FactValues::new();
    for (key, entry) in map_entries(value)? {
        map.insert(key.clone(), string(entry)?);
    }
    Ok(map)
}

/// Coerce a formula: an integer literal, formula text, or an opaque value
/// from the `Formula` entry point.
pub fn formula(value: &ScriptValue) -> Result<Formula, Malformed> {
    match value {
        ScriptValue::Integer(i) => Ok(Formula::Constant(*i)),
        ScriptValue::Number(n) if n.fract() == 0.0 => Ok(Formula::Constant(*n as i64)),
        ScriptValue::String(s) => Ok(Formula::parse(s)),
        ScriptValue::Opaque(u) => match u.borrow::<FormulaValue>() {
            Ok(f) => Ok(f.0.clone()),
            Err(_) => Err(Malformed::new("formula", value)),
        },
        other => Err(Malformed::new("formula", other)),
    }
}

pub fn opt_formula(value: Option<&ScriptValue>) -> Result<Option<Formula>, Malformed> {
    match value {
        None | Some(ScriptValue::Nil) => Ok(None),
        Some(v) => formula(v).map(Some),
    }
}

pub fn opt_dice_formula(value: Option<&ScriptValue>) -> Result<Option<DiceFormula>, Malformed> {
    match value {
        None | Some(ScriptValue::Nil) => Ok(None),
        Some(ScriptValue::String(s)) => Ok(Some(DiceFormula(s.clone()))),
        Some(ScriptValue::Opaque(u)) => match u.borrow::<DiceFormulaValue>() {
            Ok(d) => Ok(Some(d.0.clone())),
            Err(_) => Err(Malformed {
                expected: "dice formula",
                found: "userdata".to_string(),
            }),
        },
        Some(other) => Err(Malformed::new("dice formula", other)),
    }
}

/// Coerce a condition field: a single callable, or a list of callables that
/// must all pass. Absent means always true.
pub fn condition(value: Option<&ScriptValue>) -> Result<Condition, Malformed> {
    match value {
        None | Some(ScriptValue::Nil) => Ok(Condition::Always),
        Some(ScriptValue::Callable(f)) => Ok(Condition::Checks(vec![f.clone()])),
        Some(ScriptValue::Sequence(items)) => {
            let mut checks = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    ScriptValue::Callable(f) => checks.push(f.clone()),
                    other => return Err(Malformed::new("function", other)),
                }
            }
            if checks.is_empty() {
                Ok(Condition::Always)
            } else {
                Ok(Condition::Checks(checks))
            }
        }
        Some(other) => Err(Malformed::new("function or list of functions", other)),
    }
}

/// Coerce an opaque chooser produced by a `Choose*` entry point.
pub fn opt_chooser(value: Option<&ScriptValue>) -> Result<Option<Chooser>, Malformed> {
    match value {
        None | Some(ScriptValue::Nil) => Ok(None),
        Some(ScriptValue::Opaque(u)) => match u.borrow::<ChooserValue>() {
            Ok(c) => Ok(Some(c.0.clone())),
            Err(_) => Err(Malformed {
                expected: "chooser",
                found: "userdata".to_string(),
            }),
        },
        Some(other) => Err(Malformed::new("chooser", other)),
    }
}

/// Coerce display text: a plain string, or a table with a `FormatString`
/// and formula `Arguments`.
pub fn formattable(value: &ScriptValue) -> Result<Formattable, Malformed> {
    match value {
        ScriptValue::String(s) => Ok(Formattable::plain(s.clone())),
        ScriptValue::Map(_) => {
            let format = match value.get("FormatString") {
                Some(f) => string(f)?,
                None => return Err(Malformed::new("FormatString field", value)),
            };
            let arguments = sequence(value.get("Arguments"))?
                .into_iter()
                .map(formula)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Formattable { format, arguments })
        }
        other => Err(Malformed::new("string or format table", other)),
    }
}

pub fn opt_formattable(value: Option<&ScriptValue>) -> Result<Option<Formattable>, Malformed> {
    match value {
        None | Some(ScriptValue::Nil) => Ok(None),
        Some(v) => formattable(v).map(Some),
    }
}

/// Parse a class level span: a plain level number, or a
/// `"Start=N,Repeat=M"` repetition string. Returns `(start, repeat)`.
pub fn level_span(value: &ScriptValue) -> Result<(i64, i64), Malformed> {
    match value {
        ScriptValue::Integer(i) => Ok((*i, 0)),
        ScriptValue::String(s) => {
            if let Ok(level) = s.trim().parse::<i64>() {
                return Ok((level, 0));
            }
            parse_repeat_text(s).ok_or(Malformed {
                expected: "level number or Start=N,Repeat=M",
                found: format!("string '{}'", s),
            })
        }
        other => Err(Malformed::new("level number or Start=N,Repeat=M", other)),
    }
}

fn parse_repeat_text(text: &str) -> Option<(i64, i64)> {
    let (start_part, repeat_part) = text.split_once(',')?;
    let start = start_part.trim().strip_prefix("Start=")?.trim().parse().ok()?;
    let repeat = repeat_part.trim().strip_prefix("Repeat=")?.trim().parse().ok()?;
    Some((start, repeat))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlua::Lua;

    fn eval(lua: &Lua, source: &str) -> ScriptValue {
        let value: mlua::Value = lua.load(source).eval().unwrap();
        ScriptValue::from_lua(value).unwrap()
    }

    #[test]
    fn test_cost_cents() {
        assert_eq!(cost_cents(&ScriptValue::Integer(5)).unwrap(), 500);
        assert_eq!(cost_cents(&ScriptValue::Number(1.5)).unwrap(), 150);
        assert_eq!(cost_cents(&ScriptValue::Number(0.01)).unwrap(), 1);
        assert!(cost_cents(&ScriptValue::String("five".to_string())).is_err());
    }

    #[test]
    fn test_absent_list_is_empty() {
        assert!(sequence(None).unwrap().is_empty());
        assert!(string_list(None).unwrap().is_empty());
        assert!(string_map(None).unwrap().is_empty());
    }

    #[test]
    fn test_string_list_rejects_non_strings() {
        let lua = Lua::new();
        let value = eval(&lua, "{'a', 2}");
        assert!(string_list(Some(&value)).is_err());
    }

    #[test]
    fn test_empty_table_as_map() {
        let lua = Lua::new();
        let value = eval(&lua, "{}");
        assert!(string_map(Some(&value)).unwrap().is_empty());
    }

    #[test]
    fn test_formula_variants() {
        assert_eq!(
            formula(&ScriptValue::Integer(3)).unwrap(),
            Formula::Constant(3)
        );
        assert_eq!(
            formula(&ScriptValue::String("7".to_string())).unwrap(),
            Formula::Constant(7)
        );
        assert_eq!(
            formula(&ScriptValue::String("CL/2".to_string())).unwrap(),
            Formula::Symbolic("CL/2".to_string())
        );
    }

    #[test]
    fn test_formula_from_opaque() {
        let lua = Lua::new();
        let ud = lua
            .create_userdata(FormulaValue(Formula::Symbolic("STR".to_string())))
            .unwrap();
        let value = ScriptValue::Opaque(ud);
        assert_eq!(
            formula(&value).unwrap(),
            Formula::Symbolic("STR".to_string())
        );
    }

    #[test]
    fn test_dice_formula_from_text_and_opaque() {
        let text = ScriptValue::String("2d6+1".to_string());
        assert_eq!(
            opt_dice_formula(Some(&text)).unwrap(),
            Some(DiceFormula("2d6+1".to_string()))
        );

        let lua = Lua::new();
        let ud = lua
            .create_userdata(DiceFormulaValue(DiceFormula("1d8".to_string())))
            .unwrap();
        let value = ScriptValue::Opaque(ud);
        assert_eq!(
            opt_dice_formula(Some(&value)).unwrap(),
            Some(DiceFormula("1d8".to_string()))
        );
        assert_eq!(opt_dice_formula(None).unwrap(), None);
    }

    #[test]
    fn test_condition_single_and_list() {
        let lua = Lua::new();
        let single = eval(&lua, "function() return true end");
        match condition(Some(&single)).unwrap() {
            Condition::Checks(checks) => assert_eq!(checks.len(), 1),
            Condition::Always => panic!("expected checks"),
        }

        let list = eval(
            &lua,
            "{ function() return true end, function() return false end }",
        );
        match condition(Some(&list)).unwrap() {
            Condition::Checks(checks) => assert_eq!(checks.len(), 2),
            Condition::Always => panic!("expected checks"),
        }

        assert!(condition(None).unwrap().is_always());
    }

    #[test]
    fn test_formattable_table() {
        let lua = Lua::new();
        let value = eval(&lua, "{ FormatString = '%1 rounds', Arguments = { 'CL' } }");
        let f = formattable(&value).unwrap();
        assert_eq!(f.format, "%1 rounds");
        assert_eq!(f.arguments, vec![Formula::Symbolic("CL".to_string())]);

        let wrong = eval(&lua, "{ Label = '%1 rounds' }");
        assert!(formattable(&wrong).is_err());
    }

    #[test]
    fn test_level_span() {
        assert_eq!(level_span(&ScriptValue::Integer(4)).unwrap(), (4, 0));
        assert_eq!(
            level_span(&ScriptValue::String("6".to_string())).unwrap(),
            (6, 0)
        );
        assert_eq!(
            level_span(&ScriptValue::String("Start=2,Repeat=3".to_string())).unwrap(),
            (2, 3)
        );
        assert!(level_span(&ScriptValue::String("Whenever".to_string())).is_err());
    }

    #[test]
    fn test_malformed_display() {
        let err = string(&ScriptValue::Integer(1)).unwrap_err();
        assert_eq!(err.to_string(), "expected string, found integer");
    }
}
