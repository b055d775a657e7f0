//! Owned representation of Lua values passed to the host entry points.
//!
//! Declaration tables are converted into `ScriptValue` trees up front so the
//! parsing code can inspect them without holding Lua table references.
//! Callables and host-created opaque values are carried through by handle.

use mlua::{AnyUserData, FromLua, Function, Lua, Table, UserData, Value};

use crate::data::choosers::Chooser;
use crate::data::types::{DiceFormula, Formula};

/// A Lua value lifted into an owned tree.
#[derive(Debug, Clone)]
pub enum ScriptValue {
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
    /// A table whose keys are exactly `1..=n`.
    Sequence(Vec<ScriptValue>),
    /// Any other table, as string-keyed entries in iteration order.
    Map(Vec<(String, ScriptValue)>),
    /// A Lua function, kept as a handle for later evaluation.
    Callable(Function),
    /// A host-created value (formula, dice formula, chooser).
    Opaque(AnyUserData),
}

impl ScriptValue {
    pub fn from_lua(value: Value) -> mlua::Result<ScriptValue> {
        Ok(match value {
            Value::Nil => ScriptValue::Nil,
            Value::Boolean(b) => ScriptValue::Boolean(b),
            Value::Integer(i) => ScriptValue::Integer(i),
            Value::Number(n) => ScriptValue::Number(n),
            Value::String(s) => ScriptValue::String(s.to_str()?.to_string()),
            Value::Table(table) => Self::from_table(table)?,
            Value::Function(f) => ScriptValue::Callable(f),
            Value::UserData(u) => ScriptValue::Opaque(u),
            other => {
                return Err(mlua::Error::RuntimeError(format!(
                    "unsupported value of type {}",
                    other.type_name()
                )))
            }
        })
    }

    /// Classify a table as a sequence or a map.
    ///
    /// A table is a sequence when its keys are exactly the integers `1..=n`;
    /// the empty table counts as an empty sequence. Everything else becomes
    /// a map with keys stringified.
    fn from_table(table: Table) -> mlua::Result<ScriptValue> {
        let mut pure_sequence = true;
        let mut max_key = 0i64;
        let mut raw_entries = Vec::new();
        for pair in table.clone().pairs::<Value, Value>() {
            let (key, value) = pair?;
            match key {
                Value::Integer(i) if i >= 1 => max_key = max_key.max(i),
                _ => pure_sequence = false,
            }
            raw_entries.push((key, value));
        }

        if pure_sequence && max_key == raw_entries.len() as i64 {
            let mut items = Vec::with_capacity(raw_entries.len());
            for index in 1..=max_key {
                items.push(ScriptValue::from_lua(table.raw_get(index)?)?);
            }
            return Ok(ScriptValue::Sequence(items));
        }

        let mut entries = Vec::with_capacity(raw_entries.len());
        for (key, value) in raw_entries {
            let key = match key {
                Value::String(s) => s.to_str()?.to_string(),
                Value::Integer(i) => i.to_string(),
                Value::Number(n) => n.to_string(),
                other => {
                    return Err(mlua::Error::RuntimeError(format!(
                        "unsupported table key of type {}",
                        other.type_name()
                    )))
                }
            };
            entries.push((key, ScriptValue::from_lua(value)?));
        }
        Ok(ScriptValue::Map(entries))
    }

    /// Look up a map entry by field name.
    pub fn get(&self, field: &str) -> Option<&ScriptValue> {
        match self {
            ScriptValue::Map(entries) => entries
                .iter()
                .find(|(key, _)| key == field)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, ScriptValue::Nil)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Nil => "nil",
            ScriptValue::Boolean(_) => "boolean",
            ScriptValue::Integer(_) => "integer",
            ScriptValue::Number(_) => "number",
            ScriptValue::String(_) => "string",
            ScriptValue::Sequence(_) => "sequence",
            ScriptValue::Map(_) => "table",
            ScriptValue::Callable(_) => "function",
            ScriptValue::Opaque(_) => "userdata",
        }
    }
}

impl FromLua for ScriptValue {
    fn from_lua(value: Value, _lua: &Lua) -> mlua::Result<ScriptValue> {
        ScriptValue::from_lua(value)
    }
}

/// Opaque formula value returned by the `Formula` entry point.
#[derive(Debug, Clone)]
pub struct FormulaValue(pub Formula);

impl UserData for FormulaValue {}

/// Opaque dice expression returned by the `DiceFormula` entry point.
#[derive(Debug, Clone)]
pub struct DiceFormulaValue(pub DiceFormula);

impl UserData for DiceFormulaValue {}

/// Opaque chooser returned by the `Choose*` entry points.
#[derive(Debug, Clone)]
pub struct ChooserValue(pub Chooser);

impl UserData for ChooserValue {}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(lua: &Lua, source: &str) -> ScriptValue {
        let value: Value = lua.load(source).eval().unwrap();
        ScriptValue::from_lua(value).unwrap()
    }

    #[test]
    fn test_scalars() {
        let lua = Lua::new();
        assert!(matches!(eval(&lua, "nil"), ScriptValue::Nil));
        assert!(matches!(eval(&lua, "true"), ScriptValue::Boolean(true)));
        assert!(matches!(eval(&lua, "3"), ScriptValue::Integer(3)));
        match eval(&lua, "'hi'") {
            ScriptValue::String(s) => assert_eq!(s, "hi"),
            other => panic!("expected string, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_sequence_classification() {
        let lua = Lua::new();
        match eval(&lua, "{'a', 'b', 'c'}") {
            ScriptValue::Sequence(items) => assert_eq!(items.len(), 3),
            other => panic!("expected sequence, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_empty_table_is_sequence() {
        let lua = Lua::new();
        match eval(&lua, "{}") {
            ScriptValue::Sequence(items) => assert!(items.is_empty()),
            other => panic!("expected sequence, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_map_classification() {
        let lua = Lua::new();
        let value = eval(&lua, "{ Name = 'Dodge', Visible = false }");
        match &value {
            ScriptValue::Map(entries) => assert_eq!(entries.len(), 2),
            other => panic!("expected map, got {}", other.type_name()),
        }
        assert!(matches!(
            value.get("Visible"),
            Some(ScriptValue::Boolean(false))
        ));
        assert!(value.get("Missing").is_none());
    }

    #[test]
    fn test_mixed_table_is_map() {
        let lua = Lua::new();
        let value = eval(&lua, "{ 'positional', Name = 'X' }");
        match value {
            ScriptValue::Map(entries) => {
                assert!(entries.iter().any(|(k, _)| k == "1"));
                assert!(entries.iter().any(|(k, _)| k == "Name"));
            }
            other => panic!("expected map, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_sparse_sequence_is_map() {
        let lua = Lua::new();
        let value = eval(&lua, "{ [1] = 'a', [3] = 'c' }");
        assert!(matches!(value, ScriptValue::Map(_)));
    }

    #[test]
    fn test_nested_tables() {
        let lua = Lua::new();
        let value = eval(&lua, "{ Bonuses = { { Category = 'SKILL' } } }");
        let bonuses = value.get("Bonuses").unwrap();
        match bonuses {
            ScriptValue::Sequence(items) => {
                assert!(matches!(
                    items[0].get("Category"),
                    Some(ScriptValue::String(s)) if s == "SKILL"
                ));
            }
            other => panic!("expected sequence, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_callable_carried_by_handle() {
        let lua = Lua::new();
        match eval(&lua, "function() return 1 end") {
            ScriptValue::Callable(f) => {
                let result: i64 = f.call(()).unwrap();
                assert_eq!(result, 1);
            }
            other => panic!("expected callable, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_opaque_userdata_downcast() {
        let lua = Lua::new();
        let ud = lua
            .create_userdata(FormulaValue(Formula::Constant(4)))
            .unwrap();
        let value = ScriptValue::from_lua(Value::UserData(ud)).unwrap();
        match value {
            ScriptValue::Opaque(u) => {
                let formula = u.borrow::<FormulaValue>().unwrap();
                assert_eq!(formula.0, Formula::Constant(4));
            }
            other => panic!("expected userdata, got {}", other.type_name()),
        }
    }
}
