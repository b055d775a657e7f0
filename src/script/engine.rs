//! Lua script engine with sandboxing.
//!
//! Data files are declarative Lua. They get the stock base, string, table and
//! math libraries, but no filesystem, process or module access; file
//! inclusion goes through the host's `ImportFile` entry point instead.

use mlua::{Lua, Value};

use crate::{GrimoireError, Result};

/// Sandboxed Lua engine that executes data files.
pub struct ScriptEngine {
    lua: Lua,
}

impl ScriptEngine {
    pub fn new() -> Result<Self> {
        let lua = Lua::new();
        Self::apply_sandbox(&lua)?;
        Ok(Self { lua })
    }

    /// Apply sandbox restrictions to the Lua environment.
    fn apply_sandbox(lua: &Lua) -> Result<()> {
        let globals = lua.globals();

        let nil = Value::Nil;
        for name in [
            "os",
            "io",
            "loadfile",
            "dofile",
            "load",
            "require",
            "package",
            "debug",
            "collectgarbage",
        ] {
            globals
                .set(name, nil.clone())
                .map_err(|e| GrimoireError::Script(format!("Failed to disable {}: {}", name, e)))?;
        }

        // Some published data files start with a bare `import(...)` call that
        // predates ImportFile. Accept and ignore it.
        let noop = lua
            .create_function(|_, _: mlua::MultiValue| Ok(()))
            .map_err(|e| GrimoireError::Script(format!("Failed to create import shim: {}", e)))?;
        globals
            .set("import", noop)
            .map_err(|e| GrimoireError::Script(format!("Failed to set import shim: {}", e)))?;

        Ok(())
    }

    /// Execute Lua source code under the given chunk name.
    ///
    /// The chunk name (normally the file path) shows up in Lua error
    /// messages and tracebacks.
    pub fn execute_named(&self, source: &str, chunk_name: &str) -> Result<()> {
        self.lua
            .load(source)
            .set_name(chunk_name)
            .exec()
            .map_err(GrimoireError::from)
    }

    /// Execute Lua source code.
    pub fn execute(&self, source: &str) -> Result<()> {
        self.execute_named(source, "=(load)")
    }

    /// Set a global value in the Lua environment.
    pub fn set_global<V: mlua::IntoLua>(&self, name: &str, value: V) -> Result<()> {
        self.lua
            .globals()
            .set(name, value)
            .map_err(|e| GrimoireError::Script(format!("Failed to set global '{}': {}", name, e)))
    }

    /// Get a global value from the Lua environment.
    pub fn get_global<V: mlua::FromLua>(&self, name: &str) -> Result<V> {
        self.lua
            .globals()
            .get(name)
            .map_err(|e| GrimoireError::Script(format!("Failed to get global '{}': {}", name, e)))
    }

    /// Get a reference to the underlying Lua instance.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Consume the engine, handing ownership of the interpreter to the
    /// caller. Used when a finished data set takes over the Lua lifetime.
    pub fn into_lua(self) -> Lua {
        self.lua
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_execution() {
        let engine = ScriptEngine::new().unwrap();
        engine.execute("x = 1 + 2").unwrap();

        let result: i32 = engine.get_global("x").unwrap();
        assert_eq!(result, 3);
    }

    #[test]
    fn test_string_operations() {
        let engine = ScriptEngine::new().unwrap();
        engine
            .execute(r#"result = string.upper("hello")"#)
            .unwrap();

        let result: String = engine.get_global("result").unwrap();
        assert_eq!(result, "HELLO");
    }

    #[test]
    fn test_sandbox_os_disabled() {
        let engine = ScriptEngine::new().unwrap();
        let result = engine.execute("os.execute('ls')");
        assert!(result.is_err());
    }

    #[test]
    fn test_sandbox_io_disabled() {
        let engine = ScriptEngine::new().unwrap();
        let result = engine.execute("io.open('/etc/passwd', 'r')");
        assert!(result.is_err());
    }

    #[test]
    fn test_sandbox_require_disabled() {
        let engine = ScriptEngine::new().unwrap();
        let result = engine.execute("require('os')");
        assert!(result.is_err());
    }

    #[test]
    fn test_import_shim_is_a_noop() {
        let engine = ScriptEngine::new().unwrap();
        engine.execute(r#"import("@/legacy/path.lua")"#).unwrap();
    }

    #[test]
    fn test_chunk_name_in_errors() {
        let engine = ScriptEngine::new().unwrap();
        let err = engine
            .execute_named("error('boom')", "books/core.lua")
            .unwrap_err();
        assert!(err.to_string().contains("books/core.lua"));
    }

    #[test]
    fn test_syntax_error() {
        let engine = ScriptEngine::new().unwrap();
        assert!(engine.execute("this is not valid lua").is_err());
    }

    #[test]
    fn test_set_and_get_global() {
        let engine = ScriptEngine::new().unwrap();
        engine.set_global("my_value", 42).unwrap();
        let result: i32 = engine.get_global("my_value").unwrap();
        assert_eq!(result, 42);
    }
}
