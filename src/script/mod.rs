//! Embedded Lua layer: the sandboxed engine, owned value trees, and field
//! coercion used by the loader callbacks.

pub mod coerce;
pub mod engine;
pub mod value;

pub use engine::ScriptEngine;
pub use value::ScriptValue;
