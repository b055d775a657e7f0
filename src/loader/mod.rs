//! The two-phase loader: execute data files, then link the results.

pub mod binder;
pub mod diagnostics;
pub mod parse;
pub mod registry;

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use crate::data::dataset::DataSet;
use crate::error::Result;
use crate::script::ScriptEngine;

use binder::Binder;
pub use diagnostics::{Strictness, Violation};
use parse::{register_entry_points, LoaderState};

/// Loads rule-content files into immutable data sets.
///
/// One loader holds a data set root directory and a diagnostics policy;
/// each `load_*` call runs a fresh script session and produces an
/// independent `DataSet`.
pub struct DataSetLoader {
    root: PathBuf,
    strictness: Strictness,
}

impl DataSetLoader {
    pub fn new(root: impl Into<PathBuf>, strictness: Strictness) -> DataSetLoader {
        DataSetLoader {
            root: root.into(),
            strictness,
        }
    }

    /// Load a data set from a file. Nested `ImportFile` calls resolve
    /// relative to the file's directory, or to the loader root for
    /// root-marker paths.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<DataSet> {
        let path = path.as_ref();
        debug!(file = %path.display(), "loading data set");
        let source = fs::read_to_string(path)?;

        let (engine, state) = self.prepare()?;
        state.borrow_mut().diag.push_file(path.to_path_buf());
        let result = engine.execute_named(&source, &format!("@{}", path.display()));
        state.borrow_mut().diag.pop_file();
        result?;

        self.finish(engine, state)
    }

    /// Load a data set from in-memory source. `ImportFile` calls resolve
    /// against the loader root.
    pub fn load_string(&self, source: &str) -> Result<DataSet> {
        let (engine, state) = self.prepare()?;
        engine.execute(source)?;
        self.finish(engine, state)
    }

    fn prepare(&self) -> Result<(ScriptEngine, Rc<RefCell<LoaderState>>)> {
        let engine = ScriptEngine::new()?;
        let state = Rc::new(RefCell::new(LoaderState::new(
            self.root.clone(),
            self.strictness,
        )));
        register_entry_points(engine.lua(), Rc::clone(&state))?;
        Ok((engine, state))
    }

    fn finish(&self, engine: ScriptEngine, state: Rc<RefCell<LoaderState>>) -> Result<DataSet> {
        // Entry-point closures keep their own handles on the state cell, so
        // swap the contents out rather than unwrapping the Rc.
        let taken = {
            let mut st = state.borrow_mut();
            std::mem::replace(
                &mut *st,
                LoaderState::new(self.root.clone(), self.strictness),
            )
        };
        debug!("script phase complete, binding");
        Binder::new(taken.regs).build(engine.into_lua(), taken.info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_fact_data_set() {
        let loader = DataSetLoader::new(".", Strictness::Strict);
        let data = loader
            .load_string(
                r#"DefineFact({ Category = "TESTCAT", Key = "TestKey", DataFormat = "String" })"#,
            )
            .unwrap();

        let fact = data.fact("TESTCAT", "TestKey").unwrap();
        assert!(fact.required && fact.selectable && fact.visible);
        assert_eq!(fact.data_format, "String");
        assert!(fact.display_name.is_none());
        assert!(fact.explanation.is_none());
        assert_eq!(data.facts.len(), 1);
    }

    #[test]
    fn test_empty_source_yields_empty_data_set() {
        let loader = DataSetLoader::new(".", Strictness::Strict);
        let data = loader.load_string("").unwrap();
        assert!(data.abilities.is_empty());
        assert!(data.info.is_none());
    }

    #[test]
    fn test_script_error_propagates() {
        let loader = DataSetLoader::new(".", Strictness::Strict);
        assert!(loader.load_string("error('bad content')").is_err());
    }
}
