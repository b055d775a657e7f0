//! Grimoire - rule-content compiler for tabletop RPG character builders.
//!
//! Loads declarative rule data authored as Lua scripts into one consistent,
//! immutable in-memory rule database. Loading is two-phase: data files
//! execute against fixed host entry points and accumulate unbound records,
//! then a binder links every cross-reference into a shared immutable graph.

pub mod data;
pub mod error;
pub mod loader;
pub mod logging;
pub mod script;

pub use data::bound::{
    Ability, AbilityScore, Class, ClassLevel, Domain, Equipment, EquipmentAddModifier,
    EquipmentModifier, Grant, RepeatingClassLevel, Skill,
};
pub use data::choosers::{
    Choice, Chooser, ChooserKind, NameModifier, NameModifierLocation, NameModifierText,
};
pub use data::dataset::{AbilityMap, DataSet};
pub use data::types::{
    AbilityCategory, AddedCasterLevel, Alignment, Aspect, Bonus, Condition, DataSetInformation,
    DiceFormula, Fact, Formattable, Formula, Link, PublisherInfo, Save, SourceInfo, SpellList,
    SpellListLevel, Variable, VariableDefinition,
};
pub use error::{GrimoireError, Result};
pub use loader::{DataSetLoader, Strictness, Violation};
