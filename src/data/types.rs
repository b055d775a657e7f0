//! Leaf value types shared across entity kinds.
//!
//! Everything here is carried opaquely by the rule database: formulas and
//! conditions are stored, not evaluated, during a load. Evaluation belongs
//! to the character-statistics engine, which is a separate consumer.

use std::collections::HashMap;

use mlua::{Function, IntoLuaMulti};

use crate::error::{GrimoireError, Result};

/// A numeric rule formula.
///
/// Data files write formulas either as plain integers, as numeric strings,
/// or as symbolic expressions over rule variables. Symbolic expressions are
/// kept verbatim for the evaluation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    Constant(i64),
    Symbolic(String),
}

impl Formula {
    /// Parse formula text: an integer literal becomes a constant, anything
    /// else is kept as a symbolic expression.
    pub fn parse(text: &str) -> Formula {
        match text.trim().parse::<i64>() {
            Ok(value) => Formula::Constant(value),
            Err(_) => Formula::Symbolic(text.to_string()),
        }
    }

    /// The constant value, if this formula is a literal.
    pub fn constant(&self) -> Option<i64> {
        match self {
            Formula::Constant(value) => Some(*value),
            Formula::Symbolic(_) => None,
        }
    }
}

/// A dice expression such as `"2d6+1"`, carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiceFormula(pub String);

/// A predicate over some rule entity, built from Lua callables.
///
/// A condition written as a list of callables means the logical AND of all
/// of them; an absent condition is always true.
#[derive(Debug, Clone, Default)]
pub enum Condition {
    #[default]
    Always,
    Checks(Vec<Function>),
}

impl Condition {
    pub fn is_always(&self) -> bool {
        matches!(self, Condition::Always)
    }

    /// Combine two conditions with logical AND.
    ///
    /// `Always` is the identity: combining with it returns the other side
    /// unchanged.
    pub fn and(self, other: Condition) -> Condition {
        match (self, other) {
            (Condition::Always, other) => other,
            (cond, Condition::Always) => cond,
            (Condition::Checks(mut left), Condition::Checks(right)) => {
                left.extend(right);
                Condition::Checks(left)
            }
        }
    }

    /// Evaluate the condition against an argument, calling each check in turn.
    pub fn evaluate<A>(&self, arg: A) -> Result<bool>
    where
        A: IntoLuaMulti + Clone,
    {
        match self {
            Condition::Always => Ok(true),
            Condition::Checks(checks) => {
                for check in checks {
                    let passed: bool = check
                        .call(arg.clone())
                        .map_err(|e| GrimoireError::Script(e.to_string()))?;
                    if !passed {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

/// Display text with formula arguments spliced in by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formattable {
    pub format: String,
    pub arguments: Vec<Formula>,
}

impl Formattable {
    pub fn plain(text: impl Into<String>) -> Formattable {
        Formattable {
            format: text.into(),
            arguments: Vec::new(),
        }
    }
}

/// A named aspect of an ability (formattable text plus a label).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aspect {
    pub name: String,
    pub format: String,
    pub arguments: Vec<Formula>,
}

/// A bonus granted by an entity to one or more rule variables.
#[derive(Debug, Clone)]
pub struct Bonus {
    pub category: String,
    pub variables: Vec<String>,
    pub formula: Option<Formula>,
    pub condition: Condition,
}

/// Declaration of a rule variable with its initial value.
#[derive(Debug, Clone)]
pub struct VariableDefinition {
    pub name: String,
    pub initial_value: Option<Formula>,
}

/// A modification an ability score applies to another rule target.
#[derive(Debug, Clone)]
pub struct ModDefinition {
    pub target: String,
    pub action: String,
    pub value: Option<Formula>,
}

/// One caster level added by a class level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddedCasterLevel {
    /// Applies to any spellcasting class.
    Any,
    /// Restricted to classes of the given type.
    OfKind(String),
}

/// Inclusive charge range of an equipment modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

/// Armor type conversion applied by an equipment modifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmorTypeChange {
    pub from: String,
    pub to: String,
}

/// A spell list carried by a domain.
#[derive(Debug, Clone)]
pub struct SpellList {
    pub kind: String,
    pub name: String,
    pub levels: Vec<SpellListLevel>,
}

/// Spells available at one spell level of a spell list.
#[derive(Debug, Clone)]
pub struct SpellListLevel {
    pub spell_level: i64,
    pub spells: Vec<String>,
}

/// Provenance of a declaration: the source book it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub long_name: String,
    pub short_name: String,
    pub web: String,
    pub date: String,
}

/// Publisher details for a data set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherInfo {
    pub short_name: String,
    pub long_name: String,
    pub url: String,
}

/// An external link advertised by a data set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    pub url: String,
    pub text: String,
}

/// Top-level metadata of a data set, from `SetDataSetInfo`.
#[derive(Debug, Clone)]
pub struct DataSetInformation {
    pub name: String,
    pub source: Option<SourceInfo>,
    pub game_mode: String,
    pub book_types: Vec<String>,
    pub types: Vec<String>,
    pub status: String,
    pub copyright: String,
    pub description: String,
    pub genre: String,
    pub info_text: String,
    pub help_url: String,
    pub is_mature: bool,
    pub is_ogl: bool,
    pub is_licensed: bool,
    pub condition: Condition,
    pub publisher: Option<PublisherInfo>,
    pub rank: i64,
    pub show_in_menu: bool,
    pub setting: String,
    pub links: Vec<Link>,
}

/// A fact definition: a typed, named datum entities may carry.
///
/// Facts are registered under `Category|Key`.
#[derive(Debug, Clone)]
pub struct Fact {
    pub category: String,
    pub selectable: bool,
    pub visible: bool,
    pub required: bool,
    pub data_format: String,
    pub display_name: Option<String>,
    pub explanation: Option<String>,
}

/// An alignment entry.
#[derive(Debug, Clone)]
pub struct Alignment {
    pub name: String,
    pub abbreviation: String,
    pub sort_key: String,
}

/// A saving throw definition.
#[derive(Debug, Clone)]
pub struct Save {
    pub name: String,
    pub sort_key: String,
    pub bonus: Option<Bonus>,
}

/// A rule variable declaration.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub var_type: String,
    pub channel: Option<String>,
    pub scope: Option<String>,
}

/// An ability category (feats, traits, class features, ...).
#[derive(Debug, Clone)]
pub struct AbilityCategory {
    pub name: String,
    pub category: String,
    pub plural: String,
    pub display_location: Option<String>,
    pub visible: bool,
    pub editable: bool,
    pub edit_pool: bool,
    pub fractional_pool: bool,
    pub pool: Option<String>,
    pub ability_list: Option<String>,
    pub types: Vec<String>,
}

/// String-keyed fact values attached to an entity (`Fact = { ... }` blocks).
pub type FactValues = HashMap<String, String>;
