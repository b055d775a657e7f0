//! The immutable result of a load.

use std::sync::Arc;

use mlua::Lua;

use crate::data::bound::{
    Ability, AbilityScore, Class, Domain, Equipment, EquipmentModifier, Skill,
};
use crate::data::keyed::KeyedMap;
use crate::data::types::{
    AbilityCategory, Alignment, DataSetInformation, Fact, Save, Variable,
};

/// Abilities addressed through two keyspaces: display name and stable key.
///
/// Both keyspaces share the bound values, so looking an ability up by its
/// name or by its key yields the same `Arc`.
#[derive(Debug, Default)]
pub struct AbilityMap {
    named: KeyedMap<Arc<Ability>>,
    keyed: KeyedMap<Arc<Ability>>,
}

impl AbilityMap {
    pub(crate) fn new(named: KeyedMap<Arc<Ability>>, keyed: KeyedMap<Arc<Ability>>) -> AbilityMap {
        AbilityMap { named, keyed }
    }

    /// Look up an ability, trying the key space first, then the name space.
    pub fn get(&self, name_or_key: &str) -> Option<&Arc<Ability>> {
        self.keyed
            .get(name_or_key)
            .or_else(|| self.named.get(name_or_key))
    }

    pub fn len(&self) -> usize {
        self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty()
    }

    /// Iterate all abilities by display name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Ability>)> {
        self.named.iter()
    }
}

/// A fully loaded and linked rule database.
///
/// The `Lua` instance that executed the data files is kept alive here because
/// bound entities still hold callables (conditions, chooser filters) created
/// by it. Dropping the data set drops the interpreter with it.
#[derive(Debug)]
pub struct DataSet {
    _lua: Lua,
    pub info: Option<DataSetInformation>,
    pub abilities: AbilityMap,
    pub classes: KeyedMap<Arc<Class>>,
    pub domains: KeyedMap<Arc<Domain>>,
    pub ability_scores: KeyedMap<Arc<AbilityScore>>,
    pub skills: KeyedMap<Arc<Skill>>,
    pub equipment: KeyedMap<Arc<Equipment>>,
    pub equipment_modifiers: KeyedMap<Arc<EquipmentModifier>>,
    pub alignments: KeyedMap<Alignment>,
    pub facts: KeyedMap<Fact>,
    pub saves: KeyedMap<Save>,
    pub variables: KeyedMap<Variable>,
    pub ability_categories: KeyedMap<AbilityCategory>,
}

impl DataSet {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        lua: Lua,
        info: Option<DataSetInformation>,
        abilities: AbilityMap,
        classes: KeyedMap<Arc<Class>>,
        domains: KeyedMap<Arc<Domain>>,
        ability_scores: KeyedMap<Arc<AbilityScore>>,
        skills: KeyedMap<Arc<Skill>>,
        equipment: KeyedMap<Arc<Equipment>>,
        equipment_modifiers: KeyedMap<Arc<EquipmentModifier>>,
        alignments: KeyedMap<Alignment>,
        facts: KeyedMap<Fact>,
        saves: KeyedMap<Save>,
        variables: KeyedMap<Variable>,
        ability_categories: KeyedMap<AbilityCategory>,
    ) -> DataSet {
        DataSet {
            _lua: lua,
            info,
            abilities,
            classes,
            domains,
            ability_scores,
            skills,
            equipment,
            equipment_modifiers,
            alignments,
            facts,
            saves,
            variables,
            ability_categories,
        }
    }

    pub fn ability(&self, name_or_key: &str) -> Option<&Arc<Ability>> {
        self.abilities.get(name_or_key)
    }

    pub fn class(&self, name: &str) -> Option<&Arc<Class>> {
        self.classes.get(name)
    }

    pub fn domain(&self, name: &str) -> Option<&Arc<Domain>> {
        self.domains.get(name)
    }

    pub fn ability_score(&self, key: &str) -> Option<&Arc<AbilityScore>> {
        self.ability_scores.get(key)
    }

    pub fn skill(&self, name: &str) -> Option<&Arc<Skill>> {
        self.skills.get(name)
    }

    pub fn equipment_item(&self, name: &str) -> Option<&Arc<Equipment>> {
        self.equipment.get(name)
    }

    pub fn equipment_modifier(&self, key: &str) -> Option<&Arc<EquipmentModifier>> {
        self.equipment_modifiers.get(key)
    }

    pub fn alignment(&self, key: &str) -> Option<&Alignment> {
        self.alignments.get(key)
    }

    /// Look up a fact definition by its `Category|Key` registry key.
    pub fn fact(&self, category: &str, key: &str) -> Option<&Fact> {
        self.facts.get(&format!("{}|{}", category, key))
    }

    pub fn save(&self, name: &str) -> Option<&Save> {
        self.saves.get(name)
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn ability_category(&self, name: &str) -> Option<&AbilityCategory> {
        self.ability_categories.get(name)
    }
}
