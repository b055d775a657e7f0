//! Bound entity types.
//!
//! Bound entities are produced by the binder after every declaration has been
//! parsed. Cross-entity references are direct `Arc` links, optional scalars
//! with documented defaults are materialized, and the whole graph is
//! immutable and cheaply shareable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::data::choosers::{Choice, NameModifier};
use crate::data::types::{
    AddedCasterLevel, ArmorTypeChange, Aspect, Bonus, ChargeRange, Condition, FactValues, Formula,
    Formattable, ModDefinition, SourceInfo, SpellList, VariableDefinition,
};

/// A resolved ability grant.
#[derive(Debug, Clone)]
pub struct Grant {
    pub category: String,
    pub nature: String,
    pub ability: Arc<Ability>,
}

/// A fully bound ability.
#[derive(Debug)]
pub struct Ability {
    pub name: String,
    pub key: Option<String>,
    pub source: Option<SourceInfo>,
    pub bonuses: Vec<Bonus>,
    pub stackable: bool,
    pub category: Option<String>,
    pub allow_multiple: bool,
    pub visible: bool,
    pub definitions: Vec<VariableDefinition>,
    pub aspects: Vec<Aspect>,
    pub types: Vec<String>,
    pub cost: i64,
    pub description: Option<Formattable>,
    pub source_page: Option<String>,
    pub choice: Option<Choice>,
    pub grants: Vec<Grant>,
}

/// The resolved contents of a single class level.
#[derive(Debug, Clone, Default)]
pub struct ClassLevel {
    pub added_caster_levels: Vec<AddedCasterLevel>,
    pub grants: Vec<Grant>,
}

/// A level-progression entry of a class.
#[derive(Debug, Clone)]
pub struct RepeatingClassLevel {
    pub start: i64,
    pub repeat: i64,
    pub info: Arc<ClassLevel>,
}

impl RepeatingClassLevel {
    /// Whether this entry contributes at the given class level.
    ///
    /// The entry matches its start level exactly; with a non-zero repeat it
    /// also matches every level whose distance from the start is a multiple
    /// of the repeat.
    pub fn applies_to(&self, level: i64) -> bool {
        if level == self.start {
            return true;
        }
        self.repeat != 0 && (level - self.start) % self.repeat == 0
    }
}

/// A fully bound class.
#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub source: Option<SourceInfo>,
    pub facts: FactValues,
    pub source_page: Option<String>,
    pub condition: Condition,
    pub definitions: Vec<VariableDefinition>,
    pub bonuses: Vec<Bonus>,
    pub types: Vec<String>,
    pub roles: Vec<String>,
    pub hit_die: Option<i64>,
    pub max_level: Option<i64>,
    pub levels: Vec<RepeatingClassLevel>,
    pub ex_class: Option<Arc<Class>>,
    level_cache: Mutex<HashMap<i64, Arc<ClassLevel>>>,
}

impl Class {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        source: Option<SourceInfo>,
        facts: FactValues,
        source_page: Option<String>,
        condition: Condition,
        definitions: Vec<VariableDefinition>,
        bonuses: Vec<Bonus>,
        types: Vec<String>,
        roles: Vec<String>,
        hit_die: Option<i64>,
        max_level: Option<i64>,
        levels: Vec<RepeatingClassLevel>,
        ex_class: Option<Arc<Class>>,
    ) -> Class {
        Class {
            name,
            source,
            facts,
            source_page,
            condition,
            definitions,
            bonuses,
            types,
            roles,
            hit_die,
            max_level,
            levels,
            ex_class,
            level_cache: Mutex::new(HashMap::new()),
        }
    }

    /// The combined contents of one class level.
    ///
    /// Every progression entry that applies at the level contributes, in
    /// declaration order. Results are memoized per level; repeated calls for
    /// the same level return the same shared value.
    pub fn level(&self, level: i64) -> Arc<ClassLevel> {
        let mut cache = self
            .level_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = cache.get(&level) {
            return Arc::clone(cached);
        }

        let mut combined = ClassLevel::default();
        for entry in &self.levels {
            if entry.applies_to(level) {
                combined
                    .added_caster_levels
                    .extend(entry.info.added_caster_levels.iter().cloned());
                combined.grants.extend(entry.info.grants.iter().cloned());
            }
        }
        let combined = Arc::new(combined);
        cache.insert(level, Arc::clone(&combined));
        combined
    }
}

/// A fully bound domain.
#[derive(Debug)]
pub struct Domain {
    pub name: String,
    pub source: Option<SourceInfo>,
    pub description: Option<Formattable>,
    pub definitions: Vec<VariableDefinition>,
    pub spell_lists: Vec<SpellList>,
    pub condition: Condition,
    pub class_skills: Vec<String>,
    pub source_page: Option<String>,
    pub grants: Vec<Grant>,
}

/// A fully bound ability score.
#[derive(Debug)]
pub struct AbilityScore {
    pub key: String,
    pub name: String,
    pub sort_key: Option<String>,
    pub abbreviation: Option<String>,
    pub stat_mod_formula: Option<Formula>,
    pub modifications: Vec<ModDefinition>,
    pub definitions: Vec<VariableDefinition>,
    pub bonuses: Vec<Bonus>,
    pub grants: Vec<Grant>,
}

/// A fully bound skill. `key_stat` links to the governing ability score.
#[derive(Debug)]
pub struct Skill {
    pub name: String,
    pub source: Option<SourceInfo>,
    pub key_stat: Option<Arc<AbilityScore>>,
    pub use_untrained: bool,
    pub types: Vec<String>,
    pub bonuses: Vec<Bonus>,
    pub source_page: Option<String>,
    pub condition: Condition,
}

/// A modifier attached to an equipment item, with formula parameters.
#[derive(Debug, Clone)]
pub struct EquipmentAddModifier {
    pub parameters: Vec<Formula>,
    pub modifier: Arc<EquipmentModifier>,
}

/// A fully bound equipment item.
#[derive(Debug)]
pub struct Equipment {
    pub name: String,
    pub source: Option<SourceInfo>,
    /// Monetary cost in integer cents.
    pub cost: i64,
    pub base_quantity: Option<i64>,
    pub effective_damage_resistance: Option<i64>,
    pub can_have_mods: bool,
    pub mods_required: bool,
    pub spell_book_page_count: Option<i64>,
    pub pages_per_spell: Option<Formula>,
    pub size: Option<String>,
    pub used_slots: Option<i64>,
    pub weight: Option<f64>,
    pub armor_check_penalty: Option<i64>,
    pub fumble_range: Option<String>,
    pub max_dex: Option<i64>,
    pub proficiency: Option<String>,
    pub range: Option<i64>,
    pub reach: Option<i64>,
    pub reach_multiplier: Option<i64>,
    pub arcane_spell_failure_chance: Option<i64>,
    pub wield_category: Option<String>,
    pub visible: bool,
    pub qualities: FactValues,
    pub bonuses: Vec<Bonus>,
    pub types: Vec<String>,
    pub special_properties: Vec<Formattable>,
    pub description: Option<Formattable>,
    pub modifiers: Vec<EquipmentAddModifier>,
    pub base_item: Option<Arc<Equipment>>,
}

/// A fully bound equipment modifier.
#[derive(Debug)]
pub struct EquipmentModifier {
    pub key: String,
    pub name: Option<String>,
    pub source: Option<SourceInfo>,
    pub bonuses: Vec<Bonus>,
    pub types: Vec<String>,
    pub special_properties: Vec<Formattable>,
    pub description: Option<Formattable>,
    pub cost: Option<Formula>,
    pub granted_item_types: Vec<String>,
    pub visible: bool,
    pub affects_both_heads: bool,
    pub name_modifier: NameModifier,
    pub choice: Option<Choice>,
    /// Equipment items this modifier replaces when applied.
    pub replaces: Vec<Arc<Equipment>>,
    pub armor_type_change: Option<ArmorTypeChange>,
    pub charges: Option<ChargeRange>,
    pub equivalent_enhancement_bonus: Option<i64>,
    /// Equipment granted automatically alongside this modifier.
    pub automatic_equipment: Vec<Arc<Equipment>>,
}
