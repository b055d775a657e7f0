//! Unbound entity records.
//!
//! An unbound record holds every parsed field of a declaration, with
//! cross-entity references still carried as raw string keys. Records live in
//! the construction-time registries until the binder resolves them.
//!
//! Merge semantics (for kinds with a `Modify*` verb): scalars take the
//! incoming value when present, list fields concatenate existing-then-
//! incoming, and conditions combine with logical AND. Merge is associative
//! over repeated modifies but not commutative.

use crate::data::choosers::Choice;
use crate::data::types::{
    AddedCasterLevel, ArmorTypeChange, Aspect, Bonus, ChargeRange, Condition, FactValues, Formula,
    Formattable, ModDefinition, SourceInfo, SpellList, VariableDefinition,
};

/// An ability grant with the target ability still a raw name or key.
#[derive(Debug, Clone)]
pub struct UnboundGrant {
    pub category: String,
    pub nature: String,
    pub ability: String,
}

/// Unbound ability record. Abilities are the one kind addressed through two
/// keyspaces: display `name` plus an optional stable `key`.
#[derive(Debug, Clone, Default)]
pub struct UnboundAbility {
    pub name: Option<String>,
    pub key: Option<String>,
    pub source: Option<SourceInfo>,
    pub bonuses: Vec<Bonus>,
    pub stackable: Option<bool>,
    pub category: Option<String>,
    pub allow_multiple: Option<bool>,
    pub visible: Option<bool>,
    pub definitions: Vec<VariableDefinition>,
    pub aspects: Vec<Aspect>,
    pub types: Vec<String>,
    pub cost: Option<i64>,
    pub description: Option<Formattable>,
    pub source_page: Option<String>,
    pub choice: Option<Choice>,
    pub grants: Vec<UnboundGrant>,
}

impl UnboundAbility {
    pub fn merge(self, incoming: UnboundAbility) -> UnboundAbility {
        let mut bonuses = self.bonuses;
        bonuses.extend(incoming.bonuses);
        let mut definitions = self.definitions;
        definitions.extend(incoming.definitions);
        let mut aspects = self.aspects;
        aspects.extend(incoming.aspects);
        let mut types = self.types;
        types.extend(incoming.types);
        let mut grants = self.grants;
        grants.extend(incoming.grants);

        UnboundAbility {
            name: incoming.name.or(self.name),
            key: incoming.key.or(self.key),
            // Provenance stays with the book that first defined the entity.
            source: self.source.or(incoming.source),
            bonuses,
            stackable: incoming.stackable.or(self.stackable),
            category: incoming.category.or(self.category),
            allow_multiple: incoming.allow_multiple.or(self.allow_multiple),
            visible: incoming.visible.or(self.visible),
            definitions,
            aspects,
            types,
            cost: incoming.cost.or(self.cost),
            description: incoming.description.or(self.description),
            source_page: incoming.source_page.or(self.source_page),
            choice: incoming.choice.or(self.choice),
            grants,
        }
    }
}

/// One level-progression entry: applies at `start`, then every `repeat`
/// levels after it (never again when `repeat` is zero).
#[derive(Debug, Clone)]
pub struct UnboundRepeatingLevel {
    pub start: i64,
    pub repeat: i64,
    pub info: UnboundClassLevel,
}

/// What a class level grants, with ability targets unresolved.
#[derive(Debug, Clone, Default)]
pub struct UnboundClassLevel {
    pub added_caster_levels: Vec<AddedCasterLevel>,
    pub grants: Vec<UnboundGrant>,
}

/// Unbound class record.
#[derive(Debug, Clone, Default)]
pub struct UnboundClass {
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
    pub levels: Vec<UnboundRepeatingLevel>,
    pub ex_class: Option<String>,
}

/// Unbound domain record.
#[derive(Debug, Clone, Default)]
pub struct UnboundDomain {
    pub name: String,
    pub source: Option<SourceInfo>,
    pub description: Option<Formattable>,
    pub definitions: Vec<VariableDefinition>,
    pub spell_lists: Vec<SpellList>,
    pub condition: Condition,
    pub class_skills: Vec<String>,
    pub source_page: Option<String>,
    pub grants: Vec<UnboundGrant>,
}

impl UnboundDomain {
    pub fn merge(self, incoming: UnboundDomain) -> UnboundDomain {
        let mut definitions = self.definitions;
        definitions.extend(incoming.definitions);
        let mut spell_lists = self.spell_lists;
        spell_lists.extend(incoming.spell_lists);
        let mut class_skills = self.class_skills;
        class_skills.extend(incoming.class_skills);
        let mut grants = self.grants;
        grants.extend(incoming.grants);

        UnboundDomain {
            name: incoming.name,
            source: self.source.or(incoming.source),
            description: incoming.description.or(self.description),
            definitions,
            spell_lists,
            condition: self.condition.and(incoming.condition),
            class_skills,
            source_page: incoming.source_page.or(self.source_page),
            grants,
        }
    }
}

/// Unbound ability score (stat) record, registered by `Key`.
#[derive(Debug, Clone, Default)]
pub struct UnboundAbilityScore {
    pub key: String,
    pub name: String,
    pub sort_key: Option<String>,
    pub abbreviation: Option<String>,
    pub stat_mod_formula: Option<Formula>,
    pub modifications: Vec<ModDefinition>,
    pub definitions: Vec<VariableDefinition>,
    pub bonuses: Vec<Bonus>,
    pub grants: Vec<UnboundGrant>,
}

/// Unbound skill record. `key_stat` references an ability score key.
#[derive(Debug, Clone, Default)]
pub struct UnboundSkill {
    pub name: String,
    pub source: Option<SourceInfo>,
    pub key_stat: Option<String>,
    pub use_untrained: Option<bool>,
    pub types: Vec<String>,
    pub bonuses: Vec<Bonus>,
    pub source_page: Option<String>,
    pub condition: Condition,
}

/// A modifier attachment on an equipment record, target still a raw key.
#[derive(Debug, Clone)]
pub struct UnboundEquipmentAddModifier {
    pub parameters: Vec<Formula>,
    pub modifier: String,
}

/// Unbound equipment record.
#[derive(Debug, Clone, Default)]
pub struct UnboundEquipment {
    pub name: String,
    pub source: Option<SourceInfo>,
    /// Monetary cost in integer cents.
    pub cost: i64,
    pub base_quantity: Option<i64>,
    pub effective_damage_resistance: Option<i64>,
    pub can_have_mods: Option<bool>,
    pub mods_required: Option<bool>,
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
    pub visible: Option<bool>,
    pub qualities: FactValues,
    pub bonuses: Vec<Bonus>,
    pub types: Vec<String>,
    pub special_properties: Vec<Formattable>,
    pub description: Option<Formattable>,
    pub modifiers: Vec<UnboundEquipmentAddModifier>,
    pub base_item: Option<String>,
}

/// Unbound equipment modifier record, registered by `Key`.
#[derive(Debug, Clone, Default)]
pub struct UnboundEquipmentModifier {
    pub key: String,
    pub name: Option<String>,
    pub source: Option<SourceInfo>,
    pub bonuses: Vec<Bonus>,
    pub types: Vec<String>,
    pub special_properties: Vec<Formattable>,
    pub description: Option<Formattable>,
    pub cost: Option<Formula>,
    pub granted_item_types: Vec<String>,
    pub visible: Option<bool>,
    pub affects_both_heads: Option<bool>,
    pub name_modifier_text: Option<String>,
    pub name_modifier_location: Option<String>,
    pub choice: Option<Choice>,
    pub replaces: Vec<String>,
    pub armor_type_change: Option<ArmorTypeChange>,
    pub charges: Option<ChargeRange>,
    pub equivalent_enhancement_bonus: Option<i64>,
    pub automatic_equipment: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bonus(category: &str) -> Bonus {
        Bonus {
            category: category.to_string(),
            variables: vec![],
            formula: None,
            condition: Condition::Always,
        }
    }

    fn ability_with_bonuses(categories: &[&str]) -> UnboundAbility {
        UnboundAbility {
            name: Some("Test".to_string()),
            bonuses: categories.iter().map(|c| bonus(c)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_concatenates_lists_in_order() {
        let base = ability_with_bonuses(&["base"]);
        let a = ability_with_bonuses(&["a1", "a2"]);
        let b = ability_with_bonuses(&["b"]);

        let merged = base.merge(a).merge(b);
        let cats: Vec<&str> = merged.bonuses.iter().map(|b| b.category.as_str()).collect();
        assert_eq!(cats, vec!["base", "a1", "a2", "b"]);
    }

    #[test]
    fn test_merge_is_associative_for_lists() {
        let left = ability_with_bonuses(&["x"])
            .merge(ability_with_bonuses(&["y"]))
            .merge(ability_with_bonuses(&["z"]));
        let right = ability_with_bonuses(&["x"])
            .merge(ability_with_bonuses(&["y"]).merge(ability_with_bonuses(&["z"])));

        let cats = |a: &UnboundAbility| {
            a.bonuses
                .iter()
                .map(|b| b.category.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(cats(&left), cats(&right));
    }

    #[test]
    fn test_merge_scalar_incoming_wins_then_sticks() {
        let base = UnboundAbility {
            name: Some("Test".to_string()),
            cost: Some(5),
            ..Default::default()
        };
        let raise = UnboundAbility {
            cost: Some(10),
            ..Default::default()
        };
        let unrelated = UnboundAbility {
            visible: Some(false),
            ..Default::default()
        };

        let merged = base.merge(raise).merge(unrelated);
        assert_eq!(merged.cost, Some(10));
        assert_eq!(merged.visible, Some(false));
        assert_eq!(merged.name.as_deref(), Some("Test"));
    }

    #[test]
    fn test_merge_identity_fields_override() {
        let base = UnboundAbility {
            name: Some("Old Name".to_string()),
            key: Some("KEY_OLD".to_string()),
            ..Default::default()
        };
        let incoming = UnboundAbility {
            name: Some("New Name".to_string()),
            ..Default::default()
        };

        let merged = base.merge(incoming);
        assert_eq!(merged.name.as_deref(), Some("New Name"));
        assert_eq!(merged.key.as_deref(), Some("KEY_OLD"));
    }

    #[test]
    fn test_domain_merge_condition_and() {
        let lua = mlua::Lua::new();
        let f: mlua::Function = lua.load("function() return true end").eval().unwrap();

        let base = UnboundDomain {
            name: "War".to_string(),
            condition: Condition::Checks(vec![f.clone()]),
            ..Default::default()
        };
        let incoming = UnboundDomain {
            name: "War".to_string(),
            condition: Condition::Checks(vec![f]),
            ..Default::default()
        };

        let merged = base.merge(incoming);
        match merged.condition {
            Condition::Checks(checks) => assert_eq!(checks.len(), 2),
            Condition::Always => panic!("expected combined checks"),
        }
    }
}
