//! Demand-driven linking of unbound records into the bound graph.
//!
//! Binding a record detaches it from its registry first, then resolves its
//! references recursively and caches the bound result. Forward references
//! work in any order; a reference to a key that was never defined, or a
//! reference cycle, surfaces as `UnresolvedReference`. Each record is bound
//! exactly once, so every holder of a reference shares the same `Arc`.

use std::sync::Arc;

use mlua::Lua;

use crate::data::bound::{
    Ability, AbilityScore, Class, ClassLevel, Domain, Equipment, EquipmentAddModifier,
    EquipmentModifier, Grant, RepeatingClassLevel, Skill,
};
use crate::data::choosers::NameModifier;
use crate::data::dataset::{AbilityMap, DataSet};
use crate::data::keyed::KeyedMap;
use crate::data::types::DataSetInformation;
use crate::data::unbound::{UnboundAbility, UnboundGrant};
use crate::error::{GrimoireError, Result};
use crate::loader::registry::Registries;

pub struct Binder {
    regs: Registries,
    named_abilities: KeyedMap<Arc<Ability>>,
    keyed_abilities: KeyedMap<Arc<Ability>>,
    classes: KeyedMap<Arc<Class>>,
    domains: KeyedMap<Arc<Domain>>,
    ability_scores: KeyedMap<Arc<AbilityScore>>,
    skills: KeyedMap<Arc<Skill>>,
    equipment: KeyedMap<Arc<Equipment>>,
    equipment_modifiers: KeyedMap<Arc<EquipmentModifier>>,
}

fn unresolved(kind: &'static str, key: &str) -> GrimoireError {
    GrimoireError::UnresolvedReference {
        kind,
        key: key.to_string(),
    }
}

impl Binder {
    pub fn new(regs: Registries) -> Binder {
        Binder {
            regs,
            named_abilities: KeyedMap::new(),
            keyed_abilities: KeyedMap::new(),
            classes: KeyedMap::new(),
            domains: KeyedMap::new(),
            ability_scores: KeyedMap::new(),
            skills: KeyedMap::new(),
            equipment: KeyedMap::new(),
            equipment_modifiers: KeyedMap::new(),
        }
    }

    fn bind_ability(&mut self, name_or_key: &str) -> Result<Arc<Ability>> {
        if let Some(bound) = self.keyed_abilities.get(name_or_key) {
            return Ok(Arc::clone(bound));
        }
        if let Some(bound) = self.named_abilities.get(name_or_key) {
            return Ok(Arc::clone(bound));
        }

        let unbound = self
            .regs
            .abilities
            .remove(name_or_key)
            .ok_or_else(|| unresolved("ability", name_or_key))?;
        self.bind_ability_record(unbound, name_or_key)
    }

    fn bind_ability_record(
        &mut self,
        unbound: UnboundAbility,
        fallback_name: &str,
    ) -> Result<Arc<Ability>> {
        let grants = self.bind_grants(&unbound.grants)?;
        let name = unbound.name.unwrap_or_else(|| fallback_name.to_string());
        let bound = Arc::new(Ability {
            name: name.clone(),
            key: unbound.key.clone(),
            source: unbound.source,
            bonuses: unbound.bonuses,
            stackable: unbound.stackable.unwrap_or(false),
            category: unbound.category,
            allow_multiple: unbound.allow_multiple.unwrap_or(false),
            visible: unbound.visible.unwrap_or(true),
            definitions: unbound.definitions,
            aspects: unbound.aspects,
            types: unbound.types,
            cost: unbound.cost.unwrap_or(0),
            description: unbound.description,
            source_page: unbound.source_page,
            choice: unbound.choice,
            grants,
        });

        self.named_abilities.insert(name, Arc::clone(&bound));
        if let Some(key) = unbound.key {
            self.keyed_abilities.insert(key, Arc::clone(&bound));
        }
        Ok(bound)
    }

    fn bind_grants(&mut self, grants: &[UnboundGrant]) -> Result<Vec<Grant>> {
        grants
            .iter()
            .map(|grant| {
                Ok(Grant {
                    category: grant.category.clone(),
                    nature: grant.nature.clone(),
                    ability: self.bind_ability(&grant.ability)?,
                })
            })
            .collect()
    }

    fn bind_class(&mut self, name: &str) -> Result<Arc<Class>> {
        if let Some(bound) = self.classes.get(name) {
            return Ok(Arc::clone(bound));
        }

        let unbound = self
            .regs
            .classes
            .remove(name)
            .ok_or_else(|| unresolved("class", name))?;

        let mut levels = Vec::with_capacity(unbound.levels.len());
        for level in unbound.levels {
            levels.push(RepeatingClassLevel {
                start: level.start,
                repeat: level.repeat,
                info: Arc::new(ClassLevel {
                    added_caster_levels: level.info.added_caster_levels,
                    grants: self.bind_grants(&level.info.grants)?,
                }),
            });
        }

        let ex_class = match unbound.ex_class {
            Some(ex) => Some(self.bind_class(&ex)?),
            None => None,
        };

        let bound = Arc::new(Class::new(
            unbound.name.clone(),
            unbound.source,
            unbound.facts,
            unbound.source_page,
            unbound.condition,
            unbound.definitions,
            unbound.bonuses,
            unbound.types,
            unbound.roles,
            unbound.hit_die,
            unbound.max_level,
            levels,
            ex_class,
        ));
        self.classes.insert(unbound.name, Arc::clone(&bound));
        Ok(bound)
    }

    fn bind_domain(&mut self, name: &str) -> Result<Arc<Domain>> {
        if let Some(bound) = self.domains.get(name) {
            return Ok(Arc::clone(bound));
        }

        let unbound = self
            .regs
            .domains
            .remove(name)
            .ok_or_else(|| unresolved("domain", name))?;

        let grants = self.bind_grants(&unbound.grants)?;
        let bound = Arc::new(Domain {
            name: unbound.name.clone(),
            source: unbound.source,
            description: unbound.description,
            definitions: unbound.definitions,
            spell_lists: unbound.spell_lists,
            condition: unbound.condition,
            class_skills: unbound.class_skills,
            source_page: unbound.source_page,
            grants,
        });
        self.domains.insert(unbound.name, Arc::clone(&bound));
        Ok(bound)
    }

    fn bind_ability_score(&mut self, key: &str) -> Result<Arc<AbilityScore>> {
        if let Some(bound) = self.ability_scores.get(key) {
            return Ok(Arc::clone(bound));
        }

        let unbound = self
            .regs
            .ability_scores
            .remove(key)
            .ok_or_else(|| unresolved("ability score", key))?;

        let grants = self.bind_grants(&unbound.grants)?;
        let bound = Arc::new(AbilityScore {
            key: unbound.key.clone(),
            name: unbound.name,
            sort_key: unbound.sort_key,
            abbreviation: unbound.abbreviation,
            stat_mod_formula: unbound.stat_mod_formula,
            modifications: unbound.modifications,
            definitions: unbound.definitions,
            bonuses: unbound.bonuses,
            grants,
        });
        self.ability_scores.insert(unbound.key, Arc::clone(&bound));
        Ok(bound)
    }

    fn bind_skill(&mut self, name: &str) -> Result<Arc<Skill>> {
        if let Some(bound) = self.skills.get(name) {
            return Ok(Arc::clone(bound));
        }

        let unbound = self
            .regs
            .skills
            .remove(name)
            .ok_or_else(|| unresolved("skill", name))?;

        let key_stat = match unbound.key_stat {
            Some(stat) => Some(self.bind_ability_score(&stat)?),
            None => None,
        };
        let bound = Arc::new(Skill {
            name: unbound.name.clone(),
            source: unbound.source,
            key_stat,
            use_untrained: unbound.use_untrained.unwrap_or(false),
            types: unbound.types,
            bonuses: unbound.bonuses,
            source_page: unbound.source_page,
            condition: unbound.condition,
        });
        self.skills.insert(unbound.name, Arc::clone(&bound));
        Ok(bound)
    }

    fn bind_equipment(&mut self, name: &str) -> Result<Arc<Equipment>> {
        if let Some(bound) = self.equipment.get(name) {
            return Ok(Arc::clone(bound));
        }

        let unbound = self
            .regs
            .equipment
            .remove(name)
            .ok_or_else(|| unresolved("equipment", name))?;

        let mut modifiers = Vec::with_capacity(unbound.modifiers.len());
        for attach in unbound.modifiers {
            modifiers.push(EquipmentAddModifier {
                parameters: attach.parameters,
                modifier: self.bind_equipment_modifier(&attach.modifier)?,
            });
        }
        let base_item = match unbound.base_item {
            Some(base) => Some(self.bind_equipment(&base)?),
            None => None,
        };

        let bound = Arc::new(Equipment {
            name: unbound.name.clone(),
            source: unbound.source,
            cost: unbound.cost,
            base_quantity: unbound.base_quantity,
            effective_damage_resistance: unbound.effective_damage_resistance,
            can_have_mods: unbound.can_have_mods.unwrap_or(true),
            mods_required: unbound.mods_required.unwrap_or(false),
            spell_book_page_count: unbound.spell_book_page_count,
            pages_per_spell: unbound.pages_per_spell,
            size: unbound.size,
            used_slots: unbound.used_slots,
            weight: unbound.weight,
            armor_check_penalty: unbound.armor_check_penalty,
            fumble_range: unbound.fumble_range,
            max_dex: unbound.max_dex,
            proficiency: unbound.proficiency,
            range: unbound.range,
            reach: unbound.reach,
            reach_multiplier: unbound.reach_multiplier,
            arcane_spell_failure_chance: unbound.arcane_spell_failure_chance,
            wield_category: unbound.wield_category,
            visible: unbound.visible.unwrap_or(true),
            qualities: unbound.qualities,
            bonuses: unbound.bonuses,
            types: unbound.types,
            special_properties: unbound.special_properties,
            description: unbound.description,
            modifiers,
            base_item,
        });
        self.equipment.insert(unbound.name, Arc::clone(&bound));
        Ok(bound)
    }

    fn bind_equipment_modifier(&mut self, key: &str) -> Result<Arc<EquipmentModifier>> {
        if let Some(bound) = self.equipment_modifiers.get(key) {
            return Ok(Arc::clone(bound));
        }

        let unbound = self
            .regs
            .equipment_modifiers
            .remove(key)
            .ok_or_else(|| unresolved("equipment modifier", key))?;

        let name_modifier = NameModifier::from_fields(
            unbound.name_modifier_text.as_deref(),
            unbound.name_modifier_location.as_deref(),
        );
        let mut replaces = Vec::with_capacity(unbound.replaces.len());
        for item in &unbound.replaces {
            replaces.push(self.bind_equipment(item)?);
        }
        let mut automatic_equipment = Vec::with_capacity(unbound.automatic_equipment.len());
        for item in &unbound.automatic_equipment {
            automatic_equipment.push(self.bind_equipment(item)?);
        }
        let bound = Arc::new(EquipmentModifier {
            key: unbound.key.clone(),
            name: unbound.name,
            source: unbound.source,
            bonuses: unbound.bonuses,
            types: unbound.types,
            special_properties: unbound.special_properties,
            description: unbound.description,
            cost: unbound.cost,
            granted_item_types: unbound.granted_item_types,
            visible: unbound.visible.unwrap_or(true),
            affects_both_heads: unbound.affects_both_heads.unwrap_or(false),
            name_modifier,
            choice: unbound.choice,
            replaces,
            armor_type_change: unbound.armor_type_change,
            charges: unbound.charges,
            equivalent_enhancement_bonus: unbound.equivalent_enhancement_bonus,
            automatic_equipment,
        });
        self.equipment_modifiers.insert(unbound.key, Arc::clone(&bound));
        Ok(bound)
    }

    /// Drain every registry and assemble the final data set.
    ///
    /// Abilities go first so that grant references bind eagerly; the
    /// remaining kinds follow. Kinds without cross-references move over
    /// unchanged.
    pub fn build(mut self, lua: Lua, info: Option<DataSetInformation>) -> Result<DataSet> {
        while let Some(name) = self.regs.abilities.any_name() {
            // Drain strictly by name: going through the key space here
            // could alias a name onto an already-bound ability's key and
            // leave the record stranded.
            match self.regs.abilities.remove_named(&name) {
                Some(unbound) => {
                    self.bind_ability_record(unbound, &name)?;
                }
                None => return Err(unresolved("ability", &name)),
            }
        }
        while let Some(name) = self.regs.classes.any_key() {
            self.bind_class(&name)?;
        }
        while let Some(name) = self.regs.domains.any_key() {
            self.bind_domain(&name)?;
        }
        while let Some(key) = self.regs.ability_scores.any_key() {
            self.bind_ability_score(&key)?;
        }
        while let Some(name) = self.regs.skills.any_key() {
            self.bind_skill(&name)?;
        }
        while let Some(key) = self.regs.equipment_modifiers.any_key() {
            self.bind_equipment_modifier(&key)?;
        }
        while let Some(name) = self.regs.equipment.any_key() {
            self.bind_equipment(&name)?;
        }

        Ok(DataSet::new(
            lua,
            info,
            AbilityMap::new(self.named_abilities, self.keyed_abilities),
            self.classes,
            self.domains,
            self.ability_scores,
            self.skills,
            self.equipment,
            self.equipment_modifiers,
            self.regs.alignments.into_entries(),
            self.regs.facts.into_entries(),
            self.regs.saves.into_entries(),
            self.regs.variables.into_entries(),
            self.regs.ability_categories.into_entries(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::unbound::{UnboundAbility, UnboundClass, UnboundSkill};
    use crate::loader::diagnostics::{Diagnostics, Strictness};

    fn strict() -> Diagnostics {
        Diagnostics::new(Strictness::Strict)
    }

    fn ability(name: &str, key: Option<&str>, grants: Vec<UnboundGrant>) -> UnboundAbility {
        UnboundAbility {
            name: Some(name.to_string()),
            key: key.map(str::to_string),
            grants,
            ..Default::default()
        }
    }

    fn grant(target: &str) -> UnboundGrant {
        UnboundGrant {
            category: "FEAT".to_string(),
            nature: "AUTOMATIC".to_string(),
            ability: target.to_string(),
        }
    }

    #[test]
    fn test_forward_reference_resolves() {
        let diag = strict();
        let mut regs = Registries::default();
        // "First" grants "Second", declared later.
        regs.abilities
            .define(&diag, ability("First", None, vec![grant("Second")]))
            .unwrap();
        regs.abilities
            .define(&diag, ability("Second", None, vec![]))
            .unwrap();

        let data = Binder::new(regs).build(Lua::new(), None).unwrap();
        let first = data.ability("First").unwrap();
        assert_eq!(first.grants[0].ability.name, "Second");
    }

    #[test]
    fn test_shared_reference_is_one_arc() {
        let diag = strict();
        let mut regs = Registries::default();
        regs.abilities
            .define(&diag, ability("Target", Some("KEY_T"), vec![]))
            .unwrap();
        regs.abilities
            .define(&diag, ability("A", None, vec![grant("Target")]))
            .unwrap();
        regs.abilities
            .define(&diag, ability("B", None, vec![grant("KEY_T")]))
            .unwrap();

        let data = Binder::new(regs).build(Lua::new(), None).unwrap();
        let via_a = Arc::clone(&data.ability("A").unwrap().grants[0].ability);
        let via_b = Arc::clone(&data.ability("B").unwrap().grants[0].ability);
        let direct = Arc::clone(data.ability("Target").unwrap());
        let by_key = Arc::clone(data.ability("KEY_T").unwrap());
        assert!(Arc::ptr_eq(&via_a, &via_b));
        assert!(Arc::ptr_eq(&via_a, &direct));
        assert!(Arc::ptr_eq(&direct, &by_key));
    }

    #[test]
    fn test_unresolved_reference_is_fatal() {
        let diag = strict();
        let mut regs = Registries::default();
        regs.abilities
            .define(&diag, ability("Broken", None, vec![grant("Missing")]))
            .unwrap();

        let err = Binder::new(regs).build(Lua::new(), None).unwrap_err();
        match err {
            GrimoireError::UnresolvedReference { kind, key } => {
                assert_eq!(kind, "ability");
                assert_eq!(key, "Missing");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_class_cycle_is_unresolved() {
        let diag = strict();
        let mut regs = Registries::default();
        regs.classes
            .define(
                &diag,
                "A",
                UnboundClass {
                    name: "A".to_string(),
                    ex_class: Some("B".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        regs.classes
            .define(
                &diag,
                "B",
                UnboundClass {
                    name: "B".to_string(),
                    ex_class: Some("A".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let err = Binder::new(regs).build(Lua::new(), None).unwrap_err();
        assert!(matches!(
            err,
            GrimoireError::UnresolvedReference { kind: "class", .. }
        ));
    }

    #[test]
    fn test_skill_binds_key_stat() {
        let diag = strict();
        let mut regs = Registries::default();
        regs.ability_scores
            .define(
                &diag,
                "DEX",
                crate::data::unbound::UnboundAbilityScore {
                    key: "DEX".to_string(),
                    name: "Dexterity".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        regs.skills
            .define(
                &diag,
                "Tumble",
                UnboundSkill {
                    name: "Tumble".to_string(),
                    key_stat: Some("DEX".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let data = Binder::new(regs).build(Lua::new(), None).unwrap();
        let skill = data.skill("Tumble").unwrap();
        assert_eq!(skill.key_stat.as_ref().unwrap().name, "Dexterity");
        assert!(!skill.use_untrained);
        assert!(Arc::ptr_eq(
            skill.key_stat.as_ref().unwrap(),
            data.ability_score("DEX").unwrap()
        ));
    }

    #[test]
    fn test_defaults_materialized() {
        let diag = strict();
        let mut regs = Registries::default();
        regs.abilities
            .define(&diag, ability("Plain", None, vec![]))
            .unwrap();

        let data = Binder::new(regs).build(Lua::new(), None).unwrap();
        let bound = data.ability("Plain").unwrap();
        assert!(!bound.stackable);
        assert!(!bound.allow_multiple);
        assert!(bound.visible);
        assert_eq!(bound.cost, 0);
    }
}
