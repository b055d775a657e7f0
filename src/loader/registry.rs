//! Construction-time registries for unbound records.
//!
//! Each entity kind accumulates into a registry while data files execute.
//! Definition and modification both go through the diagnostics policy:
//! duplicates and missing targets abort a strict load, while a lax load
//! recovers (last definition wins, modification of a missing target becomes
//! an implicit definition).

use crate::data::keyed::KeyedMap;
use crate::data::types::{AbilityCategory, Alignment, Fact, Save, Variable};
use crate::data::unbound::{
    UnboundAbility, UnboundAbilityScore, UnboundClass, UnboundDomain, UnboundEquipment,
    UnboundEquipmentModifier, UnboundSkill,
};
use crate::loader::diagnostics::{Diagnostics, Violation};

/// A single-keyspace registry of unbound records.
#[derive(Debug)]
pub struct Registry<T> {
    kind: &'static str,
    entries: KeyedMap<T>,
}

impl<T> Registry<T> {
    pub fn new(kind: &'static str) -> Registry<T> {
        Registry {
            kind,
            entries: KeyedMap::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Register a definition. A duplicate key is a violation; when the
    /// policy recovers, the latest definition replaces the earlier one.
    pub fn define(&mut self, diag: &Diagnostics, key: &str, value: T) -> mlua::Result<()> {
        if self.entries.contains_key(key) {
            diag.report(Violation::DuplicateDefinition {
                kind: self.kind,
                key: key.to_string(),
            })?;
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// Apply a modification. A missing target is a violation; when the
    /// policy recovers, the modification registers as an implicit
    /// definition.
    pub fn modify(
        &mut self,
        diag: &Diagnostics,
        key: &str,
        incoming: T,
        merge: impl FnOnce(T, T) -> T,
    ) -> mlua::Result<()> {
        match self.entries.remove(key) {
            Some(existing) => {
                self.entries.insert(key, merge(existing, incoming));
            }
            None => {
                diag.report(Violation::MissingTarget {
                    kind: self.kind,
                    key: key.to_string(),
                })?;
                self.entries.insert(key, incoming);
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<T> {
        self.entries.remove(key)
    }

    pub fn any_key(&self) -> Option<String> {
        self.entries.any_key()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take the remaining entries, leaving the registry empty.
    pub fn into_entries(self) -> KeyedMap<T> {
        self.entries
    }
}

/// The ability registry, addressing records through name and key spaces.
///
/// Records live in the name space; the key space maps an ability's stable
/// key back to its name. Lookups try the key space first.
#[derive(Debug, Default)]
pub struct AbilityRegistry {
    named: KeyedMap<UnboundAbility>,
    keyed: KeyedMap<String>,
}

impl AbilityRegistry {
    /// Resolve a name-or-key to the record's name.
    fn resolve(&self, name_or_key: &str) -> Option<String> {
        if let Some(name) = self.keyed.get(name_or_key) {
            return Some(name.clone());
        }
        if self.named.contains_key(name_or_key) {
            return Some(name_or_key.to_string());
        }
        None
    }

    pub fn get(&self, name_or_key: &str) -> Option<&UnboundAbility> {
        let name = self.resolve(name_or_key)?;
        self.named.get(&name)
    }

    pub fn contains(&self, name_or_key: &str) -> bool {
        self.resolve(name_or_key).is_some()
    }

    /// Remove a record through either keyspace, cleaning up both.
    pub fn remove(&mut self, name_or_key: &str) -> Option<UnboundAbility> {
        let name = self.resolve(name_or_key)?;
        self.remove_named(&name)
    }

    /// Remove a record by its name only, never resolving through the key
    /// space. Used when draining the registry by name.
    pub fn remove_named(&mut self, name: &str) -> Option<UnboundAbility> {
        let record = self.named.remove(name)?;
        if let Some(key) = &record.key {
            self.keyed.remove(key);
        }
        Some(record)
    }

    fn insert(&mut self, name: String, record: UnboundAbility) {
        if let Some(key) = record.key.clone() {
            self.keyed.insert(key, name.clone());
        }
        self.named.insert(name, record);
    }

    /// Register a definition. Both the name and the key must be fresh.
    pub fn define(&mut self, diag: &Diagnostics, record: UnboundAbility) -> mlua::Result<()> {
        let name = match &record.name {
            Some(name) => name.clone(),
            None => {
                return diag.report(Violation::MalformedValue {
                    field: "Name".to_string(),
                    detail: "ability definition without a name".to_string(),
                });
            }
        };

        let duplicate = self.named.contains_key(&name)
            || record
                .key
                .as_deref()
                .is_some_and(|key| self.keyed.contains_key(key));
        if duplicate {
            diag.report(Violation::DuplicateDefinition {
                kind: "ability",
                key: name.clone(),
            })?;
            // Recovery replaces the earlier record through whichever
            // keyspace matched.
            if let Some(key) = record.key.as_deref() {
                self.remove(key);
            }
            self.remove(&name);
        }

        self.insert(name, record);
        Ok(())
    }

    /// Apply a modification, addressed by the record's key or name.
    ///
    /// The merged record re-registers under its merged name and key, so a
    /// modification that renames or re-keys an ability refreshes both
    /// keyspaces.
    pub fn modify(&mut self, diag: &Diagnostics, incoming: UnboundAbility) -> mlua::Result<()> {
        let target = incoming
            .key
            .as_deref()
            .and_then(|key| self.resolve(key))
            .or_else(|| incoming.name.as_deref().and_then(|name| self.resolve(name)));

        let merged = match target {
            Some(name) => match self.named.remove(&name) {
                Some(existing) => {
                    if let Some(key) = &existing.key {
                        self.keyed.remove(key);
                    }
                    existing.merge(incoming)
                }
                None => incoming,
            },
            None => {
                let wanted = incoming
                    .key
                    .clone()
                    .or_else(|| incoming.name.clone())
                    .unwrap_or_default();
                diag.report(Violation::MissingTarget {
                    kind: "ability",
                    key: wanted,
                })?;
                incoming
            }
        };

        match merged.name.clone() {
            Some(name) => {
                self.insert(name, merged);
                Ok(())
            }
            None => diag.report(Violation::MalformedValue {
                field: "Name".to_string(),
                detail: "ability modification without a resolvable name".to_string(),
            }),
        }
    }

    pub fn any_name(&self) -> Option<String> {
        self.named.any_key()
    }

    pub fn len(&self) -> usize {
        self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty()
    }
}

/// All construction-time registries of a load in progress.
#[derive(Debug)]
pub struct Registries {
    pub abilities: AbilityRegistry,
    pub classes: Registry<UnboundClass>,
    pub domains: Registry<UnboundDomain>,
    pub ability_scores: Registry<UnboundAbilityScore>,
    pub skills: Registry<UnboundSkill>,
    pub equipment: Registry<UnboundEquipment>,
    pub equipment_modifiers: Registry<UnboundEquipmentModifier>,
    pub alignments: Registry<Alignment>,
    pub facts: Registry<Fact>,
    pub saves: Registry<Save>,
    pub variables: Registry<Variable>,
    pub ability_categories: Registry<AbilityCategory>,
}

impl Default for Registries {
    fn default() -> Registries {
        Registries {
            abilities: AbilityRegistry::default(),
            classes: Registry::new("class"),
            domains: Registry::new("domain"),
            ability_scores: Registry::new("ability score"),
            skills: Registry::new("skill"),
            equipment: Registry::new("equipment"),
            equipment_modifiers: Registry::new("equipment modifier"),
            alignments: Registry::new("alignment"),
            facts: Registry::new("fact"),
            saves: Registry::new("save"),
            variables: Registry::new("variable"),
            ability_categories: Registry::new("ability category"),
        }
    }
}

/// Registry key for a fact definition.
pub fn fact_key(category: &str, key: &str) -> String {
    format!("{}|{}", category, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::diagnostics::Strictness;

    fn ability(name: &str, key: Option<&str>) -> UnboundAbility {
        UnboundAbility {
            name: Some(name.to_string()),
            key: key.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_define_duplicate_strict_fails() {
        let diag = Diagnostics::new(Strictness::Strict);
        let mut reg = Registry::new("class");
        reg.define(&diag, "Fighter", 1).unwrap();
        assert!(reg.define(&diag, "fighter", 2).is_err());
    }

    #[test]
    fn test_define_duplicate_lax_replaces() {
        let diag = Diagnostics::new(Strictness::Lax);
        let mut reg = Registry::new("class");
        reg.define(&diag, "Fighter", 1).unwrap();
        reg.define(&diag, "Fighter", 2).unwrap();
        assert_eq!(reg.get("fighter"), Some(&2));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_modify_missing_lax_becomes_define() {
        let diag = Diagnostics::new(Strictness::Lax);
        let mut reg: Registry<i32> = Registry::new("class");
        reg.modify(&diag, "Ghost", 7, |a, b| a + b).unwrap();
        assert_eq!(reg.get("Ghost"), Some(&7));
    }

    #[test]
    fn test_modify_missing_strict_fails() {
        let diag = Diagnostics::new(Strictness::Strict);
        let mut reg: Registry<i32> = Registry::new("class");
        assert!(reg.modify(&diag, "Ghost", 7, |a, b| a + b).is_err());
    }

    #[test]
    fn test_modify_merges() {
        let diag = Diagnostics::new(Strictness::Strict);
        let mut reg = Registry::new("class");
        reg.define(&diag, "Fighter", 10).unwrap();
        reg.modify(&diag, "Fighter", 5, |a, b| a + b).unwrap();
        assert_eq!(reg.get("Fighter"), Some(&15));
    }

    #[test]
    fn test_ability_lookup_prefers_key_space() {
        let diag = Diagnostics::new(Strictness::Strict);
        let mut reg = AbilityRegistry::default();
        reg.define(&diag, ability("Power Attack", Some("FEAT_PA"))).unwrap();
        reg.define(&diag, ability("FEAT_PA Wannabe", None)).unwrap();

        assert_eq!(
            reg.get("FEAT_PA").unwrap().name.as_deref(),
            Some("Power Attack")
        );
        assert_eq!(
            reg.get("Power Attack").unwrap().key.as_deref(),
            Some("FEAT_PA")
        );
    }

    #[test]
    fn test_ability_duplicate_key_strict_fails() {
        let diag = Diagnostics::new(Strictness::Strict);
        let mut reg = AbilityRegistry::default();
        reg.define(&diag, ability("One", Some("KEY"))).unwrap();
        assert!(reg.define(&diag, ability("Two", Some("key"))).is_err());
    }

    #[test]
    fn test_ability_modify_by_key_refreshes_name() {
        let diag = Diagnostics::new(Strictness::Strict);
        let mut reg = AbilityRegistry::default();
        reg.define(&diag, ability("Old Name", Some("KEY"))).unwrap();

        reg.modify(
            &diag,
            UnboundAbility {
                name: Some("New Name".to_string()),
                key: Some("KEY".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        assert!(reg.get("Old Name").is_none());
        assert_eq!(reg.get("KEY").unwrap().name.as_deref(), Some("New Name"));
        assert_eq!(
            reg.get("New Name").unwrap().key.as_deref(),
            Some("KEY")
        );
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_ability_remove_cleans_both_spaces() {
        let diag = Diagnostics::new(Strictness::Strict);
        let mut reg = AbilityRegistry::default();
        reg.define(&diag, ability("Dodge", Some("FEAT_DODGE"))).unwrap();

        let record = reg.remove("feat_dodge").unwrap();
        assert_eq!(record.name.as_deref(), Some("Dodge"));
        assert!(!reg.contains("Dodge"));
        assert!(!reg.contains("FEAT_DODGE"));
    }

    #[test]
    fn test_fact_key_format() {
        assert_eq!(fact_key("Class", "ClassType"), "Class|ClassType");
    }
}
