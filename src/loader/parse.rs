//! Host entry points called by data files.
//!
//! Every `Define*` / `Modify*` global registered here parses one declaration
//! table into an unbound record and feeds it to the registries. Field
//! coercion failures, unknown fields, duplicates and missing targets all go
//! through the diagnostics policy; under `Lax` each parse function degrades
//! to a documented default and keeps going.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use mlua::Lua;

use crate::data::choosers::{Choice, Chooser, ChooserKind};
use crate::data::types::{
    AbilityCategory, AddedCasterLevel, Alignment, ArmorTypeChange, Aspect, Bonus, ChargeRange,
    DataSetInformation, Fact, Formula, Link, ModDefinition, PublisherInfo, Save, SourceInfo,
    SpellList, SpellListLevel, Variable, VariableDefinition,
};
use crate::data::unbound::{
    UnboundAbility, UnboundAbilityScore, UnboundClass, UnboundClassLevel, UnboundDomain,
    UnboundEquipment, UnboundEquipmentAddModifier, UnboundEquipmentModifier, UnboundGrant,
    UnboundRepeatingLevel, UnboundSkill,
};
use crate::loader::diagnostics::{Diagnostics, Strictness, Violation};
use crate::loader::registry::{fact_key, Registries};
use crate::script::coerce::{self, Malformed};
use crate::script::value::{ChooserValue, DiceFormulaValue, FormulaValue, ScriptValue};

/// Mutable state of one load, shared by every entry-point closure.
#[derive(Debug)]
pub struct LoaderState {
    pub diag: Diagnostics,
    pub regs: Registries,
    /// Provenance from the most recent `SetSource`, cleared per file.
    pub source: Option<SourceInfo>,
    pub info: Option<DataSetInformation>,
    root: PathBuf,
}

impl LoaderState {
    pub fn new(root: PathBuf, strictness: Strictness) -> LoaderState {
        LoaderState {
            diag: Diagnostics::new(strictness),
            regs: Registries::default(),
            source: None,
            info: None,
            root,
        }
    }

    /// Resolve an `ImportFile` path. A root-marker prefix (`@/`) resolves
    /// against the data set root; anything else is relative to the directory
    /// of the including file, or the root for the outermost file.
    fn resolve_import(&self, path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix('@') {
            return self.root.join(rest.trim_start_matches(['/', '\\']));
        }
        let base = match self.diag.current_file().and_then(|f| f.parent()) {
            Some(dir) => dir.to_path_buf(),
            None => self.root.clone(),
        };
        base.join(path)
    }
}

/// Apply a coercion result, degrading to the type's default on failure.
fn soft<T: Default>(
    diag: &Diagnostics,
    field: &str,
    result: Result<T, Malformed>,
) -> mlua::Result<T> {
    soft_or(diag, field, result, T::default())
}

fn soft_or<T>(
    diag: &Diagnostics,
    field: &str,
    result: Result<T, Malformed>,
    fallback: T,
) -> mlua::Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(malformed) => {
            diag.report(Violation::MalformedValue {
                field: field.to_string(),
                detail: malformed.to_string(),
            })?;
            Ok(fallback)
        }
    }
}

/// Validate a declaration table against the kind's field allow-list.
fn check_fields(
    diag: &Diagnostics,
    kind: &'static str,
    record: &ScriptValue,
    allowed: &[&str],
) -> mlua::Result<()> {
    if let ScriptValue::Map(entries) = record {
        for (field, _) in entries {
            if !allowed.iter().any(|a| a == field) {
                diag.report(Violation::UnknownField {
                    kind,
                    field: field.clone(),
                })?;
            }
        }
    }
    Ok(())
}

const ABILITY_FIELDS: &[&str] = &[
    "Name",
    "Key",
    "Category",
    "Description",
    "Stackable",
    "AllowMultiple",
    "Visible",
    "Types",
    "Definitions",
    "Bonuses",
    "Abilities",
    "Aspects",
    "Cost",
    "SourcePage",
    "Choice",
    "Selection",
];

const CLASS_FIELDS: &[&str] = &[
    "Name",
    "Fact",
    "SourcePage",
    "Condition",
    "Definitions",
    "Bonuses",
    "Types",
    "Roles",
    "HitDice",
    "MaxLevel",
    "ExClass",
    "Levels",
];

const DOMAIN_FIELDS: &[&str] = &[
    "Name",
    "Description",
    "Definitions",
    "SpellLists",
    "Conditions",
    "ClassSkills",
    "SourcePage",
    "Abilities",
];

const FACT_FIELDS: &[&str] = &[
    "Key",
    "Category",
    "Selectable",
    "Visible",
    "Required",
    "DataFormat",
    "DisplayName",
    "Explanation",
];

const ALIGNMENT_FIELDS: &[&str] = &["Key", "Name", "Abbreviation", "SortKey"];

const SAVE_FIELDS: &[&str] = &["Name", "SortKey", "Bonus"];

const STAT_FIELDS: &[&str] = &[
    "Key",
    "Name",
    "SortKey",
    "Abbreviation",
    "StatModFormula",
    "Modifications",
    "Definitions",
    "Bonuses",
    "Abilities",
];

const VARIABLE_FIELDS: &[&str] = &["Name", "Type", "Channel", "Scope"];

const ABILITY_CATEGORY_FIELDS: &[&str] = &[
    "Name",
    "Category",
    "Plural",
    "DisplayLocation",
    "Visible",
    "Editable",
    "EditPool",
    "FractionalPool",
    "Pool",
    "AbilityList",
    "Types",
];

const SKILL_FIELDS: &[&str] = &[
    "Name",
    "KeyStat",
    "UseUntrained",
    "Types",
    "Bonuses",
    "SourcePage",
    "Condition",
];

const EQUIPMENT_FIELDS: &[&str] = &[
    "Name",
    "Cost",
    "BaseQuantity",
    "EffectiveDamageResistance",
    "CanHaveMods",
    "ModsRequired",
    "SpellBookPageCount",
    "PagesPerSpell",
    "Size",
    "UsedSlots",
    "Weight",
    "ArmorCheckPenalty",
    "FumbleRange",
    "MaxDex",
    "Proficiency",
    "Range",
    "Reach",
    "ReachMultiplier",
    "ArcaneSpellFailureChance",
    "WieldCategory",
    "Visible",
    "Qualities",
    "Bonuses",
    "Types",
    "SpecialProperties",
    "Description",
    "EquipmentModifiers",
    "BaseItem",
];

const EQUIPMENT_MODIFIER_FIELDS: &[&str] = &[
    "Key",
    "Name",
    "Cost",
    "Types",
    "Bonuses",
    "SpecialProperties",
    "Description",
    "GrantedItemTypes",
    "Visible",
    "AffectsBothHeads",
    "NameModifier",
    "NameModifierLocation",
    "Choice",
    "Selection",
    "Replaces",
    "ArmorTypeChange",
    "Charges",
    "EquivalentEnhancementBonus",
    "AutomaticEquipment",
];

fn parse_bonus(diag: &Diagnostics, value: &ScriptValue) -> mlua::Result<Bonus> {
    Ok(Bonus {
        category: soft(diag, "Bonus.Category", coerce::opt_string(value.get("Category")))?
            .unwrap_or_default(),
        variables: soft(diag, "Bonus.Variables", coerce::string_list(value.get("Variables")))?,
        formula: soft(diag, "Bonus.Formula", coerce::opt_formula(value.get("Formula")))?,
        condition: soft(diag, "Bonus.Conditions", coerce::condition(value.get("Conditions")))?,
    })
}

fn parse_bonuses(diag: &Diagnostics, value: Option<&ScriptValue>) -> mlua::Result<Vec<Bonus>> {
    soft(diag, "Bonuses", coerce::sequence(value))?
        .into_iter()
        .map(|item| parse_bonus(diag, item))
        .collect()
}

fn parse_variable_definitions(
    diag: &Diagnostics,
    value: Option<&ScriptValue>,
) -> mlua::Result<Vec<VariableDefinition>> {
    soft(diag, "Definitions", coerce::sequence(value))?
        .into_iter()
        .map(|item| {
            Ok(VariableDefinition {
                name: soft(diag, "Definition.Name", coerce::opt_string(item.get("Name")))?
                    .unwrap_or_default(),
                initial_value: soft(
                    diag,
                    "Definition.InitialValue",
                    coerce::opt_formula(item.get("InitialValue")),
                )?,
            })
        })
        .collect()
}

fn parse_aspects(diag: &Diagnostics, value: Option<&ScriptValue>) -> mlua::Result<Vec<Aspect>> {
    soft(diag, "Aspects", coerce::sequence(value))?
        .into_iter()
        .map(|item| {
            let arguments = soft(
                diag,
                "Aspect.ArgumentList",
                coerce::sequence(item.get("ArgumentList")),
            )?
            .into_iter()
            .map(|a| soft_or(diag, "Aspect.ArgumentList", coerce::formula(a), Formula::Constant(0)))
            .collect::<mlua::Result<Vec<_>>>()?;
            Ok(Aspect {
                name: soft(diag, "Aspect.Name", coerce::opt_string(item.get("Name")))?
                    .unwrap_or_default(),
                format: soft(
                    diag,
                    "Aspect.FormatString",
                    coerce::opt_string(item.get("FormatString")),
                )?
                .unwrap_or_default(),
                arguments,
            })
        })
        .collect()
}

/// Parse an `Abilities` grant list. Each entry names a category, a nature
/// and several target abilities; the entry expands to one grant per target.
fn parse_grants(
    diag: &Diagnostics,
    value: Option<&ScriptValue>,
) -> mlua::Result<Vec<UnboundGrant>> {
    let mut grants = Vec::new();
    for item in soft(diag, "Abilities", coerce::sequence(value))? {
        let category = soft(diag, "Abilities.Category", coerce::opt_string(item.get("Category")))?
            .unwrap_or_default();
        let nature = soft(diag, "Abilities.Nature", coerce::opt_string(item.get("Nature")))?
            .unwrap_or_default();
        let names = soft(diag, "Abilities.Names", coerce::string_list(item.get("Names")))?;
        for name in names {
            grants.push(UnboundGrant {
                category: category.clone(),
                nature: nature.clone(),
                ability: name,
            });
        }
    }
    Ok(grants)
}

fn parse_choice(
    diag: &Diagnostics,
    value: Option<&ScriptValue>,
    selections: Option<i64>,
) -> mlua::Result<Option<Choice>> {
    let table = match value {
        None | Some(ScriptValue::Nil) => return Ok(None),
        Some(table) => table,
    };
    let chooser = soft(diag, "Choice.Choose", coerce::opt_chooser(table.get("Choose")))?;
    // ChooseNothing and the unsupported choosers return nil; the whole
    // choice block degrades to "no choice" then.
    let chooser = match chooser {
        Some(chooser) => chooser,
        None => return Ok(None),
    };
    let max_times = soft(diag, "Choice.MaxTimes", coerce::opt_integer(table.get("MaxTimes")))?;
    Ok(Some(Choice {
        chooser,
        selections,
        max_times,
    }))
}

fn parse_source_info(diag: &Diagnostics, value: &ScriptValue) -> mlua::Result<SourceInfo> {
    Ok(SourceInfo {
        long_name: soft(diag, "SourceLong", coerce::opt_string(value.get("SourceLong")))?
            .unwrap_or_default(),
        short_name: soft(diag, "SourceShort", coerce::opt_string(value.get("SourceShort")))?
            .unwrap_or_default(),
        web: soft(diag, "SourceWeb", coerce::opt_string(value.get("SourceWeb")))?
            .unwrap_or_default(),
        date: soft(diag, "SourceDate", coerce::opt_string(value.get("SourceDate")))?
            .unwrap_or_default(),
    })
}

fn parse_spell_lists(
    diag: &Diagnostics,
    value: Option<&ScriptValue>,
) -> mlua::Result<Vec<SpellList>> {
    soft(diag, "SpellLists", coerce::sequence(value))?
        .into_iter()
        .map(|item| {
            let levels = soft(diag, "SpellLists.Levels", coerce::sequence(item.get("Levels")))?
                .into_iter()
                .map(|level| {
                    Ok(SpellListLevel {
                        spell_level: soft(
                            diag,
                            "SpellLists.SpellLevel",
                            coerce::opt_integer(level.get("SpellLevel")),
                        )?
                        .unwrap_or_default(),
                        spells: soft(
                            diag,
                            "SpellLists.Spells",
                            coerce::string_list(level.get("Spells")),
                        )?,
                    })
                })
                .collect::<mlua::Result<Vec<_>>>()?;
            Ok(SpellList {
                kind: soft(diag, "SpellLists.Kind", coerce::opt_string(item.get("Kind")))?
                    .unwrap_or_default(),
                name: soft(diag, "SpellLists.Name", coerce::opt_string(item.get("Name")))?
                    .unwrap_or_default(),
                levels,
            })
        })
        .collect()
}

fn parse_ability(
    diag: &Diagnostics,
    source: &Option<SourceInfo>,
    record: &ScriptValue,
) -> mlua::Result<UnboundAbility> {
    check_fields(diag, "ability", record, ABILITY_FIELDS)?;
    let selections = soft(diag, "Selection", coerce::opt_integer(record.get("Selection")))?;
    Ok(UnboundAbility {
        name: soft(diag, "Name", coerce::opt_string(record.get("Name")))?,
        key: soft(diag, "Key", coerce::opt_string(record.get("Key")))?,
        source: source.clone(),
        bonuses: parse_bonuses(diag, record.get("Bonuses"))?,
        stackable: soft(diag, "Stackable", coerce::opt_bool(record.get("Stackable")))?,
        category: soft(diag, "Category", coerce::opt_string(record.get("Category")))?,
        allow_multiple: soft(diag, "AllowMultiple", coerce::opt_bool(record.get("AllowMultiple")))?,
        visible: soft(diag, "Visible", coerce::opt_bool(record.get("Visible")))?,
        definitions: parse_variable_definitions(diag, record.get("Definitions"))?,
        aspects: parse_aspects(diag, record.get("Aspects"))?,
        types: soft(diag, "Types", coerce::string_list(record.get("Types")))?,
        cost: soft(diag, "Cost", coerce::opt_integer(record.get("Cost")))?,
        description: soft(
            diag,
            "Description",
            coerce::opt_formattable(record.get("Description")),
        )?,
        source_page: soft(diag, "SourcePage", coerce::opt_string(record.get("SourcePage")))?,
        choice: parse_choice(diag, record.get("Choice"), selections)?,
        grants: parse_grants(diag, record.get("Abilities"))?,
    })
}

fn parse_class(
    diag: &Diagnostics,
    source: &Option<SourceInfo>,
    record: &ScriptValue,
) -> mlua::Result<UnboundClass> {
    check_fields(diag, "class", record, CLASS_FIELDS)?;

    let mut levels = Vec::new();
    for item in soft(diag, "Levels", coerce::sequence(record.get("Levels")))? {
        let (start, repeat) = match item.get("Level") {
            Some(level) => soft_or(diag, "Levels.Level", coerce::level_span(level), (0, 0))?,
            None => {
                diag.report(Violation::MalformedValue {
                    field: "Levels.Level".to_string(),
                    detail: "missing Level field".to_string(),
                })?;
                (0, 0)
            }
        };

        let mut added_caster_levels = Vec::new();
        for entry in soft(
            diag,
            "Levels.AddedSpellCasterLevels",
            coerce::sequence(item.get("AddedSpellCasterLevels")),
        )? {
            if soft(diag, "AddedSpellCasterLevels.Any", coerce::opt_bool(entry.get("Any")))?
                == Some(true)
            {
                added_caster_levels.push(AddedCasterLevel::Any);
            } else {
                let kind = soft(
                    diag,
                    "AddedSpellCasterLevels.Type",
                    coerce::opt_string(entry.get("Type")),
                )?
                .unwrap_or_default();
                added_caster_levels.push(AddedCasterLevel::OfKind(kind));
            }
        }

        levels.push(UnboundRepeatingLevel {
            start,
            repeat,
            info: UnboundClassLevel {
                added_caster_levels,
                grants: parse_grants(diag, item.get("Abilities"))?,
            },
        });
    }

    Ok(UnboundClass {
        name: soft(diag, "Name", coerce::opt_string(record.get("Name")))?.unwrap_or_default(),
        source: source.clone(),
        facts: soft(diag, "Fact", coerce::string_map(record.get("Fact")))?,
        source_page: soft(diag, "SourcePage", coerce::opt_string(record.get("SourcePage")))?,
        condition: soft(diag, "Condition", coerce::condition(record.get("Condition")))?,
        definitions: parse_variable_definitions(diag, record.get("Definitions"))?,
        bonuses: parse_bonuses(diag, record.get("Bonuses"))?,
        types: soft(diag, "Types", coerce::string_list(record.get("Types")))?,
        roles: soft(diag, "Roles", coerce::string_list(record.get("Roles")))?,
        hit_die: soft(diag, "HitDice", coerce::opt_integer(record.get("HitDice")))?,
        max_level: soft(diag, "MaxLevel", coerce::opt_integer(record.get("MaxLevel")))?,
        levels,
        ex_class: soft(diag, "ExClass", coerce::opt_string(record.get("ExClass")))?,
    })
}

fn parse_domain(
    diag: &Diagnostics,
    source: &Option<SourceInfo>,
    record: &ScriptValue,
) -> mlua::Result<UnboundDomain> {
    check_fields(diag, "domain", record, DOMAIN_FIELDS)?;
    Ok(UnboundDomain {
        name: soft(diag, "Name", coerce::opt_string(record.get("Name")))?.unwrap_or_default(),
        source: source.clone(),
        description: soft(
            diag,
            "Description",
            coerce::opt_formattable(record.get("Description")),
        )?,
        definitions: parse_variable_definitions(diag, record.get("Definitions"))?,
        spell_lists: parse_spell_lists(diag, record.get("SpellLists"))?,
        condition: soft(diag, "Conditions", coerce::condition(record.get("Conditions")))?,
        class_skills: soft(diag, "ClassSkills", coerce::string_list(record.get("ClassSkills")))?,
        source_page: soft(diag, "SourcePage", coerce::opt_string(record.get("SourcePage")))?,
        grants: parse_grants(diag, record.get("Abilities"))?,
    })
}

fn parse_skill(
    diag: &Diagnostics,
    source: &Option<SourceInfo>,
    record: &ScriptValue,
) -> mlua::Result<UnboundSkill> {
    check_fields(diag, "skill", record, SKILL_FIELDS)?;
    Ok(UnboundSkill {
        name: soft(diag, "Name", coerce::opt_string(record.get("Name")))?.unwrap_or_default(),
        source: source.clone(),
        key_stat: soft(diag, "KeyStat", coerce::opt_string(record.get("KeyStat")))?,
        use_untrained: soft(diag, "UseUntrained", coerce::opt_bool(record.get("UseUntrained")))?,
        types: soft(diag, "Types", coerce::string_list(record.get("Types")))?,
        bonuses: parse_bonuses(diag, record.get("Bonuses"))?,
        source_page: soft(diag, "SourcePage", coerce::opt_string(record.get("SourcePage")))?,
        condition: soft(diag, "Condition", coerce::condition(record.get("Condition")))?,
    })
}

fn parse_equipment(
    diag: &Diagnostics,
    source: &Option<SourceInfo>,
    record: &ScriptValue,
) -> mlua::Result<UnboundEquipment> {
    check_fields(diag, "equipment", record, EQUIPMENT_FIELDS)?;

    let cost = match record.get("Cost") {
        None | Some(ScriptValue::Nil) => 0,
        Some(value) => soft(diag, "Cost", coerce::cost_cents(value))?,
    };

    let modifiers = soft(
        diag,
        "EquipmentModifiers",
        coerce::sequence(record.get("EquipmentModifiers")),
    )?
    .into_iter()
    .map(|item| {
        let parameters = soft(
            diag,
            "EquipmentModifiers.Parameters",
            coerce::sequence(item.get("Parameters")),
        )?
        .into_iter()
        .map(|p| {
            soft_or(
                diag,
                "EquipmentModifiers.Parameters",
                coerce::formula(p),
                Formula::Constant(0),
            )
        })
        .collect::<mlua::Result<Vec<_>>>()?;
        Ok(UnboundEquipmentAddModifier {
            parameters,
            modifier: soft(
                diag,
                "EquipmentModifiers.Key",
                coerce::opt_string(item.get("Key")),
            )?
            .unwrap_or_default(),
        })
    })
    .collect::<mlua::Result<Vec<_>>>()?;

    Ok(UnboundEquipment {
        name: soft(diag, "Name", coerce::opt_string(record.get("Name")))?.unwrap_or_default(),
        source: source.clone(),
        cost,
        base_quantity: soft(diag, "BaseQuantity", coerce::opt_integer(record.get("BaseQuantity")))?,
        effective_damage_resistance: soft(
            diag,
            "EffectiveDamageResistance",
            coerce::opt_integer(record.get("EffectiveDamageResistance")),
        )?,
        can_have_mods: soft(diag, "CanHaveMods", coerce::opt_bool(record.get("CanHaveMods")))?,
        mods_required: soft(diag, "ModsRequired", coerce::opt_bool(record.get("ModsRequired")))?,
        spell_book_page_count: soft(
            diag,
            "SpellBookPageCount",
            coerce::opt_integer(record.get("SpellBookPageCount")),
        )?,
        pages_per_spell: soft(
            diag,
            "PagesPerSpell",
            coerce::opt_formula(record.get("PagesPerSpell")),
        )?,
        size: soft(diag, "Size", coerce::opt_string(record.get("Size")))?,
        used_slots: soft(diag, "UsedSlots", coerce::opt_integer(record.get("UsedSlots")))?,
        weight: soft(diag, "Weight", coerce::opt_number(record.get("Weight")))?,
        armor_check_penalty: soft(
            diag,
            "ArmorCheckPenalty",
            coerce::opt_integer(record.get("ArmorCheckPenalty")),
        )?,
        fumble_range: soft(diag, "FumbleRange", coerce::opt_string(record.get("FumbleRange")))?,
        max_dex: soft(diag, "MaxDex", coerce::opt_integer(record.get("MaxDex")))?,
        proficiency: soft(diag, "Proficiency", coerce::opt_string(record.get("Proficiency")))?,
        range: soft(diag, "Range", coerce::opt_integer(record.get("Range")))?,
        reach: soft(diag, "Reach", coerce::opt_integer(record.get("Reach")))?,
        reach_multiplier: soft(
            diag,
            "ReachMultiplier",
            coerce::opt_integer(record.get("ReachMultiplier")),
        )?,
        arcane_spell_failure_chance: soft(
            diag,
            "ArcaneSpellFailureChance",
            coerce::opt_integer(record.get("ArcaneSpellFailureChance")),
        )?,
        wield_category: soft(
            diag,
            "WieldCategory",
            coerce::opt_string(record.get("WieldCategory")),
        )?,
        visible: soft(diag, "Visible", coerce::opt_bool(record.get("Visible")))?,
        qualities: soft(diag, "Qualities", coerce::string_map(record.get("Qualities")))?,
        bonuses: parse_bonuses(diag, record.get("Bonuses"))?,
        types: soft(diag, "Types", coerce::string_list(record.get("Types")))?,
        special_properties: soft(
            diag,
            "SpecialProperties",
            coerce::sequence(record.get("SpecialProperties")),
        )?
        .into_iter()
        .map(|p| soft(diag, "SpecialProperties", coerce::formattable(p).map(Some)))
        .filter_map(|r| r.transpose())
        .collect::<mlua::Result<Vec<_>>>()?,
        description: soft(
            diag,
            "Description",
            coerce::opt_formattable(record.get("Description")),
        )?,
        modifiers,
        base_item: soft(diag, "BaseItem", coerce::opt_string(record.get("BaseItem")))?,
    })
}

fn parse_equipment_modifier(
    diag: &Diagnostics,
    source: &Option<SourceInfo>,
    record: &ScriptValue,
) -> mlua::Result<UnboundEquipmentModifier> {
    check_fields(diag, "equipment modifier", record, EQUIPMENT_MODIFIER_FIELDS)?;

    let selections = soft(diag, "Selection", coerce::opt_integer(record.get("Selection")))?;
    let armor_type_change = match record.get("ArmorTypeChange") {
        None | Some(ScriptValue::Nil) => None,
        Some(table) => Some(ArmorTypeChange {
            from: soft(diag, "ArmorTypeChange.From", coerce::opt_string(table.get("From")))?
                .unwrap_or_default(),
            to: soft(diag, "ArmorTypeChange.To", coerce::opt_string(table.get("To")))?
                .unwrap_or_default(),
        }),
    };
    let charges = match record.get("Charges") {
        None | Some(ScriptValue::Nil) => None,
        Some(table) => Some(ChargeRange {
            min: soft(diag, "Charges.Min", coerce::opt_integer(table.get("Min")))?,
            max: soft(diag, "Charges.Max", coerce::opt_integer(table.get("Max")))?,
        }),
    };

    Ok(UnboundEquipmentModifier {
        key: soft(diag, "Key", coerce::opt_string(record.get("Key")))?.unwrap_or_default(),
        name: soft(diag, "Name", coerce::opt_string(record.get("Name")))?,
        source: source.clone(),
        bonuses: parse_bonuses(diag, record.get("Bonuses"))?,
        types: soft(diag, "Types", coerce::string_list(record.get("Types")))?,
        special_properties: soft(
            diag,
            "SpecialProperties",
            coerce::sequence(record.get("SpecialProperties")),
        )?
        .into_iter()
        .map(|p| soft(diag, "SpecialProperties", coerce::formattable(p).map(Some)))
        .filter_map(|r| r.transpose())
        .collect::<mlua::Result<Vec<_>>>()?,
        description: soft(
            diag,
            "Description",
            coerce::opt_formattable(record.get("Description")),
        )?,
        cost: soft(diag, "Cost", coerce::opt_formula(record.get("Cost")))?,
        granted_item_types: soft(
            diag,
            "GrantedItemTypes",
            coerce::string_list(record.get("GrantedItemTypes")),
        )?,
        visible: soft(diag, "Visible", coerce::opt_bool(record.get("Visible")))?,
        affects_both_heads: soft(
            diag,
            "AffectsBothHeads",
            coerce::opt_bool(record.get("AffectsBothHeads")),
        )?,
        name_modifier_text: soft(
            diag,
            "NameModifier",
            coerce::opt_string(record.get("NameModifier")),
        )?,
        name_modifier_location: soft(
            diag,
            "NameModifierLocation",
            coerce::opt_string(record.get("NameModifierLocation")),
        )?,
        choice: parse_choice(diag, record.get("Choice"), selections)?,
        replaces: soft(diag, "Replaces", coerce::string_list(record.get("Replaces")))?,
        armor_type_change,
        charges,
        equivalent_enhancement_bonus: soft(
            diag,
            "EquivalentEnhancementBonus",
            coerce::opt_integer(record.get("EquivalentEnhancementBonus")),
        )?,
        // A single item may be written as a bare string instead of a list.
        automatic_equipment: match record.get("AutomaticEquipment") {
            Some(ScriptValue::String(item)) => vec![item.clone()],
            value => soft(diag, "AutomaticEquipment", coerce::string_list(value))?,
        },
    })
}

fn parse_data_set_info(
    diag: &Diagnostics,
    record: &ScriptValue,
) -> mlua::Result<DataSetInformation> {
    let source = match record.get("SourceInfo") {
        None | Some(ScriptValue::Nil) => None,
        Some(table) => Some(parse_source_info(diag, table)?),
    };
    let publisher = match record.get("PublisherInfo") {
        None | Some(ScriptValue::Nil) => None,
        Some(table) => Some(PublisherInfo {
            short_name: soft(diag, "PublisherInfo.NameShort", coerce::opt_string(table.get("NameShort")))?
                .unwrap_or_default(),
            long_name: soft(diag, "PublisherInfo.NameLong", coerce::opt_string(table.get("NameLong")))?
                .unwrap_or_default(),
            url: soft(diag, "PublisherInfo.Url", coerce::opt_string(table.get("Url")))?
                .unwrap_or_default(),
        }),
    };
    let links = soft(diag, "Links", coerce::sequence(record.get("Links")))?
        .into_iter()
        .map(|item| {
            Ok(Link {
                name: soft(diag, "Links.Name", coerce::opt_string(item.get("Name")))?
                    .unwrap_or_default(),
                url: soft(diag, "Links.Url", coerce::opt_string(item.get("Url")))?
                    .unwrap_or_default(),
                text: soft(diag, "Links.Text", coerce::opt_string(item.get("Text")))?
                    .unwrap_or_default(),
            })
        })
        .collect::<mlua::Result<Vec<_>>>()?;

    Ok(DataSetInformation {
        name: soft(diag, "Name", coerce::opt_string(record.get("Name")))?.unwrap_or_default(),
        source,
        game_mode: soft(diag, "GameMode", coerce::opt_string(record.get("GameMode")))?
            .unwrap_or_default(),
        book_types: soft(diag, "BookTypes", coerce::string_list(record.get("BookTypes")))?,
        types: soft(diag, "Types", coerce::string_list(record.get("Types")))?,
        status: soft(diag, "Status", coerce::opt_string(record.get("Status")))?
            .unwrap_or_default(),
        copyright: soft(diag, "Copyright", coerce::opt_string(record.get("Copyright")))?
            .unwrap_or_default(),
        description: soft(diag, "Description", coerce::opt_string(record.get("Description")))?
            .unwrap_or_default(),
        genre: soft(diag, "Genre", coerce::opt_string(record.get("Genre")))?.unwrap_or_default(),
        info_text: soft(diag, "InfoText", coerce::opt_string(record.get("InfoText")))?
            .unwrap_or_default(),
        help_url: soft(diag, "HelpUrl", coerce::opt_string(record.get("HelpUrl")))?
            .unwrap_or_default(),
        is_mature: soft(diag, "IsMature", coerce::bool_or(record.get("IsMature"), false))?,
        is_ogl: soft(diag, "IsOGL", coerce::bool_or(record.get("IsOGL"), false))?,
        is_licensed: soft(diag, "IsLicensed", coerce::bool_or(record.get("IsLicensed"), false))?,
        condition: soft(diag, "Conditions", coerce::condition(record.get("Conditions")))?,
        publisher,
        rank: soft(diag, "Rank", coerce::opt_integer(record.get("Rank")))?.unwrap_or_default(),
        show_in_menu: soft(diag, "ShowInMenu", coerce::bool_or(record.get("ShowInMenu"), false))?,
        setting: soft(diag, "Setting", coerce::opt_string(record.get("Setting")))?
            .unwrap_or_default(),
        links,
    })
}

/// Register every host entry point as a Lua global.
pub fn register_entry_points(lua: &Lua, state: Rc<RefCell<LoaderState>>) -> mlua::Result<()> {
    let globals = lua.globals();

    macro_rules! entry {
        ($name:literal, $closure:expr) => {
            globals.set($name, lua.create_function($closure)?)?;
        };
    }

    // Definition and modification verbs.
    {
        let st = Rc::clone(&state);
        entry!("DefineAbility", move |_, record: ScriptValue| {
            let mut st = st.borrow_mut();
            let LoaderState { diag, regs, source, .. } = &mut *st;
            let ability = parse_ability(diag, source, &record)?;
            regs.abilities.define(diag, ability)
        });
    }
    {
        let st = Rc::clone(&state);
        entry!("ModifyAbility", move |_, record: ScriptValue| {
            let mut st = st.borrow_mut();
            let LoaderState { diag, regs, source, .. } = &mut *st;
            let ability = parse_ability(diag, source, &record)?;
            regs.abilities.modify(diag, ability)
        });
    }
    {
        let st = Rc::clone(&state);
        entry!("DefineClass", move |_, record: ScriptValue| {
            let mut st = st.borrow_mut();
            let LoaderState { diag, regs, source, .. } = &mut *st;
            let class = parse_class(diag, source, &record)?;
            regs.classes.define(diag, &class.name.clone(), class)
        });
    }
    {
        let st = Rc::clone(&state);
        entry!("DefineDomain", move |_, record: ScriptValue| {
            let mut st = st.borrow_mut();
            let LoaderState { diag, regs, source, .. } = &mut *st;
            let domain = parse_domain(diag, source, &record)?;
            regs.domains.define(diag, &domain.name.clone(), domain)
        });
    }
    {
        let st = Rc::clone(&state);
        entry!("ModifyDomain", move |_, record: ScriptValue| {
            let mut st = st.borrow_mut();
            let LoaderState { diag, regs, source, .. } = &mut *st;
            let domain = parse_domain(diag, source, &record)?;
            regs.domains
                .modify(diag, &domain.name.clone(), domain, UnboundDomain::merge)
        });
    }
    {
        let st = Rc::clone(&state);
        entry!("DefineSkill", move |_, record: ScriptValue| {
            let mut st = st.borrow_mut();
            let LoaderState { diag, regs, source, .. } = &mut *st;
            let skill = parse_skill(diag, source, &record)?;
            regs.skills.define(diag, &skill.name.clone(), skill)
        });
    }
    {
        let st = Rc::clone(&state);
        entry!("DefineEquipment", move |_, record: ScriptValue| {
            let mut st = st.borrow_mut();
            let LoaderState { diag, regs, source, .. } = &mut *st;
            let equipment = parse_equipment(diag, source, &record)?;
            regs.equipment
                .define(diag, &equipment.name.clone(), equipment)
        });
    }
    {
        let st = Rc::clone(&state);
        entry!("DefineEquipmentModifier", move |_, record: ScriptValue| {
            let mut st = st.borrow_mut();
            let LoaderState { diag, regs, source, .. } = &mut *st;
            let modifier = parse_equipment_modifier(diag, source, &record)?;
            regs.equipment_modifiers
                .define(diag, &modifier.key.clone(), modifier)
        });
    }
    {
        let st = Rc::clone(&state);
        entry!("DefineStat", move |_, record: ScriptValue| {
            let mut st = st.borrow_mut();
            let LoaderState { diag, regs, .. } = &mut *st;
            check_fields(diag, "ability score", &record, STAT_FIELDS)?;
            let modifications = soft(diag, "Modifications", coerce::sequence(record.get("Modifications")))?
                .into_iter()
                .map(|item| {
                    Ok(ModDefinition {
                        target: soft(diag, "Modifications.Target", coerce::opt_string(item.get("Target")))?
                            .unwrap_or_default(),
                        action: soft(diag, "Modifications.Action", coerce::opt_string(item.get("Action")))?
                            .unwrap_or_default(),
                        value: soft(diag, "Modifications.Value", coerce::opt_formula(item.get("Value")))?,
                    })
                })
                .collect::<mlua::Result<Vec<_>>>()?;
            let score = UnboundAbilityScore {
                key: soft(diag, "Key", coerce::opt_string(record.get("Key")))?.unwrap_or_default(),
                name: soft(diag, "Name", coerce::opt_string(record.get("Name")))?
                    .unwrap_or_default(),
                sort_key: soft(diag, "SortKey", coerce::opt_string(record.get("SortKey")))?,
                abbreviation: soft(diag, "Abbreviation", coerce::opt_string(record.get("Abbreviation")))?,
                stat_mod_formula: soft(
                    diag,
                    "StatModFormula",
                    coerce::opt_formula(record.get("StatModFormula")),
                )?,
                modifications,
                definitions: parse_variable_definitions(diag, record.get("Definitions"))?,
                bonuses: parse_bonuses(diag, record.get("Bonuses"))?,
                grants: parse_grants(diag, record.get("Abilities"))?,
            };
            regs.ability_scores.define(diag, &score.key.clone(), score)
        });
    }
    {
        let st = Rc::clone(&state);
        entry!("DefineAlignment", move |_, record: ScriptValue| {
            let mut st = st.borrow_mut();
            let LoaderState { diag, regs, .. } = &mut *st;
            check_fields(diag, "alignment", &record, ALIGNMENT_FIELDS)?;
            let key = soft(diag, "Key", coerce::opt_string(record.get("Key")))?
                .unwrap_or_default();
            let alignment = Alignment {
                name: soft(diag, "Name", coerce::opt_string(record.get("Name")))?
                    .unwrap_or_default(),
                abbreviation: soft(diag, "Abbreviation", coerce::opt_string(record.get("Abbreviation")))?
                    .unwrap_or_default(),
                sort_key: soft(diag, "SortKey", coerce::opt_string(record.get("SortKey")))?
                    .unwrap_or_default(),
            };
            regs.alignments.define(diag, &key, alignment)
        });
    }
    {
        let st = Rc::clone(&state);
        entry!("DefineFact", move |_, record: ScriptValue| {
            let mut st = st.borrow_mut();
            let LoaderState { diag, regs, .. } = &mut *st;
            check_fields(diag, "fact", &record, FACT_FIELDS)?;
            let category = soft(diag, "Category", coerce::opt_string(record.get("Category")))?
                .unwrap_or_default();
            let sub_key = soft(diag, "Key", coerce::opt_string(record.get("Key")))?
                .unwrap_or_default();
            let fact = Fact {
                category: category.clone(),
                selectable: soft(diag, "Selectable", coerce::bool_or(record.get("Selectable"), true))?,
                visible: soft(diag, "Visible", coerce::bool_or(record.get("Visible"), true))?,
                required: soft(diag, "Required", coerce::bool_or(record.get("Required"), true))?,
                data_format: soft(diag, "DataFormat", coerce::opt_string(record.get("DataFormat")))?
                    .unwrap_or_default(),
                display_name: soft(diag, "DisplayName", coerce::opt_string(record.get("DisplayName")))?,
                explanation: soft(diag, "Explanation", coerce::opt_string(record.get("Explanation")))?,
            };
            regs.facts.define(diag, &fact_key(&category, &sub_key), fact)
        });
    }
    {
        let st = Rc::clone(&state);
        entry!("DefineSave", move |_, record: ScriptValue| {
            let mut st = st.borrow_mut();
            let LoaderState { diag, regs, .. } = &mut *st;
            check_fields(diag, "save", &record, SAVE_FIELDS)?;
            let name = soft(diag, "Name", coerce::opt_string(record.get("Name")))?
                .unwrap_or_default();
            let bonus = match record.get("Bonus") {
                None | Some(ScriptValue::Nil) => None,
                Some(table) => Some(parse_bonus(diag, table)?),
            };
            let save = Save {
                name: name.clone(),
                sort_key: soft(diag, "SortKey", coerce::opt_string(record.get("SortKey")))?
                    .unwrap_or_else(|| name.clone()),
                bonus,
            };
            regs.saves.define(diag, &name, save)
        });
    }
    {
        let st = Rc::clone(&state);
        entry!("DefineVariable", move |_, record: ScriptValue| {
            let mut st = st.borrow_mut();
            let LoaderState { diag, regs, .. } = &mut *st;
            check_fields(diag, "variable", &record, VARIABLE_FIELDS)?;
            let variable = Variable {
                name: soft(diag, "Name", coerce::opt_string(record.get("Name")))?
                    .unwrap_or_default(),
                var_type: soft(diag, "Type", coerce::opt_string(record.get("Type")))?
                    .unwrap_or_default(),
                channel: soft(diag, "Channel", coerce::opt_string(record.get("Channel")))?,
                scope: soft(diag, "Scope", coerce::opt_string(record.get("Scope")))?,
            };
            regs.variables.define(diag, &variable.name.clone(), variable)
        });
    }
    {
        let st = Rc::clone(&state);
        entry!("DefineAbilityCategory", move |_, record: ScriptValue| {
            let mut st = st.borrow_mut();
            let LoaderState { diag, regs, .. } = &mut *st;
            check_fields(diag, "ability category", &record, ABILITY_CATEGORY_FIELDS)?;
            let name = soft(diag, "Name", coerce::opt_string(record.get("Name")))?
                .unwrap_or_default();
            let category = AbilityCategory {
                name: name.clone(),
                category: soft(diag, "Category", coerce::opt_string(record.get("Category")))?
                    .unwrap_or_default(),
                plural: soft(diag, "Plural", coerce::opt_string(record.get("Plural")))?
                    .unwrap_or_else(|| name.clone()),
                display_location: soft(
                    diag,
                    "DisplayLocation",
                    coerce::opt_string(record.get("DisplayLocation")),
                )?,
                visible: soft(diag, "Visible", coerce::bool_or(record.get("Visible"), false))?,
                editable: soft(diag, "Editable", coerce::bool_or(record.get("Editable"), false))?,
                edit_pool: soft(diag, "EditPool", coerce::bool_or(record.get("EditPool"), false))?,
                fractional_pool: soft(
                    diag,
                    "FractionalPool",
                    coerce::bool_or(record.get("FractionalPool"), false),
                )?,
                pool: soft(diag, "Pool", coerce::opt_string(record.get("Pool")))?,
                ability_list: soft(diag, "AbilityList", coerce::opt_string(record.get("AbilityList")))?,
                types: soft(diag, "Types", coerce::string_list(record.get("Types")))?,
            };
            regs.ability_categories.define(diag, &name, category)
        });
    }

    // Data set metadata.
    {
        let st = Rc::clone(&state);
        entry!("SetSource", move |_, record: ScriptValue| {
            let mut st = st.borrow_mut();
            let source = parse_source_info(&st.diag, &record)?;
            st.source = Some(source);
            Ok(())
        });
    }
    {
        let st = Rc::clone(&state);
        entry!("SetDataSetInfo", move |_, record: ScriptValue| {
            let mut st = st.borrow_mut();
            let info = parse_data_set_info(&st.diag, &record)?;
            st.info = Some(info);
            Ok(())
        });
    }

    // File inclusion. The state borrow is dropped around the nested
    // execution so entry points invoked by the imported file can take it.
    {
        let st = Rc::clone(&state);
        entry!("ImportFile", move |lua, path: String| {
            let resolved = {
                let state = st.borrow();
                let resolved = state.resolve_import(&path);
                if !resolved.is_file() {
                    state.diag.report(Violation::MissingTarget {
                        kind: "file",
                        key: resolved.display().to_string(),
                    })?;
                    return Ok(());
                }
                resolved
            };

            let source = std::fs::read_to_string(&resolved).map_err(mlua::Error::external)?;
            st.borrow_mut().diag.push_file(resolved.clone());

            let chunk_name = format!("@{}", resolved.display());
            let result = lua.load(&source).set_name(&chunk_name).exec();

            let mut state = st.borrow_mut();
            state.diag.pop_file();
            // Provenance never leaks across file boundaries.
            state.source = None;
            result
        });
    }

    // Opaque value constructors.
    {
        let st = Rc::clone(&state);
        entry!("Formula", move |_, value: ScriptValue| {
            let st = st.borrow();
            let formula = soft_or(
                &st.diag,
                "Formula",
                coerce::formula(&value),
                Formula::Constant(0),
            )?;
            Ok(FormulaValue(formula))
        });
    }
    entry!("DiceFormula", move |_, text: String| {
        Ok(DiceFormulaValue(crate::data::types::DiceFormula(text)))
    });

    // Chooser constructors. A filtered chooser takes one filter callable or
    // a list of callables that must all pass.
    for (name, kind) in [
        ("ChooseSkill", ChooserKind::Skill),
        ("ChooseSpell", ChooserKind::Spell),
        ("ChooseLanguage", ChooserKind::Language),
        ("ChooseClass", ChooserKind::Class),
        ("ChooseSchool", ChooserKind::School),
        ("ChooseWeaponProficiency", ChooserKind::WeaponProficiency),
    ] {
        let func = lua.create_function(move |_, value: ScriptValue| {
            let filters = match value {
                ScriptValue::Callable(f) => vec![f],
                ScriptValue::Sequence(items) => {
                    let mut filters = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            ScriptValue::Callable(f) => filters.push(f),
                            other => {
                                return Err(mlua::Error::RuntimeError(format!(
                                    "{} expects functions, found {}",
                                    kind.as_str(),
                                    other.type_name()
                                )))
                            }
                        }
                    }
                    filters
                }
                other => {
                    return Err(mlua::Error::RuntimeError(format!(
                        "{} chooser is incorrectly defined: {}",
                        kind.as_str(),
                        other.type_name()
                    )))
                }
            };
            Ok(ChooserValue(Chooser::Filtered { kind, filters }))
        })?;
        globals.set(name, func)?;
    }

    entry!("ChooseString", move |_, options: ScriptValue| {
        let options = coerce::string_list(Some(&options))
            .map_err(|m| mlua::Error::RuntimeError(format!("ChooseString: {}", m)))?;
        Ok(ChooserValue(Chooser::Options(options)))
    });
    entry!("ChooseUserInput", move |_, (count, prompt): (i64, String)| {
        Ok(ChooserValue(Chooser::UserInput { count, prompt }))
    });
    {
        let st = Rc::clone(&state);
        entry!("ChooseNumber", move |_, record: ScriptValue| {
            let st = st.borrow();
            let diag = &st.diag;
            Ok(ChooserValue(Chooser::Number {
                min: soft(diag, "ChooseNumber.Min", coerce::opt_integer(record.get("Min")))?,
                max: soft(diag, "ChooseNumber.Max", coerce::opt_integer(record.get("Max")))?,
                increment: soft(
                    diag,
                    "ChooseNumber.Increment",
                    coerce::opt_integer(record.get("Increment")),
                )?,
                title: soft(diag, "ChooseNumber.Title", coerce::opt_string(record.get("Title")))?,
            }))
        });
    }
    // Selection kinds the engine does not model; the choice block that
    // carries them degrades to "no choice".
    entry!("ChooseNothing", move |_, ()| Ok(mlua::Value::Nil));
    entry!("ChooseAbilitySelection", move |_, _: ScriptValue| {
        Ok(mlua::Value::Nil)
    });

    // Entry points accepted for source compatibility with published
    // content, with no data set effect.
    entry!("HideObjects", move |_, _: mlua::MultiValue| Ok(()));
    entry!("AddAvailableCompanions", move |_, _: mlua::MultiValue| Ok(()));
    entry!("CopyEquipment", move |_, _: mlua::MultiValue| Ok(()));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptEngine;

    fn run(strictness: Strictness, source: &str) -> (Rc<RefCell<LoaderState>>, crate::error::Result<()>) {
        let engine = ScriptEngine::new().unwrap();
        let state = Rc::new(RefCell::new(LoaderState::new(
            PathBuf::from("."),
            strictness,
        )));
        register_entry_points(engine.lua(), Rc::clone(&state)).unwrap();
        let result = engine.execute(source);
        (state, result)
    }

    #[test]
    fn test_define_ability_registers_both_keyspaces() {
        let (state, result) = run(
            Strictness::Strict,
            r#"
            DefineAbility({
                Name = "Power Attack",
                Key = "FEAT_PowerAttack",
                Category = "FEAT",
                Types = { "General", "Fighter" },
            })
            "#,
        );
        result.unwrap();
        let state = state.borrow();
        let by_key = state.regs.abilities.get("FEAT_PowerAttack").unwrap();
        assert_eq!(by_key.name.as_deref(), Some("Power Attack"));
        assert_eq!(by_key.types, vec!["General", "Fighter"]);
        assert!(state.regs.abilities.contains("power attack"));
    }

    #[test]
    fn test_unknown_field_strict_aborts() {
        let (_, result) = run(
            Strictness::Strict,
            r#"DefineAbility({ Name = "X", Wings = 2 })"#,
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unknown ability field 'Wings'"), "{}", err);
    }

    #[test]
    fn test_unknown_field_lax_keeps_record() {
        let (state, result) = run(
            Strictness::Lax,
            r#"DefineAbility({ Name = "X", Wings = 2 })"#,
        );
        result.unwrap();
        assert!(state.borrow().regs.abilities.contains("X"));
    }

    #[test]
    fn test_malformed_value_lax_defaults() {
        let (state, result) = run(
            Strictness::Lax,
            r#"DefineAbility({ Name = "X", Types = "General" })"#,
        );
        result.unwrap();
        let state = state.borrow();
        assert!(state.regs.abilities.get("X").unwrap().types.is_empty());
    }

    #[test]
    fn test_set_source_attaches_provenance() {
        let (state, result) = run(
            Strictness::Strict,
            r#"
            SetSource({
                SourceLong = "Core Rulebook",
                SourceShort = "CR",
                SourceWeb = "http://example.com",
                SourceDate = "2003-07-01",
            })
            DefineAbility({ Name = "Dodge" })
            "#,
        );
        result.unwrap();
        let state = state.borrow();
        let source = state.regs.abilities.get("Dodge").unwrap().source.clone().unwrap();
        assert_eq!(source.short_name, "CR");
        assert_eq!(source.date, "2003-07-01");
    }

    #[test]
    fn test_define_class_levels() {
        let (state, result) = run(
            Strictness::Strict,
            r#"
            DefineClass({
                Name = "Wizard",
                HitDice = 4,
                MaxLevel = 20,
                Levels = {
                    { Level = "1", Abilities = {
                        { Category = "FEAT", Nature = "AUTOMATIC", Names = { "Scribe Scroll" } },
                    } },
                    { Level = "Start=5,Repeat=5", AddedSpellCasterLevels = { { Any = true } } },
                },
            })
            "#,
        );
        result.unwrap();
        let state = state.borrow();
        let class = state.regs.classes.get("Wizard").unwrap();
        assert_eq!(class.hit_die, Some(4));
        assert_eq!(class.levels.len(), 2);
        assert_eq!(class.levels[0].start, 1);
        assert_eq!(class.levels[0].info.grants[0].ability, "Scribe Scroll");
        assert_eq!(class.levels[1].repeat, 5);
        assert_eq!(
            class.levels[1].info.added_caster_levels,
            vec![AddedCasterLevel::Any]
        );
    }

    #[test]
    fn test_grant_list_expands_names() {
        let (state, result) = run(
            Strictness::Strict,
            r#"
            DefineDomain({
                Name = "War",
                Abilities = {
                    { Category = "FEAT", Nature = "AUTOMATIC",
                      Names = { "Weapon Focus", "Martial Training" } },
                },
            })
            "#,
        );
        result.unwrap();
        let state = state.borrow();
        let domain = state.regs.domains.get("War").unwrap();
        assert_eq!(domain.grants.len(), 2);
        assert!(domain.grants.iter().all(|g| g.category == "FEAT"));
    }

    #[test]
    fn test_fact_registry_key() {
        let (state, result) = run(
            Strictness::Strict,
            r#"DefineFact({ Category = "TESTCAT", Key = "TestKey", DataFormat = "String" })"#,
        );
        result.unwrap();
        let state = state.borrow();
        let fact = state.regs.facts.get("TESTCAT|TestKey").unwrap();
        assert!(fact.selectable && fact.visible && fact.required);
        assert_eq!(fact.data_format, "String");
        assert!(fact.display_name.is_none());
    }

    #[test]
    fn test_equipment_cost_in_cents() {
        let (state, result) = run(
            Strictness::Strict,
            r#"
            DefineEquipment({ Name = "Dagger", Cost = 2 })
            DefineEquipment({ Name = "Potion", Cost = 0.5 })
            "#,
        );
        result.unwrap();
        let state = state.borrow();
        assert_eq!(state.regs.equipment.get("Dagger").unwrap().cost, 200);
        assert_eq!(state.regs.equipment.get("Potion").unwrap().cost, 50);
    }

    #[test]
    fn test_formula_and_chooser_round_trip() {
        let (state, result) = run(
            Strictness::Strict,
            r#"
            DefineAbility({
                Name = "Skill Focus",
                Choice = { Choose = ChooseSkill(function(c, s) return true end), MaxTimes = 3 },
                Selection = 1,
                Bonuses = {
                    { Category = "SKILL", Variables = { "SkillFocus" }, Formula = Formula("CL/2") },
                },
            })
            "#,
        );
        result.unwrap();
        let state = state.borrow();
        let ability = state.regs.abilities.get("Skill Focus").unwrap();
        let choice = ability.choice.as_ref().unwrap();
        assert_eq!(choice.selections, Some(1));
        assert_eq!(choice.max_times, Some(3));
        assert!(matches!(
            choice.chooser,
            Chooser::Filtered { kind: ChooserKind::Skill, .. }
        ));
        assert_eq!(
            ability.bonuses[0].formula,
            Some(Formula::Symbolic("CL/2".to_string()))
        );
    }

    #[test]
    fn test_choose_nothing_drops_choice() {
        let (state, result) = run(
            Strictness::Strict,
            r#"DefineAbility({ Name = "Plain", Choice = { Choose = ChooseNothing() } })"#,
        );
        result.unwrap();
        let state = state.borrow();
        assert!(state.regs.abilities.get("Plain").unwrap().choice.is_none());
    }

    #[test]
    fn test_modify_ability_merges() {
        let (state, result) = run(
            Strictness::Strict,
            r#"
            DefineAbility({ Name = "Toughness", Cost = 5 })
            ModifyAbility({ Name = "Toughness", Cost = 10 })
            ModifyAbility({ Name = "Toughness", Types = { "General" } })
            "#,
        );
        result.unwrap();
        let state = state.borrow();
        let ability = state.regs.abilities.get("Toughness").unwrap();
        assert_eq!(ability.cost, Some(10));
        assert_eq!(ability.types, vec!["General"]);
    }

    #[test]
    fn test_set_data_set_info() {
        let (state, result) = run(
            Strictness::Strict,
            r#"
            SetDataSetInfo({
                Name = "Core Pack",
                GameMode = "35e",
                Rank = 1,
                IsOGL = true,
                ShowInMenu = true,
                PublisherInfo = { NameShort = "ACME", NameLong = "ACME Games", Url = "http://acme.example" },
                Links = { { Name = "Errata", Url = "http://acme.example/errata", Text = "errata" } },
            })
            "#,
        );
        result.unwrap();
        let state = state.borrow();
        let info = state.info.as_ref().unwrap();
        assert_eq!(info.name, "Core Pack");
        assert!(info.is_ogl && !info.is_mature);
        assert_eq!(info.publisher.as_ref().unwrap().short_name, "ACME");
        assert_eq!(info.links.len(), 1);
    }

    #[test]
    fn test_compat_entry_points_are_noops() {
        let (_, result) = run(
            Strictness::Strict,
            r#"
            HideObjects("abilities", {})
            AddAvailableCompanions("Familiar", {}, {})
            CopyEquipment("Dagger", {})
            "#,
        );
        result.unwrap();
    }
}
