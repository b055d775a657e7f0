//! Opaque chooser values produced by the `Choose*` script callbacks.
//!
//! A chooser describes how a player later picks targets for an ability or
//! equipment modifier. During a load it is carried as-is; the selection UI
//! interprets it.

use mlua::Function;

/// What kind of rule object a filtered chooser selects from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChooserKind {
    Skill,
    Spell,
    Language,
    Class,
    School,
    WeaponProficiency,
}

impl ChooserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChooserKind::Skill => "Skill",
            ChooserKind::Spell => "Spell",
            ChooserKind::Language => "Language",
            ChooserKind::Class => "Class",
            ChooserKind::School => "School",
            ChooserKind::WeaponProficiency => "WeaponProficiency",
        }
    }
}

/// An opaque chooser value.
#[derive(Debug, Clone)]
pub enum Chooser {
    /// Select from all objects of a kind that pass every filter callable.
    Filtered {
        kind: ChooserKind,
        filters: Vec<Function>,
    },
    /// Select from a fixed list of strings.
    Options(Vec<String>),
    /// Select from a numeric range.
    Number {
        min: Option<i64>,
        max: Option<i64>,
        increment: Option<i64>,
        title: Option<String>,
    },
    /// Free-form text entered by the player.
    UserInput { count: i64, prompt: String },
}

/// A choice attached to an ability: a chooser plus selection limits.
#[derive(Debug, Clone)]
pub struct Choice {
    pub chooser: Chooser,
    pub selections: Option<i64>,
    pub max_times: Option<i64>,
}

/// How an equipment modifier rewrites its item's display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameModifier {
    pub text: NameModifierText,
    pub location: NameModifierLocation,
}

/// The text inserted by a name modifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameModifierText {
    /// The modifier's own name.
    Normal,
    /// The text of the player's choice.
    Choice,
    /// A fixed literal.
    Text(String),
}

/// Where the modifier text is placed relative to the base item name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameModifierLocation {
    Parentheses,
    Prefix,
    Suffix,
}

impl NameModifier {
    /// Parse the `NameModifier` / `NameModifierLocation` field pair.
    ///
    /// Unrecognized values fall back to the modifier's own name in
    /// parentheses, the most common shape in published content.
    pub fn from_fields(text: Option<&str>, location: Option<&str>) -> NameModifier {
        let text = match text.map(|t| t.to_lowercase()) {
            None => NameModifierText::Normal,
            Some(t) => match t.as_str() {
                "normal" => NameModifierText::Normal,
                "noname" | "spell" => NameModifierText::Choice,
                other => match other.strip_prefix("text=") {
                    Some(literal) => NameModifierText::Text(literal.to_string()),
                    None => NameModifierText::Normal,
                },
            },
        };
        let location = match location.map(|l| l.to_lowercase()).as_deref() {
            Some("prefix") => NameModifierLocation::Prefix,
            Some("suffix") => NameModifierLocation::Suffix,
            _ => NameModifierLocation::Parentheses,
        };
        NameModifier { text, location }
    }

    /// Render an item name with this modifier applied.
    pub fn format_name(&self, base: &str, modifier_name: &str, choice: Option<&str>) -> String {
        let text = match &self.text {
            NameModifierText::Normal => modifier_name,
            NameModifierText::Choice => choice.unwrap_or(modifier_name),
            NameModifierText::Text(literal) => literal.as_str(),
        };
        match self.location {
            NameModifierLocation::Parentheses => format!("{} ({})", base, text),
            NameModifierLocation::Prefix => format!("{} {}", text, base),
            NameModifierLocation::Suffix => format!("{} {}", base, text),
        }
    }
}
