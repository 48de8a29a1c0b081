// Editor control inference for hand-editing design tokens.
//
// Both functions are pure: the UI asks which control to render for a field
// and how to fold responsive variants (`paddingMobile`, `padding_tablet`,
// `padding.desktop`) under one base name.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Color,
    Dimension,
    Number,
    Toggle,
    FontFamily,
    Text,
    Group,
    List,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Viewport {
    Mobile,
    Tablet,
    Desktop,
}

impl Viewport {
    pub const ALL: [Viewport; 3] = [Viewport::Mobile, Viewport::Tablet, Viewport::Desktop];

    fn parse(suffix: &str) -> Option<Self> {
        match suffix.to_ascii_lowercase().as_str() {
            "mobile" => Some(Self::Mobile),
            "tablet" => Some(Self::Tablet),
            "desktop" => Some(Self::Desktop),
            _ => None,
        }
    }
}

/// A base field with its per-viewport variants (viewport -> original field name).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponsiveGroup {
    pub base: String,
    pub variants: BTreeMap<Viewport, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponsiveGrouping {
    pub groups: Vec<ResponsiveGroup>,
    pub ungrouped: Vec<String>,
}

fn color_value_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(#[0-9a-f]{3,8}|rgba?\(.*\)|hsla?\(.*\)|transparent)$")
            .expect("color pattern should compile")
    })
}

fn dimension_value_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^-?\d+(\.\d+)?(px|rem|em|%|vh|vw|pt|ch)$")
            .expect("dimension pattern should compile")
    })
}

fn responsive_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"^(?P<base>.+?)",
            r"(?:[._-](?i:(?P<sep>mobile|tablet|desktop))|(?P<camel>Mobile|Tablet|Desktop))$"
        ))
        .expect("responsive key pattern should compile")
    })
}

/// Pick the editing control for one `(key, value)` pair.
pub fn classify_control(key: &str, value: &Value) -> ControlKind {
    let lowered = key.to_ascii_lowercase();
    match value {
        Value::Bool(_) => ControlKind::Toggle,
        Value::Number(_) => ControlKind::Number,
        Value::Object(_) => ControlKind::Group,
        Value::Array(_) => ControlKind::List,
        Value::Null => ControlKind::Text,
        Value::String(text) => {
            let text = text.trim();
            if color_value_pattern().is_match(text)
                || lowered.contains("color")
                || lowered.ends_with("background")
            {
                ControlKind::Color
            } else if lowered.contains("font") && lowered.contains("family") {
                ControlKind::FontFamily
            } else if dimension_value_pattern().is_match(text) {
                ControlKind::Dimension
            } else {
                ControlKind::Text
            }
        }
    }
}

/// Fold viewport-suffixed field names under their base name.
///
/// A base gains a group only when at least one suffixed variant exists; the
/// order of groups follows the first appearance of each base.
pub fn group_responsive<S: AsRef<str>>(fields: &[S]) -> ResponsiveGrouping {
    let mut order: Vec<String> = Vec::new();
    let mut variants: BTreeMap<String, BTreeMap<Viewport, String>> = BTreeMap::new();
    let mut plain: Vec<String> = Vec::new();

    for field in fields {
        let field = field.as_ref();
        match split_viewport(field) {
            Some((base, viewport)) => {
                if !variants.contains_key(base) {
                    order.push(base.to_string());
                }
                variants.entry(base.to_string()).or_default().insert(viewport, field.to_string());
            }
            None => plain.push(field.to_string()),
        }
    }

    let groups = order
        .into_iter()
        .filter_map(|base| {
            variants.remove(&base).map(|variants| ResponsiveGroup { base, variants })
        })
        .collect::<Vec<_>>();

    let ungrouped =
        plain.into_iter().filter(|field| !groups.iter().any(|g| &g.base == field)).collect();

    ResponsiveGrouping { groups, ungrouped }
}

fn split_viewport(field: &str) -> Option<(&str, Viewport)> {
    let captures = responsive_key_pattern().captures(field)?;
    let base = captures.name("base")?.as_str();
    let suffix = captures.name("sep").or_else(|| captures.name("camel"))?.as_str();
    Some((base, Viewport::parse(suffix)?))
}
