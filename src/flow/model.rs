//! Chat configuration and guided-flow data models.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Root of the server-supplied chat configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub main_menu_items: Vec<MenuItem>,
    /// Greeting lines shown before the first menu (never on reset).
    #[serde(default, deserialize_with = "null_as_empty", skip_serializing_if = "Vec::is_empty")]
    pub welcome_texts: Vec<String>,
}

impl ChatConfig {
    /// Sort menu items and each item's instructions by `order`.
    ///
    /// `sort_by_key` is stable, so equal orders keep their array position.
    pub fn normalize(&mut self) {
        self.main_menu_items.sort_by_key(|item| item.order);
        for item in &mut self.main_menu_items {
            item.instructions.sort_by_key(|i| i.order);
        }
    }

    pub fn menu_labels(&self) -> Vec<String> {
        self.main_menu_items.iter().map(|i| i.name.clone()).collect()
    }

    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.main_menu_items.iter().position(|i| i.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_order")]
    pub order: i64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub instructions: Vec<Instruction>,
    /// Selecting this item opens product search instead of a guided flow.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub product_search: bool,
}

/// One step of a guided flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instruction {
    /// Prompt text.
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_order")]
    pub order: i64,
    #[serde(default)]
    pub require_user_input: InputRequirement,
    #[serde(default)]
    pub display_as: DisplayAs,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub values: Vec<String>,
    /// Key the answer is stored under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
    /// Non-empty marks the explicit end of the flow.
    #[serde(default, deserialize_with = "null_as_empty", skip_serializing_if = "Vec::is_empty")]
    pub return_menu: Vec<String>,
}

impl Instruction {
    /// The answer key, when present and non-blank.
    pub fn answer_key(&self) -> Option<&str> {
        self.api.as_deref().filter(|k| !k.trim().is_empty())
    }

    pub fn offers_skip(&self) -> bool {
        self.require_user_input == InputRequirement::Optional
            && self.values.iter().any(|v| v == SKIP_VALUE)
    }
}

/// Value that marks an optional text instruction as skippable.
pub const SKIP_VALUE: &str = "Skip";

/// Whether an instruction waits for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputRequirement {
    No,
    #[default]
    Yes,
    Optional,
}

impl InputRequirement {
    /// Case-insensitive; anything unrecognized waits for input.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "no" => Self::No,
            "optional" => Self::Optional,
            _ => Self::Yes,
        }
    }
}

impl<'de> Deserialize<'de> for InputRequirement {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(raw.as_deref().map(Self::parse).unwrap_or_default())
    }
}

/// How an instruction collects its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayAs {
    Button,
    #[default]
    Text,
}

impl DisplayAs {
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("button") {
            Self::Button
        } else {
            Self::Text
        }
    }
}

impl<'de> Deserialize<'de> for DisplayAs {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(raw.as_deref().map(Self::parse).unwrap_or_default())
    }
}

/// Answers collected during one guided-flow traversal, keyed by `api`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserData(BTreeMap<String, String>);

impl UserData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        )
    }
}

/// Cursor into the selected menu item's instructions.
///
/// `instruction_index` starts at -1 and is incremented before each
/// instruction is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionPath {
    pub main_menu_index: usize,
    pub instruction_index: isize,
}

impl InstructionPath {
    pub fn new(main_menu_index: usize) -> Self {
        Self {
            main_menu_index,
            instruction_index: -1,
        }
    }

    pub fn advance(&mut self) -> isize {
        self.instruction_index += 1;
        self.instruction_index
    }

    /// Current instruction position, `None` before the first advance.
    pub fn current(&self) -> Option<usize> {
        usize::try_from(self.instruction_index).ok()
    }
}

/// Collected answers for one finished flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    /// Name of the menu item the flow belongs to.
    pub menu: String,
    pub data: UserData,
}

/// One product-search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(default, alias = "Price", skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, alias = "Url", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, alias = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn null_as_empty<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OrderRepr {
    Int(i64),
    Float(f64),
    Text(String),
    Other(serde::de::IgnoredAny),
}

/// Accepts integers, floats and numeric strings; anything else sorts as 0.
fn lenient_order<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    Ok(match Option::<OrderRepr>::deserialize(d)? {
        Some(OrderRepr::Int(n)) => n,
        Some(OrderRepr::Float(f)) => f as i64,
        Some(OrderRepr::Text(s)) => s.trim().parse().unwrap_or(0),
        Some(OrderRepr::Other(_)) | None => 0,
    })
}
