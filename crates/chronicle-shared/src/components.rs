//! Interactive-element descriptors.
//!
//! Archive files keep components as a recursive descriptor list: an action
//! row (`type 1`) lists its `children`, buttons and selects carry their own
//! fields with emoji flattened to strings. On replay the list is flattened
//! into [`PlacedComponent`]s whose row index is recovered by counting the
//! row descriptors seen so far, then regrouped into API action rows.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::constants::{MAX_ACTION_ROWS, MAX_BUTTONS_PER_ROW};
use crate::error::{CodecError, Result};
use crate::types::EmojiRef;

const KIND_ACTION_ROW: u64 = 1;
const KIND_BUTTON: u64 = 2;
const SELECT_KINDS: [u64; 5] = [3, 5, 6, 7, 8];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub style: u8,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Select {
    #[serde(rename = "type")]
    pub kind: u8,
    pub custom_id: String,
    #[serde(default)]
    pub options: Vec<SelectOption>,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub min_values: Option<u8>,
    #[serde(default)]
    pub max_values: Option<u8>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    ActionRow(Vec<Component>),
    Button(Button),
    Select(Select),
}

/// A leaf component with the row it was found in.
///
/// `row` is `None` for elements that appeared before any action row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedComponent {
    pub row: Option<usize>,
    pub component: Component,
}

fn kind_of(value: &Value) -> Result<u64> {
    value
        .get("type")
        .and_then(Value::as_u64)
        .ok_or_else(|| CodecError::Unsupported("component without a numeric type".into()))
}

fn emoji_string(value: Option<&Value>) -> Option<String> {
    value
        .filter(|v| !v.is_null())
        .and_then(EmojiRef::from_api)
        .map(|emoji| emoji.to_string())
}

fn emoji_object(value: &Option<String>) -> Option<Value> {
    value
        .as_deref()
        .and_then(|s| s.parse::<EmojiRef>().ok())
        .map(|emoji| emoji.to_api())
}

impl Component {
    /// Read a component from an API message payload.
    pub fn from_api(value: &Value) -> Result<Self> {
        match kind_of(value)? {
            KIND_ACTION_ROW => {
                let children = value
                    .get("components")
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                Ok(Self::ActionRow(
                    children
                        .iter()
                        .filter_map(|child| skip_unsupported(Self::from_api(child)))
                        .collect(),
                ))
            }
            KIND_BUTTON => Ok(Self::Button(Button {
                style: value.get("style").and_then(Value::as_u64).unwrap_or(1) as u8,
                label: str_field(value, "label"),
                emoji: emoji_string(value.get("emoji")),
                custom_id: str_field(value, "custom_id"),
                url: str_field(value, "url"),
                disabled: bool_field(value, "disabled"),
            })),
            kind if SELECT_KINDS.contains(&kind) => {
                let options = value
                    .get("options")
                    .and_then(Value::as_array)
                    .map(|options| {
                        options
                            .iter()
                            .map(|option| SelectOption {
                                label: str_field(option, "label").unwrap_or_default(),
                                value: str_field(option, "value").unwrap_or_default(),
                                description: str_field(option, "description"),
                                emoji: emoji_string(option.get("emoji")),
                                default: bool_field(option, "default"),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(Self::Select(Select {
                    kind: kind as u8,
                    custom_id: str_field(value, "custom_id").unwrap_or_default(),
                    options,
                    placeholder: str_field(value, "placeholder"),
                    min_values: value.get("min_values").and_then(Value::as_u64).map(|v| v as u8),
                    max_values: value.get("max_values").and_then(Value::as_u64).map(|v| v as u8),
                    disabled: bool_field(value, "disabled"),
                }))
            }
            other => Err(CodecError::Unsupported(format!("component type {other}"))),
        }
    }

    /// Archive descriptor form.
    pub fn to_descriptor(&self) -> Value {
        match self {
            Self::ActionRow(children) => json!({
                "type": KIND_ACTION_ROW,
                "children": children.iter().map(Self::to_descriptor).collect::<Vec<_>>(),
            }),
            Self::Button(button) => {
                let mut value = serde_json::to_value(button).unwrap_or(Value::Null);
                if let Some(map) = value.as_object_mut() {
                    map.insert("type".into(), json!(KIND_BUTTON));
                }
                value
            }
            Self::Select(select) => serde_json::to_value(select).unwrap_or(Value::Null),
        }
    }

    /// Parse an archive descriptor. Unknown or malformed descriptors are
    /// reported as [`CodecError::Unsupported`].
    pub fn from_descriptor(value: &Value) -> Result<Self> {
        match kind_of(value)? {
            KIND_ACTION_ROW => {
                let children = value
                    .get("children")
                    .and_then(Value::as_array)
                    .ok_or_else(|| CodecError::Unsupported("action row without children".into()))?;
                Ok(Self::ActionRow(
                    children
                        .iter()
                        .filter_map(|child| skip_unsupported(Self::from_descriptor(child)))
                        .collect(),
                ))
            }
            KIND_BUTTON => serde_json::from_value(value.clone())
                .map(Self::Button)
                .map_err(|e| CodecError::Unsupported(format!("button: {e}"))),
            kind if SELECT_KINDS.contains(&kind) => serde_json::from_value(value.clone())
                .map(Self::Select)
                .map_err(|e| CodecError::Unsupported(format!("select: {e}"))),
            other => Err(CodecError::Unsupported(format!("component type {other}"))),
        }
    }

    /// API form of a leaf component. Rows are built by [`action_rows`].
    fn to_api(&self) -> Value {
        match self {
            Self::ActionRow(children) => json!({
                "type": KIND_ACTION_ROW,
                "components": children.iter().map(Self::to_api).collect::<Vec<_>>(),
            }),
            Self::Button(button) => {
                let mut value = json!({
                    "type": KIND_BUTTON,
                    "style": button.style,
                    "disabled": button.disabled,
                });
                insert_opt(&mut value, "label", button.label.clone().map(Value::from));
                insert_opt(&mut value, "emoji", emoji_object(&button.emoji));
                // Link buttons carry a url and must not carry a custom id.
                if button.url.is_some() {
                    insert_opt(&mut value, "url", button.url.clone().map(Value::from));
                } else {
                    insert_opt(&mut value, "custom_id", button.custom_id.clone().map(Value::from));
                }
                value
            }
            Self::Select(select) => {
                let mut value = json!({
                    "type": select.kind,
                    "custom_id": select.custom_id,
                    "disabled": select.disabled,
                });
                if !select.options.is_empty() {
                    let options: Vec<Value> = select
                        .options
                        .iter()
                        .map(|option| {
                            let mut v = json!({
                                "label": option.label,
                                "value": option.value,
                                "default": option.default,
                            });
                            insert_opt(&mut v, "description", option.description.clone().map(Value::from));
                            insert_opt(&mut v, "emoji", emoji_object(&option.emoji));
                            v
                        })
                        .collect();
                    insert_opt(&mut value, "options", Some(Value::from(options)));
                }
                insert_opt(&mut value, "placeholder", select.placeholder.clone().map(Value::from));
                insert_opt(&mut value, "min_values", select.min_values.map(Value::from));
                insert_opt(&mut value, "max_values", select.max_values.map(Value::from));
                value
            }
        }
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn bool_field(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn insert_opt(target: &mut Value, key: &str, value: Option<Value>) {
    if let (Some(map), Some(value)) = (target.as_object_mut(), value) {
        map.insert(key.to_string(), value);
    }
}

fn skip_unsupported(result: Result<Component>) -> Option<Component> {
    match result {
        Ok(component) => Some(component),
        Err(e) => {
            tracing::warn!(error = %e, "skipping component");
            None
        }
    }
}

/// Flatten archive descriptors into leaf components with row indices.
pub fn flatten_descriptors(descriptors: &[Value]) -> Vec<PlacedComponent> {
    let mut placed = Vec::new();
    let mut rows_seen = 0usize;

    for descriptor in descriptors {
        let Some(component) = skip_unsupported(Component::from_descriptor(descriptor)) else {
            continue;
        };
        match component {
            Component::ActionRow(children) => {
                rows_seen += 1;
                placed.extend(children.into_iter().map(|child| PlacedComponent {
                    row: Some(rows_seen - 1),
                    component: child,
                }));
            }
            leaf => placed.push(PlacedComponent {
                row: rows_seen.checked_sub(1),
                component: leaf,
            }),
        }
    }
    placed
}

/// Regroup placed components into API action rows.
///
/// Components sharing a row index stay together; a select always gets a row
/// of its own and buttons are split five per row. Rows past the platform
/// limit are dropped with a warning.
pub fn action_rows(placed: &[PlacedComponent]) -> Vec<Value> {
    let mut groups: Vec<(Option<usize>, Vec<&Component>)> = Vec::new();
    for item in placed {
        match groups.last_mut() {
            Some((row, members)) if *row == item.row => members.push(&item.component),
            _ => groups.push((item.row, vec![&item.component])),
        }
    }

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for (_, members) in groups {
        let mut buttons: Vec<Value> = Vec::new();
        for component in members {
            match component {
                Component::Select(_) => rows.push(vec![component.to_api()]),
                _ => {
                    buttons.push(component.to_api());
                    if buttons.len() == MAX_BUTTONS_PER_ROW {
                        rows.push(std::mem::take(&mut buttons));
                    }
                }
            }
        }
        if !buttons.is_empty() {
            rows.push(buttons);
        }
    }

    if rows.len() > MAX_ACTION_ROWS {
        tracing::warn!(
            rows = rows.len(),
            max = MAX_ACTION_ROWS,
            "dropping component rows past the limit"
        );
        rows.truncate(MAX_ACTION_ROWS);
    }

    rows.into_iter()
        .map(|components| json!({ "type": KIND_ACTION_ROW, "components": components }))
        .collect()
}
