use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One Hacker News item as returned by the Firebase API and as relayed between services.
///
/// Field names on the wire are fixed (`id`, `type`, `text`, `url`, `score`, `title`, `time`,
/// `by`, `dead`, `deleted`); consumers on the other side of the queue and RPC boundary
/// decode exactly these. Absent fields decode to their defaults.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Item {
    pub id: i64,
    /// Category tag such as `story` or `job`. Not validated against a closed set.
    #[serde(rename = "type")]
    pub type_: String,
    pub text: String,
    pub url: String,
    pub score: i64,
    pub title: String,
    pub time: i64,
    pub by: String,
    #[serde(deserialize_with = "deserialize_bool_tolerant")]
    pub dead: bool,
    #[serde(deserialize_with = "deserialize_bool_tolerant")]
    pub deleted: bool,
}

impl Item {
    /// Dead or deleted items are never persisted.
    pub fn is_live(&self) -> bool {
        !self.dead && !self.deleted
    }
}

/// Deserializes a bool while tolerating upstream schema drift.
///
/// The Firebase mirror has emitted numbers, strings and single-element arrays for flags.
/// Obvious representations are coerced; anything else reads as `false` so one field does not
/// poison the whole item.
fn deserialize_bool_tolerant<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(value_to_bool).unwrap_or(false))
}

fn value_to_bool(value: Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(flag),
        Value::Number(number) => number.as_f64().map(|n| n != 0.0),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        Value::Array(values) => values.into_iter().next().and_then(value_to_bool),
        Value::Null | Value::Object(_) => None,
    }
}
