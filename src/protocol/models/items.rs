use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{ArbitraryJson, ItemStatus, Role};

/// Conversation items a phone bridge reads or writes.
///
/// Message content is kept as raw parts since nothing on the call path
/// inspects it. Any item that does not decode as one of the typed kinds
/// (new server-side kinds included) lands in `Other` with its JSON intact.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Message {
        id: Option<String>,
        role: Role,
        content: Vec<ArbitraryJson>,
    },
    FunctionCall {
        id: Option<String>,
        status: Option<ItemStatus>,
        name: String,
        call_id: String,
        arguments: String,
    },
    FunctionCallOutput {
        id: Option<String>,
        call_id: String,
        output: String,
    },
    Other(ArbitraryJson),
}

impl Item {
    #[must_use]
    pub fn call_id(&self) -> Option<&str> {
        match self {
            Self::FunctionCall { call_id, .. } | Self::FunctionCallOutput { call_id, .. } => {
                Some(call_id)
            }
            Self::Message { .. } | Self::Other(_) => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Wire {
    Message {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        role: Role,
        #[serde(default)]
        content: Vec<ArbitraryJson>,
    },
    FunctionCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<ItemStatus>,
        name: String,
        call_id: String,
        #[serde(default)]
        arguments: String,
    },
    FunctionCallOutput {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        call_id: String,
        output: String,
    },
}

impl Serialize for Item {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self.clone() {
            Self::Other(raw) => return raw.serialize(serializer),
            Self::Message { id, role, content } => Wire::Message { id, role, content },
            Self::FunctionCall {
                id,
                status,
                name,
                call_id,
                arguments,
            } => Wire::FunctionCall {
                id,
                status,
                name,
                call_id,
                arguments,
            },
            Self::FunctionCallOutput {
                id,
                call_id,
                output,
            } => Wire::FunctionCallOutput {
                id,
                call_id,
                output,
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Item {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = ArbitraryJson::deserialize(deserializer)?;
        let Ok(wire) = Wire::deserialize(&raw) else {
            tracing::debug!(kind = ?raw.get("type"), "Keeping unrecognized item as raw JSON");
            return Ok(Self::Other(raw));
        };
        Ok(match wire {
            Wire::Message { id, role, content } => Self::Message { id, role, content },
            Wire::FunctionCall {
                id,
                status,
                name,
                call_id,
                arguments,
            } => Self::FunctionCall {
                id,
                status,
                name,
                call_id,
                arguments,
            },
            Wire::FunctionCallOutput {
                id,
                call_id,
                output,
            } => Self::FunctionCallOutput {
                id,
                call_id,
                output,
            },
        })
    }
}
