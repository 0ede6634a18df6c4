use std::fmt;

use serde::{Deserialize, Serialize};

/// A model name, used only as an opaque routing key. Unlike the wider
/// Anthropic SDK, this proxy does not enumerate known model identifiers: any
/// string the client sends is forwarded as-is to whichever upstream the
/// resolver maps it to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Model(pub String);

impl Model {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Model {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Model {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
