//! Content blocks carried in tool results, prompt messages, and sampling
//! exchanges.

use serde::{Deserialize, Serialize};

/// One block of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Base64-encoded binary image.
    Image {
        /// Base64 payload.
        data: String,
        /// e.g. `image/png`.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// A resource embedded by value.
    Resource {
        /// The embedded contents.
        resource: super::resources::ResourceContents,
    },
}

impl Content {
    /// Text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Speaker role in prompt and sampling messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human / host side.
    User,
    /// The model side.
    Assistant,
}
