use base64::Engine as _;

use crate::api::{Content, InlineData, WirePart};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "model" => Ok(Role::Model),
            _ => Err(format!("invalid turn role: {value}")),
        }
    }
}

/// A content fragment within a [`Turn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    /// Raw image bytes; encoded to base64 only when put on the wire.
    Image { mime_type: String, data: Vec<u8> },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(text) => Some(text),
            Part::Image { .. } => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Part::Image { .. })
    }

    pub fn to_wire(&self) -> WirePart {
        match self {
            Part::Text(text) => WirePart::Text { text: text.clone() },
            Part::Image { mime_type, data } => WirePart::InlineData {
                inline_data: InlineData {
                    mime_type: mime_type.clone(),
                    data: base64::engine::general_purpose::STANDARD.encode(data),
                },
            },
        }
    }
}

/// One role-tagged message in a conversation. Never mutated after it is
/// appended to a [`crate::core::conversation::Conversation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    pub fn user(parts: Vec<Part>) -> Self {
        Self::new(Role::User, parts)
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self::new(Role::Model, vec![Part::text(text)])
    }

    /// All text parts joined by newlines, for display and transcript logging.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn image_count(&self) -> usize {
        self.parts.iter().filter(|part| part.is_image()).count()
    }

    pub fn to_wire(&self) -> Content {
        Content {
            role: self.role.as_str().to_string(),
            parts: self.parts.iter().map(Part::to_wire).collect(),
        }
    }
}
