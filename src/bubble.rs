//! Chat message bubbles.
//!
//! A bubble is what ends up in the message log: a speaker role and the
//! literal text it displays. Bubbles are created once per turn and never
//! mutated afterwards.

use serde::{Deserialize, Serialize};

/// Speaker of a bubble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Text the user submitted.
    User,
    /// Reply taken from the server's `answer` field.
    Bot,
    /// A turn whose exchange with the server failed.
    Error,
}

impl Role {
    /// Lowercase role tag, as used in CSS classes and terminal prefixes.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Bot => "bot",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bubble {
    /// Who is speaking.
    pub role: Role,
    /// Literal text content.
    pub text: String,
}

impl Bubble {
    /// Create a bubble with an explicit role.
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    /// Create a user bubble.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create a bot bubble.
    #[must_use]
    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(Role::Bot, text)
    }

    /// Create an error bubble.
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(Role::Error, text)
    }

    /// CSS class list for the rendered element, e.g. `chat-message user`.
    #[must_use]
    pub fn css_class(&self) -> String {
        format!("chat-message {}", self.role)
    }
}
