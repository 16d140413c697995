// libs/conversation-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use appointment_cell::models::AppointmentError;
use availability_cell::models::AvailabilityError;

use crate::states::ConversationState;

// ==============================================================================
// MESSAGE MODELS
// ==============================================================================

/// Provider-neutral inbound chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub clinic_id: Uuid,
    /// Counterpart address, usually an E.164 phone number.
    pub from: String,
    #[serde(default)]
    pub text: String,
    /// Id of the button or list row the user tapped, when any.
    pub button_id: Option<String>,
    pub profile_name: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Button {
    pub id: String,
    pub label: String,
}

impl Button {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "options", rename_all = "snake_case")]
pub enum OutboundKind {
    Text,
    Buttons(Vec<Button>),
    List(Vec<Button>),
}

/// Most chat providers render at most three reply buttons; longer option
/// sets go out as a list.
pub const MAX_REPLY_BUTTONS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: String,
    pub content: String,
    pub kind: OutboundKind,
}

impl OutboundMessage {
    pub fn text(to: &str, content: impl Into<String>) -> Self {
        Self {
            to: to.to_string(),
            content: content.into(),
            kind: OutboundKind::Text,
        }
    }

    pub fn with_options(to: &str, content: impl Into<String>, buttons: Vec<Button>) -> Self {
        let kind = match buttons.len() {
            0 => OutboundKind::Text,
            n if n <= MAX_REPLY_BUTTONS => OutboundKind::Buttons(buttons),
            _ => OutboundKind::List(buttons),
        };
        Self {
            to: to.to_string(),
            content: content.into(),
            kind,
        }
    }

    pub fn buttons(&self) -> &[Button] {
        match &self.kind {
            OutboundKind::Text => &[],
            OutboundKind::Buttons(buttons) | OutboundKind::List(buttons) => buttons,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendResult {
    pub success: bool,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
}

impl SendResult {
    pub fn delivered(provider_message_id: Option<String>) -> Self {
        Self {
            success: true,
            provider_message_id,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            provider_message_id: None,
            error: Some(error.into()),
        }
    }
}

/// What one inbound message produced.
#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    pub state: ConversationState,
    pub messages: Vec<OutboundMessage>,
    /// The session is in human handoff and the bot stayed quiet.
    pub silenced: bool,
}

// ==============================================================================
// ERROR MODELS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("Session store error: {0}")]
    SessionStore(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Too many redirects entering {0}")]
    RedirectLoop(ConversationState),

    #[error(transparent)]
    Appointment(#[from] AppointmentError),

    #[error(transparent)]
    Availability(#[from] AvailabilityError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_kind_follows_button_count() {
        let two = vec![Button::new("a", "A"), Button::new("b", "B")];
        let five: Vec<Button> = (1..=5).map(|i| Button::new(i.to_string(), format!("Op {}", i))).collect();

        assert_eq!(OutboundMessage::with_options("x", "hi", vec![]).kind, OutboundKind::Text);
        assert!(matches!(OutboundMessage::with_options("x", "hi", two).kind, OutboundKind::Buttons(_)));
        assert!(matches!(OutboundMessage::with_options("x", "hi", five).kind, OutboundKind::List(_)));
    }

    #[test]
    fn test_inbound_defaults_empty_text() {
        let message: InboundMessage = serde_json::from_value(serde_json::json!({
            "clinic_id": Uuid::nil(),
            "from": "+5511999990000",
            "button_id": "agendar",
            "profile_name": null,
            "received_at": null
        }))
        .unwrap();
        assert_eq!(message.text, "");
        assert_eq!(message.button_id.as_deref(), Some("agendar"));
    }
}
