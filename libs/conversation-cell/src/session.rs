// libs/conversation-cell/src/session.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use appointment_cell::models::BookingQuote;
use shared_models::ServiceSelection;

use crate::models::Button;
use crate::states::ConversationState;

/// Durable per-counterpart cursor. Identity and state survive a finished
/// flow; `flow` does not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub clinic_id: Uuid,
    pub address: String,
    pub state: ConversationState,
    pub previous_state: Option<ConversationState>,
    #[serde(default)]
    pub flow: FlowData,
    /// Human handoff: the bot stays silent until this instant.
    pub paused_until: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationSession {
    pub fn new(clinic_id: Uuid, address: &str) -> Self {
        Self {
            clinic_id,
            address: address.to_string(),
            state: ConversationState::Welcome,
            previous_state: None,
            flow: FlowData::default(),
            paused_until: None,
            updated_at: Utc::now(),
        }
    }

    pub fn store_key(&self) -> String {
        session_key(self.clinic_id, &self.address)
    }

    pub fn is_paused(&self, now: DateTime<Utc>) -> bool {
        matches!(self.paused_until, Some(until) if until > now)
    }

    /// Moves the cursor, dropping the flow fields that belong to steps at or
    /// after `to`.
    pub fn move_to(&mut self, to: ConversationState) {
        if to != self.state {
            self.previous_state = Some(self.state);
        }
        self.state = to;
        self.flow.clear_from(to);
    }

    pub fn reset_flow(&mut self) {
        self.flow = FlowData::default();
    }
}

pub fn session_key(clinic_id: Uuid, address: &str) -> String {
    format!("session:{}:{}", clinic_id, address)
}

/// One numbered row of the service or area list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MenuEntry {
    pub service_id: Uuid,
    pub area_id: Option<Uuid>,
    pub label: String,
}

impl MenuEntry {
    pub fn selection(&self) -> ServiceSelection {
        ServiceSelection {
            service_id: self.service_id,
            area_id: self.area_id,
        }
    }
}

/// Cached row of a reschedule/cancel picker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentChoice {
    pub appointment_id: Uuid,
    pub version: i32,
    pub duration_minutes: i32,
    pub label: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    Unrecognized,
    InvalidSelection,
    SlotTaken,
    AppointmentChanged,
    AppointmentGone,
    NoServices,
    NoFaq,
}

impl Notice {
    pub fn template_key(self) -> &'static str {
        match self {
            Notice::Unrecognized => "notice_unrecognized",
            Notice::InvalidSelection => "notice_invalid_selection",
            Notice::SlotTaken => "notice_slot_taken",
            Notice::AppointmentChanged => "notice_appointment_changed",
            Notice::AppointmentGone => "notice_appointment_gone",
            Notice::NoServices => "notice_no_services",
            Notice::NoFaq => "notice_no_faq",
        }
    }
}

/// Fields scoped to one booking, reschedule, cancel or FAQ attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FlowData {
    #[serde(default)]
    pub service_menu: Vec<MenuEntry>,
    #[serde(default)]
    pub selected_services: Vec<Uuid>,
    #[serde(default)]
    pub area_menu: Vec<MenuEntry>,
    #[serde(default)]
    pub selections: Vec<ServiceSelection>,
    pub quote: Option<BookingQuote>,
    pub chosen_date: Option<NaiveDate>,
    pub chosen_time: Option<NaiveTime>,
    /// Only times after this are offered; set by the "more times" button.
    #[serde(default)]
    pub time_after: Option<NaiveTime>,
    #[serde(default)]
    pub appointment_choices: HashMap<String, AppointmentChoice>,
    pub target: Option<AppointmentChoice>,
    #[serde(default)]
    pub faq_choices: HashMap<String, Uuid>,
    pub faq_choice: Option<Uuid>,
    /// Buttons computed on entry to a dynamic-selection state.
    #[serde(default)]
    pub dynamic_buttons: Vec<Button>,
    #[serde(default)]
    pub dynamic_transitions: HashMap<String, ConversationState>,
    /// Text typed in a free-text state, consumed by the next state's handler.
    pub pending_text: Option<String>,
}

impl FlowData {
    fn clear_from(&mut self, to: ConversationState) {
        use ConversationState::*;
        match to {
            MainMenu => *self = FlowData::default(),
            SelectServices => {
                self.selected_services.clear();
                self.area_menu.clear();
                self.clear_selections();
            }
            SelectAreas => self.clear_selections(),
            ChooseDay | RescheduleChooseDay => self.clear_slot(),
            _ => {}
        }
    }

    fn clear_selections(&mut self) {
        self.selections.clear();
        self.quote = None;
        self.clear_slot();
    }

    fn clear_slot(&mut self) {
        self.chosen_date = None;
        self.chosen_time = None;
        self.time_after = None;
    }

    pub fn quoted_duration(&self) -> Option<i32> {
        self.quote.as_ref().map(|q| q.total_duration_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session_with_selection() -> ConversationSession {
        let mut session = ConversationSession::new(Uuid::new_v4(), "+5511999990000");
        let service_id = Uuid::new_v4();
        session.state = ConversationState::ChooseTime;
        session.flow.selected_services = vec![service_id];
        session.flow.selections = vec![ServiceSelection::service(service_id)];
        session.flow.quote = Some(BookingQuote::from_items(vec![]));
        session.flow.chosen_date = NaiveDate::from_ymd_opt(2026, 10, 19);
        session.flow.chosen_time = NaiveTime::from_hms_opt(9, 0, 0);
        session
    }

    #[test]
    fn test_back_to_service_selection_drops_partial_choices() {
        let mut session = session_with_selection();
        session.move_to(ConversationState::SelectServices);

        assert!(session.flow.selected_services.is_empty());
        assert!(session.flow.selections.is_empty());
        assert!(session.flow.quote.is_none());
        assert!(session.flow.chosen_date.is_none());
        assert_eq!(session.previous_state, Some(ConversationState::ChooseTime));
    }

    #[test]
    fn test_back_to_day_picker_keeps_selections() {
        let mut session = session_with_selection();
        session.move_to(ConversationState::ChooseDay);

        assert_eq!(session.flow.selections.len(), 1);
        assert!(session.flow.quote.is_some());
        assert!(session.flow.chosen_date.is_none());
        assert!(session.flow.chosen_time.is_none());
    }

    #[test]
    fn test_main_menu_resets_flow() {
        let mut session = session_with_selection();
        session.move_to(ConversationState::MainMenu);
        assert_eq!(session.flow, FlowData::default());
    }

    #[test]
    fn test_pause_is_evaluated_against_now() {
        let mut session = ConversationSession::new(Uuid::new_v4(), "+5511999990000");
        let now = Utc::now();
        assert!(!session.is_paused(now));

        session.paused_until = Some(now + Duration::minutes(30));
        assert!(session.is_paused(now));
        assert!(!session.is_paused(now + Duration::minutes(31)));
    }

    #[test]
    fn test_session_json_round_trip_keeps_state() {
        let session = session_with_selection();
        let json = serde_json::to_string(&session).unwrap();
        let restored: ConversationSession = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.state, ConversationState::ChooseTime);
        assert_eq!(restored.flow.selections, session.flow.selections);
        assert_eq!(restored.store_key(), session.store_key());
    }
}
