// libs/conversation-cell/src/states.rs
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::Button;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationState {
    Welcome,
    MainMenu,
    // booking
    SelectServices,
    ConfirmServices,
    SelectAreas,
    ShowSummary,
    ChooseDay,
    ChooseTime,
    ConfirmBooking,
    Booked,
    // rescheduling
    RescheduleLookup,
    RescheduleChooseDay,
    RescheduleChooseTime,
    ConfirmReschedule,
    Rescheduled,
    // cancellation
    CancelLookup,
    ConfirmCancel,
    Cancelled,
    NoAppointments,
    NoAvailability,
    Faq,
    FaqAnswer,
    HumanHandoff,
    Farewell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    /// Input must match one of the declared buttons.
    Static,
    /// Input is data (e.g. "1, 3"), not a menu index.
    FreeText,
    /// Buttons and transitions are computed on entry and kept in the session.
    DynamicSelection,
}

#[derive(Debug, Clone, Copy)]
pub struct StaticButton {
    pub id: &'static str,
    pub label: &'static str,
}

impl StaticButton {
    pub fn to_button(self) -> Button {
        Button::new(self.id, self.label)
    }
}

const fn button(id: &'static str, label: &'static str) -> StaticButton {
    StaticButton { id, label }
}

#[derive(Debug, Clone, Copy)]
pub struct StateDescriptor {
    pub template_key: &'static str,
    pub buttons: &'static [StaticButton],
    pub transitions: &'static [(&'static str, ConversationState)],
    /// Target of "back"; `None` falls back to the main menu.
    pub previous: Option<ConversationState>,
    pub input_type: InputType,
    /// Where unmatched input goes; `None` re-shows the current state.
    pub fallback: Option<ConversationState>,
}

impl StateDescriptor {
    pub fn static_buttons(&self) -> Vec<Button> {
        self.buttons.iter().map(|b| b.to_button()).collect()
    }

    pub fn transition(&self, token: &str) -> Option<ConversationState> {
        self.transitions
            .iter()
            .find(|(id, _)| *id == token)
            .map(|(_, state)| *state)
    }
}

use ConversationState::*;

const MENU_BUTTON: StaticButton = button("menu", "Menu principal");

const MAIN_MENU_BUTTONS: &[StaticButton] = &[
    button("agendar", "Agendar horário"),
    button("remarcar", "Remarcar horário"),
    button("cancelar", "Cancelar horário"),
    button("duvidas", "Dúvidas frequentes"),
    button("atendente", "Falar com atendente"),
];

const MAIN_MENU_TRANSITIONS: &[(&str, ConversationState)] = &[
    ("agendar", SelectServices),
    ("remarcar", RescheduleLookup),
    ("cancelar", CancelLookup),
    ("duvidas", Faq),
    ("atendente", HumanHandoff),
];

const DONE_BUTTONS: &[StaticButton] = &[MENU_BUTTON];
const DONE_TRANSITIONS: &[(&str, ConversationState)] = &[("menu", MainMenu)];

impl ConversationState {
    pub fn descriptor(self) -> StateDescriptor {
        match self {
            Welcome => StateDescriptor {
                template_key: "welcome",
                buttons: &[],
                transitions: &[],
                previous: None,
                input_type: InputType::Static,
                fallback: Some(MainMenu),
            },
            MainMenu => StateDescriptor {
                template_key: "main_menu",
                buttons: MAIN_MENU_BUTTONS,
                transitions: MAIN_MENU_TRANSITIONS,
                previous: None,
                input_type: InputType::Static,
                fallback: None,
            },
            SelectServices => StateDescriptor {
                template_key: "select_services",
                buttons: &[],
                transitions: &[],
                previous: Some(MainMenu),
                input_type: InputType::FreeText,
                fallback: None,
            },
            ConfirmServices => StateDescriptor {
                template_key: "confirm_services",
                buttons: const { &[button("confirmar", "Confirmar"), button("alterar", "Alterar serviços")] },
                transitions: &[("confirmar", SelectAreas), ("alterar", SelectServices)],
                previous: Some(SelectServices),
                input_type: InputType::Static,
                fallback: None,
            },
            SelectAreas => StateDescriptor {
                template_key: "select_areas",
                buttons: &[],
                transitions: &[],
                previous: Some(SelectServices),
                input_type: InputType::FreeText,
                fallback: None,
            },
            ShowSummary => StateDescriptor {
                template_key: "show_summary",
                buttons: const { &[button("ver_dias", "Ver dias disponíveis"), button("alterar", "Alterar serviços")] },
                transitions: &[("ver_dias", ChooseDay), ("alterar", SelectServices)],
                previous: Some(SelectServices),
                input_type: InputType::Static,
                fallback: None,
            },
            ChooseDay => StateDescriptor {
                template_key: "choose_day",
                buttons: &[],
                transitions: &[],
                previous: Some(ShowSummary),
                input_type: InputType::DynamicSelection,
                fallback: None,
            },
            ChooseTime => StateDescriptor {
                template_key: "choose_time",
                buttons: &[],
                transitions: &[],
                previous: Some(ChooseDay),
                input_type: InputType::DynamicSelection,
                fallback: None,
            },
            ConfirmBooking => StateDescriptor {
                template_key: "confirm_booking",
                buttons: const { &[button("confirmar", "Confirmar"), button("outro_horario", "Outro horário")] },
                transitions: &[("confirmar", Booked), ("outro_horario", ChooseTime)],
                previous: Some(ChooseTime),
                input_type: InputType::Static,
                fallback: None,
            },
            Booked => done("booked"),
            RescheduleLookup => StateDescriptor {
                template_key: "reschedule_lookup",
                buttons: &[],
                transitions: &[],
                previous: Some(MainMenu),
                input_type: InputType::DynamicSelection,
                fallback: None,
            },
            RescheduleChooseDay => StateDescriptor {
                template_key: "reschedule_choose_day",
                buttons: &[],
                transitions: &[],
                previous: Some(MainMenu),
                input_type: InputType::DynamicSelection,
                fallback: None,
            },
            RescheduleChooseTime => StateDescriptor {
                template_key: "choose_time",
                buttons: &[],
                transitions: &[],
                previous: Some(RescheduleChooseDay),
                input_type: InputType::DynamicSelection,
                fallback: None,
            },
            ConfirmReschedule => StateDescriptor {
                template_key: "confirm_reschedule",
                buttons: const { &[button("confirmar", "Confirmar"), button("outro_horario", "Outro horário")] },
                transitions: &[("confirmar", Rescheduled), ("outro_horario", RescheduleChooseTime)],
                previous: Some(RescheduleChooseTime),
                input_type: InputType::Static,
                fallback: None,
            },
            Rescheduled => done("rescheduled"),
            CancelLookup => StateDescriptor {
                template_key: "cancel_lookup",
                buttons: &[],
                transitions: &[],
                previous: Some(MainMenu),
                input_type: InputType::DynamicSelection,
                fallback: None,
            },
            ConfirmCancel => StateDescriptor {
                template_key: "confirm_cancel",
                buttons: const { &[button("confirmar", "Sim, cancelar"), button("manter", "Não, manter")] },
                transitions: &[("confirmar", Cancelled), ("manter", MainMenu)],
                previous: Some(MainMenu),
                input_type: InputType::Static,
                fallback: None,
            },
            Cancelled => done("cancelled"),
            NoAppointments => StateDescriptor {
                template_key: "no_appointments",
                buttons: const { &[
                    button("agendar", "Agendar horário"),
                    button("atendente", "Falar com atendente"),
                    MENU_BUTTON,
                ] },
                transitions: &[("agendar", SelectServices), ("atendente", HumanHandoff), ("menu", MainMenu)],
                previous: Some(MainMenu),
                input_type: InputType::Static,
                fallback: Some(MainMenu),
            },
            NoAvailability => StateDescriptor {
                template_key: "no_availability",
                buttons: const { &[button("atendente", "Falar com atendente"), MENU_BUTTON] },
                transitions: &[("atendente", HumanHandoff), ("menu", MainMenu)],
                previous: Some(MainMenu),
                input_type: InputType::Static,
                fallback: Some(MainMenu),
            },
            Faq => StateDescriptor {
                template_key: "faq",
                buttons: &[],
                transitions: &[],
                previous: Some(MainMenu),
                input_type: InputType::DynamicSelection,
                fallback: None,
            },
            FaqAnswer => StateDescriptor {
                template_key: "faq_answer",
                buttons: const { &[button("duvidas", "Outras dúvidas"), MENU_BUTTON] },
                transitions: &[("duvidas", Faq), ("menu", MainMenu)],
                previous: Some(Faq),
                input_type: InputType::Static,
                fallback: Some(MainMenu),
            },
            HumanHandoff => StateDescriptor {
                template_key: "human_handoff",
                buttons: &[],
                transitions: &[],
                previous: Some(MainMenu),
                input_type: InputType::Static,
                fallback: Some(MainMenu),
            },
            Farewell => StateDescriptor {
                template_key: "farewell",
                buttons: &[],
                transitions: &[],
                previous: Some(MainMenu),
                input_type: InputType::Static,
                fallback: Some(Welcome),
            },
        }
    }

    /// Terminal states clear flow data once their handler has run.
    pub fn is_terminal(self) -> bool {
        matches!(self, Booked | Rescheduled | Cancelled | Farewell)
    }

    /// Where free text typed in a free-text state goes.
    pub fn free_text_target(self) -> Option<ConversationState> {
        match self {
            SelectServices => Some(ConfirmServices),
            SelectAreas => Some(ShowSummary),
            _ => None,
        }
    }
}

const fn done(template_key: &'static str) -> StateDescriptor {
    StateDescriptor {
        template_key,
        buttons: DONE_BUTTONS,
        transitions: DONE_TRANSITIONS,
        previous: Some(MainMenu),
        input_type: InputType::Static,
        fallback: Some(MainMenu),
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
