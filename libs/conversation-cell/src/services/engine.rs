// libs/conversation-cell/src/services/engine.rs
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use appointment_cell::models::{AppointmentError, CreateAppointmentRequest};
use appointment_cell::AppointmentLifecycleManager;
use availability_cell::AvailabilityCalculator;
use shared_config::AppConfig;
use shared_models::{Clinic, ServiceSelection};

use crate::models::{Button, ConversationError, InboundMessage, OutboundMessage, TurnReport};
use crate::resolver::{resolve, GlobalCommand, Resolved};
use crate::services::sender::MessageSender;
use crate::services::session_store::SessionStore;
use crate::services::templates::TemplateRenderer;
use crate::session::{AppointmentChoice, ConversationSession, FlowData, MenuEntry, Notice};
use crate::states::{ConversationState, InputType, StateDescriptor};

use ConversationState::*;

/// Entry handlers may chain redirects; more than this is a table bug.
pub const MAX_REDIRECTS: usize = 8;

const FALLBACK_ERROR_TEXT: &str = "Desculpe, algo deu errado. Vamos recomeçar.";

const MORE_TIMES_LABEL: &str = "Mais horários";

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub handoff_pause: Duration,
    pub max_day_options: usize,
    pub max_time_options: usize,
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            handoff_pause: Duration::minutes(config.handoff_pause_minutes.max(0)),
            max_day_options: config.max_day_options.max(1),
            max_time_options: config.max_time_options.max(1),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// What an entry handler produced for the state being entered.
#[derive(Debug, Default)]
struct StateView {
    vars: HashMap<String, String>,
    /// Dynamic buttons; `None` uses the state's static buttons.
    buttons: Option<Vec<Button>>,
    /// Literal text used instead of the state's template.
    content: Option<String>,
}

impl StateView {
    fn with_var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    fn with_buttons(mut self, buttons: Vec<Button>) -> Self {
        self.buttons = Some(buttons);
        self
    }

    fn with_content(mut self, content: String) -> Self {
        self.content = Some(content);
        self
    }
}

#[derive(Debug)]
enum Entry {
    Show(StateView),
    Redirect {
        to: ConversationState,
        notice: Option<Notice>,
    },
}

impl Entry {
    fn show() -> Self {
        Entry::Show(StateView::default())
    }

    fn redirect(to: ConversationState) -> Self {
        Entry::Redirect { to, notice: None }
    }

    fn redirect_with(to: ConversationState, notice: Notice) -> Self {
        Entry::Redirect {
            to,
            notice: Some(notice),
        }
    }

    fn with_var(self, key: &str, value: impl Into<String>) -> Self {
        match self {
            Entry::Show(view) => Entry::Show(view.with_var(key, value)),
            redirect => redirect,
        }
    }
}

/// Per-turn context handed to entry handlers.
struct Turn<'a> {
    clinic: &'a Clinic,
    message: &'a InboundMessage,
    address: &'a str,
    now: DateTime<Utc>,
    /// Plain messages sent before the state's own message.
    preludes: Vec<String>,
}

/// Drives one conversation turn: load the session, resolve input, enter the
/// next state, render, persist, send.
pub struct ConversationEngine {
    sessions: Arc<dyn SessionStore>,
    calculator: Arc<AvailabilityCalculator>,
    lifecycle: Arc<AppointmentLifecycleManager>,
    templates: Arc<dyn TemplateRenderer>,
    sender: Arc<dyn MessageSender>,
    settings: EngineSettings,
}

impl ConversationEngine {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        calculator: Arc<AvailabilityCalculator>,
        lifecycle: Arc<AppointmentLifecycleManager>,
        templates: Arc<dyn TemplateRenderer>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            sessions,
            calculator,
            lifecycle,
            templates,
            sender,
            settings: EngineSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub async fn handle(&self, message: InboundMessage) -> Result<TurnReport, ConversationError> {
        let now = message.received_at.unwrap_or_else(Utc::now);
        let address = message.from.trim().to_string();
        if address.is_empty() {
            return Err(ConversationError::InvalidMessage("Sender address is required".to_string()));
        }

        let clinic = self.lifecycle.clinic(message.clinic_id).await?;
        let mut session = match self.sessions.load(clinic.id, &address).await? {
            Some(session) => session,
            None => {
                debug!("Starting new session for {} at clinic {}", address, clinic.id);
                ConversationSession::new(clinic.id, &address)
            }
        };

        if session.is_paused(now) {
            debug!("Session for {} is with a human until {:?}, staying silent", address, session.paused_until);
            return Ok(TurnReport {
                state: session.state,
                messages: Vec::new(),
                silenced: true,
            });
        }
        if session.paused_until.take().is_some() {
            info!("Handoff pause for {} expired, restarting conversation", address);
            session.state = Welcome;
            session.reset_flow();
        }

        info!(
            "Inbound message from {} for clinic {} in state {}",
            address, clinic.id, session.state
        );

        let (target, notice) = if session.state == Welcome {
            (Welcome, None)
        } else {
            next_state(&mut session, &message)
        };
        debug!("Transition {} -> {}", session.state, target);

        let mut turn = Turn {
            clinic: &clinic,
            message: &message,
            address: &address,
            now,
            preludes: Vec::new(),
        };

        let main = match self.enter(&mut turn, &mut session, target, notice).await {
            Ok(rendered) => rendered,
            Err(e) => {
                error!(
                    "Conversation handler failed for {} at clinic {} entering {}: {}",
                    address, clinic.id, target, e
                );
                turn.preludes = vec![self.error_text(&clinic).await];
                session.reset_flow();
                match self.enter(&mut turn, &mut session, MainMenu, None).await {
                    Ok(rendered) => rendered,
                    Err(recovery) => {
                        // Park the session on the menu so the next message starts clean.
                        error!("Recovery to main menu failed for {}: {}", address, recovery);
                        session.state = MainMenu;
                        session.reset_flow();
                        session.updated_at = now;
                        if let Err(save_error) = self.sessions.save(&session).await {
                            warn!("Failed to save session for {} after recovery error: {}", address, save_error);
                        }
                        return Err(recovery);
                    }
                }
            }
        };

        if session.state.is_terminal() {
            session.reset_flow();
        }
        session.updated_at = now;
        self.sessions.save(&session).await?;

        let mut messages: Vec<OutboundMessage> = turn
            .preludes
            .into_iter()
            .map(|text| OutboundMessage::text(&address, text))
            .collect();
        messages.push(main);

        for outbound in &messages {
            let result = self.sender.send(outbound).await;
            if !result.success {
                warn!(
                    "Failed to deliver message to {}: {}",
                    address,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        Ok(TurnReport {
            state: session.state,
            messages,
            silenced: false,
        })
    }

    /// Enters `target`, following redirects, and renders the resulting state.
    async fn enter(
        &self,
        turn: &mut Turn<'_>,
        session: &mut ConversationSession,
        target: ConversationState,
        notice: Option<Notice>,
    ) -> Result<OutboundMessage, ConversationError> {
        let mut state = target;
        let mut notice = notice;

        for _ in 0..MAX_REDIRECTS {
            session.move_to(state);
            session.flow.dynamic_buttons.clear();
            session.flow.dynamic_transitions.clear();

            match self.on_enter(turn, session, state).await? {
                Entry::Show(view) => return self.render(turn, session, state, notice, view).await,
                Entry::Redirect { to, notice: redirect_notice } => {
                    debug!("State {} redirected to {}", state, to);
                    if redirect_notice.is_some() {
                        notice = redirect_notice;
                    }
                    state = to;
                }
            }
        }

        Err(ConversationError::RedirectLoop(target))
    }

    async fn render(
        &self,
        turn: &Turn<'_>,
        session: &mut ConversationSession,
        state: ConversationState,
        notice: Option<Notice>,
        view: StateView,
    ) -> Result<OutboundMessage, ConversationError> {
        let descriptor = state.descriptor();
        let mut vars = base_vars(turn);
        vars.extend(view.vars);

        let body = match view.content {
            Some(content) => content,
            None => {
                self.templates
                    .render(turn.clinic.id, descriptor.template_key, &vars)
                    .await?
            }
        };
        let content = match notice {
            Some(notice) => {
                let prefix = self.templates.render(turn.clinic.id, notice.template_key(), &vars).await?;
                format!("{}\n\n{}", prefix, body)
            }
            None => body,
        };

        let buttons = match view.buttons {
            Some(buttons) => {
                session.flow.dynamic_buttons = buttons.clone();
                buttons
            }
            None => descriptor.static_buttons(),
        };

        Ok(OutboundMessage::with_options(turn.address, content, buttons))
    }

    async fn error_text(&self, clinic: &Clinic) -> String {
        match self.templates.render(clinic.id, "error", &HashMap::new()).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Falling back to built-in error text: {}", e);
                FALLBACK_ERROR_TEXT.to_string()
            }
        }
    }

    // ==============================================================================
    // ENTRY HANDLERS
    // ==============================================================================

    async fn on_enter(
        &self,
        turn: &mut Turn<'_>,
        session: &mut ConversationSession,
        state: ConversationState,
    ) -> Result<Entry, ConversationError> {
        match state {
            Welcome => {
                let greeting = self
                    .templates
                    .render(turn.clinic.id, Welcome.descriptor().template_key, &base_vars(turn))
                    .await?;
                turn.preludes.push(greeting);
                Ok(Entry::redirect(MainMenu))
            }
            MainMenu | NoAppointments | NoAvailability | Farewell => Ok(Entry::show()),
            SelectServices => self.enter_select_services(turn, &mut session.flow).await,
            ConfirmServices => Ok(enter_confirm_services(&mut session.flow)),
            SelectAreas => self.enter_select_areas(&mut session.flow).await,
            ShowSummary => self.enter_show_summary(turn, &mut session.flow).await,
            ChooseDay => match session.flow.quoted_duration() {
                Some(duration) => self.offer_days(turn, &mut session.flow, duration, ChooseTime).await,
                None => Ok(Entry::redirect(SelectServices)),
            },
            ChooseTime => match session.flow.quoted_duration() {
                Some(duration) => {
                    self.offer_times(turn, &mut session.flow, duration, ChooseTime, ConfirmBooking, ChooseDay)
                        .await
                }
                None => Ok(Entry::redirect(SelectServices)),
            },
            ConfirmBooking => Ok(enter_confirm_booking(&session.flow)),
            Booked => self.enter_booked(turn, &session.flow).await,
            RescheduleLookup => self.lookup_appointments(turn, &mut session.flow, RescheduleChooseDay).await,
            RescheduleChooseDay => match session.flow.target.clone() {
                Some(target) => Ok(self
                    .offer_days(turn, &mut session.flow, target.duration_minutes, RescheduleChooseTime)
                    .await?
                    .with_var("appointment", target.label)),
                None => Ok(Entry::redirect(RescheduleLookup)),
            },
            RescheduleChooseTime => match session.flow.target.clone() {
                Some(target) => {
                    self.offer_times(
                        turn,
                        &mut session.flow,
                        target.duration_minutes,
                        RescheduleChooseTime,
                        ConfirmReschedule,
                        RescheduleChooseDay,
                    )
                    .await
                }
                None => Ok(Entry::redirect(RescheduleLookup)),
            },
            ConfirmReschedule => Ok(enter_confirm_reschedule(&session.flow)),
            Rescheduled => self.enter_rescheduled(&mut session.flow).await,
            CancelLookup => self.lookup_appointments(turn, &mut session.flow, ConfirmCancel).await,
            ConfirmCancel => Ok(match &session.flow.target {
                Some(target) => Entry::show().with_var("appointment", target.label.clone()),
                None => Entry::redirect(CancelLookup),
            }),
            Cancelled => self.enter_cancelled(&session.flow).await,
            Faq => self.enter_faq(turn, &mut session.flow).await,
            FaqAnswer => self.enter_faq_answer(turn, &session.flow).await,
            HumanHandoff => {
                session.paused_until = Some(turn.now + self.settings.handoff_pause);
                info!(
                    "Handing {} at clinic {} over to a human until {}",
                    turn.address,
                    turn.clinic.id,
                    turn.now + self.settings.handoff_pause
                );
                Ok(Entry::show())
            }
        }
    }

    async fn enter_select_services(&self, turn: &Turn<'_>, flow: &mut FlowData) -> Result<Entry, ConversationError> {
        let services: Vec<_> = self
            .lifecycle
            .catalog()
            .services(turn.clinic.id)
            .await?
            .into_iter()
            .filter(|s| s.is_active)
            .collect();
        if services.is_empty() {
            return Ok(Entry::redirect_with(MainMenu, Notice::NoServices));
        }

        let list = services
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {} - R$ {}", i + 1, s.name, format_price(s.price)))
            .collect::<Vec<_>>()
            .join("\n");
        flow.service_menu = services
            .into_iter()
            .map(|s| MenuEntry {
                service_id: s.id,
                area_id: None,
                label: s.name,
            })
            .collect();

        Ok(Entry::show().with_var("services", list))
    }

    async fn enter_select_areas(&self, flow: &mut FlowData) -> Result<Entry, ConversationError> {
        let catalog = self.lifecycle.catalog();
        let mut plain = Vec::new();
        let mut menu = Vec::new();

        for entry in flow
            .service_menu
            .iter()
            .filter(|e| flow.selected_services.contains(&e.service_id))
        {
            let areas = catalog.service_areas(entry.service_id).await?;
            if areas.is_empty() {
                plain.push(ServiceSelection::service(entry.service_id));
            } else {
                menu.extend(areas.into_iter().map(|area| MenuEntry {
                    service_id: entry.service_id,
                    area_id: Some(area.area_id),
                    label: format!("{} - {}", entry.label, area.area_name),
                }));
            }
        }

        if plain.is_empty() && menu.is_empty() {
            return Ok(Entry::redirect(SelectServices));
        }

        flow.selections = plain;
        if menu.is_empty() {
            flow.area_menu.clear();
            return Ok(Entry::redirect(ShowSummary));
        }

        let list = numbered(menu.iter().map(|e| e.label.as_str()));
        flow.area_menu = menu;
        Ok(Entry::show().with_var("areas", list))
    }

    async fn enter_show_summary(&self, turn: &Turn<'_>, flow: &mut FlowData) -> Result<Entry, ConversationError> {
        let mut changed = false;
        if let Some(text) = flow.pending_text.take() {
            match parse_indices(&text, flow.area_menu.len()) {
                Some(indices) => {
                    let picked: Vec<ServiceSelection> = indices.iter().map(|&i| flow.area_menu[i].selection()).collect();
                    flow.selections.extend(picked);
                    changed = true;
                }
                None => return Ok(Entry::redirect_with(SelectAreas, Notice::InvalidSelection)),
            }
        }
        if flow.selections.is_empty() {
            return Ok(Entry::redirect(SelectServices));
        }

        if changed || flow.quote.is_none() {
            flow.quote = Some(self.lifecycle.quote(turn.clinic.id, &flow.selections).await?);
        }
        let Some(quote) = &flow.quote else {
            return Ok(Entry::redirect(SelectServices));
        };

        let items = quote
            .items
            .iter()
            .map(|item| format!("• {} ({} min, R$ {})", item.label(), item.duration_minutes, format_price(item.price)))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(Entry::show()
            .with_var("items", items)
            .with_var("duration", quote.total_duration_minutes.to_string())
            .with_var("price", format_price(quote.total_price)))
    }

    /// Offers the next free days as `day:YYYY-MM-DD` buttons leading to `next`.
    async fn offer_days(
        &self,
        turn: &Turn<'_>,
        flow: &mut FlowData,
        duration_minutes: i32,
        next: ConversationState,
    ) -> Result<Entry, ConversationError> {
        let today = turn.clinic.local_today(turn.now);
        let days = self
            .calculator
            .free_days(turn.clinic.id, duration_minutes, self.settings.max_day_options, today)
            .await?;
        if days.is_empty() {
            return Ok(Entry::redirect(NoAvailability));
        }

        let buttons: Vec<Button> = days
            .iter()
            .map(|day| Button::new(format!("day:{}", day.format("%Y-%m-%d")), format_day(*day)))
            .collect();
        for button in &buttons {
            flow.dynamic_transitions.insert(button.id.clone(), next);
        }

        Ok(Entry::Show(StateView::default().with_buttons(buttons)))
    }

    /// Offers free start times on the chosen day as `time:HH:MM` buttons,
    /// a page at a time. When more times remain, a `later:HH:MM` button
    /// re-enters `here` with the following page.
    async fn offer_times(
        &self,
        turn: &Turn<'_>,
        flow: &mut FlowData,
        duration_minutes: i32,
        here: ConversationState,
        next: ConversationState,
        day_picker: ConversationState,
    ) -> Result<Entry, ConversationError> {
        let Some(date) = flow.chosen_date else {
            return Ok(Entry::redirect(day_picker));
        };
        flow.chosen_time = None;

        let slots = self
            .calculator
            .free_slots(turn.clinic.id, date, duration_minutes)
            .await?;
        if slots.is_empty() {
            return Ok(Entry::redirect_with(day_picker, Notice::SlotTaken));
        }

        let mut page: Vec<NaiveTime> = match flow.time_after {
            Some(after) => slots.iter().copied().filter(|slot| *slot > after).collect(),
            None => slots.clone(),
        };
        if page.is_empty() {
            // the later times were taken since the page was offered
            flow.time_after = None;
            page = slots;
        }

        let page_size = self.settings.max_time_options.max(1);
        let mut buttons: Vec<Button> = page
            .iter()
            .take(page_size)
            .map(|slot| Button::new(format!("time:{}", format_time(*slot)), format_time(*slot)))
            .collect();
        for button in &buttons {
            flow.dynamic_transitions.insert(button.id.clone(), next);
        }

        if page.len() > page_size {
            let last_shown = page[page_size - 1];
            let later = Button::new(format!("later:{}", format_time(last_shown)), MORE_TIMES_LABEL);
            flow.dynamic_transitions.insert(later.id.clone(), here);
            buttons.push(later);
        }

        Ok(Entry::Show(
            StateView::default()
                .with_var("date", format_day(date))
                .with_buttons(buttons),
        ))
    }

    async fn enter_booked(&self, turn: &Turn<'_>, flow: &FlowData) -> Result<Entry, ConversationError> {
        let (Some(quote), Some(date), Some(time)) = (&flow.quote, flow.chosen_date, flow.chosen_time) else {
            return Ok(Entry::redirect(ChooseDay));
        };

        let request = CreateAppointmentRequest {
            clinic_id: turn.clinic.id,
            phone: turn.address.to_string(),
            patient_name: turn.message.profile_name.clone(),
            selections: quote.selections(),
            appointment_date: date,
            start_time: time,
            professional_id: None,
            duration_override: Some(quote.total_duration_minutes),
            notes: None,
        };

        match self.lifecycle.create(turn.clinic, request).await {
            Ok(appointment) => {
                info!("Chat booking {} created for {}", appointment.id, turn.address);
                let items = quote.items.iter().map(|i| i.label()).collect::<Vec<_>>().join(", ");
                Ok(Entry::show()
                    .with_var("date", format_day(appointment.appointment_date))
                    .with_var("time", format_time(appointment.start_time))
                    .with_var("items", items))
            }
            Err(e @ (AppointmentError::Conflict { .. } | AppointmentError::OptimisticLock { .. })) => {
                warn!("Slot chosen by {} is no longer free: {}", turn.address, e);
                Ok(Entry::redirect_with(ChooseDay, Notice::SlotTaken))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Zero matches end in NoAppointments, one skips the picker, several
    /// become `apt:{id}` buttons.
    async fn lookup_appointments(
        &self,
        turn: &Turn<'_>,
        flow: &mut FlowData,
        next: ConversationState,
    ) -> Result<Entry, ConversationError> {
        let appointments = self
            .lifecycle
            .active_appointments_by_phone(turn.clinic, turn.address)
            .await?;
        if appointments.is_empty() {
            return Ok(Entry::redirect(NoAppointments));
        }

        let mut choices = Vec::with_capacity(appointments.len());
        for appointment in &appointments {
            let summary = self.lifecycle.summary(appointment).await?;
            choices.push(AppointmentChoice {
                appointment_id: appointment.id,
                version: appointment.version,
                duration_minutes: appointment.duration_minutes,
                label: format!(
                    "{} às {} - {}",
                    format_day(appointment.appointment_date),
                    format_time(appointment.start_time),
                    summary.description()
                ),
            });
        }

        if choices.len() == 1 {
            flow.target = choices.pop();
            return Ok(Entry::redirect(next));
        }

        flow.appointment_choices.clear();
        let mut buttons = Vec::with_capacity(choices.len());
        for choice in choices {
            let id = format!("apt:{}", choice.appointment_id);
            buttons.push(Button::new(id.clone(), choice.label.clone()));
            flow.dynamic_transitions.insert(id.clone(), next);
            flow.appointment_choices.insert(id, choice);
        }

        Ok(Entry::Show(StateView::default().with_buttons(buttons)))
    }

    async fn enter_rescheduled(&self, flow: &mut FlowData) -> Result<Entry, ConversationError> {
        let (Some(target), Some(date), Some(time)) = (flow.target.clone(), flow.chosen_date, flow.chosen_time) else {
            return Ok(Entry::redirect(RescheduleChooseDay));
        };

        match self
            .lifecycle
            .reschedule_expecting(target.appointment_id, target.version, date, time)
            .await
        {
            Ok(appointment) => {
                info!("Appointment {} rescheduled over chat", appointment.id);
                Ok(Entry::show()
                    .with_var("date", format_day(appointment.appointment_date))
                    .with_var("time", format_time(appointment.start_time)))
            }
            Err(AppointmentError::Conflict { .. }) => Ok(Entry::redirect_with(RescheduleChooseDay, Notice::SlotTaken)),
            Err(AppointmentError::OptimisticLock { .. }) => {
                match self.lifecycle.get(target.appointment_id).await {
                    Ok(current) if current.is_confirmed() => {
                        flow.target = Some(AppointmentChoice {
                            version: current.version,
                            duration_minutes: current.duration_minutes,
                            ..target
                        });
                        Ok(Entry::redirect_with(RescheduleChooseDay, Notice::AppointmentChanged))
                    }
                    Ok(_) | Err(AppointmentError::NotFound(_)) => {
                        Ok(Entry::redirect_with(MainMenu, Notice::AppointmentGone))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Err(AppointmentError::NotFound(_)) => Ok(Entry::redirect_with(MainMenu, Notice::AppointmentGone)),
            Err(e) => Err(e.into()),
        }
    }

    async fn enter_cancelled(&self, flow: &FlowData) -> Result<Entry, ConversationError> {
        let Some(target) = &flow.target else {
            return Ok(Entry::redirect(CancelLookup));
        };

        match self.lifecycle.cancel(target.appointment_id).await {
            Ok(appointment) => {
                info!("Appointment {} cancelled over chat", appointment.id);
                Ok(Entry::show().with_var("appointment", target.label.clone()))
            }
            Err(AppointmentError::NotFound(_)) => Ok(Entry::redirect_with(MainMenu, Notice::AppointmentGone)),
            Err(e) => Err(e.into()),
        }
    }

    async fn enter_faq(&self, turn: &Turn<'_>, flow: &mut FlowData) -> Result<Entry, ConversationError> {
        let entries = self.lifecycle.catalog().faq_entries(turn.clinic.id).await?;
        if entries.is_empty() {
            return Ok(Entry::redirect_with(MainMenu, Notice::NoFaq));
        }

        flow.faq_choices.clear();
        let mut buttons = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = format!("faq:{}", entry.id);
            flow.dynamic_transitions.insert(id.clone(), FaqAnswer);
            flow.faq_choices.insert(id.clone(), entry.id);
            buttons.push(Button::new(id, entry.question));
        }

        Ok(Entry::Show(StateView::default().with_buttons(buttons)))
    }

    async fn enter_faq_answer(&self, turn: &Turn<'_>, flow: &FlowData) -> Result<Entry, ConversationError> {
        let Some(faq_id) = flow.faq_choice else {
            return Ok(Entry::redirect(Faq));
        };

        let entries = self.lifecycle.catalog().faq_entries(turn.clinic.id).await?;
        match entries.into_iter().find(|e| e.id == faq_id) {
            Some(entry) => Ok(Entry::Show(
                StateView::default().with_content(format!("*{}*\n\n{}", entry.question, entry.answer)),
            )),
            None => Ok(Entry::redirect(Faq)),
        }
    }
}

// ==============================================================================
// PURE STEPS
// ==============================================================================

/// Picks the next state from the current one and the resolved input.
fn next_state(session: &mut ConversationSession, message: &InboundMessage) -> (ConversationState, Option<Notice>) {
    let state = session.state;
    let descriptor = state.descriptor();
    let buttons = visible_buttons(&descriptor, &session.flow);
    let resolved = resolve(&message.text, message.button_id.as_deref(), &buttons, descriptor.input_type);
    debug!("Input in {} resolved to {:?}", state, resolved);

    match resolved {
        Resolved::Command(GlobalCommand::Back) => (descriptor.previous.unwrap_or(MainMenu), None),
        Resolved::Command(GlobalCommand::Menu) => (MainMenu, None),
        Resolved::Command(GlobalCommand::Human) => (HumanHandoff, None),
        Resolved::Command(GlobalCommand::End) => (Farewell, None),
        Resolved::Button(id) => {
            if let Some(next) = descriptor.transition(&id) {
                return (next, None);
            }
            if let Some(next) = session.flow.dynamic_transitions.get(&id).copied() {
                if apply_choice(&mut session.flow, &id) {
                    return (next, None);
                }
                return (state, Some(Notice::InvalidSelection));
            }
            unrecognized(state, &descriptor)
        }
        Resolved::Text(text) => match state.free_text_target() {
            Some(next) => {
                session.flow.pending_text = Some(text);
                (next, None)
            }
            None => unrecognized(state, &descriptor),
        },
        Resolved::Unrecognized => unrecognized(state, &descriptor),
    }
}

fn visible_buttons(descriptor: &StateDescriptor, flow: &FlowData) -> Vec<Button> {
    match descriptor.input_type {
        InputType::DynamicSelection => flow.dynamic_buttons.clone(),
        InputType::Static | InputType::FreeText => descriptor.static_buttons(),
    }
}

fn unrecognized(state: ConversationState, descriptor: &StateDescriptor) -> (ConversationState, Option<Notice>) {
    match descriptor.fallback {
        Some(fallback) => (fallback, None),
        None => (state, Some(Notice::Unrecognized)),
    }
}

/// Records the value a dynamic button id encodes. `false` when the id no
/// longer maps to anything usable.
fn apply_choice(flow: &mut FlowData, id: &str) -> bool {
    if let Some(raw) = id.strip_prefix("day:") {
        let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") else {
            return false;
        };
        flow.chosen_date = Some(date);
        flow.chosen_time = None;
        flow.time_after = None;
        return true;
    }
    if let Some(raw) = id.strip_prefix("later:") {
        let Ok(time) = NaiveTime::parse_from_str(raw, "%H:%M") else {
            return false;
        };
        flow.time_after = Some(time);
        return true;
    }
    if let Some(raw) = id.strip_prefix("time:") {
        let Ok(time) = NaiveTime::parse_from_str(raw, "%H:%M") else {
            return false;
        };
        flow.chosen_time = Some(time);
        return true;
    }
    if id.starts_with("apt:") {
        let Some(choice) = flow.appointment_choices.get(id).cloned() else {
            return false;
        };
        flow.target = Some(choice);
        return true;
    }
    if id.starts_with("faq:") {
        let Some(faq_id) = flow.faq_choices.get(id).copied() else {
            return false;
        };
        flow.faq_choice = Some(faq_id);
        return true;
    }
    false
}

fn enter_confirm_services(flow: &mut FlowData) -> Entry {
    if let Some(text) = flow.pending_text.take() {
        match parse_indices(&text, flow.service_menu.len()) {
            Some(indices) => {
                flow.selected_services = indices.iter().map(|&i| flow.service_menu[i].service_id).collect();
            }
            None => return Entry::redirect_with(SelectServices, Notice::InvalidSelection),
        }
    }
    if flow.selected_services.is_empty() {
        return Entry::redirect(SelectServices);
    }

    let names = flow
        .service_menu
        .iter()
        .filter(|e| flow.selected_services.contains(&e.service_id))
        .map(|e| format!("• {}", e.label))
        .collect::<Vec<_>>()
        .join("\n");
    Entry::show().with_var("services", names)
}

fn enter_confirm_booking(flow: &FlowData) -> Entry {
    let (Some(quote), Some(date), Some(time)) = (&flow.quote, flow.chosen_date, flow.chosen_time) else {
        return Entry::redirect(ChooseDay);
    };
    let items = quote.items.iter().map(|i| i.label()).collect::<Vec<_>>().join(", ");

    Entry::show()
        .with_var("items", items)
        .with_var("date", format_day(date))
        .with_var("time", format_time(time))
        .with_var("duration", quote.total_duration_minutes.to_string())
        .with_var("price", format_price(quote.total_price))
}

fn enter_confirm_reschedule(flow: &FlowData) -> Entry {
    let (Some(target), Some(date), Some(time)) = (&flow.target, flow.chosen_date, flow.chosen_time) else {
        return Entry::redirect(RescheduleChooseDay);
    };

    Entry::show()
        .with_var("appointment", target.label.clone())
        .with_var("date", format_day(date))
        .with_var("time", format_time(time))
}

fn base_vars(turn: &Turn<'_>) -> HashMap<String, String> {
    let name = turn
        .message
        .profile_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(|n| format!(", {}", n))
        .unwrap_or_default();

    HashMap::from([
        ("clinic".to_string(), turn.clinic.name.clone()),
        ("name".to_string(), name),
    ])
}

/// 1-based numbers separated by commas, spaces or "e"; returns 0-based
/// indices without duplicates, or `None` if any token is invalid.
pub fn parse_indices(text: &str, len: usize) -> Option<Vec<usize>> {
    let mut picked = Vec::new();
    for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
        if token.eq_ignore_ascii_case("e") {
            continue;
        }
        let n: usize = token.parse().ok()?;
        if n == 0 || n > len {
            return None;
        }
        if !picked.contains(&(n - 1)) {
            picked.push(n - 1);
        }
    }
    if picked.is_empty() {
        None
    } else {
        Some(picked)
    }
}

fn numbered<'a>(labels: impl Iterator<Item = &'a str>) -> String {
    labels
        .enumerate()
        .map(|(i, label)| format!("{}. {}", i + 1, label))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_day(date: NaiveDate) -> String {
    let weekday = match date.weekday() {
        Weekday::Mon => "Seg",
        Weekday::Tue => "Ter",
        Weekday::Wed => "Qua",
        Weekday::Thu => "Qui",
        Weekday::Fri => "Sex",
        Weekday::Sat => "Sáb",
        Weekday::Sun => "Dom",
    };
    format!("{} {}", weekday, date.format("%d/%m"))
}

pub fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

pub fn format_price(price: f64) -> String {
    format!("{:.2}", price).replace('.', ",")
}
