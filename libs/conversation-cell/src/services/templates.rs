// libs/conversation-cell/src/services/templates.rs
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::models::ConversationError;

/// Renders a clinic's message template for a key.
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render(
        &self,
        clinic_id: Uuid,
        key: &str,
        variables: &HashMap<String, String>,
    ) -> Result<String, ConversationError>;
}

const DEFAULTS: &[(&str, &str)] = &[
    ("welcome", "Olá{name}! Bem-vindo(a) à {clinic}. Sou o assistente virtual e posso te ajudar com seus agendamentos."),
    ("main_menu", "Como posso te ajudar hoje?"),
    ("select_services", "Quais serviços você deseja? Responda com os números separados por vírgula.\n\n{services}"),
    ("confirm_services", "Você escolheu:\n{services}\n\nEstá correto?"),
    ("select_areas", "Quais áreas você deseja tratar? Responda com os números separados por vírgula.\n\n{areas}"),
    ("show_summary", "Resumo do atendimento:\n{items}\n\nDuração total: {duration} min\nValor total: R$ {price}"),
    ("choose_day", "Escolha um dia disponível:"),
    ("choose_time", "Horários disponíveis em {date}:"),
    ("confirm_booking", "Confirma o agendamento?\n\n{items}\nData: {date}\nHorário: {time}\nDuração: {duration} min\nValor: R$ {price}"),
    ("booked", "Agendamento confirmado para {date} às {time}.\n{items}\n\nAté breve!"),
    ("reschedule_lookup", "Qual agendamento você deseja remarcar?"),
    ("reschedule_choose_day", "Remarcando: {appointment}\n\nEscolha um novo dia:"),
    ("confirm_reschedule", "Confirma a remarcação?\n\nDe: {appointment}\nPara: {date} às {time}"),
    ("rescheduled", "Pronto! Seu horário foi remarcado para {date} às {time}."),
    ("cancel_lookup", "Qual agendamento você deseja cancelar?"),
    ("confirm_cancel", "Deseja mesmo cancelar o agendamento?\n\n{appointment}"),
    ("cancelled", "Agendamento cancelado: {appointment}"),
    ("no_appointments", "Não encontrei agendamentos ativos para este número."),
    ("no_availability", "Não encontramos horários disponíveis nos próximos dias."),
    ("faq", "Escolha uma pergunta:"),
    ("faq_answer", "{answer}"),
    ("human_handoff", "Certo! Um atendente vai continuar a conversa com você em breve."),
    ("farewell", "Obrigado pelo contato! Quando precisar, é só mandar uma mensagem."),
    ("error", "Desculpe, algo deu errado. Vamos recomeçar."),
    ("notice_unrecognized", "Não entendi sua resposta."),
    ("notice_invalid_selection", "Seleção inválida. Use os números da lista."),
    ("notice_slot_taken", "Esse horário acabou de ser reservado. Escolha outro, por favor."),
    ("notice_appointment_changed", "Esse agendamento foi alterado enquanto conversávamos. Escolha novamente, por favor."),
    ("notice_appointment_gone", "Esse agendamento não está mais ativo."),
    ("notice_no_services", "Nenhum serviço disponível para agendamento no momento."),
    ("notice_no_faq", "Ainda não temos perguntas frequentes cadastradas."),
];

/// Built-in pt-BR templates with optional per-clinic overrides.
#[derive(Debug, Clone)]
pub struct DefaultTemplates {
    defaults: HashMap<String, String>,
    overrides: HashMap<(Uuid, String), String>,
}

impl Default for DefaultTemplates {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultTemplates {
    pub fn new() -> Self {
        Self {
            defaults: DEFAULTS
                .iter()
                .map(|(key, text)| (key.to_string(), text.to_string()))
                .collect(),
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, clinic_id: Uuid, key: &str, text: &str) -> Self {
        self.overrides.insert((clinic_id, key.to_string()), text.to_string());
        self
    }

    fn lookup(&self, clinic_id: Uuid, key: &str) -> Option<&String> {
        self.overrides
            .get(&(clinic_id, key.to_string()))
            .or_else(|| self.defaults.get(key))
    }
}

#[async_trait]
impl TemplateRenderer for DefaultTemplates {
    async fn render(
        &self,
        clinic_id: Uuid,
        key: &str,
        variables: &HashMap<String, String>,
    ) -> Result<String, ConversationError> {
        let template = self
            .lookup(clinic_id, key)
            .ok_or_else(|| ConversationError::Template(format!("Unknown template '{}'", key)))?;
        Ok(substitute(template, variables))
    }
}

/// Replaces `{name}` placeholders. Unknown placeholders render empty.
pub fn substitute(template: &str, variables: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match variables.get(name) {
                    Some(value) => out.push_str(value),
                    None => debug!("Template variable '{}' not provided", name),
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_substitute_fills_known_and_blanks_unknown() {
        let rendered = substitute("{date} às {time}{missing}!", &vars(&[("date", "19/10"), ("time", "09:00")]));
        assert_eq!(rendered, "19/10 às 09:00!");
    }

    #[test]
    fn test_substitute_keeps_unclosed_brace() {
        assert_eq!(substitute("a {b", &HashMap::new()), "a {b");
    }

    #[tokio::test]
    async fn test_clinic_override_wins() {
        let clinic_id = Uuid::new_v4();
        let templates = DefaultTemplates::new().with_override(clinic_id, "main_menu", "Menu da {clinic}");

        let custom = templates.render(clinic_id, "main_menu", &vars(&[("clinic", "Bela")])).await.unwrap();
        let default = templates.render(Uuid::new_v4(), "main_menu", &HashMap::new()).await.unwrap();

        assert_eq!(custom, "Menu da Bela");
        assert_eq!(default, "Como posso te ajudar hoje?");
    }

    #[tokio::test]
    async fn test_unknown_key_is_an_error() {
        let result = DefaultTemplates::new().render(Uuid::new_v4(), "nope", &HashMap::new()).await;
        assert!(matches!(result, Err(ConversationError::Template(_))));
    }

    #[test]
    fn test_every_state_template_exists() {
        use crate::states::ConversationState::*;
        let templates = DefaultTemplates::new();
        for state in [
            Welcome, MainMenu, SelectServices, ConfirmServices, SelectAreas, ShowSummary, ChooseDay,
            ChooseTime, ConfirmBooking, Booked, RescheduleLookup, RescheduleChooseDay,
            RescheduleChooseTime, ConfirmReschedule, Rescheduled, CancelLookup, ConfirmCancel,
            Cancelled, NoAppointments, NoAvailability, Faq, FaqAnswer, HumanHandoff, Farewell,
        ] {
            let key = state.descriptor().template_key;
            assert!(templates.defaults.contains_key(key), "missing template {}", key);
        }
    }
}
