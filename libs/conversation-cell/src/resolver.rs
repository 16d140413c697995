// libs/conversation-cell/src/resolver.rs
//! Maps what a user typed or tapped to a canonical token for the current
//! state. Pure: no session, no I/O.

use std::collections::HashSet;

use crate::models::Button;
use crate::states::InputType;

pub const CONFIRM_BUTTON_ID: &str = "confirmar";

/// Minimum word overlap for a fuzzy label match.
pub const WORD_OVERLAP_THRESHOLD: f64 = 0.5;

/// Shorter input never matches a label by containment.
pub const MIN_CONTAINMENT_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalCommand {
    Back,
    Menu,
    Human,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// A button id, either tapped directly or matched from text.
    Button(String),
    Command(GlobalCommand),
    /// Raw text for a free-text state.
    Text(String),
    Unrecognized,
}

const BACK_WORDS: &[&str] = &["voltar", "volta", "anterior"];
const MENU_WORDS: &[&str] = &["menu", "inicio"];
const HUMAN_WORDS: &[&str] = &["atendente", "humano"];
const END_WORDS: &[&str] = &["sair", "tchau", "encerrar"];
const CONFIRM_WORDS: &[&str] = &["sim", "confirmar", "ok"];

pub fn resolve(
    text: &str,
    button_id: Option<&str>,
    buttons: &[Button],
    input_type: InputType,
) -> Resolved {
    if let Some(id) = button_id.map(str::trim).filter(|id| !id.is_empty()) {
        return Resolved::Button(id.to_string());
    }

    let normalized = normalize(text);
    if normalized.is_empty() {
        return Resolved::Unrecognized;
    }

    if let Some(command) = keyword_command(&normalized) {
        return Resolved::Command(command);
    }

    if CONFIRM_WORDS.contains(&normalized.as_str())
        && buttons.iter().any(|b| b.id == CONFIRM_BUTTON_ID)
    {
        return Resolved::Button(CONFIRM_BUTTON_ID.to_string());
    }

    if input_type == InputType::FreeText {
        return Resolved::Text(text.trim().to_string());
    }

    if normalized.chars().all(|c| c.is_ascii_digit()) {
        return match normalized.parse::<usize>() {
            Ok(n) if n >= 1 && n <= buttons.len() => Resolved::Button(buttons[n - 1].id.clone()),
            _ => Resolved::Unrecognized,
        };
    }

    match match_label(&normalized, buttons) {
        Some(id) => Resolved::Button(id),
        None => Resolved::Unrecognized,
    }
}

fn keyword_command(normalized: &str) -> Option<GlobalCommand> {
    if BACK_WORDS.contains(&normalized) {
        Some(GlobalCommand::Back)
    } else if MENU_WORDS.contains(&normalized) {
        Some(GlobalCommand::Menu)
    } else if HUMAN_WORDS.contains(&normalized) {
        Some(GlobalCommand::Human)
    } else if END_WORDS.contains(&normalized) {
        Some(GlobalCommand::End)
    } else {
        None
    }
}

fn match_label(normalized: &str, buttons: &[Button]) -> Option<String> {
    let labels: Vec<(String, &Button)> = buttons.iter().map(|b| (normalize(&b.label), b)).collect();

    if normalized.chars().count() >= MIN_CONTAINMENT_LEN {
        let contained: Vec<&Button> = labels
            .iter()
            .filter(|(label, _)| {
                !label.is_empty() && (contains_words(label, normalized) || contains_words(normalized, label))
            })
            .map(|(_, b)| *b)
            .collect();
        if contained.len() == 1 {
            return Some(contained[0].id.clone());
        }
    }

    let mut scored: Vec<(f64, &Button)> = labels
        .iter()
        .map(|(label, b)| (word_overlap(normalized, label), *b))
        .filter(|(score, _)| *score >= WORD_OVERLAP_THRESHOLD)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    match scored.as_slice() {
        [(_, only)] => Some(only.id.clone()),
        [(best, winner), (runner_up, _), ..] if best > runner_up => Some(winner.id.clone()),
        _ => None,
    }
}

/// Whether `needle`'s words appear as a contiguous run of whole words in `haystack`.
fn contains_words(haystack: &str, needle: &str) -> bool {
    let hay: Vec<&str> = haystack.split(' ').collect();
    let words: Vec<&str> = needle.split(' ').collect();
    !words.is_empty() && hay.windows(words.len()).any(|window| window == words.as_slice())
}

/// Jaccard similarity over the word sets of two normalized strings.
pub fn word_overlap(a: &str, b: &str) -> f64 {
    let left: HashSet<&str> = a.split(' ').filter(|w| !w.is_empty()).collect();
    let right: HashSet<&str> = b.split(' ').filter(|w| !w.is_empty()).collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}

/// Lowercase, strip accents, turn punctuation into spaces and collapse runs
/// of whitespace.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .chars()
        .flat_map(char::to_lowercase)
        .map(fold_accent)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu() -> Vec<Button> {
        vec![
            Button::new("agendar", "Agendar horário"),
            Button::new("remarcar", "Remarcar horário"),
            Button::new("cancelar", "Cancelar horário"),
            Button::new("duvidas", "Dúvidas frequentes"),
            Button::new("atendente", "Falar com atendente"),
        ]
    }

    #[test]
    fn test_normalize_folds_case_accents_and_punctuation() {
        assert_eq!(normalize("  Agendar   HORÁRIO!! "), "agendar horario");
        assert_eq!(normalize("Início"), "inicio");
        assert_eq!(normalize("1) Depilação, axilas"), "1 depilacao axilas");
    }

    #[test]
    fn test_button_id_passes_through() {
        let resolved = resolve("whatever", Some("day:2026-10-19"), &menu(), InputType::DynamicSelection);
        assert_eq!(resolved, Resolved::Button("day:2026-10-19".into()));
    }

    #[test]
    fn test_index_and_label_resolve_to_same_button() {
        let by_index = resolve("1", None, &menu(), InputType::Static);
        let by_label = resolve("agendar horario", None, &menu(), InputType::Static);
        let by_accented_label = resolve("AGENDAR HORÁRIO", None, &menu(), InputType::Static);

        assert_eq!(by_index, Resolved::Button("agendar".into()));
        assert_eq!(by_label, by_index);
        assert_eq!(by_accented_label, by_index);
    }

    #[test]
    fn test_index_out_of_range_is_unrecognized() {
        assert_eq!(resolve("9", None, &menu(), InputType::Static), Resolved::Unrecognized);
        assert_eq!(resolve("0", None, &menu(), InputType::Static), Resolved::Unrecognized);
    }

    #[test]
    fn test_digits_are_data_in_free_text_states() {
        assert_eq!(resolve("1, 3", None, &[], InputType::FreeText), Resolved::Text("1, 3".into()));
        assert_eq!(resolve("2", None, &menu(), InputType::FreeText), Resolved::Text("2".into()));
    }

    #[test]
    fn test_global_keywords() {
        assert_eq!(resolve("Voltar", None, &menu(), InputType::Static), Resolved::Command(GlobalCommand::Back));
        assert_eq!(resolve("início", None, &[], InputType::FreeText), Resolved::Command(GlobalCommand::Menu));
        assert_eq!(resolve("humano", None, &[], InputType::Static), Resolved::Command(GlobalCommand::Human));
        assert_eq!(resolve("tchau!", None, &[], InputType::Static), Resolved::Command(GlobalCommand::End));
    }

    #[test]
    fn test_confirm_synonyms_only_when_confirm_is_visible() {
        let confirm = vec![Button::new("confirmar", "Confirmar"), Button::new("alterar", "Alterar serviços")];
        assert_eq!(resolve("sim", None, &confirm, InputType::Static), Resolved::Button("confirmar".into()));
        assert_eq!(resolve("OK", None, &confirm, InputType::Static), Resolved::Button("confirmar".into()));
        assert_eq!(resolve("sim", None, &menu(), InputType::Static), Resolved::Unrecognized);
    }

    #[test]
    fn test_unique_containment_wins() {
        assert_eq!(resolve("duvidas", None, &menu(), InputType::Static), Resolved::Button("duvidas".into()));
        assert_eq!(
            resolve("quero falar com atendente agora", None, &menu(), InputType::Static),
            Resolved::Button("atendente".into())
        );
    }

    #[test]
    fn test_containment_needs_whole_words() {
        let cancel = vec![Button::new("confirmar", "Sim, cancelar"), Button::new("manter", "Não, manter")];
        assert_eq!(resolve("s", None, &cancel, InputType::Static), Resolved::Unrecognized);
        assert_eq!(resolve("ma", None, &cancel, InputType::Static), Resolved::Unrecognized);
        assert_eq!(resolve("cancel", None, &cancel, InputType::Static), Resolved::Unrecognized);
        assert_eq!(resolve("manter", None, &cancel, InputType::Static), Resolved::Button("manter".into()));

        let confirm = vec![Button::new("confirmar", "Confirmar"), Button::new("alterar", "Alterar serviços")];
        assert_eq!(resolve("f", None, &confirm, InputType::Static), Resolved::Unrecognized);
        assert_eq!(resolve("firma", None, &confirm, InputType::Static), Resolved::Unrecognized);
        assert_eq!(
            resolve("quero alterar servicos", None, &confirm, InputType::Static),
            Resolved::Button("alterar".into())
        );
    }

    #[test]
    fn test_contains_words() {
        assert!(contains_words("falar com atendente", "atendente"));
        assert!(contains_words("quero falar com atendente agora", "falar com atendente"));
        assert!(!contains_words("confirmar", "f"));
        assert!(!contains_words("falar com atendente", "falar atendente"));
    }

    #[test]
    fn test_ambiguous_containment_falls_back_to_word_overlap() {
        // "horario" is in three labels; no word-overlap winner either
        assert_eq!(resolve("horario", None, &menu(), InputType::Static), Resolved::Unrecognized);
        // only "remarcar horario" clears the overlap threshold
        assert_eq!(
            resolve("remarcar meu horario", None, &menu(), InputType::Static),
            Resolved::Button("remarcar".into())
        );
    }

    #[test]
    fn test_word_overlap_tie_is_rejected() {
        let buttons = vec![Button::new("a", "segunda manha"), Button::new("b", "segunda tarde")];
        assert_eq!(resolve("segunda", None, &buttons, InputType::DynamicSelection), Resolved::Unrecognized);
    }

    #[test]
    fn test_word_overlap_score() {
        assert_eq!(word_overlap("a b", "a b"), 1.0);
        assert_eq!(word_overlap("a b", "b c"), 1.0 / 3.0);
        assert_eq!(word_overlap("", ""), 0.0);
    }

    #[test]
    fn test_empty_message_is_unrecognized() {
        assert_eq!(resolve("  ", None, &menu(), InputType::Static), Resolved::Unrecognized);
        assert_eq!(resolve("!!", None, &[], InputType::FreeText), Resolved::Unrecognized);
    }
}
