//! Hybrid decomposition of compound instructions.
//!
//! - `" then "` splits into ordered subtasks; each is critical.
//! - Otherwise `" and "` splits into unordered subtasks; none is critical.
//! - Otherwise the whole description is one critical subtask.
//!
//! Connectives match case-insensitively. Empty clauses are dropped, and the
//! result always holds at least one subtask.

use serde::Serialize;

const ORDERED_CONNECTIVE: &str = " then ";
const UNORDERED_CONNECTIVE: &str = " and ";

/// One clause of a decomposed description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subtask {
    /// 0-based position of the clause in the original description.
    pub order: usize,
    pub description: String,
    pub critical: bool,
}

/// Split `description` into subtasks.
pub fn decompose(description: &str) -> Vec<Subtask> {
    if let Some(clauses) = split_on(description, ORDERED_CONNECTIVE) {
        return to_subtasks(clauses, true);
    }
    if let Some(clauses) = split_on(description, UNORDERED_CONNECTIVE) {
        return to_subtasks(clauses, false);
    }
    vec![Subtask {
        order: 0,
        description: description.trim().to_string(),
        critical: true,
    }]
}

/// Split on `connective`, ignoring ASCII case. Returns `None` when the
/// connective is absent or every clause is blank.
fn split_on<'a>(text: &'a str, connective: &str) -> Option<Vec<&'a str>> {
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let lowered = text.to_ascii_lowercase();
    let mut clauses = Vec::new();
    let mut start = 0;
    for (pos, _) in lowered.match_indices(connective) {
        clauses.push(&text[start..pos]);
        start = pos + connective.len();
    }
    if clauses.is_empty() {
        return None;
    }
    clauses.push(&text[start..]);

    let clauses: Vec<&str> = clauses
        .into_iter()
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .collect();
    (!clauses.is_empty()).then_some(clauses)
}

fn to_subtasks(clauses: Vec<&str>, critical: bool) -> Vec<Subtask> {
    clauses
        .into_iter()
        .enumerate()
        .map(|(order, clause)| Subtask {
            order,
            description: clause.to_string(),
            critical,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptions(subtasks: &[Subtask]) -> Vec<&str> {
        subtasks.iter().map(|s| s.description.as_str()).collect()
    }

    #[test]
    fn then_splits_into_ordered_critical_subtasks() {
        let subtasks = decompose("open chrome then search cats");
        assert_eq!(descriptions(&subtasks), vec!["open chrome", "search cats"]);
        assert!(subtasks.iter().all(|s| s.critical));
        assert_eq!(subtasks[1].order, 1);
    }

    #[test]
    fn and_splits_into_non_critical_subtasks() {
        let subtasks = decompose("open chrome and play music");
        assert_eq!(descriptions(&subtasks), vec!["open chrome", "play music"]);
        assert!(subtasks.iter().all(|s| !s.critical));
    }

    #[test]
    fn then_takes_precedence_over_and() {
        let subtasks = decompose("open chrome then search cats and dogs");
        assert_eq!(
            descriptions(&subtasks),
            vec!["open chrome", "search cats and dogs"]
        );
        assert!(subtasks.iter().all(|s| s.critical));
    }

    #[test]
    fn connective_matching_ignores_case() {
        let subtasks = decompose("Open Chrome THEN Search Cats");
        assert_eq!(descriptions(&subtasks), vec!["Open Chrome", "Search Cats"]);
    }

    #[test]
    fn plain_description_is_single_critical_subtask() {
        let subtasks = decompose("  open notepad ");
        assert_eq!(descriptions(&subtasks), vec!["open notepad"]);
        assert!(subtasks[0].critical);
    }

    #[test]
    fn blank_clauses_are_dropped() {
        let subtasks = decompose("open chrome then  then search cats");
        assert_eq!(descriptions(&subtasks), vec!["open chrome", "search cats"]);
    }

    #[test]
    fn words_containing_connectives_do_not_split() {
        let subtasks = decompose("open the android emulator");
        assert_eq!(subtasks.len(), 1);
    }
}
