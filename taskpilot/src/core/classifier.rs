//! Deterministic classification of task descriptions into backend categories.
//!
//! Classification is driven by [`RULES`], evaluated top to bottom. Every
//! matching rule updates the derived flags; the last matching rule decides
//! `recommended_backend`. The multi-step rule is last so a compound instruction
//! always lands on the hybrid path regardless of its clause content.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::{BackendKind, ClassificationAnalysis, Complexity};

const DEFAULT_REASONING: &str = "No specific keywords matched; defaulting to vision control";

/// Keyword bucket a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Visual,
    Structured,
    Learning,
    MultiStep,
}

/// One entry of the ordered classification table.
#[derive(Debug)]
pub struct Rule {
    pub bucket: Bucket,
    /// Whole-word, case-insensitive phrases.
    pub keywords: &'static [&'static str],
    pub backend: BackendKind,
    /// `None` keeps the complexity set by an earlier rule.
    pub complexity: Option<Complexity>,
    /// Skip this rule when the named bucket already matched.
    pub unless: Option<Bucket>,
    pub reasoning: &'static str,
}

pub const RULES: &[Rule] = &[
    Rule {
        bucket: Bucket::Visual,
        keywords: &[
            "click",
            "navigate",
            "browse",
            "website",
            "ui",
            "button",
            "menu",
            "scroll",
            "find on screen",
            "visual",
            "look for",
        ],
        backend: BackendKind::Vision,
        complexity: Some(Complexity::High),
        unless: None,
        reasoning: "Visual navigation requires screen-driven control",
    },
    Rule {
        bucket: Bucket::Structured,
        keywords: &[
            "open",
            "close",
            "create file",
            "delete file",
            "run",
            "execute",
            "system",
            "brightness",
            "volume",
        ],
        backend: BackendKind::Structured,
        complexity: Some(Complexity::Low),
        unless: Some(Bucket::Visual),
        reasoning: "Structured command best handled by the command backend",
    },
    Rule {
        bucket: Bucket::Learning,
        keywords: &[
            "learn",
            "remember",
            "pattern",
            "observe",
            "study",
            "understand how",
            "figure out",
        ],
        backend: BackendKind::Learning,
        complexity: None,
        unless: None,
        reasoning: "Learning task benefits from the observation backend",
    },
    Rule {
        bucket: Bucket::MultiStep,
        keywords: &[
            "then",
            "and",
            "step by step",
            "workflow",
            "multiple",
            "sequence",
            "after that",
            "complex",
            "automate",
        ],
        backend: BackendKind::Hybrid,
        complexity: Some(Complexity::High),
        unless: None,
        reasoning: "Compound task requires hybrid decomposition",
    },
];

static PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    RULES
        .iter()
        .map(|rule| Regex::new(&keyword_pattern(rule.keywords)).expect("keyword pattern is valid"))
        .collect()
});

fn keyword_pattern(keywords: &[&str]) -> String {
    let alternatives = keywords
        .iter()
        .map(|keyword| regex::escape(keyword).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    format!(r"(?i)\b(?:{alternatives})\b")
}

/// Classify one task description. Never fails.
///
/// Empty or unrecognized input yields `vision` with `medium` complexity and
/// every flag cleared.
pub fn classify(description: &str) -> ClassificationAnalysis {
    let mut analysis = ClassificationAnalysis {
        task: description.to_string(),
        recommended_backend: BackendKind::Vision,
        direct_backend: BackendKind::Vision,
        requires_vision: false,
        requires_learning: false,
        requires_multi_step_planning: false,
        complexity: Complexity::Medium,
        reasoning: DEFAULT_REASONING.to_string(),
    };
    let mut matched: Vec<Bucket> = Vec::new();

    for (rule, pattern) in RULES.iter().zip(PATTERNS.iter()) {
        if rule.unless.is_some_and(|bucket| matched.contains(&bucket)) {
            continue;
        }
        if !pattern.is_match(description) {
            continue;
        }
        matched.push(rule.bucket);

        match rule.bucket {
            Bucket::Visual => analysis.requires_vision = true,
            Bucket::Learning => analysis.requires_learning = true,
            Bucket::MultiStep => analysis.requires_multi_step_planning = true,
            Bucket::Structured => {}
        }
        analysis.recommended_backend = rule.backend;
        if rule.backend != BackendKind::Hybrid {
            analysis.direct_backend = rule.backend;
        }
        if let Some(complexity) = rule.complexity {
            analysis.complexity = complexity;
        }
        analysis.reasoning = rule.reasoning.to_string();
    }

    analysis
}
