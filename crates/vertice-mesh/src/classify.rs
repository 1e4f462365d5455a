//! Natural-language task classification by word-boundary keyword matching.

use std::fmt;

use regex::Regex;

/// One of four shapes a task description can take, driving topology
/// selection. Classification order is fixed: parallel, then sequential,
/// then exploratory, then complex; unmatched descriptions default to
/// `Parallelizable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskCharacteristic {
    Parallelizable,
    Sequential,
    Exploratory,
    Complex,
}

impl TaskCharacteristic {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCharacteristic::Parallelizable => "parallelizable",
            TaskCharacteristic::Sequential => "sequential",
            TaskCharacteristic::Exploratory => "exploratory",
            TaskCharacteristic::Complex => "complex",
        }
    }
}

impl fmt::Display for TaskCharacteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const PARALLEL_KEYWORDS: &[&str] = &["parallel", "batch", "concurrent", "multiple"];
const SEQUENTIAL_KEYWORDS: &[&str] = &["step by step", "sequential", "then ", " then", "after that"];
const EXPLORATORY_KEYWORDS: &[&str] = &["explore", "search", "find", "navigate", "discover"];
const COMPLEX_KEYWORDS: &[&str] = &["complex", "multi-step", "architecture", "design"];

/// Whole-word match for single-word keywords (`\bword\b`), plain substring
/// match for multi-word phrases — mirrors the distinction needed so a
/// keyword like "then" doesn't fire on "authentication".
fn has_keyword(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| {
        if kw.contains(' ') {
            haystack.contains(kw)
        } else {
            let pattern = format!(r"\b{}\b", regex::escape(kw));
            Regex::new(&pattern)
                .map(|re| re.is_match(haystack))
                .unwrap_or(false)
        }
    })
}

pub fn classify_task(description: &str) -> TaskCharacteristic {
    let lower = description.to_lowercase();
    if has_keyword(&lower, PARALLEL_KEYWORDS) {
        return TaskCharacteristic::Parallelizable;
    }
    if has_keyword(&lower, SEQUENTIAL_KEYWORDS) {
        return TaskCharacteristic::Sequential;
    }
    if has_keyword(&lower, EXPLORATORY_KEYWORDS) {
        return TaskCharacteristic::Exploratory;
    }
    if has_keyword(&lower, COMPLEX_KEYWORDS) {
        return TaskCharacteristic::Complex;
    }
    TaskCharacteristic::Parallelizable
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_keyword_wins() {
        assert_eq!(
            classify_task("run these batch jobs"),
            TaskCharacteristic::Parallelizable
        );
    }

    #[test]
    fn sequential_phrase_with_trailing_space_matches() {
        assert_eq!(
            classify_task("do this then that"),
            TaskCharacteristic::Sequential
        );
    }

    #[test]
    fn whole_word_matching_avoids_false_positive() {
        // "authentication" contains "then" as a substring but not as a word.
        assert_eq!(
            classify_task("design the authentication flow"),
            TaskCharacteristic::Complex
        );
    }

    #[test]
    fn exploratory_keyword_detected() {
        assert_eq!(
            classify_task("explore the codebase for dead code"),
            TaskCharacteristic::Exploratory
        );
    }

    #[test]
    fn complex_keyword_detected() {
        assert_eq!(
            classify_task("redesign the service architecture"),
            TaskCharacteristic::Complex
        );
    }

    #[test]
    fn unmatched_description_defaults_to_parallelizable() {
        assert_eq!(
            classify_task("say hello"),
            TaskCharacteristic::Parallelizable
        );
    }

    #[test]
    fn matching_order_prefers_parallel_over_later_groups() {
        // Contains both a parallel keyword and a complex keyword; parallel wins.
        assert_eq!(
            classify_task("run a complex batch of tasks"),
            TaskCharacteristic::Parallelizable
        );
    }
}
