//! Text heuristics applied to the visible part of a model response.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

/// Fallback when no question sentence can be isolated.
pub const DEFAULT_QUESTION: &str = "Please provide additional information to continue.";

const QUESTION_PATTERNS: &[&str] = &[
    r"what is your.*\?",
    r"how much.*\?",
    r"what are your.*\?",
    r"do you.*\?",
    r"would you.*\?",
    r"can you.*\?",
    r"risk tolerance.*\?",
    r"investment goals.*\?",
    r"time horizon.*\?",
    r"current financial situation.*\?",
    r"budget.*\?",
    r"investment experience.*\?",
    r"please provide",
    r"i need to know",
    r"could you tell me",
    r"before we proceed.*need",
    r"before i can.*need",
    r"please answer.*questions",
    r"waiting for your response",
    r"need your input",
];

const EXECUTION_PHRASES: &[&str] = &[
    "Starting Research Execution",
    "begin!",
    "Searching:",
    "Scraping",
    "search for",
    "research current market",
];

static QUESTION_START: LazyLock<Regex> = LazyLock::new(|| {
    match Regex::new(r"(?i)\b(?:what|how|do|would|can|please|before)\b") {
        Ok(regex) => regex,
        Err(err) => panic!("Failed to compile question start regex: {err}"),
    }
});

/// Decides whether a response is asking the operator something.
#[derive(Debug, Clone)]
pub struct QuestionDetector {
    patterns: Vec<Regex>,
}

impl Default for QuestionDetector {
    fn default() -> Self {
        let patterns = QUESTION_PATTERNS
            .iter()
            .filter_map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .ok()
            })
            .collect();
        Self { patterns }
    }
}

impl QuestionDetector {
    /// Whether any question pattern matches.
    pub fn detect(&self, text: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(text))
    }

    /// The question sentence to surface to the operator.
    ///
    /// Takes the first span running from an interrogative keyword to a `?`
    /// without crossing a sentence break, falling back to the last non-empty
    /// paragraph.
    pub fn extract(&self, text: &str) -> String {
        let sentence = QUESTION_START.find_iter(text).find_map(|found| {
            let rest = text.get(found.start()..)?;
            let end = rest.find('?')?;
            let candidate = rest.get(..=end)?;
            (!candidate.contains(['.', '!', ':', '\n'])).then_some(candidate)
        });
        if let Some(question) = sentence {
            return question.trim().to_owned();
        }

        text.rsplit("\n\n")
            .map(str::trim)
            .find(|paragraph| !paragraph.is_empty())
            .unwrap_or(DEFAULT_QUESTION)
            .to_owned()
    }
}

/// Phrases that mean the model has committed to doing work this turn.
#[derive(Debug, Clone)]
pub struct ExecutionTriggers {
    phrases: Vec<String>,
}

impl Default for ExecutionTriggers {
    fn default() -> Self {
        Self {
            phrases: EXECUTION_PHRASES.iter().map(|&phrase| phrase.to_owned()).collect(),
        }
    }
}

impl ExecutionTriggers {
    /// Add a phrase.
    #[must_use]
    pub fn with_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.phrases.push(phrase.into());
        self
    }

    /// Whether any phrase occurs in `text`.
    pub fn matches(&self, text: &str) -> bool {
        self.phrases.iter().any(|phrase| text.contains(phrase.as_str()))
    }

    /// Execution is required when calls were parsed or a phrase matched.
    pub fn should_execute(&self, text: &str, has_calls: bool) -> bool {
        has_calls || self.matches(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_direct_question() {
        let detector = QuestionDetector::default();
        assert!(detector.detect("Before I start: What is your risk tolerance?"));
        assert!(detector.detect("PLEASE PROVIDE your budget"));
        assert!(!detector.detect("Here is the finished report."));
    }

    #[test]
    fn test_extracts_question_sentence() {
        let detector = QuestionDetector::default();
        let text = "I can help with that.\n\nWhat is your risk tolerance? Also, more later.";
        assert_eq!(detector.extract(text), "What is your risk tolerance?");
    }

    #[test]
    fn test_lead_in_clause_is_dropped() {
        let detector = QuestionDetector::default();
        let text = "Before I start: What is your risk tolerance?";
        assert_eq!(detector.extract(text), "What is your risk tolerance?");
    }

    #[test]
    fn test_keyword_inside_word_is_not_a_start() {
        let detector = QuestionDetector::default();
        let text = "Somewhat unclear. Would you share your timeline?";
        assert_eq!(detector.extract(text), "Would you share your timeline?");
    }

    #[test]
    fn test_falls_back_to_last_paragraph() {
        let detector = QuestionDetector::default();
        let text = "First paragraph.\n\nI need to know your budget.\n\n";
        assert_eq!(detector.extract(text), "I need to know your budget.");
        assert_eq!(detector.extract("   "), DEFAULT_QUESTION);
    }

    #[test]
    fn test_execution_triggers() {
        let triggers = ExecutionTriggers::default();
        assert!(triggers.should_execute("Let's begin!", false));
        assert!(triggers.should_execute("nothing here", true));
        assert!(!triggers.should_execute("Hello there", false));
        assert!(
            ExecutionTriggers::default()
                .with_phrase("go time")
                .matches("ok, go time")
        );
    }
}
