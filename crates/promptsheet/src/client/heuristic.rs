//! Offline classifier used when no model endpoint is available.
//!
//! Answers like the classification service does when its model output cannot
//! be parsed: a prompt counts as "engineer" when it mentions one of a fixed
//! set of engineering majors.

use serde_json::json;

use super::{Completer, CompletionFuture};

/// Majors that count as engineering, lowercase.
pub const ENGINEERING_MAJORS: &[&str] = &[
    "computer science",
    "software engineering",
    "electrical engineering",
    "mechanical engineering",
    "civil engineering",
    "chemical engineering",
];

/// Keyword-based stand-in for the classification endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCompleter;

impl HeuristicCompleter {
    /// Classify a prompt without any I/O.
    pub fn classify(prompt: &str) -> serde_json::Value {
        let lower = prompt.to_lowercase();
        let matched = ENGINEERING_MAJORS.iter().find(|m| lower.contains(*m));
        let reasoning = match matched {
            Some(major) => format!("Mentions {major}, an engineering-related major."),
            None => "No typical engineering major mentioned.".to_string(),
        };
        json!({ "isEngineer": matched.is_some(), "reasoning": reasoning })
    }
}

impl Completer for HeuristicCompleter {
    fn complete<'a>(&'a self, prompt: &'a str) -> CompletionFuture<'a> {
        Box::pin(async move { Ok(Self::classify(prompt)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_engineering_majors_case_insensitively() {
        let v = HeuristicCompleter::classify("Is a MECHANICAL Engineering student an engineer?");
        assert_eq!(v["isEngineer"], true);
        assert!(v["reasoning"].as_str().unwrap().contains("mechanical engineering"));
    }

    #[test]
    fn other_majors_are_not_engineering() {
        let v = HeuristicCompleter::classify("Is the student from a major in Biology an engineer?");
        assert_eq!(v["isEngineer"], false);
    }

    #[tokio::test]
    async fn completes_without_io() {
        let v = HeuristicCompleter.complete("computer science").await.unwrap();
        assert_eq!(v["isEngineer"], true);
    }
}
