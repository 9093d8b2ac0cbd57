//! `@ColumnName` prompt templates.
//!
//! A [`PromptTemplate`] is parsed once, when a prompt is assigned to a
//! column. Parsing extracts the distinct column names the prompt refers to
//! so that dependency checks never have to re-scan the prompt text.
//!
//! Placeholders match `@[A-Za-z0-9_]+`. Matching is greedy, so `@NameExtra`
//! is always resolved as the column `NameExtra` and never as `Name` followed
//! by the literal text `Extra`. Substituted values are not re-scanned, so a
//! cell containing `@Other` is inserted verbatim.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@([A-Za-z0-9_]+)").expect("placeholder pattern is a valid regex")
});

/// A parsed prompt template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PromptTemplate {
    source: String,
    /// Distinct referenced column names, longest first.
    refs: Vec<String>,
}

impl PromptTemplate {
    /// Parse a template, collecting the columns it references.
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        let mut refs: Vec<String> = Vec::new();
        for caps in PLACEHOLDER.captures_iter(&source) {
            let name = &caps[1];
            if !refs.iter().any(|r| r == name) {
                refs.push(name.to_string());
            }
        }
        // Stable sort keeps first-appearance order among equal lengths.
        refs.sort_by(|a, b| b.len().cmp(&a.len()));
        Self { source, refs }
    }

    /// The raw template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Column names referenced by this template, longest first.
    pub fn refs(&self) -> &[String] {
        &self.refs
    }

    /// Whether this template contains a placeholder for `column`.
    pub fn references(&self, column: &str) -> bool {
        self.refs.iter().any(|r| r == column)
    }

    /// Substitute every placeholder with the row's value for that column.
    ///
    /// Columns missing from the row substitute as the empty string.
    pub fn render(&self, row: &HashMap<String, String>) -> String {
        if self.refs.is_empty() {
            return self.source.clone();
        }
        PLACEHOLDER
            .replace_all(&self.source, |caps: &Captures<'_>| {
                row.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned()
    }
}

impl From<String> for PromptTemplate {
    fn from(source: String) -> Self {
        Self::parse(source)
    }
}

impl From<&str> for PromptTemplate {
    fn from(source: &str) -> Self {
        Self::parse(source)
    }
}

impl From<PromptTemplate> for String {
    fn from(template: PromptTemplate) -> Self {
        template.source
    }
}

impl std::fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_all_placeholders() {
        let t = PromptTemplate::parse("Compare @A with @B, then @A again");
        let prompt = t.render(&row(&[("A", "x"), ("B", "y")]));
        assert_eq!(prompt, "Compare x with y, then x again");
        assert!(!prompt.contains("@A"));
        assert!(!prompt.contains("@B"));
    }

    #[test]
    fn missing_column_renders_empty() {
        let t = PromptTemplate::parse("major=@Major;");
        assert_eq!(t.render(&HashMap::new()), "major=;");
    }

    #[test]
    fn longer_token_is_not_partially_replaced() {
        let t = PromptTemplate::parse("@Name / @NameExtra");
        let prompt = t.render(&row(&[("Name", "short"), ("NameExtra", "long")]));
        assert_eq!(prompt, "short / long");

        // Without a `NameExtra` column the token must still not leak `Name`.
        let prompt = t.render(&row(&[("Name", "short")]));
        assert_eq!(prompt, "short / ");
    }

    #[test]
    fn refs_are_distinct_and_longest_first() {
        let t = PromptTemplate::parse("@A @Major @A @Mid");
        assert_eq!(t.refs(), ["Major", "Mid", "A"]);
        assert!(t.references("Major"));
        assert!(!t.references("Maj"));
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let t = PromptTemplate::parse("@A");
        let prompt = t.render(&row(&[("A", "@B"), ("B", "nope")]));
        assert_eq!(prompt, "@B");
    }

    #[test]
    fn names_with_spaces_only_match_the_first_word() {
        let t = PromptTemplate::parse("Hello @First name");
        assert_eq!(t.refs(), ["First"]);
        let prompt = t.render(&row(&[("First name", "Jane"), ("First", "J")]));
        assert_eq!(prompt, "Hello J name");
    }

    #[test]
    fn template_without_placeholders_is_verbatim() {
        let t = PromptTemplate::parse("no refs here, email a@");
        assert!(t.refs().is_empty());
        assert_eq!(t.render(&row(&[("A", "x")])), "no refs here, email a@");
    }

    #[test]
    fn serializes_as_plain_string() {
        let t = PromptTemplate::parse("Is @Major engineering?");
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json, serde_json::json!("Is @Major engineering?"));
        let back: PromptTemplate = serde_json::from_value(json).unwrap();
        assert_eq!(back.refs(), ["Major"]);
    }
}
