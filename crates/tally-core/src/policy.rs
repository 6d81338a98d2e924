//! Noise policy: which changed lines do not count as code.
//!
//! The policy is a table of named regex predicates evaluated against the
//! content of a single added or removed line (marker already stripped). Any
//! match marks the line as noise. Supporting another language's comment
//! convention means adding a row, either to [`BUILTIN_RULES`] or at runtime
//! through [`NoisePolicy::with_extra_patterns`].
//!
//! Block comments that span lines are not handled here; the open/close
//! delimiters live in [`BlockKind`] and the scanner in
//! [`classify`](crate::classify) tracks them.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

/// Errors from building a noise policy.
#[derive(Error, Debug)]
pub enum PolicyError {
    /// A user-supplied pattern is not a valid regular expression.
    #[error("invalid noise pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The pattern as written in configuration.
        pattern: String,
        /// The underlying regex error.
        source: regex::Error,
    },
}

/// A single noise predicate.
#[derive(Debug, Clone)]
pub struct NoiseRule {
    /// Short name used in trace logs and tests.
    pub name: String,
    pattern: Regex,
}

impl NoiseRule {
    /// Build a rule from a name and a regular expression.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidPattern`] if `pattern` does not compile.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, PolicyError> {
        let pattern = Regex::new(pattern).map_err(|source| PolicyError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            name: name.into(),
            pattern,
        })
    }

    /// Whether this rule matches the given line content.
    pub fn matches(&self, content: &str) -> bool {
        self.pattern.is_match(content)
    }
}

/// Built-in noise rules as `(name, pattern)` rows.
///
/// Rows are independent; order only affects which name is reported first.
pub const BUILTIN_RULES: &[(&str, &str)] = &[
    ("blank", r"^\s*$"),
    ("line-comment", r"^\s*(//|#)"),
    ("block-comment-open", r"^\s*/\*"),
    // Interior lines of a block comment, `* @param` doc tags included.
    ("block-comment-interior", r"^\s*\*"),
    ("block-comment-close", r"\*/\s*$"),
    ("markup-comment", r"^\s*<!--.*-->\s*$"),
    ("markup-comment-open", r"^\s*<!--"),
    ("markup-comment-close", r"-->\s*$"),
    ("brackets-only", r"^[\s\[\]{}()]+$"),
    ("import", r"^\s*import\s+\S"),
    ("package", r"^\s*package\s+\S"),
    ("semicolon-only", r"^\s*;\s*$"),
    ("annotation", r"^\s*@[A-Za-z_][A-Za-z0-9_]*"),
    ("empty-body", r"^\s*\{\}\s*$"),
];

static BUILTIN: LazyLock<Vec<NoiseRule>> = LazyLock::new(|| {
    BUILTIN_RULES
        .iter()
        .map(|(name, pattern)| {
            NoiseRule::new(*name, pattern).unwrap_or_else(|e| panic!("builtin rule {name}: {e}"))
        })
        .collect()
});

/// Multi-line comment forms the scanner tracks across lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// C-style `/* ... */`.
    Block,
    /// Markup `<!-- ... -->`.
    Markup,
}

impl BlockKind {
    /// Every tracked block form.
    pub const ALL: [Self; 2] = [Self::Block, Self::Markup];

    /// Opening delimiter.
    pub const fn opener(self) -> &'static str {
        match self {
            Self::Block => "/*",
            Self::Markup => "<!--",
        }
    }

    /// Closing delimiter.
    pub const fn closer(self) -> &'static str {
        match self {
            Self::Block => "*/",
            Self::Markup => "-->",
        }
    }

    /// If `content` starts (after leading whitespace) with this opener and
    /// does not close it later on the same line, the comment stays open.
    pub fn leaves_open(self, content: &str) -> bool {
        content
            .trim_start()
            .strip_prefix(self.opener())
            .is_some_and(|rest| !rest.contains(self.closer()))
    }
}

/// The ordered set of noise predicates applied to changed lines.
#[derive(Debug, Clone)]
pub struct NoisePolicy {
    rules: Vec<NoiseRule>,
}

impl Default for NoisePolicy {
    fn default() -> Self {
        Self {
            rules: BUILTIN.to_vec(),
        }
    }
}

impl NoisePolicy {
    /// Policy with only the built-in rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append user-supplied patterns to the table.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidPattern`] for the first pattern that
    /// fails to compile.
    pub fn with_extra_patterns<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self, PolicyError> {
        for (i, pattern) in patterns.iter().enumerate() {
            let rule = NoiseRule::new(format!("extra-{i}"), pattern.as_ref())?;
            debug!(name = %rule.name, pattern = pattern.as_ref(), "added noise rule");
            self.rules.push(rule);
        }
        Ok(self)
    }

    /// Name of the first rule matching `content`, if any.
    pub fn matching_rule(&self, content: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.matches(content))
            .map(|rule| rule.name.as_str())
    }

    /// Whether `content` is noise under this policy.
    pub fn is_noise(&self, content: &str) -> bool {
        self.matching_rule(content).is_some()
    }

    /// Number of rules in the table.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_for(content: &str) -> Option<String> {
        NoisePolicy::new().matching_rule(content).map(str::to_string)
    }

    #[test]
    fn blank_and_whitespace_lines_are_noise() {
        assert_eq!(rule_for("").as_deref(), Some("blank"));
        assert_eq!(rule_for("   \t ").as_deref(), Some("blank"));
    }

    #[test]
    fn single_line_comments_are_noise() {
        assert_eq!(rule_for("// comment").as_deref(), Some("line-comment"));
        assert_eq!(rule_for("    # comment").as_deref(), Some("line-comment"));
    }

    #[test]
    fn block_comment_shapes_are_noise() {
        assert_eq!(rule_for("/* foo").as_deref(), Some("block-comment-open"));
        assert_eq!(rule_for(" * bar").as_deref(), Some("block-comment-interior"));
        assert_eq!(rule_for(" * @param x the x").as_deref(), Some("block-comment-interior"));
        assert_eq!(rule_for(" */").as_deref(), Some("block-comment-interior"));
        assert_eq!(rule_for("foo(); */").as_deref(), Some("block-comment-close"));
    }

    #[test]
    fn markup_comments_are_noise() {
        assert_eq!(rule_for("<!-- note -->").as_deref(), Some("markup-comment"));
        assert_eq!(rule_for("  <!-- start").as_deref(), Some("markup-comment-open"));
        assert_eq!(rule_for("end -->").as_deref(), Some("markup-comment-close"));
    }

    #[test]
    fn structural_lines_are_noise() {
        assert_eq!(rule_for("}").as_deref(), Some("brackets-only"));
        assert_eq!(rule_for("  })]").as_deref(), Some("brackets-only"));
        assert_eq!(rule_for(";").as_deref(), Some("semicolon-only"));
        assert_eq!(rule_for("import foo.Bar;").as_deref(), Some("import"));
        assert_eq!(rule_for("package com.example;").as_deref(), Some("package"));
        assert_eq!(rule_for("    @Override").as_deref(), Some("annotation"));
    }

    #[test]
    fn empty_body_is_noise() {
        assert!(NoisePolicy::new().is_noise("  {}  "));
    }

    #[test]
    fn code_lines_are_not_noise() {
        let policy = NoisePolicy::new();
        for line in [
            "public int x = 1;",
            "return a + b;",
            "});",
            "let importance = 3;",
            "packageName = x",
            "email = \"a@b.c\"",
        ] {
            assert!(!policy.is_noise(line), "{line:?} should count as code");
        }
    }

    #[test]
    fn bare_keywords_without_argument_are_code() {
        let policy = NoisePolicy::new();
        assert!(!policy.is_noise("import"));
        assert!(!policy.is_noise("package"));
    }

    #[test]
    fn extra_patterns_extend_the_table() {
        let policy = NoisePolicy::new()
            .with_extra_patterns(&[r"^\s*--"])
            .unwrap();
        assert_eq!(policy.len(), BUILTIN_RULES.len() + 1);
        assert_eq!(policy.matching_rule("-- sql comment"), Some("extra-0"));
    }

    #[test]
    fn invalid_extra_pattern_is_rejected() {
        let err = NoisePolicy::new().with_extra_patterns(&["(unclosed"]).unwrap_err();
        assert!(err.to_string().contains("(unclosed"));
    }

    #[test]
    fn leaves_open_requires_no_closer_after_opener() {
        assert!(BlockKind::Block.leaves_open("/* foo"));
        assert!(!BlockKind::Block.leaves_open("/* note */"));
        assert!(!BlockKind::Block.leaves_open("x = 1; /* trailing"));
        assert!(BlockKind::Markup.leaves_open("  <!-- start"));
        assert!(!BlockKind::Markup.leaves_open("<!-- done -->"));
    }
}
