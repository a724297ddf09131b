//! Glob-style protection rules, compiled with `globset`.
//!
//! `**` crosses directory separators; `*`, `?` and character classes do not.
//! A pattern with a leading `/` is anchored and matched against the full
//! logical path; any other pattern is matched against the path relative to
//! the entry's root. A pattern without any `/` matches at any depth
//! (`*.keep` == `**/*.keep`), and `dir/**` also covers `dir` itself.

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::Path;

use crate::error::{CleanError, Result};

#[derive(Debug, Clone)]
pub struct ProtectionRule {
    pattern: String,
    reason: String,
    anchored: bool,
    matcher: GlobSet,
}

impl ProtectionRule {
    pub fn new(pattern: impl Into<String>, reason: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(invalid(&pattern, "pattern is empty"));
        }
        if trimmed.contains('\0') {
            return Err(invalid(&pattern, "pattern contains a NUL byte"));
        }

        let anchored = trimmed.starts_with('/');
        let body = if trimmed.contains('/') {
            trimmed.to_string()
        } else {
            format!("**/{}", trimmed)
        };
        let body = seal_negated_classes(&body);

        let mut builder = GlobSetBuilder::new();
        builder.add(compile(&body).map_err(|err| invalid(&pattern, &err.to_string()))?);
        if let Some(dir) = body.strip_suffix("/**").filter(|dir| !dir.is_empty()) {
            builder.add(compile(dir).map_err(|err| invalid(&pattern, &err.to_string()))?);
        }
        let matcher = builder
            .build()
            .map_err(|err| invalid(&pattern, &err.to_string()))?;

        Ok(ProtectionRule {
            pattern: trimmed.to_string(),
            reason: reason.into(),
            anchored,
            matcher,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    /// `logical` is the absolute, non-canonicalized path; `relative` the same
    /// path with its root stripped.
    pub fn is_match(&self, logical: &Path, relative: &Path) -> bool {
        let target = if self.anchored { logical } else { relative };
        self.matcher.is_match(target)
    }
}

/// Ordered, immutable rule list. First match wins.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<ProtectionRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<ProtectionRule>) -> Self {
        RuleSet { rules }
    }

    pub fn from_patterns<I, P, R>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, R)>,
        P: Into<String>,
        R: Into<String>,
    {
        let rules = patterns
            .into_iter()
            .map(|(pattern, reason)| ProtectionRule::new(pattern, reason))
            .collect::<Result<Vec<_>>>()?;
        Ok(RuleSet { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProtectionRule> {
        self.rules.iter()
    }

    pub fn matches(&self, path: &Path, root: &Path) -> Option<&ProtectionRule> {
        matches(path, root, self)
    }
}

/// First rule (in declaration order) protecting `path`, if any.
pub fn matches<'a>(path: &Path, root: &Path, rules: &'a RuleSet) -> Option<&'a ProtectionRule> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    rules
        .rules
        .iter()
        .find(|rule| rule.is_match(path, relative))
}

fn invalid(pattern: &str, message: &str) -> CleanError {
    CleanError::InvalidPattern {
        pattern: pattern.to_string(),
        message: message.to_string(),
    }
}

fn compile(glob: &str) -> std::result::Result<Glob, globset::Error> {
    GlobBuilder::new(glob)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
}

/// A negated class such as `[!x]` would otherwise match `/`; add the
/// separator to its exclusions so a class stays inside one path segment.
fn seal_negated_classes(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '[' => {
                if let Some(&marker @ ('!' | '^')) = chars.peek() {
                    out.push(marker);
                    chars.next();
                    if chars.peek() == Some(&']') {
                        out.push(']');
                        chars.next();
                    }
                    out.push('/');
                } else if chars.peek() == Some(&']') {
                    // leading `]` is a member, not the end of the class
                    out.push(']');
                    chars.next();
                }
                for member in chars.by_ref() {
                    out.push(member);
                    if member == ']' {
                        break;
                    }
                }
            }
            _ => {}
        }
    }
    out
}
