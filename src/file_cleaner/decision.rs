use chrono::{DateTime, Utc};

use super::duplicate_detector::{DuplicateIndex, Membership};
use super::patterns::RuleSet;
use super::safety::{classify, Thresholds};
use super::types::{Action, CandidateEntry, EntryKind, Reason, Verdict};

/// Pure function of (entry, rules, thresholds, duplicate membership, frozen
/// run-start time). Explicit patterns outrank heuristics, heuristics outrank
/// duplicate and eligibility reasoning.
#[derive(Debug, Clone, Copy)]
pub struct DecisionEngine<'a> {
    rules: &'a RuleSet,
    thresholds: Thresholds,
    run_started: DateTime<Utc>,
    duplicates: &'a DuplicateIndex,
    simulate: bool,
}

impl<'a> DecisionEngine<'a> {
    pub fn new(
        rules: &'a RuleSet,
        thresholds: Thresholds,
        run_started: DateTime<Utc>,
        duplicates: &'a DuplicateIndex,
        simulate: bool,
    ) -> Self {
        DecisionEngine {
            rules,
            thresholds,
            run_started,
            duplicates,
            simulate,
        }
    }

    pub fn decide(&self, entry: CandidateEntry) -> Verdict {
        let (action, reason) = self.evaluate(&entry);
        log::debug!("{} {} ({})", action, entry.path.display(), reason);
        Verdict::new(entry, action, reason, self.simulate)
    }

    fn evaluate(&self, entry: &CandidateEntry) -> (Action, Reason) {
        if let Some(rule) = self.rules.matches(&entry.path, &entry.root) {
            return (
                Action::Protect,
                Reason::PatternMatch {
                    pattern: rule.pattern().to_string(),
                    reason: rule.reason().to_string(),
                },
            );
        }

        if let Some(signal) = classify(entry, &self.thresholds, self.run_started) {
            return (Action::Protect, signal.into());
        }

        match entry.kind {
            EntryKind::Symlink => return (Action::Skip, Reason::SymbolicLink),
            EntryKind::Directory => {
                // directories only ever go through the empty-directory path
                return if !entry.is_empty_dir() {
                    (Action::Skip, Reason::DirectoryNotEmpty)
                } else if self.thresholds.clean_empty_dirs {
                    (Action::Delete, Reason::EmptyDirectory)
                } else {
                    (Action::Skip, Reason::EmptyDirectoryDisabled)
                };
            }
            EntryKind::File => {}
        }

        if self.thresholds.detect_duplicates {
            match self.duplicates.lookup(&entry.path) {
                Some(Membership::DuplicateOf(original)) => {
                    return (
                        Action::Delete,
                        Reason::DuplicateOf {
                            original: original.clone(),
                        },
                    );
                }
                Some(Membership::Original { copies }) => {
                    return (Action::Skip, Reason::DuplicateOriginal { copies: *copies });
                }
                None => {}
            }
        }

        (Action::Delete, Reason::Eligible)
    }
}
