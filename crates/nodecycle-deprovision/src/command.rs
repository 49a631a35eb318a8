//! Command: the output of one deprovisioning decision.

use std::fmt;

use crate::candidate::Candidate;
use crate::simulate::ReplacementSpec;

/// What a command does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    DoNothing,
    /// Remove the candidate; its pods fit on existing capacity.
    Delete,
    /// Launch replacements first, then remove the candidate.
    Replace,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::DoNothing => "do-nothing",
            Action::Delete => "delete",
            Action::Replace => "replace",
        })
    }
}

/// A deprovisioning decision.
///
/// Fields are private so the shape always matches the action: `DoNothing`
/// carries nothing, `Delete` one candidate and no replacements, `Replace`
/// one candidate and at least one replacement.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    action: Action,
    candidates: Vec<Candidate>,
    replacements: Vec<ReplacementSpec>,
}

impl Command {
    pub fn do_nothing() -> Self {
        Self {
            action: Action::DoNothing,
            candidates: Vec::new(),
            replacements: Vec::new(),
        }
    }

    pub fn delete(candidate: Candidate) -> Self {
        Self {
            action: Action::Delete,
            candidates: vec![candidate],
            replacements: Vec::new(),
        }
    }

    /// `Replace` when replacements are needed, `Delete` otherwise.
    pub fn for_candidate(candidate: Candidate, replacements: Vec<ReplacementSpec>) -> Self {
        if replacements.is_empty() {
            return Self::delete(candidate);
        }
        Self {
            action: Action::Replace,
            candidates: vec![candidate],
            replacements,
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Replacement capacity to launch before removal, in launch order.
    pub fn replacements(&self) -> &[ReplacementSpec] {
        &self.replacements
    }

    pub fn is_do_nothing(&self) -> bool {
        self.action == Action::DoNothing
    }
}
