use std::fmt;
use std::ops::Deref;

use thiserror::Error;

use crate::entity::Identifier;
use crate::solver::Constraint;

/// Errors produced while building or running a resolution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    /// Two entities in the input share an identifier.
    #[error("duplicate identifier {0} in input")]
    DuplicateIdentifier(Identifier),

    /// An expression failed to compile or evaluate.
    #[error(transparent)]
    Expression(#[from] ExprError),

    /// A constraint builder could not be expanded against the universe.
    #[error("constraint builder expansion failed: {0}")]
    BuilderExpansion(String),

    /// The constraints admit no solution. Carries the offending constraints.
    #[error(transparent)]
    NotSatisfiable(#[from] NotSatisfiable),

    /// The caller cancelled the resolution.
    #[error("resolution cancelled")]
    Cancelled,

    /// An internal invariant was violated. Aggregates every sub-error
    /// observed during the solve.
    #[error("internal solver failure: {0}")]
    Internal(String),
}

/// Errors from the embedded expression language.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("expression compile error: {0}")]
    Compile(String),

    #[error("expression evaluation error: {0}")]
    Eval(String),
}

/// A set of constraints that cannot be satisfied together.
///
/// The order of the constraints is deterministic for a given input: entries
/// appear in constraint application order, deduplicated.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NotSatisfiable(pub Vec<Constraint>);

impl fmt::Display for NotSatisfiable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "constraints not satisfiable");
        }
        let reasons: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "constraints not satisfiable: {}", reasons.join(", "))
    }
}

impl std::error::Error for NotSatisfiable {}

impl Deref for NotSatisfiable {
    type Target = [Constraint];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl IntoIterator for NotSatisfiable {
    type Item = Constraint;
    type IntoIter = std::vec::IntoIter<Constraint>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
