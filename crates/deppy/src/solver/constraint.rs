use std::fmt;

use crate::entity::Identifier;
use crate::sat::Lit;

use super::lit_mapping::LitMapping;

/// A concrete solver constraint over identifiers.
///
/// Constraints carry identifiers rather than entity references; the literal
/// mapping is the only place an identifier is resolved to a SAT variable.
/// All payloads are plain data, so a deep copy is a structural clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// The subject must appear in the solution. The only anchor.
    Mandatory { subject: Identifier },
    /// The subject must not appear in the solution.
    Prohibited { subject: Identifier },
    /// The subject and the other identifier cannot both appear.
    Conflict {
        subject: Identifier,
        other: Identifier,
    },
    /// If the subject appears, at least one candidate must too. Candidate
    /// order is a preference: earlier entries are tried first.
    Dependency {
        subject: Identifier,
        candidates: Vec<Identifier>,
    },
    /// At most `limit` of the listed identifiers may appear. The optional
    /// subject is attribution only; an at-most is never an anchor.
    AtMost {
        subject: Option<Identifier>,
        limit: usize,
        ids: Vec<Identifier>,
    },
    And(Vec<Constraint>),
    Or(Vec<Constraint>),
    Not(Box<Constraint>),
}

impl Constraint {
    pub fn mandatory(subject: impl Into<Identifier>) -> Self {
        Constraint::Mandatory {
            subject: subject.into(),
        }
    }

    pub fn prohibited(subject: impl Into<Identifier>) -> Self {
        Constraint::Prohibited {
            subject: subject.into(),
        }
    }

    pub fn conflict(subject: impl Into<Identifier>, other: impl Into<Identifier>) -> Self {
        Constraint::Conflict {
            subject: subject.into(),
            other: other.into(),
        }
    }

    pub fn dependency(
        subject: impl Into<Identifier>,
        candidates: impl IntoIterator<Item = impl Into<Identifier>>,
    ) -> Self {
        Constraint::Dependency {
            subject: subject.into(),
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }

    pub fn at_most(
        limit: usize,
        ids: impl IntoIterator<Item = impl Into<Identifier>>,
    ) -> Self {
        Constraint::AtMost {
            subject: None,
            limit,
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn at_most_for(
        subject: impl Into<Identifier>,
        limit: usize,
        ids: impl IntoIterator<Item = impl Into<Identifier>>,
    ) -> Self {
        Constraint::AtMost {
            subject: Some(subject.into()),
            limit,
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Identifiers whose literals must exist before this constraint is
    /// encoded; for a dependency these are its candidates, in preference
    /// order.
    pub fn order(&self) -> &[Identifier] {
        match self {
            Constraint::Dependency { candidates, .. } => candidates,
            _ => &[],
        }
    }

    /// Whether this constraint seeds the search frontier.
    pub fn anchor(&self) -> bool {
        matches!(self, Constraint::Mandatory { .. })
    }

    /// The identifier this constraint is attributed to, when any.
    pub fn subject(&self) -> Option<&Identifier> {
        match self {
            Constraint::Mandatory { subject }
            | Constraint::Prohibited { subject }
            | Constraint::Conflict { subject, .. }
            | Constraint::Dependency { subject, .. } => Some(subject),
            Constraint::AtMost { subject, .. } => subject.as_ref(),
            Constraint::And(_) | Constraint::Or(_) | Constraint::Not(_) => None,
        }
    }

    /// Encode this constraint into the circuit and return its literal.
    ///
    /// The returned literal is assumed (not hard-asserted) by the solve so
    /// unsatisfiable cores can be read back from failed assumptions.
    pub(crate) fn apply(&self, lm: &mut LitMapping) -> Lit {
        match self {
            Constraint::Mandatory { subject } => lm.lit_of(subject),
            Constraint::Prohibited { subject } => lm.lit_of(subject).not(),
            Constraint::Conflict { subject, other } => {
                let terms = [lm.lit_of(subject).not(), lm.lit_of(other).not()];
                lm.circuit_or(&terms)
            }
            Constraint::Dependency {
                subject,
                candidates,
            } => {
                let mut terms: Vec<Lit> = candidates.iter().map(|d| lm.lit_of(d)).collect();
                terms.push(lm.lit_of(subject).not());
                lm.circuit_or(&terms)
            }
            Constraint::AtMost { limit, ids, .. } => {
                let terms: Vec<Lit> = ids.iter().map(|d| lm.lit_of(d)).collect();
                lm.circuit_at_most(*limit, &terms)
            }
            Constraint::And(inner) => {
                let terms: Vec<Lit> = inner.iter().map(|c| c.apply(lm)).collect();
                lm.circuit_and(&terms)
            }
            Constraint::Or(inner) => {
                let terms: Vec<Lit> = inner.iter().map(|c| c.apply(lm)).collect();
                lm.circuit_or(&terms)
            }
            Constraint::Not(inner) => inner.apply(lm).not(),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Mandatory { subject } => write!(f, "{subject} is mandatory"),
            Constraint::Prohibited { subject } => write!(f, "{subject} is prohibited"),
            Constraint::Conflict { subject, other } => {
                write!(f, "{subject} conflicts with {other}")
            }
            Constraint::Dependency {
                subject,
                candidates,
            } => {
                if candidates.is_empty() {
                    write!(
                        f,
                        "{subject} has a dependency without any candidates to satisfy it"
                    )
                } else {
                    write!(
                        f,
                        "{subject} requires at least one of {}",
                        join(candidates)
                    )
                }
            }
            Constraint::AtMost { limit, ids, .. } => {
                write!(f, "at most {limit} of {} are permitted", join(ids))
            }
            Constraint::And(inner) => {
                write!(f, "{} are required", join_with(inner, " and "))
            }
            Constraint::Or(inner) => {
                write!(f, "{} are required", join_with(inner, " or "))
            }
            Constraint::Not(inner) => write!(f, "not {inner}"),
        }
    }
}

fn join(ids: &[Identifier]) -> String {
    ids.iter()
        .map(Identifier::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_with(inner: &[Constraint], separator: &str) -> String {
    inner
        .iter()
        .map(Constraint::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}
