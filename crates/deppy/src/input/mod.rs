//! Wire-shape constraints and the builders that materialize them.
//!
//! A [`ConstraintSpec`] is the exchange form of a constraint: either an
//! explicit leaf (`mandatory`, `prohibited`, `conflict`, `dependency`,
//! `atMost`) or a builder (`filter`, `groupBy`, `forEach`) that queries the
//! universe through expressions and binds identifiers into a copy of its
//! inner template. Expanding an explicit leaf is the identity, so builder
//! expansion is a fixed point.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityUniverse, Identifier};
use crate::error::SolveError;
use crate::expr::{GroupByExpression, SelectorExpression, SortExpression};
use crate::solver::Constraint;

/// The serialized form of a constraint or constraint builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConstraintSpec {
    Mandatory {
        subject: Identifier,
    },
    Prohibited {
        subject: Identifier,
    },
    Conflict {
        subject: Identifier,
        ids: Vec<Identifier>,
    },
    Dependency {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<Identifier>,
        #[serde(default)]
        ids: Vec<Identifier>,
    },
    AtMost {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<Identifier>,
        /// The bound, carried as a string on the wire.
        limit: String,
        #[serde(default)]
        ids: Vec<Identifier>,
    },
    Filter {
        filter: SelectorExpression,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sort: Option<SortExpression>,
        constraint: Box<ConstraintSpec>,
    },
    #[serde(rename_all = "camelCase")]
    GroupBy {
        group_by: GroupByExpression,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sort: Option<SortExpression>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject_format: Option<String>,
        constraint: Box<ConstraintSpec>,
    },
    #[serde(rename_all = "camelCase")]
    ForEach {
        filter: SelectorExpression,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject_format: Option<String>,
        constraint: Box<ConstraintSpec>,
    },
}

impl ConstraintSpec {
    /// Materialize this spec against the universe.
    ///
    /// Explicit leaves convert directly; builders select, sort, and bind
    /// per-invocation deep copies of their inner template. Builders never
    /// mutate the universe, and expression failures abort the solve.
    pub fn to_constraints(
        &self,
        universe: &EntityUniverse,
    ) -> Result<Vec<Constraint>, SolveError> {
        match self {
            ConstraintSpec::Mandatory { subject } => {
                Ok(vec![Constraint::mandatory(subject.clone())])
            }
            ConstraintSpec::Prohibited { subject } => {
                Ok(vec![Constraint::prohibited(subject.clone())])
            }
            ConstraintSpec::Conflict { subject, ids } => Ok(ids
                .iter()
                .map(|other| Constraint::conflict(subject.clone(), other.clone()))
                .collect()),
            ConstraintSpec::Dependency { subject, ids } => {
                let Some(subject) = subject else {
                    return Err(SolveError::BuilderExpansion(
                        "a dependency constraint requires a subject".to_string(),
                    ));
                };
                Ok(vec![Constraint::dependency(subject.clone(), ids.clone())])
            }
            ConstraintSpec::AtMost {
                subject,
                limit,
                ids,
            } => {
                let limit: usize = limit.trim().parse().map_err(|_| {
                    SolveError::BuilderExpansion(format!(
                        "invalid atMost limit {limit:?}: expected a non-negative integer"
                    ))
                })?;
                Ok(vec![Constraint::AtMost {
                    subject: subject.clone(),
                    limit,
                    ids: ids.clone(),
                }])
            }
            ConstraintSpec::Filter {
                filter,
                sort,
                constraint,
            } => {
                let mut selected = select(universe, filter)?;
                if let Some(sort) = sort {
                    sort.sort(&mut selected)?;
                }
                let ids: Vec<Identifier> = selected.iter().map(|e| e.id.clone()).collect();
                let mut inner = (**constraint).clone();
                inner.bind_ids(ids)?;
                inner.to_constraints(universe)
            }
            ConstraintSpec::GroupBy {
                group_by,
                sort,
                subject_format,
                constraint,
            } => {
                // An entity can produce several keys and belong to several
                // buckets; buckets keep first-seen key order.
                let mut buckets: IndexMap<String, Vec<&Entity>> = IndexMap::new();
                for entity in universe.entities() {
                    for key in group_by.evaluate(entity)? {
                        buckets.entry(key).or_default().push(entity);
                    }
                }
                let mut out = Vec::new();
                for (key, mut members) in buckets {
                    if let Some(sort) = sort {
                        sort.sort(&mut members)?;
                    }
                    let ids: Vec<Identifier> = members.iter().map(|e| e.id.clone()).collect();
                    let mut inner = (**constraint).clone();
                    inner.bind_subject(format_subject(subject_format.as_deref(), &key))?;
                    inner.bind_ids(ids)?;
                    out.extend(inner.to_constraints(universe)?);
                }
                Ok(out)
            }
            ConstraintSpec::ForEach {
                filter,
                subject_format,
                constraint,
            } => {
                let selected = select(universe, filter)?;
                let mut out = Vec::new();
                for entity in selected {
                    let mut inner = (**constraint).clone();
                    inner.bind_subject(format_subject(
                        subject_format.as_deref(),
                        entity.id.as_str(),
                    ))?;
                    out.extend(inner.to_constraints(universe)?);
                }
                Ok(out)
            }
        }
    }

    /// Bind a selected id list into this template.
    fn bind_ids(&mut self, bound: Vec<Identifier>) -> Result<(), SolveError> {
        match self {
            ConstraintSpec::Dependency { ids, .. } | ConstraintSpec::AtMost { ids, .. } => {
                *ids = bound;
                Ok(())
            }
            other => Err(SolveError::BuilderExpansion(format!(
                "cannot bind an id list into a {} constraint",
                other.kind()
            ))),
        }
    }

    /// Bind a derived subject into this template.
    fn bind_subject(&mut self, bound: Identifier) -> Result<(), SolveError> {
        match self {
            ConstraintSpec::Mandatory { subject }
            | ConstraintSpec::Prohibited { subject }
            | ConstraintSpec::Conflict { subject, .. } => {
                *subject = bound;
                Ok(())
            }
            ConstraintSpec::Dependency { subject, .. }
            | ConstraintSpec::AtMost { subject, .. } => {
                *subject = Some(bound);
                Ok(())
            }
            other => Err(SolveError::BuilderExpansion(format!(
                "cannot bind a subject into a {} constraint",
                other.kind()
            ))),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ConstraintSpec::Mandatory { .. } => "mandatory",
            ConstraintSpec::Prohibited { .. } => "prohibited",
            ConstraintSpec::Conflict { .. } => "conflict",
            ConstraintSpec::Dependency { .. } => "dependency",
            ConstraintSpec::AtMost { .. } => "atMost",
            ConstraintSpec::Filter { .. } => "filter",
            ConstraintSpec::GroupBy { .. } => "groupBy",
            ConstraintSpec::ForEach { .. } => "forEach",
        }
    }
}

/// Expand every top-level constraint of the universe, in input order.
pub(crate) fn expand(universe: &EntityUniverse) -> Result<Vec<Constraint>, SolveError> {
    let mut out = Vec::new();
    for spec in universe.constraints() {
        let constraints = spec.to_constraints(universe)?;
        log::debug!(
            "expanded a {} constraint into {} solver constraints",
            spec.kind(),
            constraints.len()
        );
        out.extend(constraints);
    }
    Ok(out)
}

fn select<'a>(
    universe: &'a EntityUniverse,
    filter: &SelectorExpression,
) -> Result<Vec<&'a Entity>, SolveError> {
    let mut selected = Vec::new();
    for entity in universe.entities() {
        if filter.evaluate(entity)? {
            selected.push(entity);
        }
    }
    Ok(selected)
}

/// Apply the single-placeholder subject template; without a template the
/// key itself is the subject.
fn format_subject(format: Option<&str>, key: &str) -> Identifier {
    match format {
        Some(format) => Identifier::from(format.replacen("{}", key, 1)),
        None => Identifier::from(key),
    }
}
