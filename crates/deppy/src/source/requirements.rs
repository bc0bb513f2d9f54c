//! The requirements adapter: user-supplied constraints, passed through
//! verbatim, plus helpers that synthesize the common request shapes.

use crate::entity::Identifier;
use crate::error::SolveError;
use crate::input::ConstraintSpec;

use super::catalog::{package_channel_selector, preference_comparator};
use super::EntitySource;

/// Emits user-supplied constraints unchanged.
#[derive(Debug, Clone, Default)]
pub struct RequirementsSource {
    constraints: Vec<ConstraintSpec>,
}

impl RequirementsSource {
    pub fn new(constraints: Vec<ConstraintSpec>) -> Self {
        Self { constraints }
    }

    /// The constraints requesting one package: a mandatory virtual subject
    /// plus a filter-built dependency from that subject onto the matching
    /// entities, preferred by channel and version. An empty channel means
    /// any channel.
    pub fn require_package(
        package: &str,
        version_range: &str,
        channel: &str,
    ) -> Vec<ConstraintSpec> {
        let subject = requirement_subject(&["require", package, version_range, channel]);
        vec![
            ConstraintSpec::Mandatory {
                subject: subject.clone(),
            },
            ConstraintSpec::Filter {
                filter: package_channel_selector(package, version_range, channel),
                sort: Some(preference_comparator()),
                constraint: Box::new(ConstraintSpec::Dependency {
                    subject: Some(subject),
                    ids: Vec::new(),
                }),
            },
        ]
    }
}

impl EntitySource for RequirementsSource {
    fn constraints(&self) -> Result<Vec<ConstraintSpec>, SolveError> {
        Ok(self.constraints.clone())
    }
}

/// Join the parts into a virtual identifier, dropping whitespace so range
/// syntax cannot leak separators into the name.
fn requirement_subject(parts: &[&str]) -> Identifier {
    let joined = parts
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("-");
    Identifier::from(
        joined
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>(),
    )
}
