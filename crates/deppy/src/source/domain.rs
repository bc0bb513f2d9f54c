//! The domain adapter: structural invariants that hold for every solve,
//! regardless of user requirements.

use crate::error::SolveError;
use crate::expr::GroupByExpression;
use crate::input::ConstraintSpec;

use super::EntitySource;

/// Emits the two uniqueness invariants of the domain: at most one entity
/// per provided Group/Version/Kind, and at most one entity per package.
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainSource;

impl EntitySource for DomainSource {
    fn constraints(&self) -> Result<Vec<ConstraintSpec>, SolveError> {
        Ok(vec![
            at_most_one_per(r#"Entity.Properties["gvk"]"#),
            at_most_one_per(r#"Entity.Properties["package"]"#),
        ])
    }
}

fn at_most_one_per(group_by: &str) -> ConstraintSpec {
    ConstraintSpec::GroupBy {
        group_by: GroupByExpression::new(group_by),
        sort: None,
        subject_format: Some("{}-uniqueness".to_string()),
        constraint: Box::new(ConstraintSpec::AtMost {
            subject: None,
            limit: "1".to_string(),
            ids: Vec::new(),
        }),
    }
}
