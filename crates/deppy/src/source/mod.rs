//! Entity sources: read-only producers of entities and top-level
//! constraints.
//!
//! The core composes sources by concatenation, so source order extends the
//! anchor order of the solve. Three canonical adapters are provided: the
//! [`catalog::CatalogSource`] for packaged artifacts, the
//! [`domain::DomainSource`] for uniqueness invariants, and the
//! [`requirements::RequirementsSource`] for user-supplied constraints.

pub mod catalog;
pub mod domain;
pub mod requirements;

use crate::entity::Entity;
use crate::error::SolveError;
use crate::input::ConstraintSpec;

/// A read-only producer of entities and top-level constraints.
pub trait EntitySource {
    fn entities(&self) -> Result<Vec<Entity>, SolveError> {
        Ok(Vec::new())
    }

    fn constraints(&self) -> Result<Vec<ConstraintSpec>, SolveError> {
        Ok(Vec::new())
    }
}

/// Concatenate the output of several sources, in order.
pub fn collect(
    sources: &[&dyn EntitySource],
) -> Result<(Vec<Entity>, Vec<ConstraintSpec>), SolveError> {
    let mut entities = Vec::new();
    let mut constraints = Vec::new();
    for source in sources {
        entities.extend(source.entities()?);
        constraints.extend(source.constraints()?);
    }
    Ok((entities, constraints))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EntitiesOnly;

    impl EntitySource for EntitiesOnly {
        fn entities(&self) -> Result<Vec<Entity>, SolveError> {
            Ok(vec![Entity::new("a"), Entity::new("b")])
        }
    }

    struct ConstraintsOnly;

    impl EntitySource for ConstraintsOnly {
        fn constraints(&self) -> Result<Vec<ConstraintSpec>, SolveError> {
            Ok(vec![ConstraintSpec::Mandatory {
                subject: "a".into(),
            }])
        }
    }

    #[test]
    fn test_collect_concatenates_in_order() {
        let (entities, constraints) =
            collect(&[&EntitiesOnly, &ConstraintsOnly]).unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].id.as_str(), "a");
        assert_eq!(constraints.len(), 1);
    }
}
