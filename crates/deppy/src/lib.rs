//! Deppy: a declarative constraint engine for package dependency
//! resolution.
//!
//! Given a universe of candidate artifacts and a set of boolean and
//! cardinal constraints over their properties, deppy computes a minimal
//! satisfying selection using a backtracking SAT search with
//! preference-ordered branching.
//!
//! # Architecture
//!
//! The engine consists of three tightly coupled subsystems:
//!
//! - **Constraint model** ([`input`], [`solver::Constraint`]): a closed
//!   algebra of constraints (mandatory, prohibited, conflict, dependency,
//!   at-most, and logical combinators) over opaque identifiers, plus
//!   higher-order builders that materialize constraints by querying the
//!   universe through a small expression language ([`expr`]).
//! - **Literal mapping**: translation of identifiers and constraints to
//!   SAT literals, with Tseitin CNF encoding and cardinality sorting
//!   networks.
//! - **Preference-ordered search**: a CDCL-assisted branch loop over
//!   anchor-rooted dependency subtrees that prefers earlier-listed
//!   dependencies, minimizes installation size subject to those
//!   preferences, and reports unsatisfiable cores.
//!
//! # Example
//!
//! ```
//! use deppy::{CancelToken, ConstraintSpec, Entity, Solver};
//!
//! let entities = vec![Entity::new("a"), Entity::new("b")];
//! let constraints = vec![
//!     ConstraintSpec::Mandatory { subject: "b".into() },
//!     ConstraintSpec::Dependency {
//!         subject: Some("b".into()),
//!         ids: vec!["a".into()],
//!     },
//! ];
//!
//! let mut solver = Solver::new(entities, constraints).unwrap();
//! let selection = solver.solve(&CancelToken::never()).unwrap();
//! let ids: Vec<&str> = selection.iter().map(|e| e.id.as_str()).collect();
//! assert_eq!(ids, ["a", "b"]);
//! ```

pub mod cancel;
pub mod entity;
pub mod error;
pub mod expr;
pub mod input;
mod sat;
pub mod solver;
pub mod source;

pub use cancel::CancelToken;
pub use entity::{Entity, EntityUniverse, Identifier};
pub use error::{ExprError, NotSatisfiable, SolveError};
pub use expr::{GroupByExpression, SelectorExpression, SortExpression};
pub use input::ConstraintSpec;
pub use solver::{Constraint, DefaultTracer, LoggingTracer, Solver, SolverBuilder, Tracer};
pub use source::EntitySource;
