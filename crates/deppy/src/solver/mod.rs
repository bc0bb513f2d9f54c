//! The resolution driver.
//!
//! A [`Solver`] owns a frozen universe and runs the full pipeline: builder
//! expansion, CNF encoding, the preference-ordered search, and a final
//! size-minimization pass. Every call to [`Solver::solve`] resolves from
//! scratch; the literal mapping, circuit, and SAT state live only for the
//! duration of one call.

mod constraint;
mod lit_mapping;
mod search;
mod tracer;

#[cfg(test)]
mod tests;

pub use constraint::Constraint;
pub use tracer::{DefaultTracer, LoggingTracer, TraceEvent, Tracer};

use std::fmt;

use indexmap::IndexSet;

use crate::cancel::CancelToken;
use crate::entity::{Entity, EntityUniverse, Identifier};
use crate::error::{NotSatisfiable, SolveError};
use crate::input::{self, ConstraintSpec};
use crate::sat::{Backend, Lit, SatSolver};
use crate::source::{self, EntitySource};

use lit_mapping::LitMapping;
use search::Search;

/// Resolves a universe of entities and constraints into a selection.
pub struct Solver {
    universe: EntityUniverse,
    tracer: Box<dyn Tracer>,
}

impl fmt::Debug for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Solver")
            .field("universe", &self.universe)
            .finish()
    }
}

impl Solver {
    /// Build a solver from entities and top-level constraints.
    ///
    /// Fails with [`SolveError::DuplicateIdentifier`] when two entities
    /// share an identifier.
    pub fn new(
        entities: Vec<Entity>,
        constraints: Vec<ConstraintSpec>,
    ) -> Result<Self, SolveError> {
        Solver::builder().with_input(entities, constraints).build()
    }

    pub fn builder() -> SolverBuilder {
        SolverBuilder::default()
    }

    pub fn universe(&self) -> &EntityUniverse {
        &self.universe
    }

    /// Resolve the universe into the selected entities.
    ///
    /// The selection is deterministic for a given input: identical
    /// universe, constraint order, and expression outputs produce an
    /// identical selection or an identical error.
    pub fn solve(&mut self, cancel: &CancelToken) -> Result<Vec<Entity>, SolveError> {
        let constraints = input::expand(&self.universe)?;
        log::debug!(
            "solving over {} entities and {} constraints",
            self.universe.entities().len(),
            constraints.len()
        );
        let selected = resolve(
            &self.universe,
            constraints,
            self.tracer.as_mut(),
            cancel,
        )?;
        let selected: IndexSet<Identifier> = selected.into_iter().collect();
        log::debug!("selected {} identifiers", selected.len());
        Ok(self
            .universe
            .entities()
            .iter()
            .filter(|entity| selected.contains(&entity.id))
            .cloned()
            .collect())
    }
}

/// Run one solve over already-expanded constraints, returning every
/// selected identifier (virtual subjects included).
fn resolve(
    universe: &EntityUniverse,
    constraints: Vec<Constraint>,
    tracer: &mut dyn Tracer,
    cancel: &CancelToken,
) -> Result<Vec<Identifier>, SolveError> {
    let mut lm = LitMapping::new(universe.entities(), constraints);
    let mut sat = SatSolver::new();
    lm.add_clauses(&mut sat);

    // Constraints are assumed rather than asserted so that an
    // unsatisfiable outcome maps failed assumptions back to the offending
    // constraints.
    lm.assume_constraints(&mut sat);
    let mut result = sat.test();
    let mut assumptions: Vec<Lit> = Vec::new();

    if result >= 0 {
        let anchors = lm.anchor_literals();
        let search = Search::new(&mut sat, &lm, tracer);
        match search.run(cancel, &anchors) {
            Ok(outcome) => {
                result = outcome.result;
                assumptions = outcome.assumptions;
            }
            Err(err) => {
                sat.untest_all();
                return Err(err);
            }
        }
    }

    if result < 0 {
        return Err(NotSatisfiable(lm.conflicts(sat.why())).into());
    }
    if result == 0 {
        result = sat.solve();
        if result < 0 {
            return Err(NotSatisfiable(lm.conflicts(sat.why())).into());
        }
    }

    minimize(cancel, &mut lm, &mut sat, &assumptions)?;

    if let Some(err) = lm.take_error() {
        return Err(err);
    }
    Ok(lm.selection(&sat))
}

/// Shrink the model to the smallest number of entities not chosen by the
/// search, keeping every search decision: preference trumps cardinality,
/// but nothing rides along for free.
fn minimize(
    cancel: &CancelToken,
    lm: &mut LitMapping,
    sat: &mut SatSolver,
    assumptions: &[Lit],
) -> Result<(), SolveError> {
    let chosen: IndexSet<Lit> = assumptions.iter().copied().collect();
    let mut extras = Vec::new();
    let mut excluded = Vec::new();
    for m in lm.identifier_literals() {
        if chosen.contains(&m) {
            continue;
        }
        if sat.value(m) {
            extras.push(m);
        } else {
            excluded.push(m.not());
        }
    }
    if extras.is_empty() {
        return Ok(());
    }
    log::debug!("minimizing {} unchosen selections", extras.len());

    sat.untest_all();
    let sorter = lm.cardinality_constrainer(sat, &extras);
    for &m in assumptions {
        sat.assume(m);
    }
    for &m in &excluded {
        sat.assume(m);
    }
    lm.assume_constraints(sat);
    if sat.test() < 0 {
        return Err(SolveError::Internal(
            "model lost while preparing cardinality minimization".to_string(),
        ));
    }

    for bound in 0..=sorter.n() {
        if cancel.is_cancelled() {
            sat.untest_all();
            return Err(SolveError::Cancelled);
        }
        sat.assume(sorter.leq(bound));
        let mut result = sat.test();
        if result == 0 {
            result = sat.solve();
        }
        if result > 0 {
            return Ok(());
        }
        sat.untest();
    }
    // The unbounded pass is a tautology, so this is unreachable for a
    // consistent mapping.
    Err(SolveError::Internal(
        "cardinality minimization found no model".to_string(),
    ))
}

/// Fluent construction for [`Solver`], mirroring the driver entry points:
/// input, optional sources, and an optional tracer.
#[derive(Default)]
pub struct SolverBuilder {
    entities: Vec<Entity>,
    constraints: Vec<ConstraintSpec>,
    tracer: Option<Box<dyn Tracer>>,
}

impl SolverBuilder {
    /// Provide entities and top-level constraints directly.
    pub fn with_input(
        mut self,
        entities: Vec<Entity>,
        constraints: Vec<ConstraintSpec>,
    ) -> Self {
        self.entities.extend(entities);
        self.constraints.extend(constraints);
        self
    }

    /// Append the output of an entity source. Sources compose by
    /// concatenation; their order extends the anchor order.
    pub fn with_source(mut self, source: &dyn EntitySource) -> Result<Self, SolveError> {
        let (entities, constraints) = source::collect(&[source])?;
        self.entities.extend(entities);
        self.constraints.extend(constraints);
        Ok(self)
    }

    /// Install a sink receiving one trace event per branch decision.
    pub fn with_tracer(mut self, tracer: impl Tracer + 'static) -> Self {
        self.tracer = Some(Box::new(tracer));
        self
    }

    pub fn build(self) -> Result<Solver, SolveError> {
        let universe = EntityUniverse::new(self.entities, self.constraints)?;
        Ok(Solver {
            universe,
            tracer: self.tracer.unwrap_or_else(|| Box::new(DefaultTracer)),
        })
    }
}
