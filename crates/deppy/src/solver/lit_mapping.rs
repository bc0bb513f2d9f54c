use std::cell::RefCell;

use indexmap::{IndexMap, IndexSet};

use crate::entity::{Entity, Identifier};
use crate::error::SolveError;
use crate::sat::{Backend, CardSort, Circuit, Lit, SatSolver};

use super::constraint::Constraint;

/// Translation tables between identifiers/constraints and SAT literals.
///
/// The mapping owns the circuit: constraint encoding allocates literals on
/// demand and records, for every applied constraint, its output literal and
/// its subject. Those tables drive conflict extraction and the search
/// engine's frontier expansion. The mapping lives only for the duration of
/// one solve.
pub(crate) struct LitMapping {
    circuit: Circuit,
    lits: IndexMap<Identifier, Lit>,
    /// Applied constraints with their output literals, in application order.
    applied: Vec<(Lit, Constraint)>,
    /// Output literal to the first constraint application producing it.
    by_lit: IndexMap<Lit, usize>,
    /// Subject literal to the constraints attributed to it.
    by_subject: IndexMap<Lit, Vec<usize>>,
    /// Anchor subjects in universe insertion order, virtuals after.
    anchors: Vec<Identifier>,
    /// Internal inconsistencies, surfaced in aggregate after the solve.
    errs: RefCell<Vec<String>>,
}

impl LitMapping {
    /// Encode constraints into a fresh circuit and build the lookup tables.
    ///
    /// Anchor order is the determinism anchor of the whole solve: entities
    /// referenced by an anchor constraint appear in universe insertion
    /// order, followed by virtual anchor subjects in constraint order.
    pub fn new(entities: &[Entity], constraints: Vec<Constraint>) -> Self {
        let mut lm = LitMapping {
            circuit: Circuit::new(),
            lits: IndexMap::new(),
            applied: Vec::with_capacity(constraints.len()),
            by_lit: IndexMap::new(),
            by_subject: IndexMap::new(),
            anchors: Vec::new(),
            errs: RefCell::new(Vec::new()),
        };

        for constraint in constraints {
            let m = constraint.apply(&mut lm);
            let idx = lm.applied.len();
            if let Some(subject) = constraint.subject() {
                let s = lm.lit_of(subject);
                lm.by_subject.entry(s).or_default().push(idx);
            }
            lm.by_lit.entry(m).or_insert(idx);
            lm.applied.push((m, constraint));
        }

        let anchor_subjects: IndexSet<&Identifier> = lm
            .applied
            .iter()
            .filter(|(_, c)| c.anchor())
            .filter_map(|(_, c)| c.subject())
            .collect();
        let mut anchors: Vec<Identifier> = Vec::with_capacity(anchor_subjects.len());
        for entity in entities {
            if anchor_subjects.contains(&entity.id) {
                anchors.push(entity.id.clone());
            }
        }
        for &subject in &anchor_subjects {
            if !anchors.contains(subject) {
                anchors.push(subject.clone());
            }
        }
        lm.anchors = anchors;
        lm
    }

    /// The positive literal for an identifier, allocated on demand.
    pub fn lit_of(&mut self, id: &Identifier) -> Lit {
        if let Some(&m) = self.lits.get(id) {
            return m;
        }
        let m = self.circuit.new_lit();
        self.lits.insert(id.clone(), m);
        m
    }

    fn lit_of_existing(&self, id: &Identifier) -> Option<Lit> {
        self.lits.get(id).copied()
    }

    pub fn circuit_or(&mut self, terms: &[Lit]) -> Lit {
        self.circuit.or(terms)
    }

    pub fn circuit_and(&mut self, terms: &[Lit]) -> Lit {
        self.circuit.and(terms)
    }

    pub fn circuit_at_most(&mut self, limit: usize, terms: &[Lit]) -> Lit {
        self.circuit.card_sort(terms).leq(limit)
    }

    /// Feed the circuit's CNF into the backend.
    pub fn add_clauses(&mut self, sat: &mut SatSolver) {
        self.circuit.flush_into(sat);
    }

    /// Queue every applied constraint literal as an assumption.
    pub fn assume_constraints(&self, sat: &mut impl Backend) {
        for &(m, _) in &self.applied {
            sat.assume(m);
        }
    }

    /// Build a sorting network over `terms` for size minimization, teaching
    /// any new clauses to the backend.
    pub fn cardinality_constrainer(&mut self, sat: &mut SatSolver, terms: &[Lit]) -> CardSort {
        let sorter = self.circuit.card_sort(terms);
        self.circuit.flush_into(sat);
        sorter
    }

    /// Identifiers referenced by at least one anchor constraint.
    pub fn anchor_identifiers(&self) -> &[Identifier] {
        &self.anchors
    }

    /// The literals of the anchor identifiers, in anchor order.
    pub fn anchor_literals(&self) -> Vec<Lit> {
        self.anchors
            .iter()
            .filter_map(|id| {
                let m = self.lit_of_existing(id);
                if m.is_none() {
                    self.record_err(format!("no literal allocated for anchor {id}"));
                }
                m
            })
            .collect()
    }

    /// The constraint whose application produced the literal.
    pub fn constraint_of(&self, m: Lit) -> Option<&Constraint> {
        match self.by_lit.get(&m) {
            Some(&idx) => Some(&self.applied[idx].1),
            None => {
                self.record_err(format!("no constraint corresponding to literal {m:?}"));
                None
            }
        }
    }

    /// For every dependency constraint attributed to the subject literal,
    /// its candidate literals in preference order. Dependencies without
    /// candidates are omitted; their clause alone forbids the subject.
    pub fn dependency_candidates(&self, subject: Lit) -> Vec<Vec<Lit>> {
        let Some(indices) = self.by_subject.get(&subject) else {
            return Vec::new();
        };
        let mut frames = Vec::new();
        for &idx in indices {
            let Constraint::Dependency { candidates, .. } = &self.applied[idx].1 else {
                continue;
            };
            if candidates.is_empty() {
                continue;
            }
            let mut lits = Vec::with_capacity(candidates.len());
            for id in candidates {
                match self.lit_of_existing(id) {
                    Some(m) => lits.push(m),
                    None => {
                        self.record_err(format!("no literal allocated for candidate {id}"))
                    }
                }
            }
            frames.push(lits);
        }
        frames
    }

    /// Map a failed-assumption core back to constraints, deduplicated and
    /// ordered by constraint application order so reports are stable.
    pub fn conflicts(&self, core: &[Lit]) -> Vec<Constraint> {
        let mut indices: Vec<usize> = core
            .iter()
            .filter_map(|&m| self.by_lit.get(&m).copied())
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
            .into_iter()
            .map(|idx| self.applied[idx].1.clone())
            .collect()
    }

    /// Identifiers whose literal is true in the backend's model.
    pub fn selection(&self, sat: &impl Backend) -> Vec<Identifier> {
        self.lits
            .iter()
            .filter(|(_, &m)| sat.value(m))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// The identifier owning a literal, for tracing.
    pub fn identifier_of(&self, m: Lit) -> Option<&Identifier> {
        self.lits
            .iter()
            .find(|(_, &lit)| lit == m)
            .map(|(id, _)| id)
    }

    /// Every identifier literal, in first-reference order.
    pub fn identifier_literals(&self) -> Vec<Lit> {
        self.lits.values().copied().collect()
    }

    fn record_err(&self, message: String) {
        self.errs.borrow_mut().push(message);
    }

    /// The aggregate internal error, if any inconsistency was observed.
    pub fn take_error(&mut self) -> Option<SolveError> {
        let errs = std::mem::take(&mut *self.errs.borrow_mut());
        if errs.is_empty() {
            return None;
        }
        Some(SolveError::Internal(format!(
            "{} errors encountered: {}",
            errs.len(),
            errs.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entities(ids: &[&str]) -> Vec<Entity> {
        ids.iter().map(|id| Entity::new(*id)).collect()
    }

    #[test]
    fn test_lit_allocation_is_stable() {
        let mut lm = LitMapping::new(&[], Vec::new());
        let a = lm.lit_of(&"a".into());
        let b = lm.lit_of(&"b".into());
        assert_ne!(a, b);
        assert_eq!(lm.lit_of(&"a".into()), a);
    }

    #[test]
    fn test_anchor_order_follows_universe_insertion() {
        let universe = entities(&["b", "a"]);
        let lm = LitMapping::new(
            &universe,
            vec![
                Constraint::mandatory("a"),
                Constraint::mandatory("b"),
                Constraint::mandatory("virtual-subject"),
            ],
        );
        // Entities in universe order first, then the virtual subject.
        assert_eq!(
            lm.anchor_identifiers(),
            &[
                Identifier::from("b"),
                Identifier::from("a"),
                Identifier::from("virtual-subject")
            ]
        );
        assert_eq!(lm.anchor_literals().len(), 3);
    }

    #[test]
    fn test_duplicate_anchor_subjects_collapse() {
        let universe = entities(&["a"]);
        let lm = LitMapping::new(
            &universe,
            vec![Constraint::mandatory("a"), Constraint::mandatory("a")],
        );
        assert_eq!(lm.anchor_identifiers(), &[Identifier::from("a")]);
    }

    #[test]
    fn test_dependency_candidates_in_order() {
        let universe = entities(&["a", "x", "y"]);
        let mut lm = LitMapping::new(
            &universe,
            vec![
                Constraint::mandatory("a"),
                Constraint::dependency("a", ["x", "y"]),
                Constraint::dependency("a", Vec::<&str>::new()),
            ],
        );
        let a = lm.lit_of(&"a".into());
        let x = lm.lit_of(&"x".into());
        let y = lm.lit_of(&"y".into());
        // The empty dependency contributes no frame.
        assert_eq!(lm.dependency_candidates(a), vec![vec![x, y]]);
    }

    #[test]
    fn test_conflicts_ordered_and_deduplicated() {
        let universe = entities(&["a", "b"]);
        let mut lm = LitMapping::new(
            &universe,
            vec![Constraint::mandatory("a"), Constraint::prohibited("a")],
        );
        let a = lm.lit_of(&"a".into());
        // Core arrives in trail order; output follows application order.
        let conflicts = lm.conflicts(&[a.not(), a, a]);
        assert_eq!(
            conflicts,
            vec![Constraint::mandatory("a"), Constraint::prohibited("a")]
        );
    }

    #[test]
    fn test_missing_reverse_lookup_accumulates_internal_error() {
        let mut lm = LitMapping::new(&[], vec![Constraint::mandatory("a")]);
        let unknown = Lit::positive(999);
        assert!(lm.constraint_of(unknown).is_none());
        match lm.take_error() {
            Some(SolveError::Internal(msg)) => {
                assert!(msg.contains("1 errors encountered"))
            }
            other => panic!("expected internal error, found {other:?}"),
        }
        assert!(lm.take_error().is_none());
    }
}
