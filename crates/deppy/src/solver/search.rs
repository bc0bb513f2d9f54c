use std::collections::VecDeque;

use indexmap::IndexSet;

use crate::cancel::CancelToken;
use crate::entity::Identifier;
use crate::error::SolveError;
use crate::sat::{Backend, Lit, ProbeResult};

use super::lit_mapping::LitMapping;
use super::tracer::{TraceEvent, Tracer};

/// A pending dependency frame: the candidates of one dependency
/// constraint, in preference order.
#[derive(Debug)]
struct Choice {
    id: u64,
    subject: Lit,
    candidates: Vec<Lit>,
    /// Next candidate index to try.
    index: usize,
}

/// A committed decision: either a candidate assumption holding one scope,
/// or a frame satisfied by an earlier assumption (no scope).
#[derive(Debug)]
struct Guess {
    /// The assumed literal; `None` for a satisfied frame.
    lit: Option<Lit>,
    choice: Choice,
    /// Frames this guess appended to the deque.
    children: Vec<u64>,
}

/// The result of a search: the final probe outcome and the assumptions
/// committed along the way, in decision order. On success the scopes
/// backing those assumptions are left open for the caller.
#[derive(Debug)]
pub(crate) struct SearchOutcome {
    pub result: ProbeResult,
    pub assumptions: Vec<Lit>,
}

/// Preference-ordered branch loop over anchor-rooted dependency subtrees.
///
/// Anchors are assumed in anchor order; each committed literal contributes
/// one frame per dependency constraint, processed first-in first-out so
/// earlier-listed dependencies bind earlier. Within a frame, candidates
/// are tried in argument order; a frame whose candidates already intersect
/// the assumption set is satisfied without a new scope, which lets one
/// entity serve several dependencies.
pub(crate) struct Search<'a, B: Backend> {
    sat: &'a mut B,
    lits: &'a LitMapping,
    tracer: &'a mut dyn Tracer,
    assumptions: IndexSet<Lit>,
    deque: VecDeque<Choice>,
    guesses: Vec<Guess>,
    /// Open probe scopes owned by this search.
    depth: usize,
    next_id: u64,
}

impl<'a, B: Backend> Search<'a, B> {
    pub fn new(sat: &'a mut B, lits: &'a LitMapping, tracer: &'a mut dyn Tracer) -> Self {
        Self {
            sat,
            lits,
            tracer,
            assumptions: IndexSet::new(),
            deque: VecDeque::new(),
            guesses: Vec::new(),
            depth: 0,
            next_id: 0,
        }
    }

    /// Run the search. On an anchor conflict every scope is released and
    /// the failed-assumption core stays readable in the backend. On
    /// cancellation every scope is released and no outcome is reported.
    pub fn run(
        mut self,
        cancel: &CancelToken,
        anchors: &[Lit],
    ) -> Result<SearchOutcome, SolveError> {
        let mut result: ProbeResult = 0;

        for &anchor in anchors {
            self.check_cancelled(cancel)?;
            self.sat.assume(anchor);
            result = self.probe();
            let event = TraceEvent::Anchor {
                depth: self.depth,
                id: self.identifier_of(anchor),
                result,
            };
            self.tracer.trace(&event);
            if result < 0 {
                self.release_scopes();
                return Ok(SearchOutcome {
                    result,
                    assumptions: Vec::new(),
                });
            }
            self.assumptions.insert(anchor);
            self.push_frames(anchor);
        }

        while let Some(choice) = self.deque.pop_front() {
            self.check_cancelled(cancel)?;
            result = self.guess(choice, result);
        }

        Ok(SearchOutcome {
            result,
            assumptions: self.assumptions.iter().copied().collect(),
        })
    }

    /// Process one frame: skip it when satisfied, otherwise assume the
    /// first workable candidate or backtrack.
    fn guess(&mut self, mut choice: Choice, result: ProbeResult) -> ProbeResult {
        if let Some(&satisfied_by) = choice
            .candidates
            .iter()
            .find(|m| self.assumptions.contains(*m))
        {
            let event = TraceEvent::Satisfied {
                depth: self.depth,
                subject: self.identifier_of(choice.subject),
                id: self.identifier_of(satisfied_by),
            };
            self.tracer.trace(&event);
            self.guesses.push(Guess {
                lit: None,
                choice,
                children: Vec::new(),
            });
            return result;
        }

        let mut result = result;
        loop {
            if choice.index >= choice.candidates.len() {
                self.fail_guess(choice);
                // Whatever probes reported inside this frame was retracted;
                // the solve state is undetermined again.
                return 0;
            }
            let m = choice.candidates[choice.index];
            self.sat.assume(m);
            result = self.probe();
            let event = TraceEvent::Candidate {
                depth: self.depth,
                subject: self.identifier_of(choice.subject),
                id: self.identifier_of(m),
                index: choice.index,
                result,
            };
            self.tracer.trace(&event);
            if result >= 0 {
                self.assumptions.insert(m);
                let children = self.push_frames(m);
                self.guesses.push(Guess {
                    lit: Some(m),
                    choice,
                    children,
                });
                return result;
            }
            self.sat.untest();
            self.depth -= 1;
            choice.index += 1;
        }
    }

    /// A frame ran out of candidates: retract the most recent committed
    /// guess and retry it from its next candidate. Satisfied frames popped
    /// on the way are requeued, since their satisfying assumption may be
    /// the one retracted. With nothing to retract the frame is abandoned;
    /// the final solve decides whether the formula truly is unsatisfiable.
    fn fail_guess(&mut self, failed: Choice) {
        let mut requeue: Vec<Choice> = Vec::new();
        loop {
            match self.guesses.pop() {
                None => {
                    for choice in requeue.into_iter().rev() {
                        self.deque.push_front(choice);
                    }
                    return;
                }
                Some(Guess {
                    lit: None, choice, ..
                }) => requeue.push(choice),
                Some(Guess {
                    lit: Some(m),
                    choice,
                    children,
                }) => {
                    self.sat.untest();
                    self.depth -= 1;
                    self.assumptions.shift_remove(&m);
                    let event = TraceEvent::Backtrack {
                        depth: self.depth,
                        id: self.identifier_of(m),
                    };
                    self.tracer.trace(&event);
                    self.deque.retain(|c| !children.contains(&c.id));
                    if !children.contains(&failed.id) {
                        self.deque.push_front(failed);
                    }
                    for choice in requeue
                        .into_iter()
                        .filter(|c| !children.contains(&c.id))
                        .rev()
                    {
                        self.deque.push_front(choice);
                    }
                    let mut retry = choice;
                    retry.index += 1;
                    self.deque.push_front(retry);
                    return;
                }
            }
        }
    }

    /// Append one frame per dependency constraint of the committed literal.
    fn push_frames(&mut self, subject: Lit) -> Vec<u64> {
        let mut ids = Vec::new();
        for candidates in self.lits.dependency_candidates(subject) {
            let id = self.next_id;
            self.next_id += 1;
            ids.push(id);
            self.deque.push_back(Choice {
                id,
                subject,
                candidates,
                index: 0,
            });
        }
        ids
    }

    fn probe(&mut self) -> ProbeResult {
        let result = self.sat.test();
        self.depth += 1;
        result
    }

    fn release_scopes(&mut self) {
        while self.depth > 0 {
            self.sat.untest();
            self.depth -= 1;
        }
    }

    fn check_cancelled(&mut self, cancel: &CancelToken) -> Result<(), SolveError> {
        if cancel.is_cancelled() {
            self.release_scopes();
            return Err(SolveError::Cancelled);
        }
        Ok(())
    }

    fn identifier_of(&self, m: Lit) -> Identifier {
        self.lits
            .identifier_of(m)
            .cloned()
            .unwrap_or_else(|| Identifier::from("?"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::solver::constraint::Constraint;
    use crate::solver::tracer::DefaultTracer;

    /// A scripted backend in the spirit of the real one, returning canned
    /// probe results while recording scope traffic.
    #[derive(Default)]
    struct ScriptedBackend {
        test_returns: Vec<ProbeResult>,
        tests: usize,
        untests: usize,
        pending: Vec<Lit>,
        scopes: Vec<Vec<Lit>>,
    }

    impl ScriptedBackend {
        fn new(test_returns: Vec<ProbeResult>) -> Self {
            Self {
                test_returns,
                ..Default::default()
            }
        }

        fn depth(&self) -> usize {
            self.scopes.len()
        }
    }

    impl Backend for ScriptedBackend {
        fn assume(&mut self, m: Lit) {
            self.pending.push(m);
        }

        fn test(&mut self) -> ProbeResult {
            self.scopes.push(std::mem::take(&mut self.pending));
            let result = self
                .test_returns
                .get(self.tests)
                .copied()
                .unwrap_or_default();
            self.tests += 1;
            result
        }

        fn untest(&mut self) {
            self.untests += 1;
            self.scopes.pop();
        }

        fn solve(&mut self) -> ProbeResult {
            1
        }

        fn value(&self, _m: Lit) -> bool {
            false
        }

        fn why(&self) -> &[Lit] {
            &[]
        }
    }

    fn mapping(entities: &[&str], constraints: Vec<Constraint>) -> LitMapping {
        let entities: Vec<Entity> = entities.iter().map(|id| Entity::new(*id)).collect();
        LitMapping::new(&entities, constraints)
    }

    fn lit_for(lits: &LitMapping, id: &str) -> Lit {
        let id = Identifier::from(id);
        lits.identifier_literals()
            .into_iter()
            .find(|&m| lits.identifier_of(m) == Some(&id))
            .unwrap()
    }

    #[test]
    fn test_anchor_conflict_releases_every_scope() {
        let lits = mapping(
            &["a", "b", "c"],
            vec![
                Constraint::mandatory("a"),
                Constraint::dependency("a", ["c"]),
                Constraint::mandatory("b"),
            ],
        );
        let anchors = lits.anchor_literals();
        let mut sat = ScriptedBackend::new(vec![0, -1]);
        let mut tracer = DefaultTracer;
        let search = Search::new(&mut sat, &lits, &mut tracer);
        let outcome = search.run(&CancelToken::never(), &anchors).unwrap();
        assert_eq!(outcome.result, -1);
        assert!(outcome.assumptions.is_empty());
        assert_eq!(sat.tests, 2);
        assert_eq!(sat.depth(), 0);
    }

    #[test]
    fn test_failed_candidate_is_untested_and_search_continues() {
        let lits = mapping(
            &["a", "b", "x", "y"],
            vec![
                Constraint::mandatory("a"),
                Constraint::dependency("a", ["x"]),
                Constraint::mandatory("b"),
                Constraint::dependency("b", ["y"]),
            ],
        );
        let anchors = lits.anchor_literals();
        // Anchors a and b probe fine, candidate x conflicts, candidate y
        // completes the assignment.
        let mut sat = ScriptedBackend::new(vec![0, 0, -1, 1]);
        let mut tracer = DefaultTracer;
        let search = Search::new(&mut sat, &lits, &mut tracer);
        let outcome = search.run(&CancelToken::never(), &anchors).unwrap();
        assert_eq!(outcome.result, 1);
        let expected: Vec<Lit> = ["a", "b", "y"]
            .iter()
            .map(|id| lit_for(&lits, id))
            .collect();
        assert_eq!(outcome.assumptions, expected);
        assert_eq!(sat.tests, 4);
        assert_eq!(sat.untests, 1);
        // Scopes for the three commitments stay open for the caller.
        assert_eq!(sat.depth(), 3);
    }

    #[test]
    fn test_cancellation_unwinds_and_reports() {
        let lits = mapping(&["a", "b"], vec![
            Constraint::mandatory("a"),
            Constraint::mandatory("b"),
        ]);
        let anchors = lits.anchor_literals();
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut sat = ScriptedBackend::new(vec![0, 0]);
        let mut tracer = DefaultTracer;
        let search = Search::new(&mut sat, &lits, &mut tracer);
        let err = search.run(&cancel, &anchors).unwrap_err();
        assert_eq!(err, SolveError::Cancelled);
        assert_eq!(sat.depth(), 0);
    }

    #[test]
    fn test_satisfied_frame_does_not_open_a_scope() {
        let lits = mapping(
            &["a", "b", "x", "y"],
            vec![
                Constraint::mandatory("a"),
                Constraint::dependency("a", ["y"]),
                Constraint::mandatory("b"),
                Constraint::dependency("b", ["x", "y"]),
            ],
        );
        let anchors = lits.anchor_literals();
        let mut sat = ScriptedBackend::new(vec![0, 0, 0]);
        let mut tracer = DefaultTracer;
        let search = Search::new(&mut sat, &lits, &mut tracer);
        let outcome = search.run(&CancelToken::never(), &anchors).unwrap();
        // Three probes: two anchors and y; b's frame was satisfied by y.
        assert_eq!(sat.tests, 3);
        assert_eq!(outcome.assumptions.len(), 3);
        let y = lit_for(&lits, "y");
        assert!(outcome.assumptions.contains(&y));
    }

    #[test]
    fn test_exhausted_frame_backtracks_previous_guess() {
        // a depends on x or y; b depends on y only. If the backend rejects
        // y while x is committed, the search must retract x and retry.
        let lits = mapping(
            &["a", "b", "x", "y"],
            vec![
                Constraint::mandatory("a"),
                Constraint::dependency("a", ["x", "y"]),
                Constraint::mandatory("b"),
                Constraint::dependency("b", ["y"]),
            ],
        );
        let anchors = lits.anchor_literals();
        // Probes: a(0), b(0), x(0), y(-1) exhausts b's frame, backtrack x,
        // retry a's frame with y(0), then b's frame is satisfied.
        let mut sat = ScriptedBackend::new(vec![0, 0, 0, -1, 0]);
        let mut tracer = DefaultTracer;
        let search = Search::new(&mut sat, &lits, &mut tracer);
        let outcome = search.run(&CancelToken::never(), &anchors).unwrap();
        assert_eq!(sat.tests, 5);
        let expected: Vec<Lit> = ["a", "b", "y"]
            .iter()
            .map(|id| lit_for(&lits, id))
            .collect();
        assert_eq!(outcome.assumptions, expected);
    }
}
