use super::{Backend, Lit, ProbeResult};

/// One assumption scope opened by [`SatSolver::test`].
#[derive(Debug, Clone, Copy)]
struct Scope {
    /// Decision level when the scope was opened.
    level: u32,
    /// Length of the active-assumption list when the scope was opened.
    assumed: usize,
}

/// A CDCL SAT solver with scoped assumptions.
///
/// The solver supports the probe protocol the search engine needs:
/// assumptions queue up via [`Backend::assume`], a [`Backend::test`] call
/// opens a retractable scope and unit-propagates them, and
/// [`Backend::solve`] completes the assignment with clause learning,
/// branching false-first on the lowest-index unassigned variable. The
/// false-first phase keeps models minimal and deterministic. After any
/// conflict the responsible assumption literals are kept for
/// [`Backend::why`].
#[derive(Debug, Default)]
pub(crate) struct SatSolver {
    nvars: usize,
    clauses: Vec<Vec<Lit>>,
    /// Clause indices watching each literal, indexed by `Lit::index`.
    watches: Vec<Vec<usize>>,
    assign: Vec<Option<bool>>,
    level_of: Vec<u32>,
    reason: Vec<Option<usize>>,
    /// Whether the variable was fixed by an assumption decision.
    is_assumption: Vec<bool>,
    trail: Vec<Lit>,
    trail_lim: Vec<usize>,
    propagated: usize,
    scopes: Vec<Scope>,
    pending: Vec<Lit>,
    assumed: Vec<Lit>,
    conflict_core: Vec<Lit>,
    /// Set when the clause store is contradictory regardless of assumptions.
    unsat: bool,
}

impl SatSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_vars(&mut self, nvars: usize) {
        if nvars <= self.nvars {
            return;
        }
        self.nvars = nvars;
        self.assign.resize(nvars, None);
        self.level_of.resize(nvars, 0);
        self.reason.resize(nvars, None);
        self.is_assumption.resize(nvars, false);
        self.watches.resize(nvars * 2, Vec::new());
    }

    /// The number of open assumption scopes.
    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Retract every open scope.
    pub fn untest_all(&mut self) {
        while !self.scopes.is_empty() {
            self.untest();
        }
    }

    /// Add a clause under the current (top-level) assignment.
    pub fn add_clause(&mut self, lits: Vec<Lit>) {
        if let Some(max_var) = lits.iter().map(|m| m.var()).max() {
            self.ensure_vars(max_var + 1);
        }
        if lits.is_empty() {
            self.unsat = true;
            return;
        }
        if lits.len() == 1 {
            let m = lits[0];
            let ci = self.clauses.len();
            self.clauses.push(lits);
            match self.value_of(m) {
                None => self.enqueue(m, Some(ci)),
                Some(false) => self.unsat = true,
                Some(true) => {}
            }
            return;
        }

        // Move two watchable (non-false) literals to the front.
        let mut lits = lits;
        let mut watchable = 0;
        for i in 0..lits.len() {
            if watchable == 2 {
                break;
            }
            if self.value_of(lits[i]) != Some(false) {
                lits.swap(watchable, i);
                watchable += 1;
            }
        }
        let ci = self.clauses.len();
        let first = lits[0];
        let second = lits[1];
        self.clauses.push(lits);
        self.watches[first.index()].push(ci);
        self.watches[second.index()].push(ci);
        match watchable {
            0 => self.unsat = true,
            1 => {
                if self.value_of(first).is_none() {
                    self.enqueue(first, Some(ci));
                }
            }
            _ => {}
        }
    }

    fn current_level(&self) -> u32 {
        self.trail_lim.len() as u32
    }

    fn new_level(&mut self) {
        self.trail_lim.push(self.trail.len());
    }

    fn value_of(&self, m: Lit) -> Option<bool> {
        self.assign[m.var()].map(|v| v == m.is_positive())
    }

    fn enqueue(&mut self, m: Lit, reason: Option<usize>) {
        let v = m.var();
        self.assign[v] = Some(m.is_positive());
        self.level_of[v] = self.current_level();
        self.reason[v] = reason;
        self.trail.push(m);
    }

    fn backtrack_to(&mut self, level: u32) {
        while self.trail_lim.len() > level as usize {
            if let Some(mark) = self.trail_lim.pop() {
                for m in self.trail.drain(mark..) {
                    let v = m.var();
                    self.assign[v] = None;
                    self.reason[v] = None;
                    self.is_assumption[v] = false;
                }
            }
        }
        self.propagated = self.trail.len();
    }

    /// Unit propagation to fixpoint. Returns the conflicting clause, if any.
    fn propagate(&mut self) -> Option<usize> {
        while self.propagated < self.trail.len() {
            let p = self.trail[self.propagated];
            self.propagated += 1;
            let false_lit = p.not();
            let mut watchers = std::mem::take(&mut self.watches[false_lit.index()]);
            let mut i = 0;
            while i < watchers.len() {
                let ci = watchers[i];
                if self.clauses[ci][0] == false_lit {
                    self.clauses[ci].swap(0, 1);
                }
                let first = self.clauses[ci][0];
                if self.value_of(first) == Some(true) {
                    i += 1;
                    continue;
                }
                let replacement = self.clauses[ci]
                    .iter()
                    .enumerate()
                    .skip(2)
                    .find(|&(_, &q)| self.value_of(q) != Some(false))
                    .map(|(k, _)| k);
                if let Some(k) = replacement {
                    self.clauses[ci].swap(1, k);
                    let new_watch = self.clauses[ci][1];
                    self.watches[new_watch.index()].push(ci);
                    watchers.remove(i);
                } else if self.value_of(first) == Some(false) {
                    // Conflict: restore the watch list and stop.
                    self.watches[false_lit.index()] = watchers;
                    self.propagated = self.trail.len();
                    return Some(ci);
                } else {
                    self.enqueue(first, Some(ci));
                    i += 1;
                }
            }
            self.watches[false_lit.index()] = watchers;
        }
        None
    }

    /// First-UIP conflict analysis. Returns the learnt clause (asserting
    /// literal first) and the backjump level.
    fn analyze(&mut self, conflict: usize) -> (Vec<Lit>, u32) {
        let current = self.current_level();
        let mut seen = vec![false; self.nvars];
        let mut learnt: Vec<Lit> = Vec::new();
        let mut count: usize = 0;
        let mut index = self.trail.len();
        let mut clause = Some(conflict);
        let mut following_reason = false;

        loop {
            if let Some(ci) = clause {
                let skip = usize::from(following_reason);
                for idx in skip..self.clauses[ci].len() {
                    let q = self.clauses[ci][idx];
                    let v = q.var();
                    if !seen[v] && self.level_of[v] > 0 {
                        seen[v] = true;
                        if self.level_of[v] >= current {
                            count += 1;
                        } else {
                            learnt.push(q);
                        }
                    }
                }
            }
            while index > 0 && !seen[self.trail[index - 1].var()] {
                index -= 1;
            }
            if index == 0 {
                break;
            }
            index -= 1;
            let pl = self.trail[index];
            seen[pl.var()] = false;
            count = count.saturating_sub(1);
            if count == 0 {
                learnt.insert(0, pl.not());
                break;
            }
            clause = self.reason[pl.var()];
            following_reason = true;
        }

        let backjump = learnt
            .iter()
            .skip(1)
            .map(|q| self.level_of[q.var()])
            .max()
            .unwrap_or(0);
        (learnt, backjump)
    }

    fn add_learnt(&mut self, mut learnt: Vec<Lit>) {
        if learnt.is_empty() {
            self.unsat = true;
            return;
        }
        if learnt.len() == 1 {
            let m = learnt[0];
            let ci = self.clauses.len();
            self.clauses.push(learnt);
            match self.value_of(m) {
                None => self.enqueue(m, Some(ci)),
                Some(false) if self.current_level() == 0 => self.unsat = true,
                _ => {}
            }
            return;
        }
        // Watch the asserting literal and the highest-level remaining one.
        let mut best = 1;
        for i in 2..learnt.len() {
            if self.level_of[learnt[i].var()] > self.level_of[learnt[best].var()] {
                best = i;
            }
        }
        learnt.swap(1, best);
        let asserting = learnt[0];
        let w1 = learnt[1];
        let ci = self.clauses.len();
        self.clauses.push(learnt);
        self.watches[asserting.index()].push(ci);
        self.watches[w1.index()].push(ci);
        if self.value_of(asserting).is_none() {
            self.enqueue(asserting, Some(ci));
        }
    }

    /// Collect the assumption literals responsible for a conflicting clause.
    fn analyze_final_clause(&mut self, conflict: usize) {
        let mut seen = vec![false; self.nvars];
        for &q in &self.clauses[conflict] {
            seen[q.var()] = true;
        }
        self.conflict_core = self.trace_assumptions(seen, Vec::new());
    }

    /// Collect the assumption literals responsible for an assumption that
    /// is already false when applied.
    fn analyze_final_lit(&mut self, failed: Lit) {
        let mut seen = vec![false; self.nvars];
        seen[failed.var()] = true;
        self.conflict_core = self.trace_assumptions(seen, vec![failed]);
    }

    fn trace_assumptions(&self, mut seen: Vec<bool>, mut core: Vec<Lit>) -> Vec<Lit> {
        for idx in (0..self.trail.len()).rev() {
            let m = self.trail[idx];
            let v = m.var();
            if !seen[v] {
                continue;
            }
            if let Some(ci) = self.reason[v] {
                for &q in &self.clauses[ci] {
                    if q.var() != v {
                        seen[q.var()] = true;
                    }
                }
            } else if self.is_assumption[v] && !core.contains(&m) {
                core.push(m);
            }
        }
        core
    }
}

impl Backend for SatSolver {
    fn assume(&mut self, m: Lit) {
        self.ensure_vars(m.var() + 1);
        self.pending.push(m);
    }

    fn test(&mut self) -> ProbeResult {
        self.conflict_core.clear();
        self.scopes.push(Scope {
            level: self.current_level(),
            assumed: self.assumed.len(),
        });
        let pending = std::mem::take(&mut self.pending);
        if self.unsat {
            return -1;
        }
        if let Some(ci) = self.propagate() {
            self.analyze_final_clause(ci);
            return -1;
        }
        for m in pending {
            self.assumed.push(m);
            match self.value_of(m) {
                Some(true) => {}
                Some(false) => {
                    self.analyze_final_lit(m);
                    return -1;
                }
                None => {
                    self.new_level();
                    self.enqueue(m, None);
                    self.is_assumption[m.var()] = true;
                    if let Some(ci) = self.propagate() {
                        self.analyze_final_clause(ci);
                        return -1;
                    }
                }
            }
        }
        if self.trail.len() == self.nvars {
            1
        } else {
            0
        }
    }

    fn untest(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };
        self.pending.clear();
        self.backtrack_to(scope.level);
        self.assumed.truncate(scope.assumed);
    }

    fn solve(&mut self) -> ProbeResult {
        self.conflict_core.clear();
        if self.unsat {
            return -1;
        }
        let base = self.current_level();
        loop {
            if let Some(ci) = self.propagate() {
                if self.current_level() == base {
                    self.analyze_final_clause(ci);
                    return -1;
                }
                let (learnt, backjump) = self.analyze(ci);
                self.backtrack_to(backjump.max(base));
                self.add_learnt(learnt);
            } else {
                match (0..self.nvars).find(|&v| self.assign[v].is_none()) {
                    None => return 1,
                    Some(v) => {
                        self.new_level();
                        self.enqueue(Lit::negative(v), None);
                    }
                }
            }
        }
    }

    fn value(&self, m: Lit) -> bool {
        self.value_of(m) == Some(true)
    }

    fn why(&self) -> &[Lit] {
        &self.conflict_core
    }
}
