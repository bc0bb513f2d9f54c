use super::solver::SatSolver;
use super::{Lit, Var};

/// A boolean circuit that Tseitin-encodes gates into CNF clauses.
///
/// Variable zero is a constant-true wire, asserted by a unit clause, so
/// gate constructors can fold constants instead of emitting degenerate
/// clauses. Clauses accumulate here and are handed to the SAT backend by
/// [`Circuit::flush_into`]; gates created after a flush (cardinality
/// sorters built during minimization) are picked up by the next flush.
#[derive(Debug, Default)]
pub(crate) struct Circuit {
    nvars: usize,
    clauses: Vec<Vec<Lit>>,
    flushed: usize,
}

impl Circuit {
    pub fn new() -> Self {
        let mut c = Self {
            nvars: 1,
            clauses: Vec::new(),
            flushed: 0,
        };
        c.clauses.push(vec![c.t()]);
        c
    }

    /// The constant-true literal.
    pub fn t(&self) -> Lit {
        Lit::positive(0)
    }

    /// The constant-false literal.
    pub fn f(&self) -> Lit {
        self.t().not()
    }

    /// Allocate a fresh variable and return its positive literal.
    pub fn new_lit(&mut self) -> Lit {
        let var: Var = self.nvars;
        self.nvars += 1;
        Lit::positive(var)
    }

    pub fn num_vars(&self) -> usize {
        self.nvars
    }

    /// A literal equivalent to the conjunction of `terms`.
    pub fn and(&mut self, terms: &[Lit]) -> Lit {
        let f = self.f();
        let t = self.t();
        let mut inputs: Vec<Lit> = Vec::with_capacity(terms.len());
        for &m in terms {
            if m == f {
                return f;
            }
            if m != t {
                inputs.push(m);
            }
        }
        match inputs.len() {
            0 => t,
            1 => inputs[0],
            _ => {
                let g = self.new_lit();
                let mut long = Vec::with_capacity(inputs.len() + 1);
                long.push(g);
                for &m in &inputs {
                    self.clauses.push(vec![g.not(), m]);
                    long.push(m.not());
                }
                self.clauses.push(long);
                g
            }
        }
    }

    /// A literal equivalent to the disjunction of `terms`.
    pub fn or(&mut self, terms: &[Lit]) -> Lit {
        let f = self.f();
        let t = self.t();
        let mut inputs: Vec<Lit> = Vec::with_capacity(terms.len());
        for &m in terms {
            if m == t {
                return t;
            }
            if m != f {
                inputs.push(m);
            }
        }
        match inputs.len() {
            0 => f,
            1 => inputs[0],
            _ => {
                let g = self.new_lit();
                let mut long = Vec::with_capacity(inputs.len() + 1);
                long.push(g.not());
                for &m in &inputs {
                    self.clauses.push(vec![g, m.not()]);
                    long.push(m);
                }
                self.clauses.push(long);
                g
            }
        }
    }

    /// Build a sorting network over `inputs` for cardinality constraints.
    ///
    /// Uses Batcher's odd-even mergesort on or/and comparators, which costs
    /// `O(k log^2 k)` auxiliary gates. Output wire `i` is true exactly when
    /// at least `i + 1` inputs are true.
    pub fn card_sort(&mut self, inputs: &[Lit]) -> CardSort {
        let n = inputs.len();
        let mut wires: Vec<Lit> = inputs.to_vec();
        let width = n.next_power_of_two();
        wires.resize(width, self.f());
        if width > 1 {
            self.oe_sort(&mut wires, 0, width);
        }
        wires.truncate(n);
        CardSort {
            outputs: wires,
            t: self.t(),
        }
    }

    fn oe_sort(&mut self, wires: &mut [Lit], lo: usize, n: usize) {
        if n > 1 {
            let m = n / 2;
            self.oe_sort(wires, lo, m);
            self.oe_sort(wires, lo + m, m);
            self.oe_merge(wires, lo, n, 1);
        }
    }

    fn oe_merge(&mut self, wires: &mut [Lit], lo: usize, n: usize, r: usize) {
        let step = r * 2;
        if step < n {
            self.oe_merge(wires, lo, n, step);
            self.oe_merge(wires, lo + r, n, step);
            let mut i = lo + r;
            while i + r < lo + n {
                self.compare(wires, i, i + r);
                i += step;
            }
        } else {
            self.compare(wires, lo, lo + r);
        }
    }

    /// Comparator: the earlier wire keeps the larger value (descending
    /// order), so sorted outputs count satisfied inputs from the front.
    fn compare(&mut self, wires: &mut [Lit], i: usize, j: usize) {
        let hi = self.or(&[wires[i], wires[j]]);
        let lo = self.and(&[wires[i], wires[j]]);
        wires[i] = hi;
        wires[j] = lo;
    }

    /// Feed clauses produced since the previous flush into the backend.
    pub fn flush_into(&mut self, sat: &mut SatSolver) {
        sat.ensure_vars(self.nvars);
        for clause in &self.clauses[self.flushed..] {
            sat.add_clause(clause.clone());
        }
        self.flushed = self.clauses.len();
    }
}

/// Sorted counting outputs over a set of literals.
#[derive(Debug, Clone)]
pub(crate) struct CardSort {
    outputs: Vec<Lit>,
    t: Lit,
}

impl CardSort {
    /// The number of sorted inputs.
    pub fn n(&self) -> usize {
        self.outputs.len()
    }

    /// A literal true exactly when at most `k` of the inputs are true.
    pub fn leq(&self, k: usize) -> Lit {
        if k >= self.outputs.len() {
            self.t
        } else {
            self.outputs[k].not()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sat::Backend;

    fn backend(circuit: &mut Circuit) -> SatSolver {
        let mut sat = SatSolver::new();
        circuit.flush_into(&mut sat);
        sat
    }

    #[test]
    fn test_constant_folding() {
        let mut c = Circuit::new();
        let x = c.new_lit();
        let t = c.t();
        let f = c.f();
        assert_eq!(c.and(&[x, t]), x);
        assert_eq!(c.and(&[x, f]), f);
        assert_eq!(c.or(&[x, f]), x);
        assert_eq!(c.or(&[x, t]), t);
        assert_eq!(c.and(&[]), t);
        assert_eq!(c.or(&[]), f);
    }

    #[test]
    fn test_and_gate_forces_inputs() {
        let mut c = Circuit::new();
        let x = c.new_lit();
        let y = c.new_lit();
        let g = c.and(&[x, y]);
        let mut sat = backend(&mut c);
        sat.assume(g);
        assert!(sat.test() >= 0);
        assert!(sat.value(x));
        assert!(sat.value(y));
    }

    #[test]
    fn test_or_gate_requires_an_input() {
        let mut c = Circuit::new();
        let x = c.new_lit();
        let y = c.new_lit();
        let g = c.or(&[x, y]);
        let mut sat = backend(&mut c);
        sat.assume(g);
        sat.assume(x.not());
        assert!(sat.test() >= 0);
        assert!(sat.value(y));
    }

    #[test]
    fn test_card_sort_counts() {
        let mut c = Circuit::new();
        let inputs: Vec<Lit> = (0..3).map(|_| c.new_lit()).collect();
        let cs = c.card_sort(&inputs);
        assert_eq!(cs.n(), 3);

        // Two of three inputs true satisfies <= 2 but not <= 1.
        let mut sat = backend(&mut c);
        sat.assume(inputs[0]);
        sat.assume(inputs[2]);
        sat.assume(inputs[1].not());
        sat.assume(cs.leq(2));
        assert!(sat.test() >= 0 && sat.solve() > 0);

        let mut c2 = Circuit::new();
        let inputs: Vec<Lit> = (0..3).map(|_| c2.new_lit()).collect();
        let cs = c2.card_sort(&inputs);
        let mut sat = backend(&mut c2);
        sat.assume(inputs[0]);
        sat.assume(inputs[2]);
        sat.assume(cs.leq(1));
        assert!(sat.test() < 0 || sat.solve() < 0);
    }

    #[test]
    fn test_card_sort_leq_propagates_exclusion() {
        let mut c = Circuit::new();
        let x = c.new_lit();
        let y = c.new_lit();
        let cs = c.card_sort(&[x, y]);
        let mut sat = backend(&mut c);
        sat.assume(cs.leq(1));
        sat.assume(x);
        assert!(sat.test() >= 0);
        assert!(sat.value(y.not()));
    }

    #[test]
    fn test_card_sort_trivial_bound() {
        let mut c = Circuit::new();
        let x = c.new_lit();
        let cs = c.card_sort(&[x]);
        assert_eq!(cs.leq(1), c.t());
        assert_eq!(cs.leq(5), c.t());
    }
}
