// Copyright 2020 Xavier Gillard
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! This module defines the most basic data types that are used throughout all
//! the code of our library (both at the abstraction and implementation levels).
//! These are also the types your client library is likely to work with.

use std::sync::OnceLock;

use derive_builder::Builder;

// ----------------------------------------------------------------------------
// --- SENSE ------------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The direction of optimization. Every comparison between two objective
/// values in this library is mediated by a `Sense`: what "better" means is
/// decided here and nowhere else.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Sense {
    /// Smaller objective values are better.
    Minimize,
    /// Greater objective values are better.
    Maximize,
}
impl Sense {
    /// The multiplier that normalizes an objective value to a minimization
    /// scale (lower normalized value always means better).
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Sense::Minimize => 1.0,
            Sense::Maximize => -1.0,
        }
    }
    /// True iff `a` is strictly better than `b` under this sense.
    #[inline]
    pub fn is_better(self, a: f64, b: f64) -> bool {
        match self {
            Sense::Minimize => a < b,
            Sense::Maximize => a > b,
        }
    }
    /// The worst conceivable objective value: the value of an incumbent when
    /// no solution has been found yet.
    #[inline]
    pub fn worst(self) -> f64 {
        match self {
            Sense::Minimize => f64::INFINITY,
            Sense::Maximize => f64::NEG_INFINITY,
        }
    }
    /// The best conceivable objective value: the bound of a subproblem that
    /// has not been bounded yet (it guards against any false pruning).
    #[inline]
    pub fn best(self) -> f64 {
        match self {
            Sense::Minimize => f64::NEG_INFINITY,
            Sense::Maximize => f64::INFINITY,
        }
    }
}

// ----------------------------------------------------------------------------
// --- SUBPROBLEM ID ----------------------------------------------------------
// ----------------------------------------------------------------------------
/// Uniquely identifies a subproblem across a whole (possibly distributed)
/// run. The `serial` is minted from a monotonically increasing per-process
/// counter (see `SearchContext`), so the pair (serial, creator) never
/// collides between two live subproblems.
///
/// Serials `<= 0` are reserved for synthetic subproblems (probes injected by
/// the runtime rather than discovered by the search); those are exempt from
/// the transition statistics but must still obey legal state transitions.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SubId {
    /// Per-process monotone sequence number.
    pub serial: i64,
    /// Rank of the process that created the subproblem.
    pub creator: usize,
}
impl SubId {
    /// The reserved sentinel marking an "empty" id.
    pub const EMPTY: SubId = SubId { serial: 0, creator: usize::MAX };

    /// True iff this id denotes a synthetic subproblem which must not be
    /// counted in the statistics.
    #[inline]
    pub fn is_synthetic(self) -> bool {
        self.serial <= 0
    }
}

/// The per-process context from which ids and solution serials are minted.
/// Passing it explicitly (instead of relying on file-scope mutable counters)
/// keeps every run reproducible and lets several independent searches coexist
/// in one process.
#[derive(Debug, Clone)]
pub struct SearchContext {
    /// Rank of this process among all participants (0 when serial).
    pub processor: usize,
    next_serial: i64,
    next_sol_serial: usize,
}
impl SearchContext {
    /// Creates a fresh context for the process with the given rank.
    pub fn new(processor: usize) -> Self {
        Self { processor, next_serial: 0, next_sol_serial: 0 }
    }
    /// Mints the id of a newly created subproblem.
    pub fn next_id(&mut self) -> SubId {
        self.next_serial += 1;
        SubId { serial: self.next_serial, creator: self.processor }
    }
    /// Mints the per-owning-process sequence number of a new solution.
    pub fn next_solution_serial(&mut self) -> usize {
        self.next_sol_serial += 1;
        self.next_sol_serial
    }
}

// ----------------------------------------------------------------------------
// --- SUBPROBLEM -------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The lifecycle of a subproblem. A subproblem only ever moves *forward* in
/// this order; moving backward is a broken invariant of the engine's own
/// bookkeeping and aborts the process.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Status {
    /// Freshly created, its bound has not been computed yet.
    Boundable,
    /// Its bound has been computed and is stored in `bound`.
    Bounded,
    /// It has been split and all its children have been handed out.
    Separated,
    /// Terminal: the subproblem is about to be recycled.
    Dead,
}

/// A subproblem is a residual problem that must be solved in order to
/// complete the resolution of the original problem which had been defined.
/// The engine wraps the application's opaque `state` with the bookkeeping it
/// needs: the lifecycle status, the tightest known bound, the depth and the
/// split fan-out counters.
#[derive(Debug, Clone)]
pub struct SubProblem<T> {
    /// The identity of this subproblem within the whole run.
    pub id: SubId,
    /// The application-defined residual state.
    pub state: T,
    /// The tightest known bound on the objective reachable in this subtree.
    /// Until `compute_bound` has run, this is `sense.best()` so that the
    /// subproblem can never be fathomed on the basis of a bound it does not
    /// have.
    pub bound: f64,
    /// The depth of the subproblem with respect to the root problem.
    pub depth: usize,
    /// The number of children the split will produce in total.
    pub total_children: usize,
    /// The number of children that have not been created yet.
    pub children_left: usize,
    status: Status,
}
impl<T> SubProblem<T> {
    /// Wraps a fresh application state into a boundable subproblem.
    pub fn new(id: SubId, state: T, depth: usize, sense: Sense) -> Self {
        Self {
            id,
            state,
            bound: sense.best(),
            depth,
            total_children: 0,
            children_left: 0,
            status: Status::Boundable,
        }
    }
    /// The current lifecycle status.
    #[inline]
    pub fn status(&self) -> Status {
        self.status
    }
    /// Moves the subproblem forward to `next`. Any attempt to move backward
    /// (or to stay in place) is a fatal protocol violation.
    pub fn advance_to(&mut self, next: Status) {
        if next <= self.status {
            panic!(
                "illegal subproblem state regression {:?} -> {:?} (id {:?})",
                self.status, next, self.id
            );
        }
        self.status = next;
    }
}

// ----------------------------------------------------------------------------
// --- SOLUTION ---------------------------------------------------------------
// ----------------------------------------------------------------------------
/// A feasible solution reported by the application. Its `content` is the
/// decision sequence that materializes it; it is what duplicate detection
/// compares and what the owner assignment hashes. Exactly one process is the
/// authoritative owner of an accepted solution; every other process only ever
/// holds transient copies in flight.
#[derive(Debug, Clone)]
pub struct Solution {
    /// The objective value; the comparison direction is governed by the
    /// search's `Sense`.
    pub value: f64,
    /// Per-owning-process sequence number.
    pub serial: usize,
    /// Rank of the owning process.
    pub owner: usize,
    /// The decision sequence, used for duplicate comparison and hashing.
    pub content: Vec<isize>,
    hash: OnceLock<u64>,
}
impl Solution {
    /// Creates a new solution. The hash is computed lazily on first use.
    pub fn new(value: f64, serial: usize, owner: usize, content: Vec<isize>) -> Self {
        Self { value, serial, owner, content, hash: OnceLock::new() }
    }
    /// The content hash of this solution (memoized after the first call).
    pub fn hash_value(&self) -> u64 {
        *self.hash.get_or_init(|| fxhash::hash64(&self.content))
    }
    /// True iff `other` carries the exact same value and decision sequence.
    pub fn same_as(&self, other: &Solution) -> bool {
        self.value == other.value && self.content == other.content
    }
    /// The rank of the process that owns this solution's content, among
    /// `nb_processes` participants. Same content always maps onto the same
    /// owner, deterministically, on every process.
    pub fn owning_process(&self, nb_processes: usize) -> usize {
        (self.hash_value() % nb_processes as u64) as usize
    }
}

/// Distinguishes how a candidate solution was reported. During ramp-up every
/// process is guaranteed to see an identical `Synchronous` call; a `Local`
/// report only exists on one process and needs distributed reconciliation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SyncType {
    /// Every process performs an identical call.
    Synchronous,
    /// Purely local discovery.
    Local,
}

// ----------------------------------------------------------------------------
// --- INCUMBENT --------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The best feasible solution found so far, together with the gap arithmetic
/// every fathoming decision relies on. These two formulas are the sole
/// numeric contract the application may use for its own secondary fathoming:
///
/// * `abs_gap(bound) = (incumbent - bound) * sense.sign()`
/// * `rel_gap(bound) = abs_gap(bound) / max(|bound|, |incumbent|)`
#[derive(Debug, Clone)]
pub struct Incumbent {
    sense: Sense,
    value: f64,
    solution: Option<Solution>,
    abs_tolerance: f64,
    rel_tolerance: f64,
}
impl Incumbent {
    /// Creates an empty incumbent (value is `sense.worst()`).
    pub fn new(sense: Sense, abs_tolerance: f64, rel_tolerance: f64) -> Self {
        Self { sense, value: sense.worst(), solution: None, abs_tolerance, rel_tolerance }
    }
    /// The sense of the underlying search.
    #[inline]
    pub fn sense(&self) -> Sense {
        self.sense
    }
    /// The incumbent objective value (`sense.worst()` when none was found).
    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }
    /// The incumbent solution, if any was found.
    pub fn solution(&self) -> Option<&Solution> {
        self.solution.as_ref()
    }
    /// True iff a feasible solution has been recorded.
    pub fn is_set(&self) -> bool {
        self.solution.is_some()
    }
    /// The margin by which `bound` could still beat the incumbent.
    #[inline]
    pub fn abs_gap(&self, bound: f64) -> f64 {
        (self.value - bound) * self.sense.sign()
    }
    /// The absolute gap, scaled by the magnitude of the operands.
    pub fn rel_gap(&self, bound: f64) -> f64 {
        let scale = bound.abs().max(self.value.abs());
        if scale == 0.0 {
            0.0
        } else {
            self.abs_gap(bound) / scale
        }
    }
    /// True iff a subproblem with the given bound cannot beat the incumbent
    /// by more than the allowed tolerance and can therefore be discarded.
    /// Fathoming is monotonic in incumbent quality: once a bound fails this
    /// test, it keeps failing it against any improved incumbent.
    pub fn can_fathom(&self, bound: f64) -> bool {
        self.can_fathom_against(self.value, bound)
    }
    /// Same test as `can_fathom`, against an explicit threshold value (used
    /// when the pruning threshold is the k-th best of a repository rather
    /// than the incumbent itself).
    pub fn can_fathom_against(&self, threshold: f64, bound: f64) -> bool {
        let abs_gap = (threshold - bound) * self.sense.sign();
        if abs_gap <= self.abs_tolerance {
            return true;
        }
        let scale = bound.abs().max(threshold.abs());
        scale > 0.0 && abs_gap / scale <= self.rel_tolerance
    }
    /// Installs `solution` as the new incumbent iff it strictly improves on
    /// the current one. Returns true on improvement.
    pub fn try_improve(&mut self, solution: &Solution) -> bool {
        if self.sense.is_better(solution.value, self.value) {
            self.value = solution.value;
            self.solution = Some(solution.clone());
            true
        } else {
            false
        }
    }
}

// ----------------------------------------------------------------------------
// --- RESULTS ----------------------------------------------------------------
// ----------------------------------------------------------------------------
/// A reason explaining why the search stopped before exhausting its pool.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Reason {
    /// It stopped because the configured cutoff criterion was met.
    CutoffOccurred,
}

/// The outcome of a search.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Is the given solution exact (proved optimal for the given problem)?
    /// Or is it an approximation because a cutoff interrupted the search?
    pub is_exact: bool,
    /// If present, the value of the best solution identified by the search.
    pub best_value: Option<f64>,
}

// ----------------------------------------------------------------------------
// --- PARAMETERS -------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The construction-time knobs of the engine. These are considered
/// already-resolved inputs: parsing them from a command line or a file is the
/// caller's business.
#[derive(Debug, Clone, Builder)]
pub struct Params {
    /// How many of the best distinct solutions must be retained (1 retains
    /// only the optimum).
    #[builder(default = "1")]
    pub enum_count: usize,
    /// Minimum delay between two repository-tree merges on one process.
    #[builder(default = "0.1")]
    pub repos_merge_seconds: f64,
    /// Staleness budget after which a merge is performed even though some
    /// children have not reported yet.
    #[builder(default = "1.0")]
    pub repos_skew_seconds: f64,
    /// Whether misrouted solutions travel through the credit-gated router
    /// (true) or are sent directly to their owner (false).
    #[builder(default = "true")]
    pub flow_control: bool,
    /// Absolute fathoming tolerance.
    #[builder(default = "0.0")]
    pub abs_tolerance: f64,
    /// Relative fathoming tolerance.
    #[builder(default = "0.0")]
    pub rel_tolerance: f64,
}
impl Default for Params {
    fn default() -> Self {
        ParamsBuilder::default().build().unwrap()
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################


#[cfg(test)]
mod test_subproblem {
    use crate::{SearchContext, Sense, Status, SubId, SubProblem};

    #[test]
    fn serials_are_minted_in_monotone_order() {
        let mut ctx = SearchContext::new(3);
        let a = ctx.next_id();
        let b = ctx.next_id();
        assert_eq!(1, a.serial);
        assert_eq!(2, b.serial);
        assert_eq!(3, a.creator);
    }
    #[test]
    fn the_empty_id_is_synthetic() {
        assert!(SubId::EMPTY.is_synthetic());
        assert!(SubId { serial: -4, creator: 0 }.is_synthetic());
        assert!(!SubId { serial: 1, creator: 0 }.is_synthetic());
    }
    #[test]
    fn a_new_subproblem_is_boundable_with_a_harmless_bound() {
        let mut ctx = SearchContext::new(0);
        let sp = SubProblem::new(ctx.next_id(), 'a', 0, Sense::Minimize);
        assert_eq!(Status::Boundable, sp.status());
        assert_eq!(f64::NEG_INFINITY, sp.bound);
    }
    #[test]
    fn status_moves_forward() {
        let mut ctx = SearchContext::new(0);
        let mut sp = SubProblem::new(ctx.next_id(), 'a', 0, Sense::Minimize);
        sp.advance_to(Status::Bounded);
        sp.advance_to(Status::Dead);
        assert_eq!(Status::Dead, sp.status());
    }
    #[test]
    #[should_panic]
    fn status_regression_is_fatal() {
        let mut ctx = SearchContext::new(0);
        let mut sp = SubProblem::new(ctx.next_id(), 'a', 0, Sense::Minimize);
        sp.advance_to(Status::Separated);
        sp.advance_to(Status::Bounded);
    }
}

#[cfg(test)]
mod test_solution {
    use crate::Solution;

    #[test]
    fn same_content_hashes_to_the_same_owner() {
        let a = Solution::new(5.0, 1, 0, vec![1, 2, 3]);
        let b = Solution::new(5.0, 9, 3, vec![1, 2, 3]);
        assert_eq!(a.owning_process(8), b.owning_process(8));
    }
    #[test]
    fn different_serials_do_not_break_duplicate_detection() {
        let a = Solution::new(5.0, 1, 0, vec![1, 2, 3]);
        let b = Solution::new(5.0, 2, 1, vec![1, 2, 3]);
        assert!(a.same_as(&b));
    }
    #[test]
    fn different_content_is_not_a_duplicate() {
        let a = Solution::new(5.0, 1, 0, vec![1, 2, 3]);
        let b = Solution::new(5.0, 1, 0, vec![3, 2, 1]);
        assert!(!a.same_as(&b));
    }
}
