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

//! This module defines the contract between the search engine and the
//! problem-specific code: the `Problem` trait is the capability set every
//! application must provide for its subproblems to be bounded, split and
//! turned into candidate solutions.

use crate::{Incumbent, Sense};

/// This trait defines the "contract" of what defines an optimization problem
/// solvable with the branch-and-bound paradigm. The engine owns the search
/// tree bookkeeping; an implementation of this trait provides the four
/// problem-specific operations: bounding a residual state, enumerating its
/// children, detecting a feasible candidate, and (optionally) adding domain
/// cuts on top of the engine's bound/incumbent gap test.
pub trait Problem {
    /// The residual state attached to each node of the search tree. This is
    /// entirely user-defined; the engine treats it as opaque.
    type State;

    /// The direction of optimization for this problem.
    fn sense(&self) -> Sense;
    /// This method returns the residual state of the root subproblem (the
    /// whole problem, with nothing decided yet).
    fn root_state(&self) -> Self::State;
    /// Computes a valid relaxation bound for the subtree rooted in `state`
    /// and returns it. The returned value may be any value that is no better
    /// than the true optimum of the subtree. The method receives the state
    /// mutably so that an implementation can cache whatever intermediate
    /// results the subsequent split wants to reuse.
    fn compute_bound(&self, state: &mut Self::State) -> f64;
    /// Returns the number of children a split of `state` will produce. The
    /// engine then calls `make_child` exactly once for every index in
    /// `[0, child_count(state))`.
    fn child_count(&self, state: &Self::State) -> usize;
    /// Constructs the `which`-th child of `state`. Implementations must
    /// treat a `which` outside `[0, child_count(state))` as a fatal
    /// programming error.
    fn make_child(&self, state: &Self::State, which: usize) -> Self::State;
    /// True iff `state` embeds a feasible candidate solution that should be
    /// reported to the engine.
    fn candidate_solution(&self, state: &Self::State) -> bool;
    /// Extracts the candidate embedded in `state`: its objective value and
    /// the decision sequence that materializes it. Returning `None` is legal
    /// even after `candidate_solution` returned true (e.g. when the
    /// extraction notices the candidate was already reported).
    fn extract_solution(&self, state: &Self::State) -> Option<(f64, Vec<isize>)>;
    /// Domain-specific cuts beyond the engine's bound/incumbent gap test.
    /// The default implementation adds nothing: the engine's own test is the
    /// only fathoming criterion.
    fn can_fathom(&self, _state: &Self::State, _bound: f64, _incumbent: &Incumbent) -> bool {
        false
    }
}
