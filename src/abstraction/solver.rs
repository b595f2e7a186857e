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

//! This module defines the `Solver` trait along with the `SolutionSink`
//! seam through which any component (driver or application) reports a
//! candidate solution.

use crate::{Completion, Solution, SyncType};

/// This is the solver abstraction. It is implemented by a structure that
/// implements the branch-and-bound paradigm to find the best possible
/// solution(s) to a given problem.
pub trait Solver {
    /// This method orders the solver to search for the optimal solution
    /// among all possibilities. The returned `Completion` is marked
    /// **exact** if the search ran until its pool was exhausted; it is
    /// inexact when a cutoff criterion interrupted the search first. Along
    /// with the flag, the completion carries the value of the best solution
    /// found so far, if any was found at all.
    fn solve(&mut self) -> Completion;
    /// The value of the objective function for the best solution that has
    /// been found, or `None` when no feasible solution was found.
    fn best_value(&self) -> Option<f64>;
    /// The best solution found so far, or `None` when none was found.
    fn best_solution(&self) -> Option<Solution>;
}

/// The single entry point by which candidate solutions are reported. The
/// serial `SolutionRepository` implements it directly; in a distributed run
/// the `ReposCoordinator` stands here instead and takes care of routing the
/// solution to its owning process.
pub trait SolutionSink {
    /// Offers `solution` for archival. Returns true iff the solution was
    /// accepted locally (a solution handed over to another process for a
    /// decision reports false: only the owner's verdict is authoritative).
    fn offer(&mut self, solution: Solution, sync: SyncType) -> bool;
    /// The objective value fathoming decisions must be made against. With
    /// plain optimization that is the incumbent value passed in; when the k
    /// best solutions are being enumerated it is the worst value the archive
    /// still accepts (and `sense.worst()` while the archive has room).
    fn prune_threshold(&self, incumbent: f64) -> f64 {
        incumbent
    }
}

/// A sink that archives nothing and never restricts pruning: the driver then
/// works against its incumbent alone.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoSink;
impl SolutionSink for NoSink {
    fn offer(&mut self, _solution: Solution, _sync: SyncType) -> bool {
        false
    }
}
