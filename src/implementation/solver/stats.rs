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

//! Statistics collected during the execution of a search.

use crate::Status;

/// The counters a driver maintains while it searches. The first four are
/// the per-state transition counters: each legal transition increments the
/// counter of its destination state (synthetic subproblems, those whose id
/// serial is `<= 0`, are exempt).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SearchStats {
    /// Subproblems created (destination state `Boundable`).
    pub created: usize,
    /// Subproblems whose bound was computed (destination state `Bounded`).
    pub bounded: usize,
    /// Subproblems fully split (destination state `Separated`).
    pub separated: usize,
    /// Subproblems recycled (destination state `Dead`).
    pub recycled: usize,
    /// Subproblems discarded right after bounding because of the gap test.
    pub fathomed: usize,
    /// Pool members discarded by a `prune` sweep.
    pub pruned: usize,
    /// Candidate solutions reported by the application.
    pub solutions_found: usize,
    /// Depth of the deepest subproblem ever bounded.
    pub max_depth: usize,
}

impl SearchStats {
    /// Increments the per-state counter keyed by the destination state of a
    /// transition.
    pub fn record_transition(&mut self, to: Status) {
        match to {
            Status::Boundable => self.created += 1,
            Status::Bounded => self.bounded += 1,
            Status::Separated => self.separated += 1,
            Status::Dead => self.recycled += 1,
        }
    }
}
