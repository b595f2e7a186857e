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

//! This trait abstracts away the implementation details of the solver pool.
//! That is, a `Pool` represents the collection which stores all the live
//! subproblems remaining to explore, together with the strategy deciding
//! which of them is handed out next.

use crate::SubProblem;

/// A generation-checked handle onto a subproblem living inside a pool.
/// Handles are returned by `insert` and are the only way to address a member
/// afterwards: using a handle after the member was removed is detected (the
/// generation no longer matches) and treated as a fatal programming error.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PoolToken {
    pub(crate) slot: usize,
    pub(crate) gen: u32,
}

/// The aggregate load measure a pool keeps incrementally consistent with its
/// membership: every insert/remove updates it.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PoolLoad {
    /// Number of live members.
    pub count: usize,
    /// Sum of the members' depths.
    pub depth_sum: usize,
    /// Depth of the deepest member ever held (does not decrease on removal).
    pub max_depth: usize,
}
impl PoolLoad {
    /// Accounts for the insertion of a member at the given depth.
    pub fn add(&mut self, depth: usize) {
        self.count += 1;
        self.depth_sum += depth;
        self.max_depth = self.max_depth.max(depth);
    }
    /// Accounts for the removal of a member at the given depth.
    pub fn sub(&mut self, depth: usize) {
        self.count -= 1;
        self.depth_sum -= depth;
    }
    /// The mean depth of the current membership (0 when empty).
    pub fn mean_depth(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.depth_sum as f64 / self.count as f64
        }
    }
}

/// The capability set a concrete pool must implement. Two strategies are
/// provided by this crate: `ListPool` (depth-first or breadth-first over a
/// linked list) and `HeapPool` (best-first over a binary heap).
pub trait Pool {
    type State;

    /// Adds `sp` to the pool, updates the aggregate load, and returns the
    /// handle by which the member can be addressed from now on.
    fn insert(&mut self, sp: SubProblem<Self::State>) -> PoolToken;
    /// Returns (without removing) the handle of the next subproblem
    /// according to this pool's strategy, or `None` when the pool is empty.
    /// An empty pool is a normal termination signal, never an error.
    fn select(&self) -> Option<PoolToken>;
    /// Borrows the member behind `token`. Fatal if the token is stale.
    fn get(&self, token: PoolToken) -> &SubProblem<Self::State>;
    /// Mutably borrows the member behind `token`. Fatal if the token is
    /// stale.
    fn get_mut(&mut self, token: PoolToken) -> &mut SubProblem<Self::State>;
    /// Removes and returns the member behind `token`, updating the aggregate
    /// load. Removing a non-member is a fatal programming error.
    fn remove(&mut self, token: PoolToken) -> SubProblem<Self::State>;
    /// Removes and returns the current `select()` result, if any.
    fn remove_selected(&mut self) -> Option<SubProblem<Self::State>> {
        self.select().map(|token| self.remove(token))
    }
    /// Scans (possibly lazily, with amortized cost) for members for which
    /// `fathomable` now holds and physically discards them. Returns the
    /// remaining size of the pool.
    fn prune(&mut self, fathomable: &mut dyn FnMut(&SubProblem<Self::State>) -> bool) -> usize;
    /// A restartable, finite, lazy sequence over the *current* membership.
    /// Calling `scan` again restarts the sequence. This is meant for
    /// debugging and printing, not for anything performance-critical.
    fn scan(&self) -> Box<dyn Iterator<Item = &SubProblem<Self::State>> + '_>;
    /// Handles of up to `max` members that are good candidates to offload to
    /// an idle peer, without removing them. Only the distributed extension
    /// uses this.
    fn unload_candidates(&self, max: usize) -> Vec<PoolToken>;
    /// Yields the number of live members.
    fn len(&self) -> usize;
    /// Returns true iff the pool is empty (len == 0).
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// The aggregate load measure of the current membership.
    fn load(&self) -> PoolLoad;
    /// Empties the pool and resets any one-shot internal flag to its
    /// post-construction value.
    fn reset(&mut self);
    /// The tightest bound provably holding over the entire membership, or
    /// `None` when this pool cannot (yet) vouch for one. `None` must be
    /// interpreted as "anything may still be in there": a guard against
    /// false pruning before enough information exists.
    fn global_bound(&self) -> Option<f64> {
        None
    }
    /// True iff `global_bound` would return a usable value.
    fn knows_global_bound(&self) -> bool {
        self.global_bound().is_some()
    }
}
