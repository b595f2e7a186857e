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

//! This module provides the implementation of the best-first pool: an
//! updatable binary heap backed by a vector, ordered by a strict total order
//! over the subproblems (primarily the bound, compared according to the
//! sense of the search).

use std::cmp::Ordering;

use compare::Compare;
use ordered_float::OrderedFloat;

use crate::{Pool, PoolLoad, PoolToken, Sense, SubProblem};

/// The strict total order a `HeapPool` ranks its members by: primarily the
/// bound (normalized by the sense so that a smaller key is always better),
/// with the subproblem id as the final tie-break. `compare` returns
/// `Greater` when the left operand is the *better* of the two, which is the
/// convention a max-heap wants.
#[derive(Debug, Clone, Copy)]
pub struct BoundOrder {
    sense: Sense,
}
impl BoundOrder {
    /// Creates the bound order matching the given sense.
    pub fn new(sense: Sense) -> Self {
        Self { sense }
    }

    fn key<T>(&self, sp: &SubProblem<T>) -> (OrderedFloat<f64>, i64, usize) {
        (
            OrderedFloat(sp.bound * self.sense.sign()),
            sp.id.serial,
            sp.id.creator,
        )
    }
}
impl<T> Compare<SubProblem<T>> for BoundOrder {
    fn compare(&self, l: &SubProblem<T>, r: &SubProblem<T>) -> Ordering {
        // reversed: the smaller normalized key is the better subproblem
        self.key(r).cmp(&self.key(l))
    }
}

struct HeapSlot<T> {
    gen: u32,
    sp: Option<SubProblem<T>>,
}

/// The best-first pool. `select` returns the member with the best bound
/// under the configured sense.
///
/// Two behaviors set it apart from a plain priority queue:
///
/// * `prune` only does amortized-bounded work: it repeatedly inspects the
///   worst remaining elements (from the tail of the heap array) and stops
///   once it has examined a fixed fraction of the current heap size, so a
///   single call never degenerates into a full scan while successive calls
///   still make steady progress.
/// * `global_bound` withholds its answer during the initial dive window
///   (from construction or `reset` until the very first `prune`): before
///   that point the pool does not vouch for a bound over its membership,
///   which guards against false pruning before enough information exists.
pub struct HeapPool<T> {
    cmp: BoundOrder,
    slots: Vec<HeapSlot<T>>,
    recycle_bin: Vec<usize>,
    /// Slot ids, heap-ordered: the best member sits at index 0.
    heap: Vec<usize>,
    /// pos[slot] = index of that slot id inside `heap`.
    pos: Vec<usize>,
    load: PoolLoad,
    diving: bool,
    prune_denominator: usize,
}

impl<T> HeapPool<T> {
    /// The default fraction of the heap a single `prune` call examines
    /// (one over this denominator).
    pub const PRUNE_DENOMINATOR: usize = 2;

    /// Creates an empty best-first pool for the given sense.
    pub fn new(sense: Sense) -> Self {
        Self {
            cmp: BoundOrder::new(sense),
            slots: vec![],
            recycle_bin: vec![],
            heap: vec![],
            pos: vec![],
            load: PoolLoad::default(),
            diving: true,
            prune_denominator: Self::PRUNE_DENOMINATOR,
        }
    }
    /// Overrides the fraction of the heap a single `prune` call examines.
    /// This tunes the amortization, not the correctness, of pruning.
    pub fn with_prune_denominator(mut self, denominator: usize) -> Self {
        self.prune_denominator = denominator.max(1);
        self
    }

    fn sp(&self, slot: usize) -> &SubProblem<T> {
        self.slots[slot].sp.as_ref().unwrap()
    }

    fn better(&self, a: usize, b: usize) -> bool {
        self.cmp.compare(self.sp(a), self.sp(b)) == Ordering::Greater
    }

    fn place(&mut self, heap_idx: usize, slot: usize) {
        self.heap[heap_idx] = slot;
        self.pos[slot] = heap_idx;
    }

    fn bubble_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.better(self.heap[i], self.heap[parent]) {
                let (a, b) = (self.heap[i], self.heap[parent]);
                self.place(i, b);
                self.place(parent, a);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn bubble_down(&mut self, mut i: usize) {
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut best = i;
            if left < self.heap.len() && self.better(self.heap[left], self.heap[best]) {
                best = left;
            }
            if right < self.heap.len() && self.better(self.heap[right], self.heap[best]) {
                best = right;
            }
            if best == i {
                break;
            }
            let (a, b) = (self.heap[i], self.heap[best]);
            self.place(i, b);
            self.place(best, a);
            i = best;
        }
    }

    fn rebuild(&mut self) {
        for i in (0..self.heap.len() / 2).rev() {
            self.bubble_down(i);
        }
    }

    fn checked_slot(&self, token: PoolToken) -> usize {
        let live = self
            .slots
            .get(token.slot)
            .map(|s| s.gen == token.gen && s.sp.is_some())
            .unwrap_or(false);
        if !live {
            panic!("subproblem behind {:?} is not a member of this pool", token);
        }
        token.slot
    }

    /// Removes the member sitting at `heap_idx` and restores the heap shape.
    fn remove_at(&mut self, heap_idx: usize) -> SubProblem<T> {
        let slot = self.heap[heap_idx];
        let last = self.heap.len() - 1;
        if heap_idx != last {
            let moved = self.heap[last];
            self.place(heap_idx, moved);
        }
        self.heap.pop();
        if heap_idx < self.heap.len() {
            self.bubble_up(heap_idx);
            self.bubble_down(heap_idx);
        }

        let sp = self.slots[slot].sp.take().unwrap();
        self.slots[slot].gen = self.slots[slot].gen.wrapping_add(1);
        self.recycle_bin.push(slot);
        self.load.sub(sp.depth);
        sp
    }
}

impl<T> Pool for HeapPool<T> {
    type State = T;

    fn insert(&mut self, sp: SubProblem<T>) -> PoolToken {
        self.load.add(sp.depth);

        let slot = match self.recycle_bin.pop() {
            Some(slot) => {
                self.slots[slot].sp = Some(sp);
                slot
            }
            None => {
                self.slots.push(HeapSlot { gen: 0, sp: Some(sp) });
                self.pos.push(0); // dummy
                self.slots.len() - 1
            }
        };
        self.heap.push(slot);
        self.pos[slot] = self.heap.len() - 1;
        self.bubble_up(self.heap.len() - 1);

        PoolToken { slot, gen: self.slots[slot].gen }
    }

    fn select(&self) -> Option<PoolToken> {
        self.heap
            .first()
            .map(|&slot| PoolToken { slot, gen: self.slots[slot].gen })
    }

    fn get(&self, token: PoolToken) -> &SubProblem<T> {
        let slot = self.checked_slot(token);
        self.sp(slot)
    }

    fn get_mut(&mut self, token: PoolToken) -> &mut SubProblem<T> {
        let slot = self.checked_slot(token);
        self.slots[slot].sp.as_mut().unwrap()
    }

    fn remove(&mut self, token: PoolToken) -> SubProblem<T> {
        let slot = self.checked_slot(token);
        self.remove_at(self.pos[slot])
    }

    fn prune(&mut self, fathomable: &mut dyn FnMut(&SubProblem<T>) -> bool) -> usize {
        if self.diving {
            // one-shot lazy reheapify after the initial dive; reset() is the
            // only way to arm it again
            self.rebuild();
            self.diving = false;
        }

        let budget = (self.heap.len() / self.prune_denominator).max(1);
        let mut examined = 0;
        let mut idx = self.heap.len();
        while examined < budget && idx > 0 {
            idx -= 1;
            examined += 1;
            if fathomable(self.sp(self.heap[idx])) {
                drop(self.remove_at(idx));
            }
        }
        self.load.count
    }

    fn scan(&self) -> Box<dyn Iterator<Item = &SubProblem<T>> + '_> {
        Box::new(self.heap.iter().map(move |&slot| self.sp(slot)))
    }

    fn unload_candidates(&self, max: usize) -> Vec<PoolToken> {
        // the front of the heap array approximates the best-bound members:
        // the ones most worth handing to an idle peer
        self.heap
            .iter()
            .take(max)
            .map(|&slot| PoolToken { slot, gen: self.slots[slot].gen })
            .collect()
    }

    fn len(&self) -> usize {
        self.load.count
    }

    fn load(&self) -> PoolLoad {
        self.load
    }

    fn reset(&mut self) {
        self.slots.clear();
        self.recycle_bin.clear();
        self.heap.clear();
        self.pos.clear();
        self.load = PoolLoad::default();
        self.diving = true;
    }

    fn global_bound(&self) -> Option<f64> {
        if self.diving {
            None
        } else {
            self.heap.first().map(|&slot| self.sp(slot).bound)
        }
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_heap_pool {
    use crate::{HeapPool, Pool, Sense, SubId, SubProblem};

    fn sp(serial: i64, tag: char, bound: f64) -> SubProblem<char> {
        let mut sp = SubProblem::new(SubId { serial, creator: 0 }, tag, 0, Sense::Minimize);
        sp.bound = bound;
        sp
    }

    #[test]
    fn by_default_it_is_empty() {
        let pool = HeapPool::<char>::new(Sense::Minimize);
        assert!(pool.is_empty());
        assert!(pool.select().is_none());
    }

    #[test]
    fn when_minimizing_select_returns_the_lowest_bound() {
        let mut pool = HeapPool::new(Sense::Minimize);
        pool.insert(sp(1, 'a', 5.0));
        pool.insert(sp(2, 'b', 2.0));
        pool.insert(sp(3, 'c', 9.0));
        assert_eq!('b', pool.get(pool.select().unwrap()).state);
    }

    #[test]
    fn when_maximizing_select_returns_the_highest_bound() {
        let mut pool = HeapPool::new(Sense::Maximize);
        pool.insert(sp(1, 'a', 5.0));
        pool.insert(sp(2, 'b', 2.0));
        pool.insert(sp(3, 'c', 9.0));
        assert_eq!('c', pool.get(pool.select().unwrap()).state);
    }

    #[test]
    fn repeated_removal_pops_members_in_best_first_order() {
        let mut pool = HeapPool::new(Sense::Minimize);
        pool.insert(sp(1, 'a', 5.0));
        pool.insert(sp(2, 'b', 2.0));
        pool.insert(sp(3, 'c', 9.0));
        pool.insert(sp(4, 'd', 1.0));
        pool.insert(sp(5, 'e', 7.0));

        let mut popped = vec![];
        while let Some(sp) = pool.remove_selected() {
            popped.push(sp.state);
        }
        assert_eq!(vec!['d', 'b', 'a', 'e', 'c'], popped);
    }

    #[test]
    fn equal_bounds_are_tie_broken_deterministically() {
        let mut pool = HeapPool::new(Sense::Minimize);
        pool.insert(sp(2, 'b', 3.0));
        pool.insert(sp(1, 'a', 3.0));
        assert_eq!('a', pool.remove_selected().unwrap().state);
        assert_eq!('b', pool.remove_selected().unwrap().state);
    }

    #[test]
    fn removal_by_token_keeps_the_heap_ordered() {
        let mut pool = HeapPool::new(Sense::Minimize);
        pool.insert(sp(1, 'a', 5.0));
        let b = pool.insert(sp(2, 'b', 2.0));
        pool.insert(sp(3, 'c', 9.0));
        pool.insert(sp(4, 'd', 3.0));

        assert_eq!('b', pool.remove(b).state);
        assert_eq!('d', pool.remove_selected().unwrap().state);
        assert_eq!('a', pool.remove_selected().unwrap().state);
        assert_eq!('c', pool.remove_selected().unwrap().state);
    }

    #[test]
    #[should_panic]
    fn removing_a_non_member_is_fatal() {
        let mut pool = HeapPool::new(Sense::Minimize);
        let a = pool.insert(sp(1, 'a', 5.0));
        pool.remove(a);
        pool.remove(a);
    }

    #[test]
    fn prune_discards_fathomable_members_from_the_worst_end() {
        let mut pool = HeapPool::new(Sense::Minimize);
        pool.insert(sp(1, 'a', 1.0));
        pool.insert(sp(2, 'b', 8.0));
        pool.insert(sp(3, 'c', 9.0));
        pool.insert(sp(4, 'd', 2.0));

        // members with bound >= 5 cannot beat the incumbent anymore; a
        // single call examines half the heap, which is where they live
        pool.prune(&mut |sp| sp.bound >= 5.0);
        let survivors: Vec<char> = {
            let mut v: Vec<char> = pool.scan().map(|sp| sp.state).collect();
            v.sort_unstable();
            v
        };
        assert_eq!(vec!['a', 'd'], survivors);
    }

    #[test]
    fn prune_only_examines_a_bounded_share_per_call() {
        let mut pool = HeapPool::new(Sense::Minimize);
        for i in 0..8 {
            pool.insert(sp(i + 1, 'x', i as f64));
        }
        let mut examined = 0;
        pool.prune(&mut |_| {
            examined += 1;
            false
        });
        assert_eq!(4, examined);
    }

    #[test]
    fn the_global_bound_is_withheld_during_the_initial_dive() {
        let mut pool = HeapPool::new(Sense::Minimize);
        pool.insert(sp(1, 'a', 5.0));
        assert!(!pool.knows_global_bound());
        assert_eq!(None, pool.global_bound());

        pool.prune(&mut |_| false);
        assert!(pool.knows_global_bound());
        assert_eq!(Some(5.0), pool.global_bound());
    }

    #[test]
    fn an_empty_pool_never_knows_a_global_bound() {
        let mut pool = HeapPool::<char>::new(Sense::Minimize);
        pool.insert(sp(1, 'a', 5.0));
        pool.prune(&mut |_| false);
        pool.remove_selected();
        assert!(!pool.knows_global_bound());
    }

    #[test]
    fn reset_rearms_the_dive_window() {
        let mut pool = HeapPool::new(Sense::Minimize);
        pool.insert(sp(1, 'a', 5.0));
        pool.prune(&mut |_| false);
        assert!(pool.knows_global_bound());

        pool.reset();
        assert!(pool.is_empty());
        pool.insert(sp(2, 'b', 3.0));
        assert!(!pool.knows_global_bound());
    }

    #[test]
    fn the_load_aggregate_stays_consistent_with_membership() {
        let mut pool = HeapPool::new(Sense::Minimize);
        let mut a = SubProblem::new(SubId { serial: 1, creator: 0 }, 'a', 3, Sense::Minimize);
        a.bound = 1.0;
        let mut b = SubProblem::new(SubId { serial: 2, creator: 0 }, 'b', 5, Sense::Minimize);
        b.bound = 2.0;
        pool.insert(a);
        let tb = pool.insert(b);
        assert_eq!(8, pool.load().depth_sum);
        assert_eq!(5, pool.load().max_depth);
        pool.remove(tb);
        assert_eq!(3, pool.load().depth_sum);
    }
}
