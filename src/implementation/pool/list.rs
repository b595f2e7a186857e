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

//! This module provides the implementation of the list-based pool: a doubly
//! linked list over an arena of subproblems. In stack mode the search is
//! depth-first, in queue mode it is breadth-first.

use crate::{Pool, PoolLoad, PoolToken, SubProblem};

/// The traversal order of a `ListPool`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ListOrder {
    /// Stack mode: `select` returns the most recently inserted member,
    /// which makes the search depth-first.
    Lifo,
    /// Queue mode: `select` returns the oldest member, which makes the
    /// search breadth-first.
    Fifo,
}

struct Entry<T> {
    sp: SubProblem<T>,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Slot<T> {
    gen: u32,
    entry: Option<Entry<T>>,
}

/// A pool backed by a doubly linked list threaded through an arena of
/// slots. Handles are (slot, generation) pairs so that a stale handle is
/// detected instead of silently addressing a recycled slot. `prune` walks
/// the whole list once per call and removes every immediately fathomable
/// member.
pub struct ListPool<T> {
    slots: Vec<Slot<T>>,
    recycle_bin: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    load: PoolLoad,
    order: ListOrder,
}

impl<T> ListPool<T> {
    /// Creates an empty pool with the given traversal order.
    pub fn new(order: ListOrder) -> Self {
        Self {
            slots: vec![],
            recycle_bin: vec![],
            head: None,
            tail: None,
            load: PoolLoad::default(),
            order,
        }
    }

    fn checked_slot(&self, token: PoolToken) -> usize {
        let live = self
            .slots
            .get(token.slot)
            .map(|s| s.gen == token.gen && s.entry.is_some())
            .unwrap_or(false);
        if !live {
            panic!("subproblem behind {:?} is not a member of this pool", token);
        }
        token.slot
    }

    fn unlink(&mut self, slot: usize) -> SubProblem<T> {
        let entry = self.slots[slot].entry.take().unwrap();
        match entry.prev {
            Some(p) => self.slots[p].entry.as_mut().unwrap().next = entry.next,
            None => self.head = entry.next,
        }
        match entry.next {
            Some(n) => self.slots[n].entry.as_mut().unwrap().prev = entry.prev,
            None => self.tail = entry.prev,
        }
        self.slots[slot].gen = self.slots[slot].gen.wrapping_add(1);
        self.recycle_bin.push(slot);
        self.load.sub(entry.sp.depth);
        entry.sp
    }
}

impl<T> Pool for ListPool<T> {
    type State = T;

    fn insert(&mut self, sp: SubProblem<T>) -> PoolToken {
        self.load.add(sp.depth);

        let slot = match self.recycle_bin.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(Slot { gen: 0, entry: None });
                self.slots.len() - 1
            }
        };
        let token = PoolToken { slot, gen: self.slots[slot].gen };

        match self.order {
            ListOrder::Lifo => {
                self.slots[slot].entry = Some(Entry { sp, prev: None, next: self.head });
                if let Some(h) = self.head {
                    self.slots[h].entry.as_mut().unwrap().prev = Some(slot);
                }
                self.head = Some(slot);
                if self.tail.is_none() {
                    self.tail = Some(slot);
                }
            }
            ListOrder::Fifo => {
                self.slots[slot].entry = Some(Entry { sp, prev: self.tail, next: None });
                if let Some(t) = self.tail {
                    self.slots[t].entry.as_mut().unwrap().next = Some(slot);
                }
                self.tail = Some(slot);
                if self.head.is_none() {
                    self.head = Some(slot);
                }
            }
        }
        token
    }

    fn select(&self) -> Option<PoolToken> {
        self.head.map(|slot| PoolToken { slot, gen: self.slots[slot].gen })
    }

    fn get(&self, token: PoolToken) -> &SubProblem<T> {
        let slot = self.checked_slot(token);
        &self.slots[slot].entry.as_ref().unwrap().sp
    }

    fn get_mut(&mut self, token: PoolToken) -> &mut SubProblem<T> {
        let slot = self.checked_slot(token);
        &mut self.slots[slot].entry.as_mut().unwrap().sp
    }

    fn remove(&mut self, token: PoolToken) -> SubProblem<T> {
        let slot = self.checked_slot(token);
        self.unlink(slot)
    }

    fn prune(&mut self, fathomable: &mut dyn FnMut(&SubProblem<T>) -> bool) -> usize {
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            cursor = self.slots[slot].entry.as_ref().unwrap().next;
            if fathomable(&self.slots[slot].entry.as_ref().unwrap().sp) {
                drop(self.unlink(slot));
            }
        }
        self.load.count
    }

    fn scan(&self) -> Box<dyn Iterator<Item = &SubProblem<T>> + '_> {
        Box::new(
            std::iter::successors(self.head, move |&slot| {
                self.slots[slot].entry.as_ref().unwrap().next
            })
            .map(move |slot| &self.slots[slot].entry.as_ref().unwrap().sp),
        )
    }

    fn unload_candidates(&self, max: usize) -> Vec<PoolToken> {
        // the tail holds the shallowest (stack mode) or oldest members:
        // the ones standing for the largest residual subtrees
        std::iter::successors(self.tail, move |&slot| {
            self.slots[slot].entry.as_ref().unwrap().prev
        })
        .take(max)
        .map(|slot| PoolToken { slot, gen: self.slots[slot].gen })
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
        self.head = None;
        self.tail = None;
        self.load = PoolLoad::default();
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_list_pool {
    use crate::{ListOrder, ListPool, Pool, Sense, SubId, SubProblem};

    fn sp(serial: i64, tag: char, bound: f64, depth: usize) -> SubProblem<char> {
        let mut sp = SubProblem::new(
            SubId { serial, creator: 0 },
            tag,
            depth,
            Sense::Minimize,
        );
        sp.bound = bound;
        sp
    }

    #[test]
    fn by_default_it_is_empty() {
        let pool = ListPool::<char>::new(ListOrder::Lifo);
        assert!(pool.is_empty());
        assert!(pool.select().is_none());
    }

    #[test]
    fn in_stack_mode_select_returns_the_most_recent_insert() {
        let mut pool = ListPool::new(ListOrder::Lifo);
        pool.insert(sp(1, 'a', 1.0, 0));
        pool.insert(sp(2, 'b', 2.0, 1));
        pool.insert(sp(3, 'c', 3.0, 1));
        let token = pool.select().unwrap();
        assert_eq!('c', pool.get(token).state);
    }

    #[test]
    fn in_queue_mode_select_returns_the_oldest_insert() {
        let mut pool = ListPool::new(ListOrder::Fifo);
        pool.insert(sp(1, 'a', 1.0, 0));
        pool.insert(sp(2, 'b', 2.0, 1));
        pool.insert(sp(3, 'c', 3.0, 1));
        let token = pool.select().unwrap();
        assert_eq!('a', pool.get(token).state);
    }

    #[test]
    fn size_tracks_inserts_minus_removals() {
        let mut pool = ListPool::new(ListOrder::Lifo);
        let a = pool.insert(sp(1, 'a', 1.0, 0));
        let _b = pool.insert(sp(2, 'b', 2.0, 1));
        assert_eq!(2, pool.len());
        pool.remove(a);
        assert_eq!(1, pool.len());
        pool.remove_selected().unwrap();
        assert!(pool.is_empty());
    }

    #[test]
    fn removal_by_token_is_position_independent() {
        let mut pool = ListPool::new(ListOrder::Lifo);
        let _a = pool.insert(sp(1, 'a', 1.0, 0));
        let b = pool.insert(sp(2, 'b', 2.0, 1));
        let _c = pool.insert(sp(3, 'c', 3.0, 1));
        let removed = pool.remove(b);
        assert_eq!('b', removed.state);
        let members: Vec<char> = pool.scan().map(|sp| sp.state).collect();
        assert_eq!(vec!['c', 'a'], members);
    }

    #[test]
    #[should_panic]
    fn removing_a_non_member_is_fatal() {
        let mut pool = ListPool::new(ListOrder::Lifo);
        let a = pool.insert(sp(1, 'a', 1.0, 0));
        pool.remove(a);
        pool.remove(a); // stale token
    }

    #[test]
    fn prune_walks_the_whole_list_and_keeps_the_survivors() {
        let mut pool = ListPool::new(ListOrder::Lifo);
        pool.insert(sp(1, 'a', 10.0, 0));
        pool.insert(sp(2, 'b', 1.0, 1));
        pool.insert(sp(3, 'c', 12.0, 1));

        // a and c are fathomable against an incumbent of 5
        let remaining = pool.prune(&mut |sp| sp.bound >= 5.0);

        assert_eq!(1, remaining);
        let members: Vec<char> = pool.scan().map(|sp| sp.state).collect();
        assert_eq!(vec!['b'], members);
    }

    #[test]
    fn the_load_aggregate_stays_consistent_with_membership() {
        let mut pool = ListPool::new(ListOrder::Fifo);
        let a = pool.insert(sp(1, 'a', 1.0, 2));
        pool.insert(sp(2, 'b', 2.0, 4));
        assert_eq!(2, pool.load().count);
        assert_eq!(6, pool.load().depth_sum);
        assert_eq!(4, pool.load().max_depth);
        pool.remove(a);
        assert_eq!(1, pool.load().count);
        assert_eq!(4, pool.load().depth_sum);
    }

    #[test]
    fn scan_restarts_from_the_beginning_each_time() {
        let mut pool = ListPool::new(ListOrder::Lifo);
        pool.insert(sp(1, 'a', 1.0, 0));
        pool.insert(sp(2, 'b', 2.0, 1));
        let first: Vec<char> = pool.scan().map(|sp| sp.state).collect();
        let second: Vec<char> = pool.scan().map(|sp| sp.state).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn unload_candidates_come_from_the_far_end() {
        let mut pool = ListPool::new(ListOrder::Lifo);
        pool.insert(sp(1, 'a', 1.0, 0));
        pool.insert(sp(2, 'b', 2.0, 1));
        pool.insert(sp(3, 'c', 3.0, 2));
        let candidates = pool.unload_candidates(2);
        let tags: Vec<char> = candidates.iter().map(|&t| pool.get(t).state).collect();
        assert_eq!(vec!['a', 'b'], tags);
    }

    #[test]
    fn slots_are_recycled_with_a_fresh_generation() {
        let mut pool = ListPool::new(ListOrder::Lifo);
        let a = pool.insert(sp(1, 'a', 1.0, 0));
        pool.remove(a);
        let b = pool.insert(sp(2, 'b', 2.0, 0));
        assert_eq!(a.slot, b.slot);
        assert_ne!(a.gen, b.gen);
        assert_eq!('b', pool.get(b).state);
    }
}
