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

//! This module provides the implementation of a simple solution repository:
//! an ordered (by value, worst-last) collection capped at `enum_count`
//! entries plus a hash index for duplicate detection.

use fxhash::FxHashMap;
use ordered_float::OrderedFloat;

use crate::{Sense, Solution, SolutionSink, SyncType};

/// The identity of an archived solution, as exchanged between processes:
/// its value plus the (owner, serial) pair that pins down the actual
/// content held by the owning process. Entries order consistently on every
/// process: by value first (normalized by the sense), then owner, then
/// serial.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ReposEntry {
    /// The objective value of the archived solution.
    pub value: f64,
    /// Rank of the process that owns the solution content.
    pub owner: usize,
    /// Per-owning-process sequence number of the solution.
    pub serial: usize,
}
impl ReposEntry {
    /// The entry standing for `solution`.
    pub fn of(solution: &Solution) -> Self {
        Self { value: solution.value, owner: solution.owner, serial: solution.serial }
    }
    /// The sort key of this entry: identical on every process, which is
    /// what makes merged repository arrays order-consistent.
    pub fn key(&self, sense: Sense) -> (OrderedFloat<f64>, usize, usize) {
        (OrderedFloat(self.value * sense.sign()), self.owner, self.serial)
    }
}

/// A capped best-k archive of accepted solutions with duplicate detection.
///
/// Members are kept ordered by value, worst-last. When the archive is full,
/// every member is at least as good as the worst-accepted threshold, and
/// that threshold only ever tightens for the life of the repository.
pub struct SolutionRepository {
    sense: Sense,
    enum_count: usize,
    members: Vec<Solution>,
    /// content hash -> number of members carrying it (duplicate pre-check)
    index: FxHashMap<u64, usize>,
    duplicates: usize,
    rejections: usize,
}

impl SolutionRepository {
    /// Creates an empty repository retaining the `enum_count` best distinct
    /// solutions under the given sense.
    pub fn new(sense: Sense, enum_count: usize) -> Self {
        Self {
            sense,
            enum_count,
            members: vec![],
            index: FxHashMap::default(),
            duplicates: 0,
            rejections: 0,
        }
    }

    /// The number of distinct solutions the repository may retain.
    pub fn enum_count(&self) -> usize {
        self.enum_count
    }
    /// The number of archived solutions.
    pub fn len(&self) -> usize {
        self.members.len()
    }
    /// True iff nothing has been archived yet.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
    /// The archived solutions, best first and worst last.
    pub fn members(&self) -> &[Solution] {
        &self.members
    }
    /// The number of duplicate offers that were silently rejected.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
    /// The number of offers rejected for failing the worst-accepted value.
    pub fn rejections(&self) -> usize {
        self.rejections
    }

    /// The value a new solution must beat to be admitted: the worst archived
    /// value when the repository is full, the worst conceivable value (i.e.
    /// anything is welcome) while it still has room.
    pub fn worst_accepted(&self) -> f64 {
        if self.members.len() < self.enum_count {
            self.sense.worst()
        } else {
            self.members.last().map(|s| s.value).unwrap_or_else(|| self.sense.worst())
        }
    }

    fn is_duplicate(&self, solution: &Solution) -> bool {
        if !self.index.contains_key(&solution.hash_value()) {
            return false;
        }
        self.members
            .iter()
            .any(|m| m.hash_value() == solution.hash_value() && m.same_as(solution))
    }

    fn insert_sorted(&mut self, solution: Solution) {
        *self.index.entry(solution.hash_value()).or_insert(0) += 1;
        let key = ReposEntry::of(&solution).key(self.sense);
        let at = self
            .members
            .partition_point(|m| ReposEntry::of(m).key(self.sense) <= key);
        self.members.insert(at, solution);
    }

    fn evict(&mut self, at: usize) -> Solution {
        let evicted = self.members.remove(at);
        let hash = evicted.hash_value();
        if let Some(n) = self.index.get_mut(&hash) {
            *n -= 1;
            if *n == 0 {
                self.index.remove(&hash);
            }
        }
        evicted
    }

    /// Offers `solution` for archival; returns true iff it was admitted.
    /// Duplicates and solutions dominated by the worst-accepted threshold
    /// are silently rejected (and counted in the statistics).
    pub fn offer(&mut self, solution: Solution) -> bool {
        if self.enum_count == 0 {
            return false;
        }
        if self.is_duplicate(&solution) {
            self.duplicates += 1;
            return false;
        }
        if self.members.len() < self.enum_count {
            self.insert_sorted(solution);
            return true;
        }
        if self.sense.is_better(solution.value, self.worst_accepted()) {
            let last = self.members.len() - 1;
            drop(self.evict(last));
            self.insert_sorted(solution);
            return true;
        }
        self.rejections += 1;
        false
    }

    /// Re-validates the membership against a newly broadcast global
    /// worst-accepted threshold and evicts every member that orders after
    /// it. Returns the number of evicted members.
    pub fn prune_repository(&mut self, threshold: &ReposEntry) -> usize {
        let key = threshold.key(self.sense);
        let mut evicted = 0;
        while let Some(last) = self.members.last() {
            if ReposEntry::of(last).key(self.sense) > key {
                let at = self.members.len() - 1;
                drop(self.evict(at));
                evicted += 1;
            } else {
                break;
            }
        }
        evicted
    }
}

impl SolutionSink for SolutionRepository {
    fn offer(&mut self, solution: Solution, _sync: SyncType) -> bool {
        SolutionRepository::offer(self, solution)
    }

    fn prune_threshold(&self, incumbent: f64) -> f64 {
        if self.enum_count <= 1 {
            incumbent
        } else {
            self.worst_accepted()
        }
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
