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

//! This module provides the distributed face of the solution repository.
//! Each accepted solution is owned by exactly one process (the one its
//! content hashes to); the coordinator routes misrouted solutions toward
//! their owner, merges the per-process archives up a static repository tree,
//! and broadcasts back the globally agreed worst-accepted threshold so that
//! every process can prune safely.

use std::cmp::Ordering;
use std::time::Instant;

use binary_heap_plus::BinaryHeap;
use compare::Compare;
use fxhash::{FxHashMap, FxHashSet};
use ordered_float::OrderedFloat;

use crate::{
    Envelope, Fabric, FlowRouter, Message, Packet, Params, ReposEntry, Sense, Solution,
    SolutionRepository, SolutionSink, SyncType, Tag, Topology,
};

/// The two operating regimes of the coordinator.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Phase {
    /// Before steady-state search begins: solutions are queued locally and
    /// reconciled by one synchronous exchange.
    RampUp,
    /// Normal, purely event-driven operation.
    SteadyState,
}

/// A cursor into one of the arrays of a k-way merge.
struct Cursor {
    array: usize,
    pos: usize,
}
/// Orders cursors so that the one looking at the globally best entry pops
/// first.
struct CursorOrder<'a> {
    sense: Sense,
    arrays: &'a [Vec<ReposEntry>],
}
impl Compare<Cursor> for CursorOrder<'_> {
    fn compare(&self, l: &Cursor, r: &Cursor) -> Ordering {
        let lk = self.arrays[l.array][l.pos].key(self.sense);
        let rk = self.arrays[r.array][r.pos].key(self.sense);
        // reversed: the smaller key pops first
        rk.cmp(&lk)
    }
}

/// Merges several ordered entry arrays into one, truncated to `cap`
/// entries, using a heap over per-array cursors.
fn kway_merge(sense: Sense, arrays: &[Vec<ReposEntry>], cap: usize) -> Vec<ReposEntry> {
    let cursors: Vec<Cursor> = arrays
        .iter()
        .enumerate()
        .filter(|(_, array)| !array.is_empty())
        .map(|(array, _)| Cursor { array, pos: 0 })
        .collect();
    let mut heap = BinaryHeap::from_vec_cmp(cursors, CursorOrder { sense, arrays });

    let mut merged: Vec<ReposEntry> = vec![];
    while merged.len() < cap {
        let cursor = match heap.pop() {
            Some(cursor) => cursor,
            None => break,
        };
        let entry = arrays[cursor.array][cursor.pos];
        let duplicate = merged
            .last()
            .map(|last| last.owner == entry.owner && last.serial == entry.serial)
            .unwrap_or(false);
        if !duplicate {
            merged.push(entry);
        }
        if cursor.pos + 1 < arrays[cursor.array].len() {
            heap.push(Cursor { array: cursor.array, pos: cursor.pos + 1 });
        }
    }
    merged
}

/// The per-process coordinator of the distributed repository. It stands in
/// for the plain `SolutionRepository` as the driver's `SolutionSink`; the
/// difference is that a reported solution may have to travel to its owning
/// process before the authoritative accept/reject decision is made.
pub struct ReposCoordinator {
    params: Params,
    sense: Sense,
    topology: Topology,
    fabric: Fabric,
    router: Option<FlowRouter>,
    repos: SolutionRepository,
    phase: Phase,
    finalizing: bool,
    ramp_up_queue: Vec<(Solution, SyncType)>,
    /// Latest known summary of each child subtree.
    child_arrays: FxHashMap<usize, Vec<ReposEntry>>,
    /// Children that reported since the last merge.
    fresh_reports: FxHashSet<usize>,
    need_repos_merge: bool,
    last_merge: Instant,
    threshold: Option<ReposEntry>,
    snapshot: Option<Vec<ReposEntry>>,
    next_serial: usize,
    forwarded: usize,
}

impl ReposCoordinator {
    /// Creates the coordinator of one process of the cluster.
    pub fn new(sense: Sense, params: Params, topology: Topology, fabric: Fabric) -> Self {
        let router = if params.flow_control {
            Some(FlowRouter::new(topology))
        } else {
            None
        };
        let repos = SolutionRepository::new(sense, params.enum_count);
        Self {
            params,
            sense,
            topology,
            fabric,
            router,
            repos,
            phase: Phase::RampUp,
            finalizing: false,
            ramp_up_queue: vec![],
            child_arrays: FxHashMap::default(),
            fresh_reports: FxHashSet::default(),
            need_repos_merge: false,
            last_merge: Instant::now(),
            threshold: None,
            snapshot: None,
            next_serial: 0,
            forwarded: 0,
        }
    }

    /// The current operating regime.
    pub fn phase(&self) -> Phase {
        self.phase
    }
    /// The local slice of the distributed repository (the solutions this
    /// process owns).
    pub fn repository(&self) -> &SolutionRepository {
        &self.repos
    }
    /// The globally agreed worst-accepted entry, if one was broadcast yet.
    pub fn threshold(&self) -> Option<ReposEntry> {
        self.threshold
    }
    /// The authoritative global k-best list, available after
    /// `final_repos_sync`.
    pub fn snapshot(&self) -> Option<&[ReposEntry]> {
        self.snapshot.as_deref()
    }
    /// The number of solutions this process handed to the network.
    pub fn forwarded(&self) -> usize {
        self.forwarded
    }
    /// The router, when flow control is enabled.
    pub fn router(&self) -> Option<&FlowRouter> {
        self.router.as_ref()
    }

    fn me(&self) -> usize {
        self.topology.me()
    }

    fn local_entries(&self) -> Vec<ReposEntry> {
        self.repos.members().iter().map(ReposEntry::of).collect()
    }

    /// Admits a solution this process is the authoritative owner of: it is
    /// (re)stamped with this process's rank and serial, then offered to the
    /// local repository. A local change arms the periodic repository merge.
    fn process_owned_solution(&mut self, mut solution: Solution) -> bool {
        solution.owner = self.me();
        self.next_serial += 1;
        solution.serial = self.next_serial;
        let accepted = self.repos.offer(solution);
        if accepted {
            self.need_repos_merge = true;
            tracing::debug!(process = self.me(), "solution archived locally");
        }
        accepted
    }

    /// Ships `solution` toward its owning process: through the router when
    /// flow control is enabled, straight to the owner otherwise
    /// (fire-and-forget).
    fn forward(&mut self, solution: Solution, owner: usize) {
        self.forwarded += 1;
        self.fabric.note_launched();
        let key = solution.value * self.sense.sign();
        if let Some(router) = self.router.as_mut() {
            let envelope = Envelope { key: OrderedFloat(key), owner, sol: solution };
            router.route(envelope, &self.fabric);
        } else {
            self.fabric.send(owner, Message::HashSol { owner, key, sol: solution });
        }
    }

    /// One round of the cooperative event loop: handles every message that
    /// already arrived, then possibly performs a throttled repository merge.
    /// Never blocks; returns the number of messages handled.
    pub fn service_messages(&mut self) -> usize {
        let mut handled = 0;
        while let Some(Packet { src, msg }) = self.fabric.poll() {
            handled += 1;
            match msg {
                Message::HashSol { owner, key, sol } => self.on_hash_sol(src, owner, key, sol),
                Message::AckSol => self.on_ack(src),
                Message::ReposArray { entries } => self.on_repos_array(src, entries),
                Message::NewLastSol { entry } => self.on_new_last_sol(entry),
            }
        }
        self.maybe_merge();
        handled
    }

    /// A solution arrived over a link: either this process is its owner and
    /// it is processed on the spot, or it is re-routed one hop closer to its
    /// owner. Either way the sender is unconditionally acknowledged.
    fn on_hash_sol(&mut self, src: usize, owner: usize, key: f64, sol: Solution) {
        if owner == self.me() {
            self.process_owned_solution(sol);
            self.fabric.note_settled();
        } else {
            let router = self
                .router
                .as_mut()
                .expect("a misrouted solution can only arrive when flow control is on");
            router.route(Envelope { key: OrderedFloat(key), owner, sol }, &self.fabric);
        }
        if self.params.flow_control {
            self.fabric.send(src, Message::AckSol);
        }
    }

    /// The credit of the link to `src` came back: the router may send the
    /// next queued envelope, discarding those that became fathomable while
    /// they waited.
    fn on_ack(&mut self, src: usize) {
        let threshold = self.prune_threshold(self.sense.worst());
        let threshold_key = threshold * self.sense.sign();
        let router = self
            .router
            .as_mut()
            .unwrap_or_else(|| panic!("acknowledgment received while flow control is disabled"));
        router.acknowledge(src, &self.fabric, &mut |envelope| {
            envelope.key.into_inner() > threshold_key
        });
    }

    /// A subtree summary arrived. Only registered children of this process
    /// in the repository tree may send one.
    fn on_repos_array(&mut self, src: usize, entries: Vec<ReposEntry>) {
        if !self.topology.is_tree_child(src) {
            panic!(
                "repository array from {src} which is not a child of {} in the repository tree",
                self.me()
            );
        }
        self.fresh_reports.insert(src);
        self.child_arrays.insert(src, entries);
    }

    /// Adopts a broadcast worst-accepted threshold: the local archive is
    /// pruned against it and it keeps traveling down the tree.
    fn on_new_last_sol(&mut self, entry: ReposEntry) {
        if self.threshold == Some(entry) {
            return;
        }
        self.adopt_threshold(entry);
        for child in self.topology.tree_children() {
            self.fabric.send(child, Message::NewLastSol { entry });
        }
    }

    fn adopt_threshold(&mut self, entry: ReposEntry) {
        tracing::debug!(value = entry.value, "global worst-accepted threshold updated");
        self.threshold = Some(entry);
        self.repos.prune_repository(&entry);
    }

    /// Performs the periodic merge if its cadence allows: a merge requires
    /// news (a local change or a child report) and is throttled so that
    /// neither message storms nor indefinite staleness can occur. With every
    /// child heard from, `repos_merge_seconds` is the pace; with children
    /// missing, the merge waits up to `repos_skew_seconds` for them.
    fn maybe_merge(&mut self) {
        if self.finalizing {
            return;
        }
        if !self.need_repos_merge && self.fresh_reports.is_empty() {
            return;
        }
        let children = self.topology.tree_children();
        let all_reported = children.iter().all(|c| self.fresh_reports.contains(c));
        let elapsed = self.last_merge.elapsed().as_secs_f64();
        let ready = if all_reported {
            elapsed >= self.params.repos_merge_seconds
        } else {
            elapsed >= self.params.repos_skew_seconds
        };
        if ready {
            self.merge_and_report();
        }
    }

    /// Merges the local archive with the latest child summaries and sends
    /// the result up the tree (or, at the root, broadcasts the new global
    /// threshold down).
    fn merge_and_report(&mut self) {
        self.need_repos_merge = false;
        self.fresh_reports.clear();
        self.last_merge = Instant::now();

        let mut arrays = vec![self.local_entries()];
        for child in self.topology.tree_children() {
            if let Some(entries) = self.child_arrays.get(&child) {
                arrays.push(entries.clone());
            }
        }
        let merged = kway_merge(self.sense, &arrays, self.params.enum_count);

        match self.topology.tree_parent() {
            Some(parent) => {
                tracing::debug!(to = parent, entries = merged.len(), "subtree summary sent");
                self.fabric.send(parent, Message::ReposArray { entries: merged });
            }
            None => {
                if !merged.is_empty() && merged.len() == self.params.enum_count {
                    let entry = merged[merged.len() - 1];
                    self.on_new_last_sol(entry);
                }
            }
        }
    }

    /// The synchronous exchange sealing the ramp-up phase: every queued
    /// solution is hashed to its owner and exchanged all-to-all, then the
    /// whole cluster agrees on the k-best list and its worst-accepted
    /// threshold through one synchronous merge up the repository tree, and
    /// the result is broadcast from the root. Idempotent: once in steady
    /// state, calling it again does nothing.
    pub fn ramp_up_sync(&mut self) {
        if self.phase == Phase::SteadyState {
            return;
        }
        let nb_processes = self.topology.nb_processes();
        let queued = std::mem::take(&mut self.ramp_up_queue);
        for (sol, sync) in queued {
            let owner = sol.owning_process(nb_processes);
            match sync {
                SyncType::Synchronous => {
                    // every process is guaranteed to have seen an identical
                    // call: the owner keeps its copy, everybody else lets go
                    if owner == self.me() {
                        self.process_owned_solution(sol);
                    }
                }
                SyncType::Local => {
                    if owner == self.me() {
                        self.process_owned_solution(sol);
                    } else {
                        let key = sol.value * self.sense.sign();
                        self.fabric.send(owner, Message::HashSol { owner, key, sol });
                    }
                }
            }
        }
        self.fabric.barrier();
        // by now every queued solution of every process has been delivered
        while let Some(Packet { msg, .. }) = self.fabric.poll() {
            match msg {
                Message::HashSol { sol, .. } => {
                    self.process_owned_solution(sol);
                }
                _ => panic!("unexpected traffic during ramp-up synchronization"),
            }
        }
        self.need_repos_merge = false;
        // nobody may start the tree merge before everyone is done draining,
        // lest a merge message be mistaken for ramp-up traffic
        self.fabric.barrier();

        let global = self.sync_repos_arrays();
        if !global.is_empty() && global.len() == self.params.enum_count {
            self.adopt_threshold(global[global.len() - 1]);
        }

        self.phase = Phase::SteadyState;
        self.last_merge = Instant::now();
        self.fabric.barrier();
    }

    /// The fully synchronous variant of the repository-tree merge: every
    /// process blocks until its children reported, the root merges the whole
    /// cluster, and the authoritative order-consistent list travels back
    /// down. Returns that global list.
    fn sync_repos_arrays(&mut self) -> Vec<ReposEntry> {
        let mut arrays = vec![self.local_entries()];
        for child in self.topology.tree_children() {
            match self.fabric.recv_from(child, Tag::ReposArray).msg {
                Message::ReposArray { entries } => arrays.push(entries),
                _ => unreachable!("the repos-array channel only carries repos arrays"),
            }
        }
        let merged = kway_merge(self.sense, &arrays, self.params.enum_count);

        let global = match self.topology.tree_parent() {
            None => merged,
            Some(parent) => {
                self.fabric.send(parent, Message::ReposArray { entries: merged });
                match self.fabric.recv_from(parent, Tag::ReposArray).msg {
                    Message::ReposArray { entries } => entries,
                    _ => unreachable!("the repos-array channel only carries repos arrays"),
                }
            }
        };
        for child in self.topology.tree_children() {
            self.fabric.send(child, Message::ReposArray { entries: global.clone() });
        }
        global
    }

    /// Produces the authoritative, order-consistent snapshot of the whole
    /// distributed repository for result enumeration. The first call drains
    /// every message still traveling, then performs the synchronous tree
    /// merge; subsequent calls return the memoized snapshot (idempotent).
    pub fn final_repos_sync(&mut self) -> &[ReposEntry] {
        if self.snapshot.is_none() {
            if self.phase == Phase::RampUp {
                self.ramp_up_sync();
            }
            self.finalizing = true;
            let mut rounds = 0;
            loop {
                self.service_messages();
                self.fabric.barrier();
                // nobody touches the pending count between these barriers,
                // so every process reads the same value and takes the same
                // decision
                let quiescent = self.fabric.pending() == 0;
                self.fabric.barrier();
                rounds += 1;
                if rounds >= 2 && quiescent {
                    break;
                }
            }
            let global = self.sync_repos_arrays();
            if !global.is_empty() && global.len() == self.params.enum_count {
                self.adopt_threshold(global[global.len() - 1]);
            }
            self.snapshot = Some(global);
            self.fabric.barrier();
        }
        self.snapshot.as_deref().unwrap()
    }
}

impl SolutionSink for ReposCoordinator {
    /// During ramp-up, solutions are queued locally for the synchronous
    /// reconciliation. In steady state, an owned solution is processed on
    /// the spot while a foreign one starts traveling; only the owner's
    /// verdict is authoritative, so a forwarded solution reports `false`.
    fn offer(&mut self, solution: Solution, sync: SyncType) -> bool {
        match self.phase {
            Phase::RampUp => {
                self.ramp_up_queue.push((solution, sync));
                false
            }
            Phase::SteadyState => {
                let owner = solution.owning_process(self.topology.nb_processes());
                if owner == self.me() {
                    self.process_owned_solution(solution)
                } else {
                    self.forward(solution, owner);
                    false
                }
            }
        }
    }

    /// Fathoming uses the tightest safe value this process knows: the local
    /// archive's worst-accepted value (or the incumbent when not
    /// enumerating), further tightened by the broadcast global threshold.
    fn prune_threshold(&self, incumbent: f64) -> f64 {
        let mut threshold = if self.params.enum_count <= 1 {
            incumbent
        } else {
            self.repos.worst_accepted()
        };
        if let Some(t) = self.threshold {
            if self.sense.is_better(t.value, threshold) {
                threshold = t.value;
            }
        }
        threshold
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################


#[cfg(test)]
mod test_coordinator {
    use crate::*;

    fn params(enum_count: usize) -> Params {
        ParamsBuilder::default()
            .enum_count(enum_count)
            .repos_merge_seconds(0.0)
            .repos_skew_seconds(0.0)
            .build()
            .unwrap()
    }

    fn single(enum_count: usize) -> ReposCoordinator {
        let fabric = Fabric::cluster(1).pop().unwrap();
        ReposCoordinator::new(Sense::Minimize, params(enum_count), Topology::new(1, 0), fabric)
    }

    #[test]
    fn during_ramp_up_solutions_are_queued_not_archived() {
        let mut coordinator = single(2);
        coordinator.offer(Solution::new(5.0, 0, 0, vec![1]), SyncType::Local);
        assert_eq!(Phase::RampUp, coordinator.phase());
        assert!(coordinator.repository().is_empty());
    }

    #[test]
    fn the_ramp_up_sync_reconciles_the_queue_and_enters_steady_state() {
        let mut coordinator = single(2);
        coordinator.offer(Solution::new(5.0, 0, 0, vec![1]), SyncType::Local);
        coordinator.offer(Solution::new(3.0, 0, 0, vec![2]), SyncType::Synchronous);

        coordinator.ramp_up_sync();

        assert_eq!(Phase::SteadyState, coordinator.phase());
        assert_eq!(2, coordinator.repository().len());
        // the repository is full, so the sync also fixed the threshold
        assert_eq!(5.0, coordinator.threshold().unwrap().value);
    }

    #[test]
    fn the_ramp_up_sync_is_idempotent() {
        let mut coordinator = single(2);
        coordinator.offer(Solution::new(5.0, 0, 0, vec![1]), SyncType::Local);
        coordinator.ramp_up_sync();
        let archived = coordinator.repository().len();
        coordinator.ramp_up_sync();
        assert_eq!(archived, coordinator.repository().len());
    }

    #[test]
    fn in_steady_state_an_owned_solution_is_archived_on_the_spot() {
        let mut coordinator = single(2);
        coordinator.ramp_up_sync();
        // with a single process, every solution is an owned solution
        assert!(coordinator.offer(Solution::new(5.0, 0, 0, vec![1]), SyncType::Local));
        assert_eq!(1, coordinator.repository().len());
    }

    #[test]
    fn owned_solutions_are_restamped_with_the_owner_serial() {
        let mut coordinator = single(3);
        coordinator.ramp_up_sync();
        coordinator.offer(Solution::new(5.0, 99, 0, vec![1]), SyncType::Local);
        coordinator.offer(Solution::new(3.0, 42, 0, vec![2]), SyncType::Local);
        let serials: Vec<usize> = coordinator
            .repository()
            .members()
            .iter()
            .map(|s| s.serial)
            .collect();
        assert_eq!(vec![2, 1], serials);
    }

    #[test]
    fn while_enumerating_the_prune_threshold_tracks_the_archive() {
        let mut coordinator = single(2);
        coordinator.ramp_up_sync();
        assert_eq!(f64::INFINITY, coordinator.prune_threshold(1.0));
        coordinator.offer(Solution::new(5.0, 0, 0, vec![1]), SyncType::Local);
        coordinator.offer(Solution::new(3.0, 0, 0, vec![2]), SyncType::Local);
        assert_eq!(5.0, coordinator.prune_threshold(1.0));
    }

    #[test]
    fn the_final_sync_memoizes_its_snapshot() {
        let mut coordinator = single(2);
        coordinator.offer(Solution::new(5.0, 0, 0, vec![1]), SyncType::Local);
        coordinator.offer(Solution::new(3.0, 0, 0, vec![2]), SyncType::Local);

        let first: Vec<f64> = coordinator.final_repos_sync().iter().map(|e| e.value).collect();
        let second: Vec<f64> = coordinator.final_repos_sync().iter().map(|e| e.value).collect();
        assert_eq!(vec![3.0, 5.0], first);
        assert_eq!(first, second);
    }

    #[test]
    #[should_panic]
    fn a_repos_array_from_a_non_child_is_fatal() {
        let mut endpoints = Fabric::cluster(4);
        // process 3 is a child of 1, not of 0
        let stray = endpoints.remove(3);
        stray.send(0, Message::ReposArray { entries: vec![] });

        let fabric = endpoints.remove(0);
        let mut coordinator =
            ReposCoordinator::new(Sense::Minimize, params(1), Topology::new(4, 0), fabric);
        coordinator.service_messages();
    }
}
