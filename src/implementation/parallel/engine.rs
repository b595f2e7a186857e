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

//! This module glues a serial driver to a repository coordinator into the
//! per-process engine of an SPMD run: a single cooperative loop alternating
//! between local search work and message servicing. No threads exist inside
//! a process; parallelism only comes from running one engine per process.

use crate::{Completion, Fabric, ReposCoordinator, SequentialSolver, Solver, StepOutcome, Topology};

/// The endpoints of a simulated cluster. Every participant gets its own
/// `Topology` and `Fabric`; the caller typically moves each pair into its
/// own OS thread and builds a `ProcessEngine` there.
pub struct Cluster {
    fabrics: Vec<Fabric>,
}

impl Cluster {
    /// Builds a cluster of `nb_processes` participants.
    pub fn new(nb_processes: usize) -> Self {
        Self { fabrics: Fabric::cluster(nb_processes) }
    }
    /// Builds a cluster with one participant per hardware thread.
    pub fn with_default_size() -> Self {
        Self::new(num_cpus::get().max(1))
    }
    /// The number of participants.
    pub fn nb_processes(&self) -> usize {
        self.fabrics.len()
    }
    /// Splits the cluster into its per-process endpoints.
    pub fn endpoints(self) -> Vec<(Topology, Fabric)> {
        let nb_processes = self.fabrics.len();
        self.fabrics
            .into_iter()
            .enumerate()
            .map(|(me, fabric)| (Topology::new(nb_processes, me), fabric))
            .collect()
    }
}

/// One process of a distributed run: the serial driver explores its share
/// of the tree while the coordinator keeps the distributed repository
/// honest. The loop is purely event-driven; absence of inbound traffic on a
/// given poll simply hands control back to the search.
pub struct ProcessEngine<'a, State> {
    solver: SequentialSolver<'a, State>,
    coordinator: ReposCoordinator,
}

impl<'a, State> ProcessEngine<'a, State> {
    /// Builds the engine from its two halves.
    pub fn new(solver: SequentialSolver<'a, State>, coordinator: ReposCoordinator) -> Self {
        Self { solver, coordinator }
    }

    /// The driver half.
    pub fn solver(&self) -> &SequentialSolver<'a, State> {
        &self.solver
    }
    /// The coordinator half.
    pub fn coordinator(&self) -> &ReposCoordinator {
        &self.coordinator
    }

    /// Reports a solution known before the search even starts (it lands in
    /// the ramp-up queue and is reconciled by the ramp-up synchronization).
    pub fn seed_solution(&mut self, value: f64, content: Vec<isize>, sync: crate::SyncType) {
        self.solver.found_solution(&mut self.coordinator, value, content, sync);
    }

    /// Runs this process's share of the search: ramp-up synchronization,
    /// then the cooperative search/service loop until the local pool is
    /// exhausted, and finally the cluster-wide repository synchronization.
    /// Every process of the cluster must run this for any of them to
    /// complete.
    pub fn run(&mut self) -> Completion {
        self.solver.initialize();
        self.coordinator.ramp_up_sync();

        let completion = loop {
            match self.solver.step(&mut self.coordinator) {
                StepOutcome::Explored => {
                    self.coordinator.service_messages();
                }
                StepOutcome::Aborted => {
                    break Completion { is_exact: false, best_value: self.solver.best_value() }
                }
                StepOutcome::Complete => {
                    break Completion { is_exact: true, best_value: self.solver.best_value() }
                }
            }
        };

        self.coordinator.final_repos_sync();
        completion
    }
}
