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

//! This module provides the implementation of the serial branch-and-bound
//! driver: pop a subproblem off the pool, bound it, fathom-test it against
//! the incumbent, split it into children, reinsert.

use crate::{
    Completion, Cutoff, Incumbent, NoSink, Params, Pool, Problem, Reason, SearchContext,
    SearchStats, Solution, SolutionSink, Solver, Status, SubProblem, SyncType,
};

/// What a single driver iteration amounted to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StepOutcome {
    /// The pool is exhausted (or convergence was declared): the search is
    /// over and its result is exact.
    Complete,
    /// The cutoff criterion fired: the search is over but inexact.
    Aborted,
    /// One subproblem was processed; call `step` again.
    Explored,
}

/// This is the structure implementing the serial branch-and-bound driver.
/// Everything problem-specific is delegated to the `Problem` collaborator;
/// everything strategy-specific (which live subproblem to explore next) to
/// the `Pool`.
///
/// The driver owns the incumbent. Candidate solutions are funneled through
/// `found_solution`, which also offers them to the provided `SolutionSink`
/// (the k-best repository, or the distributed coordinator standing in for
/// it); an improving candidate arms the `need_pruning` flag so that the
/// next pool access sweeps out the freshly fathomable members.
pub struct SequentialSolver<'a, State> {
    problem: &'a (dyn Problem<State = State>),
    pool: &'a mut (dyn Pool<State = State>),
    cutoff: &'a (dyn Cutoff),
    ctx: SearchContext,
    incumbent: Incumbent,
    current: Option<SubProblem<State>>,
    need_pruning: bool,
    converged: bool,
    initialized: bool,
    abort_reason: Option<Reason>,
    stats: SearchStats,
}

impl<'a, State> SequentialSolver<'a, State> {
    /// Creates a driver with the default parameters (zero fathoming
    /// tolerances) for a single-process search.
    pub fn new(
        problem: &'a (dyn Problem<State = State>),
        pool: &'a mut (dyn Pool<State = State>),
        cutoff: &'a (dyn Cutoff),
    ) -> Self {
        Self::custom(problem, pool, cutoff, SearchContext::new(0), &Params::default())
    }

    /// Creates a fully parameterized driver. The context carries the rank
    /// of the process the driver runs on and the counters ids are minted
    /// from.
    pub fn custom(
        problem: &'a (dyn Problem<State = State>),
        pool: &'a mut (dyn Pool<State = State>),
        cutoff: &'a (dyn Cutoff),
        ctx: SearchContext,
        params: &Params,
    ) -> Self {
        let incumbent = Incumbent::new(problem.sense(), params.abs_tolerance, params.rel_tolerance);
        SequentialSolver {
            problem,
            pool,
            cutoff,
            ctx,
            incumbent,
            current: None,
            need_pruning: false,
            converged: false,
            initialized: false,
            abort_reason: None,
            stats: SearchStats::default(),
        }
    }

    /// The statistics collected so far.
    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }
    /// The incumbent tracker (best known solution and gap arithmetic).
    pub fn incumbent(&self) -> &Incumbent {
        &self.incumbent
    }
    /// Why the search gave up on a complete proof, if it did.
    pub fn abort_reason(&self) -> Option<Reason> {
        self.abort_reason
    }
    /// True iff a subproblem is currently loaded for processing.
    pub fn have_current_sp(&self) -> bool {
        self.current.is_some()
    }
    /// Tells the driver the problem is already converged: the next `step`
    /// reports completion without touching the pool.
    pub fn declare_converged(&mut self) {
        self.converged = true;
    }
    /// Seeds the incumbent with an externally known solution. An improving
    /// seed arms pruning exactly like a discovered one.
    pub fn set_primal(&mut self, solution: Solution) {
        if self.incumbent.try_improve(&solution) {
            self.need_pruning = true;
        }
    }

    /// Inserts an externally built subproblem into the pool. This is how
    /// synthetic probes (id serial `<= 0`) enter a search; regular drivers
    /// never need it.
    pub fn inject(&mut self, sp: SubProblem<State>) {
        if !sp.id.is_synthetic() {
            self.stats.record_transition(Status::Boundable);
        }
        self.pool.insert(sp);
    }

    /// This method initializes the problem resolution. Put more simply,
    /// this method posts the root subproblem onto the pool so that the
    /// processing can be bootstrapped.
    pub fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        let root = SubProblem::new(
            self.ctx.next_id(),
            self.problem.root_state(),
            0,
            self.problem.sense(),
        );
        self.stats.record_transition(Status::Boundable);
        self.pool.insert(root);
    }

    /// The single entry point by which any component (the driver itself or
    /// the application) reports a candidate solution. The candidate is
    /// offered to the sink; if it strictly improves the incumbent, the next
    /// pool access performs a prune before continuing.
    pub fn found_solution(
        &mut self,
        sink: &mut dyn SolutionSink,
        value: f64,
        content: Vec<isize>,
        sync: SyncType,
    ) {
        let serial = self.ctx.next_solution_serial();
        let solution = Solution::new(value, serial, self.ctx.processor, content);
        self.stats.solutions_found += 1;
        sink.offer(solution.clone(), sync);
        if self.incumbent.try_improve(&solution) {
            tracing::debug!(value = solution.value, "incumbent improved");
            self.need_pruning = true;
        }
    }

    fn advance(&mut self, sp: &mut SubProblem<State>, to: Status) {
        sp.advance_to(to);
        if !sp.id.is_synthetic() {
            self.stats.record_transition(to);
        }
    }

    /// Recycles a terminal subproblem: its destructor runs here.
    fn recycle(&mut self, mut sp: SubProblem<State>) {
        self.advance(&mut sp, Status::Dead);
    }

    /// The driver hook honoring the `need_pruning` flag: both pool
    /// strategies are swept through this very call.
    fn prune_pool(&mut self, sink: &dyn SolutionSink) {
        self.need_pruning = false;
        let threshold = sink.prune_threshold(self.incumbent.value());
        let incumbent = self.incumbent.clone();
        let mut swept = 0usize;
        let before = self.pool.len();
        self.pool.prune(&mut |sp| {
            let fathomable = incumbent.can_fathom_against(threshold, sp.bound);
            if fathomable && !sp.id.is_synthetic() {
                swept += 1;
            }
            fathomable
        });
        self.stats.pruned += swept;
        self.stats.recycled += swept;
        tracing::trace!(before, pruned = swept, "pool pruned");
    }

    /// Performs one iteration of the search loop: load a subproblem if none
    /// is loaded, bound it, fathom-test it, and either recycle it or split
    /// it back into the pool.
    pub fn step(&mut self, sink: &mut dyn SolutionSink) -> StepOutcome {
        if self.converged {
            return StepOutcome::Complete;
        }
        if self.cutoff.must_stop(self.stats.bounded) {
            self.abort_reason = Some(Reason::CutoffOccurred);
            return StepOutcome::Aborted;
        }
        if self.need_pruning {
            self.prune_pool(sink);
        }
        if self.current.is_none() {
            self.current = self.pool.remove_selected();
        }
        let mut sp = match self.current.take() {
            Some(sp) => sp,
            None => return StepOutcome::Complete,
        };

        // 1. bound it
        sp.bound = self.problem.compute_bound(&mut sp.state);
        self.advance(&mut sp, Status::Bounded);
        self.stats.max_depth = self.stats.max_depth.max(sp.depth);

        // 2. report the candidate it may embed
        if self.problem.candidate_solution(&sp.state) {
            if let Some((value, content)) = self.problem.extract_solution(&sp.state) {
                self.found_solution(sink, value, content, SyncType::Local);
            }
        }

        // 3. fathom-test it
        let threshold = sink.prune_threshold(self.incumbent.value());
        if self.incumbent.can_fathom_against(threshold, sp.bound)
            || self.problem.can_fathom(&sp.state, sp.bound, &self.incumbent)
        {
            self.stats.fathomed += 1;
            self.recycle(sp);
            return StepOutcome::Explored;
        }

        // 4. split it
        let total = self.problem.child_count(&sp.state);
        sp.total_children = total;
        sp.children_left = total;
        for which in 0..total {
            let child_state = self.problem.make_child(&sp.state, which);
            let child = SubProblem::new(
                self.ctx.next_id(),
                child_state,
                sp.depth + 1,
                self.problem.sense(),
            );
            self.stats.record_transition(Status::Boundable);
            self.pool.insert(child);
            sp.children_left -= 1;
        }
        self.advance(&mut sp, Status::Separated);
        self.recycle(sp);
        StepOutcome::Explored
    }

    /// Runs the search loop to completion, reporting every candidate
    /// solution to `sink`.
    pub fn solve_with(&mut self, sink: &mut dyn SolutionSink) -> Completion {
        self.initialize();
        loop {
            match self.step(sink) {
                StepOutcome::Complete => {
                    return Completion { is_exact: true, best_value: self.best_value() }
                }
                StepOutcome::Aborted => {
                    return Completion { is_exact: false, best_value: self.best_value() }
                }
                StepOutcome::Explored => continue,
            }
        }
    }
}

impl<State> Solver for SequentialSolver<'_, State> {
    fn solve(&mut self) -> Completion {
        let mut sink = NoSink;
        self.solve_with(&mut sink)
    }

    fn best_value(&self) -> Option<f64> {
        self.incumbent.solution().map(|_| self.incumbent.value())
    }

    fn best_solution(&self) -> Option<Solution> {
        self.incumbent.solution().cloned()
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_sequential {
    use crate::*;

    /// A depth-3 binary tree whose leaves carry the accumulated cost of the
    /// path reaching them; the cheapest leaf costs 7.
    #[derive(Debug, Clone)]
    struct Path {
        depth: usize,
        cost: f64,
        decisions: Vec<isize>,
    }
    struct ToyTree {
        deltas: [[f64; 2]; 3],
    }
    impl ToyTree {
        fn example() -> Self {
            ToyTree { deltas: [[3.0, 4.0], [2.0, 5.0], [2.0, 9.0]] }
        }
    }
    impl Problem for ToyTree {
        type State = Path;

        fn sense(&self) -> Sense {
            Sense::Minimize
        }
        fn root_state(&self) -> Path {
            Path { depth: 0, cost: 0.0, decisions: vec![] }
        }
        fn compute_bound(&self, state: &mut Path) -> f64 {
            state.cost
        }
        fn child_count(&self, state: &Path) -> usize {
            if state.depth < 3 {
                2
            } else {
                0
            }
        }
        fn make_child(&self, state: &Path, which: usize) -> Path {
            let mut child = state.clone();
            child.depth += 1;
            child.cost += self.deltas[state.depth][which];
            child.decisions.push(which as isize);
            child
        }
        fn candidate_solution(&self, state: &Path) -> bool {
            state.depth == 3
        }
        fn extract_solution(&self, state: &Path) -> Option<(f64, Vec<isize>)> {
            Some((state.cost, state.decisions.clone()))
        }
    }

    #[test]
    fn no_solution_before_solving() {
        let problem = ToyTree::example();
        let mut pool = HeapPool::new(Sense::Minimize);
        let cutoff = NoCutoff;
        let solver = SequentialSolver::new(&problem, &mut pool, &cutoff);
        assert!(solver.best_solution().is_none());
        assert!(solver.best_value().is_none());
    }

    #[test]
    fn it_converges_to_the_known_optimum_with_an_empty_pool() {
        let problem = ToyTree::example();
        let mut pool = HeapPool::new(Sense::Minimize);
        let cutoff = NoCutoff;
        let mut solver = SequentialSolver::new(&problem, &mut pool, &cutoff);

        let outcome = solver.solve();

        assert!(outcome.is_exact);
        assert_eq!(Some(7.0), outcome.best_value);
        assert_eq!(vec![0, 0, 0], solver.best_solution().unwrap().content);
        assert!(pool.is_empty());
    }

    #[test]
    fn depth_first_exploration_finds_the_same_optimum() {
        let problem = ToyTree::example();
        let mut pool = ListPool::new(ListOrder::Lifo);
        let cutoff = NoCutoff;
        let mut solver = SequentialSolver::new(&problem, &mut pool, &cutoff);

        let outcome = solver.solve();
        assert!(outcome.is_exact);
        assert_eq!(Some(7.0), outcome.best_value);
    }

    #[test]
    fn breadth_first_exploration_finds_the_same_optimum() {
        let problem = ToyTree::example();
        let mut pool = ListPool::new(ListOrder::Fifo);
        let cutoff = NoCutoff;
        let mut solver = SequentialSolver::new(&problem, &mut pool, &cutoff);

        let outcome = solver.solve();
        assert!(outcome.is_exact);
        assert_eq!(Some(7.0), outcome.best_value);
    }

    #[test]
    fn a_node_budget_interrupts_the_search_with_an_inexact_outcome() {
        let problem = ToyTree::example();
        let mut pool = ListPool::new(ListOrder::Fifo);
        let cutoff = NodeBudget(1);
        let mut solver = SequentialSolver::new(&problem, &mut pool, &cutoff);

        let outcome = solver.solve();
        assert!(!outcome.is_exact);
        assert_eq!(Some(Reason::CutoffOccurred), solver.abort_reason());
    }

    #[test]
    fn transition_counters_balance_out_over_a_full_run() {
        let problem = ToyTree::example();
        let mut pool = HeapPool::new(Sense::Minimize);
        let cutoff = NoCutoff;
        let mut solver = SequentialSolver::new(&problem, &mut pool, &cutoff);

        solver.solve();
        let stats = solver.stats();
        // every created subproblem must have died, one way or another
        assert_eq!(stats.created, stats.recycled);
        // and every bounded one either got split, fathomed or swept
        assert_eq!(stats.bounded, stats.separated + stats.fathomed);
        assert!(stats.solutions_found > 0);
        assert_eq!(3, stats.max_depth);
    }

    #[test]
    fn an_improving_incumbent_arms_the_pruning_sweep() {
        let problem = ToyTree::example();
        let mut pool = ListPool::new(ListOrder::Fifo);
        let cutoff = NoCutoff;
        let mut solver = SequentialSolver::new(&problem, &mut pool, &cutoff);

        solver.solve();
        // breadth-first pops the whole tree layer by layer: by the time the
        // first leaf reports 7.0, dominated members are still pooled and
        // must have been swept rather than bounded
        assert!(solver.stats().pruned > 0);
    }

    #[test]
    fn seeding_a_primal_fathoms_the_whole_tree_at_the_root() {
        let problem = ToyTree::example();
        let mut pool = HeapPool::new(Sense::Minimize);
        let cutoff = NoCutoff;
        let mut solver = SequentialSolver::new(&problem, &mut pool, &cutoff);
        solver.set_primal(Solution::new(0.0, 1, 0, vec![0, 0, 0]));

        let outcome = solver.solve();
        assert!(outcome.is_exact);
        // the root bound (0.0) cannot beat the seeded incumbent (0.0)
        assert_eq!(1, solver.stats().fathomed);
        assert_eq!(Some(0.0), outcome.best_value);
    }

    #[test]
    fn declaring_convergence_short_circuits_the_loop() {
        let problem = ToyTree::example();
        let mut pool = HeapPool::new(Sense::Minimize);
        let cutoff = NoCutoff;
        let mut solver = SequentialSolver::new(&problem, &mut pool, &cutoff);
        solver.declare_converged();

        let outcome = solver.solve();
        assert!(outcome.is_exact);
        assert_eq!(0, solver.stats().bounded);
    }

    #[test]
    fn enumerating_with_a_repository_keeps_the_k_best_distinct_leaves() {
        let problem = ToyTree::example();
        let mut pool = HeapPool::new(Sense::Minimize);
        let cutoff = NoCutoff;
        let params = ParamsBuilder::default().enum_count(3).build().unwrap();
        let mut solver = SequentialSolver::custom(
            &problem,
            &mut pool,
            &cutoff,
            SearchContext::new(0),
            &params,
        );
        let mut repos = SolutionRepository::new(Sense::Minimize, 3);

        let outcome = solver.solve_with(&mut repos);
        assert!(outcome.is_exact);

        // leaf costs are 7, 14, 10, 17, 8, 15, 11, 18: the 3 best are 7, 8, 10
        let values: Vec<f64> = repos.members().iter().map(|s| s.value).collect();
        assert_eq!(vec![7.0, 8.0, 10.0], values);
    }
}
