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

//! End-to-end checks of the serial engine on a toy problem with a known
//! optimum.

use pbnb::*;

/// A depth-3 binary tree whose leaves carry the accumulated cost of the
/// path reaching them. Costs only increase on the way down, so the
/// accumulated cost is a valid relaxation bound. The cheapest leaf costs 7.
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
    fn known_optimum_7() -> Self {
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
fn the_driver_converges_to_the_known_optimum_with_an_empty_pool() {
    let problem = ToyTree::known_optimum_7();
    let mut pool = HeapPool::new(Sense::Minimize);
    let cutoff = NoCutoff;
    let mut solver = SequentialSolver::new(&problem, &mut pool, &cutoff);

    let outcome = solver.solve();

    assert!(outcome.is_exact);
    assert_eq!(Some(7.0), outcome.best_value);
    assert_eq!(7.0, solver.incumbent().value());
    assert!(pool.is_empty());
}

#[test]
fn every_pool_strategy_agrees_on_the_optimum() {
    for strategy in 0..3 {
        let problem = ToyTree::known_optimum_7();
        let cutoff = NoCutoff;
        let mut heap;
        let mut list_lifo;
        let mut list_fifo;
        let pool: &mut dyn Pool<State = Path> = match strategy {
            0 => {
                heap = HeapPool::new(Sense::Minimize);
                &mut heap
            }
            1 => {
                list_lifo = ListPool::new(ListOrder::Lifo);
                &mut list_lifo
            }
            _ => {
                list_fifo = ListPool::new(ListOrder::Fifo);
                &mut list_fifo
            }
        };
        let mut solver = SequentialSolver::new(&problem, pool, &cutoff);
        let outcome = solver.solve();
        assert_eq!(Some(7.0), outcome.best_value, "strategy {strategy} missed the optimum");
    }
}

#[test]
fn a_stack_mode_prune_keeps_exactly_the_unfathomable_member() {
    // insert a, b, c then prune with a and c fathomable: only b survives
    let mut pool: ListPool<char> = ListPool::new(ListOrder::Lifo);
    let mut ctx = SearchContext::new(0);

    let mut a = SubProblem::new(ctx.next_id(), 'a', 1, Sense::Minimize);
    a.bound = 10.0;
    let mut b = SubProblem::new(ctx.next_id(), 'b', 1, Sense::Minimize);
    b.bound = 2.0;
    let mut c = SubProblem::new(ctx.next_id(), 'c', 1, Sense::Minimize);
    c.bound = 11.0;
    pool.insert(a);
    pool.insert(b);
    pool.insert(c);

    let remaining = pool.prune(&mut |sp| sp.bound >= 10.0);

    assert_eq!(1, remaining);
    let members: Vec<char> = pool.scan().map(|sp| sp.state).collect();
    assert_eq!(vec!['b'], members);
}

#[test]
fn pool_size_always_equals_inserts_minus_removals() {
    let mut ctx = SearchContext::new(0);
    let mut pool: HeapPool<u32> = HeapPool::new(Sense::Minimize);
    let mut inserted = 0usize;
    let mut removed = 0usize;
    let mut tokens = vec![];

    for round in 0u32..50 {
        let mut sp = SubProblem::new(ctx.next_id(), round, (round % 7) as usize, Sense::Minimize);
        sp.bound = f64::from((round * 37) % 23);
        tokens.push(pool.insert(sp));
        inserted += 1;
        assert_eq!(inserted - removed, pool.len());

        if round % 3 == 0 {
            let token = tokens.swap_remove((round as usize * 13) % tokens.len());
            pool.remove(token);
            removed += 1;
            assert_eq!(inserted - removed, pool.len());
        }
        if let Some(token) = pool.select() {
            // select returns a member that was inserted and not yet removed
            assert!(tokens.contains(&token));
        }
    }

    let before = pool.len();
    let remaining = pool.prune(&mut |sp| sp.bound >= 15.0);
    assert!(remaining <= before);
    assert_eq!(remaining, pool.len());
}

#[test]
fn enumerating_keeps_the_k_best_distinct_leaves() {
    let problem = ToyTree::known_optimum_7();
    let mut pool = HeapPool::new(Sense::Minimize);
    let cutoff = NoCutoff;
    let params = ParamsBuilder::default().enum_count(4).build().unwrap();
    let mut solver =
        SequentialSolver::custom(&problem, &mut pool, &cutoff, SearchContext::new(0), &params);
    let mut repos = SolutionRepository::new(Sense::Minimize, 4);

    let outcome = solver.solve_with(&mut repos);

    assert!(outcome.is_exact);
    // the leaf costs are 7, 8, 10, 11, 14, 15, 17, 18
    let values: Vec<f64> = repos.members().iter().map(|s| s.value).collect();
    assert_eq!(vec![7.0, 8.0, 10.0, 11.0], values);
    // and the optimum is still the incumbent
    assert_eq!(Some(7.0), outcome.best_value);
}

#[test]
fn the_repository_threshold_never_regressed_during_the_search() {
    let problem = ToyTree::known_optimum_7();
    let mut pool = ListPool::new(ListOrder::Fifo);
    let cutoff = NoCutoff;
    let params = ParamsBuilder::default().enum_count(2).build().unwrap();
    let mut solver =
        SequentialSolver::custom(&problem, &mut pool, &cutoff, SearchContext::new(0), &params);
    let mut repos = SolutionRepository::new(Sense::Minimize, 2);

    solver.initialize();
    let mut last = repos.worst_accepted();
    loop {
        match solver.step(&mut repos) {
            StepOutcome::Explored => {
                let now = repos.worst_accepted();
                assert!(now <= last, "worst-accepted threshold went from {last} to {now}");
                last = now;
            }
            _ => break,
        }
    }
    assert_eq!(vec![7.0, 8.0], repos.members().iter().map(|s| s.value).collect::<Vec<f64>>());
}
