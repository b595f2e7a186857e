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

//! # PBNB
//! PBNB is a truly generic framework to develop parallel, enumeration-capable
//! branch-and-bound solvers in Rust. Its goal is to let you describe your
//! optimization problem through a single `Problem` trait (how to bound a
//! residual state, how to split it into children, how to recognize a feasible
//! candidate) and to take care of everything else: the pool of live
//! subproblems and its exploration strategy, incumbent tracking and safe
//! fathoming, the archival of the k best distinct solutions, and -- when you
//! go parallel -- the ownership partitioning of solutions across processes,
//! the credit-gated routing of misrouted solutions, and the periodic merging
//! of per-process archives up a static repository tree.
//!
//! ## Quick Example
//! The following solves a toy minimization problem: a depth-3 binary tree
//! whose leaves carry the accumulated cost of the path reaching them. The
//! cheapest leaf costs 7.
//!
//! ```
//! use pbnb::*;
//!
//! // The residual state of a subproblem: where we are in the tree and the
//! // cost accumulated so far.
//! #[derive(Debug, Clone)]
//! struct Path {
//!     depth: usize,
//!     cost: f64,
//!     decisions: Vec<isize>,
//! }
//!
//! // The cost added by taking the left (0) or right (1) branch at each level.
//! struct ToyTree {
//!     deltas: [[f64; 2]; 3],
//! }
//! impl Problem for ToyTree {
//!     type State = Path;
//!
//!     fn sense(&self) -> Sense {
//!         Sense::Minimize
//!     }
//!     fn root_state(&self) -> Path {
//!         Path { depth: 0, cost: 0.0, decisions: vec![] }
//!     }
//!     // Costs only ever increase on the way down, so the accumulated cost
//!     // is a valid relaxation bound for the whole subtree.
//!     fn compute_bound(&self, state: &mut Path) -> f64 {
//!         state.cost
//!     }
//!     fn child_count(&self, state: &Path) -> usize {
//!         if state.depth < 3 { 2 } else { 0 }
//!     }
//!     fn make_child(&self, state: &Path, which: usize) -> Path {
//!         let mut child = state.clone();
//!         child.depth += 1;
//!         child.cost += self.deltas[state.depth][which];
//!         child.decisions.push(which as isize);
//!         child
//!     }
//!     fn candidate_solution(&self, state: &Path) -> bool {
//!         state.depth == 3
//!     }
//!     fn extract_solution(&self, state: &Path) -> Option<(f64, Vec<isize>)> {
//!         Some((state.cost, state.decisions.clone()))
//!     }
//! }
//!
//! let problem = ToyTree { deltas: [[3.0, 4.0], [2.0, 5.0], [2.0, 9.0]] };
//! let mut pool = HeapPool::new(Sense::Minimize);
//! let cutoff = NoCutoff;
//! let mut solver = SequentialSolver::new(&problem, &mut pool, &cutoff);
//!
//! let outcome = solver.solve();
//!
//! assert!(outcome.is_exact);
//! assert_eq!(Some(7.0), outcome.best_value);
//! assert_eq!(vec![0, 0, 0], solver.best_solution().unwrap().content);
//! ```
//!
//! ## Enumerating the k best solutions
//! Hand the driver a `SolutionRepository` and it will archive the `enum_count`
//! best *distinct* solutions instead of only the optimum, while fathoming
//! against the worst archived value so that none of the k best can ever be
//! pruned away.
//!
//! ## Going parallel
//! The `Cluster` type spawns one `ProcessEngine` per simulated process. Each
//! engine runs the same cooperative loop: a bit of local search, then a round
//! of message servicing. Solutions are owned by the process their content
//! hashes to; misrouted ones travel along hypercube links under a one-packet
//! credit scheme, and per-process archives are merged up a static repository
//! tree which broadcasts back the globally agreed pruning threshold.

mod common;
mod abstraction;
mod implementation;

pub use common::*;
pub use abstraction::*;
pub use implementation::*;
