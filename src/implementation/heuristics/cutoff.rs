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

//! This module provides the implementation of various cutoff heuristics that
//! can be used to tune the behavior of a solver.

use std::{
    sync::{atomic::AtomicBool, Arc},
    time::Duration,
};

use crate::Cutoff;

/// _This is the default cutoff heuristic._ It imposes that the search
/// proves optimality before it stops.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoCutoff;
impl Cutoff for NoCutoff {
    fn must_stop(&self, _explored: usize) -> bool {
        false
    }
}

/// This cutoff allows one to specify a maximum time budget to solve the
/// problem. Once the time budget is elapsed, the optimization stops and the
/// best solution that has been found (so far) is returned.
#[derive(Debug, Clone)]
pub struct TimeBudget {
    stop: Arc<AtomicBool>,
}
impl TimeBudget {
    /// Arms a timer firing after `budget`.
    pub fn new(budget: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let t_flag = Arc::clone(&stop);

        // timer
        std::thread::spawn(move || {
            std::thread::sleep(budget);
            t_flag.store(true, std::sync::atomic::Ordering::Relaxed);
        });

        TimeBudget { stop }
    }
}
impl Cutoff for TimeBudget {
    fn must_stop(&self, _explored: usize) -> bool {
        self.stop.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// This cutoff stops the search once the driver has bounded the given
/// number of subproblems.
#[derive(Debug, Copy, Clone)]
pub struct NodeBudget(pub usize);
impl Cutoff for NodeBudget {
    fn must_stop(&self, explored: usize) -> bool {
        explored >= self.0
    }
}

#[cfg(test)]
mod test_cutoff {
    use crate::{Cutoff, NoCutoff, NodeBudget};

    #[test]
    fn no_cutoff_never_stops_the_search() {
        assert!(!NoCutoff.must_stop(0));
        assert!(!NoCutoff.must_stop(usize::MAX));
    }
    #[test]
    fn node_budget_stops_once_the_budget_is_spent() {
        let cutoff = NodeBudget(10);
        assert!(!cutoff.must_stop(9));
        assert!(cutoff.must_stop(10));
        assert!(cutoff.must_stop(11));
    }
}
