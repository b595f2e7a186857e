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

//! This module defines how the processes of a run are wired together: the
//! hypercube links solutions are routed along, and the static repository
//! tree their archives are merged up.

/// The static shape of one process's neighborhood. Point-to-point solution
/// traffic travels along hypercube links (two processes are linked iff their
/// ranks differ in exactly one bit, the truncated links of a
/// non-power-of-two cluster simply do not exist); repository summaries are
/// merged up a static complete binary tree over the ranks.
#[derive(Debug, Copy, Clone)]
pub struct Topology {
    nb_processes: usize,
    me: usize,
}

impl Topology {
    /// The topology as seen from process `me` among `nb_processes`.
    pub fn new(nb_processes: usize, me: usize) -> Self {
        assert!(nb_processes > 0, "a cluster has at least one process");
        assert!(me < nb_processes, "rank {me} out of range for {nb_processes} processes");
        Self { nb_processes, me }
    }

    /// The number of processes in the cluster.
    pub fn nb_processes(&self) -> usize {
        self.nb_processes
    }
    /// The rank of this process.
    pub fn me(&self) -> usize {
        self.me
    }
    /// The number of bits a rank takes, which is also the diameter of the
    /// (possibly truncated) hypercube.
    pub fn nb_link_bits(&self) -> usize {
        if self.nb_processes <= 1 {
            0
        } else {
            (usize::BITS - (self.nb_processes - 1).leading_zeros()) as usize
        }
    }

    /// The ranks this process has a direct link to.
    pub fn neighbors(&self) -> Vec<usize> {
        (0..self.nb_link_bits())
            .map(|bit| self.me ^ (1 << bit))
            .filter(|&peer| peer < self.nb_processes)
            .collect()
    }

    /// Among the links of this process, those whose bit differs between this
    /// process and `dest`: the links a packet for `dest` may usefully take.
    /// This never comes back empty when `dest != me`: flipping the lowest
    /// bit set in `dest` and clear in `me` (or clear in `dest` and set in
    /// `me`) always lands on an existing rank.
    pub fn links_toward(&self, dest: usize) -> Vec<usize> {
        (0..self.nb_link_bits())
            .filter(|bit| (self.me ^ dest) & (1 << bit) != 0)
            .map(|bit| self.me ^ (1 << bit))
            .filter(|&peer| peer < self.nb_processes)
            .collect()
    }

    /// The parent of this process in the repository tree (`None` for the
    /// tree root, process 0).
    pub fn tree_parent(&self) -> Option<usize> {
        if self.me == 0 {
            None
        } else {
            Some((self.me - 1) / 2)
        }
    }
    /// The children of this process in the repository tree.
    pub fn tree_children(&self) -> Vec<usize> {
        [2 * self.me + 1, 2 * self.me + 2]
            .into_iter()
            .filter(|&c| c < self.nb_processes)
            .collect()
    }
    /// True iff `rank` is a registered child of this process in the
    /// repository tree.
    pub fn is_tree_child(&self, rank: usize) -> bool {
        rank > 0 && (rank - 1) / 2 == self.me
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_topology {
    use crate::Topology;

    #[test]
    fn a_single_process_has_no_links_at_all() {
        let topo = Topology::new(1, 0);
        assert!(topo.neighbors().is_empty());
        assert!(topo.tree_parent().is_none());
        assert!(topo.tree_children().is_empty());
    }

    #[test]
    fn hypercube_neighbors_differ_in_exactly_one_bit() {
        let topo = Topology::new(8, 5);
        let mut neighbors = topo.neighbors();
        neighbors.sort_unstable();
        assert_eq!(vec![1, 4, 7], neighbors);
    }

    #[test]
    fn truncated_links_simply_do_not_exist() {
        let topo = Topology::new(6, 3);
        // 3 ^ 0b100 = 7 which is outside the cluster
        let mut neighbors = topo.neighbors();
        neighbors.sort_unstable();
        assert_eq!(vec![1, 2], neighbors);
    }

    #[test]
    fn useful_links_flip_a_bit_differing_from_the_destination() {
        let topo = Topology::new(8, 5);
        let mut links = topo.links_toward(2);
        links.sort_unstable();
        // 5 = 0b101, 2 = 0b010: every bit differs
        assert_eq!(vec![1, 4, 7], links);

        let links = topo.links_toward(4);
        // only bit 0 differs
        assert_eq!(vec![4], links);
    }

    #[test]
    fn a_useful_link_always_exists_even_on_truncated_hypercubes() {
        for n in 1..=17 {
            for me in 0..n {
                let topo = Topology::new(n, me);
                for dest in (0..n).filter(|&d| d != me) {
                    assert!(
                        !topo.links_toward(dest).is_empty(),
                        "no link from {me} toward {dest} among {n} processes"
                    );
                }
            }
        }
    }

    #[test]
    fn the_repository_tree_is_a_complete_binary_tree() {
        let topo = Topology::new(7, 1);
        assert_eq!(Some(0), topo.tree_parent());
        assert_eq!(vec![3, 4], topo.tree_children());
        assert!(topo.is_tree_child(3));
        assert!(topo.is_tree_child(4));
        assert!(!topo.is_tree_child(5));
        assert!(!topo.is_tree_child(0));
    }

    #[test]
    fn every_process_but_the_root_has_a_parent_owning_it_as_child() {
        let n = 13;
        for me in 1..n {
            let topo = Topology::new(n, me);
            let parent = topo.tree_parent().unwrap();
            assert!(Topology::new(n, parent).is_tree_child(me));
        }
    }
}
