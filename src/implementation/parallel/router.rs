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

//! This module provides the credit-gated router moving ownership-misrouted
//! solutions toward their owning process over the hypercube links, without
//! unbounded buffering: each link allows at most one packet in flight at a
//! time, and everything else waits in a per-link best-first queue.

use std::cmp::Ordering;

use binary_heap_plus::BinaryHeap;
use compare::Compare;
use fxhash::FxHashMap;
use ordered_float::OrderedFloat;

use crate::{Fabric, Message, Solution, Topology};

/// A solution in transit, packed with its routing information. The `key` is
/// the negation-normalized value (always minimization, whatever the sense of
/// the search): a smaller key is always a better envelope.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Negation-normalized objective value.
    pub key: OrderedFloat<f64>,
    /// The rank of the process owning the wrapped solution.
    pub owner: usize,
    /// The wrapped solution.
    pub sol: Solution,
}

/// Orders envelopes so that the best-valued one is nearest the front of a
/// per-link queue: if the incumbent improves while envelopes wait, the
/// dominated ones sink to the back and get dropped on dequeue.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeOrder;
impl Compare<Envelope> for EnvelopeOrder {
    fn compare(&self, l: &Envelope, r: &Envelope) -> Ordering {
        // reversed: the smaller key is the better envelope
        (r.key, r.sol.owner, r.sol.serial).cmp(&(l.key, l.sol.owner, l.sol.serial))
    }
}

struct Link {
    peer: usize,
    in_flight: bool,
    queue: BinaryHeap<Envelope, EnvelopeOrder>,
}

/// The per-link credit-gated message queue. For an envelope destined to
/// processor `P`, among all links whose bit differs in a bit that also
/// differs between this process and `P`, the one with the shortest
/// outstanding queue (counting any unacknowledged packet in flight) is
/// picked; if that link is idle the envelope leaves immediately, otherwise
/// it waits in the link's best-first queue. An acknowledgment frees the
/// link's single credit and sends the next queued envelope that is still
/// worth sending.
pub struct FlowRouter {
    topology: Topology,
    links: FxHashMap<usize, Link>,
    dropped: usize,
}

impl FlowRouter {
    /// Creates the router for the given process neighborhood.
    pub fn new(topology: Topology) -> Self {
        let links = topology
            .neighbors()
            .into_iter()
            .map(|peer| {
                let link = Link {
                    peer,
                    in_flight: false,
                    queue: BinaryHeap::from_vec_cmp(vec![], EnvelopeOrder),
                };
                (peer, link)
            })
            .collect();
        Self { topology, links, dropped: 0 }
    }

    /// The number of queued envelopes dropped because they became
    /// fathomable while waiting.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// The outstanding traffic of the link to `peer`: its queued envelopes
    /// plus the packet currently in flight, if any.
    pub fn outstanding(&self, peer: usize) -> usize {
        let link = &self.links[&peer];
        link.queue.len() + usize::from(link.in_flight)
    }

    /// True iff no envelope is queued or in flight on any link.
    pub fn is_idle(&self) -> bool {
        self.links
            .values()
            .all(|link| !link.in_flight && link.queue.is_empty())
    }

    fn launch(fabric: &Fabric, peer: usize, envelope: Envelope) {
        fabric.send(
            peer,
            Message::HashSol {
                owner: envelope.owner,
                key: envelope.key.into_inner(),
                sol: envelope.sol,
            },
        );
    }

    /// Hands `envelope` to the least congested useful link: it leaves
    /// immediately when that link is idle and waits in its queue otherwise.
    pub fn route(&mut self, envelope: Envelope, fabric: &Fabric) {
        debug_assert!(envelope.owner != self.topology.me());
        let peer = self
            .topology
            .links_toward(envelope.owner)
            .into_iter()
            .min_by_key(|&peer| self.outstanding(peer))
            .expect("a useful link always exists");

        let link = self.links.get_mut(&peer).unwrap();
        if link.in_flight {
            link.queue.push(envelope);
        } else {
            link.in_flight = true;
            tracing::trace!(to = peer, owner = envelope.owner, "envelope launched");
            Self::launch(fabric, peer, envelope);
        }
    }

    /// Handles the acknowledgment returning the credit of the link to
    /// `peer`: the slot is freed, then the next best queued envelope that is
    /// not fathomable (per the given test) is sent. Fathomable envelopes are
    /// silently dropped on their way out, which is expected, not an error.
    /// An acknowledgment for a link with no packet in flight is fatal.
    pub fn acknowledge(
        &mut self,
        peer: usize,
        fabric: &Fabric,
        fathomable: &mut dyn FnMut(&Envelope) -> bool,
    ) {
        let me = self.topology.me();
        let link = self
            .links
            .get_mut(&peer)
            .unwrap_or_else(|| panic!("acknowledgment from {peer} which is no neighbor of {me}"));
        if !link.in_flight {
            panic!("acknowledgment received on link {me}->{peer} with no packet in flight");
        }
        link.in_flight = false;

        let mut dropped = 0;
        while let Some(envelope) = link.queue.pop() {
            if fathomable(&envelope) {
                dropped += 1;
                fabric.note_settled();
                continue;
            }
            link.in_flight = true;
            tracing::trace!(to = link.peer, owner = envelope.owner, "queued envelope launched");
            Self::launch(fabric, link.peer, envelope);
            break;
        }
        self.dropped += dropped;
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
