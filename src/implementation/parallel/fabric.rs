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

//! This module provides the message-passing substrate of a run: one typed
//! channel per (peer, tag) pair, a poll-for-whatever-completed primitive,
//! and the barrier used by the ramp-up and finalization synchronization
//! points. All the cross-process interaction of the engine goes through
//! here; there is no shared search state between processes.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crossbeam::channel::{unbounded, Receiver, Select, Sender};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::{Message, Packet, Tag};

/// The state every endpoint of a cluster shares: the barrier and the count
/// of solutions handed to the network but not yet settled at their owner.
struct ClusterShared {
    nb_processes: usize,
    barrier: Mutex<(usize, u64)>,
    monitor: Condvar,
    pending: AtomicUsize,
}

/// One process's endpoint onto the cluster. Sending is addressed by (rank,
/// tag); receiving either polls across every inbound channel or blocks on
/// one specific (peer, tag) channel during a synchronous exchange.
pub struct Fabric {
    me: usize,
    senders: Arc<DashMap<(usize, usize, Tag), Sender<Packet>>>,
    receivers: Vec<((usize, Tag), Receiver<Packet>)>,
    shared: Arc<ClusterShared>,
    next_poll: usize,
}

impl Fabric {
    /// Builds the fully connected fabric of an `nb_processes` cluster and
    /// returns one endpoint per rank.
    pub fn cluster(nb_processes: usize) -> Vec<Fabric> {
        assert!(nb_processes > 0, "a cluster has at least one process");
        let senders: Arc<DashMap<(usize, usize, Tag), Sender<Packet>>> =
            Arc::new(DashMap::default());
        let shared = Arc::new(ClusterShared {
            nb_processes,
            barrier: Mutex::new((0, 0)),
            monitor: Condvar::new(),
            pending: AtomicUsize::new(0),
        });

        let mut receivers: Vec<Vec<((usize, Tag), Receiver<Packet>)>> =
            (0..nb_processes).map(|_| vec![]).collect();
        for src in 0..nb_processes {
            for dst in (0..nb_processes).filter(|&dst| dst != src) {
                for tag in Tag::ALL {
                    let (tx, rx) = unbounded();
                    senders.insert((src, dst, tag), tx);
                    receivers[dst].push(((src, tag), rx));
                }
            }
        }

        receivers
            .into_iter()
            .enumerate()
            .map(|(me, receivers)| Fabric {
                me,
                senders: Arc::clone(&senders),
                receivers,
                shared: Arc::clone(&shared),
                next_poll: 0,
            })
            .collect()
    }

    /// The rank of this endpoint.
    pub fn me(&self) -> usize {
        self.me
    }
    /// The number of processes in the cluster.
    pub fn nb_processes(&self) -> usize {
        self.shared.nb_processes
    }

    /// Sends `msg` to `dest` on the channel matching its tag. Sending never
    /// blocks; a send toward an endpoint that already shut down is silently
    /// dropped (by then the protocol no longer cares).
    pub fn send(&self, dest: usize, msg: Message) {
        let sender = self
            .senders
            .get(&(self.me, dest, msg.tag()))
            .unwrap_or_else(|| panic!("no channel from {} to {dest}", self.me));
        sender.send(Packet { src: self.me, msg }).ok();
    }

    /// Polls for the next completed inbound operation, whatever its (peer,
    /// tag) channel, without blocking. Channels are visited round-robin so
    /// no peer can starve the others.
    pub fn poll(&mut self) -> Option<Packet> {
        let n = self.receivers.len();
        for i in 0..n {
            let at = (self.next_poll + i) % n;
            if let Ok(packet) = self.receivers[at].1.try_recv() {
                self.next_poll = (at + 1) % n;
                return Some(packet);
            }
        }
        None
    }

    /// Blocks until any inbound operation completes and returns it. This is
    /// the wait-on-any primitive; the steady-state loop never uses it (it
    /// polls), only the synchronization points do.
    pub fn recv_any(&self) -> Packet {
        let mut select = Select::new();
        for (_, rx) in &self.receivers {
            select.recv(rx);
        }
        let op = select.select();
        let at = op.index();
        op.recv(&self.receivers[at].1)
            .expect("peer went away during a blocking receive")
    }

    /// Blocks until a message with the given tag arrives from `src`.
    pub fn recv_from(&self, src: usize, tag: Tag) -> Packet {
        let rx = self
            .receivers
            .iter()
            .find(|((peer, t), _)| *peer == src && *t == tag)
            .unwrap_or_else(|| panic!("no channel from {src} to {}", self.me));
        rx.1.recv().expect("peer went away during a synchronous exchange")
    }

    /// Blocks until every process of the cluster reached this barrier.
    pub fn barrier(&self) {
        let mut state = self.shared.barrier.lock();
        let generation = state.1;
        state.0 += 1;
        if state.0 == self.shared.nb_processes {
            state.0 = 0;
            state.1 += 1;
            self.shared.monitor.notify_all();
        } else {
            while state.1 == generation {
                self.shared.monitor.wait(&mut state);
            }
        }
    }

    /// Notes that a solution was handed to the network and has not settled
    /// at its owning process yet.
    pub fn note_launched(&self) {
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
    }
    /// Notes that a traveling solution settled (processed by its owner, or
    /// dropped as fathomable while queued).
    pub fn note_settled(&self) {
        self.shared.pending.fetch_sub(1, Ordering::SeqCst);
    }
    /// The number of solutions still traveling somewhere in the cluster.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
