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

//! This module defines the wire messages of the repository protocol. Every
//! message travels on its own tag so that a receiver can both poll for
//! whatever arrives next and block for one specific kind of traffic.

use crate::{ReposEntry, Solution};

/// The tag identifying the kind of a message: one typed channel exists per
/// (peer, tag) pair.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Tag {
    /// A solution traveling toward its owning process.
    HashSol,
    /// The credit return for a link.
    AckSol,
    /// A subtree summary for the repository-tree merge.
    ReposArray,
    /// The global worst-accepted threshold broadcast.
    NewLastSol,
}
impl Tag {
    /// All the tags a process listens on.
    pub const ALL: [Tag; 4] = [Tag::HashSol, Tag::AckSol, Tag::ReposArray, Tag::NewLastSol];
}

/// A message of the repository protocol.
#[derive(Debug, Clone)]
pub enum Message {
    /// Forwards a misrouted solution toward its owning process. The `key` is
    /// the negation-normalized (always-minimization) value of the solution,
    /// so that intermediate hops can order and drop envelopes without caring
    /// about the sense of the search.
    HashSol { owner: usize, key: f64, sol: Solution },
    /// Returns the credit of the link it arrives on.
    AckSol,
    /// The ordered summary of a subtree's archive.
    ReposArray { entries: Vec<ReposEntry> },
    /// The globally agreed worst-accepted entry, broadcast down the tree.
    NewLastSol { entry: ReposEntry },
}
impl Message {
    /// The tag this message travels on.
    pub fn tag(&self) -> Tag {
        match self {
            Message::HashSol { .. } => Tag::HashSol,
            Message::AckSol => Tag::AckSol,
            Message::ReposArray { .. } => Tag::ReposArray,
            Message::NewLastSol { .. } => Tag::NewLastSol,
        }
    }
}

/// A delivered message, together with the rank it came from.
#[derive(Debug, Clone)]
pub struct Packet {
    /// The rank of the sending process.
    pub src: usize,
    /// The delivered message.
    pub msg: Message,
}
