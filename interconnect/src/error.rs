// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;

use crate::routing::RoutingKind;
use crate::topologies::TopologyKind;
use crate::traffic::TrafficPattern;
use crate::{Cycle, PacketId};

/// A local flow-control invariant that was about to be broken.
///
/// Faults are raised by ports and virtual channels; the operation that
/// raised one is skipped and the surrounding router wraps it into
/// `Error::Protocol` together with the coordinates of the channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Fault {
    /// A flit was offered to a full input buffer.
    BufferFull,
    /// An output VC was asked to stage a second flit.
    SlotOccupied,
    /// A credit was consumed with a zero credit count.
    CreditUnderflow,
    /// A credit was returned to a channel that already holds all of them.
    CreditOverflow,
    /// The channel state was popped below IDLE.
    StateUnderflow,
    /// A wait state was pushed on top of another wait state.
    StateOverflow,
    /// The routing function has no entry for this destination.
    MissingRoute(usize),
    /// A body/tail flit or a credit arrived on a channel with no connection.
    MissingBinding,
    /// A signal addressed a VC index the port does not have.
    UnknownVc,
    /// A tail flit was consumed without its header and all its body flits.
    IncompletePacket(PacketId),
    /// A link delivered a signal into a port whose input register was full.
    InputOverrun,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    InvalidDimensions { k: usize, n: usize },
    InvalidBufferSize,
    InvalidFaults(f64),
    InsufficientVcs { available: usize, total: usize },
    UnsupportedRouting(RoutingKind, TopologyKind),
    UnsupportedTraffic(TrafficPattern, usize),
    InvalidBurst { alpha: f64, beta: f64 },
    FaultInjection { requested: usize, removed: usize },
    NoPath(usize, usize),
    InvalidTrace(usize, String),
    DrainTimeout { cycles: Cycle, in_flight: usize },
    Protocol {
        node: usize,
        port: usize,
        vc: usize,
        fault: Fault,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidDimensions { k, n } => {
                write!(f, "ERROR: invalid network dimensions k={} n={}", k, n)
            }
            Self::InsufficientVcs { available, total } => write!(
                f,
                "ERROR: insufficient virtual channels: {} available out of {}",
                available, total
            ),
            Self::UnsupportedRouting(routing, topology) => write!(
                f,
                "ERROR: {:?} routing requires a mesh or torus, not {:?}",
                routing, topology
            ),
            Self::UnsupportedTraffic(pattern, nodes) => write!(
                f,
                "ERROR: traffic pattern {:?} is not defined for {} nodes",
                pattern, nodes
            ),
            Self::FaultInjection { requested, removed } => write!(
                f,
                "ERROR: cannot remove any links without disconnecting the graph ({} of {} faults)",
                removed, requested
            ),
            Self::NoPath(src, dst) => write!(f, "ERROR: no path between nodes {} and {}", src, dst),
            Self::InvalidTrace(line, text) => {
                write!(f, "ERROR: malformed trace line {}: '{}'", line, text)
            }
            Self::DrainTimeout { cycles, in_flight } => write!(
                f,
                "ERROR: {} packets still in flight after draining for {} cycles",
                in_flight, cycles
            ),
            Self::Protocol {
                node,
                port,
                vc,
                fault,
            } => write!(f, "ERROR: {:?} at node {} [{}:{}]", fault, node, port, vc),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl std::error::Error for Error {}
