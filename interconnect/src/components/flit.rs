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

//! Wire-level signals: flits travel downstream, credits travel upstream.

use std::fmt;

use crate::{Cycle, PacketId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlitKind {
    /// Opens a wormhole; `length` counts the body flits that follow.
    Header {
        src: usize,
        dest: usize,
        length: usize,
    },
    Body {
        seq: usize,
    },
    /// Closes the wormhole.
    Tail,
}

/// The unit of transport. Flits only carry metadata, never payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Flit {
    pub packet: PacketId,
    /// Measurement window the packet was generated in, `None` when unmeasured.
    pub sample: Option<usize>,
    /// VC index on the link the flit is currently crossing.
    pub vc: usize,
    pub injected: Cycle,
    pub received: Option<Cycle>,
    /// Router-to-router links traversed so far.
    pub hops: usize,
    pub kind: FlitKind,
}

impl Flit {
    fn new(packet: PacketId, sample: Option<usize>, injected: Cycle, kind: FlitKind) -> Self {
        Self {
            packet,
            sample,
            vc: 0,
            injected,
            received: None,
            hops: 0,
            kind,
        }
    }

    pub fn header(
        packet: PacketId,
        sample: Option<usize>,
        injected: Cycle,
        src: usize,
        dest: usize,
        length: usize,
    ) -> Self {
        Self::new(packet, sample, injected, FlitKind::Header { src, dest, length })
    }

    pub fn body(packet: PacketId, sample: Option<usize>, injected: Cycle, seq: usize) -> Self {
        Self::new(packet, sample, injected, FlitKind::Body { seq })
    }

    pub fn tail(packet: PacketId, sample: Option<usize>, injected: Cycle) -> Self {
        Self::new(packet, sample, injected, FlitKind::Tail)
    }

    pub fn is_header(&self) -> bool {
        matches!(self.kind, FlitKind::Header { .. })
    }

    pub fn is_tail(&self) -> bool {
        matches!(self.kind, FlitKind::Tail)
    }

    pub fn is_measured(&self) -> bool {
        self.sample.is_some()
    }

    /// Cycles between generation and consumption, once consumed.
    pub fn latency(&self) -> Option<Cycle> {
        self.received.map(|r| r.saturating_sub(self.injected))
    }
}

impl fmt::Display for Flit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            FlitKind::Header { dest, .. } => write!(f, "[H {}:{}]", self.packet, dest),
            FlitKind::Body { seq } => write!(f, "[B {}.{}]", self.packet, seq),
            FlitKind::Tail => write!(f, "[T {}]", self.packet),
        }
    }
}

/// One freed buffer slot on `vc` of the downstream input port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Credit {
    pub vc: usize,
}

impl fmt::Display for Credit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "C[{}]", self.vc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Flit::header(7, None, 0, 1, 3, 2).to_string(), "[H 7:3]");
        assert_eq!(Flit::body(7, None, 0, 1).to_string(), "[B 7.1]");
        assert_eq!(Flit::tail(7, Some(0), 0).to_string(), "[T 7]");
        assert_eq!(Credit { vc: 2 }.to_string(), "C[2]");
    }

    #[test]
    fn latency() {
        let mut flit = Flit::tail(0, Some(3), 10);
        assert!(flit.is_measured());
        assert_eq!(flit.latency(), None);
        flit.received = Some(25);
        assert_eq!(flit.latency(), Some(15));
    }
}
