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

use std::collections::VecDeque;
use std::fmt;

use log::trace;

use super::{Flit, InputPort, OutputPort};
use crate::error::{Error, Fault};
use crate::sim::{Phase, SimContext};
use crate::stats::StatsCollector;
use crate::traffic::TrafficSource;

/// Traffic endpoint attached to the processor port of a router.
///
/// Generated packets wait in an unbounded source queue until the router
/// accepts them; arriving flits are consumed one per cycle and their slot is
/// credited back at once.
#[derive(Clone, Debug)]
pub struct Processor {
    node: usize,
    input: InputPort,
    output: OutputPort,
    pending: VecDeque<Flit>,
    received: Vec<Flit>,
}

impl Processor {
    pub fn new(node: usize, buffer_size: usize) -> Self {
        Self {
            node,
            input: InputPort::new(node, 0, 1, buffer_size),
            output: OutputPort::new(node, 0, 1, buffer_size),
            pending: VecDeque::new(),
            received: Vec::new(),
        }
    }

    pub fn node(&self) -> usize {
        self.node
    }

    pub fn input(&self) -> &InputPort {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputPort {
        &mut self.input
    }

    pub fn output(&self) -> &OutputPort {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut OutputPort {
        &mut self.output
    }

    /// Flits generated here that have not entered the router yet.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn update<T: TrafficSource, S: StatsCollector>(
        &mut self,
        ctx: &mut SimContext,
        traffic: &mut T,
        stats: &mut S,
    ) {
        if let Some(credit) = self.output.read_input_credit() {
            if let Err(err) = self.output.inc_credits(credit.vc) {
                ctx.report(err);
            }
        }
        let flit = match self.consume(ctx) {
            Ok(flit) => flit,
            Err(err) => {
                ctx.report(err);
                None
            }
        };
        if let Some(tail) = flit.as_ref().filter(|f| f.is_tail()) {
            match self.retire_packet(tail) {
                Ok(()) => {
                    ctx.packet_retired();
                    stats.retire_packet(self.node, tail, ctx);
                }
                Err(err) => ctx.report(err),
            }
        }
        stats.retire_flit(self.node, flit.as_ref(), ctx);

        if matches!(ctx.phase(), Phase::WarmingUp | Phase::Running) {
            for request in traffic.inject(self.node, ctx) {
                self.generate_packet(request.dest, request.length, ctx, stats);
            }
        }
        if let Err(err) = self.inject_flit() {
            ctx.report(err);
        }
    }

    /// Eject at most one flit and credit its slot immediately.
    fn consume(&mut self, ctx: &SimContext) -> Result<Option<Flit>, Error> {
        self.input.read_input_flit()?;
        if self.input.peek_next().is_none() {
            return Ok(None);
        }
        let mut flit = match self.input.take_next_flit()? {
            Some(flit) => flit,
            None => return Ok(None),
        };
        flit.received = Some(ctx.cycle());
        self.input.inc_credits(self.input.cursor())?;
        trace!("@{} processor {} consumes {}", ctx.cycle(), self.node, flit);
        self.received.push(flit.clone());
        Ok(Some(flit))
    }

    /// A tail closes its packet: exactly one header announcing as many body
    /// flits as arrived.
    fn retire_packet(&mut self, tail: &Flit) -> Result<(), Error> {
        let (packet, rest): (Vec<Flit>, Vec<Flit>) = self
            .received
            .drain(..)
            .partition(|f| f.packet == tail.packet);
        self.received = rest;
        let headers: Vec<usize> = packet
            .iter()
            .filter_map(|f| match f.kind {
                super::FlitKind::Header { length, .. } => Some(length),
                _ => None,
            })
            .collect();
        let bodies = packet
            .iter()
            .filter(|f| matches!(f.kind, super::FlitKind::Body { .. }))
            .count();
        if headers.len() == 1 && headers[0] == bodies {
            Ok(())
        } else {
            Err(Error::Protocol {
                node: self.node,
                port: 0,
                vc: tail.vc,
                fault: Fault::IncompletePacket(tail.packet),
            })
        }
    }

    /// Queue a header, `length` body flits and a tail.
    pub fn generate_packet<S: StatsCollector>(
        &mut self,
        dest: usize,
        length: usize,
        ctx: &mut SimContext,
        stats: &mut S,
    ) {
        let packet = ctx.next_packet_id();
        let sample = ctx.sample_tag();
        let now = ctx.cycle();
        self.pending
            .push_back(Flit::header(packet, sample, now, self.node, dest, length));
        for seq in 0..length {
            self.pending.push_back(Flit::body(packet, sample, now, seq));
        }
        self.pending.push_back(Flit::tail(packet, sample, now));
        trace!(
            "@{} processor {} generates packet {} to {}",
            now,
            self.node,
            packet,
            dest
        );
        ctx.packet_generated();
        stats.packet_generated(self.node, ctx);
    }

    /// Stage the next pending flit towards the router. A header first needs
    /// the single output VC to be free.
    fn inject_flit(&mut self) -> Result<(), Error> {
        if !self.output.has_credits(0) || !self.output.is_empty(0) {
            return Ok(());
        }
        match self.pending.front() {
            Some(flit) if flit.is_header() => {
                if self.output.alloc_vc(1).is_none() {
                    return Ok(());
                }
                self.output.setup_connection(0, 0, 0)?;
            }
            Some(_) => {}
            None => return Ok(()),
        }
        if let Some(flit) = self.pending.pop_front() {
            self.output.add_flit(0, flit)?;
        }
        Ok(())
    }

    pub fn copy(&mut self, ctx: &mut SimContext) {
        self.input.write_output_credit();
        if let Err(err) = self.output.write_output_flit() {
            ctx.report(err);
        }
    }

    pub fn reset(&mut self) {
        self.input.reset();
        self.output.reset();
        self.pending.clear();
        self.received.clear();
    }
}

impl fmt::Display for Processor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "processor {}: {} flits queued", self.node, self.pending.len())?;
        write!(f, "{}{}", self.input, self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Credit;
    use crate::stats::Counters;
    use crate::traffic::PacketRequest;

    /// Injects one fixed packet on the first call.
    struct Once(Option<PacketRequest>);

    impl TrafficSource for Once {
        fn inject(&mut self, _node: usize, _ctx: &mut SimContext) -> Vec<PacketRequest> {
            self.0.take().into_iter().collect()
        }

        fn reset(&mut self) {}
    }

    #[test]
    fn test_injection() {
        let mut ctx = SimContext::new(0);
        let mut stats = Counters::new(1);
        let mut traffic = Once(Some(PacketRequest { dest: 3, length: 2 }));
        let mut proc = Processor::new(0, 2);
        let mut sent = Vec::new();
        for _ in 0..8 {
            proc.update(&mut ctx, &mut traffic, &mut stats);
            proc.copy(&mut ctx);
            if let Some(flit) = proc.output_mut().take_outgoing() {
                sent.push(flit);
                // the router frees the slot right away
                proc.output_mut()
                    .set_incoming_credit(Credit { vc: 0 })
                    .unwrap();
            }
            ctx.advance();
        }
        assert_eq!(ctx.generated(), 1);
        assert_eq!(stats.generated(), 1);
        assert_eq!(sent.len(), 4);
        assert!(sent[0].is_header() && sent[3].is_tail());
        assert_eq!(proc.pending(), 0);
        assert!(ctx.violations().is_empty());
    }

    #[test]
    fn test_backpressure() {
        let mut ctx = SimContext::new(0);
        let mut stats = Counters::new(1);
        let mut traffic = Once(Some(PacketRequest { dest: 1, length: 4 }));
        let mut proc = Processor::new(0, 2);
        let mut sent = 0;
        for _ in 0..8 {
            proc.update(&mut ctx, &mut traffic, &mut stats);
            proc.copy(&mut ctx);
            sent += proc.output_mut().take_outgoing().map_or(0, |_| 1);
            ctx.advance();
        }
        // no credits come back: only a buffer's worth leaves
        assert_eq!(sent, 2);
        assert_eq!(proc.pending(), 4);
    }

    #[test]
    fn test_ejection() {
        let _logger = env_logger::builder().is_test(true).try_init();
        let mut ctx = SimContext::new(0);
        ctx.set_phase(Phase::Draining);
        let mut stats = Counters::new(1);
        let mut traffic = Once(None);
        let mut proc = Processor::new(0, 2);
        let flits = vec![
            Flit::header(4, None, 0, 1, 0, 1),
            Flit::body(4, None, 0, 0),
            Flit::tail(4, None, 0),
            Flit::header(5, None, 0, 1, 0, 3),
            Flit::tail(5, None, 0),
        ];
        for flit in flits {
            proc.input_mut().set_incoming(flit).unwrap();
            proc.update(&mut ctx, &mut traffic, &mut stats);
            proc.copy(&mut ctx);
            assert_eq!(
                proc.input_mut().take_outgoing_credit(),
                Some(Credit { vc: 0 })
            );
            ctx.advance();
        }
        assert_eq!(ctx.retired(), 1);
        assert_eq!(stats.retired(), 1);
        assert!(matches!(
            ctx.violations(),
            [(
                4,
                Error::Protocol {
                    fault: Fault::IncompletePacket(5),
                    ..
                }
            )]
        ));
    }
}
