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

//! Input and output ports.
//!
//! Each port owns its VCs, a round-robin cursor and the one-signal registers
//! that links read from and write into. Links never hold references to
//! ports: the owner of the link moves signals between the registers.

use std::fmt;

use super::{Credit, Flit, FlitKind, InputVc, OutputVc, VcState, VirtualChannel};
use crate::error::{Error, Fault};

/// Round-robin scan starting just after `cursor`.
fn round_robin(cursor: usize, len: usize) -> impl Iterator<Item = usize> {
    (1..=len).map(move |j| (cursor + j) % len)
}

#[derive(Clone, Debug)]
pub struct InputPort {
    node: usize,
    index: usize,
    vcs: Vec<InputVc>,
    cursor: usize,
    incoming: Option<Flit>,
    send_credit: bool,
    outgoing_credit: Option<Credit>,
}

impl InputPort {
    pub fn new(node: usize, index: usize, num_vcs: usize, buffer_size: usize) -> Self {
        Self {
            node,
            index,
            vcs: (0..num_vcs).map(|_| InputVc::new(buffer_size)).collect(),
            cursor: 0,
            incoming: None,
            send_credit: false,
            outgoing_credit: None,
        }
    }

    fn fault(&self, vc: usize, fault: Fault) -> Error {
        Error::Protocol {
            node: self.node,
            port: self.index,
            vc,
            fault,
        }
    }

    fn vc_mut(&mut self, vc: usize) -> Result<&mut InputVc, Error> {
        let err = self.fault(vc, Fault::UnknownVc);
        self.vcs.get_mut(vc).ok_or(err)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn vcs(&self) -> &[InputVc] {
        &self.vcs
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Link side: latch a delivered flit for the next update phase.
    pub fn set_incoming(&mut self, flit: Flit) -> Result<(), Error> {
        if self.incoming.is_some() {
            return Err(self.fault(flit.vc, Fault::InputOverrun));
        }
        self.incoming = Some(flit);
        Ok(())
    }

    pub fn incoming(&self) -> Option<&Flit> {
        self.incoming.as_ref()
    }

    /// Move the latched flit into the buffer of the VC it travelled on.
    pub fn read_input_flit(&mut self) -> Result<(), Error> {
        if let Some(flit) = self.incoming.take() {
            let vc = flit.vc;
            let res = self.vc_mut(vc)?.add_flit(flit);
            res.map_err(|fault| self.fault(vc, fault))?;
        }
        Ok(())
    }

    /// Select the next VC with a flit ready to be switched.
    ///
    /// Scans ACTIVE and WAIT_VC channels round-robin from the last served
    /// one and moves the cursor onto the selected VC.
    pub fn peek_next(&mut self) -> Option<(usize, FlitKind)> {
        for vc in round_robin(self.cursor, self.vcs.len()) {
            let channel = &self.vcs[vc];
            if matches!(channel.state(), VcState::Active | VcState::WaitVcAlloc) {
                if let Some(flit) = channel.peek_flit() {
                    self.cursor = vc;
                    return Some((vc, flit.kind));
                }
            }
        }
        None
    }

    /// Take the flit selected by the last `peek_next`.
    pub fn take_next_flit(&mut self) -> Result<Option<Flit>, Error> {
        let vc = self.cursor;
        let flit = self.vc_mut(vc)?.take_flit();
        let flit = flit.map_err(|fault| self.fault(vc, fault))?;
        if flit.is_some() {
            self.send_credit = true;
        }
        Ok(flit)
    }

    /// Copy phase: return a credit for the VC served this cycle.
    pub fn write_output_credit(&mut self) {
        if self.send_credit {
            self.outgoing_credit = Some(Credit { vc: self.cursor });
            self.send_credit = false;
        }
    }

    pub fn take_outgoing_credit(&mut self) -> Option<Credit> {
        self.outgoing_credit.take()
    }

    pub fn outgoing_credit(&self) -> Option<&Credit> {
        self.outgoing_credit.as_ref()
    }

    pub fn inc_credits(&mut self, vc: usize) -> Result<(), Error> {
        let res = self.vc_mut(vc)?.inc_credits();
        res.map_err(|fault| self.fault(vc, fault))
    }

    pub fn setup_connection(&mut self, vc: usize, port: usize, out_vc: usize) -> Result<(), Error> {
        let res = self.vc_mut(vc)?.setup_connection(port, out_vc);
        res.map_err(|fault| self.fault(vc, fault))
    }

    pub fn set_waiting_vc(&mut self, vc: usize) -> Result<(), Error> {
        let res = self.vc_mut(vc)?.set_waiting_vc();
        res.map_err(|fault| self.fault(vc, fault))
    }

    pub fn binding(&self, vc: usize) -> Result<(usize, usize), Error> {
        self.vcs
            .get(vc)
            .and_then(|channel| channel.binding())
            .ok_or_else(|| self.fault(vc, Fault::MissingBinding))
    }

    pub fn reset(&mut self) {
        for vc in self.vcs.iter_mut() {
            vc.reset();
        }
        self.cursor = 0;
        self.incoming = None;
        self.send_credit = false;
        self.outgoing_credit = None;
    }
}

impl fmt::Display for InputPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, vc) in self.vcs.iter().enumerate() {
            let mark = if i == self.cursor { "*" } else { "" };
            let name = format!("I[{}:{}]{}", self.index, i, mark);
            writeln!(f, "{:<12}{}", name, vc)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct OutputPort {
    node: usize,
    index: usize,
    vcs: Vec<OutputVc>,
    cursor: usize,
    incoming_credit: Option<Credit>,
    outgoing: Option<Flit>,
}

impl OutputPort {
    pub fn new(node: usize, index: usize, num_vcs: usize, buffer_size: usize) -> Self {
        Self {
            node,
            index,
            vcs: (0..num_vcs).map(|i| OutputVc::new(i, buffer_size)).collect(),
            cursor: 0,
            incoming_credit: None,
            outgoing: None,
        }
    }

    fn fault(&self, vc: usize, fault: Fault) -> Error {
        Error::Protocol {
            node: self.node,
            port: self.index,
            vc,
            fault,
        }
    }

    fn vc_mut(&mut self, vc: usize) -> Result<&mut OutputVc, Error> {
        let err = self.fault(vc, Fault::UnknownVc);
        self.vcs.get_mut(vc).ok_or(err)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn vcs(&self) -> &[OutputVc] {
        &self.vcs
    }

    /// Link side: latch a delivered credit for the next update phase.
    pub fn set_incoming_credit(&mut self, credit: Credit) -> Result<(), Error> {
        if self.incoming_credit.is_some() {
            return Err(self.fault(credit.vc, Fault::InputOverrun));
        }
        self.incoming_credit = Some(credit);
        Ok(())
    }

    pub fn incoming_credit(&self) -> Option<&Credit> {
        self.incoming_credit.as_ref()
    }

    pub fn read_input_credit(&mut self) -> Option<Credit> {
        self.incoming_credit.take()
    }

    /// Stage a flit in an output VC slot.
    pub fn add_flit(&mut self, vc: usize, flit: Flit) -> Result<(), Error> {
        let res = self.vc_mut(vc)?.add_flit(flit);
        res.map_err(|fault| self.fault(vc, fault))
    }

    /// Copy phase: pick the next ACTIVE VC with a staged flit and put it on
    /// the outgoing register.
    pub fn write_output_flit(&mut self) -> Result<(), Error> {
        for vc in round_robin(self.cursor, self.vcs.len()) {
            let channel = &self.vcs[vc];
            if channel.is_active() && channel.has_flit() {
                self.cursor = vc;
                let res = self.vcs[vc].take_flit();
                let flit = res.map_err(|fault| self.fault(vc, fault))?;
                self.outgoing = flit;
                return Ok(());
            }
        }
        Ok(())
    }

    pub fn take_outgoing(&mut self) -> Option<Flit> {
        self.outgoing.take()
    }

    pub fn outgoing(&self) -> Option<&Flit> {
        self.outgoing.as_ref()
    }

    /// First IDLE VC with full credits among the first `available` ones.
    pub fn alloc_vc(&self, available: usize) -> Option<usize> {
        self.vcs
            .iter()
            .take(available)
            .position(|vc| vc.is_idle() && vc.has_full_credits())
    }

    /// VC `vc` itself, if it is one of the first `available` ones and free.
    pub fn alloc_specific(&self, vc: usize, available: usize) -> Option<usize> {
        self.vcs
            .iter()
            .take(available)
            .nth(vc)
            .filter(|channel| channel.is_idle() && channel.has_full_credits())
            .map(|_| vc)
    }

    pub fn inc_credits(&mut self, vc: usize) -> Result<(), Error> {
        let res = self.vc_mut(vc)?.inc_credits();
        res.map_err(|fault| self.fault(vc, fault))
    }

    pub fn setup_connection(&mut self, vc: usize, port: usize, in_vc: usize) -> Result<(), Error> {
        self.vc_mut(vc)?.setup_connection(port, in_vc);
        Ok(())
    }

    pub fn has_credits(&self, vc: usize) -> bool {
        self.vcs
            .get(vc)
            .map_or(false, |channel| channel.state() != VcState::WaitCredit)
    }

    pub fn is_empty(&self, vc: usize) -> bool {
        self.vcs.get(vc).map_or(false, |channel| !channel.has_flit())
    }

    pub fn connected_input(&self, vc: usize) -> Result<(usize, usize), Error> {
        self.vcs
            .get(vc)
            .and_then(|channel| channel.connected_input())
            .ok_or_else(|| self.fault(vc, Fault::MissingBinding))
    }

    pub fn reset(&mut self) {
        for vc in self.vcs.iter_mut() {
            vc.reset();
        }
        self.cursor = 0;
        self.incoming_credit = None;
        self.outgoing = None;
    }
}

impl fmt::Display for OutputPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, vc) in self.vcs.iter().enumerate() {
            let mark = if i == self.cursor { "*" } else { "" };
            let name = format!("O[{}:{}]{}", self.index, i, mark);
            writeln!(f, "{:<12}{}", name, vc)?;
        }
        Ok(())
    }
}
