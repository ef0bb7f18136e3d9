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

//! Virtual channels and their credit/state machine.

use std::fmt;

use super::{Buffer, Flit};
use crate::error::Fault;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VcState {
    Idle,
    Active,
    WaitCredit,
    WaitVcAlloc,
}

impl VcState {
    pub fn is_wait(self) -> bool {
        matches!(self, VcState::WaitCredit | VcState::WaitVcAlloc)
    }
}

impl fmt::Display for VcState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            VcState::Idle => "IDLE",
            VcState::Active => "ACTIVE",
            VcState::WaitCredit => "WAIT_C",
            VcState::WaitVcAlloc => "WAIT_VC",
        };
        write!(f, "{}", s)
    }
}

/// A two-level state stack.
///
/// The top is `state`. A wait state can only sit on top of IDLE or ACTIVE,
/// and `suspended_active` remembers which one is underneath.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelState {
    state: VcState,
    suspended_active: bool,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            state: VcState::Idle,
            suspended_active: false,
        }
    }
}

impl ChannelState {
    pub fn current(&self) -> VcState {
        self.state
    }

    /// Suspend the current state with a wait state.
    pub fn push_wait(&mut self, wait: VcState) -> Result<(), Fault> {
        debug_assert!(wait.is_wait());
        match self.state {
            VcState::Idle => self.suspended_active = false,
            VcState::Active => self.suspended_active = true,
            _ => return Err(Fault::StateOverflow),
        }
        self.state = wait;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<(), Fault> {
        self.state = match self.state {
            VcState::Idle => return Err(Fault::StateUnderflow),
            VcState::Active => VcState::Idle,
            VcState::WaitCredit | VcState::WaitVcAlloc => {
                if self.suspended_active {
                    VcState::Active
                } else {
                    VcState::Idle
                }
            }
        };
        self.suspended_active = false;
        Ok(())
    }

    /// Open a connection. Under a wait state the connection is recorded
    /// underneath and becomes visible once the wait is popped.
    pub fn set_active(&mut self) {
        match self.state {
            VcState::Idle => self.state = VcState::Active,
            VcState::Active => {}
            VcState::WaitCredit | VcState::WaitVcAlloc => self.suspended_active = true,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Credit counter plus state, shared by both channel directions.
#[derive(Clone, Debug)]
pub struct VcControl {
    state: ChannelState,
    credits: usize,
    capacity: usize,
}

impl VcControl {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: ChannelState::default(),
            credits: capacity,
            capacity,
        }
    }

    pub fn reset(&mut self) {
        self.state.reset();
        self.credits = self.capacity;
    }
}

pub trait VirtualChannel {
    fn control(&self) -> &VcControl;
    fn control_mut(&mut self) -> &mut VcControl;
    fn has_flit(&self) -> bool;

    fn state(&self) -> VcState {
        self.control().state.current()
    }

    fn credits(&self) -> usize {
        self.control().credits
    }

    fn capacity(&self) -> usize {
        self.control().capacity
    }

    fn has_full_credits(&self) -> bool {
        self.control().credits == self.control().capacity
    }

    fn is_idle(&self) -> bool {
        self.state() == VcState::Idle
    }

    fn is_active(&self) -> bool {
        self.state() == VcState::Active
    }

    fn set_active(&mut self) {
        self.control_mut().state.set_active();
    }

    fn set_waiting_vc(&mut self) -> Result<(), Fault> {
        if self.state() == VcState::WaitVcAlloc {
            return Ok(());
        }
        self.control_mut().state.push_wait(VcState::WaitVcAlloc)
    }

    fn pop_state(&mut self) -> Result<(), Fault> {
        self.control_mut().state.pop()
    }

    /// A downstream slot was freed.
    fn inc_credits(&mut self) -> Result<(), Fault> {
        let has_flit = self.has_flit();
        let control = self.control_mut();
        if control.credits >= control.capacity {
            return Err(Fault::CreditOverflow);
        }
        if control.state.current() == VcState::WaitCredit {
            control.state.pop()?;
        }
        // a channel that went idle with flits still queued resumes here
        if has_flit && control.state.current() == VcState::Idle {
            control.state.set_active();
        }
        control.credits += 1;
        Ok(())
    }

    /// A flit left towards the downstream buffer.
    fn dec_credits(&mut self) -> Result<(), Fault> {
        let control = self.control_mut();
        if control.credits == 0 {
            return Err(Fault::CreditUnderflow);
        }
        if control.credits == 1 {
            control.state.push_wait(VcState::WaitCredit)?;
        }
        control.credits -= 1;
        Ok(())
    }
}

/// Receiving side: a buffer plus the output VC this channel is bound to.
#[derive(Clone, Debug)]
pub struct InputVc {
    control: VcControl,
    buffer: Buffer,
    binding: Option<(usize, usize)>,
}

impl InputVc {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            control: VcControl::new(buffer_size),
            buffer: Buffer::new(buffer_size),
            binding: None,
        }
    }

    pub fn add_flit(&mut self, flit: Flit) -> Result<(), Fault> {
        if self.is_idle() {
            self.set_active();
        }
        self.buffer.offer(flit).map_err(|_| Fault::BufferFull)
    }

    pub fn peek_flit(&self) -> Option<&Flit> {
        self.buffer.peek()
    }

    /// Remove the head flit for forwarding. Only ACTIVE and WAIT_VC channels
    /// release flits; a tail closes the connection.
    pub fn take_flit(&mut self) -> Result<Option<Flit>, Fault> {
        if !matches!(self.state(), VcState::Active | VcState::WaitVcAlloc) {
            return Ok(None);
        }
        let flit = match self.buffer.take() {
            Some(flit) => flit,
            None => return Ok(None),
        };
        if flit.is_tail() {
            self.pop_state()?;
        }
        self.dec_credits()?;
        Ok(Some(flit))
    }

    pub fn setup_connection(&mut self, port: usize, vc: usize) -> Result<(), Fault> {
        self.binding = Some((port, vc));
        if self.state() == VcState::WaitVcAlloc {
            self.pop_state()?;
        }
        Ok(())
    }

    pub fn binding(&self) -> Option<(usize, usize)> {
        self.binding
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn reset(&mut self) {
        self.control.reset();
        self.buffer.clear();
        self.binding = None;
    }
}

impl VirtualChannel for InputVc {
    fn control(&self) -> &VcControl {
        &self.control
    }
    fn control_mut(&mut self) -> &mut VcControl {
        &mut self.control
    }
    fn has_flit(&self) -> bool {
        !self.buffer.is_empty()
    }
}

impl fmt::Display for InputVc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let to = match self.binding {
            Some((port, vc)) if !self.is_idle() => format!("O[{}:{}]", port, vc),
            _ => "-".to_string(),
        };
        write!(
            f,
            "{:<12}{:<12}{:<12}{}",
            to,
            self.state(),
            self.credits(),
            self.buffer
        )
    }
}

/// Sending side: a single-flit staging slot plus the input VC feeding it.
#[derive(Clone, Debug)]
pub struct OutputVc {
    index: usize,
    control: VcControl,
    slot: Option<Flit>,
    connected: Option<(usize, usize)>,
}

impl OutputVc {
    pub fn new(index: usize, buffer_size: usize) -> Self {
        Self {
            index,
            control: VcControl::new(buffer_size),
            slot: None,
            connected: None,
        }
    }

    pub fn add_flit(&mut self, mut flit: Flit) -> Result<(), Fault> {
        if self.slot.is_some() {
            return Err(Fault::SlotOccupied);
        }
        flit.vc = self.index;
        self.slot = Some(flit);
        Ok(())
    }

    pub fn peek_flit(&self) -> Option<&Flit> {
        self.slot.as_ref()
    }

    /// Release the staged flit onto the link. Only ACTIVE channels send.
    pub fn take_flit(&mut self) -> Result<Option<Flit>, Fault> {
        if !self.is_active() {
            return Ok(None);
        }
        let flit = match self.slot.take() {
            Some(flit) => flit,
            None => return Ok(None),
        };
        if flit.is_tail() {
            self.pop_state()?;
        }
        self.dec_credits()?;
        Ok(Some(flit))
    }

    pub fn setup_connection(&mut self, port: usize, vc: usize) {
        self.connected = Some((port, vc));
        self.set_active();
    }

    pub fn connected_input(&self) -> Option<(usize, usize)> {
        self.connected
    }

    pub fn reset(&mut self) {
        self.control.reset();
        self.slot = None;
        self.connected = None;
    }
}

impl VirtualChannel for OutputVc {
    fn control(&self) -> &VcControl {
        &self.control
    }
    fn control_mut(&mut self) -> &mut VcControl {
        &mut self.control
    }
    fn has_flit(&self) -> bool {
        self.slot.is_some()
    }
}

impl fmt::Display for OutputVc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let from = match self.connected {
            Some((port, vc)) if !self.is_idle() => format!("I[{}:{}]", port, vc),
            _ => "-".to_string(),
        };
        write!(f, "{:<12}{:<12}{:<12}", from, self.state(), self.credits())?;
        if let Some(flit) = &self.slot {
            write!(f, "{}", flit)?;
        }
        Ok(())
    }
}
