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

//! Hardware building blocks of a network node.

use std::fmt;

mod buffer;
mod flit;
mod link;
mod node;
mod port;
mod processor;
mod router;
mod vc;

pub use buffer::Buffer;
pub use flit::{Credit, Flit, FlitKind};
pub use link::Link;
pub use node::Node;
pub use port::{InputPort, OutputPort};
pub use processor::Processor;
pub use router::Router;
pub use vc::{ChannelState, InputVc, OutputVc, VcControl, VcState, VirtualChannel};

/// Number of router VCs in each state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Census {
    pub idle: usize,
    pub active: usize,
    pub wait_credit: usize,
    pub wait_vc_alloc: usize,
}

impl Census {
    pub fn add(&mut self, state: VcState) {
        match state {
            VcState::Idle => self.idle += 1,
            VcState::Active => self.active += 1,
            VcState::WaitCredit => self.wait_credit += 1,
            VcState::WaitVcAlloc => self.wait_vc_alloc += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.idle + self.active + self.wait_credit + self.wait_vc_alloc
    }
}

impl fmt::Display for Census {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {} {}",
            VcState::Idle,
            self.idle,
            VcState::Active,
            self.active,
            VcState::WaitCredit,
            self.wait_credit,
            VcState::WaitVcAlloc,
            self.wait_vc_alloc
        )
    }
}
