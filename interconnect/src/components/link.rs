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

use super::{Credit, Flit};
use crate::Cycle;

/// A signal on the wire together with the cycles it has spent there.
#[derive(Clone, Debug)]
struct InFlight<T> {
    signal: T,
    transit: Cycle,
}

/// Fixed-delay, in-order transport between an output port and an input port.
///
/// Flits travel from `src_port` to `dst_port`; credits travel the other way
/// on the same link. Signals are enqueued during the copy phase with a zero
/// transit counter, aged once per update phase and handed over in the copy
/// phase once their counter reaches `delay`.
#[derive(Clone, Debug)]
pub struct Link {
    src_port: usize,
    dst_port: usize,
    delay: Cycle,
    flits: VecDeque<InFlight<Flit>>,
    credits: VecDeque<InFlight<Credit>>,
}

fn deliver<T>(queue: &mut VecDeque<InFlight<T>>, delay: Cycle) -> Option<T> {
    match queue.front() {
        Some(head) if head.transit >= delay => queue.pop_front().map(|f| f.signal),
        _ => None,
    }
}

impl Link {
    pub fn new(src_port: usize, dst_port: usize, delay: Cycle) -> Self {
        Self {
            src_port,
            dst_port,
            delay,
            flits: VecDeque::new(),
            credits: VecDeque::new(),
        }
    }

    pub fn src_port(&self) -> usize {
        self.src_port
    }

    pub fn dst_port(&self) -> usize {
        self.dst_port
    }

    pub fn delay(&self) -> Cycle {
        self.delay
    }

    /// Age every signal on the link by one cycle.
    pub fn update(&mut self) {
        for f in self.flits.iter_mut() {
            f.transit += 1;
        }
        for c in self.credits.iter_mut() {
            c.transit += 1;
        }
        #[cfg(feature = "trace-link-contents")]
        log::trace!("link {}->{}: {}", self.src_port, self.dst_port, self);
    }

    pub fn send_flit(&mut self, flit: Flit) {
        self.flits.push_back(InFlight {
            signal: flit,
            transit: 0,
        });
    }

    pub fn send_credit(&mut self, credit: Credit) {
        self.credits.push_back(InFlight {
            signal: credit,
            transit: 0,
        });
    }

    pub fn deliver_flit(&mut self) -> Option<Flit> {
        deliver(&mut self.flits, self.delay)
    }

    pub fn deliver_credit(&mut self) -> Option<Credit> {
        deliver(&mut self.credits, self.delay)
    }

    pub fn flits(&self) -> impl Iterator<Item = &Flit> {
        self.flits.iter().map(|f| &f.signal)
    }

    pub fn credits(&self) -> impl Iterator<Item = &Credit> {
        self.credits.iter().map(|c| &c.signal)
    }

    pub fn is_idle(&self) -> bool {
        self.flits.is_empty() && self.credits.is_empty()
    }

    pub fn reset(&mut self) {
        self.flits.clear();
        self.credits.clear();
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "flits:")?;
        for flit in &self.flits {
            write!(f, " {}@{}", flit.signal, flit.transit)?;
        }
        write!(f, " credits:")?;
        for credit in &self.credits {
            write!(f, " {}@{}", credit.signal, credit.transit)?;
        }
        Ok(())
    }
}
