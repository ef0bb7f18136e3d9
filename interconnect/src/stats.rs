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

//! Statistics hooks and a default collector.
//!
//! Latency and hop counts are recorded for measured flits (flits generated
//! during a sample). Accepted throughput is recorded per node for every
//! ejection slot, except while draining.

use std::fmt;

use crate::components::Flit;
use crate::sim::{Phase, SimContext};

/// Recording hooks called by the processors.
pub trait StatsCollector {
    fn packet_generated(&mut self, _node: usize, _ctx: &SimContext) {}

    /// A tail flit completed a packet at `node`.
    fn retire_packet(&mut self, node: usize, tail: &Flit, ctx: &SimContext);

    /// Called once per node and cycle; `None` is an idle ejection slot.
    fn retire_flit(&mut self, node: usize, flit: Option<&Flit>, ctx: &SimContext);
}

/// Running mean.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Average {
    sum: f64,
    count: usize,
    min: Option<f64>,
    max: Option<f64>,
}

impl Average {
    pub fn add(&mut self, x: f64) {
        self.sum += x;
        self.count += 1;
        self.min = Some(self.min.map_or(x, |m| m.min(x)));
        self.max = Some(self.max.map_or(x, |m| m.max(x)));
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Values of one closed measurement window.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SampleSummary {
    pub latency: f64,
    pub hops: f64,
    /// Mean accepted flits per node per cycle.
    pub accepted: f64,
    /// Accepted rate of the slowest node.
    pub accepted_min: f64,
    pub measured_flits: usize,
}

impl fmt::Display for SampleSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "latency {:.2} hops {:.2} accepted {:.4} (min {:.4}) over {} flits",
            self.latency, self.hops, self.accepted, self.accepted_min, self.measured_flits
        )
    }
}

#[derive(Clone, Debug)]
pub struct Counters {
    generated: usize,
    retired: usize,
    latency: Average,
    hops: Average,
    accepted: Vec<Average>,
    samples: Vec<SampleSummary>,
}

impl Counters {
    pub fn new(nodes: usize) -> Self {
        Self {
            generated: 0,
            retired: 0,
            latency: Average::default(),
            hops: Average::default(),
            accepted: vec![Average::default(); nodes],
            samples: Vec::new(),
        }
    }

    pub fn generated(&self) -> usize {
        self.generated
    }

    pub fn retired(&self) -> usize {
        self.retired
    }

    pub fn latency(&self) -> &Average {
        &self.latency
    }

    pub fn hops(&self) -> &Average {
        &self.hops
    }

    pub fn accepted(&self, node: usize) -> f64 {
        self.accepted[node].mean()
    }

    /// Values of the current window.
    pub fn summarize(&self) -> SampleSummary {
        let rates: Vec<f64> = self.accepted.iter().map(|a| a.mean()).collect();
        let accepted = if rates.is_empty() {
            0.0
        } else {
            rates.iter().sum::<f64>() / rates.len() as f64
        };
        SampleSummary {
            latency: self.latency.mean(),
            hops: self.hops.mean(),
            accepted,
            accepted_min: rates.iter().cloned().fold(f64::INFINITY, f64::min).min(accepted),
            measured_flits: self.latency.count(),
        }
    }

    /// Close the current window and start a new one.
    pub fn new_sample(&mut self) -> SampleSummary {
        let summary = self.summarize();
        self.samples.push(summary);
        self.discard_sample();
        summary
    }

    /// Start a new window without recording the current one, e.g. after
    /// warming up.
    pub fn discard_sample(&mut self) {
        self.latency.clear();
        self.hops.clear();
        for a in self.accepted.iter_mut() {
            a.clear();
        }
    }

    pub fn samples(&self) -> &[SampleSummary] {
        &self.samples
    }

    /// Mean of all closed windows.
    pub fn overall(&self) -> SampleSummary {
        let mut total = SampleSummary::default();
        if self.samples.is_empty() {
            return total;
        }
        let n = self.samples.len() as f64;
        for s in &self.samples {
            total.latency += s.latency / n;
            total.hops += s.hops / n;
            total.accepted += s.accepted / n;
            total.accepted_min += s.accepted_min / n;
            total.measured_flits += s.measured_flits;
        }
        total
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.accepted.len());
    }
}

impl StatsCollector for Counters {
    fn packet_generated(&mut self, _node: usize, _ctx: &SimContext) {
        self.generated += 1;
    }

    fn retire_packet(&mut self, _node: usize, _tail: &Flit, _ctx: &SimContext) {
        self.retired += 1;
    }

    fn retire_flit(&mut self, node: usize, flit: Option<&Flit>, ctx: &SimContext) {
        if let Some(flit) = flit.filter(|f| f.is_measured()) {
            if let Some(latency) = flit.latency() {
                self.latency.add(latency as f64);
            }
            self.hops.add(flit.hops as f64);
        }
        if ctx.phase() != Phase::Draining {
            if let Some(slot) = self.accepted.get_mut(node) {
                slot.add(if flit.is_some() { 1.0 } else { 0.0 });
            }
        }
    }
}
