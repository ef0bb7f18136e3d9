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

//! Traffic sources: who sends how much to whom, every cycle.

use std::collections::VecDeque;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use serde::{Deserialize, Serialize};

use crate::config::TrafficConfiguration;
use crate::sim::SimContext;
use crate::{Cycle, Error};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficPattern {
    Uniform,
    BitComp,
    BitRev,
    Transpose,
    Shuffle,
    Tornado,
    Neighbour,
    RandPerm,
    Diagonal,
    Asymmetric,
}

impl FromStr for TrafficPattern {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pattern = match s.to_lowercase().replace('_', "").as_str() {
            "uniform" => TrafficPattern::Uniform,
            "bitcomp" => TrafficPattern::BitComp,
            "bitrev" => TrafficPattern::BitRev,
            "transpose" => TrafficPattern::Transpose,
            "shuffle" => TrafficPattern::Shuffle,
            "tornado" => TrafficPattern::Tornado,
            "neighbour" | "neighbor" => TrafficPattern::Neighbour,
            "randperm" => TrafficPattern::RandPerm,
            "diagonal" => TrafficPattern::Diagonal,
            "asymmetric" => TrafficPattern::Asymmetric,
            _ => return Err(anyhow::anyhow!("unknown traffic pattern '{}'", s)),
        };
        Ok(pattern)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionProcess {
    Bernoulli,
    OnOff,
}

impl FromStr for InjectionProcess {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "").as_str() {
            "bernoulli" => Ok(InjectionProcess::Bernoulli),
            "onoff" => Ok(InjectionProcess::OnOff),
            _ => Err(anyhow::anyhow!("unknown injection process '{}'", s)),
        }
    }
}

/// One packet to generate: `length` is the number of body flits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketRequest {
    pub dest: usize,
    pub length: usize,
}

pub trait TrafficSource {
    /// Packets `node` generates this cycle.
    fn inject(&mut self, node: usize, ctx: &mut SimContext) -> Vec<PacketRequest>;

    fn reset(&mut self);
}

fn log2_exact(nodes: usize) -> Option<u32> {
    if nodes.is_power_of_two() {
        Some(nodes.trailing_zeros())
    } else {
        None
    }
}

/// Destination pattern combined with an injection process.
#[derive(Clone, Debug)]
pub struct SyntheticTraffic {
    pattern: TrafficPattern,
    injection: InjectionProcess,
    nodes: usize,
    k: usize,
    n: usize,
    rate: f64,
    packet_length: usize,
    alpha: f64,
    beta: f64,
    perm: Vec<usize>,
    on: Vec<bool>,
}

impl SyntheticTraffic {
    pub fn new(config: &TrafficConfiguration, k: usize, n: usize) -> Result<Self, Error> {
        let nodes = crate::topologies::node_count(k, n).ok_or(Error::InvalidDimensions { k, n })?;
        let pattern = config.pattern;
        let supported = match pattern {
            TrafficPattern::BitComp | TrafficPattern::BitRev | TrafficPattern::Shuffle => {
                log2_exact(nodes).is_some()
            }
            TrafficPattern::Transpose => log2_exact(nodes).map_or(false, |lg| lg % 2 == 0),
            _ => true,
        };
        if !supported {
            return Err(Error::UnsupportedTraffic(pattern, nodes));
        }
        if config.injection == InjectionProcess::OnOff
            && ((config.burst_alpha + config.burst_beta - 1.0).abs() > 1e-9 || config.burst_alpha <= 0.0)
        {
            return Err(Error::InvalidBurst {
                alpha: config.burst_alpha,
                beta: config.burst_beta,
            });
        }
        let mut perm: Vec<usize> = (0..nodes).collect();
        if pattern == TrafficPattern::RandPerm {
            let mut rng = Xoshiro256StarStar::seed_from_u64(config.perm_seed);
            perm.shuffle(&mut rng);
        }
        Ok(Self {
            pattern,
            injection: config.injection,
            nodes,
            k,
            n,
            rate: config.injection_rate,
            packet_length: config.flits_per_packet,
            alpha: config.burst_alpha,
            beta: config.burst_beta,
            perm,
            on: vec![false; nodes],
        })
    }

    pub fn pattern(&self) -> TrafficPattern {
        self.pattern
    }

    /// Destination of the next packet from `src`. Random patterns draw from
    /// `rng`.
    pub fn destination<R: Rng + ?Sized>(&self, src: usize, rng: &mut R) -> usize {
        let nodes = self.nodes;
        let lg = nodes.trailing_zeros();
        match self.pattern {
            // never picks the last node, but may pick the source
            TrafficPattern::Uniform => rng.gen_range(0..nodes - 1),
            TrafficPattern::BitComp => !src & (nodes - 1),
            TrafficPattern::BitRev => {
                (0..lg).fold(0, |dest, b| dest | (((src >> b) & 1) << (lg - b - 1)))
            }
            TrafficPattern::Transpose => {
                let half = lg / 2;
                let mask_lo = (1 << half) - 1;
                let mask_hi = mask_lo << half;
                ((src >> half) & mask_lo) | ((src << half) & mask_hi)
            }
            TrafficPattern::Shuffle => ((src << 1) & (nodes - 1)) | ((src >> (lg - 1)) & 1),
            TrafficPattern::Tornado => {
                let k = self.k;
                let mut offset = 1;
                let mut dest = 0;
                for _ in 0..self.n {
                    dest += offset * (((src / offset) % k + (k / 2 - 1)) % k);
                    // doubles rather than scaling by k
                    offset *= 2;
                }
                dest
            }
            TrafficPattern::Neighbour => {
                let k = self.k;
                let mut offset = 1;
                let mut dest = 0;
                for _ in 0..self.n {
                    dest += offset * (((src / offset) % k + 1) % k);
                    offset *= k;
                }
                dest
            }
            TrafficPattern::RandPerm => self.perm[src],
            TrafficPattern::Diagonal => {
                if rng.gen_bool(0.5) {
                    (src + 1) % nodes
                } else {
                    src
                }
            }
            // always the lower half
            TrafficPattern::Asymmetric => src % (nodes / 2),
        }
    }

    /// Body length of the packet `src` injects this cycle, 0 for none.
    fn packet_length<R: Rng + ?Sized>(&mut self, src: usize, rng: &mut R) -> usize {
        let length = self.packet_length.max(1) as f64;
        let inject = match self.injection {
            InjectionProcess::Bernoulli => rng.gen::<f64>() < self.rate / length,
            InjectionProcess::OnOff => {
                let on = &mut self.on[src];
                if !*on {
                    if rng.gen::<f64>() < self.alpha {
                        *on = true;
                    }
                } else if rng.gen::<f64>() < self.beta {
                    *on = false;
                }
                *on && rng.gen::<f64>() < self.rate * (1.0 + self.beta / self.alpha) / length
            }
        };
        if inject {
            self.packet_length
        } else {
            0
        }
    }
}

impl TrafficSource for SyntheticTraffic {
    fn inject(&mut self, node: usize, ctx: &mut SimContext) -> Vec<PacketRequest> {
        // draw the destination first so the random stream does not depend
        // on the injection outcome
        let dest = self.destination(node, ctx.rng_mut());
        let length = self.packet_length(node, ctx.rng_mut());
        if length > 0 {
            vec![PacketRequest { dest, length }]
        } else {
            Vec::new()
        }
    }

    fn reset(&mut self) {
        for on in self.on.iter_mut() {
            *on = false;
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct TraceEvent {
    clock: Cycle,
    dest: usize,
    burst: usize,
}

/// Replays `clock,source,dest,burst` events.
#[derive(Clone, Debug)]
pub struct TraceTraffic {
    trace: Vec<Vec<TraceEvent>>,
    pending: Vec<VecDeque<TraceEvent>>,
}

impl TraceTraffic {
    pub fn parse(text: &str, nodes: usize) -> Result<Self, Error> {
        let mut trace = vec![Vec::new(); nodes];
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let bad = || Error::InvalidTrace(lineno + 1, line.to_string());
            let fields = line
                .split(',')
                .map(|f| f.trim().parse::<usize>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| bad())?;
            if fields.len() != 4 || fields[1] >= nodes || fields[2] >= nodes {
                return Err(bad());
            }
            trace[fields[1]].push(TraceEvent {
                clock: fields[0],
                dest: fields[2],
                burst: fields[3],
            });
        }
        for events in trace.iter_mut() {
            events.sort_by_key(|e| e.clock);
        }
        let pending = trace.iter().map(|t| t.iter().copied().collect()).collect();
        Ok(Self { trace, pending })
    }

    pub fn from_file<P: AsRef<Path>>(path: P, nodes: usize) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read trace {}", path.as_ref().display()))?;
        let trace = Self::parse(&text, nodes)?;
        log::info!(
            "read {} events from traffic trace {}",
            trace.len(),
            path.as_ref().display()
        );
        Ok(trace)
    }

    /// Total number of events in the trace.
    pub fn len(&self) -> usize {
        self.trace.iter().map(|t| t.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remaining(&self) -> usize {
        self.pending.iter().map(|p| p.len()).sum()
    }
}

impl TrafficSource for TraceTraffic {
    fn inject(&mut self, node: usize, ctx: &mut SimContext) -> Vec<PacketRequest> {
        let mut requests = Vec::new();
        if let Some(queue) = self.pending.get_mut(node) {
            while queue.front().map_or(false, |e| e.clock <= ctx.cycle()) {
                if let Some(event) = queue.pop_front() {
                    requests.push(PacketRequest {
                        dest: event.dest,
                        length: event.burst,
                    });
                }
            }
        }
        requests
    }

    fn reset(&mut self) {
        self.pending = self
            .trace
            .iter()
            .map(|t| t.iter().copied().collect())
            .collect();
    }
}
