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

//! Simulation state shared by all components, and the driver that owns the
//! network together with its traffic and statistics collaborators.

use std::fmt;

use log::{debug, error, info};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;

use crate::config::Config;
use crate::network::Network;
use crate::routing::RoutingKind;
use crate::stats::StatsCollector;
use crate::traffic::TrafficSource;
use crate::{Cycle, Error, PacketId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    WarmingUp,
    Running,
    Draining,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Phase::WarmingUp => "warming up",
            Phase::Running => "running",
            Phase::Draining => "draining",
            Phase::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// Cycle counter, random stream and bookkeeping threaded through every
/// update and copy call.
#[derive(Clone, Debug)]
pub struct SimContext {
    cycle: Cycle,
    seed: u64,
    rng: Xoshiro256StarStar,
    phase: Phase,
    sample: usize,
    next_packet: PacketId,
    generated: usize,
    retired: usize,
    violations: Vec<(Cycle, Error)>,
}

impl SimContext {
    pub fn new(seed: u64) -> Self {
        Self {
            cycle: 0,
            seed,
            rng: Xoshiro256StarStar::seed_from_u64(seed),
            phase: Phase::WarmingUp,
            sample: 0,
            next_packet: 0,
            generated: 0,
            retired: 0,
            violations: Vec::new(),
        }
    }

    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    pub fn advance(&mut self) {
        self.cycle += 1;
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn rng_mut(&mut self) -> &mut Xoshiro256StarStar {
        &mut self.rng
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Phase) {
        debug!("@{} phase {} -> {}", self.cycle, self.phase, phase);
        self.phase = phase;
    }

    pub fn sample(&self) -> usize {
        self.sample
    }

    pub fn set_sample(&mut self, sample: usize) {
        self.sample = sample;
    }

    /// Sample number carried by flits generated now; only measured while
    /// running.
    pub fn sample_tag(&self) -> Option<usize> {
        if self.phase == Phase::Running {
            Some(self.sample)
        } else {
            None
        }
    }

    pub fn next_packet_id(&mut self) -> PacketId {
        let id = self.next_packet;
        self.next_packet += 1;
        id
    }

    pub fn packet_generated(&mut self) {
        self.generated += 1;
    }

    pub fn packet_retired(&mut self) {
        self.retired += 1;
    }

    pub fn generated(&self) -> usize {
        self.generated
    }

    pub fn retired(&self) -> usize {
        self.retired
    }

    /// Packets generated but not yet retired, including those still queued
    /// at their source.
    pub fn in_flight(&self) -> usize {
        self.generated.saturating_sub(self.retired)
    }

    /// Records a protocol violation. The cycle carries on.
    pub fn report(&mut self, err: Error) {
        error!("@{} {}", self.cycle, err);
        self.violations.push((self.cycle, err));
    }

    pub fn violations(&self) -> &[(Cycle, Error)] {
        &self.violations
    }

    /// Back to cycle 0 with the random stream re-seeded.
    pub fn reset(&mut self) {
        *self = Self::new(self.seed);
    }
}

/// A network driven by a traffic source and observed by a statistics
/// collector.
pub struct Simulation<T: TrafficSource, S: StatsCollector> {
    network: Network,
    ctx: SimContext,
    traffic: T,
    stats: S,
}

impl<T: TrafficSource, S: StatsCollector> Simulation<T, S> {
    pub fn new(config: &Config, traffic: T, stats: S) -> Result<Self, Error> {
        let mut ctx = SimContext::new(config.simulation.seed);
        let mut network = Network::new(&config.network)?;
        network.init_routing(&mut ctx)?;
        network.set_available_vcs(config.network.available_vcs)?;
        info!(
            "simulating {} routers with {} links, seed {}",
            network.node_count(),
            network.link_count(),
            ctx.seed()
        );
        Ok(Self {
            network,
            ctx,
            traffic,
            stats,
        })
    }

    pub fn step(&mut self) {
        self.network
            .step(&mut self.ctx, &mut self.traffic, &mut self.stats);
    }

    pub fn run(&mut self, cycles: Cycle) {
        for _ in 0..cycles {
            self.step();
        }
    }

    /// Stops injection and steps until every generated packet is retired.
    /// Returns the number of cycles it took.
    pub fn drain(&mut self, limit: Cycle) -> Result<Cycle, Error> {
        self.ctx.set_phase(Phase::Draining);
        let start = self.ctx.cycle();
        while self.ctx.in_flight() > 0 {
            if self.ctx.cycle() - start >= limit {
                return Err(Error::DrainTimeout {
                    cycles: limit,
                    in_flight: self.ctx.in_flight(),
                });
            }
            self.step();
        }
        self.ctx.set_phase(Phase::Done);
        let cycles = self.ctx.cycle() - start;
        info!("drained in {} cycles", cycles);
        Ok(cycles)
    }

    /// Empties the network and restarts the clock. Topology and routing are
    /// kept.
    pub fn reset(&mut self) {
        self.network.reset();
        self.ctx.reset();
        self.traffic.reset();
    }

    pub fn init_routing(&mut self) -> Result<(), Error> {
        self.network.init_routing(&mut self.ctx)
    }

    pub fn set_routing(&mut self, kind: RoutingKind) -> Result<(), Error> {
        self.network.set_routing(kind, &mut self.ctx)
    }

    pub fn set_available_vcs(&mut self, vcs: usize) -> Result<(), Error> {
        self.network.set_available_vcs(vcs)
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.ctx.set_phase(phase);
    }

    pub fn set_sample(&mut self, sample: usize) {
        self.ctx.set_sample(sample);
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn ctx(&self) -> &SimContext {
        &self.ctx
    }

    pub fn traffic(&self) -> &T {
        &self.traffic
    }

    pub fn stats(&self) -> &S {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut S {
        &mut self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfiguration;
    use crate::stats::Counters;
    use crate::topologies::TopologyKind;
    use crate::traffic::{SyntheticTraffic, TraceTraffic};
    use rand::Rng;

    #[test]
    fn test_context() {
        let mut ctx = SimContext::new(3);
        assert_eq!(ctx.sample_tag(), None);
        ctx.set_phase(Phase::Running);
        ctx.set_sample(2);
        assert_eq!(ctx.sample_tag(), Some(2));
        assert_eq!(ctx.next_packet_id(), 0);
        assert_eq!(ctx.next_packet_id(), 1);
        ctx.packet_generated();
        ctx.packet_generated();
        ctx.packet_retired();
        assert_eq!(ctx.in_flight(), 1);
        let first: u64 = ctx.rng_mut().gen();
        ctx.advance();
        ctx.report(Error::InvalidBufferSize);
        assert_eq!(ctx.violations(), &[(1, Error::InvalidBufferSize)]);

        ctx.reset();
        assert_eq!(ctx.cycle(), 0);
        assert_eq!(ctx.phase(), Phase::WarmingUp);
        assert!(ctx.violations().is_empty());
        assert_eq!(ctx.rng_mut().gen::<u64>(), first);
    }

    fn two_by_two() -> Config {
        Config {
            network: NetworkConfiguration {
                topology: TopologyKind::Mesh,
                k: 2,
                n: 2,
                buffer_size: 2,
                link_delay: 1,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Runs a single packet from corner 0 to corner 3 and returns
    /// (latency, hops, cycles).
    fn single_packet() -> (f64, f64, Cycle) {
        let config = two_by_two();
        let trace = TraceTraffic::parse("0,0,3,2", 4).unwrap();
        let mut sim = Simulation::new(&config, trace, Counters::new(4)).unwrap();
        sim.set_phase(Phase::Running);
        sim.run(1);
        let cycles = sim.drain(100).unwrap();
        assert_eq!(sim.ctx().generated(), 1);
        assert_eq!(sim.ctx().retired(), 1);
        assert!(sim.ctx().violations().is_empty());
        // let the last credits travel home
        sim.run(10);
        let census = sim.network().census();
        assert_eq!(census.active + census.wait_credit + census.wait_vc_alloc, 0);
        // header, two body flits and the tail
        assert_eq!(sim.stats().latency().count(), 4);
        (sim.stats().latency().mean(), sim.stats().hops().mean(), cycles)
    }

    #[test]
    fn test_single_packet_across_mesh() {
        let _logger = env_logger::builder().is_test(true).try_init();
        let (latency, hops, cycles) = single_packet();
        assert_eq!(hops, 2.0);
        // Header and first body flit stream through and are consumed at
        // cycles 6 and 7. With two-flit buffers a credit needs four cycles
        // to come back over a link of delay one, so the second half of the
        // packet stalls at the source router and arrives at 10 and 11.
        assert_eq!(latency, (6.0 + 7.0 + 10.0 + 11.0) / 4.0);
        assert_eq!(cycles, 11);
        assert_eq!(single_packet(), (latency, hops, cycles));
    }

    fn overload(config: &Config, cycles: Cycle) {
        let traffic = SyntheticTraffic::new(&config.traffic, config.network.k, config.network.n)
            .unwrap();
        let nodes = config.network.num_nodes().unwrap();
        let mut sim = Simulation::new(config, traffic, Counters::new(nodes)).unwrap();
        sim.set_phase(Phase::Running);
        let mut waited = false;
        for _ in 0..cycles {
            sim.step();
            let census = sim.network().census();
            waited |= census.wait_credit + census.wait_vc_alloc > 0;
            let errors = sim.network().audit_credits();
            assert!(errors.is_empty(), "{:#?}", errors);
        }
        assert!(waited);
        assert!(sim.ctx().in_flight() > 0);
        sim.set_phase(Phase::Draining);
        while sim.ctx().in_flight() > 0 {
            assert!(sim.ctx().cycle() < cycles + 50_000, "drain did not finish");
            sim.step();
            let errors = sim.network().audit_credits();
            assert!(errors.is_empty(), "{:#?}", errors);
        }
        sim.drain(50_000).unwrap();
        assert_eq!(sim.ctx().generated(), sim.ctx().retired());
        assert_eq!(sim.stats().generated(), sim.stats().retired());
        assert!(sim.ctx().violations().is_empty());
        sim.run(20);
        assert_eq!(sim.ctx().generated(), sim.ctx().retired());
        assert_eq!(sim.network().census().idle, sim.network().census().total());

        // a reset network runs again from a clean slate
        sim.reset();
        assert_eq!(sim.ctx().cycle(), 0);
        assert_eq!(sim.ctx().generated(), 0);
        sim.set_phase(Phase::Running);
        sim.run(50);
        sim.drain(50_000).unwrap();
        assert!(sim.ctx().violations().is_empty());
    }

    #[test]
    fn test_overload_then_drain() {
        let _logger = env_logger::builder().is_test(true).try_init();
        let mut config = Config::default();
        config.traffic.injection_rate = 0.9;
        overload(&config, 400);

        config.network.topology = TopologyKind::DegenerateMesh;
        config.network.faults = 0.2;
        config.network.graph_seed = 3;
        config.network.routing = RoutingKind::UpDown;
        overload(&config, 400);

        config.network.num_vcs = 1;
        config.network.available_vcs = 1;
        config.network.buffer_size = 1;
        overload(&config, 200);
    }

    #[test]
    fn test_drain_timeout() {
        let mut config = Config::default();
        config.traffic.injection_rate = 0.9;
        let traffic = SyntheticTraffic::new(&config.traffic, 4, 2).unwrap();
        let mut sim = Simulation::new(&config, traffic, Counters::new(16)).unwrap();
        sim.run(100);
        match sim.drain(1) {
            Err(Error::DrainTimeout { cycles, in_flight }) => {
                assert_eq!(cycles, 1);
                assert!(in_flight > 0);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(sim.ctx().phase(), Phase::Draining);
    }

    #[test]
    fn test_routing_and_vcs() {
        let config = Config::default();
        let traffic = TraceTraffic::parse("", 16).unwrap();
        let mut sim = Simulation::new(&config, traffic, Counters::new(16)).unwrap();
        assert_eq!(
            sim.set_available_vcs(3),
            Err(Error::InsufficientVcs {
                available: 3,
                total: 2
            })
        );
        assert!(sim.set_available_vcs(0).is_err());
        assert!(sim.set_available_vcs(1).is_ok());
        assert!(sim.set_routing(RoutingKind::UpDown).is_ok());
        assert!(sim.network().tree().is_some());
        assert!(sim.set_routing(RoutingKind::Minimal).is_ok());
        assert!(sim.network().tree().is_none());
        assert!(sim.init_routing().is_ok());
    }
}
