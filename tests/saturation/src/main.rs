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

//! Overload a network far beyond saturation, stop injecting and check that
//! every packet still arrives without a single protocol violation.

use interconnect::*;
use log::info;

struct Scenario {
    name: &'static str,
    topology: TopologyKind,
    routing: RoutingKind,
    pattern: TrafficPattern,
    faults: f64,
    num_vcs: usize,
    buffer_size: usize,
}

const OVERLOAD_CYCLES: usize = 3000;
const DRAIN_LIMIT: usize = 200_000;

fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "mesh dor",
            topology: TopologyKind::Mesh,
            routing: RoutingKind::DimOrder,
            pattern: TrafficPattern::Uniform,
            faults: 0.0,
            num_vcs: 2,
            buffer_size: 4,
        },
        Scenario {
            name: "mesh dor transpose",
            topology: TopologyKind::Mesh,
            routing: RoutingKind::DimOrder,
            pattern: TrafficPattern::Transpose,
            faults: 0.0,
            num_vcs: 1,
            buffer_size: 2,
        },
        Scenario {
            name: "torus up/down",
            topology: TopologyKind::Torus,
            routing: RoutingKind::UpDown,
            pattern: TrafficPattern::BitComp,
            faults: 0.0,
            num_vcs: 2,
            buffer_size: 4,
        },
        Scenario {
            name: "degenerate mesh up/down",
            topology: TopologyKind::DegenerateMesh,
            routing: RoutingKind::UpDown,
            pattern: TrafficPattern::Uniform,
            faults: 0.2,
            num_vcs: 2,
            buffer_size: 4,
        },
        Scenario {
            name: "degenerate torus up/down",
            topology: TopologyKind::DegenerateTorus,
            routing: RoutingKind::UpDown,
            pattern: TrafficPattern::Tornado,
            faults: 0.3,
            num_vcs: 1,
            buffer_size: 1,
        },
    ]
}

fn run(scenario: &Scenario) -> anyhow::Result<()> {
    let config = Config {
        network: NetworkConfiguration {
            topology: scenario.topology,
            k: 4,
            n: 2,
            faults: scenario.faults,
            graph_seed: 17,
            num_vcs: scenario.num_vcs,
            available_vcs: scenario.num_vcs,
            buffer_size: scenario.buffer_size,
            routing: scenario.routing,
            ..Default::default()
        },
        traffic: TrafficConfiguration {
            pattern: scenario.pattern,
            injection_rate: 1.0,
            ..Default::default()
        },
        ..Default::default()
    };
    let traffic = SyntheticTraffic::new(&config.traffic, 4, 2)?;
    let mut sim = Simulation::new(&config, traffic, Counters::new(16))?;

    sim.set_phase(Phase::Running);
    sim.run(OVERLOAD_CYCLES);
    let census = sim.network().census();
    info!("{}: after overload {}", scenario.name, census);
    let summary = sim.stats_mut().new_sample();
    let in_flight = sim.ctx().in_flight();
    let drained = sim.drain(DRAIN_LIMIT)?;

    let ctx = sim.ctx();
    println!(
        "{:<28} accepted {:.3} latency {:>8.1} drained {} packets in {} cycles",
        scenario.name, summary.accepted, summary.latency, in_flight, drained
    );
    if ctx.generated() != ctx.retired() {
        anyhow::bail!(
            "{}: generated {} packets but retired {}",
            scenario.name,
            ctx.generated(),
            ctx.retired()
        );
    }
    if let Some((cycle, err)) = ctx.violations().first() {
        anyhow::bail!(
            "{}: {} protocol violations, first at cycle {}: {}",
            scenario.name,
            ctx.violations().len(),
            cycle,
            err
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    for scenario in scenarios() {
        run(&scenario)?;
    }
    println!("all scenarios drained");
    Ok(())
}
