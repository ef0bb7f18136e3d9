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

//! Runs one experiment: warm up, measure a number of samples, drain.

use std::path::PathBuf;

use anyhow::Context;
use log::info;
use structopt::StructOpt;

use interconnect::*;

#[derive(StructOpt)]
#[structopt(name = "wormsim", about = "Cycle-accurate wormhole network simulator")]
struct Arguments {
    /// YAML configuration; built-in defaults when omitted
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,
    /// mesh, torus, degenerate_mesh or degenerate_torus
    #[structopt(long)]
    topology: Option<TopologyKind>,
    /// routers per dimension
    #[structopt(short)]
    k: Option<usize>,
    /// number of dimensions
    #[structopt(short)]
    n: Option<usize>,
    /// minimal, dim_order or up_down
    #[structopt(short, long)]
    routing: Option<RoutingKind>,
    #[structopt(short, long)]
    pattern: Option<TrafficPattern>,
    /// offered load in flits per cycle per node
    #[structopt(long)]
    rate: Option<f64>,
    #[structopt(short, long)]
    seed: Option<u64>,
    /// fraction of links to remove
    #[structopt(long)]
    faults: Option<f64>,
    /// replay a clock,source,dest,burst trace
    #[structopt(long, parse(from_os_str))]
    trace: Option<PathBuf>,
    /// write the router graph in DOT format
    #[structopt(long, parse(from_os_str))]
    dot: Option<PathBuf>,
    /// write the up/down spanning tree in DOT format
    #[structopt(long, parse(from_os_str))]
    tree_dot: Option<PathBuf>,
    /// print the effective configuration and exit
    #[structopt(long)]
    dump_config: bool,
}

impl Arguments {
    fn apply(&self, config: &mut Config) {
        let network = &mut config.network;
        network.topology = self.topology.unwrap_or(network.topology);
        network.k = self.k.unwrap_or(network.k);
        network.n = self.n.unwrap_or(network.n);
        network.routing = self.routing.unwrap_or(network.routing);
        network.faults = self.faults.unwrap_or(network.faults);
        let traffic = &mut config.traffic;
        traffic.pattern = self.pattern.unwrap_or(traffic.pattern);
        traffic.injection_rate = self.rate.unwrap_or(traffic.injection_rate);
        if self.trace.is_some() {
            traffic.trace_file = self.trace.clone();
        }
        config.simulation.seed = self.seed.unwrap_or(config.simulation.seed);
    }
}

fn simulate<T: TrafficSource>(config: &Config, traffic: T, args: &Arguments) -> anyhow::Result<()> {
    let nodes = config.network.num_nodes().unwrap_or(0);
    let mut sim = Simulation::new(config, traffic, Counters::new(nodes))?;

    if let Some(path) = &args.dot {
        std::fs::write(path, sim.network().to_graphviz())
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    if let Some(path) = &args.tree_dot {
        let tree = sim
            .network()
            .tree()
            .context("Only up/down routing builds a spanning tree")?;
        std::fs::write(path, tree.to_graphviz())
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let run = &config.simulation;
    sim.set_phase(Phase::WarmingUp);
    sim.run(run.warmup_cycles);
    sim.stats_mut().discard_sample();
    info!("warmed up after {} cycles: {}", run.warmup_cycles, sim.network().census());

    sim.set_phase(Phase::Running);
    for sample in 0..run.num_samples {
        sim.set_sample(sample);
        sim.run(run.sample_period);
        let summary = sim.stats_mut().new_sample();
        println!("sample {}: {}", sample, summary);
    }
    let drained = sim.drain(run.max_drain_cycles)?;

    println!("overall: {}", sim.stats().overall());
    println!(
        "packets generated {} retired {}, drained in {} cycles",
        sim.ctx().generated(),
        sim.ctx().retired(),
        drained
    );
    let violations = sim.ctx().violations();
    if !violations.is_empty() {
        anyhow::bail!(
            "{} protocol violations, first at cycle {}: {}",
            violations.len(),
            violations[0].0,
            violations[0].1
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Arguments::from_args();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    if args.dump_config {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    let (k, n) = (config.network.k, config.network.n);
    match config.traffic.trace_file.clone() {
        Some(path) => {
            let nodes = config.network.num_nodes().unwrap_or(0);
            let traffic = TraceTraffic::from_file(&path, nodes)?;
            simulate(&config, traffic, &args)
        }
        None => {
            let traffic = SyntheticTraffic::new(&config.traffic, k, n)?;
            simulate(&config, traffic, &args)
        }
    }
}
