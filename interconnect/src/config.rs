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

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::routing::RoutingKind;
use crate::topologies::{node_count, TopologyKind};
use crate::traffic::{InjectionProcess, SyntheticTraffic, TrafficPattern};
use crate::{Cycle, Error};

/// Shape of the network and of its routers.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfiguration {
    pub topology: TopologyKind,
    /// radix: routers per dimension
    pub k: usize,
    /// number of dimensions
    pub n: usize,
    /// fraction of links to remove (degenerate kinds only)
    pub faults: f64,
    pub graph_seed: u64,
    /// accept fewer removed links than requested instead of failing
    pub allow_partial_faults: bool,
    pub num_vcs: usize,
    pub available_vcs: usize,
    /// flits per input VC
    pub buffer_size: usize,
    pub link_delay: Cycle,
    pub processor_link_delay: Cycle,
    pub routing: RoutingKind,
}

impl Default for NetworkConfiguration {
    fn default() -> Self {
        Self {
            topology: TopologyKind::Mesh,
            k: 4,
            n: 2,
            faults: 0.0,
            graph_seed: 0,
            allow_partial_faults: false,
            num_vcs: 2,
            available_vcs: 2,
            buffer_size: 4,
            link_delay: 1,
            processor_link_delay: 0,
            routing: RoutingKind::DimOrder,
        }
    }
}

impl NetworkConfiguration {
    pub fn num_nodes(&self) -> Option<usize> {
        node_count(self.k, self.n)
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.num_nodes().ok_or(Error::InvalidDimensions {
            k: self.k,
            n: self.n,
        })?;
        if self.buffer_size == 0 {
            return Err(Error::InvalidBufferSize);
        }
        if self.available_vcs == 0 || self.available_vcs > self.num_vcs {
            return Err(Error::InsufficientVcs {
                available: self.available_vcs,
                total: self.num_vcs,
            });
        }
        if !(0.0..1.0).contains(&self.faults) {
            return Err(Error::InvalidFaults(self.faults));
        }
        if self.routing == RoutingKind::DimOrder && self.topology.is_degenerate() {
            return Err(Error::UnsupportedRouting(self.routing, self.topology));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrafficConfiguration {
    pub pattern: TrafficPattern,
    pub injection: InjectionProcess,
    /// offered load in flits per cycle per node
    pub injection_rate: f64,
    /// body flits per packet
    pub flits_per_packet: usize,
    pub perm_seed: u64,
    pub burst_alpha: f64,
    pub burst_beta: f64,
    /// replay this trace instead of the synthetic pattern
    pub trace_file: Option<PathBuf>,
}

impl Default for TrafficConfiguration {
    fn default() -> Self {
        Self {
            pattern: TrafficPattern::Uniform,
            injection: InjectionProcess::Bernoulli,
            injection_rate: 0.1,
            flits_per_packet: 4,
            perm_seed: 0,
            burst_alpha: 0.2,
            burst_beta: 0.8,
            trace_file: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfiguration {
    pub seed: u64,
    pub warmup_cycles: Cycle,
    pub sample_period: Cycle,
    pub num_samples: usize,
    pub max_drain_cycles: Cycle,
}

impl Default for SimulationConfiguration {
    fn default() -> Self {
        Self {
            seed: 0,
            warmup_cycles: 1000,
            sample_period: 1000,
            num_samples: 5,
            max_drain_cycles: 100_000,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfiguration,
    pub traffic: TrafficConfiguration,
    pub simulation: SimulationConfiguration,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open configuration {}", path.display()))?;
        let config = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse configuration {}", path.display()))?;
        Ok(config)
    }

    /// Checks every parameter that can be checked before building anything.
    pub fn validate(&self) -> Result<(), Error> {
        self.network.validate()?;
        if self.traffic.trace_file.is_none() {
            SyntheticTraffic::new(&self.traffic, self.network.k, self.network.n)?;
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(config: &str) -> Result<Self, Self::Err> {
        serde_yaml::from_str(config).context("Failed to parse configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_yaml_config() {
        let conf_str = "---
network:
  topology: degenerate_torus
  k: 8
  n: 2
  faults: 0.1
  graph_seed: 42
  num_vcs: 4
  available_vcs: 2
  buffer_size: 8
  routing: up_down
traffic:
  pattern: transpose
  injection: on_off
  injection_rate: 0.3
simulation:
  seed: 7
  num_samples: 3
";
        let config: Config = conf_str.parse().unwrap();
        assert_eq!(config.network.topology, TopologyKind::DegenerateTorus);
        assert_eq!(config.network.k, 8);
        assert_eq!(config.network.faults, 0.1);
        assert_eq!(config.network.routing, RoutingKind::UpDown);
        assert_eq!(config.network.num_vcs, 4);
        // unspecified fields keep their defaults
        assert_eq!(config.network.link_delay, 1);
        assert_eq!(config.network.processor_link_delay, 0);
        assert_eq!(config.traffic.pattern, TrafficPattern::Transpose);
        assert_eq!(config.traffic.injection, InjectionProcess::OnOff);
        assert_eq!(config.traffic.flits_per_packet, 4);
        assert_eq!(config.simulation.seed, 7);
        assert_eq!(config.simulation.num_samples, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn write_yaml_config() {
        let mut config = Config::default();
        config.network.topology = TopologyKind::Torus;
        config.traffic.trace_file = Some(PathBuf::from("trace.csv"));
        let text = serde_yaml::to_string(&config).unwrap();
        assert!(text.contains("topology: torus"));
        assert!(text.contains("routing: dim_order"));
        let back: Config = text.parse().unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn validate_config() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.network.available_vcs = 3;
        assert_eq!(
            config.validate(),
            Err(Error::InsufficientVcs {
                available: 3,
                total: 2
            })
        );
        config.network.available_vcs = 0;
        assert!(config.validate().is_err());
        config.network.available_vcs = 1;

        config.network.buffer_size = 0;
        assert_eq!(config.validate(), Err(Error::InvalidBufferSize));
        config.network.buffer_size = 1;

        config.network.topology = TopologyKind::DegenerateMesh;
        assert_eq!(
            config.validate(),
            Err(Error::UnsupportedRouting(
                RoutingKind::DimOrder,
                TopologyKind::DegenerateMesh
            ))
        );
        config.network.routing = RoutingKind::Minimal;
        assert!(config.validate().is_ok());
        config.network.faults = 1.0;
        assert_eq!(config.validate(), Err(Error::InvalidFaults(1.0)));
        config.network.faults = 0.0;

        config.network.k = 3;
        config.traffic.pattern = TrafficPattern::BitComp;
        assert_eq!(
            config.validate(),
            Err(Error::UnsupportedTraffic(TrafficPattern::BitComp, 9))
        );
        config.network.k = 1;
        assert_eq!(
            config.validate(),
            Err(Error::InvalidDimensions { k: 1, n: 2 })
        );
    }

    #[test]
    fn missing_file() {
        assert!(Config::from_file("/nonexistent/wormsim.yaml").is_err());
    }
}
