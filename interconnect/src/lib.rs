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

//! Cycle-accurate simulation of wormhole-routed k-ary n-cube networks.

mod components;
mod config;
mod error;
mod network;
mod routing;
mod sim;
mod stats;
mod topologies;
mod traffic;

// Public types
// type to use for cycles
pub type Cycle = usize;
pub type PacketId = usize;

pub use crate::components::{Census, ChannelState, Credit, Flit, FlitKind, Link, VcControl, VcState};
pub use crate::components::{Buffer, InputPort, InputVc, Node, OutputPort, OutputVc, VirtualChannel};
pub use crate::components::{Processor, Router};
pub use crate::config::{Config, NetworkConfiguration};
pub use crate::config::{SimulationConfiguration, TrafficConfiguration};
pub use crate::error::{Error, Fault};
pub use crate::network::Network;
pub use crate::routing::{Route, RoutingFunction, RoutingKind, RoutingTable, SpanningTree};
pub use crate::sim::{Phase, SimContext, Simulation};
pub use crate::stats::{Average, Counters, SampleSummary, StatsCollector};
pub use crate::topologies::{PortSpec, Topology, TopologyKind};
pub use crate::traffic::{InjectionProcess, PacketRequest, TrafficPattern};
pub use crate::traffic::{SyntheticTraffic, TraceTraffic, TrafficSource};
pub use petgraph::graph::{EdgeIndex, NodeIndex};
