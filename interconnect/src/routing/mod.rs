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

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::topologies::Topology;
use crate::Error;

mod dim_order;
mod minimal;
mod table;
mod updown;

pub use dim_order::DimOrder;
pub use minimal::minimal_tables;
pub use table::RoutingTable;
pub use updown::{updown_tables, SpanningTree};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingKind {
    Minimal,
    DimOrder,
    UpDown,
}

impl FromStr for RoutingKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minimal" => Ok(RoutingKind::Minimal),
            "dim_order" | "dor" | "dimorder" => Ok(RoutingKind::DimOrder),
            "up_down" | "updown" => Ok(RoutingKind::UpDown),
            _ => Err(anyhow::anyhow!("unknown routing algorithm '{}'", s)),
        }
    }
}

/// Output port and, optionally, the output VC to use.
///
/// `vc == None` lets the router allocate any free VC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Route {
    pub port: usize,
    pub vc: Option<usize>,
}

impl Route {
    pub fn port(port: usize) -> Self {
        Self { port, vc: None }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.vc {
            Some(vc) => write!(f, "O[{}:{}]", self.port, vc),
            None => write!(f, "O[{}:*]", self.port),
        }
    }
}

/// The routing decision of one router.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoutingFunction {
    Unconfigured,
    DimOrder(DimOrder),
    Minimal(RoutingTable),
    UpDown(RoutingTable),
}

impl Default for RoutingFunction {
    fn default() -> Self {
        RoutingFunction::Unconfigured
    }
}

impl RoutingFunction {
    pub fn route<R: Rng + ?Sized>(&self, current: usize, dest: usize, rng: &mut R) -> Option<Route> {
        match self {
            RoutingFunction::Unconfigured => None,
            RoutingFunction::DimOrder(dor) => dor.route(current, dest, rng),
            RoutingFunction::Minimal(table) | RoutingFunction::UpDown(table) => {
                table.get(dest).copied()
            }
        }
    }

    pub fn table(&self) -> Option<&RoutingTable> {
        match self {
            RoutingFunction::Minimal(table) | RoutingFunction::UpDown(table) => Some(table),
            _ => None,
        }
    }
}

impl fmt::Display for RoutingFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RoutingFunction::Unconfigured => write!(f, "unconfigured"),
            RoutingFunction::DimOrder(_) => write!(f, "dimension order"),
            RoutingFunction::Minimal(table) => write!(f, "minimal\n{}", table),
            RoutingFunction::UpDown(table) => write!(f, "up/down\n{}", table),
        }
    }
}

/// Per-router routing functions for `topology`, plus the spanning tree when
/// up/down routing is selected. The up/down root is drawn from `rng`.
pub fn build_routing<R: Rng + ?Sized>(
    kind: RoutingKind,
    topology: &Topology,
    rng: &mut R,
) -> Result<(Vec<RoutingFunction>, Option<SpanningTree>), Error> {
    let nodes = topology.num_nodes();
    match kind {
        RoutingKind::DimOrder => {
            let dor = DimOrder::new(topology)?;
            Ok((vec![RoutingFunction::DimOrder(dor); nodes], None))
        }
        RoutingKind::Minimal => {
            let tables = minimal_tables(topology)?;
            Ok((tables.into_iter().map(RoutingFunction::Minimal).collect(), None))
        }
        RoutingKind::UpDown => {
            let root = rng.gen_range(0..nodes);
            let tree = SpanningTree::build(topology, root)?;
            let tables = updown_tables(topology, &tree)?;
            Ok((
                tables.into_iter().map(RoutingFunction::UpDown).collect(),
                Some(tree),
            ))
        }
    }
}
