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

//! k-ary n-cube topologies.
//!
//! A topology is a pure description of which router port connects to which
//! neighbour. Nodes are numbered in base `k`: coordinate `d` of node `i` is
//! `(i / k^d) % k`.

use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use petgraph::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::NetworkConfiguration;
use crate::Error;

mod degenerate;
mod mesh;
mod torus;

pub use degenerate::degenerate;
pub use mesh::mesh;
pub use torus::torus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    Mesh,
    Torus,
    DegenerateMesh,
    DegenerateTorus,
}

impl TopologyKind {
    /// Whether the outermost nodes of each dimension are linked.
    pub fn wraps(self) -> bool {
        matches!(self, TopologyKind::Torus | TopologyKind::DegenerateTorus)
    }

    pub fn is_degenerate(self) -> bool {
        matches!(
            self,
            TopologyKind::DegenerateMesh | TopologyKind::DegenerateTorus
        )
    }
}

impl FromStr for TopologyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mesh" => Ok(TopologyKind::Mesh),
            "torus" => Ok(TopologyKind::Torus),
            "degenerate_mesh" | "degenmesh" => Ok(TopologyKind::DegenerateMesh),
            "degenerate_torus" | "degentorus" => Ok(TopologyKind::DegenerateTorus),
            _ => Err(anyhow::anyhow!("unknown topology '{}'", s)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Dir {
    Left,
    Right,
}

/// The far end of an output port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortSpec {
    pub neighbour: usize,
    /// The neighbour's port leading back to this node; it is also the input
    /// port index the link arrives on.
    pub peer_port: usize,
}

#[derive(Clone, Debug)]
pub struct Topology {
    kind: TopologyKind,
    k: usize,
    n: usize,
    ports: Vec<Vec<PortSpec>>,
    faults_requested: usize,
    faults_removed: usize,
}

/// Number of nodes, or `None` when the dimensions are unusable.
pub(crate) fn node_count(k: usize, n: usize) -> Option<usize> {
    if k < 2 || n < 1 {
        return None;
    }
    k.checked_pow(n as u32)
}

pub(crate) fn coord(node: usize, k: usize, dim: usize) -> usize {
    (node / k.pow(dim as u32)) % k
}

pub(crate) fn coords(node: usize, k: usize, n: usize) -> Vec<usize> {
    (0..n).map(|d| coord(node, k, d)).collect()
}

/// Inverse of `coords`.
pub(crate) fn node_at(elem: &[usize], k: usize) -> usize {
    elem.iter()
        .enumerate()
        .map(|(d, c)| c * k.pow(d as u32))
        .sum()
}

/// The neighbour of `node` one step along `dim`, if there is one.
pub(crate) fn neighbour(node: usize, k: usize, dim: usize, dir: Dir, wrap: bool) -> Option<usize> {
    let c = coord(node, k, dim);
    let stride = k.pow(dim as u32);
    match dir {
        Dir::Left if c > 0 => Some(node - stride),
        Dir::Left if wrap => Some(node + (k - 1) * stride),
        Dir::Right if c + 1 < k => Some(node + stride),
        Dir::Right if wrap => Some(node - (k - 1) * stride),
        _ => None,
    }
}

/// Port number of the link leaving `node` along `dim` towards `dir` in a
/// full mesh or torus.
///
/// Ports are numbered per dimension in increasing order, left before right,
/// skipping directions without a neighbour. A torus therefore always has
/// `2 * dim` (left) and `2 * dim + 1` (right).
pub(crate) fn grid_port(
    k: usize,
    n: usize,
    wrap: bool,
    node: usize,
    dim: usize,
    dir: Dir,
) -> Option<usize> {
    debug_assert!(dim < n);
    if wrap {
        return Some(2 * dim + if dir == Dir::Right { 1 } else { 0 });
    }
    let ports_in = |d: usize| {
        let c = coord(node, k, d);
        (c > 0) as usize + (c + 1 < k) as usize
    };
    let before: usize = (0..dim).map(ports_in).sum();
    let c = coord(node, k, dim);
    match dir {
        Dir::Left if c > 0 => Some(before),
        Dir::Right if c + 1 < k => Some(before + (c > 0) as usize),
        _ => None,
    }
}

/// Port lists of a full mesh (`wrap == false`) or torus.
pub(crate) fn grid(k: usize, n: usize, wrap: bool) -> Result<Vec<Vec<PortSpec>>, Error> {
    let nodes = node_count(k, n).ok_or(Error::InvalidDimensions { k, n })?;
    let mut ports = Vec::with_capacity(nodes);
    for node in 0..nodes {
        let mut specs = Vec::with_capacity(2 * n);
        for dim in 0..n {
            for &(dir, back) in &[(Dir::Left, Dir::Right), (Dir::Right, Dir::Left)] {
                if let Some(nb) = neighbour(node, k, dim, dir, wrap) {
                    let peer_port = grid_port(k, n, wrap, nb, dim, back)
                        .ok_or(Error::InvalidDimensions { k, n })?;
                    specs.push(PortSpec {
                        neighbour: nb,
                        peer_port,
                    });
                }
            }
        }
        log::trace!(
            "node {} coords {:?} ports {}",
            node,
            coords(node, k, n),
            specs.len()
        );
        ports.push(specs);
    }
    Ok(ports)
}

impl Topology {
    pub(crate) fn from_ports(kind: TopologyKind, k: usize, n: usize, ports: Vec<Vec<PortSpec>>) -> Self {
        Self {
            kind,
            k,
            n,
            ports,
            faults_requested: 0,
            faults_removed: 0,
        }
    }

    /// Build the topology a network configuration asks for.
    pub fn build(config: &NetworkConfiguration) -> Result<Self, Error> {
        let (k, n) = (config.k, config.n);
        let topology = match config.topology {
            TopologyKind::Mesh => mesh(k, n)?,
            TopologyKind::Torus => torus(k, n)?,
            kind => degenerate(
                k,
                n,
                kind.wraps(),
                config.faults,
                config.graph_seed,
                config.allow_partial_faults,
            )?,
        };
        log::info!(
            "built {:?} k={} n={}: {} nodes, {} links",
            topology.kind,
            k,
            n,
            topology.num_nodes(),
            topology.num_links()
        );
        Ok(topology)
    }

    pub fn kind(&self) -> TopologyKind {
        self.kind
    }

    pub fn radix(&self) -> usize {
        self.k
    }

    pub fn dimensions(&self) -> usize {
        self.n
    }

    pub fn num_nodes(&self) -> usize {
        self.ports.len()
    }

    /// Number of unidirectional links.
    pub fn num_links(&self) -> usize {
        self.ports.iter().map(|p| p.len()).sum()
    }

    pub fn ports(&self, node: usize) -> &[PortSpec] {
        &self.ports[node]
    }

    pub fn degree(&self, node: usize) -> usize {
        self.ports[node].len()
    }

    pub fn neighbours(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.ports[node].iter().map(|p| p.neighbour)
    }

    /// Lowest numbered port of `node` leading to `next`.
    pub fn port_to(&self, node: usize, next: usize) -> Option<usize> {
        self.ports[node].iter().position(|p| p.neighbour == next)
    }

    pub fn coords(&self, node: usize) -> Vec<usize> {
        coords(node, self.k, self.n)
    }

    pub fn faults_requested(&self) -> usize {
        self.faults_requested
    }

    pub fn faults_removed(&self) -> usize {
        self.faults_removed
    }

    /// Directed hop graph; edge weights are output port numbers.
    pub fn graph(&self) -> DiGraph<usize, usize> {
        let mut graph = DiGraph::with_capacity(self.num_nodes(), self.num_links());
        for node in 0..self.num_nodes() {
            graph.add_node(node);
        }
        for (node, specs) in self.ports.iter().enumerate() {
            for (port, spec) in specs.iter().enumerate() {
                graph.add_edge(NodeIndex::new(node), NodeIndex::new(spec.neighbour), port);
            }
        }
        graph
    }

    /// Hop distances from `src` to every node (BFS). Unreachable nodes get
    /// `None`.
    pub fn distances(&self, src: usize) -> Vec<Option<usize>> {
        let mut dist = vec![None; self.num_nodes()];
        let mut queue = std::collections::VecDeque::new();
        dist[src] = Some(0);
        queue.push_back(src);
        while let Some(node) = queue.pop_front() {
            let d = dist[node].unwrap_or(0);
            for nb in self.neighbours(node) {
                if dist[nb].is_none() {
                    dist[nb] = Some(d + 1);
                    queue.push_back(nb);
                }
            }
        }
        dist
    }

    pub fn is_connected(&self) -> bool {
        self.num_nodes() == 0 || self.distances(0).iter().all(|d| d.is_some())
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{:?} k={} n={}", self.kind, self.k, self.n)?;
        for (node, specs) in self.ports.iter().enumerate() {
            let ports = specs
                .iter()
                .enumerate()
                .map(|(port, spec)| format!("{}->{}.{}", port, spec.neighbour, spec.peer_port));
            writeln!(f, "{:>4}: {}", node, ports.format(" "))?;
        }
        Ok(())
    }
}
