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

//! Meshes and tori with randomly failed links.

use petgraph::algo::connected_components;
use petgraph::graph::{EdgeIndex, UnGraph};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

use super::{grid, PortSpec, Topology, TopologyKind};
use crate::Error;

/// Consecutive failed attempts tolerated before giving up on one removal.
const MAX_ATTEMPTS: usize = 100;

/// Remove up to `requested` random edges while keeping the graph connected.
///
/// Returns the number of edges actually removed; stops early when
/// `MAX_ATTEMPTS` candidates in a row would have split the graph.
fn inject_faults(graph: &mut UnGraph<usize, ()>, requested: usize, rng: &mut impl Rng) -> usize {
    let mut removed = 0;
    while removed < requested {
        let mut accepted = false;
        for _ in 0..MAX_ATTEMPTS {
            if graph.edge_count() == 0 {
                break;
            }
            let edge = EdgeIndex::new(rng.gen_range(0..graph.edge_count()));
            let (a, b) = match graph.edge_endpoints(edge) {
                Some(ends) => ends,
                None => break,
            };
            graph.remove_edge(edge);
            if connected_components(&*graph) == 1 {
                log::debug!("removed link {} -- {}", graph[a], graph[b]);
                accepted = true;
                break;
            }
            graph.add_edge(a, b, ());
        }
        if !accepted {
            break;
        }
        removed += 1;
    }
    removed
}

/// A mesh (`wrap == false`) or torus with `floor(faults * N)` links removed.
///
/// Link removal is driven by its own generator seeded with `seed`, so the
/// same seed always yields the same graph. If the requested number of links
/// cannot be removed without disconnecting the network the construction
/// fails, unless `allow_partial` accepts the links removed so far.
pub fn degenerate(
    k: usize,
    n: usize,
    wrap: bool,
    faults: f64,
    seed: u64,
    allow_partial: bool,
) -> Result<Topology, Error> {
    if !(0.0..1.0).contains(&faults) {
        return Err(Error::InvalidFaults(faults));
    }
    let full = grid(k, n, wrap)?;
    let nodes = full.len();

    let mut graph = UnGraph::<usize, ()>::with_capacity(nodes, nodes * n);
    let indices: Vec<_> = (0..nodes).map(|i| graph.add_node(i)).collect();
    for (node, specs) in full.iter().enumerate() {
        for spec in specs {
            // parallel links of a radix-2 torus collapse into one
            graph.update_edge(indices[node], indices[spec.neighbour], ());
        }
    }

    let requested = (faults * nodes as f64).floor() as usize;
    let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
    let removed = inject_faults(&mut graph, requested, &mut rng);
    if removed < requested {
        log::warn!(
            "cannot remove any more links without disconnecting the graph: {} of {} faults",
            removed,
            requested
        );
        if !allow_partial {
            return Err(Error::FaultInjection { requested, removed });
        }
    }

    // keep the canonical port order of the full grid over surviving links
    let neighbours: Vec<Vec<usize>> = full
        .iter()
        .enumerate()
        .map(|(node, specs)| {
            let mut kept: Vec<usize> = Vec::with_capacity(specs.len());
            for spec in specs {
                if !kept.contains(&spec.neighbour)
                    && graph.contains_edge(indices[node], indices[spec.neighbour])
                {
                    kept.push(spec.neighbour);
                }
            }
            kept
        })
        .collect();
    let mut ports = Vec::with_capacity(nodes);
    for (node, kept) in neighbours.iter().enumerate() {
        let mut specs = Vec::with_capacity(kept.len());
        for &nb in kept {
            let peer_port = neighbours[nb]
                .iter()
                .position(|&back| back == node)
                .ok_or(Error::NoPath(nb, node))?;
            specs.push(PortSpec {
                neighbour: nb,
                peer_port,
            });
        }
        ports.push(specs);
    }

    let kind = if wrap {
        TopologyKind::DegenerateTorus
    } else {
        TopologyKind::DegenerateMesh
    };
    let mut topology = Topology::from_ports(kind, k, n, ports);
    topology.faults_requested = requested;
    topology.faults_removed = removed;
    log::debug!(
        "{:?}: removed {} of {} requested links",
        kind,
        removed,
        requested
    );
    Ok(topology)
}
