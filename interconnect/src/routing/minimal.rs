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

//! Shortest-path tables.
//!
//! No deadlock analysis is done: minimal routing over a mesh or torus with
//! dynamically allocated VCs can deadlock under load and is only meant for
//! comparing throughput and latency.

use petgraph::algo::bellman_ford;
use petgraph::prelude::*;

use super::{Route, RoutingTable};
use crate::topologies::Topology;
use crate::Error;

/// One table per router holding the first hop of a shortest path to every
/// other router.
pub fn minimal_tables(topology: &Topology) -> Result<Vec<RoutingTable>, Error> {
    // unit weights: distances are hop counts
    let hops = topology.graph().map(|_, &node| node, |_, _| 1.0f64);
    let nodes = topology.num_nodes();
    let mut tables = Vec::with_capacity(nodes);
    for src in 0..nodes {
        let source = NodeIndex::new(src);
        let paths = bellman_ford(&hops, source).map_err(|_| Error::NoPath(src, src))?;
        let mut table = RoutingTable::new();
        for dest in (0..nodes).filter(|&d| d != src) {
            // walk back from dest until the node right after src
            let mut next = NodeIndex::new(dest);
            loop {
                match paths.predecessors[next.index()] {
                    Some(prev) if prev == source => break,
                    Some(prev) => next = prev,
                    None => return Err(Error::NoPath(src, dest)),
                }
            }
            let port = topology
                .port_to(src, next.index())
                .ok_or(Error::NoPath(src, dest))?;
            table.insert(dest, Route::port(port));
        }
        log::trace!("minimal table for {}:\n{}", src, table);
        tables.push(table);
    }
    Ok(tables)
}
