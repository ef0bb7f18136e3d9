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

//! Up/down routing over a breadth-first spanning tree.
//!
//! Packets climb towards the root until they reach an ancestor of their
//! destination and then descend. Only tree links are used, so channel
//! dependencies cannot form a cycle.

use std::collections::VecDeque;

use petgraph::graph::{DiGraph, NodeIndex};

use super::{Route, RoutingTable};
use crate::topologies::Topology;
use crate::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpanningTree {
    root: usize,
    parent: Vec<Option<usize>>,
    depth: Vec<usize>,
}

impl SpanningTree {
    /// Breadth-first tree from `root`, visiting neighbours in port order.
    pub fn build(topology: &Topology, root: usize) -> Result<Self, Error> {
        let nodes = topology.num_nodes();
        let mut parent = vec![None; nodes];
        let mut depth = vec![0; nodes];
        let mut visited = vec![false; nodes];
        let mut queue = VecDeque::new();
        visited[root] = true;
        queue.push_back(root);
        while let Some(node) = queue.pop_front() {
            for nb in topology.neighbours(node) {
                if !visited[nb] {
                    visited[nb] = true;
                    parent[nb] = Some(node);
                    depth[nb] = depth[node] + 1;
                    queue.push_back(nb);
                }
            }
        }
        if let Some(lost) = visited.iter().position(|&v| !v) {
            return Err(Error::NoPath(root, lost));
        }
        log::debug!(
            "spanning tree rooted at {}, depth {}",
            root,
            depth.iter().max().unwrap_or(&0)
        );
        Ok(Self {
            root,
            parent,
            depth,
        })
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn parent(&self, node: usize) -> Option<usize> {
        self.parent[node]
    }

    pub fn depth(&self, node: usize) -> usize {
        self.depth[node]
    }

    /// Whether `a` lies on the path from `b` to the root (a node is its own
    /// ancestor).
    pub fn is_ancestor(&self, a: usize, b: usize) -> bool {
        let mut node = b;
        while self.depth[node] > self.depth[a] {
            match self.parent[node] {
                Some(p) => node = p,
                None => return false,
            }
        }
        node == a
    }

    /// Tree neighbour of `from` on the way to `to`.
    pub fn next_hop(&self, from: usize, to: usize) -> Option<usize> {
        if from == to {
            return None;
        }
        if self.is_ancestor(from, to) {
            // descend: the child of `from` above `to`
            let mut node = to;
            while self.parent[node] != Some(from) {
                node = self.parent[node]?;
            }
            Some(node)
        } else {
            self.parent[from]
        }
    }

    /// Number of tree links between `a` and `b`.
    pub fn distance(&self, a: usize, b: usize) -> usize {
        let (mut a, mut b) = (a, b);
        let mut hops = 0;
        while a != b {
            if self.depth[a] >= self.depth[b] {
                a = self.parent[a].unwrap_or(a);
            } else {
                b = self.parent[b].unwrap_or(b);
            }
            hops += 1;
        }
        hops
    }

    pub fn to_graphviz(&self) -> String {
        use petgraph::dot::{Config, Dot};

        let mut tree = DiGraph::<usize, ()>::new();
        let indices: Vec<_> = (0..self.parent.len()).map(|n| tree.add_node(n)).collect();
        for (child, parent) in self.parent.iter().enumerate() {
            if let Some(p) = parent {
                tree.add_edge(indices[*p], indices[child], ());
            }
        }
        let node_attrs = |_: &DiGraph<usize, ()>, node: (NodeIndex, &usize)| {
            let shape = if *node.1 == self.root {
                "; shape=doublecircle"
            } else {
                ""
            };
            format!(
                "label=\"{}\n(depth {})\"{}",
                node.1, self.depth[*node.1], shape
            )
        };
        let generator = Dot::with_attr_getters(
            &tree,
            &[Config::NodeNoLabel, Config::EdgeNoLabel],
            &|_, _| String::new(),
            &node_attrs,
        );
        format!("{:?}", generator)
    }
}

/// Up/down tables over `tree`: the next tree hop towards every destination.
pub fn updown_tables(topology: &Topology, tree: &SpanningTree) -> Result<Vec<RoutingTable>, Error> {
    let nodes = topology.num_nodes();
    let mut tables = Vec::with_capacity(nodes);
    for src in 0..nodes {
        let mut table = RoutingTable::new();
        for dest in (0..nodes).filter(|&d| d != src) {
            let next = tree.next_hop(src, dest).ok_or(Error::NoPath(src, dest))?;
            let port = topology
                .port_to(src, next)
                .ok_or(Error::NoPath(src, dest))?;
            table.insert(dest, Route::port(port));
        }
        tables.push(table);
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topologies::{degenerate, mesh, torus};

    #[test]
    fn test_bfs_tree() {
        let topo = mesh(3, 2).unwrap();
        let tree = SpanningTree::build(&topo, 4).unwrap();
        assert_eq!(tree.root(), 4);
        assert_eq!(tree.parent(4), None);
        // the middle of a 3x3 mesh reaches everything within two hops
        for node in [1, 3, 5, 7].iter() {
            assert_eq!(tree.parent(*node), Some(4));
        }
        // corners hang off the first neighbour discovered in port order
        assert_eq!(tree.parent(0), Some(3));
        assert_eq!(tree.parent(8), Some(5));
        assert!(tree.is_ancestor(4, 8));
        assert!(!tree.is_ancestor(3, 8));
        assert_eq!(tree.next_hop(4, 8), Some(5));
        assert_eq!(tree.next_hop(0, 8), Some(3));
        assert_eq!(tree.distance(0, 8), 4);
    }

    /// Every entry follows the tree one step closer to the destination.
    fn check_tables(topology: &Topology, root: usize) {
        let tree = SpanningTree::build(topology, root).unwrap();
        let tables = updown_tables(topology, &tree).unwrap();
        let nodes = topology.num_nodes();
        for src in 0..nodes {
            assert_eq!(tables[src].len(), nodes - 1);
            for (dest, route) in tables[src].iter() {
                let next = topology.ports(src)[route.port].neighbour;
                assert_ne!(next, src);
                assert!(tree.parent(src) == Some(next) || tree.parent(next) == Some(src));
                assert_eq!(tree.distance(next, dest) + 1, tree.distance(src, dest));
            }
        }
    }

    #[test]
    fn test_complete_along_tree() {
        let _logger = env_logger::builder().is_test(true).try_init();
        check_tables(&mesh(4, 2).unwrap(), 0);
        check_tables(&torus(4, 2).unwrap(), 9);
        for seed in 0..5 {
            let topo = degenerate(4, 2, false, 0.3, seed, false).unwrap();
            check_tables(&topo, seed as usize);
        }
    }

    #[test]
    fn test_graphviz() {
        let topo = mesh(2, 1).unwrap();
        let tree = SpanningTree::build(&topo, 1).unwrap();
        let dot = tree.to_graphviz();
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("1 -> 0"));
        assert!(dot.contains("label=\"1\n(depth 0)\"; shape=doublecircle"));
        assert!(dot.contains("label=\"0\n(depth 1)\""));
    }
}
