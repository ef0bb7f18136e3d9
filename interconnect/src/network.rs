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

//! The router graph and the synchronous two-phase cycle.
//!
//! Routers are the node weights of a directed graph, inter-router links the
//! edge weights. A cycle first lets every node read what the previous cycle
//! delivered (update), then ages the links, and finally lets every node
//! publish its outputs, which the network moves onto the links (copy).

use std::fmt;

use log::{info, trace};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::components::{Census, Link, Node};
#[cfg(test)]
use crate::components::{InputPort, OutputPort, VirtualChannel};
use crate::config::NetworkConfiguration;
use crate::routing::{build_routing, RoutingKind, SpanningTree};
use crate::sim::SimContext;
use crate::stats::StatsCollector;
use crate::topologies::Topology;
use crate::traffic::TrafficSource;
use crate::Error;

pub struct Network {
    graph: DiGraph<Node, Link>,
    topology: Topology,
    config: NetworkConfiguration,
    tree: Option<SpanningTree>,
}

impl Network {
    /// Builds the topology and the routers. Routing still has to be set up
    /// with `init_routing`.
    pub fn new(config: &NetworkConfiguration) -> Result<Self, Error> {
        config.validate()?;
        let topology = Topology::build(config)?;
        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..topology.num_nodes())
            .map(|id| {
                graph.add_node(Node::new(
                    id,
                    topology.degree(id),
                    config.num_vcs,
                    config.buffer_size,
                    config.processor_link_delay,
                ))
            })
            .collect();
        for (id, &src) in nodes.iter().enumerate() {
            for (port, spec) in topology.ports(id).iter().enumerate() {
                graph.add_edge(
                    src,
                    nodes[spec.neighbour],
                    Link::new(port, spec.peer_port, config.link_delay),
                );
            }
        }
        info!(
            "network of {} routers and {} links, {} VCs of {} flits",
            graph.node_count(),
            graph.edge_count(),
            config.num_vcs,
            config.buffer_size
        );
        Ok(Self {
            graph,
            topology,
            config: config.clone(),
            tree: None,
        })
    }

    /// Computes the routing functions of every router for the configured
    /// routing kind.
    pub fn init_routing(&mut self, ctx: &mut SimContext) -> Result<(), Error> {
        let (functions, tree) = build_routing(self.config.routing, &self.topology, ctx.rng_mut())?;
        for (node, routing) in self.graph.node_weights_mut().zip(functions) {
            node.router_mut().set_routing(routing);
        }
        if let Some(tree) = &tree {
            info!("up/down spanning tree rooted at {}", tree.root());
        }
        info!("routing set to {:?}", self.config.routing);
        self.tree = tree;
        Ok(())
    }

    pub fn set_routing(&mut self, kind: RoutingKind, ctx: &mut SimContext) -> Result<(), Error> {
        let previous = self.config.routing;
        self.config.routing = kind;
        let res = self.init_routing(ctx);
        if res.is_err() {
            self.config.routing = previous;
        }
        res
    }

    /// Restrict dynamic VC allocation to the first `vcs` VCs of every port.
    pub fn set_available_vcs(&mut self, vcs: usize) -> Result<(), Error> {
        if vcs == 0 || vcs > self.config.num_vcs {
            return Err(Error::InsufficientVcs {
                available: vcs,
                total: self.config.num_vcs,
            });
        }
        self.config.available_vcs = vcs;
        for node in self.graph.node_weights_mut() {
            node.router_mut().set_available_vcs(vcs);
        }
        Ok(())
    }

    /// One clock cycle.
    pub fn step<T: TrafficSource, S: StatsCollector>(
        &mut self,
        ctx: &mut SimContext,
        traffic: &mut T,
        stats: &mut S,
    ) {
        trace!("@{} update", ctx.cycle());
        for node in self.graph.node_weights_mut() {
            node.update(ctx, traffic, stats);
        }
        for link in self.graph.edge_weights_mut() {
            link.update();
        }
        trace!("@{} copy", ctx.cycle());
        for node in self.graph.node_weights_mut() {
            node.copy(ctx);
        }
        for edge in self.graph.edge_indices() {
            if let Err(err) = self.transfer(edge) {
                ctx.report(err);
            }
        }
        ctx.advance();
    }

    /// Move the signals published at both ends of `edge` onto the link and
    /// hand over whatever the link delivers.
    fn transfer(&mut self, edge: EdgeIndex) -> Result<(), Error> {
        let (src, dst) = match self.graph.edge_endpoints(edge) {
            Some(ends) => ends,
            None => return Ok(()),
        };
        let (sp, dp) = (self.graph[edge].src_port(), self.graph[edge].dst_port());
        let flit = self.graph[src].router_mut().output_mut(sp).take_outgoing();
        let credit = self.graph[dst]
            .router_mut()
            .input_mut(dp)
            .take_outgoing_credit();

        let link = &mut self.graph[edge];
        if let Some(mut flit) = flit {
            flit.hops += 1;
            link.send_flit(flit);
        }
        if let Some(credit) = credit {
            link.send_credit(credit);
        }
        let flit = link.deliver_flit();
        let credit = link.deliver_credit();

        if let Some(flit) = flit {
            self.graph[dst].router_mut().input_mut(dp).set_incoming(flit)?;
        }
        if let Some(credit) = credit {
            self.graph[src]
                .router_mut()
                .output_mut(sp)
                .set_incoming_credit(credit)?;
        }
        Ok(())
    }

    /// Empties buffers, links and processor queues. Topology and routing
    /// are kept.
    pub fn reset(&mut self) {
        for node in self.graph.node_weights_mut() {
            node.reset();
        }
        for link in self.graph.edge_weights_mut() {
            link.reset();
        }
    }

    pub fn census(&self) -> Census {
        let mut census = Census::default();
        for node in self.graph.node_indices() {
            self.graph[node].router().census(&mut census);
        }
        census
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn config(&self) -> &NetworkConfiguration {
        &self.config
    }

    pub fn routing_kind(&self) -> RoutingKind {
        self.config.routing
    }

    /// The spanning tree of up/down routing.
    pub fn tree(&self) -> Option<&SpanningTree> {
        self.tree.as_ref()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, id: usize) -> &Node {
        &self.graph[NodeIndex::new(id)]
    }

    pub fn node_mut(&mut self, id: usize) -> &mut Node {
        &mut self.graph[NodeIndex::new(id)]
    }

    pub fn link(&self, link: EdgeIndex) -> &Link {
        &self.graph[link]
    }

    pub fn link_endpoints(&self, link: EdgeIndex) -> Option<(usize, usize)> {
        self.graph
            .edge_endpoints(link)
            .map(|(src, dst)| (src.index(), dst.index()))
    }

    pub fn in_degree(&self, node: usize) -> usize {
        self.incoming_links(node).count()
    }

    pub fn out_degree(&self, node: usize) -> usize {
        self.outgoing_links(node).count()
    }

    pub fn outgoing_links(&self, node: usize) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.graph
            .edges_directed(NodeIndex::new(node), Direction::Outgoing)
            .map(|e| e.id())
    }

    pub fn incoming_links(&self, node: usize) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.graph
            .edges_directed(NodeIndex::new(node), Direction::Incoming)
            .map(|e| e.id())
    }

    pub fn find_link(&self, src: usize, dst: usize) -> Option<EdgeIndex> {
        self.graph
            .find_edge(NodeIndex::new(src), NodeIndex::new(dst))
    }

    /// Output port of `src` leading to `dst`.
    pub fn output_port_to(&self, src: usize, dst: usize) -> Option<usize> {
        self.graph
            .edges_directed(NodeIndex::new(src), Direction::Outgoing)
            .filter(|e| e.target().index() == dst)
            .map(|e| e.weight().src_port())
            .min()
    }

    pub fn to_graphviz(&self) -> String {
        use petgraph::dot::{Config, Dot};

        let node_attrs = |_: &DiGraph<Node, Link>, node: (NodeIndex, &Node)| {
            format!(
                "label=\"{}\n{:?}\"",
                node.1.id(),
                self.topology.coords(node.1.id())
            )
        };
        let generator = Dot::with_attr_getters(
            &self.graph,
            &[Config::NodeNoLabel, Config::EdgeNoLabel],
            &|_, edge| {
                format!(
                    "label=\"delay {}\"; headlabel=\"{}\"; taillabel=\"{}\"",
                    edge.weight().delay(),
                    edge.weight().dst_port(),
                    edge.weight().src_port()
                )
            },
            &node_attrs,
        );
        format!("{:?}", generator)
    }

    /// Credit accounting errors anywhere in the network.
    ///
    /// Every output VC, on router links and on the internal processor links,
    /// must account for the whole downstream buffer: credits held, flits on
    /// their way or buffered downstream, and credits on their way back. Every
    /// router input VC owes one credit per flit it handed to an output VC
    /// that has not been credited back to that output yet.
    #[cfg(test)]
    pub(crate) fn audit_credits(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for edge in self.graph.edge_references() {
            let link = edge.weight();
            let output = &self.graph[edge.source()].router().outputs()[link.src_port()];
            let input = &self.graph[edge.target()].router().inputs()[link.dst_port()];
            let name = format!("{} -> {}", edge.source().index(), edge.target().index());
            audit_link(&name, output, link, input, &mut errors);
        }
        for node in self.graph.node_weights() {
            let router = node.router();
            let processor = node.processor();
            let proc = router.processor_port();
            let name = format!("processor {} -> router", node.id());
            audit_link(
                &name,
                processor.output(),
                node.to_router(),
                &router.inputs()[proc],
                &mut errors,
            );
            let name = format!("router {} -> processor", node.id());
            audit_link(
                &name,
                &router.outputs()[proc],
                node.from_router(),
                processor.input(),
                &mut errors,
            );

            for (ip, input) in router.inputs().iter().enumerate() {
                for (v, in_vc) in input.vcs().iter().enumerate() {
                    let owed: usize = router
                        .outputs()
                        .iter()
                        .flat_map(|output| output.vcs())
                        .filter(|out_vc| out_vc.connected_input() == Some((ip, v)))
                        .map(|out_vc| {
                            out_vc.capacity() - out_vc.credits() + out_vc.has_flit() as usize
                        })
                        .sum();
                    if in_vc.credits() + owed != in_vc.capacity() {
                        errors.push(format!(
                            "router {} I[{}:{}]: {} credits + {} owed",
                            node.id(),
                            ip,
                            v,
                            in_vc.credits(),
                            owed
                        ));
                    }
                }
            }
            // the processor credits every flit as soon as it consumes it
            for (v, in_vc) in processor.input().vcs().iter().enumerate() {
                if !in_vc.has_full_credits() {
                    errors.push(format!(
                        "processor {} I[{}]: {} credits",
                        node.id(),
                        v,
                        in_vc.credits()
                    ));
                }
            }
        }
        errors
    }
}

/// Checks every VC of `output` against the input port across `link`.
#[cfg(test)]
fn audit_link(
    name: &str,
    output: &OutputPort,
    link: &Link,
    input: &InputPort,
    errors: &mut Vec<String>,
) {
    for (v, out_vc) in output.vcs().iter().enumerate() {
        let sent = output.outgoing().into_iter().filter(|f| f.vc == v).count();
        let on_link = link.flits().filter(|f| f.vc == v).count();
        let latched = input.incoming().into_iter().filter(|f| f.vc == v).count();
        let buffered = input.vcs().get(v).map_or(0, |vc| vc.buffer().len());
        let returning = input.outgoing_credit().into_iter().filter(|c| c.vc == v).count()
            + link.credits().filter(|c| c.vc == v).count()
            + output.incoming_credit().into_iter().filter(|c| c.vc == v).count();
        let total = out_vc.credits() + sent + on_link + latched + buffered + returning;
        if total != out_vc.capacity() {
            errors.push(format!(
                "{} O[{}:{}]: {} credits + {} sent + {} on link + {} latched + {} buffered + {} returning",
                name,
                output.index(),
                v,
                out_vc.credits(),
                sent,
                on_link,
                latched,
                buffered,
                returning
            ));
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.topology)?;
        for edge in self.graph.edge_references() {
            writeln!(
                f,
                "{}:{} -> {}:{} {}",
                edge.source().index(),
                edge.weight().src_port(),
                edge.target().index(),
                edge.weight().dst_port(),
                edge.weight()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::components::FlitKind;
    use crate::config::TrafficConfiguration;
    use crate::sim::Phase;
    use crate::stats::Counters;
    use crate::topologies::TopologyKind;
    use crate::traffic::SyntheticTraffic;

    fn config(topology: TopologyKind, k: usize, n: usize) -> NetworkConfiguration {
        NetworkConfiguration {
            topology,
            k,
            n,
            ..Default::default()
        }
    }

    #[test]
    fn test_graph_queries() {
        let net = Network::new(&config(TopologyKind::Mesh, 4, 2)).unwrap();
        assert_eq!(net.node_count(), 16);
        assert_eq!(net.link_count(), 48);
        assert_eq!((net.in_degree(0), net.out_degree(0)), (2, 2));
        assert_eq!((net.in_degree(5), net.out_degree(5)), (4, 4));
        let link = net.find_link(5, 6).unwrap();
        assert_eq!(net.link_endpoints(link), Some((5, 6)));
        assert_eq!(net.output_port_to(5, 6), Some(1));
        assert_eq!(net.link(link).src_port(), 1);
        assert_eq!(net.link(link).dst_port(), 0);
        assert_eq!(net.find_link(0, 5), None);
        assert!(net.outgoing_links(5).all(|l| net.link_endpoints(l).unwrap().0 == 5));
        assert!(net.incoming_links(5).all(|l| net.link_endpoints(l).unwrap().1 == 5));
        // the processor port sits after the network ports
        assert_eq!(net.node(0).router().processor_port(), 2);
        assert_eq!(net.node(5).router().processor_port(), 4);

        let torus = Network::new(&config(TopologyKind::Torus, 2, 2)).unwrap();
        // radix 2: two parallel links per dimension
        assert_eq!(torus.link_count(), 16);
        assert_eq!(torus.output_port_to(0, 1), Some(0));
        assert_eq!(torus.output_port_to(1, 0), Some(0));
    }

    #[test]
    fn test_graphviz() {
        let net = Network::new(&config(TopologyKind::Mesh, 2, 1)).unwrap();
        let dot = net.to_graphviz();
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("0 -> 1"));
        assert!(dot.contains("label=\"delay 1\"; headlabel=\"0\"; taillabel=\"0\""));
        assert!(dot.contains("label=\"1\n[1]\""));
        assert!(net.to_string().contains("0:0 -> 1:0"));
    }

    #[test]
    fn test_census_and_vcs() {
        let mut net = Network::new(&config(TopologyKind::Mesh, 2, 2)).unwrap();
        // every router: two network ports of two VCs plus the processor port,
        // on both the input and the output side
        let census = net.census();
        assert_eq!(census.total(), 4 * 2 * 5);
        assert_eq!(census.idle, census.total());
        assert!(net.set_available_vcs(1).is_ok());
        assert!(net.set_available_vcs(3).is_err());
        assert_eq!(net.config().available_vcs, 1);
    }

    #[test]
    fn test_set_routing() {
        let mut ctx = SimContext::new(1);
        let mut cfg = config(TopologyKind::DegenerateMesh, 4, 2);
        cfg.faults = 0.1;
        cfg.routing = RoutingKind::Minimal;
        let mut net = Network::new(&cfg).unwrap();
        net.init_routing(&mut ctx).unwrap();
        assert_eq!(
            net.set_routing(RoutingKind::DimOrder, &mut ctx),
            Err(Error::UnsupportedRouting(
                RoutingKind::DimOrder,
                TopologyKind::DegenerateMesh
            ))
        );
        assert_eq!(net.routing_kind(), RoutingKind::Minimal);
        net.set_routing(RoutingKind::UpDown, &mut ctx).unwrap();
        assert!(net.tree().is_some());
        assert!(net.node(3).router().routing().table().is_some());
    }

    /// Runs `cycles` of uniform traffic, calling `check` after every cycle.
    fn run_loaded<F: FnMut(&Network)>(cfg: &NetworkConfiguration, cycles: usize, mut check: F) {
        let mut ctx = SimContext::new(11);
        ctx.set_phase(Phase::Running);
        let mut net = Network::new(cfg).unwrap();
        net.init_routing(&mut ctx).unwrap();
        let traffic_config = TrafficConfiguration {
            injection_rate: 0.6,
            ..Default::default()
        };
        let mut traffic = SyntheticTraffic::new(&traffic_config, cfg.k, cfg.n).unwrap();
        let mut stats = Counters::new(net.node_count());
        for _ in 0..cycles {
            net.step(&mut ctx, &mut traffic, &mut stats);
            check(&net);
        }
        assert!(ctx.violations().is_empty());
        assert!(ctx.retired() > 0);
    }

    #[test]
    fn test_credit_conservation() {
        let _logger = env_logger::builder().is_test(true).try_init();
        let mut cfg = config(TopologyKind::Mesh, 4, 2);
        for &(delay, buffer) in &[(0, 1), (1, 2), (3, 4)] {
            cfg.link_delay = delay;
            cfg.buffer_size = buffer;
            run_loaded(&cfg, 300, |net| {
                let errors = net.audit_credits();
                assert!(errors.is_empty(), "{:#?}", errors);
            });
        }
    }

    #[test]
    fn test_wormhole_atomicity() {
        let _logger = env_logger::builder().is_test(true).try_init();
        let mut cfg = config(TopologyKind::Torus, 4, 2);
        cfg.num_vcs = 3;
        cfg.available_vcs = 3;
        // with a delay of one, a link holds exactly the flit sent this cycle
        cfg.link_delay = 1;
        let mut open: HashMap<(usize, usize), usize> = HashMap::new();
        let mut seen = 0;
        run_loaded(&cfg, 400, |net| {
            for edge in 0..net.link_count() {
                let edge_index = EdgeIndex::new(edge);
                let flit = match net.link(edge_index).flits().next() {
                    Some(flit) => flit,
                    None => continue,
                };
                seen += 1;
                let key = (edge, flit.vc);
                match flit.kind {
                    FlitKind::Header { .. } => {
                        assert_eq!(open.insert(key, flit.packet), None, "interleaved header");
                    }
                    FlitKind::Body { .. } => {
                        assert_eq!(open.get(&key), Some(&flit.packet));
                    }
                    FlitKind::Tail => {
                        assert_eq!(open.remove(&key), Some(flit.packet));
                    }
                }
            }
        });
        assert!(seen > 0);
    }

    #[test]
    fn test_reset() {
        let mut ctx = SimContext::new(2);
        let cfg = config(TopologyKind::Mesh, 3, 2);
        let mut net = Network::new(&cfg).unwrap();
        net.init_routing(&mut ctx).unwrap();
        let traffic_config = TrafficConfiguration {
            injection_rate: 0.8,
            ..Default::default()
        };
        let mut traffic = SyntheticTraffic::new(&traffic_config, 3, 2).unwrap();
        let mut stats = Counters::new(9);
        for _ in 0..50 {
            net.step(&mut ctx, &mut traffic, &mut stats);
        }
        assert!(net.census().idle < net.census().total());
        net.reset();
        assert_eq!(net.census().idle, net.census().total());
        assert!((0..9).all(|n| net.node(n).processor().pending() == 0));
        assert!(net.audit_credits().is_empty());
        // routing survives a reset
        assert!(net.node(0).router().routing().route(0, 8, ctx.rng_mut()).is_some());
    }
}
