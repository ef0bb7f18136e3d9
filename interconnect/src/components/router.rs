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

//! Wormhole router with virtual-channel flow control.
//!
//! Ports `0..degree` face the neighbouring routers, the last port faces the
//! local processor. Every cycle the router first latches what arrived
//! (update phase) and then publishes its outputs (copy phase), so no router
//! ever sees a signal written in the same cycle.

use std::fmt;

use log::{debug, trace};

use super::{Census, FlitKind, InputPort, OutputPort, VcState, VirtualChannel};
use crate::error::{Error, Fault};
use crate::routing::RoutingFunction;
use crate::sim::SimContext;

#[derive(Clone, Debug)]
pub struct Router {
    node: usize,
    inputs: Vec<InputPort>,
    outputs: Vec<OutputPort>,
    routing: RoutingFunction,
    available_vcs: usize,
}

impl Router {
    /// A router with `degree` network ports of `num_vcs` VCs each plus one
    /// single-VC processor port.
    pub fn new(node: usize, degree: usize, num_vcs: usize, buffer_size: usize) -> Self {
        let vcs = |port: usize| if port == degree { 1 } else { num_vcs };
        Self {
            node,
            inputs: (0..=degree)
                .map(|p| InputPort::new(node, p, vcs(p), buffer_size))
                .collect(),
            outputs: (0..=degree)
                .map(|p| OutputPort::new(node, p, vcs(p), buffer_size))
                .collect(),
            routing: RoutingFunction::Unconfigured,
            available_vcs: num_vcs,
        }
    }

    pub fn node(&self) -> usize {
        self.node
    }

    pub fn processor_port(&self) -> usize {
        self.outputs.len() - 1
    }

    pub fn inputs(&self) -> &[InputPort] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    pub fn input_mut(&mut self, port: usize) -> &mut InputPort {
        &mut self.inputs[port]
    }

    pub fn output_mut(&mut self, port: usize) -> &mut OutputPort {
        &mut self.outputs[port]
    }

    pub fn routing(&self) -> &RoutingFunction {
        &self.routing
    }

    pub fn set_routing(&mut self, routing: RoutingFunction) {
        self.routing = routing;
    }

    pub fn available_vcs(&self) -> usize {
        self.available_vcs
    }

    pub fn set_available_vcs(&mut self, vcs: usize) {
        self.available_vcs = vcs;
    }

    /// Update phase: latch inputs and credits, then switch at most one flit
    /// per input port.
    pub fn update(&mut self, ctx: &mut SimContext) {
        self.read_inputs(ctx);
        self.read_credits(ctx);
        for port in 0..self.inputs.len() {
            if let Err(err) = self.route_input(port, ctx) {
                ctx.report(err);
            }
        }
    }

    fn read_inputs(&mut self, ctx: &mut SimContext) {
        for input in self.inputs.iter_mut() {
            if let Err(err) = input.read_input_flit() {
                ctx.report(err);
            }
        }
    }

    /// A credit frees a slot on an output VC and on the input VC feeding it.
    fn read_credits(&mut self, ctx: &mut SimContext) {
        for op in 0..self.outputs.len() {
            if let Some(credit) = self.outputs[op].read_input_credit() {
                let res = self.outputs[op].inc_credits(credit.vc).and_then(|_| {
                    let (ip, ivc) = self.outputs[op].connected_input(credit.vc)?;
                    self.inputs[ip].inc_credits(ivc)
                });
                if let Err(err) = res {
                    ctx.report(err);
                }
            }
        }
    }

    fn route_input(&mut self, port: usize, ctx: &mut SimContext) -> Result<(), Error> {
        let (in_vc, kind) = match self.inputs[port].peek_next() {
            Some(next) => next,
            None => return Ok(()),
        };
        let (op, ovc) = match kind {
            FlitKind::Header { dest, .. } => match self.allocate(port, in_vc, dest, ctx)? {
                Some(binding) => binding,
                None => return Ok(()),
            },
            FlitKind::Body { .. } | FlitKind::Tail => self.inputs[port].binding(in_vc)?,
        };
        if self.outputs[op].is_empty(ovc) {
            if let Some(flit) = self.inputs[port].take_next_flit()? {
                trace!(
                    "@{} router {} I[{}:{}] -> O[{}:{}] {}",
                    ctx.cycle(),
                    self.node,
                    port,
                    in_vc,
                    op,
                    ovc,
                    flit
                );
                self.outputs[op].add_flit(ovc, flit)?;
            }
        }
        Ok(())
    }

    /// Route a header and allocate an output VC for it. `None` leaves the
    /// header waiting for a VC.
    fn allocate(
        &mut self,
        port: usize,
        in_vc: usize,
        dest: usize,
        ctx: &mut SimContext,
    ) -> Result<Option<(usize, usize)>, Error> {
        let proc = self.processor_port();
        let (op, ovc) = if dest == self.node {
            (proc, self.outputs[proc].alloc_vc(1))
        } else {
            let route = self
                .routing
                .route(self.node, dest, ctx.rng_mut())
                .filter(|r| r.port < proc);
            let route = match route {
                Some(route) => route,
                None => {
                    // reported once, when the header starts waiting
                    let waiting =
                        self.inputs[port].vcs()[in_vc].state() == VcState::WaitVcAlloc;
                    self.inputs[port].set_waiting_vc(in_vc)?;
                    if waiting {
                        return Ok(None);
                    }
                    return Err(Error::Protocol {
                        node: self.node,
                        port,
                        vc: in_vc,
                        fault: Fault::MissingRoute(dest),
                    });
                }
            };
            let ovc = match route.vc {
                Some(vc) => self.outputs[route.port].alloc_specific(vc, self.available_vcs),
                None => self.outputs[route.port].alloc_vc(self.available_vcs),
            };
            (route.port, ovc)
        };
        let ovc = match ovc {
            Some(ovc) => ovc,
            None => {
                debug!(
                    "@{} router {} I[{}:{}] waits for a VC on O[{}]",
                    ctx.cycle(),
                    self.node,
                    port,
                    in_vc,
                    op
                );
                self.inputs[port].set_waiting_vc(in_vc)?;
                return Ok(None);
            }
        };
        self.inputs[port].setup_connection(in_vc, op, ovc)?;
        self.outputs[op].setup_connection(ovc, port, in_vc)?;
        debug!(
            "@{} router {} connects I[{}:{}] -> O[{}:{}] for {}",
            ctx.cycle(),
            self.node,
            port,
            in_vc,
            op,
            ovc,
            dest
        );
        Ok(Some((op, ovc)))
    }

    /// Copy phase: return credits for consumed flits and put one staged flit
    /// per output port on its outgoing register.
    pub fn copy(&mut self, ctx: &mut SimContext) {
        for input in self.inputs.iter_mut() {
            input.write_output_credit();
        }
        for output in self.outputs.iter_mut() {
            if let Err(err) = output.write_output_flit() {
                ctx.report(err);
            }
        }
    }

    pub fn census(&self, census: &mut Census) {
        for input in &self.inputs {
            for vc in input.vcs() {
                census.add(vc.state());
            }
        }
        for output in &self.outputs {
            for vc in output.vcs() {
                census.add(vc.state());
            }
        }
    }

    pub fn reset(&mut self) {
        for input in self.inputs.iter_mut() {
            input.reset();
        }
        for output in self.outputs.iter_mut() {
            output.reset();
        }
    }
}

impl fmt::Display for Router {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "router {} ({})", self.node, self.routing)?;
        writeln!(f, "{:<12}{:<12}{:<12}{:<12}flits", "input", "to", "state", "credits")?;
        for input in &self.inputs {
            write!(f, "{}", input)?;
        }
        writeln!(f, "{:<12}{:<12}{:<12}{:<12}slot", "output", "from", "state", "credits")?;
        for output in &self.outputs {
            write!(f, "{}", output)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Credit, Flit};
    use crate::routing::{Route, RoutingTable};

    fn flit_on(vc: usize, flit: Flit) -> Flit {
        Flit { vc, ..flit }
    }

    /// Router 0 with two network ports; destination 1 leaves on port 1.
    fn router(buffer_size: usize) -> Router {
        let mut table = RoutingTable::new();
        table.insert(1, Route::port(1));
        table.insert(2, Route { port: 0, vc: Some(1) });
        let mut router = Router::new(0, 2, 2, buffer_size);
        router.set_routing(RoutingFunction::Minimal(table));
        router
    }

    #[test]
    fn test_ports() {
        let router = router(4);
        assert_eq!(router.processor_port(), 2);
        assert_eq!(router.inputs().len(), 3);
        assert_eq!(router.outputs()[0].vcs().len(), 2);
        assert_eq!(router.outputs()[2].vcs().len(), 1);
        assert_eq!(router.inputs()[2].vcs().len(), 1);
    }

    #[test]
    fn test_wormhole_through_router() {
        let _logger = env_logger::builder().is_test(true).try_init();
        let mut ctx = SimContext::new(0);
        let mut router = router(4);
        let flits = vec![
            Flit::header(0, None, 0, 0, 1, 1),
            Flit::body(0, None, 0, 0),
            Flit::tail(0, None, 0),
        ];
        let mut sent = Vec::new();
        for flit in flits {
            router.input_mut(0).set_incoming(flit_on(1, flit)).unwrap();
            router.update(&mut ctx);
            router.copy(&mut ctx);
            assert_eq!(
                router.input_mut(0).take_outgoing_credit(),
                Some(Credit { vc: 1 })
            );
            sent.extend(router.output_mut(1).take_outgoing());
            ctx.advance();
        }
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|f| f.packet == 0 && f.vc == 0));
        assert!(sent[2].is_tail());
        assert_eq!(router.inputs()[0].vcs()[1].state(), VcState::Idle);
        assert_eq!(router.outputs()[1].vcs()[0].credits(), 1);
        assert!(ctx.violations().is_empty());

        // credits returned downstream flow back to the input VC as well
        for _ in 0..3 {
            router
                .output_mut(1)
                .set_incoming_credit(Credit { vc: 0 })
                .unwrap();
            router.update(&mut ctx);
        }
        assert!(router.outputs()[1].vcs()[0].has_full_credits());
        assert!(router.inputs()[0].vcs()[1].has_full_credits());
        assert!(ctx.violations().is_empty());
    }

    #[test]
    fn test_header_waits_for_vc() {
        let mut ctx = SimContext::new(0);
        let mut router = router(4);
        router.set_available_vcs(1);
        router
            .input_mut(0)
            .set_incoming(flit_on(0, Flit::header(0, None, 0, 0, 1, 2)))
            .unwrap();
        router.update(&mut ctx);
        router
            .input_mut(1)
            .set_incoming(flit_on(0, Flit::header(1, None, 0, 0, 1, 2)))
            .unwrap();
        router.update(&mut ctx);
        // output VC 0 of port 1 is held by packet 0; VC 1 is not available
        assert_eq!(router.inputs()[1].vcs()[0].state(), VcState::WaitVcAlloc);
        assert_eq!(router.outputs()[1].vcs()[1].state(), VcState::Idle);
        let mut census = Census::default();
        router.census(&mut census);
        assert_eq!(census.wait_vc_alloc, 1);
        assert!(ctx.violations().is_empty());
    }

    #[test]
    fn test_fixed_vc_and_local_delivery() {
        let mut ctx = SimContext::new(0);
        let mut router = router(4);
        router
            .input_mut(1)
            .set_incoming(flit_on(0, Flit::header(0, None, 0, 1, 2, 0)))
            .unwrap();
        router
            .input_mut(0)
            .set_incoming(flit_on(0, Flit::header(1, None, 0, 1, 0, 0)))
            .unwrap();
        router.update(&mut ctx);
        assert_eq!(router.inputs()[1].binding(0).unwrap(), (0, 1));
        assert_eq!(router.inputs()[0].binding(0).unwrap(), (2, 0));

        // a fixed VC outside the available ones is never handed out
        let mut router = self::router(4);
        router.set_available_vcs(1);
        router
            .input_mut(1)
            .set_incoming(flit_on(0, Flit::header(0, None, 0, 1, 2, 0)))
            .unwrap();
        router.update(&mut ctx);
        assert_eq!(router.inputs()[1].vcs()[0].state(), VcState::WaitVcAlloc);
        assert_eq!(router.outputs()[0].vcs()[1].state(), VcState::Idle);
        assert!(ctx.violations().is_empty());
    }

    #[test]
    fn test_missing_route() {
        let mut ctx = SimContext::new(0);
        let mut router = router(4);
        router
            .input_mut(2)
            .set_incoming(Flit::header(0, None, 0, 0, 7, 0))
            .unwrap();
        for _ in 0..5 {
            router.update(&mut ctx);
            router.copy(&mut ctx);
            ctx.advance();
        }
        assert_eq!(router.inputs()[2].vcs()[0].state(), VcState::WaitVcAlloc);
        // the stuck header is reported once, not every cycle
        assert!(matches!(
            ctx.violations(),
            [(
                0,
                Error::Protocol {
                    fault: Fault::MissingRoute(7),
                    ..
                }
            )]
        ));
    }
}
