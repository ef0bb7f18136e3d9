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

use super::{Link, Processor, Router};
use crate::sim::SimContext;
use crate::stats::StatsCollector;
use crate::traffic::TrafficSource;
use crate::Cycle;

/// A router, its processor and the two internal links between them.
#[derive(Clone, Debug)]
pub struct Node {
    id: usize,
    processor: Processor,
    router: Router,
    to_router: Link,
    from_router: Link,
}

impl Node {
    pub fn new(id: usize, degree: usize, num_vcs: usize, buffer_size: usize, delay: Cycle) -> Self {
        Self {
            id,
            processor: Processor::new(id, buffer_size),
            router: Router::new(id, degree, num_vcs, buffer_size),
            to_router: Link::new(0, degree, delay),
            from_router: Link::new(degree, 0, delay),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    pub fn to_router(&self) -> &Link {
        &self.to_router
    }

    pub fn from_router(&self) -> &Link {
        &self.from_router
    }

    pub fn update<T: TrafficSource, S: StatsCollector>(
        &mut self,
        ctx: &mut SimContext,
        traffic: &mut T,
        stats: &mut S,
    ) {
        self.processor.update(ctx, traffic, stats);
        self.router.update(ctx);
        self.to_router.update();
        self.from_router.update();
    }

    pub fn copy(&mut self, ctx: &mut SimContext) {
        self.processor.copy(ctx);
        self.router.copy(ctx);

        let proc = self.router.processor_port();
        if let Some(flit) = self.processor.output_mut().take_outgoing() {
            self.to_router.send_flit(flit);
        }
        if let Some(credit) = self.router.input_mut(proc).take_outgoing_credit() {
            self.to_router.send_credit(credit);
        }
        if let Some(flit) = self.router.output_mut(proc).take_outgoing() {
            self.from_router.send_flit(flit);
        }
        if let Some(credit) = self.processor.input_mut().take_outgoing_credit() {
            self.from_router.send_credit(credit);
        }

        let mut delivered = Vec::new();
        if let Some(flit) = self.to_router.deliver_flit() {
            delivered.push(self.router.input_mut(proc).set_incoming(flit));
        }
        if let Some(credit) = self.to_router.deliver_credit() {
            delivered.push(self.processor.output_mut().set_incoming_credit(credit));
        }
        if let Some(flit) = self.from_router.deliver_flit() {
            delivered.push(self.processor.input_mut().set_incoming(flit));
        }
        if let Some(credit) = self.from_router.deliver_credit() {
            delivered.push(self.router.output_mut(proc).set_incoming_credit(credit));
        }
        for err in delivered.into_iter().filter_map(Result::err) {
            ctx.report(err);
        }
    }

    pub fn reset(&mut self) {
        self.processor.reset();
        self.router.reset();
        self.to_router.reset();
        self.from_router.reset();
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.processor, self.router)
    }
}
