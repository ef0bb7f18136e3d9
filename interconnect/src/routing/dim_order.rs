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

use rand::Rng;

use super::{Route, RoutingKind};
use crate::topologies::{coord, grid_port, Dir, Topology, TopologyKind};
use crate::Error;

/// Table-free dimension-order routing for full meshes and tori.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DimOrder {
    k: usize,
    n: usize,
    wrap: bool,
}

impl DimOrder {
    pub fn new(topology: &Topology) -> Result<Self, Error> {
        match topology.kind() {
            TopologyKind::Mesh | TopologyKind::Torus => Ok(Self {
                k: topology.radix(),
                n: topology.dimensions(),
                wrap: topology.kind().wraps(),
            }),
            kind => Err(Error::UnsupportedRouting(RoutingKind::DimOrder, kind)),
        }
    }

    /// Correct the lowest dimension in which `current` and `dest` differ.
    ///
    /// On a torus the shorter way round is taken; a coin is flipped when both
    /// ways are equally long.
    pub fn route<R: Rng + ?Sized>(&self, current: usize, dest: usize, rng: &mut R) -> Option<Route> {
        let dim = (0..self.n).find(|&d| coord(current, self.k, d) != coord(dest, self.k, d))?;
        let c = coord(current, self.k, dim);
        let t = coord(dest, self.k, dim);
        let dir = if !self.wrap {
            if t > c {
                Dir::Right
            } else {
                Dir::Left
            }
        } else {
            let right = (t + self.k - c) % self.k;
            let left = self.k - right;
            if right < left {
                Dir::Right
            } else if right > left {
                Dir::Left
            } else if rng.gen_bool(0.5) {
                Dir::Right
            } else {
                Dir::Left
            }
        };
        grid_port(self.k, self.n, self.wrap, current, dim, dir).map(Route::port)
    }
}
