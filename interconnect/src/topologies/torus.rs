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

use super::{grid, Topology, TopologyKind};
use crate::Error;

/// A k-ary n-cube with wrap-around links in every dimension.
///
/// Every node has `2 * n` ports: port `2 * d` goes left and `2 * d + 1`
/// goes right along dimension `d`. With `k == 2` both ports of a dimension
/// lead to the same neighbour over two parallel links.
pub fn torus(k: usize, n: usize) -> Result<Topology, Error> {
    let ports = grid(k, n, true)?;
    Ok(Topology::from_ports(TopologyKind::Torus, k, n, ports))
}
