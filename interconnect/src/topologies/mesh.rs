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

/// A k-ary n-dimensional grid without wrap-around links.
///
/// Nodes on the faces of the grid have fewer ports. For example a 4-ary
/// 2-mesh looks like this:
/// <pre>
///  12 -- 13 -- 14 -- 15   ^
///   |     |     |     |   |
///   8 --  9 -- 10 -- 11   |
///   |     |     |     |   dim 1
///   4 --  5 --  6 --  7   |
///   |     |     |     |   |
///   0 --  1 --  2 --  3   v
///  <------ dim 0 ------>
/// </pre>
pub fn mesh(k: usize, n: usize) -> Result<Topology, Error> {
    let ports = grid(k, n, false)?;
    Ok(Topology::from_ports(TopologyKind::Mesh, k, n, ports))
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    /// coordinates in all dimensions are either 0 or max
    fn is_corner(elem: &[usize], k: usize) -> bool {
        elem.iter().all(|&v| v == 0 || v == k - 1)
    }

    /// coordinates in all but one dimension are either 0 or max
    fn is_border(elem: &[usize], k: usize) -> bool {
        !is_corner(elem, k) && elem.iter().filter(|&&v| v == 0 || v == k - 1).count() == elem.len() - 1
    }

    #[test]
    fn test_mesh2d() {
        let _logger = env_logger::builder().is_test(true).try_init();
        let k = 4;
        let topo = mesh(k, 2).unwrap();
        assert_eq!(topo.num_nodes(), 16);
        let corners = 4;
        let borders = 8;
        let middle = 4;
        assert_eq!(topo.num_links(), corners * 2 + borders * 3 + middle * 4);

        for e in (0..2).map(|_| 0..k).multi_cartesian_product() {
            let node = super::super::node_at(&e, k);
            let degree = topo.degree(node);
            if is_corner(&e, k) {
                assert_eq!(degree, 2, "{:?}", e);
            } else if is_border(&e, k) {
                assert_eq!(degree, 3, "{:?}", e);
            } else {
                assert_eq!(degree, 4, "{:?}", e);
            }
        }
        log::debug!("Topology:\n{}", topo);
    }

    #[test]
    fn test_mesh3d() {
        let _logger = env_logger::builder().is_test(true).try_init();
        let topo = mesh(3, 3).unwrap();
        // the centre node (1, 1, 1) is fully connected
        assert_eq!(topo.degree(13), 6);
        // (1, 1, 0) sits on a face
        assert_eq!(topo.degree(4), 5);
        // (1, 0, 0) sits on an edge
        assert_eq!(topo.degree(1), 4);
        assert_eq!(topo.degree(0), 3);
        assert!(topo.is_connected());
    }

    #[test]
    fn test_port_order() {
        let topo = mesh(4, 2).unwrap();
        // corner 0 only has right ports: +x then +y
        let n0: Vec<_> = topo.neighbours(0).collect();
        assert_eq!(n0, vec![1, 4]);
        // node 5 (1, 1): -x, +x, -y, +y
        let n5: Vec<_> = topo.neighbours(5).collect();
        assert_eq!(n5, vec![4, 6, 1, 9]);
        // node 4 (0, 1): +x, -y, +y
        assert_eq!(topo.ports(5)[0].peer_port, 0);
        assert_eq!(topo.port_to(5, 9), Some(3));
        assert_eq!(topo.port_to(5, 10), None);
    }

    #[test]
    fn test_invalid_dimensions() {
        assert_eq!(
            mesh(1, 2).unwrap_err(),
            Error::InvalidDimensions { k: 1, n: 2 }
        );
        assert!(mesh(4, 0).is_err());
    }
}
