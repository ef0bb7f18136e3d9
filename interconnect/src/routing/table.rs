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

use std::collections::BTreeMap;
use std::fmt;

use super::Route;

/// Destination node -> route, for one router.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoutingTable {
    entries: BTreeMap<usize, Route>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the route towards `dest`. A conflicting entry is replaced and
    /// logged.
    pub fn insert(&mut self, dest: usize, route: Route) {
        if let Some(old) = self.entries.insert(dest, route) {
            if old != route {
                log::error!(
                    "routing table entry for {} replaced: {} -> {}",
                    dest,
                    old,
                    route
                );
            }
        }
    }

    pub fn get(&self, dest: usize) -> Option<&Route> {
        self.entries.get(&dest)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Route)> {
        self.entries.iter().map(|(&dest, route)| (dest, route))
    }
}

impl fmt::Display for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (dest, route) in &self.entries {
            writeln!(f, "{:<8}{}", dest, route)?;
        }
        Ok(())
    }
}
