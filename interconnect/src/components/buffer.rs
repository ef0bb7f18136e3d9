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

use std::collections::VecDeque;
use std::fmt;

use super::Flit;

/// Bounded FIFO of flits behind an input VC.
#[derive(Clone, Debug)]
pub struct Buffer {
    flits: VecDeque<Flit>,
    capacity: usize,
}

impl Buffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            flits: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a flit, handing it back if the buffer is already full.
    pub fn offer(&mut self, flit: Flit) -> Result<(), Flit> {
        if self.flits.len() < self.capacity {
            self.flits.push_back(flit);
            Ok(())
        } else {
            Err(flit)
        }
    }

    pub fn peek(&self) -> Option<&Flit> {
        self.flits.front()
    }

    pub fn take(&mut self) -> Option<Flit> {
        self.flits.pop_front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flit> {
        self.flits.iter()
    }

    pub fn len(&self) -> usize {
        self.flits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flits.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.flits.len() >= self.capacity
    }

    pub fn free_slots(&self) -> usize {
        self.capacity - self.flits.len()
    }

    pub fn clear(&mut self) {
        self.flits.clear();
    }
}

impl fmt::Display for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for flit in &self.flits {
            write!(f, "{} ", flit)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_until_full() {
        let mut buffer = Buffer::new(2);
        assert!(buffer.offer(Flit::header(0, None, 0, 0, 1, 0)).is_ok());
        assert!(buffer.offer(Flit::tail(0, None, 0)).is_ok());
        assert!(buffer.is_full());
        assert_eq!(buffer.free_slots(), 0);

        let rejected = buffer.offer(Flit::tail(1, None, 0));
        assert_eq!(rejected, Err(Flit::tail(1, None, 0)));
        assert_eq!(buffer.len(), 2);

        assert!(buffer.take().map_or(false, |f| f.is_header()));
        assert_eq!(buffer.to_string(), "[T 0] ");
    }
}
