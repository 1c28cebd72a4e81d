//! Pending tile loads.
//!
//! Requests are served coarsest level first, then closest to the view
//! centre, then in the order they were queued. Re-queueing an address
//! supersedes the earlier request; superseded heap entries are skipped on
//! pop.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::manifest::TileAddress;

/// Scheduling key for a load; smaller values load first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadPriority {
    /// Pyramid level of the tile.
    pub level: u32,
    /// Angular distance from the view centre in millidegrees.
    pub distance_millideg: u32,
}

impl LoadPriority {
    /// Priority from a level and a distance in degrees.
    pub fn new(level: u32, distance_degrees: f64) -> Self {
        let millideg = if distance_degrees.is_finite() {
            (distance_degrees.abs() * 1000.0).round().min(u32::MAX as f64) as u32
        } else {
            u32::MAX
        };
        Self {
            level,
            distance_millideg: millideg,
        }
    }
}

/// A tile waiting for a fetch slot.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub address: TileAddress,
    pub scene_id: String,
    pub priority: LoadPriority,
    sequence: u64,
}

impl LoadRequest {
    pub fn new(address: TileAddress, scene_id: impl Into<String>, priority: LoadPriority) -> Self {
        Self {
            address,
            scene_id: scene_id.into(),
            priority,
            sequence: 0,
        }
    }
}

// BinaryHeap is a max-heap: the smallest priority and then the smallest
// sequence must compare greatest.
impl PartialEq for LoadRequest {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for LoadRequest {}

impl PartialOrd for LoadRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LoadRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Priority queue of load requests with at most one live request per address.
#[derive(Debug, Default)]
pub struct LoadQueue {
    heap: BinaryHeap<LoadRequest>,
    live: HashMap<TileAddress, u64>,
    next_sequence: u64,
}

impl LoadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a request, superseding any earlier one for the same address.
    pub fn push(&mut self, mut request: LoadRequest) {
        request.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.live.insert(request.address, request.sequence);
        self.heap.push(request);
    }

    /// Most urgent live request.
    pub fn pop(&mut self) -> Option<LoadRequest> {
        while let Some(request) = self.heap.pop() {
            if self.live.get(&request.address) == Some(&request.sequence) {
                self.live.remove(&request.address);
                return Some(request);
            }
        }
        None
    }

    /// Whether a live request exists for `address`.
    pub fn contains(&self, address: &TileAddress) -> bool {
        self.live.contains_key(address)
    }

    /// Live requests.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Addresses with a live request, in no particular order.
    pub fn addresses(&self) -> impl Iterator<Item = TileAddress> + '_ {
        self.live.keys().copied()
    }

    /// Drop every request whose address fails `keep`, along with superseded
    /// heap entries.
    pub fn retain(&mut self, mut keep: impl FnMut(&TileAddress) -> bool) {
        self.live.retain(|address, _| keep(address));
        let live = &self.live;
        self.heap
            .retain(|request| live.get(&request.address) == Some(&request.sequence));
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(level: u32, col: u32, distance: f64) -> LoadRequest {
        LoadRequest::new(
            TileAddress::new(level, col, 0),
            "scene",
            LoadPriority::new(level, distance),
        )
    }

    #[test]
    fn test_coarsest_level_first() {
        let mut queue = LoadQueue::new();
        queue.push(request(2, 0, 0.0));
        queue.push(request(0, 1, 90.0));
        queue.push(request(1, 2, 10.0));

        let levels: Vec<u32> = std::iter::from_fn(|| queue.pop())
            .map(|r| r.address.level)
            .collect();
        assert_eq!(levels, vec![0, 1, 2]);
    }

    #[test]
    fn test_nearest_first_within_level() {
        let mut queue = LoadQueue::new();
        queue.push(request(2, 0, 45.0));
        queue.push(request(2, 1, 5.0));
        queue.push(request(2, 2, 20.0));

        let cols: Vec<u32> = std::iter::from_fn(|| queue.pop())
            .map(|r| r.address.col)
            .collect();
        assert_eq!(cols, vec![1, 2, 0]);
    }

    #[test]
    fn test_fifo_among_equals() {
        let mut queue = LoadQueue::new();
        for col in 0..5 {
            queue.push(request(1, col, 10.0));
        }
        let cols: Vec<u32> = std::iter::from_fn(|| queue.pop())
            .map(|r| r.address.col)
            .collect();
        assert_eq!(cols, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_newer_request_supersedes() {
        let mut queue = LoadQueue::new();
        queue.push(request(2, 0, 80.0));
        queue.push(request(2, 1, 40.0));
        // Same address as the first, now closer
        queue.push(request(2, 0, 1.0));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().address.col, 0);
        assert_eq!(queue.pop().unwrap().address.col, 1);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_retain() {
        let mut queue = LoadQueue::new();
        for col in 0..4 {
            queue.push(request(0, col, 0.0));
        }
        queue.retain(|address| address.col % 2 == 0);

        assert_eq!(queue.len(), 2);
        assert!(queue.contains(&TileAddress::new(0, 2, 0)));
        assert!(!queue.contains(&TileAddress::new(0, 1, 0)));
    }

    #[test]
    fn test_clear() {
        let mut queue = LoadQueue::new();
        queue.push(request(0, 0, 0.0));
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_priority_from_distance() {
        assert_eq!(LoadPriority::new(1, 12.3456).distance_millideg, 12346);
        assert_eq!(LoadPriority::new(1, f64::NAN).distance_millideg, u32::MAX);
    }
}
