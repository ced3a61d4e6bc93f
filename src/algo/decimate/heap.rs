//! Indexed binary min-heap over vertices.
//!
//! Priorities live in a side table indexed by vertex, and every stored vertex
//! knows its slot in the heap array, so arbitrary entries can be updated or
//! removed in O(log n) without a search.

use crate::mesh::{MeshIndex, VertexId};

/// Heap position of a vertex that is not stored.
const NOT_STORED: usize = usize::MAX;

/// Min-heap of vertices keyed by priority.
///
/// Equal priorities are ordered by vertex index, lower first.
#[derive(Debug, Clone)]
pub(crate) struct VertexHeap<I: MeshIndex = u32> {
    priorities: Vec<f64>,
    heap: Vec<VertexId<I>>,
    positions: Vec<usize>,
}

impl<I: MeshIndex> VertexHeap<I> {
    /// Create an empty heap for vertex indices below `num_vertices`.
    pub(crate) fn with_capacity(num_vertices: usize) -> Self {
        Self {
            priorities: vec![-1.0; num_vertices],
            heap: Vec::with_capacity(num_vertices),
            positions: vec![NOT_STORED; num_vertices],
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// The last priority recorded for `v`; -1 if it has none.
    #[cfg(test)]
    pub(crate) fn priority(&self, v: VertexId<I>) -> f64 {
        self.priorities[v.index()]
    }

    pub(crate) fn is_stored(&self, v: VertexId<I>) -> bool {
        self.positions[v.index()] != NOT_STORED
    }

    /// Forget the heap slot of `v` without touching the heap array.
    pub(crate) fn reset_position(&mut self, v: VertexId<I>) {
        self.positions[v.index()] = NOT_STORED;
    }

    /// Insert `v`, or move it if it is already stored.
    pub(crate) fn set(&mut self, v: VertexId<I>, priority: f64) {
        if self.is_stored(v) {
            self.update(v, priority);
        } else {
            self.insert(v, priority);
        }
    }

    pub(crate) fn insert(&mut self, v: VertexId<I>, priority: f64) {
        debug_assert!(!self.is_stored(v));
        self.priorities[v.index()] = priority;
        self.heap.push(v);
        let slot = self.heap.len() - 1;
        self.positions[v.index()] = slot;
        self.sift_up(slot);
    }

    pub(crate) fn update(&mut self, v: VertexId<I>, priority: f64) {
        debug_assert!(self.is_stored(v));
        self.priorities[v.index()] = priority;
        let slot = self.positions[v.index()];
        self.sift_down(slot);
        self.sift_up(self.positions[v.index()]);
    }

    /// Remove `v` if stored and mark its priority invalid.
    pub(crate) fn invalidate(&mut self, v: VertexId<I>) {
        self.remove(v);
        self.priorities[v.index()] = -1.0;
    }

    pub(crate) fn remove(&mut self, v: VertexId<I>) {
        if !self.is_stored(v) {
            return;
        }

        let slot = self.positions[v.index()];
        self.positions[v.index()] = NOT_STORED;

        let last = self.heap.len() - 1;
        if slot == last {
            self.heap.pop();
            return;
        }

        self.heap.swap_remove(slot);
        let moved = self.heap[slot];
        self.positions[moved.index()] = slot;
        self.sift_down(slot);
        self.sift_up(self.positions[moved.index()]);
    }

    /// The vertex with the smallest priority.
    pub(crate) fn front(&self) -> Option<VertexId<I>> {
        self.heap.first().copied()
    }

    /// Remove and return the vertex with the smallest priority.
    pub(crate) fn pop_front(&mut self) -> Option<VertexId<I>> {
        let front = self.front()?;
        self.remove(front);
        Some(front)
    }

    fn less(&self, a: VertexId<I>, b: VertexId<I>) -> bool {
        let (pa, pb) = (self.priorities[a.index()], self.priorities[b.index()]);
        match pa.total_cmp(&pb) {
            std::cmp::Ordering::Equal => a < b,
            ord => ord.is_lt(),
        }
    }

    fn place(&mut self, slot: usize, v: VertexId<I>) {
        self.heap[slot] = v;
        self.positions[v.index()] = slot;
    }

    fn sift_up(&mut self, slot: usize) {
        let moved = self.heap[slot];
        let mut i = slot;

        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.less(moved, self.heap[parent]) {
                break;
            }
            self.place(i, self.heap[parent]);
            i = parent;
        }

        self.place(i, moved);
    }

    fn sift_down(&mut self, slot: usize) {
        let moved = self.heap[slot];
        let mut i = slot;

        loop {
            let left = 2 * i + 1;
            if left >= self.heap.len() {
                break;
            }

            let right = left + 1;
            let smallest = if right < self.heap.len() && self.less(self.heap[right], self.heap[left])
            {
                right
            } else {
                left
            };

            if !self.less(self.heap[smallest], moved) {
                break;
            }
            self.place(i, self.heap[smallest]);
            i = smallest;
        }

        self.place(i, moved);
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let positions_ok = self
            .heap
            .iter()
            .enumerate()
            .all(|(slot, v)| self.positions[v.index()] == slot);
        let order_ok = (1..self.heap.len()).all(|i| !self.less(self.heap[i], self.heap[(i - 1) / 2]));
        positions_ok && order_ok
    }
}
