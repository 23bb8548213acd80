use std::collections::{BTreeMap, VecDeque};

/// Numeric fields of one recorded request.
pub type NumericSample = BTreeMap<String, f64>;

/// Fixed-capacity FIFO of live-traffic samples; the oldest entry is evicted
/// on overflow.
#[derive(Debug, Clone)]
pub struct DriftBuffer {
    capacity: usize,
    entries: VecDeque<NumericSample>,
}

impl DriftBuffer {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: NumericSample) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<NumericSample> {
        self.entries.iter().cloned().collect()
    }
}
