//! Batch Accumulation
//!
//! Collects decoded trades into fixed-size batches. A batch is handed out
//! exactly when it reaches its limit; whatever remains at shutdown is
//! drained once with [`BatchAccumulator::take`].

/// Default number of trades per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Fixed-size batch buffer.
#[derive(Debug)]
pub struct BatchAccumulator<T> {
    items: Vec<T>,
    limit: usize,
}

impl<T> BatchAccumulator<T> {
    /// Create an accumulator that releases batches of `limit` items.
    ///
    /// A limit of zero is treated as one.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            items: Vec::with_capacity(limit),
            limit,
        }
    }

    /// Add an item, returning the full batch when the limit is reached.
    pub fn push(&mut self, item: T) -> Option<Vec<T>> {
        self.items.push(item);
        if self.items.len() >= self.limit {
            Some(std::mem::replace(
                &mut self.items,
                Vec::with_capacity(self.limit),
            ))
        } else {
            None
        }
    }

    /// Drain the partial batch, if any.
    pub fn take(&mut self) -> Option<Vec<T>> {
        if self.items.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.items))
        }
    }

    /// Number of buffered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Batch size limit.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }
}

impl<T> Default for BatchAccumulator<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}
