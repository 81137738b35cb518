//! Bit-packed ring buffer of call outcomes.
//!
//! The breaker's failure window stores one bit per guarded call (set =
//! failure) packed into 64-bit words, with the population count cached and
//! maintained in O(1) per write. A plain bool array would cost O(N) per
//! rate query on the hot path, so the packed form is load-bearing here.

use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};

use parking_lot::Mutex;

const WORD_BITS: usize = u64::BITS as usize;

/// Fixed-capacity circular buffer of single-bit outcomes.
///
/// Writes serialize through one short critical section; `len` and
/// `cardinality` reads are lock-free and may trail an in-flight write, which
/// is fine because transition decisions are driven off the value returned by
/// [`set_next_bit`](Self::set_next_bit) itself.
#[derive(Debug)]
pub struct RingBitBuffer {
    write: Mutex<WriteCursor>,
    length: AtomicUsize,
    cardinality: AtomicUsize,
    capacity: usize,
}

#[derive(Debug)]
struct WriteCursor {
    words: Vec<u64>,
    index: usize,
    length: usize,
}

impl RingBitBuffer {
    /// Creates an empty buffer of the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0. Policy configs are validated before this
    /// is reached.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring bit buffer capacity must be > 0");
        Self {
            write: Mutex::new(WriteCursor {
                words: vec![0; capacity.div_ceil(WORD_BITS)],
                index: 0,
                length: 0,
            }),
            length: AtomicUsize::new(0),
            cardinality: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Appends a bit at the cursor, overwriting the oldest bit once the
    /// buffer is saturated. Returns the cardinality after the write.
    pub fn set_next_bit(&self, bit: bool) -> usize {
        let mut cursor = self.write.lock();

        let word = cursor.index / WORD_BITS;
        let mask = 1u64 << (cursor.index % WORD_BITS);
        let old = cursor.words[word] & mask != 0;
        if bit {
            cursor.words[word] |= mask;
        } else {
            cursor.words[word] &= !mask;
        }

        cursor.index = (cursor.index + 1) % self.capacity;
        if cursor.length < self.capacity {
            cursor.length += 1;
            self.length.store(cursor.length, Relaxed);
        }

        // Cached popcount moves by new - old; while still filling the
        // overwritten bit is always 0.
        match (old, bit) {
            (false, true) => self.cardinality.fetch_add(1, Relaxed) + 1,
            (true, false) => self.cardinality.fetch_sub(1, Relaxed) - 1,
            _ => self.cardinality.load(Relaxed),
        }
    }

    /// Number of outcomes recorded so far, up to the capacity.
    pub fn len(&self) -> usize {
        self.length.load(Relaxed)
    }

    /// True when no outcome has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of set bits (failures) currently stored.
    pub fn cardinality(&self) -> usize {
        self.cardinality.load(Relaxed)
    }

    /// Fixed capacity of the window.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True once every slot has been written at least once.
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Resets the buffer to its empty state.
    pub fn clear(&self) {
        let mut cursor = self.write.lock();
        cursor.words.fill(0);
        cursor.index = 0;
        cursor.length = 0;
        self.length.store(0, Relaxed);
        self.cardinality.store(0, Relaxed);
    }
}
