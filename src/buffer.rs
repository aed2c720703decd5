//! Segmented byte buffer used for per-connection send and receive queues.
//!
//! A [`SegBuffer`] is an ordered queue of byte segments. Each segment keeps its
//! own read cursor, so appending never copies what is already queued and
//! consuming from the front only touches the segments it drains.
//!
//! ```text
//!   front                                        back
//!   ┌──────────────┐   ┌──────────┐   ┌──────────────────┐
//!   │ xx│ a b c d  │──▶│ e f g    │──▶│ h i j k l m      │
//!   └──────────────┘   └──────────┘   └──────────────────┘
//!      ^ offset
//! ```
//!
//! Fully consumed segments are evicted immediately, and `size()` is a cached
//! counter equal to the number of unconsumed bytes across all segments.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
struct Segment {
    data: Vec<u8>,
    offset: usize,
}

impl Segment {
    fn remaining(&self) -> &[u8] {
        &self.data[self.offset..]
    }

    fn len(&self) -> usize {
        self.data.len() - self.offset
    }
}

/// Ordered, appendable, partially-consumable byte queue.
///
/// Cloning duplicates every segment together with its cursor. Moving out of a
/// buffer is `std::mem::take`, which leaves an empty buffer behind.
#[derive(Debug, Clone, Default)]
pub struct SegBuffer {
    ring: VecDeque<Segment>,
    size: usize,
}

impl SegBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `data` as a new segment. Empty input is ignored.
    pub fn push(&mut self, data: Vec<u8>) {
        if data.is_empty() {
            return;
        }
        self.size += data.len();
        self.ring.push_back(Segment { data, offset: 0 });
    }

    /// Removes and returns up to `len` bytes from the front of the buffer.
    ///
    /// Returns fewer bytes only when the buffer holds fewer than `len`.
    pub fn pop(&mut self, len: usize) -> Vec<u8> {
        let len = len.min(self.size);
        if len == 0 {
            return Vec::new();
        }

        // a single whole segment can be handed out without copying
        if let Some(front) = self.ring.front() {
            if front.offset == 0 && front.data.len() == len {
                self.size -= len;
                return self.ring.pop_front().map(|s| s.data).unwrap_or_default();
            }
        }

        let mut res = Vec::with_capacity(len);
        while res.len() < len {
            let Some(front) = self.ring.front_mut() else {
                break;
            };
            let take = front.len().min(len - res.len());
            res.extend_from_slice(&front.remaining()[..take]);
            front.offset += take;
            if front.len() == 0 {
                self.ring.pop_front();
            }
        }
        self.size -= res.len();
        res
    }

    /// Unconsumed bytes of the front segment, or an empty slice.
    pub fn chunk(&self) -> &[u8] {
        self.ring.front().map(Segment::remaining).unwrap_or(&[])
    }

    /// Discards `cnt` bytes from the front without copying them out.
    pub fn advance(&mut self, mut cnt: usize) {
        cnt = cnt.min(self.size);
        self.size -= cnt;
        while cnt > 0 {
            let Some(front) = self.ring.front_mut() else {
                break;
            };
            let take = front.len().min(cnt);
            front.offset += take;
            cnt -= take;
            if front.len() == 0 {
                self.ring.pop_front();
            }
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of segments currently queued.
    pub fn segments(&self) -> usize {
        self.ring.len()
    }

    pub fn clear(&mut self) {
        self.ring.clear();
        self.size = 0;
    }
}
