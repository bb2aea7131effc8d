//! Fixed-capacity price buffers, one per instrument.

use crate::domain::indicator_helpers::safe_div;
use crate::domain::ohlcv::Series;
use chrono::NaiveDateTime;
use std::collections::{HashMap, VecDeque};

/// Ring buffer that drops its oldest value once full.
#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer {
    capacity: usize,
    data: VecDeque<f64>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            data: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.capacity == 0 {
            return;
        }
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.data.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn oldest(&self) -> Option<f64> {
        self.data.front().copied()
    }

    pub fn newest(&self) -> Option<f64> {
        self.data.back().copied()
    }

    pub fn values(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// `(newest - oldest) / oldest`, only once the buffer is full.
    pub fn momentum(&self) -> Option<f64> {
        if !self.is_full() {
            return None;
        }
        let oldest = self.oldest()?;
        safe_div(self.newest()? - oldest, oldest)
    }
}

#[derive(Debug, Clone)]
struct InstrumentBuffer {
    ring: RingBuffer,
    last_seen: Option<NaiveDateTime>,
}

/// Close-price buffers keyed by instrument. Each candle is pushed once, so
/// re-evaluating an overlapping history does not repeat prices.
#[derive(Debug, Clone)]
pub struct PriceBuffers {
    capacity: usize,
    buffers: HashMap<String, InstrumentBuffer>,
}

impl PriceBuffers {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffers: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Push every close newer than the last one seen for `instrument`.
    pub fn update(&mut self, instrument: &str, series: &Series) {
        let capacity = self.capacity;
        let entry = self
            .buffers
            .entry(instrument.to_string())
            .or_insert_with(|| InstrumentBuffer {
                ring: RingBuffer::new(capacity),
                last_seen: None,
            });
        for candle in series.candles() {
            if entry.last_seen.is_some_and(|seen| candle.timestamp <= seen) {
                continue;
            }
            entry.ring.push(candle.close);
            entry.last_seen = Some(candle.timestamp);
        }
    }

    pub fn get(&self, instrument: &str) -> Option<&RingBuffer> {
        self.buffers.get(instrument).map(|b| &b.ring)
    }

    pub fn momentum(&self, instrument: &str) -> Option<f64> {
        self.get(instrument)?.momentum()
    }

    pub fn reset(&mut self, instrument: &str) {
        self.buffers.remove(instrument);
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}
