// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Fixed-capacity rolling average keyed by a timestamp mark.

use heapless::Deque;

/// Running mean of the last `N` samples. Each sample carries a mark (a timestamp in ms) so
/// old samples can be purged by age.
pub struct Rolling<const N: usize> {
    data: Deque<(f32, u64), N>,
    sum: f32,
}

impl<const N: usize> Default for Rolling<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Rolling<N> {
    pub const fn new() -> Self {
        Self {
            data: Deque::new(),
            sum: 0.0,
        }
    }

    /// Add a sample, dropping the oldest when full.
    pub fn store(&mut self, value: f32, mark: u64) {
        if self.data.is_full() {
            if let Some((old, _)) = self.data.pop_front() {
                self.sum -= old;
            }
        }
        // cannot fail, a slot was freed above
        let _ = self.data.push_back((value, mark));
        self.sum += value;
    }

    /// Mean of the stored samples, `None` when empty.
    pub fn read(&self) -> Option<f32> {
        if self.data.is_empty() {
            None
        } else {
            Some(self.sum / self.data.len() as f32)
        }
    }

    pub fn store_read(&mut self, value: f32, mark: u64) -> Option<f32> {
        self.store(value, mark);
        self.read()
    }

    /// Drop samples marked before `mark`.
    pub fn purge(&mut self, mark: u64) {
        while let Some((value, m)) = self.data.front().copied() {
            if m >= mark {
                break;
            }
            self.data.pop_front();
            self.sum -= value;
        }
        if self.data.is_empty() {
            self.sum = 0.0;
        }
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.sum = 0.0;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
