// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Sharing between the engine core, the monitor core and interrupt handlers.
//!
//! [`SharedTimecode`] is for control paths: it holds a critical section for the length of a
//! copy. [`Published`] is for values written from interrupt context, where readers use
//! [`read_stable`] instead of a lock.

use core::cell::Cell;
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::Mutex;

use super::{FrameRate, Timecode};

/// A [`Timecode`] behind a critical-section mutex. Usable as a `static`.
pub struct SharedTimecode {
    inner: Mutex<Cell<Timecode>>,
}

impl SharedTimecode {
    pub const fn new(rate: FrameRate) -> Self {
        Self {
            inner: Mutex::new(Cell::new(Timecode::new(rate))),
        }
    }

    /// Consistent snapshot of every field.
    pub fn get(&self) -> Timecode {
        critical_section::with(|cs| self.inner.borrow(cs).get())
    }

    pub fn set(&self, tc: Timecode) {
        critical_section::with(|cs| self.inner.borrow(cs).set(tc));
    }

    /// Read-modify-write under one critical section.
    pub fn update<R>(&self, f: impl FnOnce(&mut Timecode) -> R) -> R {
        critical_section::with(|cs| {
            let cell = self.inner.borrow(cs);
            let mut tc = cell.get();
            let r = f(&mut tc);
            cell.set(tc);
            r
        })
    }
}

/// A single-writer word published from interrupt context.
pub struct Published {
    value: AtomicU32,
}

impl Published {
    pub const fn new(value: u32) -> Self {
        Self {
            value: AtomicU32::new(value),
        }
    }

    #[inline]
    pub fn publish(&self, value: u32) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn load(&self) -> u32 {
        self.value.load(Ordering::Acquire)
    }
}

/// Repeat `read` until two consecutive results agree.
///
/// Used where a reader combines several published words (or a word and a hardware register)
/// that an interrupt may update between the individual loads.
pub fn read_stable<T: PartialEq>(mut read: impl FnMut() -> T) -> T {
    let mut last = read();
    loop {
        let next = read();
        if next == last {
            return next;
        }
        last = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_is_visible_to_get() {
        let shared = SharedTimecode::new(FrameRate::Fps25);
        let raw = shared.update(|tc| {
            tc.advance(26);
            tc.to_raw()
        });
        assert_eq!(raw, 0x0000_0101);
        assert_eq!(shared.get().to_raw(), raw);
    }

    #[test]
    fn read_stable_waits_for_agreement() {
        let samples = [1u32, 2, 3, 3, 4];
        let mut i = 0;
        let v = read_stable(|| {
            let s = samples[i];
            i += 1;
            s
        });
        assert_eq!(v, 3);
        assert_eq!(i, 4);
    }

    #[test]
    fn published_round_trip() {
        let p = Published::new(0);
        p.publish(0xDEAD_BEEF);
        assert_eq!(read_stable(|| p.load()), 0xDEAD_BEEF);
    }
}
