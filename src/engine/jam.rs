// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Jam lock: count consecutive, consistent RX frames before taking over their value.

use log::warn;

use crate::timecode::Timecode;

/// Lock parameters. Both depend on the hardware pipeline, so they are configurable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct JamConfig {
    /// Consecutive valid frames needed to lock.
    pub frames: u8,
    /// Frames added to the received value when taking it over.
    pub offset: u8,
}

impl Default for JamConfig {
    fn default() -> Self {
        Self {
            frames: 64,
            offset: 2,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JamStatus {
    /// Frames still needed.
    Counting(u8),
    /// The frame broke the sequence, counting starts over.
    Restarted,
    Locked,
}

/// Validates a run of RX frames. Any inconsistency restarts the count.
#[derive(Clone, Debug)]
pub struct JamLock {
    start: u8,
    remaining: u8,
    drop_frame: bool,
    expected: Option<Timecode>,
}

impl JamLock {
    pub fn new(frames: u8, drop_frame: bool) -> Self {
        let start = frames.max(1);
        Self {
            start,
            remaining: start,
            drop_frame,
            expected: None,
        }
    }

    pub fn remaining(&self) -> u8 {
        self.remaining
    }

    /// Check one decoded frame.
    ///
    /// The drop-frame flag must match ours and, after the first frame, the value must be
    /// exactly the successor of the previous one.
    pub fn feed(&mut self, rx: &Timecode) -> JamStatus {
        let consistent = rx.drop_frame() == self.drop_frame
            && self.expected.map_or(true, |e| e.to_raw() == rx.to_raw());

        let mut next = *rx;
        next.next_frame();
        self.expected = Some(next);

        if !consistent {
            if self.remaining != self.start {
                warn!("jam restarted at {} ({} left)", rx, self.remaining);
            }
            self.remaining = self.start;
            return JamStatus::Restarted;
        }

        self.remaining -= 1;
        if self.remaining == 0 {
            JamStatus::Locked
        } else {
            JamStatus::Counting(self.remaining)
        }
    }

    /// A frame failed to decode, so continuity is lost.
    pub fn reject(&mut self) {
        self.remaining = self.start;
        self.expected = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timecode::FrameRate;

    fn frames_from(tc: Timecode, n: usize) -> impl Iterator<Item = Timecode> {
        (0..n).scan(tc, |t, _| {
            let cur = *t;
            t.next_frame();
            Some(cur)
        })
    }

    #[test]
    fn locks_after_consistent_run() {
        let mut jam = JamLock::new(4, false);
        let start = Timecode::at(FrameRate::Fps25, false, 1, 0, 0, 0).unwrap();
        let status: Vec<_> = frames_from(start, 4).map(|t| jam.feed(&t)).collect();
        assert_eq!(
            status,
            [
                JamStatus::Counting(3),
                JamStatus::Counting(2),
                JamStatus::Counting(1),
                JamStatus::Locked
            ]
        );
    }

    #[test]
    fn skipped_frame_restarts() {
        let mut jam = JamLock::new(4, false);
        let mut tc = Timecode::at(FrameRate::Fps25, false, 1, 0, 0, 0).unwrap();
        jam.feed(&tc);
        tc.next_frame();
        jam.feed(&tc);
        tc.advance(2);
        assert_eq!(jam.feed(&tc), JamStatus::Restarted);
        assert_eq!(jam.remaining(), 4);

        // the frame that broke the run seeds the next one
        tc.next_frame();
        assert_eq!(jam.feed(&tc), JamStatus::Counting(3));
    }

    #[test]
    fn drop_frame_mismatch_restarts() {
        let mut jam = JamLock::new(4, true);
        let tc = Timecode::at(FrameRate::Fps29_97, false, 1, 0, 0, 0).unwrap();
        assert_eq!(jam.feed(&tc), JamStatus::Restarted);
    }

    #[test]
    fn reject_forgets_history() {
        let mut jam = JamLock::new(3, false);
        let tc = Timecode::at(FrameRate::Fps24, false, 0, 0, 0, 5).unwrap();
        jam.feed(&tc);
        jam.reject();
        assert_eq!(jam.feed(&tc), JamStatus::Counting(2));
    }
}
