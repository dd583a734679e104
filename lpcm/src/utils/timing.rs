//! Timing utilities for presentation time synthesis.
//!
//! PES timestamps and the collator clock run at 90 kHz. The frame parser
//! works in microseconds, matching the decoder-facing side of the pipeline.

/// PES system clock frequency for PTS/DTS values.
pub const PTS_CLOCK_HZ: u64 = 90_000;

/// Sampling rate assumed when a header does not carry a usable one.
pub const DEFAULT_SAMPLING_RATE: u32 = 48_000;

pub fn pts_to_us(pts: u64) -> u64 {
    pts * 1_000_000 / PTS_CLOCK_HZ
}

pub fn samples_to_us(samples: u64, sampling_rate: u32) -> u64 {
    samples * 1_000_000 / sampling_rate.max(1) as u64
}

pub fn samples_to_ticks(samples: u64, sampling_rate: u32) -> u64 {
    samples * PTS_CLOCK_HZ / sampling_rate.max(1) as u64
}

/// Running presentation clock used to stamp frames that arrive without a PTS.
///
/// Each stamped frame advances the clock by its own duration; a frame carrying
/// a real timestamp re-anchors the clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaybackClock {
    next: Option<u64>,
}

impl PlaybackClock {
    /// Returns the presentation time of a frame in microseconds.
    pub fn stamp(&mut self, pts_us: Option<u64>, duration_us: u64) -> Option<u64> {
        let time = pts_us.or(self.next);
        self.next = time.map(|t| t + duration_us);
        time
    }

    /// Time the next frame is expected at, once a timestamp has been seen.
    pub fn expected(&self) -> Option<u64> {
        self.next
    }

    pub fn reset(&mut self) {
        self.next = None;
    }
}

#[test]
fn playback_clock_synthesizes_missing_stamps() {
    let mut clock = PlaybackClock::default();

    assert_eq!(clock.stamp(None, 1_000), None);
    assert_eq!(clock.stamp(Some(90_000), 1_000), Some(90_000));
    assert_eq!(clock.expected(), Some(91_000));
    assert_eq!(clock.stamp(None, 1_000), Some(91_000));
    assert_eq!(clock.stamp(None, 500), Some(92_000));
    assert_eq!(clock.stamp(Some(10), 500), Some(10));

    clock.reset();
    assert_eq!(clock.stamp(None, 500), None);
}

#[test]
fn clock_conversions() {
    assert_eq!(pts_to_us(90_000), 1_000_000);
    assert_eq!(samples_to_us(480, 48_000), 10_000);
    assert_eq!(samples_to_ticks(80, 48_000), 150);
    assert_eq!(samples_to_ticks(40, 44_100), 81);
}
