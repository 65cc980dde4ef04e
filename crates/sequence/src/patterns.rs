//! Sliding-window skip pattern detection.

use crate::skip::{SkipConfig, SkipType};
use music_library::{RingBuffer, SongId, Timestamp};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SkipPattern {
    None,
    /// Several early skips in a row: the current queue doesn't fit the mood
    Frustrated,
    /// Many skips of any kind: the user is hunting for something
    Searching,
    /// Mostly late skips: the user is being pulled away, not rejecting songs
    Interrupted,
}

impl SkipPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipPattern::None => "none",
            SkipPattern::Frustrated => "frustrated",
            SkipPattern::Searching => "searching",
            SkipPattern::Interrupted => "interrupted",
        }
    }
}

/// Entry of the recent-skip window.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentSkip {
    pub song_id: SongId,
    pub skip_type: SkipType,
    pub penalty: f64,
    pub timestamp: Timestamp,
}

/// Published to subscribers whenever a non-`None` pattern is detected.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternNotice {
    pub pattern: SkipPattern,
    pub detected_at: Timestamp,
    /// Songs skipped inside the window, newest first
    pub recent_song_ids: Vec<SongId>,
}

/// Owns the recent-skip ring buffer. Single writer; the skip handler
/// serializes access.
#[derive(Debug)]
pub struct PatternDetector {
    window: RingBuffer<RecentSkip>,
    window_ms: i64,
    frustrated_early_skips: usize,
    searching_skips: usize,
    interrupted_late_ratio: f64,
    interrupted_min_skips: usize,
}

impl PatternDetector {
    pub fn new(config: &SkipConfig) -> Self {
        Self {
            window: RingBuffer::with_capacity(config.window_capacity),
            window_ms: i64::try_from(config.window_secs.saturating_mul(1000)).unwrap_or(i64::MAX),
            frustrated_early_skips: config.frustrated_early_skips,
            searching_skips: config.searching_skips,
            interrupted_late_ratio: config.interrupted_late_ratio,
            interrupted_min_skips: config.interrupted_min_skips,
        }
    }

    pub fn push(&mut self, skip: RecentSkip) {
        self.window.push(skip);
    }

    /// Skips inside `[now - window, now]`, newest first.
    pub fn in_window(&self, now: Timestamp) -> impl Iterator<Item = &RecentSkip> + '_ {
        let start = now.saturating_sub(self.window_ms);
        self.window
            .iter_newest()
            .filter(move |s| s.timestamp >= start && s.timestamp <= now)
    }

    pub fn detect(&self, now: Timestamp) -> SkipPattern {
        let (mut total, mut early, mut late) = (0usize, 0usize, 0usize);
        for skip in self.in_window(now) {
            total += 1;
            match skip.skip_type {
                SkipType::Early => early += 1,
                SkipType::Late => late += 1,
                SkipType::Mid => {}
            }
        }

        if early >= self.frustrated_early_skips {
            SkipPattern::Frustrated
        } else if total >= self.searching_skips {
            SkipPattern::Searching
        } else if total >= self.interrupted_min_skips.max(1)
            && late as f64 / total as f64 > self.interrupted_late_ratio
        {
            SkipPattern::Interrupted
        } else {
            SkipPattern::None
        }
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: Timestamp = 1_700_000_000_000;

    fn skip(kind: SkipType, offset_secs: i64) -> RecentSkip {
        RecentSkip {
            song_id: format!("s{offset_secs}"),
            skip_type: kind,
            penalty: 0.5,
            timestamp: T0 + offset_secs * 1000,
        }
    }

    fn detector() -> PatternDetector {
        PatternDetector::new(&SkipConfig::default())
    }

    #[test]
    fn test_three_early_skips_frustrated() {
        let mut d = detector();
        for i in 0..3 {
            d.push(skip(SkipType::Early, i * 20));
        }
        assert_eq!(d.detect(T0 + 60_000), SkipPattern::Frustrated);
    }

    #[test]
    fn test_five_mixed_skips_searching() {
        let mut d = detector();
        let kinds = [SkipType::Early, SkipType::Mid, SkipType::Early, SkipType::Mid, SkipType::Late];
        for (i, kind) in kinds.into_iter().enumerate() {
            d.push(skip(kind, i as i64 * 30));
        }
        assert_eq!(d.detect(T0 + 150_000), SkipPattern::Searching);
    }

    #[test]
    fn test_mostly_late_interrupted() {
        let mut d = detector();
        d.push(skip(SkipType::Late, 0));
        d.push(skip(SkipType::Late, 10));
        d.push(skip(SkipType::Late, 20));
        d.push(skip(SkipType::Mid, 30));
        // 3 of 4 late = 0.75
        assert_eq!(d.detect(T0 + 40_000), SkipPattern::Interrupted);
    }

    #[test]
    fn test_window_expiry() {
        let mut d = detector();
        for i in 0..3 {
            d.push(skip(SkipType::Early, i));
        }
        // six minutes later the window is empty
        assert_eq!(d.detect(T0 + 360_000), SkipPattern::None);
    }

    #[test]
    fn test_oversized_window_saturates() {
        let mut d = PatternDetector::new(&SkipConfig {
            window_secs: u64::MAX,
            ..SkipConfig::default()
        });
        for i in 0..3 {
            d.push(skip(SkipType::Early, i));
        }
        assert_eq!(d.detect(T0 + 3_000), SkipPattern::Frustrated);
        assert_eq!(d.in_window(i64::MIN + 1).count(), 0);
    }

    #[test]
    fn test_clear_resets_detection() {
        let mut d = detector();
        for i in 0..3 {
            d.push(skip(SkipType::Early, i));
        }
        d.clear();
        assert!(d.is_empty());
        d.push(skip(SkipType::Mid, 5));
        assert_eq!(d.detect(T0 + 10_000), SkipPattern::None);
    }
}
