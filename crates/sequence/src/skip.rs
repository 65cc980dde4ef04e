//! Skip Handler - classifies skips and feeds them into the learned state
//!
//! ## Flow per skip
//! 1. completion = clamp(listen / total, 0, 1), 0 when the duration is unknown
//! 2. Band: EARLY (< 10%), MID (< 50%), LATE otherwise
//! 3. penalty = exp(-completion) * band multiplier
//! 4. Persist the event, the song's preference record and the penalized
//!    transition from the previous song in one store call, then update the
//!    in-memory graph
//! 5. Live skips only: push onto the recent-skip window and run pattern
//!    detection; non-`None` patterns are broadcast to subscribers

use crate::error::{invalid, Result};
use crate::patterns::{PatternDetector, PatternNotice, RecentSkip, SkipPattern};
use crate::transition::TransitionEngine;
use music_library::{
    completion_rate, LibraryStore, ListeningEvent, PreferenceRecord, SongId, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

/// Longest accepted skip-pattern window: one day.
pub const MAX_WINDOW_SECS: u64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SkipType {
    Early,
    Mid,
    Late,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SkipConfig {
    /// Completion below this is an early skip
    pub early_threshold: f64,
    /// Completion below this (and not early) is a mid skip
    pub mid_threshold: f64,
    pub early_multiplier: f64,
    pub mid_multiplier: f64,
    pub late_multiplier: f64,
    pub window_capacity: usize,
    pub window_secs: u64,
    pub frustrated_early_skips: usize,
    pub searching_skips: usize,
    pub interrupted_late_ratio: f64,
    pub interrupted_min_skips: usize,
    /// Songs with more skips per play than this are reported as songs to avoid
    pub avoid_skip_ratio: f64,
}

impl Default for SkipConfig {
    fn default() -> Self {
        Self {
            early_threshold: 0.10,
            mid_threshold: 0.50,
            early_multiplier: 1.0,
            mid_multiplier: 0.6,
            late_multiplier: 0.3,
            window_capacity: 10,
            window_secs: 300,
            frustrated_early_skips: 3,
            searching_skips: 5,
            interrupted_late_ratio: 0.7,
            interrupted_min_skips: 1,
            avoid_skip_ratio: 0.5,
        }
    }
}

impl SkipConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0 < self.early_threshold
            && self.early_threshold < self.mid_threshold
            && self.mid_threshold <= 1.0)
        {
            return Err(invalid(
                "skip thresholds",
                "expected 0 < early_threshold < mid_threshold <= 1",
            ));
        }
        if !(self.early_multiplier > self.mid_multiplier
            && self.mid_multiplier > self.late_multiplier
            && self.late_multiplier > 0.0)
        {
            return Err(invalid(
                "skip multipliers",
                "must strictly decrease from early to late and stay positive",
            ));
        }
        if self.window_capacity == 0 || self.window_secs == 0 {
            return Err(invalid("skip window", "capacity and duration must be non-zero"));
        }
        if self.window_secs > MAX_WINDOW_SECS {
            return Err(invalid("window_secs", format!("must be at most {MAX_WINDOW_SECS}")));
        }
        if !(0.0..=1.0).contains(&self.interrupted_late_ratio) {
            return Err(invalid("interrupted_late_ratio", "must be in [0, 1]"));
        }
        Ok(())
    }
}

pub fn classify_skip(completion_rate: f64, config: &SkipConfig) -> SkipType {
    if completion_rate < config.early_threshold {
        SkipType::Early
    } else if completion_rate < config.mid_threshold {
        SkipType::Mid
    } else {
        SkipType::Late
    }
}

pub fn skip_penalty(completion_rate: f64, skip_type: SkipType, config: &SkipConfig) -> f64 {
    let multiplier = match skip_type {
        SkipType::Early => config.early_multiplier,
        SkipType::Mid => config.mid_multiplier,
        SkipType::Late => config.late_multiplier,
    };
    (-completion_rate).exp() * multiplier
}

/// A skip reported by the player.
#[derive(Debug, Clone, PartialEq)]
pub struct SkipEvent {
    pub song_id: SongId,
    /// Song that was playing before, if known
    pub previous_song_id: Option<SongId>,
    pub listen_duration_ms: u64,
    pub total_duration_ms: u64,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkipOutcome {
    pub skip_type: SkipType,
    pub completion_rate: f64,
    pub penalty: f64,
    pub like_score: f64,
    pub pattern: SkipPattern,
}

pub struct SkipHandler {
    config: SkipConfig,
    store: Arc<dyn LibraryStore>,
    transitions: Arc<TransitionEngine>,
    detector: Mutex<PatternDetector>,
    notices: broadcast::Sender<PatternNotice>,
}

impl SkipHandler {
    pub fn new(config: SkipConfig, store: Arc<dyn LibraryStore>, transitions: Arc<TransitionEngine>) -> Self {
        let (notices, _) = broadcast::channel(16);
        Self {
            detector: Mutex::new(PatternDetector::new(&config)),
            config,
            store,
            transitions,
            notices,
        }
    }

    pub fn config(&self) -> &SkipConfig {
        &self.config
    }

    /// Receive every detected non-`None` skip pattern.
    pub fn subscribe(&self) -> broadcast::Receiver<PatternNotice> {
        self.notices.subscribe()
    }

    pub fn classify(&self, listen_duration_ms: u64, total_duration_ms: u64) -> SkipType {
        classify_skip(completion_rate(listen_duration_ms, total_duration_ms), &self.config)
    }

    /// Handle a live skip: learn from it and run pattern detection.
    pub async fn handle_skip(&self, event: SkipEvent) -> Result<SkipOutcome> {
        self.process(event, true).await
    }

    /// Learn from a skip taken from recorded history. The recent-skip window
    /// and pattern subscribers are left alone.
    pub async fn replay_skip(&self, event: SkipEvent) -> Result<SkipOutcome> {
        self.process(event, false).await
    }

    /// Store writes happen before the transition graph changes, so a failed
    /// write leaves both exactly as they were.
    #[instrument(skip(self, event), fields(song_id = %event.song_id))]
    async fn process(&self, event: SkipEvent, live: bool) -> Result<SkipOutcome> {
        let completion = completion_rate(event.listen_duration_ms, event.total_duration_ms);
        let skip_type = classify_skip(completion, &self.config);
        let penalty = skip_penalty(completion, skip_type, &self.config);

        let edge = event
            .previous_song_id
            .as_deref()
            .map(|previous| self.transitions.preview_skip_at(previous, &event.song_id, event.timestamp));

        let mut record = self
            .store
            .preference(&event.song_id)
            .await?
            .unwrap_or_else(|| PreferenceRecord::new(event.song_id.clone()));
        record.record_skip(completion, event.timestamp);
        let like_score = record.like_score();

        let listened = ListeningEvent::new(
            event.song_id.clone(),
            event.timestamp,
            event.listen_duration_ms,
            event.total_duration_ms,
            true,
        );
        self.store
            .record_interaction(listened, record, edge.clone())
            .await?;
        if let Some(edge) = edge {
            self.transitions.install(edge);
        }

        let pattern = if live {
            self.detect_pattern(&event, skip_type, penalty)
        } else {
            SkipPattern::None
        };

        debug!(?skip_type, penalty, like_score, live, "Skip handled");
        Ok(SkipOutcome {
            skip_type,
            completion_rate: completion,
            penalty,
            like_score,
            pattern,
        })
    }

    fn detect_pattern(&self, event: &SkipEvent, skip_type: SkipType, penalty: f64) -> SkipPattern {
        let (pattern, recent) = {
            let mut detector = self.detector.lock().unwrap_or_else(PoisonError::into_inner);
            detector.push(RecentSkip {
                song_id: event.song_id.clone(),
                skip_type,
                penalty,
                timestamp: event.timestamp,
            });
            let pattern = detector.detect(event.timestamp);
            let recent: Vec<SongId> = detector
                .in_window(event.timestamp)
                .map(|s| s.song_id.clone())
                .collect();
            (pattern, recent)
        };

        if pattern != SkipPattern::None {
            info!(pattern = pattern.as_str(), "Skip pattern detected");
            // no subscribers is fine
            let _ = self.notices.send(PatternNotice {
                pattern,
                detected_at: event.timestamp,
                recent_song_ids: recent,
            });
        }
        pattern
    }

    /// Forget the recent-skip window, e.g. when the user picks a song explicitly.
    pub fn reset_skip_tracking(&self) {
        self.detector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!("Skip tracking reset");
    }

    pub fn current_pattern(&self, now: Timestamp) -> SkipPattern {
        self.detector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .detect(now)
    }

    /// Songs skipped more than `avoid_skip_ratio` times per play, most-skipped first.
    pub async fn songs_to_avoid(&self, limit: usize) -> Result<Vec<SongId>> {
        let mut flagged: Vec<PreferenceRecord> = self
            .store
            .preferences()
            .await?
            .into_iter()
            .filter(|r| r.skip_count > 0 && r.skip_to_play_ratio() > self.config.avoid_skip_ratio)
            .collect();

        flagged.sort_by(|a, b| {
            b.skip_count
                .cmp(&a.skip_count)
                .then_with(|| {
                    b.skip_to_play_ratio()
                        .partial_cmp(&a.skip_to_play_ratio())
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.song_id.cmp(&b.song_id))
        });
        flagged.truncate(limit);
        Ok(flagged.into_iter().map(|r| r.song_id).collect())
    }
}
