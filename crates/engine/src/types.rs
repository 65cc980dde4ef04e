use agents::AgentScore;
use music_library::{PreferenceRecord, Recommendation, Song, SongFeatures, SongId, Timestamp};
use sequence::MaintenanceReport;
use serde::Serialize;

/// A song that finished (or was listened to long enough to count as played).
#[derive(Debug, Clone, PartialEq)]
pub struct PlayEvent {
    pub song_id: SongId,
    /// Song that was playing before, if known
    pub previous_song_id: Option<SongId>,
    pub listen_duration_ms: u64,
    pub total_duration_ms: u64,
    pub timestamp: Timestamp,
    /// The user deliberately replayed this transition
    pub is_repeat: bool,
}

impl PlayEvent {
    pub fn new(song_id: impl Into<SongId>, listen_duration_ms: u64, total_duration_ms: u64, timestamp: Timestamp) -> Self {
        Self {
            song_id: song_id.into(),
            previous_song_id: None,
            listen_duration_ms,
            total_duration_ms,
            timestamp,
            is_repeat: false,
        }
    }

    pub fn after(mut self, previous: impl Into<SongId>) -> Self {
        self.previous_song_id = Some(previous.into());
        self
    }

    pub fn repeated(mut self) -> Self {
        self.is_repeat = true;
        self
    }
}

/// Everything the engine knows about one song's score.
#[derive(Debug, Clone)]
pub struct Explanation {
    pub song: Song,
    pub features: SongFeatures,
    pub preference: Option<PreferenceRecord>,
    pub statistical: AgentScore,
    pub collaborative: AgentScore,
    /// `None` when the external model had no answer
    pub external: Option<AgentScore>,
    pub external_used: bool,
    pub cluster: Option<usize>,
    pub sequence_strength: f64,
    pub fused: Recommendation,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrainingReport {
    pub collaborative_songs: usize,
    pub external_samples: usize,
    pub external_trained: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaintenanceSummary {
    pub transitions: MaintenanceReport,
    pub removed_songs: Vec<SongId>,
    pub training: TrainingReport,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub songs: usize,
    pub plays: usize,
    pub skips: usize,
}
