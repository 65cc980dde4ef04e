//! Transition Engine - learned song-to-song graph
//!
//! Keeps a directed, weighted graph of "B was played after A" edges and serves
//! next-song predictions from it.
//!
//! ## Update rules
//! - Completed transition: `weight += lr * (0.5 + 0.5 * completion) * (repeat ? boost : 1)`;
//!   a new edge starts at 1.0
//! - Skipped transition: `weight *= skip_decay`; a new edge starts at `skip_decay`
//! - Time: `weight * exp(-ln2 * days / half_life)` from the edge's decay anchor,
//!   never below the floor
//!
//! Every update first folds pending decay into the stored weight, so a stored
//! weight is always "as of" `max(last_occurred, decayed_through)`.

use crate::error::{invalid, Result};
use agents::math::decay_for_days;
use music_library::types::elapsed_days;
use music_library::{now_millis, Recommendation, SongId, Timestamp, TransitionEdge};
use rand::Rng;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    pub learning_rate: f64,
    /// Multiplier on the increment when the user replays a transition
    pub repeat_boost: f64,
    /// Multiplicative penalty per skip, in (0, 1)
    pub skip_decay: f64,
    pub half_life_days: f64,
    /// Lower bound for any stored or decayed weight
    pub weight_floor: f64,
    /// Decayed weights below this are not offered as candidates
    pub min_candidate_weight: f64,
    /// Exploration probability of the epsilon-greedy policy
    pub epsilon: f64,
    pub prune_weight: f64,
    pub retention_days: f64,
    /// Edges untouched for this long get bulk-decayed during maintenance
    pub stale_after_days: f64,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            repeat_boost: 1.5,
            skip_decay: 0.7,
            half_life_days: 23.0,
            weight_floor: 0.01,
            min_candidate_weight: 0.05,
            epsilon: 0.1,
            prune_weight: 0.1,
            retention_days: 30.0,
            stale_after_days: 7.0,
        }
    }
}

impl TransitionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0) {
            return Err(invalid("learning_rate", "must be positive"));
        }
        if !(self.repeat_boost >= 1.0) {
            return Err(invalid("repeat_boost", "must be at least 1.0"));
        }
        if !(self.skip_decay > 0.0 && self.skip_decay < 1.0) {
            return Err(invalid("skip_decay", "must be in (0, 1)"));
        }
        if !(self.half_life_days > 0.0) {
            return Err(invalid("half_life_days", "must be positive"));
        }
        if !(self.weight_floor > 0.0) {
            return Err(invalid("weight_floor", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(invalid("epsilon", "must be in [0, 1]"));
        }
        if !(self.retention_days >= 0.0 && self.stale_after_days >= 0.0) {
            return Err(invalid("retention_days", "windows must be non-negative"));
        }
        Ok(())
    }
}

/// Two songs that are reliably played together, in either order.
#[derive(Debug, Clone, PartialEq)]
pub struct MagneticPair {
    pub first: SongId,
    pub second: SongId,
    pub forward_weight: f64,
    pub backward_weight: f64,
}

impl MagneticPair {
    pub fn strength(&self) -> f64 {
        self.forward_weight + self.backward_weight
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub decayed: usize,
    pub pruned: usize,
    pub remaining: usize,
}

type Graph = HashMap<SongId, HashMap<SongId, TransitionEdge>>;

pub struct TransitionEngine {
    config: TransitionConfig,
    graph: RwLock<Graph>,
}

impl TransitionEngine {
    pub fn new(config: TransitionConfig) -> Self {
        Self {
            config,
            graph: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &TransitionConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, Graph> {
        self.graph.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Graph> {
        self.graph.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Weight of `edge` as seen at `now`.
    pub fn decayed_weight(&self, edge: &TransitionEdge, now: Timestamp) -> f64 {
        let days = elapsed_days(edge.decay_anchor(), now);
        (edge.weight * decay_for_days(days, self.config.half_life_days)).max(self.config.weight_floor)
    }

    /// Fold pending decay into the stored weight and move the anchor to `at`.
    fn settle(&self, edge: &mut TransitionEdge, at: Timestamp) {
        edge.weight = self.decayed_weight(edge, at);
        edge.last_occurred = edge.last_occurred.max(at);
        edge.decayed_through = edge.decayed_through.max(at);
    }

    // =========================================================================
    // Learning
    // =========================================================================

    fn reinforced(
        &self,
        existing: Option<TransitionEdge>,
        from: &str,
        to: &str,
        completion_rate: f64,
        is_repeat: bool,
        at: Timestamp,
    ) -> TransitionEdge {
        let completion = if completion_rate.is_finite() {
            completion_rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let mut edge = match existing {
            Some(mut edge) => {
                self.settle(&mut edge, at);
                let boost = if is_repeat { self.config.repeat_boost } else { 1.0 };
                edge.weight += self.config.learning_rate * (0.5 + 0.5 * completion) * boost;
                edge
            }
            None => TransitionEdge::new(from, to, 1.0, at),
        };
        let plays = edge.play_count as f64;
        edge.avg_completion_rate = (edge.avg_completion_rate * plays + completion) / (plays + 1.0);
        edge.play_count += 1;
        edge
    }

    fn penalized(&self, existing: Option<TransitionEdge>, from: &str, to: &str, at: Timestamp) -> TransitionEdge {
        let mut edge = match existing {
            Some(mut edge) => {
                self.settle(&mut edge, at);
                edge.weight = (edge.weight * self.config.skip_decay).max(self.config.weight_floor);
                edge
            }
            None => TransitionEdge::new(from, to, self.config.skip_decay, at),
        };
        edge.skip_count += 1;
        edge
    }

    pub fn record_transition(&self, from: &str, to: &str, completion_rate: f64, is_repeat: bool) -> TransitionEdge {
        self.record_transition_at(from, to, completion_rate, is_repeat, now_millis())
    }

    /// Reinforce `from -> to`. Returns the updated edge for persistence.
    pub fn record_transition_at(
        &self,
        from: &str,
        to: &str,
        completion_rate: f64,
        is_repeat: bool,
        at: Timestamp,
    ) -> TransitionEdge {
        let mut graph = self.write();
        let outgoing = graph.entry(from.to_string()).or_default();
        let edge = self.reinforced(outgoing.remove(to), from, to, completion_rate, is_repeat, at);
        outgoing.insert(to.to_string(), edge.clone());
        debug!(from, to, weight = edge.weight, "Reinforced transition");
        edge
    }

    /// The edge [`Self::record_transition_at`] would produce, without changing the graph.
    pub fn preview_transition_at(
        &self,
        from: &str,
        to: &str,
        completion_rate: f64,
        is_repeat: bool,
        at: Timestamp,
    ) -> TransitionEdge {
        self.reinforced(self.edge(from, to), from, to, completion_rate, is_repeat, at)
    }

    pub fn record_skip(&self, from: &str, to: &str) -> TransitionEdge {
        self.record_skip_at(from, to, now_millis())
    }

    /// Penalize `from -> to`. The weight stays positive so the edge remains selectable.
    pub fn record_skip_at(&self, from: &str, to: &str, at: Timestamp) -> TransitionEdge {
        let mut graph = self.write();
        let outgoing = graph.entry(from.to_string()).or_default();
        let edge = self.penalized(outgoing.remove(to), from, to, at);
        outgoing.insert(to.to_string(), edge.clone());
        debug!(from, to, weight = edge.weight, "Penalized transition");
        edge
    }

    /// The edge [`Self::record_skip_at`] would produce, without changing the graph.
    pub fn preview_skip_at(&self, from: &str, to: &str, at: Timestamp) -> TransitionEdge {
        self.penalized(self.edge(from, to), from, to, at)
    }

    /// Put a previewed edge into the graph once it has been persisted.
    ///
    /// Callers serialize preview and install, otherwise a concurrent update
    /// of the same edge is lost.
    pub fn install(&self, edge: TransitionEdge) {
        debug!(from = %edge.from, to = %edge.to, weight = edge.weight, "Installed transition");
        self.write()
            .entry(edge.from.clone())
            .or_default()
            .insert(edge.to.clone(), edge);
    }

    // =========================================================================
    // Prediction
    // =========================================================================

    /// Decayed weights of the selectable outgoing edges, excluding `exclude`.
    fn live_edges(&self, current: &str, exclude: &HashSet<&str>, now: Timestamp) -> Vec<(TransitionEdge, f64)> {
        let graph = self.read();
        let Some(outgoing) = graph.get(current) else {
            return Vec::new();
        };
        outgoing
            .values()
            .filter(|edge| !exclude.contains(edge.to.as_str()))
            .map(|edge| (edge.clone(), self.decayed_weight(edge, now)))
            .filter(|(_, weight)| *weight >= self.config.min_candidate_weight)
            .collect()
    }

    pub fn next_song_candidates(&self, current: &str, exclude: &[SongId], limit: usize) -> Vec<Recommendation> {
        self.next_song_candidates_at(current, exclude, limit, now_millis())
    }

    /// Top `limit` successors of `current` with `score = probability * 100`.
    ///
    /// Probabilities are normalized over every selectable edge, so the returned
    /// ones sum to at most 1.
    #[instrument(skip(self, exclude))]
    pub fn next_song_candidates_at(
        &self,
        current: &str,
        exclude: &[SongId],
        limit: usize,
        now: Timestamp,
    ) -> Vec<Recommendation> {
        let exclude: HashSet<&str> = exclude.iter().map(String::as_str).collect();
        let mut edges = self.live_edges(current, &exclude, now);
        let total: f64 = edges.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return Vec::new();
        }

        edges.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.to.cmp(&b.0.to))
        });
        edges.truncate(limit);

        edges
            .into_iter()
            .map(|(edge, weight)| {
                let probability = weight / total;
                let familiarity = (edge.play_count as f64 / 10.0).min(1.0);
                let confidence = 100.0
                    * (0.4 * familiarity + 0.4 * edge.avg_completion_rate + 0.2 * (1.0 - edge.skip_ratio()));
                Recommendation::new(
                    edge.to.clone(),
                    probability * 100.0,
                    confidence,
                    format!(
                        "Often played after this song ({} plays, {} skips)",
                        edge.play_count, edge.skip_count
                    ),
                )
            })
            .collect()
    }

    pub fn select_next_song(&self, current: &str, exclude: &[SongId]) -> Option<SongId> {
        self.select_next_song_with(current, exclude, &mut rand::rng(), now_millis())
    }

    /// Epsilon-greedy pick: with probability epsilon sample proportionally to
    /// weight, otherwise take the heaviest edge.
    pub fn select_next_song_with<R: Rng + ?Sized>(
        &self,
        current: &str,
        exclude: &[SongId],
        rng: &mut R,
        now: Timestamp,
    ) -> Option<SongId> {
        let exclude: HashSet<&str> = exclude.iter().map(String::as_str).collect();
        let mut edges = self.live_edges(current, &exclude, now);
        if edges.is_empty() {
            return None;
        }
        // deterministic order for the roulette wheel
        edges.sort_by(|a, b| a.0.to.cmp(&b.0.to));

        if rng.random::<f64>() < self.config.epsilon {
            let total: f64 = edges.iter().map(|(_, w)| w).sum();
            let mut target = rng.random::<f64>() * total;
            for (edge, weight) in &edges {
                if target < *weight {
                    return Some(edge.to.clone());
                }
                target -= weight;
            }
            return edges.last().map(|(edge, _)| edge.to.clone());
        }

        edges
            .into_iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(edge, _)| edge.to)
    }

    // =========================================================================
    // Graph analysis
    // =========================================================================

    /// Sum of decayed incoming and outgoing weights of `song`.
    pub fn analyze_sequence_strength(&self, song: &str, now: Timestamp) -> f64 {
        let graph = self.read();
        graph
            .values()
            .flat_map(|outgoing| outgoing.values())
            .filter(|edge| edge.from == song || edge.to == song)
            .map(|edge| self.decayed_weight(edge, now))
            .sum()
    }

    /// Best-connected songs, strongest first.
    pub fn hub_songs(&self, limit: usize, now: Timestamp) -> Vec<(SongId, f64)> {
        let mut strength: HashMap<SongId, f64> = HashMap::new();
        {
            let graph = self.read();
            for edge in graph.values().flat_map(|outgoing| outgoing.values()) {
                let weight = self.decayed_weight(edge, now);
                *strength.entry(edge.from.clone()).or_default() += weight;
                *strength.entry(edge.to.clone()).or_default() += weight;
            }
        }
        let mut hubs: Vec<_> = strength.into_iter().collect();
        hubs.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        hubs.truncate(limit);
        hubs
    }

    /// Pairs linked in both directions, ranked by combined decayed weight.
    pub fn magnetic_pairs(&self, limit: usize, now: Timestamp) -> Vec<MagneticPair> {
        let graph = self.read();
        let mut pairs = Vec::new();
        for (from, outgoing) in graph.iter() {
            for (to, edge) in outgoing {
                if from >= to {
                    continue;
                }
                let Some(back) = graph.get(to).and_then(|o| o.get(from)) else {
                    continue;
                };
                pairs.push(MagneticPair {
                    first: from.clone(),
                    second: to.clone(),
                    forward_weight: self.decayed_weight(edge, now),
                    backward_weight: self.decayed_weight(back, now),
                });
            }
        }
        pairs.sort_by(|a, b| {
            b.strength()
                .partial_cmp(&a.strength())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.first.cmp(&b.first))
        });
        pairs.truncate(limit);
        pairs
    }

    // =========================================================================
    // Maintenance and persistence
    // =========================================================================

    /// Bulk-decay stale edges and prune weak old ones.
    ///
    /// Decay is folded in up to `now` and recorded in `decayed_through`, so a
    /// repeated pass at the same instant changes nothing.
    pub fn perform_maintenance_at(&self, now: Timestamp) -> MaintenanceReport {
        let mut graph = self.write();
        let mut report = MaintenanceReport::default();

        for outgoing in graph.values_mut() {
            for edge in outgoing.values_mut() {
                if elapsed_days(edge.decay_anchor(), now) >= self.config.stale_after_days {
                    edge.weight = self.decayed_weight(edge, now);
                    edge.decayed_through = now;
                    report.decayed += 1;
                }
            }
            let before = outgoing.len();
            outgoing.retain(|_, edge| {
                edge.weight >= self.config.prune_weight
                    || elapsed_days(edge.last_occurred, now) <= self.config.retention_days
            });
            report.pruned += before - outgoing.len();
        }
        graph.retain(|_, outgoing| !outgoing.is_empty());
        report.remaining = graph.values().map(HashMap::len).sum();

        info!(
            decayed = report.decayed,
            pruned = report.pruned,
            remaining = report.remaining,
            "Transition maintenance finished"
        );
        report
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<TransitionEdge> {
        self.read().get(from).and_then(|o| o.get(to)).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<TransitionEdge> {
        self.read()
            .values()
            .flat_map(|outgoing| outgoing.values().cloned())
            .collect()
    }

    /// Replace the whole graph, e.g. with edges loaded from storage.
    pub fn restore(&self, edges: Vec<TransitionEdge>) {
        let mut graph: Graph = HashMap::new();
        for edge in edges {
            graph
                .entry(edge.from.clone())
                .or_default()
                .insert(edge.to.clone(), edge);
        }
        *self.write() = graph;
    }

    /// Drop every edge touching `song`.
    pub fn remove_song(&self, song: &str) -> usize {
        let mut graph = self.write();
        let mut removed = graph.remove(song).map_or(0, |o| o.len());
        for outgoing in graph.values_mut() {
            if outgoing.remove(song).is_some() {
                removed += 1;
            }
        }
        graph.retain(|_, outgoing| !outgoing.is_empty());
        removed
    }

    pub fn clear(&self) {
        self.write().clear();
    }
}
