use std::collections::HashMap;

use crate::constants::{
    CONFIDENCE_THRESHOLD, RATING_DEFAULT, RD_DEFAULT, VOLATILITY_DEFAULT,
};

/// Caller-provided item identifier.
pub type ItemId = i64;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// A pairing: two item IDs to be compared.
pub type Pair = (ItemId, ItemId);

/// The Glicko-2 state of one item: rating, rating deviation, volatility.
///
/// Public scale (rating centred on 1500). This is the only thing the rating
/// math reads or writes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rating {
    pub rating: f64,
    pub rd: f64,
    pub volatility: f64,
}

impl Default for Rating {
    fn default() -> Self {
        Rating {
            rating: RATING_DEFAULT,
            rd: RD_DEFAULT,
            volatility: VOLATILITY_DEFAULT,
        }
    }
}

impl Rating {
    pub fn new(rating: f64, rd: f64, volatility: f64) -> Self {
        Rating { rating, rd, volatility }
    }

    /// RD at or below the confidence threshold.
    pub fn is_ranked(&self) -> bool {
        self.rd <= CONFIDENCE_THRESHOLD
    }
}

/// One game inside a rating period, seen from the player being updated.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MatchResult {
    pub opponent_rating: f64,
    pub opponent_rd: f64,
    /// 1.0 = win, 0.0 = loss, 0.5 = tie.
    pub score: f64,
}

impl MatchResult {
    pub fn against(opponent: &Rating, score: f64) -> Self {
        MatchResult {
            opponent_rating: opponent.rating,
            opponent_rd: opponent.rd,
            score,
        }
    }
}

/// Result of a single comparison as the user answered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Outcome {
    /// `item1` was preferred over `item2`.
    Win,
    Tie,
}

/// Watch/read status of a library entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum WatchStatus {
    Completed,
    Watching,
    OnHold,
    Dropped,
    PlanToWatch,
}

impl WatchStatus {
    /// Only items the user has actually seen (at least partly) take part in ranking.
    pub fn is_rankable(self) -> bool {
        !matches!(self, WatchStatus::PlanToWatch)
    }
}

/// Category an item is ranked within. Items of different types are never paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MediaType {
    Anime,
    Manga,
}

/// Per-item rating state plus the bookkeeping the pairing heuristic reads.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RatingRecord {
    pub id: ItemId,
    pub media_type: MediaType,
    pub status: WatchStatus,
    pub rating: f64,
    pub rd: f64,
    pub volatility: f64,
    pub comparison_count: u32,
    pub total_wins: u32,
    pub total_losses: u32,
    pub total_ties: u32,
    pub last_compared_at: Option<Timestamp>,
    /// Advisory only; nothing in the engine enforces it.
    pub next_comparison_due: Option<Timestamp>,
    pub needs_reranking: bool,
}

impl RatingRecord {
    /// Fresh record at the default rating state.
    pub fn new(id: ItemId, media_type: MediaType, status: WatchStatus) -> Self {
        let initial = Rating::default();
        RatingRecord {
            id,
            media_type,
            status,
            rating: initial.rating,
            rd: initial.rd,
            volatility: initial.volatility,
            comparison_count: 0,
            total_wins: 0,
            total_losses: 0,
            total_ties: 0,
            last_compared_at: None,
            next_comparison_due: None,
            needs_reranking: false,
        }
    }

    pub fn glicko(&self) -> Rating {
        Rating::new(self.rating, self.rd, self.volatility)
    }

    pub fn set_glicko(&mut self, rating: Rating) {
        self.rating = rating.rating;
        self.rd = rating.rd;
        self.volatility = rating.volatility;
    }

    pub fn is_ranked(&self) -> bool {
        self.glicko().is_ranked()
    }

    pub fn to_candidate(&self) -> PairingCandidate {
        PairingCandidate {
            id: self.id,
            rating: self.rating,
            rd: self.rd,
            comparison_count: self.comparison_count,
            last_compared_at: self.last_compared_at,
            needs_reranking: self.needs_reranking,
        }
    }
}

/// The slice of a record the pair selector needs. Read fresh per request.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PairingCandidate {
    pub id: ItemId,
    pub rating: f64,
    pub rd: f64,
    pub comparison_count: u32,
    pub last_compared_at: Option<Timestamp>,
    pub needs_reranking: bool,
}

/// Maps caller IDs to positions in the engine's record vector.
#[derive(Debug, Clone, Default)]
pub(crate) struct IdMap {
    id_to_idx: HashMap<ItemId, usize>,
}

impl IdMap {
    pub fn from_ids(ids: impl IntoIterator<Item = ItemId>) -> Result<Self, ItemId> {
        let mut map = IdMap::default();
        for id in ids {
            map.insert(id)?;
        }
        Ok(map)
    }

    /// Appends `id` at the next index. Returns the id back if it is already present.
    pub fn insert(&mut self, id: ItemId) -> Result<usize, ItemId> {
        let idx = self.id_to_idx.len();
        if self.id_to_idx.contains_key(&id) {
            return Err(id);
        }
        self.id_to_idx.insert(id, idx);
        Ok(idx)
    }

    pub fn get(&self, id: ItemId) -> Option<usize> {
        self.id_to_idx.get(&id).copied()
    }

    /// Rebuilds the index after positions shifted (e.g. a removal).
    pub fn rebuild(&mut self, ids: impl IntoIterator<Item = ItemId>) {
        self.id_to_idx = ids.into_iter().enumerate().map(|(idx, id)| (id, idx)).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_has_defaults() {
        let record = RatingRecord::new(7, MediaType::Anime, WatchStatus::Completed);
        assert_eq!(record.glicko(), Rating::new(1500.0, 350.0, 0.06));
        assert!(!record.is_ranked());
        assert_eq!(record.comparison_count, 0);
        assert!(record.last_compared_at.is_none());
    }

    #[test]
    fn test_plan_to_watch_is_not_rankable() {
        assert!(!WatchStatus::PlanToWatch.is_rankable());
        assert!(WatchStatus::Dropped.is_rankable());
        assert!(WatchStatus::OnHold.is_rankable());
    }

    #[test]
    fn test_id_map_rejects_duplicates() {
        assert_eq!(IdMap::from_ids([1, 2, 1]).err(), Some(1));
        let map = IdMap::from_ids([10, 20]).unwrap();
        assert_eq!(map.get(20), Some(1));
        assert_eq!(map.get(30), None);
    }
}
