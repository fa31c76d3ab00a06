/// Comparison log, per-pair history and undo receipts.
use std::collections::HashMap;

use crate::constants::{COMPARISON_RETENTION_DAYS, DAY_MS};
use crate::types::{ItemId, Outcome, Pair, Rating, RatingRecord, Timestamp};

/// One row of the comparison log. For ties `winner`/`loser` are just the two items in input order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComparisonEntry {
    pub id: u64,
    pub winner: ItemId,
    pub loser: ItemId,
    pub is_tie: bool,
    pub created_at: Timestamp,
}

/// How often a specific pair has met.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PairHistory {
    pub comparison_count: u32,
    pub last_compared_at: Timestamp,
}

/// Everything needed to put one item back the way it was before a comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecordSnapshot {
    pub id: ItemId,
    pub rating: Rating,
    pub comparison_count: u32,
    pub total_wins: u32,
    pub total_losses: u32,
    pub total_ties: u32,
}

impl RecordSnapshot {
    pub fn capture(record: &RatingRecord) -> Self {
        RecordSnapshot {
            id: record.id,
            rating: record.glicko(),
            comparison_count: record.comparison_count,
            total_wins: record.total_wins,
            total_losses: record.total_losses,
            total_ties: record.total_ties,
        }
    }

    /// Restores rating state and tallies. Scheduling fields are left alone.
    pub fn restore(&self, record: &mut RatingRecord) {
        record.set_glicko(self.rating);
        record.comparison_count = self.comparison_count;
        record.total_wins = self.total_wins;
        record.total_losses = self.total_losses;
        record.total_ties = self.total_ties;
    }
}

/// Returned by a recorded comparison; hand it back to `undo` to revert it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComparisonReceipt {
    pub comparison_id: u64,
    pub outcome: Outcome,
    /// Winner for decided comparisons.
    pub item1: RecordSnapshot,
    pub item2: RecordSnapshot,
    pub item1_after: Rating,
    pub item2_after: Rating,
}

/// Append-only (modulo undo and archival) log plus pair-level counters.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComparisonLog {
    entries: Vec<ComparisonEntry>,
    next_id: u64,
    #[cfg_attr(feature = "serde", serde(with = "pair_map"))]
    pairs: HashMap<Pair, PairHistory>,
}

/// Pairs are stored smallest ID first so lookups don't depend on argument order.
pub fn ordered_pair(a: ItemId, b: ItemId) -> Pair {
    if a < b { (a, b) } else { (b, a) }
}

impl ComparisonLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry and bumps the pair counter. Returns the new entry's ID.
    pub fn append(&mut self, winner: ItemId, loser: ItemId, is_tie: bool, now: Timestamp) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(ComparisonEntry {
            id,
            winner,
            loser,
            is_tie,
            created_at: now,
        });

        let history = self
            .pairs
            .entry(ordered_pair(winner, loser))
            .or_insert(PairHistory { comparison_count: 0, last_compared_at: now });
        history.comparison_count += 1;
        history.last_compared_at = now;

        id
    }

    /// Removes an entry by ID and decrements its pair counter (dropping it at zero).
    pub fn remove(&mut self, id: u64) -> Option<ComparisonEntry> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        let entry = self.entries.remove(pos);

        let key = ordered_pair(entry.winner, entry.loser);
        if let Some(history) = self.pairs.get_mut(&key) {
            if history.comparison_count <= 1 {
                self.pairs.remove(&key);
            } else {
                history.comparison_count -= 1;
            }
        }
        Some(entry)
    }

    pub fn get(&self, id: u64) -> Option<&ComparisonEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> impl Iterator<Item = &ComparisonEntry> {
        self.entries.iter().rev().take(limit)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tie_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_tie).count()
    }

    pub fn pair_history(&self, a: ItemId, b: ItemId) -> Option<&PairHistory> {
        self.pairs.get(&ordered_pair(a, b))
    }

    /// Drops pair counters involving a removed item. Log rows are kept.
    pub fn forget_item(&mut self, id: ItemId) {
        self.pairs.retain(|&(a, b), _| a != id && b != id);
    }

    /// Deletes entries older than the retention window. Returns how many went.
    pub fn archive(&mut self, now: Timestamp) -> usize {
        let cutoff = now - COMPARISON_RETENTION_DAYS * DAY_MS;
        let before = self.entries.len();
        self.entries.retain(|e| e.created_at >= cutoff);
        before - self.entries.len()
    }
}

/// JSON object keys must be strings, so the pair map round-trips as a list.
#[cfg(feature = "serde")]
mod pair_map {
    use std::collections::HashMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::PairHistory;
    use crate::types::Pair;

    #[derive(Serialize, Deserialize)]
    struct Row {
        pair: Pair,
        #[serde(flatten)]
        history: PairHistory,
    }

    pub fn serialize<S: Serializer>(map: &HashMap<Pair, PairHistory>, serializer: S) -> Result<S::Ok, S::Error> {
        let mut rows: Vec<Row> = map.iter().map(|(&pair, &history)| Row { pair, history }).collect();
        rows.sort_by_key(|r| r.pair);
        rows.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<HashMap<Pair, PairHistory>, D::Error> {
        let rows = Vec::<Row>::deserialize(deserializer)?;
        Ok(rows.into_iter().map(|r| (r.pair, r.history)).collect())
    }
}
