/// Ranking engine orchestrator.
///
/// Owns one library's rating records, comparison log and activity stats, and
/// wires them to the pure rating math and pair selector: read records, call
/// `glicko2`, write results back, log. No IO: persistence is the caller's job
/// (see `LibraryState`).
///
/// Items are identified by caller-provided `i64` IDs.
use rand::Rng;
use tracing::{debug, info, warn};

use crate::constants::{
    COMPARISON_RESURFACE_DAYS_ESTABLISHED, COMPARISON_RESURFACE_DAYS_NEW, CONFIDENCE_THRESHOLD,
    DAY_MS, RD_DECAY_PER_DAY, UNDO_HISTORY_LIMIT, UNRANKED_NOTIFICATION_THRESHOLD,
};
use crate::error::LibraryError;
use crate::glicko2;
use crate::history::{ComparisonEntry, ComparisonLog, ComparisonReceipt, RecordSnapshot};
use crate::pairing::{select_pair_with_rng, Strategy};
use crate::stats::{ActivitySnapshot, ActivityStats};
use crate::types::{
    IdMap, ItemId, MediaType, Outcome, Pair, PairingCandidate, Rating, RatingRecord, Timestamp,
    WatchStatus,
};

/// How the decay job grows RD for idle items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DecayPacing {
    /// `RD_DECAY_PER_DAY` public points per idle day, added in quadrature.
    #[default]
    Fixed,
    /// The item's own volatility, as in a Glicko-2 empty rating period.
    Volatility,
}

/// Configuration for the ranking engine.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    pub decay_pacing: DecayPacing,
}

/// Everything that must be persisted between runs.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LibraryState {
    pub records: Vec<RatingRecord>,
    pub log: ComparisonLog,
    pub activity: ActivityStats,
    /// Most recent last.
    pub undo_stack: Vec<ComparisonReceipt>,
}

/// Counts shown next to a pairing request.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PairingSummary {
    pub total_items: usize,
    pub items_needing_reranking: usize,
    pub unranked_items: usize,
    pub average_comparisons: u32,
}

/// A pair to present plus the summary of the pool it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PairingOverview {
    pub pair: Option<Pair>,
    pub strategy: Option<Strategy>,
    pub summary: PairingSummary,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RankingStats {
    pub total_items: usize,
    pub total_comparisons: usize,
    pub total_ties: usize,
    pub items_needing_reranking: usize,
    pub unranked_items: usize,
    pub average_comparisons: u32,
    /// Enough unranked items piled up that the user should be nudged.
    pub needs_attention: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DueComparisons {
    pub due_count: usize,
    pub needs_reranking: usize,
    pub scheduled: usize,
    pub unranked_items: usize,
}

impl DueComparisons {
    pub fn has_due(&self) -> bool {
        self.due_count > 0
    }
}

/// A record's place in its category.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PercentileRank {
    pub id: ItemId,
    /// 1-based, highest rating first.
    pub rank: usize,
    /// 0.0–10.0, one decimal.
    pub percentile_score: f64,
    pub rating: f64,
    pub rd: f64,
    pub total_in_type: usize,
}

pub struct RankingEngine {
    /// Maps caller i64 IDs to positions in `state.records`.
    id_map: IdMap,
    state: LibraryState,
    config: EngineConfig,
}

impl RankingEngine {
    pub fn new(config: EngineConfig) -> Self {
        RankingEngine {
            id_map: IdMap::default(),
            state: LibraryState::default(),
            config,
        }
    }

    /// Rebuild an engine from persisted state. Fails on duplicate IDs.
    pub fn from_state(state: LibraryState, config: EngineConfig) -> Result<Self, LibraryError> {
        let id_map = IdMap::from_ids(state.records.iter().map(|r| r.id))
            .map_err(LibraryError::DuplicateItem)?;
        Ok(RankingEngine { id_map, state, config })
    }

    pub fn from_records(records: Vec<RatingRecord>, config: EngineConfig) -> Result<Self, LibraryError> {
        Self::from_state(LibraryState { records, ..LibraryState::default() }, config)
    }

    pub fn state(&self) -> &LibraryState {
        &self.state
    }

    pub fn into_state(self) -> LibraryState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Library membership
    // -----------------------------------------------------------------------

    /// Add a new item at the default rating state.
    pub fn add_item(&mut self, id: ItemId, media_type: MediaType, status: WatchStatus) -> Result<&RatingRecord, LibraryError> {
        self.insert_record(RatingRecord::new(id, media_type, status))
    }

    /// Add an item with existing rating state (e.g. restored from elsewhere).
    pub fn insert_record(&mut self, record: RatingRecord) -> Result<&RatingRecord, LibraryError> {
        let idx = self.id_map.insert(record.id).map_err(LibraryError::DuplicateItem)?;
        debug!(id = record.id, media_type = ?record.media_type, "added item");
        self.state.records.push(record);
        Ok(&self.state.records[idx])
    }

    /// Remove an item. Its log rows stay; its pair counters and undo receipts go.
    pub fn remove_item(&mut self, id: ItemId) -> Result<RatingRecord, LibraryError> {
        let idx = self.index_of(id)?;
        let record = self.state.records.remove(idx);
        self.id_map.rebuild(self.state.records.iter().map(|r| r.id));
        self.state.log.forget_item(id);
        self.state
            .undo_stack
            .retain(|r| r.item1.id != id && r.item2.id != id);
        debug!(id, "removed item");
        Ok(record)
    }

    pub fn get(&self, id: ItemId) -> Option<&RatingRecord> {
        self.id_map.get(id).map(|idx| &self.state.records[idx])
    }

    pub fn records(&self) -> &[RatingRecord] {
        &self.state.records
    }

    pub fn len(&self) -> usize {
        self.state.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.records.is_empty()
    }

    /// Change an item's watch status. A real change flags it for re-ranking.
    /// Returns whether the status changed.
    pub fn set_status(&mut self, id: ItemId, status: WatchStatus) -> Result<bool, LibraryError> {
        let idx = self.index_of(id)?;
        let record = &mut self.state.records[idx];
        if record.status == status {
            return Ok(false);
        }
        debug!(id, from = ?record.status, to = ?status, "status changed, flagging for re-ranking");
        record.status = status;
        record.needs_reranking = true;
        Ok(true)
    }

    pub fn mark_needs_reranking(&mut self, id: ItemId) -> Result<(), LibraryError> {
        let idx = self.index_of(id)?;
        self.state.records[idx].needs_reranking = true;
        Ok(())
    }

    fn index_of(&self, id: ItemId) -> Result<usize, LibraryError> {
        self.id_map.get(id).ok_or(LibraryError::UnknownItem(id))
    }

    fn of_type(&self, media_type: MediaType) -> impl Iterator<Item = &RatingRecord> {
        self.state
            .records
            .iter()
            .filter(move |r| r.media_type == media_type)
    }

    // -----------------------------------------------------------------------
    // Pairing
    // -----------------------------------------------------------------------

    /// Pairing snapshots of every rankable item of one type, in library order.
    pub fn candidates(&self, media_type: MediaType) -> Vec<PairingCandidate> {
        self.of_type(media_type)
            .filter(|r| r.status.is_rankable())
            .map(RatingRecord::to_candidate)
            .collect()
    }

    /// Next pair to show, or `None` when nothing eligible is left.
    pub fn next_pair(&self, media_type: MediaType, skipped: &[Pair]) -> Option<Pair> {
        self.next_pair_with_rng(media_type, skipped, &mut rand::rng())
            .map(|(pair, _)| pair)
    }

    pub fn next_pair_with_rng(
        &self,
        media_type: MediaType,
        skipped: &[Pair],
        rng: &mut impl Rng,
    ) -> Option<(Pair, Strategy)> {
        let candidates = self.candidates(media_type);
        select_pair_with_rng(&candidates, skipped, rng).map(|s| (s.ids(), s.strategy))
    }

    /// `next_pair` together with counts over the same candidate pool.
    pub fn pair_with_stats(&self, media_type: MediaType, skipped: &[Pair]) -> PairingOverview {
        let candidates = self.candidates(media_type);
        let selected = select_pair_with_rng(&candidates, skipped, &mut rand::rng());

        let summary = PairingSummary {
            total_items: candidates.len(),
            items_needing_reranking: candidates.iter().filter(|c| c.needs_reranking).count(),
            unranked_items: candidates.iter().filter(|c| c.rd > CONFIDENCE_THRESHOLD).count(),
            average_comparisons: average_comparisons(candidates.iter().map(|c| c.comparison_count)),
        };

        PairingOverview {
            pair: selected.map(|s| s.ids()),
            strategy: selected.map(|s| s.strategy),
            summary,
        }
    }

    // -----------------------------------------------------------------------
    // Comparisons
    // -----------------------------------------------------------------------

    /// Record that `winner` was preferred over `loser`.
    pub fn record_comparison(&mut self, winner: ItemId, loser: ItemId, now: Timestamp) -> Result<ComparisonReceipt, LibraryError> {
        self.apply_outcome(winner, loser, Outcome::Win, now)
    }

    /// Record that the user couldn't choose between `a` and `b`.
    pub fn record_tie(&mut self, a: ItemId, b: ItemId, now: Timestamp) -> Result<ComparisonReceipt, LibraryError> {
        self.apply_outcome(a, b, Outcome::Tie, now)
    }

    fn apply_outcome(&mut self, item1: ItemId, item2: ItemId, outcome: Outcome, now: Timestamp) -> Result<ComparisonReceipt, LibraryError> {
        if item1 == item2 {
            return Err(LibraryError::SelfComparison(item1));
        }
        let idx1 = self.index_of(item1)?;
        let idx2 = self.index_of(item2)?;

        let before1 = RecordSnapshot::capture(&self.state.records[idx1]);
        let before2 = RecordSnapshot::capture(&self.state.records[idx2]);

        // Everything that can fail happens before the first write.
        let (after1, after2) = match outcome {
            Outcome::Win => glicko2::process_comparison(&before1.rating, &before2.rating)?,
            Outcome::Tie => glicko2::process_tie(&before1.rating, &before2.rating)?,
        };

        let (tally1, tally2) = match outcome {
            Outcome::Win => (Tally::Win, Tally::Loss),
            Outcome::Tie => (Tally::Tie, Tally::Tie),
        };
        apply_result(&mut self.state.records[idx1], after1, tally1, now);
        apply_result(&mut self.state.records[idx2], after2, tally2, now);

        let is_tie = outcome == Outcome::Tie;
        let comparison_id = self.state.log.append(item1, item2, is_tie, now);
        self.state.activity.record_comparison(is_tie, now);

        debug!(
            comparison_id,
            item1,
            item2,
            ?outcome,
            rating1 = after1.rating,
            rating2 = after2.rating,
            "recorded comparison"
        );

        let receipt = ComparisonReceipt {
            comparison_id,
            outcome,
            item1: before1,
            item2: before2,
            item1_after: after1,
            item2_after: after2,
        };

        self.state.undo_stack.push(receipt.clone());
        if self.state.undo_stack.len() > UNDO_HISTORY_LIMIT {
            let excess = self.state.undo_stack.len() - UNDO_HISTORY_LIMIT;
            self.state.undo_stack.drain(..excess);
        }

        Ok(receipt)
    }

    /// Revert a recorded comparison: restore both items' rating state and
    /// tallies, delete the log row and roll back activity totals.
    ///
    /// Only the latest comparison of each item can be undone; a receipt that
    /// later comparisons built on is rejected with `StaleReceipt`.
    pub fn undo(&mut self, receipt: &ComparisonReceipt) -> Result<(), LibraryError> {
        let created_at = self
            .state
            .log
            .get(receipt.comparison_id)
            .map(|e| e.created_at)
            .ok_or(LibraryError::UnknownComparison(receipt.comparison_id))?;
        let idx1 = self.index_of(receipt.item1.id)?;
        let idx2 = self.index_of(receipt.item2.id)?;

        let records = &self.state.records;
        if !is_latest(&records[idx1], &receipt.item1, &receipt.item1_after)
            || !is_latest(&records[idx2], &receipt.item2, &receipt.item2_after)
        {
            return Err(LibraryError::StaleReceipt(receipt.comparison_id));
        }

        receipt.item1.restore(&mut self.state.records[idx1]);
        receipt.item2.restore(&mut self.state.records[idx2]);

        if let Some(entry) = self.state.log.remove(receipt.comparison_id) {
            self.state.activity.revert_comparison(entry.is_tie, created_at);
        }
        self.state
            .undo_stack
            .retain(|r| r.comparison_id != receipt.comparison_id);

        debug!(comparison_id = receipt.comparison_id, "undid comparison");
        Ok(())
    }

    /// Undo the most recent comparison that still has a receipt.
    pub fn undo_last(&mut self) -> Result<ComparisonReceipt, LibraryError> {
        let receipt = self
            .state
            .undo_stack
            .last()
            .cloned()
            .ok_or(LibraryError::NothingToUndo)?;
        self.undo(&receipt)?;
        Ok(receipt)
    }

    /// Probability that `a` is preferred over `b` given current ratings.
    pub fn predict(&self, a: ItemId, b: ItemId) -> Result<f64, LibraryError> {
        let a = self.index_of(a)?;
        let b = self.index_of(b)?;
        Ok(glicko2::predict_outcome(
            &self.state.records[a].glicko(),
            &self.state.records[b].glicko(),
        ))
    }

    // -----------------------------------------------------------------------
    // Periodic jobs
    // -----------------------------------------------------------------------

    /// Grow RD for every item not compared in the last day. One period per call;
    /// meant to run once a day. Returns how many records changed.
    pub fn decay_ratings(&mut self, now: Timestamp) -> usize {
        let one_day_ago = now - DAY_MS;
        let pacing = self.config.decay_pacing;
        let mut decayed = 0;

        for record in &mut self.state.records {
            if record.last_compared_at.is_some_and(|t| t > one_day_ago) {
                continue;
            }

            let current = record.glicko();
            let next = match pacing {
                DecayPacing::Fixed => glicko2::apply_rd_decay_with_step(&current, 1, RD_DECAY_PER_DAY),
                DecayPacing::Volatility => glicko2::apply_rd_decay(&current, 1),
            };

            match next {
                Ok(next) if next.rd > record.rd => {
                    record.rd = next.rd;
                    decayed += 1;
                }
                Ok(_) => {}
                Err(e) => warn!(id = record.id, error = %e, "skipping decay for invalid record"),
            }
        }

        info!(decayed, ?pacing, "decayed rating deviations for items not compared recently");
        decayed
    }

    /// Drop log rows past the retention window. Returns how many were removed.
    pub fn archive_comparisons(&mut self, now: Timestamp) -> usize {
        let archived = self.state.log.archive(now);
        info!(archived, "archived old comparisons");
        archived
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Newest first.
    pub fn history(&self, limit: usize) -> Vec<&ComparisonEntry> {
        self.state.log.recent(limit).collect()
    }

    pub fn activity(&self, now: Timestamp) -> ActivitySnapshot {
        self.state.activity.snapshot(now)
    }

    /// Library-wide or per-type counts. Comparison totals always cover the whole log.
    pub fn ranking_stats(&self, media_type: Option<MediaType>) -> RankingStats {
        let items: Vec<&RatingRecord> = self
            .state
            .records
            .iter()
            .filter(|r| media_type.map_or(true, |t| r.media_type == t))
            .collect();
        let unranked_items = items.iter().filter(|r| !r.is_ranked()).count();

        RankingStats {
            total_items: items.len(),
            total_comparisons: self.state.log.len(),
            total_ties: self.state.log.tie_count(),
            items_needing_reranking: items.iter().filter(|r| r.needs_reranking).count(),
            unranked_items,
            average_comparisons: average_comparisons(items.iter().map(|r| r.comparison_count)),
            needs_attention: unranked_items >= UNRANKED_NOTIFICATION_THRESHOLD,
        }
    }

    /// Items that want attention: flagged, past their resurface time, or unranked.
    pub fn due_comparisons(&self, now: Timestamp) -> DueComparisons {
        let is_scheduled = |r: &RatingRecord| r.next_comparison_due.is_some_and(|t| t < now);
        let due: Vec<&RatingRecord> = self
            .state
            .records
            .iter()
            .filter(|r| r.needs_reranking || is_scheduled(r) || !r.is_ranked())
            .collect();

        DueComparisons {
            due_count: due.len(),
            needs_reranking: due.iter().filter(|r| r.needs_reranking).count(),
            scheduled: due.iter().filter(|r| is_scheduled(r)).count(),
            unranked_items: due.iter().filter(|r| !r.is_ranked()).count(),
        }
    }

    /// Ranked items of one type, highest rating first.
    pub fn ranked_items(&self, media_type: MediaType) -> Vec<&RatingRecord> {
        let mut items: Vec<&RatingRecord> = self.of_type(media_type).filter(|r| r.is_ranked()).collect();
        items.sort_by(|a, b| b.rating.total_cmp(&a.rating));
        items
    }

    pub fn ranked_count(&self, media_type: MediaType) -> usize {
        self.of_type(media_type).filter(|r| r.is_ranked()).count()
    }

    /// Unranked items of one type, most uncertain first.
    pub fn unranked_items(&self, media_type: MediaType) -> Vec<&RatingRecord> {
        let mut items: Vec<&RatingRecord> = self.of_type(media_type).filter(|r| !r.is_ranked()).collect();
        items.sort_by(|a, b| b.rd.total_cmp(&a.rd));
        items
    }

    /// Every item of one type with its rank and a 0–10 percentile score.
    pub fn percentile_rankings(&self, media_type: MediaType) -> Vec<PercentileRank> {
        let mut items: Vec<&RatingRecord> = self.of_type(media_type).collect();
        items.sort_by(|a, b| b.rating.total_cmp(&a.rating));
        let total = items.len();

        items
            .into_iter()
            .enumerate()
            .map(|(i, r)| {
                let rank = i + 1;
                let percentile = if total > 1 {
                    (total - rank) as f64 / (total - 1) as f64 * 100.0
                } else {
                    50.0
                };
                PercentileRank {
                    id: r.id,
                    rank,
                    percentile_score: percentile.round() / 10.0,
                    rating: r.rating,
                    rd: r.rd,
                    total_in_type: total,
                }
            })
            .collect()
    }
}

#[derive(Clone, Copy)]
enum Tally {
    Win,
    Loss,
    Tie,
}

fn apply_result(record: &mut RatingRecord, rating: Rating, tally: Tally, now: Timestamp) {
    record.set_glicko(rating);
    record.comparison_count += 1;
    match tally {
        Tally::Win => record.total_wins += 1,
        Tally::Loss => record.total_losses += 1,
        Tally::Tie => record.total_ties += 1,
    }
    record.last_compared_at = Some(now);
    record.next_comparison_due = Some(next_comparison_due(rating.rd, now));
    record.needs_reranking = false;
}

/// Whether `record` still holds exactly what the receipt's comparison wrote.
/// RD is not compared: the decay job may have grown it since.
fn is_latest(record: &RatingRecord, before: &RecordSnapshot, after: &Rating) -> bool {
    record.comparison_count == before.comparison_count + 1
        && record.rating == after.rating
        && record.volatility == after.volatility
}

/// Unranked items resurface sooner than established ones.
pub fn next_comparison_due(rd: f64, now: Timestamp) -> Timestamp {
    let days = if rd > CONFIDENCE_THRESHOLD {
        COMPARISON_RESURFACE_DAYS_NEW
    } else {
        COMPARISON_RESURFACE_DAYS_ESTABLISHED
    };
    now + days * DAY_MS
}

fn average_comparisons(counts: impl Iterator<Item = u32>) -> u32 {
    let (sum, n) = counts.fold((0u64, 0u64), |(sum, n), c| (sum + c as u64, n + 1));
    if n == 0 {
        0
    } else {
        (sum as f64 / n as f64).round() as u32
    }
}
