/// rankwise-core: Pure-computation ranking engine for a personal media library.
///
/// Pairwise "which did you like more?" answers → Glicko-2 ratings → ranked list
/// with an uncertainty per item. No IO, no clock, no filesystem. Callers pass
/// timestamps in and persist `LibraryState` however they like.
///
/// Items are identified by caller-provided `i64` IDs.
///
/// # Quick start
///
/// ```rust
/// use rankwise_core::{EngineConfig, MediaType, RankingEngine, WatchStatus};
///
/// let mut engine = RankingEngine::new(EngineConfig::default());
/// for id in [100, 200, 300] {
///     engine.add_item(id, MediaType::Anime, WatchStatus::Completed).unwrap();
/// }
///
/// let now = 1_700_000_000_000; // epoch millis
/// if let Some((a, b)) = engine.next_pair(MediaType::Anime, &[]) {
///     engine.record_comparison(a, b, now).unwrap();
/// }
///
/// for r in engine.percentile_rankings(MediaType::Anime) {
///     println!("#{} item {}: {:.0} ± {:.0} ({}/10)", r.rank, r.id, r.rating, r.rd, r.percentile_score);
/// }
/// ```

pub mod constants;
pub mod engine;
pub mod error;
pub mod glicko2;
pub mod history;
pub mod pairing;
pub mod stats;
pub mod types;

// Re-export primary public API at crate root.
pub use engine::{
    DecayPacing, DueComparisons, EngineConfig, LibraryState, PairingOverview, PairingSummary,
    PercentileRank, RankingEngine, RankingStats,
};
pub use error::{LibraryError, RatingError};
pub use glicko2::{predict_outcome, process_comparison, process_tie, update_rating};
pub use history::{ComparisonEntry, ComparisonReceipt};
pub use pairing::{select_pair, SelectedPair, Strategy};
pub use stats::ActivitySnapshot;
pub use types::{
    ItemId, MatchResult, MediaType, Outcome, Pair, PairingCandidate, Rating, RatingRecord,
    Timestamp, WatchStatus,
};
