/// Adaptive pair selection.
///
/// Given a snapshot of eligible candidates and the pairs the user already
/// skipped this session, pick the single most useful comparison to show next.
/// Strategies are tried in order; the first one that yields a non-skipped pair wins.
use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::constants::{CLOSE_RATING_RANGE, CONFIDENCE_THRESHOLD};
use crate::types::{ItemId, Pair, PairingCandidate};

/// Which rule produced a selected pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Strategy {
    /// An item flagged for re-ranking (e.g. after a status change).
    ForcedReranking,
    /// Binary-search placement of an unranked item.
    LowConfidence,
    /// Sharpening an established item against a similarly rated one.
    CloseRating,
    /// Nothing else applied.
    Random,
}

/// A pair chosen by `select_pair`, borrowed from the input snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectedPair<'a> {
    pub first: &'a PairingCandidate,
    pub second: &'a PairingCandidate,
    pub strategy: Strategy,
}

impl SelectedPair<'_> {
    pub fn ids(&self) -> Pair {
        (self.first.id, self.second.id)
    }
}

/// Order-independent set of pairs the user declined to compare.
pub struct SkipList {
    pairs: HashSet<Pair>,
}

impl SkipList {
    pub fn new(skipped: &[Pair]) -> Self {
        SkipList {
            pairs: skipped.iter().map(|&(a, b)| normalize(a, b)).collect(),
        }
    }

    /// True if `(a, b)` or `(b, a)` was skipped.
    pub fn contains(&self, a: ItemId, b: ItemId) -> bool {
        self.pairs.contains(&normalize(a, b))
    }
}

fn normalize(a: ItemId, b: ItemId) -> Pair {
    if a <= b { (a, b) } else { (b, a) }
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Select the next pair using the thread-local RNG for the random fallback.
pub fn select_pair<'a>(
    candidates: &'a [PairingCandidate],
    skipped: &[Pair],
) -> Option<SelectedPair<'a>> {
    select_pair_with_rng(candidates, skipped, &mut rand::rng())
}

/// Select the next pair. `rng` is only consulted by the random fallback.
///
/// Returns `None` with fewer than two candidates or when every possible
/// pair has been skipped.
pub fn select_pair_with_rng<'a>(
    candidates: &'a [PairingCandidate],
    skipped: &[Pair],
    rng: &mut impl Rng,
) -> Option<SelectedPair<'a>> {
    if candidates.len() < 2 {
        return None;
    }

    let skip = SkipList::new(skipped);
    let by_rating = sorted_by_rating(candidates);

    let selected = forced_reranking(candidates, &by_rating, &skip)
        .or_else(|| low_confidence(candidates, &by_rating, &skip))
        .or_else(|| close_rating(candidates, &skip))
        .or_else(|| random_fallback(candidates, &skip, rng));

    match &selected {
        Some(pair) => debug!(
            first = pair.first.id,
            second = pair.second.id,
            strategy = ?pair.strategy,
            "selected pair"
        ),
        None => debug!(candidates = candidates.len(), "no eligible pair left"),
    }
    selected
}

// ---------------------------------------------------------------------------
// Strategies, in priority order
// ---------------------------------------------------------------------------

fn forced_reranking<'a>(
    candidates: &'a [PairingCandidate],
    by_rating: &[&'a PairingCandidate],
    skip: &SkipList,
) -> Option<SelectedPair<'a>> {
    candidates
        .iter()
        .filter(|c| c.needs_reranking)
        .find_map(|primary| {
            let opponent = if primary.rd > CONFIDENCE_THRESHOLD {
                binary_search_opponent(primary, by_rating)
            } else {
                close_rating_opponent(primary, candidates.iter())
            }?;
            accept(primary, opponent, skip, Strategy::ForcedReranking)
        })
}

fn low_confidence<'a>(
    candidates: &'a [PairingCandidate],
    by_rating: &[&'a PairingCandidate],
    skip: &SkipList,
) -> Option<SelectedPair<'a>> {
    let mut uncertain: Vec<&PairingCandidate> = candidates
        .iter()
        .filter(|c| c.rd > CONFIDENCE_THRESHOLD)
        .collect();
    uncertain.sort_by(|a, b| b.rd.total_cmp(&a.rd));

    uncertain.into_iter().find_map(|primary| {
        let opponent = binary_search_opponent(primary, by_rating)?;
        accept(primary, opponent, skip, Strategy::LowConfidence)
    })
}

fn close_rating<'a>(
    candidates: &'a [PairingCandidate],
    skip: &SkipList,
) -> Option<SelectedPair<'a>> {
    let mut established: Vec<&PairingCandidate> = candidates
        .iter()
        .filter(|c| c.rd <= CONFIDENCE_THRESHOLD)
        .collect();
    if established.len() < 2 {
        return None;
    }

    let pool = established.clone();
    established.sort_by_key(|c| staleness_key(c));

    established.into_iter().find_map(|primary| {
        let opponent = close_rating_opponent(primary, pool.iter().copied())?;
        accept(primary, opponent, skip, Strategy::CloseRating)
    })
}

fn random_fallback<'a>(
    candidates: &'a [PairingCandidate],
    skip: &SkipList,
    rng: &mut impl Rng,
) -> Option<SelectedPair<'a>> {
    let mut shuffled: Vec<&PairingCandidate> = candidates.iter().collect();
    shuffled.shuffle(rng);

    for i in 0..shuffled.len() {
        for j in (i + 1)..shuffled.len() {
            if let Some(pair) = accept(shuffled[i], shuffled[j], skip, Strategy::Random) {
                return Some(pair);
            }
        }
    }
    None
}

fn accept<'a>(
    first: &'a PairingCandidate,
    second: &'a PairingCandidate,
    skip: &SkipList,
    strategy: Strategy,
) -> Option<SelectedPair<'a>> {
    if skip.contains(first.id, second.id) {
        None
    } else {
        Some(SelectedPair { first, second, strategy })
    }
}

// ---------------------------------------------------------------------------
// Opponent selection
// ---------------------------------------------------------------------------

/// Candidates sorted by rating, highest first. Stable, so equal ratings keep input order.
fn sorted_by_rating(candidates: &[PairingCandidate]) -> Vec<&PairingCandidate> {
    let mut sorted: Vec<&PairingCandidate> = candidates.iter().collect();
    sorted.sort_by(|a, b| b.rating.total_cmp(&a.rating));
    sorted
}

/// Never-compared items sort as the stalest.
fn staleness_key(candidate: &PairingCandidate) -> i64 {
    candidate.last_compared_at.unwrap_or(0)
}

/// Place an uncertain item by comparing it against progressively narrower
/// percentile brackets of `by_rating` (highest rating first).
pub fn binary_search_opponent<'a>(
    primary: &PairingCandidate,
    by_rating: &[&'a PairingCandidate],
) -> Option<&'a PairingCandidate> {
    let n = by_rating.len();
    if n < 2 {
        return None;
    }

    let target = match primary.comparison_count {
        0 => n / 2,
        1 => {
            let rank = rank_of(primary, by_rating)?;
            // Top half moves toward the 25th percentile, bottom half toward the 75th.
            if 2 * rank < n { n / 4 } else { 3 * n / 4 }
        }
        count => {
            let rank = rank_of(primary, by_rating)?;
            if count % 2 == 0 {
                rank.saturating_sub(n / 4)
            } else {
                (rank + n / 4).min(n - 1)
            }
        }
    };

    let opponent = by_rating[target];
    if opponent.id != primary.id {
        return Some(opponent);
    }
    by_rating
        .get(target + 1)
        .or_else(|| target.checked_sub(1).and_then(|i| by_rating.get(i)))
        .copied()
}

fn rank_of(primary: &PairingCandidate, by_rating: &[&PairingCandidate]) -> Option<usize> {
    by_rating.iter().position(|c| c.id == primary.id)
}

/// Pick a refinement opponent for an established item.
///
/// Among items within `CLOSE_RATING_RANGE` the least recently compared wins;
/// if none are that close, the nearest rating overall (first encountered on ties).
pub fn close_rating_opponent<'a>(
    primary: &PairingCandidate,
    pool: impl Iterator<Item = &'a PairingCandidate>,
) -> Option<&'a PairingCandidate> {
    let others: Vec<&PairingCandidate> = pool.filter(|c| c.id != primary.id).collect();
    let distance = |c: &PairingCandidate| (c.rating - primary.rating).abs();

    let stalest_close = others
        .iter()
        .copied()
        .filter(|&c| distance(c) <= CLOSE_RATING_RANGE)
        .fold(None, |best: Option<&PairingCandidate>, c| match best {
            Some(b) if staleness_key(b) <= staleness_key(c) => Some(b),
            _ => Some(c),
        });
    if stalest_close.is_some() {
        return stalest_close;
    }

    others.into_iter().fold(None, |best, c| match best {
        Some(b) if distance(b) <= distance(c) => Some(b),
        _ => Some(c),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    fn candidate(id: ItemId, rating: f64, rd: f64) -> PairingCandidate {
        PairingCandidate {
            id,
            rating,
            rd,
            comparison_count: 0,
            last_compared_at: None,
            needs_reranking: false,
        }
    }

    fn established(id: ItemId, rating: f64, last: Option<i64>) -> PairingCandidate {
        PairingCandidate {
            last_compared_at: last,
            comparison_count: 10,
            ..candidate(id, rating, 80.0)
        }
    }

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(7)
    }

    #[test]
    fn test_fewer_than_two_candidates() {
        assert!(select_pair(&[], &[]).is_none());
        assert!(select_pair(&[candidate(1, 1500.0, 350.0)], &[]).is_none());
    }

    #[test]
    fn test_exhausted_pair_returns_none() {
        let items = vec![candidate(1, 1500.0, 350.0), candidate(2, 1500.0, 350.0)];
        assert!(select_pair(&items, &[(2, 1)]).is_none());
        assert!(select_pair(&items, &[(1, 2)]).is_none());
    }

    #[test]
    fn test_skip_list_is_order_independent() {
        let skip = SkipList::new(&[(5, 3)]);
        assert!(skip.contains(3, 5));
        assert!(skip.contains(5, 3));
        assert!(!skip.contains(3, 4));
    }

    #[test]
    fn test_binary_search_new_item_targets_middle() {
        // Ten established items rated 1900, 1850, ... 1450, plus the newcomer.
        let mut items: Vec<PairingCandidate> =
            (0..10).map(|i| established(i, 1900.0 - 50.0 * i as f64, Some(1))).collect();
        let newcomer = candidate(100, 1000.0, 350.0);
        let by_rating = sorted_by_rating(&items);

        let opponent = binary_search_opponent(&newcomer, &by_rating).unwrap();
        assert_eq!(opponent.id, 5);

        // When the middle slot is the newcomer itself, the next one down is used.
        items[5] = PairingCandidate { comparison_count: 0, ..candidate(5, 1650.0, 350.0) };
        let by_rating = sorted_by_rating(&items);
        let opponent = binary_search_opponent(&items[5], &by_rating).unwrap();
        assert_eq!(opponent.id, 6);
    }

    #[test]
    fn test_binary_search_second_comparison_jumps_to_quartile() {
        let mut items: Vec<PairingCandidate> =
            (0..8).map(|i| established(i, 2000.0 - 100.0 * i as f64, Some(1))).collect();
        items[1] = PairingCandidate { comparison_count: 1, ..candidate(1, 1900.0, 300.0) };
        items[6] = PairingCandidate { comparison_count: 1, ..candidate(6, 1400.0, 300.0) };
        let by_rating = sorted_by_rating(&items);

        // Rank 1 of 8 is in the top half: target index 2.
        assert_eq!(binary_search_opponent(&items[1], &by_rating).unwrap().id, 2);
        // Rank 6 of 8 is in the bottom half: target index 6 is itself, so 7.
        assert_eq!(binary_search_opponent(&items[6], &by_rating).unwrap().id, 7);
    }

    #[test]
    fn test_binary_search_alternates_direction() {
        let mut items: Vec<PairingCandidate> =
            (0..8).map(|i| established(i, 2000.0 - 100.0 * i as f64, Some(1))).collect();
        items[4] = PairingCandidate { comparison_count: 2, ..candidate(4, 1600.0, 250.0) };
        let by_rating = sorted_by_rating(&items);
        // Even count moves up: 4 - 2.
        assert_eq!(binary_search_opponent(&items[4], &by_rating).unwrap().id, 2);

        items[4].comparison_count = 3;
        let by_rating = sorted_by_rating(&items);
        // Odd count moves down: 4 + 2.
        assert_eq!(binary_search_opponent(&items[4], &by_rating).unwrap().id, 6);

        // Clamped at the bottom; the last slot is itself, so step back one.
        items[7] = PairingCandidate { comparison_count: 5, ..candidate(7, 1300.0, 250.0) };
        let by_rating = sorted_by_rating(&items);
        assert_eq!(binary_search_opponent(&items[7], &by_rating).unwrap().id, 6);
    }

    #[test]
    fn test_close_rating_prefers_stalest_within_range() {
        let items = vec![
            established(1, 1500.0, Some(500)),
            established(2, 1560.0, Some(300)),
            established(3, 1450.0, None),
            established(4, 1700.0, None),
        ];
        let opponent = close_rating_opponent(&items[0], items.iter()).unwrap();
        assert_eq!(opponent.id, 3);
    }

    #[test]
    fn test_close_rating_falls_back_to_nearest() {
        let items = vec![
            established(1, 1500.0, Some(10)),
            established(2, 1750.0, None),
            established(3, 1290.0, None),
            established(4, 1900.0, None),
        ];
        let opponent = close_rating_opponent(&items[0], items.iter()).unwrap();
        assert_eq!(opponent.id, 3);

        // Stalest primary first (item 2, never compared), then its nearest rating.
        let pair = select_pair_with_rng(&items, &[], &mut rng()).unwrap();
        assert_eq!(pair.strategy, Strategy::CloseRating);
        assert_eq!(pair.ids(), (2, 4));
    }

    #[test]
    fn test_forced_reranking_comes_first() {
        let mut items = vec![
            candidate(1, 1500.0, 350.0),
            established(2, 1600.0, Some(5)),
            established(3, 1640.0, Some(9)),
        ];
        items[2].needs_reranking = true;

        let pair = select_pair_with_rng(&items, &[], &mut rng()).unwrap();
        assert_eq!(pair.strategy, Strategy::ForcedReranking);
        assert_eq!(pair.ids(), (3, 2));

        // Skipping that pair lets the flagged item try again, then fall through.
        let pair = select_pair_with_rng(&items, &[(2, 3)], &mut rng()).unwrap();
        assert_eq!(pair.strategy, Strategy::LowConfidence);
        assert_eq!(pair.first.id, 1);
    }

    #[test]
    fn test_low_confidence_most_uncertain_first() {
        let items = vec![
            PairingCandidate { comparison_count: 3, ..candidate(1, 1500.0, 260.0) },
            candidate(2, 1500.0, 340.0),
            established(3, 1700.0, Some(1)),
            established(4, 1300.0, Some(1)),
        ];
        let pair = select_pair_with_rng(&items, &[], &mut rng()).unwrap();
        assert_eq!(pair.strategy, Strategy::LowConfidence);
        assert_eq!(pair.first.id, 2);
    }

    #[test]
    fn test_random_fallback_finds_last_open_pair() {
        // Everything skipped except (2, 3).
        let items = vec![
            established(1, 1500.0, None),
            established(2, 1510.0, None),
            established(3, 1520.0, None),
        ];
        let skipped = vec![(1, 2), (1, 3)];
        for seed in 0..20 {
            let pair = select_pair_with_rng(&items, &skipped, &mut SmallRng::seed_from_u64(seed)).unwrap();
            let (a, b) = pair.ids();
            assert_eq!(normalize(a, b), (2, 3));
        }
    }

    #[test]
    fn test_selection_never_pairs_item_with_itself() {
        let items: Vec<PairingCandidate> = (0..6)
            .map(|i| PairingCandidate {
                comparison_count: i as u32,
                needs_reranking: i == 2,
                ..candidate(i, 1400.0 + 37.0 * i as f64, 150.0 + 40.0 * i as f64)
            })
            .collect();
        let mut skipped = Vec::new();
        while let Some(pair) = select_pair_with_rng(&items, &skipped, &mut rng()) {
            assert_ne!(pair.first.id, pair.second.id);
            skipped.push(pair.ids());
        }
        // Every one of the 15 distinct pairs is eventually offered.
        assert_eq!(skipped.len(), 15);
    }

    #[test]
    fn test_large_library_selects_quickly() {
        let items: Vec<PairingCandidate> = (0..5_000)
            .map(|i| PairingCandidate {
                needs_reranking: i % 500 == 0,
                ..candidate(i, 1000.0 + (i % 997) as f64, 100.0 + (i % 300) as f64)
            })
            .collect();
        let start = std::time::Instant::now();
        assert!(select_pair_with_rng(&items, &[], &mut rng()).is_some());
        assert!(start.elapsed().as_secs() < 5);
    }
}
