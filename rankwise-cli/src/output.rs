/// Output formatting: terminal tables and JSON.
use rankwise_core::engine::{DueComparisons, PairingOverview, PercentileRank, RankingStats};
use rankwise_core::constants::CONFIDENCE_THRESHOLD;
use rankwise_core::{ActivitySnapshot, ComparisonEntry, MediaType, Timestamp};
use serde::Serialize;

use crate::bail;

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

#[derive(Serialize)]
struct JsonRankings<'a> {
    media_type: MediaType,
    items: &'a [PercentileRank],
}

/// Everything `rankwise stats` reports.
#[derive(Serialize)]
pub struct StatsReport {
    pub media_type: Option<MediaType>,
    pub ranking: RankingStats,
    pub due: DueComparisons,
    pub activity: ActivitySnapshot,
    pub ranked_anime: usize,
    pub ranked_manga: usize,
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| bail(format!("Failed to serialize output: {e}")));
    println!("{json}");
}

/// Print a ranking as a formatted terminal table.
pub fn print_rankings_table(ranks: &[PercentileRank], media_type: MediaType) {
    if ranks.is_empty() {
        println!("No {} in the library yet.", media_label(media_type));
        return;
    }

    let id_width = ranks
        .iter()
        .map(|r| r.id.to_string().len())
        .max()
        .unwrap_or(4)
        .max(4); // at least "Item"

    println!("  # | {:<id_width$} | Rating |  RD | Score | ", "Item");
    println!("----|-{}-|--------|-----|-------|---------", "-".repeat(id_width));

    for r in ranks {
        let marker = if is_ranked(r) { "" } else { "unranked" };
        println!(
            "{:>3} | {:<id_width$} | {:>6.0} | {:>3.0} | {:>5.1} | {}",
            r.rank, r.id, r.rating, r.rd, r.percentile_score, marker,
        );
    }

    println!("\n{}", rankings_footer(ranks, media_type));
}

fn is_ranked(rank: &PercentileRank) -> bool {
    rank.rd <= CONFIDENCE_THRESHOLD
}

fn rankings_footer(ranks: &[PercentileRank], media_type: MediaType) -> String {
    let ranked = ranks.iter().filter(|r| is_ranked(r)).count();
    format!("{} {} listed, {} ranked", ranks.len(), media_label(media_type), ranked)
}

pub fn print_rankings_json(ranks: &[PercentileRank], media_type: MediaType) {
    print_json(&JsonRankings { media_type, items: ranks });
}

pub fn print_pair(overview: &PairingOverview) {
    let summary = &overview.summary;
    match overview.pair {
        Some((a, b)) => {
            println!("Which do you prefer?");
            println!("  {a}");
            println!("  {b}");
            println!();
            println!("Answer with `rankwise compare <winner> <loser>` or `rankwise tie {a} {b}`.");
        }
        None => println!("No pair left to compare."),
    }
    println!(
        "\n{} items, {} unranked, {} need re-ranking, {} comparisons on average",
        summary.total_items, summary.unranked_items, summary.items_needing_reranking, summary.average_comparisons,
    );
}

pub fn print_stats_table(report: &StatsReport) {
    let ranking = &report.ranking;
    let activity = &report.activity;
    let scope = report.media_type.map_or("all media", media_label);

    println!("Library ({scope})");
    println!("  items:               {}", ranking.total_items);
    println!("  ranked:              anime {}, manga {}", report.ranked_anime, report.ranked_manga);
    println!("  unranked:            {}", ranking.unranked_items);
    println!("  need re-ranking:     {}", ranking.items_needing_reranking);
    println!("  avg comparisons:     {}", ranking.average_comparisons);
    println!();
    println!("Comparisons");
    println!("  logged:              {} ({} ties)", ranking.total_comparisons, ranking.total_ties);
    println!("  all time:            {} ({} ties)", activity.total_comparisons, activity.tie_count);
    println!("  today:               {}", activity.today_comparisons);
    println!("  streak:              {} days (longest {})", activity.current_streak, activity.longest_streak);

    let week: Vec<String> = activity.last_7_days.iter().map(|d| d.count.to_string()).collect();
    println!("  last 7 days:         {}", week.join(" "));
    println!();
    println!(
        "Due: {} (re-ranking {}, scheduled {}, unranked {})",
        report.due.due_count, report.due.needs_reranking, report.due.scheduled, report.due.unranked_items,
    );

    if ranking.needs_attention {
        println!("\n{} items are still unranked. Run `rankwise pair` to place them.", ranking.unranked_items);
    }
}

pub fn print_history_table(entries: &[&ComparisonEntry], now: Timestamp) {
    if entries.is_empty() {
        println!("No comparisons yet.");
        return;
    }

    println!("    ID | Winner     | Loser      | Result | When");
    println!("-------|------------|------------|--------|----------");
    for e in entries {
        let result = if e.is_tie { "tie" } else { "win" };
        println!(
            "{:>6} | {:<10} | {:<10} | {:<6} | {}",
            e.id, e.winner, e.loser, result, format_age(now, e.created_at),
        );
    }
}

fn media_label(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Anime => "anime",
        MediaType::Manga => "manga",
    }
}

/// Coarse "how long ago" for history rows.
fn format_age(now: Timestamp, then: Timestamp) -> String {
    let elapsed = (now - then).max(0);
    if elapsed < MINUTE_MS {
        "just now".to_string()
    } else if elapsed < HOUR_MS {
        format!("{}m ago", elapsed / MINUTE_MS)
    } else if elapsed < DAY_MS {
        format!("{}h ago", elapsed / HOUR_MS)
    } else {
        format!("{}d ago", elapsed / DAY_MS)
    }
}
