mod config;
mod library;
mod output;

use clap::Parser;
use rankwise_core::constants::DEFAULT_HISTORY_LIMIT;
use rankwise_core::{
    EngineConfig, ItemId, MediaType, Outcome, Pair, RankingEngine, Timestamp, WatchStatus,
};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

use crate::output::StatsReport;

pub fn bail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

#[derive(Parser)]
#[command(name = "rankwise", version, about = "Rank your anime and manga by answering \"which did you like more?\"")]
struct Cli {
    /// Path to config file (default: ~/.config/rankwise/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the library file (default: ~/.local/share/rankwise/library.json)
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    /// Log engine decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Create a default config file at ~/.config/rankwise/config.toml
    Init,
    /// Add an item to the library at the default rating
    Add {
        id: ItemId,
        #[arg(long, value_enum, default_value_t = StatusArg::Completed)]
        status: StatusArg,
        #[arg(long, value_enum)]
        media_type: Option<MediaArg>,
    },
    /// Change an item's watch status (flags it for re-ranking)
    Status {
        id: ItemId,
        #[arg(value_enum)]
        status: StatusArg,
    },
    /// Show the next pair worth comparing
    Pair {
        /// Pair already skipped this session, as `a:b` (repeatable)
        #[arg(long = "skip", value_parser = parse_pair)]
        skipped: Vec<Pair>,
        #[arg(long, value_enum)]
        media_type: Option<MediaArg>,
        #[arg(long)]
        json: bool,
    },
    /// Record that WINNER was preferred over LOSER
    Compare { winner: ItemId, loser: ItemId },
    /// Record that two items are equally good
    Tie { a: ItemId, b: ItemId },
    /// Revert the most recent comparison
    Undo,
    /// Grow rating uncertainty for items not compared in the last day (run daily)
    Decay,
    /// Delete comparison log entries older than the retention window
    Archive,
    /// Show the ranking with percentile scores
    List {
        #[arg(long, value_enum)]
        media_type: Option<MediaArg>,
        #[arg(long)]
        json: bool,
    },
    /// Show library and activity statistics
    Stats {
        /// Restrict item counts to one media type
        #[arg(long, value_enum)]
        media_type: Option<MediaArg>,
        #[arg(long)]
        json: bool,
    },
    /// Show recent comparisons, newest first
    History {
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum StatusArg {
    Completed,
    Watching,
    OnHold,
    Dropped,
    PlanToWatch,
}

impl From<StatusArg> for WatchStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Completed => WatchStatus::Completed,
            StatusArg::Watching => WatchStatus::Watching,
            StatusArg::OnHold => WatchStatus::OnHold,
            StatusArg::Dropped => WatchStatus::Dropped,
            StatusArg::PlanToWatch => WatchStatus::PlanToWatch,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum MediaArg {
    Anime,
    Manga,
}

impl From<MediaArg> for MediaType {
    fn from(arg: MediaArg) -> Self {
        match arg {
            MediaArg::Anime => MediaType::Anime,
            MediaArg::Manga => MediaType::Manga,
        }
    }
}

/// Parse `a:b` into a pair of item IDs.
fn parse_pair(s: &str) -> Result<Pair, String> {
    let (a, b) = s
        .split_once(':')
        .ok_or_else(|| format!("expected `a:b`, got \"{s}\""))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<ItemId>()
            .map_err(|e| format!("invalid item ID \"{v}\": {e}"))
    };
    Ok((parse(a)?, parse(b)?))
}

fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or_else(|e| bail(format!("System clock is before the Unix epoch: {e}")))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(config::config_path);

    if let Commands::Init = cli.command {
        config::create_default_config(&config_path);
        println!("Created config at {}", config_path.display());
        println!("Edit it to set your library path, default media type, etc.");
        return;
    }

    // Load config file, merge with CLI args (CLI wins)
    let cfg = config::load_config(&config_path);
    let library_path = cli
        .library
        .clone()
        .or_else(|| cfg.library.as_deref().map(config::expand_home))
        .unwrap_or_else(config::default_library_path);
    let default_media = cfg.media_type.unwrap_or(MediaType::Anime);
    let media = |arg: Option<MediaArg>| arg.map(MediaType::from).unwrap_or(default_media);

    let engine_config = EngineConfig {
        decay_pacing: cfg.decay_pacing.unwrap_or_default(),
    };
    let state = library::load_library(&library_path);
    let mut engine = RankingEngine::from_state(state, engine_config)
        .unwrap_or_else(|e| bail(format!("Library at {} is inconsistent: {e}", library_path.display())));

    if cli.verbose {
        eprintln!("Library: {} ({} items)", library_path.display(), engine.len());
    }

    let now = now_millis();
    let changed = match cli.command {
        Commands::Init => false,
        Commands::Add { id, status, media_type } => {
            let media_type = media(media_type);
            engine
                .add_item(id, media_type, status.into())
                .unwrap_or_else(|e| bail(e));
            println!("Added {id}");
            true
        }
        Commands::Status { id, status } => {
            let changed = engine
                .set_status(id, status.into())
                .unwrap_or_else(|e| bail(e));
            if changed {
                println!("Updated {id}; it will be re-ranked next");
            } else {
                println!("{id} already has that status");
            }
            changed
        }
        Commands::Pair { skipped, media_type, json } => {
            let overview = engine.pair_with_stats(media(media_type), &skipped);
            if json {
                output::print_json(&overview);
            } else {
                output::print_pair(&overview);
            }
            false
        }
        Commands::Compare { winner, loser } => {
            let receipt = engine
                .record_comparison(winner, loser, now)
                .unwrap_or_else(|e| bail(e));
            println!(
                "{winner}: {:.0} ± {:.0}   {loser}: {:.0} ± {:.0}",
                receipt.item1_after.rating, receipt.item1_after.rd,
                receipt.item2_after.rating, receipt.item2_after.rd,
            );
            true
        }
        Commands::Tie { a, b } => {
            let receipt = engine.record_tie(a, b, now).unwrap_or_else(|e| bail(e));
            println!(
                "{a}: {:.0} ± {:.0}   {b}: {:.0} ± {:.0}",
                receipt.item1_after.rating, receipt.item1_after.rd,
                receipt.item2_after.rating, receipt.item2_after.rd,
            );
            true
        }
        Commands::Undo => {
            let receipt = engine.undo_last().unwrap_or_else(|e| bail(e));
            let verb = match receipt.outcome {
                Outcome::Win => "beat",
                Outcome::Tie => "tied with",
            };
            println!(
                "Undid \"{} {verb} {}\"; ratings restored to {:.0} and {:.0}",
                receipt.item1.id, receipt.item2.id, receipt.item1.rating.rating, receipt.item2.rating.rating,
            );
            true
        }
        Commands::Decay => {
            let decayed = engine.decay_ratings(now);
            println!("Decayed {decayed} items");
            decayed > 0
        }
        Commands::Archive => {
            let archived = engine.archive_comparisons(now);
            println!("Archived {archived} comparisons");
            archived > 0
        }
        Commands::List { media_type, json } => {
            let media_type = media(media_type);
            let ranks = engine.percentile_rankings(media_type);
            if json {
                output::print_rankings_json(&ranks, media_type);
            } else {
                output::print_rankings_table(&ranks, media_type);
            }
            false
        }
        Commands::Stats { media_type, json } => {
            let media_type = media_type.map(MediaType::from);
            let report = StatsReport {
                media_type,
                ranking: engine.ranking_stats(media_type),
                due: engine.due_comparisons(now),
                activity: engine.activity(now),
                ranked_anime: engine.ranked_count(MediaType::Anime),
                ranked_manga: engine.ranked_count(MediaType::Manga),
            };
            if json {
                output::print_json(&report);
            } else {
                output::print_stats_table(&report);
            }
            false
        }
        Commands::History { limit } => {
            let limit = limit.or(cfg.history_limit).unwrap_or(DEFAULT_HISTORY_LIMIT);
            output::print_history_table(&engine.history(limit), now);
            false
        }
    };

    if changed {
        library::save_library(&library_path, engine.state());
    }
}
