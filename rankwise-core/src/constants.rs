/// Public-scale rating assigned to every item when it enters the library.
pub const RATING_DEFAULT: f64 = 1500.0;

/// Rating deviation of a brand-new item. Also the ceiling: decay never
/// pushes RD above this value.
pub const RD_DEFAULT: f64 = 350.0;

/// Smallest RD a full update may store. Keeps a near-certain item valid input for the next update.
pub const RD_FLOOR: f64 = 1.0;

/// Starting volatility (sigma).
pub const VOLATILITY_DEFAULT: f64 = 0.06;

/// Constrains how fast volatility may change between rating periods.
pub const TAU: f64 = 0.5;

/// Glicko-2 scale factor between the public (1500-centred) scale and the
/// internal (0-centred) scale. Equals 400 / ln(10).
pub const SCALING_FACTOR: f64 = 173.7178;

/// Items with RD at or below this are "ranked"; above it they still need placement.
pub const CONFIDENCE_THRESHOLD: f64 = 200.0;

/// Rating window (public points, either side) used when refining an established item.
pub const CLOSE_RATING_RANGE: f64 = 100.0;

/// RD increase step (public points) applied per idle day by the decay job
/// when the stored volatility is not used for pacing.
pub const RD_DECAY_PER_DAY: f64 = 5.0;

/// Convergence tolerance of the volatility root-find.
pub const VOLATILITY_CONVERGENCE: f64 = 1e-7;

/// Hard cap on iterations for each loop of the volatility solver.
///
/// With well-formed input the Illinois iteration converges in well under
/// ten steps; hitting this cap means the input was pathological.
pub const VOLATILITY_MAX_ITERATIONS: usize = 100;

/// One day in milliseconds. All timestamps are Unix epoch milliseconds.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Days before an item that is still unranked resurfaces for comparison.
pub const COMPARISON_RESURFACE_DAYS_NEW: i64 = 1;

/// Days before an established (ranked) item resurfaces.
pub const COMPARISON_RESURFACE_DAYS_ESTABLISHED: i64 = 3;

/// Comparison log entries older than this are removed by the archive job.
pub const COMPARISON_RETENTION_DAYS: i64 = 90;

/// Number of unranked items at which a caller should start nudging the user.
pub const UNRANKED_NOTIFICATION_THRESHOLD: usize = 3;

/// Default number of entries returned by history queries.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Number of days kept in the rolling daily activity series.
pub const ACTIVITY_WINDOW_DAYS: usize = 7;

/// Receipts kept for `undo_last`. Older comparisons can no longer be undone that way.
pub const UNDO_HISTORY_LIMIT: usize = 20;
