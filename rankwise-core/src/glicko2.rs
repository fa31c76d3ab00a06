/// Glicko-2 rating engine.
///
/// Follows Glickman's paper (http://www.glicko.net/glicko/glicko2.pdf).
/// Pure functions over `Rating` values: no state, no IO. Every comparison is
/// treated as a complete one-game rating period for each side.
use std::f64::consts::PI;

use tracing::{trace, warn};

use crate::constants::{
    CONFIDENCE_THRESHOLD, RATING_DEFAULT, RD_DEFAULT, RD_FLOOR, SCALING_FACTOR, TAU,
    VOLATILITY_CONVERGENCE, VOLATILITY_MAX_ITERATIONS,
};
use crate::error::RatingError;
use crate::types::{MatchResult, Rating};

// ---------------------------------------------------------------------------
// Scale conversion
// ---------------------------------------------------------------------------

fn to_internal_rating(rating: f64) -> f64 {
    (rating - RATING_DEFAULT) / SCALING_FACTOR
}

fn to_public_rating(mu: f64) -> f64 {
    mu * SCALING_FACTOR + RATING_DEFAULT
}

fn to_internal_rd(rd: f64) -> f64 {
    rd / SCALING_FACTOR
}

fn to_public_rd(phi: f64) -> f64 {
    phi * SCALING_FACTOR
}

// ---------------------------------------------------------------------------
// Glicko-2 building blocks (internal scale)
// ---------------------------------------------------------------------------

/// Weight of a game against an opponent with deviation `rd` (internal scale).
/// Uncertain opponents count for less.
pub fn g(rd: f64) -> f64 {
    1.0 / (1.0 + 3.0 * rd * rd / (PI * PI)).sqrt()
}

/// Expected score against an opponent, all inputs on the internal scale.
pub fn expected_score(rating: f64, opponent_rating: f64, opponent_rd: f64) -> f64 {
    1.0 / (1.0 + (-g(opponent_rd) * (rating - opponent_rating)).exp())
}

/// Pre-period deviation growth: phi' = sqrt(phi^2 + sigma^2).
fn inflate(phi: f64, sigma: f64) -> f64 {
    (phi * phi + sigma * sigma).sqrt()
}

/// One inactivity step on the public scale, capped at the default RD.
fn inflate_public_rd(rd: f64, sigma: f64) -> f64 {
    to_public_rd(inflate(to_internal_rd(rd), sigma)).min(RD_DEFAULT)
}

struct InternalMatch {
    rating: f64,
    rd: f64,
    score: f64,
}

/// Step 5: new volatility via the Illinois variant of regula falsi.
/// Each of the two loops gives up after `max_iterations`.
fn new_volatility(
    sigma: f64,
    phi: f64,
    delta: f64,
    variance: f64,
    max_iterations: usize,
) -> Result<f64, RatingError> {
    let a = (sigma * sigma).ln();
    let phi2 = phi * phi;
    let delta2 = delta * delta;

    let f = |x: f64| {
        let ex = x.exp();
        let denom = phi2 + variance + ex;
        (ex * (delta2 - phi2 - variance - ex)) / (2.0 * denom * denom) - (x - a) / (TAU * TAU)
    };

    let mut lower = a;
    let mut upper = if delta2 > phi2 + variance {
        (delta2 - phi2 - variance).ln()
    } else {
        let mut k = 1.0;
        let mut steps = 0;
        while f(a - k * TAU) < 0.0 {
            steps += 1;
            if steps >= max_iterations {
                return Err(RatingError::NonConvergence { iterations: steps });
            }
            k += 1.0;
        }
        a - k * TAU
    };

    let mut f_lower = f(lower);
    let mut f_upper = f(upper);
    let mut iterations = 0;

    while (upper - lower).abs() > VOLATILITY_CONVERGENCE {
        if iterations >= max_iterations {
            return Err(RatingError::NonConvergence { iterations });
        }
        iterations += 1;

        let c = lower + (lower - upper) * f_lower / (f_upper - f_lower);
        let f_c = f(c);
        if !c.is_finite() || !f_c.is_finite() {
            return Err(RatingError::NonFinite { quantity: "volatility" });
        }

        if f_c * f_upper <= 0.0 {
            lower = upper;
            f_lower = f_upper;
        } else {
            f_lower /= 2.0;
        }

        upper = c;
        f_upper = f_c;
    }

    Ok((lower / 2.0).exp())
}

// ---------------------------------------------------------------------------
// Input validation
// ---------------------------------------------------------------------------

fn check_finite(field: &'static str, value: f64) -> Result<f64, RatingError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(RatingError::InvalidRating { field, value })
    }
}

fn check_positive(field: &'static str, value: f64) -> Result<f64, RatingError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(RatingError::InvalidRating { field, value })
    }
}

/// RD above the ceiling is clamped rather than rejected.
fn clamp_rd(field: &'static str, rd: f64) -> Result<f64, RatingError> {
    let rd = check_positive(field, rd)?;
    if rd > RD_DEFAULT {
        warn!(rd, "rating deviation above ceiling, clamping to {}", RD_DEFAULT);
        return Ok(RD_DEFAULT);
    }
    Ok(rd)
}

fn validate(player: &Rating) -> Result<Rating, RatingError> {
    Ok(Rating {
        rating: check_finite("rating", player.rating)?,
        rd: clamp_rd("rd", player.rd)?,
        volatility: check_positive("volatility", player.volatility)?,
    })
}

fn validate_match(m: &MatchResult) -> Result<InternalMatch, RatingError> {
    let rating = check_finite("opponent_rating", m.opponent_rating)?;
    let rd = clamp_rd("opponent_rd", m.opponent_rd)?;
    if !(0.0..=1.0).contains(&m.score) {
        return Err(RatingError::InvalidRating { field: "score", value: m.score });
    }
    Ok(InternalMatch {
        rating: to_internal_rating(rating),
        rd: to_internal_rd(rd),
        score: m.score,
    })
}

fn round_volatility(sigma: f64) -> f64 {
    (sigma * 1_000_000.0).round() / 1_000_000.0
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Full Glicko-2 update of `player` over one rating period.
///
/// With no matches only the pre-period RD inflation is applied (capped at the
/// default RD, not rounded). Otherwise the returned rating and RD are rounded
/// to integers and volatility to six decimals.
pub fn update_rating(player: &Rating, matches: &[MatchResult]) -> Result<Rating, RatingError> {
    let player = validate(player)?;

    if matches.is_empty() {
        return Ok(Rating {
            rating: player.rating,
            rd: inflate_public_rd(player.rd, player.volatility),
            volatility: player.volatility,
        });
    }

    let mu = to_internal_rating(player.rating);
    let phi = to_internal_rd(player.rd);
    let internal: Vec<InternalMatch> = matches
        .iter()
        .map(validate_match)
        .collect::<Result<_, _>>()?;

    // Steps 3 and 4: estimated variance and improvement.
    let mut information = 0.0;
    let mut score_sum = 0.0;
    for m in &internal {
        let g_rd = g(m.rd);
        let e = expected_score(mu, m.rating, m.rd);
        information += g_rd * g_rd * e * (1.0 - e);
        score_sum += g_rd * (m.score - e);
    }
    let variance = 1.0 / information;
    if !variance.is_finite() {
        return Err(RatingError::NonFinite { quantity: "variance" });
    }
    let delta = variance * score_sum;

    let sigma = new_volatility(player.volatility, phi, delta, variance, VOLATILITY_MAX_ITERATIONS).inspect_err(|e| {
        warn!(error = %e, rating = player.rating, rd = player.rd, "volatility update failed");
    })?;

    // Steps 6 and 7.
    let phi_star = inflate(phi, sigma);
    let new_phi2 = 1.0 / (1.0 / (phi_star * phi_star) + 1.0 / variance);
    let new_mu = mu + new_phi2 * score_sum;

    let updated = Rating {
        rating: to_public_rating(new_mu).round(),
        rd: to_public_rd(new_phi2.sqrt()).round().clamp(RD_FLOOR, RD_DEFAULT),
        volatility: round_volatility(sigma),
    };

    if !updated.rating.is_finite() {
        return Err(RatingError::NonFinite { quantity: "rating" });
    }
    if !updated.rd.is_finite() {
        return Err(RatingError::NonFinite { quantity: "rd" });
    }

    trace!(
        before = ?player,
        after = ?updated,
        games = matches.len(),
        "glicko-2 update"
    );
    Ok(updated)
}

/// Update both sides of a decided comparison. Returns `(new_winner, new_loser)`.
pub fn process_comparison(winner: &Rating, loser: &Rating) -> Result<(Rating, Rating), RatingError> {
    let new_winner = update_rating(winner, &[MatchResult::against(loser, 1.0)])?;
    let new_loser = update_rating(loser, &[MatchResult::against(winner, 0.0)])?;
    Ok((new_winner, new_loser))
}

/// Update both sides of a tie.
pub fn process_tie(a: &Rating, b: &Rating) -> Result<(Rating, Rating), RatingError> {
    let new_a = update_rating(a, &[MatchResult::against(b, 0.5)])?;
    let new_b = update_rating(b, &[MatchResult::against(a, 0.5)])?;
    Ok((new_a, new_b))
}

/// Probability that `a` is preferred over `b`, using the combined deviation of both.
pub fn predict_outcome(a: &Rating, b: &Rating) -> f64 {
    let rd_a = to_internal_rd(a.rd);
    let rd_b = to_internal_rd(b.rd);
    let combined = (rd_a * rd_a + rd_b * rd_b).sqrt();
    expected_score(to_internal_rating(a.rating), to_internal_rating(b.rating), combined)
}

/// Grow RD for `periods` idle rating periods using the item's own volatility.
/// Each period is applied in turn and capped at the default RD.
pub fn apply_rd_decay(current: &Rating, periods: u32) -> Result<Rating, RatingError> {
    let current = validate(current)?;
    Ok(Rating {
        rd: inflate_periods(current.rd, current.volatility, periods),
        ..current
    })
}

/// Like `apply_rd_decay`, but each period adds `step` public RD points in
/// quadrature instead of the stored volatility: rd' = sqrt(rd^2 + step^2).
pub fn apply_rd_decay_with_step(current: &Rating, periods: u32, step: f64) -> Result<Rating, RatingError> {
    let current = validate(current)?;
    let step = check_finite("decay_step", step)?;
    Ok(Rating {
        rd: inflate_periods(current.rd, to_internal_rd(step), periods),
        ..current
    })
}

fn inflate_periods(mut rd: f64, sigma: f64, periods: u32) -> f64 {
    for _ in 0..periods {
        rd = inflate_public_rd(rd, sigma);
    }
    rd
}

/// Whether an item with this RD counts as ranked under the default threshold.
pub fn is_ranked(rd: f64) -> bool {
    is_ranked_at(rd, CONFIDENCE_THRESHOLD)
}

pub fn is_ranked_at(rd: f64, threshold: f64) -> bool {
    rd <= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Rating {
        Rating::default()
    }

    #[test]
    fn test_scale_round_trip() {
        for &(rating, rd) in &[(1500.0, 350.0), (1873.0, 42.0), (912.5, 200.0)] {
            let back_rating = to_public_rating(to_internal_rating(rating));
            let back_rd = to_public_rd(to_internal_rd(rd));
            assert!((back_rating - rating).abs() < 1e-9);
            assert!((back_rd - rd).abs() < 1e-9);
        }
    }

    #[test]
    fn test_g_and_expected_score() {
        assert!((g(0.0) - 1.0).abs() < 1e-12);
        assert!(g(2.0) < g(1.0));
        assert!((expected_score(0.0, 0.0, 1.0) - 0.5).abs() < 1e-12);
        assert!(expected_score(1.0, 0.0, 0.5) > 0.5);
    }

    /// Worked example from Glickman's paper: 1500/200 vs three opponents.
    #[test]
    fn test_glickman_reference_example() {
        let player = Rating::new(1500.0, 200.0, 0.06);
        let matches = [
            MatchResult { opponent_rating: 1400.0, opponent_rd: 30.0, score: 1.0 },
            MatchResult { opponent_rating: 1550.0, opponent_rd: 100.0, score: 0.0 },
            MatchResult { opponent_rating: 1700.0, opponent_rd: 300.0, score: 0.0 },
        ];

        let updated = update_rating(&player, &matches).unwrap();
        assert_eq!(updated.rating, 1464.0);
        assert_eq!(updated.rd, 152.0);
        assert!((updated.volatility - 0.05999).abs() < 1e-4);
    }

    #[test]
    fn test_fresh_items_single_win() {
        let (winner, loser) = process_comparison(&fresh(), &fresh()).unwrap();

        assert!(winner.rating > 1500.0);
        assert!(loser.rating < 1500.0);
        assert!(winner.rd < 350.0);
        assert!(loser.rd < 350.0);
        assert!((winner.rating + loser.rating - 3000.0).abs() <= 1.0);
        assert_eq!(winner.rd, loser.rd);
    }

    #[test]
    fn test_win_loss_symmetry() {
        let a = Rating::new(1620.0, 120.0, 0.06);
        let (winner, loser) = process_comparison(&a, &a).unwrap();
        let gain = winner.rating - a.rating;
        let drop = a.rating - loser.rating;
        assert!(gain > 0.0);
        assert!((gain - drop).abs() <= 1.0);
    }

    #[test]
    fn test_tie_between_equals_is_neutral() {
        let a = Rating::new(1580.0, 90.0, 0.06);
        let (new_a, new_b) = process_tie(&a, &a).unwrap();
        assert_eq!(new_a.rating, 1580.0);
        assert_eq!(new_b.rating, 1580.0);
        assert!(new_a.rd < a.rd);
    }

    #[test]
    fn test_comparison_always_sharpens_rd() {
        // Below roughly 100 RD an upset can raise volatility enough that the
        // rounded RD ticks up by a point, so only realistic working ranges here.
        let states = [
            Rating::new(1500.0, 350.0, 0.06),
            Rating::new(1700.0, 150.0, 0.06),
            Rating::new(1300.0, 210.0, 0.06),
        ];
        for a in &states {
            for b in &states {
                let (w, l) = process_comparison(a, b).unwrap();
                assert!(w.rd < a.rd, "{:?} vs {:?}: winner rd {} not below {}", a, b, w.rd, a.rd);
                assert!(l.rd < b.rd, "{:?} vs {:?}: loser rd {} not below {}", a, b, l.rd, b.rd);
            }
        }
    }

    #[test]
    fn test_empty_period_only_inflates_rd() {
        let player = Rating::new(1650.0, 80.0, 0.06);
        let updated = update_rating(&player, &[]).unwrap();
        assert_eq!(updated.rating, 1650.0);
        assert_eq!(updated.volatility, 0.06);
        assert!(updated.rd > 80.0);
        let expected = (80.0_f64.powi(2) + (0.06 * SCALING_FACTOR).powi(2)).sqrt();
        assert!((updated.rd - expected).abs() < 1e-9);
    }

    #[test]
    fn test_decay_never_exceeds_ceiling() {
        let mut current = Rating::new(1500.0, 340.0, 0.06);
        for _ in 0..50 {
            let next = apply_rd_decay(&current, 3).unwrap();
            assert!(next.rd >= current.rd);
            assert!(next.rd <= RD_DEFAULT);
            current = next;
        }
        assert_eq!(current.rd, RD_DEFAULT);
    }

    #[test]
    fn test_empty_updates_match_multi_period_decay() {
        let start = Rating::new(1420.0, 75.0, 0.06);
        let twice = update_rating(&update_rating(&start, &[]).unwrap(), &[]).unwrap();
        let decayed = apply_rd_decay(&start, 2).unwrap();
        assert!((twice.rd - decayed.rd).abs() < 1e-9);

        // Chained periods agree with the closed form sqrt(rd^2 + n * sigma^2).
        let sigma_public = 0.06 * SCALING_FACTOR;
        let closed = (75.0_f64.powi(2) + 2.0 * sigma_public * sigma_public).sqrt();
        assert!((decayed.rd - closed).abs() < 1e-9);
    }

    #[test]
    fn test_fixed_step_decay() {
        let start = Rating::new(1500.0, 100.0, 0.06);
        let decayed = apply_rd_decay_with_step(&start, 1, 5.0).unwrap();
        assert!((decayed.rd - (100.0_f64.powi(2) + 25.0).sqrt()).abs() < 1e-9);
        assert_eq!(decayed.rating, 1500.0);
    }

    #[test]
    fn test_zero_periods_is_identity() {
        let start = Rating::new(1500.0, 123.0, 0.06);
        assert_eq!(apply_rd_decay(&start, 0).unwrap(), start);
    }

    #[test]
    fn test_predict_outcome() {
        let strong = Rating::new(1800.0, 50.0, 0.06);
        let weak = Rating::new(1400.0, 50.0, 0.06);
        let p = predict_outcome(&strong, &weak);
        assert!(p > 0.8 && p < 1.0);
        assert!((p + predict_outcome(&weak, &strong) - 1.0).abs() < 1e-12);
        assert!((predict_outcome(&fresh(), &fresh()) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_is_ranked_threshold() {
        assert!(is_ranked(200.0));
        assert!(!is_ranked(200.5));
        assert!(is_ranked_at(250.0, 300.0));
    }

    #[test]
    fn test_rejects_invalid_input() {
        let bad_rd = Rating::new(1500.0, -10.0, 0.06);
        assert!(matches!(
            update_rating(&bad_rd, &[]),
            Err(RatingError::InvalidRating { field: "rd", .. })
        ));

        let nan_rating = Rating::new(f64::NAN, 100.0, 0.06);
        assert!(process_comparison(&nan_rating, &fresh()).is_err());

        let zero_vol = Rating::new(1500.0, 100.0, 0.0);
        assert!(apply_rd_decay(&zero_vol, 1).is_err());

        let bad_score = MatchResult { opponent_rating: 1500.0, opponent_rd: 100.0, score: 2.0 };
        assert!(update_rating(&fresh(), &[bad_score]).is_err());
    }

    #[test]
    fn test_rd_above_ceiling_is_clamped() {
        let wide = Rating::new(1500.0, 900.0, 0.06);
        let decayed = apply_rd_decay(&wide, 1).unwrap();
        assert_eq!(decayed.rd, RD_DEFAULT);
    }

    #[test]
    fn test_degenerate_variance_is_an_error() {
        // Expected score rounds to exactly 1.0, so the game carries no information.
        let player = Rating::new(1_000_000.0, 30.0, 0.06);
        let opponent = MatchResult { opponent_rating: -1_000_000.0, opponent_rd: 30.0, score: 1.0 };
        assert_eq!(
            update_rating(&player, &[opponent]),
            Err(RatingError::NonFinite { quantity: "variance" })
        );
    }

    #[test]
    fn test_updated_rd_stays_in_range() {
        // A very volatile item inflates past the ceiling before the game is applied.
        let volatile = Rating::new(1500.0, 350.0, 1.5);
        let strong = Rating::new(5000.0, 30.0, 0.06);
        let (winner, _) = process_comparison(&volatile, &strong).unwrap();
        assert_eq!(winner.rd, RD_DEFAULT);

        // A near-certain item would round down to zero.
        let certain = Rating::new(1500.0, 0.4, 0.0001);
        let peer = Rating::new(1500.0, 100.0, 0.06);
        let (winner, _) = process_comparison(&certain, &peer).unwrap();
        assert_eq!(winner.rd, RD_FLOOR);

        // And the result is still valid input for the next comparison.
        assert!(process_comparison(&winner, &peer).is_ok());
    }

    #[test]
    fn test_volatility_solver_gives_up_at_cap() {
        // Internal-scale quantities of the Glickman example.
        let phi = to_internal_rd(200.0);
        let (sigma, delta, variance) = (0.06, -0.4834, 1.7785);

        assert!(new_volatility(sigma, phi, delta, variance, VOLATILITY_MAX_ITERATIONS).is_ok());
        assert_eq!(
            new_volatility(sigma, phi, delta, variance, 1),
            Err(RatingError::NonConvergence { iterations: 1 })
        );
    }

    #[test]
    fn test_update_is_deterministic() {
        let a = Rating::new(1530.0, 180.0, 0.0601);
        let b = Rating::new(1490.0, 240.0, 0.06);
        assert_eq!(process_comparison(&a, &b).unwrap(), process_comparison(&a, &b).unwrap());
    }
}
