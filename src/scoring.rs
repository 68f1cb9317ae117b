//! Pure scoring computations for answer submissions.
//!
//! Everything in this module is deterministic given its inputs; the answer
//! pipeline gathers elapsed time, streak, and power-up state under the
//! session lock and hands plain values in.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::ScoringConfig;

/// Rule mode fixed at match creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RuleMode {
    /// Flat base points for every correct answer.
    Standard,
    /// Base points scale with remaining time in the answer window.
    SpeedWeighted,
}

/// Inputs for scoring one submission.
#[derive(Debug, Clone, Copy)]
pub struct Submission {
    /// Whether the answer arrived inside the question window.
    pub within_time: bool,
    /// Whether the submitted option matches the correct one.
    pub option_matches: bool,
    /// Milliseconds between question reveal and submission.
    pub elapsed_ms: u64,
    /// Full answer window in milliseconds.
    pub total_ms: u64,
    /// Combo streak after this answer was accounted for.
    pub streak: u32,
    /// Pending power-up multiplier, already taken from the session.
    pub multiplier: Option<f64>,
    /// Whether the match affects the persistent rating economy.
    pub ranked: bool,
}

/// Breakdown of one scored submission, kept for event payloads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    /// Whether the submission counts as correct.
    pub correct: bool,
    /// Base points before multipliers (0 when incorrect).
    pub base: i64,
    /// Combo multiplier applied to the base.
    pub combo_multiplier: f64,
    /// Consumable multiplier applied after the combo bonus.
    pub powerup_multiplier: f64,
    /// Final rounded points gained.
    pub gained: i64,
}

/// Combo multiplier as a step function of the streak length. Ranked matches
/// pay out higher tiers than casual ones.
pub fn combo_multiplier(streak: u32, ranked: bool) -> f64 {
    match streak {
        3..=4 => {
            if ranked {
                1.10
            } else {
                1.05
            }
        }
        5..=6 => {
            if ranked {
                1.20
            } else {
                1.10
            }
        }
        7.. => {
            if ranked {
                1.30
            } else {
                1.15
            }
        }
        _ => 1.0,
    }
}

/// Score a single submission.
///
/// An answer faster than the configured minimum plausible response time is
/// scored at a heavy discount: a pre-known answer pattern earns almost
/// nothing even when correct.
pub fn score_answer(rules: &ScoringConfig, mode: RuleMode, submission: &Submission) -> ScoreBreakdown {
    let correct = submission.within_time && submission.option_matches;

    if !correct {
        return ScoreBreakdown {
            correct: false,
            base: 0,
            combo_multiplier: 0.0,
            powerup_multiplier: submission.multiplier.unwrap_or(1.0),
            gained: 0,
        };
    }

    let suspiciously_fast = submission.elapsed_ms < rules.min_answer_time_ms;

    let base = match mode {
        RuleMode::Standard => {
            if suspiciously_fast {
                rules.standard_suspicious_base
            } else {
                rules.standard_base
            }
        }
        RuleMode::SpeedWeighted => {
            let remaining = submission.total_ms.saturating_sub(submission.elapsed_ms);
            let ratio = remaining as f64 / submission.total_ms.max(1) as f64;
            let scaled = (rules.speed_ceiling as f64 * ratio).round() as i64;
            let base = scaled.max(rules.speed_floor);
            if suspiciously_fast {
                (base as f64 * rules.speed_suspicious_scale).round() as i64
            } else {
                base
            }
        }
    };

    let combo = combo_multiplier(submission.streak, submission.ranked);
    let powerup = submission.multiplier.unwrap_or(1.0);
    let gained = (base as f64 * combo * powerup).round() as i64;

    ScoreBreakdown {
        correct: true,
        base,
        combo_multiplier: combo,
        powerup_multiplier: powerup,
        gained,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn rules() -> ScoringConfig {
        AppConfig::default().scoring
    }

    fn submission(elapsed_ms: u64, streak: u32) -> Submission {
        Submission {
            within_time: true,
            option_matches: true,
            elapsed_ms,
            total_ms: 15_000,
            streak,
            multiplier: None,
            ranked: false,
        }
    }

    #[test]
    fn standard_correct_answer_earns_flat_base() {
        let outcome = score_answer(&rules(), RuleMode::Standard, &submission(2000, 0));
        assert!(outcome.correct);
        assert_eq!(outcome.gained, 100);
    }

    #[test]
    fn standard_suspiciously_fast_answer_is_discounted() {
        let outcome = score_answer(&rules(), RuleMode::Standard, &submission(500, 0));
        assert_eq!(outcome.base, 30);
        assert_eq!(outcome.gained, 30);
    }

    #[test]
    fn speed_weighted_scales_with_remaining_time() {
        // 3s into a 15s window leaves 80% of the ceiling.
        let outcome = score_answer(&rules(), RuleMode::SpeedWeighted, &submission(3000, 0));
        assert_eq!(outcome.base, 800);
        assert_eq!(outcome.gained, 800);
    }

    #[test]
    fn speed_weighted_never_drops_below_floor() {
        let outcome = score_answer(&rules(), RuleMode::SpeedWeighted, &submission(14_900, 0));
        assert_eq!(outcome.base, 100);
    }

    #[test]
    fn speed_weighted_fast_answer_keeps_thirty_percent() {
        // 500ms into 15s: base would be round(1000 * 14500/15000) = 967.
        let outcome = score_answer(&rules(), RuleMode::SpeedWeighted, &submission(500, 0));
        assert_eq!(outcome.base, (967.0f64 * 0.3).round() as i64);
    }

    #[test]
    fn combo_tiers_pay_more_in_ranked_mode() {
        assert_eq!(combo_multiplier(2, true), 1.0);
        assert_eq!(combo_multiplier(3, false), 1.05);
        assert_eq!(combo_multiplier(4, true), 1.10);
        assert_eq!(combo_multiplier(6, true), 1.20);
        assert_eq!(combo_multiplier(6, false), 1.10);
        assert_eq!(combo_multiplier(7, true), 1.30);
        assert_eq!(combo_multiplier(11, false), 1.15);
    }

    #[test]
    fn ranked_streak_six_applies_twenty_percent_bonus() {
        let mut sub = submission(2000, 6);
        sub.ranked = true;
        let outcome = score_answer(&rules(), RuleMode::Standard, &sub);
        assert_eq!(outcome.gained, 120);
    }

    #[test]
    fn powerup_multiplier_applies_after_combo() {
        let mut sub = submission(2000, 6);
        sub.ranked = true;
        sub.multiplier = Some(2.0);
        let outcome = score_answer(&rules(), RuleMode::Standard, &sub);
        assert_eq!(outcome.gained, 240);
        assert_eq!(outcome.powerup_multiplier, 2.0);
    }

    #[test]
    fn timeout_scores_zero_even_when_option_matches() {
        let mut sub = submission(16_000, 3);
        sub.within_time = false;
        let outcome = score_answer(&rules(), RuleMode::Standard, &sub);
        assert!(!outcome.correct);
        assert_eq!(outcome.gained, 0);
    }

    #[test]
    fn wrong_option_scores_zero() {
        let mut sub = submission(2000, 0);
        sub.option_matches = false;
        let outcome = score_answer(&rules(), RuleMode::SpeedWeighted, &sub);
        assert!(!outcome.correct);
        assert_eq!(outcome.gained, 0);
    }
}
