use serde::{Deserialize, Serialize};

use crate::rules::RuleWeights;

/// Three-way match outcome, derived by comparing the two scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    HomeWin,
    AwayWin,
    Draw,
}

impl Outcome {
    pub fn classify(home: i32, away: i32) -> Outcome {
        if home > away {
            Outcome::HomeWin
        } else if away > home {
            Outcome::AwayWin
        } else {
            Outcome::Draw
        }
    }

    /// Result letter from the perspective of one team.
    pub fn letter_for(goals_for: i32, goals_against: i32) -> char {
        match Outcome::classify(goals_for, goals_against) {
            Outcome::HomeWin => 'W',
            Outcome::AwayWin => 'L',
            Outcome::Draw => 'D',
        }
    }
}

/// Per-rule points earned by a single prediction. Rules are independent; the
/// total is always the plain sum of the six sub-scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsBreakdown {
    pub home_score: i32,
    pub away_score: i32,
    pub outcome: i32,
    pub total_goals: i32,
    pub goal_difference: i32,
    pub exact_score_bonus: i32,
}

impl PointsBreakdown {
    pub fn total(&self) -> i32 {
        self.home_score
            + self.away_score
            + self.outcome
            + self.total_goals
            + self.goal_difference
            + self.exact_score_bonus
    }
}

/// Scores a prediction against the final result. Pure and total: valid
/// non-negative integer scores always produce a breakdown, and every
/// sub-score is either 0 or the configured (non-negative) rule weight.
pub fn score_prediction(
    predicted: (i32, i32),
    actual: (i32, i32),
    weights: &RuleWeights,
) -> PointsBreakdown {
    let (predicted_home, predicted_away) = predicted;
    let (actual_home, actual_away) = actual;

    let mut breakdown = PointsBreakdown::default();

    let exact_home = predicted_home == actual_home;
    let exact_away = predicted_away == actual_away;
    if exact_home {
        breakdown.home_score = weights.exact_home_score;
    }
    if exact_away {
        breakdown.away_score = weights.exact_away_score;
    }
    if Outcome::classify(predicted_home, predicted_away)
        == Outcome::classify(actual_home, actual_away)
    {
        breakdown.outcome = weights.correct_outcome;
    }
    if predicted_home + predicted_away == actual_home + actual_away {
        breakdown.total_goals = weights.correct_total_goals;
    }
    if predicted_home - predicted_away == actual_home - actual_away {
        breakdown.goal_difference = weights.correct_goal_difference;
    }
    if exact_home && exact_away {
        breakdown.exact_score_bonus = weights.exact_score_bonus;
    }

    breakdown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_outcomes() {
        assert_eq!(Outcome::classify(2, 1), Outcome::HomeWin);
        assert_eq!(Outcome::classify(0, 3), Outcome::AwayWin);
        assert_eq!(Outcome::classify(0, 0), Outcome::Draw);
        assert_eq!(Outcome::letter_for(2, 1), 'W');
        assert_eq!(Outcome::letter_for(1, 1), 'D');
        assert_eq!(Outcome::letter_for(0, 2), 'L');
    }

    #[test]
    fn test_exact_prediction_satisfies_every_rule() {
        let weights = RuleWeights::default();
        let breakdown = score_prediction((2, 1), (2, 1), &weights);

        assert_eq!(breakdown.home_score, weights.exact_home_score);
        assert_eq!(breakdown.away_score, weights.exact_away_score);
        assert_eq!(breakdown.outcome, weights.correct_outcome);
        assert_eq!(breakdown.total_goals, weights.correct_total_goals);
        assert_eq!(breakdown.goal_difference, weights.correct_goal_difference);
        assert_eq!(breakdown.exact_score_bonus, weights.exact_score_bonus);

        // Fixed point: every rule satisfied means total = sum of all six
        // default weights.
        let all_weights = weights.exact_home_score
            + weights.exact_away_score
            + weights.correct_outcome
            + weights.correct_total_goals
            + weights.correct_goal_difference
            + weights.exact_score_bonus;
        assert_eq!(breakdown.total(), all_weights);
    }

    #[test]
    fn test_same_outcome_only() {
        // Predicted 2-1 against an actual 1-0: home win both, but total
        // goals, goal difference and both exact sides all differ.
        let breakdown = score_prediction((2, 1), (1, 0), &RuleWeights::default());

        assert_eq!(breakdown.outcome, RuleWeights::default().correct_outcome);
        assert_eq!(breakdown.home_score, 0);
        assert_eq!(breakdown.away_score, 0);
        assert_eq!(breakdown.total_goals, 0);
        assert_eq!(breakdown.goal_difference, 0);
        assert_eq!(breakdown.exact_score_bonus, 0);
        assert_eq!(breakdown.total(), breakdown.outcome);
    }

    #[test]
    fn test_draw_with_equal_difference_but_different_totals() {
        // Predicted 1-1 against an actual 5-5: draw both and both
        // differences are zero, but the goal totals differ.
        let weights = RuleWeights::default();
        let breakdown = score_prediction((1, 1), (5, 5), &weights);

        assert_eq!(breakdown.outcome, weights.correct_outcome);
        assert_eq!(breakdown.goal_difference, weights.correct_goal_difference);
        assert_eq!(breakdown.total_goals, 0);
        assert_eq!(breakdown.home_score, 0);
        assert_eq!(breakdown.away_score, 0);
        assert_eq!(breakdown.exact_score_bonus, 0);
        assert_eq!(
            breakdown.total(),
            weights.correct_outcome + weights.correct_goal_difference
        );
    }

    #[test]
    fn test_no_negative_sub_scores_and_total_is_sum() {
        let weights = RuleWeights::default();
        for predicted_home in 0..6 {
            for predicted_away in 0..6 {
                for actual_home in 0..6 {
                    for actual_away in 0..6 {
                        let b = score_prediction(
                            (predicted_home, predicted_away),
                            (actual_home, actual_away),
                            &weights,
                        );
                        for sub in [
                            b.home_score,
                            b.away_score,
                            b.outcome,
                            b.total_goals,
                            b.goal_difference,
                            b.exact_score_bonus,
                        ] {
                            assert!(sub >= 0);
                        }
                        assert_eq!(
                            b.total(),
                            b.home_score
                                + b.away_score
                                + b.outcome
                                + b.total_goals
                                + b.goal_difference
                                + b.exact_score_bonus
                        );
                    }
                }
            }
        }
    }
}
