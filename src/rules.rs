use std::time::{Duration, Instant};

use diesel::prelude::*;
use diesel::SqliteConnection;
use serde::{Deserialize, Serialize};

use crate::model::ScoringRule;
use crate::schema::{app_settings, scoring_rules};

/// How long a loaded rule set stays valid before the cache re-reads it.
pub const RULE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Hours before kickoff after which new predictions are rejected, unless the
/// configuration store overrides it.
pub const DEFAULT_PREDICTION_LOCK_HOURS: i64 = 1;

pub const RULE_EXACT_HOME_SCORE: &str = "exact_home_score";
pub const RULE_EXACT_AWAY_SCORE: &str = "exact_away_score";
pub const RULE_CORRECT_OUTCOME: &str = "correct_outcome";
pub const RULE_CORRECT_TOTAL_GOALS: &str = "correct_total_goals";
pub const RULE_CORRECT_GOAL_DIFFERENCE: &str = "correct_goal_difference";
pub const RULE_EXACT_SCORE_BONUS: &str = "exact_score_bonus";

/// Weight per scoring rule. Built-in defaults apply for any rule type absent
/// from the configuration store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleWeights {
    pub exact_home_score: i32,
    pub exact_away_score: i32,
    pub correct_outcome: i32,
    pub correct_total_goals: i32,
    pub correct_goal_difference: i32,
    pub exact_score_bonus: i32,
}

impl Default for RuleWeights {
    fn default() -> Self {
        RuleWeights {
            exact_home_score: 1,
            exact_away_score: 1,
            correct_outcome: 3,
            correct_total_goals: 1,
            correct_goal_difference: 1,
            exact_score_bonus: 3,
        }
    }
}

/// Loads the active rule weights from the configuration store. Unknown rule
/// types are ignored, inactive rows are skipped, and any type without a row
/// keeps its built-in default. Configured weights are clamped to zero from
/// below, since a prediction must never score negative points.
pub fn load_rule_weights(conn: &mut SqliteConnection) -> QueryResult<RuleWeights> {
    let rows: Vec<ScoringRule> = scoring_rules::table
        .filter(scoring_rules::is_active.eq(1i32))
        .select(ScoringRule::as_select())
        .load(conn)?;

    let mut weights = RuleWeights::default();
    for rule in rows {
        let value = rule.points.max(0);
        match rule.rule_type.as_str() {
            RULE_EXACT_HOME_SCORE => weights.exact_home_score = value,
            RULE_EXACT_AWAY_SCORE => weights.exact_away_score = value,
            RULE_CORRECT_OUTCOME => weights.correct_outcome = value,
            RULE_CORRECT_TOTAL_GOALS => weights.correct_total_goals = value,
            RULE_CORRECT_GOAL_DIFFERENCE => weights.correct_goal_difference = value,
            RULE_EXACT_SCORE_BONUS => weights.exact_score_bonus = value,
            _ => {}
        }
    }
    Ok(weights)
}

/// Short-lived cache around `load_rule_weights`. Constructed by the caller
/// and passed into the sync entry points, so tests can control the TTL.
/// Scoring must never hard-fail on a configuration read: a failed refresh
/// keeps the last good weights (or the built-in defaults before any
/// successful load) and only logs a warning.
#[derive(Debug)]
pub struct RuleCache {
    weights: RuleWeights,
    refreshed_at: Option<Instant>,
    ttl: Duration,
}

impl RuleCache {
    pub fn new() -> RuleCache {
        RuleCache::with_ttl(RULE_CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> RuleCache {
        RuleCache {
            weights: RuleWeights::default(),
            refreshed_at: None,
            ttl,
        }
    }

    /// Returns the current weights, re-reading the configuration store when
    /// the cached copy is older than the TTL.
    pub fn current(&mut self, conn: &mut SqliteConnection) -> RuleWeights {
        let stale = match self.refreshed_at {
            Some(at) => at.elapsed() > self.ttl,
            None => true,
        };
        if stale {
            match load_rule_weights(conn) {
                Ok(weights) => {
                    self.weights = weights;
                    self.refreshed_at = Some(Instant::now());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "rule config unavailable, keeping last good weights");
                }
            }
        }
        self.weights
    }

    /// Drops the cached copy so the next `current` call reloads, used after
    /// administrative rule changes.
    pub fn invalidate(&mut self) {
        self.refreshed_at = None;
    }
}

impl Default for RuleCache {
    fn default() -> Self {
        RuleCache::new()
    }
}

/// Reads the prediction lock window from the settings store. Falls back to
/// the built-in default when the key is absent or unparsable.
pub fn prediction_lock_hours(conn: &mut SqliteConnection) -> QueryResult<i64> {
    let raw: Option<String> = app_settings::table
        .filter(app_settings::key.eq("prediction_lock_hours"))
        .select(app_settings::value)
        .first(conn)
        .optional()?;

    Ok(raw
        .and_then(|value| value.parse::<i64>().ok())
        .unwrap_or(DEFAULT_PREDICTION_LOCK_HOURS))
}
