use std::collections::{BTreeMap, BTreeSet};

use diesel::prelude::*;
use diesel::SqliteConnection;

use crate::error::{EngineError, EngineResult};
use crate::gameweek;
use crate::groups;
use crate::model::{Match, MatchStatus, Prediction, PredictionStatus, User};
use crate::reconcile;
use crate::rules::{RuleCache, RuleWeights};
use crate::schema::{matches, predictions, standings as standings_dsl, users};
use crate::scoring::score_prediction;
use crate::standings;

/// Result of syncing one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSyncOutcome {
    pub predictions_processed: usize,
    pub users_updated: usize,
}

/// Result of syncing every pending match of a gameweek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameweekSyncOutcome {
    pub matches_synced: usize,
    pub predictions_processed: usize,
}

/// Points earned against one match, tallied per predicting user.
#[derive(Debug, Default, Clone, Copy)]
struct UserTally {
    points: i32,
    predictions: i32,
    correct: i32,
}

/// Applies a finished match's effects exactly once: standings and gameweek
/// deltas, form recomputation, prediction scoring, league positions, user
/// totals, group fan-out, and finally the synchronized flag. The whole
/// sequence runs in one transaction, so a match is either fully synced or
/// not synced at all.
pub fn sync_match(
    conn: &mut SqliteConnection,
    rules: &mut RuleCache,
    match_id: i32,
) -> EngineResult<MatchSyncOutcome> {
    let weights = rules.current(conn);
    conn.transaction(|conn| {
        let m = fetch_match(conn, match_id)?;
        let (home, away) = guard_ready(&m)?;

        standings::apply_result(conn, m.league_id, m.home_team_id, home, away)?;
        standings::apply_result(conn, m.league_id, m.away_team_id, away, home)?;

        // Gameweek stats are maintained independently of the cumulative
        // table; a match without a gameweek only feeds the season table.
        let gameweek_number = match m.gameweek_id {
            Some(gameweek_id) => {
                gameweek::apply_result(conn, gameweek_id, m.home_team_id, home, away)?;
                gameweek::apply_result(conn, gameweek_id, m.away_team_id, away, home)?;
                gameweek::recompute_positions(conn, gameweek_id)?;
                Some(gameweek::fetch_gameweek(conn, gameweek_id)?.number)
            }
            None => None,
        };

        standings::refresh_form(conn, m.league_id, m.home_team_id)?;
        standings::refresh_form(conn, m.league_id, m.away_team_id)?;

        let per_user = score_pending_predictions(conn, &m, (home, away), &weights)?;

        standings::recompute_positions(conn, m.league_id)?;

        let predictions_processed = apply_user_tallies(conn, &m, gameweek_number, &per_user)?;

        diesel::update(matches::table.filter(matches::id.eq(m.id)))
            .set(matches::synchronized.eq(1i32))
            .execute(conn)?;

        tracing::info!(
            match_id = m.id,
            league_id = m.league_id,
            predictions = predictions_processed,
            users = per_user.len(),
            "match synchronized"
        );
        Ok(MatchSyncOutcome {
            predictions_processed,
            users_updated: per_user.len(),
        })
    })
}

/// Syncs every unsynced finished match of a gameweek in match-date order,
/// then recomputes form for every team currently in the league table (not
/// just the teams that played), recomputes positions once, and freezes the
/// table into a gameweek-boundary snapshot.
pub fn sync_gameweek(
    conn: &mut SqliteConnection,
    rules: &mut RuleCache,
    gameweek_id: i32,
) -> EngineResult<GameweekSyncOutcome> {
    let weights = rules.current(conn);
    conn.transaction(|conn| {
        let gw = gameweek::fetch_gameweek(conn, gameweek_id)?;

        let pending: Vec<Match> = matches::table
            .filter(matches::gameweek_id.eq(gameweek_id))
            .filter(matches::status.eq(MatchStatus::Finished.as_str()))
            .filter(matches::synchronized.eq(0i32))
            .filter(matches::home_score.is_not_null())
            .filter(matches::away_score.is_not_null())
            .order(matches::kickoff_at.asc())
            .select(Match::as_select())
            .load(conn)?;
        if pending.is_empty() {
            return Ok(GameweekSyncOutcome {
                matches_synced: 0,
                predictions_processed: 0,
            });
        }

        let mut predictions_processed = 0;
        for m in &pending {
            let (home, away) = match m.final_score() {
                Some(score) => score,
                None => continue,
            };
            standings::apply_result(conn, m.league_id, m.home_team_id, home, away)?;
            standings::apply_result(conn, m.league_id, m.away_team_id, away, home)?;
            gameweek::apply_result(conn, gameweek_id, m.home_team_id, home, away)?;
            gameweek::apply_result(conn, gameweek_id, m.away_team_id, away, home)?;

            let per_user = score_pending_predictions(conn, m, (home, away), &weights)?;
            predictions_processed += apply_user_tallies(conn, m, Some(gw.number), &per_user)?;

            diesel::update(matches::table.filter(matches::id.eq(m.id)))
                .set(matches::synchronized.eq(1i32))
                .execute(conn)?;
        }

        // One form pass over the whole table, one ranking pass per table,
        // one boundary snapshot.
        let team_ids: Vec<i32> = standings_dsl::table
            .filter(standings_dsl::league_id.eq(gw.league_id))
            .select(standings_dsl::team_id)
            .load(conn)?;
        for team_id in team_ids {
            standings::refresh_form(conn, gw.league_id, team_id)?;
        }
        standings::recompute_positions(conn, gw.league_id)?;
        gameweek::recompute_positions(conn, gameweek_id)?;
        gameweek::snapshot_league_table(conn, gw.league_id, gameweek_id)?;

        tracing::info!(
            gameweek_id,
            league_id = gw.league_id,
            matches = pending.len(),
            predictions = predictions_processed,
            "gameweek synchronized"
        );
        Ok(GameweekSyncOutcome {
            matches_synced: pending.len(),
            predictions_processed,
        })
    })
}

/// Explicit correction path for a match that was synced with wrong scores:
/// clears the synchronized flag, resets the match's predictions to
/// pending/unscored, and rebuilds the league standings, the gameweek stats
/// and the affected users' totals from the remaining history. Group ledgers
/// are the caller's follow-up via `groups::recalculate_group_points`.
/// Returns the affected user ids.
pub fn unsync_match(conn: &mut SqliteConnection, match_id: i32) -> EngineResult<Vec<i32>> {
    conn.transaction(|conn| {
        let m = fetch_match(conn, match_id)?;
        if !m.is_synchronized() {
            return Err(EngineError::NotReady {
                match_id: m.id,
                reason: "match is not synchronized",
            });
        }

        let affected: BTreeSet<i32> = predictions::table
            .filter(predictions::match_id.eq(m.id))
            .filter(predictions::processed.eq(1i32))
            .select(predictions::user_id)
            .load::<i32>(conn)?
            .into_iter()
            .collect();

        diesel::update(predictions::table.filter(predictions::match_id.eq(m.id)))
            .set((
                predictions::processed.eq(0i32),
                predictions::status.eq(PredictionStatus::Pending.as_str()),
                predictions::home_score_points.eq(None::<i32>),
                predictions::away_score_points.eq(None::<i32>),
                predictions::outcome_points.eq(None::<i32>),
                predictions::total_goals_points.eq(None::<i32>),
                predictions::goal_difference_points.eq(None::<i32>),
                predictions::exact_score_bonus_points.eq(None::<i32>),
                predictions::total_points.eq(None::<i32>),
            ))
            .execute(conn)?;

        // Clear the flag first so the rebuilds below no longer see this
        // match as applied.
        diesel::update(matches::table.filter(matches::id.eq(m.id)))
            .set(matches::synchronized.eq(0i32))
            .execute(conn)?;

        reconcile::rebuild_league_standings_in_tx(conn, m.league_id)?;
        if let Some(gameweek_id) = m.gameweek_id {
            gameweek::resync_gameweek_in_tx(conn, gameweek_id)?;
        }
        for user_id in &affected {
            reconcile::rebuild_user_totals_in_tx(conn, *user_id)?;
        }

        tracing::info!(
            match_id = m.id,
            users = affected.len(),
            "match unsynchronized, derived state rebuilt"
        );
        Ok(affected.into_iter().collect())
    })
}

fn fetch_match(conn: &mut SqliteConnection, match_id: i32) -> EngineResult<Match> {
    matches::table
        .filter(matches::id.eq(match_id))
        .select(Match::as_select())
        .first(conn)
        .optional()?
        .ok_or(EngineError::not_found("match", match_id))
}

/// Idempotency and readiness guards; returns the final score on success.
fn guard_ready(m: &Match) -> EngineResult<(i32, i32)> {
    if m.is_synchronized() {
        return Err(EngineError::AlreadySynced(m.id));
    }
    if !m.is_finished() {
        return Err(EngineError::NotReady {
            match_id: m.id,
            reason: "status is not finished",
        });
    }
    m.final_score().ok_or(EngineError::NotReady {
        match_id: m.id,
        reason: "final score is missing",
    })
}

/// Scores every unprocessed prediction on the match, persists the breakdown
/// and marks them processed, returning the per-user tallies.
fn score_pending_predictions(
    conn: &mut SqliteConnection,
    m: &Match,
    actual: (i32, i32),
    weights: &RuleWeights,
) -> EngineResult<BTreeMap<i32, UserTally>> {
    let pending: Vec<Prediction> = predictions::table
        .filter(predictions::match_id.eq(m.id))
        .filter(predictions::processed.eq(0i32))
        .select(Prediction::as_select())
        .load(conn)?;

    let mut per_user: BTreeMap<i32, UserTally> = BTreeMap::new();
    for p in &pending {
        let breakdown = score_prediction((p.predicted_home, p.predicted_away), actual, weights);
        diesel::update(predictions::table.filter(predictions::id.eq(p.id)))
            .set((
                predictions::home_score_points.eq(Some(breakdown.home_score)),
                predictions::away_score_points.eq(Some(breakdown.away_score)),
                predictions::outcome_points.eq(Some(breakdown.outcome)),
                predictions::total_goals_points.eq(Some(breakdown.total_goals)),
                predictions::goal_difference_points.eq(Some(breakdown.goal_difference)),
                predictions::exact_score_bonus_points.eq(Some(breakdown.exact_score_bonus)),
                predictions::total_points.eq(Some(breakdown.total())),
                predictions::processed.eq(1i32),
                predictions::status.eq(PredictionStatus::Completed.as_str()),
            ))
            .execute(conn)?;

        let tally = per_user.entry(p.user_id).or_default();
        tally.points += breakdown.total();
        tally.predictions += 1;
        if breakdown.total() > 0 {
            tally.correct += 1;
        }
    }
    Ok(per_user)
}

/// Increments each user's aggregate counters and fans earned points out to
/// their groups. Returns the number of predictions processed.
fn apply_user_tallies(
    conn: &mut SqliteConnection,
    m: &Match,
    gameweek_number: Option<i32>,
    per_user: &BTreeMap<i32, UserTally>,
) -> EngineResult<usize> {
    let mut predictions_processed = 0;
    for (user_id, tally) in per_user {
        predictions_processed += tally.predictions as usize;

        let user: User = users::table
            .filter(users::id.eq(user_id))
            .select(User::as_select())
            .first(conn)?;
        diesel::update(users::table.filter(users::id.eq(user_id)))
            .set((
                users::total_points.eq(user.total_points + tally.points),
                users::weekly_points.eq(user.weekly_points + tally.points),
                users::total_predictions.eq(user.total_predictions + tally.predictions),
                users::correct_predictions.eq(user.correct_predictions + tally.correct),
            ))
            .execute(conn)?;

        if tally.points > 0 {
            groups::update_group_points(conn, *user_id, m.league_id, tally.points, gameweek_number)?;
        }
    }
    Ok(predictions_processed)
}
