use diesel::prelude::*;
use diesel::SqliteConnection;

use crate::error::{EngineError, EngineResult};
use crate::model::{League, Match, MatchStatus, PointsLedger, Prediction, PredictionStatus, User};
use crate::schema::{
    gameweek_team_stats, group_members, leagues, matches, predictions,
    standings as standings_dsl, standings_snapshots, users,
};
use crate::standings;

/// Rebuilds a league's cumulative standings from scratch: the source of
/// truth is the set of finished, synchronized matches; the table is a
/// materialized view over them. Used for backfills and drift correction.
/// Returns the number of matches replayed.
pub fn rebuild_league_standings(conn: &mut SqliteConnection, league_id: i32) -> EngineResult<usize> {
    conn.transaction(|conn| {
        let league: Option<League> = leagues::table
            .filter(leagues::id.eq(league_id))
            .select(League::as_select())
            .first(conn)
            .optional()?;
        if league.is_none() {
            return Err(EngineError::not_found("league", league_id));
        }

        let replayed = rebuild_league_standings_in_tx(conn, league_id)?;
        tracing::info!(league_id, matches = replayed, "league standings rebuilt");
        Ok(replayed)
    })
}

/// Delete-and-replay body, shared with the unsync path which already runs
/// inside a transaction.
pub(crate) fn rebuild_league_standings_in_tx(
    conn: &mut SqliteConnection,
    league_id: i32,
) -> EngineResult<usize> {
    diesel::delete(standings_dsl::table.filter(standings_dsl::league_id.eq(league_id)))
        .execute(conn)?;

    let applied: Vec<Match> = matches::table
        .filter(matches::league_id.eq(league_id))
        .filter(matches::status.eq(MatchStatus::Finished.as_str()))
        .filter(matches::synchronized.eq(1i32))
        .filter(matches::home_score.is_not_null())
        .filter(matches::away_score.is_not_null())
        .order(matches::kickoff_at.asc())
        .select(Match::as_select())
        .load(conn)?;

    for m in &applied {
        let (home, away) = match m.final_score() {
            Some(score) => score,
            None => continue,
        };
        standings::apply_result(conn, league_id, m.home_team_id, home, away)?;
        standings::apply_result(conn, league_id, m.away_team_id, away, home)?;
    }

    let team_ids: Vec<i32> = standings_dsl::table
        .filter(standings_dsl::league_id.eq(league_id))
        .select(standings_dsl::team_id)
        .load(conn)?;
    for team_id in team_ids {
        standings::refresh_form(conn, league_id, team_id)?;
    }
    standings::recompute_positions(conn, league_id)?;

    Ok(applied.len())
}

/// Recomputes a user's all-time counters from their processed predictions.
/// `weekly_points` belongs to the external gameweek rollover and is left
/// untouched.
pub fn rebuild_user_totals(conn: &mut SqliteConnection, user_id: i32) -> EngineResult<()> {
    conn.transaction(|conn| rebuild_user_totals_in_tx(conn, user_id))
}

pub(crate) fn rebuild_user_totals_in_tx(
    conn: &mut SqliteConnection,
    user_id: i32,
) -> EngineResult<()> {
    let user: Option<User> = users::table
        .filter(users::id.eq(user_id))
        .select(User::as_select())
        .first(conn)
        .optional()?;
    if user.is_none() {
        return Err(EngineError::not_found("user", user_id));
    }

    let processed: Vec<Prediction> = predictions::table
        .filter(predictions::user_id.eq(user_id))
        .filter(predictions::processed.eq(1i32))
        .select(Prediction::as_select())
        .load(conn)?;

    let total_points: i32 = processed.iter().filter_map(|p| p.total_points).sum();
    let correct = processed
        .iter()
        .filter(|p| p.total_points.unwrap_or(0) > 0)
        .count() as i32;

    diesel::update(users::table.filter(users::id.eq(user_id)))
        .set((
            users::total_points.eq(total_points),
            users::total_predictions.eq(processed.len() as i32),
            users::correct_predictions.eq(correct),
        ))
        .execute(conn)?;
    Ok(())
}

/// Wipes every derived aggregate back to the unsynced baseline: standings,
/// gameweek stats, snapshots, member ledgers, user counters, prediction
/// scoring state and the synchronized flags. Matches and predictions
/// themselves survive, so a full resync regenerates everything.
pub fn reset_derived_state(conn: &mut SqliteConnection) -> EngineResult<()> {
    conn.transaction(|conn| {
        diesel::delete(standings_dsl::table).execute(conn)?;
        diesel::delete(gameweek_team_stats::table).execute(conn)?;
        diesel::delete(standings_snapshots::table).execute(conn)?;

        diesel::update(group_members::table)
            .set((
                group_members::points.eq(PointsLedger::default().to_json()?),
                group_members::total_points.eq(0),
            ))
            .execute(conn)?;

        diesel::update(users::table)
            .set((
                users::total_points.eq(0),
                users::weekly_points.eq(0),
                users::total_predictions.eq(0),
                users::correct_predictions.eq(0),
            ))
            .execute(conn)?;

        diesel::update(predictions::table)
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

        diesel::update(matches::table)
            .set(matches::synchronized.eq(0i32))
            .execute(conn)?;

        tracing::info!("derived state reset to unsynced baseline");
        Ok(())
    })
}
