use chrono::Utc;
use diesel::prelude::*;
use diesel::SqliteConnection;

use crate::error::{EngineError, EngineResult};
use crate::model::{
    Gameweek, GameweekTeamStats, Match, MatchStatus, NewGameweekTeamStats, NewStandingsSnapshot,
    SnapshotEntry, StandingsRow,
};
use crate::schema::{gameweek_team_stats, gameweeks, matches, standings, standings_snapshots};
use crate::scoring::Outcome;

/// Result of a gameweek-stats reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameweekResyncOutcome {
    pub matches_processed: usize,
}

/// Applies one finished result to a team's per-gameweek stats row,
/// independently of the cumulative table, and appends the W/D/L letter to
/// the gameweek-scoped running result string.
pub(crate) fn apply_result(
    conn: &mut SqliteConnection,
    gameweek_id: i32,
    team_id: i32,
    goals_for: i32,
    goals_against: i32,
) -> QueryResult<()> {
    let (won, drawn, lost) = if goals_for > goals_against {
        (1, 0, 0)
    } else if goals_for == goals_against {
        (0, 1, 0)
    } else {
        (0, 0, 1)
    };
    let letter = Outcome::letter_for(goals_for, goals_against);

    let existing: Option<GameweekTeamStats> = gameweek_team_stats::table
        .filter(gameweek_team_stats::gameweek_id.eq(gameweek_id))
        .filter(gameweek_team_stats::team_id.eq(team_id))
        .select(GameweekTeamStats::as_select())
        .first(conn)
        .optional()?;

    match existing {
        Some(row) => {
            let new_won = row.won + won;
            let new_drawn = row.drawn + drawn;
            let mut results = row.results.clone();
            results.push(letter);
            diesel::update(gameweek_team_stats::table.filter(gameweek_team_stats::id.eq(row.id)))
                .set((
                    gameweek_team_stats::played.eq(row.played + 1),
                    gameweek_team_stats::won.eq(new_won),
                    gameweek_team_stats::drawn.eq(new_drawn),
                    gameweek_team_stats::lost.eq(row.lost + lost),
                    gameweek_team_stats::goals_for.eq(row.goals_for + goals_for),
                    gameweek_team_stats::goals_against.eq(row.goals_against + goals_against),
                    gameweek_team_stats::points.eq(3 * new_won + new_drawn),
                    gameweek_team_stats::results.eq(results),
                ))
                .execute(conn)?;
        }
        None => {
            diesel::insert_into(gameweek_team_stats::table)
                .values(&NewGameweekTeamStats {
                    gameweek_id,
                    team_id,
                    played: 1,
                    won,
                    drawn,
                    lost,
                    goals_for,
                    goals_against,
                    points: 3 * won + drawn,
                    position: 0,
                    results: letter.to_string(),
                })
                .execute(conn)?;
        }
    }
    Ok(())
}

/// Dense 1-based ranking within one gameweek, same ordering as the
/// cumulative table.
pub(crate) fn recompute_positions(
    conn: &mut SqliteConnection,
    gameweek_id: i32,
) -> QueryResult<()> {
    let mut rows: Vec<GameweekTeamStats> = gameweek_team_stats::table
        .filter(gameweek_team_stats::gameweek_id.eq(gameweek_id))
        .select(GameweekTeamStats::as_select())
        .load(conn)?;

    rows.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then_with(|| b.goal_difference().cmp(&a.goal_difference()))
            .then_with(|| b.goals_for.cmp(&a.goals_for))
    });

    let mut position = 0;
    let mut last_key: Option<(i32, i32, i32)> = None;
    for row in &rows {
        let key = (row.points, row.goal_difference(), row.goals_for);
        if last_key != Some(key) {
            position += 1;
            last_key = Some(key);
        }
        if row.position != position {
            diesel::update(gameweek_team_stats::table.filter(gameweek_team_stats::id.eq(row.id)))
                .set(gameweek_team_stats::position.eq(position))
                .execute(conn)?;
        }
    }
    Ok(())
}

pub(crate) fn fetch_gameweek(
    conn: &mut SqliteConnection,
    gameweek_id: i32,
) -> EngineResult<Gameweek> {
    gameweeks::table
        .filter(gameweeks::id.eq(gameweek_id))
        .select(Gameweek::as_select())
        .first(conn)
        .optional()?
        .ok_or(EngineError::not_found("gameweek", gameweek_id))
}

/// Reconciliation for one gameweek's display table: deletes every stats row
/// for the gameweek and rebuilds them from that gameweek's synchronized
/// finished matches in kickoff order. The cumulative standings are
/// deliberately left untouched, so a single gameweek can be corrected
/// without perturbing the season table.
pub fn resync_gameweek(
    conn: &mut SqliteConnection,
    gameweek_id: i32,
) -> EngineResult<GameweekResyncOutcome> {
    conn.transaction(|conn| {
        fetch_gameweek(conn, gameweek_id)?;
        let outcome = resync_gameweek_in_tx(conn, gameweek_id)?;
        tracing::info!(
            gameweek_id,
            matches = outcome.matches_processed,
            "gameweek stats rebuilt"
        );
        Ok(outcome)
    })
}

/// Delete-and-rebuild body, shared with the unsync path which already runs
/// inside a transaction.
pub(crate) fn resync_gameweek_in_tx(
    conn: &mut SqliteConnection,
    gameweek_id: i32,
) -> EngineResult<GameweekResyncOutcome> {
    diesel::delete(
        gameweek_team_stats::table.filter(gameweek_team_stats::gameweek_id.eq(gameweek_id)),
    )
    .execute(conn)?;

    let finished: Vec<Match> = matches::table
        .filter(matches::gameweek_id.eq(gameweek_id))
        .filter(matches::status.eq(MatchStatus::Finished.as_str()))
        .filter(matches::synchronized.eq(1i32))
        .filter(matches::home_score.is_not_null())
        .filter(matches::away_score.is_not_null())
        .order(matches::kickoff_at.asc())
        .select(Match::as_select())
        .load(conn)?;

    for m in &finished {
        let (home, away) = match m.final_score() {
            Some(score) => score,
            None => continue,
        };
        apply_result(conn, gameweek_id, m.home_team_id, home, away)?;
        apply_result(conn, gameweek_id, m.away_team_id, away, home)?;
    }
    recompute_positions(conn, gameweek_id)?;

    Ok(GameweekResyncOutcome {
        matches_processed: finished.len(),
    })
}

/// Freezes the league table as it stands into a snapshot row for the given
/// gameweek boundary.
pub fn snapshot_league_table(
    conn: &mut SqliteConnection,
    league_id: i32,
    gameweek_id: i32,
) -> EngineResult<()> {
    let table: Vec<StandingsRow> = standings::table
        .filter(standings::league_id.eq(league_id))
        .order((standings::position.asc(), standings::team_id.asc()))
        .select(StandingsRow::as_select())
        .load(conn)?;
    let entries: Vec<SnapshotEntry> = table.iter().map(SnapshotEntry::from).collect();

    diesel::insert_into(standings_snapshots::table)
        .values(&NewStandingsSnapshot {
            league_id,
            gameweek_id,
            table_state: serde_json::to_string(&entries)?,
            taken_at: Utc::now().naive_utc(),
        })
        .execute(conn)?;
    Ok(())
}

/// Returns the most recent frozen table for the (league, gameweek) boundary,
/// if one was taken.
pub fn get_standings_snapshot(
    conn: &mut SqliteConnection,
    league_id: i32,
    gameweek_id: i32,
) -> EngineResult<Option<Vec<SnapshotEntry>>> {
    let raw: Option<String> = standings_snapshots::table
        .filter(standings_snapshots::league_id.eq(league_id))
        .filter(standings_snapshots::gameweek_id.eq(gameweek_id))
        .order(standings_snapshots::taken_at.desc())
        .select(standings_snapshots::table_state)
        .first(conn)
        .optional()?;

    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Read-side view: one gameweek's team stats ordered by rank.
pub fn get_gameweek_table(
    conn: &mut SqliteConnection,
    gameweek_id: i32,
) -> QueryResult<Vec<GameweekTeamStats>> {
    gameweek_team_stats::table
        .filter(gameweek_team_stats::gameweek_id.eq(gameweek_id))
        .order((
            gameweek_team_stats::position.asc(),
            gameweek_team_stats::team_id.asc(),
        ))
        .select(GameweekTeamStats::as_select())
        .load(conn)
}
