use diesel::prelude::*;
use diesel::SqliteConnection;

use crate::model::{Match, MatchStatus, NewStandingsRow, StandingsRow};
use crate::schema::{matches, standings};
use crate::scoring::Outcome;

/// Applies one finished result to a team's cumulative standings row. Creates
/// the row with played = 1 if the team has no row in this league yet,
/// otherwise increments the counters. Points are always recomputed as
/// 3 * won + drawn. Positions and form are left to their own passes.
pub(crate) fn apply_result(
    conn: &mut SqliteConnection,
    league_id: i32,
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

    let existing: Option<StandingsRow> = standings::table
        .filter(standings::league_id.eq(league_id))
        .filter(standings::team_id.eq(team_id))
        .select(StandingsRow::as_select())
        .first(conn)
        .optional()?;

    match existing {
        Some(row) => {
            let new_won = row.won + won;
            let new_drawn = row.drawn + drawn;
            diesel::update(standings::table.filter(standings::id.eq(row.id)))
                .set((
                    standings::played.eq(row.played + 1),
                    standings::won.eq(new_won),
                    standings::drawn.eq(new_drawn),
                    standings::lost.eq(row.lost + lost),
                    standings::goals_for.eq(row.goals_for + goals_for),
                    standings::goals_against.eq(row.goals_against + goals_against),
                    standings::points.eq(3 * new_won + new_drawn),
                ))
                .execute(conn)?;
        }
        None => {
            diesel::insert_into(standings::table)
                .values(&NewStandingsRow {
                    league_id,
                    team_id,
                    played: 1,
                    won,
                    drawn,
                    lost,
                    goals_for,
                    goals_against,
                    points: 3 * won + drawn,
                    position: 0,
                    form: String::new(),
                })
                .execute(conn)?;
        }
    }
    Ok(())
}

/// Recomputes positions for the whole league: sort by (points desc, goal
/// difference desc, goals for desc) and assign dense 1-based ranks. Teams
/// tied on all three keys share a position.
pub(crate) fn recompute_positions(conn: &mut SqliteConnection, league_id: i32) -> QueryResult<()> {
    let mut rows: Vec<StandingsRow> = standings::table
        .filter(standings::league_id.eq(league_id))
        .select(StandingsRow::as_select())
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
            diesel::update(standings::table.filter(standings::id.eq(row.id)))
                .set(standings::position.eq(position))
                .execute(conn)?;
        }
    }
    Ok(())
}

/// Builds a team's form string: outcome letters of its last 5 finished
/// matches league-wide (not gameweek-scoped), oldest first.
pub(crate) fn compute_form(
    conn: &mut SqliteConnection,
    league_id: i32,
    team_id: i32,
) -> QueryResult<String> {
    let recent: Vec<Match> = matches::table
        .filter(matches::league_id.eq(league_id))
        .filter(matches::status.eq(MatchStatus::Finished.as_str()))
        .filter(matches::home_score.is_not_null())
        .filter(matches::away_score.is_not_null())
        .filter(
            matches::home_team_id
                .eq(team_id)
                .or(matches::away_team_id.eq(team_id)),
        )
        .order(matches::kickoff_at.desc())
        .limit(5)
        .select(Match::as_select())
        .load(conn)?;

    // Queried most-recent-first; reverse for display order.
    let mut letters: Vec<char> = recent
        .iter()
        .filter_map(|m| {
            let (home, away) = m.final_score()?;
            let (goals_for, goals_against) = if m.home_team_id == team_id {
                (home, away)
            } else {
                (away, home)
            };
            Some(Outcome::letter_for(goals_for, goals_against))
        })
        .collect();
    letters.reverse();
    Ok(letters.into_iter().collect())
}

/// Recomputes and persists a team's form string.
pub(crate) fn refresh_form(
    conn: &mut SqliteConnection,
    league_id: i32,
    team_id: i32,
) -> QueryResult<()> {
    let form = compute_form(conn, league_id, team_id)?;
    diesel::update(
        standings::table
            .filter(standings::league_id.eq(league_id))
            .filter(standings::team_id.eq(team_id)),
    )
    .set(standings::form.eq(form))
    .execute(conn)?;
    Ok(())
}

/// Read-side view: the league table ordered by rank.
pub fn get_league_table(
    conn: &mut SqliteConnection,
    league_id: i32,
) -> QueryResult<Vec<StandingsRow>> {
    standings::table
        .filter(standings::league_id.eq(league_id))
        .order((standings::position.asc(), standings::team_id.asc()))
        .select(StandingsRow::as_select())
        .load(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn test_apply_result_creates_then_increments() {
        let mut conn = test_conn();
        let league = insert_league(&mut conn, "Premier League");
        let team = insert_team(&mut conn, "Arsenal");

        apply_result(&mut conn, league, team, 2, 0).expect("Failed to apply first result");
        apply_result(&mut conn, league, team, 1, 1).expect("Failed to apply second result");
        apply_result(&mut conn, league, team, 0, 3).expect("Failed to apply third result");

        let table = get_league_table(&mut conn, league).expect("Failed to read table");
        assert_eq!(table.len(), 1);
        let row = &table[0];
        assert_eq!(row.played, 3);
        assert_eq!(row.won, 1);
        assert_eq!(row.drawn, 1);
        assert_eq!(row.lost, 1);
        assert_eq!(row.goals_for, 3);
        assert_eq!(row.goals_against, 4);
        assert_eq!(row.points, 3 * row.won + row.drawn);
        assert_eq!(row.goal_difference(), -1);
    }

    #[test]
    fn test_positions_are_dense_and_tie_aware() {
        let mut conn = test_conn();
        let league = insert_league(&mut conn, "Premier League");
        let alpha = insert_team(&mut conn, "Alpha");
        let beta = insert_team(&mut conn, "Beta");
        let gamma = insert_team(&mut conn, "Gamma");
        let delta = insert_team(&mut conn, "Delta");

        // Alpha and Beta end up identical on all three keys; Gamma has the
        // same points but a worse goal difference; Delta loses everything.
        apply_result(&mut conn, league, alpha, 2, 0).expect("Failed to apply result");
        apply_result(&mut conn, league, beta, 2, 0).expect("Failed to apply result");
        apply_result(&mut conn, league, gamma, 1, 0).expect("Failed to apply result");
        apply_result(&mut conn, league, delta, 0, 2).expect("Failed to apply result");
        recompute_positions(&mut conn, league).expect("Failed to recompute positions");

        let table = get_league_table(&mut conn, league).expect("Failed to read table");
        let position_of = |team_id: i32| {
            table
                .iter()
                .find(|r| r.team_id == team_id)
                .expect("Missing row")
                .position
        };
        assert_eq!(position_of(alpha), 1);
        assert_eq!(position_of(beta), 1);
        assert_eq!(position_of(gamma), 2);
        assert_eq!(position_of(delta), 3);
    }

    #[test]
    fn test_form_is_last_five_oldest_first() {
        let mut conn = test_conn();
        let league = insert_league(&mut conn, "Premier League");
        let team = insert_team(&mut conn, "Arsenal");
        let rival = insert_team(&mut conn, "Spurs");

        // Six finished matches; only the most recent five count. Results for
        // the team, in kickoff order: W, L, D, W, W, L.
        let fixtures = [
            ((3, 0), "2025-08-01 15:00:00"),
            ((0, 1), "2025-08-08 15:00:00"),
            ((2, 2), "2025-08-15 15:00:00"),
            ((1, 0), "2025-08-22 15:00:00"),
            ((4, 2), "2025-08-29 15:00:00"),
            ((0, 2), "2025-09-05 15:00:00"),
        ];
        for (score, kickoff) in fixtures {
            insert_finished_match(&mut conn, league, None, team, rival, score, kickoff);
        }
        // An away fixture in another league must not contribute.
        let other = insert_league(&mut conn, "Cup");
        insert_finished_match(&mut conn, other, None, rival, team, (0, 5), "2025-09-06 15:00:00");

        let form = compute_form(&mut conn, league, team).expect("Failed to compute form");
        assert_eq!(form, "LDWWL");
    }

    #[test]
    fn test_form_reads_away_matches_from_team_perspective() {
        let mut conn = test_conn();
        let league = insert_league(&mut conn, "Premier League");
        let team = insert_team(&mut conn, "Arsenal");
        let rival = insert_team(&mut conn, "Spurs");

        // Team away, winning 0-2.
        insert_finished_match(&mut conn, league, None, rival, team, (0, 2), "2025-08-01 15:00:00");
        let form = compute_form(&mut conn, league, team).expect("Failed to compute form");
        assert_eq!(form, "W");

        let rival_form = compute_form(&mut conn, league, rival).expect("Failed to compute form");
        assert_eq!(rival_form, "L");
    }
}
