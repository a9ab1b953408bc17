use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a match. Stored as `Text` in the `matches` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStatus {
    Scheduled,
    Live,
    Finished,
    Postponed,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Live => "live",
            MatchStatus::Finished => "finished",
            MatchStatus::Postponed => "postponed",
            MatchStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<MatchStatus> {
        match s {
            "scheduled" => Some(MatchStatus::Scheduled),
            "live" => Some(MatchStatus::Live),
            "finished" => Some(MatchStatus::Finished),
            "postponed" => Some(MatchStatus::Postponed),
            "cancelled" => Some(MatchStatus::Cancelled),
            _ => None,
        }
    }
}

/// Lifecycle status of a prediction. Stored as `Text` in the `predictions` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionStatus {
    Pending,
    Completed,
}

impl PredictionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionStatus::Pending => "pending",
            PredictionStatus::Completed => "completed",
        }
    }
}

/// Visibility of a group. Stored as `Text` in the `groups` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupKind {
    Public,
    Private,
}

impl GroupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKind::Public => "public",
            GroupKind::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Option<GroupKind> {
        match s {
            "public" => Some(GroupKind::Public),
            "private" => Some(GroupKind::Private),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::leagues)]
pub struct League {
    pub id: i32,
    pub name: String,
    pub season: String,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::leagues)]
pub struct NewLeague<'a> {
    pub name: &'a str,
    pub season: &'a str,
    // created_at uses default
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::teams)]
pub struct Team {
    pub id: i32,
    pub name: String,
    pub short_name: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::teams)]
pub struct NewTeam<'a> {
    pub name: &'a str,
    pub short_name: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::gameweeks)]
pub struct Gameweek {
    pub id: i32,
    pub league_id: i32,
    pub number: i32,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::gameweeks)]
pub struct NewGameweek {
    pub league_id: i32,
    pub number: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::matches)]
#[diesel(check_for_backend(Sqlite))]
pub struct Match {
    pub id: i32,
    pub league_id: i32,
    pub gameweek_id: Option<i32>,
    pub home_team_id: i32,
    pub away_team_id: i32,
    pub kickoff_at: NaiveDateTime,
    pub status: String,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub synchronized: i32,
}

impl Match {
    pub fn is_finished(&self) -> bool {
        self.status == MatchStatus::Finished.as_str()
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized == 1
    }

    /// Returns (home, away) once both final scores are present.
    pub fn final_score(&self) -> Option<(i32, i32)> {
        match (self.home_score, self.away_score) {
            (Some(h), Some(a)) => Some((h, a)),
            _ => None,
        }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::matches)]
pub struct NewMatch {
    pub league_id: i32,
    pub gameweek_id: Option<i32>,
    pub home_team_id: i32,
    pub away_team_id: i32,
    pub kickoff_at: NaiveDateTime,
    pub status: String,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    // synchronized uses default (0)
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub total_points: i32,
    pub weekly_points: i32,
    pub total_predictions: i32,
    pub correct_predictions: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser<'a> {
    pub name: &'a str,
    // counters and created_at use defaults
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::predictions)]
#[diesel(check_for_backend(Sqlite))]
pub struct Prediction {
    pub id: i32,
    pub user_id: i32,
    pub match_id: i32,
    pub predicted_home: i32,
    pub predicted_away: i32,
    pub status: String,
    pub processed: i32,
    pub home_score_points: Option<i32>,
    pub away_score_points: Option<i32>,
    pub outcome_points: Option<i32>,
    pub total_goals_points: Option<i32>,
    pub goal_difference_points: Option<i32>,
    pub exact_score_bonus_points: Option<i32>,
    pub total_points: Option<i32>,
    pub created_at: NaiveDateTime,
}

impl Prediction {
    pub fn is_processed(&self) -> bool {
        self.processed == 1
    }

    /// True once the breakdown has been computed, regardless of the processed flag.
    pub fn is_scored(&self) -> bool {
        self.total_points.is_some()
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::predictions)]
pub struct NewPrediction {
    pub user_id: i32,
    pub match_id: i32,
    pub predicted_home: i32,
    pub predicted_away: i32,
    // status defaults to pending, processed to 0, breakdown columns to NULL
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::standings)]
pub struct StandingsRow {
    pub id: i32,
    pub league_id: i32,
    pub team_id: i32,
    pub played: i32,
    pub won: i32,
    pub drawn: i32,
    pub lost: i32,
    pub goals_for: i32,
    pub goals_against: i32,
    pub points: i32,
    pub position: i32,
    pub form: String,
}

impl StandingsRow {
    pub fn goal_difference(&self) -> i32 {
        self.goals_for - self.goals_against
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::standings)]
pub struct NewStandingsRow {
    pub league_id: i32,
    pub team_id: i32,
    pub played: i32,
    pub won: i32,
    pub drawn: i32,
    pub lost: i32,
    pub goals_for: i32,
    pub goals_against: i32,
    pub points: i32,
    pub position: i32,
    pub form: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::gameweek_team_stats)]
pub struct GameweekTeamStats {
    pub id: i32,
    pub gameweek_id: i32,
    pub team_id: i32,
    pub played: i32,
    pub won: i32,
    pub drawn: i32,
    pub lost: i32,
    pub goals_for: i32,
    pub goals_against: i32,
    pub points: i32,
    pub position: i32,
    pub results: String,
}

impl GameweekTeamStats {
    pub fn goal_difference(&self) -> i32 {
        self.goals_for - self.goals_against
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::gameweek_team_stats)]
pub struct NewGameweekTeamStats {
    pub gameweek_id: i32,
    pub team_id: i32,
    pub played: i32,
    pub won: i32,
    pub drawn: i32,
    pub lost: i32,
    pub goals_for: i32,
    pub goals_against: i32,
    pub points: i32,
    pub position: i32,
    pub results: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::standings_snapshots)]
pub struct StandingsSnapshot {
    pub id: i32,
    pub league_id: i32,
    pub gameweek_id: i32,
    pub table_state: String,
    pub taken_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::standings_snapshots)]
pub struct NewStandingsSnapshot {
    pub league_id: i32,
    pub gameweek_id: i32,
    pub table_state: String,
    pub taken_at: NaiveDateTime,
}

/// One frozen table row inside a snapshot's JSON `table_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub team_id: i32,
    pub played: i32,
    pub won: i32,
    pub drawn: i32,
    pub lost: i32,
    pub goals_for: i32,
    pub goals_against: i32,
    pub points: i32,
    pub position: i32,
    pub form: String,
}

impl From<&StandingsRow> for SnapshotEntry {
    fn from(row: &StandingsRow) -> Self {
        SnapshotEntry {
            team_id: row.team_id,
            played: row.played,
            won: row.won,
            drawn: row.drawn,
            lost: row.lost,
            goals_for: row.goals_for,
            goals_against: row.goals_against,
            points: row.points,
            position: row.position,
            form: row.form.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::groups)]
#[diesel(check_for_backend(Sqlite))]
pub struct Group {
    pub id: i32,
    pub name: String,
    pub kind: String,
    pub league_id: Option<i32>,
    pub join_code: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Group {
    pub fn is_public(&self) -> bool {
        self.kind == GroupKind::Public.as_str()
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::groups)]
pub struct NewGroup<'a> {
    pub name: &'a str,
    pub kind: String,
    pub league_id: Option<i32>,
    pub join_code: Option<&'a str>,
    // created_at uses default
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::group_allowed_teams)]
pub struct GroupAllowedTeam {
    pub id: i32,
    pub group_id: i32,
    pub team_id: i32,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::group_allowed_teams)]
pub struct NewGroupAllowedTeam {
    pub group_id: i32,
    pub team_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::group_members)]
pub struct GroupMember {
    pub id: i32,
    pub group_id: i32,
    pub user_id: i32,
    pub points: String,
    pub total_points: i32,
    pub joined_at: NaiveDateTime,
}

impl GroupMember {
    pub fn ledger(&self) -> serde_json::Result<PointsLedger> {
        PointsLedger::from_json(&self.points)
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::group_members)]
pub struct NewGroupMember {
    pub group_id: i32,
    pub user_id: i32,
    pub points: String,
    pub total_points: i32,
    // joined_at uses default
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::scoring_rules)]
pub struct ScoringRule {
    pub id: i32,
    pub rule_type: String,
    pub points: i32,
    pub is_active: i32,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::scoring_rules)]
pub struct NewScoringRule<'a> {
    pub rule_type: &'a str,
    pub points: i32,
    pub is_active: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::app_settings)]
pub struct AppSetting {
    pub id: i32,
    pub key: String,
    pub value: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::app_settings)]
pub struct NewAppSetting<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

/// Per-member points, split by league and by gameweek within each league.
/// Stored as JSON in the `group_members.points` column. All mutations go
/// through the accessors so the total always equals the sum over
/// `by_league`; the total itself is derived, never stored in the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsLedger {
    #[serde(default)]
    pub by_league: BTreeMap<i32, i32>,
    #[serde(default)]
    pub by_gameweek: BTreeMap<i32, BTreeMap<i32, i32>>,
}

impl PointsLedger {
    /// Adds earned points to the league bucket and, when a gameweek number
    /// is supplied, to the (league, gameweek) bucket as well.
    pub fn add(&mut self, league_id: i32, gameweek: Option<i32>, points: i32) {
        *self.by_league.entry(league_id).or_insert(0) += points;
        if let Some(number) = gameweek {
            *self
                .by_gameweek
                .entry(league_id)
                .or_default()
                .entry(number)
                .or_insert(0) += points;
        }
    }

    pub fn total_points(&self) -> i32 {
        self.by_league.values().sum()
    }

    pub fn league_points(&self, league_id: i32) -> i32 {
        self.by_league.get(&league_id).copied().unwrap_or(0)
    }

    pub fn gameweek_points(&self, league_id: i32, gameweek: i32) -> i32 {
        self.by_gameweek
            .get(&league_id)
            .and_then(|per_week| per_week.get(&gameweek))
            .copied()
            .unwrap_or(0)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<PointsLedger> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_total_tracks_league_sum() {
        let mut ledger = PointsLedger::default();
        ledger.add(1, Some(3), 7);
        ledger.add(1, Some(4), 5);
        ledger.add(2, None, 3);

        assert_eq!(ledger.league_points(1), 12);
        assert_eq!(ledger.league_points(2), 3);
        assert_eq!(ledger.gameweek_points(1, 3), 7);
        assert_eq!(ledger.gameweek_points(1, 4), 5);
        assert_eq!(ledger.gameweek_points(2, 1), 0);
        assert_eq!(
            ledger.total_points(),
            ledger.by_league.values().sum::<i32>()
        );
    }

    #[test]
    fn test_ledger_round_trips_through_json() {
        let mut ledger = PointsLedger::default();
        ledger.add(5, Some(1), 10);
        ledger.add(9, None, 2);

        let raw = ledger.to_json().expect("Failed to serialize ledger");
        let parsed = PointsLedger::from_json(&raw).expect("Failed to parse ledger");
        assert_eq!(parsed, ledger);

        // An empty blob parses to an empty ledger.
        let empty = PointsLedger::from_json("{}").expect("Failed to parse empty ledger");
        assert_eq!(empty.total_points(), 0);
    }
}
