pub mod error;
pub mod gameweek;
pub mod groups;
pub mod model;
pub mod reconcile;
pub mod rules;
pub mod schema;
pub mod scoring;
pub mod standings;
pub mod sync;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::SqliteConnection;
use dotenvy::dotenv;
use std::env;

pub use error::{EngineError, EngineResult};

pub fn establish_connection() -> SqliteConnection {
    dotenv().ok();
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set in .env");
    let mut conn = SqliteConnection::establish(&database_url)
        .unwrap_or_else(|_| panic!("Error connecting to {}", database_url));

    // Enable WAL mode to allow concurrent reads during writes, and a timeout to retry locked
    // operations.
    conn.batch_execute(
        "PRAGMA foreign_keys = ON; \
        PRAGMA journal_mode = WAL; \
        PRAGMA synchronous = NORMAL; \
        PRAGMA busy_timeout = 10000;",
    )
    .expect("Failed to set SQLite PRAGMAs");

    conn
}

/// Connection pool for the web layer. Engine functions themselves only need a
/// single `&mut SqliteConnection`.
pub fn establish_pool() -> Pool<ConnectionManager<SqliteConnection>> {
    dotenv().ok();
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set in .env");
    let manager = ConnectionManager::<SqliteConnection>::new(&database_url);
    Pool::builder()
        .build(manager)
        .expect("Failed to create pool.")
}

/// Creates every table the engine touches. Used by tests against in-memory
/// SQLite and by fresh deployments; existing tables are left alone.
pub fn init_schema(conn: &mut SqliteConnection) -> QueryResult<()> {
    conn.batch_execute(
        "CREATE TABLE IF NOT EXISTS leagues (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            name TEXT NOT NULL,
            season TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE IF NOT EXISTS teams (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            name TEXT NOT NULL,
            short_name TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS gameweeks (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            league_id INTEGER NOT NULL REFERENCES leagues(id),
            number INTEGER NOT NULL,
            UNIQUE (league_id, number)
        );
        CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            league_id INTEGER NOT NULL REFERENCES leagues(id),
            gameweek_id INTEGER REFERENCES gameweeks(id),
            home_team_id INTEGER NOT NULL REFERENCES teams(id),
            away_team_id INTEGER NOT NULL REFERENCES teams(id),
            kickoff_at TIMESTAMP NOT NULL,
            status TEXT NOT NULL DEFAULT 'scheduled',
            home_score INTEGER,
            away_score INTEGER,
            synchronized INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            name TEXT NOT NULL,
            total_points INTEGER NOT NULL DEFAULT 0,
            weekly_points INTEGER NOT NULL DEFAULT 0,
            total_predictions INTEGER NOT NULL DEFAULT 0,
            correct_predictions INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE IF NOT EXISTS predictions (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            user_id INTEGER NOT NULL REFERENCES users(id),
            match_id INTEGER NOT NULL REFERENCES matches(id),
            predicted_home INTEGER NOT NULL,
            predicted_away INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            processed INTEGER NOT NULL DEFAULT 0,
            home_score_points INTEGER,
            away_score_points INTEGER,
            outcome_points INTEGER,
            total_goals_points INTEGER,
            goal_difference_points INTEGER,
            exact_score_bonus_points INTEGER,
            total_points INTEGER,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (user_id, match_id)
        );
        CREATE TABLE IF NOT EXISTS standings (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            league_id INTEGER NOT NULL REFERENCES leagues(id),
            team_id INTEGER NOT NULL REFERENCES teams(id),
            played INTEGER NOT NULL DEFAULT 0,
            won INTEGER NOT NULL DEFAULT 0,
            drawn INTEGER NOT NULL DEFAULT 0,
            lost INTEGER NOT NULL DEFAULT 0,
            goals_for INTEGER NOT NULL DEFAULT 0,
            goals_against INTEGER NOT NULL DEFAULT 0,
            points INTEGER NOT NULL DEFAULT 0,
            position INTEGER NOT NULL DEFAULT 0,
            form TEXT NOT NULL DEFAULT '',
            UNIQUE (league_id, team_id)
        );
        CREATE TABLE IF NOT EXISTS gameweek_team_stats (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            gameweek_id INTEGER NOT NULL REFERENCES gameweeks(id),
            team_id INTEGER NOT NULL REFERENCES teams(id),
            played INTEGER NOT NULL DEFAULT 0,
            won INTEGER NOT NULL DEFAULT 0,
            drawn INTEGER NOT NULL DEFAULT 0,
            lost INTEGER NOT NULL DEFAULT 0,
            goals_for INTEGER NOT NULL DEFAULT 0,
            goals_against INTEGER NOT NULL DEFAULT 0,
            points INTEGER NOT NULL DEFAULT 0,
            position INTEGER NOT NULL DEFAULT 0,
            results TEXT NOT NULL DEFAULT '',
            UNIQUE (gameweek_id, team_id)
        );
        CREATE TABLE IF NOT EXISTS standings_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            league_id INTEGER NOT NULL REFERENCES leagues(id),
            gameweek_id INTEGER NOT NULL REFERENCES gameweeks(id),
            table_state TEXT NOT NULL,
            taken_at TIMESTAMP NOT NULL
        );
        CREATE TABLE IF NOT EXISTS groups (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            league_id INTEGER REFERENCES leagues(id),
            join_code TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE IF NOT EXISTS group_allowed_teams (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            group_id INTEGER NOT NULL REFERENCES groups(id),
            team_id INTEGER NOT NULL REFERENCES teams(id),
            UNIQUE (group_id, team_id)
        );
        CREATE TABLE IF NOT EXISTS group_members (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            group_id INTEGER NOT NULL REFERENCES groups(id),
            user_id INTEGER NOT NULL REFERENCES users(id),
            points TEXT NOT NULL DEFAULT '{}',
            total_points INTEGER NOT NULL DEFAULT 0,
            joined_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (group_id, user_id)
        );
        CREATE TABLE IF NOT EXISTS scoring_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            rule_type TEXT NOT NULL UNIQUE,
            points INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1
        );
        CREATE TABLE IF NOT EXISTS app_settings (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            key TEXT NOT NULL UNIQUE,
            value TEXT NOT NULL
        );",
    )
}
