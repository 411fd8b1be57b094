use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn default_db_path() -> &'static str {
    "futsync.sqlite"
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")
        .context("enable WAL")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Parent entities (countries through players) are created lazily and
/// only ever updated. Matches own their children: statistics, events
/// and lineup rows go away with the match.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS countries (
            id INTEGER PRIMARY KEY,
            external_id INTEGER NULL UNIQUE,
            name TEXT NOT NULL,
            code TEXT NOT NULL DEFAULT '',
            flag_url TEXT NOT NULL DEFAULT ''
        );
        CREATE INDEX IF NOT EXISTS idx_countries_name ON countries(name);

        CREATE TABLE IF NOT EXISTS competitions (
            id INTEGER PRIMARY KEY,
            external_id INTEGER NOT NULL UNIQUE,
            name TEXT NOT NULL,
            short_name TEXT NOT NULL DEFAULT '',
            country_id INTEGER NULL REFERENCES countries(id) ON DELETE SET NULL,
            kind TEXT NOT NULL DEFAULT 'league',
            priority INTEGER NOT NULL DEFAULT 0,
            logo_url TEXT NOT NULL DEFAULT '',
            has_standings INTEGER NOT NULL DEFAULT 1,
            has_playoffs INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS seasons (
            id INTEGER PRIMARY KEY,
            external_id INTEGER NULL UNIQUE,
            competition_id INTEGER NOT NULL REFERENCES competitions(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            year TEXT NOT NULL DEFAULT '',
            start_year INTEGER NOT NULL,
            end_year INTEGER NULL,
            active INTEGER NOT NULL DEFAULT 1,
            UNIQUE(competition_id, start_year)
        );

        CREATE TABLE IF NOT EXISTS teams (
            id INTEGER PRIMARY KEY,
            external_id INTEGER NOT NULL UNIQUE,
            name TEXT NOT NULL,
            short_name TEXT NOT NULL DEFAULT '',
            country_id INTEGER NULL REFERENCES countries(id) ON DELETE SET NULL,
            venue TEXT NOT NULL DEFAULT '',
            venue_capacity INTEGER NULL,
            founded INTEGER NULL,
            colors TEXT NOT NULL DEFAULT '',
            team_type TEXT NOT NULL DEFAULT 'club'
        );

        CREATE TABLE IF NOT EXISTS players (
            id INTEGER PRIMARY KEY,
            external_id INTEGER NOT NULL UNIQUE,
            name TEXT NOT NULL,
            team_id INTEGER NULL REFERENCES teams(id) ON DELETE SET NULL,
            birth_date TEXT NULL,
            birth_timestamp INTEGER NULL,
            position TEXT NOT NULL DEFAULT 'MF',
            position_detail TEXT NOT NULL DEFAULT '',
            jersey_number INTEGER NULL,
            height REAL NULL,
            nationality_id INTEGER NULL REFERENCES countries(id) ON DELETE SET NULL
        );
        CREATE INDEX IF NOT EXISTS idx_players_team ON players(team_id);

        CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY,
            external_id INTEGER NOT NULL UNIQUE,
            competition_id INTEGER NOT NULL REFERENCES competitions(id) ON DELETE CASCADE,
            season_id INTEGER NOT NULL REFERENCES seasons(id) ON DELETE CASCADE,
            home_team_id INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
            away_team_id INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
            kickoff TEXT NOT NULL DEFAULT '',
            kickoff_timestamp INTEGER NULL,
            round TEXT NOT NULL DEFAULT '',
            home_score INTEGER NULL,
            away_score INTEGER NULL,
            home_score_ht INTEGER NULL,
            away_score_ht INTEGER NULL,
            status TEXT NOT NULL DEFAULT 'notstarted',
            status_code INTEGER NULL,
            status_description TEXT NOT NULL DEFAULT '',
            winner_team_id INTEGER NULL REFERENCES teams(id) ON DELETE SET NULL,
            has_statistics INTEGER NOT NULL DEFAULT 0,
            has_events INTEGER NOT NULL DEFAULT 0,
            has_lineups INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT ''
        );
        CREATE INDEX IF NOT EXISTS idx_matches_competition ON matches(competition_id, season_id);
        CREATE INDEX IF NOT EXISTS idx_matches_status ON matches(status, kickoff);

        CREATE TABLE IF NOT EXISTS match_statistics (
            id INTEGER PRIMARY KEY,
            match_id INTEGER NOT NULL REFERENCES matches(id) ON DELETE CASCADE,
            period TEXT NOT NULL DEFAULT 'ALL',
            possession_home REAL NULL,
            possession_away REAL NULL,
            shots_home INTEGER NOT NULL DEFAULT 0,
            shots_away INTEGER NOT NULL DEFAULT 0,
            shots_on_target_home INTEGER NOT NULL DEFAULT 0,
            shots_on_target_away INTEGER NOT NULL DEFAULT 0,
            shots_off_target_home INTEGER NOT NULL DEFAULT 0,
            shots_off_target_away INTEGER NOT NULL DEFAULT 0,
            shots_blocked_home INTEGER NOT NULL DEFAULT 0,
            shots_blocked_away INTEGER NOT NULL DEFAULT 0,
            corners_home INTEGER NOT NULL DEFAULT 0,
            corners_away INTEGER NOT NULL DEFAULT 0,
            fouls_home INTEGER NOT NULL DEFAULT 0,
            fouls_away INTEGER NOT NULL DEFAULT 0,
            yellow_cards_home INTEGER NOT NULL DEFAULT 0,
            yellow_cards_away INTEGER NOT NULL DEFAULT 0,
            red_cards_home INTEGER NOT NULL DEFAULT 0,
            red_cards_away INTEGER NOT NULL DEFAULT 0,
            offsides_home INTEGER NOT NULL DEFAULT 0,
            offsides_away INTEGER NOT NULL DEFAULT 0,
            extra TEXT NOT NULL DEFAULT '{}',
            UNIQUE(match_id, period)
        );

        CREATE TABLE IF NOT EXISTS match_events (
            id INTEGER PRIMARY KEY,
            match_id INTEGER NOT NULL REFERENCES matches(id) ON DELETE CASCADE,
            external_id INTEGER NULL,
            player_id INTEGER NULL REFERENCES players(id) ON DELETE SET NULL,
            related_player_id INTEGER NULL REFERENCES players(id) ON DELETE SET NULL,
            minute INTEGER NOT NULL DEFAULT 0,
            added_minute INTEGER NULL,
            second INTEGER NULL,
            kind TEXT NOT NULL,
            text TEXT NOT NULL DEFAULT '',
            is_home INTEGER NOT NULL DEFAULT 1
        );
        CREATE INDEX IF NOT EXISTS idx_match_events_match ON match_events(match_id, minute);

        CREATE TABLE IF NOT EXISTS lineups (
            id INTEGER PRIMARY KEY,
            match_id INTEGER NOT NULL REFERENCES matches(id) ON DELETE CASCADE,
            player_id INTEGER NOT NULL REFERENCES players(id) ON DELETE CASCADE,
            is_home INTEGER NOT NULL DEFAULT 1,
            is_starter INTEGER NOT NULL DEFAULT 1,
            position TEXT NOT NULL DEFAULT '',
            jersey_number INTEGER NULL,
            rating REAL NULL,
            minutes_played INTEGER NOT NULL DEFAULT 0,
            goals INTEGER NOT NULL DEFAULT 0,
            assists INTEGER NOT NULL DEFAULT 0,
            yellow_cards INTEGER NOT NULL DEFAULT 0,
            red_cards INTEGER NOT NULL DEFAULT 0,
            UNIQUE(match_id, player_id)
        );

        CREATE TABLE IF NOT EXISTS sync_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            scope TEXT NOT NULL,
            items_total INTEGER NOT NULL DEFAULT 0,
            items_failed INTEGER NOT NULL DEFAULT 0,
            counts_json TEXT NOT NULL DEFAULT '{}',
            errors_json TEXT NOT NULL DEFAULT '[]'
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::open_in_memory;

    #[test]
    fn schema_initializes_twice() {
        let conn = open_in_memory().expect("schema");
        super::init_schema(&conn).expect("idempotent schema");
    }

    #[test]
    fn deleting_a_match_cascades_to_children() {
        let conn = open_in_memory().expect("schema");
        conn.execute_batch(
            r#"
            INSERT INTO countries(id, name) VALUES (1, 'Spain');
            INSERT INTO competitions(id, external_id, name) VALUES (1, 8, 'LaLiga');
            INSERT INTO seasons(id, external_id, competition_id, name, start_year)
                VALUES (1, 61643, 1, '2024/25', 2024);
            INSERT INTO teams(id, external_id, name) VALUES (1, 10, 'Home'), (2, 11, 'Away');
            INSERT INTO players(id, external_id, name) VALUES (1, 99, 'P');
            INSERT INTO matches(id, external_id, competition_id, season_id, home_team_id, away_team_id)
                VALUES (1, 1000, 1, 1, 1, 2);
            INSERT INTO match_statistics(match_id, period) VALUES (1, 'ALL');
            INSERT INTO match_events(match_id, kind) VALUES (1, 'goal');
            INSERT INTO lineups(match_id, player_id) VALUES (1, 1);
            DELETE FROM matches WHERE id = 1;
            "#,
        )
        .expect("seed and delete");

        let count = |table: &str| -> i64 {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .unwrap()
        };
        assert_eq!(count("match_statistics"), 0);
        assert_eq!(count("match_events"), 0);
        assert_eq!(count("lineups"), 0);
    }
}
