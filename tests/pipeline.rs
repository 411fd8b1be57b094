use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::{Value, json};

use futsync::batch::{BatchOptions, sync_by_date};
use futsync::db::open_in_memory;
use futsync::error::SyncError;
use futsync::orchestrate::sync_match;
use futsync::provider::{Provider, Resource};
use futsync::reconcile::{SyncCounts, resolve_player};

const EVENT_ID: i64 = 12000;

fn read_fixture(name: &str) -> Value {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    let raw = fs::read_to_string(path).expect("fixture file should be readable");
    serde_json::from_str(&raw).expect("fixture should be valid json")
}

/// Canned-response provider; anything not registered fails the way a
/// 404 from the live feed does.
struct FakeProvider {
    responses: HashMap<Resource, Value>,
}

impl FakeProvider {
    fn new() -> Self {
        FakeProvider {
            responses: HashMap::new(),
        }
    }

    fn with(mut self, resource: Resource, payload: Value) -> Self {
        self.responses.insert(resource, payload);
        self
    }

    fn with_details(self) -> Self {
        self.with(
            Resource::EventStatistics { event_id: EVENT_ID },
            read_fixture("statistics.json"),
        )
        .with(
            Resource::EventIncidents { event_id: EVENT_ID },
            read_fixture("incidents.json"),
        )
        .with(
            Resource::EventLineups { event_id: EVENT_ID },
            read_fixture("lineups.json"),
        )
    }
}

impl Provider for FakeProvider {
    fn fetch(&self, resource: &Resource) -> Result<Value, SyncError> {
        self.responses
            .get(resource)
            .cloned()
            .ok_or_else(|| SyncError::Fetch {
                resource: resource.to_string(),
                message: "no canned response".to_string(),
            })
    }
}

/// Rosters in place before any detail sync, the way the season presync
/// leaves them. Player 999999 and 888888 stay deliberately unknown.
fn seed_players(conn: &rusqlite::Connection) {
    let mut counts = SyncCounts::default();
    for (id, name, position) in [
        (301, "Mohamed Salah", "F"),
        (302, "Dominik Szoboszlai", "M"),
        (303, "Cody Gakpo", "F"),
        (304, "Federico Chiesa", "F"),
        (401, "Marcos Senesi", "D"),
        (402, "Neto", "G"),
    ] {
        resolve_player(
            conn,
            &json!({"id": id, "name": name, "position": position}),
            None,
            &mut counts,
        )
        .expect("seed player");
    }
}

fn table_count(conn: &rusqlite::Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
    .expect("count query")
}

fn match_flags(conn: &rusqlite::Connection, match_id: i64) -> (bool, bool, bool) {
    conn.query_row(
        "SELECT has_statistics, has_events, has_lineups FROM matches WHERE id = ?1",
        [match_id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )
    .expect("match row")
}

#[test]
fn finished_match_syncs_end_to_end() {
    let conn = open_in_memory().expect("db");
    seed_players(&conn);
    let provider = FakeProvider::new().with_details();
    let event = read_fixture("event_finished.json");
    let mut counts = SyncCounts::default();

    let outcome = sync_match(&conn, &provider, &event, &mut counts).expect("sync");
    assert!(outcome.created);
    assert!(outcome.details_synced);

    let (status, home, away, home_ht, away_ht, round): (String, i64, i64, i64, i64, String) = conn
        .query_row(
            "SELECT status, home_score, away_score, home_score_ht, away_score_ht, round
             FROM matches WHERE id = ?1",
            [outcome.match_id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )
        .expect("match row");
    assert_eq!(status, "finished");
    assert_eq!((home, away), (3, 1));
    assert_eq!((home_ht, away_ht), (2, 0));
    assert_eq!(round, "Round 5");

    // Winner resolves to the home team's local row.
    let (winner, home_team): (i64, i64) = conn
        .query_row(
            "SELECT winner_team_id, home_team_id FROM matches WHERE id = ?1",
            [outcome.match_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("match row");
    assert_eq!(winner, home_team);

    assert_eq!(match_flags(&conn, outcome.match_id), (true, true, true));
    assert_eq!(table_count(&conn, "match_statistics"), 2);
    assert_eq!(table_count(&conn, "match_events"), 5);
    // Four home entries minus the unknown trialist, plus two away.
    assert_eq!(table_count(&conn, "lineups"), 5);

    let possession: f64 = conn
        .query_row(
            "SELECT possession_home FROM match_statistics WHERE match_id = ?1 AND period = 'ALL'",
            [outcome.match_id],
            |row| row.get(0),
        )
        .expect("stat row");
    assert_eq!(possession, 61.0);

    // A metric with no dedicated column lands in the side channel.
    let extra: String = conn
        .query_row(
            "SELECT extra FROM match_statistics WHERE match_id = ?1 AND period = 'ALL'",
            [outcome.match_id],
            |row| row.get(0),
        )
        .expect("stat row");
    let extra: Value = serde_json::from_str(&extra).expect("extra json");
    assert_eq!(extra["Big chances"]["home"], json!(4));
}

#[test]
fn percent_and_null_possession_store_as_float_and_null() {
    let conn = open_in_memory().expect("db");
    seed_players(&conn);
    let provider = FakeProvider::new().with_details();
    let event = read_fixture("event_finished.json");
    let mut counts = SyncCounts::default();

    let outcome = sync_match(&conn, &provider, &event, &mut counts).expect("sync");

    // The first-half group carries "55%" for home and null for away.
    let (home, away): (Option<f64>, Option<f64>) = conn
        .query_row(
            "SELECT possession_home, possession_away FROM match_statistics
             WHERE match_id = ?1 AND period = '1H'",
            [outcome.match_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("stat row");
    assert_eq!(home, Some(55.0));
    assert_eq!(away, None);
}

#[test]
fn resync_is_idempotent() {
    let conn = open_in_memory().expect("db");
    seed_players(&conn);
    let provider = FakeProvider::new().with_details();
    let event = read_fixture("event_finished.json");
    let mut counts = SyncCounts::default();

    let first = sync_match(&conn, &provider, &event, &mut counts).expect("sync");
    let snapshot: Vec<i64> = [
        "countries",
        "competitions",
        "seasons",
        "teams",
        "matches",
        "match_statistics",
        "match_events",
        "lineups",
    ]
    .iter()
    .map(|t| table_count(&conn, t))
    .collect();

    let second = sync_match(&conn, &provider, &event, &mut counts).expect("sync");
    assert!(!second.created);
    assert_eq!(first.match_id, second.match_id);

    let after: Vec<i64> = [
        "countries",
        "competitions",
        "seasons",
        "teams",
        "matches",
        "match_statistics",
        "match_events",
        "lineups",
    ]
    .iter()
    .map(|t| table_count(&conn, t))
    .collect();
    assert_eq!(snapshot, after);
    assert_eq!(table_count(&conn, "matches"), 1);
}

#[test]
fn lineup_rows_follow_the_feed() {
    let conn = open_in_memory().expect("db");
    seed_players(&conn);
    let event = read_fixture("event_finished.json");
    let mut counts = SyncCounts::default();

    let provider = FakeProvider::new().with_details();
    let outcome = sync_match(&conn, &provider, &event, &mut counts).expect("sync");
    assert_eq!(table_count(&conn, "lineups"), 5);

    // Next pass the feed dropped two home entries; stored rows follow.
    let mut shrunk = read_fixture("lineups.json");
    let players = shrunk["home"]["players"]
        .as_array_mut()
        .expect("home players");
    players.truncate(2);
    let provider = FakeProvider::new()
        .with_details()
        .with(Resource::EventLineups { event_id: EVENT_ID }, shrunk);

    sync_match(&conn, &provider, &event, &mut counts).expect("resync");
    assert_eq!(table_count(&conn, "lineups"), 4);
    let (_, _, has_lineups) = match_flags(&conn, outcome.match_id);
    assert!(has_lineups);
}

#[test]
fn statistics_flag_flips_false_when_feed_empties() {
    let conn = open_in_memory().expect("db");
    seed_players(&conn);
    let event = read_fixture("event_finished.json");
    let mut counts = SyncCounts::default();

    let provider = FakeProvider::new().with_details();
    let outcome = sync_match(&conn, &provider, &event, &mut counts).expect("sync");
    assert_eq!(match_flags(&conn, outcome.match_id).0, true);

    let provider = FakeProvider::new().with_details().with(
        Resource::EventStatistics { event_id: EVENT_ID },
        json!({"statistics": []}),
    );
    sync_match(&conn, &provider, &event, &mut counts).expect("resync");

    let (has_statistics, has_events, _) = match_flags(&conn, outcome.match_id);
    assert!(!has_statistics);
    assert!(has_events);
    assert_eq!(table_count(&conn, "match_statistics"), 0);
}

#[test]
fn failed_detail_fetch_keeps_stored_rows() {
    let conn = open_in_memory().expect("db");
    seed_players(&conn);
    let event = read_fixture("event_finished.json");
    let mut counts = SyncCounts::default();

    let provider = FakeProvider::new().with_details();
    let outcome = sync_match(&conn, &provider, &event, &mut counts).expect("sync");

    // Statistics endpoint down on the second pass: rows and flag survive.
    let bare = FakeProvider::new()
        .with(
            Resource::EventIncidents { event_id: EVENT_ID },
            read_fixture("incidents.json"),
        )
        .with(
            Resource::EventLineups { event_id: EVENT_ID },
            read_fixture("lineups.json"),
        );
    sync_match(&conn, &bare, &event, &mut counts).expect("resync");

    assert_eq!(table_count(&conn, "match_statistics"), 2);
    assert_eq!(match_flags(&conn, outcome.match_id).0, true);
}

#[test]
fn unresolved_event_player_stays_null() {
    let conn = open_in_memory().expect("db");
    seed_players(&conn);
    let provider = FakeProvider::new().with_details();
    let event = read_fixture("event_finished.json");
    let mut counts = SyncCounts::default();
    sync_match(&conn, &provider, &event, &mut counts).expect("sync");

    // Incident 9005 references a player no roster sync has seen.
    let player_id: Option<i64> = conn
        .query_row(
            "SELECT player_id FROM match_events WHERE external_id = 9005",
            [],
            |row| row.get(0),
        )
        .expect("event row");
    assert_eq!(player_id, None);

    // The known scorer resolves to his local row.
    let scorer: Option<i64> = conn
        .query_row(
            "SELECT player_id FROM match_events WHERE external_id = 9002",
            [],
            |row| row.get(0),
        )
        .expect("event row");
    let salah: i64 = conn
        .query_row(
            "SELECT id FROM players WHERE external_id = 301",
            [],
            |row| row.get(0),
        )
        .expect("player row");
    assert_eq!(scorer, Some(salah));
}

#[test]
fn unrecognized_incident_type_lands_as_goal() {
    let conn = open_in_memory().expect("db");
    seed_players(&conn);
    let provider = FakeProvider::new().with_details();
    let event = read_fixture("event_finished.json");
    let mut counts = SyncCounts::default();
    sync_match(&conn, &provider, &event, &mut counts).expect("sync");

    let kind: String = conn
        .query_row(
            "SELECT kind FROM match_events WHERE external_id = 9005",
            [],
            |row| row.get(0),
        )
        .expect("event row");
    assert_eq!(kind, "goal");

    let sub_kind: String = conn
        .query_row(
            "SELECT kind FROM match_events WHERE external_id = 9004",
            [],
            |row| row.get(0),
        )
        .expect("event row");
    assert_eq!(sub_kind, "substitution");
}

#[test]
fn notstarted_match_skips_details() {
    let conn = open_in_memory().expect("db");
    let provider = FakeProvider::new();
    let mut event = read_fixture("event_finished.json");
    event["status"] = json!({"code": 0, "description": "Not started", "type": "notstarted"});
    event["winnerCode"] = json!(0);
    event["homeScore"] = json!({});
    event["awayScore"] = json!({});
    let mut counts = SyncCounts::default();

    let outcome = sync_match(&conn, &provider, &event, &mut counts).expect("sync");
    assert!(!outcome.details_synced);
    assert_eq!(match_flags(&conn, outcome.match_id), (false, false, false));

    let (status, home): (String, Option<i64>) = conn
        .query_row(
            "SELECT status, home_score FROM matches WHERE id = ?1",
            [outcome.match_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("match row");
    assert_eq!(status, "notstarted");
    assert_eq!(home, None);
}

#[test]
fn batch_continues_past_bad_items() {
    let conn = open_in_memory().expect("db");
    seed_players(&conn);
    let date = NaiveDate::from_ymd_opt(2025, 8, 23).expect("date");

    // First event has no tournament at all; the day still syncs.
    let schedule = json!({"events": [
        {"id": 13001},
        read_fixture("event_finished.json"),
    ]});
    let provider = FakeProvider::new()
        .with(Resource::ScheduledEvents { date }, schedule)
        .with_details();
    let opts = BatchOptions {
        pace: Duration::ZERO,
        ..BatchOptions::default()
    };

    let report = sync_by_date(&conn, &provider, date, &opts).expect("batch");
    assert_eq!(report.items_total, 2);
    assert_eq!(report.items_failed, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(table_count(&conn, "matches"), 1);
    assert_eq!(report.counts.matches, 1);

    // The run was recorded with its error payload.
    let (items_total, items_failed, errors_json): (i64, i64, String) = conn
        .query_row(
            "SELECT items_total, items_failed, errors_json FROM sync_runs
             ORDER BY run_id DESC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .expect("run row");
    assert_eq!((items_total, items_failed), (2, 1));
    assert!(errors_json.contains("13001"));
}

#[test]
fn exhausted_error_budget_bounds_the_list_not_the_run() {
    let conn = open_in_memory().expect("db");
    seed_players(&conn);
    let date = NaiveDate::from_ymd_opt(2025, 8, 24).expect("date");

    // Two broken events ahead of a good one; with a budget of one the
    // good match must still be attempted and stored.
    let schedule = json!({"events": [
        {"id": 13001},
        {"id": 13002},
        read_fixture("event_finished.json"),
    ]});
    let provider = FakeProvider::new()
        .with(Resource::ScheduledEvents { date }, schedule)
        .with_details();
    let opts = BatchOptions {
        pace: Duration::ZERO,
        max_errors: 1,
        ..BatchOptions::default()
    };

    let report = sync_by_date(&conn, &provider, date, &opts).expect("batch");
    assert_eq!(report.items_total, 3);
    assert_eq!(report.items_failed, 2);
    // Capped list keeps the oldest failure only.
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].0, "match 13001");
    assert_eq!(table_count(&conn, "matches"), 1);
    assert_eq!(report.counts.matches, 1);
}

#[test]
fn zero_chunk_option_does_not_panic() {
    let conn = open_in_memory().expect("db");
    seed_players(&conn);
    let date = NaiveDate::from_ymd_opt(2025, 8, 25).expect("date");

    let schedule = json!({"events": [read_fixture("event_finished.json")]});
    let provider = FakeProvider::new()
        .with(Resource::ScheduledEvents { date }, schedule)
        .with_details();
    let opts = BatchOptions {
        chunk: 0,
        pace: Duration::ZERO,
        ..BatchOptions::default()
    };

    let report = sync_by_date(&conn, &provider, date, &opts).expect("batch");
    assert_eq!(report.items_total, 1);
    assert_eq!(report.items_failed, 0);
    assert_eq!(table_count(&conn, "matches"), 1);
}
