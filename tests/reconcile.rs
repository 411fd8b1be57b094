use serde_json::json;

use futsync::db::open_in_memory;
use futsync::error::SyncError;
use futsync::reconcile::{
    SyncCounts, resolve_competition, resolve_country, resolve_season, resolve_team,
};

fn table_count(conn: &rusqlite::Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
    .expect("count query")
}

#[test]
fn country_resolution_is_idempotent() {
    let conn = open_in_memory().expect("db");
    let mut counts = SyncCounts::default();
    let payload = json!({"id": 44, "name": "Spain", "alpha2": "ES"});

    let first = resolve_country(&conn, &payload, &mut counts)
        .expect("resolve")
        .expect("country has a name");
    assert!(first.created);

    let second = resolve_country(&conn, &payload, &mut counts)
        .expect("resolve")
        .expect("country has a name");
    assert!(!second.created);
    assert_eq!(first.id, second.id);
    assert_eq!(table_count(&conn, "countries"), 1);
    assert_eq!(counts.countries, 1);
}

#[test]
fn country_without_name_resolves_to_nothing() {
    let conn = open_in_memory().expect("db");
    let mut counts = SyncCounts::default();
    let resolved =
        resolve_country(&conn, &json!({"id": 9, "alpha2": "XX"}), &mut counts).expect("resolve");
    assert!(resolved.is_none());
    assert_eq!(table_count(&conn, "countries"), 0);
}

#[test]
fn country_natural_key_match_backfills_external_id() {
    let conn = open_in_memory().expect("db");
    let mut counts = SyncCounts::default();

    // First seen without a provider id, as events sometimes deliver it.
    let bare = resolve_country(&conn, &json!({"name": "Italy"}), &mut counts)
        .expect("resolve")
        .expect("named");
    assert!(bare.created);

    // Later the full record arrives; same row, id filled in.
    let full = resolve_country(&conn, &json!({"id": 31, "name": "Italy", "alpha2": "IT"}), &mut counts)
        .expect("resolve")
        .expect("named");
    assert!(!full.created);
    assert_eq!(full.id, bare.id);

    let ext: Option<i64> = conn
        .query_row(
            "SELECT external_id FROM countries WHERE id = ?1",
            [full.id],
            |row| row.get(0),
        )
        .expect("row");
    assert_eq!(ext, Some(31));
    assert_eq!(table_count(&conn, "countries"), 1);
}

#[test]
fn country_external_id_wins_over_renames() {
    let conn = open_in_memory().expect("db");
    let mut counts = SyncCounts::default();

    let first = resolve_country(&conn, &json!({"id": 7, "name": "Turkey"}), &mut counts)
        .expect("resolve")
        .expect("named");
    let renamed = resolve_country(&conn, &json!({"id": 7, "name": "Türkiye"}), &mut counts)
        .expect("resolve")
        .expect("named");
    assert_eq!(first.id, renamed.id);

    let name: String = conn
        .query_row("SELECT name FROM countries WHERE id = ?1", [first.id], |row| {
            row.get(0)
        })
        .expect("row");
    assert_eq!(name, "Türkiye");
    assert_eq!(table_count(&conn, "countries"), 1);
}

#[test]
fn competition_without_id_is_an_error() {
    let conn = open_in_memory().expect("db");
    let mut counts = SyncCounts::default();
    let err = resolve_competition(&conn, &json!({"name": "Mystery Cup"}), None, &mut counts)
        .expect_err("id is required");
    assert!(matches!(err, SyncError::MissingEntity { .. }));
    assert_eq!(table_count(&conn, "competitions"), 0);
}

#[test]
fn competition_fields_converge_on_update() {
    let conn = open_in_memory().expect("db");
    let mut counts = SyncCounts::default();

    let first = resolve_competition(
        &conn,
        &json!({"id": 17, "name": "Premier League"}),
        None,
        &mut counts,
    )
    .expect("resolve");
    assert!(first.created);

    let second = resolve_competition(
        &conn,
        &json!({"id": 17, "name": "Premier League", "shortName": "PL"}),
        None,
        &mut counts,
    )
    .expect("resolve");
    assert!(!second.created);
    assert_eq!(first.id, second.id);

    let short: String = conn
        .query_row(
            "SELECT short_name FROM competitions WHERE id = ?1",
            [first.id],
            |row| row.get(0),
        )
        .expect("row");
    assert_eq!(short, "PL");
    assert_eq!(counts.competitions, 1);
}

#[test]
fn season_resolves_by_natural_key_when_id_is_absent() {
    let conn = open_in_memory().expect("db");
    let mut counts = SyncCounts::default();
    let competition = resolve_competition(
        &conn,
        &json!({"id": 17, "name": "Premier League"}),
        None,
        &mut counts,
    )
    .expect("competition");

    let with_id = resolve_season(
        &conn,
        &json!({"id": 61627, "name": "2024/25", "year": "24/25"}),
        competition.id,
        &mut counts,
    )
    .expect("season");
    assert!(with_id.created);

    // Same season arriving id-less resolves through (competition, start year).
    let without_id = resolve_season(
        &conn,
        &json!({"name": "2024/25"}),
        competition.id,
        &mut counts,
    )
    .expect("season");
    assert!(!without_id.created);
    assert_eq!(with_id.id, without_id.id);
    assert_eq!(table_count(&conn, "seasons"), 1);
}

#[test]
fn season_natural_key_backfills_external_id() {
    let conn = open_in_memory().expect("db");
    let mut counts = SyncCounts::default();
    let competition = resolve_competition(
        &conn,
        &json!({"id": 8, "name": "LaLiga"}),
        None,
        &mut counts,
    )
    .expect("competition");

    let bare = resolve_season(&conn, &json!({"name": "2025/26"}), competition.id, &mut counts)
        .expect("season");
    let full = resolve_season(
        &conn,
        &json!({"id": 77559, "name": "2025/26"}),
        competition.id,
        &mut counts,
    )
    .expect("season");
    assert_eq!(bare.id, full.id);

    let ext: Option<i64> = conn
        .query_row(
            "SELECT external_id FROM seasons WHERE id = ?1",
            [bare.id],
            |row| row.get(0),
        )
        .expect("row");
    assert_eq!(ext, Some(77559));
}

#[test]
fn season_same_start_year_different_competitions_stay_apart() {
    let conn = open_in_memory().expect("db");
    let mut counts = SyncCounts::default();
    let pl = resolve_competition(&conn, &json!({"id": 17, "name": "Premier League"}), None, &mut counts)
        .expect("competition");
    let liga = resolve_competition(&conn, &json!({"id": 8, "name": "LaLiga"}), None, &mut counts)
        .expect("competition");

    let a = resolve_season(&conn, &json!({"name": "2024/25"}), pl.id, &mut counts).expect("season");
    let b = resolve_season(&conn, &json!({"name": "2024/25"}), liga.id, &mut counts).expect("season");
    assert_ne!(a.id, b.id);
    assert_eq!(table_count(&conn, "seasons"), 2);
}

#[test]
fn team_updates_converge_and_keep_identity() {
    let conn = open_in_memory().expect("db");
    let mut counts = SyncCounts::default();

    let lean = resolve_team(&conn, &json!({"id": 2817, "name": "Barcelona"}), &mut counts)
        .expect("team");
    assert!(lean.created);

    let rich = resolve_team(
        &conn,
        &json!({
            "id": 2817,
            "name": "FC Barcelona",
            "shortName": "Barça",
            "venue": {"stadium": {"name": "Spotify Camp Nou", "capacity": 99354}},
        }),
        &mut counts,
    )
    .expect("team");
    assert!(!rich.created);
    assert_eq!(lean.id, rich.id);

    let (name, venue, capacity): (String, String, Option<i64>) = conn
        .query_row(
            "SELECT name, venue, venue_capacity FROM teams WHERE id = ?1",
            [lean.id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .expect("row");
    assert_eq!(name, "FC Barcelona");
    assert_eq!(venue, "Spotify Camp Nou");
    assert_eq!(capacity, Some(99354));
    assert_eq!(counts.teams, 1);
}
