//! Detail sync pipeline: statistics, incidents and lineups for a single
//! stored match. All three payloads are fetched concurrently, then applied
//! sequentially on the one connection. A failed fetch skips that sub-sync
//! and leaves whatever was stored before untouched; a successful fetch
//! replaces the stored rows wholesale so removals upstream propagate.

use log::debug;
use rusqlite::{Connection, params};
use serde_json::{Map, Value, json};

use crate::coerce::{bool_or, float_or_none, int_or_zero, opt_i64, str_or_empty};
use crate::error::SyncError;
use crate::provider::{Provider, Resource, collection};
use crate::reconcile::{SyncCounts, find_player_by_external_id, map_position};

pub fn sync_match_details(
    conn: &Connection,
    provider: &dyn Provider,
    event_id: i64,
    match_id: i64,
    counts: &mut SyncCounts,
) -> Result<(), SyncError> {
    let (statistics, (incidents, lineups)) = rayon::join(
        || provider.fetch(&Resource::EventStatistics { event_id }),
        || {
            rayon::join(
                || provider.fetch(&Resource::EventIncidents { event_id }),
                || provider.fetch(&Resource::EventLineups { event_id }),
            )
        },
    );

    match statistics {
        Ok(payload) => counts.statistics += apply_statistics(conn, match_id, &payload)?,
        Err(err) => debug!("no statistics for event {event_id}: {err}"),
    }
    match incidents {
        Ok(payload) => counts.events += apply_events(conn, match_id, &payload)?,
        Err(err) => debug!("no incidents for event {event_id}: {err}"),
    }
    match lineups {
        Ok(payload) => counts.lineups += apply_lineups(conn, match_id, &payload)?,
        Err(err) => debug!("no lineups for event {event_id}: {err}"),
    }
    Ok(())
}

/// Recompute the three completeness flags from what is actually stored.
/// Runs after every detail pass so flags flip back to 0 when a re-sync
/// removed the last row of a section.
pub fn update_match_flags(conn: &Connection, match_id: i64) -> Result<(), SyncError> {
    conn.execute(
        "UPDATE matches SET
             has_statistics = EXISTS (SELECT 1 FROM match_statistics WHERE match_id = ?1),
             has_events     = EXISTS (SELECT 1 FROM match_events WHERE match_id = ?1),
             has_lineups    = EXISTS (SELECT 1 FROM lineups WHERE match_id = ?1)
         WHERE id = ?1",
        params![match_id],
    )?;
    Ok(())
}

/// Period labels vary between feeds; anything unrecognized counts as the
/// full-match aggregate.
fn map_period(label: &str) -> &'static str {
    match label {
        "1ST" | "FIRST_HALF" | "1H" => "1H",
        "2ND" | "SECOND_HALF" | "2H" => "2H",
        _ => "ALL",
    }
}

#[derive(Default)]
struct StatRow {
    possession_home: Option<f64>,
    possession_away: Option<f64>,
    shots_home: i64,
    shots_away: i64,
    shots_on_target_home: i64,
    shots_on_target_away: i64,
    shots_off_target_home: i64,
    shots_off_target_away: i64,
    shots_blocked_home: i64,
    shots_blocked_away: i64,
    corners_home: i64,
    corners_away: i64,
    fouls_home: i64,
    fouls_away: i64,
    yellow_cards_home: i64,
    yellow_cards_away: i64,
    red_cards_home: i64,
    red_cards_away: i64,
    offsides_home: i64,
    offsides_away: i64,
}

fn apply_statistics(conn: &Connection, match_id: i64, payload: &Value) -> Result<usize, SyncError> {
    // Replace, never merge: a period that disappeared from the feed must
    // disappear here too, and the flag updater then sees the truth.
    conn.execute(
        "DELETE FROM match_statistics WHERE match_id = ?1",
        params![match_id],
    )?;

    let mut written = 0;
    for period_entry in collection(payload, "statistics") {
        let period = map_period(&str_or_empty(period_entry.get("period")));
        let mut row = StatRow::default();
        let mut extra = Map::new();

        for group in collection(period_entry, "groups") {
            for item in collection(group, "statisticsItems") {
                let name = str_or_empty(item.get("name"));
                let home = item.get("home");
                let away = item.get("away");
                match name.as_str() {
                    "Ball possession" => {
                        row.possession_home = float_or_none(home);
                        row.possession_away = float_or_none(away);
                    }
                    "Total shots" => {
                        row.shots_home = int_or_zero(home);
                        row.shots_away = int_or_zero(away);
                    }
                    "Shots on target" => {
                        row.shots_on_target_home = int_or_zero(home);
                        row.shots_on_target_away = int_or_zero(away);
                    }
                    "Shots off target" => {
                        row.shots_off_target_home = int_or_zero(home);
                        row.shots_off_target_away = int_or_zero(away);
                    }
                    "Blocked shots" => {
                        row.shots_blocked_home = int_or_zero(home);
                        row.shots_blocked_away = int_or_zero(away);
                    }
                    "Corner kicks" => {
                        row.corners_home = int_or_zero(home);
                        row.corners_away = int_or_zero(away);
                    }
                    "Fouls" => {
                        row.fouls_home = int_or_zero(home);
                        row.fouls_away = int_or_zero(away);
                    }
                    "Yellow cards" => {
                        row.yellow_cards_home = int_or_zero(home);
                        row.yellow_cards_away = int_or_zero(away);
                    }
                    "Red cards" => {
                        row.red_cards_home = int_or_zero(home);
                        row.red_cards_away = int_or_zero(away);
                    }
                    "Offsides" => {
                        row.offsides_home = int_or_zero(home);
                        row.offsides_away = int_or_zero(away);
                    }
                    "" => {}
                    _ => {
                        extra.insert(
                            name,
                            json!({
                                "home": home.cloned().unwrap_or(Value::Null),
                                "away": away.cloned().unwrap_or(Value::Null),
                            }),
                        );
                    }
                }
            }
        }

        let extra_json = Value::Object(extra).to_string();
        conn.execute(
            "INSERT INTO match_statistics
                 (match_id, period, possession_home, possession_away,
                  shots_home, shots_away, shots_on_target_home, shots_on_target_away,
                  shots_off_target_home, shots_off_target_away,
                  shots_blocked_home, shots_blocked_away,
                  corners_home, corners_away, fouls_home, fouls_away,
                  yellow_cards_home, yellow_cards_away, red_cards_home, red_cards_away,
                  offsides_home, offsides_away, extra)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                     ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)
             ON CONFLICT(match_id, period) DO UPDATE SET
                 possession_home = excluded.possession_home,
                 possession_away = excluded.possession_away,
                 shots_home = excluded.shots_home,
                 shots_away = excluded.shots_away,
                 shots_on_target_home = excluded.shots_on_target_home,
                 shots_on_target_away = excluded.shots_on_target_away,
                 shots_off_target_home = excluded.shots_off_target_home,
                 shots_off_target_away = excluded.shots_off_target_away,
                 shots_blocked_home = excluded.shots_blocked_home,
                 shots_blocked_away = excluded.shots_blocked_away,
                 corners_home = excluded.corners_home,
                 corners_away = excluded.corners_away,
                 fouls_home = excluded.fouls_home,
                 fouls_away = excluded.fouls_away,
                 yellow_cards_home = excluded.yellow_cards_home,
                 yellow_cards_away = excluded.yellow_cards_away,
                 red_cards_home = excluded.red_cards_home,
                 red_cards_away = excluded.red_cards_away,
                 offsides_home = excluded.offsides_home,
                 offsides_away = excluded.offsides_away,
                 extra = excluded.extra",
            params![
                match_id,
                period,
                row.possession_home,
                row.possession_away,
                row.shots_home,
                row.shots_away,
                row.shots_on_target_home,
                row.shots_on_target_away,
                row.shots_off_target_home,
                row.shots_off_target_away,
                row.shots_blocked_home,
                row.shots_blocked_away,
                row.corners_home,
                row.corners_away,
                row.fouls_home,
                row.fouls_away,
                row.yellow_cards_home,
                row.yellow_cards_away,
                row.red_cards_home,
                row.red_cards_away,
                row.offsides_home,
                row.offsides_away,
                extra_json,
            ],
        )?;
        written += 1;
    }
    Ok(written)
}

/// Incident types we don't recognize still land in the table; the feed
/// historically kept inventing variants of goal incidents, so that bucket
/// is the fallback.
fn map_incident_kind(provider_type: &str) -> &'static str {
    match provider_type {
        "goal" => "goal",
        "yellowCard" => "yellow_card",
        "redCard" => "red_card",
        "yellowRedCard" => "yellow_red_card",
        "substitution" => "substitution",
        "penalty" => "penalty",
        "penaltyMissed" => "penalty_missed",
        "ownGoal" => "own_goal",
        "varDecision" => "var",
        "injuryTime" => "injury",
        "period" => "period",
        _ => "goal",
    }
}

fn apply_events(conn: &Connection, match_id: i64, payload: &Value) -> Result<usize, SyncError> {
    conn.execute(
        "DELETE FROM match_events WHERE match_id = ?1",
        params![match_id],
    )?;

    let mut written = 0;
    for incident in collection(payload, "incidents") {
        let kind = map_incident_kind(&str_or_empty(incident.get("incidentType")));

        // Substitutions carry the leaving player under playerOut and the
        // incoming one under playerIn; everything else uses player/assist1.
        let actor = incident.get("player").or_else(|| incident.get("playerOut"));
        let related = incident
            .get("assist1")
            .or_else(|| incident.get("playerIn"));

        let player_id =
            find_player_by_external_id(conn, opt_i64(actor.and_then(|p| p.get("id"))))?;
        let related_player_id =
            find_player_by_external_id(conn, opt_i64(related.and_then(|p| p.get("id"))))?;

        conn.execute(
            "INSERT INTO match_events
                 (match_id, external_id, player_id, related_player_id,
                  minute, added_minute, second, kind, text, is_home)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                match_id,
                opt_i64(incident.get("id")),
                player_id,
                related_player_id,
                int_or_zero(incident.get("time")),
                opt_i64(incident.get("addedTime")),
                opt_i64(incident.get("second")),
                kind,
                str_or_empty(incident.get("text")),
                bool_or(incident.get("isHome"), true),
            ],
        )?;
        written += 1;
    }
    Ok(written)
}

fn apply_lineups(conn: &Connection, match_id: i64, payload: &Value) -> Result<usize, SyncError> {
    conn.execute("DELETE FROM lineups WHERE match_id = ?1", params![match_id])?;

    let mut written = 0;
    for (side, is_home) in [("home", true), ("away", false)] {
        let side_value = payload.get(side).unwrap_or(&Value::Null);
        for entry in collection(side_value, "players") {
            let player = entry.get("player").unwrap_or(&Value::Null);
            // Lineups never create players; an unknown squad member is
            // skipped and picked up once the roster sync has seen them.
            let Some(player_id) =
                find_player_by_external_id(conn, opt_i64(player.get("id")))?
            else {
                debug!(
                    "lineup entry for unknown player {:?} in match {match_id}, skipped",
                    player.get("name")
                );
                continue;
            };

            let stats = entry.get("statistics").unwrap_or(&Value::Null);
            let position = map_position(&str_or_empty(
                entry.get("position").or_else(|| player.get("position")),
            ));
            let jersey = opt_i64(entry.get("shirtNumber"))
                .or_else(|| opt_i64(player.get("jerseyNumber")));

            conn.execute(
                "INSERT INTO lineups
                     (match_id, player_id, is_home, is_starter, position, jersey_number,
                      rating, minutes_played, goals, assists, yellow_cards, red_cards)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(match_id, player_id) DO UPDATE SET
                     is_home = excluded.is_home,
                     is_starter = excluded.is_starter,
                     position = excluded.position,
                     jersey_number = excluded.jersey_number,
                     rating = excluded.rating,
                     minutes_played = excluded.minutes_played,
                     goals = excluded.goals,
                     assists = excluded.assists,
                     yellow_cards = excluded.yellow_cards,
                     red_cards = excluded.red_cards",
                params![
                    match_id,
                    player_id,
                    is_home,
                    !bool_or(entry.get("substitute"), false),
                    position,
                    jersey,
                    float_or_none(stats.get("rating")),
                    int_or_zero(stats.get("minutesPlayed")),
                    int_or_zero(stats.get("goals")),
                    int_or_zero(stats.get("goalAssist")),
                    int_or_zero(stats.get("yellowCards")),
                    int_or_zero(stats.get("redCards")),
                ],
            )?;
            written += 1;
        }
    }
    Ok(written)
}
