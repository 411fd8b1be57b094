use chrono::{DateTime, Utc};
use log::{debug, warn};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Value, json};

use crate::coerce::{int_or_zero, opt_i64, opt_str, str_or_empty};
use crate::details;
use crate::error::{EntityKind, SyncError};
use crate::provider::{Provider, Resource, collection};
use crate::reconcile::{
    Resolved, SyncCounts, resolve_competition, resolve_country, resolve_player, resolve_season,
    resolve_team,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    NotStarted,
    InProgress,
    Finished,
    Postponed,
    Cancelled,
    Abandoned,
    Interrupted,
    Suspended,
}

impl MatchStatus {
    /// Unknown provider statuses collapse to "not started".
    pub fn from_provider(code: &str) -> Self {
        match code {
            "inprogress" => MatchStatus::InProgress,
            "finished" => MatchStatus::Finished,
            "postponed" => MatchStatus::Postponed,
            "cancelled" => MatchStatus::Cancelled,
            "abandoned" => MatchStatus::Abandoned,
            "interrupted" => MatchStatus::Interrupted,
            "suspended" => MatchStatus::Suspended,
            _ => MatchStatus::NotStarted,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::NotStarted => "notstarted",
            MatchStatus::InProgress => "inprogress",
            MatchStatus::Finished => "finished",
            MatchStatus::Postponed => "postponed",
            MatchStatus::Cancelled => "cancelled",
            MatchStatus::Abandoned => "abandoned",
            MatchStatus::Interrupted => "interrupted",
            MatchStatus::Suspended => "suspended",
        }
    }

    /// Detail data only exists once a match has kicked off.
    pub fn wants_details(self) -> bool {
        matches!(self, MatchStatus::Finished | MatchStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MatchOutcome {
    pub match_id: i64,
    pub created: bool,
    pub details_synced: bool,
}

/// Walk one inbound event through its dependency graph: country →
/// competition → season → both teams → the match row itself, then the
/// detail pipeline and flag recompute for live or finished matches.
/// A missing required parent aborts this match only.
pub fn sync_match(
    conn: &Connection,
    provider: &dyn Provider,
    event: &Value,
    counts: &mut SyncCounts,
) -> Result<MatchOutcome, SyncError> {
    let Some(external_id) = opt_i64(event.get("id")) else {
        return Err(SyncError::missing(EntityKind::Match, "event payload without id"));
    };

    let tournament = event.get("tournament").unwrap_or(&Value::Null);
    let category = tournament.get("category").unwrap_or(&Value::Null);
    let country = resolve_event_country(conn, category, counts)?;

    let competition_data = tournament
        .get("uniqueTournament")
        .filter(|v| v.is_object())
        .unwrap_or(tournament);
    let competition =
        resolve_competition(conn, competition_data, country.map(|c| c.id), counts)?;

    let season_data = event.get("season").unwrap_or(&Value::Null);
    let season = resolve_season(conn, season_data, competition.id, counts)?;

    let home_team = resolve_team(conn, event.get("homeTeam").unwrap_or(&Value::Null), counts)?;
    let away_team = resolve_team(conn, event.get("awayTeam").unwrap_or(&Value::Null), counts)?;

    let status_value = event.get("status").unwrap_or(&Value::Null);
    let status =
        MatchStatus::from_provider(status_value.get("type").and_then(Value::as_str).unwrap_or(""));

    let row = upsert_match(
        conn,
        external_id,
        event,
        competition.id,
        season.id,
        home_team,
        away_team,
        status,
        status_value,
        counts,
    )?;

    let details_synced = if status.wants_details() {
        details::sync_match_details(conn, provider, external_id, row.id, counts)?;
        details::update_match_flags(conn, row.id)?;
        true
    } else {
        debug!("match {external_id} is {}, skipping details", status.as_str());
        false
    };

    Ok(MatchOutcome {
        match_id: row.id,
        created: row.created,
        details_synced,
    })
}

/// The category either names a real country or is itself a
/// pseudo-country entry ("Europe", "World") for international
/// competitions; both resolve through the same reconciler.
pub(crate) fn resolve_event_country(
    conn: &Connection,
    category: &Value,
    counts: &mut SyncCounts,
) -> Result<Option<Resolved>, SyncError> {
    if let Some(country) = category.get("country")
        && country.get("name").is_some()
    {
        return resolve_country(conn, country, counts);
    }
    if opt_str(category.get("name")).is_some() {
        let pseudo = json!({
            "name": category.get("name"),
            "alpha2": category.get("alpha2"),
        });
        return resolve_country(conn, &pseudo, counts);
    }
    Ok(None)
}

#[allow(clippy::too_many_arguments)]
fn upsert_match(
    conn: &Connection,
    external_id: i64,
    event: &Value,
    competition_id: i64,
    season_id: i64,
    home_team: Resolved,
    away_team: Resolved,
    status: MatchStatus,
    status_value: &Value,
    counts: &mut SyncCounts,
) -> Result<Resolved, SyncError> {
    let home_score = event.get("homeScore").unwrap_or(&Value::Null);
    let away_score = event.get("awayScore").unwrap_or(&Value::Null);

    let kickoff_timestamp = opt_i64(event.get("startTimestamp"));
    let kickoff = kickoff_timestamp
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default();
    let round = str_or_empty(event.get("roundInfo").and_then(|r| r.get("name")));

    let winner_team_id = match int_or_zero(event.get("winnerCode")) {
        1 => Some(home_team.id),
        2 => Some(away_team.id),
        _ => None,
    };

    let home_score_cur = opt_i64(home_score.get("current"));
    let away_score_cur = opt_i64(away_score.get("current"));
    let home_score_ht = opt_i64(home_score.get("period1"));
    let away_score_ht = opt_i64(away_score.get("period1"));
    let status_code = opt_i64(status_value.get("code"));
    let status_description = str_or_empty(status_value.get("description"));
    let updated_at = Utc::now().to_rfc3339();

    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM matches WHERE external_id = ?1",
            params![external_id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = found {
        conn.execute(
            "UPDATE matches SET competition_id = ?2, season_id = ?3, home_team_id = ?4,
                 away_team_id = ?5, kickoff = ?6, kickoff_timestamp = ?7, round = ?8,
                 home_score = ?9, away_score = ?10, home_score_ht = ?11, away_score_ht = ?12,
                 status = ?13, status_code = ?14, status_description = ?15,
                 winner_team_id = ?16, updated_at = ?17
             WHERE external_id = ?1",
            params![
                external_id, competition_id, season_id, home_team.id, away_team.id,
                kickoff, kickoff_timestamp, round, home_score_cur, away_score_cur,
                home_score_ht, away_score_ht, status.as_str(), status_code,
                status_description, winner_team_id, updated_at
            ],
        )?;
        return Ok(Resolved { id, created: false });
    }

    conn.execute(
        "INSERT INTO matches
             (external_id, competition_id, season_id, home_team_id, away_team_id,
              kickoff, kickoff_timestamp, round, home_score, away_score,
              home_score_ht, away_score_ht, status, status_code, status_description,
              winner_team_id, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            external_id, competition_id, season_id, home_team.id, away_team.id,
            kickoff, kickoff_timestamp, round, home_score_cur, away_score_cur,
            home_score_ht, away_score_ht, status.as_str(), status_code,
            status_description, winner_team_id, updated_at
        ],
    )?;
    counts.matches += 1;
    Ok(Resolved {
        id: conn.last_insert_rowid(),
        created: true,
    })
}

/// Full team sync: the team record plus its current squad, so later
/// lineup and incident references can resolve locally.
pub fn sync_team(
    conn: &Connection,
    provider: &dyn Provider,
    team_id: i64,
    counts: &mut SyncCounts,
) -> Result<Resolved, SyncError> {
    let payload = provider.fetch(&Resource::Team { team_id })?;
    let team_data = payload.get("team").unwrap_or(&Value::Null);
    let team = resolve_team(conn, team_data, counts)?;
    sync_team_players(conn, provider, team_id, team.id, counts)?;
    Ok(team)
}

/// Squad fetch failures degrade to a warning: the team row itself is
/// already in place and lineups simply skip unknown players.
pub fn sync_team_players(
    conn: &Connection,
    provider: &dyn Provider,
    team_external_id: i64,
    team_local_id: i64,
    counts: &mut SyncCounts,
) -> Result<(), SyncError> {
    let payload = match provider.fetch(&Resource::TeamPlayers { team_id: team_external_id }) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("squad fetch failed for team {team_external_id}: {err}");
            return Ok(());
        }
    };
    for entry in collection(&payload, "players") {
        let player = entry.get("player").unwrap_or(&Value::Null);
        resolve_player(conn, player, Some(team_local_id), counts)?;
    }
    Ok(())
}
