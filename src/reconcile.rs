use chrono::{DateTime, Datelike, Utc};
use log::debug;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde_json::Value;

use crate::coerce::{bool_or, int_or_zero, opt_i64, opt_str, str_or_empty};
use crate::error::{EntityKind, SyncError};

/// Outcome of one create-or-update resolution.
#[derive(Debug, Clone, Copy)]
pub struct Resolved {
    pub id: i64,
    pub created: bool,
}

/// Per-entity creation counters for one run. A plain value owned by the
/// caller; merged into the batch report, never stored globally.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct SyncCounts {
    pub countries: usize,
    pub competitions: usize,
    pub seasons: usize,
    pub teams: usize,
    pub players: usize,
    pub matches: usize,
    pub statistics: usize,
    pub events: usize,
    pub lineups: usize,
}

impl SyncCounts {
    pub fn add(&mut self, other: &SyncCounts) {
        self.countries += other.countries;
        self.competitions += other.competitions;
        self.seasons += other.seasons;
        self.teams += other.teams;
        self.players += other.players;
        self.matches += other.matches;
        self.statistics += other.statistics;
        self.events += other.events;
        self.lineups += other.lineups;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompetitionKind {
    League,
    Cup,
    International,
    Friendly,
}

impl CompetitionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CompetitionKind::League => "league",
            CompetitionKind::Cup => "cup",
            CompetitionKind::International => "international",
            CompetitionKind::Friendly => "friendly",
        }
    }
}

/// Fixed classification rule over the competition name. Order matters:
/// "Europa League Cup Qualifiers" style names hit the cup branch first,
/// matching upstream behavior.
pub fn classify_competition(name: &str) -> CompetitionKind {
    let lowered = name.to_lowercase();
    if ["cup", "copa", "pokal"].iter().any(|n| lowered.contains(n)) {
        CompetitionKind::Cup
    } else if ["champions", "europa", "libertadores", "sudamericana", "conference"]
        .iter()
        .any(|n| lowered.contains(n))
    {
        CompetitionKind::International
    } else if lowered.contains("friendly") || lowered.contains("amistoso") {
        CompetitionKind::Friendly
    } else {
        CompetitionKind::League
    }
}

/// Map the provider's one-letter position code; anything unknown lands
/// on midfield.
pub fn map_position(code: &str) -> &'static str {
    match code {
        "G" => "GK",
        "D" => "DF",
        "M" => "MF",
        "F" => "FW",
        _ => "MF",
    }
}

/// Season names look like "2024/25", "2024/2025" or "2024". Anything
/// unparseable falls back to the current year with an open end.
pub fn parse_season_years(name: &str) -> (i64, Option<i64>) {
    let fallback = || (i64::from(Utc::now().year()), None);
    let trimmed = name.trim();
    if let Some((first, second)) = trimmed.split_once('/') {
        let Ok(start) = first.trim().parse::<i64>() else {
            return fallback();
        };
        let second = second.trim();
        let end = if second.len() == 2 {
            format!("20{second}").parse::<i64>().ok()
        } else {
            second.parse::<i64>().ok()
        };
        match end {
            Some(end) => (start, Some(end)),
            None => fallback(),
        }
    } else {
        match trimmed.parse::<i64>() {
            Ok(year) => (year, Some(year)),
            Err(_) => fallback(),
        }
    }
}

/// Countries arrive with or without a stable id, so the name doubles as
/// a natural key: an id-less payload must reuse the row a named lookup
/// finds, and a later payload carrying the id backfills it.
pub fn resolve_country(
    conn: &Connection,
    data: &Value,
    counts: &mut SyncCounts,
) -> Result<Option<Resolved>, SyncError> {
    let Some(name) = opt_str(data.get("name")) else {
        return Ok(None);
    };
    let external_id = opt_i64(data.get("id"));
    let code = str_or_empty(data.get("alpha2"));
    let flag_url = str_or_empty(data.get("flag"));

    if let Some(ext) = external_id {
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM countries WHERE external_id = ?1",
                params![ext],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = found {
            conn.execute(
                "UPDATE countries SET name = ?2, code = ?3, flag_url = ?4 WHERE id = ?1",
                params![id, name, code, flag_url],
            )?;
            return Ok(Some(Resolved { id, created: false }));
        }
    }

    let by_name: Option<i64> = conn
        .query_row(
            "SELECT id FROM countries WHERE name = ?1 ORDER BY id LIMIT 1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = by_name {
        conn.execute(
            "UPDATE countries SET external_id = COALESCE(?2, external_id),
                 code = ?3, flag_url = ?4 WHERE id = ?1",
            params![id, external_id, code, flag_url],
        )?;
        return Ok(Some(Resolved { id, created: false }));
    }

    conn.execute(
        "INSERT INTO countries (external_id, name, code, flag_url) VALUES (?1, ?2, ?3, ?4)",
        params![external_id, name, code, flag_url],
    )?;
    counts.countries += 1;
    debug!("created country {name}");
    Ok(Some(Resolved {
        id: conn.last_insert_rowid(),
        created: true,
    }))
}

pub fn find_country_by_name(conn: &Connection, name: &str) -> Result<Option<i64>, SyncError> {
    let id = conn
        .query_row(
            "SELECT id FROM countries WHERE name = ?1 ORDER BY id LIMIT 1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

pub fn resolve_competition(
    conn: &Connection,
    data: &Value,
    country_id: Option<i64>,
    counts: &mut SyncCounts,
) -> Result<Resolved, SyncError> {
    let Some(external_id) = opt_i64(data.get("id")) else {
        return Err(SyncError::missing(
            EntityKind::Competition,
            "payload without id",
        ));
    };
    let name = str_or_empty(data.get("name"));
    let short_name = str_or_empty(data.get("shortName"));
    let kind = classify_competition(&name).as_str();
    let priority = int_or_zero(data.get("priority"));
    let has_standings = bool_or(data.get("hasStandingsGroups"), true);
    let has_playoffs = bool_or(data.get("hasPlayoffSeries"), false);
    let logo_url = format!(
        "https://www.sofascore.com/static/images/unique-tournament/{external_id}.png"
    );

    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM competitions WHERE external_id = ?1",
            params![external_id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = found {
        conn.execute(
            "UPDATE competitions SET name = ?2, short_name = ?3, country_id = ?4,
                 kind = ?5, priority = ?6, logo_url = ?7, has_standings = ?8, has_playoffs = ?9
             WHERE id = ?1",
            params![
                id, name, short_name, country_id, kind, priority, logo_url,
                has_standings, has_playoffs
            ],
        )?;
        return Ok(Resolved { id, created: false });
    }

    conn.execute(
        "INSERT INTO competitions
             (external_id, name, short_name, country_id, kind, priority, logo_url,
              has_standings, has_playoffs)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            external_id, name, short_name, country_id, kind, priority, logo_url,
            has_standings, has_playoffs
        ],
    )?;
    counts.competitions += 1;
    debug!("created competition {name}");
    Ok(Resolved {
        id: conn.last_insert_rowid(),
        created: true,
    })
}

/// Seasons carry the only two-level identity: external id when present,
/// otherwise (competition, start year). A natural-key hit backfills the
/// external id so the next sync takes the fast path.
pub fn resolve_season(
    conn: &Connection,
    data: &Value,
    competition_id: i64,
    counts: &mut SyncCounts,
) -> Result<Resolved, SyncError> {
    let external_id = opt_i64(data.get("id"));
    let name = opt_str(data.get("name"))
        .or_else(|| opt_str(data.get("year")))
        .unwrap_or_default();
    if external_id.is_none() && name.is_empty() {
        return Err(SyncError::missing(
            EntityKind::Season,
            "payload without id or name",
        ));
    }
    let year = str_or_empty(data.get("year"));
    let (start_year, end_year) = parse_season_years(&name);

    if let Some(ext) = external_id {
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM seasons WHERE external_id = ?1",
                params![ext],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = found {
            conn.execute(
                "UPDATE seasons SET competition_id = ?2, name = ?3, year = ?4,
                     start_year = ?5, end_year = ?6 WHERE id = ?1",
                params![id, competition_id, name, year, start_year, end_year],
            )?;
            return Ok(Resolved { id, created: false });
        }
    }

    let by_natural: Option<i64> = conn
        .query_row(
            "SELECT id FROM seasons WHERE competition_id = ?1 AND start_year = ?2",
            params![competition_id, start_year],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = by_natural {
        conn.execute(
            "UPDATE seasons SET external_id = COALESCE(?2, external_id),
                 name = ?3, year = ?4, end_year = ?5 WHERE id = ?1",
            params![id, external_id, name, year, end_year],
        )?;
        return Ok(Resolved { id, created: false });
    }

    conn.execute(
        "INSERT INTO seasons (external_id, competition_id, name, year, start_year, end_year, active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
        params![external_id, competition_id, name, year, start_year, end_year],
    )?;
    counts.seasons += 1;
    debug!("created season {name}");
    Ok(Resolved {
        id: conn.last_insert_rowid(),
        created: true,
    })
}

pub fn resolve_team(
    conn: &Connection,
    data: &Value,
    counts: &mut SyncCounts,
) -> Result<Resolved, SyncError> {
    let Some(external_id) = opt_i64(data.get("id")) else {
        return Err(SyncError::missing(EntityKind::Team, "payload without id"));
    };
    let name = str_or_empty(data.get("name"));
    let short_name = str_or_empty(data.get("shortName"));
    let team_type = opt_str(data.get("type")).unwrap_or_else(|| "club".to_string());

    let country_id = match opt_str(data.get("country").and_then(|c| c.get("name"))) {
        Some(country_name) => find_country_by_name(conn, &country_name)?,
        None => None,
    };
    let venue = str_or_empty(
        data.get("venue")
            .and_then(|v| v.get("stadium"))
            .and_then(|s| s.get("name")),
    );
    let venue_capacity = opt_i64(
        data.get("venue")
            .and_then(|v| v.get("stadium"))
            .and_then(|s| s.get("capacity")),
    );
    let founded = opt_i64(data.get("foundationDateTimestamp"))
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| i64::from(dt.year()));
    let colors = data
        .get("teamColors")
        .filter(|v| v.is_object())
        .map(|v| v.to_string())
        .unwrap_or_default();

    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM teams WHERE external_id = ?1",
            params![external_id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = found {
        conn.execute(
            "UPDATE teams SET name = ?2, short_name = ?3, country_id = ?4, venue = ?5,
                 venue_capacity = ?6, founded = ?7, colors = ?8, team_type = ?9
             WHERE id = ?1",
            params![
                id, name, short_name, country_id, venue, venue_capacity, founded,
                colors, team_type
            ],
        )?;
        return Ok(Resolved { id, created: false });
    }

    conn.execute(
        "INSERT INTO teams
             (external_id, name, short_name, country_id, venue, venue_capacity, founded,
              colors, team_type)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            external_id, name, short_name, country_id, venue, venue_capacity, founded,
            colors, team_type
        ],
    )?;
    counts.teams += 1;
    debug!("created team {name}");
    Ok(Resolved {
        id: conn.last_insert_rowid(),
        created: true,
    })
}

/// Players are optional everywhere they appear, so an id-less payload
/// resolves to nothing rather than an error.
pub fn resolve_player(
    conn: &Connection,
    data: &Value,
    team_id: Option<i64>,
    counts: &mut SyncCounts,
) -> Result<Option<Resolved>, SyncError> {
    let Some(external_id) = opt_i64(data.get("id")) else {
        return Ok(None);
    };
    let name = str_or_empty(data.get("name"));
    let position = map_position(data.get("position").and_then(Value::as_str).unwrap_or("M"));
    let position_detail = str_or_empty(data.get("positionDescription"));
    let jersey_number = opt_i64(data.get("jerseyNumber")).or_else(|| opt_i64(data.get("shirtNumber")));
    let height = data.get("height").and_then(Value::as_f64);

    let birth_timestamp = opt_i64(data.get("dateOfBirthTimestamp"));
    let birth_date = birth_timestamp
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.date_naive().to_string());

    let nationality_id = match opt_str(data.get("country").and_then(|c| c.get("name"))) {
        Some(country_name) => find_country_by_name(conn, &country_name)?,
        None => None,
    };

    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM players WHERE external_id = ?1",
            params![external_id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = found {
        conn.execute(
            "UPDATE players SET name = ?2, team_id = ?3, birth_date = ?4, birth_timestamp = ?5,
                 position = ?6, position_detail = ?7, jersey_number = ?8, height = ?9,
                 nationality_id = ?10
             WHERE id = ?1",
            params![
                id, name, team_id, birth_date, birth_timestamp, position, position_detail,
                jersey_number, height, nationality_id
            ],
        )?;
        return Ok(Some(Resolved { id, created: false }));
    }

    conn.execute(
        "INSERT INTO players
             (external_id, name, team_id, birth_date, birth_timestamp, position,
              position_detail, jersey_number, height, nationality_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            external_id, name, team_id, birth_date, birth_timestamp, position,
            position_detail, jersey_number, height, nationality_id
        ],
    )?;
    counts.players += 1;
    Ok(Some(Resolved {
        id: conn.last_insert_rowid(),
        created: true,
    }))
}

/// Lookup-only resolution used by the detail pipeline: unresolved
/// references stay NULL, they never create players on the fly.
pub fn find_player_by_external_id(
    conn: &Connection,
    external_id: Option<i64>,
) -> Result<Option<i64>, SyncError> {
    let Some(ext) = external_id else {
        return Ok(None);
    };
    let id = conn
        .query_row(
            "SELECT id FROM players WHERE external_id = ?1",
            params![ext],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}
