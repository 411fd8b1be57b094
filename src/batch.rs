//! Batch driver: walks listings (a day's schedule, a competition season),
//! syncs every item through the orchestrator and never lets one bad item
//! abort the run. Each run is recorded in sync_runs with its counters and
//! the errors it collected.

use std::env;
use std::thread;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use log::{info, warn};
use rusqlite::{Connection, params};
use serde_json::Value;

use crate::coerce::opt_i64;
use crate::error::SyncError;
use crate::orchestrate::{resolve_event_country, sync_match, sync_team};
use crate::provider::{Provider, Resource, SeasonPage, collection};
use crate::reconcile::{SyncCounts, resolve_competition, resolve_season};

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Items processed between pacing pauses.
    pub chunk: usize,
    /// Pause inserted after each chunk.
    pub pace: Duration,
    /// Recorded errors after which the run gives up.
    pub max_errors: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            chunk: 10,
            pace: Duration::from_millis(1000),
            max_errors: 100,
        }
    }
}

impl BatchOptions {
    pub fn from_env() -> Self {
        let defaults = BatchOptions::default();
        let pace_ms = env::var("FUTSYNC_PACE_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.pace.as_millis() as u64)
            .clamp(0, 60_000);
        let chunk = env::var("FUTSYNC_CHUNK")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(defaults.chunk)
            .clamp(1, 1000);
        let max_errors = env::var("FUTSYNC_MAX_ERRORS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(defaults.max_errors)
            .clamp(1, 100_000);
        BatchOptions {
            chunk,
            pace: Duration::from_millis(pace_ms),
            max_errors,
        }
    }
}

/// What a run produced: merged counters plus the per-item failures,
/// labeled with the item each came from. The stored list is capped at
/// the run's max_errors (oldest kept); `items_failed` keeps the true
/// count either way, and no item is ever skipped because of earlier
/// failures.
#[derive(Debug)]
pub struct BatchReport {
    pub counts: SyncCounts,
    pub errors: Vec<(String, SyncError)>,
    pub items_total: usize,
    pub items_failed: usize,
    error_cap: usize,
}

impl Default for BatchReport {
    fn default() -> Self {
        BatchReport::with_cap(BatchOptions::default().max_errors)
    }
}

impl BatchReport {
    fn with_cap(error_cap: usize) -> Self {
        BatchReport {
            counts: SyncCounts::default(),
            errors: Vec::new(),
            items_total: 0,
            items_failed: 0,
            error_cap,
        }
    }

    fn record_failure(&mut self, label: String, err: SyncError) {
        warn!("{label}: {err}");
        self.items_failed += 1;
        if self.errors.len() < self.error_cap {
            self.errors.push((label, err));
        }
    }

    fn merge(&mut self, other: BatchReport) {
        self.counts.add(&other.counts);
        for (label, err) in other.errors {
            if self.errors.len() >= self.error_cap {
                break;
            }
            self.errors.push((label, err));
        }
        self.items_total += other.items_total;
        self.items_failed += other.items_failed;
    }
}

/// Sync every scheduled match on one calendar day.
pub fn sync_by_date(
    conn: &Connection,
    provider: &dyn Provider,
    date: NaiveDate,
    opts: &BatchOptions,
) -> Result<BatchReport, SyncError> {
    let run_id = start_run(conn, &format!("date {date}"))?;
    let mut report = BatchReport::with_cap(opts.max_errors);

    match provider.fetch(&Resource::ScheduledEvents { date }) {
        Ok(payload) => {
            let events = collection(&payload, "events").to_vec();
            info!("{date}: {} scheduled events", events.len());
            sync_event_list(conn, provider, &events, opts, &mut report);
        }
        Err(err) => report.record_failure(format!("schedule {date}"), err),
    }

    finish_run(conn, run_id, &report)?;
    Ok(report)
}

/// Sync a span of days, inclusive on both ends, pacing between days.
pub fn sync_date_range(
    conn: &Connection,
    provider: &dyn Provider,
    from: NaiveDate,
    to: NaiveDate,
    opts: &BatchOptions,
) -> Result<BatchReport, SyncError> {
    let mut report = BatchReport::with_cap(opts.max_errors);
    let mut day = from;
    while day <= to {
        report.merge(sync_by_date(conn, provider, day, opts)?);
        let Some(next) = day.succ_opt() else { break };
        day = next;
        if day <= to && !opts.pace.is_zero() {
            thread::sleep(opts.pace);
        }
    }
    Ok(report)
}

/// Full competition-season sync: competition and season records first,
/// then every participating team with its squad, then both the played and
/// the upcoming event feeds.
pub fn sync_competition_season(
    conn: &Connection,
    provider: &dyn Provider,
    tournament_id: i64,
    season_id: i64,
    max_matches: Option<usize>,
    opts: &BatchOptions,
) -> Result<BatchReport, SyncError> {
    let run_id = start_run(
        conn,
        &format!("competition {tournament_id} season {season_id}"),
    )?;
    let mut report = BatchReport::with_cap(opts.max_errors);

    let competition = match presync_competition(conn, provider, tournament_id, &mut report.counts)
    {
        Ok(resolved) => resolved,
        Err(err) => {
            report.record_failure(format!("competition {tournament_id}"), err);
            finish_run(conn, run_id, &report)?;
            return Ok(report);
        }
    };

    if let Err(err) = presync_season(
        conn,
        provider,
        tournament_id,
        season_id,
        competition,
        &mut report.counts,
    ) {
        report.record_failure(format!("season {season_id}"), err);
        finish_run(conn, run_id, &report)?;
        return Ok(report);
    }

    presync_teams(conn, provider, tournament_id, season_id, opts, &mut report);

    let mut events = fetch_season_events(provider, tournament_id, season_id, &mut report);
    if let Some(max) = max_matches {
        events.truncate(max);
    }
    info!(
        "competition {tournament_id} season {season_id}: {} events to sync",
        events.len()
    );
    sync_event_list(conn, provider, &events, opts, &mut report);

    finish_run(conn, run_id, &report)?;
    Ok(report)
}

/// Sync one match by its external event id.
pub fn sync_single_match(
    conn: &Connection,
    provider: &dyn Provider,
    event_id: i64,
) -> Result<BatchReport, SyncError> {
    let run_id = start_run(conn, &format!("match {event_id}"))?;
    let mut report = BatchReport::default();
    report.items_total = 1;
    match provider
        .fetch(&Resource::Event { event_id })
        .and_then(|payload| {
            let event = payload.get("event").cloned().unwrap_or(Value::Null);
            sync_match(conn, provider, &event, &mut report.counts)
        }) {
        Ok(outcome) => info!(
            "match {event_id}: {} (details: {})",
            if outcome.created { "created" } else { "updated" },
            outcome.details_synced
        ),
        Err(err) => report.record_failure(format!("match {event_id}"), err),
    }
    finish_run(conn, run_id, &report)?;
    Ok(report)
}

/// Sync one team record and its squad by external team id.
pub fn sync_single_team(
    conn: &Connection,
    provider: &dyn Provider,
    team_id: i64,
) -> Result<BatchReport, SyncError> {
    let run_id = start_run(conn, &format!("team {team_id}"))?;
    let mut report = BatchReport::default();
    report.items_total = 1;
    if let Err(err) = sync_team(conn, provider, team_id, &mut report.counts) {
        report.record_failure(format!("team {team_id}"), err);
    }
    finish_run(conn, run_id, &report)?;
    Ok(report)
}

fn sync_event_list(
    conn: &Connection,
    provider: &dyn Provider,
    events: &[Value],
    opts: &BatchOptions,
    report: &mut BatchReport,
) {
    let chunk = opts.chunk.max(1);
    for (idx, event) in events.iter().enumerate() {
        report.items_total += 1;
        if let Err(err) = sync_match(conn, provider, event, &mut report.counts) {
            let label = match opt_i64(event.get("id")) {
                Some(id) => format!("match {id}"),
                None => "match without id".to_string(),
            };
            report.record_failure(label, err);
        }
        if (idx + 1) % chunk == 0 && idx + 1 < events.len() && !opts.pace.is_zero() {
            thread::sleep(opts.pace);
        }
    }
}

fn presync_competition(
    conn: &Connection,
    provider: &dyn Provider,
    tournament_id: i64,
    counts: &mut SyncCounts,
) -> Result<i64, SyncError> {
    let payload = provider.fetch(&Resource::Tournament { tournament_id })?;
    let data = payload.get("uniqueTournament").unwrap_or(&Value::Null);
    let category = data.get("category").unwrap_or(&Value::Null);
    let country = resolve_event_country(conn, category, counts)?;
    let competition = resolve_competition(conn, data, country.map(|c| c.id), counts)?;
    Ok(competition.id)
}

fn presync_season(
    conn: &Connection,
    provider: &dyn Provider,
    tournament_id: i64,
    season_id: i64,
    competition_id: i64,
    counts: &mut SyncCounts,
) -> Result<(), SyncError> {
    let payload = provider.fetch(&Resource::SeasonInfo {
        tournament_id,
        season_id,
    })?;
    let season_data = payload
        .get("info")
        .and_then(|info| info.get("season"))
        .unwrap_or(&Value::Null);
    resolve_season(conn, season_data, competition_id, counts)?;
    Ok(())
}

/// Teams and squads go in before any event, so lineups and incidents
/// resolve locally on the first pass. A team that fails stays a recorded
/// error; its matches still sync, minus player references.
fn presync_teams(
    conn: &Connection,
    provider: &dyn Provider,
    tournament_id: i64,
    season_id: i64,
    opts: &BatchOptions,
    report: &mut BatchReport,
) {
    let payload = match provider.fetch(&Resource::SeasonTeams {
        tournament_id,
        season_id,
    }) {
        Ok(payload) => payload,
        Err(err) => {
            report.record_failure(format!("season {season_id} teams"), err);
            return;
        }
    };
    let teams = collection(&payload, "teams");
    info!("presyncing {} teams", teams.len());
    let chunk = opts.chunk.max(1);
    for (idx, team) in teams.iter().enumerate() {
        let Some(team_id) = opt_i64(team.get("id")) else {
            continue;
        };
        if let Err(err) = sync_team(conn, provider, team_id, &mut report.counts) {
            report.record_failure(format!("team {team_id}"), err);
        }
        if (idx + 1) % chunk == 0 && idx + 1 < teams.len() && !opts.pace.is_zero() {
            thread::sleep(opts.pace);
        }
    }
}

/// Played events first, then the upcoming feed. Seasons that have not
/// started yet have no past feed, so that fetch failing is routine.
fn fetch_season_events(
    provider: &dyn Provider,
    tournament_id: i64,
    season_id: i64,
    report: &mut BatchReport,
) -> Vec<Value> {
    let mut events = Vec::new();
    match provider.fetch(&Resource::SeasonEvents {
        tournament_id,
        season_id,
        page: SeasonPage::Past,
    }) {
        Ok(payload) => events.extend_from_slice(collection(&payload, "events")),
        Err(err) => report.record_failure(format!("season {season_id} past events"), err),
    }
    if let Ok(payload) = provider.fetch(&Resource::SeasonEvents {
        tournament_id,
        season_id,
        page: SeasonPage::Upcoming,
    }) {
        events.extend_from_slice(collection(&payload, "events"));
    }
    events
}

fn start_run(conn: &Connection, scope: &str) -> Result<i64, SyncError> {
    conn.execute(
        "INSERT INTO sync_runs (started_at, scope) VALUES (?1, ?2)",
        params![Utc::now().to_rfc3339(), scope],
    )?;
    Ok(conn.last_insert_rowid())
}

fn finish_run(conn: &Connection, run_id: i64, report: &BatchReport) -> Result<(), SyncError> {
    let counts_json =
        serde_json::to_string(&report.counts).unwrap_or_else(|_| "{}".to_string());
    let errors: Vec<String> = report
        .errors
        .iter()
        .map(|(label, err)| format!("{label}: {err}"))
        .collect();
    let errors_json = serde_json::to_string(&errors).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "UPDATE sync_runs SET finished_at = ?2, items_total = ?3, items_failed = ?4,
             counts_json = ?5, errors_json = ?6
         WHERE run_id = ?1",
        params![
            run_id,
            Utc::now().to_rfc3339(),
            report.items_total,
            report.items_failed,
            counts_json,
            errors_json,
        ],
    )?;
    Ok(())
}
