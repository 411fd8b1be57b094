use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use serde_json::Value;

use crate::error::SyncError;

const BASE_URL: &str = "https://www.sofascore.com/api/v1";
const REQUEST_TIMEOUT_SECS: u64 = 10;

static CLIENT: OnceCell<Client> = OnceCell::new();

fn http_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeasonPage {
    Past,
    Upcoming,
}

/// Logical provider resource. Keeping this as data (rather than ad-hoc
/// URL strings) lets tests substitute a canned payload per resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    ScheduledEvents { date: NaiveDate },
    Event { event_id: i64 },
    EventStatistics { event_id: i64 },
    EventIncidents { event_id: i64 },
    EventLineups { event_id: i64 },
    Team { team_id: i64 },
    TeamPlayers { team_id: i64 },
    Tournament { tournament_id: i64 },
    SeasonInfo { tournament_id: i64, season_id: i64 },
    SeasonTeams { tournament_id: i64, season_id: i64 },
    SeasonEvents { tournament_id: i64, season_id: i64, page: SeasonPage },
}

impl Resource {
    pub fn path(&self) -> String {
        match self {
            Resource::ScheduledEvents { date } => {
                format!("/sport/football/scheduled-events/{}", date.format("%Y-%m-%d"))
            }
            Resource::Event { event_id } => format!("/event/{event_id}"),
            Resource::EventStatistics { event_id } => format!("/event/{event_id}/statistics"),
            Resource::EventIncidents { event_id } => format!("/event/{event_id}/incidents"),
            Resource::EventLineups { event_id } => format!("/event/{event_id}/lineups"),
            Resource::Team { team_id } => format!("/team/{team_id}"),
            Resource::TeamPlayers { team_id } => format!("/team/{team_id}/players"),
            Resource::Tournament { tournament_id } => {
                format!("/unique-tournament/{tournament_id}")
            }
            Resource::SeasonInfo { tournament_id, season_id } => {
                format!("/unique-tournament/{tournament_id}/season/{season_id}/info")
            }
            Resource::SeasonTeams { tournament_id, season_id } => {
                format!("/unique-tournament/{tournament_id}/season/{season_id}/teams")
            }
            Resource::SeasonEvents { tournament_id, season_id, page } => {
                let feed = match page {
                    SeasonPage::Past => "last",
                    SeasonPage::Upcoming => "next",
                };
                format!("/unique-tournament/{tournament_id}/season/{season_id}/events/{feed}/0")
            }
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// External data client seam. `Sync` so the detail pipeline can fan its
/// three sub-fetches out across rayon workers.
pub trait Provider: Sync {
    fn fetch(&self, resource: &Resource) -> Result<Value, SyncError>;
}

pub struct SofascoreClient {
    client: &'static Client,
}

impl SofascoreClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: http_client()?,
        })
    }
}

impl Provider for SofascoreClient {
    fn fetch(&self, resource: &Resource) -> Result<Value, SyncError> {
        let url = format!("{BASE_URL}{}", resource.path());
        let fetch_err = |message: String| SyncError::Fetch {
            resource: resource.to_string(),
            message,
        };

        let resp = self
            .client
            .get(&url)
            .header(USER_AGENT, "Mozilla/5.0")
            .send()
            .map_err(|err| fetch_err(err.to_string()))?;
        let status = resp.status();
        let body = resp.text().map_err(|err| fetch_err(err.to_string()))?;
        if !status.is_success() {
            return Err(fetch_err(format!("http {status}")));
        }

        let trimmed = body.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(Value::Null);
        }
        serde_json::from_str(trimmed).map_err(|err| fetch_err(format!("invalid json: {err}")))
    }
}

/// A present-but-empty or missing top-level collection key means "no
/// data available", never an error.
pub fn collection<'a>(payload: &'a Value, key: &str) -> &'a [Value] {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
