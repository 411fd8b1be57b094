use std::env;
use std::path::Path;

use anyhow::{Result, anyhow};
use chrono::NaiveDate;

use futsync::batch::{self, BatchOptions, BatchReport};
use futsync::db;
use futsync::provider::SofascoreClient;

fn main() -> Result<()> {
    if dotenvy::from_filename(".env.local").is_err() {
        let _ = dotenvy::dotenv();
    }
    env_logger::init();

    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let db_path = flag_value(&args, "--db")
        .or_else(|| env::var("FUTSYNC_DB").ok())
        .unwrap_or_else(|| db::default_db_path().to_string());
    let conn = db::open_db(Path::new(&db_path))?;
    let provider = SofascoreClient::new()?;
    let opts = BatchOptions::from_env();

    let report = run(&args, &conn, &provider, &opts)?;
    print_report(&db_path, &report);
    Ok(())
}

fn run(
    args: &[String],
    conn: &rusqlite::Connection,
    provider: &SofascoreClient,
    opts: &BatchOptions,
) -> Result<BatchReport> {
    if let Some(date) = flag_value(args, "--date") {
        let date = parse_date(&date)?;
        return Ok(batch::sync_by_date(conn, provider, date, opts)?);
    }
    if let (Some(from), Some(to)) = (flag_value(args, "--from"), flag_value(args, "--to")) {
        let from = parse_date(&from)?;
        let to = parse_date(&to)?;
        if to < from {
            return Err(anyhow!("--to {to} is before --from {from}"));
        }
        return Ok(batch::sync_date_range(conn, provider, from, to, opts)?);
    }
    if let (Some(competition), Some(season)) =
        (flag_value(args, "--competition"), flag_value(args, "--season"))
    {
        let tournament_id = parse_id(&competition, "--competition")?;
        let season_id = parse_id(&season, "--season")?;
        let max = match flag_value(args, "--max") {
            Some(raw) => Some(parse_id(&raw, "--max")? as usize),
            None => None,
        };
        return Ok(batch::sync_competition_season(
            conn,
            provider,
            tournament_id,
            season_id,
            max,
            opts,
        )?);
    }
    if let Some(raw) = flag_value(args, "--match") {
        let event_id = parse_id(&raw, "--match")?;
        return Ok(batch::sync_single_match(conn, provider, event_id)?);
    }
    if let Some(raw) = flag_value(args, "--team") {
        let team_id = parse_id(&raw, "--team")?;
        return Ok(batch::sync_single_team(conn, provider, team_id)?);
    }

    print_usage();
    Err(anyhow!("no sync scope given"))
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| anyhow!("invalid date {raw:?}, expected YYYY-MM-DD"))
}

fn parse_id(raw: &str, flag: &str) -> Result<i64> {
    raw.parse::<i64>()
        .map_err(|_| anyhow!("invalid {flag} value {raw:?}"))
}

fn print_report(db_path: &str, report: &BatchReport) {
    println!("Sync complete");
    println!("DB: {db_path}");
    println!(
        "Items: {}/{} ok",
        report.items_total.saturating_sub(report.items_failed),
        report.items_total
    );
    let c = &report.counts;
    for (label, n) in [
        ("countries", c.countries),
        ("competitions", c.competitions),
        ("seasons", c.seasons),
        ("teams", c.teams),
        ("players", c.players),
        ("matches", c.matches),
        ("statistics rows", c.statistics),
        ("event rows", c.events),
        ("lineup rows", c.lineups),
    ] {
        if n > 0 {
            println!("{label} created: {n}");
        }
    }
    if !report.errors.is_empty() {
        println!("errors: {}", report.errors.len());
        for (label, err) in report.errors.iter().take(10) {
            println!(" - {label}: {err}");
        }
    }
}

fn print_usage() {
    println!("futsync - football data sync");
    println!("usage: futsync [scope] [--db=PATH]");
    println!("  --date=YYYY-MM-DD            sync one day's schedule");
    println!("  --from=DATE --to=DATE        sync a date range");
    println!("  --competition=ID --season=ID [--max=N]");
    println!("                               sync a competition season");
    println!("  --match=ID                   sync one match");
    println!("  --team=ID                    sync one team and its squad");
    println!("env: FUTSYNC_DB, FUTSYNC_PACE_MS, FUTSYNC_CHUNK, FUTSYNC_MAX_ERRORS");
}
