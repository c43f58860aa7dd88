use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{Duration, Local, NaiveDate};
use chrono_english::{Dialect, parse_date_string};
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::{
    capture::{
        CaptureOutcome, CaptureSettings, EventLogger, ocr::OcrCli, probe::MacProbe,
        screen::ScreencaptureCli,
    },
    config::Config,
    report::{
        WorkWeek, generate_daily_report, generate_weekly_report, notify::Notifier,
        store::ReportStore, summarizer::HttpSummarizer,
    },
    storage::event_log::EventLogImpl,
    utils::{
        clock::DefaultClock,
        dir::create_application_default_path,
        logging::{CAPTURE_PREFIX, REPORT_PREFIX, enable_logging},
        time::date_from_log_stem,
    },
};

#[derive(Parser, Debug)]
#[command(name = "Worklog", version, long_about = None)]
#[command(about = "Records desktop activity and synthesizes daily/weekly reports", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Mirror diagnostics to stdout")]
    log: bool,
    #[arg(
        long,
        help = "Application directory. By default tries WORKLOG_ROOT, then $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(
        about = "Run one capture cycle: record the foreground app, window title and on-screen text"
    )]
    Capture {},
    #[command(about = "(Re)generate the daily report for a date or a specific day's log file")]
    Report {
        #[arg(
            help = "ISO date, an expression like \"yesterday\", or a path to a day's .jsonl log. Defaults to yesterday"
        )]
        target: Option<String>,
    },
    #[command(about = "(Re)generate the weekly report for the Mon-Fri week containing a date")]
    Weekly {
        #[arg(help = "ISO date or an expression like \"last friday\". Defaults to today")]
        date: Option<String>,
    },
}

pub async fn run_cli() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let root = match args.dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            dir
        }
        None => create_application_default_path()?,
    };
    let config = Config::load(root)?;

    let prefix = match &args.commands {
        Commands::Capture {} => CAPTURE_PREFIX,
        _ => REPORT_PREFIX,
    };
    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(prefix, &config.diagnostics_dir(), logging_level, args.log)?;

    match args.commands {
        Commands::Capture {} => run_capture(&config).await,
        Commands::Report { target } => run_report(&config, target).await,
        Commands::Weekly { date } => run_weekly(&config, date).await,
    }
}

async fn run_capture(config: &Config) -> Result<()> {
    let event_log = EventLogImpl::new(config.logs_dir())?;
    let mut logger = EventLogger::new(
        Box::new(MacProbe::new()),
        Box::new(ScreencaptureCli),
        Box::new(OcrCli::new(
            config.ocr_tool.clone(),
            config.ocr_languages.clone(),
        )),
        event_log,
        Box::new(DefaultClock),
        CaptureSettings::from_config(config),
    );

    match logger.run_cycle().await? {
        CaptureOutcome::Recorded => println!("Recorded one activity event"),
        CaptureOutcome::SkippedIdle => println!("Skipped: user is idle"),
        CaptureOutcome::SkippedLocked => println!("Skipped: screen is locked"),
    }
    Ok(())
}

async fn run_report(config: &Config, target: Option<String>) -> Result<()> {
    let (log_dir, date) = resolve_report_target(config, target)?;
    let event_log = EventLogImpl::new(log_dir)?;
    let summarizer = HttpSummarizer::new(&config.summarizer)?;
    let store = ReportStore::new(config.reports_dir())?;

    let path = generate_daily_report(config, &event_log, &summarizer, &store, date).await?;
    println!("Report saved: {}", path.display());
    Ok(())
}

async fn run_weekly(config: &Config, date: Option<String>) -> Result<()> {
    let date = match date {
        Some(raw) => parse_date_expression(&raw)?,
        None => Local::now().date_naive(),
    };
    let week = WorkWeek::containing(date);

    let event_log = EventLogImpl::new(config.logs_dir())?;
    let summarizer = HttpSummarizer::new(&config.summarizer)?;
    let store = ReportStore::new(config.reports_dir())?;
    let notifier = config.webhook_url.clone().map(Notifier::new).transpose()?;

    let path = generate_weekly_report(
        config,
        &event_log,
        &summarizer,
        &store,
        week,
        notifier.as_ref(),
    )
    .await?;
    println!("Report saved: {}", path.display());
    Ok(())
}

/// A report target is either a date (then the configured log dir is used) or
/// a path to one day's log file (then its directory becomes the log dir and
/// the date comes from the file name).
fn resolve_report_target(config: &Config, target: Option<String>) -> Result<(PathBuf, NaiveDate)> {
    let Some(target) = target else {
        return Ok((
            config.logs_dir(),
            Local::now().date_naive() - Duration::days(1),
        ));
    };

    let path = Path::new(&target);
    if path.is_file() {
        let stem = path
            .file_stem()
            .and_then(|v| v.to_str())
            .unwrap_or_default();
        let date = date_from_log_stem(stem)
            .with_context(|| format!("log file name {stem:?} is not a YYYY-MM-DD date"))?;
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_owned(),
            _ => PathBuf::from("."),
        };
        return Ok((parent, date));
    }

    Ok((config.logs_dir(), parse_date_expression(&target)?))
}

fn parse_date_expression(raw: &str) -> Result<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    parse_date_string(raw, Local::now(), Dialect::Uk)
        .map(|v| v.date_naive())
        .map_err(|e| anyhow!("failed to parse date {raw:?}: {e}"))
}
