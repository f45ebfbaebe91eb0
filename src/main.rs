use std::process::ExitCode;

use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};

use later::config::LaterConfig;
use later::core::preset::Preset;
use later::core::schedule::{format_local_timestamp, parse_local_timestamp, PageInfo, ScheduleId};
use later::host::CliHost;
use later::service::http::HttpScheduleClient;
use later::workflow::{ScheduleWorkflowController, WorkflowError};

#[derive(Parser, Debug)]
#[command(name = "later", version, about = "Schedule links to surface later")]
struct Cli {
    /// Base URL of the later daemon API (overrides the config file).
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Log at debug level.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show whether the daemon is running.
    Health,
    /// List pending schedules for a day (today by default).
    List {
        #[arg(long, conflicts_with = "all")]
        date: Option<NaiveDate>,
        #[arg(long)]
        all: bool,
    },
    /// Schedule a link.
    Add {
        url: String,
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        when: When,
    },
    /// Move a pending schedule.
    Reschedule {
        id: String,
        #[command(flatten)]
        when: When,
    },
    /// Delete a pending schedule.
    Delete { id: String },
    /// Open a scheduled link now.
    Open { id: String },
}

#[derive(clap::Args, Debug)]
struct When {
    /// Local time, YYYY-MM-DDTHH:MM.
    #[arg(long, value_parser = parse_at, conflicts_with = "preset")]
    at: Option<NaiveDateTime>,

    /// One of 1hr, tonight, tomorrow.
    #[arg(long)]
    preset: Option<String>,
}

fn parse_at(input: &str) -> Result<NaiveDateTime, String> {
    parse_local_timestamp(input).map_err(|e| format!("expected YYYY-MM-DDTHH:MM: {}", e))
}

fn init_logging(debug: bool) {
    // Lets the later crate through at info (debug when toggled), everything else at warn.
    // Read it with `journalctl --user -t later -f`.
    struct FilteredJournal {
        inner: systemd_journal_logger::JournalLog,
    }

    impl log::Log for FilteredJournal {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            if metadata.target().starts_with("later") {
                let max = if later::debug_logging() {
                    log::LevelFilter::Debug
                } else {
                    log::LevelFilter::Info
                };
                metadata.level() <= max
            } else {
                metadata.level() <= log::LevelFilter::Warn
            }
        }
        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                self.inner.log(record);
            }
        }
        fn flush(&self) {
            self.inner.flush();
        }
    }

    later::set_debug_logging(debug);

    let journal = match systemd_journal_logger::JournalLog::new() {
        Ok(journal) => journal.with_syslog_identifier("later".to_string()),
        Err(e) => {
            eprintln!("journal unavailable, logging disabled: {}", e);
            return;
        }
    };
    if log::set_boxed_logger(Box::new(FilteredJournal { inner: journal })).is_ok() {
        // Global max must be Debug so debug logs can pass when toggled
        log::set_max_level(log::LevelFilter::Debug);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = LaterConfig::load_or_default(&LaterConfig::default_path());
    if let Some(api_base) = cli.api_base.clone() {
        config.api_base = api_base;
    }
    init_logging(cli.debug || config.debug_logging);

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Command failed: {}", e);
            eprintln!("{}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: &LaterConfig) -> Result<(), WorkflowError> {
    let client = HttpScheduleClient::from_config(config)?;
    let controller = ScheduleWorkflowController::new(client);
    let now = Local::now().naive_local();
    let host = CliHost::new(config.browser_command.clone());

    match command {
        Command::Health => {
            let report = controller.service().health_report().await?;
            println!("status:  {}", report.status);
            if let Some(version) = report.version {
                println!("version: {}", version);
            }
            if let Some(uptime) = report.uptime_seconds {
                println!("uptime:  {:.0}s", uptime);
            }
            if let Some(pending) = report.pending_count {
                println!("pending: {}", pending);
            }
        }
        Command::List { date, all } => {
            let date = if all { None } else { Some(date.unwrap_or_else(|| now.date())) };
            let event = controller.refresh(date).await?;
            for record in controller.records() {
                let when = if all {
                    format_local_timestamp(&record.scheduled_at)
                } else {
                    record.display_time()
                };
                println!("{}  {}  ({})", when, record.display_title(), record.id);
            }
            if controller.records().is_empty() {
                println!("{}", event.status_message());
            }
        }
        Command::Add { url, title, when } => {
            require_service(&controller).await?;
            let page = PageInfo::new(url, title);
            let label = page.display_title().to_string();
            let host = host.with_page(page);
            controller.begin_compose_from_host(&host).await?;
            let at = when.resolve(controller.default_time(now), now);
            let event = controller.confirm(at).await?;
            println!("{} {} at {}", event.status_message(), label, format_local_timestamp(&at));
        }
        Command::Reschedule { id, when } => {
            require_service(&controller).await?;
            controller.refresh(None).await?;
            controller.begin_reschedule(&ScheduleId::from(id))?;
            let at = when.resolve(Preset::InOneHour.resolve(now), now);
            let event = controller.confirm(at).await?;
            println!("{} {}", event.status_message(), format_local_timestamp(&at));
        }
        Command::Delete { id } => {
            require_service(&controller).await?;
            let event = controller.delete_existing(&ScheduleId::from(id)).await?;
            println!("{}", event.status_message());
        }
        Command::Open { id } => {
            controller.refresh(None).await?;
            let event = controller.open_existing(&ScheduleId::from(id), &host).await?;
            println!("{}", event.status_message());
        }
    }
    Ok(())
}

impl When {
    fn resolve(&self, fallback: NaiveDateTime, now: NaiveDateTime) -> NaiveDateTime {
        match (&self.at, &self.preset) {
            (Some(at), _) => *at,
            (None, Some(token)) => Preset::parse(token).resolve(now),
            (None, None) => fallback,
        }
    }
}

async fn require_service(
    controller: &ScheduleWorkflowController<HttpScheduleClient>,
) -> Result<(), WorkflowError> {
    if controller.check_health().await {
        Ok(())
    } else {
        Err(WorkflowError::Unavailable)
    }
}
