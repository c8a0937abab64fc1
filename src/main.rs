use std::io::{self, Write};
use std::process::ExitCode;

use bonus_ledger::Ledger;
use bonus_ledger::config::{Command, Config, OutputFormat, USAGE};
use bonus_ledger::journal::{log_skipped, parse_journal, read_journal_file};
use bonus_ledger::report::{
    BalanceReport, BalanceResponse, ErrorResponse, HistoryReport, HistoryResponse,
    write_history_csv,
};
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    let path = &config.journal;
    if path.extension().is_none_or(|ext| ext != "json") {
        warn!(path = %path.display(), "input file seems to not be a json file");
    }

    let raw = match read_journal_file(path) {
        Ok(raw) => raw,
        Err(e) => {
            error!(path = %path.display(), error = %e, "cannot read journal");
            return ExitCode::FAILURE;
        }
    };

    let mut ledger = match config.command {
        Command::Balance => Ledger::new(),
        Command::History => Ledger::recording(),
    };
    let (record_sender, record_receiver) = tokio::sync::mpsc::channel(16);

    let tz = config.timezone.clone();
    tokio::spawn(async move {
        for result in parse_journal(&raw, &tz) {
            match result {
                Ok(record) => {
                    // receiver is gone once the ledger hit a fatal error
                    if record_sender.send(record).await.is_err() {
                        break;
                    }
                }
                Err(e) => log_skipped(&e),
            }
        }
    });

    let now = config.now();
    let replay = ledger
        .run(ReceiverStream::new(record_receiver))
        .await
        .and_then(|()| ledger.finish(now));
    let replay = match replay {
        Ok(replay) => replay,
        Err(e) => {
            print_json(&ErrorResponse::from(&e));
            return ExitCode::FAILURE;
        }
    };
    match (config.command, config.format) {
        (Command::Balance, _) => {
            let report = BalanceReport::from(replay);
            print_json(&BalanceResponse::new(&report, config.user_id))
        }
        (Command::History, OutputFormat::Json) => {
            let report = HistoryReport::new(replay, config.limit);
            print_json(&HistoryResponse::new(
                &report,
                config.user_id,
                &config.timezone,
            ))
        }
        (Command::History, OutputFormat::Csv) => {
            let report = HistoryReport::new(replay, config.limit);
            match write_history_csv(&report, &config.timezone, io::stdout().lock()) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!(error = %e, "failed to write csv");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn print_json(value: &impl Serialize) -> ExitCode {
    let mut stdout = io::stdout().lock();
    let written = serde_json::to_writer(&mut stdout, value)
        .map_err(io::Error::from)
        .and_then(|()| writeln!(stdout));
    match written {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "failed to write response");
            ExitCode::FAILURE
        }
    }
}
