use eyre::Result;
use facework_cli::{console, progress, CliError, RunOptions, RunReport, EXIT_SUCCESS};
use facework_core::JobError;
use indicatif::MultiProgress;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

fn start_logger(default_level: LevelFilter) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        _ => EnvFilter::default().add_directive(default_level.into()),
    };

    // Stdout carries the job console lines.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| eyre::eyre!("logger initialization failed: {err}"))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    start_logger(LevelFilter::INFO)?;

    let (state_tx, state_rx) = mpsc::unbounded_channel();
    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(console::print_state_changes(state_rx));
    let renderer = tokio::spawn(progress::render_transfers(MultiProgress::new(), progress_rx));

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("Interrupted, cancelling the job... (press Ctrl-C again to exit)");
                cancel.cancel();
            }
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }
    });

    let res = facework_cli::dispatch(
        std::env::args_os(),
        move |config| facework_cli::connect(config, Some(progress_tx)),
        RunOptions {
            observer: Some(state_tx),
            cancel,
        },
    )
    .await;

    interrupt.abort();
    // Both channels close once the run has dropped its senders.
    printer.await?;
    renderer.await?;

    let code = match res {
        Ok(report) => {
            print_report(&report);
            EXIT_SUCCESS
        }
        Err(err) => {
            print_error(&err);
            err.exit_code()
        }
    };
    Ok(ExitCode::from(code))
}

fn print_report(report: &RunReport) {
    match report {
        RunReport::Catalog(entries) => {
            if entries.is_empty() {
                println!("No assets found.");
            }
            for line in console::catalog_lines(entries) {
                println!("{line}");
            }
        }
        RunReport::Completed {
            job,
            output,
            result_dir,
            files,
        } => {
            println!(
                "Job {job} output asset {} downloaded to {}",
                output.id,
                result_dir.display()
            );
            for file in files {
                println!("    {}", file.display());
            }
        }
    }
}

fn print_error(err: &CliError) {
    match err {
        CliError::Usage(err) => {
            if let Err(print_err) = err.print() {
                tracing::error!("usage could not be printed: {print_err}");
            }
        }
        CliError::Job(JobError::JobFailed { detail, .. }) => {
            // The state line was already printed while waiting.
            if let Some(detail) = detail {
                println!("{}", console::job_error_line(detail));
            }
        }
        CliError::Job(err) => println!("Error: {err}"),
        CliError::Retrieval { output, source, .. } => {
            println!("Error: {source}");
            println!(
                "The job output is still available in asset {} ({}).",
                output.id, output.name
            );
        }
    }
}
