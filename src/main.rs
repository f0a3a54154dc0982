mod cli;
mod core;
mod error;

use crate::cli::Cli;
use crate::core::{OpenAiBackend, YouTubeTranscripts, default_sources, exit_code, generate};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let transcripts = match YouTubeTranscripts::new(cli.transcript_languages(), cli.preserve_formatting) {
        Ok(transcripts) => transcripts,
        Err(e) => {
            eprintln!("Error: startup failed: {e}");
            return ExitCode::from(e.exit_code());
        }
    };

    let config = cli.generate_config();
    let openai = cli.openai_settings();
    println!("Processing video: {}", config.job.source);

    let outcome = generate(
        &config,
        &default_sources(),
        transcripts,
        |credential| OpenAiBackend::new(credential, openai),
        shutdown_signal(),
    )
    .await;

    match &outcome {
        Ok(generated) => {
            if !cli.quiet {
                println!("{}", generated.document);
            }
            println!("Article saved to: {}", generated.path.display());
        }
        Err(failure) => eprintln!("Error: {failure}"),
    }

    ExitCode::from(exit_code(&outcome))
}

fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("yt_insight={log_level}")),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed.
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
