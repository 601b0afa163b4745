#![doc = include_str!("../README.md")]

/*
 * GPSDIST measures the distance traveled along a stream of GPS fixes.
 * This tool is shipped under Mozilla Public V2 license.
 */

use env_logger::{Builder, Target};

use log::{error, info};

use serde::Serialize;

use tokio::{signal, sync::watch};

use hifitime::prelude::{Duration, Epoch, TimeScale};

mod accumulator;
mod cli;
mod error;
mod fix;
mod geo;
mod processor;
mod reader;
mod runtime;
mod transport;

use crate::{
    cli::{Cli, Source},
    processor::Processor,
    reader::StreamReader,
    runtime::Report,
    transport::Interface,
};

/// JSON output
#[derive(Serialize)]
struct Output<'a> {
    report: &'a Report,
    error: Option<String>,
}

fn print_report(report: &Report, error: Option<String>, json: bool) {
    if json {
        let output = Output { report, error };
        match serde_json::to_string_pretty(&output) {
            Ok(content) => println!("{}", content),
            Err(e) => error!("failed to serialize report: {}", e),
        }
    } else {
        if let Some(error) = error {
            println!("Error: {}", error);
            println!("Partial results:");
        }
        println!("{}", report);
    }
}

#[tokio::main]
pub async fn main() {
    let mut builder = Builder::from_default_env();

    builder
        .target(Target::Stdout)
        .format_timestamp_secs()
        .format_module_path(false)
        .init();

    let cfg_precision = Duration::from_seconds(1.0);

    let t_utc = Epoch::now()
        .unwrap_or_else(|e| panic!("Failed to determine system time: {}", e))
        .to_time_scale(TimeScale::UTC);

    // cli
    let cli = Cli::new();

    // Input interface
    let interface = match cli.source() {
        Source::Files(paths) => Interface::from_files(paths),
        Source::Url(url) => Interface::from_url(&url, cli.http_settings())
            .unwrap_or_else(|e| panic!("Invalid command line: {}", e)),
    };

    if interface.is_read_only() {
        info!("{} - passive mode", t_utc.round(cfg_precision));
    }

    let reader = StreamReader::new(interface, cli.retry_settings());

    // shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        signal::ctrl_c()
            .await
            .unwrap_or_else(|e| panic!("Tokio signal handling error: {}", e));

        // processor may already be gone
        let _ = shutdown_tx.send(true);
    });

    let mut processor = Processor::new(t_utc, reader, shutdown_rx);

    if cli.dedup() {
        processor = processor.with_deduplication();
    }

    info!("{} - application deployed", t_utc.round(cfg_precision));

    match processor.run().await {
        Ok(report) => print_report(&report, None, cli.json()),
        Err(failure) => {
            error!("{}", failure);
            print_report(&failure.report, Some(failure.error.to_string()), cli.json());
            std::process::exit(1);
        },
    }
}
