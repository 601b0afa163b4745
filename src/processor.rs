use log::{debug, error, info, trace};

use hifitime::prelude::Epoch;

use serde_json::Value;

use std::collections::HashSet;

use thiserror::Error;

use tokio::sync::watch::Receiver as WatchRx;

use crate::{
    accumulator::Accumulator,
    error::Error,
    fix::{Record, validate},
    reader::{Item, StreamReader},
    runtime::{Report, Runtime},
    transport::Transport,
};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum State {
    #[default]
    Connecting,
    Streaming,
    Draining,
    Finished,
    Failed,
}

/// Fatal outcome of a run, with whatever had been accumulated
#[derive(Debug, Error)]
#[error("{error} ({} valid point(s) processed)", .report.valid_count)]
pub struct Failure {
    pub error: Error,
    pub report: Report,
}

/// Identity of a record, when the source provides one
fn identity(record: &Record) -> Option<(String, String)> {
    let timestamp = record.get("gps")?.get("read_timestamp")?;
    let frame_id = record.get("frame")?.get("frame_id")?;
    Some((timestamp.to_string(), frame_id.to_string()))
}

/// Resolves once shutdown has been requested.
/// Never resolves if the shutdown handle is gone.
async fn shutdown_requested(shutdown: &mut WatchRx<bool>) {
    loop {
        let requested = *shutdown.borrow_and_update();
        if requested {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// [Processor] consumes one stream, from connection to [Report].
pub struct Processor<T: Transport> {
    reader: StreamReader<T>,
    accumulator: Accumulator,
    runtime: Runtime,
    state: State,

    /// graceful exit
    shutdown: WatchRx<bool>,

    /// Identities seen so far, when duplicate suppression is active
    seen: Option<HashSet<(String, String)>>,
}

impl<T: Transport> Processor<T> {
    /// Builds new [Processor]
    pub fn new(deploy_time: Epoch, reader: StreamReader<T>, shutdown: WatchRx<bool>) -> Self {
        Self {
            reader,
            shutdown,
            state: State::default(),
            accumulator: Accumulator::default(),
            runtime: Runtime::new(deploy_time),
            seen: None,
        }
    }

    /// Skip records whose identity was already seen in this run
    pub fn with_deduplication(mut self) -> Self {
        self.seen = Some(HashSet::new());
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Runs to completion. On fatal error, the [Failure] still carries
    /// the partial [Report].
    pub async fn run(mut self) -> Result<Report, Failure> {
        let mut fatal = None;

        loop {
            match self.state {
                State::Connecting => {
                    let outcome = tokio::select! {
                        biased;
                        _ = shutdown_requested(&mut self.shutdown) => None,
                        outcome = self.reader.connect() => Some(outcome),
                    };

                    match outcome {
                        None => self.cancel(),
                        Some(Ok(())) => self.state = State::Streaming,
                        Some(Err(e)) => {
                            fatal = Some(e);
                            self.state = State::Failed;
                        },
                    }
                },
                State::Streaming => {
                    let next = tokio::select! {
                        biased;
                        _ = shutdown_requested(&mut self.shutdown) => None,
                        next = self.reader.next() => Some(next),
                    };

                    match next {
                        None => self.cancel(),
                        Some(Ok(Some(item))) => self.consume(item),
                        Some(Ok(None)) => {
                            info!("end of stream");
                            self.state = State::Draining;
                        },
                        Some(Err(e)) => {
                            error!("{}", e);
                            fatal = Some(e);
                            self.state = State::Failed;
                        },
                    }
                },
                State::Draining => {
                    self.state = State::Finished;
                },
                State::Finished => {
                    let report = self.report();
                    info!(
                        "total distance: {:.6} km - {} valid point(s)",
                        report.total_distance_km, report.valid_count
                    );
                    return Ok(report);
                },
                State::Failed => {
                    let report = self.report();
                    let error = fatal.take().unwrap_or_else(|| {
                        Error::Protocol("stream failed without cause".to_string())
                    });
                    return Err(Failure { error, report });
                },
            }
        }
    }

    /// Shutdown requested: release the source, keep what we have
    fn cancel(&mut self) {
        info!("shutdown requested");
        self.reader.close();
        self.runtime.cancelled = true;
        self.state = State::Draining;
    }

    fn consume(&mut self, item: Item) {
        let record = match item {
            Item::Record(record) => record,
            Item::Invalid(e) => {
                debug!("skipped payload: {}", e);
                self.runtime.skipped.decode += 1;
                return;
            },
        };

        if let Some(seen) = &mut self.seen {
            if let Some(identity) = identity(&record) {
                if !seen.insert(identity) {
                    debug!("skipped duplicate record");
                    self.runtime.skipped.duplicate += 1;
                    return;
                }
            }
        }

        match validate(&record) {
            Ok(fix) => {
                let segment = self.accumulator.fold(fix);
                trace!(
                    "{} - segment: {:.6} km - total: {:.6} km",
                    fix,
                    segment,
                    self.accumulator.total_distance()
                );
            },
            Err(e) => {
                debug!("skipped record {}: {}", Value::Object(record), e);
                self.runtime.skipped.rejected(&e);
            },
        }
    }

    fn report(&mut self) -> Report {
        if let Ok(now) = Epoch::now() {
            self.runtime.new_epoch(now);
        }
        self.runtime
            .report(&self.accumulator, self.reader.state().connections)
    }
}
