use clap::{Arg, ArgAction, ArgMatches, ColorChoice, Command};
use hifitime::prelude::Duration;

use crate::{
    reader::{Backoff, RetrySettings},
    transport::HttpSettings,
};

use std::str::FromStr;

/// Source polled when none is specified
pub const DEFAULT_URL: &str = "http://localhost:6000/stream";

/// Selected input
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// Live source (tcp:// or http(s)://)
    Url(String),

    /// Passive mode
    Files(Vec<String>),
}

pub struct Cli {
    /// Arguments passed by user
    matches: ArgMatches,
}

impl Cli {
    /// Build new command line interface
    pub fn new() -> Self {
        Self {
            matches: Self::command().get_matches(),
        }
    }

    fn command() -> Command {
        Command::new("gpsdist")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Distance traveled, from a stream of GPS fixes")
            .color(ColorChoice::Always)
            .next_help_heading("Live source")
            .arg(
                Arg::new("url")
                    .short('u')
                    .long("url")
                    .value_name("URL")
                    .conflicts_with("file")
                    .help(format!("Stream source. Either tcp://host:port (JSON lines)
or http(s)://host/path (polled with batch_index and sample_index queries).
Default is \"{}\"", DEFAULT_URL)),
            )
            .arg(
                Arg::new("batch-size")
                    .long("batch-size")
                    .value_name("SIZE")
                    .help("Number of samples per batch, when polling an HTTP source. Default is 16"),
            )
            .arg(
                Arg::new("timeout")
                    .long("timeout")
                    .value_name("DURATION")
                    .help("HTTP request timeout. Default is 30 s"),
            )
            .next_help_heading("File interface (Passive mode)")
            .arg(
                Arg::new("file")
                    .long("file")
                    .short('f')
                    .value_name("FILENAME")
                    .action(ArgAction::Append)
                    .help("Load a single file of JSON lines. Use as many as needed.
Each file is consumed one after the other. Gzip files are supported but they must be terminated with '.gz'"),
            )
            .next_help_heading("Connection retries")
            .arg(
                Arg::new("max-retries")
                    .short('r')
                    .long("max-retries")
                    .value_name("COUNT")
                    .help("Maximal number of consecutive connection failures. Default is 3"),
            )
            .arg(
                Arg::new("retry-delay")
                    .short('d')
                    .long("retry-delay")
                    .value_name("DURATION")
                    .help("Delay between two connection attempts. Default is 1 s"),
            )
            .arg(
                Arg::new("backoff")
                    .long("backoff")
                    .value_name("POLICY")
                    .help("Backoff policy: \"fixed\" (default) or \"linear\", where the delay
grows with the number of consecutive failures"),
            )
            .next_help_heading("Processing")
            .arg(
                Arg::new("dedup")
                    .long("dedup")
                    .action(ArgAction::SetTrue)
                    .help("Skip records whose (gps.read_timestamp, frame.frame_id) was already received"),
            )
            .next_help_heading("Output")
            .arg(
                Arg::new("json")
                    .long("json")
                    .action(ArgAction::SetTrue)
                    .help("Print the report in JSON format"),
            )
    }

    #[cfg(test)]
    fn from_args(args: &[&str]) -> Self {
        Self {
            matches: Self::command().get_matches_from(args),
        }
    }

    /// Selected [Source]
    pub fn source(&self) -> Source {
        if let Some(files) = self.matches.get_many::<String>("file") {
            Source::Files(files.cloned().collect())
        } else if let Some(url) = self.matches.get_one::<String>("url") {
            Source::Url(url.to_string())
        } else {
            Source::Url(DEFAULT_URL.to_string())
        }
    }

    pub fn dedup(&self) -> bool {
        self.matches.get_flag("dedup")
    }

    pub fn json(&self) -> bool {
        self.matches.get_flag("json")
    }

    fn duration(&self, key: &str) -> Option<std::time::Duration> {
        let value = self.matches.get_one::<String>(key)?;

        let dt = value
            .trim()
            .parse::<Duration>()
            .unwrap_or_else(|e| panic!("Invalid {} duration: {}", key, e));

        let nanos = dt.total_nanoseconds();
        if nanos < 0 {
            panic!("Invalid {} duration: must be positive", key);
        }

        Some(std::time::Duration::from_nanos(nanos as u64))
    }

    fn max_retries(&self) -> Option<u32> {
        let retries = self.matches.get_one::<String>("max-retries")?;
        let retries = retries
            .trim()
            .parse::<u32>()
            .unwrap_or_else(|e| panic!("Invalid max retries value: {}", e));
        Some(retries)
    }

    fn batch_size(&self) -> Option<u32> {
        let size = self.matches.get_one::<String>("batch-size")?;
        let size = size
            .trim()
            .parse::<u32>()
            .unwrap_or_else(|e| panic!("Invalid batch size: {}", e));

        if size == 0 {
            panic!("Invalid batch size: must not be null");
        }
        Some(size)
    }

    pub fn retry_settings(&self) -> RetrySettings {
        let defaults = RetrySettings::default();
        RetrySettings {
            max_retries: self.max_retries().unwrap_or(defaults.max_retries),
            retry_delay: self.duration("retry-delay").unwrap_or(defaults.retry_delay),
            backoff: if let Some(backoff) = self.matches.get_one::<String>("backoff") {
                Backoff::from_str(backoff).unwrap_or_else(|e| panic!("{}", e))
            } else {
                defaults.backoff
            },
        }
    }

    pub fn http_settings(&self) -> HttpSettings {
        let defaults = HttpSettings::default();
        HttpSettings {
            batch_size: self.batch_size().unwrap_or(defaults.batch_size),
            timeout: self.duration("timeout").unwrap_or(defaults.timeout),
        }
    }
}
