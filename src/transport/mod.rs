use thiserror::Error;

mod file;
mod http;
mod tcp;

pub use file::FileTransport;
pub use http::{HttpSettings, HttpTransport};
pub use tcp::TcpTransport;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// Source unavailable or connection lost. Retried.
    #[error("connection error: {0}")]
    Connection(String),

    /// Source sent something we cannot interpret. Fatal.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Raw access to a stream of JSON payloads.
/// A [Transport] knows nothing about fixes, retries or decoding.
pub trait Transport {
    /// Opens (or re-opens) the connection
    async fn open(&mut self) -> Result<(), TransportError>;

    /// Returns the next payload, or `None` on clean end of stream
    async fn read(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Releases the underlying connection
    fn close(&mut self);
}

/// [Interface] to the GPS stream
pub enum Interface {
    /// [Interface::Tcp] streams JSON lines over a TCP socket
    Tcp(TcpTransport),

    /// [Interface::Http] polls an HTTP server, sample after sample
    Http(HttpTransport),

    /// [Interface::Files] is dedicated to passive (read only) inputs
    Files(FileTransport),
}

impl Interface {
    /// Creates a new [Interface] from a source URL
    pub fn from_url(url: &str, http: HttpSettings) -> Result<Self, TransportError> {
        if let Some(address) = url.strip_prefix("tcp://") {
            Ok(Self::Tcp(TcpTransport::new(address)))
        } else if url.starts_with("http://") || url.starts_with("https://") {
            Ok(Self::Http(HttpTransport::new(url, http)))
        } else {
            Err(TransportError::Protocol(format!(
                "unsupported source \"{}\": expecting tcp://, http:// or https://",
                url
            )))
        }
    }

    /// Creates a new read-only [Interface], consuming files one after the other
    pub fn from_files<P: Into<std::path::PathBuf>>(paths: Vec<P>) -> Self {
        Self::Files(FileTransport::new(paths))
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Files(_))
    }
}

impl Transport for Interface {
    async fn open(&mut self) -> Result<(), TransportError> {
        match self {
            Self::Tcp(tcp) => tcp.open().await,
            Self::Http(http) => http.open().await,
            Self::Files(files) => files.open().await,
        }
    }

    async fn read(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match self {
            Self::Tcp(tcp) => tcp.read().await,
            Self::Http(http) => http.read().await,
            Self::Files(files) => files.read().await,
        }
    }

    fn close(&mut self) {
        match self {
            Self::Tcp(tcp) => tcp.close(),
            Self::Http(http) => http.close(),
            Self::Files(files) => files.close(),
        }
    }
}

/// Strips the line terminator, returns `None` for blank lines
pub(crate) fn trim_line(mut line: Vec<u8>) -> Option<Vec<u8>> {
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
    if line.iter().all(|b| b.is_ascii_whitespace()) {
        None
    } else {
        Some(line)
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    use super::{Transport, TransportError};
    use std::collections::VecDeque;

    /// What the [ScriptedTransport] does next
    #[derive(Debug, Clone)]
    pub enum Step {
        /// Next open() fails
        OpenFailure,
        /// Next read() fails with a connection error
        ReadFailure,
        /// Next read() fails with a protocol error
        ProtocolFailure,
        /// Next read() returns this payload
        Payload(String),
        /// Next read() never completes
        Pending,
    }

    /// In-memory [Transport] replaying a script.
    /// An exhausted script is a clean end of stream.
    #[derive(Debug, Default)]
    pub struct ScriptedTransport {
        steps: VecDeque<Step>,
        pub opened: u32,
        pub closed: u32,
    }

    impl ScriptedTransport {
        pub fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: steps.into(),
                ..Default::default()
            }
        }

        pub fn payloads(payloads: &[&str]) -> Self {
            Self::new(
                payloads
                    .iter()
                    .map(|payload| Step::Payload(payload.to_string()))
                    .collect(),
            )
        }
    }

    impl Transport for ScriptedTransport {
        async fn open(&mut self) -> Result<(), TransportError> {
            if matches!(self.steps.front(), Some(Step::OpenFailure)) {
                self.steps.pop_front();
                return Err(TransportError::Connection("connection refused".to_string()));
            }
            self.opened += 1;
            Ok(())
        }

        async fn read(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
            match self.steps.pop_front() {
                None => Ok(None),
                Some(Step::Payload(payload)) => Ok(Some(payload.into_bytes())),
                Some(Step::ReadFailure) | Some(Step::OpenFailure) => {
                    Err(TransportError::Connection("connection reset".to_string()))
                },
                Some(Step::ProtocolFailure) => {
                    Err(TransportError::Protocol("unexpected termination".to_string()))
                },
                Some(Step::Pending) => std::future::pending().await,
            }
        }

        fn close(&mut self) {
            self.closed += 1;
        }
    }
}
