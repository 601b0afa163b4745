use log::{error, info, warn};

use serde_json::Value;

use thiserror::Error;

use std::{str::FromStr, time::Duration};

use crate::{
    error::Error,
    fix::Record,
    transport::{Transport, TransportError},
};

/// Delay policy between two connection attempts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Constant delay
    #[default]
    Fixed,

    /// Delay grows with the attempt number
    Linear,
}

impl FromStr for Backoff {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "linear" => Ok(Self::Linear),
            other => Err(format!("unknown backoff policy \"{}\"", other)),
        }
    }
}

impl Backoff {
    /// Delay to wait before the next attempt, `attempt` being the number
    /// of consecutive failures so far (starting at 1).
    pub fn delay(&self, base: Duration, attempt: u32) -> Duration {
        match self {
            Self::Fixed => base,
            Self::Linear => base.saturating_mul(attempt.max(1)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Maximal number of consecutive connection failures
    pub max_retries: u32,

    /// Base delay between attempts
    pub retry_delay: Duration,

    /// [Backoff] policy
    pub backoff: Backoff,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            backoff: Backoff::Fixed,
        }
    }
}

/// Connection bookkeeping
#[derive(Debug, Default, Clone, Copy)]
pub struct ConnectionState {
    /// Consecutive failures
    pub attempts: u32,

    /// Successful connections
    pub connections: u32,

    /// Currently connected
    pub connected: bool,

    /// Clean end of stream reached
    pub finished: bool,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expecting a json object, got {0}")]
    NotAnObject(&'static str),
}

/// One element of the stream
#[derive(Debug)]
pub enum Item {
    /// Decoded [Record], yet to be validated
    Record(Record),

    /// Payload that could not be decoded
    Invalid(DecodeError),
}

/// Decodes one payload
fn decode(payload: &[u8]) -> Item {
    match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(record)) => Item::Record(record),
        Ok(Value::Array(_)) => Item::Invalid(DecodeError::NotAnObject("an array")),
        Ok(Value::String(_)) => Item::Invalid(DecodeError::NotAnObject("a string")),
        Ok(Value::Number(_)) => Item::Invalid(DecodeError::NotAnObject("a number")),
        Ok(Value::Bool(_)) => Item::Invalid(DecodeError::NotAnObject("a boolean")),
        Ok(Value::Null) => Item::Invalid(DecodeError::NotAnObject("null")),
        Err(e) => Item::Invalid(e.into()),
    }
}

/// [StreamReader] turns a [Transport] into a lazy sequence of [Item]s,
/// reconnecting transparently on connection failures.
///
/// Consecutive failures are bounded by [RetrySettings::max_retries]:
/// the counter is reset once a connection proves healthy
/// (it delivered a payload or a clean end of stream).
pub struct StreamReader<T: Transport> {
    transport: T,
    settings: RetrySettings,
    state: ConnectionState,
}

impl<T: Transport> StreamReader<T> {
    pub fn new(transport: T, settings: RetrySettings) -> Self {
        Self {
            transport,
            settings,
            state: Default::default(),
        }
    }

    /// Current [ConnectionState]
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Establishes the connection, retrying as configured
    pub async fn connect(&mut self) -> Result<(), Error> {
        loop {
            match self.transport.open().await {
                Ok(()) => {
                    self.state.connected = true;
                    self.state.connections += 1;

                    if self.state.connections > 1 {
                        info!("reconnected (connection #{})", self.state.connections);
                    } else {
                        info!("connected");
                    }

                    return Ok(());
                },
                Err(TransportError::Connection(reason)) => self.failure(reason).await?,
                Err(TransportError::Protocol(reason)) => {
                    error!("protocol error: {}", reason);
                    return Err(Error::Protocol(reason));
                },
            }
        }
    }

    /// Returns the next [Item], `None` on clean end of stream.
    pub async fn next(&mut self) -> Result<Option<Item>, Error> {
        if self.state.finished {
            return Ok(None);
        }

        loop {
            if !self.state.connected {
                self.connect().await?;
            }

            match self.transport.read().await {
                Ok(Some(payload)) => {
                    self.state.attempts = 0;
                    return Ok(Some(decode(&payload)));
                },
                Ok(None) => {
                    self.state.attempts = 0;
                    self.state.finished = true;
                    return Ok(None);
                },
                Err(TransportError::Connection(reason)) => self.failure(reason).await?,
                Err(TransportError::Protocol(reason)) => {
                    error!("protocol error: {}", reason);
                    return Err(Error::Protocol(reason));
                },
            }
        }
    }

    /// Releases the underlying connection
    pub fn close(&mut self) {
        self.transport.close();
        self.state.connected = false;
    }

    /// Handles one connection failure: either waits before the next
    /// attempt, or gives up.
    async fn failure(&mut self, reason: String) -> Result<(), Error> {
        self.close();
        self.state.attempts += 1;

        let attempts = self.state.attempts;

        if attempts >= self.settings.max_retries {
            error!(
                "connection failure ({}/{}): {} - giving up",
                attempts, self.settings.max_retries, reason
            );
            return Err(Error::ConnectionExhausted { attempts, reason });
        }

        let delay = self
            .settings
            .backoff
            .delay(self.settings.retry_delay, attempts);

        warn!(
            "connection failure ({}/{}): {} - retrying in {:?}",
            attempts, self.settings.max_retries, reason, delay
        );

        tokio::time::sleep(delay).await;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{Backoff, DecodeError, Item, RetrySettings, StreamReader, decode};
    use crate::{
        error::Error,
        transport::scripted::{ScriptedTransport, Step},
    };

    use std::{
        str::FromStr,
        time::{Duration, Instant},
    };

    fn settings(max_retries: u32) -> RetrySettings {
        RetrySettings {
            max_retries,
            retry_delay: Duration::ZERO,
            backoff: Backoff::Fixed,
        }
    }

    fn payload(value: &str) -> Step {
        Step::Payload(value.to_string())
    }

    #[test]
    fn backoff_policies() {
        let base = Duration::from_millis(100);

        assert_eq!(Backoff::Fixed.delay(base, 1), base);
        assert_eq!(Backoff::Fixed.delay(base, 4), base);

        assert_eq!(Backoff::Linear.delay(base, 1), base);
        assert_eq!(Backoff::Linear.delay(base, 3), Duration::from_millis(300));

        assert_eq!(Backoff::from_str("fixed"), Ok(Backoff::Fixed));
        assert_eq!(Backoff::from_str(" Linear "), Ok(Backoff::Linear));
        assert!(Backoff::from_str("exponential").is_err());
    }

    #[test]
    fn decoding() {
        assert!(matches!(decode(b"{\"lat\": 1}"), Item::Record(_)));
        assert!(matches!(
            decode(b"{\"lat\": 1"),
            Item::Invalid(DecodeError::Json(_))
        ));
        assert!(matches!(
            decode(b"[1, 2]"),
            Item::Invalid(DecodeError::NotAnObject(_))
        ));
        assert!(matches!(
            decode(b"null"),
            Item::Invalid(DecodeError::NotAnObject(_))
        ));
        assert!(matches!(
            decode(&[0x7b, 0xff, 0x7d]),
            Item::Invalid(DecodeError::Json(_))
        ));
    }

    #[tokio::test]
    async fn retries_below_limit() {
        let transport = ScriptedTransport::new(vec![
            Step::OpenFailure,
            Step::OpenFailure,
            payload("{}"),
        ]);

        let mut reader = StreamReader::new(transport, settings(3));

        reader.connect().await.unwrap();
        assert!(reader.state().connected);
        assert_eq!(reader.state().connections, 1);
        assert_eq!(reader.state().attempts, 2);

        assert!(matches!(reader.next().await, Ok(Some(Item::Record(_)))));
        assert_eq!(reader.state().attempts, 0);

        assert!(matches!(reader.next().await, Ok(None)));
        assert!(matches!(reader.next().await, Ok(None)));
    }

    #[tokio::test]
    async fn retries_exhausted() {
        let transport = ScriptedTransport::new(vec![
            Step::OpenFailure,
            Step::OpenFailure,
            Step::OpenFailure,
            payload("{}"),
        ]);

        let mut reader = StreamReader::new(transport, settings(3));

        match reader.connect().await {
            Err(Error::ConnectionExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!reader.state().connected);
        assert_eq!(reader.state().connections, 0);
    }

    #[tokio::test]
    async fn no_retry_allowed() {
        let transport = ScriptedTransport::new(vec![Step::OpenFailure]);
        let mut reader = StreamReader::new(transport, settings(0));

        assert!(matches!(
            reader.connect().await,
            Err(Error::ConnectionExhausted { attempts: 1, .. })
        ));
    }

    #[tokio::test]
    async fn reconnects_mid_stream() {
        let transport = ScriptedTransport::new(vec![
            payload("{\"n\": 1}"),
            Step::ReadFailure,
            Step::OpenFailure,
            payload("{\"n\": 2}"),
        ]);

        let mut reader = StreamReader::new(transport, settings(3));
        reader.connect().await.unwrap();

        for expected in [1, 2] {
            match reader.next().await {
                Ok(Some(Item::Record(record))) => assert_eq!(record["n"], expected),
                other => panic!("unexpected item: {:?}", other),
            }
        }

        assert!(matches!(reader.next().await, Ok(None)));
        assert_eq!(reader.state().connections, 2);
        assert_eq!(reader.transport().opened, 2);
        assert_eq!(reader.transport().closed, 2);
    }

    #[tokio::test]
    async fn healthy_connection_resets_attempts() {
        // two failures, one payload, two failures: never three in a row
        let transport = ScriptedTransport::new(vec![
            Step::ReadFailure,
            Step::OpenFailure,
            payload("{}"),
            Step::ReadFailure,
            Step::OpenFailure,
            payload("{}"),
        ]);

        let mut reader = StreamReader::new(transport, settings(3));
        reader.connect().await.unwrap();

        assert!(matches!(reader.next().await, Ok(Some(Item::Record(_)))));
        assert!(matches!(reader.next().await, Ok(Some(Item::Record(_)))));
        assert!(matches!(reader.next().await, Ok(None)));
    }

    #[tokio::test]
    async fn protocol_error_is_fatal() {
        let transport = ScriptedTransport::new(vec![payload("{}"), Step::ProtocolFailure]);

        let mut reader = StreamReader::new(transport, settings(3));
        reader.connect().await.unwrap();

        assert!(matches!(reader.next().await, Ok(Some(Item::Record(_)))));
        assert!(matches!(reader.next().await, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn waits_between_attempts() {
        let transport = ScriptedTransport::new(vec![Step::OpenFailure, Step::OpenFailure]);

        let mut reader = StreamReader::new(
            transport,
            RetrySettings {
                max_retries: 3,
                retry_delay: Duration::from_millis(20),
                backoff: Backoff::Linear,
            },
        );

        let t0 = Instant::now();
        reader.connect().await.unwrap();

        // 20ms then 40ms
        assert!(t0.elapsed() >= Duration::from_millis(60));
    }
}
