use log::{debug, trace};

use reqwest::{Client, StatusCode};

use std::time::Duration;

use super::{Transport, TransportError};

/// HTTP polling settings
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Number of samples per batch
    pub batch_size: u32,

    /// Request timeout
    pub timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            batch_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Polls one sample after the other with
/// `GET url?batch_index=B&sample_index=S`, batches starting at 1.
/// The server answers 404 once it has nothing left to serve.
pub struct HttpTransport {
    url: String,
    settings: HttpSettings,
    client: Option<Client>,
    batch_index: u32,
    sample_index: u32,
    exhausted: bool,
}

impl HttpTransport {
    pub fn new(url: &str, settings: HttpSettings) -> Self {
        Self {
            url: url.to_string(),
            settings,
            client: None,
            batch_index: 1,
            sample_index: 0,
            exhausted: false,
        }
    }

    /// Moves on to the next sample
    fn advance(&mut self) {
        self.sample_index += 1;
        if self.sample_index >= self.settings.batch_size.max(1) {
            self.sample_index = 0;
            self.batch_index += 1;
        }
    }
}

impl Transport for HttpTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        if self.client.is_none() {
            let client = Client::builder()
                .timeout(self.settings.timeout)
                .build()
                .map_err(|e| TransportError::Connection(e.to_string()))?;

            self.client = Some(client);
        }
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if self.exhausted {
            return Ok(None);
        }

        let client = self
            .client
            .as_ref()
            .ok_or_else(|| TransportError::Connection("not connected".to_string()))?;

        trace!(
            "GET {} - batch #{} sample #{}",
            self.url, self.batch_index, self.sample_index
        );

        let response = client
            .get(&self.url)
            .query(&[
                ("batch_index", self.batch_index),
                ("sample_index", self.sample_index),
            ])
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!(
                "{} - end of stream at batch #{} sample #{}",
                self.url, self.batch_index, self.sample_index
            );
            self.exhausted = true;
            return Ok(None);
        }

        if status.is_server_error() {
            return Err(TransportError::Connection(format!(
                "server error: {}",
                status
            )));
        }

        if !status.is_success() {
            return Err(TransportError::Protocol(format!(
                "unexpected status: {}",
                status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        self.advance();
        Ok(Some(body.to_vec()))
    }

    fn close(&mut self) {
        self.client = None;
    }
}
