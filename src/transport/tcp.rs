use log::debug;

use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::TcpStream,
};

use super::{Transport, TransportError, trim_line};

/// Newline delimited JSON over a TCP socket
pub struct TcpTransport {
    /// Remote address, as "host:port"
    address: String,

    /// Active connection
    stream: Option<BufReader<TcpStream>>,
}

impl TcpTransport {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            stream: None,
        }
    }
}

impl Transport for TcpTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| TransportError::Connection(format!("{}: {}", self.address, e)))?;

        debug!("connected to tcp://{}", self.address);
        self.stream = Some(BufReader::new(stream));
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TransportError::Connection("not connected".to_string()))?;

        loop {
            let mut line = Vec::with_capacity(128);

            let size = stream
                .read_until(b'\n', &mut line)
                .await
                .map_err(|e| TransportError::Connection(e.to_string()))?;

            if size == 0 {
                // remote closed the stream
                return Ok(None);
            }

            if let Some(payload) = trim_line(line) {
                return Ok(Some(payload));
            }
        }
    }

    fn close(&mut self) {
        self.stream = None;
    }
}
