use flate2::read::GzDecoder;

use log::{debug, info};

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use super::{Transport, TransportError, trim_line};

/// Read-only file handle
pub enum FileDescriptor {
    Plain(BufReader<File>),
    Gzip(BufReader<GzDecoder<File>>),
}

impl std::io::Read for FileDescriptor {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Plain(r) => std::io::Read::read(r, buf),
            Self::Gzip(r) => std::io::Read::read(r, buf),
        }
    }
}

impl std::io::BufRead for FileDescriptor {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        match self {
            Self::Plain(r) => r.fill_buf(),
            Self::Gzip(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            Self::Plain(r) => r.consume(amt),
            Self::Gzip(r) => r.consume(amt),
        }
    }
}

impl FileDescriptor {
    /// Opens a file, gzip files must be terminated with '.gz'
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let fd = File::open(path)?;

        if path.extension().is_some_and(|ext| ext == "gz") {
            Ok(Self::Gzip(BufReader::new(GzDecoder::new(fd))))
        } else {
            Ok(Self::Plain(BufReader::new(fd)))
        }
    }
}

/// Newline delimited JSON files, consumed one after the other
pub struct FileTransport {
    paths: Vec<PathBuf>,

    /// Index of the file being consumed
    index: usize,

    /// Lines consumed from the current file, across reopenings
    position: usize,

    /// Lines read through the current handle
    lines: usize,

    /// Current file handle
    fd: Option<FileDescriptor>,
}

/// Reads one line, on the blocking pool. The handle is handed back
/// along with the outcome.
async fn read_line(
    mut fd: FileDescriptor,
) -> Result<(FileDescriptor, std::io::Result<Vec<u8>>), TransportError> {
    tokio::task::spawn_blocking(move || {
        let mut line = Vec::with_capacity(128);
        let outcome = fd.read_until(b'\n', &mut line).map(|_| line);
        (fd, outcome)
    })
    .await
    .map_err(|e| TransportError::Connection(format!("file reader: {}", e)))
}

impl FileTransport {
    pub fn new<P: Into<PathBuf>>(paths: Vec<P>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            index: 0,
            position: 0,
            lines: 0,
            fd: None,
        }
    }

    fn open_current(&mut self) -> Result<(), TransportError> {
        let Some(path) = self.paths.get(self.index) else {
            return Ok(());
        };

        let fd = FileDescriptor::open(path).map_err(|e| {
            TransportError::Connection(format!("failed to open {}: {}", path.display(), e))
        })?;

        if self.position > 0 {
            info!("resuming {} after line {}", path.display(), self.position);
        } else {
            info!("consuming {}", path.display());
        }

        self.lines = 0;
        self.fd = Some(fd);
        Ok(())
    }
}

impl Transport for FileTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        if self.fd.is_none() {
            self.open_current()?;
        }
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            let Some(fd) = self.fd.take() else {
                if self.index >= self.paths.len() {
                    return Ok(None);
                }
                return Err(TransportError::Connection("no file opened".to_string()));
            };

            let (fd, outcome) = read_line(fd).await?;

            // a failing handle is dropped, reopening resumes at self.position
            let line = outcome.map_err(|e| {
                TransportError::Connection(format!(
                    "{} (line {}): {}",
                    self.paths[self.index].display(),
                    self.position + 1,
                    e
                ))
            })?;

            if line.is_empty() {
                debug!("consumed {}", self.paths[self.index].display());
                self.index += 1;
                self.position = 0;

                if self.index >= self.paths.len() {
                    return Ok(None);
                }

                self.open_current()?;
                continue;
            }

            self.fd = Some(fd);
            self.lines += 1;

            // already consumed before a reopening
            if self.lines <= self.position {
                continue;
            }

            self.position = self.lines;

            if let Some(payload) = trim_line(line) {
                return Ok(Some(payload));
            }
        }
    }

    fn close(&mut self) {
        self.fd = None;
    }
}
