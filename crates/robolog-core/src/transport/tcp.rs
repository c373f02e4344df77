//! JSON-lines client over TCP
//!
//! The logger writes one JSON object per line. The first line is
//! `{"metadata": {...}}`, every following line is `{"vectors": {...}}`.

use std::io::{self, BufRead, BufReader, ErrorKind};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{Frame, Metadata, TransportError, VectorsClient};
use crate::config::TcpClientConfig;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Message {
    Metadata(Metadata),
    Vectors(Frame),
}

/// Realtime client reading JSON lines from a TCP logger
pub struct TcpVectorsClient {
    config: TcpClientConfig,
    reader: Option<BufReader<TcpStream>>,
    metadata: Option<Metadata>,
    /// Bytes of a line that was cut by a read timeout
    pending: String,
}

impl TcpVectorsClient {
    /// Disconnected client; see [`VectorsClient::connect`]
    pub fn new(config: TcpClientConfig) -> Self {
        Self {
            config,
            reader: None,
            metadata: None,
            pending: String::new(),
        }
    }

    /// True until the peer closes the connection
    pub fn is_connected(&self) -> bool {
        self.reader.is_some()
    }

    /// Read one complete line. `Ok(None)` on timeout; partial data is kept
    /// for the next call.
    fn read_line(&mut self) -> Result<Option<String>, TransportError> {
        let reader = self.reader.as_mut().ok_or(TransportError::NotConnected)?;
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) if buf.is_empty() => Err(TransportError::Closed),
            Ok(_) => {
                self.pending.push_str(&String::from_utf8_lossy(&buf));
                if !self.pending.ends_with('\n') {
                    // EOF in the middle of a line
                    return Err(TransportError::Closed);
                }
                Ok(Some(std::mem::take(&mut self.pending)))
            }
            Err(e) if is_timeout(&e) => {
                self.pending.push_str(&String::from_utf8_lossy(&buf));
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn read_message(&mut self) -> Result<Option<Message>, TransportError> {
        loop {
            let Some(line) = self.read_line()? else {
                return Ok(None);
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return serde_json::from_str(line)
                .map(Some)
                .map_err(|e| TransportError::InvalidMessage(e.to_string()));
        }
    }
}

impl Default for TcpVectorsClient {
    fn default() -> Self {
        Self::new(TcpClientConfig::default())
    }
}

impl VectorsClient for TcpVectorsClient {
    fn connect(&mut self, source: &str) -> Result<(), TransportError> {
        let address = source
            .to_socket_addrs()
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", source, e)))?
            .next()
            .ok_or_else(|| TransportError::ConnectionFailed(format!("{}: no address", source)))?;

        let stream = TcpStream::connect_timeout(
            &address,
            Duration::from_millis(self.config.connect_timeout_ms),
        )
        .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", source, e)))?;
        stream.set_read_timeout(Some(Duration::from_millis(self.config.read_timeout_ms.max(1))))?;
        stream.set_nodelay(true)?;

        info!("Connected to realtime logger at {}", address);
        self.reader = Some(BufReader::new(stream));
        self.metadata = None;
        self.pending.clear();
        Ok(())
    }

    fn metadata(&mut self) -> Option<Metadata> {
        if self.metadata.is_some() {
            return self.metadata.clone();
        }
        // The logger sends metadata first; allow it a few read timeouts
        for _ in 0..10 {
            match self.read_message() {
                Ok(Some(Message::Metadata(metadata))) => {
                    self.metadata = Some(metadata);
                    return self.metadata.clone();
                }
                Ok(Some(Message::Vectors(_))) => debug!("Dropping frame received before metadata"),
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to read metadata: {}", e);
                    return None;
                }
            }
        }
        None
    }

    fn read_frame(&mut self) -> Option<Frame> {
        // The closure was logged once; stay quiet afterwards
        if self.reader.is_none() {
            return None;
        }
        match self.read_message() {
            Ok(Some(Message::Vectors(frame))) => Some(frame),
            Ok(Some(Message::Metadata(metadata))) => {
                debug!("Metadata updated mid-stream");
                self.metadata = Some(metadata);
                None
            }
            Ok(None) => None,
            Err(TransportError::Closed) => {
                warn!("Realtime logger closed the connection");
                self.reader = None;
                None
            }
            Err(e) => {
                warn!("Failed to read frame: {}", e);
                None
            }
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};
    use std::thread;

    /// Log sink shared with the test body
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for LogBuffer {
        fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(bytes);
            Ok(bytes.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_metadata_then_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            writeln!(socket, r#"{{"metadata": {{"robot_realtime::joints_state::positions": ["j0", "j1"]}}}}"#).unwrap();
            writeln!(socket).unwrap();
            writeln!(socket, r#"{{"vectors": {{"robot_realtime::timestamps": [1.5], "robot_realtime::joints_state::positions": [0.1, 0.2]}}}}"#).unwrap();
            socket.flush().unwrap();
        });

        let mut client = TcpVectorsClient::new(TcpClientConfig {
            connect_timeout_ms: 1000,
            read_timeout_ms: 200,
        });
        client.connect(&address).unwrap();

        let metadata = client.metadata().unwrap();
        assert_eq!(
            metadata["robot_realtime::joints_state::positions"],
            vec!["j0".to_string(), "j1".to_string()]
        );

        let frame = client.read_frame().unwrap();
        assert_eq!(frame["robot_realtime::timestamps"], vec![1.5]);

        server.join().unwrap();
        // Peer closed: no frame, client disconnects
        assert!(client.read_frame().is_none());
        assert!(!client.is_connected());
    }

    #[test]
    fn test_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut client = TcpVectorsClient::default();
        assert!(matches!(
            client.connect(&address),
            Err(TransportError::ConnectionFailed(_))
        ));
        assert!(client.read_frame().is_none());
    }

    #[test]
    fn test_disconnected_client_reads_quietly() {
        let logs = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&logs);
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || LogBuffer(Arc::clone(&sink)))
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();

        let mut client = TcpVectorsClient::default();
        tracing::subscriber::with_default(subscriber, || {
            for _ in 0..5 {
                assert!(client.read_frame().is_none());
            }
        });
        let output = String::from_utf8(logs.lock().unwrap().clone()).unwrap();
        assert!(!output.contains("WARN"), "unexpected log output: {}", output);
    }
}
