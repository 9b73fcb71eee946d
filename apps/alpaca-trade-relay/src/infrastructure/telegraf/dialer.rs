//! TCP Dialer
//!
//! Opens connections to Telegraf's `socket_listener` input
//! (`tcp://:8094`, `data_format = "influx"`).

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::application::ports::SinkDialer;

/// Default connect timeout per dial attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Dials the sink over TCP.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl TcpDialer {
    /// Create a dialer for `host:port`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override the per-attempt connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl SinkDialer for TcpDialer {
    type Connection = TcpStream;

    async fn dial(&self) -> io::Result<TcpStream> {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        let stream = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "sink connect timed out"))??;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
