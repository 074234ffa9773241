//! Minimal Tor control-port client
//!
//! Speaks the small subset the engine needs: authenticate with the shared
//! secret, send the new-identity signal, read the two-digit status code.
//! One connection per rotation; nothing is kept open between rotations.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::proxy::TorError;

/// A one-shot control-port session
pub struct ControlConnection {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl ControlConnection {
    /// Connect to the control port
    pub async fn connect(addr: &str) -> Result<Self, TorError> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    /// Send one command line and return the reply's status code
    async fn command(&mut self, line: &str) -> Result<u16, TorError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;

        let mut reply = String::new();
        self.reader.read_line(&mut reply).await?;

        let code = reply
            .get(..3)
            .and_then(|s| s.parse::<u16>().ok())
            .ok_or_else(|| {
                TorError::RotationFailed(format!("malformed control reply: {:?}", reply.trim()))
            })?;

        debug!("control reply: {}", reply.trim());
        Ok(code)
    }

    /// Authenticate with the shared secret
    pub async fn authenticate(&mut self, password: &str) -> Result<(), TorError> {
        let line = if password.is_empty() {
            "AUTHENTICATE".to_string()
        } else {
            format!("AUTHENTICATE \"{}\"", password)
        };

        match self.command(&line).await? {
            250 => Ok(()),
            code => Err(TorError::RotationFailed(format!(
                "authentication rejected with status {}",
                code
            ))),
        }
    }

    /// Request a fresh circuit
    pub async fn signal_newnym(&mut self) -> Result<(), TorError> {
        match self.command("SIGNAL NEWNYM").await? {
            250 => Ok(()),
            code => Err(TorError::RotationFailed(format!(
                "NEWNYM rejected with status {}",
                code
            ))),
        }
    }

    /// Close the session politely; errors here are ignored
    pub async fn quit(mut self) {
        let _ = self.command("QUIT").await;
    }
}
