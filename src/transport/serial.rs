//! Polled serial transport.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, info, warn};

use super::{Transport, discovery, ensure_connected};
use crate::config::SerialSettings;
use crate::types::TransportMode;
use crate::{LinkError, Result};

const READ_CHUNK: usize = 256;

/// How commands are delimited on the serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SerialFraming {
    /// Append `\n` to every write and read replies line by line
    pub line_terminated: bool,
    /// Read one reply line after every write, as part of the same operation
    pub await_ack: bool,
}

impl SerialFraming {
    /// Raw bytes, no acknowledgement.
    pub const RAW: Self = Self { line_terminated: false, await_ack: false };

    /// Newline-terminated commands, each acknowledged with a line.
    pub const LINE_ACK: Self = Self { line_terminated: true, await_ack: true };
}

pub struct SerialTransport {
    settings: SerialSettings,
    framing: SerialFraming,
    label: String,
    port: Option<BufReader<SerialStream>>,
}

impl SerialTransport {
    pub fn new(settings: SerialSettings, framing: SerialFraming) -> Self {
        let label = settings.port.clone().unwrap_or_else(|| "serial".to_string());
        Self { settings, framing, label, port: None }
    }

    async fn resolve_port(&self) -> Result<String> {
        if let Some(port) = &self.settings.port {
            return Ok(port.clone());
        }
        let (port, _) = discovery::find_serial_port(
            self.settings.preferred_device()?,
            self.settings.discovery_attempts,
            self.settings.discovery_retry(),
        )
        .await?;
        Ok(port)
    }

    fn open(&self, path: &str) -> Result<SerialStream> {
        tokio_serial::new(path, self.settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::Even)
            .stop_bits(StopBits::One)
            .timeout(self.settings.timeout())
            .open_native_async()
            .map_err(|e| {
                let reason = format!("failed to open at {} baud: {}", self.settings.baud_rate, e.description);
                LinkError::connection_failed_with_source(path, reason, Box::new(e))
            })
    }

    async fn read_line(port: &mut BufReader<SerialStream>, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        match tokio::time::timeout(timeout, port.read_until(b'\n', &mut line)).await {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(LinkError::io("serial read", e)),
            Ok(Ok(_)) => {
                let trimmed = line.trim_ascii();
                Ok((!trimmed.is_empty()).then(|| trimmed.to_vec()))
            }
        }
    }

    async fn write_framed(
        port: &mut BufReader<SerialStream>,
        data: &[u8],
        framing: SerialFraming,
        timeout: Duration,
        label: &str,
    ) -> Result<()> {
        let stream = port.get_mut();
        stream.write_all(data).await.map_err(|e| LinkError::io(format!("writing to {label}"), e))?;
        if framing.line_terminated {
            stream.write_all(b"\n").await.map_err(|e| LinkError::io(format!("writing to {label}"), e))?;
        }
        stream.flush().await.map_err(|e| LinkError::io(format!("flushing {label}"), e))?;
        debug!(port = %label, len = data.len(), "Serial write");

        if framing.await_ack {
            match Self::read_line(port, timeout).await? {
                Some(ack) => debug!(port = %label, ack = %String::from_utf8_lossy(&ack), "Serial ack"),
                None => warn!(port = %label, ?timeout, "No acknowledgement before timeout"),
            }
        }
        Ok(())
    }

    /// An I/O error means the adapter is gone or wedged; release the port so
    /// the next `connect` reopens it.
    fn drop_port_on_failure<T>(&mut self, result: &Result<T>) {
        if let Err(e @ LinkError::Io { .. }) = result {
            warn!(port = %self.label, "Serial link lost: {}", e);
            self.port = None;
        }
    }

    async fn read_chunk(port: &mut BufReader<SerialStream>, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut buffer = vec![0u8; READ_CHUNK];
        match tokio::time::timeout(timeout, port.read(&mut buffer)).await {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(LinkError::io("serial read", e)),
            Ok(Ok(0)) => Ok(None),
            Ok(Ok(n)) => {
                buffer.truncate(n);
                Ok(Some(buffer))
            }
        }
    }
}

#[async_trait::async_trait]
impl Transport for SerialTransport {
    fn kind(&self) -> TransportMode {
        TransportMode::Serial
    }

    fn name(&self) -> &str {
        &self.label
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }

        let path = self.resolve_port().await?;
        info!(port = %path, baud = self.settings.baud_rate, "Opening serial port");
        let stream = self.open(&path)?;
        tokio::time::sleep(self.settings.open_settle()).await;

        self.label = path;
        self.port = Some(BufReader::new(stream));
        info!(port = %self.label, "Serial port ready");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.get_mut().shutdown().await {
                debug!(port = %self.label, "Error flushing serial port on close: {}", e);
            }
            info!(port = %self.label, "Serial port closed");
        }
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        ensure_connected(self)?;
        let timeout = self.settings.timeout();
        let framing = self.framing;
        let label = self.label.clone();
        let Some(port) = self.port.as_mut() else {
            return Err(LinkError::NotConnected { device: label });
        };

        let result = Self::write_framed(port, data, framing, timeout, &label).await;
        self.drop_port_on_failure(&result);
        result
    }

    async fn read(&mut self) -> Result<Option<Vec<u8>>> {
        ensure_connected(self)?;
        let timeout = self.settings.timeout();
        let line_terminated = self.framing.line_terminated;
        let Some(port) = self.port.as_mut() else {
            return Ok(None);
        };
        let result = if line_terminated {
            Self::read_line(port, timeout).await
        } else {
            Self::read_chunk(port, timeout).await
        };
        self.drop_port_on_failure(&result);
        result
    }
}
