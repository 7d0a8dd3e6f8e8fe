//! Raw socket resources.
//!
//! Accepts the usual socket resource string, `TCPIP[board]::host::port::SOCKET`.
//! Commands are sent LF-terminated and replies are read up to the next LF;
//! trailing CR/LF is stripped from replies.

use super::{Resource, ResourceError, ResourceManager};
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace};

/// Default connect and read timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Opens `TCPIP::host::port::SOCKET` resources.
#[derive(Debug, Clone)]
pub struct TcpResourceManager {
    timeout: Duration,
}

impl TcpResourceManager {
    /// Manager with the default timeout.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Manager with a custom connect/read timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a socket resource string into `(host, port)`.
pub fn parse_socket_address(address: &str) -> Result<(String, u16), ResourceError> {
    let invalid = || ResourceError::InvalidAddress(address.to_string());
    let parts: Vec<&str> = address.split("::").collect();
    let [interface, host, port, kind] = parts.as_slice() else {
        return Err(invalid());
    };
    let board = interface
        .get(..5)
        .filter(|p| p.eq_ignore_ascii_case("TCPIP"))
        .map(|_| &interface[5..])
        .ok_or_else(invalid)?;
    if !board.chars().all(|c| c.is_ascii_digit())
        || !kind.eq_ignore_ascii_case("SOCKET")
        || host.is_empty()
    {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    Ok((host.to_string(), port))
}

impl ResourceManager for TcpResourceManager {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn open_resource(&self, address: &str) -> Result<Box<dyn Resource>, ResourceError> {
        let (host, port) = parse_socket_address(address)?;
        let target = (host.as_str(), port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ResourceError::NotFound(address.to_string()))?;
        let stream = TcpStream::connect_timeout(&target, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.set_nodelay(true)?;
        debug!(address, peer = %target, "Opened socket resource");
        Ok(Box::new(TcpResource {
            address: address.to_string(),
            stream: Some(BufReader::new(stream)),
            timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
        }))
    }
}

struct TcpResource {
    address: String,
    stream: Option<BufReader<TcpStream>>,
    timeout_ms: u64,
}

impl TcpResource {
    fn stream(&mut self) -> Result<&mut BufReader<TcpStream>, ResourceError> {
        self.stream.as_mut().ok_or(ResourceError::Closed)
    }

    fn send(&mut self, command: &str) -> Result<(), ResourceError> {
        let writer = self.stream()?.get_mut();
        writer.write_all(command.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

impl Resource for TcpResource {
    fn query(&mut self, command: &str) -> Result<String, ResourceError> {
        self.send(command)?;
        let timeout_ms = self.timeout_ms;
        let mut line = String::new();
        let read = self.stream()?.read_line(&mut line).map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                ResourceError::Timeout(timeout_ms)
            }
            _ => ResourceError::Io(e.to_string()),
        })?;
        if read == 0 {
            return Err(ResourceError::Io("connection closed by peer".to_string()));
        }
        let reply = line.trim_end_matches(['\r', '\n']).to_string();
        trace!(address = %self.address, command, reply = %reply, "Socket query");
        Ok(reply)
    }

    fn write(&mut self, command: &str) -> Result<(), ResourceError> {
        self.send(command)?;
        trace!(address = %self.address, command, "Socket write");
        Ok(())
    }

    fn close(&mut self) -> Result<(), ResourceError> {
        let stream = self.stream.take().ok_or(ResourceError::Closed)?;
        match stream.get_ref().shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
