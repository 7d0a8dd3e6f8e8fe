//! Resource managers: the seam between instruments and the physical bus.
//!
//! A [`ResourceManager`] opens a named address and hands back a
//! [`Resource`] that speaks plain text: `query` sends a command and returns
//! the reply, `write` sends a command and expects nothing back.
//!
//! # Module Structure
//!
//! - [`simulation`] - In-memory resources with scripted replies and a command log
//! - [`tcp`] - Raw socket resources (`TCPIP::host::port::SOCKET`)

pub mod simulation;
pub mod tcp;

pub use simulation::{BusEvent, SimulatedResourceManager, SimulationHandle};
pub use tcp::TcpResourceManager;

use thiserror::Error;

/// Error reported by a resource or resource manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// Address string not understood by this manager.
    #[error("invalid resource address: {0}")]
    InvalidAddress(String),

    /// Nothing answers at the address.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Underlying I/O failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// No reply arrived in time.
    #[error("timed out after {0} ms")]
    Timeout(u64),

    /// The resource was used after `close`.
    #[error("resource is closed")]
    Closed,
}

impl From<std::io::Error> for ResourceError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Self::Timeout(0),
            _ => Self::Io(e.to_string()),
        }
    }
}

/// An open text-command channel to one device.
pub trait Resource: Send {
    /// Send `command` and return the reply text.
    fn query(&mut self, command: &str) -> Result<String, ResourceError>;

    /// Send `command` without reading a reply.
    fn write(&mut self, command: &str) -> Result<(), ResourceError>;

    /// Release the channel.
    fn close(&mut self) -> Result<(), ResourceError>;
}

/// Opens resources by address.
pub trait ResourceManager: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Open the resource at `address`.
    fn open_resource(&self, address: &str) -> Result<Box<dyn Resource>, ResourceError>;
}
