//! Connection state machine over a bus resource.
//!
//! ```text
//! Disconnected ──connect──► Connected ──disconnect──► Disconnected
//! ```
//!
//! `read` and `write` are only legal while connected. Resource faults are
//! mapped into [`InstrumentError`] variants that keep reads and writes apart.

use crate::resource::{Resource, ResourceManager};
use lab_common::error::InstrumentError;
use tracing::{debug, info, trace, warn};

enum State {
    Disconnected,
    Connected {
        address: String,
        resource: Box<dyn Resource>,
    },
}

/// Exclusive text-command channel for one instrument.
pub struct Transport {
    label: String,
    state: State,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("label", &self.label)
            .field("address", &self.address())
            .finish()
    }
}

impl Transport {
    /// Disconnected transport; `label` names the owner in errors.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: State::Disconnected,
        }
    }

    /// Owner label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// True while a resource is open.
    pub fn is_connected(&self) -> bool {
        matches!(self.state, State::Connected { .. })
    }

    /// Address of the open resource.
    pub fn address(&self) -> Option<&str> {
        match &self.state {
            State::Connected { address, .. } => Some(address),
            State::Disconnected => None,
        }
    }

    /// Open `address` through `manager`.
    ///
    /// # Errors
    ///
    /// - `AlreadyConnected` if a resource is already open
    /// - `Open` carrying the manager's message
    pub fn connect(
        &mut self,
        manager: &dyn ResourceManager,
        address: &str,
    ) -> Result<(), InstrumentError> {
        if self.is_connected() {
            return Err(InstrumentError::AlreadyConnected {
                instrument: self.label.clone(),
            });
        }
        let resource = manager
            .open_resource(address)
            .map_err(|e| InstrumentError::Open {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
        info!(instrument = %self.label, address, manager = manager.name(), "Connected");
        self.state = State::Connected {
            address: address.to_string(),
            resource,
        };
        Ok(())
    }

    /// Close the resource.
    ///
    /// The transport is disconnected afterwards even if `close` fails.
    pub fn disconnect(&mut self) -> Result<(), InstrumentError> {
        match std::mem::replace(&mut self.state, State::Disconnected) {
            State::Disconnected => Err(self.not_connected()),
            State::Connected {
                address,
                mut resource,
            } => {
                let closed = resource.close();
                info!(instrument = %self.label, address = %address, "Disconnected");
                closed.map_err(|e| {
                    warn!(instrument = %self.label, error = %e, "Resource close failed");
                    InstrumentError::CloseFault {
                        address,
                        reason: e.to_string(),
                    }
                })
            }
        }
    }

    /// Send a query and return the raw reply.
    pub fn read(&mut self, command: &str) -> Result<String, InstrumentError> {
        let resource = self.resource()?;
        let reply = resource
            .query(command)
            .map_err(|e| InstrumentError::ReadFault {
                command: command.to_string(),
                reason: e.to_string(),
            })?;
        trace!(command, reply = %reply, "read");
        Ok(reply)
    }

    /// Send a command without reading a reply.
    pub fn write(&mut self, command: &str) -> Result<(), InstrumentError> {
        let resource = self.resource()?;
        resource
            .write(command)
            .map_err(|e| InstrumentError::WriteFault {
                command: command.to_string(),
                reason: e.to_string(),
            })?;
        trace!(command, "write");
        Ok(())
    }

    fn resource(&mut self) -> Result<&mut Box<dyn Resource>, InstrumentError> {
        match &mut self.state {
            State::Connected { resource, .. } => Ok(resource),
            State::Disconnected => {
                debug!(instrument = %self.label, "I/O on disconnected transport");
                Err(InstrumentError::NotConnected {
                    instrument: self.label.clone(),
                })
            }
        }
    }

    fn not_connected(&self) -> InstrumentError {
        InstrumentError::NotConnected {
            instrument: self.label.clone(),
        }
    }
}
