//! Lifecycle trait shared by every instrument kind.
//!
//! The registry stores instruments as `Box<dyn Device>`; callers downcast to
//! the concrete type through [`Device::as_any`] when they need kind-specific
//! operations such as programming a sequencer.

use crate::registry::InstrumentId;
use lab_common::definition::{InstrumentDefinition, ParameterValues};
use lab_common::error::InstrumentError;
use std::any::Any;

/// An instrument that can be connected, disconnected and reset.
pub trait Device: Send {
    /// Registry identity.
    fn id(&self) -> InstrumentId;

    /// Instance name from configuration.
    fn name(&self) -> &str;

    /// Resolved definition this instance was validated against.
    fn definition(&self) -> &InstrumentDefinition;

    /// Current parameter values.
    fn values(&self) -> &ParameterValues;

    /// Whether the device is connected.
    fn is_connected(&self) -> bool;

    /// Open the connection.
    fn connect(&mut self) -> Result<(), InstrumentError>;

    /// Close the connection.
    fn disconnect(&mut self) -> Result<(), InstrumentError>;

    /// Return the device to its power-on state.
    fn reset(&mut self) -> Result<(), InstrumentError>;

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
