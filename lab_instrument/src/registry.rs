//! Instrument registry.
//!
//! Owns every live instrument. An instrument's identity is its slot index in
//! the registry arena; slots of released instruments are never reused, so an
//! [`InstrumentId`] stays unambiguous for the life of the registry.

use crate::device::Device;
use lab_common::error::InstrumentError;
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

/// Identity of an instrument within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrumentId(usize);

impl InstrumentId {
    /// Wrap a raw slot index.
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Raw slot index.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Arena of instruments, addressed by [`InstrumentId`] or by name.
///
/// Constructed at startup and passed by value; no global state.
#[derive(Default)]
pub struct InstrumentRegistry {
    slots: Vec<Option<Box<dyn Device>>>,
    names: HashMap<String, InstrumentId>,
}

impl InstrumentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an instrument with its future identity and store it.
    ///
    /// # Errors
    /// Whatever `build` returns, or `InstrumentError::State` if the name is
    /// already taken.
    pub fn insert_with<T, F>(&mut self, build: F) -> Result<InstrumentId, InstrumentError>
    where
        T: Device + 'static,
        F: FnOnce(InstrumentId) -> Result<T, InstrumentError>,
    {
        let id = InstrumentId(self.slots.len());
        let device = build(id)?;
        if self.names.contains_key(device.name()) {
            return Err(InstrumentError::State(format!(
                "instrument \"{}\" is already registered",
                device.name()
            )));
        }
        info!(instrument = %device.name(), %id, capability = %device.definition().name(), "Registered");
        self.names.insert(device.name().to_string(), id);
        self.slots.push(Some(Box::new(device)));
        Ok(id)
    }

    /// Look up by identity.
    pub fn get(&self, id: InstrumentId) -> Option<&dyn Device> {
        self.slots.get(id.0).and_then(|s| s.as_deref())
    }

    /// Look up by identity, mutably.
    pub fn get_mut(&mut self, id: InstrumentId) -> Option<&mut (dyn Device + 'static)> {
        self.slots.get_mut(id.0).and_then(|s| s.as_deref_mut())
    }

    /// Identity of the instrument called `name`.
    pub fn find(&self, name: &str) -> Option<InstrumentId> {
        self.names.get(name).copied()
    }

    /// Look up and downcast.
    pub fn get_as<T: Device + 'static>(&self, id: InstrumentId) -> Option<&T> {
        self.get(id).and_then(|d| d.as_any().downcast_ref::<T>())
    }

    /// Look up and downcast, mutably.
    pub fn get_as_mut<T: Device + 'static>(&mut self, id: InstrumentId) -> Option<&mut T> {
        self.get_mut(id).and_then(|d| d.as_any_mut().downcast_mut::<T>())
    }

    /// Drop a disconnected instrument.
    ///
    /// # Errors
    /// `InstrumentError::State` if `id` is unknown or still connected.
    pub fn release(&mut self, id: InstrumentId) -> Result<(), InstrumentError> {
        let slot = self
            .slots
            .get_mut(id.0)
            .filter(|s| s.is_some())
            .ok_or_else(|| InstrumentError::State(format!("no instrument {id}")))?;
        if let Some(device) = slot.as_deref() {
            if device.is_connected() {
                return Err(InstrumentError::State(format!(
                    "{} must be disconnected before release",
                    device.name()
                )));
            }
        }
        if let Some(device) = slot.take() {
            self.names.remove(device.name());
            info!(instrument = %device.name(), %id, "Released");
        }
        Ok(())
    }

    /// Connect every disconnected instrument, stopping at the first failure.
    pub fn connect_all(&mut self) -> Result<(), InstrumentError> {
        for device in self.slots.iter_mut().flatten() {
            if !device.is_connected() {
                device.connect()?;
            }
        }
        Ok(())
    }

    /// Disconnect every connected instrument.
    ///
    /// All instruments are attempted; the first failure is returned.
    pub fn disconnect_all(&mut self) -> Result<(), InstrumentError> {
        let mut first = None;
        for device in self.slots.iter_mut().flatten() {
            if device.is_connected() {
                if let Err(e) = device.disconnect() {
                    warn!(instrument = %device.name(), error = %e, "Disconnect failed");
                    if first.is_none() {
                        first = Some(e);
                    }
                }
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Identities of live instruments in insertion order.
    pub fn ids(&self) -> Vec<InstrumentId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| InstrumentId(i))
            .collect()
    }

    /// Number of live instruments.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// True if no instrument is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for InstrumentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names.iter().collect();
        names.sort_by_key(|(_, id)| **id);
        f.debug_struct("InstrumentRegistry")
            .field("instruments", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lab_common::definition::{CapabilityRecord, InstrumentDefinition, ParameterValues};
    use std::any::Any;
    use std::collections::BTreeMap;

    struct Probe {
        id: InstrumentId,
        name: String,
        definition: InstrumentDefinition,
        values: ParameterValues,
        connected: bool,
        refuse_disconnect: bool,
    }

    fn probe(id: InstrumentId, name: &str) -> Result<Probe, InstrumentError> {
        let definition = InstrumentDefinition::resolve(&[CapabilityRecord::new("probe")])
            .map_err(|e| InstrumentError::State(e.to_string()))?;
        let values = definition.instantiate(BTreeMap::new())?;
        Ok(Probe {
            id,
            name: name.to_string(),
            definition,
            values,
            connected: false,
            refuse_disconnect: false,
        })
    }

    impl Device for Probe {
        fn id(&self) -> InstrumentId {
            self.id
        }
        fn name(&self) -> &str {
            &self.name
        }
        fn definition(&self) -> &InstrumentDefinition {
            &self.definition
        }
        fn values(&self) -> &ParameterValues {
            &self.values
        }
        fn is_connected(&self) -> bool {
            self.connected
        }
        fn connect(&mut self) -> Result<(), InstrumentError> {
            self.connected = true;
            Ok(())
        }
        fn disconnect(&mut self) -> Result<(), InstrumentError> {
            if self.refuse_disconnect {
                return Err(InstrumentError::State("stuck".to_string()));
            }
            self.connected = false;
            Ok(())
        }
        fn reset(&mut self) -> Result<(), InstrumentError> {
            Ok(())
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn identity_is_slot_index() {
        let mut registry = InstrumentRegistry::new();
        let a = registry.insert_with(|id| probe(id, "a")).unwrap();
        let b = registry.insert_with(|id| probe(id, "b")).unwrap();
        assert_eq!((a.index(), b.index()), (0, 1));
        assert_eq!(registry.get(b).map(|d| d.id()), Some(b));
        assert_eq!(registry.find("a"), Some(a));
        assert_eq!(b.to_string(), "#1");
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut registry = InstrumentRegistry::new();
        registry.insert_with(|id| probe(id, "a")).unwrap();
        assert!(matches!(
            registry.insert_with(|id| probe(id, "a")),
            Err(InstrumentError::State(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn release_requires_disconnect_and_never_reuses_ids() {
        let mut registry = InstrumentRegistry::new();
        let a = registry.insert_with(|id| probe(id, "a")).unwrap();
        registry.connect_all().unwrap();
        assert!(registry.release(a).is_err());

        registry.disconnect_all().unwrap();
        registry.release(a).unwrap();
        assert!(registry.get(a).is_none());
        assert!(registry.find("a").is_none());
        assert!(registry.release(a).is_err());

        let b = registry.insert_with(|id| probe(id, "a")).unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.ids(), vec![b]);
    }

    #[test]
    fn disconnect_all_attempts_every_device() {
        let mut registry = InstrumentRegistry::new();
        let a = registry.insert_with(|id| probe(id, "a")).unwrap();
        let b = registry.insert_with(|id| probe(id, "b")).unwrap();
        registry.connect_all().unwrap();
        if let Some(p) = registry.get_as_mut::<Probe>(a) {
            p.refuse_disconnect = true;
        }
        assert!(registry.disconnect_all().is_err());
        assert!(registry.get(a).is_some_and(|d| d.is_connected()));
        assert!(registry.get(b).is_some_and(|d| !d.is_connected()));
    }
}
