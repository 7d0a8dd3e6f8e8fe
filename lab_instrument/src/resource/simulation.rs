//! In-memory resource manager for tests and dry runs.
//!
//! Every resource opened by a [`SimulatedResourceManager`] shares one state
//! block with the manager's [`SimulationHandle`], so a test can script
//! replies before the instrument connects and inspect the command log after.
//!
//! Reply lookup for a query, in order:
//! 1. a one-shot fault armed with [`SimulationHandle::fail_next`]
//! 2. the next queued reply for that exact command
//! 3. a sticky reply set with [`SimulationHandle::set_reply`]
//! 4. the fallback reply `"0"`

use super::{Resource, ResourceError, ResourceManager};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// What a simulated resource saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// `open_resource(address)`.
    Open(String),
    /// `query(text)` on `address`.
    Query {
        /// Resource address.
        address: String,
        /// Command text.
        command: String,
    },
    /// `write(text)` on `address`.
    Write {
        /// Resource address.
        address: String,
        /// Command text.
        command: String,
    },
    /// `close()` on `address`.
    Close(String),
}

/// Reply to any query with nothing scripted.
const FALLBACK_REPLY: &str = "0";

#[derive(Debug, Default)]
struct SimState {
    queued: HashMap<String, VecDeque<String>>,
    sticky: HashMap<String, String>,
    faults: HashMap<String, ResourceError>,
    unreachable: BTreeSet<String>,
    events: Vec<BusEvent>,
}

type Shared = Arc<Mutex<SimState>>;

fn lock(state: &Shared) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Manager ────────────────────────────────────────────────────────

/// Resource manager whose resources answer from a script.
#[derive(Debug, Default, Clone)]
pub struct SimulatedResourceManager {
    state: Shared,
}

impl SimulatedResourceManager {
    /// Manager with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for scripting and inspection.
    pub fn handle(&self) -> SimulationHandle {
        SimulationHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl ResourceManager for SimulatedResourceManager {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn open_resource(&self, address: &str) -> Result<Box<dyn Resource>, ResourceError> {
        if address.trim().is_empty() {
            return Err(ResourceError::InvalidAddress(address.to_string()));
        }
        let mut state = lock(&self.state);
        if state.unreachable.contains(address) {
            return Err(ResourceError::NotFound(address.to_string()));
        }
        state.events.push(BusEvent::Open(address.to_string()));
        trace!(address, "Opened simulated resource");
        Ok(Box::new(SimulatedResource {
            address: address.to_string(),
            state: Arc::clone(&self.state),
            open: true,
        }))
    }
}

// ─── Resource ───────────────────────────────────────────────────────

struct SimulatedResource {
    address: String,
    state: Shared,
    open: bool,
}

impl SimulatedResource {
    fn ensure_open(&self) -> Result<(), ResourceError> {
        if self.open {
            Ok(())
        } else {
            Err(ResourceError::Closed)
        }
    }
}

impl Resource for SimulatedResource {
    fn query(&mut self, command: &str) -> Result<String, ResourceError> {
        self.ensure_open()?;
        let mut state = lock(&self.state);
        state.events.push(BusEvent::Query {
            address: self.address.clone(),
            command: command.to_string(),
        });
        if let Some(fault) = state.faults.remove(command) {
            return Err(fault);
        }
        let queued = state.queued.get_mut(command).and_then(VecDeque::pop_front);
        let reply = match queued {
            Some(reply) => reply,
            None => state
                .sticky
                .get(command)
                .map_or_else(|| FALLBACK_REPLY.to_string(), Clone::clone),
        };
        trace!(address = %self.address, command, reply = %reply, "Simulated query");
        Ok(reply)
    }

    fn write(&mut self, command: &str) -> Result<(), ResourceError> {
        self.ensure_open()?;
        let mut state = lock(&self.state);
        state.events.push(BusEvent::Write {
            address: self.address.clone(),
            command: command.to_string(),
        });
        if let Some(fault) = state.faults.remove(command) {
            return Err(fault);
        }
        trace!(address = %self.address, command, "Simulated write");
        Ok(())
    }

    fn close(&mut self) -> Result<(), ResourceError> {
        self.ensure_open()?;
        self.open = false;
        lock(&self.state)
            .events
            .push(BusEvent::Close(self.address.clone()));
        Ok(())
    }
}

// ─── Handle ─────────────────────────────────────────────────────────

/// Scripting and inspection side of a [`SimulatedResourceManager`].
#[derive(Debug, Clone)]
pub struct SimulationHandle {
    state: Shared,
}

impl SimulationHandle {
    /// Queue one reply for the next `query(command)`.
    pub fn push_reply(&self, command: impl Into<String>, reply: impl Into<String>) {
        lock(&self.state)
            .queued
            .entry(command.into())
            .or_default()
            .push_back(reply.into());
    }

    /// Reply to every `query(command)` once the queue is drained.
    pub fn set_reply(&self, command: impl Into<String>, reply: impl Into<String>) {
        lock(&self.state).sticky.insert(command.into(), reply.into());
    }

    /// Fail the next query or write of `command`.
    pub fn fail_next(&self, command: impl Into<String>, error: ResourceError) {
        lock(&self.state).faults.insert(command.into(), error);
    }

    /// Refuse to open `address`.
    pub fn set_unreachable(&self, address: impl Into<String>) {
        lock(&self.state).unreachable.insert(address.into());
    }

    /// Everything seen so far.
    pub fn events(&self) -> Vec<BusEvent> {
        lock(&self.state).events.clone()
    }

    /// Query and write texts sent to `address`, in order.
    pub fn commands(&self, address: &str) -> Vec<String> {
        lock(&self.state)
            .events
            .iter()
            .filter_map(|e| match e {
                BusEvent::Query { address: a, command } | BusEvent::Write { address: a, command }
                    if a == address =>
                {
                    Some(command.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Most recent command sent to `address`.
    pub fn last_command(&self, address: &str) -> Option<String> {
        self.commands(address).pop()
    }

    /// Forget the event log.
    pub fn clear_events(&self) {
        lock(&self.state).events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_then_sticky_then_fallback() {
        let manager = SimulatedResourceManager::new();
        let handle = manager.handle();
        handle.push_reply("FREQ?", "1");
        handle.set_reply("FREQ?", "2");

        let mut res = manager.open_resource("GPIB0::7::INSTR").unwrap();
        assert_eq!(res.query("FREQ?").unwrap(), "1");
        assert_eq!(res.query("FREQ?").unwrap(), "2");
        assert_eq!(res.query("POW?").unwrap(), "0");
    }

    #[test]
    fn log_records_commands_per_address() {
        let manager = SimulatedResourceManager::new();
        let handle = manager.handle();
        let mut a = manager.open_resource("A").unwrap();
        let mut b = manager.open_resource("B").unwrap();
        a.write("OUTP ON").unwrap();
        b.write("RST").unwrap();
        a.query("*IDN?").unwrap();

        assert_eq!(handle.commands("A"), vec!["OUTP ON", "*IDN?"]);
        assert_eq!(handle.last_command("B").as_deref(), Some("RST"));
    }

    #[test]
    fn one_shot_fault() {
        let manager = SimulatedResourceManager::new();
        let handle = manager.handle();
        handle.fail_next("OUTP ON", ResourceError::Io("bus error".to_string()));
        let mut res = manager.open_resource("A").unwrap();
        assert_eq!(
            res.write("OUTP ON"),
            Err(ResourceError::Io("bus error".to_string()))
        );
        assert!(res.write("OUTP ON").is_ok());
    }

    #[test]
    fn unreachable_and_closed() {
        let manager = SimulatedResourceManager::new();
        manager.handle().set_unreachable("GPIB0::9::INSTR");
        assert!(matches!(
            manager.open_resource("GPIB0::9::INSTR"),
            Err(ResourceError::NotFound(_))
        ));
        assert!(matches!(
            manager.open_resource(""),
            Err(ResourceError::InvalidAddress(_))
        ));

        let mut res = manager.open_resource("A").unwrap();
        res.close().unwrap();
        assert_eq!(res.query("X"), Err(ResourceError::Closed));
    }
}
