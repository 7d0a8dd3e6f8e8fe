//! Capability records every lab configuration starts from.
//!
//! ```text
//! instrument
//! ├── bus_instrument    address
//! └── pulse_sequencer   board_num, clock_mhz
//! ```

use crate::sequencer::{BOARD_PARAMETER, CLOCK_PARAMETER};
use lab_common::consts::ADDRESS_PARAMETER;
use lab_common::definition::{CapabilityCatalog, CapabilityRecord};
use lab_common::error::{DefinitionError, ParameterError};
use lab_common::parameter::{Domain, Parameter};

/// Root capability; declares nothing.
pub const INSTRUMENT: &str = "instrument";

/// Instruments reached through a resource manager.
pub const BUS_INSTRUMENT: &str = "bus_instrument";

/// Pulse sequencer boards.
pub const PULSE_SEQUENCER: &str = "pulse_sequencer";

/// Highest core clock accepted, in MHz.
pub const MAX_CLOCK_MHZ: f64 = 500.0;

/// The built-in records, root first.
pub fn builtin_records() -> Result<Vec<CapabilityRecord>, ParameterError> {
    Ok(vec![
        CapabilityRecord::new(INSTRUMENT),
        CapabilityRecord::new(BUS_INSTRUMENT)
            .with_parent(INSTRUMENT)
            .with_parameter(Parameter::string(ADDRESS_PARAMETER, r"\S+")?),
        CapabilityRecord::new(PULSE_SEQUENCER)
            .with_parent(INSTRUMENT)
            .with_parameter(Parameter::new(BOARD_PARAMETER, Domain::int(Some(0), None)))
            .with_parameter(Parameter::new(
                CLOCK_PARAMETER,
                Domain::float_range(1.0, MAX_CLOCK_MHZ),
            )),
    ])
}

/// A catalog holding only the built-in records.
pub fn builtin_catalog() -> Result<CapabilityCatalog, DefinitionError> {
    let mut catalog = CapabilityCatalog::new();
    for record in builtin_records()? {
        catalog.register(record)?;
    }
    Ok(catalog)
}
