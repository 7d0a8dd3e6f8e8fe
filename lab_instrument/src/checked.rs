//! Error-checked commands.
//!
//! [`checked`] wraps any command function so that the device's error status
//! is read after it runs. Many instruments clear their error register on the
//! first read, so when the status is non-zero the command is issued exactly
//! once more and the message is read after the repeat. The wrapper knows
//! nothing about the instrument: status and message queries come from the
//! target's [`ErrorStatus`] implementation.
//!
//! ```rust
//! use lab_instrument::checked::{checked, ErrorStatus};
//! use lab_common::error::InstrumentError;
//!
//! struct Meter { code: i64, writes: Vec<String> }
//!
//! impl ErrorStatus for Meter {
//!     fn error_code(&mut self) -> Result<i64, InstrumentError> { Ok(self.code) }
//!     fn error_message(&mut self) -> Result<String, InstrumentError> {
//!         Ok("Data out of range".to_string())
//!     }
//! }
//!
//! let set_range = checked("set_range", |m: &mut Meter, r: u32| {
//!     m.writes.push(format!("RANGE {r}"));
//!     Ok(())
//! });
//!
//! let mut meter = Meter { code: 0, writes: vec![] };
//! set_range(&mut meter, 10).unwrap();
//! meter.code = -222;
//! assert!(set_range(&mut meter, 99).is_err());
//! assert_eq!(meter.writes.len(), 3);
//! ```

use lab_common::consts::NO_ERROR;
use lab_common::error::InstrumentError;
use std::fmt::Debug;
use tracing::{debug, warn};

/// Error-status side channel of an instrument.
pub trait ErrorStatus {
    /// Current error code. [`NO_ERROR`] means success.
    fn error_code(&mut self) -> Result<i64, InstrumentError>;

    /// Human-readable text for the current error.
    fn error_message(&mut self) -> Result<String, InstrumentError>;
}

/// Wrap `op` so that every call is followed by an error-status check.
///
/// The returned function invokes `op`, then reads the status code. A zero
/// code returns `op`'s value. A non-zero code re-invokes `op` once with the
/// same arguments, reads the message and fails with
/// `InstrumentError::DeviceStatus`. Errors from the first `op` call or from
/// the status queries are returned unchanged.
///
/// A failure of the repeated call is logged at `warn` and does not replace
/// the `DeviceStatus` error: the repeat only exists to make the device raise
/// the error again so its message can be read.
pub fn checked<T, A, R, F>(
    name: impl Into<String>,
    op: F,
) -> impl Fn(&mut T, A) -> Result<R, InstrumentError>
where
    T: ErrorStatus + ?Sized,
    A: Clone + Debug,
    F: Fn(&mut T, A) -> Result<R, InstrumentError>,
{
    let name = name.into();
    move |target: &mut T, args: A| {
        let value = op(target, args.clone())?;
        let code = target.error_code()?;
        if code == NO_ERROR {
            return Ok(value);
        }

        debug!(command = %name, args = ?args, code, "Device reported error; repeating command");
        if let Err(e) = op(target, args.clone()) {
            warn!(command = %name, error = %e, "Repeated command failed");
        }
        let message = target.error_message()?;
        Err(InstrumentError::DeviceStatus {
            command: name.clone(),
            args: format!("{args:?}"),
            code,
            message,
        })
    }
}

/// Parse a status reply such as `-222,"Data out of range"` or `+0`.
///
/// The code is the first comma-separated field.
pub fn parse_status_code(command: &str, reply: &str) -> Result<i64, InstrumentError> {
    reply
        .split(',')
        .next()
        .map(str::trim)
        .and_then(|field| field.parse::<i64>().ok())
        .ok_or_else(|| InstrumentError::StatusParse {
            command: command.to_string(),
            response: reply.to_string(),
        })
}
