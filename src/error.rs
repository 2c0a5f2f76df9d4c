use std::fmt;

use crate::controller::DeviceState;

/// Crate-wide result alias for configuration and lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy for the device controller.
///
/// Validation failures (`InvalidState`, `InvalidArgument`) are raised before
/// any external command is issued and leave no side effects. External-command
/// failures carry the captured stderr text verbatim for diagnosability.
#[derive(Debug)]
pub enum Error {
    /// The host OS is neither Linux, Darwin nor Windows.
    PlatformUnsupported { host: String },
    /// The external line-configuration tool is missing or not invocable.
    Environment { detail: String },
    /// An operation was attempted in the wrong lifecycle state.
    InvalidState {
        operation: &'static str,
        state: DeviceState,
    },
    /// A requested value lies outside its enumerated domain.
    InvalidArgument {
        parameter: &'static str,
        value: String,
    },
    /// The external configuration command exited non-zero.
    ConfigurationFailed {
        parameter: &'static str,
        stderr: String,
    },
    /// The device file could not be opened.
    DeviceOpen {
        device: String,
        source: std::io::Error,
    },
    /// The device handle could not be closed cleanly.
    DeviceClose { device: String, detail: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PlatformUnsupported { host } => {
                write!(f, "host OS {host:?} is neither Linux, Darwin nor Windows")
            }
            Error::Environment { detail } => {
                write!(f, "environment check failed: {detail}")
            }
            Error::InvalidState { operation, state } => {
                write!(f, "cannot {operation} while the device is {state}")
            }
            Error::InvalidArgument { parameter, value } => {
                write!(f, "invalid {parameter}: {value}")
            }
            Error::ConfigurationFailed { parameter, stderr } => {
                let detail = stderr.trim();
                if detail.is_empty() {
                    write!(f, "unable to set {parameter}")
                } else {
                    write!(f, "unable to set {parameter}: {detail}")
                }
            }
            Error::DeviceOpen { device, source } => {
                write!(f, "unable to open device {device}: {source}")
            }
            Error::DeviceClose { device, detail } => {
                write!(f, "unable to close device {device}: {detail}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::DeviceOpen { source, .. } => Some(source),
            _ => None,
        }
    }
}
