//! ttygate — serial modem line control over the OS `stty`/`mode` tools.
//!
//! This crate drives a serial device (typically a GSM modem) without a
//! native serial abstraction: line-discipline configuration is applied by
//! shelling out to the platform tool (`stty` on POSIX, `mode` on Windows)
//! and byte I/O goes straight through the opened device file. The center of
//! the API is [`SerialController`], a state-machine wrapper over one device:
//! set it, configure the line, open it, send and read, close it.
//!
//! The `ttygate` binary wraps the same API as a line probe.

pub mod controller;
pub mod error;
pub mod exec;
pub mod line;
pub mod platform;
#[doc(hidden)]
mod shutdown;

pub use controller::{DeviceState, SerialController};
pub use error::{Error, Result};
pub use exec::{CommandExecutor, ExecCommand, ExecOutput, ProcessExecutor};
pub use line::{BaudRate, FlowControl, LineConfig, Parity, StopBits};
pub use platform::Platform;
