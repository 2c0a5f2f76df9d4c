use std::{
    fs::{File, OpenOptions},
    io::{ErrorKind, Read, Write},
    thread,
    time::Duration,
};

use crate::{
    error::{Error, Result},
    exec::{CommandExecutor, ExecCommand, ProcessExecutor},
    line::{self, BaudRate, FlowControl, Parity, StopBits},
    platform::Platform,
    shutdown,
};

// Size of each chunk pulled from the device during a drain. The drain stops
// as soon as a chunk comes back short, so this also bounds how many bytes a
// single loop iteration can pick up (128 bytes).
const READ_CHUNK_SIZE: usize = 128;

/// Lifecycle state of the controller.
///
/// `Closed` is entered only when a close attempt failed after the handle was
/// already discarded; it behaves like `Set` for configuration and re-opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Unset,
    Set,
    Open,
    Closed,
}

impl DeviceState {
    pub fn is_open(self) -> bool {
        matches!(self, DeviceState::Open)
    }

    pub(crate) fn is_configurable(self) -> bool {
        matches!(self, DeviceState::Set | DeviceState::Closed)
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceState::Unset => write!(f, "unset"),
            DeviceState::Set => write!(f, "set"),
            DeviceState::Open => write!(f, "opened"),
            DeviceState::Closed => write!(f, "closed"),
        }
    }
}

/// Serial device controller driving line configuration through the OS tools
/// (`stty` / `mode`) and raw byte I/O through the opened device file.
///
/// The instance exclusively owns the device handle and the write buffer. It
/// is deliberately not shareable; callers needing concurrent access must
/// serialize externally.
pub struct SerialController {
    platform: Platform,
    device: String,
    // Windows keeps the COMn display name for `mode` alongside the handle path.
    win_device: String,
    state: DeviceState,
    handle: Option<File>,
    exit_registration: Option<u64>,
    buffer: Vec<u8>,
    auto_flush: bool,
    executor: Box<dyn CommandExecutor>,
}

impl SerialController {
    /// Detect the host platform, verify the configuration tool, and probe
    /// `device`. Fails if the platform is unsupported, the tool is missing,
    /// or the device is not addressable.
    pub fn new(device: &str, locale: &str) -> Result<Self> {
        let platform = Platform::detect()?;
        let mut controller =
            Self::with_executor(platform, locale, Box::new(ProcessExecutor))?;
        controller.set_device(device)?;
        Ok(controller)
    }

    /// Seam constructor: fixed platform classification and a caller-supplied
    /// executor. The device is left unset; callers drive `set_device`.
    pub fn with_executor(
        platform: Platform,
        locale: &str,
        executor: Box<dyn CommandExecutor>,
    ) -> Result<Self> {
        if let Some(check) = line::tool_check_command(platform) {
            let output = executor.run(&check).map_err(|err| Error::Environment {
                detail: err.to_string(),
            })?;
            if !output.success() {
                return Err(Error::Environment {
                    detail: format!("`{check}` exited with status {}", output.status),
                });
            }
        }

        shutdown::install_exit_handler();
        log::debug!("serial controller ready on {platform} (locale {locale})");

        Ok(Self {
            platform,
            device: String::new(),
            win_device: String::new(),
            state: DeviceState::Unset,
            handle: None,
            exit_registration: None,
            buffer: Vec::new(),
            auto_flush: true,
            executor,
        })
    }

    /// Point the controller at a device.
    ///
    /// Accepts the canonical `COMn` syntax on every platform: Linux maps it
    /// to `/dev/ttyS(n-1)`, Windows keeps the name and addresses the handle
    /// as `\\.\COMn`, Darwin passes device strings through unchanged. Issues
    /// the platform probe command to confirm the device is addressable; a
    /// failed probe leaves the state untouched.
    pub fn set_device(&mut self, name: &str) -> Result<()> {
        if self.state.is_open() {
            log::info!("device {} is already opened; keeping it", self.device);
            return Ok(());
        }

        let (path, display) = normalize_device(self.platform, name)?;
        let probe = line::probe_command(self.platform, &path, &display);
        self.run_config_command(probe, "device")?;

        self.device = path;
        self.win_device = display;
        self.state = DeviceState::Set;
        Ok(())
    }

    pub fn set_baud_rate(&mut self, rate: u32) -> Result<()> {
        self.require_configurable("set the baud rate")?;
        let baud = BaudRate::try_from(rate).map_err(|_| {
            log::warn!("baud rate {rate} is not in the supported set");
            Error::InvalidArgument {
                parameter: "baud rate",
                value: rate.to_string(),
            }
        })?;
        let command = line::baud_command(self.platform, &self.device, &self.win_device, baud);
        self.run_config_command(command, "baud rate")
    }

    pub fn set_parity(&mut self, parity: Parity) -> Result<()> {
        self.require_configurable("set parity")?;
        let command =
            line::parity_command(self.platform, &self.device, &self.win_device, parity);
        self.run_config_command(command, "parity")
    }

    /// Lengths outside [5, 8] are clamped to the nearest bound.
    pub fn set_character_length(&mut self, length: u8) -> Result<()> {
        self.require_configurable("set the character length")?;
        let length = line::clamped_character_length(length);
        let command = line::character_length_command(
            self.platform,
            &self.device,
            &self.win_device,
            length,
        );
        self.run_config_command(command, "character length")
    }

    pub fn set_stop_bits(&mut self, stop_bits: StopBits) -> Result<()> {
        self.require_configurable("set the stop bit length")?;
        if stop_bits == StopBits::OneAndHalf && self.platform != Platform::Linux {
            log::warn!("1.5 stop bits are only available on linux");
            return Err(Error::InvalidArgument {
                parameter: "stop bits",
                value: stop_bits.to_string(),
            });
        }
        let command =
            line::stop_bits_command(self.platform, &self.device, &self.win_device, stop_bits);
        self.run_config_command(command, "stop bits")
    }

    pub fn set_flow_control(&mut self, flow: FlowControl) -> Result<()> {
        self.require_configurable("set flow control")?;
        let command =
            line::flow_control_command(self.platform, &self.device, &self.win_device, flow);
        self.run_config_command(command, "flow control")
    }

    /// `setserial` passthrough (POSIX facility). Requires the device open.
    pub fn set_serial_flag(&mut self, param: &str, argument: &str) -> Result<()> {
        if !self.state.is_open() {
            log::warn!("cannot set serial flag {param}: the device is {}", self.state);
            return Err(Error::InvalidState {
                operation: "set a serial flag",
                state: self.state,
            });
        }
        if self.platform.is_windows() {
            return Err(Error::InvalidArgument {
                parameter: "serial flag",
                value: format!("{param} (setserial is a POSIX facility)"),
            });
        }

        let command = line::serial_flag_command(&self.device, param, argument);
        let output = self
            .executor
            .run(&command)
            .map_err(|err| Error::ConfigurationFailed {
                parameter: "serial flag",
                stderr: err.to_string(),
            })?;
        let feedback = if output.stdout.is_empty() {
            output.stderr
        } else {
            output.stdout
        };
        // setserial reports "Invalid flag" / "/dev/...: error" on stdout.
        if output.status != 0 || feedback.starts_with('I') || feedback.starts_with('/') {
            log::warn!("setserial rejected flag {param}: {}", feedback.trim());
            return Err(Error::ConfigurationFailed {
                parameter: "serial flag",
                stderr: feedback,
            });
        }
        Ok(())
    }

    /// Open the device with an fopen-style mode (`r`, `w`, `a`, optional `+`,
    /// optional trailing `b`). Already-open is a successful no-op; an unset
    /// device is an error. The handle is opened non-blocking on POSIX.
    pub fn open_device(&mut self, mode: &str) -> Result<()> {
        if self.state.is_open() {
            log::info!("device {} is already opened", self.device);
            return Ok(());
        }
        if self.state == DeviceState::Unset {
            log::warn!("the device must be set before it can be opened");
            return Err(Error::InvalidState {
                operation: "open the device",
                state: self.state,
            });
        }

        let Some(flags) = parse_open_mode(mode) else {
            log::warn!("invalid opening mode {mode}; use fopen-style modes");
            return Err(Error::InvalidArgument {
                parameter: "opening mode",
                value: mode.to_string(),
            });
        };

        let mut options = OpenOptions::new();
        options
            .read(flags.read)
            .write(flags.write)
            .append(flags.append)
            .truncate(flags.truncate)
            .create(flags.create);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(libc::O_NONBLOCK);
        }

        match options.open(&self.device) {
            Ok(file) => {
                self.exit_registration = Some(shutdown::register(raw_of(&file)));
                self.handle = Some(file);
                self.state = DeviceState::Open;
                log::debug!("opened {} in mode {mode}", self.device);
                Ok(())
            }
            Err(err) => {
                log::warn!("unable to open {}: {err}", self.device);
                Err(Error::DeviceOpen {
                    device: self.device.clone(),
                    source: err,
                })
            }
        }
    }

    /// Close the device. Not-open is a successful no-op. A failed close
    /// still discards the handle so a broken device can never wedge future
    /// close calls; the state then records the unclean close as `Closed`.
    pub fn close_device(&mut self) -> Result<()> {
        if !self.state.is_open() {
            return Ok(());
        }
        if let Some(id) = self.exit_registration.take() {
            shutdown::unregister(id);
        }
        let Some(file) = self.handle.take() else {
            self.state = DeviceState::Set;
            return Ok(());
        };

        match shutdown::close_raw(into_raw(file)) {
            Ok(()) => {
                self.state = DeviceState::Set;
                log::debug!("closed {}", self.device);
                Ok(())
            }
            Err(err) => {
                self.state = DeviceState::Closed;
                log::error!("unable to close {}: {err}", self.device);
                Err(Error::DeviceClose {
                    device: self.device.clone(),
                    detail: err.to_string(),
                })
            }
        }
    }

    /// Buffer `bytes`, flush immediately when auto-flush is on, then suspend
    /// the calling thread for the settle delay (devices such as modems need
    /// quiescent time between command and reply).
    ///
    /// Returns whether the bytes were delivered; with auto-flush off the
    /// bytes merely accumulate and the call reports `true`.
    pub fn send(&mut self, bytes: &[u8], settle: Duration) -> bool {
        self.buffer.extend_from_slice(bytes);
        let delivered = if self.auto_flush { self.flush() } else { true };
        thread::sleep(settle);
        delivered
    }

    /// Write the entire buffer to the device in one call.
    ///
    /// The buffer is discarded regardless of the outcome, so a failed flush
    /// never poisons later sends with undeliverable bytes; the return value
    /// is the only record of the loss. Returns `false` without further
    /// detail when the device is not open.
    pub fn flush(&mut self) -> bool {
        let pending = std::mem::take(&mut self.buffer);
        if !self.state.is_open() {
            log::warn!("the device must be opened before flushing");
            return false;
        }
        let Some(handle) = self.handle.as_mut() else {
            return false;
        };
        match handle.write_all(&pending) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("error while writing {} buffered bytes: {err}", pending.len());
                false
            }
        }
    }

    /// Read whatever the device currently holds, up to `count` bytes when
    /// `count > 0`. Returns `None` when the device is not open.
    ///
    /// POSIX drains the non-blocking handle in 128-byte chunks until the
    /// accumulated length stops growing. Windows performs exactly one
    /// bounded read instead — its handles in this design block per read and
    /// return only what is available.
    pub fn read(&mut self, count: usize) -> Option<Vec<u8>> {
        if !self.state.is_open() {
            log::warn!("the device must be opened before reading");
            return None;
        }
        let platform = self.platform;
        let handle = self.handle.as_mut()?;

        if platform.is_windows() {
            if count == 0 {
                return Some(Vec::new());
            }
            let mut content = vec![0u8; count];
            match handle.read(&mut content) {
                Ok(n) => {
                    content.truncate(n);
                    Some(content)
                }
                Err(err) => {
                    log::warn!("read error on {}: {err}", self.device);
                    Some(Vec::new())
                }
            }
        } else {
            Some(drain_available(handle, count))
        }
    }

    /// Toggle auto-flush; when off, sends accumulate until an explicit
    /// `flush` call.
    pub fn set_auto_flush(&mut self, auto_flush: bool) {
        self.auto_flush = auto_flush;
    }

    pub fn auto_flush(&self) -> bool {
        self.auto_flush
    }

    /// Canonical device path (`/dev/ttyS3`, `\\.\COM4`, …).
    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Bytes currently buffered and not yet flushed.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn require_configurable(&self, operation: &'static str) -> Result<()> {
        if self.state.is_configurable() {
            Ok(())
        } else {
            log::warn!("cannot {operation}: the device is {}", self.state);
            Err(Error::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn run_config_command(
        &mut self,
        command: ExecCommand,
        parameter: &'static str,
    ) -> Result<()> {
        let output = self.executor.run(&command).map_err(|err| {
            log::warn!("failed to run {}: {err}", command.program);
            Error::ConfigurationFailed {
                parameter,
                stderr: err.to_string(),
            }
        })?;
        if output.success() {
            Ok(())
        } else {
            log::warn!("unable to set {parameter}: {}", output.stderr.trim());
            Err(Error::ConfigurationFailed {
                parameter,
                stderr: output.stderr,
            })
        }
    }
}

impl Drop for SerialController {
    fn drop(&mut self) {
        if self.state.is_open() {
            let _ = self.close_device();
        }
    }
}

fn drain_available(handle: &mut File, count: usize) -> Vec<u8> {
    let mut content = Vec::new();
    loop {
        let want = if count > 0 {
            READ_CHUNK_SIZE.min(count - content.len())
        } else {
            READ_CHUNK_SIZE
        };
        if want == 0 {
            break;
        }
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        match handle.read(&mut chunk[..want]) {
            Ok(0) => break,
            Ok(n) => {
                content.extend_from_slice(&chunk[..n]);
                // A short chunk means the driver buffer is drained for now;
                // bytes landing exactly on a chunk boundary wait for the
                // next call.
                if n < want {
                    break;
                }
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => break,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                log::warn!("read error on serial device: {err}");
                break;
            }
        }
    }
    content
}

/// Translate a caller-supplied device name into the canonical handle path
/// plus, on Windows, the separate COMn display name `mode` needs.
fn normalize_device(platform: Platform, name: &str) -> Result<(String, String)> {
    let com = com_port_number(name);
    match platform {
        Platform::Linux => match com {
            Some(0) => Err(invalid_device(name)),
            Some(n) => Ok((format!("/dev/ttyS{}", n - 1), String::new())),
            None => Ok((name.to_string(), String::new())),
        },
        Platform::Darwin => Ok((name.to_string(), String::new())),
        Platform::Windows => match com {
            Some(0) | None => Err(invalid_device(name)),
            Some(n) => Ok((format!("\\\\.\\COM{n}"), format!("COM{n}"))),
        },
    }
}

fn invalid_device(name: &str) -> Error {
    log::warn!("device name {name} is not valid here");
    Error::InvalidArgument {
        parameter: "device",
        value: name.to_string(),
    }
}

/// Parse the canonical `COMn` syntax (case-insensitive, optional trailing
/// colon). Anything else yields `None` and is treated as a literal path.
fn com_port_number(name: &str) -> Option<u32> {
    if name.len() < 4 || !name[..3].eq_ignore_ascii_case("com") {
        return None;
    }
    let digits = name[3..].strip_suffix(':').unwrap_or(&name[3..]);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[derive(Debug, Clone, Copy)]
struct OpenFlags {
    read: bool,
    write: bool,
    append: bool,
    truncate: bool,
    create: bool,
}

/// fopen-style mode grammar: `^[raw]\+?b?$`. The binary suffix is accepted
/// and ignored; I/O is always raw bytes.
fn parse_open_mode(mode: &str) -> Option<OpenFlags> {
    let mut chars = mode.chars();
    let base = chars.next()?;
    let rest: Vec<char> = chars.collect();
    let plus = match rest.as_slice() {
        [] | ['b'] => false,
        ['+'] | ['+', 'b'] => true,
        _ => return None,
    };
    match base {
        'r' => Some(OpenFlags {
            read: true,
            write: plus,
            append: false,
            truncate: false,
            create: false,
        }),
        'w' => Some(OpenFlags {
            read: plus,
            write: true,
            append: false,
            truncate: true,
            create: true,
        }),
        'a' => Some(OpenFlags {
            read: plus,
            write: true,
            append: true,
            truncate: false,
            create: true,
        }),
        _ => None,
    }
}

fn raw_of(file: &File) -> usize {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            use std::os::unix::io::AsRawFd;
            file.as_raw_fd() as usize
        } else if #[cfg(windows)] {
            use std::os::windows::io::AsRawHandle;
            file.as_raw_handle() as usize
        } else {
            let _ = file;
            0
        }
    }
}

fn into_raw(file: File) -> usize {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            use std::os::unix::io::IntoRawFd;
            file.into_raw_fd() as usize
        } else if #[cfg(windows)] {
            use std::os::windows::io::IntoRawHandle;
            file.into_raw_handle() as usize
        } else {
            drop(file);
            0
        }
    }
}
