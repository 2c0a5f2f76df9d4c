use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{exec::ExecCommand, platform::Platform};

/// The closed set of supported baud rates.
///
/// The discriminant is the line rate itself; `mode_code` yields the encoded
/// value the Windows `mode` tool expects for the legacy low rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum BaudRate {
    B110 = 110,
    B150 = 150,
    B300 = 300,
    B600 = 600,
    B1200 = 1200,
    B2400 = 2400,
    B4800 = 4800,
    B9600 = 9600,
    B19200 = 19200,
    B38400 = 38400,
    B57600 = 57600,
    B115200 = 115200,
}

impl BaudRate {
    pub fn rate(self) -> u32 {
        self as u32
    }

    /// Two-digit `mode` codes for the historic rates; modern rates pass through.
    pub(crate) fn mode_code(self) -> u32 {
        match self {
            BaudRate::B110 => 11,
            BaudRate::B150 => 15,
            BaudRate::B300 => 30,
            BaudRate::B600 => 60,
            BaudRate::B1200 => 12,
            BaudRate::B2400 => 24,
            BaudRate::B4800 => 48,
            BaudRate::B9600 => 96,
            BaudRate::B19200 => 19,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115200,
        }
    }
}

impl std::fmt::Display for BaudRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.rate())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl Parity {
    fn stty_args(self) -> &'static [&'static str] {
        match self {
            Parity::None => &["-parenb"],
            Parity::Odd => &["parenb", "parodd"],
            Parity::Even => &["parenb", "-parodd"],
        }
    }

    fn mode_letter(self) -> char {
        match self {
            Parity::None => 'n',
            Parity::Odd => 'o',
            Parity::Even => 'e',
        }
    }
}

/// Stop-bit length. `OneAndHalf` is only accepted on Linux.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    #[strum(serialize = "1")]
    One,
    #[strum(serialize = "1.5")]
    OneAndHalf,
    #[strum(serialize = "2")]
    Two,
}

impl StopBits {
    // stty only distinguishes one stop bit from "more than one".
    fn stty_args(self) -> &'static [&'static str] {
        match self {
            StopBits::One => &["-cstopb"],
            StopBits::OneAndHalf | StopBits::Two => &["cstopb"],
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    #[strum(serialize = "none")]
    None,
    #[strum(serialize = "rts/cts")]
    RtsCts,
    #[strum(serialize = "xon/xoff")]
    XonXoff,
}

impl FlowControl {
    fn stty_args(self) -> &'static [&'static str] {
        match self {
            FlowControl::None => &["clocal", "-crtscts", "-ixon", "-ixoff"],
            FlowControl::RtsCts => &["-clocal", "crtscts", "-ixon", "-ixoff"],
            FlowControl::XonXoff => &["-clocal", "-crtscts", "ixon", "ixoff"],
        }
    }

    fn mode_args(self) -> &'static [&'static str] {
        match self {
            FlowControl::None => &["xon=off", "octs=off", "rts=on"],
            FlowControl::RtsCts => &["xon=off", "octs=on", "rts=hs"],
            FlowControl::XonXoff => &["xon=on", "octs=off", "rts=on"],
        }
    }
}

/// Character lengths outside [5, 8] are clamped, never rejected.
pub fn clamped_character_length(length: u8) -> u8 {
    length.clamp(5, 8)
}

/// Aggregate line configuration, as callers hand it to the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineConfig {
    pub baud: u32,
    pub parity: Parity,
    pub data_bits: u8,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            baud: 9600,
            parity: Parity::None,
            data_bits: 8,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

fn stty_command(platform: Platform, device: &str, args: &[&str]) -> ExecCommand {
    let mut all = vec![
        platform.stty_device_flag().to_string(),
        device.to_string(),
    ];
    all.extend(args.iter().map(|a| a.to_string()));
    ExecCommand {
        program: "stty".to_string(),
        args: all,
    }
}

// `mode` is a cmd builtin, not an executable, hence the `cmd /C` wrapper.
fn mode_command(display: &str, args: &[&str]) -> ExecCommand {
    let mut all = vec![
        "/C".to_string(),
        "mode".to_string(),
        display.to_string(),
    ];
    all.extend(args.iter().map(|a| a.to_string()));
    ExecCommand {
        program: "cmd".to_string(),
        args: all,
    }
}

/// The probe issued by `set_device` to confirm the device is addressable.
pub(crate) fn probe_command(platform: Platform, device: &str, display: &str) -> ExecCommand {
    match platform {
        Platform::Linux | Platform::Darwin => stty_command(platform, device, &[]),
        Platform::Windows => mode_command(display, &["xon=on", "BAUD=9600"]),
    }
}

/// The construction-time check that the configuration tool is invocable.
/// Windows needs none; `mode` ships with cmd.
pub(crate) fn tool_check_command(platform: Platform) -> Option<ExecCommand> {
    match platform {
        Platform::Linux => Some(ExecCommand::new("stty", &["--version"])),
        Platform::Darwin => Some(ExecCommand::new("stty", &[])),
        Platform::Windows => None,
    }
}

pub(crate) fn baud_command(
    platform: Platform,
    device: &str,
    display: &str,
    baud: BaudRate,
) -> ExecCommand {
    match platform {
        Platform::Linux | Platform::Darwin => {
            stty_command(platform, device, &[&baud.rate().to_string()])
        }
        Platform::Windows => mode_command(display, &[&format!("BAUD={}", baud.mode_code())]),
    }
}

pub(crate) fn parity_command(
    platform: Platform,
    device: &str,
    display: &str,
    parity: Parity,
) -> ExecCommand {
    match platform {
        Platform::Linux | Platform::Darwin => stty_command(platform, device, parity.stty_args()),
        Platform::Windows => {
            mode_command(display, &[&format!("PARITY={}", parity.mode_letter())])
        }
    }
}

pub(crate) fn character_length_command(
    platform: Platform,
    device: &str,
    display: &str,
    length: u8,
) -> ExecCommand {
    match platform {
        Platform::Linux | Platform::Darwin => {
            stty_command(platform, device, &[&format!("cs{length}")])
        }
        Platform::Windows => mode_command(display, &[&format!("DATA={length}")]),
    }
}

pub(crate) fn stop_bits_command(
    platform: Platform,
    device: &str,
    display: &str,
    stop_bits: StopBits,
) -> ExecCommand {
    match platform {
        Platform::Linux | Platform::Darwin => {
            stty_command(platform, device, stop_bits.stty_args())
        }
        Platform::Windows => mode_command(display, &[&format!("STOP={stop_bits}")]),
    }
}

pub(crate) fn flow_control_command(
    platform: Platform,
    device: &str,
    display: &str,
    flow: FlowControl,
) -> ExecCommand {
    match platform {
        Platform::Linux | Platform::Darwin => stty_command(platform, device, flow.stty_args()),
        Platform::Windows => mode_command(display, flow.mode_args()),
    }
}

/// `setserial` wrapper command (POSIX-only facility).
pub(crate) fn serial_flag_command(device: &str, param: &str, argument: &str) -> ExecCommand {
    let mut args = vec![device.to_string(), param.to_string()];
    if !argument.is_empty() {
        args.push(argument.to_string());
    }
    ExecCommand {
        program: "setserial".to_string(),
        args,
    }
}
