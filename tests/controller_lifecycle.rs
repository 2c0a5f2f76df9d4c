//! End-to-end exercises of the public controller API with a scripted
//! executor, using a plain file as the stand-in device node.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use ttygate::{
    CommandExecutor, DeviceState, Error, ExecCommand, ExecOutput, FlowControl, Parity, Platform,
    SerialController, StopBits,
};

/// Records the rendered form of every command; fails those matching a
/// scripted pattern.
struct RecordingExecutor {
    commands: Arc<Mutex<Vec<String>>>,
    failures: Vec<String>,
}

impl CommandExecutor for RecordingExecutor {
    fn run(&self, command: &ExecCommand) -> anyhow::Result<ExecOutput> {
        let line = command.to_string();
        self.commands.lock().unwrap().push(line.clone());
        if self.failures.iter().any(|pattern| line.contains(pattern)) {
            Ok(ExecOutput {
                status: 1,
                stdout: String::new(),
                stderr: "device is busy".to_string(),
            })
        } else {
            Ok(ExecOutput {
                status: 0,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }
}

fn controller_on(
    platform: Platform,
    failures: &[&str],
) -> (SerialController, Arc<Mutex<Vec<String>>>) {
    let commands = Arc::new(Mutex::new(Vec::new()));
    let executor = RecordingExecutor {
        commands: commands.clone(),
        failures: failures.iter().map(|f| f.to_string()).collect(),
    };
    let controller =
        SerialController::with_executor(platform, "en_US", Box::new(executor)).unwrap();
    (controller, commands)
}

fn temp_device(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("ttygate-it-{tag}-{}", std::process::id()))
}

#[test]
fn caller_contract_sequence_delivers_all_writes() {
    let path = temp_device("contract");
    std::fs::write(&path, b"").unwrap();
    let (mut modem, _) = controller_on(Platform::Linux, &[]);

    modem.set_device(path.to_str().unwrap()).unwrap();
    modem.set_baud_rate(9600).unwrap();
    modem.set_parity(Parity::None).unwrap();
    modem.set_character_length(8).unwrap();
    modem.set_stop_bits(StopBits::One).unwrap();
    modem.set_flow_control(FlowControl::None).unwrap();
    modem.open_device("r+b").unwrap();
    assert_eq!(modem.state(), DeviceState::Open);

    assert!(modem.send(b"AT+CMGF=1\r\n", Duration::ZERO));
    assert!(modem.send(b"AT+cmgs=\"555\"\r\n", Duration::ZERO));
    assert!(modem.send(&[0x1a], Duration::ZERO));
    assert_eq!(modem.pending_bytes(), 0);

    modem.close_device().unwrap();
    assert_eq!(modem.state(), DeviceState::Set);

    let written = std::fs::read(&path).unwrap();
    assert_eq!(written, b"AT+CMGF=1\r\nAT+cmgs=\"555\"\r\n\x1a");
    let _ = std::fs::remove_file(&path);
}

#[test]
fn reply_drain_returns_seeded_bytes() {
    let path = temp_device("reply");
    std::fs::write(&path, b"\r\nOK\r\n").unwrap();
    let (mut modem, _) = controller_on(Platform::Linux, &[]);

    modem.set_device(path.to_str().unwrap()).unwrap();
    modem.open_device("r").unwrap();
    let reply = modem.read(0).unwrap();
    assert_eq!(reply, b"\r\nOK\r\n");

    // The drain is non-blocking; a second call finds nothing new.
    assert!(modem.read(0).unwrap().is_empty());
    modem.close_device().unwrap();
    let _ = std::fs::remove_file(&path);
}

#[test]
fn configuration_is_rejected_while_open() {
    let path = temp_device("openlock");
    std::fs::write(&path, b"").unwrap();
    let (mut modem, commands) = controller_on(Platform::Linux, &[]);

    modem.set_device(path.to_str().unwrap()).unwrap();
    modem.open_device("r+b").unwrap();
    let issued = commands.lock().unwrap().len();

    assert!(matches!(
        modem.set_baud_rate(9600),
        Err(Error::InvalidState { .. })
    ));
    assert!(matches!(
        modem.set_character_length(8),
        Err(Error::InvalidState { .. })
    ));
    assert!(matches!(
        modem.set_stop_bits(StopBits::Two),
        Err(Error::InvalidState { .. })
    ));
    assert_eq!(commands.lock().unwrap().len(), issued);

    modem.close_device().unwrap();
    let _ = std::fs::remove_file(&path);
}

#[test]
fn failed_flush_loses_the_buffer_observably() {
    let path = temp_device("readonly");
    std::fs::write(&path, b"").unwrap();
    let (mut modem, _) = controller_on(Platform::Linux, &[]);

    modem.set_device(path.to_str().unwrap()).unwrap();
    // Read-only handle: the write in flush must fail.
    modem.open_device("r").unwrap();

    let delivered = modem.send(b"AT\r\n", Duration::ZERO);
    assert!(!delivered);
    // The loss is final: the buffer was discarded with the failure.
    assert_eq!(modem.pending_bytes(), 0);

    modem.close_device().unwrap();
    let _ = std::fs::remove_file(&path);
}

#[test]
fn probe_failure_keeps_the_controller_unset() {
    let (mut modem, _) = controller_on(Platform::Linux, &["/dev/ttyS3"]);

    let err = modem.set_device("COM4").unwrap_err();
    assert!(matches!(err, Error::ConfigurationFailed { .. }));
    assert_eq!(modem.state(), DeviceState::Unset);

    // Still unset: configuration and opening stay rejected.
    assert!(matches!(
        modem.set_baud_rate(9600),
        Err(Error::InvalidState { .. })
    ));
    assert!(matches!(
        modem.open_device("r+b"),
        Err(Error::InvalidState { .. })
    ));
}

#[test]
fn windows_configuration_synthesizes_mode_commands() {
    let (mut modem, commands) = controller_on(Platform::Windows, &[]);

    modem.set_device("COM4").unwrap();
    modem.set_baud_rate(110).unwrap();
    modem.set_parity(Parity::Even).unwrap();
    modem.set_character_length(7).unwrap();
    modem.set_stop_bits(StopBits::Two).unwrap();
    modem.set_flow_control(FlowControl::XonXoff).unwrap();

    let issued = commands.lock().unwrap().clone();
    assert_eq!(
        issued,
        vec![
            "cmd /C mode COM4 xon=on BAUD=9600".to_string(),
            "cmd /C mode COM4 BAUD=11".to_string(),
            "cmd /C mode COM4 PARITY=e".to_string(),
            "cmd /C mode COM4 DATA=7".to_string(),
            "cmd /C mode COM4 STOP=2".to_string(),
            "cmd /C mode COM4 xon=on octs=off rts=on".to_string(),
        ]
    );
}

#[test]
fn configuration_error_reports_captured_stderr() {
    let (mut modem, _) = controller_on(Platform::Linux, &["115200"]);
    modem.set_device("COM1").unwrap();

    match modem.set_baud_rate(115200) {
        Err(Error::ConfigurationFailed { stderr, .. }) => {
            assert_eq!(stderr, "device is busy");
        }
        other => panic!("expected configuration failure, got {other:?}"),
    }
}
