use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use std::time::Duration;

use ttygate::{FlowControl, LineConfig, Parity, SerialController, StopBits};

/// Outcome of one line probe, printable as text or JSON.
#[derive(Debug, Serialize)]
struct ProbeReport {
    device: String,
    platform: String,
    line: LineConfig,
    sent_bytes: usize,
    delivered: bool,
    reply_bytes: usize,
    reply: String,
}

fn main() {
    env_logger::init();
    let matches = Command::new("ttygate")
        .about("Probe a serial modem line through the OS stty/mode tools")
        .arg(
            Arg::new("device")
                .long("device")
                .short('d')
                .required(true)
                .help("Device name or path (COMn, /dev/ttyS0, ...)"),
        )
        .arg(
            Arg::new("locale")
                .long("locale")
                .default_value("en_US")
                .help("Locale recorded for diagnostics"),
        )
        .arg(
            Arg::new("baud")
                .long("baud")
                .short('b')
                .default_value("9600")
                .value_parser(clap::value_parser!(u32))
                .help("Baud rate (one of the supported set)"),
        )
        .arg(
            Arg::new("parity")
                .long("parity")
                .default_value("none")
                .help("Parity: none, odd or even"),
        )
        .arg(
            Arg::new("data-bits")
                .long("data-bits")
                .default_value("8")
                .value_parser(clap::value_parser!(u8))
                .help("Character length (clamped to 5..=8)"),
        )
        .arg(
            Arg::new("stop-bits")
                .long("stop-bits")
                .default_value("1")
                .help("Stop bits: 1, 1.5 (Linux only) or 2"),
        )
        .arg(
            Arg::new("flow")
                .long("flow")
                .default_value("none")
                .help("Flow control: none, rts/cts or xon/xoff"),
        )
        .arg(
            Arg::new("payload")
                .long("payload")
                .default_value("AT")
                .help("Command to send (CR LF is appended)"),
        )
        .arg(
            Arg::new("settle-ms")
                .long("settle-ms")
                .default_value("100")
                .value_parser(clap::value_parser!(u64))
                .help("Settle delay after the write"),
        )
        .arg(
            Arg::new("reply-wait-ms")
                .long("reply-wait-ms")
                .default_value("1000")
                .value_parser(clap::value_parser!(u64))
                .help("Extra wait before draining the reply"),
        )
        .arg(
            Arg::new("read-count")
                .long("read-count")
                .default_value("0")
                .value_parser(clap::value_parser!(usize))
                .help("Reply bytes to read (0 = drain whatever is available)"),
        )
        .arg(
            Arg::new("mode")
                .long("mode")
                .default_value("r+b")
                .help("fopen-style opening mode"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print the report as JSON"),
        )
        .get_matches();

    let json = matches.get_flag("json");
    match run_probe(&matches) {
        Ok(report) => {
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).unwrap_or_default()
                );
            } else {
                print_report(&report);
            }
        }
        Err(err) => {
            log::error!("line probe failed: {err}");
            eprintln!("line probe failed: {err}");
            std::process::exit(1);
        }
    }
}

fn run_probe(matches: &ArgMatches) -> Result<ProbeReport> {
    let device = matches.get_one::<String>("device").unwrap();
    let locale = matches.get_one::<String>("locale").unwrap();
    let baud = *matches.get_one::<u32>("baud").unwrap();
    let data_bits = *matches.get_one::<u8>("data-bits").unwrap();
    let settle = Duration::from_millis(*matches.get_one::<u64>("settle-ms").unwrap());
    let reply_wait = Duration::from_millis(*matches.get_one::<u64>("reply-wait-ms").unwrap());
    let read_count = *matches.get_one::<usize>("read-count").unwrap();
    let mode = matches.get_one::<String>("mode").unwrap();

    let parity: Parity = matches
        .get_one::<String>("parity")
        .unwrap()
        .parse()
        .map_err(|_| anyhow!("parity must be none, odd or even"))?;
    let stop_bits: StopBits = matches
        .get_one::<String>("stop-bits")
        .unwrap()
        .parse()
        .map_err(|_| anyhow!("stop bits must be 1, 1.5 or 2"))?;
    let flow: FlowControl = matches
        .get_one::<String>("flow")
        .unwrap()
        .parse()
        .map_err(|_| anyhow!("flow control must be none, rts/cts or xon/xoff"))?;

    let mut payload = matches.get_one::<String>("payload").unwrap().clone();
    payload.push_str("\r\n");

    let mut controller = SerialController::new(device, locale)?;
    controller.set_baud_rate(baud)?;
    controller.set_parity(parity)?;
    controller.set_character_length(data_bits)?;
    controller.set_stop_bits(stop_bits)?;
    controller.set_flow_control(flow)?;
    controller.open_device(mode)?;

    let delivered = controller.send(payload.as_bytes(), settle);
    std::thread::sleep(reply_wait);
    let reply = controller.read(read_count).unwrap_or_default();
    controller.close_device()?;

    Ok(ProbeReport {
        device: controller.device().to_string(),
        platform: controller.platform().to_string(),
        line: LineConfig {
            baud,
            parity,
            data_bits,
            stop_bits,
            flow_control: flow,
        },
        sent_bytes: payload.len(),
        delivered,
        reply_bytes: reply.len(),
        reply: String::from_utf8_lossy(&reply).into_owned(),
    })
}

fn print_report(report: &ProbeReport) {
    println!("device:    {} ({})", report.device, report.platform);
    println!(
        "line:      {} baud, {} parity, {} data bits, {} stop bits, flow {}",
        report.line.baud,
        report.line.parity,
        report.line.data_bits,
        report.line.stop_bits,
        report.line.flow_control
    );
    println!(
        "sent:      {} bytes ({})",
        report.sent_bytes,
        if report.delivered {
            "delivered"
        } else {
            "buffer lost"
        }
    );
    println!("reply:     {} bytes", report.reply_bytes);
    if !report.reply.is_empty() {
        println!("{}", report.reply.trim_end());
    }
}
