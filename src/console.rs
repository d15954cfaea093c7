// src/console.rs
//
// Interactive console: reads commands from stdin, prints device lines and
// session events. `quit`, `ports` and `state` are handled locally.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::io::{list_serial_ports, Command, ProtocolEvent, Session, SessionEvent};
use crate::mining::{verify_nonce, DeviceState};
use crate::settings::AppSettings;

const HELP: &str = "Commands: help, info, reset, mine, mine stop, zeros N, entropy N, hash [sha256|keccak256]\n\
Console: ports, state, quit. Anything else is sent as typed.";

/// Pick the configured port, else the first one the OS reports
fn resolve_port(settings: &AppSettings, override_port: Option<String>) -> Result<String, String> {
    if let Some(port) = override_port.or_else(|| settings.port.clone()) {
        return Ok(port);
    }
    let ports = list_serial_ports().map_err(|e| e.to_string())?;
    ports
        .into_iter()
        .next()
        .map(|p| p.port_name)
        .ok_or_else(|| "No serial ports found; set `port` in settings.json".to_string())
}

pub async fn run_console(settings: AppSettings, override_port: Option<String>) -> Result<(), String> {
    let port = resolve_port(&settings, override_port)?;
    let config = settings.connection_config(port);

    let (ended_tx, mut ended_rx) = mpsc::unbounded_channel::<String>();
    let mut session = Session::new(move |event: SessionEvent| {
        if let Some(text) = describe_event(&event) {
            println!("{}", text);
        }
        if let SessionEvent::Ended { reason } = event {
            let _ = ended_tx.send(reason);
        }
    });

    session
        .connect(config.clone())
        .await
        .map_err(|e| e.to_string())?;
    println!("Connected to {} ({})", config.port(), config.line_summary());
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let input = tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tlog!("[console] stdin error: {}", e);
                    break;
                }
            },
            Some(_) = ended_rx.recv() => {
                // The monitor already reported why
                break;
            }
        };

        let input = input.trim();
        match input.to_ascii_lowercase().as_str() {
            "" => continue,
            "quit" | "exit" => break,
            "ports" => {
                print_ports();
                continue;
            }
            "state" => {
                println!("{}", describe_state(&session.device_state()));
                continue;
            }
            _ => {}
        }

        let result = match Command::parse(input) {
            Ok(command) => session.send(&command).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            println!("! {}", e);
        }
    }

    session.disconnect().await.map_err(|e| e.to_string())
}

fn print_ports() {
    match list_serial_ports() {
        Ok(ports) if ports.is_empty() => println!("No serial ports found"),
        Ok(ports) => {
            for p in ports {
                match (p.vid, p.pid) {
                    (Some(vid), Some(pid)) => println!(
                        "{}  {} {:04x}:{:04x} {}",
                        p.port_name,
                        p.port_type,
                        vid,
                        pid,
                        p.product.unwrap_or_default()
                    ),
                    _ => println!("{}  {}", p.port_name, p.port_type),
                }
            }
        }
        Err(e) => println!("! {}", e),
    }
}

pub fn describe_state(state: &DeviceState) -> String {
    let algorithm = state
        .hash_algorithm
        .map(|a| a.display_name())
        .unwrap_or("unknown");
    let nonce = if state.last_nonce < 0 {
        "none".to_string()
    } else {
        state.last_nonce.to_string()
    };
    format!(
        "zeros={} entropy={} last_nonce={} mining={} hash={}",
        state.zeros, state.entropy, nonce, state.is_mining, algorithm
    )
}

/// Console rendering of a session event. `None` for events not worth a line.
pub fn describe_event(event: &SessionEvent) -> Option<String> {
    let text = match event {
        SessionEvent::Line(line) => match &line.event {
            ProtocolEvent::Unclassified(_) => format!("< {}", line.raw),
            ProtocolEvent::MiningResult(Some(nonce)) => {
                let algorithm = line.state.hash_algorithm.unwrap_or_default();
                let verdict =
                    match verify_nonce(algorithm, line.state.zeros, line.state.entropy, *nonce) {
                        Some(true) => "verified",
                        Some(false) => "does not verify",
                        None => "unverifiable",
                    };
                format!(
                    "< {}  [nonce {} {} with {}]",
                    line.raw,
                    nonce,
                    verdict,
                    algorithm.display_name()
                )
            }
            other if line.delta.is_empty() => format!("< {}  [{}]", line.raw, other.name()),
            other => format!(
                "< {}  [{}] {}",
                line.raw,
                other.name(),
                describe_state(&line.state)
            ),
        },
        SessionEvent::Sent { line, .. } => format!("> {}", line),
        SessionEvent::MiningStopped { .. } => "* mining stopped (local only, device not notified)".to_string(),
        SessionEvent::StateChanged(change) => format!("* link {} -> {}", change.previous, change.current),
        SessionEvent::Error(e) => format!("! {} error: {}", e.kind, e.message),
        SessionEvent::Ended { reason } if reason == "stopped" => return None,
        SessionEvent::Ended { reason } => format!("* session ended ({})", reason),
    };
    Some(text)
}
