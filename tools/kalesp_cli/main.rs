// tools/kalesp_cli/main.rs
//
// Scripted access to a KaleSP miner: list ports, run a batch of commands
// against a board, or classify captured lines offline.

use clap::{Parser, Subcommand};
use std::time::Duration;

use kalesp_host_lib::console::{describe_event, describe_state};
use kalesp_host_lib::io::miner::classify_line;
use kalesp_host_lib::io::{list_serial_ports, Command, ConnectionConfig, Session, SessionEvent};
use kalesp_host_lib::mining::DeviceState;
use kalesp_host_lib::settings;

#[derive(Parser, Debug)]
#[command(name = "kalesp_cli", version, about = "KaleSP miner serial client")]
struct Args {
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// List serial ports
    Ports {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Connect, send each command in order, print what the device answers
    Run {
        /// Serial device path (e.g. /dev/ttyUSB0, COM3)
        #[arg(short, long)]
        port: String,

        #[arg(short, long, default_value_t = 115_200)]
        baud: u32,

        /// Read timeout in milliseconds
        #[arg(long, default_value_t = 100)]
        timeout_ms: u64,

        /// How long to listen after each command
        #[arg(long, default_value_t = 1000)]
        wait_ms: u64,

        /// Print events as JSON lines
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Commands in console syntax, e.g. "zeros 2" "mine"
        commands: Vec<String>,
    },
    /// Show the settings file path and effective settings
    Settings {
        /// Write the defaults if no settings file exists yet
        #[arg(long, default_value_t = false)]
        init: bool,
    },
    /// Classify lines offline and print the resulting device state
    Classify {
        #[arg(long, default_value_t = false)]
        json: bool,

        lines: Vec<String>,
    },
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("error: failed to serialize: {}", e),
    }
}

async fn run(
    config: ConnectionConfig,
    commands: Vec<String>,
    wait: Duration,
    json: bool,
) -> Result<(), String> {
    // Validate everything before touching the device
    let commands = commands
        .iter()
        .map(|c| Command::parse(c).map_err(|e| format!("'{}': {}", c, e)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut session = Session::new(move |event: SessionEvent| {
        if json {
            print_json(&event);
        } else if let Some(text) = describe_event(&event) {
            println!("{}", text);
        }
    });
    session.connect(config).await.map_err(|e| e.to_string())?;

    // Give the board a moment to print its banner
    tokio::time::sleep(wait).await;

    let mut result = Ok(());
    for command in &commands {
        if let Err(e) = session.send(command).await {
            result = Err(e.to_string());
            break;
        }
        tokio::time::sleep(wait).await;
    }

    session.disconnect().await.map_err(|e| e.to_string())?;
    if !json {
        println!("{}", describe_state(&session.device_state()));
    }
    result
}

fn show_settings(init: bool) -> Result<(), String> {
    let path = settings::settings_path().map_err(|e| e.to_string())?;
    let current = settings::load_settings_from(&path).map_err(|e| e.to_string())?;

    if init && !path.exists() {
        settings::save_settings_to(&path, &current).map_err(|e| e.to_string())?;
        println!("wrote defaults to {}", path.display());
    } else {
        println!("{}", path.display());
    }
    print_json(&current);
    Ok(())
}

fn main() {
    let args = Args::parse();

    let outcome = match args.action {
        Action::Ports { json } => list_serial_ports()
            .map(|ports| {
                if json {
                    print_json(&ports);
                } else {
                    for p in ports {
                        println!("{}\t{}", p.port_name, p.port_type);
                    }
                }
            })
            .map_err(|e| e.to_string()),
        Action::Run {
            port,
            baud,
            timeout_ms,
            wait_ms,
            json,
            commands,
        } => {
            let config = ConnectionConfig::new(port)
                .with_baud_rate(baud)
                .with_read_timeout(Duration::from_millis(timeout_ms));
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|e| e.to_string())
                .and_then(|rt| rt.block_on(run(config, commands, Duration::from_millis(wait_ms), json)))
        }
        Action::Settings { init } => show_settings(init),
        Action::Classify { json, lines } => {
            let events: Vec<_> = lines.iter().map(|l| classify_line(l)).collect();
            let state = DeviceState::fold(&events);
            if json {
                print_json(&serde_json::json!({ "events": events, "state": state }));
            } else {
                for (line, event) in lines.iter().zip(&events) {
                    println!("{}\t{}", event.name(), line);
                }
                println!("{}", describe_state(&state));
            }
            Ok(())
        }
    };

    if let Err(e) = outcome {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
