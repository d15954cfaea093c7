#[macro_use]
mod logging;

pub mod console;
pub mod io;
pub mod mining;
pub mod settings;

pub use logging::{init_file_logging, stop_file_logging};

/// Run the interactive console. Returns the process exit code.
///
/// The first command-line argument, if any, overrides the configured port.
pub fn run() -> i32 {
    let settings = match settings::load_settings() {
        Ok(s) => s,
        Err(e) => {
            tlog!("[settings] {}; using defaults", e);
            settings::AppSettings::default()
        }
    };

    if settings.file_logging {
        match settings.log_path() {
            Some(dir) => {
                if let Err(e) = init_file_logging(&dir) {
                    tlog!("[logging] {}; continuing without a log file", e);
                }
            }
            None => tlog!("[logging] No log directory available; file logging disabled"),
        }
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tlog!("[kalesp] Failed to start runtime: {}", e);
            return 1;
        }
    };

    let port = std::env::args().nth(1);
    let result = runtime.block_on(console::run_console(settings, port));
    stop_file_logging();

    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {}", e);
            1
        }
    }
}
