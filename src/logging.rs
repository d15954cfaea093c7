use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Stable name pointing at the newest log file
const LATEST_LINK: &str = "kalesp.log";

/// Open session log, if any. `tlog!` appends every line it prints here too.
pub(crate) static LOG_FILE: Mutex<Option<std::fs::File>> = Mutex::new(None);

/// Start mirroring `tlog!` output to a new timestamped file in `log_dir`.
/// Also points a `kalesp.log` symlink at it (Unix only). Returns the file path.
pub fn init_file_logging(log_dir: &Path) -> Result<PathBuf, String> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| format!("Failed to create log dir: {}", e))?;

    let filename = chrono::Local::now()
        .format("%Y%m%d-%H%M%S-kalesp.log")
        .to_string();
    let log_path = log_dir.join(&filename);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| format!("Failed to create log file: {}", e))?;

    // Windows symlinks require elevated privileges
    #[cfg(unix)]
    {
        let symlink_path = log_dir.join(LATEST_LINK);
        let _ = std::fs::remove_file(&symlink_path);
        if let Err(e) = std::os::unix::fs::symlink(&filename, &symlink_path) {
            eprintln!(
                "{} [logging] Failed to link {}: {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                LATEST_LINK,
                e
            );
        }
    }

    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }

    // eprintln directly: tlog! would lock LOG_FILE again
    eprintln!(
        "{} [logging] File logging started: {}",
        chrono::Local::now().format("%H:%M:%S%.3f"),
        log_path.display()
    );

    Ok(log_path)
}

/// Close the session log; later `tlog!` lines go to stderr only
pub fn stop_file_logging() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if guard.is_some() {
            *guard = None;
            eprintln!(
                "{} [logging] File logging stopped",
                chrono::Local::now().format("%H:%M:%S%.3f")
            );
        }
    }
}

/// `eprintln!` with a local `HH:MM:SS.mmm` prefix, mirrored into the session
/// log while one is open. Messages start with a `[component]` tag.
macro_rules! tlog {
    ($($arg:tt)*) => {{
        use std::io::Write as _;
        let msg = format!("{} {}", chrono::Local::now().format("%H:%M:%S%.3f"), format_args!($($arg)*));
        eprintln!("{}", msg);
        if let Ok(mut guard) = $crate::logging::LOG_FILE.lock() {
            if let Some(ref mut f) = *guard {
                let _ = writeln!(f, "{}", msg);
            }
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_logging_writes_lines() {
        let dir = std::env::temp_dir().join(format!("kalesp-logging-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let path = init_file_logging(&dir).unwrap();
        tlog!("[test] hello {}", 42);
        stop_file_logging();
        assert!(path.starts_with(&dir));

        let logs: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.ends_with("-kalesp.log"))
                    .unwrap_or(false)
            })
            .collect();
        assert_eq!(logs.len(), 1);
        let content = std::fs::read_to_string(&logs[0]).unwrap();
        assert!(content.contains("[test] hello 42"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
