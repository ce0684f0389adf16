use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const CONFIG_LOG: &str = "logs/config.log";
pub const CHECK_LOG: &str = "logs/check.log";

fn timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&Rfc3339).unwrap_or_default()
}

/// Appends one timestamped line. Logging never fails the caller.
pub fn log_line<P: AsRef<Path>>(path: P, line: &str) {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{} {line}", timestamp());
    }
}
