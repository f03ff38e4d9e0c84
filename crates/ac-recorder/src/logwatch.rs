//! Console log monitor
//!
//! The game appends to its console log while a demo plays and writes a
//! fixed marker line when playback ends. [`wait_for_marker`] tails the
//! file for that marker without ever reading the whole log: each poll
//! re-opens the file and scans at most the last KiB past the offset it
//! was started with.

use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const WINDOW_BYTES: u64 = 1024;

/// Wait until `marker` appears in `path` beyond `start_offset`.
///
/// Polls once a second. Never returns on its own if the marker does
/// not appear; callers that want a bound must impose one externally.
/// The recorder deliberately does not, since replay length is
/// unbounded. A file that does not exist yet simply has not been
/// written to; the poll keeps waiting for it.
pub async fn wait_for_marker(
    path: PathBuf,
    marker: &str,
    start_offset: u64,
) -> std::io::Result<()> {
    loop {
        if scan_once(&path, marker, start_offset)? {
            tracing::debug!("Found {marker:?} in {}", path.display());
            return Ok(());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// One bounded scan of the file's tail. Returns true if the marker was
/// found past the start offset.
fn scan_once(path: &std::path::Path, marker: &str, start_offset: u64) -> std::io::Result<bool> {
    let mut file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let len = file.metadata()?.len();
    if len <= start_offset {
        return Ok(false);
    }

    let window_start = start_offset.max(len.saturating_sub(WINDOW_BYTES));
    file.seek(SeekFrom::Start(window_start))?;

    let mut tail = Vec::with_capacity(WINDOW_BYTES as usize);
    file.take(WINDOW_BYTES).read_to_end(&mut tail)?;

    Ok(String::from_utf8_lossy(&tail).contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MARKER: &str = "Demo playback finished";

    #[tokio::test(start_paused = true)]
    async fn test_returns_once_marker_appears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.log");
        std::fs::write(&path, "CTFGameRules spawning\n").unwrap();
        let offset = std::fs::metadata(&path).unwrap().len();

        let monitor = tokio::spawn(wait_for_marker(path.clone(), MARKER, offset));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!monitor.is_finished());

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{MARKER}").unwrap();
        drop(file);

        tokio::time::timeout(Duration::from_secs(5), monitor)
            .await
            .expect("monitor should finish after the marker is written")
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_marker_before_start_offset_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.log");
        std::fs::write(&path, format!("{MARKER}\n")).unwrap();
        let offset = std::fs::metadata(&path).unwrap().len();

        let monitor = tokio::spawn(wait_for_marker(path.clone(), MARKER, offset));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!monitor.is_finished());
        monitor.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_file_keeps_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.log");

        let monitor = tokio::spawn(wait_for_marker(path.clone(), MARKER, 0));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!monitor.is_finished());

        std::fs::write(&path, format!("{MARKER}\n")).unwrap();
        tokio::time::timeout(Duration::from_secs(5), monitor)
            .await
            .expect("monitor should finish once the file appears")
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_scan_window_is_bounded_to_the_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.log");
        // Marker sits beyond the offset but more than 1 KiB from the
        // end, so a bounded tail read must not see it.
        let mut contents = format!("{MARKER}\n");
        contents.push_str(&"x".repeat(4096));
        std::fs::write(&path, &contents).unwrap();

        assert!(!scan_once(&path, MARKER, 0).unwrap());

        // Within the last KiB it is found.
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{MARKER}").unwrap();
        assert!(scan_once(&path, MARKER, 0).unwrap());
    }
}
