//! Reading files that other processes (IDEs, concurrent builds) may hold open.

use crate::config::RetryPolicy;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::thread;
use tracing::debug;

const BUFFER_SIZE: usize = 64 * 1024;
const UTF8_BOM: char = '\u{feff}';

/// Reads `path` as UTF-8, dropping a leading byte-order mark.
///
/// The file is opened read-only, so writers holding it with shared access do
/// not block the read.
pub fn read_to_string_shared(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    if text.starts_with(UTF8_BOM) {
        text.drain(..UTF8_BOM.len_utf8());
    }
    Ok(text)
}

/// [`read_to_string_shared`] with up to `retry.attempts` tries, sleeping
/// `retry.delay` in between. Missing files and invalid UTF-8 fail immediately.
pub fn read_to_string_shared_with_retry(path: &Path, retry: RetryPolicy) -> io::Result<String> {
    let attempts = retry.attempts.max(1);
    let mut attempt = 1;
    loop {
        match read_to_string_shared(path) {
            Err(e) if attempt < attempts && is_transient(&e) => {
                debug!(
                    path = %path.display(),
                    attempt,
                    error = %e,
                    "Read failed, retrying"
                );
                thread::sleep(retry.delay);
                attempt += 1;
            }
            result => return result,
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    !matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::InvalidData | io::ErrorKind::IsADirectory
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    #[test]
    fn strips_byte_order_mark() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.xaml");
        fs::write(&path, "\u{feff}<a/>").unwrap();
        assert_eq!(read_to_string_shared(&path).unwrap(), "<a/>");
    }

    #[test]
    fn missing_file_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let retry = RetryPolicy {
            attempts: 5,
            delay: Duration::from_secs(1),
        };
        let start = Instant::now();
        let err = read_to_string_shared_with_retry(&dir.path().join("missing.xaml"), retry).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bin.xaml");
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        let err = read_to_string_shared_with_retry(&path, RetryPolicy::default()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
