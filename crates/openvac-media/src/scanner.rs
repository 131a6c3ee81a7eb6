//! Classification of conversion tool output.
//!
//! The tool prints free-form diagnostics on stdout. Only two lines carry
//! protocol state:
//!
//! - `Extracted <N> frames` once source frames are on disk
//! - `Converting frame <X>/<Y>` during the rasterization pass
//!
//! Everything else is unrecognized and only logged.

use std::sync::LazyLock;

use regex::Regex;

static EXTRACTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Extracted (\d+) frames").expect("valid regex"));

static CONVERTING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Converting frame (\d+)/(\d+)").expect("valid regex"));

/// A classified output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannedLine {
    /// Total number of frames extracted from the source
    Extracting { total: u64 },
    /// Rasterization progress
    Progress { current: u64, total: u64 },
    /// Anything else
    Unrecognized,
}

/// Turns raw tool output lines into protocol state.
///
/// Kept behind a trait so a change in the tool's output format only touches
/// the scanner.
pub trait LineScanner: Send + Sync {
    fn scan(&self, line: &str) -> ScannedLine;
}

/// Scanner for the stock conversion tool's markers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerScanner;

impl LineScanner for MarkerScanner {
    fn scan(&self, line: &str) -> ScannedLine {
        if let Some(caps) = EXTRACTED_RE.captures(line) {
            if let Ok(total) = caps[1].parse() {
                return ScannedLine::Extracting { total };
            }
        }

        if let Some(caps) = CONVERTING_RE.captures(line) {
            if let (Ok(current), Ok(total)) = (caps[1].parse(), caps[2].parse()) {
                return ScannedLine::Progress { current, total };
            }
        }

        ScannedLine::Unrecognized
    }
}

/// Split a raw output chunk into logical lines.
///
/// Tools that redraw a progress line use bare carriage returns, so `\r` is
/// treated as a line break as well. Invalid UTF-8 is replaced.
pub fn split_lines(raw: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(raw)
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracted_marker() {
        let scanner = MarkerScanner;
        assert_eq!(
            scanner.scan("Extracted 120 frames"),
            ScannedLine::Extracting { total: 120 }
        );
        assert_eq!(
            scanner.scan("[openvac] Extracted 7 frames from input.mp4"),
            ScannedLine::Extracting { total: 7 }
        );
    }

    #[test]
    fn test_converting_marker() {
        let scanner = MarkerScanner;
        assert_eq!(
            scanner.scan("Converting frame 3/120"),
            ScannedLine::Progress {
                current: 3,
                total: 120
            }
        );
    }

    #[test]
    fn test_unrecognized_lines() {
        let scanner = MarkerScanner;
        assert_eq!(scanner.scan("ffmpeg version 6.1"), ScannedLine::Unrecognized);
        assert_eq!(scanner.scan("Extracted frames"), ScannedLine::Unrecognized);
        assert_eq!(scanner.scan("Converting frame x/10"), ScannedLine::Unrecognized);
        assert_eq!(
            scanner.scan("Extracted 99999999999999999999999 frames"),
            ScannedLine::Unrecognized
        );
    }

    #[test]
    fn test_split_lines() {
        let lines = split_lines(b"Converting frame 1/2\rConverting frame 2/2\r\n\nDone\n");
        assert_eq!(
            lines,
            vec!["Converting frame 1/2", "Converting frame 2/2", "Done"]
        );

        let lossy = split_lines(b"bad \xff byte\n");
        assert_eq!(lossy.len(), 1);
        assert!(lossy[0].starts_with("bad"));
    }
}
