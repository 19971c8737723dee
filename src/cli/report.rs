//! Result reporting
//!
//! Renders a fetched info dictionary as a human-readable summary or JSON.

use crate::torrent::MetadataResult;
use serde::Serialize;
use std::io::{self, Write};
use std::time::Duration;

/// Format a byte count using binary units
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format a duration as seconds with millisecond precision
pub fn format_elapsed(duration: Duration) -> String {
    format!("{:.3}s", duration.as_secs_f64())
}

#[derive(Serialize)]
struct JsonReport<'a> {
    peer: &'a str,
    elapsed_ms: u128,
    total_size: u64,
    piece_count: usize,
    #[serde(flatten)]
    metadata: &'a MetadataResult,
}

/// Writes fetch results to an output stream
pub struct Report<W: Write> {
    out: W,
    quiet: bool,
}

impl Report<io::Stdout> {
    pub fn stdout(quiet: bool) -> Self {
        Self::new(io::stdout(), quiet)
    }
}

impl<W: Write> Report<W> {
    pub fn new(out: W, quiet: bool) -> Self {
        Self { out, quiet }
    }

    /// Print the summary of a successful fetch
    pub fn print_summary(&mut self, result: &MetadataResult, peer: &str, elapsed: Duration) -> io::Result<()> {
        if self.quiet {
            return writeln!(self.out, "{}", result.name);
        }

        writeln!(self.out, "Metadata fetched from {} in {}", peer, format_elapsed(elapsed))?;
        writeln!(self.out, "  Name: {}", result.name)?;
        writeln!(self.out, "  Info hash: {}", result.info_hash_hex())?;
        writeln!(
            self.out,
            "  Size: {} ({})",
            result.total_size(),
            format_bytes(result.total_size())
        )?;
        if let Some(piece_length) = result.piece_length {
            writeln!(
                self.out,
                "  Pieces: {} x {}",
                result.piece_count(),
                format_bytes(piece_length)
            )?;
        }

        if result.is_multi_file() {
            writeln!(self.out, "  Files ({}):", result.file_count())?;
            for file in result.files_iter() {
                writeln!(self.out, "    {} ({})", file.display_path(), format_bytes(file.length))?;
            }
        }
        Ok(())
    }

    /// Print the result as a single JSON document
    pub fn print_json(&mut self, result: &MetadataResult, peer: &str, elapsed: Duration) -> io::Result<()> {
        let report = JsonReport {
            peer,
            elapsed_ms: elapsed.as_millis(),
            total_size: result.total_size(),
            piece_count: result.piece_count(),
            metadata: result,
        };
        serde_json::to_writer_pretty(&mut self.out, &report)?;
        writeln!(self.out)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Print an error message to stderr
pub fn print_error(message: &str) {
    eprintln!("Error: {}", message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent::MetadataFile;

    fn multi_file() -> MetadataResult {
        MetadataResult {
            info_hash: [0xab; 20],
            name: "album".to_string(),
            length: None,
            piece_length: Some(16384),
            files: vec![
                MetadataFile { path: vec!["cd1".to_string(), "01.flac".to_string()], length: 3000 },
                MetadataFile { path: vec!["cover.jpg".to_string()], length: 2048 },
            ],
            pieces: vec![0u8; 20],
        }
    }

    fn render<F>(quiet: bool, f: F) -> String
    where
        F: FnOnce(&mut Report<Vec<u8>>) -> io::Result<()>,
    {
        let mut report = Report::new(Vec::new(), quiet);
        f(&mut report).unwrap();
        String::from_utf8(report.into_inner()).unwrap()
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(1250)), "1.250s");
    }

    #[test]
    fn test_summary_lists_files() {
        let result = multi_file();
        let text = render(false, |r| r.print_summary(&result, "10.0.0.1:6881", Duration::from_secs(1)));

        assert!(text.contains("Name: album"));
        assert!(text.contains(&"ab".repeat(20)));
        assert!(text.contains("Size: 5048"));
        assert!(text.contains("Files (2):"));
        assert!(text.contains("cd1/01.flac"));
    }

    #[test]
    fn test_quiet_summary() {
        let result = multi_file();
        let text = render(true, |r| r.print_summary(&result, "peer", Duration::ZERO));
        assert_eq!(text, "album\n");
    }

    #[test]
    fn test_json_report() {
        let result = multi_file();
        let text = render(false, |r| r.print_json(&result, "10.0.0.1:6881", Duration::from_millis(42)));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["peer"], "10.0.0.1:6881");
        assert_eq!(value["elapsed_ms"], 42);
        assert_eq!(value["total_size"], 5048);
        assert_eq!(value["name"], "album");
        assert_eq!(value["info_hash"], "ab".repeat(20));
        assert_eq!(value["files"][1]["path"][0], "cover.jpg");
        assert!(value.get("pieces").is_none());
    }
}
