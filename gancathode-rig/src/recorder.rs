//! Append-only measurement log
//!
//! A log file starts with `#`-prefixed metadata lines and a tab-delimited
//! column line, followed by one line per tick. Every line is flushed before
//! the write returns, so a crash loses at most the tick in progress.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Local};
use tracing::info;

/// Tab-delimited log writer
#[derive(Debug)]
pub struct LogRecorder<W: Write> {
    out: W,
    lines: u64,
}

impl LogRecorder<BufWriter<File>> {
    /// Create (or truncate) a log file at `path`
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)?;
        info!(path = %path.display(), "log file created");
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> LogRecorder<W> {
    /// Record into `out`
    pub fn new(out: W) -> Self {
        Self { out, lines: 0 }
    }

    /// Write the metadata block and the column line
    ///
    /// Each line of `comment` and each entry of `notes` becomes its own
    /// `#` line.
    pub fn write_header(
        &mut self,
        start: &DateTime<Local>,
        comment: &str,
        notes: &[String],
        columns: &str,
    ) -> io::Result<()> {
        writeln!(self.out, "# Start: {}", start.format("%Y-%m-%d %H:%M:%S"))?;
        for line in comment.lines() {
            writeln!(self.out, "# Comment: {line}")?;
        }
        for note in notes {
            writeln!(self.out, "# {note}")?;
        }
        writeln!(self.out, "{columns}")?;
        self.out.flush()
    }

    /// Append one data line and flush it
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.out, "{line}")?;
        self.out.flush()?;
        self.lines += 1;
        Ok(())
    }

    /// Data lines written so far
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Unwrap the underlying writer
    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_header_and_lines() {
        let start = Local.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let mut rec = LogRecorder::new(Vec::new());

        rec.write_header(
            &start,
            "sample A\nsecond pass",
            &["Plan: 4 steps x1, 300 s".to_string()],
            "Time[s]\tValue",
        )
        .unwrap();
        rec.write_line("0.0\t1.0").unwrap();
        rec.write_line("10.0\t2.0").unwrap();
        assert_eq!(rec.lines(), 2);

        let text = String::from_utf8(rec.into_inner()).unwrap();
        assert_eq!(
            text,
            "# Start: 2024-03-01 09:30:00\n\
             # Comment: sample A\n\
             # Comment: second pass\n\
             # Plan: 4 steps x1, 300 s\n\
             Time[s]\tValue\n\
             0.0\t1.0\n\
             10.0\t2.0\n"
        );
    }

    #[test]
    fn test_create_file() {
        let path = std::env::temp_dir().join(format!("gancathode-rec-{}.log", std::process::id()));
        {
            let mut rec = LogRecorder::create(&path).unwrap();
            rec.write_line("1.0").unwrap();
        }
        // Flushed on every line, readable without closing the recorder first
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "1.0\n");
        let _ = std::fs::remove_file(&path);
    }
}
