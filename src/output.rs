//! Terminal output of records and filter statistics

use crossterm::queue;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use std::io::{self, Write};
use std::sync::Arc;

use logsift_logs::{FilterSpec, LogRecord, Rgb, StreamKind};

fn to_color(rgb: Rgb) -> Color {
    Color::Rgb {
        r: rgb.r,
        g: rgb.g,
        b: rgb.b,
    }
}

/// Writes records, coloured by the filter that matched them
pub struct Printer<W: Write> {
    out: W,
    color: bool,
}

impl<W: Write> Printer<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    /// One record per line; matched records in their filter's colour
    pub fn print_records(&mut self, records: &[Arc<LogRecord>]) -> io::Result<()> {
        for record in records {
            match record.matched_filter() {
                Some(filter) if self.color => {
                    queue!(
                        self.out,
                        SetForegroundColor(to_color(filter.color())),
                        Print(record.text()),
                        ResetColor,
                        Print("\n")
                    )?;
                }
                _ => writeln!(self.out, "{}", record.text())?,
            }
        }
        self.out.flush()
    }

    /// Per-filter match totals over the allowed streams
    pub fn print_summary(&mut self, filters: &[Arc<FilterSpec>]) -> io::Result<()> {
        let width = filters.iter().map(|f| f.name().len()).max().unwrap_or(0);
        for filter in filters {
            let info = filter.temporary_info();
            let streams: Vec<String> = StreamKind::ALL
                .into_iter()
                .filter(|&s| info.line_count(s) > 0)
                .map(|s| format!("{}={}", s.word(), info.line_count(s)))
                .collect();

            if self.color {
                queue!(
                    self.out,
                    SetForegroundColor(to_color(filter.color())),
                    Print(format!("{:<width$}", filter.name())),
                    ResetColor
                )?;
            } else {
                write!(self.out, "{:<width$}", filter.name())?;
            }
            write!(self.out, " {:>8}", info.total_lines_found())?;
            if !streams.is_empty() {
                write!(self.out, "  ({})", streams.join(", "))?;
            }
            if let Some(error) = filter.pattern_error() {
                write!(self.out, "  [invalid pattern: {}]", error.lines().last().unwrap_or(error))?;
            }
            writeln!(self.out)?;
        }
        self.out.flush()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}
