use std::io::{self, Write};

use chrono::{DateTime, Local, TimeDelta};

use crate::progress::{format_eta, ProgressState};

pub const BAR_WIDTH: usize = 50;

/// Single-line terminal progress bar for one render.
///
/// Every frame starts with `\r` and overwrites the previous one, padded to the
/// widest frame so shorter frames leave no residue. Only
/// [`TerminalDisplay::end`] and diagnostics emit newlines. The bar fill tracks
/// overall progress; the percentage is the current strip's progress.
pub struct TerminalDisplay<W: Write> {
    out: W,
    label: String,
    bar_width: usize,
    started: Option<DateTime<Local>>,
    widest_frame: usize,
    on_bar_line: bool,
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W, label: impl Into<String>) -> Self {
        Self::with_bar_width(out, label, BAR_WIDTH)
    }

    pub fn with_bar_width(out: W, label: impl Into<String>, bar_width: usize) -> Self {
        Self {
            out,
            label: label.into(),
            bar_width,
            started: None,
            widest_frame: 0,
            on_bar_line: false,
        }
    }

    pub fn start(&mut self, now: DateTime<Local>) -> io::Result<()> {
        self.started = Some(now);
        let frame = format!("{}: 1/1 [{}]", self.label, " ".repeat(self.bar_width));
        self.write_frame(&frame, false)
    }

    pub fn redraw(&mut self, state: &ProgressState, eta: Option<TimeDelta>) -> io::Result<()> {
        let filled = filled_cells(self.bar_width, state.overall());
        let mut frame = format!(
            "{}: {}/{} [{}{}] {:5.1}%",
            self.label,
            state.strip(),
            state.strips(),
            "#".repeat(filled),
            " ".repeat(self.bar_width - filled),
            state.sub_progress()
        );
        if let Some(eta) = eta {
            frame.push(' ');
            frame.push_str(&format_eta(eta));
        }
        self.write_frame(&frame, true)
    }

    /// Prints unrecognized renderer output on its own line below the bar.
    pub fn diagnostic(&mut self, text: &str) -> io::Result<()> {
        if self.on_bar_line {
            writeln!(self.out)?;
            self.on_bar_line = false;
        }
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }

    pub fn end(&mut self, now: DateTime<Local>) -> io::Result<()> {
        let elapsed = self
            .started
            .map(|started| now - started)
            .unwrap_or_else(TimeDelta::zero);
        let frame = format!("{}: complete in {}", self.label, elapsed_sentence(elapsed));
        let width = self.widest_frame.max(frame.chars().count());
        write!(self.out, "\r{frame:<width$}")?;
        writeln!(self.out)?;
        self.on_bar_line = false;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_frame(&mut self, frame: &str, overwrite: bool) -> io::Result<()> {
        self.widest_frame = self.widest_frame.max(frame.chars().count());
        if overwrite {
            let width = self.widest_frame;
            write!(self.out, "\r{frame:<width$}")?;
        } else {
            write!(self.out, "{frame}")?;
        }
        self.on_bar_line = true;
        self.out.flush()
    }
}

pub fn filled_cells(bar_width: usize, overall: f64) -> usize {
    let cells = (bar_width as f64 * overall / 100.0).floor();
    (cells.max(0.0) as usize).min(bar_width)
}

/// Human readable duration such as `2 hours 5 minutes 1 second`.
pub fn elapsed_sentence(elapsed: TimeDelta) -> String {
    let total = elapsed.num_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let mut sentence = String::new();
    for (count, noun) in [
        (days, "day"),
        (hours, "hour"),
        (minutes, "minute"),
        (seconds, "second"),
    ] {
        match count {
            0 => {}
            1 => sentence.push_str(&format!("1 {noun} ")),
            _ => sentence.push_str(&format!("{count} {noun}s ")),
        }
    }

    if sentence.is_empty() {
        return "less than a second".to_owned();
    }
    sentence.trim_end().to_owned()
}
