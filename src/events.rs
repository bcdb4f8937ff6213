use std::sync::OnceLock;

use regex::Regex;

/// One classified line of renderer output.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// `strip = N/M`: a new strip started.
    StripUpdate { strip: u32, strips: u32 },
    /// `chaos:` plus whitespace, with an optional `NN.N%` percentage.
    ChaosProgress(Option<f64>),
    /// Known chatter that carries no progress.
    Ignorable,
    /// Anything unrecognized; shown to the user verbatim.
    Diagnostic(String),
}

impl ProgressEvent {
    pub fn triggers_redraw(&self) -> bool {
        matches!(
            self,
            ProgressEvent::StripUpdate { .. } | ProgressEvent::ChaosProgress(_)
        )
    }
}

const IGNORED_PREFIXES: [&str; 5] = [
    "density estimation: ",
    "filtering...",
    "writing ",
    "done.",
    "total time =",
];

pub fn classify(line: &str) -> ProgressEvent {
    if line.is_empty() {
        return ProgressEvent::Ignorable;
    }

    if let Some(event) = parse_strip(line) {
        return event;
    }

    if let Some(event) = parse_chaos(line) {
        return event;
    }

    if IGNORED_PREFIXES
        .iter()
        .any(|prefix| line.starts_with(prefix))
    {
        return ProgressEvent::Ignorable;
    }

    ProgressEvent::Diagnostic(line.to_owned())
}

fn parse_strip(line: &str) -> Option<ProgressEvent> {
    static STRIP_RE: OnceLock<Regex> = OnceLock::new();
    let re = STRIP_RE
        .get_or_init(|| Regex::new(r"^strip = (\d+)/(\d+)").expect("strip regex should compile"));
    let capture = re.captures(line)?;
    let strip = capture.get(1)?.as_str().parse::<u32>().ok()?;
    let strips = capture.get(2)?.as_str().parse::<u32>().ok()?;
    Some(ProgressEvent::StripUpdate { strip, strips })
}

fn parse_chaos(line: &str) -> Option<ProgressEvent> {
    static CHAOS_RE: OnceLock<Regex> = OnceLock::new();
    let re = CHAOS_RE.get_or_init(|| {
        Regex::new(r"^chaos:\s+(?:(\d+\.\d)%)?").expect("chaos regex should compile")
    });
    let capture = re.captures(line)?;
    let percent = capture
        .get(1)
        .and_then(|value| value.as_str().parse::<f64>().ok());
    Some(ProgressEvent::ChaosProgress(percent))
}
