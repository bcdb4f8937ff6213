use std::io::{self, BufReader, ErrorKind, PipeReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use tracing::{debug, warn};

use crate::display::TerminalDisplay;
use crate::events::{classify, ProgressEvent};
use crate::flame::FlameDescriptor;
use crate::options::RenderOptions;
use crate::progress::ProgressTracker;
use crate::resize::resize;
use crate::tokenizer::LogicalLines;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Renders flames one at a time through a resolved `flam3-render` binary.
pub struct RenderSession<'a> {
    renderer: &'a Path,
    options: &'a RenderOptions,
}

impl<'a> RenderSession<'a> {
    pub fn new(renderer: &'a Path, options: &'a RenderOptions) -> Self {
        Self { renderer, options }
    }

    /// Renders one flame to `output_path`, drawing progress to `out`.
    ///
    /// The renderer's exit status is returned as-is; a non-zero status is
    /// logged but not treated as an error.
    pub fn run<W: Write>(
        &self,
        descriptor: &FlameDescriptor,
        output_path: &Path,
        out: W,
    ) -> Result<ExitStatus> {
        let job = prepare_job(descriptor, self.options)?;
        let document = job.to_document()?;

        let started = Local::now();
        let mut display = TerminalDisplay::new(out, output_path.display().to_string());
        display
            .start(started)
            .context("failed to draw progress bar")?;

        let (mut process, output) = self.spawn(output_path)?;
        let watchdog = match self.options.timeout {
            Some(timeout) => Some(Watchdog::arm(process.handle(), timeout)?),
            None => None,
        };

        // A renderer that exits early closes its stdin; its output still explains why.
        let written = process.write_descriptor(&document);
        if let Err(error) = &written {
            debug!(error = %format!("{error:#}"), "renderer stopped reading its input");
        }

        let mut tracker = ProgressTracker::new(started);
        for line in LogicalLines::new(BufReader::new(output)) {
            let line = line.context("failed reading renderer output")?;
            let event = classify(&line);
            if let ProgressEvent::Diagnostic(text) = &event {
                display
                    .diagnostic(text)
                    .context("failed to print renderer diagnostic")?;
            }
            if tracker.apply(&event) {
                display
                    .redraw(tracker.state(), tracker.eta(Local::now()))
                    .context("failed to draw progress bar")?;
            }
        }

        let status = process.wait();
        let timed_out = watchdog.is_some_and(Watchdog::disarm);
        let status = status?;
        if timed_out {
            let timeout = self.options.timeout.unwrap_or_default();
            bail!(
                "renderer did not finish within {} seconds and was killed",
                timeout.as_secs()
            );
        }
        written.context("renderer exited before reading the whole flame")?;
        if !status.success() {
            warn!(%status, output = %output_path.display(), "renderer exited unsuccessfully");
        }

        display
            .end(Local::now())
            .context("failed to draw completion line")?;
        Ok(status)
    }

    fn spawn(&self, output_path: &Path) -> Result<(RendererProcess, PipeReader)> {
        let (reader, writer) = io::pipe().context("failed to create renderer output pipe")?;

        let mut command = Command::new(self.renderer);
        command
            .stdin(Stdio::piped())
            .stdout(
                writer
                    .try_clone()
                    .context("failed to duplicate renderer output pipe")?,
            )
            .stderr(writer);
        for (key, value) in self.options.environment(output_path) {
            match value {
                Some(value) => {
                    debug!(key, value = %value, "renderer environment");
                    command.env(key, value);
                }
                None => {
                    command.env_remove(key);
                }
            }
        }

        let mut child = command.spawn().map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                anyhow!("renderer executable not found at {}", self.renderer.display())
            } else {
                anyhow!(
                    "failed to spawn renderer {}: {error}",
                    self.renderer.display()
                )
            }
        })?;
        // The command still owns our copies of the pipe's write end; the reader
        // only sees end-of-stream once they are closed.
        drop(command);
        debug!(pid = child.id(), "renderer started");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("failed to capture renderer stdin"))?;

        Ok((
            RendererProcess {
                child: Arc::new(Mutex::new(child)),
                stdin: Some(stdin),
                reaped: false,
            },
            reader,
        ))
    }
}

/// Clones `descriptor` and applies any requested resize to the copy.
pub fn prepare_job(descriptor: &FlameDescriptor, options: &RenderOptions) -> Result<FlameDescriptor> {
    let mut job = descriptor.clone();
    let request = options.resize_request();
    if !request.is_requested() {
        return Ok(job);
    }

    let label = descriptor.name().unwrap_or_else(|| "<unnamed>".to_owned());
    let original = job
        .geometry()
        .with_context(|| format!("cannot resize flame '{label}'"))?;
    if let Some(resized) = resize(original, &request) {
        debug!(
            flame = %label,
            from = %format!("{}x{}", original.width, original.height),
            to = %format!("{}x{}", resized.width, resized.height),
            scale = resized.scale,
            "resized flame"
        );
        job.set_geometry(resized)?;
    }
    Ok(job)
}

/// Owns the renderer child. Dropping it without [`RendererProcess::wait`]
/// kills and reaps the process.
struct RendererProcess {
    child: Arc<Mutex<Child>>,
    stdin: Option<ChildStdin>,
    reaped: bool,
}

impl RendererProcess {
    fn handle(&self) -> Arc<Mutex<Child>> {
        Arc::clone(&self.child)
    }

    /// Writes the whole document and closes stdin to mark its end.
    fn write_descriptor(&mut self, document: &[u8]) -> Result<()> {
        let mut stdin = self
            .stdin
            .take()
            .ok_or_else(|| anyhow!("renderer stdin already closed"))?;
        stdin
            .write_all(document)
            .context("failed to write flame to renderer stdin")?;
        stdin.flush().context("failed to flush renderer stdin")?;
        Ok(())
    }

    /// Polls for exit without holding the lock, so the watchdog can still kill.
    fn wait(mut self) -> Result<ExitStatus> {
        loop {
            let polled = self
                .child
                .lock()
                .map_err(|_| anyhow!("renderer process lock poisoned"))?
                .try_wait()
                .context("failed waiting for renderer process")?;
            if let Some(status) = polled {
                self.reaped = true;
                return Ok(status);
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }
}

impl Drop for RendererProcess {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if self.reaped {
            return;
        }
        if let Ok(mut child) = self.child.lock() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Kills the renderer if it is still running when the timeout expires.
struct Watchdog {
    cancel: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
    fired: Arc<AtomicBool>,
}

impl Watchdog {
    fn arm(child: Arc<Mutex<Child>>, timeout: Duration) -> Result<Self> {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        let worker = thread::Builder::new()
            .name("flamebatch-watchdog".to_owned())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = cancelled.recv_timeout(timeout) {
                    flag.store(true, Ordering::SeqCst);
                    if let Ok(mut child) = child.lock() {
                        if let Err(error) = child.kill() {
                            warn!(%error, "failed to kill timed-out renderer");
                        }
                    }
                }
            })
            .context("failed to spawn renderer watchdog thread")?;

        Ok(Self {
            cancel: Some(cancel),
            worker: Some(worker),
            fired,
        })
    }

    /// Stops the watchdog and reports whether it killed the renderer.
    fn disarm(mut self) -> bool {
        self.stop();
        self.fired.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        drop(self.cancel.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}
