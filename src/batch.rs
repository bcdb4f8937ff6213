use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info_span, warn};

use crate::error_codes::{CodedError, INPUT_NOT_FOUND};
use crate::flame::FlameFile;
use crate::locate::locate_renderer;
use crate::options::RenderOptions;
use crate::session::RenderSession;

/// Loads every input file. Any missing file aborts the whole batch before
/// anything is rendered.
pub fn load_inputs(paths: &[PathBuf]) -> Result<Vec<FlameFile>> {
    if let Some(missing) = paths.iter().find(|path| !path.is_file()) {
        return Err(CodedError::usage(
            INPUT_NOT_FOUND,
            format!("File {} not found.", missing.display()),
        )
        .into());
    }

    paths.iter().map(|path| FlameFile::load(path)).collect()
}

/// Renders every flame of every file, strictly in order. Returns the output
/// paths that were produced.
pub fn render_batch<W: Write>(
    files: &[FlameFile],
    options: &RenderOptions,
    mut out: W,
) -> Result<Vec<PathBuf>> {
    let renderer = locate_renderer(options.renderer_dir.as_deref())?;
    let session = RenderSession::new(&renderer, options);
    let format = options.output_format();

    let mut rendered = Vec::new();
    for file in files {
        if file.flames.is_empty() {
            warn!(file = %file.path.display(), "no flame elements found, skipping");
            continue;
        }

        for (index, flame) in file.flames.iter().enumerate() {
            let output = file.output_path(index, format);
            let _span = info_span!("render", output = %output.display()).entered();
            session.run(flame, &output, &mut out).with_context(|| {
                format!(
                    "failed rendering flame {} of {}",
                    index + 1,
                    file.path.display()
                )
            })?;
            rendered.push(output);
        }
    }

    Ok(rendered)
}
