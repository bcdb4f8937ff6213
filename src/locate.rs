use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::error_codes::{CodedError, RENDERER_NOT_FOUND};

#[cfg(windows)]
pub const RENDERER_BINARY: &str = "flam3-render.exe";
#[cfg(not(windows))]
pub const RENDERER_BINARY: &str = "flam3-render";

/// Resolves the renderer executable from `renderer_dir` or the `PATH`.
pub fn locate_renderer(renderer_dir: Option<&Path>) -> Result<PathBuf> {
    let search_path = env::var_os("PATH");
    let found = locate_renderer_in(renderer_dir, search_path.as_deref());
    match found {
        Some(path) => {
            debug!(renderer = %path.display(), "resolved renderer executable");
            Ok(path)
        }
        None => Err(not_found().into()),
    }
}

fn not_found() -> CodedError {
    CodedError::usage(
        RENDERER_NOT_FOUND,
        format!("Unable to find {RENDERER_BINARY}; install it or pass --renderer-dir."),
    )
}

/// The explicit directory wins when it holds the binary. Otherwise every
/// `PATH` entry is checked and the last match is used.
pub fn locate_renderer_in(
    renderer_dir: Option<&Path>,
    search_path: Option<&OsStr>,
) -> Option<PathBuf> {
    if let Some(dir) = renderer_dir {
        let candidate = dir.join(RENDERER_BINARY);
        if candidate.is_file() {
            return Some(candidate);
        }
        debug!(dir = %dir.display(), "renderer not in --renderer-dir, searching PATH");
    }

    let search_path = search_path?;
    env::split_paths(search_path)
        .map(|dir| dir.join(RENDERER_BINARY))
        .filter(|candidate| candidate.is_file())
        .last()
}
