use std::fmt;

use anyhow::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodedErrorKind {
    /// Bad invocation: missing input file or renderer. The usage line is printed.
    Usage,
    /// The configuration file or one of its sections could not be resolved.
    Config,
}

#[derive(Debug, Clone)]
pub struct CodedError {
    pub code: &'static str,
    pub message: String,
    pub kind: CodedErrorKind,
}

impl CodedError {
    pub fn usage(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            kind: CodedErrorKind::Usage,
        }
    }

    pub fn config(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            kind: CodedErrorKind::Config,
        }
    }

    pub fn prints_usage(&self) -> bool {
        match self.kind {
            CodedErrorKind::Usage => true,
            CodedErrorKind::Config => self.code == CONFIG_SECTION_MISSING,
        }
    }
}

pub const INPUT_NOT_FOUND: &str = "input_not_found";
pub const RENDERER_NOT_FOUND: &str = "renderer_not_found";
pub const CONFIG_FILE_MISSING: &str = "config_file_missing";
pub const CONFIG_SECTION_MISSING: &str = "config_section_missing";
pub const CONFIG_INVALID: &str = "config_invalid";

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CodedError {}

pub fn find_coded_error(error: &Error) -> Option<&CodedError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CodedError>())
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;

    #[test]
    fn coded_error_is_found_through_context_layers() {
        let result: anyhow::Result<()> =
            Err(CodedError::usage(INPUT_NOT_FOUND, "File a.flam3 not found.").into());
        let error = result.context("failed loading batch").unwrap_err();

        let coded = find_coded_error(&error).expect("coded error should be in chain");
        assert_eq!(coded.code, INPUT_NOT_FOUND);
        assert!(coded.prints_usage());
    }

    #[test]
    fn only_missing_sections_print_usage_among_config_errors() {
        assert!(CodedError::config(CONFIG_SECTION_MISSING, "x").prints_usage());
        assert!(!CodedError::config(CONFIG_INVALID, "x").prints_usage());
    }
}
