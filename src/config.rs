//! Layered INI configuration.
//!
//! Options come from three sources, highest priority first: the command line,
//! the section named by `--config`, and the `[default]` section. The first
//! source that sets a value wins.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use crate::error_codes::{
    CodedError, CONFIG_FILE_MISSING, CONFIG_INVALID, CONFIG_SECTION_MISSING,
};
use crate::options::{FixDimension, ImageFormat, RenderOptions};

pub const DEFAULT_SECTION: &str = "default";
const HOME_CONFIG_NAME: &str = ".flam3.ini";
const PROGRAM_CONFIG_NAME: &str = "flam3.ini";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("in config file {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        let mut current: Option<String> = None;

        for (index, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[') {
                let name = name.strip_suffix(']').ok_or_else(|| {
                    CodedError::config(
                        CONFIG_INVALID,
                        format!("line {}: unterminated section header '{line}'", index + 1),
                    )
                })?;
                let name = name.trim().to_owned();
                sections.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }

            let Some(section) = current.as_ref() else {
                return Err(CodedError::config(
                    CONFIG_INVALID,
                    format!("line {}: option outside of any section", index + 1),
                )
                .into());
            };

            let split_at = line.find(['=', ':']).ok_or_else(|| {
                CodedError::config(
                    CONFIG_INVALID,
                    format!("line {}: expected 'key = value', got '{line}'", index + 1),
                )
            })?;
            let key = line[..split_at].trim().to_ascii_lowercase();
            let value = line[split_at + 1..].trim().to_owned();
            sections
                .entry(section.clone())
                .or_default()
                .insert(key, value);
        }

        Ok(Self { sections })
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Options set by one section. A missing section yields empty options.
    pub fn section_options(&self, name: &str) -> Result<RenderOptions> {
        let mut options = RenderOptions::default();
        let Some(entries) = self.sections.get(name) else {
            return Ok(options);
        };
        for (key, value) in entries {
            apply_entry(&mut options, key, value).with_context(|| {
                format!("invalid value for '{key}' in section [{name}]")
            })?;
        }
        Ok(options)
    }
}

fn apply_entry(options: &mut RenderOptions, key: &str, value: &str) -> Result<()> {
    match key {
        "qs" => options.qs = Some(parse_positive_float(value)?),
        "ss" => options.ss = Some(parse_positive_float(value)?),
        "pixel_aspect" => options.pixel_aspect = Some(parse_positive_float(value)?),
        "format" => {
            options.format = Some(ImageFormat::parse(value).ok_or_else(|| {
                CodedError::config(CONFIG_INVALID, format!("unknown format '{value}'"))
            })?)
        }
        "bpc" => options.bpc = Some(parse_integer(value)?),
        "bits" => options.bits = Some(parse_integer(value)?),
        "transparency" => options.transparency = Some(parse_bool(value)?),
        "width" => options.width = Some(parse_dimension(value)?),
        "height" => options.height = Some(parse_dimension(value)?),
        "fix" => {
            options.fix = Some(FixDimension::parse(value).ok_or_else(|| {
                CodedError::config(
                    CONFIG_INVALID,
                    format!("fix must be 'width' or 'height', got '{value}'"),
                )
            })?)
        }
        "keepratio" => options.keepratio = Some(parse_bool(value)?),
        "renderer_dir" => options.renderer_dir = Some(PathBuf::from(value)),
        "timeout" => options.timeout = Some(Duration::from_secs(parse_integer(value)?.into())),
        other => debug!(key = other, "ignoring unknown config key"),
    }
    Ok(())
}

fn invalid(message: String) -> anyhow::Error {
    CodedError::config(CONFIG_INVALID, message).into()
}

fn parse_positive_float(value: &str) -> Result<f64> {
    match value.parse::<f64>() {
        Ok(number) if number.is_finite() && number > 0.0 => Ok(number),
        _ => Err(invalid(format!("expected a positive number, got '{value}'"))),
    }
}

fn parse_integer(value: &str) -> Result<u32> {
    value
        .parse::<u32>()
        .map_err(|_| invalid(format!("expected a non-negative integer, got '{value}'")))
}

fn parse_dimension(value: &str) -> Result<u32> {
    match parse_integer(value)? {
        0 => Err(invalid("dimensions must be at least 1".to_owned())),
        number => Ok(number),
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(format!("expected a boolean, got '{value}'"))),
    }
}

/// Finds the configuration file: the explicit path, then `~/.flam3.ini`, then
/// `flam3.ini` next to the executable.
pub fn locate_config(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    let program_dir = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    locate_config_in(explicit, dirs::home_dir().as_deref(), program_dir.as_deref())
}

pub fn locate_config_in(
    explicit: Option<&Path>,
    home: Option<&Path>,
    program_dir: Option<&Path>,
) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(CodedError::config(
                CONFIG_FILE_MISSING,
                format!("config file {} not found", path.display()),
            )
            .into());
        }
        return Ok(Some(path.to_path_buf()));
    }

    let candidates = [
        home.map(|home| home.join(HOME_CONFIG_NAME)),
        program_dir.map(|dir| dir.join(PROGRAM_CONFIG_NAME)),
    ];
    Ok(candidates.into_iter().flatten().find(|path| path.is_file()))
}

/// Merges the command-line options with the config file's sections.
pub fn resolve_options(
    cli: RenderOptions,
    config: Option<&ConfigFile>,
    section: Option<&str>,
) -> Result<RenderOptions> {
    let Some(config) = config else {
        if let Some(section) = section {
            return Err(CodedError::config(
                CONFIG_SECTION_MISSING,
                format!("configuration '{section}' requested but no config file was found"),
            )
            .into());
        }
        return Ok(cli);
    };

    let named = match section {
        Some(name) if !config.has_section(name) => {
            return Err(CodedError::config(
                CONFIG_SECTION_MISSING,
                format!("configuration '{name}' not found in config file"),
            )
            .into());
        }
        Some(name) => config.section_options(name)?,
        None => RenderOptions::default(),
    };
    let defaults = config.section_options(DEFAULT_SECTION)?;

    Ok(cli.or(named).or(defaults))
}

/// Locates, loads and merges configuration for `cli`.
pub fn load_options(
    cli: RenderOptions,
    config_path: Option<&Path>,
    section: Option<&str>,
) -> Result<RenderOptions> {
    let config = match locate_config(config_path)? {
        Some(path) => {
            debug!(path = %path.display(), "loading config file");
            Some(ConfigFile::load(&path)?)
        }
        None => None,
    };
    resolve_options(cli, config.as_ref(), section)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::error_codes::find_coded_error;

    const SAMPLE: &str = r#"
# flam3 defaults
[default]
qs = 1
format = jpg
bpc = 8
transparency = yes

[print]
QS: 4
width = 2400
keepratio = on
fix = height
mystery = 12
"#;

    #[test]
    fn parses_sections_and_keys_case_insensitively() {
        let config = ConfigFile::parse(SAMPLE).expect("parse");
        assert!(config.has_section("default"));
        assert!(config.has_section("print"));

        let print = config.section_options("print").expect("print");
        assert_eq!(print.qs, Some(4.0));
        assert_eq!(print.width, Some(2400));
        assert_eq!(print.keepratio, Some(true));
        assert_eq!(print.fix, Some(FixDimension::Height));
    }

    #[test]
    fn cli_beats_named_section_beats_default() {
        let config = ConfigFile::parse(SAMPLE).expect("parse");
        let cli = RenderOptions {
            bpc: Some(16),
            ..RenderOptions::default()
        };

        let merged = resolve_options(cli, Some(&config), Some("print")).expect("merge");
        assert_eq!(merged.bpc, Some(16));
        assert_eq!(merged.qs, Some(4.0));
        assert_eq!(merged.format, Some(ImageFormat::Jpg));
        assert_eq!(merged.transparency, Some(true));
        assert_eq!(merged.width, Some(2400));
    }

    #[test]
    fn default_section_applies_without_a_name() {
        let config = ConfigFile::parse(SAMPLE).expect("parse");
        let merged = resolve_options(RenderOptions::default(), Some(&config), None).expect("merge");
        assert_eq!(merged.qs, Some(1.0));
        assert_eq!(merged.width, None);
    }

    #[test]
    fn missing_named_section_is_fatal() {
        let config = ConfigFile::parse(SAMPLE).expect("parse");
        let error =
            resolve_options(RenderOptions::default(), Some(&config), Some("poster")).unwrap_err();
        let coded = find_coded_error(&error).expect("coded");
        assert_eq!(coded.code, CONFIG_SECTION_MISSING);

        let error = resolve_options(RenderOptions::default(), None, Some("poster")).unwrap_err();
        assert_eq!(
            find_coded_error(&error).map(|coded| coded.code),
            Some(CONFIG_SECTION_MISSING)
        );
    }

    #[test]
    fn bad_values_name_section_and_key() {
        let config = ConfigFile::parse("[default]\nwidth = wide\n").expect("parse");
        let error = config.section_options("default").unwrap_err();
        let message = format!("{error:#}");
        assert!(message.contains("'width'"), "{message}");
        assert!(message.contains("[default]"), "{message}");
        assert_eq!(
            find_coded_error(&error).map(|coded| coded.code),
            Some(CONFIG_INVALID)
        );
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(ConfigFile::parse("qs = 1\n").is_err());
        assert!(ConfigFile::parse("[default\n").is_err());
        assert!(ConfigFile::parse("[default]\njust words\n").is_err());
    }

    #[test]
    fn locate_prefers_explicit_then_home_then_program_dir() {
        let temp = tempdir().expect("tempdir");
        let home = temp.path().join("home");
        let program = temp.path().join("bin");
        fs::create_dir_all(&home).expect("home");
        fs::create_dir_all(&program).expect("program");

        assert_eq!(locate_config_in(None, Some(&home), Some(&program)).expect("locate"), None);

        fs::write(program.join(PROGRAM_CONFIG_NAME), "[default]\n").expect("write");
        assert_eq!(
            locate_config_in(None, Some(&home), Some(&program)).expect("locate"),
            Some(program.join(PROGRAM_CONFIG_NAME))
        );

        fs::write(home.join(HOME_CONFIG_NAME), "[default]\n").expect("write");
        assert_eq!(
            locate_config_in(None, Some(&home), Some(&program)).expect("locate"),
            Some(home.join(HOME_CONFIG_NAME))
        );

        let explicit = temp.path().join("custom.ini");
        fs::write(&explicit, "[default]\n").expect("write");
        assert_eq!(
            locate_config_in(Some(&explicit), Some(&home), Some(&program)).expect("locate"),
            Some(explicit)
        );
    }

    #[test]
    fn explicit_missing_config_is_fatal() {
        let temp = tempdir().expect("tempdir");
        let error = locate_config_in(Some(&temp.path().join("nope.ini")), None, None).unwrap_err();
        assert_eq!(
            find_coded_error(&error).map(|coded| coded.code),
            Some(CONFIG_FILE_MISSING)
        );
    }
}
