use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;

use crate::resize::ResizeRequest;

/// Environment keys understood by `flam3-render`, in the order they are applied.
pub const ENV_KEYS: [&str; 8] = [
    "qs",
    "ss",
    "pixel_aspect",
    "format",
    "bpc",
    "bits",
    "transparency",
    "out",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ImageFormat {
    #[default]
    Png,
    Jpg,
    Ppm,
}

impl ImageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpg => "jpg",
            ImageFormat::Ppm => "ppm",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" => Some(ImageFormat::Jpg),
            "ppm" => Some(ImageFormat::Ppm),
            _ => None,
        }
    }
}

/// Which requested dimension drives the resize when both are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FixDimension {
    Width,
    Height,
}

impl FixDimension {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "width" => Some(FixDimension::Width),
            "height" => Some(FixDimension::Height),
            _ => None,
        }
    }
}

/// Populated options record for one batch. `None` means "let the renderer decide".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOptions {
    pub qs: Option<f64>,
    pub ss: Option<f64>,
    pub pixel_aspect: Option<f64>,
    pub format: Option<ImageFormat>,
    pub bpc: Option<u32>,
    pub bits: Option<u32>,
    pub transparency: Option<bool>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fix: Option<FixDimension>,
    pub keepratio: Option<bool>,
    pub renderer_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl RenderOptions {
    /// Fills every unset field from `fallback`. Fields already set win.
    pub fn or(self, fallback: RenderOptions) -> RenderOptions {
        RenderOptions {
            qs: self.qs.or(fallback.qs),
            ss: self.ss.or(fallback.ss),
            pixel_aspect: self.pixel_aspect.or(fallback.pixel_aspect),
            format: self.format.or(fallback.format),
            bpc: self.bpc.or(fallback.bpc),
            bits: self.bits.or(fallback.bits),
            transparency: self.transparency.or(fallback.transparency),
            width: self.width.or(fallback.width),
            height: self.height.or(fallback.height),
            fix: self.fix.or(fallback.fix),
            keepratio: self.keepratio.or(fallback.keepratio),
            renderer_dir: self.renderer_dir.or(fallback.renderer_dir),
            timeout: self.timeout.or(fallback.timeout),
        }
    }

    /// Applies the post-merge rules: png is the default format, and an explicit
    /// width or height replaces size-scale as the resize strategy.
    pub fn normalized(mut self) -> RenderOptions {
        if self.format.is_none() {
            self.format = Some(ImageFormat::default());
        }
        if self.width.is_some() || self.height.is_some() {
            self.ss = None;
        }
        self
    }

    pub fn output_format(&self) -> ImageFormat {
        self.format.unwrap_or_default()
    }

    pub fn resize_request(&self) -> ResizeRequest {
        ResizeRequest {
            width: self.width,
            height: self.height,
            fix: self.fix,
            keep_ratio: self.keepratio.unwrap_or(false),
        }
    }

    /// Environment overlay for one render. A `None` value means the key must be
    /// removed from the inherited environment.
    pub fn environment(&self, output_path: &Path) -> Vec<(&'static str, Option<String>)> {
        let transparency = match self.transparency {
            Some(true) => Some("1".to_owned()),
            _ => None,
        };
        let values = [
            self.qs.map(|value| value.to_string()),
            self.ss.map(|value| value.to_string()),
            self.pixel_aspect.map(|value| value.to_string()),
            self.format.map(|format| format.as_str().to_owned()),
            self.bpc.map(|value| value.to_string()),
            self.bits.map(|value| value.to_string()),
            transparency,
            Some(output_path.to_string_lossy().into_owned()),
        ];
        ENV_KEYS.into_iter().zip(values).collect()
    }
}
