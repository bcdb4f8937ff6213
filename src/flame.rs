use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::options::ImageFormat;
use crate::resize::FrameGeometry;

const FLAME_TAG: &[u8] = b"flame";
const ROOT_TAG: &str = "flames";
const INDENT: usize = 2;

/// A deep copy of one `<flame>` element.
///
/// Holds the element's start tag separately so `size` and `scale` can be
/// rewritten without touching the rest of the subtree.
#[derive(Debug, Clone)]
pub struct FlameDescriptor {
    root: BytesStart<'static>,
    body: Vec<Event<'static>>,
    self_closing: bool,
}

impl FlameDescriptor {
    pub fn attribute(&self, name: &str) -> Result<Option<String>> {
        for attribute in self.root.attributes() {
            let attribute = attribute.context("malformed flame attribute")?;
            if attribute.key.as_ref() == name.as_bytes() {
                let value = attribute
                    .unescape_value()
                    .with_context(|| format!("failed to decode flame attribute '{name}'"))?;
                return Ok(Some(value.into_owned()));
            }
        }
        Ok(None)
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) -> Result<()> {
        let tag = String::from_utf8_lossy(self.root.name().as_ref()).into_owned();
        let mut updated = BytesStart::new(tag);
        let mut replaced = false;
        for attribute in self.root.attributes() {
            let attribute = attribute.context("malformed flame attribute")?;
            if attribute.key.as_ref() == name.as_bytes() {
                if !replaced {
                    updated.push_attribute((name, value));
                    replaced = true;
                }
            } else {
                updated.push_attribute(attribute);
            }
        }
        if !replaced {
            updated.push_attribute((name, value));
        }
        self.root = updated;
        Ok(())
    }

    /// Label used in logs; the flame's `name` attribute when it has one.
    pub fn name(&self) -> Option<String> {
        self.attribute("name").ok().flatten()
    }

    pub fn geometry(&self) -> Result<FrameGeometry> {
        let size = self
            .attribute("size")?
            .ok_or_else(|| anyhow!("flame has no size attribute"))?;
        let (width, height) = parse_size(&size)?;
        let scale = self
            .attribute("scale")?
            .ok_or_else(|| anyhow!("flame has no scale attribute"))?;
        let scale = scale
            .trim()
            .parse::<f64>()
            .with_context(|| format!("flame scale '{scale}' is not a number"))?;
        if !scale.is_finite() || scale <= 0.0 {
            bail!("flame scale must be positive, got {scale}");
        }
        Ok(FrameGeometry {
            width,
            height,
            scale,
        })
    }

    pub fn set_geometry(&mut self, geometry: FrameGeometry) -> Result<()> {
        self.set_attribute("size", &format!("{} {}", geometry.width, geometry.height))?;
        self.set_attribute("scale", &format!("{:.6}", geometry.scale))
    }

    /// Serializes the element inside a `<flames>` root, two-space indented,
    /// ready to be streamed to the renderer.
    pub fn to_document(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', INDENT);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", None, None)))
            .context("failed to write xml declaration")?;
        writer
            .write_event(Event::Start(BytesStart::new(ROOT_TAG)))
            .context("failed to open flames element")?;
        if self.self_closing {
            writer
                .write_event(Event::Empty(self.root.clone()))
                .context("failed to write flame element")?;
        } else {
            writer
                .write_event(Event::Start(self.root.clone()))
                .context("failed to write flame element")?;
            for event in &self.body {
                writer
                    .write_event(event.clone())
                    .context("failed to write flame content")?;
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new(ROOT_TAG)))
            .context("failed to close flames element")?;
        let mut document = writer.into_inner();
        document.push(b'\n');
        Ok(document)
    }
}

fn parse_size(raw: &str) -> Result<(u32, u32)> {
    let mut parts = raw.split_whitespace();
    let (Some(width), Some(height), None) = (parts.next(), parts.next(), parts.next()) else {
        bail!("flame size '{raw}' must be two integers");
    };
    let width = width
        .parse::<u32>()
        .with_context(|| format!("flame width '{width}' is not an integer"))?;
    let height = height
        .parse::<u32>()
        .with_context(|| format!("flame height '{height}' is not an integer"))?;
    if width == 0 || height == 0 {
        bail!("flame size must be positive, got {width}x{height}");
    }
    Ok((width, height))
}

fn is_flame(start: &BytesStart<'_>) -> bool {
    start.name().as_ref() == FLAME_TAG
}

/// Extracts every `<flame>` element of a document, in document order.
pub fn parse_flames(xml: &str) -> Result<Vec<FlameDescriptor>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut flames = Vec::new();
    let mut current: Option<(BytesStart<'static>, Vec<Event<'static>>)> = None;
    let mut depth = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|error| anyhow!("malformed xml at byte {}: {error}", reader.buffer_position()))?;

        match event {
            Event::Eof => break,
            Event::Start(start) if current.is_none() && is_flame(&start) => {
                current = Some((start.into_owned(), Vec::new()));
                depth = 1;
            }
            Event::Empty(start) if current.is_none() && is_flame(&start) => {
                flames.push(FlameDescriptor {
                    root: start.into_owned(),
                    body: Vec::new(),
                    self_closing: true,
                });
            }
            event => {
                let Some((_, body)) = current.as_mut() else {
                    continue;
                };
                match &event {
                    Event::Start(_) => depth += 1,
                    Event::End(_) => depth -= 1,
                    _ => {}
                }
                body.push(event.into_owned());
                if depth == 0 {
                    if let Some((root, body)) = current.take() {
                        flames.push(FlameDescriptor {
                            root,
                            body,
                            self_closing: false,
                        });
                    }
                }
            }
        }
    }

    if current.is_some() {
        bail!("unterminated flame element");
    }
    Ok(flames)
}

/// One input file and the flames it contains.
#[derive(Debug, Clone)]
pub struct FlameFile {
    pub path: PathBuf,
    pub flames: Vec<FlameDescriptor>,
}

impl FlameFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read flame file {}", path.display()))?;
        let flames = parse_flames(&contents)
            .with_context(|| format!("failed to parse flame file {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            flames,
        })
    }

    /// Output path for the flame at zero-based `index`.
    pub fn output_path(&self, index: usize, format: ImageFormat) -> PathBuf {
        output_path(&self.path, index, self.flames.len(), format.as_str())
    }
}

/// `<basename>.<ext>` for a single flame, `<basename><NNN>.<ext>` (one-based)
/// when the file holds several.
pub fn output_path(input: &Path, index: usize, count: usize, extension: &str) -> PathBuf {
    let mut name = input.with_extension("").into_os_string();
    if count > 1 {
        name.push(format!("{:03}", index + 1));
    }
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}
