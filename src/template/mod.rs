pub mod catalog;

use crate::error::{BoothError, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// An RGB color parsed from a `#RRGGBB` string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub [u8; 3]);

impl Color {
    pub const WHITE: Color = Color([0xFF, 0xFF, 0xFF]);

    /// Parse a `#RRGGBB` hex string
    pub fn parse(s: &str) -> Result<Self> {
        let hex = s.strip_prefix('#').ok_or_else(|| {
            BoothError::template(format!("color '{}' must start with '#'", s))
        })?;
        if hex.len() != 6 {
            return Err(BoothError::template(format!(
                "color '{}' must be 6 hex digits",
                s
            )));
        }
        let mut rgb = [0u8; 3];
        for (i, chunk) in [&hex[0..2], &hex[2..4], &hex[4..6]].iter().enumerate() {
            rgb[i] = u8::from_str_radix(chunk, 16).map_err(|_| {
                BoothError::template(format!("color '{}' contains non-hex digits", s))
            })?;
        }
        Ok(Color(rgb))
    }

    pub fn r(&self) -> u8 {
        self.0[0]
    }

    pub fn g(&self) -> u8 {
        self.0[1]
    }

    pub fn b(&self) -> u8 {
        self.0[2]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.0[0], self.0[1], self.0[2])
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Color::parse(&s).map_err(|e| D::Error::custom(e.to_string()))
    }
}

/// The pixel surface a collage is composed onto
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_background_color")]
    pub background_color: Color,
    /// Referenced by the template editor; the compositor does not apply it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
}

fn default_background_color() -> Color {
    Color::WHITE
}

/// A rectangle within the canvas that one captured photo occupies.
///
/// `frame_index` is the frame's position in the template's ordered list and
/// the ordinal of the photo expected to fill it. It is assigned during load,
/// not read from the raw payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub frame_index: usize,
}

/// Per-photo styling applied by the compositor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Styling {
    /// Nominal gap between adjacent frames; informational for editors
    #[serde(default)]
    pub spacing: u32,
    /// Border drawn around each placed photo; 0 disables it
    #[serde(default)]
    pub border_width: u32,
    #[serde(default = "default_border_color")]
    pub border_color: Color,
}

fn default_border_color() -> Color {
    Color::WHITE
}

impl Default for Styling {
    fn default() -> Self {
        Self {
            spacing: 0,
            border_width: 0,
            border_color: Color::WHITE,
        }
    }
}

/// Declarative collage layout: a canvas plus an ordered list of photo frames.
///
/// Immutable once loaded; editors produce a new template rather than patching
/// one in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(default = "new_template_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Redundant with `frames.len()`; validated against it when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_count: Option<usize>,
    pub canvas: Canvas,
    pub frames: Vec<Frame>,
    #[serde(default)]
    pub styling: Styling,
}

fn new_template_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Template {
    /// Parse and validate a template from its raw JSON payload.
    ///
    /// This is the single parsing boundary; everything downstream works with
    /// the typed value.
    pub fn load(raw: &str) -> Result<Self> {
        let mut template: Template = serde_json::from_str(raw)
            .map_err(|e| BoothError::template(format!("invalid template payload: {}", e)))?;
        template.assign_frame_indices();
        template.validate()?;
        Ok(template)
    }

    /// Build a template programmatically (catalog, editors); runs the same
    /// validation as `load`.
    pub fn from_parts(
        name: &str,
        description: &str,
        canvas: Canvas,
        frames: Vec<Frame>,
        styling: Styling,
    ) -> Result<Self> {
        let mut template = Template {
            id: new_template_id(),
            name: name.to_string(),
            description: description.to_string(),
            photo_count: Some(frames.len()),
            canvas,
            frames,
            styling,
        };
        template.assign_frame_indices();
        template.validate()?;
        Ok(template)
    }

    /// Number of photos this template composes
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn assign_frame_indices(&mut self) {
        for (i, frame) in self.frames.iter_mut().enumerate() {
            frame.frame_index = i;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.frames.is_empty() {
            return Err(BoothError::template("template has no frames"));
        }

        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(BoothError::template(format!(
                "canvas dimensions must be positive, got {}x{}",
                self.canvas.width, self.canvas.height
            )));
        }

        if let Some(count) = self.photo_count {
            if count != self.frames.len() {
                return Err(BoothError::template(format!(
                    "photo_count {} does not match {} frames",
                    count,
                    self.frames.len()
                )));
            }
        }

        for frame in &self.frames {
            if frame.width == 0 || frame.height == 0 {
                return Err(BoothError::template(format!(
                    "frame {} has non-positive dimensions {}x{}",
                    frame.frame_index, frame.width, frame.height
                )));
            }

            let right = frame.x as u64 + frame.width as u64;
            let bottom = frame.y as u64 + frame.height as u64;
            if right > self.canvas.width as u64 || bottom > self.canvas.height as u64 {
                return Err(BoothError::template(format!(
                    "frame {} at ({}, {}) size {}x{} lies outside the {}x{} canvas",
                    frame.frame_index,
                    frame.x,
                    frame.y,
                    frame.width,
                    frame.height,
                    self.canvas.width,
                    self.canvas.height
                )));
            }
        }

        Ok(())
    }
}
