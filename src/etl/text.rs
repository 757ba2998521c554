use std::path::Path;

use font_kit::family_name::FamilyName;
use font_kit::font::Font;
use font_kit::properties::Properties;
use font_kit::source::SystemSource;
use pathfinder_geometry::vector::{vec2f, Vector2F};
use raqote::{DrawOptions, DrawTarget, Point, SolidSource, Source};

use crate::errors::{Error, ErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
}

/// Titles and labels for the collage, legend and interim plots.
pub struct TextPainter {
    font: Font,
}

impl TextPainter {
    pub fn from_path(path: &Path) -> Result<TextPainter> {
        let font = Font::from_path(path, 0).map_err(|err| {
            Error::new(ErrorKind::Config, format!("Couldn't load font {}: {}", path.display(), err))
        })?;
        Ok(TextPainter { font })
    }

    /// Best monospace face the system offers.
    pub fn system_monospace() -> Result<TextPainter> {
        let font = SystemSource::new()
            .select_best_match(&[FamilyName::Monospace], &Properties::new())
            .map_err(|err| Error::new(ErrorKind::Render, format!("No monospace font: {}", err)))?
            .load()
            .map_err(|err| Error::new(ErrorKind::Render, format!("Couldn't load monospace font: {}", err)))?;
        Ok(TextPainter { font })
    }

    fn layout(&self, x: f32, y: f32, point_size: f32, text: &str) -> (Vec<u32>, Vec<Point>, f32) {
        let units_per_em = self.font.metrics().units_per_em.max(1) as f32;
        let mut start = vec2f(x, y);
        let mut ids = Vec::new();
        let mut positions = Vec::new();
        for c in text.chars() {
            let Some(id) = self.font.glyph_for_char(c).or_else(|| self.font.glyph_for_char('?')) else {
                continue;
            };
            ids.push(id);
            positions.push(Point::new(start.x(), start.y()));
            let advance: Vector2F = self.font.advance(id).unwrap_or_default();
            start += advance * (point_size / units_per_em);
        }
        (ids, positions, start.x() - x)
    }

    /// Draws one line with its baseline at `y`. Lines separated by `\n` stack
    /// downwards at 1.2 times the point size.
    pub fn draw_text(
        &self,
        dt: &mut DrawTarget,
        x: f32,
        y: f32,
        point_size: f32,
        text: &str,
        color: SolidSource,
        align: Align,
    ) {
        for (line_no, line) in text.lines().enumerate() {
            let baseline = y + line_no as f32 * point_size * 1.2;
            let (ids, mut positions, width) = self.layout(x, baseline, point_size, line);
            if ids.is_empty() {
                continue;
            }
            if align == Align::Center {
                for position in &mut positions {
                    position.x -= width * 0.5;
                }
            }
            dt.draw_glyphs(&self.font, point_size, &ids, &positions, &Source::Solid(color), &DrawOptions::new());
        }
    }
}
