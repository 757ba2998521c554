use std::fs;
use std::path::{Path, PathBuf};

use raqote::{DrawOptions, DrawTarget, PathBuilder, SolidSource, Source};

use crate::errors::{Error, ErrorKind, Result};

use super::draw_map::Theme;
use super::raster::{composite, hex_on_white, opaque};
use super::text::{Align, TextPainter};
use super::Etl;

pub const ETL_NAME: &str = "legend";
pub const OUTPUT_FILE_NAME: &str = "legend_colors.png";

const BOX_PX: f32 = 160.0;
const GAP_PX: f32 = 12.0;
const MARGIN_PX: f32 = 24.0;
const TITLE_PX: f32 = 48.0;
const LABEL_PX: f32 = 72.0;

#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub label: &'static str,
    pub color: SolidSource,
}

/// One box per thing drawn on the maps, in theme colours with the alpha dropped.
/// Parking buildings are parkings painted over buildings inside the city.
pub fn legend_entries(theme: &Theme) -> Vec<LegendEntry> {
    let stacked = composite(theme.parking_color, composite(theme.building_color, theme.area_color));
    let entries = [
        ("motorways\nbridges", theme.road_color),
        ("buildings", theme.building_color),
        ("parks", theme.park_color),
        ("grass", theme.grass_color),
        ("water", theme.water_color),
        ("parkings", theme.parking_color),
        ("parking\nbuildings", stacked),
        ("city\nlimits", theme.area_color),
    ];
    entries.into_iter()
        .map(|(label, color)| LegendEntry { label, color: opaque(color) })
        .collect()
}

/// White on dark swatches, black otherwise.
fn ink_for(color: SolidSource) -> SolidSource {
    let luma = (0.299 * color.r as f32 + 0.587 * color.g as f32 + 0.114 * color.b as f32) / 255.0;
    if luma < 0.5 {
        SolidSource::from_unpremultiplied_argb(0xff, 0xff, 0xff, 0xff)
    } else {
        SolidSource::from_unpremultiplied_argb(0xff, 0x00, 0x00, 0x00)
    }
}

fn box_left(idx: usize) -> f32 {
    MARGIN_PX + idx as f32 * (BOX_PX + GAP_PX)
}

pub fn paint_legend(entries: &[LegendEntry], text: Option<&TextPainter>) -> Result<DrawTarget> {
    let count = entries.len().max(1);
    let width = box_left(count) - GAP_PX + MARGIN_PX;
    let height = MARGIN_PX + TITLE_PX + BOX_PX + LABEL_PX;
    let mut dt = DrawTarget::new(width.ceil() as i32, height.ceil() as i32);
    dt.clear(SolidSource::from_unpremultiplied_argb(0xff, 0xff, 0xff, 0xff));

    let black = SolidSource::from_unpremultiplied_argb(0xff, 0x00, 0x00, 0x00);
    let top = MARGIN_PX + TITLE_PX;
    if let Some(text) = text {
        text.draw_text(&mut dt, MARGIN_PX, MARGIN_PX + TITLE_PX * 0.6, 24.0, "colorboxes legend", black, Align::Left);
    }

    for (idx, entry) in entries.iter().enumerate() {
        let left = box_left(idx);
        let mut pb = PathBuilder::new();
        pb.rect(left, top, BOX_PX, BOX_PX);
        dt.fill(&pb.finish(), &Source::Solid(entry.color), &DrawOptions::new());

        if let Some(text) = text {
            let centre = left + BOX_PX / 2.0;
            text.draw_text(&mut dt, centre, top + BOX_PX - 16.0, 18.0, &hex_on_white(entry.color), ink_for(entry.color), Align::Center);
            text.draw_text(&mut dt, centre, top + BOX_PX + 26.0, 18.0, entry.label, black, Align::Center);
        }
    }
    Ok(dt)
}

/// Colour key for the map style, written once per batch.
pub struct LegendEtl<'a> {
    theme: &'a Theme,
    text: Option<&'a TextPainter>,
}

impl<'a> LegendEtl<'a> {
    pub fn new(theme: &'a Theme, text: Option<&'a TextPainter>) -> Self {
        LegendEtl { theme, text }
    }

    fn output_path(&self, dir: &Path) -> PathBuf {
        dir.join(OUTPUT_FILE_NAME)
    }
}

impl Etl for LegendEtl<'_> {
    type Input = Vec<LegendEntry>;

    type Output = DrawTarget;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn is_cached(&self, dir: &Path) -> Result<bool> {
        Ok(self.output_path(dir).try_exists()?)
    }

    fn clean(&self, dir: &Path) -> Result<()> {
        let path = self.output_path(dir);
        if path.try_exists()? {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn extract(&mut self, _dir: &Path) -> Result<Self::Input> {
        Ok(legend_entries(self.theme))
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        paint_legend(&input, self.text)
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        fs::create_dir_all(dir)?;
        output.write_png(self.output_path(dir))
            .map_err(|err| Error::new(ErrorKind::Render, format!("Couldn't write png: {}", err)))
    }
}
