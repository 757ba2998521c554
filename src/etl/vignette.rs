use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use raqote::{DrawTarget, SolidSource};
use regex::Regex;

use crate::errors::{Error, ErrorKind, Result};

use super::draw_map::output_file_name as map_file_name;
use super::raster::{draw_image_fitted, load_image, OwnedImage};
use super::text::{Align, TextPainter};
use super::Etl;

pub const ETL_NAME: &str = "vignette";

/// Maps per collage, laid out on a 3 x 3 grid.
pub const GROUP_SIZE: usize = 9;
const COLUMNS: usize = 3;

/// Share of each cell kept for the title above the map.
const TITLE_BAND: f32 = 0.1;

pub fn output_file_name(group: usize) -> String {
    format!("pictorial_vignette_group_{}.png", group)
}

/// Place name as shown under the collage: the country is dropped for US cities.
pub fn display_title(place: &str) -> Result<String> {
    let country = Regex::new(r", (USA?|United States)$")?;
    Ok(country.replace(place, "").into_owned())
}

/// Top left corner of a grid slot.
fn cell_origin(slot: usize, cell_px: f32) -> (f32, f32) {
    let col = slot % COLUMNS;
    let row = slot / COLUMNS;
    (col as f32 * cell_px, row as f32 * cell_px)
}

#[derive(Debug)]
pub struct VignetteCell {
    pub number: usize,
    pub title: String,
    pub image: OwnedImage,
}

/// Collage of the already rendered maps of up to nine places. Places whose
/// map is missing are left out but keep their number.
pub struct VignetteEtl<'a> {
    group: usize,
    first_number: usize,
    places: &'a [String],
    size_px: u32,
    text: Option<&'a TextPainter>,
}

impl<'a> VignetteEtl<'a> {
    /// `group` counts from 1; numbering on the collage continues across groups.
    pub fn new(group: usize, places: &'a [String], size_px: u32, text: Option<&'a TextPainter>) -> Self {
        VignetteEtl {
            group,
            first_number: (group - 1) * GROUP_SIZE + 1,
            places,
            size_px,
            text,
        }
    }

    fn output_path(&self, dir: &Path) -> PathBuf {
        dir.join(output_file_name(self.group))
    }

    fn paint(&self, cells: &[VignetteCell]) -> Result<DrawTarget> {
        let side: i32 = self.size_px.try_into()?;
        let mut dt = DrawTarget::new(side, side);
        dt.clear(SolidSource::from_unpremultiplied_argb(0xff, 0xff, 0xff, 0xff));

        let cell_px = self.size_px as f32 / COLUMNS as f32;
        let band = cell_px * TITLE_BAND;
        let title_color = SolidSource::from_unpremultiplied_argb(0xff, 0x00, 0x00, 0x00);
        let number_color = SolidSource::from_unpremultiplied_argb(0x80, 0x00, 0x00, 0x00);

        for (slot, cell) in cells.iter().take(GROUP_SIZE).enumerate() {
            let (x, y) = cell_origin(slot, cell_px);
            draw_image_fitted(&mut dt, &cell.image, x, y + band, cell_px, cell_px - band);

            if let Some(text) = self.text {
                let baseline = y + band * 0.7;
                let size = band * 0.45;
                text.draw_text(&mut dt, x + cell_px / 2.0, baseline, size, &cell.title, title_color, Align::Center);
                text.draw_text(&mut dt, x + 4.0, baseline, size, &format!("{}.", cell.number), number_color, Align::Left);
            }
        }
        Ok(dt)
    }
}

impl Etl for VignetteEtl<'_> {
    type Input = Vec<VignetteCell>;

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

    fn extract(&mut self, dir: &Path) -> Result<Self::Input> {
        let mut cells = Vec::new();
        for (idx, place) in self.places.iter().enumerate() {
            let path = dir.join(map_file_name(place));
            if !path.try_exists()? {
                warn!(place = place.as_str(), group = self.group; "No map to put in the vignette");
                continue;
            }
            cells.push(VignetteCell {
                number: self.first_number + idx,
                title: display_title(place)?,
                image: load_image(&path)?,
            });
        }
        if cells.is_empty() {
            return Err(Error::file_access(format!("no maps found for vignette group {}", self.group)));
        }
        Ok(cells)
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        self.paint(&input)
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        fs::create_dir_all(dir)?;
        output.write_png(self.output_path(dir))
            .map_err(|err| Error::new(ErrorKind::Render, format!("Couldn't write png: {}", err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::raster::write_jpeg;

    fn solid_image(argb: u32) -> OwnedImage {
        OwnedImage { width: 4, height: 4, data: vec![argb; 16] }
    }

    #[test]
    fn us_suffixes_are_dropped() {
        assert_eq!(display_title("Detroit, Michigan, USA").unwrap(), "Detroit, Michigan");
        assert_eq!(display_title("Boston, Massachusetts, US").unwrap(), "Boston, Massachusetts");
        assert_eq!(display_title("Chicago, Illinois, United States").unwrap(), "Chicago, Illinois");
        assert_eq!(display_title("Santiago, Chile").unwrap(), "Santiago, Chile");
        // Only a trailing country is removed.
        assert_eq!(display_title("USA, Somewhere").unwrap(), "USA, Somewhere");
    }

    #[test]
    fn numbering_continues_across_groups() {
        let places = vec!["A".to_string()];
        assert_eq!(VignetteEtl::new(1, &places, 90, None).first_number, 1);
        assert_eq!(VignetteEtl::new(3, &places, 90, None).first_number, 19);
        assert_eq!(output_file_name(3), "pictorial_vignette_group_3.png");
    }

    #[test]
    fn cells_fill_rows_left_to_right() {
        assert_eq!(cell_origin(0, 100.0), (0.0, 0.0));
        assert_eq!(cell_origin(2, 100.0), (200.0, 0.0));
        assert_eq!(cell_origin(4, 100.0), (100.0, 100.0));
        assert_eq!(cell_origin(8, 100.0), (200.0, 200.0));
    }

    #[test]
    fn maps_land_in_their_cells() {
        let places: Vec<String> = Vec::new();
        let etl = VignetteEtl::new(1, &places, 300, None);
        let cells = vec![
            VignetteCell { number: 1, title: "Red".to_string(), image: solid_image(0xffff0000) },
            VignetteCell { number: 2, title: "Blue".to_string(), image: solid_image(0xff0000ff) },
        ];
        let dt = etl.paint(&cells).unwrap();
        let data = dt.get_data();

        // Cells are 100 px with a 10 px title band; sample each image's centre.
        assert_eq!(data[55 * 300 + 50], 0xffff0000);
        assert_eq!(data[55 * 300 + 150], 0xff0000ff);
        // Unused slots stay blank.
        assert_eq!(data[255 * 300 + 250], 0xffffffff);
    }

    #[test]
    fn missing_maps_are_skipped() {
        let dir = std::env::temp_dir().join("city-maps-vignette-test");
        fs::create_dir_all(&dir).unwrap();
        let present = "Toledo, Ohio, USA".to_string();
        let missing = "Nowhere, Nevada".to_string();
        let _ = fs::remove_file(dir.join(map_file_name(&missing)));

        let mut dt = DrawTarget::new(8, 8);
        dt.clear(SolidSource::from_unpremultiplied_argb(0xff, 0x00, 0x80, 0x00));
        write_jpeg(&dt, &dir.join(map_file_name(&present)), 90).unwrap();

        let places = vec![missing.clone(), present];
        let cells = VignetteEtl::new(2, &places, 300, None).extract(&dir).unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].number, 11);
        assert_eq!(cells[0].title, "Toledo, Ohio");

        let only_missing = vec![missing];
        let err = VignetteEtl::new(1, &only_missing, 300, None).extract(&dir).unwrap_err();
        assert_eq!(err.kind, ErrorKind::FileAccess);
    }
}
