use std::fs;
use std::path::{Path, PathBuf};

use geo::{Geometry, LineString, Polygon};
use raqote::{DrawOptions, DrawTarget, LineCap, LineJoin, PathBuilder, SolidSource, Source, StrokeStyle, Winding};
use serde::Deserialize;

use crate::data::layer::{Feature, Layer};
use crate::data::place::BoundingBox;
use crate::data::CityLayers;
use crate::errors::{Error, ErrorKind, Result};
use crate::service::FeatureService;

use crate::UserConfig;

use super::fetch_layers::LayerFetcher;
use super::raster::write_jpeg;
use super::text::TextPainter;
use super::{interim, Etl};

pub const ETL_NAME: &str = "draw_map";

pub fn file_safe(place: &str) -> String {
    place.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') { '_' } else { c })
        .collect()
}

/// Image file written for a place.
pub fn output_file_name(place: &str) -> String {
    format!("Parks-Parkings {}.jpg", file_safe(place))
}

use serialize_color::deserialize;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Theme {
    #[serde(deserialize_with = "deserialize")]
    pub background_color: SolidSource,

    #[serde(deserialize_with = "deserialize")]
    pub area_color: SolidSource,

    #[serde(deserialize_with = "deserialize")]
    pub road_color: SolidSource,

    #[serde(deserialize_with = "deserialize")]
    pub bridge_color: SolidSource,

    #[serde(deserialize_with = "deserialize")]
    pub building_color: SolidSource,

    #[serde(deserialize_with = "deserialize")]
    pub parking_color: SolidSource,

    #[serde(deserialize_with = "deserialize")]
    pub park_color: SolidSource,

    #[serde(deserialize_with = "deserialize")]
    pub grass_color: SolidSource,

    #[serde(deserialize_with = "deserialize")]
    pub water_color: SolidSource,

    pub road_width: f32,
}

impl Default for Theme {
    fn default() -> Self {
        let argb = SolidSource::from_unpremultiplied_argb;
        Theme {
            background_color: argb(0xff, 0xff, 0xff, 0xff),
            area_color: argb(0xff, 0x00, 0x00, 0x00),
            road_color: argb(0xff, 0x69, 0x69, 0x69),
            bridge_color: argb(0xd9, 0x69, 0x69, 0x69),
            building_color: argb(0xb3, 0xc0, 0xc0, 0xc0),
            parking_color: argb(0xb3, 0xff, 0xff, 0x00),
            park_color: argb(0xff, 0x00, 0x80, 0x00),
            grass_color: argb(0xcc, 0x90, 0xee, 0x90),
            water_color: argb(0xff, 0xad, 0xd8, 0xe6),
            road_width: 1.5,
        }
    }
}

mod serialize_color {
    use raqote::SolidSource;
    use serde::{de, Deserializer};
    use serde::de::Visitor;


    struct ColorVisitor;

    impl<'de> Visitor<'de> for ColorVisitor {
        type Value = SolidSource;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(formatter, "a colour string like '#rrggbb' or '#rrggbbaa'")
        }

        fn visit_str<E>(self, string: &str) -> Result<Self::Value, E> where E: de::Error {
            let well_formed = string.is_ascii() && string.starts_with('#');
            if !well_formed || (string.len() != 7 && string.len() != 9) {
                return Err(de::Error::invalid_value(de::Unexpected::Str(string), &self))
            }
            let r = parse_hex_byte(&self, &string[1..3])?;
            let g = parse_hex_byte(&self, &string[3..5])?;
            let b = parse_hex_byte(&self, &string[5..7])?;
            let a = if string.len() == 9 {
                parse_hex_byte(&self, &string[7..9])?
            } else {
                0xff
            };
            Ok(SolidSource::from_unpremultiplied_argb(a, r, g, b))
        }
    }

    fn parse_hex_byte<E>(visitor: &ColorVisitor, string: &str) -> Result<u8, E> where E: de::Error {
        u8::from_str_radix(string, 16).map_err(|_| {
            de::Error::invalid_value(de::Unexpected::Str(string), visitor)
        })
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SolidSource, D::Error>
        where D: Deserializer<'de> {
        deserializer.deserialize_str(ColorVisitor)
    }
}

/// Linear lon/lat to pixel mapping that fits a bbox into the image, with
/// longitude shrunk by cos(latitude) so shapes keep their proportions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub top_left_lon: f64,
    pub top_left_lat: f64,
    pub px_per_deg_lon: f64,
    pub px_per_deg_lat: f64,
}

impl Projection {
    pub fn fit(bbox: &BoundingBox, width_px: u32, height_px: u32) -> Result<Projection> {
        let aspect = ((bbox.north + bbox.south) / 2.0).to_radians().cos();
        let ground_width = bbox.width() * aspect;
        let ground_height = bbox.height();
        if !(ground_width > 0.0 && ground_height > 0.0) {
            return Err(Error::new(ErrorKind::Render, format!("degenerate bounding box {:?}", bbox)));
        }
        let scale = (width_px as f64 / ground_width).min(height_px as f64 / ground_height);
        let px_per_deg_lon = scale * aspect;
        let px_per_deg_lat = scale;

        Ok(Projection {
            top_left_lon: bbox.west - (width_px as f64 / px_per_deg_lon - bbox.width()) / 2.0,
            top_left_lat: bbox.north + (height_px as f64 / px_per_deg_lat - bbox.height()) / 2.0,
            px_per_deg_lon,
            px_per_deg_lat,
        })
    }

    pub fn project(&self, lon: f64, lat: f64) -> (f32, f32) {
        let rel_lon = lon - self.top_left_lon;
        let rel_lat = lat - self.top_left_lat;

        let x = rel_lon * self.px_per_deg_lon;
        let y = - rel_lat * self.px_per_deg_lat;
        (x as f32, y as f32)
    }
}

/// Paints one city. Layer order follows the pictorial style: sea, city
/// footprint, grass, parks, waterways, roads, buildings, parkings, then bridges
/// on top of everything.
pub struct MapPainter<'a> {
    theme: &'a Theme,
    projection: Projection,
}

impl<'a> MapPainter<'a> {
    pub fn new(theme: &'a Theme, projection: Projection) -> Self {
        MapPainter { theme, projection }
    }

    pub fn stroke(width: f32) -> StrokeStyle {
        StrokeStyle {
            cap: LineCap::Round,
            join: LineJoin::Round,
            width,
            miter_limit: 2.0,
            dash_array: Vec::new(),
            dash_offset: 0.0,
        }
    }

    fn trace_ring(&self, pb: &mut PathBuilder, ring: &LineString) {
        let mut coords = ring.coords();
        let Some(first) = coords.next() else {
            return;
        };
        let (x0, y0) = self.projection.project(first.x, first.y);
        pb.move_to(x0, y0);
        for coord in coords {
            let (x, y) = self.projection.project(coord.x, coord.y);
            pb.line_to(x, y);
        }
        pb.close();
    }

    pub fn fill_polygon(&self, dt: &mut DrawTarget, polygon: &Polygon, color: &SolidSource) {
        if polygon.exterior().0.len() < 3 {
            return;
        }
        let mut pb = PathBuilder::new();
        self.trace_ring(&mut pb, polygon.exterior());
        for hole in polygon.interiors() {
            self.trace_ring(&mut pb, hole);
        }
        let mut path = pb.finish();
        path.winding = Winding::EvenOdd;
        dt.fill(&path, &Source::Solid(*color), &DrawOptions::new());
    }

    pub fn stroke_line(&self, dt: &mut DrawTarget, line: &LineString, color: &SolidSource, width: f32) {
        if line.0.len() < 2 {
            return;
        }
        let mut pb = PathBuilder::new();
        let (x0, y0) = self.projection.project(line.0[0].x, line.0[0].y);
        pb.move_to(x0, y0);
        for coord in &line.0[1..] {
            let (x, y) = self.projection.project(coord.x, coord.y);
            pb.line_to(x, y);
        }
        let raqote_path = pb.finish();
        dt.stroke(&raqote_path, &Source::Solid(*color), &Self::stroke(width), &DrawOptions::new());
    }

    pub fn draw_geometry(&self, dt: &mut DrawTarget, geometry: &Geometry, color: &SolidSource) {
        match geometry {
            Geometry::Polygon(polygon) => self.fill_polygon(dt, polygon, color),
            Geometry::MultiPolygon(multi) => {
                for polygon in multi {
                    self.fill_polygon(dt, polygon, color);
                }
            },
            Geometry::LineString(line) => self.stroke_line(dt, line, color, 1.0),
            Geometry::MultiLineString(lines) => {
                for line in lines {
                    self.stroke_line(dt, line, color, 1.0);
                }
            },
            Geometry::Rect(rect) => self.fill_polygon(dt, &rect.to_polygon(), color),
            Geometry::Triangle(triangle) => self.fill_polygon(dt, &triangle.to_polygon(), color),
            Geometry::GeometryCollection(collection) => {
                for inner in collection {
                    self.draw_geometry(dt, inner, color);
                }
            },
            // Points are not drawn.
            Geometry::Point(_) | Geometry::MultiPoint(_) | Geometry::Line(_) => (),
        }
    }

    pub fn draw_layer<F>(&self, dt: &mut DrawTarget, layer: &Layer, color: &SolidSource, keep: F)
        where F: Fn(&Feature) -> bool {
        for feature in layer.features.iter().filter(|f| !f.is_point() && keep(f)) {
            self.draw_geometry(dt, &feature.geometry, color);
        }
    }

    pub fn paint(&self, dt: &mut DrawTarget, city: &CityLayers) {
        let theme = self.theme;
        dt.clear(theme.background_color);

        self.draw_layer(dt, &city.big_water, &theme.water_color, |_| true);
        for polygon in &city.area.geometry {
            self.fill_polygon(dt, polygon, &theme.area_color);
        }
        self.draw_layer(dt, &city.parks, &theme.grass_color, |f| f.tag("landuse") == Some("grass"));
        self.draw_layer(dt, &city.parks, &theme.park_color, |f| f.tag("landuse") != Some("grass"));
        self.draw_layer(dt, &city.waterways, &theme.water_color, |_| true);

        for edge in city.roads.iter().filter(|edge| !edge.has_bridge()) {
            self.stroke_line(dt, &edge.geometry, &theme.road_color, theme.road_width);
        }
        self.draw_layer(dt, &city.buildings, &theme.building_color, |_| true);
        self.draw_layer(dt, &city.parkings, &theme.parking_color, |_| true);
        for edge in city.roads.iter().filter(|edge| edge.has_bridge()) {
            self.stroke_line(dt, &edge.geometry, &theme.bridge_color, theme.road_width);
        }
    }
}

pub struct CityImages {
    pub map: DrawTarget,
    pub interim: Option<DrawTarget>,
}

/// Fetches one place, paints it and writes the image. An existing image
/// counts as cached and the place is skipped.
pub struct DrawMapEtl<'a, S: FeatureService> {
    place: &'a str,
    fetcher: &'a LayerFetcher<'a, S>,
    user_config: &'a UserConfig,
    text: Option<&'a TextPainter>,
}

impl<'a, S: FeatureService> DrawMapEtl<'a, S> {
    pub fn new(
        place: &'a str,
        fetcher: &'a LayerFetcher<'a, S>,
        user_config: &'a UserConfig,
        text: Option<&'a TextPainter>,
    ) -> Self {
        DrawMapEtl {
            place,
            fetcher,
            user_config,
            text,
        }
    }

    fn output_path(&self, dir: &Path) -> PathBuf {
        dir.join(output_file_name(self.place))
    }

    fn interim_path(&self, dir: &Path) -> PathBuf {
        dir.join(interim::output_file_name(self.place))
    }
}

impl<S: FeatureService> Etl for DrawMapEtl<'_, S> {
    type Input = CityLayers;

    type Output = CityImages;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn subject(&self) -> &str {
        self.place
    }

    fn is_cached(&self, dir: &Path) -> Result<bool> {
        Ok(self.output_path(dir).try_exists()?)
    }

    fn clean(&self, dir: &Path) -> Result<()> {
        for path in [self.output_path(dir), self.interim_path(dir)] {
            if path.try_exists()? {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn extract(&mut self, _dir: &Path) -> Result<Self::Input> {
        self.fetcher.fetch(self.place)
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        let config = self.user_config;
        let mut map = DrawTarget::new(
            config.width_px.try_into()?,
            config.height_px.try_into()?
        );
        let projection = Projection::fit(&input.area.bbox, config.width_px, config.height_px)?;
        MapPainter::new(&config.theme, projection).paint(&mut map, &input);

        let interim = if config.interim_maps {
            Some(interim::paint_interim(&input, &config.theme, config.interim_panel_px, self.text)?)
        } else {
            None
        };
        Ok(CityImages { map, interim })
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        fs::create_dir_all(dir)?;
        if let Some(interim) = output.interim {
            interim.write_png(
                self.interim_path(dir)
            ).map_err(|err| Error::new(ErrorKind::Render, format!("Couldn't write png: {}", err)))?;
        }
        write_jpeg(&output.map, &self.output_path(dir), self.user_config.jpeg_quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::layer::LayerKind;
    use crate::data::place::Area;

    fn bbox() -> BoundingBox {
        // Wider than tall on the ground, so it is letterboxed vertically.
        BoundingBox { north: 42.3, south: 42.2, east: -82.9, west: -83.3 }
    }

    fn empty_city(area: Area) -> CityLayers {
        CityLayers {
            area,
            roads: Vec::new(),
            buildings: Layer::empty(LayerKind::Buildings),
            parkings: Layer::empty(LayerKind::Parkings),
            parks: Layer::empty(LayerKind::Parks),
            waterways: Layer::empty(LayerKind::Waterways),
            big_water: Layer::empty(LayerKind::BigWater),
        }
    }

    #[test]
    fn file_names_follow_the_place() {
        assert_eq!(output_file_name("Seattle, Washington"), "Parks-Parkings Seattle, Washington.jpg");
        assert_eq!(output_file_name("Bangalore / Bengaluru"), "Parks-Parkings Bangalore _ Bengaluru.jpg");
    }

    #[test]
    fn theme_reads_hex_colours() {
        let theme: Theme = serde_json::from_str(r##"{"area_color": "#102030", "water_color": "#0000ff80"}"##).unwrap();
        assert_eq!(theme.area_color, SolidSource::from_unpremultiplied_argb(0xff, 0x10, 0x20, 0x30));
        assert_eq!(theme.water_color, SolidSource::from_unpremultiplied_argb(0x80, 0x00, 0x00, 0xff));
        // Unset colours keep their defaults.
        assert_eq!(theme.road_color, Theme::default().road_color);

        assert!(serde_json::from_str::<Theme>(r#"{"area_color": "black"}"#).is_err());
    }

    #[test]
    fn non_ascii_colours_are_rejected() {
        // Seven bytes long, but the second char spans two of them.
        let err = serde_json::from_str::<Theme>(r##"{"area_color": "#aébcd"}"##).unwrap_err();
        assert!(err.to_string().contains("colour string"));
        assert!(serde_json::from_str::<Theme>(r##"{"area_color": "#ffffffé"}"##).is_err());
    }

    #[test]
    fn projection_fits_the_bbox() {
        let bbox = bbox();
        let projection = Projection::fit(&bbox, 1000, 1000).unwrap();

        let (x0, y0) = projection.project(bbox.west, bbox.north);
        let (x1, y1) = projection.project(bbox.east, bbox.south);
        // The wider side spans the whole image, the other one is centred.
        assert!((x0 - 0.0).abs() < 1e-3);
        assert!((x1 - 1000.0).abs() < 1e-3);
        assert!(y0 > 0.0 && y1 < 1000.0);
        assert!(((y0 + y1) / 2.0 - 500.0).abs() < 1e-3);
    }

    #[test]
    fn degenerate_bbox_is_a_render_error() {
        let flat = BoundingBox { north: 1.0, south: 1.0, east: 2.0, west: 1.0 };
        assert_eq!(Projection::fit(&flat, 10, 10).unwrap_err().kind, ErrorKind::Render);
    }

    #[test]
    fn area_is_painted_over_the_background() {
        let theme = Theme::default();
        let city = empty_city(Area::from_bbox("Detroit", bbox()));
        let projection = Projection::fit(&city.area.bbox, 64, 64).unwrap();

        let mut dt = DrawTarget::new(64, 64);
        MapPainter::new(&theme, projection).paint(&mut dt, &city);

        let data = dt.get_data();
        // Centre is inside the footprint, the top row is outside the letterboxed bbox.
        assert_eq!(data[32 * 64 + 32], 0xff000000);
        assert_eq!(data[0], 0xffffffff);
    }
}
