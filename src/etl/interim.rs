use std::f32::consts::TAU;

use geo::{BoundingRect, Coord, Rect};
use raqote::{DrawOptions, DrawTarget, Image, PathBuilder, SolidSource, Source};

use crate::data::place::BoundingBox;
use crate::data::CityLayers;
use crate::errors::Result;

use super::draw_map::{file_safe, MapPainter, Projection, Theme};
use super::text::{Align, TextPainter};

/// Share of a panel's height reserved above it for the title.
const TITLE_BAND: f32 = 0.08;

pub fn output_file_name(place: &str) -> String {
    format!("Look oceanfront {}.png", file_safe(place))
}

/// City bbox grown to cover every big-water polygon attached to it.
fn water_extent(city: &CityLayers) -> BoundingBox {
    let mut extent = city.area.bbox.to_rect();
    for bounds in city.big_water.features.iter().filter_map(|f| f.geometry.bounding_rect()) {
        extent = Rect::new(
            Coord { x: extent.min().x.min(bounds.min().x), y: extent.min().y.min(bounds.min().y) },
            Coord { x: extent.max().x.max(bounds.max().x), y: extent.max().y.max(bounds.max().y) },
        );
    }
    extent.into()
}

fn blank_panel(panel_px: u32, theme: &Theme) -> Result<DrawTarget> {
    let side: i32 = panel_px.try_into()?;
    let mut dt = DrawTarget::new(side, side);
    dt.clear(theme.background_color);
    Ok(dt)
}

/// The sea polygons in full, with the city's bbox outlined and its corners marked.
fn far_look(city: &CityLayers, theme: &Theme, panel_px: u32) -> Result<DrawTarget> {
    let mut dt = blank_panel(panel_px, theme)?;
    let projection = Projection::fit(&water_extent(city), panel_px, panel_px)?;
    let painter = MapPainter::new(theme, projection);
    painter.draw_layer(&mut dt, &city.big_water, &theme.water_color, |_| true);

    let bbox = city.area.bbox;
    let (x0, y0) = projection.project(bbox.west, bbox.north);
    let (x1, y1) = projection.project(bbox.east, bbox.south);
    let mut pb = PathBuilder::new();
    pb.rect(x0, y0, x1 - x0, y1 - y0);
    let outline = SolidSource::from_unpremultiplied_argb(0x80, 0x00, 0x00, 0x00);
    dt.stroke(&pb.finish(), &Source::Solid(outline), &MapPainter::stroke(1.0), &DrawOptions::new());

    let marker = SolidSource::from_unpremultiplied_argb(0xb3, 0xff, 0x00, 0x00);
    for (x, y) in [(x0, y1), (x1, y0)] {
        let mut pb = PathBuilder::new();
        pb.arc(x, y, 4.0, 0.0, TAU);
        dt.fill(&pb.finish(), &Source::Solid(marker), &DrawOptions::new());
    }
    Ok(dt)
}

/// Water inside the city's bbox; with `show_area` the city footprint is
/// washed over it in translucent grey.
fn close_look(city: &CityLayers, theme: &Theme, panel_px: u32, show_area: bool) -> Result<DrawTarget> {
    let mut dt = blank_panel(panel_px, theme)?;
    let painter = MapPainter::new(theme, Projection::fit(&city.area.bbox, panel_px, panel_px)?);
    painter.draw_layer(&mut dt, &city.big_water, &theme.water_color, |_| true);
    painter.draw_layer(&mut dt, &city.waterways, &theme.water_color, |_| true);
    if show_area {
        let wash = SolidSource::from_unpremultiplied_argb(0x33, 0x80, 0x80, 0x80);
        for polygon in &city.area.geometry {
            painter.fill_polygon(&mut dt, polygon, &wash);
        }
    }
    Ok(dt)
}

/// Side-by-side panels for checking how a waterfront city meets the sea: the
/// far look (only when there is big water), the close look and the city area.
pub fn paint_interim(city: &CityLayers, theme: &Theme, panel_px: u32, text: Option<&TextPainter>) -> Result<DrawTarget> {
    let mut panels: Vec<(Option<&str>, DrawTarget)> = Vec::new();
    if !city.big_water.is_empty() {
        panels.push((None, far_look(city, theme, panel_px)?));
    }
    panels.push((Some("close look"), close_look(city, theme, panel_px, false)?));
    panels.push((Some("city area"), close_look(city, theme, panel_px, true)?));

    let side: i32 = panel_px.try_into()?;
    let band = (side as f32 * TITLE_BAND).round();
    let panel_count: i32 = panels.len().try_into()?;
    let mut out = DrawTarget::new(side * panel_count, side + band as i32);
    out.clear(theme.background_color);

    let title_color = SolidSource::from_unpremultiplied_argb(0xff, 0x00, 0x00, 0x00);
    for (idx, (title, panel)) in panels.iter().enumerate() {
        let x = (idx as i32 * side) as f32;
        let image = Image {
            width: panel.width(),
            height: panel.height(),
            data: panel.get_data(),
        };
        out.draw_image_at(x, band, &image, &DrawOptions::new());
        if let (Some(title), Some(text)) = (title, text) {
            text.draw_text(&mut out, x + 4.0, band * 0.75, band * 0.6, title, title_color, Align::Left);
        }
    }
    Ok(out)
}
