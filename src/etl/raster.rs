use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};
use raqote::{DrawOptions, DrawTarget, Image, SolidSource};

use crate::errors::{Error, ErrorKind, Result};

/// Decoded image in raqote's premultiplied ARGB layout.
#[derive(Debug)]
pub struct OwnedImage {
    pub width: i32,
    pub height: i32,
    pub data: Vec<u32>,
}

impl OwnedImage {
    pub fn as_image(&self) -> Image {
        Image {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

/// Flattens the draw target onto white. Pixels are premultiplied, so the white
/// that shows through is simply what alpha leaves uncovered.
pub fn to_rgb_image(dt: &DrawTarget) -> Result<RgbImage> {
    let mut buf = Vec::with_capacity(dt.get_data().len() * 3);
    for pixel in dt.get_data() {
        let uncovered = 0xff - (pixel >> 24);
        for shift in [16, 8, 0] {
            let channel = (pixel >> shift) & 0xff;
            buf.push((channel + uncovered).min(0xff) as u8);
        }
    }
    RgbImage::from_raw(dt.width().try_into()?, dt.height().try_into()?, buf)
        .ok_or_else(|| Error::new(ErrorKind::Render, "pixel buffer does not match the image size"))
}

pub fn write_jpeg(dt: &DrawTarget, path: &Path, quality: u8) -> Result<()> {
    let rgb = to_rgb_image(dt)?;
    let mut out = BufWriter::new(File::create(path)?);
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?;
    Ok(())
}

pub fn load_image(path: &Path) -> Result<OwnedImage> {
    let rgba = image::open(path)
        .map_err(|err| Error::file_access(format!("{}: {}", path.display(), err)))?
        .to_rgba8();

    let premultiply = |channel: u8, alpha: u32| (channel as u32 * alpha + 127) / 255;
    let data = rgba.pixels()
        .map(|pixel| {
            let [r, g, b, a] = pixel.0;
            let a = a as u32;
            (a << 24) + (premultiply(r, a) << 16) + (premultiply(g, a) << 8) + premultiply(b, a)
        })
        .collect();

    Ok(OwnedImage {
        width: rgba.width().try_into()?,
        height: rgba.height().try_into()?,
        data,
    })
}

/// Draws `image` scaled to fit inside the box, keeping its aspect and centring it.
pub fn draw_image_fitted(dt: &mut DrawTarget, image: &OwnedImage, x: f32, y: f32, width: f32, height: f32) {
    if image.width <= 0 || image.height <= 0 {
        return;
    }
    let scale = (width / image.width as f32).min(height / image.height as f32);
    let drawn_width = image.width as f32 * scale;
    let drawn_height = image.height as f32 * scale;
    dt.draw_image_with_size_at(
        drawn_width,
        drawn_height,
        x + (width - drawn_width) / 2.0,
        y + (height - drawn_height) / 2.0,
        &image.as_image(),
        &DrawOptions::new(),
    );
}

/// `top` painted over `bottom`, both premultiplied.
pub fn composite(top: SolidSource, bottom: SolidSource) -> SolidSource {
    let over = |t: u8, b: u8| (t as u32 + b as u32 * (0xff - top.a as u32) / 0xff).min(0xff) as u8;
    SolidSource {
        r: over(top.r, bottom.r),
        g: over(top.g, bottom.g),
        b: over(top.b, bottom.b),
        a: over(top.a, bottom.a),
    }
}

/// Same hue with the alpha dropped.
pub fn opaque(color: SolidSource) -> SolidSource {
    if color.a == 0 {
        return SolidSource { r: 0xff, g: 0xff, b: 0xff, a: 0xff };
    }
    let a = color.a as u32;
    let unpremultiply = |channel: u8| ((channel as u32 * 0xff + a / 2) / a).min(0xff) as u8;
    SolidSource {
        r: unpremultiply(color.r),
        g: unpremultiply(color.g),
        b: unpremultiply(color.b),
        a: 0xff,
    }
}

/// `#rrggbb` of a colour as it shows on white paper.
pub fn hex_on_white(color: SolidSource) -> String {
    let white = SolidSource { r: 0xff, g: 0xff, b: 0xff, a: 0xff };
    let shown = composite(color, white);
    format!("#{:02x}{:02x}{:02x}", shown.r, shown.g, shown.b)
}
