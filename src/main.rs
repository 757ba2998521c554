mod data;
mod errors;
mod etl;
mod service;

use std::fs::{create_dir_all, File};
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use structured_logger::json::new_writer;
use structured_logger::Builder;

use crate::data::place::OverrideTable;
use crate::errors::{Error, ErrorKind, Result};
use crate::etl::draw_map::{DrawMapEtl, Theme};
use crate::etl::fetch_layers::LayerFetcher;
use crate::etl::legend::LegendEtl;
use crate::etl::text::TextPainter;
use crate::etl::vignette::{self, VignetteEtl};
use crate::etl::Etl;
use crate::service::http::HttpFeatureService;

pub const CONFIG_PATH: &str = "config/cities.json";

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct UserConfig {
    pub places: Vec<String>,
    pub output_dir: PathBuf,
    /// Land-split water polygons (`.shp`). Without it no big water is drawn.
    pub water_polygons_path: Option<PathBuf>,
    pub nominatim_url: String,
    pub overpass_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub waterway_buffer_m: f64,
    pub width_px: u32,
    pub height_px: u32,
    pub jpeg_quality: u8,
    /// Re-render places whose image already exists.
    pub overwrite: bool,
    /// Also write the far/close look panels used to check coastlines.
    pub interim_maps: bool,
    pub interim_panel_px: u32,
    pub vignettes: bool,
    pub vignette_size_px: u32,
    pub legend: bool,
    /// Font for titles and labels. The system monospace face when unset.
    pub font_path: Option<PathBuf>,
    pub big_city_bboxes: OverrideTable,
    pub theme: Theme,
}

impl Default for UserConfig {
    fn default() -> Self {
        UserConfig {
            places: vec![
                "Detroit, Michigan, USA".to_string(),
                "Miami, Florida".to_string(),
                "Seattle, Washington".to_string(),
            ],
            output_dir: PathBuf::from("output"),
            water_polygons_path: None,
            nominatim_url: "https://nominatim.openstreetmap.org/search".to_string(),
            overpass_url: "https://overpass-api.de/api/interpreter".to_string(),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 180,
            waterway_buffer_m: 50.0,
            width_px: 2000,
            height_px: 2000,
            jpeg_quality: 90,
            overwrite: false,
            interim_maps: false,
            interim_panel_px: 1200,
            vignettes: true,
            vignette_size_px: 3000,
            legend: true,
            font_path: None,
            big_city_bboxes: OverrideTable::default(),
            theme: Theme::default(),
        }
    }
}

fn load_user_config(path: &str) -> Result<UserConfig> {
    let file = File::open(path).map_err(|err| {
        Error::new(ErrorKind::Config, format!("Could not open config file {}: {}", path, err))
    })?;
    serde_json::from_reader(file).map_err(|err| {
        Error::new(ErrorKind::Config, format!("Could not parse config {}: {}", path, err))
    })
}

fn setup_logging() {
    Builder::with_level("info")
        .with_target_writer("*", new_writer(io::stdout()))
        .init();
}

/// A configured font is required; the system one is optional and text is
/// left out when there is none.
fn load_text_painter(config: &UserConfig) -> Result<Option<TextPainter>> {
    if let Some(path) = &config.font_path {
        return TextPainter::from_path(path).map(Some);
    }
    match TextPainter::system_monospace() {
        Ok(painter) => Ok(Some(painter)),
        Err(err) => {
            log::warn!(err = err.message.as_str(); "No font available, drawing without text");
            Ok(None)
        }
    }
}

fn run<E: Etl>(etl: &mut E, config: &UserConfig) -> Result<()> {
    let output_dir = Path::new(&config.output_dir);
    if config.overwrite {
        etl.clean(output_dir)?;
    }
    etl.process(output_dir)
}

fn draw_place(
    place: &str,
    fetcher: &LayerFetcher<HttpFeatureService>,
    config: &UserConfig,
    text: Option<&TextPainter>,
) -> Result<()> {
    run(&mut DrawMapEtl::new(place, fetcher, config, text), config)
}

fn draw_summaries(config: &UserConfig, text: Option<&TextPainter>) {
    if config.vignettes {
        for (idx, group) in config.places.chunks(vignette::GROUP_SIZE).enumerate() {
            let mut etl = VignetteEtl::new(idx + 1, group, config.vignette_size_px, text);
            if let Err(err) = run(&mut etl, config) {
                log::error!(group = idx + 1, err = err.message.as_str(); "Skipping vignette");
            }
        }
    }
    if config.legend {
        if let Err(err) = run(&mut LegendEtl::new(&config.theme, text), config) {
            log::error!(err = err.message.as_str(); "Skipping legend");
        }
    }
}

fn main() -> Result<()> {
    setup_logging();

    let user_config = load_user_config(CONFIG_PATH)?;
    create_dir_all(&user_config.output_dir)?;
    let text = load_text_painter(&user_config)?;

    let service = HttpFeatureService::new(&user_config)?;
    let fetcher = LayerFetcher::new(
        &service,
        &user_config.big_city_bboxes,
        user_config.water_polygons_path.as_deref(),
        user_config.waterway_buffer_m,
    );

    let mut failed = 0;
    for place in tqdm::tqdm(user_config.places.iter()) {
        log::info!(place = place.as_str(); "Drawing place");
        if let Err(err) = draw_place(place, &fetcher, &user_config, text.as_ref()) {
            failed += 1;
            log::error!(place = place.as_str(), err = err.message.as_str(); "Skipping place");
        }
    }
    log::info!(places = user_config.places.len(), failed = failed; "Batch finished");

    draw_summaries(&user_config, text.as_ref());

    Ok(())
}
