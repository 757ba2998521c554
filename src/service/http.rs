use std::time::Duration;

use reqwest::blocking::{Client, Response};

use crate::data::place::Area;
use crate::data::OsmMapData;
use crate::errors::{Error, Result};
use crate::etl::parse_osm::parse_overpass_xml;
use crate::UserConfig;

use super::nominatim::{self, NominatimPlace};
use super::overpass;
use super::{FeatureRequest, FeatureService};

/// Nominatim and Overpass over blocking HTTP.
pub struct HttpFeatureService {
    client: Client,
    nominatim_url: String,
    overpass_url: String,
    timeout_secs: u64,
}

impl HttpFeatureService {
    pub fn new(config: &UserConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(HttpFeatureService {
            client,
            nominatim_url: config.nominatim_url.clone(),
            overpass_url: config.overpass_url.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn read_body(url: &str, response: Response) -> Result<String> {
        let status = response.status();
        let body = response.text()?;
        if status.is_success() {
            return Ok(body);
        }
        let snippet: String = body.chars().take(256).collect();
        Err(Error::query(format!("{}: HTTP {}: {}", url, status, snippet)))
    }
}

impl FeatureService for HttpFeatureService {
    fn geocode(&self, place: &str) -> Result<Area> {
        log::debug!(place = place; "Calling Nominatim search");
        let response = self.client
            .get(&self.nominatim_url)
            .query(&[
                ("q", place),
                ("format", "json"),
                ("polygon_geojson", "1"),
                ("limit", "10"),
            ])
            .send()?;
        let body = Self::read_body(&self.nominatim_url, response)?;

        let results: Vec<NominatimPlace> = serde_json::from_str(&body).map_err(|err| {
            let message = err.to_string();
            log::error!(place = place, err = message.as_str(); "Failed to parse Nominatim response");
            Error::query(format!("malformed Nominatim response for '{}': {}", place, err))
        })?;
        nominatim::area_from_results(place, results)
    }

    fn fetch(&self, request: &FeatureRequest) -> Result<OsmMapData> {
        let query = overpass::build_query(request, self.timeout_secs);
        log::debug!(query = query.as_str(); "Calling Overpass interpreter");
        let response = self.client
            .post(&self.overpass_url)
            .form(&[("data", query.as_str())])
            .send()?;
        let body = Self::read_body(&self.overpass_url, response)?;
        parse_overpass_xml(&body)
    }
}
