use geo::{Geometry, MultiPolygon};
use serde::Deserialize;

use crate::data::osm::OsmId;
use crate::data::place::{Area, QueryExtent};
use crate::errors::{Error, Result};

#[derive(Deserialize, Debug)]
pub struct NominatimPlace {
    pub osm_type: Option<String>,
    pub osm_id: Option<OsmId>,
    #[serde(default)]
    pub display_name: String,
    pub geojson: Option<geojson::Geometry>,
}

fn to_multipolygon(geometry: geojson::Geometry) -> Result<Option<MultiPolygon>> {
    Ok(match Geometry::<f64>::try_from(geometry)? {
        Geometry::Polygon(polygon) => Some(MultiPolygon::new(vec![polygon])),
        Geometry::MultiPolygon(multi) => Some(multi),
        _ => None,
    })
}

/// Picks the first search result that is an area with a polygon boundary.
pub fn area_from_results(place: &str, results: Vec<NominatimPlace>) -> Result<Area> {
    for result in results {
        let Some(geometry) = result.geojson else {
            continue;
        };
        let Some(multi) = to_multipolygon(geometry)? else {
            log::debug!(place = place, candidate = result.display_name.as_str(); "Skipping non-polygon geocoding result");
            continue;
        };
        let extent = result.osm_type.as_deref()
            .zip(result.osm_id)
            .and_then(|(osm_type, osm_id)| QueryExtent::named(osm_type, osm_id));
        let Some(extent) = extent else {
            continue;
        };
        return Area::from_geometry(place, multi, extent)
            .ok_or_else(|| Error::resolution(format!("{} resolved to an empty polygon", place)));
    }
    Err(Error::resolution(format!(
        "Nominatim could not geocode '{}' to a polygon", place
    )))
}
