use std::collections::HashMap;

use geo::{BoundingRect, Coord, MultiPolygon, Rect};
use serde::Deserialize;

use super::osm::OsmId;

/// Offsets Overpass adds to way/relation ids to name the area they enclose.
const WAY_AREA_OFFSET: OsmId = 2_400_000_000;
const RELATION_AREA_OFFSET: OsmId = 3_600_000_000;

/// Geographic extent in WGS84 degrees. Deserialises from `[north, south, east, west]`.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(from = "[f64; 4]")]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl From<[f64; 4]> for BoundingBox {
    fn from([north, south, east, west]: [f64; 4]) -> Self {
        BoundingBox { north, south, east, west }
    }
}

impl From<Rect> for BoundingBox {
    fn from(rect: Rect) -> Self {
        BoundingBox {
            north: rect.max().y,
            south: rect.min().y,
            east: rect.max().x,
            west: rect.min().x,
        }
    }
}

impl BoundingBox {
    pub fn to_rect(&self) -> Rect {
        Rect::new(
            Coord { x: self.west, y: self.south },
            Coord { x: self.east, y: self.north },
        )
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Overpass bbox filter order: `(south,west,north,east)`.
    pub fn to_overpass(&self) -> String {
        format!("{},{},{},{}", self.south, self.west, self.north, self.east)
    }
}

/// What every feature query for a place is restricted to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueryExtent {
    /// Administrative area found by name, as an Overpass area id.
    Named { area_id: OsmId },
    /// Explicit rectangle from the override table.
    BoundingBox(BoundingBox),
}

impl QueryExtent {
    pub fn named(osm_type: &str, osm_id: OsmId) -> Option<QueryExtent> {
        let offset = match osm_type {
            "relation" => RELATION_AREA_OFFSET,
            "way" => WAY_AREA_OFFSET,
            _ => return None,
        };
        Some(QueryExtent::Named { area_id: offset + osm_id })
    }

    pub fn to_overpass(&self) -> String {
        match self {
            QueryExtent::Named { area_id } => format!("area:{}", area_id),
            QueryExtent::BoundingBox(bbox) => bbox.to_overpass(),
        }
    }
}

/// Resolved shape of a place.
#[derive(Debug, Clone)]
pub struct Area {
    pub name: String,
    pub geometry: MultiPolygon,
    pub bbox: BoundingBox,
    pub extent: QueryExtent,
}

impl Area {
    pub fn from_geometry(name: &str, geometry: MultiPolygon, extent: QueryExtent) -> Option<Area> {
        let bbox = geometry.bounding_rect()?.into();
        Some(Area {
            name: name.to_string(),
            geometry,
            bbox,
            extent,
        })
    }

    /// Area of an override place: the rectangle itself, queried as a rectangle.
    pub fn from_bbox(name: &str, bbox: BoundingBox) -> Area {
        Area {
            name: name.to_string(),
            geometry: MultiPolygon::new(vec![bbox.to_rect().to_polygon()]),
            bbox,
            extent: QueryExtent::BoundingBox(bbox),
        }
    }
}

/// Places whose administrative boundary makes the name-based query too large.
/// Keyed by the exact place string.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct OverrideTable(HashMap<String, BoundingBox>);

impl OverrideTable {
    pub fn lookup(&self, place: &str) -> Option<BoundingBox> {
        self.0.get(place).copied()
    }
}

impl Default for OverrideTable {
    fn default() -> Self {
        let entries = [
            ("Los Angeles, California", [34.15, 33.94, -118.2, -118.28]),
            ("Chicago, Illinois, United States", [41.925359, 41.821333, -87.582386, -87.686600]),
            ("New York City, New York, United States", [40.771311, 40.671314, -73.951456, -74.055138]),
            ("Santiago, Chile", [-33.371278, -33.515664, -70.572588, -70.730517]),
        ];
        OverrideTable(
            entries.into_iter()
                .map(|(name, bbox)| (name.to_string(), bbox.into()))
                .collect()
        )
    }
}
