use std::fmt;

use geo::Geometry;

use super::osm::{OsmId, Tags};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Buildings,
    Parkings,
    Parks,
    Waterways,
    BigWater,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerKind::Buildings => "buildings",
            LayerKind::Parkings => "parkings",
            LayerKind::Parks => "parks",
            LayerKind::Waterways => "waterways",
            LayerKind::BigWater => "big_water",
        };
        f.write_str(name)
    }
}

/// One geometry with the tags of the element it came from. Big-water polygons
/// have no OSM id and no tags.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub osm_id: Option<OsmId>,
    pub geometry: Geometry,
    pub tags: Tags,
}

impl Feature {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn is_point(&self) -> bool {
        matches!(self.geometry, Geometry::Point(_) | Geometry::MultiPoint(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub kind: LayerKind,
    pub features: Vec<Feature>,
}

impl Layer {
    pub fn new(kind: LayerKind, features: Vec<Feature>) -> Self {
        Layer { kind, features }
    }

    pub fn empty(kind: LayerKind) -> Self {
        Layer::new(kind, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
