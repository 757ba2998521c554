use std::collections::HashMap;

use geo::Coord;

use self::layer::Layer;
use self::osm::{Node, OsmId, Relation, Way};
use self::place::Area;
use self::road::RoadEdge;

pub mod layer;
pub mod osm;
pub mod place;
pub mod road;

/// Map data as returned by one Overpass query. Elements are kept without any
/// processing; untagged nodes are only there to give ways their geometry.
#[derive(Debug, Default, Clone)]
pub struct OsmMapData {
    pub nodes: HashMap<OsmId, Node>,
    pub ways: HashMap<OsmId, Way>,
    pub relations: HashMap<OsmId, Relation>,
}

impl OsmMapData {
    pub fn node_coord(&self, id: OsmId) -> Option<Coord> {
        self.nodes.get(&id).map(|node| Coord { x: node.lon, y: node.lat })
    }

    /// Coordinates of a way, or None if the response is missing any of its nodes.
    pub fn way_coords(&self, way: &Way) -> Option<Vec<Coord>> {
        way.node_ids.iter()
            .map(|id| self.node_coord(*id))
            .collect()
    }
}

/// Everything we draw for one city. Owned by a single place's run and dropped
/// once its image is written.
#[derive(Debug, Clone)]
pub struct CityLayers {
    pub area: Area,
    pub roads: Vec<RoadEdge>,
    pub buildings: Layer,
    pub parkings: Layer,
    pub parks: Layer,
    pub waterways: Layer,
    pub big_water: Layer,
}
