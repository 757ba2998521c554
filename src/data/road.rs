use std::collections::HashMap;

use geo::{Coord, HaversineLength, LineString};

use super::osm::{OsmId, Tags, Way};
use super::OsmMapData;

pub const MOTORWAY_TIER: [&str; 2] = ["motorway", "motorway_link"];
pub const OTHER_DRIVABLE: [&str; 8] = [
    "primary",
    "primary_link",
    "secondary",
    "secondary_link",
    "tertiary",
    "service",
    "residential",
    "trunk",
];

/// Identity of an edge in the road graph: its endpoints and the way it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub u: OsmId,
    pub v: OsmId,
    pub way_id: OsmId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoadEdge {
    pub key: EdgeKey,
    pub highway: String,
    pub bridge: Option<String>,
    pub name: Option<String>,
    pub oneway: bool,
    pub geometry: LineString,
    pub length_m: f64,
}

impl RoadEdge {
    pub fn is_motorway_tier(&self) -> bool {
        MOTORWAY_TIER.contains(&self.highway.as_str())
    }

    pub fn has_bridge(&self) -> bool {
        self.bridge.as_deref().is_some_and(|bridge| !bridge.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
    Both,
}

fn direction(tags: &Tags) -> Direction {
    match tags.get("oneway").map(String::as_str) {
        Some("yes") | Some("true") | Some("1") => Direction::Forward,
        Some("-1") | Some("reverse") => Direction::Reverse,
        Some("no") | Some("false") | Some("0") => Direction::Both,
        _ => {
            let implied_oneway = tags.get("highway").is_some_and(|h| h == "motorway")
                || tags.get("junction").is_some_and(|j| j == "roundabout");
            if implied_oneway {
                Direction::Forward
            } else {
                Direction::Both
            }
        }
    }
}

/// Directed road network. Ways are split at intersections, so every edge runs
/// between two nodes that are either way endpoints or shared by several ways.
#[derive(Debug, Clone, Default)]
pub struct RoadGraph {
    pub nodes: HashMap<OsmId, Coord>,
    pub edges: HashMap<EdgeKey, RoadEdge>,
}

/// Where a segment that closes on itself is cut so that no piece starts and
/// ends on the same node. Edge keys are per node pair, so a ring left whole
/// would have its two directions collapse into one key.
fn loop_cuts(start: usize, end: usize) -> Vec<usize> {
    let steps = end - start;
    match steps {
        0 | 1 => Vec::new(),
        2 => vec![start + 1],
        _ => vec![start + steps / 3, start + 2 * steps / 3],
    }
}

impl RoadGraph {
    pub fn from_osm(data: &OsmMapData) -> RoadGraph {
        let mut ways: Vec<&Way> = data.ways.values()
            .filter(|way| way.tags.contains_key("highway") && way.node_ids.len() >= 2)
            .collect();
        ways.sort_by_key(|way| way.id);

        let mut uses_per_node: HashMap<OsmId, usize> = HashMap::new();
        for way in &ways {
            for id in &way.node_ids {
                *uses_per_node.entry(*id).or_insert(0) += 1;
            }
        }

        let mut graph = RoadGraph::default();
        for way in ways {
            let Some(coords) = data.way_coords(way) else {
                log::debug!(way_id = way.id; "Skipping way with nodes missing from response");
                continue;
            };
            let last = way.node_ids.len() - 1;
            let mut start = 0;
            for idx in 1..=last {
                let node_id = way.node_ids[idx];
                let is_intersection = idx == last || uses_per_node.get(&node_id).copied().unwrap_or(0) >= 2;
                if !is_intersection {
                    continue;
                }
                if way.node_ids[start] == node_id {
                    // Repeated node, nothing to draw.
                    if idx - start < 2 {
                        start = idx;
                        continue;
                    }
                    for cut in loop_cuts(start, idx) {
                        graph.add_segment(way, &way.node_ids[start..=cut], &coords[start..=cut]);
                        start = cut;
                    }
                }
                graph.add_segment(way, &way.node_ids[start..=idx], &coords[start..=idx]);
                start = idx;
            }
        }
        graph
    }

    fn add_segment(&mut self, way: &Way, node_ids: &[OsmId], coords: &[Coord]) {
        for (id, coord) in node_ids.iter().zip(coords) {
            self.nodes.insert(*id, *coord);
        }
        let u = node_ids[0];
        let v = node_ids[node_ids.len() - 1];
        let forward: LineString = coords.to_vec().into();
        let dir = direction(&way.tags);
        let oneway = dir != Direction::Both;

        if dir != Direction::Reverse {
            self.insert_edge(way, EdgeKey { u, v, way_id: way.id }, forward.clone(), oneway);
        }
        if dir != Direction::Forward {
            let mut backward = forward;
            backward.0.reverse();
            self.insert_edge(way, EdgeKey { u: v, v: u, way_id: way.id }, backward, oneway);
        }
    }

    fn insert_edge(&mut self, way: &Way, key: EdgeKey, geometry: LineString, oneway: bool) {
        let length_m = geometry.haversine_length();
        self.edges.insert(key, RoadEdge {
            key,
            highway: way.tags.get("highway").cloned().unwrap_or_default(),
            bridge: way.tags.get("bridge").cloned(),
            name: way.tags.get("name").cloned(),
            oneway,
            geometry,
            length_m,
        });
    }

    /// Union of both graphs. Nodes coalesce by id; an edge present in both
    /// keeps a single copy with `other`'s attributes.
    pub fn compose(mut self, other: RoadGraph) -> RoadGraph {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
        self
    }

    pub fn into_edges(self) -> Vec<RoadEdge> {
        let mut edges: Vec<RoadEdge> = self.edges.into_values().collect();
        edges.sort_by_key(|edge| edge.key);
        edges
    }
}

/// Keep motorway-tier edges and bridges of any class; drop everything else.
pub fn keep_motorways_and_bridges(edges: Vec<RoadEdge>) -> Vec<RoadEdge> {
    edges.into_iter()
        .filter(|edge| edge.is_motorway_tier() || edge.has_bridge())
        .collect()
}
