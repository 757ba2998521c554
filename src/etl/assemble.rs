use geo::{Contains, Coord, Geometry, LineString, MultiPolygon, Point, Polygon};

use crate::data::layer::Feature;
use crate::data::osm::{MemberType, OsmId, Relation, Tags, Way};
use crate::data::OsmMapData;
use crate::service::TagFilter;

/// Waterways that are drawn as lines even when the way happens to close.
const LINEAR_WATERWAYS: [&str; 5] = ["river", "stream", "canal", "drain", "ditch"];

const METERS_PER_DEGREE: f64 = 111_320.0;

fn is_area(tags: &Tags) -> bool {
    match tags.get("area").map(String::as_str) {
        Some("yes") => return true,
        Some("no") => return false,
        _ => (),
    }
    if tags.get("waterway").is_some_and(|w| LINEAR_WATERWAYS.contains(&w.as_str())) {
        return false;
    }
    !(tags.contains_key("highway") || tags.contains_key("barrier"))
}

fn way_geometry(data: &OsmMapData, way: &Way) -> Option<Geometry> {
    let coords = data.way_coords(way)?;
    if coords.len() < 2 {
        return None;
    }
    if way.is_closed() && is_area(&way.tags) {
        Some(Geometry::Polygon(Polygon::new(LineString::new(coords), vec![])))
    } else {
        Some(Geometry::LineString(LineString::new(coords)))
    }
}

/// Glues member ways end to end into closed rings, working on node ids so
/// shared endpoints compare exactly. Chains that never close are dropped.
fn glue_rings(mut parts: Vec<Vec<OsmId>>) -> Vec<Vec<OsmId>> {
    let mut rings = Vec::new();
    parts.retain(|part| {
        if part.len() >= 4 && part.first() == part.last() {
            rings.push(part.clone());
            false
        } else {
            part.len() >= 2
        }
    });

    while let Some(mut current) = parts.pop() {
        loop {
            let (Some(&first), Some(&last)) = (current.first(), current.last()) else {
                break;
            };
            if current.len() >= 4 && first == last {
                rings.push(current);
                break;
            }
            let Some(idx) = parts.iter().position(|part| part.first() == Some(&last) || part.last() == Some(&last)) else {
                log::debug!(dangling_nodes = current.len(); "Dropping multipolygon chain that does not close");
                break;
            };
            let mut next = parts.remove(idx);
            if next.first() != Some(&last) {
                next.reverse();
            }
            current.extend(next.into_iter().skip(1));
        }
    }
    rings
}

fn ring_coords(data: &OsmMapData, ring: &[OsmId]) -> Option<LineString> {
    ring.iter()
        .map(|id| data.node_coord(*id))
        .collect::<Option<Vec<Coord>>>()
        .map(LineString::new)
}

fn member_parts(data: &OsmMapData, relation: &Relation, inner: bool) -> Vec<Vec<OsmId>> {
    relation.members.iter()
        .filter(|member| member.member_type == MemberType::Way)
        .filter(|member| (member.role == "inner") == inner)
        .filter_map(|member| data.ways.get(&member.id))
        .map(|way| way.node_ids.clone())
        .collect()
}

fn relation_geometry(data: &OsmMapData, relation: &Relation) -> Option<Geometry> {
    let kind = relation.tags.get("type").map(String::as_str);
    if !matches!(kind, Some("multipolygon") | Some("boundary")) {
        return None;
    }

    let mut polygons: Vec<Polygon> = glue_rings(member_parts(data, relation, false))
        .iter()
        .filter_map(|ring| ring_coords(data, ring))
        .map(|exterior| Polygon::new(exterior, vec![]))
        .collect();
    if polygons.is_empty() {
        return None;
    }

    for ring in glue_rings(member_parts(data, relation, true)) {
        let Some(hole) = ring_coords(data, &ring) else {
            continue;
        };
        let Some(first) = hole.0.first().copied() else {
            continue;
        };
        if let Some(outer) = polygons.iter_mut().find(|p| p.contains(&Point::from(first))) {
            outer.interiors_push(hole);
        }
    }

    Some(Geometry::MultiPolygon(MultiPolygon::new(polygons)))
}

/// Turns the elements of one Overpass response that match `filter` into
/// features. Untagged nodes and member ways only contribute geometry.
pub fn assemble_features(data: &OsmMapData, filter: &TagFilter) -> Vec<Feature> {
    let mut features = Vec::new();

    let mut nodes: Vec<_> = data.nodes.values().filter(|n| filter.matches(&n.tags)).collect();
    nodes.sort_by_key(|n| n.id);
    for node in nodes {
        features.push(Feature {
            osm_id: Some(node.id),
            geometry: Geometry::Point(Point::new(node.lon, node.lat)),
            tags: node.tags.clone(),
        });
    }

    let mut ways: Vec<_> = data.ways.values().filter(|w| filter.matches(&w.tags)).collect();
    ways.sort_by_key(|w| w.id);
    for way in ways {
        if let Some(geometry) = way_geometry(data, way) {
            features.push(Feature {
                osm_id: Some(way.id),
                geometry,
                tags: way.tags.clone(),
            });
        }
    }

    let mut relations: Vec<_> = data.relations.values().filter(|r| filter.matches(&r.tags)).collect();
    relations.sort_by_key(|r| r.id);
    for relation in relations {
        if let Some(geometry) = relation_geometry(data, relation) {
            features.push(Feature {
                osm_id: Some(relation.id),
                geometry,
                tags: relation.tags.clone(),
            });
        }
    }

    features
}

fn segment_quad(a: Coord, b: Coord, meters: f64) -> Option<Polygon> {
    let lat = ((a.y + b.y) / 2.0).to_radians();
    let m_per_deg_lon = METERS_PER_DEGREE * lat.cos();
    let m_per_deg_lat = METERS_PER_DEGREE;

    let dx = (b.x - a.x) * m_per_deg_lon;
    let dy = (b.y - a.y) * m_per_deg_lat;
    let len = dx.hypot(dy);
    if len == 0.0 || m_per_deg_lon == 0.0 {
        return None;
    }
    let offset = Coord {
        x: -dy / len * meters / m_per_deg_lon,
        y: dx / len * meters / m_per_deg_lat,
    };
    Some(Polygon::new(
        LineString::new(vec![a + offset, b + offset, b - offset, a - offset, a + offset]),
        vec![],
    ))
}

fn buffer_line(line: &LineString, meters: f64) -> Vec<Polygon> {
    line.lines()
        .filter_map(|segment| segment_quad(segment.start, segment.end, meters))
        .collect()
}

/// Gives line features area by sweeping a band of `meters` on either side of
/// every segment. Points and polygons pass through unchanged.
pub fn buffer_linear_features(features: Vec<Feature>, meters: f64) -> Vec<Feature> {
    features.into_iter()
        .map(|feature| {
            let bands = match &feature.geometry {
                Geometry::LineString(line) => Some(buffer_line(line, meters)),
                Geometry::MultiLineString(lines) => Some(lines.iter()
                    .flat_map(|line| buffer_line(line, meters))
                    .collect()),
                _ => None,
            };
            match bands {
                Some(bands) => Feature {
                    geometry: Geometry::MultiPolygon(MultiPolygon::new(bands)),
                    ..feature
                },
                None => feature,
            }
        })
        .collect()
}
