use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::data::osm::{Member, MemberType, Node, OsmId, Relation, Tags, Way};
use crate::data::OsmMapData;
use crate::errors::{Error, Result};

enum ParserState {
    Top,
    Node(Node),
    Way(Way),
    Relation(Relation),
    Remark,
}

fn attributes(el: &BytesStart) -> Result<Vec<(Vec<u8>, String)>> {
    let mut out = Vec::new();
    for attribute_res in el.attributes() {
        let attribute = attribute_res?;
        let value: Cow<str> = attribute.unescape_value()?;
        out.push((attribute.key.as_ref().to_vec(), value.into_owned()));
    }
    Ok(out)
}

fn parse_id(el: &BytesStart) -> Result<OsmId> {
    for (key, value) in attributes(el)? {
        if key == b"id" {
            return Ok(value.parse()?);
        }
    }
    Err("OSM element without id".into())
}

fn parse_node(el: &BytesStart) -> Result<Node> {
    let mut id: Option<OsmId> = None;
    let mut lat: Option<f64> = None;
    let mut lon: Option<f64> = None;

    for (key, value) in attributes(el)? {
        match key.as_slice() {
            b"id" => id = Some(value.parse()?),
            b"lat" => lat = Some(value.parse()?),
            b"lon" => lon = Some(value.parse()?),
            _ => (),
        }
    }

    Ok(Node {
        id: id.ok_or("node without id")?,
        lat: lat.ok_or("node without lat")?,
        lon: lon.ok_or("node without lon")?,
        tags: Tags::new(),
    })
}

fn parse_tag(el: &BytesStart) -> Result<(String, String)> {
    let mut k = None;
    let mut v = None;
    for (key, value) in attributes(el)? {
        match key.as_slice() {
            b"k" => k = Some(value),
            b"v" => v = Some(value),
            _ => (),
        }
    }
    Ok((k.ok_or("tag without key")?, v.unwrap_or_default()))
}

fn parse_nd(el: &BytesStart) -> Result<OsmId> {
    for (key, value) in attributes(el)? {
        if key == b"ref" {
            return Ok(value.parse()?);
        }
    }
    Err("nd without ref".into())
}

fn parse_member(el: &BytesStart) -> Result<Member> {
    let mut member_type = None;
    let mut id = None;
    let mut role = String::new();
    for (key, value) in attributes(el)? {
        match key.as_slice() {
            b"type" => member_type = Some(match value.as_str() {
                "node" => MemberType::Node,
                "way" => MemberType::Way,
                "relation" => MemberType::Relation,
                other => return Err(format!("unknown member type {}", other).into()),
            }),
            b"ref" => id = Some(value.parse()?),
            b"role" => role = value,
            _ => (),
        }
    }
    Ok(Member {
        member_type: member_type.ok_or("member without type")?,
        id: id.ok_or("member without ref")?,
        role,
    })
}

fn add_tag(state: &mut ParserState, (key, value): (String, String)) {
    match state {
        ParserState::Node(node) => { node.tags.insert(key, value); },
        ParserState::Way(way) => { way.tags.insert(key, value); },
        ParserState::Relation(relation) => { relation.tags.insert(key, value); },
        _ => (),
    }
}

fn finish(state: ParserState, data: &mut OsmMapData) {
    match state {
        ParserState::Node(node) => { data.nodes.insert(node.id, node); },
        ParserState::Way(way) => { data.ways.insert(way.id, way); },
        ParserState::Relation(relation) => { data.relations.insert(relation.id, relation); },
        _ => (),
    }
}

/// Parses an Overpass `[out:xml]` response. A response carrying a runtime
/// error remark (timeouts, memory exhaustion) is a query failure even though
/// the server answered 200.
pub fn parse_overpass_xml(xml: &str) -> Result<OsmMapData> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut data = OsmMapData::default();
    let mut state = ParserState::Top;
    let mut remarks = String::new();

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) => {
                state = match e.name().as_ref() {
                    b"node" => ParserState::Node(parse_node(&e)?),
                    b"way" => ParserState::Way(Way {
                        id: parse_id(&e)?,
                        node_ids: Vec::new(),
                        tags: Tags::new(),
                    }),
                    b"relation" => ParserState::Relation(Relation {
                        id: parse_id(&e)?,
                        members: Vec::new(),
                        tags: Tags::new(),
                    }),
                    b"remark" => ParserState::Remark,
                    _ => state,
                };
            },
            Event::Empty(e) => {
                match e.name().as_ref() {
                    b"node" => finish(ParserState::Node(parse_node(&e)?), &mut data),
                    b"tag" => add_tag(&mut state, parse_tag(&e)?),
                    b"nd" => {
                        if let ParserState::Way(way) = &mut state {
                            way.node_ids.push(parse_nd(&e)?);
                        }
                    },
                    b"member" => {
                        if let ParserState::Relation(relation) = &mut state {
                            relation.members.push(parse_member(&e)?);
                        }
                    },
                    _ => (),
                }
            },
            Event::End(e) => {
                if matches!(e.name().as_ref(), b"node" | b"way" | b"relation" | b"remark") {
                    finish(std::mem::replace(&mut state, ParserState::Top), &mut data);
                }
            },
            Event::Text(e) => {
                if let ParserState::Remark = state {
                    remarks.push_str(&e.unescape()?);
                }
            },
            // Declarations, comments and the like carry nothing we need.
            _ => (),
        }
    }

    if remarks.contains("runtime error") {
        return Err(Error::query(remarks.trim().to_string()));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    const RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="Overpass API">
<note>The data included in this document is from www.openstreetmap.org.</note>
<meta osm_base="2024-01-01T00:00:00Z"/>
  <node id="1" lat="42.30" lon="-83.00"/>
  <node id="2" lat="42.31" lon="-83.00"/>
  <node id="3" lat="42.31" lon="-83.01">
    <tag k="amenity" v="parking"/>
    <tag k="name" v="Lot &amp; Garage"/>
  </node>
  <way id="10">
    <nd ref="1"/>
    <nd ref="2"/>
    <nd ref="3"/>
    <nd ref="1"/>
    <tag k="building" v="yes"/>
  </way>
  <relation id="20">
    <member type="way" ref="10" role="outer"/>
    <tag k="type" v="multipolygon"/>
    <tag k="leisure" v="park"/>
  </relation>
</osm>"#;

    #[test]
    fn parses_all_element_types() {
        let data = parse_overpass_xml(RESPONSE).unwrap();

        assert_eq!(data.nodes.len(), 3);
        assert_eq!(data.nodes[&1].lat, 42.30);
        assert!(data.nodes[&1].tags.is_empty());
        assert_eq!(data.nodes[&3].tags["name"], "Lot & Garage");

        let way = &data.ways[&10];
        assert_eq!(way.node_ids, vec![1, 2, 3, 1]);
        assert!(way.is_closed());
        assert_eq!(way.tags["building"], "yes");

        let relation = &data.relations[&20];
        assert_eq!(relation.members, vec![Member { member_type: MemberType::Way, id: 10, role: "outer".to_string() }]);
        assert_eq!(relation.tags["leisure"], "park");
    }

    #[test]
    fn runtime_error_remark_is_a_query_error() {
        let xml = r#"<osm><remark> runtime error: Query timed out in "query" at line 3 after 26 seconds. </remark></osm>"#;
        let err = parse_overpass_xml(xml).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Query);
        assert!(err.message.starts_with("runtime error"));
    }

    #[test]
    fn malformed_numbers_are_parse_errors() {
        let err = parse_overpass_xml(r#"<osm><node id="x" lat="1" lon="2"/></osm>"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
    }
}
