pub mod http;
pub mod nominatim;
pub mod overpass;

use crate::data::osm::Tags;
use crate::data::place::{Area, QueryExtent};
use crate::data::OsmMapData;
use crate::errors::Result;

/// Accepted values for one tag key.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Any,
    Exact(String),
    OneOf(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagClause {
    pub key: String,
    pub value: TagValue,
}

/// Union of tag clauses: an element matches if any clause matches.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TagFilter {
    pub clauses: Vec<TagClause>,
}

impl TagFilter {
    pub fn new() -> Self {
        TagFilter::default()
    }

    pub fn has(mut self, key: &str) -> Self {
        self.clauses.push(TagClause { key: key.to_string(), value: TagValue::Any });
        self
    }

    pub fn equals(mut self, key: &str, value: &str) -> Self {
        self.clauses.push(TagClause {
            key: key.to_string(),
            value: TagValue::Exact(value.to_string()),
        });
        self
    }

    pub fn one_of(mut self, key: &str, values: &[&str]) -> Self {
        self.clauses.push(TagClause {
            key: key.to_string(),
            value: TagValue::OneOf(values.iter().map(|v| v.to_string()).collect()),
        });
        self
    }

    pub fn matches(&self, tags: &Tags) -> bool {
        self.clauses.iter().any(|clause| {
            match (tags.get(&clause.key), &clause.value) {
                (None, _) => false,
                (Some(_), TagValue::Any) => true,
                (Some(actual), TagValue::Exact(expected)) => actual == expected,
                (Some(actual), TagValue::OneOf(values)) => values.contains(actual),
            }
        })
    }
}

/// Shape of the elements a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Nodes, ways and relations carrying the tags.
    Features,
    /// Drivable ways only.
    Roads,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRequest {
    pub extent: QueryExtent,
    pub filter: TagFilter,
    pub selection: Selection,
}

/// The external geocoding and feature services.
pub trait FeatureService {
    /// Resolve a place name to its administrative area.
    fn geocode(&self, place: &str) -> Result<Area>;

    /// Run one feature query and return the raw OSM elements.
    fn fetch(&self, request: &FeatureRequest) -> Result<OsmMapData>;
}
