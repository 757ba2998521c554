use std::path::Path;

use crate::data::layer::{Layer, LayerKind};
use crate::data::place::{Area, OverrideTable};
use crate::data::road::{keep_motorways_and_bridges, RoadEdge, RoadGraph, MOTORWAY_TIER, OTHER_DRIVABLE};
use crate::data::CityLayers;
use crate::errors::Result;
use crate::service::{FeatureRequest, FeatureService, Selection, TagFilter};

use super::assemble::{assemble_features, buffer_linear_features};
use super::big_water::attach_big_water;

/// Tag filter selecting the features of one layer.
pub fn layer_filter(kind: LayerKind) -> TagFilter {
    match kind {
        LayerKind::Buildings => TagFilter::new().has("building"),
        LayerKind::Parkings => TagFilter::new().equals("amenity", "parking"),
        LayerKind::Parks => TagFilter::new()
            .equals("leisure", "park")
            .equals("landuse", "grass"),
        LayerKind::Waterways => TagFilter::new()
            .has("water")
            .one_of("natural", &["bay", "strait", "water"])
            .has("waterway"),
        // Comes from the static dataset, not from a tag query.
        LayerKind::BigWater => TagFilter::new(),
    }
}

/// Pulls every layer of a place from the feature service, one blocking query
/// at a time. The first failure aborts the place.
pub struct LayerFetcher<'a, S: FeatureService> {
    service: &'a S,
    overrides: &'a OverrideTable,
    water_polygons: Option<&'a Path>,
    waterway_buffer_m: f64,
}

impl<'a, S: FeatureService> LayerFetcher<'a, S> {
    pub fn new(
        service: &'a S,
        overrides: &'a OverrideTable,
        water_polygons: Option<&'a Path>,
        waterway_buffer_m: f64,
    ) -> Self {
        LayerFetcher {
            service,
            overrides,
            water_polygons,
            waterway_buffer_m,
        }
    }

    /// Override places are never geocoded: their rectangle is the area.
    pub fn resolve(&self, place: &str) -> Result<Area> {
        if let Some(bbox) = self.overrides.lookup(place) {
            log::info!(place = place; "Using override bounding box");
            return Ok(Area::from_bbox(place, bbox));
        }
        log::info!(place = place; "Resolving place by name");
        self.service.geocode(place)
    }

    fn road_graph(&self, area: &Area, classes: &[&str]) -> Result<RoadGraph> {
        let request = FeatureRequest {
            extent: area.extent,
            filter: TagFilter::new().one_of("highway", classes),
            selection: Selection::Roads,
        };
        Ok(RoadGraph::from_osm(&self.service.fetch(&request)?))
    }

    /// Motorways and other drivable roads are queried separately: a single
    /// broad query loses bridge-tagged secondary roads in some cities (Miami).
    pub fn fetch_roads(&self, area: &Area) -> Result<Vec<RoadEdge>> {
        log::info!(place = area.name.as_str(); "Extracting roads");
        let motorways = self.road_graph(area, &MOTORWAY_TIER)?;
        let others = self.road_graph(area, &OTHER_DRIVABLE)?;

        let edges = motorways.compose(others).into_edges();
        let total = edges.len();
        let kept = keep_motorways_and_bridges(edges);
        log::info!(place = area.name.as_str(), edges = total, kept = kept.len(); "Selected highways and bridges");
        Ok(kept)
    }

    pub fn fetch_layer(&self, area: &Area, kind: LayerKind) -> Result<Layer> {
        log::info!(place = area.name.as_str(), layer = kind.to_string().as_str(); "Extracting layer");
        let filter = layer_filter(kind);
        let request = FeatureRequest {
            extent: area.extent,
            filter: filter.clone(),
            selection: Selection::Features,
        };
        let data = self.service.fetch(&request)?;
        let mut features = assemble_features(&data, &filter);
        if kind == LayerKind::Waterways {
            features = buffer_linear_features(features, self.waterway_buffer_m);
        }
        log::info!(place = area.name.as_str(), layer = kind.to_string().as_str(), objects = features.len(); "Layer extracted");
        Ok(Layer::new(kind, features))
    }

    pub fn fetch_big_water(&self, area: &Area) -> Result<Layer> {
        match self.water_polygons {
            Some(path) => attach_big_water(path, &area.bbox),
            None => {
                log::warn!(place = area.name.as_str(); "No water polygon dataset configured, skipping big water");
                Ok(Layer::empty(LayerKind::BigWater))
            },
        }
    }

    pub fn fetch(&self, place: &str) -> Result<CityLayers> {
        let area = self.resolve(place)?;
        let roads = self.fetch_roads(&area)?;
        let buildings = self.fetch_layer(&area, LayerKind::Buildings)?;
        let parkings = self.fetch_layer(&area, LayerKind::Parkings)?;
        let parks = self.fetch_layer(&area, LayerKind::Parks)?;
        let waterways = self.fetch_layer(&area, LayerKind::Waterways)?;
        let big_water = self.fetch_big_water(&area)?;

        Ok(CityLayers {
            area,
            roads,
            buildings,
            parkings,
            parks,
            waterways,
            big_water,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use geo::{LineString, MultiPolygon, Polygon};

    use super::*;
    use crate::data::osm::{Node, OsmId, Tags, Way};
    use crate::data::place::{BoundingBox, QueryExtent};
    use crate::data::OsmMapData;
    use crate::errors::{Error, ErrorKind};
    use crate::service::TagValue;

    /// Stands in for Nominatim and Overpass, remembering what was asked.
    #[derive(Default)]
    pub struct RecordingService {
        pub geocode_calls: Cell<usize>,
        pub requests: RefCell<Vec<FeatureRequest>>,
        pub roads: OsmMapData,
        pub fail_on: Option<String>,
    }

    impl FeatureService for RecordingService {
        fn geocode(&self, place: &str) -> Result<Area> {
            self.geocode_calls.set(self.geocode_calls.get() + 1);
            let square = Polygon::new(
                LineString::from(vec![(-83.3, 42.2), (-82.9, 42.2), (-82.9, 42.5), (-83.3, 42.5), (-83.3, 42.2)]),
                vec![],
            );
            Area::from_geometry(place, MultiPolygon::new(vec![square]), QueryExtent::Named { area_id: 3_600_134_591 })
                .ok_or_else(|| Error::resolution("empty"))
        }

        fn fetch(&self, request: &FeatureRequest) -> Result<OsmMapData> {
            self.requests.borrow_mut().push(request.clone());
            let key = request.filter.clauses.first().map(|c| c.key.clone());
            if key.is_some() && key == self.fail_on {
                return Err(Error::query("Overpass timed out"));
            }
            match request.selection {
                Selection::Roads => Ok(self.roads.clone()),
                Selection::Features => Ok(OsmMapData::default()),
            }
        }
    }

    fn road_data() -> OsmMapData {
        let mut data = OsmMapData::default();
        for id in 1..=6 {
            data.nodes.insert(id, Node { id, lon: -83.0 + id as f64 * 0.01, lat: 42.3, tags: Tags::new() });
        }
        let ways: [(OsmId, Vec<OsmId>, Vec<(&str, &str)>); 3] = [
            (1, vec![1, 2], vec![("highway", "motorway")]),
            (2, vec![3, 4], vec![("highway", "secondary"), ("bridge", "yes"), ("oneway", "yes")]),
            (3, vec![5, 6], vec![("highway", "residential"), ("oneway", "yes")]),
        ];
        for (id, node_ids, tags) in ways {
            let tags = tags.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
            data.ways.insert(id, Way { id, node_ids, tags });
        }
        data
    }

    #[test]
    fn override_places_query_by_bbox_only() {
        let service = RecordingService::default();
        let overrides = OverrideTable::default();
        let fetcher = LayerFetcher::new(&service, &overrides, None, 50.0);

        let layers = fetcher.fetch("Chicago, Illinois, United States").unwrap();

        let chicago = BoundingBox { north: 41.925359, south: 41.821333, east: -87.582386, west: -87.686600 };
        assert_eq!(service.geocode_calls.get(), 0);
        assert_eq!(layers.area.bbox, chicago);
        let requests = service.requests.borrow();
        // Two road passes plus four feature layers.
        assert_eq!(requests.len(), 6);
        for request in requests.iter() {
            assert_eq!(request.extent, QueryExtent::BoundingBox(chicago));
        }
    }

    #[test]
    fn other_places_query_by_name() {
        let service = RecordingService::default();
        let overrides = OverrideTable::default();
        let fetcher = LayerFetcher::new(&service, &overrides, None, 50.0);

        let layers = fetcher.fetch("Detroit, Michigan, USA").unwrap();

        assert_eq!(service.geocode_calls.get(), 1);
        assert!(layers.big_water.is_empty());
        let requests = service.requests.borrow();
        assert_eq!(requests.len(), 6);
        for request in requests.iter() {
            assert_eq!(request.extent, QueryExtent::Named { area_id: 3_600_134_591 });
        }
        let feature_keys: Vec<&str> = requests.iter()
            .filter(|r| r.selection == Selection::Features)
            .map(|r| r.filter.clauses[0].key.as_str())
            .collect();
        assert_eq!(feature_keys, vec!["building", "amenity", "leisure", "water"]);
    }

    #[test]
    fn roads_come_from_two_passes() {
        let service = RecordingService { roads: road_data(), ..Default::default() };
        let overrides = OverrideTable::default();
        let fetcher = LayerFetcher::new(&service, &overrides, None, 50.0);
        let area = fetcher.resolve("Miami, Florida").unwrap();

        let roads = fetcher.fetch_roads(&area).unwrap();

        let requests = service.requests.borrow();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].filter.clauses[0].value, TagValue::OneOf(vec!["motorway".to_string(), "motorway_link".to_string()]));
        assert!(matches!(&requests[1].filter.clauses[0].value, TagValue::OneOf(classes) if classes.len() == OTHER_DRIVABLE.len()));

        let ways: Vec<OsmId> = roads.iter().map(|edge| edge.key.way_id).collect();
        assert_eq!(ways, vec![1, 2]);
    }

    #[test]
    fn a_failing_layer_aborts_the_place() {
        let service = RecordingService { fail_on: Some("amenity".to_string()), ..Default::default() };
        let overrides = OverrideTable::default();
        let fetcher = LayerFetcher::new(&service, &overrides, None, 50.0);

        let err = fetcher.fetch("Detroit, Michigan, USA").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Query);
        // Nothing after the parkings query was attempted.
        let last = service.requests.borrow().last().map(|r| r.filter.clauses[0].key.clone());
        assert_eq!(last.as_deref(), Some("amenity"));
    }
}
