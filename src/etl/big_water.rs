use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::fs;
use std::path::Path;

use geo::{BoundingRect, Contains, Coord, Geometry, Intersects, LineString, MapCoords, Point, Polygon, Rect};
use shapefile::PolygonRing;

use crate::data::layer::{Feature, Layer, LayerKind};
use crate::data::osm::Tags;
use crate::data::place::BoundingBox;
use crate::errors::{Error, Result};

/// Spherical Web Mercator radius (EPSG:3857).
const EARTH_RADIUS_M: f64 = 6_378_137.0;
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// Coordinate reference of the water-polygon file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeCrs {
    Wgs84,
    WebMercator,
}

impl NativeCrs {
    /// Reads the CRS from the `.prj` WKT next to the shapefile. No `.prj`
    /// means plain WGS84 lon/lat. Of the projected systems only spherical Web
    /// Mercator is understood; ellipsoidal Mercator (World Mercator,
    /// `Mercator_1SP`) puts latitudes tens of km off and is refused.
    pub fn from_prj(wkt: Option<&str>) -> Result<NativeCrs> {
        let Some(wkt) = wkt else {
            return Ok(NativeCrs::Wgs84);
        };
        if wkt.contains("PROJCS") {
            let spherical = wkt.contains("Pseudo")
                || wkt.contains("Mercator_Auxiliary_Sphere")
                || wkt.contains("\"3857\"");
            if spherical {
                return Ok(NativeCrs::WebMercator);
            }
            return Err(Error::file_access(format!("unsupported water polygon projection: {}", wkt)));
        }
        if wkt.contains("GEOGCS") {
            return Ok(NativeCrs::Wgs84);
        }
        Err(Error::file_access(format!("unrecognised water polygon CRS: {}", wkt)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            NativeCrs::Wgs84 => "EPSG:4326",
            NativeCrs::WebMercator => "EPSG:3857",
        }
    }

    fn project(&self, c: Coord) -> Coord {
        match self {
            NativeCrs::Wgs84 => c,
            NativeCrs::WebMercator => {
                let lat = c.y.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
                Coord {
                    x: EARTH_RADIUS_M * c.x.to_radians(),
                    y: EARTH_RADIUS_M * (FRAC_PI_4 + lat / 2.0).tan().ln(),
                }
            },
        }
    }

    fn unproject(&self, c: Coord) -> Coord {
        match self {
            NativeCrs::Wgs84 => c,
            NativeCrs::WebMercator => Coord {
                x: (c.x / EARTH_RADIUS_M).to_degrees(),
                y: (2.0 * (c.y / EARTH_RADIUS_M).exp().atan() - FRAC_PI_2).to_degrees(),
            },
        }
    }

    /// The WGS84 bbox expressed in this CRS.
    pub fn rect_from_wgs84(&self, bbox: &BoundingBox) -> Rect {
        let rect = bbox.to_rect();
        Rect::new(self.project(rect.min()), self.project(rect.max()))
    }
}

fn ring_to_line(ring: &PolygonRing<shapefile::Point>) -> LineString {
    ring.points().iter()
        .map(|p| Coord { x: p.x, y: p.y })
        .collect::<Vec<Coord>>()
        .into()
}

/// Shapefile polygons may hold several outer rings; each becomes its own
/// polygon and holes go to the outer ring containing them.
fn to_geo_polygons(shape: &shapefile::Polygon) -> Vec<Polygon> {
    let mut polygons: Vec<Polygon> = shape.rings().iter()
        .filter(|ring| matches!(ring, PolygonRing::Outer(_)))
        .map(|ring| Polygon::new(ring_to_line(ring), vec![]))
        .collect();

    for ring in shape.rings().iter().filter(|ring| matches!(ring, PolygonRing::Inner(_))) {
        let hole = ring_to_line(ring);
        let Some(first) = hole.0.first().copied() else {
            continue;
        };
        if let Some(outer) = polygons.iter_mut().find(|p| p.contains(&Point::from(first))) {
            outer.interiors_push(hole);
        }
    }
    polygons
}

/// Keeps the polygons touching `rect`. Applying it twice with the same rect
/// changes nothing.
pub fn filter_to_rect(polygons: Vec<Polygon>, rect: &Rect) -> Vec<Polygon> {
    let window = rect.to_polygon();
    polygons.into_iter()
        .filter(|polygon| {
            polygon.bounding_rect().is_some_and(|bounds| bounds.intersects(rect))
                && polygon.intersects(&window)
        })
        .collect()
}

/// Oceans and seas around a place, read from a pre-built water-polygon
/// shapefile. Inland places get an empty layer.
pub fn attach_big_water(path: &Path, bbox: &BoundingBox) -> Result<Layer> {
    let prj_path = path.with_extension("prj");
    let prj = if prj_path.exists() {
        Some(fs::read_to_string(&prj_path).map_err(|err| {
            Error::file_access(format!("{}: {}", prj_path.display(), err))
        })?)
    } else {
        None
    };
    let crs = NativeCrs::from_prj(prj.as_deref())?;
    let native_rect = crs.rect_from_wgs84(bbox);

    let mut reader = shapefile::ShapeReader::from_path(path).map_err(|err| {
        Error::file_access(format!("{}: {}", path.display(), err))
    })?;

    let mut kept = Vec::new();
    for shape in reader.iter_shapes_as::<shapefile::Polygon>() {
        let shape = shape?;
        kept.extend(filter_to_rect(to_geo_polygons(&shape), &native_rect));
    }

    let features: Vec<Feature> = kept.into_iter()
        .map(|polygon| Feature {
            osm_id: None,
            geometry: Geometry::Polygon(polygon.map_coords(|c| crs.unproject(c))),
            tags: Tags::new(),
        })
        .collect();

    log::info!(polygons = features.len(), crs = crs.name(); "Attached big water");
    Ok(Layer::new(LayerKind::BigWater, features))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn square(x: f64, y: f64, size: f64) -> Polygon {
        Rect::new(Coord { x, y }, Coord { x: x + size, y: y + size }).to_polygon()
    }

    #[test]
    fn crs_from_prj() {
        let wgs84 = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137,298.257223563]],PRIMEM["Greenwich",0],UNIT["Degree",0.017453292519943295]]"#;
        let mercator = r#"PROJCS["WGS_84_Pseudo_Mercator",GEOGCS["GCS_WGS_1984"],PROJECTION["Mercator"],UNIT["Meter",1.0]]"#;
        let utm = r#"PROJCS["WGS_1984_UTM_Zone_33N",GEOGCS["GCS_WGS_1984"],PROJECTION["Transverse_Mercator"]]"#;

        assert_eq!(NativeCrs::from_prj(None).unwrap(), NativeCrs::Wgs84);
        assert_eq!(NativeCrs::from_prj(Some(wgs84)).unwrap(), NativeCrs::Wgs84);
        assert_eq!(NativeCrs::from_prj(Some(mercator)).unwrap(), NativeCrs::WebMercator);
        assert_eq!(NativeCrs::from_prj(Some(utm)).unwrap_err().kind, ErrorKind::FileAccess);
    }

    #[test]
    fn ellipsoidal_mercator_is_refused() {
        let esri_web = r#"PROJCS["WGS_1984_Web_Mercator_Auxiliary_Sphere",GEOGCS["GCS_WGS_1984"],PROJECTION["Mercator_Auxiliary_Sphere"]]"#;
        let by_code = r#"PROJCS["unnamed",GEOGCS["WGS 84"],PROJECTION["Mercator_1SP"],AUTHORITY["EPSG","3857"]]"#;
        let world_1sp = r#"PROJCS["WGS 84 / World Mercator",GEOGCS["WGS 84"],PROJECTION["Mercator_1SP"],PARAMETER["scale_factor",1],AUTHORITY["EPSG","3395"]]"#;
        let world_esri = r#"PROJCS["WGS_1984_World_Mercator",GEOGCS["GCS_WGS_1984"],PROJECTION["Mercator"],PARAMETER["Standard_Parallel_1",0.0]]"#;

        assert_eq!(NativeCrs::from_prj(Some(esri_web)).unwrap(), NativeCrs::WebMercator);
        assert_eq!(NativeCrs::from_prj(Some(by_code)).unwrap(), NativeCrs::WebMercator);
        assert_eq!(NativeCrs::from_prj(Some(world_1sp)).unwrap_err().kind, ErrorKind::FileAccess);
        assert_eq!(NativeCrs::from_prj(Some(world_esri)).unwrap_err().kind, ErrorKind::FileAccess);
    }

    #[test]
    fn web_mercator_inverts() {
        let crs = NativeCrs::WebMercator;
        let edge = crs.unproject(Coord { x: EARTH_RADIUS_M * std::f64::consts::PI, y: 0.0 });
        assert!((edge.x - 180.0).abs() < 1e-9);
        assert!(edge.y.abs() < 1e-9);

        let seattle = Coord { x: -122.33, y: 47.61 };
        let back = crs.unproject(crs.project(seattle));
        assert!((back.x - seattle.x).abs() < 1e-9);
        assert!((back.y - seattle.y).abs() < 1e-9);
    }

    #[test]
    fn filtering_is_idempotent() {
        let rect = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 10.0, y: 10.0 });
        let polygons = vec![square(-5.0, -5.0, 6.0), square(20.0, 20.0, 1.0), square(2.0, 2.0, 1.0)];

        let once = filter_to_rect(polygons, &rect);
        assert_eq!(once.len(), 2);
        let twice = filter_to_rect(once.clone(), &rect);
        assert_eq!(once, twice);
    }

    #[test]
    fn inland_rect_keeps_nothing() {
        let rect = Rect::new(Coord { x: -83.3, y: 42.2 }, Coord { x: -82.9, y: 42.5 });
        let ocean = vec![square(-70.0, 30.0, 5.0), square(-90.0, 20.0, 3.0)];
        assert!(filter_to_rect(ocean, &rect).is_empty());
    }

    fn shp_square(x: f64, y: f64, width: f64, height: f64) -> shapefile::Polygon {
        shapefile::Polygon::with_rings(vec![PolygonRing::Outer(vec![
            shapefile::Point::new(x, y),
            shapefile::Point::new(x, y + height),
            shapefile::Point::new(x + width, y + height),
            shapefile::Point::new(x + width, y),
            shapefile::Point::new(x, y),
        ])])
    }

    /// Writes `.shp`/`.shx` (and `.prj` when given) into a fresh temp dir.
    fn write_water_file(name: &str, shapes: Vec<shapefile::Polygon>, prj: Option<&str>) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("city-maps-big-water-test").join(name);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("water_polygons.shp");
        shapefile::ShapeWriter::from_path(&path).unwrap().write_shapes(&shapes).unwrap();

        let prj_path = path.with_extension("prj");
        match prj {
            Some(wkt) => fs::write(&prj_path, wkt).unwrap(),
            None => {
                let _ = fs::remove_file(&prj_path);
            },
        }
        path
    }

    #[test]
    fn inland_place_reads_an_empty_layer() {
        let path = write_water_file("inland", vec![shp_square(-70.0, 30.0, 5.0, 5.0)], None);
        let detroit = BoundingBox { north: 42.5, south: 42.2, east: -82.9, west: -83.3 };

        let layer = attach_big_water(&path, &detroit).unwrap();
        assert_eq!(layer.kind, LayerKind::BigWater);
        assert!(layer.is_empty());
    }

    #[test]
    fn lon_lat_file_keeps_touching_polygons() {
        let shapes = vec![shp_square(-0.5, -0.5, 1.0, 1.0), shp_square(40.0, 40.0, 1.0, 1.0)];
        let path = write_water_file("wgs84", shapes, None);
        let bbox = BoundingBox { north: 1.0, south: 0.0, east: 1.0, west: 0.0 };

        let layer = attach_big_water(&path, &bbox).unwrap();
        assert_eq!(layer.len(), 1);
        let bounds = layer.features[0].geometry.bounding_rect().unwrap();
        assert_eq!(bounds, Rect::new(Coord { x: -0.5, y: -0.5 }, Coord { x: 0.5, y: 0.5 }));
    }

    #[test]
    fn web_mercator_file_comes_back_in_degrees() {
        let crs = NativeCrs::WebMercator;
        let south_west = crs.project(Coord { x: 0.0, y: 0.0 });
        let north_east = crs.project(Coord { x: 2.0, y: 1.0 });
        let sea = shp_square(
            south_west.x,
            south_west.y,
            north_east.x - south_west.x,
            north_east.y - south_west.y,
        );
        let prj = r#"PROJCS["WGS_84_Pseudo_Mercator",GEOGCS["GCS_WGS_1984"],PROJECTION["Mercator"],UNIT["Meter",1.0]]"#;
        let path = write_water_file("mercator", vec![sea], Some(prj));
        let coast = BoundingBox { north: 0.8, south: 0.2, east: 1.5, west: 0.5 };

        let layer = attach_big_water(&path, &coast).unwrap();
        assert_eq!(layer.len(), 1);
        let bounds = layer.features[0].geometry.bounding_rect().unwrap();
        assert!(bounds.min().x.abs() < 1e-6 && bounds.min().y.abs() < 1e-6);
        assert!((bounds.max().x - 2.0).abs() < 1e-6);
        assert!((bounds.max().y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn missing_dataset_is_a_file_access_error() {
        let path = std::env::temp_dir().join("no-such-dir-for-water").join("water_polygons.shp");
        let bbox = BoundingBox { north: 1.0, south: 0.0, east: 1.0, west: 0.0 };
        let err = attach_big_water(&path, &bbox).unwrap_err();
        assert_eq!(err.kind, ErrorKind::FileAccess);
    }
}
