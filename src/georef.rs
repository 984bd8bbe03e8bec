//! Georeferencing resolved from EOPF attribute trees.
//!
//! [`Resolver::resolve`] never fails. Each stage (SRS, bounding box, projection) falls back
//! independently, and [`GeoContext`] records where every value came from so placeholder
//! georeferencing can be told apart from discovered georeferencing.
use log::{debug, warn};
use serde_json::{Map, Value};

use crate::config::ResolverConfig;
use crate::json::{
    as_f64_lenient, as_i64_lenient, as_quad, find_key_with, find_map, get_path, non_empty_str,
};
use crate::perf::ScopedTimer;
use crate::{Error, LOG_TARGET, Result};

mod bbox;
mod srs;
mod utm;

pub use bbox::{BoundingBox, GeoTransform, correct_bbox_order};
pub use srs::{
    EPSG_WGS84, UtmZone, epsg_from_mgrs_tile, epsg_from_wkt, is_utm, mgrs_tile_from_name,
    wkt_from_epsg,
};
pub use utm::forward as project_to_utm;

const EPSG_KEYS: [&str; 2] = ["proj:epsg", "epsg"];
const MGRS_KEYS: [&str; 3] = ["s2:mgrs_tile", "mgrs_tile", "tile_id"];
const GEOTRANSFORM_KEYS: [&str; 2] = ["geo_transform", "GeoTransform"];

/// Where the spatial reference came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrsOrigin {
    /// An explicit WKT `spatial_ref` attribute.
    Wkt,
    /// A `proj:epsg` or `epsg` attribute.
    EpsgKey,
    /// The CRS code of the STAC geometry.
    StacGeometry,
    /// Inferred from a Sentinel-2 MGRS tile identifier.
    MgrsTile,
    Default,
}

impl SrsOrigin {
    pub fn is_default(self) -> bool {
        self == Self::Default
    }
}

/// Where the bounding box came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsOrigin {
    /// `proj:bbox` in a STAC `properties` object.
    PropertiesProjBbox,
    /// `proj:bbox` anywhere else in the tree.
    ProjBbox,
    Bounds,
    GeoRefPoints,
    /// The geographic STAC `bbox`.
    StacBbox,
    Default,
}

impl BoundsOrigin {
    pub fn is_default(self) -> bool {
        self == Self::Default
    }
}

/// Resolved georeferencing for one store.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoContext {
    /// WKT of the spatial reference; empty if unresolved.
    pub srs_wkt: String,
    /// 0 if unknown.
    pub epsg: u32,
    pub is_utm: bool,
    /// In the units of [`Self::srs_wkt`].
    pub bbox: BoundingBox,
    /// The geographic box before projection to UTM, if it was projected.
    pub geographic_bbox: Option<BoundingBox>,
    pub srs_origin: SrsOrigin,
    pub bounds_origin: BoundsOrigin,
    /// A geographic box could not be projected to the UTM zone and was kept as is.
    pub projection_failed: bool,
    geotransform: Option<GeoTransform>,
    explicit_geotransform: bool,
}

impl GeoContext {
    /// The geotransform, if it was given explicitly or has already been derived.
    pub fn geotransform(&self) -> Option<GeoTransform> {
        self.geotransform
    }

    /// Whether the geotransform was read from a `geo_transform` attribute.
    pub fn has_explicit_geotransform(&self) -> bool {
        self.explicit_geotransform
    }

    /// The geotransform for a `width` x `height` raster, derived from the bounding box on first
    /// use and kept afterwards.
    pub fn ensure_geotransform(&mut self, width: u64, height: u64) -> Option<GeoTransform> {
        if self.geotransform.is_none() {
            self.geotransform = GeoTransform::from_bbox(&self.bbox, width, height);
            match &self.geotransform {
                Some(gt) => debug!(
                    target: LOG_TARGET,
                    "derived geo_transform {} for {width}x{height}",
                    gt.to_metadata_string()
                ),
                None => debug!(
                    target: LOG_TARGET,
                    "cannot derive geo_transform for raster size {width}x{height}"
                ),
            }
        }
        self.geotransform
    }

    /// The resolved values as flat metadata items.
    pub fn metadata_items(&self) -> Vec<(String, String)> {
        let mut items = Vec::new();
        let mut push = |key: &str, value: String| items.push((key.to_string(), value));

        if self.epsg != 0 {
            push("EPSG", self.epsg.to_string());
            push("proj:epsg", self.epsg.to_string());
        }
        if !self.srs_wkt.is_empty() {
            push("spatial_ref", self.srs_wkt.clone());
        }

        let geographic = if self.is_utm && !self.projection_failed {
            push("utm_easting_min", format!("{:.8}", self.bbox.min_x));
            push("utm_easting_max", format!("{:.8}", self.bbox.max_x));
            push("utm_northing_min", format!("{:.8}", self.bbox.min_y));
            push("utm_northing_max", format!("{:.8}", self.bbox.max_y));
            self.geographic_bbox
        } else {
            Some(self.bbox)
        };
        if let Some(g) = geographic {
            push("geospatial_lon_min", format!("{:.8}", g.min_x));
            push("geospatial_lon_max", format!("{:.8}", g.max_x));
            push("geospatial_lat_min", format!("{:.8}", g.min_y));
            push("geospatial_lat_max", format!("{:.8}", g.max_y));
        }

        if let Some(gt) = &self.geotransform {
            push("geo_transform", gt.to_metadata_string());
        }
        items
    }
}

struct Srs {
    wkt: String,
    epsg: u32,
    origin: SrsOrigin,
}

/// Resolves a [`GeoContext`] from an attribute tree.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    config: ResolverConfig,
    dataset_name: Option<String>,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            dataset_name: None,
        }
    }

    /// Name of the product, searched for a Sentinel-2 tile identifier when no CRS is declared.
    pub fn with_dataset_name(mut self, name: impl Into<String>) -> Self {
        self.dataset_name = Some(name.into());
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn resolve(&self, attrs: &Value) -> GeoContext {
        let _timer = ScopedTimer::new("resolve georeferencing");

        let srs = self.discover_srs(attrs);
        let is_utm = srs::is_utm(srs.epsg);
        if is_utm {
            debug!(target: LOG_TARGET, "detected UTM projection EPSG:{}", srs.epsg);
        }

        let (mut bbox, bounds_origin) = discover_bbox(attrs).unwrap_or_else(|| {
            debug!(
                target: LOG_TARGET,
                "no bounds found, using default {:?}", self.config.default_bbox
            );
            (
                correct_bbox_order(self.config.default_bbox),
                BoundsOrigin::Default,
            )
        });

        let mut geographic_bbox = None;
        let mut projection_failed = false;
        if let Some(zone) = UtmZone::from_epsg(srs.epsg).filter(|_| bbox.looks_geographic()) {
            match project_bbox(zone, &bbox) {
                Ok(projected) => {
                    debug!(
                        target: LOG_TARGET,
                        "projected geographic bounds {:?} to EPSG:{} {:?}",
                        bbox.to_array(),
                        srs.epsg,
                        projected.to_array()
                    );
                    geographic_bbox = Some(bbox);
                    bbox = projected;
                }
                Err(e) => {
                    warn!(
                        target: LOG_TARGET,
                        "failed to transform bounds to EPSG:{}, keeping geographic values: {e}",
                        srs.epsg
                    );
                    projection_failed = true;
                }
            }
        }

        let geotransform = GEOTRANSFORM_KEYS
            .iter()
            .find_map(|key| attrs.get(key).and_then(GeoTransform::from_value));
        if let Some(gt) = &geotransform {
            debug!(
                target: LOG_TARGET,
                "using explicit geo_transform {}",
                gt.to_metadata_string()
            );
        }

        GeoContext {
            srs_wkt: srs.wkt,
            epsg: srs.epsg,
            is_utm,
            bbox,
            geographic_bbox,
            srs_origin: srs.origin,
            bounds_origin,
            projection_failed,
            explicit_geotransform: geotransform.is_some(),
            geotransform,
        }
    }

    fn discover_srs(&self, attrs: &Value) -> Srs {
        let explicit_wkt = attrs
            .as_object()
            .and_then(|root| non_empty_str(root, "spatial_ref"))
            .or_else(|| {
                get_path(attrs, &["stac_discovery", "properties"])
                    .and_then(Value::as_object)
                    .and_then(|properties| non_empty_str(properties, "spatial_ref"))
            });
        let epsg = self.discover_epsg(attrs);

        if let Some(wkt) = explicit_wkt {
            let epsg = epsg
                .map(|(code, _)| code)
                .or_else(|| epsg_from_wkt(wkt))
                .unwrap_or(0);
            debug!(target: LOG_TARGET, "using spatial_ref WKT (EPSG:{epsg})");
            return Srs {
                wkt: wkt.to_string(),
                epsg,
                origin: SrsOrigin::Wkt,
            };
        }

        if let Some((code, origin)) = epsg {
            match wkt_from_epsg(code) {
                Some(wkt) => {
                    debug!(target: LOG_TARGET, "found EPSG:{code} ({origin:?})");
                    return Srs {
                        wkt,
                        epsg: code,
                        origin,
                    };
                }
                None => warn!(
                    target: LOG_TARGET,
                    "failed to import EPSG:{code}, falling back to EPSG:{}",
                    self.config.default_epsg
                ),
            }
        }

        debug!(
            target: LOG_TARGET,
            "no spatial reference found, defaulting to EPSG:{}", self.config.default_epsg
        );
        Srs {
            wkt: wkt_from_epsg(self.config.default_epsg).unwrap_or_default(),
            epsg: self.config.default_epsg,
            origin: SrsOrigin::Default,
        }
    }

    fn discover_epsg(&self, attrs: &Value) -> Option<(u32, SrsOrigin)> {
        if let Some(code) = find_map(attrs, &mut epsg_member) {
            return Some((code, SrsOrigin::EpsgKey));
        }

        if let Some(code) = get_path(
            attrs,
            &["stac_discovery", "geometry", "crs", "properties", "code"],
        )
        .and_then(as_i64_lenient)
        .and_then(positive_code)
        {
            return Some((code, SrsOrigin::StacGeometry));
        }

        let tile_from_name = self.dataset_name.as_deref().and_then(mgrs_tile_from_name);
        let tile_from_properties = || {
            let properties = get_path(attrs, &["stac_discovery", "properties"])?.as_object()?;
            MGRS_KEYS
                .iter()
                .find_map(|key| non_empty_str(properties, key))
        };
        let tile = tile_from_name.or_else(tile_from_properties)?;
        let code = epsg_from_mgrs_tile(tile)?;
        debug!(target: LOG_TARGET, "inferred EPSG:{code} from Sentinel-2 tile {tile}");
        Some((code, SrsOrigin::MgrsTile))
    }
}

fn positive_code(code: i64) -> Option<u32> {
    u32::try_from(code).ok().filter(|&c| c != 0)
}

fn epsg_member(map: &Map<String, Value>) -> Option<u32> {
    EPSG_KEYS
        .iter()
        .find_map(|key| map.get(*key).and_then(as_i64_lenient).and_then(positive_code))
}

fn accept(raw: [f64; 4]) -> Option<BoundingBox> {
    let bbox = correct_bbox_order(raw);
    if bbox.is_valid() {
        Some(bbox)
    } else {
        debug!(target: LOG_TARGET, "ignoring degenerate bounds {raw:?}");
        None
    }
}

/// `[minx, miny, maxx, maxy]` from `{minx,maxx,miny,maxy}` or `{left,right,bottom,top}`.
fn bounds_object(value: &Value) -> Option<[f64; 4]> {
    let obj = value.as_object()?;
    let get = |key: &str, alias: &str| {
        obj.get(key)
            .or_else(|| obj.get(alias))
            .and_then(as_f64_lenient)
    };
    Some([
        get("minx", "left")?,
        get("miny", "bottom")?,
        get("maxx", "right")?,
        get("maxy", "top")?,
    ])
}

/// `[minx, miny, maxx, maxy]` from the upper-left and lower-right image corners.
fn geo_ref_points(value: &Value) -> Option<[f64; 4]> {
    let coord = |corner: &str, axis: &str| {
        get_path(value, &[corner, axis]).and_then(as_f64_lenient)
    };
    Some([
        coord("ul", "x")?,
        coord("lr", "y")?,
        coord("lr", "x")?,
        coord("ul", "y")?,
    ])
}

/// A STAC bbox, 2D `[w, s, e, n]` or 3D `[w, s, zmin, e, n, zmax]`.
fn stac_bbox(value: &Value) -> Option<[f64; 4]> {
    match value.as_array()?.len() {
        6 => {
            let items = value.as_array()?;
            let get = |i: usize| as_f64_lenient(&items[i]);
            Some([get(0)?, get(1)?, get(3)?, get(4)?])
        }
        _ => as_quad(value),
    }
}

fn discover_bbox(attrs: &Value) -> Option<(BoundingBox, BoundsOrigin)> {
    let at = |path: &[&str], read: fn(&Value) -> Option<[f64; 4]>| {
        get_path(attrs, path).and_then(read).and_then(accept)
    };

    let found = at(&["stac_discovery", "properties", "proj:bbox"], as_quad)
        .or_else(|| at(&["properties", "proj:bbox"], as_quad))
        .map(|b| (b, BoundsOrigin::PropertiesProjBbox))
        .or_else(|| {
            find_key_with(attrs, "proj:bbox", |v| as_quad(v).and_then(accept))
                .map(|b| (b, BoundsOrigin::ProjBbox))
        })
        .or_else(|| at(&["bounds"], bounds_object).map(|b| (b, BoundsOrigin::Bounds)))
        .or_else(|| {
            at(&["geo_ref_points"], geo_ref_points).map(|b| (b, BoundsOrigin::GeoRefPoints))
        })
        .or_else(|| {
            at(&["stac_discovery", "bbox"], stac_bbox)
                .or_else(|| at(&["stac_discovery", "properties", "bbox"], stac_bbox))
                .map(|b| (b, BoundsOrigin::StacBbox))
        });
    if let Some((b, origin)) = &found {
        debug!(
            target: LOG_TARGET,
            "found bounds {:?} ({origin:?})",
            b.to_array()
        );
    }
    found
}

fn project_bbox(zone: UtmZone, bbox: &BoundingBox) -> Result<BoundingBox> {
    let corners = bbox
        .corners()
        .into_iter()
        .map(|(lon, lat)| utm::forward(zone, lon, lat))
        .collect::<Result<Vec<_>>>()?;
    BoundingBox::envelope(corners)
        .filter(BoundingBox::is_valid)
        .ok_or_else(|| Error::general("projected bounds are degenerate"))
}

/// Resolve with the default configuration.
pub fn resolve(attrs: &Value) -> GeoContext {
    Resolver::default().resolve(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items(ctx: &GeoContext) -> std::collections::HashMap<String, String> {
        ctx.metadata_items().into_iter().collect()
    }

    #[test]
    fn empty_tree_uses_flagged_defaults() {
        let ctx = resolve(&json!({}));
        assert_eq!(ctx.epsg, 4326);
        assert!(!ctx.is_utm);
        assert!(ctx.srs_origin.is_default());
        assert!(ctx.bounds_origin.is_default());
        assert_eq!(ctx.bbox.to_array(), [10.0, 40.0, 15.0, 45.0]);
        assert_eq!(epsg_from_wkt(&ctx.srs_wkt), Some(4326));
        assert!(ctx.geotransform().is_none());

        let items = items(&ctx);
        assert_eq!(items["EPSG"], "4326");
        assert_eq!(items["geospatial_lon_min"], "10.00000000");
        assert_eq!(items["geospatial_lat_max"], "45.00000000");
        assert!(!items.contains_key("utm_easting_min"));
    }

    #[test]
    fn configured_default_bbox() {
        let resolver = Resolver::new(ResolverConfig {
            default_bbox: [-1.0, -2.0, 1.0, 2.0],
            ..Default::default()
        });
        let ctx = resolver.resolve(&json!(null));
        assert_eq!(ctx.bbox.to_array(), [-1.0, -2.0, 1.0, 2.0]);
    }

    #[test]
    fn swapped_proj_bbox_is_corrected() {
        let attrs = json!({
            "stac_discovery": {"properties": {"proj:bbox": [56.3803, 7.58006, 40.4139, 20.9708]}}
        });
        let ctx = resolve(&attrs);
        assert_eq!(ctx.bounds_origin, BoundsOrigin::PropertiesProjBbox);
        assert_eq!(ctx.bbox.to_array(), [40.4139, 7.58006, 56.3803, 20.9708]);

        let attrs = json!({"proj:bbox": [-29.74827, 67.58993, -30.64866, 68.40500]});
        let ctx = resolve(&attrs);
        assert_eq!(ctx.bounds_origin, BoundsOrigin::ProjBbox);
        assert_eq!(ctx.bbox.to_array(), [-30.64866, 67.58993, -29.74827, 68.40500]);
    }

    #[test]
    fn nested_epsg_with_projected_bbox() {
        let attrs = json!({
            "other_metadata": {"x": 1},
            "stac_discovery": {
                "properties": {
                    "proj:epsg": 32632,
                    "proj:bbox": [600000.0, 5090220.0, 709800.0, 5200020.0]
                }
            }
        });
        let ctx = resolve(&attrs);
        assert_eq!(ctx.epsg, 32632);
        assert!(ctx.is_utm);
        assert_eq!(ctx.srs_origin, SrsOrigin::EpsgKey);
        assert!(!ctx.projection_failed);
        assert!(ctx.geographic_bbox.is_none());
        assert_eq!(ctx.bbox.to_array(), [600000.0, 5090220.0, 709800.0, 5200020.0]);

        let items = items(&ctx);
        assert_eq!(items["proj:epsg"], "32632");
        assert_eq!(items["utm_easting_min"], "600000.00000000");
        assert_eq!(items["utm_northing_max"], "5200020.00000000");
        assert!(items["spatial_ref"].contains("UTM zone 32N"));
        assert!(!items.contains_key("geospatial_lon_min"));
    }

    #[test]
    fn string_epsg_in_deep_child() {
        let attrs = json!({"a": {"b": {"c": {"epsg": "EPSG:32736"}}}});
        let ctx = resolve(&attrs);
        assert_eq!(ctx.epsg, 32736);
        assert!(ctx.is_utm);
    }

    #[test]
    fn geographic_bbox_is_projected_for_utm() {
        let attrs = json!({
            "proj:epsg": 32632,
            "stac_discovery": {"bbox": [8.5, 45.0, 9.5, 46.0]}
        });
        let ctx = resolve(&attrs);
        assert_eq!(ctx.bounds_origin, BoundsOrigin::StacBbox);
        assert_eq!(
            ctx.geographic_bbox.map(BoundingBox::to_array),
            Some([8.5, 45.0, 9.5, 46.0])
        );
        assert!(ctx.bbox.min_x < 500_000.0 && ctx.bbox.max_x > 500_000.0);
        assert!(ctx.bbox.min_y > 4_980_000.0 && ctx.bbox.max_y < 5_100_000.0);

        let items = items(&ctx);
        assert!(items.contains_key("utm_easting_min"));
        assert_eq!(items["geospatial_lon_min"], "8.50000000");
    }

    #[test]
    fn projection_failure_keeps_geographic_values() {
        let attrs = json!({"epsg": 32633, "bounds": {"left": 10.0, "right": 20.0, "bottom": 80.0, "top": 88.0}});
        let ctx = resolve(&attrs);
        assert!(ctx.is_utm);
        assert!(ctx.projection_failed);
        assert_eq!(ctx.bbox.to_array(), [10.0, 80.0, 20.0, 88.0]);
        assert_eq!(items(&ctx)["geospatial_lat_max"], "88.00000000");
    }

    #[test]
    fn explicit_wkt_wins() {
        let wkt = wkt_from_epsg(32633).unwrap();
        let attrs = json!({"spatial_ref": wkt, "proj:epsg": 4326});
        let ctx = resolve(&attrs);
        assert_eq!(ctx.srs_origin, SrsOrigin::Wkt);
        assert_eq!(ctx.srs_wkt, wkt);
        // The declared code is kept alongside the WKT.
        assert_eq!(ctx.epsg, 4326);

        let ctx = resolve(&json!({"stac_discovery": {"properties": {"spatial_ref": wkt}}}));
        assert_eq!(ctx.epsg, 32633);
        assert!(ctx.is_utm);
    }

    #[test]
    fn unknown_epsg_falls_back() {
        let ctx = resolve(&json!({"proj:epsg": 2154}));
        assert_eq!(ctx.epsg, 4326);
        assert!(ctx.srs_origin.is_default());
    }

    #[test]
    fn stac_geometry_crs() {
        let attrs = json!({
            "stac_discovery": {"geometry": {"crs": {"properties": {"code": 32631}}}}
        });
        let ctx = resolve(&attrs);
        assert_eq!(ctx.srs_origin, SrsOrigin::StacGeometry);
        assert_eq!(ctx.epsg, 32631);
    }

    #[test]
    fn mgrs_inference() {
        let ctx = Resolver::default()
            .with_dataset_name("S2B_MSIL2A_20250101T000000_N0511_R001_T56HLH_20250101T000000.zarr")
            .resolve(&json!({}));
        assert_eq!(ctx.srs_origin, SrsOrigin::MgrsTile);
        assert_eq!(ctx.epsg, 32756);

        let attrs = json!({"stac_discovery": {"properties": {"s2:mgrs_tile": "32TQM"}}});
        let ctx = resolve(&attrs);
        assert_eq!(ctx.epsg, 32632);
    }

    #[test]
    fn bounds_sources() {
        let ctx = resolve(&json!({"bounds": {"minx": 1, "maxx": 2, "miny": 3, "maxy": 4}}));
        assert_eq!(ctx.bounds_origin, BoundsOrigin::Bounds);
        assert_eq!(ctx.bbox.to_array(), [1.0, 3.0, 2.0, 4.0]);

        let attrs = json!({"geo_ref_points": {"ul": {"x": 1, "y": 4}, "lr": {"x": 2, "y": 3}}});
        let ctx = resolve(&attrs);
        assert_eq!(ctx.bounds_origin, BoundsOrigin::GeoRefPoints);
        assert_eq!(ctx.bbox.to_array(), [1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn degenerate_candidates_are_skipped() {
        let attrs = json!({
            "proj:bbox": [5.0, 1.0, 5.0, 2.0],
            "bounds": {"left": 0, "right": 1, "bottom": 0, "top": 1}
        });
        let ctx = resolve(&attrs);
        assert_eq!(ctx.bounds_origin, BoundsOrigin::Bounds);
        assert!(ctx.bbox.min_x < ctx.bbox.max_x && ctx.bbox.min_y < ctx.bbox.max_y);
    }

    #[test]
    fn derived_geotransform_is_kept() {
        let mut ctx = resolve(&json!({"bounds": {"minx": 0, "maxx": 100, "miny": 0, "maxy": 50}}));
        assert!(ctx.ensure_geotransform(0, 0).is_none());
        let gt = ctx.ensure_geotransform(100, 50).unwrap();
        assert_eq!(gt.0, [0.0, 1.0, 0.0, 50.0, 0.0, -1.0]);
        assert_eq!(ctx.ensure_geotransform(10, 10), Some(gt));
        assert!(!ctx.has_explicit_geotransform());
        assert!(items(&ctx).contains_key("geo_transform"));
    }

    #[test]
    fn explicit_geotransform_skips_derivation() {
        let mut ctx = resolve(&json!({"geo_transform": "500000,10,0,5000000,0,-10"}));
        assert!(ctx.has_explicit_geotransform());
        let gt = ctx.ensure_geotransform(100, 50).unwrap();
        assert_eq!(gt.0, [500000.0, 10.0, 0.0, 5000000.0, 0.0, -10.0]);
    }
}
