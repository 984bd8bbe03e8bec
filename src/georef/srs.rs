//! Spatial reference definitions known without an external projection database.

/// EPSG code of WGS84 geographic coordinates.
pub const EPSG_WGS84: u32 = 4326;

const WGS84_GEOGCS: &str = concat!(
    "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",",
    "SPHEROID[\"WGS 84\",6378137,298.257223563,AUTHORITY[\"EPSG\",\"7030\"]],",
    "AUTHORITY[\"EPSG\",\"6326\"]],",
    "PRIMEM[\"Greenwich\",0,AUTHORITY[\"EPSG\",\"8901\"]],",
    "UNIT[\"degree\",0.0174532925199433,AUTHORITY[\"EPSG\",\"9122\"]]"
);

/// A UTM zone on the WGS84 ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtmZone {
    pub zone: u8,
    pub north: bool,
}

impl UtmZone {
    /// The zone for a WGS84 / UTM EPSG code (32601-32660 north, 32701-32760 south).
    pub fn from_epsg(epsg: u32) -> Option<Self> {
        match epsg {
            32601..=32660 => Some(Self {
                zone: (epsg - 32600) as u8,
                north: true,
            }),
            32701..=32760 => Some(Self {
                zone: (epsg - 32700) as u8,
                north: false,
            }),
            _ => None,
        }
    }

    pub fn epsg(self) -> u32 {
        let base = if self.north { 32600 } else { 32700 };
        base + u32::from(self.zone)
    }

    /// Longitude of the zone's central meridian, in degrees.
    pub fn central_meridian(self) -> f64 {
        f64::from(self.zone) * 6.0 - 183.0
    }
}

pub fn is_utm(epsg: u32) -> bool {
    UtmZone::from_epsg(epsg).is_some()
}

/// WKT for an EPSG code, if the definition is built in.
pub fn wkt_from_epsg(epsg: u32) -> Option<String> {
    if epsg == EPSG_WGS84 {
        return Some(format!(
            "{WGS84_GEOGCS},AXIS[\"Latitude\",NORTH],AXIS[\"Longitude\",EAST],AUTHORITY[\"EPSG\",\"4326\"]]"
        ));
    }
    let utm = UtmZone::from_epsg(epsg)?;
    let hemisphere = if utm.north { 'N' } else { 'S' };
    let false_northing = if utm.north { 0 } else { 10_000_000 };
    Some(format!(
        concat!(
            "PROJCS[\"WGS 84 / UTM zone {zone}{hemisphere}\",",
            "{geogcs},AUTHORITY[\"EPSG\",\"4326\"]],",
            "PROJECTION[\"Transverse_Mercator\"],",
            "PARAMETER[\"latitude_of_origin\",0],",
            "PARAMETER[\"central_meridian\",{cm}],",
            "PARAMETER[\"scale_factor\",0.9996],",
            "PARAMETER[\"false_easting\",500000],",
            "PARAMETER[\"false_northing\",{fn_}],",
            "UNIT[\"metre\",1,AUTHORITY[\"EPSG\",\"9001\"]],",
            "AXIS[\"Easting\",EAST],AXIS[\"Northing\",NORTH],",
            "AUTHORITY[\"EPSG\",\"{epsg}\"]]"
        ),
        zone = utm.zone,
        hemisphere = hemisphere,
        geogcs = WGS84_GEOGCS,
        cm = utm.central_meridian(),
        fn_ = false_northing,
        epsg = epsg,
    ))
}

/// The top-level EPSG authority code of a WKT1 (`AUTHORITY["EPSG","n"]`) or WKT2
/// (`ID["EPSG",n]`) definition.
pub fn epsg_from_wkt(wkt: &str) -> Option<u32> {
    let upper = wkt.to_ascii_uppercase();
    let start = ["AUTHORITY[\"EPSG\",", "ID[\"EPSG\","]
        .iter()
        .filter_map(|marker| upper.rfind(marker).map(|idx| idx + marker.len()))
        .max()?;
    let code: String = wkt[start..]
        .trim_start_matches([' ', '"'])
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    code.parse().ok().filter(|&c| c != 0)
}

/// The UTM EPSG code implied by a Sentinel-2 MGRS tile identifier (`T32TQM` or `32TQM`).
///
/// Latitude bands `N` and above are northern.
pub fn epsg_from_mgrs_tile(tile: &str) -> Option<u32> {
    let tile = tile.trim();
    let tile = tile
        .strip_prefix(['T', 't'])
        .filter(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or(tile);
    let digits: String = tile.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() || digits.len() > 2 {
        return None;
    }
    let zone: u8 = digits.parse().ok()?;
    if !(1..=60).contains(&zone) {
        return None;
    }
    let band = tile[digits.len()..]
        .chars()
        .next()
        .map_or('N', |c| c.to_ascii_uppercase());
    let north = ('N'..='Z').contains(&band);
    Some(UtmZone { zone, north }.epsg())
}

/// A Sentinel-2 tile identifier (`_T##XXX`) embedded in a product name.
pub fn mgrs_tile_from_name(name: &str) -> Option<&str> {
    name.match_indices("_T").find_map(|(idx, _)| {
        let candidate = name.get(idx + 1..idx + 7)?;
        let bytes = candidate.as_bytes();
        (bytes[1].is_ascii_digit()
            && bytes[2].is_ascii_digit()
            && bytes[3..].iter().all(u8::is_ascii_alphabetic))
        .then_some(candidate)
    })
}
