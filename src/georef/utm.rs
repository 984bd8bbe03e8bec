//! Forward transverse Mercator on WGS84 using the Krüger series.
use super::srs::UtmZone;
use crate::{Error, Result};

const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Latitudes outside this range are not covered by UTM.
const LAT_RANGE: std::ops::RangeInclusive<f64> = -80.0..=84.0;

struct Series {
    rectifying_radius: f64,
    alpha: [f64; 3],
    c: f64,
}

impl Series {
    fn wgs84() -> Self {
        let n = F / (2.0 - F);
        let (n2, n3) = (n * n, n * n * n);
        Self {
            rectifying_radius: A / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0),
            alpha: [
                n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0,
                13.0 * n2 / 48.0 - 3.0 * n3 / 5.0,
                61.0 * n3 / 240.0,
            ],
            c: 2.0 * n.sqrt() / (1.0 + n),
        }
    }
}

/// Project WGS84 `(lon, lat)` in degrees to `(easting, northing)` in metres.
pub fn forward(zone: UtmZone, lon: f64, lat: f64) -> Result<(f64, f64)> {
    if !lon.is_finite() || !lat.is_finite() {
        return Err(Error::general(format!(
            "cannot project non-finite coordinate ({lon}, {lat})"
        )));
    }
    if !LAT_RANGE.contains(&lat) {
        return Err(Error::general(format!(
            "latitude {lat} is outside the UTM range"
        )));
    }

    let series = Series::wgs84();
    let phi = lat.to_radians();
    let mut dlon = lon - zone.central_meridian();
    dlon = (dlon + 180.0).rem_euclid(360.0) - 180.0;
    let lambda = dlon.to_radians();

    let sin_phi = phi.sin();
    let t = (sin_phi.atanh() - series.c * (series.c * sin_phi).atanh()).sinh();
    let xi = t.atan2(lambda.cos());
    let eta = (lambda.sin() / (1.0 + t * t).sqrt()).atanh();
    if !eta.is_finite() {
        return Err(Error::general(format!(
            "longitude {lon} is too far from zone {} to project",
            zone.zone
        )));
    }

    let (mut e, mut n) = (eta, xi);
    for (j, alpha) in series.alpha.iter().enumerate() {
        let k = 2.0 * (j + 1) as f64;
        e += alpha * (k * xi).cos() * (k * eta).sinh();
        n += alpha * (k * xi).sin() * (k * eta).cosh();
    }

    let false_northing = if zone.north { 0.0 } else { FALSE_NORTHING_SOUTH };
    Ok((
        FALSE_EASTING + K0 * series.rectifying_radius * e,
        false_northing + K0 * series.rectifying_radius * n,
    ))
}
