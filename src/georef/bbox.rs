use serde_json::Value;

use crate::json::as_f64_lenient;

/// An axis-aligned extent, `min < max` on both axes once accepted by the resolver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// `[min_x, min_y, max_x, max_y]`
    pub fn to_array(self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Finite, with a strictly positive extent on both axes.
    pub fn is_valid(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite()) && self.width() > 0.0 && self.height() > 0.0
    }

    /// Plausible as WGS84 degrees.
    pub fn looks_geographic(&self) -> bool {
        self.min_x.abs() <= 180.0
            && self.max_x.abs() <= 180.0
            && self.min_y.abs() <= 90.0
            && self.max_y.abs() <= 90.0
    }

    /// The four corners, clockwise from the upper left.
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.min_x, self.max_y),
            (self.max_x, self.max_y),
            (self.max_x, self.min_y),
            (self.min_x, self.min_y),
        ]
    }

    /// The smallest box containing every point.
    pub fn envelope(points: impl IntoIterator<Item = (f64, f64)>) -> Option<Self> {
        points.into_iter().fold(None, |acc, (x, y)| {
            Some(match acc {
                None => Self::new(x, y, x, y),
                Some(b) => Self::new(b.min_x.min(x), b.min_y.min(y), b.max_x.max(x), b.max_y.max(y)),
            })
        })
    }
}

/// Interpret `[x0, y0, x1, y1]` as a bounding box.
///
/// Some products write `[east, south, west, north]`: when the first coordinate exceeds the
/// third the two are exchanged. The comparison is purely numeric, so a box such as
/// `[170, -10, -170, 10]` becomes `(-170, -10, 170, 10)`. An inverted Y axis is corrected the
/// same way. Standard-ordered input is returned unchanged.
pub fn correct_bbox_order(bbox: [f64; 4]) -> BoundingBox {
    let [mut x0, mut y0, mut x1, mut y1] = bbox;
    if x0 > x1 {
        std::mem::swap(&mut x0, &mut x1);
    }
    if y0 > y1 {
        std::mem::swap(&mut y0, &mut y1);
    }
    BoundingBox::new(x0, y0, x1, y1)
}

/// Six-coefficient affine map from pixel to world coordinates:
/// `[origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    /// North-up transform mapping a `width` x `height` raster onto `bbox`.
    ///
    /// `None` when either dimension is zero.
    pub fn from_bbox(bbox: &BoundingBox, width: u64, height: u64) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self([
            bbox.min_x,
            bbox.width() / width as f64,
            0.0,
            bbox.max_y,
            0.0,
            -(bbox.height() / height as f64).abs(),
        ]))
    }

    /// Six numbers separated by commas and/or whitespace.
    pub fn parse(s: &str) -> Option<Self> {
        let values = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<f64>().ok())
            .collect::<Option<Vec<_>>>()?;
        Self::from_slice(&values)
    }

    /// A transform string or an array of six numbers.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Self::parse(s),
            Value::Array(items) => {
                let values = items.iter().map(as_f64_lenient).collect::<Option<Vec<_>>>()?;
                Self::from_slice(&values)
            }
            _ => None,
        }
    }

    fn from_slice(values: &[f64]) -> Option<Self> {
        let coefficients: [f64; 6] = values.try_into().ok()?;
        coefficients
            .iter()
            .all(|v| v.is_finite())
            .then_some(Self(coefficients))
    }

    /// Comma-joined, 12 decimal digits each.
    pub fn to_metadata_string(&self) -> String {
        self.0
            .iter()
            .map(|v| format!("{v:.12}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}
