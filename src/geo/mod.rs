use ::geo::{Intersects, LineString, Polygon, Rect};
use thiserror::Error;

/// Kilometers per degree of latitude, flat-Earth approximation
pub const KM_PER_DEGREE: f64 = 111.0;

#[derive(Error, Debug, PartialEq)]
pub enum GeoError {
    #[error("latitude {0} is too close to a pole to scale longitude")]
    PolarLatitude(f64),

    #[error("aspect ratio must be positive, got {0}")]
    InvalidAspectRatio(f64),

    #[error("distance must be positive, got {0}")]
    InvalidDistance(f64),
}

/// A WGS84 position in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Move `current_lat` north by `km` kilometers.
pub fn km_to_lat(km: f64, current_lat: f64) -> f64 {
    current_lat + km / KM_PER_DEGREE
}

/// Move `current_lon` east by `km` kilometers, scaled at `latitude`.
pub fn km_to_lon(km: f64, current_lon: f64, latitude: f64) -> f64 {
    current_lon + km / (KM_PER_DEGREE * latitude.to_radians().cos())
}

fn line_string(points: &[Coord]) -> LineString<f64> {
    points.iter().map(|point| (point.lon, point.lat)).collect()
}

fn check_latitude(latitude: f64) -> Result<(), GeoError> {
    if !latitude.is_finite() || latitude.abs() >= 90.0 {
        return Err(GeoError::PolarLatitude(latitude));
    }
    Ok(())
}

/// Geographic rectangle clipping the visible map area
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_longitude: f64,
    pub max_longitude: f64,
    pub min_latitude: f64,
    pub max_latitude: f64,
}

impl BoundingBox {
    /// Half width and half height in kilometers for a radius and aspect ratio.
    ///
    /// The longer side of the frame spans `distance * aspect_ratio` (or
    /// `distance / aspect_ratio` for portrait frames), the shorter one spans
    /// `distance`.
    pub fn half_extents_km(distance_m: f64, aspect_ratio: f64) -> (f64, f64) {
        let km = distance_m / 1000.0;
        if aspect_ratio >= 1.0 {
            (km * aspect_ratio / 2.0, km / 2.0)
        } else {
            (km / 2.0, km / aspect_ratio / 2.0)
        }
    }

    /// Frame of the rendered map around `center`.
    ///
    /// Both longitude bounds are scaled with the center latitude, so the box
    /// is symmetric around the center.
    pub fn around(center: Coord, distance_m: f64, aspect_ratio: f64) -> Result<Self, GeoError> {
        check_latitude(center.lat)?;
        if !(aspect_ratio > 0.0) || !aspect_ratio.is_finite() {
            return Err(GeoError::InvalidAspectRatio(aspect_ratio));
        }
        if !(distance_m > 0.0) || !distance_m.is_finite() {
            return Err(GeoError::InvalidDistance(distance_m));
        }

        let (half_width, half_height) = Self::half_extents_km(distance_m, aspect_ratio);

        Ok(Self {
            min_longitude: km_to_lon(-half_width, center.lon, center.lat),
            max_longitude: km_to_lon(half_width, center.lon, center.lat),
            min_latitude: km_to_lat(-half_height, center.lat),
            max_latitude: km_to_lat(half_height, center.lat),
        })
    }

    /// Square region of half-side `radius_m` used when querying providers
    pub fn query_box(center: Coord, radius_m: f64) -> Result<Self, GeoError> {
        check_latitude(center.lat)?;
        if !(radius_m > 0.0) || !radius_m.is_finite() {
            return Err(GeoError::InvalidDistance(radius_m));
        }

        let km = radius_m / 1000.0;
        Ok(Self {
            min_longitude: km_to_lon(-km, center.lon, center.lat),
            max_longitude: km_to_lon(km, center.lon, center.lat),
            min_latitude: km_to_lat(-km, center.lat),
            max_latitude: km_to_lat(km, center.lat),
        })
    }

    pub fn width(&self) -> f64 {
        self.max_longitude - self.min_longitude
    }

    pub fn height(&self) -> f64 {
        self.max_latitude - self.min_latitude
    }

    pub fn contains(&self, coord: Coord) -> bool {
        coord.lon >= self.min_longitude
            && coord.lon <= self.max_longitude
            && coord.lat >= self.min_latitude
            && coord.lat <= self.max_latitude
    }

    fn to_polygon(self) -> Polygon<f64> {
        Rect::new(
            (self.min_longitude, self.min_latitude),
            (self.max_longitude, self.max_latitude),
        )
        .to_polygon()
    }

    /// Whether a polyline passes through the box, even with every vertex outside
    pub fn intersects_line(&self, points: &[Coord]) -> bool {
        match points {
            [] => false,
            [point] => self.contains(*point),
            _ => line_string(points).intersects(&self.to_polygon()),
        }
    }

    /// Whether an area overlaps the box, including an area covering it whole
    pub fn intersects_area(&self, exterior: &[Coord], holes: &[Vec<Coord>]) -> bool {
        if exterior.len() < 3 {
            return self.intersects_line(exterior);
        }
        let area = Polygon::new(
            line_string(exterior),
            holes.iter().map(|hole| line_string(hole)).collect(),
        );
        area.intersects(&self.to_polygon())
    }

    /// Overpass bbox order: south, west, north, east
    pub fn to_overpass(&self) -> String {
        format!(
            "{:.7},{:.7},{:.7},{:.7}",
            self.min_latitude, self.min_longitude, self.max_latitude, self.max_longitude
        )
    }
}
