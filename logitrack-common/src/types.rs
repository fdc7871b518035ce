//! Shared domain types
//!
//! Status and delay-reason categories are persisted as their `as_str()` form;
//! the read side and the `CHECK` constraints in `db::init` depend on these
//! exact strings.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mean Earth radius used for haversine distances
const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Delivery status category derived for every observation event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCategory {
    OnTime,
    Delayed,
    Delivered,
}

impl StatusCategory {
    pub const ALL: [StatusCategory; 3] = [
        StatusCategory::OnTime,
        StatusCategory::Delayed,
        StatusCategory::Delivered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCategory::OnTime => "OnTime",
            StatusCategory::Delayed => "Delayed",
            StatusCategory::Delivered => "Delivered",
        }
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        StatusCategory::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown status category: {}", s)))
    }
}

/// Reason attached to a `Delayed` status (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DelayReason {
    Weather,
    Customs,
    PortCongestion,
    /// Delay reported without a recognizable cause
    Other,
}

impl DelayReason {
    pub const ALL: [DelayReason; 4] = [
        DelayReason::Weather,
        DelayReason::Customs,
        DelayReason::PortCongestion,
        DelayReason::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DelayReason::Weather => "Weather",
            DelayReason::Customs => "Customs",
            DelayReason::PortCongestion => "PortCongestion",
            DelayReason::Other => "Other",
        }
    }
}

impl fmt::Display for DelayReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DelayReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DelayReason::ALL
            .into_iter()
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown delay reason: {}", s)))
    }
}

/// Status/reason pair
///
/// A reason exists exactly when the status is `Delayed`, so any other
/// combination cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    OnTime,
    Delayed(DelayReason),
    Delivered,
}

impl Classification {
    pub fn status(&self) -> StatusCategory {
        match self {
            Classification::OnTime => StatusCategory::OnTime,
            Classification::Delayed(_) => StatusCategory::Delayed,
            Classification::Delivered => StatusCategory::Delivered,
        }
    }

    pub fn reason(&self) -> Option<DelayReason> {
        match self {
            Classification::Delayed(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Rebuild from stored columns, rejecting status/reason mismatches
    pub fn from_parts(status: StatusCategory, reason: Option<DelayReason>) -> Result<Self> {
        match (status, reason) {
            (StatusCategory::OnTime, None) => Ok(Classification::OnTime),
            (StatusCategory::Delivered, None) => Ok(Classification::Delivered),
            (StatusCategory::Delayed, Some(reason)) => Ok(Classification::Delayed(reason)),
            (status, reason) => Err(Error::InvalidInput(format!(
                "Inconsistent classification: status={} reason={:?}",
                status, reason
            ))),
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Delayed(reason) => write!(f, "Delayed/{}", reason),
            other => f.write_str(other.status().as_str()),
        }
    }
}

/// WGS84 coordinate pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Latitude in [-90, 90] and longitude in [-180, 180]; NaN is never valid
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance (haversine)
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_METERS * c
    }
}

/// Geographic bounding box given by two opposite corners
///
/// Serialized as `[[lat, lon], [lat, lon]]`, the shape the position-stream
/// subscription expects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[[f64; 2]; 2]", into = "[[f64; 2]; 2]")]
pub struct BoundingBox {
    pub corner_a: GeoPoint,
    pub corner_b: GeoPoint,
}

impl BoundingBox {
    pub fn new(corner_a: GeoPoint, corner_b: GeoPoint) -> Self {
        Self { corner_a, corner_b }
    }

    /// The whole globe
    pub fn world() -> Self {
        Self::new(GeoPoint::new(-90.0, -180.0), GeoPoint::new(90.0, 180.0))
    }

    pub fn min_latitude(&self) -> f64 {
        self.corner_a.latitude.min(self.corner_b.latitude)
    }

    pub fn max_latitude(&self) -> f64 {
        self.corner_a.latitude.max(self.corner_b.latitude)
    }

    pub fn min_longitude(&self) -> f64 {
        self.corner_a.longitude.min(self.corner_b.longitude)
    }

    pub fn max_longitude(&self) -> f64 {
        self.corner_a.longitude.max(self.corner_b.longitude)
    }

    pub fn is_valid(&self) -> bool {
        self.corner_a.is_valid() && self.corner_b.is_valid()
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.min_latitude()..=self.max_latitude()).contains(&point.latitude)
            && (self.min_longitude()..=self.max_longitude()).contains(&point.longitude)
    }
}

impl From<[[f64; 2]; 2]> for BoundingBox {
    fn from(corners: [[f64; 2]; 2]) -> Self {
        Self::new(
            GeoPoint::new(corners[0][0], corners[0][1]),
            GeoPoint::new(corners[1][0], corners[1][1]),
        )
    }
}

impl From<BoundingBox> for [[f64; 2]; 2] {
    fn from(bbox: BoundingBox) -> Self {
        [
            [bbox.corner_a.latitude, bbox.corner_a.longitude],
            [bbox.corner_b.latitude, bbox.corner_b.longitude],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_pairs() {
        assert_eq!(Classification::OnTime.reason(), None);
        assert_eq!(Classification::Delivered.reason(), None);
        assert_eq!(
            Classification::Delayed(DelayReason::Customs).reason(),
            Some(DelayReason::Customs)
        );
        assert_eq!(
            Classification::Delayed(DelayReason::Weather).status(),
            StatusCategory::Delayed
        );
    }

    #[test]
    fn test_from_parts_rejects_mismatches() {
        assert!(Classification::from_parts(StatusCategory::Delayed, None).is_err());
        assert!(
            Classification::from_parts(StatusCategory::OnTime, Some(DelayReason::Weather)).is_err()
        );
        assert_eq!(
            Classification::from_parts(StatusCategory::Delayed, Some(DelayReason::PortCongestion))
                .unwrap(),
            Classification::Delayed(DelayReason::PortCongestion)
        );
    }

    #[test]
    fn test_category_strings_parse_back() {
        for status in StatusCategory::ALL {
            assert_eq!(status.as_str().parse::<StatusCategory>().unwrap(), status);
        }
        for reason in DelayReason::ALL {
            assert_eq!(reason.as_str().parse::<DelayReason>().unwrap(), reason);
        }
        assert!("On Time".parse::<StatusCategory>().is_err());
    }

    #[test]
    fn test_geo_point_validity() {
        assert!(GeoPoint::new(90.0, -180.0).is_valid());
        assert!(!GeoPoint::new(999.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, 180.5).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_haversine_distance() {
        let singapore = GeoPoint::new(1.2897, 103.8501);
        assert_eq!(singapore.distance_meters(&singapore), 0.0);

        // One degree of latitude is roughly 111 km
        let north = GeoPoint::new(2.2897, 103.8501);
        let d = singapore.distance_meters(&north);
        assert!((d - 111_195.0).abs() < 500.0, "got {}", d);
    }

    #[test]
    fn test_bounding_box_contains_with_unordered_corners() {
        let bbox = BoundingBox::from([[10.0, 20.0], [-10.0, -20.0]]);
        assert!(bbox.contains(&GeoPoint::new(0.0, 0.0)));
        assert!(!bbox.contains(&GeoPoint::new(11.0, 0.0)));
        assert!(BoundingBox::world().contains(&GeoPoint::new(-90.0, 180.0)));
    }

    #[test]
    fn test_bounding_box_serde_shape() {
        let bbox: BoundingBox = serde_json::from_str("[[-1.5, 2.0], [3.0, 4.5]]").unwrap();
        assert_eq!(bbox.corner_a, GeoPoint::new(-1.5, 2.0));
        assert_eq!(serde_json::to_string(&bbox).unwrap(), "[[-1.5,2.0],[3.0,4.5]]");
    }
}
