//! Map data: submission counts per located place.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::storage::filter::{Aggregate, Condition, Field, FieldValue, GroupKey};
use crate::validation::params::LookbackWindow;

use super::{AnalyticsEngine, AnalyticsError, Period};

pub const MAP_POINTS_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Place {
    pub city: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub coordinates: Coordinates,
    pub location: Place,
    pub count: u64,
}

const MAP_GROUP: [GroupKey; 4] = [
    GroupKey::Field(Field::GeoCity),
    GroupKey::Field(Field::GeoCountry),
    GroupKey::Field(Field::GeoLatitude),
    GroupKey::Field(Field::GeoLongitude),
];

fn text(value: &FieldValue) -> String {
    value.as_str().unwrap_or_default().to_string()
}

impl AnalyticsEngine {
    pub fn map_data(&self, window: LookbackWindow) -> Result<Vec<MapPoint>, AnalyticsError> {
        self.map_data_at(window, Utc::now())
    }

    /// Groups by (city, country, latitude, longitude). A record with either
    /// coordinate equal to zero is treated as unlocated and skipped, which
    /// also drops places that genuinely lie on the equator or meridian.
    pub fn map_data_at(
        &self,
        window: LookbackWindow,
        now: DateTime<Utc>,
    ) -> Result<Vec<MapPoint>, AnalyticsError> {
        let located = Period::new(window, now)
            .filter()
            .and(Condition::NotEq(Field::GeoLatitude, FieldValue::Float(0.0)))
            .and(Condition::NotEq(Field::GeoLongitude, FieldValue::Float(0.0)));

        let mut points: Vec<MapPoint> = self
            .store()
            .aggregate(&located, &MAP_GROUP, &[Aggregate::Count])?
            .into_iter()
            .filter_map(|row| {
                let lat = row.key(2).as_f64()?;
                let lng = row.key(3).as_f64()?;
                (lat.is_finite() && lng.is_finite() && lat != 0.0 && lng != 0.0).then(|| MapPoint {
                    coordinates: Coordinates { lat, lng },
                    location: Place {
                        city: text(row.key(0)),
                        country: text(row.key(1)),
                    },
                    count: row.count,
                })
            })
            .collect();

        points.sort_by(|a, b| b.count.cmp(&a.count));
        points.truncate(MAP_POINTS_LIMIT);
        Ok(points)
    }
}
