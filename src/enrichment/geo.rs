//! Offline geolocation.
//!
//! Lookups never leave the process: `OfflineGeoTable` holds sorted IPv4
//! ranges and answers by binary search. A process-wide table can be loaded
//! once at startup for hosts that share it across requests.

use std::net::Ipv4Addr;
use std::time::Instant;

use lazy_static::lazy_static;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use crate::storage::models::{defaults, Geolocation};

use super::EnrichmentError;

/// Partial location data for one address. Missing fields take their defaults
/// when converted to a `Geolocation`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub region_code: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub isp: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
}

fn text_or(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl GeoRecord {
    pub fn into_geolocation(self) -> Geolocation {
        Geolocation {
            country: text_or(self.country, defaults::UNKNOWN),
            country_code: text_or(self.country_code, defaults::COUNTRY_CODE),
            region: text_or(self.region, defaults::UNKNOWN),
            region_code: text_or(self.region_code, ""),
            city: text_or(self.city, defaults::UNKNOWN),
            zip: text_or(self.zip, ""),
            latitude: self.latitude.unwrap_or(0.0),
            longitude: self.longitude.unwrap_or(0.0),
            timezone: text_or(self.timezone, ""),
            isp: text_or(self.isp, ""),
            org: text_or(self.org, ""),
        }
    }
}

pub trait GeoLookup: Send + Sync {
    /// Look up a normalized IP. `Ok(None)` means no entry.
    fn lookup(&self, ip: &str) -> Result<Option<GeoRecord>, EnrichmentError>;
}

/// One table row as loaded from JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct GeoRangeEntry {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
    #[serde(flatten)]
    pub record: GeoRecord,
}

#[derive(Debug, Clone)]
struct GeoRange {
    start: u32,
    end: u32,
    record: GeoRecord,
}

#[derive(Debug, Default)]
pub struct OfflineGeoTable {
    ranges: Vec<GeoRange>,
    loaded_at: Option<Instant>,
}

impl OfflineGeoTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<GeoRangeEntry>) -> Result<Self, EnrichmentError> {
        let mut table = Self::new();
        table.load(entries)?;
        Ok(table)
    }

    /// Parse a JSON array of `{start, end, ...GeoRecord}` rows.
    pub fn from_json(json: &str) -> Result<Self, EnrichmentError> {
        let entries: Vec<GeoRangeEntry> =
            serde_json::from_str(json).map_err(|e| EnrichmentError::GeoTable(e.to_string()))?;
        Self::from_entries(entries)
    }

    /// Replace the table contents. Ranges must not be inverted or overlap.
    pub fn load(&mut self, entries: Vec<GeoRangeEntry>) -> Result<(), EnrichmentError> {
        let mut ranges: Vec<GeoRange> = entries
            .into_iter()
            .map(|e| GeoRange {
                start: u32::from(e.start),
                end: u32::from(e.end),
                record: e.record,
            })
            .collect();

        if let Some(bad) = ranges.iter().find(|r| r.start > r.end) {
            return Err(EnrichmentError::GeoTable(format!(
                "inverted range {}-{}",
                Ipv4Addr::from(bad.start),
                Ipv4Addr::from(bad.end)
            )));
        }

        ranges.sort_by_key(|r| r.start);
        for pair in ranges.windows(2) {
            if pair[1].start <= pair[0].end {
                return Err(EnrichmentError::GeoTable(format!(
                    "overlapping ranges at {}",
                    Ipv4Addr::from(pair[1].start)
                )));
            }
        }

        self.ranges = ranges;
        self.loaded_at = Some(Instant::now());
        log::info!("GEO_TABLE_LOADED ranges={}", self.ranges.len());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Get table age in seconds (for logging).
    pub fn table_age_secs(&self) -> Option<u64> {
        self.loaded_at.map(|t| t.elapsed().as_secs())
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
        self.loaded_at = None;
        log::info!("GEO_TABLE_CLEARED");
    }

    fn find(&self, ip: &str) -> Option<&GeoRecord> {
        let addr = u32::from(ip.parse::<Ipv4Addr>().ok()?);
        let idx = self.ranges.partition_point(|r| r.start <= addr);
        let candidate = self.ranges.get(idx.checked_sub(1)?)?;
        (addr <= candidate.end).then_some(&candidate.record)
    }
}

impl GeoLookup for OfflineGeoTable {
    fn lookup(&self, ip: &str) -> Result<Option<GeoRecord>, EnrichmentError> {
        Ok(self.find(ip).cloned())
    }
}

lazy_static! {
    static ref GEO_TABLE: RwLock<OfflineGeoTable> = RwLock::new(OfflineGeoTable::new());
}

/// Get a read-only reference to the process-wide geo table.
pub fn get_geo_table() -> RwLockReadGuard<'static, OfflineGeoTable> {
    GEO_TABLE.read()
}

/// Get a mutable reference to the process-wide geo table.
pub fn get_geo_table_mut() -> RwLockWriteGuard<'static, OfflineGeoTable> {
    GEO_TABLE.write()
}

/// `GeoLookup` over the process-wide table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SharedGeoTable;

impl GeoLookup for SharedGeoTable {
    fn lookup(&self, ip: &str) -> Result<Option<GeoRecord>, EnrichmentError> {
        get_geo_table().lookup(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"[
        {"start": "203.0.113.0", "end": "203.0.113.255",
         "country": "United States", "country_code": "US", "region": "Texas",
         "region_code": "TX", "city": "Austin", "zip": "73301",
         "latitude": 30.2672, "longitude": -97.7431, "timezone": "America/Chicago"},
        {"start": "198.51.100.0", "end": "198.51.100.127", "country": "Canada"}
    ]"#;

    #[test]
    fn test_lookup_hit() {
        let table = OfflineGeoTable::from_json(TABLE).unwrap();
        let geo = table.lookup("203.0.113.5").unwrap().unwrap().into_geolocation();
        assert_eq!(geo.city, "Austin");
        assert_eq!(geo.country_code, "US");
        assert!(geo.has_coordinates());
    }

    #[test]
    fn test_partial_record_defaults() {
        let table = OfflineGeoTable::from_json(TABLE).unwrap();
        let geo = table.lookup("198.51.100.1").unwrap().unwrap().into_geolocation();
        assert_eq!(geo.country, "Canada");
        assert_eq!(geo.city, "Unknown");
        assert_eq!(geo.country_code, "XX");
        assert_eq!(geo.latitude, 0.0);
    }

    #[test]
    fn test_lookup_miss() {
        let table = OfflineGeoTable::from_json(TABLE).unwrap();
        assert_eq!(table.lookup("198.51.100.200").unwrap(), None);
        assert_eq!(table.lookup("10.0.0.1").unwrap(), None);
        assert_eq!(table.lookup("127.0.0.1").unwrap(), None);
        assert_eq!(table.lookup("not-an-ip").unwrap(), None);
    }

    #[test]
    fn test_overlap_rejected() {
        let json = r#"[
            {"start": "10.0.0.0", "end": "10.0.0.100"},
            {"start": "10.0.0.50", "end": "10.0.0.200"}
        ]"#;
        assert!(matches!(
            OfflineGeoTable::from_json(json),
            Err(EnrichmentError::GeoTable(_))
        ));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let json = r#"[{"start": "10.0.0.9", "end": "10.0.0.1"}]"#;
        assert!(OfflineGeoTable::from_json(json).is_err());
    }

    #[test]
    fn test_empty_record_is_all_default() {
        assert_eq!(GeoRecord::default().into_geolocation(), Geolocation::default());
    }
}
