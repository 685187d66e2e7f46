//! Ground Stations Library
//!
//! Station identities and geodetic positions, loaded once at startup and
//! looked up by id afterwards. The registry is immutable after construction.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum StationError {
    #[error("Station {0} not found")]
    NotFound(String),
    #[error("Invalid station {id}: {reason}")]
    InvalidStation { id: String, reason: String },
    #[error("Stations file not found: {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StationError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroundStation {
    pub id: String,
    pub name: String,
    pub location: GeoLocation,
}

/// Geodetic position; altitude is height above the WGS84 ellipsoid
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
}

fn is_valid_latitude(lat: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && lat.is_finite()
}

fn is_valid_longitude(lon: f64) -> bool {
    (-180.0..=180.0).contains(&lon) && lon.is_finite()
}

impl GroundStation {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        altitude_m: f64,
    ) -> Result<Self> {
        let id = id.into();
        if !is_valid_latitude(latitude) {
            return Err(StationError::InvalidStation {
                id,
                reason: format!("latitude {} out of range", latitude),
            });
        }
        if !is_valid_longitude(longitude) {
            return Err(StationError::InvalidStation {
                id,
                reason: format!("longitude {} out of range", longitude),
            });
        }
        if !altitude_m.is_finite() {
            return Err(StationError::InvalidStation {
                id,
                reason: "non-finite elevation".to_string(),
            });
        }

        Ok(Self {
            id,
            name: name.into(),
            location: GeoLocation {
                latitude,
                longitude,
                altitude_m,
            },
        })
    }
}

/// Raw station record as found in configuration files
#[derive(Debug, Deserialize)]
struct RawStation {
    id: Option<String>,
    name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(alias = "altitude_m")]
    elevation_m: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct StationRegistry {
    stations: Vec<GroundStation>,
}

impl StationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry; on duplicate ids the first record wins
    pub fn from_stations(stations: impl IntoIterator<Item = GroundStation>) -> Self {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();

        for station in stations {
            if seen.insert(station.id.clone()) {
                kept.push(station);
            } else {
                warn!("Duplicate station id {}, keeping first record", station.id);
            }
        }

        Self { stations: kept }
    }

    pub fn with_default_network() -> Self {
        let defaults = [
            ("gatech_atlanta", "Georgia Tech, Atlanta", 33.7756, -84.3963, 288.0),
            ("svalbard", "Svalbard", 78.2298, 15.4078, 500.0),
            ("mcmurdo", "McMurdo", -77.8419, 166.6863, 10.0),
            ("singapore", "Singapore", 1.3521, 103.8198, 15.0),
        ];

        Self::from_stations(defaults.into_iter().map(|(id, name, lat, lon, alt)| {
            GroundStation {
                id: id.to_string(),
                name: name.to_string(),
                location: GeoLocation {
                    latitude: lat,
                    longitude: lon,
                    altitude_m: alt,
                },
            }
        }))
    }

    /// Load station configuration from a JSON array of
    /// `{id, name?, latitude, longitude, elevation_m}` records
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading stations from {:?}", path);

        let file = File::open(path).map_err(|source| StationError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let raw: Vec<RawStation> = serde_json::from_reader(BufReader::new(file))?;

        let mut stations = Vec::new();
        let mut skipped = 0;

        for (i, record) in raw.into_iter().enumerate() {
            let (Some(lat), Some(lon)) = (record.latitude, record.longitude) else {
                skipped += 1;
                continue;
            };
            let id = record.id.unwrap_or_else(|| format!("gs-{}", i));
            let name = record.name.unwrap_or_else(|| id.clone());

            match GroundStation::new(id, name, lat, lon, record.elevation_m.unwrap_or(0.0)) {
                Ok(station) => stations.push(station),
                Err(e) => {
                    warn!("{}", e);
                    skipped += 1;
                }
            }
        }

        info!(
            "Loaded {} stations ({} skipped for missing or invalid coords)",
            stations.len(),
            skipped
        );

        Ok(Self::from_stations(stations))
    }

    pub fn get(&self, id: &str) -> Result<&GroundStation> {
        self.stations
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| StationError::NotFound(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroundStation> {
        self.stations.iter()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}
