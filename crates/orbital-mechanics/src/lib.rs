//! Orbital Mechanics Library
//!
//! TLE catalog ingestion, SGP4 propagation and the coordinate transforms
//! needed to look at a satellite from a ground station (geodetic → ECEF → ECI,
//! GMST, topocentric azimuth/elevation/range).

use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod tle;

pub use tle::{load_catalog, parse_catalog, TwoLineElement};

#[derive(Error, Debug)]
pub enum OrbitalError {
    #[error("Invalid TLE format: {0}")]
    InvalidTle(String),
    #[error("Propagation failed: {0}")]
    PropagationFailed(String),
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
    #[error("TLE file not found: {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, OrbitalError>;

/// Inertial (TEME) state in km and km/s
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StateVector {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub epoch: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeodeticPosition {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
}

/// Topocentric look angles from an observer to a target
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LookAngles {
    /// Degrees clockwise from north, in [0, 360)
    pub azimuth_deg: f64,
    /// Degrees above the local horizon, in [-90, 90]
    pub elevation_deg: f64,
    pub range_km: f64,
}

pub mod propagation {
    use super::*;

    /// SGP4 model for one satellite, initialised once and reused for every query
    pub struct Propagator {
        constants: sgp4::Constants,
        epoch: DateTime<Utc>,
    }

    impl std::fmt::Debug for Propagator {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Propagator").field("epoch", &self.epoch).finish()
        }
    }

    impl Propagator {
        pub fn from_tle(tle: &TwoLineElement) -> Result<Self> {
            let elements = sgp4::Elements::from_tle(
                Some(tle.name.clone()),
                tle.line1.as_bytes(),
                tle.line2.as_bytes(),
            )
            .map_err(|e| OrbitalError::InvalidTle(format!("{}: {:?}", tle.name, e)))?;

            let constants = sgp4::Constants::from_elements(&elements)
                .map_err(|e| OrbitalError::PropagationFailed(format!("{}: {:?}", tle.name, e)))?;

            let epoch = DateTime::<Utc>::from_naive_utc_and_offset(elements.datetime, Utc);

            Ok(Self { constants, epoch })
        }

        pub fn epoch(&self) -> DateTime<Utc> {
            self.epoch
        }

        pub fn propagate(&self, time: DateTime<Utc>) -> Result<StateVector> {
            let elapsed = time.signed_duration_since(self.epoch);
            let minutes_since_epoch = elapsed.num_milliseconds() as f64 / 60_000.0;

            let prediction = self
                .constants
                .propagate(minutes_since_epoch)
                .map_err(|e| OrbitalError::PropagationFailed(format!("{:?}", e)))?;

            let position = Vector3::from(prediction.position);
            if !position.iter().all(|c| c.is_finite()) {
                return Err(OrbitalError::PropagationFailed(
                    "non-finite position".to_string(),
                ));
            }

            Ok(StateVector {
                position,
                velocity: Vector3::from(prediction.velocity),
                epoch: time,
            })
        }
    }

    /// One-shot propagation straight from TLE lines
    pub fn sgp4_propagate(tle: &TwoLineElement, time: DateTime<Utc>) -> Result<StateVector> {
        Propagator::from_tle(tle)?.propagate(time)
    }
}

pub mod transforms {
    use super::*;
    use std::f64::consts::PI;

    pub const EARTH_RADIUS_KM: f64 = 6378.137;
    const EARTH_FLATTENING: f64 = 1.0 / 298.257223563;

    /// Greenwich mean sidereal time in radians, normalised to [0, 2π)
    pub fn gmst(time: DateTime<Utc>) -> f64 {
        let unix = time.timestamp() as f64 + f64::from(time.timestamp_subsec_nanos()) * 1e-9;
        let jd = unix / 86400.0 + 2440587.5;
        let t = (jd - 2451545.0) / 36525.0;

        let gmst_sec = 67310.54841 + (876600.0 * 3600.0 + 8640184.812866) * t
            + 0.093104 * t * t
            - 6.2e-6 * t * t * t;

        (gmst_sec / 240.0).to_radians().rem_euclid(2.0 * PI)
    }

    pub fn geodetic_to_ecef(pos: &GeodeticPosition) -> Result<Vector3<f64>> {
        if !(-90.0..=90.0).contains(&pos.latitude_deg) || !pos.latitude_deg.is_finite() {
            return Err(OrbitalError::InvalidCoordinates(format!(
                "latitude {} out of range",
                pos.latitude_deg
            )));
        }
        if !pos.longitude_deg.is_finite() || !pos.altitude_km.is_finite() {
            return Err(OrbitalError::InvalidCoordinates(format!("{:?}", pos)));
        }

        let lat = pos.latitude_deg.to_radians();
        let lon = pos.longitude_deg.to_radians();
        let e2 = 2.0 * EARTH_FLATTENING - EARTH_FLATTENING * EARTH_FLATTENING;

        // Radius of curvature in the prime vertical
        let n = EARTH_RADIUS_KM / (1.0 - e2 * lat.sin().powi(2)).sqrt();

        Ok(Vector3::new(
            (n + pos.altitude_km) * lat.cos() * lon.cos(),
            (n + pos.altitude_km) * lat.cos() * lon.sin(),
            (n * (1.0 - e2) + pos.altitude_km) * lat.sin(),
        ))
    }

    /// Rotate an Earth-fixed vector about Z by GMST into the inertial frame
    pub fn ecef_to_eci(ecef: &Vector3<f64>, gmst_rad: f64) -> Vector3<f64> {
        let (sin_g, cos_g) = gmst_rad.sin_cos();
        Vector3::new(
            cos_g * ecef.x - sin_g * ecef.y,
            sin_g * ecef.x + cos_g * ecef.y,
            ecef.z,
        )
    }

    /// Look angles from an observer on the ellipsoid to an inertial target position
    pub fn look_angles(
        observer: &GeodeticPosition,
        target_eci: &Vector3<f64>,
        time: DateTime<Utc>,
    ) -> Result<LookAngles> {
        let gmst_rad = gmst(time);
        let observer_eci = ecef_to_eci(&geodetic_to_ecef(observer)?, gmst_rad);

        let d = target_eci - observer_eci;
        let range_km = d.norm();
        if range_km <= f64::EPSILON {
            return Err(OrbitalError::InvalidCoordinates(
                "target coincides with observer".to_string(),
            ));
        }

        // Local sidereal angle of the observer meridian
        let theta = gmst_rad + observer.longitude_deg.to_radians();
        let (sin_lat, cos_lat) = observer.latitude_deg.to_radians().sin_cos();
        let (sin_t, cos_t) = theta.sin_cos();

        // South-East-Zenith
        let s = sin_lat * cos_t * d.x + sin_lat * sin_t * d.y - cos_lat * d.z;
        let e = -sin_t * d.x + cos_t * d.y;
        let z = cos_lat * cos_t * d.x + cos_lat * sin_t * d.y + sin_lat * d.z;

        let azimuth_deg = e.atan2(-s).to_degrees().rem_euclid(360.0);
        let elevation_deg = (z / range_km).clamp(-1.0, 1.0).asin().to_degrees();

        Ok(LookAngles {
            azimuth_deg,
            elevation_deg,
            range_km,
        })
    }

    /// Simplified ground track (ignores Earth rotation and flattening)
    pub fn eci_to_geodetic(position: &Vector3<f64>) -> GeodeticPosition {
        let r = (position.x * position.x + position.y * position.y).sqrt();
        GeodeticPosition {
            latitude_deg: position.z.atan2(r).to_degrees(),
            longitude_deg: position.y.atan2(position.x).to_degrees(),
            altitude_km: position.norm() - EARTH_RADIUS_KM,
        }
    }
}
