//! Geodetic to Earth-centered inertial conversion
//!
//! Positions are placed on the WGS84 ellipsoid and rotated into the inertial frame by
//! Greenwich mean sidereal time, which is enough for relative distances and in-plane angles.

use std::f64::consts::PI;

use chrono::{DateTime, Utc};

/// WGS84 equatorial radius in km
const EARTH_RADIUS_KM: f64 = 6378.137;
const EARTH_FLATTENING: f64 = 1.0 / 298.257223563;

/// Earth-centered inertial position in km
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Eci {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Eci {
    pub fn distance(&self, other: &Eci) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Angle in the x-y plane, in `[0, 2π)`.
    pub fn angle(&self) -> f64 {
        self.y.atan2(self.x).rem_euclid(2.0 * PI)
    }

    /// `angle(to) - angle(self)`, normalised to `(-π, π]`.
    pub fn angle_delta(&self, to: &Eci) -> f64 {
        normalize_delta(to.angle() - self.angle())
    }
}

pub fn normalize_delta(delta: f64) -> f64 {
    if delta > PI {
        delta - 2.0 * PI
    } else if delta <= -PI {
        delta + 2.0 * PI
    } else {
        delta
    }
}

/// Greenwich mean sidereal time in radians for a unix timestamp in milliseconds.
pub fn gmst(unix_millis: i64) -> f64 {
    let jd = (unix_millis as f64 / 86_400_000.0) + 2_440_587.5;
    let t = (jd - 2_451_545.0) / 36_525.0;

    let gmst_sec = 67_310.548_41 + (876_600.0 * 3600.0 + 8_640_184.812_866) * t
        + 0.093_104 * t * t
        - 6.2e-6 * t * t * t;

    (gmst_sec / 240.0).to_radians().rem_euclid(2.0 * PI)
}

/// Convert latitude/longitude in degrees and altitude in km to ECI at `at`.
pub fn lla_to_eci(lat_deg: f64, lon_deg: f64, alt_km: f64, at: DateTime<Utc>) -> Eci {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();

    let e2 = 2.0 * EARTH_FLATTENING - EARTH_FLATTENING * EARTH_FLATTENING;
    let n = EARTH_RADIUS_KM / (1.0 - e2 * lat.sin().powi(2)).sqrt();

    let x_ecef = (n + alt_km) * lat.cos() * lon.cos();
    let y_ecef = (n + alt_km) * lat.cos() * lon.sin();
    let z_ecef = (n * (1.0 - e2) + alt_km) * lat.sin();

    let theta = gmst(at.timestamp_millis());
    let (sin_t, cos_t) = theta.sin_cos();

    Eci {
        x: cos_t * x_ecef - sin_t * y_ecef,
        y: sin_t * x_ecef + cos_t * y_ecef,
        z: z_ecef,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    #[test]
    fn test_equatorial_radius() {
        let p = lla_to_eci(0.0, 0.0, 550.0, epoch());
        let r = (p.x * p.x + p.y * p.y + p.z * p.z).sqrt();
        assert!((r - (EARTH_RADIUS_KM + 550.0)).abs() < 1e-6);
        assert!(p.z.abs() < 1e-9);
    }

    #[test]
    fn test_angle_range() {
        for lon in (-180..180).step_by(15) {
            let angle = lla_to_eci(10.0, lon as f64, 0.0, epoch()).angle();
            assert!((0.0..2.0 * PI).contains(&angle));
        }
    }

    #[test]
    fn test_angle_delta_is_rotation_invariant() {
        let a = lla_to_eci(0.0, 0.0, 550.0, epoch());
        let b = lla_to_eci(0.0, 90.0, 550.0, epoch());
        assert!((a.angle_delta(&b) - PI / 2.0).abs() < 1e-9);
        assert!((b.angle_delta(&a) + PI / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_delta() {
        assert!((normalize_delta(PI) - PI).abs() < 1e-12);
        assert!((normalize_delta(-PI) - PI).abs() < 1e-12);
        assert!((normalize_delta(1.5 * PI) + 0.5 * PI).abs() < 1e-12);
    }
}
