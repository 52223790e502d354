//! Sun position for a fixed observer.
//!
//! Thin wrapper over the `sun` crate.  The calculator is rebuilt whenever
//! new coordinates arrive over the network API; the solar task recomputes
//! angles from it on its refresh period.

/// Sun angles in degrees.  Azimuth is compass-style (0° = north, 90° =
/// east), elevation is above the horizon (negative at night).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunAngles {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarCalculator {
    lat: f64,
    lon: f64,
}

impl SolarCalculator {
    /// Observer coordinates in decimal degrees.  Rejects out-of-range
    /// values rather than producing nonsense angles.
    pub fn new(lat: f64, lon: f64) -> Result<Self, crate::error::Error> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(crate::error::Error::Config("coordinates out of range"));
        }
        Ok(Self { lat, lon })
    }

    /// Sun angles at the given unix time (milliseconds).
    pub fn position(&self, unix_time_ms: i64) -> SunAngles {
        let pos = sun::pos(unix_time_ms, self.lat, self.lon);
        // `sun` reports azimuth from south, westward positive; convert to
        // compass bearing from north.
        let azimuth_deg = (pos.azimuth.to_degrees() + 180.0).rem_euclid(360.0);
        SunAngles {
            azimuth_deg,
            elevation_deg: pos.altitude.to_degrees(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-20 12:00:00 UTC — midday on the March equinox.
    const EQUINOX_NOON_MS: i64 = 1_710_936_000_000;
    // 2024-03-20 00:00:00 UTC.
    const EQUINOX_MIDNIGHT_MS: i64 = 1_710_892_800_000;

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(SolarCalculator::new(91.0, 0.0).is_err());
        assert!(SolarCalculator::new(0.0, 181.0).is_err());
        assert!(SolarCalculator::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn equinox_noon_sun_is_high_at_the_equator() {
        let calc = SolarCalculator::new(0.0, 0.0).unwrap();
        let angles = calc.position(EQUINOX_NOON_MS);
        assert!(
            angles.elevation_deg > 80.0,
            "expected near-zenith sun, got {:.1}°",
            angles.elevation_deg
        );
    }

    #[test]
    fn midnight_sun_is_below_horizon() {
        let calc = SolarCalculator::new(0.0, 0.0).unwrap();
        let angles = calc.position(EQUINOX_MIDNIGHT_MS);
        assert!(angles.elevation_deg < -60.0);
    }

    #[test]
    fn azimuth_is_a_compass_bearing() {
        let calc = SolarCalculator::new(48.0, 11.0).unwrap();
        // Morning sun sits in the eastern half of the sky.
        // 2024-03-20 07:00:00 UTC.
        let angles = calc.position(1_710_918_000_000);
        assert!((0.0..360.0).contains(&angles.azimuth_deg));
        assert!(
            angles.azimuth_deg > 45.0 && angles.azimuth_deg < 180.0,
            "morning azimuth {:.1}° should be easterly",
            angles.azimuth_deg
        );
    }
}
