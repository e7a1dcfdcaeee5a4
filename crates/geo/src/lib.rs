//! Great-circle distance between latitude/longitude points.

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometers between two points, via the
/// haversine formula.
///
/// Inputs are degrees; computation is in radians. Always returns a finite,
/// non-negative number for finite inputs and is symmetric in its two
/// points. Out-of-range coordinates still produce a numeric result; range
/// validation belongs to the caller.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARIS: (f64, f64) = (48.8566, 2.3522);

    #[test]
    fn test_identical_points_are_zero() {
        assert_eq!(distance_km(PARIS.0, PARIS.1, PARIS.0, PARIS.1), 0.0);
        assert_eq!(distance_km(0.0, 0.0, 0.0, 0.0), 0.0);
        assert_eq!(distance_km(-45.0, 170.0, -45.0, 170.0), 0.0);
    }

    #[test]
    fn test_symmetry() {
        let points = [
            (PARIS, (48.9000, 2.3522)),
            ((-6.2088, 106.8456), (-6.9175, 107.6191)),
            ((89.0, 0.0), (-89.0, 180.0)),
        ];
        for (a, b) in points {
            let ab = distance_km(a.0, a.1, b.0, b.1);
            let ba = distance_km(b.0, b.1, a.0, a.1);
            assert!((ab - ba).abs() < 1e-9, "asymmetric for {a:?} / {b:?}");
        }
    }

    #[test]
    fn test_known_distance_north_of_paris() {
        // 48.9000°N along the same meridian is roughly 4.83 km away.
        let d = distance_km(PARIS.0, PARIS.1, 48.9000, PARIS.1);
        assert!((d - 4.83).abs() < 0.01, "got {d}");
    }

    #[test]
    fn test_result_is_non_negative() {
        let d = distance_km(10.0, 20.0, -30.0, -40.0);
        assert!(d >= 0.0);
        assert!(d.is_finite());
    }
}
