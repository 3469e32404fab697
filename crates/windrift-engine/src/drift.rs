use windrift_types::{Coordinate, WindVector};

/// Notes move at this fraction of the wind speed.
pub const DRIFT_FACTOR: f64 = 0.15;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;
const METERS_PER_MILE: f64 = 1_609.34;

/// Projects `from` along the wind for `elapsed_hours`, returning the new
/// position via the spherical destination-point formula.
///
/// Zero wind speed is the identity. The `asin` argument is clamped so
/// floating error at extreme distances can't produce NaN, and the resulting
/// longitude is normalized to [-180, 180) so drifts across the antimeridian
/// wrap instead of walking off the map.
pub fn drift(
    from: Coordinate,
    wind: &WindVector,
    elapsed_hours: f64,
    drift_factor: f64,
) -> Coordinate {
    let effective_speed_mph = wind.speed_mph * drift_factor;
    let distance_meters = effective_speed_mph * elapsed_hours * METERS_PER_MILE;

    if distance_meters == 0.0 {
        return from;
    }

    let bearing = wind.bearing_degrees.to_radians();
    let lat1 = from.lat.to_radians();
    let lon1 = from.lon.to_radians();
    let angular_distance = distance_meters / EARTH_RADIUS_METERS;

    let lat2 = (lat1.sin() * angular_distance.cos()
        + lat1.cos() * angular_distance.sin() * bearing.cos())
    .clamp(-1.0, 1.0)
    .asin();

    let lon2 = lon1
        + (bearing.sin() * angular_distance.sin() * lat1.cos())
            .atan2(angular_distance.cos() - lat1.sin() * lat2.sin());

    Coordinate::new(lat2.to_degrees(), normalize_lon(lon2.to_degrees()))
}

fn normalize_lon(lon: f64) -> f64 {
    (lon + 540.0).rem_euclid(360.0) - 180.0
}
