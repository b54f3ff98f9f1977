use std::sync::Arc;

use quarry_common::spec::{DataType, Field, RowBatch, ScalarValue, Schema};

use crate::error::{ConnectorError, ConnectorResult};

const COLUMNS: [(&str, DataType); 20] = [
    ("id", DataType::Integer),
    ("name", DataType::String),
    ("mass", DataType::Float),
    ("diameter", DataType::Integer),
    ("density", DataType::Integer),
    ("gravity", DataType::Float),
    ("escapeVelocity", DataType::Float),
    ("rotationPeriod", DataType::Float),
    ("lengthOfDay", DataType::Float),
    ("distanceFromSun", DataType::Float),
    ("perihelion", DataType::Float),
    ("aphelion", DataType::Float),
    ("orbitalPeriod", DataType::Float),
    ("orbitalVelocity", DataType::Float),
    ("orbitalInclination", DataType::Float),
    ("orbitalEccentricity", DataType::Float),
    ("obliquityToOrbit", DataType::Float),
    ("meanTemperature", DataType::Integer),
    ("surfacePressure", DataType::Float),
    ("numberOfMoons", DataType::Integer),
];

struct Planet {
    id: i64,
    name: &'static str,
    mass: f64,
    diameter: i64,
    density: i64,
    gravity: f64,
    escape_velocity: f64,
    rotation_period: f64,
    length_of_day: f64,
    distance_from_sun: f64,
    perihelion: f64,
    aphelion: f64,
    orbital_period: f64,
    orbital_velocity: f64,
    orbital_inclination: f64,
    orbital_eccentricity: f64,
    obliquity_to_orbit: f64,
    mean_temperature: i64,
    surface_pressure: Option<f64>,
    number_of_moons: i64,
}

macro_rules! planet {
    ($id:expr, $name:expr, $mass:expr, $diameter:expr, $density:expr, $gravity:expr,
     $escape_velocity:expr, $rotation_period:expr, $length_of_day:expr,
     $distance_from_sun:expr, $perihelion:expr, $aphelion:expr, $orbital_period:expr,
     $orbital_velocity:expr, $orbital_inclination:expr, $orbital_eccentricity:expr,
     $obliquity_to_orbit:expr, $mean_temperature:expr, $surface_pressure:expr,
     $number_of_moons:expr) => {
        Planet {
            id: $id,
            name: $name,
            mass: $mass,
            diameter: $diameter,
            density: $density,
            gravity: $gravity,
            escape_velocity: $escape_velocity,
            rotation_period: $rotation_period,
            length_of_day: $length_of_day,
            distance_from_sun: $distance_from_sun,
            perihelion: $perihelion,
            aphelion: $aphelion,
            orbital_period: $orbital_period,
            orbital_velocity: $orbital_velocity,
            orbital_inclination: $orbital_inclination,
            orbital_eccentricity: $orbital_eccentricity,
            obliquity_to_orbit: $obliquity_to_orbit,
            mean_temperature: $mean_temperature,
            surface_pressure: $surface_pressure,
            number_of_moons: $number_of_moons,
        }
    };
}

// Source: NASA Planetary Fact Sheet (metric).
#[rustfmt::skip]
const FACT_SHEET: [Planet; 9] = [
    planet!(1, "Mercury", 0.330, 4879, 5427, 3.7, 4.3, 1407.6, 4222.6, 57.9, 46.0, 69.8, 88.0, 47.4, 7.0, 0.205, 0.034, 167, Some(0.0), 0),
    planet!(2, "Venus", 4.87, 12104, 5243, 8.9, 10.4, -5832.5, 2802.0, 108.2, 107.5, 108.9, 224.7, 35.0, 3.4, 0.007, 177.4, 464, Some(92.0), 0),
    planet!(3, "Earth", 5.97, 12756, 5514, 9.8, 11.2, 23.9, 24.0, 149.6, 147.1, 152.1, 365.2, 29.8, 0.0, 0.017, 23.4, 15, Some(1.0), 1),
    planet!(4, "Mars", 0.642, 6792, 3933, 3.7, 5.0, 24.6, 24.7, 227.9, 206.6, 249.2, 687.0, 24.1, 1.9, 0.094, 25.2, -65, Some(0.01), 2),
    planet!(5, "Jupiter", 1898.0, 142984, 1326, 23.1, 59.5, 9.9, 9.9, 778.6, 740.5, 816.6, 4331.0, 13.1, 1.3, 0.049, 3.1, -110, None, 79),
    planet!(6, "Saturn", 568.0, 120536, 687, 9.0, 35.5, 10.7, 10.7, 1433.5, 1352.6, 1514.5, 10747.0, 9.7, 2.5, 0.057, 26.7, -140, None, 62),
    planet!(7, "Uranus", 86.8, 51118, 1271, 8.7, 21.3, -17.2, 17.2, 2872.5, 2741.3, 3003.6, 30589.0, 6.8, 0.8, 0.046, 97.8, -195, None, 27),
    planet!(8, "Neptune", 102.0, 49528, 1638, 11.0, 23.5, 16.1, 16.1, 4495.1, 4444.5, 4545.7, 59800.0, 5.4, 1.8, 0.011, 28.3, -200, None, 14),
    planet!(9, "Pluto", 0.0146, 2370, 2095, 0.7, 1.3, -153.3, 153.3, 5906.4, 4436.8, 7375.9, 90560.0, 4.7, 17.2, 0.244, 122.5, -225, Some(0.00001), 5),
];

impl Planet {
    fn values(&self) -> Vec<ScalarValue> {
        vec![
            self.id.into(),
            self.name.into(),
            self.mass.into(),
            self.diameter.into(),
            self.density.into(),
            self.gravity.into(),
            self.escape_velocity.into(),
            self.rotation_period.into(),
            self.length_of_day.into(),
            self.distance_from_sun.into(),
            self.perihelion.into(),
            self.aphelion.into(),
            self.orbital_period.into(),
            self.orbital_velocity.into(),
            self.orbital_inclination.into(),
            self.orbital_eccentricity.into(),
            self.obliquity_to_orbit.into(),
            self.mean_temperature.into(),
            self.surface_pressure.into(),
            self.number_of_moons.into(),
        ]
    }
}

/// The nine planets of the solar system, in order of distance from the sun.
pub(super) fn planets() -> ConnectorResult<RowBatch> {
    let schema = Arc::new(Schema::new(
        COLUMNS
            .iter()
            .map(|(name, data_type)| Field::new(*name, *data_type))
            .collect(),
    ));
    let values = FACT_SHEET.iter().map(Planet::values).collect();
    RowBatch::try_from_values(schema, values).map_err(ConnectorError::from)
}
