//! Native ontology types
//!
//! A Rust type becomes an ontology by implementing [`Ontology`] and being
//! registered with [`OntologyRegistry::register_type`]. Only the registered
//! type itself can be written under its tag; another type that happens to
//! declare the same tag and fields is rejected at the write boundary.
//!
//! The built-in catalog covers the common sensor payloads (IMU, GPS,
//! magnetometer) and the building blocks they share.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::registry::OntologyRegistry;
use crate::schema::{DataType, Field, SerializationFormat, StructuralSchema};

/// A record type that can be registered and streamed
pub trait Ontology: Serialize + 'static {
    /// Stable ontology tag
    const TAG: &'static str;
    /// Serialization mode for topics of this type
    const FORMAT: SerializationFormat = SerializationFormat::Default;

    /// Structural schema matching the type's serde representation
    fn schema() -> StructuralSchema;
}

/// Register every built-in ontology
pub fn register_builtins(registry: &OntologyRegistry) -> Result<()> {
    registry.register_type::<Imu>()?;
    registry.register_type::<Gps>()?;
    registry.register_type::<Magnetometer>()?;
    Ok(())
}

// --- building blocks ---

/// Seconds + nanoseconds timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Time {
    pub sec: i64,
    pub nanosec: u32,
}

impl Time {
    pub fn new(sec: i64, nanosec: u32) -> Self {
        Self { sec, nanosec }
    }

    /// Split fractional seconds, e.g. `1700000000.26`
    pub fn from_secs_f64(secs: f64) -> Self {
        let sec = secs.floor();
        let nanosec = ((secs - sec) * 1e9).round().min(999_999_999.0) as u32;
        Self { sec: sec as i64, nanosec }
    }

    pub fn to_nanos(&self) -> i64 {
        self.sec
            .saturating_mul(1_000_000_000)
            .saturating_add(self.nanosec as i64)
    }

    pub fn fields() -> Vec<Field> {
        vec![
            Field::new("sec", DataType::Int64),
            Field::new("nanosec", DataType::Uint32),
        ]
    }
}

impl From<DateTime<Utc>> for Time {
    fn from(t: DateTime<Utc>) -> Self {
        Self {
            sec: t.timestamp(),
            nanosec: t.timestamp_subsec_nanos(),
        }
    }
}

/// Standard message header
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Header {
    pub stamp: Time,
    pub frame_id: Option<String>,
}

impl Header {
    pub fn fields() -> Vec<Field> {
        vec![
            Field::structure("stamp", Time::fields()),
            Field::new("frame_id", DataType::String).nullable(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3d {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn fields() -> Vec<Field> {
        vec![
            Field::new("x", DataType::Float64),
            Field::new("y", DataType::Float64),
            Field::new("z", DataType::Float64),
        ]
    }
}

// --- sensors ---

/// Inertial measurement unit sample
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Imu {
    pub header: Header,
    pub acceleration: Vector3d,
    pub angular_velocity: Vector3d,
}

impl Ontology for Imu {
    const TAG: &'static str = "imu";

    fn schema() -> StructuralSchema {
        StructuralSchema::new(vec![
            Field::structure("header", Header::fields()),
            Field::structure("acceleration", Vector3d::fields()),
            Field::structure("angular_velocity", Vector3d::fields()),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GpsStatus {
    /// Fix status (-1: no fix, 0: fix, 1: SBAS, 2: GBAS)
    pub status: i8,
    /// Bitmask of satellite services in use
    pub service: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

/// GNSS fix
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Gps {
    pub header: Header,
    pub position: GeoPosition,
    pub status: GpsStatus,
}

impl Ontology for Gps {
    const TAG: &'static str = "gps";

    fn schema() -> StructuralSchema {
        StructuralSchema::new(vec![
            Field::structure("header", Header::fields()),
            Field::structure(
                "position",
                vec![
                    Field::new("latitude", DataType::Float64),
                    Field::new("longitude", DataType::Float64),
                    Field::new("altitude", DataType::Float64),
                ],
            ),
            Field::structure(
                "status",
                vec![
                    Field::new("status", DataType::Int8),
                    Field::new("service", DataType::Uint16),
                ],
            ),
        ])
    }
}

/// Magnetic field sample, in tesla
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Magnetometer {
    pub header: Header,
    pub magnetic_field: Vector3d,
}

impl Ontology for Magnetometer {
    const TAG: &'static str = "magnetometer";

    fn schema() -> StructuralSchema {
        StructuralSchema::new(vec![
            Field::structure("header", Header::fields()),
            Field::structure("magnetic_field", Vector3d::fields()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_matches_schema<T: Ontology + Default>() {
        let record = serde_json::to_value(T::default()).unwrap();
        T::schema().validate_record(T::TAG, &record).unwrap();
    }

    #[test]
    fn test_builtin_records_match_their_schemas() {
        assert_matches_schema::<Imu>();
        assert_matches_schema::<Gps>();
        assert_matches_schema::<Magnetometer>();
    }

    #[test]
    fn test_register_builtins() {
        let registry = OntologyRegistry::new();
        register_builtins(&registry).unwrap();
        assert_eq!(registry.tags(), vec!["gps", "imu", "magnetometer"]);
        // a second pass hits the duplicate check
        assert!(register_builtins(&registry).is_err());
    }

    #[test]
    fn test_time_from_float() {
        let t = Time::from_secs_f64(1_700_000_000.26);
        assert_eq!(t.sec, 1_700_000_000);
        // f64 carries ~7 significant digits after the point at this magnitude
        assert!((t.nanosec as i64 - 260_000_000).abs() < 1_000);
    }
}
