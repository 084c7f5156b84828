//! Message catalog
//!
//! The built-in table covers a 5th-gen Toyota 4Runner bus (500 kbps,
//! passive listening) plus OBD-II responses. Only the tire pressure and the
//! SAE J1979 standard PIDs are verified; everything else is a candidate
//! formula kept for illustration and flagged [`Provenance::Unverified`].

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{DecodedSignal, MessageDef, Mux, Provenance, RawField, Remap, SignalDef};
use crate::config::ConfigError;
use crate::frame::CanFrame;
use crate::signal::ByteOrder;
use crate::unit_conversion::Unit;

/// OBD-II engine ECU response identifier
pub const OBD_ECM_RESPONSE_ID: u32 = 0x7E8;
/// ABS/skid control ECU response identifier
pub const OBD_ABS_RESPONSE_ID: u32 = 0x7B8;
/// Combination meter ECU response identifier
pub const OBD_METER_RESPONSE_ID: u32 = 0x7C8;

/// Positive response to service 0x01
const SERVICE_STANDARD: u8 = 0x41;
/// Positive response to Toyota service 0x21
const SERVICE_EXTENDED: u8 = 0x61;

/// A set of message definitions indexed by identifier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<MessageDef>", into = "Vec<MessageDef>")]
pub struct Catalog {
    messages: Vec<MessageDef>,
    by_id: HashMap<u32, Vec<usize>>,
}

impl From<Vec<MessageDef>> for Catalog {
    fn from(messages: Vec<MessageDef>) -> Self {
        Catalog::new(messages)
    }
}

impl From<Catalog> for Vec<MessageDef> {
    fn from(catalog: Catalog) -> Self {
        catalog.messages
    }
}

impl Catalog {
    /// Build a catalog and index it by identifier
    pub fn new(messages: Vec<MessageDef>) -> Self {
        let mut by_id: HashMap<u32, Vec<usize>> = HashMap::new();
        for (index, message) in messages.iter().enumerate() {
            by_id.entry(message.id).or_default().push(index);
        }
        Self { messages, by_id }
    }

    /// Parse a JSON list of message definitions and check every layout
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let messages: Vec<MessageDef> =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        for message in &messages {
            message.check().map_err(ConfigError::Invalid)?;
        }
        Ok(Self::new(messages))
    }

    /// Load a catalog from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Every definition, in catalog order
    pub fn messages(&self) -> &[MessageDef] {
        &self.messages
    }

    /// All signal definitions, in catalog order
    pub fn signals(&self) -> impl Iterator<Item = &SignalDef> {
        self.messages.iter().flat_map(|m| m.signals.iter())
    }

    /// Identifiers known to the catalog
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_id.keys().copied()
    }

    /// Decode every signal of every message definition accepting the frame.
    ///
    /// Yields nothing for unknown identifiers, short frames and multiplexer
    /// mismatches.
    pub fn decode<'a>(&'a self, frame: &'a CanFrame) -> impl Iterator<Item = DecodedSignal<'a>> + 'a {
        self.by_id
            .get(&frame.identifier)
            .into_iter()
            .flatten()
            .map(move |&index| &self.messages[index])
            .filter(move |message| message.accepts(frame))
            .flat_map(move |message| {
                message.signals.iter().filter_map(move |def| {
                    def.decode(&frame.data)
                        .map(|value| DecodedSignal { def, value })
                })
            })
    }
}

fn bytes(
    name: &str,
    start: u8,
    len: u8,
    scale: f64,
    offset: f64,
    unit: Unit,
    provenance: Provenance,
) -> SignalDef {
    SignalDef {
        name: name.to_string(),
        field: RawField::Bytes { start, len },
        remap: Remap::None,
        scale,
        offset,
        unit,
        provenance,
    }
}

fn motorola(name: &str, start_bit: u8, length: u8, remap: Remap, scale: f64, offset: f64, unit: Unit) -> SignalDef {
    SignalDef {
        name: name.to_string(),
        field: RawField::Bits {
            order: ByteOrder::BigEndian,
            start_bit,
            length,
        },
        remap,
        scale,
        offset,
        unit,
        provenance: Provenance::Unverified,
    }
}

fn broadcast(name: &str, id: u32, signals: Vec<SignalDef>) -> MessageDef {
    MessageDef {
        name: name.to_string(),
        id,
        min_dlc: 8,
        mux: None,
        signals,
    }
}

fn obd(name: &str, id: u32, service: u8, pid: u8, min_len: u8, signals: Vec<SignalDef>) -> MessageDef {
    MessageDef {
        name: name.to_string(),
        id,
        // length byte plus `min_len` bytes of response
        min_dlc: min_len.saturating_add(1).min(8),
        mux: Some(Mux {
            service,
            pid,
            min_len,
        }),
        signals,
    }
}

/// The built-in message table
pub fn builtin_catalog() -> Catalog {
    use Provenance::{Unverified, Verified};

    // raw / 30 = kPa, * 0.145038 = PSI (checked against 0x1A6F = 32.7 PSI)
    let tpms_scale = 0.145038 / 30.0;

    let messages = vec![
        broadcast(
            "tire_pressure",
            0x0AA,
            vec![
                bytes("tire_fl_psi", 0, 2, tpms_scale, 0.0, Unit::Psi, Verified),
                bytes("tire_fr_psi", 2, 2, tpms_scale, 0.0, Unit::Psi, Verified),
                bytes("tire_rl_psi", 4, 2, tpms_scale, 0.0, Unit::Psi, Verified),
                bytes("tire_rr_psi", 6, 2, tpms_scale, 0.0, Unit::Psi, Verified),
            ],
        ),
        // Same identifier read as wheel speeds: (raw - 6750) / 100
        broadcast(
            "wheel_speed_broadcast",
            0x0AA,
            vec![
                bytes("bcast_wheel_fr_kph", 0, 2, 0.01, -67.5, Unit::Kph, Unverified),
                bytes("bcast_wheel_fl_kph", 2, 2, 0.01, -67.5, Unit::Kph, Unverified),
                bytes("bcast_wheel_rr_kph", 4, 2, 0.01, -67.5, Unit::Kph, Unverified),
                bytes("bcast_wheel_rl_kph", 6, 2, 0.01, -67.5, Unit::Kph, Unverified),
            ],
        ),
        broadcast(
            "kinematics",
            0x024,
            vec![
                motorola("yaw_rate_deg_s", 1, 10, Remap::HalfRange, 1.0, 0.0, Unit::DegreesPerSecond),
                motorola("steering_torque", 17, 10, Remap::HalfRange, 1.0, 0.0, Unit::None),
                motorola("lateral_accel_g", 33, 10, Remap::HalfRange, -0.002121, -0.0126, Unit::G),
            ],
        ),
        broadcast(
            "steering_angle",
            0x025,
            vec![motorola(
                "steering_angle_deg",
                3,
                12,
                Remap::TwosComplement,
                1.5,
                0.0,
                Unit::Degrees,
            )],
        ),
        broadcast(
            "vehicle_speed",
            0x0B4,
            vec![bytes("bcast_vehicle_speed_kph", 5, 2, 0.01, 0.0, Unit::Kph, Unverified)],
        ),
        broadcast(
            "tire_temperature",
            0x4A7,
            vec![
                bytes("tire_fl_temp_c", 0, 1, 1.0, -40.0, Unit::Celsius, Unverified),
                bytes("tire_fr_temp_c", 1, 1, 1.0, -40.0, Unit::Celsius, Unverified),
                bytes("tire_rl_temp_c", 2, 1, 1.0, -40.0, Unit::Celsius, Unverified),
                bytes("tire_rr_temp_c", 3, 1, 1.0, -40.0, Unit::Celsius, Unverified),
            ],
        ),
        broadcast(
            "engine_data",
            0x2C1,
            vec![bytes("coolant_temp_c", 0, 1, 1.0, -40.0, Unit::Celsius, Unverified)],
        ),
        broadcast(
            "throttle",
            0x1C4,
            vec![bytes("throttle_pct", 1, 1, 1.0 / 2.55, 0.0, Unit::Percent, Unverified)],
        ),
        obd(
            "obd_rpm",
            OBD_ECM_RESPONSE_ID,
            SERVICE_STANDARD,
            0x0C,
            4,
            vec![bytes("rpm", 3, 2, 0.25, 0.0, Unit::Rpm, Verified)],
        ),
        obd(
            "obd_vehicle_speed",
            OBD_ECM_RESPONSE_ID,
            SERVICE_STANDARD,
            0x0D,
            3,
            vec![bytes("vehicle_speed_kph", 3, 1, 1.0, 0.0, Unit::Kph, Verified)],
        ),
        obd(
            "obd_intake_air_temp",
            OBD_ECM_RESPONSE_ID,
            SERVICE_STANDARD,
            0x0F,
            3,
            vec![bytes("iat_c", 3, 1, 1.0, -40.0, Unit::Celsius, Verified)],
        ),
        obd(
            "obd_baro",
            OBD_ECM_RESPONSE_ID,
            SERVICE_STANDARD,
            0x33,
            3,
            vec![bytes("baro_kpa", 3, 1, 1.0, 0.0, Unit::Kpa, Verified)],
        ),
        obd(
            "obd_module_voltage",
            OBD_ECM_RESPONSE_ID,
            SERVICE_STANDARD,
            0x42,
            4,
            vec![bytes("vbatt_v", 3, 2, 0.001, 0.0, Unit::Volts, Verified)],
        ),
        obd(
            "obd_atf_temp",
            OBD_ECM_RESPONSE_ID,
            SERVICE_EXTENDED,
            0x82,
            6,
            vec![
                bytes("atf_pan_c", 3, 2, 1.0 / 256.0, -40.0, Unit::Celsius, Unverified),
                bytes("atf_tqc_c", 5, 2, 1.0 / 256.0, -40.0, Unit::Celsius, Unverified),
            ],
        ),
        obd(
            "obd_gear",
            OBD_ECM_RESPONSE_ID,
            SERVICE_EXTENDED,
            0x85,
            5,
            vec![
                bytes("gear", 3, 1, 1.0, 0.0, Unit::None, Unverified),
                SignalDef {
                    name: "tqc_lockup".to_string(),
                    // bit 7 of byte 4
                    field: RawField::Bits {
                        order: ByteOrder::LittleEndian,
                        start_bit: 39,
                        length: 1,
                    },
                    remap: Remap::None,
                    scale: 1.0,
                    offset: 0.0,
                    unit: Unit::None,
                    provenance: Unverified,
                },
            ],
        ),
        obd(
            "obd_odometer",
            OBD_ECM_RESPONSE_ID,
            SERVICE_EXTENDED,
            0x28,
            5,
            vec![bytes("odo_km", 3, 3, 1.0, 0.0, Unit::Km, Unverified)],
        ),
        obd(
            "abs_wheel_speeds",
            OBD_ABS_RESPONSE_ID,
            SERVICE_EXTENDED,
            0x03,
            6,
            vec![
                bytes("diag_wheel_fr_kph", 3, 1, 256.0 / 200.0, 0.0, Unit::Kph, Unverified),
                bytes("diag_wheel_fl_kph", 4, 1, 256.0 / 200.0, 0.0, Unit::Kph, Unverified),
                bytes("diag_wheel_rr_kph", 5, 1, 256.0 / 200.0, 0.0, Unit::Kph, Unverified),
                bytes("diag_wheel_rl_kph", 6, 1, 256.0 / 200.0, 0.0, Unit::Kph, Unverified),
            ],
        ),
        obd(
            "abs_orientation",
            OBD_ABS_RESPONSE_ID,
            SERVICE_EXTENDED,
            0x47,
            7,
            vec![
                SignalDef {
                    remap: Remap::TwosComplement,
                    ..bytes("lateral_g", 3, 1, 0.02, 0.0, Unit::G, Unverified)
                },
                SignalDef {
                    remap: Remap::TwosComplement,
                    ..bytes("longitudinal_g", 4, 1, 0.02, 0.0, Unit::G, Unverified)
                },
                bytes("yaw_rate_diag_deg_s", 5, 1, 1.0, -128.0, Unit::DegreesPerSecond, Unverified),
                bytes("steering_angle_diag_deg", 6, 2, 0.1, -3276.8, Unit::Degrees, Unverified),
            ],
        ),
        obd(
            "meter_fuel_level",
            OBD_METER_RESPONSE_ID,
            SERVICE_EXTENDED,
            0x29,
            3,
            vec![bytes("fuel_level_gal", 3, 1, 500.0 / 3785.0, 0.0, Unit::Gallons, Unverified)],
        ),
    ];

    Catalog::new(messages)
}
