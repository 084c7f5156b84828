//! Unit Conversion Functions
//!
//! Physical units attached to decoded signals, and the imperial
//! conversions used when presenting them:
//! - Temperature: °C → °F
//! - Pressure: kPa → PSI
//! - Speed: km/h → mph
//! - Distance: km → miles

use serde::{Deserialize, Serialize};

/// Convert Celsius to Fahrenheit
pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

/// Convert kPa to PSI
pub fn kpa_to_psi(kpa: f64) -> f64 {
    kpa * 0.14503773773020923
}

/// Convert km/h to mph
pub fn kmh_to_mph(kmh: f64) -> f64 {
    kmh * 0.62137119223733
}

/// Convert kilometers to miles
pub fn km_to_miles(km: f64) -> f64 {
    kmh_to_mph(km)
}

/// Physical unit of a decoded signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    /// Pounds per square inch
    Psi,
    /// Kilopascal
    Kpa,
    /// Kilometres per hour
    Kph,
    /// Miles per hour
    Mph,
    /// Degrees Celsius
    Celsius,
    /// Degrees Fahrenheit
    Fahrenheit,
    /// Kilometres
    Km,
    /// Miles
    Miles,
    /// Angle in degrees
    Degrees,
    /// Angular rate
    DegreesPerSecond,
    /// Acceleration in g
    G,
    /// Revolutions per minute
    Rpm,
    /// Volts
    Volts,
    /// Percent
    Percent,
    /// US gallons
    Gallons,
    /// Dimensionless (gear index, flags, raw counts)
    None,
}

impl Unit {
    /// Short label for display
    pub fn label(&self) -> &'static str {
        match self {
            Unit::Psi => "psi",
            Unit::Kpa => "kPa",
            Unit::Kph => "km/h",
            Unit::Mph => "mph",
            Unit::Celsius => "°C",
            Unit::Fahrenheit => "°F",
            Unit::Km => "km",
            Unit::Miles => "mi",
            Unit::Degrees => "deg",
            Unit::DegreesPerSecond => "deg/s",
            Unit::G => "g",
            Unit::Rpm => "rpm",
            Unit::Volts => "V",
            Unit::Percent => "%",
            Unit::Gallons => "gal",
            Unit::None => "",
        }
    }

    /// Convert a value in this unit to its imperial counterpart.
    ///
    /// Units without an imperial form are returned unchanged.
    pub fn to_imperial(&self, value: f64) -> (f64, Unit) {
        match self {
            Unit::Kpa => (kpa_to_psi(value), Unit::Psi),
            Unit::Kph => (kmh_to_mph(value), Unit::Mph),
            Unit::Celsius => (celsius_to_fahrenheit(value), Unit::Fahrenheit),
            Unit::Km => (km_to_miles(value), Unit::Miles),
            other => (value, *other),
        }
    }
}
