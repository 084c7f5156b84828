//! Latest decoded value of every catalog signal

use std::collections::HashMap;

use serde::Serialize;

use super::{Catalog, Provenance};
use crate::frame::TimestampedFrame;
use crate::unit_conversion::Unit;

/// Most recent value of one signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DecodedValue {
    /// Physical value
    pub value: f64,
    /// False until the first frame carrying this signal was decoded
    pub valid: bool,
    /// Unit of `value`
    pub unit: Unit,
    /// Copied from the signal definition
    pub provenance: Provenance,
    /// Timestamp of the frame that produced `value`
    pub updated_us: i64,
}

impl DecodedValue {
    /// The same reading expressed in imperial units where one applies
    pub fn to_imperial(&self) -> Self {
        let (value, unit) = self.unit.to_imperial(self.value);
        Self { value, unit, ..*self }
    }
}

/// Holds the last-known value of each signal.
///
/// Every signal starts out invalid; decoding a frame only touches the
/// signals that frame carries.
#[derive(Debug, Clone, Default)]
pub struct SignalStore {
    values: HashMap<String, DecodedValue>,
}

impl SignalStore {
    /// Create a store seeded with an invalid entry per catalog signal
    pub fn new(catalog: &Catalog) -> Self {
        let values = catalog
            .signals()
            .map(|def| {
                (
                    def.name.clone(),
                    DecodedValue {
                        value: 0.0,
                        valid: false,
                        unit: def.unit,
                        provenance: def.provenance,
                        updated_us: 0,
                    },
                )
            })
            .collect();
        Self { values }
    }

    /// Decode a frame into the store, returning how many signals changed
    pub fn apply(&mut self, catalog: &Catalog, frame: &TimestampedFrame) -> usize {
        let mut updated = 0;
        for decoded in catalog.decode(&frame.frame) {
            let entry = self
                .values
                .entry(decoded.def.name.clone())
                .or_insert(DecodedValue {
                    value: 0.0,
                    valid: false,
                    unit: decoded.def.unit,
                    provenance: decoded.def.provenance,
                    updated_us: 0,
                });
            entry.value = decoded.value;
            entry.valid = true;
            entry.updated_us = frame.timestamp_us;
            updated += 1;
        }
        updated
    }

    /// Value of a signal, only if it has been decoded at least once
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values
            .get(name)
            .filter(|v| v.valid)
            .map(|v| v.value)
    }

    /// Entry for a signal, valid or not
    pub fn get(&self, name: &str) -> Option<&DecodedValue> {
        self.values.get(name)
    }

    /// Signals decoded so far, sorted by name
    pub fn valid_values(&self) -> Vec<(&str, &DecodedValue)> {
        let mut out: Vec<_> = self
            .values
            .iter()
            .filter(|(_, v)| v.valid)
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }

    /// Mark every signal invalid again
    pub fn invalidate(&mut self) {
        for value in self.values.values_mut() {
            value.valid = false;
        }
    }
}
