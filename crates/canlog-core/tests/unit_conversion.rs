use canlog_core::decode::{builtin_catalog, SignalStore};
use canlog_core::frame::{CanFrame, TimestampedFrame};
use canlog_core::unit_conversion::{celsius_to_fahrenheit, km_to_miles, kmh_to_mph, kpa_to_psi, Unit};

fn store_with(frames: &[(u32, [u8; 8])]) -> SignalStore {
    let catalog = builtin_catalog();
    let mut store = SignalStore::new(&catalog);
    for (i, (id, payload)) in frames.iter().enumerate() {
        let frame = CanFrame::new(*id, payload).unwrap();
        store.apply(&catalog, &TimestampedFrame::new(i as i64, frame));
    }
    store
}

#[test]
fn test_negative_temperature() {
    assert_eq!(celsius_to_fahrenheit(-40.0), -40.0); // -40C = -40F
}

#[test]
fn test_atf_temperature() {
    // typical transmission fluid temperature when warm
    assert!((celsius_to_fahrenheit(80.0) - 176.0).abs() < 1e-9);
}

#[test]
fn test_tire_pressure_kpa_to_psi() {
    assert!((kpa_to_psi(225.6) - 32.72).abs() < 0.01);
}

#[test]
fn test_speed_and_distance() {
    assert!((kmh_to_mph(100.0) - 62.137).abs() < 0.001);
    assert!((km_to_miles(100_000.0) - 62_137.119).abs() < 0.001);
}

#[test]
fn test_unit_labels() {
    assert_eq!(Unit::Psi.label(), "psi");
    assert_eq!(Unit::Kph.label(), "km/h");
    assert_eq!(Unit::DegreesPerSecond.label(), "deg/s");
    assert_eq!(Unit::None.label(), "");
}

#[test]
fn test_decoded_values_in_imperial() {
    let store = store_with(&[
        (0x7E8, [0x03, 0x41, 0x0D, 0x3C, 0, 0, 0, 0]),
        (0x7E8, [0x03, 0x41, 0x33, 0x65, 0, 0, 0, 0]),
        (0x7E8, [0x05, 0x61, 0x28, 0x01, 0x86, 0xA0, 0, 0]),
        (0x7E8, [0x04, 0x41, 0x0C, 0x0D, 0x48, 0, 0, 0]),
    ]);

    let speed = store.get("vehicle_speed_kph").unwrap().to_imperial();
    assert_eq!(speed.unit, Unit::Mph);
    assert!((speed.value - 37.282).abs() < 0.001);

    let baro = store.get("baro_kpa").unwrap().to_imperial();
    assert_eq!(baro.unit, Unit::Psi);
    assert!((baro.value - 14.649).abs() < 0.001);

    let odo = store.get("odo_km").unwrap().to_imperial();
    assert_eq!(odo.unit, Unit::Miles);
    assert!((odo.value - 62_137.119).abs() < 0.001);

    // rpm has no imperial form
    let rpm = store.get("rpm").unwrap().to_imperial();
    assert_eq!((rpm.value, rpm.unit), (850.0, Unit::Rpm));
}
