//! Demo Mode - Simulated CAN bus traffic
//!
//! Generates plausible frames for the built-in catalog without a vehicle:
//! an engine idling at ~850 RPM with random throttle blips, a truck rolling
//! along a gentle speed profile, and periodic OBD-II responses.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::frame::CanFrame;
use crate::signal::PAYLOAD_LEN;

const IDLE_RPM: f64 = 850.0;
const RAMP_UP_MS: u64 = 300;
const HOLD_MS: u64 = 200;
const RAMP_DOWN_MS: u64 = 800;

/// Broadcast period of the chassis frames
const CHASSIS_PERIOD_MS: u64 = 20;
/// Period of the slower body frames and the OBD poll cycle
const BODY_PERIOD_MS: u64 = 500;

/// Simulated vehicle emitting CAN frames
pub struct DemoBus {
    start_time_ms: Option<u64>,
    last_update_ms: u64,
    last_chassis_ms: Option<u64>,
    last_body_ms: Option<u64>,
    next_blip_at_ms: u64,
    blip_state: BlipState,
    current_rpm: f64,
    blip_target_rpm: f64,
    /// Round-robin index into the OBD responses
    obd_cursor: usize,
    rng: StdRng,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BlipState {
    Idle,
    RampUp { start_ms: u64 },
    Hold { start_ms: u64 },
    RampDown { start_ms: u64 },
}

/// Vehicle state at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemoState {
    /// Engine speed
    pub rpm: f64,
    /// Vehicle speed
    pub speed_kph: f64,
    /// Accelerator position
    pub throttle_pct: f64,
    /// Coolant temperature
    pub coolant_c: f64,
    /// Steering wheel angle, positive to the left
    pub steering_deg: f64,
    /// Yaw rate from the bicycle model
    pub yaw_rate_deg_s: f64,
    /// Lateral acceleration
    pub lateral_g: f64,
    /// Tire pressures FL, FR, RL, RR
    pub tire_psi: [f64; 4],
    /// Battery voltage
    pub battery_v: f64,
}

impl Default for DemoBus {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoBus {
    /// Create a simulator seeded from the OS
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Create a reproducible simulator
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(mut rng: StdRng) -> Self {
        let first_blip = rng.gen_range(8000..15000);
        Self {
            start_time_ms: None,
            last_update_ms: 0,
            last_chassis_ms: None,
            last_body_ms: None,
            next_blip_at_ms: first_blip,
            blip_state: BlipState::Idle,
            current_rpm: IDLE_RPM,
            blip_target_rpm: 0.0,
            obd_cursor: 0,
            rng,
        }
    }

    /// Advance to `elapsed_ms` and return the frames due since the last call
    pub fn update(&mut self, elapsed_ms: u64) -> Vec<CanFrame> {
        let start = *self.start_time_ms.get_or_insert(elapsed_ms);
        let sim_time = elapsed_ms.saturating_sub(start);
        let delta_ms = elapsed_ms.saturating_sub(self.last_update_ms.max(start));
        self.last_update_ms = elapsed_ms;

        self.update_blip_state(sim_time);
        let target_rpm = self.calculate_target_rpm(sim_time);
        // RPM/sec
        let rpm_rate = if target_rpm > self.current_rpm { 8000.0 } else { 3000.0 };
        let max_change = rpm_rate * (delta_ms as f64 / 1000.0);
        self.current_rpm += (target_rpm - self.current_rpm).clamp(-max_change, max_change);

        let state = self.state_at(sim_time);
        let mut frames = Vec::new();

        if due(&mut self.last_chassis_ms, sim_time, CHASSIS_PERIOD_MS) {
            frames.push(kinematics_frame(&state));
            frames.push(steering_frame(&state));
            frames.push(speed_frame(&state));
            frames.push(throttle_frame(&state));
        }
        if due(&mut self.last_body_ms, sim_time, BODY_PERIOD_MS) {
            frames.push(tire_pressure_frame(&state));
            frames.push(tire_temp_frame(sim_time));
            frames.push(coolant_frame(&state));
            frames.push(self.next_obd_response(&state));
        }
        frames
    }

    /// Current vehicle state, for comparing against decoded values
    pub fn state_at(&self, sim_time: u64) -> DemoState {
        let t = sim_time as f64 / 1000.0;
        let idle_wobble = if matches!(self.blip_state, BlipState::Idle) {
            20.0 * (t * 2.5).sin() + 10.0 * (t * 7.3).sin()
        } else {
            0.0
        };
        let rpm = (self.current_rpm + idle_wobble).max(0.0);

        let throttle_pct = match self.blip_state {
            BlipState::Idle => 1.5 + (t * 0.3).sin().abs(),
            BlipState::Hold { .. } => 45.0 + 5.0 * (t * 3.0).sin(),
            BlipState::RampUp { .. } | BlipState::RampDown { .. } => {
                let progress = (self.current_rpm - IDLE_RPM) / (self.blip_target_rpm - IDLE_RPM);
                2.0 + progress.clamp(0.0, 1.0) * 45.0
            }
        };

        let speed_kph = 40.0 + 20.0 * (t / 30.0).sin();
        let steering_deg = 90.0 * (t / 8.0).sin();
        // Bicycle model, 2.8 m wheelbase and 16:1 steering ratio
        let road_angle = (steering_deg / 16.0).to_radians();
        let speed_ms = speed_kph / 3.6;
        let yaw_rate_deg_s = (speed_ms * road_angle.tan() / 2.8).to_degrees();
        let lateral_g = speed_ms * yaw_rate_deg_s.to_radians() / 9.81;

        DemoState {
            rpm,
            speed_kph,
            throttle_pct: throttle_pct.clamp(0.0, 100.0),
            coolant_c: 20.0 + 70.0 * (1.0 - (-t / 120.0).exp()),
            steering_deg,
            yaw_rate_deg_s,
            lateral_g,
            tire_psi: [32.5, 32.7, 33.0, 32.8].map(|p| p + 0.2 * (t / 60.0).sin()),
            battery_v: 13.8 + 0.2 * (t * 0.5).sin(),
        }
    }

    fn next_obd_response(&mut self, state: &DemoState) -> CanFrame {
        let index = self.obd_cursor;
        self.obd_cursor = (self.obd_cursor + 1) % 6;
        let iat: f64 = 25.0 + 5.0 * self.rng.gen_range(-1.0..1.0);
        match index {
            0 => {
                let raw = (state.rpm * 4.0).round() as u16;
                obd_frame(0x7E8, 0x41, 0x0C, &raw.to_be_bytes())
            }
            1 => obd_frame(0x7E8, 0x41, 0x0D, &[state.speed_kph.round() as u8]),
            2 => obd_frame(0x7E8, 0x41, 0x0F, &[(iat + 40.0).round() as u8]),
            3 => {
                let raw = (state.battery_v * 1000.0).round() as u16;
                obd_frame(0x7E8, 0x41, 0x42, &raw.to_be_bytes())
            }
            4 => {
                let wheel = (state.speed_kph * 200.0 / 256.0).round() as u8;
                obd_frame(0x7B8, 0x61, 0x03, &[wheel; 4])
            }
            _ => obd_frame(0x7C8, 0x61, 0x29, &[(12.0_f64 * 3785.0 / 500.0).round() as u8]),
        }
    }

    fn update_blip_state(&mut self, sim_time: u64) {
        match self.blip_state {
            BlipState::Idle => {
                if sim_time >= self.next_blip_at_ms {
                    self.blip_target_rpm = self.rng.gen_range(2000.0..4000.0);
                    self.blip_state = BlipState::RampUp { start_ms: sim_time };
                }
            }
            BlipState::RampUp { start_ms } => {
                if sim_time >= start_ms + RAMP_UP_MS {
                    self.blip_state = BlipState::Hold { start_ms: sim_time };
                }
            }
            BlipState::Hold { start_ms } => {
                if sim_time >= start_ms + HOLD_MS {
                    self.blip_state = BlipState::RampDown { start_ms: sim_time };
                }
            }
            BlipState::RampDown { start_ms } => {
                if sim_time >= start_ms + RAMP_DOWN_MS {
                    self.blip_state = BlipState::Idle;
                    self.next_blip_at_ms = sim_time + self.rng.gen_range(8000..15000);
                }
            }
        }
    }

    fn calculate_target_rpm(&self, sim_time: u64) -> f64 {
        match self.blip_state {
            BlipState::Idle => IDLE_RPM,
            BlipState::RampUp { start_ms } => {
                let progress = ((sim_time - start_ms) as f64 / RAMP_UP_MS as f64).min(1.0);
                IDLE_RPM + (self.blip_target_rpm - IDLE_RPM) * progress
            }
            BlipState::Hold { .. } => self.blip_target_rpm,
            BlipState::RampDown { start_ms } => {
                let progress = ((sim_time - start_ms) as f64 / RAMP_DOWN_MS as f64).min(1.0);
                self.blip_target_rpm + (IDLE_RPM - self.blip_target_rpm) * progress
            }
        }
    }
}

fn due(last: &mut Option<u64>, now: u64, period: u64) -> bool {
    match *last {
        Some(prev) if now < prev + period => false,
        _ => {
            *last = Some(now);
            true
        }
    }
}

/// Store `value` as a Motorola LSB-start field, the inverse of extraction
fn insert_be_lsb(data: &mut [u8; PAYLOAD_LEN], start_bit: u8, length: u8, value: u32) {
    let mut byte_index = (start_bit / 8) as usize;
    let mut bit_index = start_bit % 8;
    for i in 0..length {
        if byte_index >= PAYLOAD_LEN {
            break;
        }
        if (value >> i) & 1 != 0 {
            data[byte_index] |= 1 << bit_index;
        } else {
            data[byte_index] &= !(1 << bit_index);
        }
        if bit_index == 0 {
            byte_index += 1;
            bit_index = 7;
        } else {
            bit_index -= 1;
        }
    }
}

fn half_range(value: f64, width: u8) -> u32 {
    let bias = (1i64 << (width - 1)) as f64;
    let max = ((1i64 << width) - 1) as f64;
    (value.round() + bias).clamp(0.0, max) as u32
}

fn frame8(id: u32, data: [u8; PAYLOAD_LEN]) -> CanFrame {
    CanFrame::from_parts(id, PAYLOAD_LEN as u8, data)
}

fn obd_frame(id: u32, service: u8, pid: u8, payload: &[u8]) -> CanFrame {
    let mut data = [0u8; PAYLOAD_LEN];
    let len = payload.len().min(PAYLOAD_LEN - 3);
    data[0] = (len + 2) as u8;
    data[1] = service;
    data[2] = pid;
    data[3..3 + len].copy_from_slice(&payload[..len]);
    frame8(id, data)
}

fn kinematics_frame(state: &DemoState) -> CanFrame {
    let mut data = [0u8; PAYLOAD_LEN];
    insert_be_lsb(&mut data, 1, 10, half_range(state.yaw_rate_deg_s, 10));
    insert_be_lsb(&mut data, 17, 10, half_range(0.0, 10));
    let lateral_raw = (state.lateral_g + 0.0126) / -0.002121;
    insert_be_lsb(&mut data, 33, 10, half_range(lateral_raw, 10));
    frame8(0x024, data)
}

fn steering_frame(state: &DemoState) -> CanFrame {
    let mut data = [0u8; PAYLOAD_LEN];
    let raw = ((state.steering_deg / 1.5).round() as i32 as u32) & 0xFFF;
    insert_be_lsb(&mut data, 3, 12, raw);
    frame8(0x025, data)
}

fn speed_frame(state: &DemoState) -> CanFrame {
    let mut data = [0u8; PAYLOAD_LEN];
    let raw = (state.speed_kph * 100.0).round() as u16;
    data[5..7].copy_from_slice(&raw.to_be_bytes());
    frame8(0x0B4, data)
}

fn throttle_frame(state: &DemoState) -> CanFrame {
    let mut data = [0u8; PAYLOAD_LEN];
    data[1] = (state.throttle_pct * 2.55).round() as u8;
    frame8(0x1C4, data)
}

fn tire_pressure_frame(state: &DemoState) -> CanFrame {
    let mut data = [0u8; PAYLOAD_LEN];
    for (i, psi) in state.tire_psi.iter().enumerate() {
        let raw = (psi / 0.145038 * 30.0).round() as u16;
        data[i * 2..i * 2 + 2].copy_from_slice(&raw.to_be_bytes());
    }
    frame8(0x0AA, data)
}

fn tire_temp_frame(sim_time: u64) -> CanFrame {
    let warm = 20.0 + 15.0 * (1.0 - (-(sim_time as f64) / 600_000.0).exp());
    let mut data = [0u8; PAYLOAD_LEN];
    for byte in data.iter_mut().take(4) {
        *byte = (warm + 40.0).round() as u8;
    }
    frame8(0x4A7, data)
}

fn coolant_frame(state: &DemoState) -> CanFrame {
    let mut data = [0u8; PAYLOAD_LEN];
    data[0] = (state.coolant_c + 40.0).round() as u8;
    frame8(0x2C1, data)
}
