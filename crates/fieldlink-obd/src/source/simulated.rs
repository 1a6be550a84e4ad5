//! Simulated vehicle used when no adapter is found

use async_trait::async_trait;
use fieldlink_core::{LinkMode, VehicleIdentity, Vin};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::VehicleDataSource;
use crate::config::SimulationConfig;

/// Identities a simulated vehicle may report
pub const SIMULATED_IDENTITIES: &[&str] = &[
    "1HGCM82633A004352",
    "WVWZZZ1KZ6W612345",
    "JH4KA7561PC008269",
    "5YJ3E1EA7KF317000",
];

/// Voltage bounds in decivolts (11.5 V - 14.5 V)
const MIN_DECIVOLTS: i32 = 115;
const MAX_DECIVOLTS: i32 = 145;
const START_DECIVOLTS: i32 = 126;

const IDLE_RPM: u32 = 700;
const MAX_RPM: u32 = 3000;

const PROTOCOL_NAME: &str = "Simulated";

/// Synthetic readings: a bounded random walk for voltage, a biased coin
/// for ignition and a plausible engine speed while the ignition is on.
///
/// Voltage is tracked in whole decivolts so every reading has exactly one
/// decimal place.
pub struct SimulatedSource {
    rng: StdRng,
    identity: VehicleIdentity,
    decivolts: i32,
    step_decivolts: i32,
    ignition_on_probability: f64,
}

impl SimulatedSource {
    pub fn new(config: &SimulationConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let identity = SIMULATED_IDENTITIES
            .choose(&mut rng)
            .and_then(|vin| Vin::parse(vin).ok())
            .map_or(VehicleIdentity::ReadFailed, VehicleIdentity::Known);
        debug!(%identity, "Simulated vehicle created");

        Self {
            rng,
            identity,
            decivolts: START_DECIVOLTS,
            step_decivolts: (config.voltage_step * 10.0).round().max(0.0) as i32,
            ignition_on_probability: config.ignition_on_probability.clamp(0.0, 1.0),
        }
    }

    fn step_voltage(&mut self) -> f64 {
        let delta = self
            .rng
            .gen_range(-self.step_decivolts..=self.step_decivolts);
        self.decivolts = (self.decivolts + delta).clamp(MIN_DECIVOLTS, MAX_DECIVOLTS);
        f64::from(self.decivolts) / 10.0
    }

    fn draw_ignition(&mut self) -> bool {
        self.rng.gen_bool(self.ignition_on_probability)
    }

    fn draw_speed(&mut self, ignition_on: bool) -> u32 {
        if ignition_on {
            self.rng.gen_range(IDLE_RPM..=MAX_RPM)
        } else {
            0
        }
    }
}

#[async_trait]
impl VehicleDataSource for SimulatedSource {
    fn mode(&self) -> LinkMode {
        LinkMode::Simulated
    }

    fn protocol_name(&self) -> &str {
        PROTOCOL_NAME
    }

    async fn read_identity(&mut self) -> VehicleIdentity {
        self.identity.clone()
    }

    async fn read_voltage(&mut self) -> Option<f64> {
        Some(self.step_voltage())
    }

    async fn read_engine_speed(&mut self) -> Option<u32> {
        let ignition_on = self.draw_ignition();
        Some(self.draw_speed(ignition_on))
    }

    async fn is_ignition_on(&mut self) -> Option<bool> {
        Some(self.draw_ignition())
    }

    async fn read_ignition_and_speed(&mut self) -> (Option<bool>, Option<u32>) {
        let ignition_on = self.draw_ignition();
        (Some(ignition_on), Some(self.draw_speed(ignition_on)))
    }

    async fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(seed: u64) -> SimulatedSource {
        SimulatedSource::new(&SimulationConfig {
            seed: Some(seed),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_voltage_walk_stays_bounded() {
        let mut source = seeded(7);
        let mut previous = f64::from(START_DECIVOLTS) / 10.0;

        for _ in 0..2000 {
            let volts = source.read_voltage().await.unwrap();
            assert!((11.5..=14.5).contains(&volts), "{} out of range", volts);
            assert!((volts - previous).abs() <= 0.3 + 1e-9);
            // Exactly one decimal place
            assert!(((volts * 10.0) - (volts * 10.0).round()).abs() < 1e-9);
            previous = volts;
        }
    }

    #[tokio::test]
    async fn test_identity_from_pool_and_stable() {
        let mut source = seeded(3);
        let first = source.read_identity().await;
        let vin = first.vin().unwrap().as_str().to_string();
        assert!(SIMULATED_IDENTITIES.contains(&vin.as_str()));
        assert_eq!(source.read_identity().await, first);
    }

    #[tokio::test]
    async fn test_speed_follows_ignition() {
        let mut source = seeded(11);
        let mut saw_on = false;
        for _ in 0..200 {
            let (ignition, rpm) = source.read_ignition_and_speed().await;
            let rpm = rpm.unwrap();
            if ignition.unwrap() {
                saw_on = true;
                assert!((IDLE_RPM..=MAX_RPM).contains(&rpm));
            } else {
                assert_eq!(rpm, 0);
            }
        }
        assert!(saw_on);
    }

    #[tokio::test]
    async fn test_ignition_probability_extremes() {
        let mut always = SimulatedSource::new(&SimulationConfig {
            ignition_on_probability: 1.0,
            seed: Some(1),
            ..Default::default()
        });
        let mut never = SimulatedSource::new(&SimulationConfig {
            ignition_on_probability: 0.0,
            seed: Some(1),
            ..Default::default()
        });
        for _ in 0..50 {
            assert_eq!(always.is_ignition_on().await, Some(true));
            assert_eq!(never.is_ignition_on().await, Some(false));
        }
    }

    #[tokio::test]
    async fn test_same_seed_same_sequence() {
        let mut a = seeded(42);
        let mut b = seeded(42);
        for _ in 0..20 {
            assert_eq!(a.read_voltage().await, b.read_voltage().await);
        }
    }
}
