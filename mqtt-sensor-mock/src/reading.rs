// Copyright 2025 The Drasi Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Synthetic sensor readings.

use std::ops::RangeInclusive;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

pub const PH_RANGE: RangeInclusive<f64> = 6.0..=8.0;
pub const TEMPERATURE_RANGE: RangeInclusive<f64> = 20.0..=30.0;

/// One reading for one piece of equipment. Field names are the wire names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub equipamento: String,
    pub timestamp: String,
    pub ph: f64,
    pub temperatura: f64,
}

/// Round to two decimal places, half away from zero.
///
/// Ties that are exact in binary (e.g. `0.125`) round up; a round-half-even
/// rule would give `0.12`. Sampled values almost never land on such ties.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Local wall-clock time as ISO-8601 with microseconds and no offset,
/// e.g. `2025-03-14T09:26:53.589793`.
pub fn cycle_timestamp() -> String {
    chrono::Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Produces readings from a uniform distribution over the sensor ranges.
pub struct ReadingGenerator<R = StdRng> {
    rng: R,
}

impl ReadingGenerator<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: Rng> ReadingGenerator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn ph(&mut self) -> f64 {
        sample(&mut self.rng, PH_RANGE)
    }

    pub fn temperature(&mut self) -> f64 {
        sample(&mut self.rng, TEMPERATURE_RANGE)
    }

    pub fn reading(&mut self, equipment: &str, timestamp: &str) -> SensorReading {
        SensorReading {
            equipamento: equipment.to_string(),
            timestamp: timestamp.to_string(),
            ph: self.ph(),
            temperatura: self.temperature(),
        }
    }

    /// One reading per equipment, in order, all sharing `timestamp`.
    pub fn cycle<S: AsRef<str>>(&mut self, equipment: &[S], timestamp: &str) -> Vec<SensorReading> {
        equipment
            .iter()
            .map(|e| self.reading(e.as_ref(), timestamp))
            .collect()
    }
}

// Rounding can't leave the range since both bounds have two decimals.
fn sample<R: Rng>(rng: &mut R, range: RangeInclusive<f64>) -> f64 {
    round2(rng.gen_range(range))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_two_decimals(value: f64) -> bool {
        (round2(value) - value).abs() < f64::EPSILON
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(6.456), 6.46);
        assert_eq!(round2(6.454), 6.45);
        assert_eq!(round2(20.0), 20.0);
        assert_eq!(round2(29.999), 30.0);
    }

    #[test]
    fn test_round2_exact_ties_go_away_from_zero() {
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(6.375), 6.38);
        assert_eq!(round2(-0.125), -0.13);
    }

    #[test]
    fn test_ph_within_range_and_rounded() {
        let mut generator = ReadingGenerator::new(StdRng::seed_from_u64(7));
        for _ in 0..10_000 {
            let ph = generator.ph();
            assert!(PH_RANGE.contains(&ph), "pH {ph} out of range");
            assert!(has_two_decimals(ph), "pH {ph} not rounded");
        }
    }

    #[test]
    fn test_temperature_within_range_and_rounded() {
        let mut generator = ReadingGenerator::new(StdRng::seed_from_u64(11));
        for _ in 0..10_000 {
            let temp = generator.temperature();
            assert!(TEMPERATURE_RANGE.contains(&temp), "temperature {temp} out of range");
            assert!(has_two_decimals(temp), "temperature {temp} not rounded");
        }
    }

    #[test]
    fn test_cycle_shares_timestamp() {
        let mut generator = ReadingGenerator::new(StdRng::seed_from_u64(1));
        let readings = generator.cycle(
            ["equipamento_02", "equipamento_03"].as_slice(),
            "2025-01-01T00:00:00.000000",
        );

        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].equipamento, "equipamento_02");
        assert_eq!(readings[1].equipamento, "equipamento_03");
        assert!(readings.iter().all(|r| r.timestamp == "2025-01-01T00:00:00.000000"));
    }

    #[test]
    fn test_seeded_generators_agree() {
        let mut a = ReadingGenerator::new(StdRng::seed_from_u64(42));
        let mut b = ReadingGenerator::new(StdRng::seed_from_u64(42));
        assert_eq!(a.reading("x", "t"), b.reading("x", "t"));
    }

    #[test]
    fn test_cycle_timestamp_format() {
        let ts = cycle_timestamp();
        assert!(chrono::NaiveDateTime::parse_from_str(&ts, "%Y-%m-%dT%H:%M:%S%.6f").is_ok(), "{ts}");
        assert_eq!(ts.len(), "2025-01-01T00:00:00.000000".len());
    }
}
