// This file is part of staking-indexer.
// Copyright (C) 2025 Staking Indexer Contributors
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::Amount;

/// Annualized yield of nominating a validator.
#[derive(Debug, Clone, Copy)]
pub struct ApyCalculator {
    eras_per_year: f64,
}

impl ApyCalculator {
    pub fn new(eras_per_year: u32) -> Self {
        Self {
            eras_per_year: eras_per_year as f64,
        }
    }

    /// The era reward is split evenly across the validator set; the validator keeps its
    /// commission and the rest is paid out relative to the active stake. Returns 0 for zero stake
    /// and for any non-finite result.
    pub fn compute(
        &self,
        era_total_reward: Amount,
        validator_count: u32,
        commission_pct: f64,
        active_stake: Amount,
    ) -> f64 {
        if active_stake == 0 {
            return 0.0;
        }

        let reward_per_validator = era_total_reward as f64 / validator_count as f64;
        let apy = reward_per_validator * (1.0 - commission_pct / 100.0) * self.eras_per_year
            / active_stake as f64;

        if apy.is_finite() { apy } else { 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::apy::ApyCalculator;

    const ERAS_PER_YEAR: u32 = 1_460;

    #[test]
    fn test_compute() {
        let calculator = ApyCalculator::new(ERAS_PER_YEAR);

        // 1_000 reward across 10 validators, 10% commission: 90 per era to 1_000_000 stake.
        let apy = calculator.compute(1_000, 10, 10.0, 1_000_000);
        let expected = 90.0 * ERAS_PER_YEAR as f64 / 1_000_000.0;
        assert!((apy - expected).abs() < 1e-12);

        let full_commission = calculator.compute(1_000, 10, 100.0, 1_000_000);
        assert_eq!(full_commission, 0.0);
    }

    #[test]
    fn test_compute_zero_reward() {
        let apy = ApyCalculator::new(ERAS_PER_YEAR).compute(0, 100, 5.0, 1_000);
        assert_eq!(apy, 0.0);
        assert!(!apy.is_nan());
    }

    #[test]
    fn test_compute_zero_stake() {
        let apy = ApyCalculator::new(ERAS_PER_YEAR).compute(1_000, 100, 5.0, 0);
        assert_eq!(apy, 0.0);
    }

    #[test]
    fn test_compute_non_finite() {
        let calculator = ApyCalculator::new(ERAS_PER_YEAR);
        assert_eq!(calculator.compute(1_000, 0, 5.0, 1_000), 0.0);
        assert_eq!(calculator.compute(0, 0, 5.0, 1_000), 0.0);
        assert_eq!(calculator.compute(1_000, 10, f64::NAN, 1_000), 0.0);
    }
}
