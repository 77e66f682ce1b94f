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

use crate::domain::{BlockRef, Era, chain::Chain};
use fastrace::trace;
use log::debug;
use serde::Deserialize;
use std::cmp::Ordering;
use thiserror::Error;

/// Configuration for the [EraResolver].
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Config {
    /// Approximate number of blocks per era, used to estimate the first candidate block.
    pub approx_blocks_per_era: u64,

    /// Number of blocks to move the candidate by after a miss.
    pub correction_stride: u64,

    pub max_resolution_iterations: u32,
}

/// Finds a block whose state reflects a given era.
#[derive(Debug, Clone)]
pub struct EraResolver<C> {
    chain: C,
    config: Config,
}

impl<C> EraResolver<C>
where
    C: Chain,
{
    pub fn new(chain: C, config: Config) -> Self {
        Self { chain, config }
    }

    /// Resolve a block for the given era: starting from an estimate based on the distance to the
    /// active era, the candidate is moved by the correction stride until the era read at the
    /// candidate matches.
    #[trace]
    pub async fn resolve_block_for_era(
        &self,
        target: Era,
    ) -> Result<BlockRef, EraResolverError<C::Error>> {
        let active = self
            .chain
            .active_era()
            .await
            .map_err(EraResolverError::ChainQueryFailed)?
            .ok_or(EraResolverError::NoActiveEra)?;
        if target > active {
            return Err(EraResolverError::EraNotReached { target, active });
        }

        let head = self
            .chain
            .head()
            .await
            .map_err(EraResolverError::ChainQueryFailed)?;
        if target == active {
            return Ok(head);
        }

        let Config {
            approx_blocks_per_era,
            correction_stride,
            max_resolution_iterations,
        } = self.config;

        let distance = (active - target) as u64 * approx_blocks_per_era;
        let mut candidate = head.height.saturating_sub(distance);

        for iteration in 0..max_resolution_iterations {
            let block = self
                .chain
                .block_at_height(candidate)
                .await
                .map_err(EraResolverError::ChainQueryFailed)?;
            let era = self
                .chain
                .era_at(&block)
                .await
                .map_err(EraResolverError::ChainQueryFailed)?;
            debug!(target_era = target, era, height = candidate, iteration; "era candidate");

            candidate = match era.cmp(&target) {
                Ordering::Equal => return Ok(block),
                Ordering::Greater => candidate.saturating_sub(correction_stride),
                Ordering::Less => (candidate + correction_stride).min(head.height),
            };
        }

        Err(EraResolverError::EraResolutionExhausted {
            target,
            iterations: max_resolution_iterations,
        })
    }
}

#[derive(Debug, Error)]
pub enum EraResolverError<E> {
    #[error("chain has no active era")]
    NoActiveEra,

    #[error("era {target} not reached, active era is {active}")]
    EraNotReached { target: Era, active: Era },

    #[error("cannot query chain")]
    ChainQueryFailed(#[source] E),

    #[error("cannot resolve block for era {target} within {iterations} iterations")]
    EraResolutionExhausted { target: Era, iterations: u32 },
}
