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

use crate::domain::{
    Era, ValidatorId,
    aggregator::Aggregator,
    chain::{Chain, NominatorStake},
    era_resolver::{self, EraResolver, EraResolverError},
    nomination::Exposure,
    snapshot::{ValidatorChainData, ValidatorSnapshot},
};
use fastrace::trace;
use log::{debug, warn};
use staking_common::error::StdErrorExt;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Collects validator snapshots from the chain, named via the aggregator.
#[derive(Debug, Clone)]
pub struct SnapshotCollector<C, A> {
    chain: C,
    aggregator: A,
    resolver: EraResolver<C>,
}

impl<C, A> SnapshotCollector<C, A>
where
    C: Chain,
    A: Aggregator,
{
    pub fn new(chain: C, aggregator: A, config: era_resolver::Config) -> Self {
        let resolver = EraResolver::new(chain.clone(), config);

        Self {
            chain,
            aggregator,
            resolver,
        }
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn aggregator(&self) -> &A {
        &self.aggregator
    }

    pub async fn active_era(&self) -> Result<Era, CollectError<C::Error>> {
        self.chain
            .active_era()
            .await
            .map_err(CollectError::Chain)?
            .ok_or(CollectError::Resolve(EraResolverError::NoActiveEra))
    }

    /// The active validator set at the given era.
    pub async fn validators(&self, era: Era) -> Result<Vec<ValidatorId>, CollectError<C::Error>> {
        let block = self.resolver.resolve_block_for_era(era).await?;
        let validators = self
            .chain
            .validators_at(&block)
            .await
            .map_err(CollectError::Chain)?;
        debug!(era, block:% = block.hash, len = validators.len(); "validators read");

        Ok(validators)
    }

    /// Read the active validators at the given era together with their exposure, commission and
    /// nominators. For the active era the waiting validators are added with their current
    /// commission. Also returns all nominators, which are read anyway.
    #[trace]
    pub async fn collect_validators(
        &self,
        era: Era,
    ) -> Result<(ValidatorSnapshot, Vec<NominatorStake>), CollectError<C::Error>> {
        let stash_ids = self.validators(era).await?;

        let mut validators = Vec::with_capacity(stash_ids.len());
        for stash_id in stash_ids {
            let exposure = self
                .chain
                .exposure(era, &stash_id)
                .await
                .map_err(CollectError::Chain)?;
            let commission = self
                .chain
                .commission(era, &stash_id)
                .await
                .map_err(CollectError::Chain)?;

            validators.push(ValidatorChainData {
                stash_id,
                exposure,
                commission,
                active: true,
            });
        }

        if era == self.active_era().await? {
            let elected = validators
                .iter()
                .map(|v| v.stash_id.clone())
                .collect::<HashSet<_>>();
            let waiting = self
                .chain
                .intentions()
                .await
                .map_err(CollectError::Chain)?
                .into_iter()
                .filter(|intention| !elected.contains(&intention.stash_id))
                .map(|intention| ValidatorChainData {
                    stash_id: intention.stash_id,
                    exposure: Exposure::default(),
                    commission: intention.commission,
                    active: false,
                })
                .collect::<Vec<_>>();
            debug!(era, len = waiting.len(); "waiting validators read");

            validators.extend(waiting);
        }

        let nominators = self.chain.nominators().await.map_err(CollectError::Chain)?;
        let validator_count = self
            .chain
            .validator_count()
            .await
            .map_err(CollectError::Chain)?;

        let names = match self.aggregator.valid_candidates().await {
            Ok(candidates) => candidates
                .into_iter()
                .map(|candidate| (candidate.stash, candidate.name))
                .collect(),

            Err(error) => {
                warn!(error = error.as_chain(); "cannot get candidate names, using stash ids");
                HashMap::new()
            }
        };

        let snapshot =
            ValidatorSnapshot::build(era, validator_count, validators, &nominators, &names);
        Ok((snapshot, nominators))
    }
}

#[derive(Debug, Error)]
pub enum CollectError<E> {
    #[error("cannot resolve block")]
    Resolve(#[from] EraResolverError<E>),

    #[error("cannot query chain")]
    Chain(#[source] E),
}
