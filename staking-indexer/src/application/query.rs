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

use crate::{
    application::collector::{CollectError, SnapshotCollector},
    domain::{
        Era,
        aggregator::{Aggregator, ErrorPayload},
        cache::{CacheBackend, CacheKey, SnapshotCache},
        chain::Chain,
        nomination::NominationInput,
        repository::{NominationRepository, ValidatorStatus, ValidatorTrend},
        snapshot::{
            CandidateList, ChainNominatorSnapshot, FalseNomination, NominatorList,
            RewardStatistic,
        },
        storage::Storage,
    },
};
use fastrace::trace;
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;
use staking_common::error::StdErrorExt;
use std::collections::HashSet;
use thiserror::Error;

/// Read side of the pipeline, used by the serving layer.
#[derive(Debug, Clone)]
pub struct QueryService<C, A, S, B> {
    collector: SnapshotCollector<C, A>,
    repository: NominationRepository<S>,
    cache: SnapshotCache<B>,
    page_size_limit: u32,
}

impl<C, A, S, B> QueryService<C, A, S, B>
where
    C: Chain,
    A: Aggregator,
    S: Storage,
    B: CacheBackend,
{
    pub fn new(
        collector: SnapshotCollector<C, A>,
        repository: NominationRepository<S>,
        cache: SnapshotCache<B>,
        page_size_limit: u32,
    ) -> Self {
        Self {
            collector,
            repository,
            cache,
            page_size_limit,
        }
    }

    /// Return the cached value for the given key if it was computed for the given era, otherwise
    /// compute it. Only the validator snapshot can be computed for past eras; the other data sets
    /// exist for the active era only and are absent for any other era. Values computed for the
    /// active era are cached.
    #[trace]
    pub async fn fetch_cached_or_compute(
        &self,
        era: Era,
        key: CacheKey,
    ) -> Result<Option<Value>, QueryError<C::Error>> {
        if let Some(value) = self.cache.fetch::<Value>(era, key).await {
            debug!(era, key:%; "cache hit");
            return Ok(Some(value));
        }

        let active_era = self.collector.active_era().await?;

        let value = match key {
            CacheKey::ValidatorDetail => {
                let (snapshot, _) = self.collector.collect_validators(era).await?;
                if era == active_era {
                    self.cache_value(key, &snapshot).await;
                }
                serde_json::to_value(&snapshot)?
            }

            _ if era != active_era => {
                debug!(era, active_era, key:%; "data set only exists for the active era");
                return Ok(None);
            }

            CacheKey::Valid => serde_json::to_value(&self.valid_candidates().await?)?,

            CacheKey::Nominators => serde_json::to_value(&self.nominators().await?)?,

            CacheKey::ChainNominators => {
                let nominators = self
                    .collector
                    .chain()
                    .nominators()
                    .await
                    .map_err(|error| QueryError::Collect(CollectError::Chain(error)))?;
                let snapshot = ChainNominatorSnapshot {
                    active_era,
                    nominators,
                };
                self.cache_value(key, &snapshot).await;
                serde_json::to_value(&snapshot)?
            }
        };

        Ok(Some(value))
    }

    /// Decode the given loosely structured record and save it as the nomination of the given
    /// validator. Undecodable records are logged and reported as `false`.
    pub async fn persist_nomination(&self, validator_id: &str, record: &Value) -> bool {
        match NominationInput::try_from(record) {
            Ok(input) => self.repository.save_nomination(validator_id, input).await,

            Err(error) => {
                warn!(validator_id, error:%; "invalid nomination record rejected");
                false
            }
        }
    }

    pub async fn get_status_for_era(
        &self,
        validator_id: &str,
        era: Era,
    ) -> Result<Option<ValidatorStatus>, QueryError<C::Error>> {
        let status = self.repository.get_status_for_era(validator_id, era).await?;
        Ok(status)
    }

    pub async fn validator_trend(
        &self,
        validator_id: &str,
    ) -> Result<Option<ValidatorTrend>, QueryError<C::Error>> {
        let trend = self.repository.validator_trend(validator_id).await?;
        Ok(trend)
    }

    /// The validators nominated in the given era, paged in insertion order.
    pub async fn list_validators(
        &self,
        era: Era,
        page_size: u32,
        page_index: u32,
    ) -> Result<Vec<ValidatorStatus>, QueryError<C::Error>> {
        if page_size == 0 || page_size > self.page_size_limit {
            return Err(QueryError::InvalidPaging {
                page_size,
                limit: self.page_size_limit,
            });
        }

        let statuses = self
            .repository
            .list_validators(era, page_size, page_index)
            .await?;
        Ok(statuses)
    }

    /// The last active era recorded by a collection cycle.
    pub async fn active_era(&self) -> Result<Option<Era>, QueryError<C::Error>> {
        let era = self.repository.active_era().await?;
        Ok(era)
    }

    /// Aggregator candidates of the active era, flagged by election.
    #[trace]
    pub async fn valid_candidates(&self) -> Result<CandidateList, QueryError<C::Error>> {
        let era = self.collector.active_era().await?;
        if let Some(candidates) = self.cache.fetch(era, CacheKey::Valid).await {
            return Ok(candidates);
        }

        let candidates = self
            .collector
            .aggregator()
            .valid_candidates()
            .await
            .map_err(|error| {
                warn!(error = error.as_chain(); "cannot get candidates");
                QueryError::<C::Error>::ExternalApiUnavailable(
                    ErrorPayload::candidates_unavailable(),
                )
            })?;

        let active_validators = self
            .collector
            .validators(era)
            .await?
            .into_iter()
            .collect::<HashSet<_>>();

        let candidates = CandidateList::build(era, candidates, &active_validators);
        self.cache_value(CacheKey::Valid, &candidates).await;

        Ok(candidates)
    }

    /// Aggregator nominators of the active era with their targets named and flagged by election.
    #[trace]
    pub async fn nominators(&self) -> Result<NominatorList, QueryError<C::Error>> {
        let era = self.collector.active_era().await?;
        if let Some(nominators) = self.cache.fetch(era, CacheKey::Nominators).await {
            return Ok(nominators);
        }

        let nominators = self
            .collector
            .aggregator()
            .nominators()
            .await
            .map_err(|error| {
                warn!(error = error.as_chain(); "cannot get nominators");
                QueryError::<C::Error>::ExternalApiUnavailable(
                    ErrorPayload::nominators_unavailable(),
                )
            })?;
        let candidates = self.valid_candidates().await?;

        let nominators = NominatorList::build(era, nominators, &candidates);
        self.cache_value(CacheKey::Nominators, &nominators).await;

        Ok(nominators)
    }

    /// Targets of aggregator nominators which are not valid candidates, with the reason of
    /// their invalidity where known.
    #[trace]
    pub async fn false_nominations(&self) -> Result<Vec<FalseNomination>, QueryError<C::Error>> {
        let nominators = self.nominators().await?;
        let aggregator = self.collector.aggregator();

        let candidates = aggregator.candidates().await.map_err(|error| {
            warn!(error = error.as_chain(); "cannot get all candidates");
            QueryError::<C::Error>::ExternalApiUnavailable(
                ErrorPayload::all_candidates_unavailable(),
            )
        })?;
        let reasons = aggregator.invalidity_reasons().await.map_err(|error| {
            warn!(error = error.as_chain(); "cannot get invalidity reasons");
            QueryError::<C::Error>::ExternalApiUnavailable(
                ErrorPayload::invalidity_reasons_unavailable(),
            )
        })?;

        let active_validators = self
            .collector
            .validators(nominators.active_era)
            .await?
            .into_iter()
            .collect::<HashSet<_>>();

        Ok(FalseNomination::collect(
            &nominators,
            &candidates,
            &active_validators,
            &reasons,
        ))
    }

    /// Total, count and time range of the rewards received by the given address; `None` if it
    /// never received any.
    #[trace(properties = { "address": "{address}" })]
    pub async fn reward_statistic(
        &self,
        address: &str,
    ) -> Result<Option<RewardStatistic>, QueryError<C::Error>> {
        let events = self
            .collector
            .aggregator()
            .rewards(address)
            .await
            .map_err(|error| {
                warn!(address, error = error.as_chain(); "cannot get rewards");
                QueryError::<C::Error>::ExternalApiUnavailable(ErrorPayload::rewards_unavailable())
            })?;

        Ok(RewardStatistic::build(address.to_owned(), &events))
    }

    async fn cache_value<T>(&self, key: CacheKey, value: &T)
    where
        T: Serialize,
    {
        if let Err(error) = self.cache.update(key, value).await {
            warn!(key:%, error = error.as_chain(); "cannot update cache");
        }
    }
}

#[derive(Debug, Error)]
pub enum QueryError<E> {
    #[error("page size {page_size} must be between 1 and {limit}")]
    InvalidPaging { page_size: u32, limit: u32 },

    #[error("cannot collect data from chain")]
    Collect(#[from] CollectError<E>),

    #[error("cannot access storage")]
    Storage(#[from] sqlx::Error),

    #[error("cannot encode value")]
    Encode(#[from] serde_json::Error),

    #[error("external API unavailable: {}", .0.error_msg)]
    ExternalApiUnavailable(ErrorPayload),
}

impl<E> QueryError<E> {
    /// The tagged payload to be reported instead of the requested data, if any.
    pub fn payload(&self) -> Option<&ErrorPayload> {
        match self {
            Self::ExternalApiUnavailable(payload) => Some(payload),
            _ => None,
        }
    }
}
