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
    Era,
    nomination::{CommissionChange, NominationInput, NominationRecord, ValidatorRecord},
    storage::Storage,
};
use fastrace::trace;
use log::{debug, error, warn};
use metrics::counter;
use serde::Serialize;

/// A validator with its nomination for one era.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatorStatus {
    pub validator: ValidatorRecord,
    pub nomination: NominationRecord,
}

/// A validator with all of its nominations, ordered by era.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatorTrend {
    pub validator: ValidatorRecord,
    pub nominations: Vec<NominationRecord>,
}

/// Persists validators and their per-era nominations.
#[derive(Debug, Clone)]
pub struct NominationRepository<S> {
    storage: S,
}

impl<S> NominationRepository<S>
where
    S: Storage,
{
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Save the nomination of the given validator for `input.era`, creating the validator on
    /// first observation and tracking its commission change against the previous era. Invalid
    /// input and storage failures are logged and reported as `false`.
    #[trace]
    pub async fn save_nomination(&self, validator_id: &str, input: NominationInput) -> bool {
        if let Err(error) = input.validate() {
            warn!(validator_id, era = input.era, error:%; "invalid nomination rejected");
            counter!("staking_indexer_nominations_rejected").increment(1);
            return false;
        }

        let era = input.era;
        match self.try_save_nomination(validator_id, input).await {
            Ok(commission_change) => {
                debug!(validator_id, era, commission_change:%; "nomination saved");
                counter!("staking_indexer_nominations_saved").increment(1);
                true
            }

            Err(error) => {
                error!(validator_id, era, error:?; "cannot save nomination");
                counter!("staking_indexer_nominations_failed").increment(1);
                false
            }
        }
    }

    async fn try_save_nomination(
        &self,
        validator_id: &str,
        input: NominationInput,
    ) -> Result<CommissionChange, sqlx::Error> {
        let commission_change = match self.storage.get_validator(validator_id).await? {
            None => CommissionChange::None,

            Some(_) => {
                let previous = match input.era.checked_sub(1) {
                    Some(previous_era) => self
                        .storage
                        .get_nomination(validator_id, previous_era)
                        .await?
                        .map(|nomination| nomination.commission),
                    None => None,
                };
                CommissionChange::detect(previous, input.commission)
            }
        };

        let validator = ValidatorRecord {
            id: validator_id.to_owned(),
            display_name: input.display_name.clone(),
            commission_change,
        };

        let nomination = input.into_record(validator_id.to_owned());
        self.storage
            .save_validator_nomination(&validator, &nomination)
            .await?;

        Ok(commission_change)
    }

    pub async fn get_status_for_era(
        &self,
        validator_id: &str,
        era: Era,
    ) -> Result<Option<ValidatorStatus>, sqlx::Error> {
        let Some(validator) = self.storage.get_validator(validator_id).await? else {
            return Ok(None);
        };

        let status = self
            .storage
            .get_nomination(validator_id, era)
            .await?
            .map(|nomination| ValidatorStatus {
                validator,
                nomination,
            });

        Ok(status)
    }

    pub async fn validator_trend(
        &self,
        validator_id: &str,
    ) -> Result<Option<ValidatorTrend>, sqlx::Error> {
        let Some(validator) = self.storage.get_validator(validator_id).await? else {
            return Ok(None);
        };
        let nominations = self.storage.get_nominations(validator_id).await?;

        Ok(Some(ValidatorTrend {
            validator,
            nominations,
        }))
    }

    /// The page with the given index of the validators nominated in the given era.
    pub async fn list_validators(
        &self,
        era: Era,
        page_size: u32,
        page_index: u32,
    ) -> Result<Vec<ValidatorStatus>, sqlx::Error> {
        let offset = page_size as u64 * page_index as u64;

        let statuses = self
            .storage
            .get_nominations_for_era(era, page_size, offset)
            .await?
            .into_iter()
            .map(|(validator, nomination)| ValidatorStatus {
                validator,
                nomination,
            })
            .collect();

        Ok(statuses)
    }

    pub async fn save_active_era(&self, era: Era) -> Result<(), sqlx::Error> {
        self.storage.save_active_era(era).await
    }

    pub async fn active_era(&self) -> Result<Option<Era>, sqlx::Error> {
        self.storage.get_active_era().await
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        domain::{
            Era,
            nomination::{
                CommissionChange, Exposure, IndividualExposure, NominationInput, NominatorEntry,
            },
            repository::NominationRepository,
            storage::{
                Storage,
                tests::{FailingStorage, ReadOnlyStorage},
            },
        },
        infra::storage::in_mem::InMemStorage,
    };
    use assert_matches::assert_matches;

    fn input(era: Era, commission: f64) -> NominationInput {
        NominationInput {
            era,
            display_name: "alice".to_owned(),
            exposure: Exposure {
                total: 3_000,
                own: 1_000,
                others: vec![IndividualExposure {
                    who: "bob".to_owned(),
                    value: 2_000,
                }],
            },
            nominators: vec![NominatorEntry {
                address: "bob".to_owned(),
                stake: 2_000,
            }],
            commission,
            apy: 0.1,
        }
    }

    #[tokio::test]
    async fn test_save_first_appearance() {
        let repository = NominationRepository::new(InMemStorage::default());
        assert!(repository.save_nomination("alice", input(100, 5.0)).await);

        let validator = repository.storage().get_validator("alice").await;
        assert_matches!(validator, Ok(Some(validator)) => {
            assert_eq!(validator.display_name, "alice");
            assert_eq!(validator.commission_change, CommissionChange::None);
        });

        let nomination = repository.storage().get_nomination("alice", 100).await;
        assert_matches!(nomination, Ok(Some(nomination)) => {
            assert_eq!(nomination.commission, 5.0);
            assert_eq!(nomination.exposure.total, 3_000);
        });
    }

    #[tokio::test]
    async fn test_save_idempotent() {
        let repository = NominationRepository::new(InMemStorage::default());
        assert!(repository.save_nomination("alice", input(100, 5.0)).await);
        assert!(repository.save_nomination("alice", input(100, 5.0)).await);

        let last = NominationInput {
            apy: 0.2,
            ..input(100, 5.0)
        };
        assert!(repository.save_nomination("alice", last).await);

        let nominations = repository.storage().get_nominations("alice").await;
        assert_matches!(nominations, Ok(nominations) => {
            assert_eq!(nominations.len(), 1);
            assert_eq!(nominations[0].apy, 0.2);
        });
    }

    #[tokio::test]
    async fn test_commission_change() {
        for (previous, current, expected) in [
            (5.0, 7.0, CommissionChange::Increased),
            (7.0, 5.0, CommissionChange::Decreased),
            (5.0, 5.0, CommissionChange::None),
        ] {
            let repository = NominationRepository::new(InMemStorage::default());
            assert!(repository.save_nomination("alice", input(99, previous)).await);
            assert!(repository.save_nomination("alice", input(100, current)).await);

            let validator = repository.storage().get_validator("alice").await;
            assert_matches!(validator, Ok(Some(v)) if v.commission_change == expected);
        }
    }

    #[tokio::test]
    async fn test_commission_change_without_previous_era() {
        let repository = NominationRepository::new(InMemStorage::default());
        assert!(repository.save_nomination("alice", input(98, 5.0)).await);
        assert!(repository.save_nomination("alice", input(100, 10.0)).await);

        let validator = repository.storage().get_validator("alice").await;
        assert_matches!(
            validator,
            Ok(Some(v)) if v.commission_change == CommissionChange::None
        );
    }

    #[tokio::test]
    async fn test_save_invalid() {
        let repository = NominationRepository::new(InMemStorage::default());
        let mut invalid = input(100, 5.0);
        invalid.exposure.others[0].who = String::new();

        assert!(!repository.save_nomination("alice", invalid).await);
        assert_matches!(repository.storage().get_validator("alice").await, Ok(None));
        assert_matches!(repository.storage().get_nominations("alice").await, Ok(n) if n.is_empty());
    }

    #[tokio::test]
    async fn test_save_storage_failure() {
        let repository = NominationRepository::new(FailingStorage);
        assert!(!repository.save_nomination("alice", input(100, 5.0)).await);
    }

    #[tokio::test]
    async fn test_save_storage_failure_keeps_previous_state() {
        let storage = InMemStorage::default();
        let repository = NominationRepository::new(storage.clone());
        assert!(repository.save_nomination("alice", input(99, 5.0)).await);

        let repository = NominationRepository::new(ReadOnlyStorage(storage.clone()));
        assert!(!repository.save_nomination("alice", input(100, 7.0)).await);

        assert_matches!(
            storage.get_validator("alice").await,
            Ok(Some(v)) if v.commission_change == CommissionChange::None
        );
        assert_matches!(storage.get_nomination("alice", 100).await, Ok(None));
    }

    #[tokio::test]
    async fn test_queries() {
        let repository = NominationRepository::new(InMemStorage::default());
        assert!(repository.save_nomination("alice", input(99, 5.0)).await);
        assert!(repository.save_nomination("alice", input(100, 6.0)).await);
        assert!(repository.save_nomination("bob", input(100, 1.0)).await);

        let status = repository.get_status_for_era("alice", 100).await;
        assert_matches!(status, Ok(Some(status)) => {
            assert_eq!(status.nomination.commission, 6.0);
            assert_eq!(status.validator.commission_change, CommissionChange::Increased);
        });
        assert_matches!(repository.get_status_for_era("alice", 101).await, Ok(None));
        assert_matches!(repository.get_status_for_era("carol", 100).await, Ok(None));

        let trend = repository.validator_trend("alice").await;
        assert_matches!(trend, Ok(Some(trend)) => {
            let eras = trend.nominations.iter().map(|n| n.era).collect::<Vec<_>>();
            assert_eq!(eras, vec![99, 100]);
        });
        assert_matches!(repository.validator_trend("carol").await, Ok(None));

        assert!(repository.save_active_era(100).await.is_ok());
        assert_matches!(repository.active_era().await, Ok(Some(100)));
    }

    #[tokio::test]
    async fn test_list_validators() {
        let repository = NominationRepository::new(InMemStorage::default());
        for index in 0..45 {
            let id = format!("validator-{index}");
            assert!(repository.save_nomination(&id, input(100, 5.0)).await);
            assert!(repository.save_nomination(&id, input(99, 5.0)).await);
        }

        let page = repository.list_validators(100, 20, 0).await;
        assert_matches!(page, Ok(page) => {
            assert_eq!(page.len(), 20);
            assert!(page.iter().all(|status| status.nomination.era == 100));
            assert_eq!(page[0].validator.id, "validator-0");
        });

        let page = repository.list_validators(100, 20, 2).await;
        assert_matches!(page, Ok(page) => {
            assert_eq!(page.len(), 5);
            assert_eq!(page[0].validator.id, "validator-40");
        });

        assert_matches!(repository.list_validators(100, 20, 3).await, Ok(page) if page.is_empty());
        assert_matches!(repository.list_validators(101, 20, 0).await, Ok(page) if page.is_empty());
    }
}
