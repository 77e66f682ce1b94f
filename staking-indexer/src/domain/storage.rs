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
    nomination::{NominationRecord, ValidatorRecord},
};

/// Storage abstraction.
#[trait_variant::make(Send)]
pub trait Storage
where
    Self: Clone + Send + Sync + 'static,
{
    async fn get_validator(&self, id: &str) -> Result<Option<ValidatorRecord>, sqlx::Error>;

    async fn get_nomination(
        &self,
        validator_id: &str,
        era: Era,
    ) -> Result<Option<NominationRecord>, sqlx::Error>;

    /// Upsert the validator and its nomination for the nomination's era, atomically: either both
    /// are written or neither is.
    async fn save_validator_nomination(
        &self,
        validator: &ValidatorRecord,
        nomination: &NominationRecord,
    ) -> Result<(), sqlx::Error>;

    /// All nominations of a validator, ordered by era.
    async fn get_nominations(&self, validator_id: &str)
    -> Result<Vec<NominationRecord>, sqlx::Error>;

    /// A page of the nominations for the given era with their validators, in insertion order.
    async fn get_nominations_for_era(
        &self,
        era: Era,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<(ValidatorRecord, NominationRecord)>, sqlx::Error>;

    async fn save_active_era(&self, era: Era) -> Result<(), sqlx::Error>;

    async fn get_active_era(&self) -> Result<Option<Era>, sqlx::Error>;
}

#[cfg(test)]
pub mod tests {
    use crate::{
        domain::{
            Era,
            nomination::{NominationRecord, ValidatorRecord},
            storage::Storage,
        },
        infra::storage::in_mem::InMemStorage,
    };

    /// Storage whose every operation fails.
    #[derive(Debug, Clone, Default)]
    pub struct FailingStorage;

    impl Storage for FailingStorage {
        async fn get_validator(&self, _id: &str) -> Result<Option<ValidatorRecord>, sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }

        async fn get_nomination(
            &self,
            _validator_id: &str,
            _era: Era,
        ) -> Result<Option<NominationRecord>, sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }

        async fn save_validator_nomination(
            &self,
            _validator: &ValidatorRecord,
            _nomination: &NominationRecord,
        ) -> Result<(), sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }

        async fn get_nominations(
            &self,
            _validator_id: &str,
        ) -> Result<Vec<NominationRecord>, sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }

        async fn get_nominations_for_era(
            &self,
            _era: Era,
            _limit: u32,
            _offset: u64,
        ) -> Result<Vec<(ValidatorRecord, NominationRecord)>, sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }

        async fn save_active_era(&self, _era: Era) -> Result<(), sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }

        async fn get_active_era(&self) -> Result<Option<Era>, sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }
    }

    /// Storage reading from the wrapped [InMemStorage] whose writes fail.
    #[derive(Debug, Clone, Default)]
    pub struct ReadOnlyStorage(pub InMemStorage);

    impl Storage for ReadOnlyStorage {
        async fn get_validator(&self, id: &str) -> Result<Option<ValidatorRecord>, sqlx::Error> {
            self.0.get_validator(id).await
        }

        async fn get_nomination(
            &self,
            validator_id: &str,
            era: Era,
        ) -> Result<Option<NominationRecord>, sqlx::Error> {
            self.0.get_nomination(validator_id, era).await
        }

        async fn save_validator_nomination(
            &self,
            _validator: &ValidatorRecord,
            _nomination: &NominationRecord,
        ) -> Result<(), sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }

        async fn get_nominations(
            &self,
            validator_id: &str,
        ) -> Result<Vec<NominationRecord>, sqlx::Error> {
            self.0.get_nominations(validator_id).await
        }

        async fn get_nominations_for_era(
            &self,
            era: Era,
            limit: u32,
            offset: u64,
        ) -> Result<Vec<(ValidatorRecord, NominationRecord)>, sqlx::Error> {
            self.0.get_nominations_for_era(era, limit, offset).await
        }

        async fn save_active_era(&self, _era: Era) -> Result<(), sqlx::Error> {
            Err(sqlx::Error::PoolTimedOut)
        }

        async fn get_active_era(&self) -> Result<Option<Era>, sqlx::Error> {
            self.0.get_active_era().await
        }
    }
}
