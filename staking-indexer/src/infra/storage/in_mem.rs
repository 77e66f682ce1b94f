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
    storage::Storage,
};
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};

/// In-memory [Storage] implementation; nominations are kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemStorage {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    validators: HashMap<String, ValidatorRecord>,
    nominations: Vec<NominationRecord>,
    active_era: Option<Era>,
}

impl Storage for InMemStorage {
    async fn get_validator(&self, id: &str) -> Result<Option<ValidatorRecord>, sqlx::Error> {
        Ok(self.inner.read().validators.get(id).cloned())
    }

    async fn get_nomination(
        &self,
        validator_id: &str,
        era: Era,
    ) -> Result<Option<NominationRecord>, sqlx::Error> {
        let nomination = self
            .inner
            .read()
            .nominations
            .iter()
            .find(|n| n.validator_id == validator_id && n.era == era)
            .cloned();
        Ok(nomination)
    }

    async fn save_validator_nomination(
        &self,
        validator: &ValidatorRecord,
        nomination: &NominationRecord,
    ) -> Result<(), sqlx::Error> {
        // Same constraint as the foreign key of the nominations table.
        if nomination.validator_id != validator.id {
            return Err(sqlx::Error::Protocol(format!(
                "nomination of {} cannot be saved with validator {}",
                nomination.validator_id, validator.id
            )));
        }

        let mut inner = self.inner.write();

        inner
            .validators
            .insert(validator.id.clone(), validator.clone());

        let position = inner
            .nominations
            .iter()
            .position(|n| n.validator_id == nomination.validator_id && n.era == nomination.era);
        match position {
            Some(position) => inner.nominations[position] = nomination.clone(),
            None => inner.nominations.push(nomination.clone()),
        }

        Ok(())
    }

    async fn get_nominations(
        &self,
        validator_id: &str,
    ) -> Result<Vec<NominationRecord>, sqlx::Error> {
        let mut nominations = self
            .inner
            .read()
            .nominations
            .iter()
            .filter(|n| n.validator_id == validator_id)
            .cloned()
            .collect::<Vec<_>>();
        nominations.sort_by_key(|n| n.era);
        Ok(nominations)
    }

    async fn get_nominations_for_era(
        &self,
        era: Era,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<(ValidatorRecord, NominationRecord)>, sqlx::Error> {
        let inner = self.inner.read();

        let page = inner
            .nominations
            .iter()
            .filter(|n| n.era == era)
            .filter_map(|n| {
                let validator = inner.validators.get(&n.validator_id)?;
                Some((validator.clone(), n.clone()))
            })
            .skip(offset as usize)
            .take(limit as usize)
            .collect();

        Ok(page)
    }

    async fn save_active_era(&self, era: Era) -> Result<(), sqlx::Error> {
        self.inner.write().active_era = Some(era);
        Ok(())
    }

    async fn get_active_era(&self) -> Result<Option<Era>, sqlx::Error> {
        Ok(self.inner.read().active_era)
    }
}
