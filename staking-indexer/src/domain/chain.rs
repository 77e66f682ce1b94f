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

use crate::domain::{Amount, BlockRef, Era, ValidatorId, nomination::Exposure};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use std::error::Error as StdError;

/// Read access to the staking state of the chain.
#[trait_variant::make(Send)]
pub trait Chain
where
    Self: Clone + Send + Sync + 'static,
{
    type Error: StdError + Send + Sync + 'static;

    /// The era currently in effect, if staking has started.
    async fn active_era(&self) -> Result<Option<Era>, Self::Error>;

    /// The latest finalized block.
    async fn head(&self) -> Result<BlockRef, Self::Error>;

    /// The block at the given height of the finalized chain.
    async fn block_at_height(&self, height: u64) -> Result<BlockRef, Self::Error>;

    /// The active era as of the given block.
    async fn era_at(&self, block: &BlockRef) -> Result<Era, Self::Error>;

    /// The active validator set as of the given block.
    async fn validators_at(&self, block: &BlockRef) -> Result<Vec<ValidatorId>, Self::Error>;

    /// Commission of the given validator in the given era, in percent.
    async fn commission(&self, era: Era, validator: &ValidatorId) -> Result<f64, Self::Error>;

    /// Stake backing the given validator in the given era.
    async fn exposure(&self, era: Era, validator: &ValidatorId) -> Result<Exposure, Self::Error>;

    /// All accounts currently registered to validate, elected or waiting, with their current
    /// commission.
    async fn intentions(&self) -> Result<Vec<ValidatorIntention>, Self::Error>;

    /// All current nominators with their targets and bonded stake.
    async fn nominators(&self) -> Result<Vec<NominatorStake>, Self::Error>;

    /// Total payout for the given era, if the era has ended.
    async fn era_total_reward(&self, era: Era) -> Result<Option<Amount>, Self::Error>;

    /// Number of validators the chain aims to elect.
    async fn validator_count(&self) -> Result<u32, Self::Error>;
}

/// A nominator as seen by the chain.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NominatorStake {
    pub account_id: String,
    pub targets: Vec<ValidatorId>,
    #[serde_as(as = "DisplayFromStr")]
    pub stake: Amount,
}

/// An account registered to validate.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorIntention {
    pub stash_id: ValidatorId,
    /// In percent.
    pub commission: f64,
}

#[cfg(test)]
pub mod tests {
    use crate::domain::{
        Amount, BlockHash, BlockRef, Era, ValidatorId,
        chain::{Chain, NominatorStake, ValidatorIntention},
        nomination::Exposure,
    };
    use std::{
        collections::HashMap,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };
    use thiserror::Error;

    /// In-memory chain: the era of every block height is taken from a table.
    #[derive(Debug, Clone, Default)]
    pub struct MockChain {
        pub eras: Arc<Vec<Era>>,
        pub validators: HashMap<Era, Vec<ValidatorId>>,
        pub commissions: HashMap<(Era, ValidatorId), f64>,
        pub exposures: HashMap<(Era, ValidatorId), Exposure>,
        pub intentions: Vec<ValidatorIntention>,
        pub nominators: Vec<NominatorStake>,
        pub rewards: HashMap<Era, Amount>,
        pub validator_count: u32,
        pub delay: Option<Duration>,
        pub fail_exposure: bool,
        pub fail_blocks: bool,
        era_at_calls: Arc<AtomicUsize>,
        nominators_calls: Arc<AtomicUsize>,
    }

    impl MockChain {
        /// A chain where era `n` spans `lengths[n]` blocks, starting at height 0.
        pub fn with_era_lengths(lengths: &[u64]) -> Self {
            let eras = lengths
                .iter()
                .enumerate()
                .flat_map(|(era, &length)| (0..length).map(move |_| era as Era))
                .collect::<Vec<_>>();

            Self {
                eras: Arc::new(eras),
                ..Default::default()
            }
        }

        pub fn era_at_calls(&self) -> usize {
            self.era_at_calls.load(Ordering::SeqCst)
        }

        pub fn nominators_calls(&self) -> usize {
            self.nominators_calls.load(Ordering::SeqCst)
        }

        fn block(height: u64) -> BlockRef {
            let mut hash = [0; 32];
            hash[24..].copy_from_slice(&height.to_be_bytes());
            BlockRef {
                hash: BlockHash(hash),
                height,
            }
        }

        async fn pause(&self) {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
        }
    }

    impl Chain for MockChain {
        type Error = MockChainError;

        async fn active_era(&self) -> Result<Option<Era>, Self::Error> {
            Ok(self.eras.last().copied())
        }

        async fn head(&self) -> Result<BlockRef, Self::Error> {
            let height = self.eras.len().checked_sub(1).ok_or(MockChainError::Empty)?;
            Ok(Self::block(height as u64))
        }

        async fn block_at_height(&self, height: u64) -> Result<BlockRef, Self::Error> {
            if self.fail_blocks {
                return Err(MockChainError::Unavailable);
            }
            if height as usize >= self.eras.len() {
                return Err(MockChainError::UnknownHeight(height));
            }
            Ok(Self::block(height))
        }

        async fn era_at(&self, block: &BlockRef) -> Result<Era, Self::Error> {
            self.era_at_calls.fetch_add(1, Ordering::SeqCst);
            self.eras
                .get(block.height as usize)
                .copied()
                .ok_or(MockChainError::UnknownHeight(block.height))
        }

        async fn validators_at(&self, block: &BlockRef) -> Result<Vec<ValidatorId>, Self::Error> {
            let era = self.era_at(block).await?;
            Ok(self.validators.get(&era).cloned().unwrap_or_default())
        }

        async fn commission(&self, era: Era, validator: &ValidatorId) -> Result<f64, Self::Error> {
            Ok(self
                .commissions
                .get(&(era, validator.to_owned()))
                .copied()
                .unwrap_or_default())
        }

        async fn exposure(
            &self,
            era: Era,
            validator: &ValidatorId,
        ) -> Result<Exposure, Self::Error> {
            self.pause().await;
            if self.fail_exposure {
                return Err(MockChainError::Unavailable);
            }
            Ok(self
                .exposures
                .get(&(era, validator.to_owned()))
                .cloned()
                .unwrap_or_default())
        }

        async fn intentions(&self) -> Result<Vec<ValidatorIntention>, Self::Error> {
            Ok(self.intentions.clone())
        }

        async fn nominators(&self) -> Result<Vec<NominatorStake>, Self::Error> {
            self.nominators_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.nominators.clone())
        }

        async fn era_total_reward(&self, era: Era) -> Result<Option<Amount>, Self::Error> {
            Ok(self.rewards.get(&era).copied())
        }

        async fn validator_count(&self) -> Result<u32, Self::Error> {
            Ok(self.validator_count)
        }
    }

    #[derive(Debug, Error)]
    pub enum MockChainError {
        #[error("chain has no blocks")]
        Empty,

        #[error("no block at height {0}")]
        UnknownHeight(u64),

        #[error("chain unavailable")]
        Unavailable,
    }

    #[tokio::test]
    async fn test_mock_chain() {
        let chain = MockChain::with_era_lengths(&[2, 3]);
        assert_eq!(chain.active_era().await.ok(), Some(Some(1)));
        let head = chain.head().await.expect("head can be read");
        assert_eq!(head.height, 4);
        let block = chain.block_at_height(1).await.expect("block exists");
        assert_eq!(chain.era_at(&block).await.ok(), Some(0));
        assert!(chain.block_at_height(5).await.is_err());
    }
}
