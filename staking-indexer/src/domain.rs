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

pub mod aggregator;
pub mod apy;
pub mod cache;
pub mod chain;
pub mod era_resolver;
pub mod nomination;
pub mod repository;
pub mod snapshot;
pub mod storage;

use crate::utils::{HexError, hex_to_array};
use derive_more::From;
use std::{fmt, str::FromStr};

/// Index of a staking period.
pub type Era = u32;

/// Token amount in the smallest unit of the chain.
pub type Amount = u128;

/// Stash account of a validator.
pub type ValidatorId = String;

/// Hash of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, From)]
pub struct BlockHash(pub [u8; 32]);

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for BlockHash {
    type Err = HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex_to_array(s).map(Self)
    }
}

/// A point in chain history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    pub hash: BlockHash,
    pub height: u64,
}
