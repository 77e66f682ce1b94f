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
    domain::{
        Amount, BlockHash, BlockRef, Era, ValidatorId,
        chain::{Chain, NominatorStake, ValidatorIntention},
        nomination::{Exposure, IndividualExposure},
    },
    utils::remove_hex_prefix,
};
use fastrace::trace;
use log::debug;
use parity_scale_codec::Decode;
use reqwest::header::{InvalidHeaderValue, USER_AGENT};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::value::RawValue;
use staking_common::error::BoxError;
use std::{collections::HashMap, future::Future, str::FromStr, time::Duration};
use subxt::{
    OnlineClient, PolkadotConfig,
    backend::rpc::reconnecting_rpc_client::{ExponentialBackoff, HeaderMap, RpcClient},
    dynamic::Value,
    storage::{Storage, StorageKey},
    utils::{AccountId32, H256},
};
use thiserror::Error;
use tokio::time::timeout;

type OnlineStorage = Storage<PolkadotConfig, OnlineClient<PolkadotConfig>>;

const STAKING: &str = "Staking";
const SESSION: &str = "Session";

/// Commission is stored as parts per billion.
const PERBILL_PER_PERCENT: f64 = 10_000_000.0;

/// Config for node connection.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub url: String,

    #[serde(with = "humantime_serde")]
    pub reconnect_max_delay: Duration,

    pub reconnect_max_attempts: usize,

    /// Upper bound for every single RPC call.
    #[serde(with = "humantime_serde")]
    pub rpc_timeout: Duration,
}

/// A [Chain] implementation based on subxt.
#[derive(Clone)]
pub struct SubxtChain {
    rpc_client: RpcClient,
    online_client: OnlineClient<PolkadotConfig>,
    rpc_timeout: Duration,
}

impl SubxtChain {
    /// Create a new [SubxtChain] with the given [Config].
    pub async fn new(config: Config) -> Result<Self, SubxtChainError> {
        let Config {
            url,
            reconnect_max_delay,
            reconnect_max_attempts,
            rpc_timeout,
        } = config;

        let retry_policy = ExponentialBackoff::from_millis(10)
            .max_delay(reconnect_max_delay)
            .take(reconnect_max_attempts);
        let user_agent = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).parse()?;
        let headers = HeaderMap::from_iter([(USER_AGENT, user_agent)]);
        let rpc_client = RpcClient::builder()
            .set_headers(headers)
            .retry_policy(retry_policy)
            .build(&url)
            .await
            .map_err(|error| SubxtChainError::RpcClient(error.into()))?;

        let online_client = OnlineClient::<PolkadotConfig>::from_rpc_client(rpc_client.clone())
            .await
            .map_err(|error| SubxtChainError::OnlineClient(error.into()))?;

        Ok(Self {
            rpc_client,
            online_client,
            rpc_timeout,
        })
    }

    async fn timed<T>(
        &self,
        call: &'static str,
        f: impl Future<Output = Result<T, SubxtChainError>>,
    ) -> Result<T, SubxtChainError> {
        timeout(self.rpc_timeout, f)
            .await
            .map_err(|_| SubxtChainError::Timeout(call))?
    }

    async fn request<T>(
        &self,
        method: &'static str,
        params: Option<String>,
    ) -> Result<T, SubxtChainError>
    where
        T: DeserializeOwned,
    {
        let params = params
            .map(RawValue::from_string)
            .transpose()
            .map_err(|error| SubxtChainError::Decode(method, error.into()))?;

        let response = self
            .timed(method, async {
                self.rpc_client
                    .request(method.to_owned(), params)
                    .await
                    .map_err(|error| SubxtChainError::RpcCall(method, error.into()))
            })
            .await?;

        serde_json::from_str(response.get())
            .map_err(|error| SubxtChainError::Decode(method, error.into()))
    }

    async fn storage_at(&self, block: Option<&BlockRef>) -> Result<OnlineStorage, SubxtChainError> {
        match block {
            Some(block) => Ok(self.online_client.storage().at(H256(block.hash.0))),
            None => self
                .timed("latest block", async {
                    self.online_client
                        .storage()
                        .at_latest()
                        .await
                        .map_err(|error| SubxtChainError::Storage("latest block", error.into()))
                })
                .await,
        }
    }

    /// Fetch and decode a storage value of the given pallet.
    async fn fetch<T, K>(
        &self,
        block: Option<&BlockRef>,
        pallet: &'static str,
        entry: &'static str,
        keys: K,
    ) -> Result<Option<T>, SubxtChainError>
    where
        T: Decode,
        K: StorageKey + Send + Sync,
    {
        let storage = self.storage_at(block).await?;
        let address = subxt::dynamic::storage(pallet, entry, keys);

        let value = self
            .timed(entry, async {
                storage
                    .fetch(&address)
                    .await
                    .map_err(|error| SubxtChainError::Storage(entry, error.into()))
            })
            .await?;

        value
            .map(|value| T::decode(&mut value.encoded()))
            .transpose()
            .map_err(Into::into)
    }

    /// Iterate over all entries of a storage map keyed by a single account id, decoding the
    /// values and taking the account id from the last 32 bytes of the storage key.
    async fn iter_accounts<T>(
        &self,
        entry: &'static str,
    ) -> Result<Vec<(AccountId32, T)>, SubxtChainError>
    where
        T: Decode,
    {
        let storage = self.storage_at(None).await?;
        let address = subxt::dynamic::storage(STAKING, entry, ());

        let mut entries = self
            .timed(entry, async {
                storage
                    .iter(address)
                    .await
                    .map_err(|error| SubxtChainError::Storage(entry, error.into()))
            })
            .await?;

        let mut items = vec![];
        while let Some(kv) = timeout(self.rpc_timeout, entries.next())
            .await
            .map_err(|_| SubxtChainError::Timeout(entry))?
        {
            let kv = kv.map_err(|error| SubxtChainError::Storage(entry, error.into()))?;

            let account = kv
                .key_bytes
                .len()
                .checked_sub(32)
                .and_then(|start| <[u8; 32]>::try_from(&kv.key_bytes[start..]).ok())
                .map(AccountId32)
                .ok_or(SubxtChainError::MissingStorage(entry))?;
            let value = T::decode(&mut kv.value.encoded())?;

            items.push((account, value));
        }

        debug!(entry, len = items.len(); "storage map read");
        Ok(items)
    }
}

impl Chain for SubxtChain {
    type Error = SubxtChainError;

    #[trace]
    async fn active_era(&self) -> Result<Option<Era>, Self::Error> {
        let active_era = self
            .fetch::<ActiveEraInfo, _>(None, STAKING, "ActiveEra", ())
            .await?
            .map(|info| info.index);
        Ok(active_era)
    }

    #[trace]
    async fn head(&self) -> Result<BlockRef, Self::Error> {
        let hash = self
            .request::<String>("chain_getFinalizedHead", None)
            .await?;
        let header = self
            .request::<Header>("chain_getHeader", Some(format!(r#"["{hash}"]"#)))
            .await?;

        let hash = BlockHash::from_str(&hash)
            .map_err(|error| SubxtChainError::Decode("chain_getFinalizedHead", error.into()))?;
        let height = u64::from_str_radix(remove_hex_prefix(&header.number), 16)
            .map_err(|error| SubxtChainError::Decode("chain_getHeader", error.into()))?;

        Ok(BlockRef { hash, height })
    }

    #[trace]
    async fn block_at_height(&self, height: u64) -> Result<BlockRef, Self::Error> {
        let hash = self
            .request::<Option<String>>("chain_getBlockHash", Some(format!("[{height}]")))
            .await?
            .ok_or(SubxtChainError::BlockNotFound(height))?;
        let hash = BlockHash::from_str(&hash)
            .map_err(|error| SubxtChainError::Decode("chain_getBlockHash", error.into()))?;

        Ok(BlockRef { hash, height })
    }

    #[trace]
    async fn era_at(&self, block: &BlockRef) -> Result<Era, Self::Error> {
        self.fetch::<ActiveEraInfo, _>(Some(block), STAKING, "ActiveEra", ())
            .await?
            .map(|info| info.index)
            .ok_or(SubxtChainError::MissingStorage("ActiveEra"))
    }

    #[trace]
    async fn validators_at(&self, block: &BlockRef) -> Result<Vec<ValidatorId>, Self::Error> {
        let validators = self
            .fetch::<Vec<AccountId32>, _>(Some(block), SESSION, "Validators", ())
            .await?
            .unwrap_or_default()
            .into_iter()
            .map(|account| account.to_string())
            .collect();
        Ok(validators)
    }

    #[trace]
    async fn commission(&self, era: Era, validator: &ValidatorId) -> Result<f64, Self::Error> {
        let keys = vec![Value::u128(era.into()), account_key(validator)?];
        let commission = self
            .fetch::<ValidatorPrefs, _>(None, STAKING, "ErasValidatorPrefs", keys)
            .await?
            .map(|prefs| prefs.commission as f64 / PERBILL_PER_PERCENT)
            .unwrap_or_default();
        Ok(commission)
    }

    #[trace]
    async fn exposure(&self, era: Era, validator: &ValidatorId) -> Result<Exposure, Self::Error> {
        let keys = vec![Value::u128(era.into()), account_key(validator)?];
        let Some(overview) = self
            .fetch::<PagedExposureMetadata, _>(None, STAKING, "ErasStakersOverview", keys)
            .await?
        else {
            return Ok(Exposure::default());
        };

        let mut others = Vec::with_capacity(overview.nominator_count as usize);
        for page in 0..overview.page_count {
            let keys = vec![
                Value::u128(era.into()),
                account_key(validator)?,
                Value::u128(page.into()),
            ];
            let page = self
                .fetch::<ExposurePage, _>(None, STAKING, "ErasStakersPaged", keys)
                .await?
                .map(|page| page.others)
                .unwrap_or_default();

            others.extend(page.into_iter().map(|other| IndividualExposure {
                who: other.who.to_string(),
                value: other.value,
            }));
        }

        Ok(Exposure {
            total: overview.total,
            own: overview.own,
            others,
        })
    }

    #[trace]
    async fn intentions(&self) -> Result<Vec<ValidatorIntention>, Self::Error> {
        let intentions = self
            .iter_accounts::<ValidatorPrefs>("Validators")
            .await?
            .into_iter()
            .map(|(account, prefs)| ValidatorIntention {
                stash_id: account.to_string(),
                commission: prefs.commission as f64 / PERBILL_PER_PERCENT,
            })
            .collect();
        Ok(intentions)
    }

    #[trace]
    async fn nominators(&self) -> Result<Vec<NominatorStake>, Self::Error> {
        let ledgers = self.iter_accounts::<StakingLedger>("Ledger").await?;
        let nominations = self.iter_accounts::<Nominations>("Nominators").await?;
        Ok(nominator_stakes(ledgers, nominations))
    }

    #[trace]
    async fn era_total_reward(&self, era: Era) -> Result<Option<Amount>, Self::Error> {
        let keys = vec![Value::u128(era.into())];
        self.fetch::<Amount, _>(None, STAKING, "ErasValidatorReward", keys)
            .await
    }

    #[trace]
    async fn validator_count(&self) -> Result<u32, Self::Error> {
        let count = self
            .fetch::<u32, _>(None, STAKING, "ValidatorCount", ())
            .await?
            .unwrap_or_default();
        Ok(count)
    }
}

/// Join nominations with the active stake of the ledger whose stash is the nominator.
fn nominator_stakes(
    ledgers: Vec<(AccountId32, StakingLedger)>,
    nominations: Vec<(AccountId32, Nominations)>,
) -> Vec<NominatorStake> {
    let stakes = ledgers
        .into_iter()
        .map(|(_, ledger)| (ledger.stash.0, ledger.active))
        .collect::<HashMap<_, _>>();

    nominations
        .into_iter()
        .map(|(account, nominations)| NominatorStake {
            stake: stakes.get(&account.0).copied().unwrap_or_default(),
            account_id: account.to_string(),
            targets: nominations
                .targets
                .into_iter()
                .map(|target| target.to_string())
                .collect(),
        })
        .collect()
}

fn account_key(validator: &str) -> Result<Value, SubxtChainError> {
    let account = AccountId32::from_str(validator)
        .map_err(|_| SubxtChainError::AccountId(validator.to_owned()))?;
    Ok(Value::from_bytes(account.0))
}

#[derive(Debug, Deserialize)]
struct Header {
    number: String,
}

#[derive(Debug, Decode)]
struct ActiveEraInfo {
    index: u32,
    #[allow(unused)]
    start: Option<u64>,
}

#[derive(Debug, Decode)]
struct ValidatorPrefs {
    #[codec(compact)]
    commission: u32,
    #[allow(unused)]
    blocked: bool,
}

#[derive(Debug, Decode)]
struct PagedExposureMetadata {
    #[codec(compact)]
    total: u128,
    #[codec(compact)]
    own: u128,
    nominator_count: u32,
    page_count: u32,
}

#[derive(Debug, Decode)]
struct ExposurePage {
    #[codec(compact)]
    #[allow(unused)]
    page_total: u128,
    others: Vec<PagedIndividualExposure>,
}

#[derive(Debug, Decode)]
struct PagedIndividualExposure {
    who: AccountId32,
    #[codec(compact)]
    value: u128,
}

#[derive(Debug, Decode)]
struct Nominations {
    targets: Vec<AccountId32>,
}

/// Only the leading fields of the ledger are decoded.
#[derive(Debug, Decode)]
struct StakingLedger {
    stash: AccountId32,
    #[codec(compact)]
    #[allow(unused)]
    total: u128,
    #[codec(compact)]
    active: u128,
}

#[derive(Debug, Error)]
pub enum SubxtChainError {
    #[error("cannot create reconnecting subxt RPC client")]
    RpcClient(#[source] BoxError),

    #[error("cannot create subxt online client")]
    OnlineClient(#[source] Box<subxt::Error>),

    #[error("cannot make RPC call {0}")]
    RpcCall(&'static str, #[source] BoxError),

    #[error("cannot decode response of {0}")]
    Decode(&'static str, #[source] BoxError),

    #[error("cannot read storage {0}")]
    Storage(&'static str, #[source] Box<subxt::Error>),

    #[error("storage {0} not found")]
    MissingStorage(&'static str),

    #[error("cannot scale decode")]
    ScaleDecode(#[from] parity_scale_codec::Error),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("block at height {0} not found")]
    BlockNotFound(u64),

    #[error("invalid account id {0}")]
    AccountId(String),

    #[error("cannot create HTTP header")]
    InvalidHeaderValue(#[from] InvalidHeaderValue),
}
