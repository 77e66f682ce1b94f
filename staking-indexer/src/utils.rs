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

use thiserror::Error;

pub fn remove_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

/// Decode a hex string with an optional "0x" prefix into exactly `N` bytes.
pub fn hex_to_array<const N: usize>(s: &str) -> Result<[u8; N], HexError> {
    let bytes = hex::decode(remove_hex_prefix(s))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| HexError::Length { expected: N, actual: len })
}

#[derive(Debug, Error)]
pub enum HexError {
    #[error("cannot hex-decode")]
    Decode(#[from] hex::FromHexError),

    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}
