// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Immutable block: header plus ordered transactions, coinbase first.
//!
//! Header wire layout (little-endian):
//! kind(1) | version(4) | timestamp(8) | previous block id(8) | previous block hash(32)
//! | previous key block id(8) | base target(8) | work bits(4) | nonce(8)
//! | generator public key(32) | generation sequence(32) | transactions root(32)
//! | forgers root(32) | payload length(4) | total amount(8) | total fee(8)
//! | total reward(8) | signature(64)
//!
//! Block bytes are the header followed by a u32 count and u32-length-prefixed transactions.
//! `hash = SHA-256(header)`, `id` = first 8 bytes of the hash. The signature and the
//! proof of work both cover the header with a zero signature.

use serde::{Deserialize, Serialize};

use crate::core::params::{
    MAX_NUMBER_OF_KEY_TRANSACTIONS, MAX_NUMBER_OF_POS_TRANSACTIONS, MAX_TRANSACTION_BYTES,
};
use crate::core::security::crypto::{sha256, sha256d, verify, CryptoError, SecretPhrase};
use crate::core::state::merkle::transactions_root;
use crate::core::tx::appendix::Attachment;
use crate::core::tx::transaction::Transaction;
use crate::core::types::{ByteReader, ByteWriter, CodecError, FullId, PublicKey, Signature, H256};

use super::target::meets_target;

/// Serialized header length.
pub const HEADER_BYTES: usize = 301;

/// Which of the two interleaved block kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    /// Stake-forged block.
    Pos,
    /// Proof-of-work block.
    Key,
}

impl BlockKind {
    /// Wire code.
    pub fn code(self) -> u8 {
        match self {
            BlockKind::Pos => 0,
            BlockKind::Key => 1,
        }
    }

    /// Parse a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(BlockKind::Pos),
            1 => Some(BlockKind::Key),
            _ => None,
        }
    }

    /// Transaction count limit.
    pub fn max_transactions(self) -> usize {
        match self {
            BlockKind::Pos => MAX_NUMBER_OF_POS_TRANSACTIONS,
            BlockKind::Key => MAX_NUMBER_OF_KEY_TRANSACTIONS,
        }
    }
}

/// Block header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    /// Kind.
    pub kind: BlockKind,
    /// Protocol version.
    pub version: u32,
    /// Epoch seconds.
    pub timestamp: u64,
    /// Id of the previous block of either kind.
    pub previous_block_id: u64,
    /// Hash of the previous block's header.
    pub previous_block_hash: H256,
    /// Id of the last key block before this one (0 if none).
    pub previous_key_block_id: u64,
    /// Stake target; key blocks carry the previous block's value.
    pub base_target: u64,
    /// Compact work target; PoS blocks carry the previous block's value.
    pub bits: u32,
    /// Proof-of-work nonce; zero for PoS blocks.
    pub nonce: u64,
    /// Generator.
    pub generator_public_key: PublicKey,
    /// `SHA-256(previous generation sequence || generator public key)`.
    pub generation_sequence: H256,
    /// Merkle root over transaction full hashes.
    pub transactions_root: H256,
    /// Pinned forger-eligibility root (key blocks from the fixation height on).
    pub forgers_root: H256,
    /// Sum of transaction sizes.
    pub payload_length: u32,
    /// Sum of non-coinbase amounts.
    pub total_amount: i64,
    /// Sum of non-coinbase fees.
    pub total_fee: i64,
    /// Total paid by the coinbase.
    pub total_reward: i64,
    /// Generator signature.
    pub signature: Signature,
}

impl BlockHeader {
    fn encode(&self, with_signature: bool) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(HEADER_BYTES);
        w.put_u8(self.kind.code());
        w.put_u32(self.version);
        w.put_u64(self.timestamp);
        w.put_u64(self.previous_block_id);
        w.put_bytes(self.previous_block_hash.as_bytes());
        w.put_u64(self.previous_key_block_id);
        w.put_u64(self.base_target);
        w.put_u32(self.bits);
        w.put_u64(self.nonce);
        w.put_bytes(self.generator_public_key.as_bytes());
        w.put_bytes(self.generation_sequence.as_bytes());
        w.put_bytes(self.transactions_root.as_bytes());
        w.put_bytes(self.forgers_root.as_bytes());
        w.put_u32(self.payload_length);
        w.put_i64(self.total_amount);
        w.put_i64(self.total_fee);
        w.put_i64(self.total_reward);
        if with_signature {
            w.put_bytes(self.signature.as_bytes());
        } else {
            w.put_bytes(Signature::ZERO.as_bytes());
        }
        w.into_bytes()
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let kind = BlockKind::from_code(r.get_u8()?).ok_or(CodecError::Invalid("block kind"))?;
        Ok(Self {
            kind,
            version: r.get_u32()?,
            timestamp: r.get_u64()?,
            previous_block_id: r.get_u64()?,
            previous_block_hash: H256::from_bytes(r.get_array()?),
            previous_key_block_id: r.get_u64()?,
            base_target: r.get_u64()?,
            bits: r.get_u32()?,
            nonce: r.get_u64()?,
            generator_public_key: PublicKey::from_bytes(r.get_array()?),
            generation_sequence: H256::from_bytes(r.get_array()?),
            transactions_root: H256::from_bytes(r.get_array()?),
            forgers_root: H256::from_bytes(r.get_array()?),
            payload_length: r.get_u32()?,
            total_amount: r.get_i64()?,
            total_fee: r.get_i64()?,
            total_reward: r.get_i64()?,
            signature: Signature::from_bytes(r.get_array()?),
        })
    }

    /// Header bytes.
    pub fn bytes(&self) -> Vec<u8> {
        self.encode(true)
    }

    /// Bytes covered by the signature and the proof of work.
    pub fn unsigned_bytes(&self) -> Vec<u8> {
        self.encode(false)
    }

    /// Double SHA-256 of the unsigned header.
    pub fn pow_hash(&self) -> [u8; 32] {
        sha256d(&self.unsigned_bytes())
    }

    /// Generator account.
    pub fn generator_id(&self) -> FullId {
        FullId::from_public_key(&self.generator_public_key)
    }

    /// Fill the transaction-derived fields from `transactions` (coinbase first).
    pub fn seal(&mut self, transactions: &[Transaction]) {
        let hashes: Vec<H256> = transactions.iter().map(|t| t.full_hash()).collect();
        self.transactions_root = transactions_root(&hashes);
        self.payload_length = payload_length(transactions);
        let (amount, fee, reward) = totals(transactions);
        self.total_amount = amount;
        self.total_fee = fee;
        self.total_reward = reward;
    }

    /// Search nonces from the current one; true once the header meets its work target.
    pub fn mine(&mut self, max_attempts: u64) -> bool {
        for _ in 0..max_attempts {
            if meets_target(&self.pow_hash(), self.bits) {
                return true;
            }
            self.nonce = self.nonce.wrapping_add(1);
        }
        false
    }
}

/// Sum of transaction sizes.
pub fn payload_length(transactions: &[Transaction]) -> u32 {
    let total: usize = transactions.iter().map(|t| t.size()).sum();
    u32::try_from(total).unwrap_or(u32::MAX)
}

/// (amount, fee, coinbase payout) of a transaction list.
pub fn totals(transactions: &[Transaction]) -> (i64, i64, i64) {
    let mut amount = 0i64;
    let mut fee = 0i64;
    let mut reward = 0i64;
    for tx in transactions {
        if tx.kind().is_coinbase() {
            if let Attachment::Coinbase { recipients } = tx.attachment() {
                reward = recipients.values().fold(reward, |acc, v| acc.saturating_add(*v));
            }
        } else {
            amount = amount.saturating_add(tx.amount());
            fee = fee.saturating_add(tx.fee());
        }
    }
    (amount, fee, reward)
}

/// A block with its identity fixed at construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "BlockJson", try_from = "BlockJson")]
pub struct Block {
    header: BlockHeader,
    transactions: Vec<Transaction>,
    id: u64,
    hash: H256,
}

impl Block {
    /// Assemble a block from a finished header.
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        let hash = H256::from_bytes(sha256(&header.bytes()));
        Self {
            id: hash.id_prefix(),
            hash,
            header,
            transactions,
        }
    }

    /// Seal `header` over `transactions`, sign it with `secret` and assemble.
    pub fn forge(
        mut header: BlockHeader,
        transactions: Vec<Transaction>,
        secret: &SecretPhrase,
    ) -> Result<Self, CryptoError> {
        header.generator_public_key = secret.public_key()?;
        header.seal(&transactions);
        Self::sign_sealed(header, transactions, secret)
    }

    /// Sign an already sealed (and, for key blocks, mined) header.
    pub fn sign_sealed(
        mut header: BlockHeader,
        transactions: Vec<Transaction>,
        secret: &SecretPhrase,
    ) -> Result<Self, CryptoError> {
        header.signature = secret.sign(&header.unsigned_bytes())?;
        Ok(Self::new(header, transactions))
    }

    /// Parse wire bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = ByteReader::new(bytes);
        let header = BlockHeader::decode(&mut r)?;
        let count = r.get_u32()? as usize;
        if count > header.kind.max_transactions() {
            return Err(CodecError::TooLarge);
        }
        let mut transactions = Vec::with_capacity(count);
        for _ in 0..count {
            let raw = r.get_blob(MAX_TRANSACTION_BYTES)?;
            transactions.push(Transaction::parse(&raw)?);
        }
        r.finish()?;
        Ok(Self::new(header, transactions))
    }

    /// Wire bytes.
    pub fn bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(HEADER_BYTES + 4 + self.header.payload_length as usize);
        w.put_bytes(&self.header.bytes());
        w.put_u32(self.transactions.len() as u32);
        for tx in &self.transactions {
            w.put_blob(&tx.bytes());
        }
        w.into_bytes()
    }

    /// JSON mirror.
    pub fn to_json(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(|_| CodecError::Serialize)
    }

    /// Parse the JSON mirror.
    pub fn from_json(s: &str) -> Result<Self, CodecError> {
        serde_json::from_str(s).map_err(|_| CodecError::Deserialize)
    }

    /// Generator signature check.
    pub fn verify_signature(&self) -> bool {
        verify(
            &self.header.signature,
            &self.header.unsigned_bytes(),
            &self.header.generator_public_key,
        )
    }

    /// Id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Header hash.
    pub fn hash(&self) -> H256 {
        self.hash
    }

    /// Header.
    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    /// Kind.
    pub fn kind(&self) -> BlockKind {
        self.header.kind
    }

    /// Timestamp.
    pub fn timestamp(&self) -> u64 {
        self.header.timestamp
    }

    /// Previous block id.
    pub fn previous_block_id(&self) -> u64 {
        self.header.previous_block_id
    }

    /// Generator account.
    pub fn generator_id(&self) -> FullId {
        self.header.generator_id()
    }

    /// Transactions, coinbase first.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// The coinbase, if the block has one in first position.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|t| t.kind().is_coinbase())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockJson {
    header: BlockHeader,
    transactions: Vec<Transaction>,
}

impl From<Block> for BlockJson {
    fn from(b: Block) -> Self {
        Self {
            header: b.header,
            transactions: b.transactions,
        }
    }
}

impl TryFrom<BlockJson> for Block {
    type Error = CodecError;

    fn try_from(j: BlockJson) -> Result<Self, Self::Error> {
        if j.transactions.len() > j.header.kind.max_transactions() {
            return Err(CodecError::TooLarge);
        }
        Ok(Block::new(j.header, j.transactions))
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::core::params::{INITIAL_BASE_TARGET, MAX_WORK_TARGET_BITS};

    /// Header template with every content field zeroed.
    pub fn header(kind: BlockKind, timestamp: u64) -> BlockHeader {
        BlockHeader {
            kind,
            version: 1,
            timestamp,
            previous_block_id: 7,
            previous_block_hash: H256::from_bytes([7; 32]),
            previous_key_block_id: 0,
            base_target: INITIAL_BASE_TARGET,
            bits: MAX_WORK_TARGET_BITS,
            nonce: 0,
            generator_public_key: PublicKey::ZERO,
            generation_sequence: H256::ZERO,
            transactions_root: H256::ZERO,
            forgers_root: H256::ZERO,
            payload_length: 0,
            total_amount: 0,
            total_fee: 0,
            total_reward: 0,
            signature: Signature::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::header;
    use super::*;
    use crate::core::params::ONE_COIN;
    use crate::core::tx::coinbase::build_coinbase_for;
    use std::collections::BTreeMap;

    fn block(kind: BlockKind) -> Block {
        let secret = SecretPhrase::new("block generator");
        let me = FullId::from_public_key(&secret.public_key().unwrap());
        let cb = build_coinbase_for(&secret, BTreeMap::from([(me, 5 * ONE_COIN)]), 50).unwrap();
        Block::forge(header(kind, 50), vec![cb], &secret).unwrap()
    }

    #[test]
    fn wire_and_json_forms_agree() {
        let b = block(BlockKind::Pos);
        assert_eq!(b.header().bytes().len(), HEADER_BYTES);
        let parsed = Block::parse(&b.bytes()).unwrap();
        assert_eq!(parsed, b);
        let json = b.to_json().unwrap();
        assert_eq!(Block::from_json(&json).unwrap().bytes(), b.bytes());
        assert_eq!(b.header().total_reward, 5 * ONE_COIN);
        assert!(b.coinbase().is_some());
    }

    #[test]
    fn tampering_breaks_signature_and_identity() {
        let b = block(BlockKind::Pos);
        assert!(b.verify_signature());
        let mut h = b.header().clone();
        h.timestamp += 1;
        let forged = Block::new(h, b.transactions().to_vec());
        assert!(!forged.verify_signature());
        assert_ne!(forged.id(), b.id());
    }

    #[test]
    fn easiest_target_is_mined_quickly() {
        let mut h = header(BlockKind::Key, 10);
        assert!(h.mine(10_000));
        assert!(meets_target(&h.pow_hash(), h.bits));
    }

    #[test]
    fn unknown_kind_and_trailing_bytes_are_rejected() {
        let b = block(BlockKind::Key);
        let mut bytes = b.bytes();
        bytes.push(0);
        assert_eq!(Block::parse(&bytes), Err(CodecError::TrailingBytes));
        let mut bytes = b.bytes();
        bytes[0] = 9;
        assert_eq!(Block::parse(&bytes), Err(CodecError::Invalid("block kind")));
    }
}
