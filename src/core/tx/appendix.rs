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

//! Attachments and appendages.
//!
//! Every attachment/appendage is written as a version byte (currently 1) followed by its body.
//! Variable-length fields carry their own length prefix, so each appendage is self-delimiting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::ledger::phasing::{PhasingParams, VotingModel};
use crate::core::params::*;
use crate::core::security::crypto::sha256_concat;
use crate::core::tx::fee::{MESSAGE_FEE, PHASING_FEE, PRUNABLE_MESSAGE_FEE};
use crate::core::tx::TxKind;
use crate::core::types::{ByteReader, ByteWriter, CodecError, FullId, PublicKey, H256};

const APPENDIX_VERSION: u8 = 1;

/// Flag bits announcing optional appendages, in wire order.
pub mod flags {
    /// Plain message.
    pub const MESSAGE: u32 = 1;
    /// Encrypted message.
    pub const ENCRYPTED_MESSAGE: u32 = 1 << 1;
    /// Recipient public key announcement.
    pub const PUBLIC_KEY_ANNOUNCEMENT: u32 = 1 << 2;
    /// Phasing.
    pub const PHASING: u32 = 1 << 3;
    /// Prunable plain message.
    pub const PRUNABLE_PLAIN_MESSAGE: u32 = 1 << 4;
    /// Every known bit.
    pub const ALL: u32 = MESSAGE | ENCRYPTED_MESSAGE | PUBLIC_KEY_ANNOUNCEMENT | PHASING | PRUNABLE_PLAIN_MESSAGE;
}

/// Typed payload; the variant determines the transaction's (type, subtype).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Attachment {
    /// Plain payment.
    OrdinaryPayment,
    /// Carrier for message appendages.
    ArbitraryMessage,
    /// Register or update an alias.
    #[serde(rename_all = "camelCase")]
    AliasAssignment { alias: String, uri: String },
    /// Create a poll.
    #[serde(rename_all = "camelCase")]
    PollCreation {
        name: String,
        description: String,
        finish_height: u32,
        options: Vec<String>,
        min_options: u8,
        max_options: u8,
    },
    /// Vote in a poll.
    #[serde(rename_all = "camelCase")]
    VoteCasting { poll_id: u64, choices: Vec<u8> },
    /// Approve phased transactions.
    #[serde(rename_all = "camelCase")]
    PhasingVoteCasting { transaction_full_hashes: Vec<H256> },
    /// Set account name and description.
    AccountInfo { name: String, description: String },
    /// Offer an alias for sale, or transfer it for free to the recipient.
    #[serde(rename_all = "camelCase")]
    AliasSell { alias: String, price: i64 },
    /// Buy an offered alias.
    AliasBuy { alias: String },
    /// Delete an owned alias.
    AliasDelete { alias: String },
    /// Set a property on the recipient (or the sender).
    AccountProperty { property: String, value: String },
    /// Delete a property the sender set.
    AccountPropertyDelete { property: String },
    /// Issue an asset.
    #[serde(rename_all = "camelCase")]
    AssetIssuance {
        name: String,
        description: String,
        quantity: i64,
        decimals: u8,
    },
    /// Transfer asset quantity to the recipient.
    #[serde(rename_all = "camelCase")]
    AssetTransfer { asset_id: u64, quantity: i64 },
    /// Pay holders (as of `height`) per unit held.
    #[serde(rename_all = "camelCase")]
    DividendPayment {
        asset_id: u64,
        height: u32,
        amount_per_quantity: i64,
    },
    /// Burn asset quantity.
    #[serde(rename_all = "camelCase")]
    AssetDelete { asset_id: u64, quantity: i64 },
    /// Lease forging stake to the recipient.
    EffectiveBalanceLeasing { period: u16 },
    /// Require (or, with voting model `None`, stop requiring) phasing on outgoing transactions.
    SetPhasingOnly { params: PhasingParams },
    /// Block reward distribution.
    Coinbase { recipients: BTreeMap<FullId, i64> },
}

fn put_params(w: &mut ByteWriter, p: &PhasingParams) {
    w.put_u8(p.voting_model.code());
    w.put_i64(p.quorum);
    w.put_i64(p.min_balance);
    w.put_u8(p.whitelist.len().min(u8::MAX as usize) as u8);
    for id in p.whitelist.iter().take(u8::MAX as usize) {
        w.put_u64(id.id);
        w.put_u32(id.id2);
    }
}

fn get_params(r: &mut ByteReader<'_>) -> Result<PhasingParams, CodecError> {
    let voting_model = VotingModel::from_code(r.get_u8()?).ok_or(CodecError::Invalid("voting model"))?;
    let quorum = r.get_i64()?;
    let min_balance = r.get_i64()?;
    let n = r.get_u8()? as usize;
    if n > MAX_PHASING_WHITELIST_SIZE {
        return Err(CodecError::TooLarge);
    }
    let mut whitelist = Vec::with_capacity(n);
    for _ in 0..n {
        whitelist.push(FullId::new(r.get_u64()?, r.get_u32()?));
    }
    Ok(PhasingParams {
        voting_model,
        quorum,
        min_balance,
        whitelist,
    })
}

fn put_bounded_strings(w: &mut ByteWriter, items: &[String]) {
    w.put_u8(items.len().min(u8::MAX as usize) as u8);
    for s in items.iter().take(u8::MAX as usize) {
        w.put_string(s);
    }
}

impl Attachment {
    /// (type, subtype) this attachment belongs to.
    pub fn kind(&self) -> TxKind {
        match self {
            Attachment::OrdinaryPayment => TxKind::ORDINARY_PAYMENT,
            Attachment::ArbitraryMessage => TxKind::ARBITRARY_MESSAGE,
            Attachment::AliasAssignment { .. } => TxKind::ALIAS_ASSIGNMENT,
            Attachment::PollCreation { .. } => TxKind::POLL_CREATION,
            Attachment::VoteCasting { .. } => TxKind::VOTE_CASTING,
            Attachment::PhasingVoteCasting { .. } => TxKind::PHASING_VOTE_CASTING,
            Attachment::AccountInfo { .. } => TxKind::ACCOUNT_INFO,
            Attachment::AliasSell { .. } => TxKind::ALIAS_SELL,
            Attachment::AliasBuy { .. } => TxKind::ALIAS_BUY,
            Attachment::AliasDelete { .. } => TxKind::ALIAS_DELETE,
            Attachment::AccountProperty { .. } => TxKind::ACCOUNT_PROPERTY,
            Attachment::AccountPropertyDelete { .. } => TxKind::ACCOUNT_PROPERTY_DELETE,
            Attachment::AssetIssuance { .. } => TxKind::ASSET_ISSUANCE,
            Attachment::AssetTransfer { .. } => TxKind::ASSET_TRANSFER,
            Attachment::DividendPayment { .. } => TxKind::DIVIDEND_PAYMENT,
            Attachment::AssetDelete { .. } => TxKind::ASSET_DELETE,
            Attachment::EffectiveBalanceLeasing { .. } => TxKind::EFFECTIVE_BALANCE_LEASING,
            Attachment::SetPhasingOnly { .. } => TxKind::SET_PHASING_ONLY,
            Attachment::Coinbase { .. } => TxKind::COINBASE,
        }
    }

    /// Write version byte and body.
    pub fn encode(&self, w: &mut ByteWriter) {
        w.put_u8(APPENDIX_VERSION);
        match self {
            Attachment::OrdinaryPayment | Attachment::ArbitraryMessage => {}
            Attachment::AliasAssignment { alias, uri } => {
                w.put_string(alias);
                w.put_string(uri);
            }
            Attachment::PollCreation {
                name,
                description,
                finish_height,
                options,
                min_options,
                max_options,
            } => {
                w.put_string(name);
                w.put_string(description);
                w.put_u32(*finish_height);
                put_bounded_strings(w, options);
                w.put_u8(*min_options);
                w.put_u8(*max_options);
            }
            Attachment::VoteCasting { poll_id, choices } => {
                w.put_u64(*poll_id);
                w.put_u8(choices.len().min(u8::MAX as usize) as u8);
                w.put_bytes(&choices[..choices.len().min(u8::MAX as usize)]);
            }
            Attachment::PhasingVoteCasting {
                transaction_full_hashes,
            } => {
                w.put_u8(transaction_full_hashes.len().min(u8::MAX as usize) as u8);
                for h in transaction_full_hashes.iter().take(u8::MAX as usize) {
                    w.put_bytes(h.as_bytes());
                }
            }
            Attachment::AccountInfo { name, description } => {
                w.put_string(name);
                w.put_string(description);
            }
            Attachment::AliasSell { alias, price } => {
                w.put_string(alias);
                w.put_i64(*price);
            }
            Attachment::AliasBuy { alias } | Attachment::AliasDelete { alias } => {
                w.put_string(alias);
            }
            Attachment::AccountProperty { property, value } => {
                w.put_string(property);
                w.put_string(value);
            }
            Attachment::AccountPropertyDelete { property } => {
                w.put_string(property);
            }
            Attachment::AssetIssuance {
                name,
                description,
                quantity,
                decimals,
            } => {
                w.put_string(name);
                w.put_string(description);
                w.put_i64(*quantity);
                w.put_u8(*decimals);
            }
            Attachment::AssetTransfer { asset_id, quantity }
            | Attachment::AssetDelete { asset_id, quantity } => {
                w.put_u64(*asset_id);
                w.put_i64(*quantity);
            }
            Attachment::DividendPayment {
                asset_id,
                height,
                amount_per_quantity,
            } => {
                w.put_u64(*asset_id);
                w.put_u32(*height);
                w.put_i64(*amount_per_quantity);
            }
            Attachment::EffectiveBalanceLeasing { period } => {
                w.put_u16(*period);
            }
            Attachment::SetPhasingOnly { params } => put_params(w, params),
            Attachment::Coinbase { recipients } => {
                w.put_u16(recipients.len().min(u16::MAX as usize) as u16);
                for (id, amount) in recipients.iter().take(u16::MAX as usize) {
                    w.put_u64(id.id);
                    w.put_u32(id.id2);
                    w.put_i64(*amount);
                }
            }
        }
    }

    /// Parse the attachment of a transaction of `kind`.
    pub fn decode(kind: TxKind, r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        if r.get_u8()? != APPENDIX_VERSION {
            return Err(CodecError::Invalid("attachment version"));
        }
        let a = match kind {
            TxKind::ORDINARY_PAYMENT => Attachment::OrdinaryPayment,
            TxKind::ARBITRARY_MESSAGE => Attachment::ArbitraryMessage,
            TxKind::ALIAS_ASSIGNMENT => Attachment::AliasAssignment {
                alias: r.get_string(MAX_ALIAS_LENGTH)?,
                uri: r.get_string(MAX_ALIAS_URI_LENGTH)?,
            },
            TxKind::POLL_CREATION => {
                let name = r.get_string(MAX_POLL_NAME_LENGTH)?;
                let description = r.get_string(MAX_POLL_DESCRIPTION_LENGTH)?;
                let finish_height = r.get_u32()?;
                let n = r.get_u8()? as usize;
                if n > MAX_POLL_OPTION_COUNT {
                    return Err(CodecError::TooLarge);
                }
                let mut options = Vec::with_capacity(n);
                for _ in 0..n {
                    options.push(r.get_string(MAX_POLL_OPTION_LENGTH)?);
                }
                Attachment::PollCreation {
                    name,
                    description,
                    finish_height,
                    options,
                    min_options: r.get_u8()?,
                    max_options: r.get_u8()?,
                }
            }
            TxKind::VOTE_CASTING => {
                let poll_id = r.get_u64()?;
                let n = r.get_u8()? as usize;
                if n > MAX_POLL_OPTION_COUNT {
                    return Err(CodecError::TooLarge);
                }
                Attachment::VoteCasting {
                    poll_id,
                    choices: r.get_bytes(n)?,
                }
            }
            TxKind::PHASING_VOTE_CASTING => {
                let n = r.get_u8()? as usize;
                if n > MAX_PHASING_VOTE_TRANSACTIONS {
                    return Err(CodecError::TooLarge);
                }
                let mut transaction_full_hashes = Vec::with_capacity(n);
                for _ in 0..n {
                    transaction_full_hashes.push(H256::from_bytes(r.get_array()?));
                }
                Attachment::PhasingVoteCasting {
                    transaction_full_hashes,
                }
            }
            TxKind::ACCOUNT_INFO => Attachment::AccountInfo {
                name: r.get_string(MAX_ACCOUNT_NAME_LENGTH)?,
                description: r.get_string(MAX_ACCOUNT_DESCRIPTION_LENGTH)?,
            },
            TxKind::ALIAS_SELL => Attachment::AliasSell {
                alias: r.get_string(MAX_ALIAS_LENGTH)?,
                price: r.get_i64()?,
            },
            TxKind::ALIAS_BUY => Attachment::AliasBuy {
                alias: r.get_string(MAX_ALIAS_LENGTH)?,
            },
            TxKind::ALIAS_DELETE => Attachment::AliasDelete {
                alias: r.get_string(MAX_ALIAS_LENGTH)?,
            },
            TxKind::ACCOUNT_PROPERTY => Attachment::AccountProperty {
                property: r.get_string(MAX_PROPERTY_NAME_LENGTH)?,
                value: r.get_string(MAX_PROPERTY_VALUE_LENGTH)?,
            },
            TxKind::ACCOUNT_PROPERTY_DELETE => Attachment::AccountPropertyDelete {
                property: r.get_string(MAX_PROPERTY_NAME_LENGTH)?,
            },
            TxKind::ASSET_ISSUANCE => Attachment::AssetIssuance {
                name: r.get_string(MAX_ASSET_NAME_LENGTH)?,
                description: r.get_string(MAX_ASSET_DESCRIPTION_LENGTH)?,
                quantity: r.get_i64()?,
                decimals: r.get_u8()?,
            },
            TxKind::ASSET_TRANSFER => Attachment::AssetTransfer {
                asset_id: r.get_u64()?,
                quantity: r.get_i64()?,
            },
            TxKind::ASSET_DELETE => Attachment::AssetDelete {
                asset_id: r.get_u64()?,
                quantity: r.get_i64()?,
            },
            TxKind::DIVIDEND_PAYMENT => Attachment::DividendPayment {
                asset_id: r.get_u64()?,
                height: r.get_u32()?,
                amount_per_quantity: r.get_i64()?,
            },
            TxKind::EFFECTIVE_BALANCE_LEASING => Attachment::EffectiveBalanceLeasing {
                period: r.get_u16()?,
            },
            TxKind::SET_PHASING_ONLY => Attachment::SetPhasingOnly {
                params: get_params(r)?,
            },
            TxKind::COINBASE => {
                let n = r.get_u16()? as usize;
                let mut recipients = BTreeMap::new();
                for _ in 0..n {
                    let id = FullId::new(r.get_u64()?, r.get_u32()?);
                    if recipients.insert(id, r.get_i64()?).is_some() {
                        return Err(CodecError::Invalid("duplicate coinbase recipient"));
                    }
                }
                Attachment::Coinbase { recipients }
            }
            _ => return Err(CodecError::Invalid("transaction type")),
        };
        Ok(a)
    }

    /// Encoded body length (without the version byte), used for size-based fees.
    pub fn body_size(&self) -> usize {
        let mut w = ByteWriter::new();
        self.encode(&mut w);
        w.len().saturating_sub(1)
    }
}

/// Plain message appendage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAppendix {
    /// Body, hex in JSON.
    #[serde(with = "hex::serde")]
    pub message: Vec<u8>,
    /// UTF-8 text flag.
    pub is_text: bool,
}

/// Encrypted message appendage; the ciphertext is opaque to the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedMessageAppendix {
    /// Ciphertext.
    #[serde(with = "hex::serde")]
    pub data: Vec<u8>,
    /// Encryption nonce.
    pub nonce: H256,
    /// Plaintext was UTF-8.
    pub is_text: bool,
}

/// Announces the recipient's public key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyAnnouncement {
    /// Recipient key.
    pub public_key: PublicKey,
}

/// Defers execution to a poll.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhasingAppendix {
    /// Decision height.
    pub finish_height: u32,
    /// Poll parameters.
    pub params: PhasingParams,
}

/// Plain message whose body may be pruned; signatures cover only its hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrunablePlainMessage {
    /// `SHA-256(is_text || message)`.
    pub hash: H256,
    /// Body, while not pruned.
    #[serde(default, with = "opt_hex")]
    pub message: Option<Vec<u8>>,
    /// UTF-8 text flag.
    pub is_text: bool,
}

mod opt_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(b) => s.serialize_some(&hex::encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let s: Option<String> = Option::deserialize(d)?;
        s.map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

impl MessageAppendix {
    pub(crate) fn encode(&self, w: &mut ByteWriter) {
        w.put_u8(APPENDIX_VERSION);
        w.put_u8(self.is_text as u8);
        w.put_blob(&self.message);
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        expect_version(r)?;
        let is_text = get_bool(r)?;
        let message = r.get_blob(MAX_ARBITRARY_MESSAGE_LENGTH)?;
        Ok(Self { message, is_text })
    }

    /// Fee for this appendage.
    pub fn fee(&self) -> i64 {
        MESSAGE_FEE.compute(self.message.len())
    }
}

impl EncryptedMessageAppendix {
    pub(crate) fn encode(&self, w: &mut ByteWriter) {
        w.put_u8(APPENDIX_VERSION);
        w.put_u8(self.is_text as u8);
        w.put_blob(&self.data);
        w.put_bytes(self.nonce.as_bytes());
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        expect_version(r)?;
        let is_text = get_bool(r)?;
        let data = r.get_blob(MAX_ENCRYPTED_MESSAGE_LENGTH)?;
        let nonce = H256::from_bytes(r.get_array()?);
        Ok(Self { data, nonce, is_text })
    }

    /// Fee for this appendage.
    pub fn fee(&self) -> i64 {
        MESSAGE_FEE.compute(self.data.len())
    }
}

impl PublicKeyAnnouncement {
    pub(crate) fn encode(&self, w: &mut ByteWriter) {
        w.put_u8(APPENDIX_VERSION);
        w.put_bytes(self.public_key.as_bytes());
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        expect_version(r)?;
        Ok(Self {
            public_key: PublicKey::from_bytes(r.get_array()?),
        })
    }
}

impl PhasingAppendix {
    pub(crate) fn encode(&self, w: &mut ByteWriter) {
        w.put_u8(APPENDIX_VERSION);
        w.put_u32(self.finish_height);
        put_params(w, &self.params);
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        expect_version(r)?;
        let finish_height = r.get_u32()?;
        let params = get_params(r)?;
        Ok(Self {
            finish_height,
            params,
        })
    }

    /// Fee for this appendage.
    pub fn fee(&self) -> i64 {
        PHASING_FEE.compute(0)
    }
}

impl PrunablePlainMessage {
    /// Message with its hash.
    pub fn new(message: Vec<u8>, is_text: bool) -> Self {
        Self {
            hash: Self::hash_of(&message, is_text),
            message: Some(message),
            is_text,
        }
    }

    /// Commitment over a body.
    pub fn hash_of(message: &[u8], is_text: bool) -> H256 {
        H256::from_bytes(sha256_concat(&[&[is_text as u8], message]))
    }

    /// Write the signed form (hash only) or the full form (hash plus optional body).
    pub(crate) fn encode(&self, w: &mut ByteWriter, with_body: bool) {
        w.put_u8(APPENDIX_VERSION);
        w.put_bytes(self.hash.as_bytes());
        w.put_u8(self.is_text as u8);
        if with_body {
            match &self.message {
                Some(m) => {
                    w.put_u8(1);
                    w.put_blob(m);
                }
                None => w.put_u8(0),
            }
        }
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        expect_version(r)?;
        let hash = H256::from_bytes(r.get_array()?);
        let is_text = get_bool(r)?;
        let message = if get_bool(r)? {
            let m = r.get_blob(MAX_PRUNABLE_MESSAGE_LENGTH)?;
            if Self::hash_of(&m, is_text) != hash {
                return Err(CodecError::Invalid("prunable message hash"));
            }
            Some(m)
        } else {
            None
        };
        Ok(Self {
            hash,
            message,
            is_text,
        })
    }

    /// Fee for this appendage; a pruned body is charged at the minimum.
    pub fn fee(&self) -> i64 {
        PRUNABLE_MESSAGE_FEE.compute(self.message.as_ref().map(|m| m.len()).unwrap_or(0))
    }
}

fn expect_version(r: &mut ByteReader<'_>) -> Result<(), CodecError> {
    if r.get_u8()? != APPENDIX_VERSION {
        return Err(CodecError::Invalid("appendix version"));
    }
    Ok(())
}

fn get_bool(r: &mut ByteReader<'_>) -> Result<bool, CodecError> {
    match r.get_u8()? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(CodecError::Invalid("flag")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_kind_survives_decode() {
        let a = Attachment::DividendPayment {
            asset_id: 9,
            height: 3,
            amount_per_quantity: 100,
        };
        let mut w = ByteWriter::new();
        a.encode(&mut w);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(Attachment::decode(a.kind(), &mut r).unwrap(), a);
        r.finish().unwrap();
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let bytes = [APPENDIX_VERSION];
        let mut r = ByteReader::new(&bytes);
        assert!(Attachment::decode(TxKind::new(7, 7), &mut r).is_err());
    }

    #[test]
    fn prunable_body_must_match_hash() {
        let mut m = PrunablePlainMessage::new(b"hello".to_vec(), true);
        m.hash = H256::from_bytes([1; 32]);
        let mut w = ByteWriter::new();
        m.encode(&mut w, true);
        let bytes = w.into_bytes();
        assert!(PrunablePlainMessage::decode(&mut ByteReader::new(&bytes)).is_err());
    }

    #[test]
    fn attachment_json_is_tagged() {
        let a = Attachment::AliasAssignment {
            alias: "amun".into(),
            uri: "https://amun".into(),
        };
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["kind"], "aliasAssignment");
        let back: Attachment = serde_json::from_value(json).unwrap();
        assert_eq!(back, a);
    }
}
