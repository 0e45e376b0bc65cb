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

//! Immutable signed transaction.
//!
//! Wire layout (little-endian):
//! type(1) | subtype<<4 | version(1) | timestamp(8) | deadline(2) | sender public key(32)
//! | recipient id(8) + id2(4) | amount(8) | fee(8) | referenced full hash(32)
//! | signature(64) | appendage flags(4) | EC block height(4) | EC block id(8)
//! | attachment | appendages in flag order
//!
//! The signed bytes are the same layout with a zero signature and the prunable message in
//! hash-only form. `full_hash = SHA-256(SHA-256(signed bytes) || SHA-256(signature))` and the
//! id is the little-endian u64 of its first 8 bytes; both are fixed at construction.

use serde::{Deserialize, Serialize};

use crate::core::params::{MAX_TRANSACTION_BYTES, TRANSACTION_VERSION};
use crate::core::security::crypto::{sha256, sha256_concat, verify, SecretPhrase};
use crate::core::tx::appendix::{
    flags, Attachment, EncryptedMessageAppendix, MessageAppendix, PhasingAppendix,
    PrunablePlainMessage, PublicKeyAnnouncement,
};
use crate::core::tx::{TxKind, ValidationError};
use crate::core::types::{ByteReader, ByteWriter, CodecError, FullId, PublicKey, Signature, H256};

#[derive(Clone, Debug, PartialEq, Eq)]
struct TxData {
    kind: TxKind,
    version: u8,
    timestamp: u64,
    deadline: u16,
    sender_public_key: PublicKey,
    recipient: Option<FullId>,
    amount: i64,
    fee: i64,
    referenced_full_hash: Option<H256>,
    signature: Signature,
    ec_block_height: u32,
    ec_block_id: u64,
    attachment: Attachment,
    message: Option<MessageAppendix>,
    encrypted_message: Option<EncryptedMessageAppendix>,
    public_key_announcement: Option<PublicKeyAnnouncement>,
    phasing: Option<PhasingAppendix>,
    prunable_plain_message: Option<PrunablePlainMessage>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Form {
    Full,
    Signed,
}

impl TxData {
    fn flags(&self) -> u32 {
        let mut f = 0;
        if self.message.is_some() {
            f |= flags::MESSAGE;
        }
        if self.encrypted_message.is_some() {
            f |= flags::ENCRYPTED_MESSAGE;
        }
        if self.public_key_announcement.is_some() {
            f |= flags::PUBLIC_KEY_ANNOUNCEMENT;
        }
        if self.phasing.is_some() {
            f |= flags::PHASING;
        }
        if self.prunable_plain_message.is_some() {
            f |= flags::PRUNABLE_PLAIN_MESSAGE;
        }
        f
    }

    fn encode(&self, form: Form) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(256);
        w.put_u8(self.kind.ty);
        w.put_u8((self.kind.subtype << 4) | (self.version & 0x0f));
        w.put_u64(self.timestamp);
        w.put_u16(self.deadline);
        w.put_bytes(self.sender_public_key.as_bytes());
        let recipient = self.recipient.unwrap_or_default();
        w.put_u64(recipient.id);
        w.put_u32(recipient.id2);
        w.put_i64(self.amount);
        w.put_i64(self.fee);
        w.put_bytes(self.referenced_full_hash.unwrap_or(H256::ZERO).as_bytes());
        match form {
            Form::Full => w.put_bytes(self.signature.as_bytes()),
            Form::Signed => w.put_bytes(Signature::ZERO.as_bytes()),
        }
        w.put_u32(self.flags());
        w.put_u32(self.ec_block_height);
        w.put_u64(self.ec_block_id);
        self.attachment.encode(&mut w);
        if let Some(a) = &self.message {
            a.encode(&mut w);
        }
        if let Some(a) = &self.encrypted_message {
            a.encode(&mut w);
        }
        if let Some(a) = &self.public_key_announcement {
            a.encode(&mut w);
        }
        if let Some(a) = &self.phasing {
            a.encode(&mut w);
        }
        if let Some(a) = &self.prunable_plain_message {
            a.encode(&mut w, form == Form::Full);
        }
        w.into_bytes()
    }
}

/// A signed (or, for the coinbase, unsigned) transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "TransactionJson", try_from = "TransactionJson")]
pub struct Transaction {
    data: TxData,
    id: u64,
    full_hash: H256,
    sender_id: FullId,
    size: usize,
}

impl Transaction {
    fn from_data(data: TxData) -> Self {
        let signed = data.encode(Form::Signed);
        let size = data.encode(Form::Full).len();
        let full_hash = H256::from_bytes(sha256_concat(&[
            &sha256(&signed),
            &sha256(data.signature.as_bytes()),
        ]));
        Self {
            id: full_hash.id_prefix(),
            sender_id: FullId::from_public_key(&data.sender_public_key),
            full_hash,
            size,
            data,
        }
    }

    /// Parse wire bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() > MAX_TRANSACTION_BYTES {
            return Err(CodecError::TooLarge);
        }
        let mut r = ByteReader::new(bytes);
        let ty = r.get_u8()?;
        let sv = r.get_u8()?;
        let kind = TxKind::new(ty, sv >> 4);
        let version = sv & 0x0f;
        let timestamp = r.get_u64()?;
        let deadline = r.get_u16()?;
        let sender_public_key = PublicKey::from_bytes(r.get_array()?);
        let recipient = FullId::new(r.get_u64()?, r.get_u32()?);
        let amount = r.get_i64()?;
        let fee = r.get_i64()?;
        let referenced = H256::from_bytes(r.get_array()?);
        let signature = Signature::from_bytes(r.get_array()?);
        let f = r.get_u32()?;
        if f & !flags::ALL != 0 {
            return Err(CodecError::Invalid("appendage flags"));
        }
        let ec_block_height = r.get_u32()?;
        let ec_block_id = r.get_u64()?;
        let attachment = Attachment::decode(kind, &mut r)?;
        let message = (f & flags::MESSAGE != 0)
            .then(|| MessageAppendix::decode(&mut r))
            .transpose()?;
        let encrypted_message = (f & flags::ENCRYPTED_MESSAGE != 0)
            .then(|| EncryptedMessageAppendix::decode(&mut r))
            .transpose()?;
        let public_key_announcement = (f & flags::PUBLIC_KEY_ANNOUNCEMENT != 0)
            .then(|| PublicKeyAnnouncement::decode(&mut r))
            .transpose()?;
        let phasing = (f & flags::PHASING != 0)
            .then(|| PhasingAppendix::decode(&mut r))
            .transpose()?;
        let prunable_plain_message = (f & flags::PRUNABLE_PLAIN_MESSAGE != 0)
            .then(|| PrunablePlainMessage::decode(&mut r))
            .transpose()?;
        r.finish()?;

        Ok(Self::from_data(TxData {
            kind,
            version,
            timestamp,
            deadline,
            sender_public_key,
            recipient: (!recipient.is_zero()).then_some(recipient),
            amount,
            fee,
            referenced_full_hash: (!referenced.is_zero()).then_some(referenced),
            signature,
            ec_block_height,
            ec_block_id,
            attachment,
            message,
            encrypted_message,
            public_key_announcement,
            phasing,
            prunable_plain_message,
        }))
    }

    /// Full wire bytes.
    pub fn bytes(&self) -> Vec<u8> {
        self.data.encode(Form::Full)
    }

    /// Bytes covered by the signature.
    pub fn signed_bytes(&self) -> Vec<u8> {
        self.data.encode(Form::Signed)
    }

    /// JSON mirror.
    pub fn to_json(&self) -> Result<String, ValidationError> {
        serde_json::to_string(self).map_err(|e| ValidationError::not_valid(format!("json: {e}")))
    }

    /// Parse the JSON mirror.
    pub fn from_json(s: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(s).map_err(|e| ValidationError::not_valid(format!("json: {e}")))
    }

    /// Signature check; the coinbase must carry no signature.
    pub fn verify_signature(&self) -> bool {
        if self.data.kind.is_coinbase() {
            return self.data.signature.is_zero();
        }
        verify(&self.data.signature, &self.signed_bytes(), &self.data.sender_public_key)
    }

    /// Id.
    pub fn id(&self) -> u64 {
        self.id
    }
    /// Full hash.
    pub fn full_hash(&self) -> H256 {
        self.full_hash
    }
    /// Encoded length.
    pub fn size(&self) -> usize {
        self.size
    }
    /// (type, subtype).
    pub fn kind(&self) -> TxKind {
        self.data.kind
    }
    /// Format version.
    pub fn version(&self) -> u8 {
        self.data.version
    }
    /// Creation time (epoch seconds).
    pub fn timestamp(&self) -> u64 {
        self.data.timestamp
    }
    /// Lifetime in minutes.
    pub fn deadline(&self) -> u16 {
        self.data.deadline
    }
    /// Last second at which the transaction may be included.
    pub fn expiration(&self) -> u64 {
        self.data.timestamp.saturating_add(self.data.deadline as u64 * 60)
    }
    /// Sender key.
    pub fn sender_public_key(&self) -> &PublicKey {
        &self.data.sender_public_key
    }
    /// Sender account.
    pub fn sender_id(&self) -> FullId {
        self.sender_id
    }
    /// Recipient account.
    pub fn recipient(&self) -> Option<FullId> {
        self.data.recipient
    }
    /// Amount (NQT).
    pub fn amount(&self) -> i64 {
        self.data.amount
    }
    /// Fee (NQT).
    pub fn fee(&self) -> i64 {
        self.data.fee
    }
    /// Amount plus fee, if it does not overflow.
    pub fn amount_plus_fee(&self) -> Option<i64> {
        self.data.amount.checked_add(self.data.fee)
    }
    /// Referenced transaction.
    pub fn referenced_full_hash(&self) -> Option<H256> {
        self.data.referenced_full_hash
    }
    /// Signature.
    pub fn signature(&self) -> &Signature {
        &self.data.signature
    }
    /// Economic clustering pin: height.
    pub fn ec_block_height(&self) -> u32 {
        self.data.ec_block_height
    }
    /// Economic clustering pin: block id.
    pub fn ec_block_id(&self) -> u64 {
        self.data.ec_block_id
    }
    /// Typed payload.
    pub fn attachment(&self) -> &Attachment {
        &self.data.attachment
    }
    /// Plain message.
    pub fn message(&self) -> Option<&MessageAppendix> {
        self.data.message.as_ref()
    }
    /// Encrypted message.
    pub fn encrypted_message(&self) -> Option<&EncryptedMessageAppendix> {
        self.data.encrypted_message.as_ref()
    }
    /// Recipient key announcement.
    pub fn public_key_announcement(&self) -> Option<&PublicKeyAnnouncement> {
        self.data.public_key_announcement.as_ref()
    }
    /// Phasing.
    pub fn phasing(&self) -> Option<&PhasingAppendix> {
        self.data.phasing.as_ref()
    }
    /// Prunable message.
    pub fn prunable_plain_message(&self) -> Option<&PrunablePlainMessage> {
        self.data.prunable_plain_message.as_ref()
    }

    /// Combined fee of the optional appendages.
    pub fn appendages_fee(&self) -> i64 {
        let mut fee = 0i64;
        if let Some(a) = &self.data.message {
            fee = fee.saturating_add(a.fee());
        }
        if let Some(a) = &self.data.encrypted_message {
            fee = fee.saturating_add(a.fee());
        }
        if let Some(a) = &self.data.phasing {
            fee = fee.saturating_add(a.fee());
        }
        if let Some(a) = &self.data.prunable_plain_message {
            fee = fee.saturating_add(a.fee());
        }
        fee
    }
}

/// Builds and signs transactions.
pub struct TransactionBuilder {
    data: TxData,
}

impl TransactionBuilder {
    /// Start a transaction of the attachment's kind; deadline defaults to one day.
    pub fn new(sender_public_key: PublicKey, attachment: Attachment) -> Self {
        Self {
            data: TxData {
                kind: attachment.kind(),
                version: TRANSACTION_VERSION,
                timestamp: 0,
                deadline: 1440,
                sender_public_key,
                recipient: None,
                amount: 0,
                fee: 0,
                referenced_full_hash: None,
                signature: Signature::ZERO,
                ec_block_height: 0,
                ec_block_id: 0,
                attachment,
                message: None,
                encrypted_message: None,
                public_key_announcement: None,
                phasing: None,
                prunable_plain_message: None,
            },
        }
    }

    /// Creation time.
    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.data.timestamp = timestamp;
        self
    }
    /// Lifetime in minutes.
    pub fn deadline(mut self, deadline: u16) -> Self {
        self.data.deadline = deadline;
        self
    }
    /// Recipient.
    pub fn recipient(mut self, recipient: FullId) -> Self {
        self.data.recipient = Some(recipient);
        self
    }
    /// Amount.
    pub fn amount(mut self, amount: i64) -> Self {
        self.data.amount = amount;
        self
    }
    /// Fee.
    pub fn fee(mut self, fee: i64) -> Self {
        self.data.fee = fee;
        self
    }
    /// Reference a confirmed transaction.
    pub fn referenced(mut self, full_hash: H256) -> Self {
        self.data.referenced_full_hash = Some(full_hash);
        self
    }
    /// Economic clustering pin.
    pub fn ec_block(mut self, height: u32, id: u64) -> Self {
        self.data.ec_block_height = height;
        self.data.ec_block_id = id;
        self
    }
    /// Plain message.
    pub fn message(mut self, message: Vec<u8>, is_text: bool) -> Self {
        self.data.message = Some(MessageAppendix { message, is_text });
        self
    }
    /// Encrypted message.
    pub fn encrypted_message(mut self, m: EncryptedMessageAppendix) -> Self {
        self.data.encrypted_message = Some(m);
        self
    }
    /// Announce the recipient's key.
    pub fn public_key_announcement(mut self, public_key: PublicKey) -> Self {
        self.data.public_key_announcement = Some(PublicKeyAnnouncement { public_key });
        self
    }
    /// Phase the transaction.
    pub fn phasing(mut self, phasing: PhasingAppendix) -> Self {
        self.data.phasing = Some(phasing);
        self
    }
    /// Prunable plain message.
    pub fn prunable_message(mut self, message: Vec<u8>, is_text: bool) -> Self {
        self.data.prunable_plain_message = Some(PrunablePlainMessage::new(message, is_text));
        self
    }

    /// Finish without a signature (coinbase).
    pub fn build_unsigned(self) -> Result<Transaction, ValidationError> {
        let tx = Transaction::from_data(self.data);
        if tx.size() > MAX_TRANSACTION_BYTES {
            return Err(ValidationError::not_valid("transaction too large"));
        }
        Ok(tx)
    }

    /// Sign with the sender's secret.
    pub fn sign(mut self, secret: &SecretPhrase) -> Result<Transaction, ValidationError> {
        let pk = secret
            .public_key()
            .map_err(|_| ValidationError::not_valid("secret phrase"))?;
        if pk != self.data.sender_public_key {
            return Err(ValidationError::not_valid("secret does not match sender"));
        }
        let signed = self.data.encode(Form::Signed);
        self.data.signature = secret
            .sign(&signed)
            .map_err(|_| ValidationError::not_valid("signing failed"))?;
        self.build_unsigned()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionJson {
    #[serde(rename = "type")]
    ty: u8,
    subtype: u8,
    version: u8,
    timestamp: u64,
    deadline: u16,
    sender_public_key: PublicKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recipient: Option<FullId>,
    amount: i64,
    fee: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    referenced_transaction_full_hash: Option<H256>,
    signature: Signature,
    ec_block_height: u32,
    ec_block_id: u64,
    attachment: Attachment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<MessageAppendix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encrypted_message: Option<EncryptedMessageAppendix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    public_key_announcement: Option<PublicKeyAnnouncement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    phasing: Option<PhasingAppendix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prunable_plain_message: Option<PrunablePlainMessage>,
}

impl From<Transaction> for TransactionJson {
    fn from(tx: Transaction) -> Self {
        let d = tx.data;
        Self {
            ty: d.kind.ty,
            subtype: d.kind.subtype,
            version: d.version,
            timestamp: d.timestamp,
            deadline: d.deadline,
            sender_public_key: d.sender_public_key,
            recipient: d.recipient,
            amount: d.amount,
            fee: d.fee,
            referenced_transaction_full_hash: d.referenced_full_hash,
            signature: d.signature,
            ec_block_height: d.ec_block_height,
            ec_block_id: d.ec_block_id,
            attachment: d.attachment,
            message: d.message,
            encrypted_message: d.encrypted_message,
            public_key_announcement: d.public_key_announcement,
            phasing: d.phasing,
            prunable_plain_message: d.prunable_plain_message,
        }
    }
}

impl TryFrom<TransactionJson> for Transaction {
    type Error = ValidationError;

    fn try_from(j: TransactionJson) -> Result<Self, Self::Error> {
        let kind = TxKind::new(j.ty, j.subtype);
        if j.attachment.kind() != kind {
            return Err(ValidationError::not_valid("attachment does not match type"));
        }
        if j.subtype > 0x0f || j.version > 0x0f {
            return Err(ValidationError::not_valid("subtype or version out of range"));
        }
        Ok(Transaction::from_data(TxData {
            kind,
            version: j.version,
            timestamp: j.timestamp,
            deadline: j.deadline,
            sender_public_key: j.sender_public_key,
            recipient: j.recipient.filter(|r| !r.is_zero()),
            amount: j.amount,
            fee: j.fee,
            referenced_full_hash: j.referenced_transaction_full_hash.filter(|h| !h.is_zero()),
            signature: j.signature,
            ec_block_height: j.ec_block_height,
            ec_block_id: j.ec_block_id,
            attachment: j.attachment,
            message: j.message,
            encrypted_message: j.encrypted_message,
            public_key_announcement: j.public_key_announcement,
            phasing: j.phasing,
            prunable_plain_message: j.prunable_plain_message,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::params::ONE_COIN;

    fn payment() -> (SecretPhrase, Transaction) {
        let secret = SecretPhrase::new("alice");
        let pk = secret.public_key().unwrap();
        let tx = TransactionBuilder::new(pk, Attachment::OrdinaryPayment)
            .timestamp(1_000)
            .recipient(FullId::new(5, 6))
            .amount(10 * ONE_COIN)
            .fee(ONE_COIN)
            .ec_block(0, 77)
            .message(b"thanks".to_vec(), true)
            .prunable_message(b"prunable".to_vec(), true)
            .sign(&secret)
            .unwrap();
        (secret, tx)
    }

    #[test]
    fn signed_transaction_verifies_and_reparses() {
        let (_, tx) = payment();
        assert!(tx.verify_signature());
        let back = Transaction::parse(&tx.bytes()).unwrap();
        assert_eq!(back, tx);
        assert_eq!(back.id(), tx.full_hash().id_prefix());
    }

    #[test]
    fn json_mirror_reproduces_bytes() {
        let (_, tx) = payment();
        let back = Transaction::from_json(&tx.to_json().unwrap()).unwrap();
        assert_eq!(back.bytes(), tx.bytes());
    }

    #[test]
    fn pruned_body_keeps_identity() {
        let (_, tx) = payment();
        let mut bytes = tx.bytes();
        // strip the prunable body: keep hash + text flag, then "absent"
        let body_len = 1 + 4 + b"prunable".len();
        bytes.truncate(bytes.len() - body_len);
        bytes.push(0);
        let pruned = Transaction::parse(&bytes).unwrap();
        assert_eq!(pruned.full_hash(), tx.full_hash());
        assert!(pruned.verify_signature());
    }

    #[test]
    fn tampering_breaks_signature() {
        let (_, tx) = payment();
        let mut bytes = tx.bytes();
        bytes[60] ^= 1;
        let tampered = Transaction::parse(&bytes).unwrap();
        assert!(!tampered.verify_signature());
    }

    #[test]
    fn wrong_secret_cannot_sign() {
        let pk = SecretPhrase::new("alice").public_key().unwrap();
        let err = TransactionBuilder::new(pk, Attachment::OrdinaryPayment)
            .sign(&SecretPhrase::new("mallory"))
            .unwrap_err();
        assert!(matches!(err, ValidationError::NotValid(_)));
    }
}
