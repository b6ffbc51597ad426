// src/core/transaction.rs
// Ledger transactions and messages as delivered by the upstream
// tree builder. ABI decoding and interface detection happen there;
// this module only carries their results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::address::AccountId;

/// Operations the upstream ABI decoder recognizes in message bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MsgOperation {
    JettonTransfer,
    JettonNotify,
    NftTransfer,
    Excess,
    TextComment,
}

/// Decoded message body: the recognized operation plus whatever fields the
/// decoder extracted, kept as loose JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodedBody {
    pub operation: MsgOperation,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub created_lt: u64,
    pub source: Option<AccountId>,
    pub destination: Option<AccountId>,
    pub value: i64,
    /// Present only when the upstream decoder recognized the body.
    pub decoded_body: Option<DecodedBody>,
}

/// Capability tags the upstream interface detector assigned to an account.
/// Classification elsewhere is plain membership checks over this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractInterface {
    JettonWallet,
    JettonMaster,
    NftItem,
    /// Generic "get_sale_data" sale contract.
    NftSale,
    /// The getgems marketplace variant of a sale contract.
    NftSaleGetgems,
    WalletV4,
}

/// One ledger transaction inside a trace.
///
/// `out_msgs` is a filtered copy: outbound messages already matched to a
/// child trace are removed by the tree builder, so only messages whose
/// effect has not been observed yet remain here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub account: AccountId,
    pub lt: u64,
    pub success: bool,
    pub utime: DateTime<Utc>,
    pub in_msg: Option<Message>,
    pub out_msgs: Vec<Message>,
}
