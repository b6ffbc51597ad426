// src/core/mod.rs
// Core domain: addresses, transactions and trace trees.

pub mod address;
pub mod trace;
pub mod transaction;

pub use address::{AccountId, AddressError};
pub use trace::{
    collect_additional_info, InformationSource, NftSaleContract, Trace, TraceAdditionalInfo,
};
pub use transaction::{ContractInterface, DecodedBody, Message, MsgOperation, Transaction};
