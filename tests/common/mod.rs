// tests/common/mod.rs
// Shared builders and a scriptable information source for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use trace_indexer::core::{
    AccountId, DecodedBody, InformationSource, Message, MsgOperation, NftSaleContract, Trace,
    Transaction,
};

pub fn account(byte: u8) -> AccountId {
    AccountId::new(0, [byte; 32])
}

pub fn transaction(hash: &str, account: AccountId) -> Transaction {
    Transaction {
        hash: hash.to_string(),
        account,
        lt: 1,
        success: true,
        utime: Utc::now(),
        in_msg: None,
        out_msgs: vec![],
    }
}

pub fn node(hash: &str, account: AccountId) -> Trace {
    Trace {
        transaction: transaction(hash, account),
        account_interfaces: vec![],
        children: vec![],
        additional_info: None,
    }
}

/// An outbound message not yet matched to a child.
pub fn out_msg(destination: AccountId) -> Message {
    Message {
        created_lt: 0,
        source: None,
        destination: Some(destination),
        value: 0,
        decoded_body: None,
    }
}

pub fn jetton_transfer_msg(destination: AccountId) -> Message {
    Message {
        created_lt: 0,
        source: None,
        destination: Some(destination),
        value: 0,
        decoded_body: Some(DecodedBody {
            operation: MsgOperation::JettonTransfer,
            value: serde_json::json!({}),
        }),
    }
}

pub fn sale(price: i64, owner: AccountId) -> NftSaleContract {
    NftSaleContract {
        nft_price: price,
        owner: Some(owner),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    JettonMasters,
    GetGems,
    BasicSales,
}

/// Information source backed by fixed maps, recording every query it gets.
#[derive(Default)]
pub struct MockSource {
    pub masters: HashMap<AccountId, AccountId>,
    pub get_gems: HashMap<AccountId, NftSaleContract>,
    pub basic: HashMap<AccountId, NftSaleContract>,
    pub fail_on: Option<FailOn>,
    pub calls: Mutex<Vec<(&'static str, Vec<AccountId>)>>,
}

#[async_trait]
impl InformationSource for MockSource {
    async fn jetton_masters_for_wallets(
        &self,
        wallets: &[AccountId],
    ) -> Result<HashMap<AccountId, AccountId>> {
        self.calls
            .lock()
            .unwrap()
            .push(("jetton_masters", wallets.to_vec()));
        if self.fail_on == Some(FailOn::JettonMasters) {
            bail!("jetton masters lookup failed");
        }
        Ok(wallets
            .iter()
            .filter_map(|wallet| self.masters.get(wallet).map(|master| (*wallet, *master)))
            .collect())
    }

    async fn get_gems_contracts(
        &self,
        accounts: &[AccountId],
    ) -> Result<HashMap<AccountId, NftSaleContract>> {
        self.calls
            .lock()
            .unwrap()
            .push(("get_gems", accounts.to_vec()));
        if self.fail_on == Some(FailOn::GetGems) {
            bail!("getgems lookup failed");
        }
        Ok(accounts
            .iter()
            .filter_map(|account| {
                self.get_gems
                    .get(account)
                    .map(|sale| (*account, sale.clone()))
            })
            .collect())
    }

    async fn nft_sale_contracts(
        &self,
        accounts: &[AccountId],
    ) -> Result<HashMap<AccountId, NftSaleContract>> {
        self.calls
            .lock()
            .unwrap()
            .push(("nft_sales", accounts.to_vec()));
        if self.fail_on == Some(FailOn::BasicSales) {
            bail!("basic sale lookup failed");
        }
        Ok(accounts
            .iter()
            .filter_map(|account| self.basic.get(account).map(|sale| (*account, sale.clone())))
            .collect())
    }
}
