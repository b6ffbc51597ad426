// src/core/trace.rs
// Trace trees: causally linked transactions rooted at one trigger, plus the
// enrichment pass that cross-references them against an external source.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::address::AccountId;
use super::transaction::{ContractInterface, Message, MsgOperation, Transaction};

/// One node of a trace tree. Children are owned by value: dropping the root
/// drops the whole tree, and no node is shared between trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub account_interfaces: Vec<ContractInterface>,
    pub children: Vec<Trace>,
    /// Absent until [`collect_additional_info`] has run over the tree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<TraceAdditionalInfo>,
}

/// Cross-referenced side information about a trace node, not extractable
/// from the trace itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceAdditionalInfo {
    /// Issuing master contract, when the node's inbound message is a jetton
    /// transfer whose destination wallet resolves to a known master.
    pub jetton_master: Option<AccountId>,
    /// Set when the node's account implements a "get_sale_data" interface.
    pub nft_sale_contract: Option<NftSaleContract>,
}

/// Snapshot of a sale contract's "get_sale_data" answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NftSaleContract {
    pub nft_price: i64,
    pub owner: Option<AccountId>,
}

/// Batched lookups used to build [`TraceAdditionalInfo`].
///
/// Each method takes the full candidate list (duplicates allowed) and returns
/// a map keyed by address; a key missing from the result means "no data", not
/// an error. An `Err` from any method aborts the whole enrichment.
#[async_trait]
pub trait InformationSource: Send + Sync {
    async fn jetton_masters_for_wallets(
        &self,
        wallets: &[AccountId],
    ) -> Result<HashMap<AccountId, AccountId>>;

    async fn get_gems_contracts(
        &self,
        accounts: &[AccountId],
    ) -> Result<HashMap<AccountId, NftSaleContract>>;

    async fn nft_sale_contracts(
        &self,
        accounts: &[AccountId],
    ) -> Result<HashMap<AccountId, NftSaleContract>>;
}

impl Trace {
    /// Whether this trace is still accumulating transactions: true while any
    /// node in the subtree has an outbound message not yet matched to a
    /// child. The tree builder polls this to decide when a trace is final.
    ///
    /// Known imprecision: a message that leaves the watched account set will
    /// never get a child, yet it is counted like any unmatched message, so
    /// such traces read as in-progress forever.
    // TODO: stop counting outbound messages the tree builder marks as
    // external once it exposes that flag.
    pub fn in_progress(&self) -> bool {
        self.count_uncompleted() != 0
    }

    fn count_uncompleted(&self) -> usize {
        let mut count = 0;
        self.visit(|node| count += node.transaction.out_msgs.len());
        count
    }

    /// Pre-order walk: each node exactly once, before its children, siblings
    /// in `children` order. Uses an explicit stack so that pathologically
    /// deep call chains cannot overflow the host stack.
    pub fn visit<'a>(&'a self, mut f: impl FnMut(&'a Trace)) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            f(node);
            stack.extend(node.children.iter().rev());
        }
    }

    /// Exclusive variant of [`Trace::visit`], same order.
    pub fn visit_mut(&mut self, mut f: impl FnMut(&mut Trace)) {
        let mut stack: Vec<&mut Trace> = vec![self];
        while let Some(node) = stack.pop() {
            f(node);
            stack.extend(node.children.iter_mut().rev());
        }
    }
}

/// True when the node's inbound message is a decoded jetton transfer headed
/// to some wallet, i.e. the destination is a jetton-wallet candidate.
fn is_destination_jetton_wallet(in_msg: Option<&Message>) -> bool {
    let msg = match in_msg {
        Some(msg) => msg,
        None => return false,
    };
    let body = match &msg.decoded_body {
        Some(body) => body,
        None => return false,
    };
    body.operation == MsgOperation::JettonTransfer && msg.destination.is_some()
}

fn has_interface(interfaces: &[ContractInterface], wanted: ContractInterface) -> bool {
    interfaces.contains(&wanted)
}

/// Walks the whole trace and populates `additional_info` on every node from
/// answers given by `source`.
///
/// The tree is walked twice: once to gather candidate addresses, once to
/// attach results. In between, exactly three batched queries are issued in a
/// fixed order regardless of tree size. The same classification predicates
/// run in both walks; recomputing them keeps the assignment pass symmetric
/// with the collection pass.
///
/// With `source == None` this is a no-op that leaves the tree untouched. If
/// any query fails, the error is returned as-is and no node receives an
/// annotation. On success every node gets a fresh `TraceAdditionalInfo`
/// (fields left `None` when the node does not qualify or the source had no
/// answer), so repeated invocation is idempotent. A node tagged with both
/// sale interfaces keeps the basic-sale answer: that check runs last.
pub async fn collect_additional_info<S>(source: Option<&S>, trace: &mut Trace) -> Result<()>
where
    S: InformationSource + ?Sized,
{
    let source = match source {
        Some(source) => source,
        None => return Ok(()),
    };

    let mut jetton_wallets: Vec<AccountId> = Vec::new();
    let mut get_gems: Vec<AccountId> = Vec::new();
    let mut basic_sales: Vec<AccountId> = Vec::new();
    trace.visit(|node| {
        if is_destination_jetton_wallet(node.transaction.in_msg.as_ref()) {
            if let Some(destination) = node.transaction.in_msg.as_ref().and_then(|m| m.destination)
            {
                jetton_wallets.push(destination);
            }
        }
        if has_interface(&node.account_interfaces, ContractInterface::NftSaleGetgems) {
            get_gems.push(node.transaction.account);
        }
        if has_interface(&node.account_interfaces, ContractInterface::NftSale) {
            basic_sales.push(node.transaction.account);
        }
    });

    let masters = source.jetton_masters_for_wallets(&jetton_wallets).await?;
    let get_gems_sales = source.get_gems_contracts(&get_gems).await?;
    let basic_nft_sales = source.nft_sale_contracts(&basic_sales).await?;

    trace.visit_mut(|node| {
        let mut info = TraceAdditionalInfo::default();
        if is_destination_jetton_wallet(node.transaction.in_msg.as_ref()) {
            if let Some(destination) = node.transaction.in_msg.as_ref().and_then(|m| m.destination)
            {
                info.jetton_master = masters.get(&destination).copied();
            }
        }
        if has_interface(&node.account_interfaces, ContractInterface::NftSaleGetgems) {
            if let Some(sale) = get_gems_sales.get(&node.transaction.account) {
                info.nft_sale_contract = Some(sale.clone());
            }
        }
        if has_interface(&node.account_interfaces, ContractInterface::NftSale) {
            if let Some(sale) = basic_nft_sales.get(&node.transaction.account) {
                info.nft_sale_contract = Some(sale.clone());
            }
        }
        node.additional_info = Some(info);
    });
    Ok(())
}
