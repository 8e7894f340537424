//! Handler for `Balances.Transfer`.
//!
//! Data layout is positional: `[from, to, amount]`.

use async_trait::async_trait;
use chrono::SecondsFormat;
use tracing::debug;

use cadence_core::error::DomainResult;
use cadence_core::models::AccountId;
use cadence_core::ports::{BlockHook, EventHandler, RawEvent};
use cadence_core::services::MappingContext;

use super::models::{ACCOUNT, Account, TRANSFER, Transfer};
use crate::utils::{event_param, parse_account, parse_amount};

/// Upserts a `Transfer` per event plus both `Account`s it touches.
///
/// Ids are natural (`{block}-{eventIndex}`, hex account), so re-processing a
/// block converges to the same rows.
pub struct TransferHandler;

#[async_trait]
impl EventHandler for TransferHandler {
    async fn handle(&self, ctx: &mut MappingContext<'_>, event: &RawEvent) -> DomainResult<()> {
        let from = event_param(event, 0, "from", parse_account)?;
        let to = event_param(event, 1, "to", parse_account)?;
        let amount = event_param(event, 2, "amount", parse_amount)?;

        let block = ctx.block().number;
        let timestamp = ctx
            .block()
            .timestamp
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true));

        touch_account(ctx, &from).await?;
        touch_account(ctx, &to).await?;

        let id = format!("{block}-{}", event.index);
        let transfer = Transfer {
            from: from.to_hex(),
            to: to.to_hex(),
            value: amount.to_string(),
            block,
            timestamp,
            sender: from.to_hex(),
            recipient: to.to_hex(),
        };
        ctx.upsert(TRANSFER, &id, &transfer).await?;

        debug!(block, id = %id, value = %transfer.value, "Transfer mapped");
        Ok(())
    }
}

async fn touch_account(ctx: &mut MappingContext<'_>, account: &AccountId) -> DomainResult<()> {
    let id = account.to_hex();
    let block = i64::try_from(ctx.block().number).unwrap_or(i64::MAX);

    let merged = match ctx.get::<Account>(ACCOUNT, &id).await? {
        Some(existing) => Account {
            first_seen_block: existing.first_seen_block.min(block),
            last_seen_block: existing.last_seen_block.max(block),
        },
        None => Account {
            first_seen_block: block,
            last_seen_block: block,
        },
    };
    ctx.upsert(ACCOUNT, &id, &merged).await?;
    Ok(())
}

/// Logs what the pack wrote once a block's handlers are done.
pub struct BlockSummary;

#[async_trait]
impl BlockHook for BlockSummary {
    fn name(&self) -> &str {
        "balances.summary"
    }

    async fn on_block_end(&self, ctx: &mut MappingContext<'_>) -> DomainResult<()> {
        let transfers = ctx.writes().get(TRANSFER).copied().unwrap_or_default();
        if transfers > 0 {
            debug!(block = ctx.block().number, transfers, "Block transfers mapped");
        }
        Ok(())
    }
}
