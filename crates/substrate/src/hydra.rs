//! Hydra-style indexer GraphQL client.
//!
//! The indexer already stores decoded blocks, events and extrinsics. A block
//! is one GraphQL round trip, plus follow-up pages when its event or
//! extrinsic list fills the first page. A height the indexer has not reached
//! yet comes back with no block row and maps to `Ok(None)`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, trace};

use cadence_core::error::{ChainError, ChainResult};
use cadence_core::metrics::record_decode_error;
use cadence_core::models::BlockHash;
use cadence_core::ports::{BlockSource, RawBlock, RawEvent, RawExtrinsic};

use crate::scale::timestamp_from_args;

macro_rules! event_fields {
    () => {
        "indexInBlock extrinsicIndex section method params { name type value }"
    };
}

macro_rules! extrinsic_fields {
    () => {
        "indexInBlock section method signer isSigned success tip nonce args { name type value }"
    };
}

const BLOCK_QUERY: &str = concat!(
    "query BlockAt($height: Int!, $limit: Int!) {\n",
    "  substrateBlocks(where: { height_eq: $height }, limit: 1) { height hash parentHash timestamp }\n",
    "  substrateEvents(where: { blockNumber_eq: $height }, orderBy: indexInBlock_ASC, limit: $limit, offset: 0) { ",
    event_fields!(),
    " }\n",
    "  substrateExtrinsics(where: { blockNumber_eq: $height }, orderBy: indexInBlock_ASC, limit: $limit, offset: 0) { ",
    extrinsic_fields!(),
    " }\n",
    "}"
);

const EVENTS_PAGE_QUERY: &str = concat!(
    "query EventsAt($height: Int!, $limit: Int!, $offset: Int!) {\n",
    "  substrateEvents(where: { blockNumber_eq: $height }, orderBy: indexInBlock_ASC, limit: $limit, offset: $offset) { ",
    event_fields!(),
    " }\n",
    "}"
);

const EXTRINSICS_PAGE_QUERY: &str = concat!(
    "query ExtrinsicsAt($height: Int!, $limit: Int!, $offset: Int!) {\n",
    "  substrateExtrinsics(where: { blockNumber_eq: $height }, orderBy: indexInBlock_ASC, limit: $limit, offset: $offset) { ",
    extrinsic_fields!(),
    " }\n",
    "}"
);

const HEAD_QUERY: &str = "query { indexerStatus { head } }";

/// Configuration for the Hydra client.
#[derive(Debug, Clone)]
pub struct HydraClientConfig {
    /// GraphQL endpoint (e.g., "http://localhost:4001/graphql").
    pub url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Rows requested per event/extrinsic page. List resolvers cap
    /// unbounded selections, so blocks are always read page by page.
    pub page_size: u32,
}

impl Default for HydraClientConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:4001/graphql".to_string(),
            timeout: Duration::from_secs(30),
            page_size: 200,
        }
    }
}

/// Block source backed by a Hydra indexer.
pub struct HydraClient {
    http: reqwest::Client,
    url: String,
    page_size: u32,
}

impl HydraClient {
    pub fn new(config: HydraClientConfig) -> ChainResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            http,
            url: config.url,
            page_size: config.page_size.max(1),
        })
    }

    /// Block row plus every event and extrinsic of `height`.
    async fn fetch_block_data(&self, height: u64) -> ChainResult<BlockData> {
        let first: BlockData = self
            .request(
                BLOCK_QUERY,
                serde_json::json!({ "height": height, "limit": self.page_size }),
            )
            .await?;
        if first.substrate_blocks.is_empty() {
            return Ok(first);
        }

        let substrate_events = collect_pages(first.substrate_events, self.page_size, |offset| {
            self.page::<EventsPage>(EVENTS_PAGE_QUERY, height, offset)
        })
        .await?;
        let substrate_extrinsics =
            collect_pages(first.substrate_extrinsics, self.page_size, |offset| {
                self.page::<ExtrinsicsPage>(EXTRINSICS_PAGE_QUERY, height, offset)
            })
            .await?;

        Ok(BlockData {
            substrate_blocks: first.substrate_blocks,
            substrate_events,
            substrate_extrinsics,
        })
    }

    async fn page<P>(&self, query: &str, height: u64, offset: usize) -> ChainResult<Vec<P::Row>>
    where
        P: Page + for<'de> Deserialize<'de>,
    {
        trace!(height, offset, "Fetching next page");
        let page: P = self
            .request(
                query,
                serde_json::json!({ "height": height, "limit": self.page_size, "offset": offset }),
            )
            .await?;
        Ok(page.into_rows())
    }

    async fn request<T: for<'de> Deserialize<'de>>(
        &self,
        query: &str,
        variables: Value,
    ) -> ChainResult<T> {
        let response = self
            .http
            .post(&self.url)
            .json(&GraphQlRequest { query, variables })
            .send()
            .await
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| ChainError::RpcError(e.to_string()))?;

        let body: GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;
        body.into_data()
    }
}

#[async_trait]
impl BlockSource for HydraClient {
    #[instrument(skip(self))]
    async fn fetch_block(&self, height: u64) -> ChainResult<Option<RawBlock>> {
        let data = self
            .fetch_block_data(height)
            .await
            .map_err(|e| ChainError::BlockFetchError {
                height,
                message: e.to_string(),
            })?;

        let block = data.into_raw_block(height)?;
        if let Some(block) = &block {
            debug!(
                events = block.events.len(),
                extrinsics = block.extrinsics.len(),
                "Block fetched"
            );
        }
        Ok(block)
    }

    async fn head(&self) -> ChainResult<u64> {
        let data: HeadData = self.request(HEAD_QUERY, Value::Null).await?;
        lenient_u64(&data.indexer_status.head).ok_or_else(|| {
            ChainError::InvalidResponse(format!(
                "indexer head is not a height: {}",
                data.indexer_status.head
            ))
        })
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

impl<T> GraphQlResponse<T> {
    fn into_data(self) -> ChainResult<T> {
        if !self.errors.is_empty() {
            let messages: Vec<_> = self.errors.into_iter().map(|e| e.message).collect();
            return Err(ChainError::RpcError(messages.join("; ")));
        }
        self.data
            .ok_or_else(|| ChainError::InvalidResponse("response has no data".to_string()))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeadData {
    indexer_status: IndexerStatus,
}

#[derive(Deserialize)]
struct IndexerStatus {
    head: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockData {
    substrate_blocks: Vec<BlockRow>,
    #[serde(default)]
    substrate_events: Vec<EventRow>,
    #[serde(default)]
    substrate_extrinsics: Vec<ExtrinsicRow>,
}

trait Page {
    type Row;

    fn into_rows(self) -> Vec<Self::Row>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    substrate_events: Vec<EventRow>,
}

impl Page for EventsPage {
    type Row = EventRow;

    fn into_rows(self) -> Vec<EventRow> {
        self.substrate_events
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtrinsicsPage {
    substrate_extrinsics: Vec<ExtrinsicRow>,
}

impl Page for ExtrinsicsPage {
    type Row = ExtrinsicRow;

    fn into_rows(self) -> Vec<ExtrinsicRow> {
        self.substrate_extrinsics
    }
}

/// Keeps requesting pages at the running offset until one comes back short.
async fn collect_pages<T, F, Fut>(
    first: Vec<T>,
    page_size: u32,
    mut next_page: F,
) -> ChainResult<Vec<T>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = ChainResult<Vec<T>>>,
{
    let page_size = page_size.max(1) as usize;
    let mut last = first.len();
    let mut rows = first;
    while last >= page_size {
        let page = next_page(rows.len()).await?;
        last = page.len();
        rows.extend(page);
    }
    Ok(rows)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockRow {
    height: Value,
    hash: String,
    parent_hash: String,
    timestamp: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventRow {
    index_in_block: u32,
    extrinsic_index: Option<u32>,
    section: String,
    method: String,
    #[serde(default)]
    params: Vec<Param>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtrinsicRow {
    index_in_block: u32,
    section: String,
    method: String,
    signer: Option<String>,
    #[serde(default)]
    is_signed: bool,
    #[serde(default = "default_success")]
    success: bool,
    tip: Option<Value>,
    nonce: Option<Value>,
    #[serde(default)]
    args: Vec<Param>,
}

fn default_success() -> bool {
    true
}

/// Decoded argument as stored by the indexer.
#[derive(Debug, Deserialize)]
struct Param {
    name: String,
    value: Value,
}

impl BlockData {
    fn into_raw_block(self, height: u64) -> ChainResult<Option<RawBlock>> {
        let Some(row) = self.substrate_blocks.into_iter().next() else {
            trace!(height, "Block not indexed yet");
            return Ok(None);
        };

        let number = lenient_u64(&row.height).unwrap_or(height);
        if number != height {
            return Err(ChainError::InvalidResponse(format!(
                "asked for block {height}, indexer returned {number}"
            )));
        }

        ensure_ascending("event", self.substrate_events.iter().map(|e| e.index_in_block))?;
        ensure_ascending(
            "extrinsic",
            self.substrate_extrinsics.iter().map(|e| e.index_in_block),
        )?;

        let extrinsics: Vec<RawExtrinsic> = self
            .substrate_extrinsics
            .into_iter()
            .map(ExtrinsicRow::into_raw)
            .collect();

        let timestamp = row
            .timestamp
            .as_ref()
            .and_then(lenient_u64)
            .or_else(|| {
                extrinsics
                    .iter()
                    .find(|e| e.module.eq_ignore_ascii_case("timestamp") && e.call == "set")
                    .and_then(|e| timestamp_from_args(&e.args))
            });

        Ok(Some(RawBlock {
            number,
            hash: parse_hash(&row.hash, "hash")?,
            parent_hash: parse_hash(&row.parent_hash, "parentHash")?,
            events: self
                .substrate_events
                .into_iter()
                .map(EventRow::into_raw)
                .collect(),
            extrinsics,
            timestamp,
        }))
    }
}

impl EventRow {
    fn into_raw(self) -> RawEvent {
        RawEvent {
            index: self.index_in_block,
            extrinsic_index: self.extrinsic_index,
            module: self.section,
            name: self.method,
            data: Value::Array(self.params.into_iter().map(|p| p.value).collect()),
        }
    }
}

impl ExtrinsicRow {
    fn into_raw(self) -> RawExtrinsic {
        let tip = self.tip.as_ref().and_then(|v| match v {
            Value::Number(n) => n.as_u64().map(u128::from),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });
        let nonce = self
            .nonce
            .as_ref()
            .and_then(lenient_u64)
            .and_then(|n| u32::try_from(n).ok());

        let args = self
            .args
            .into_iter()
            .map(|p| (p.name, p.value))
            .collect::<serde_json::Map<_, _>>();

        RawExtrinsic {
            index: self.index_in_block,
            signer: self.signer.filter(|_| self.is_signed),
            success: self.success,
            tip,
            nonce,
            module: self.section,
            call: self.method,
            args: Value::Object(args),
        }
    }
}

/// Pages that shifted under us show up as repeated or unordered indexes.
fn ensure_ascending(kind: &str, indexes: impl Iterator<Item = u32>) -> ChainResult<()> {
    let mut previous: Option<u32> = None;
    for index in indexes {
        if previous.is_some_and(|p| p >= index) {
            return Err(ChainError::InvalidResponse(format!(
                "{kind} indexInBlock {index} out of order"
            )));
        }
        previous = Some(index);
    }
    Ok(())
}

fn parse_hash(hex: &str, field: &str) -> ChainResult<BlockHash> {
    BlockHash::from_hex(hex).map_err(|e| {
        record_decode_error("block", "unknown");
        ChainError::InvalidResponse(format!("{field} {hex:?}: {e}"))
    })
}

/// Indexers return big numbers either as JSON numbers or strings.
fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hash(byte: &str) -> String {
        format!("0x{}", byte.repeat(32))
    }

    fn block_response() -> Value {
        json!({
            "data": {
                "substrateBlocks": [{
                    "height": 42,
                    "hash": hash("01"),
                    "parentHash": hash("00"),
                    "timestamp": "1704067452000"
                }],
                "substrateEvents": [
                    {
                        "indexInBlock": 0,
                        "extrinsicIndex": 1,
                        "section": "balances",
                        "method": "Transfer",
                        "params": [
                            {"name": "from", "type": "AccountId", "value": hash("aa")},
                            {"name": "to", "type": "AccountId", "value": hash("bb")},
                            {"name": "value", "type": "Balance", "value": "1000000000000000000"}
                        ]
                    }
                ],
                "substrateExtrinsics": [
                    {
                        "indexInBlock": 1,
                        "section": "balances",
                        "method": "transfer",
                        "signer": hash("aa"),
                        "isSigned": true,
                        "tip": "0",
                        "nonce": 7,
                        "args": [
                            {"name": "dest", "type": "LookupSource", "value": hash("bb")},
                            {"name": "value", "type": "Compact<Balance>", "value": "1000000000000000000"}
                        ]
                    }
                ]
            }
        })
    }

    #[test]
    fn test_block_response_decodes() {
        let response: GraphQlResponse<BlockData> =
            serde_json::from_value(block_response()).unwrap();
        let block = response.into_data().unwrap().into_raw_block(42).unwrap().unwrap();

        assert_eq!(block.number, 42);
        assert_eq!(block.hash.to_hex(), hash("01"));
        assert_eq!(block.timestamp, Some(1_704_067_452_000));

        let event = &block.events[0];
        assert_eq!(event.module, "balances");
        assert_eq!(event.name, "Transfer");
        assert_eq!(event.extrinsic_index, Some(1));
        assert_eq!(event.param(2), Some(&json!("1000000000000000000")));

        let ext = &block.extrinsics[0];
        assert_eq!(ext.signer.as_deref(), Some(hash("aa").as_str()));
        assert_eq!(ext.nonce, Some(7));
        assert_eq!(ext.tip, Some(0));
        assert!(ext.success);
        assert_eq!(ext.args["dest"], json!(hash("bb")));
    }

    #[test]
    fn test_missing_block_is_not_yet_available() {
        let response: GraphQlResponse<BlockData> = serde_json::from_value(json!({
            "data": {"substrateBlocks": [], "substrateEvents": [], "substrateExtrinsics": []}
        }))
        .unwrap();
        assert!(response.into_data().unwrap().into_raw_block(7).unwrap().is_none());
    }

    #[test]
    fn test_wrong_height_is_rejected() {
        let response: GraphQlResponse<BlockData> =
            serde_json::from_value(block_response()).unwrap();
        let err = response.into_data().unwrap().into_raw_block(43).unwrap_err();
        assert!(matches!(err, ChainError::InvalidResponse(_)));
    }

    #[test]
    fn test_graphql_errors_surface() {
        let response: GraphQlResponse<HeadData> = serde_json::from_value(json!({
            "data": null,
            "errors": [{"message": "boom"}, {"message": "again"}]
        }))
        .unwrap();
        match response.into_data() {
            Err(ChainError::RpcError(msg)) => assert_eq!(msg, "boom; again"),
            other => panic!("unexpected: {:?}", other.err()),
        }
    }

    fn event_rows(count: u32) -> Vec<Value> {
        (0..count)
            .map(|i| {
                json!({
                    "indexInBlock": i,
                    "extrinsicIndex": null,
                    "section": "system",
                    "method": "Remarked",
                    "params": []
                })
            })
            .collect()
    }

    /// Serves `rows` the way a list resolver does: `limit` rows from `offset`.
    fn serve(rows: &[Value], offset: usize, limit: usize) -> Vec<EventRow> {
        rows.iter()
            .skip(offset)
            .take(limit)
            .map(|row| serde_json::from_value(row.clone()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_busy_block_is_read_across_pages() {
        let on_chain = event_rows(60);
        let first = serve(&on_chain, 0, 50);
        let mut requested = Vec::new();

        let rows = collect_pages(first, 50, |offset| {
            requested.push(offset);
            let page = serve(&on_chain, offset, 50);
            async move { Ok(page) }
        })
        .await
        .unwrap();

        assert_eq!(requested, vec![50]);
        assert_eq!(rows.len(), 60);

        let block = BlockData {
            substrate_blocks: vec![serde_json::from_value(json!({
                "height": 7,
                "hash": hash("07"),
                "parentHash": hash("06"),
                "timestamp": null
            }))
            .unwrap()],
            substrate_events: rows,
            substrate_extrinsics: Vec::new(),
        }
        .into_raw_block(7)
        .unwrap()
        .unwrap();
        let indexes: Vec<u32> = block.events.iter().map(|e| e.index).collect();
        assert_eq!(indexes, (0..60).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_exact_page_multiple_stops_on_empty_page() {
        let on_chain = event_rows(100);
        let mut calls = 0;

        let rows = collect_pages(serve(&on_chain, 0, 50), 50, |offset| {
            calls += 1;
            let page = serve(&on_chain, offset, 50);
            async move { Ok(page) }
        })
        .await
        .unwrap();

        assert_eq!(rows.len(), 100);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_short_first_page_needs_no_more_requests() {
        let rows = collect_pages(serve(&event_rows(3), 0, 50), 50, |_| async {
            Err::<Vec<EventRow>, _>(ChainError::RpcError("unexpected page".to_string()))
        })
        .await
        .unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn test_page_error_aborts_block() {
        let err = collect_pages(serve(&event_rows(50), 0, 50), 50, |_| async {
            Err::<Vec<EventRow>, _>(ChainError::RpcError("timeout".to_string()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ChainError::RpcError(_)));
    }

    #[test]
    fn test_repeated_event_index_is_rejected() {
        let mut rows = serve(&event_rows(3), 0, 3);
        rows.extend(serve(&event_rows(3), 2, 1));
        let block = BlockData {
            substrate_blocks: vec![serde_json::from_value(json!({
                "height": 7,
                "hash": hash("07"),
                "parentHash": hash("06")
            }))
            .unwrap()],
            substrate_events: rows,
            substrate_extrinsics: Vec::new(),
        };
        assert!(matches!(
            block.into_raw_block(7),
            Err(ChainError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_block_query_requests_explicit_pages() {
        assert!(BLOCK_QUERY.contains("limit: $limit, offset: 0"));
        assert!(EVENTS_PAGE_QUERY.contains("offset: $offset"));
        assert!(EXTRINSICS_PAGE_QUERY.contains("offset: $offset"));
    }

    #[test]
    fn test_head_accepts_string_heights() {
        assert_eq!(lenient_u64(&json!("1200")), Some(1200));
        assert_eq!(lenient_u64(&json!(1200)), Some(1200));
        assert_eq!(lenient_u64(&json!(null)), None);
    }
}
