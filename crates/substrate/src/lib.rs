//! Indexer endpoint adapters for Cadence.
//!
//! This crate implements the [`BlockSource`] port from `cadence-core`.
//! The endpoint URL scheme picks the adapter:
//!
//! - `http(s)://` - [`HydraClient`], a Hydra-style indexer GraphQL API
//! - `ws(s)://` - [`SubstrateClient`], a Substrate node over subxt
//!
//! # Usage
//!
//! ```ignore
//! use cadence_substrate::Endpoint;
//!
//! let endpoint = Endpoint::connect("http://localhost:4001/graphql").await?;
//! let head = endpoint.head().await?;
//! let block = endpoint.fetch_block(42).await?;
//! ```
//!
//! Both adapters decode into the `RawBlock`, `RawExtrinsic` and `RawEvent`
//! structures defined in `cadence-core`. Event data is positional; extrinsic
//! arguments are keyed by name.
//!
//! [`BlockSource`]: cadence_core::ports::BlockSource

mod endpoint;
mod hydra;
mod node;
mod scale;

pub use endpoint::{Endpoint, EndpointKind};
pub use hydra::{HydraClient, HydraClientConfig};
pub use node::{SubstrateClient, SubstrateClientConfig};
