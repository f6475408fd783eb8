#![doc = include_str!("../README.md")]

/// NZB assembly and emission
pub mod assembler;
mod client;
/// NNTP command builders and response parsers
pub mod commands;
mod config;
mod error;
/// Parallel overview fetch orchestration
pub mod fetch;
/// End-to-end indexing runs
pub mod indexer;
/// Overview line parsing
pub mod overview;
mod pool;
mod response;
/// Persistent article index
pub mod store;
/// Subject line analysis
pub mod subject;

pub use assembler::{
    AssembleOptions, AssembleOutcome, Nzb, NzbDocument, NzbFile, NzbSegment, assemble, sanitize,
    write_documents,
};
pub use client::NntpClient;
pub use commands::GroupInfo;
pub use config::{IndexerConfig, ServerConfig};
pub use error::{Error, Result};
pub use fetch::{
    Chunk, FailedChunk, FetchOrchestrator, FetchProgress, FetchReport, FetchSettings,
    OverviewSource, ProgressFn, RetryPolicy, partition_chunks,
};
pub use indexer::{RunReport, export_nzbs, index_group};
pub use overview::{OverviewRow, parse_overview_line};
pub use pool::{NntpConnectionManager, NntpPool};
pub use response::{NntpResponse, codes};
pub use store::{IndexStore, QueryFilter, UpsertOutcome};
pub use subject::{SubjectInfo, analyze, collection_key};
