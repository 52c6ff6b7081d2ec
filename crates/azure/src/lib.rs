//! cd-azure: Azure Blob Storage adapter for cdrive
//!
//! Implements the `BlobStore` trait from cd-core on top of the Blob REST API
//! using reqwest, Shared Key request signing and service SAS tokens.

pub mod auth;
pub mod client;
pub mod xml;

pub use client::AzureBlobClient;

/// REST API version sent with every request and signed into every token
pub const API_VERSION: &str = "2021-08-06";
