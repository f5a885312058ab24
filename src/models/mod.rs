//! Request and Response models for the cache RPC API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing RPC request and response bodies.

pub mod requests;
pub mod responses;
pub mod types;

// Re-export commonly used types
pub use requests::{
    CheckEntryRequest, CreateEntryRequest, CreateTenantRequest, GetEntryRequest,
    GetTenantRequest, UpdateEntryRequest,
};
pub use responses::{
    CheckEntryResponse, CreateEntryResponse, CreateTenantResponse, ErrorResponse,
    GetEntryResponse, GetTenantResponse, HealthResponse, UpdateEntryResponse,
};
pub use types::{CacheEntry, MultipartEtag, Offset, ProviderType, TransferInstruction, TransferMethod};
