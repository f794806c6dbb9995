// crmkit-client: the HTTP engine for a CRM-style webhook REST API.
//
// Turns a single logical "list everything matching X" into a correct,
// retry-safe sequence of HTTP calls against an API that only offers
// bounded-size pages, unreliable totals and a halt-on-first-error batch
// primitive. See crmkit-core for the wire types.

pub mod batch;
pub mod client;
pub mod config;
pub mod list;
pub mod reference;
pub mod retry;

pub use client::Client;
pub use config::{ApiConfig, DEFAULT_RETRY_ERRORS, DEFAULT_RETRY_STATUSES};
pub use reference::FilterUpdate;
pub use retry::RetryPolicy;

// Re-export the wire types callers need to build requests and match errors.
pub use crmkit_core::{
    encode, item_id, normalize_list, ApiError, BatchResult, ErrorEnvelope, ListParams,
    ListRequest, ParamValue, Request, Response, ResponseTime,
};
