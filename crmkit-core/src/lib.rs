// crmkit-core: wire-level types for a CRM-style webhook REST API.
//
// Pure data and logic only: requests, response envelopes, PHP-style query
// encoding, list normalization and the error taxonomy. The HTTP engine
// (transport, retries, batching, pagination) lives in crmkit-client.

pub mod error;
pub mod list;
pub mod query;
pub mod request;
pub mod response;

pub use error::ApiError;
pub use list::{item_id, normalize_list};
pub use query::encode;
pub use request::{ListParams, ListRequest, ParamValue, Request};
pub use response::{BatchResult, ErrorEnvelope, Response, ResponseTime};
