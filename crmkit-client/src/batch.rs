//! Composite `batch` execution.
//!
//! Packs individual requests into `batch` calls of at most `batch_size`
//! commands, keyed `_0`, `_1`, … in submission order, and unpacks the five
//! `result*` maps back into per-command responses. Chunks run strictly one
//! at a time: the next chunk is not even built until the previous chunk's
//! responses have been consumed, so an unbounded generated request stream
//! never buffers more than one chunk.

use crmkit_core::{ApiError, BatchResult, ParamValue, Request, Response};
use futures::future::ready;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::client::Client;

impl Client {
    /// Run a (possibly unbounded) request stream through composite `batch`
    /// calls, yielding each command's `result` in submission order.
    pub fn batch<'a, S>(
        &'a self,
        requests: S,
        batch_size: usize,
    ) -> impl Stream<Item = Result<Value, ApiError>> + 'a
    where
        S: Stream<Item = Request> + 'a,
    {
        self.batch_responses(requests, batch_size)
            .map_ok(|response| response.result)
    }

    /// Like [`Client::batch`] but yielding full response envelopes, so the
    /// batched-tail pagination can validate each page's `next` offset.
    pub(crate) fn batch_responses<'a, S>(
        &'a self,
        requests: S,
        batch_size: usize,
    ) -> impl Stream<Item = Result<Response, ApiError>> + 'a
    where
        S: Stream<Item = Request> + 'a,
    {
        requests
            .chunks(batch_size.max(1))
            .then(move |chunk| self.batch_chunk(chunk))
            .flat_map(|outcome| {
                stream::iter(match outcome {
                    Ok(responses) => responses.into_iter().map(Ok).collect::<Vec<_>>(),
                    Err(error) => vec![Err(error)],
                })
            })
            // A failed chunk terminates the stream; halt:true already
            // stopped the server side, stop the client side too.
            .scan(false, |failed, item| {
                if *failed {
                    return ready(None);
                }
                *failed = item.is_err();
                ready(Some(item))
            })
    }

    /// One chunk, retried as a unit: a retryable error on any command
    /// re-executes the whole composite call.
    pub(crate) async fn batch_chunk(
        &self,
        requests: Vec<Request>,
    ) -> Result<Vec<Response>, ApiError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        self.config()
            .retry_policy()
            .run(|| self.batch_chunk_once(&requests))
            .await
    }

    async fn batch_chunk_once(&self, requests: &[Request]) -> Result<Vec<Response>, ApiError> {
        let commands: Vec<(String, &Request)> = requests
            .iter()
            .enumerate()
            .map(|(index, request)| (format!("_{index}"), request))
            .collect();

        let mut cmd = IndexMap::new();
        for (key, request) in &commands {
            cmd.insert(key.clone(), ParamValue::from(request.to_query()));
        }
        let composite = Request::new("batch")
            .with_param("halt", true)
            .with_param("cmd", ParamValue::Map(cmd));

        debug!(commands = commands.len(), "executing batch chunk");
        let raw = self.call_once(&composite).await?.result;
        let batch: BatchResult =
            serde_json::from_value(raw).map_err(|error| ApiError::Decode {
                method: "batch".into(),
                message: error.to_string(),
            })?;

        let mut responses = Vec::with_capacity(commands.len());
        for (key, request) in &commands {
            // halt:true stops server-side execution at the first failing
            // command, so commands after this one never ran.
            if let Some(envelope) = batch.result_error.get(key) {
                return Err(self.api_error(envelope));
            }
            let result = batch.result.get(key).cloned().ok_or_else(|| {
                ApiError::contract(format!(
                    "batch `result` is missing key `{key}` for `{}`",
                    request.method
                ))
            })?;
            let time = batch.result_time.get(key).cloned().ok_or_else(|| {
                ApiError::contract(format!(
                    "batch `result_time` is missing key `{key}` for `{}`",
                    request.method
                ))
            })?;
            responses.push(Response {
                result,
                time,
                total: batch.result_total.get(key).copied(),
                next: batch.result_next.get(key).copied(),
            });
        }
        Ok(responses)
    }
}
