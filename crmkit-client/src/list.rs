//! Exhaustive traversal of `*.list` endpoints.
//!
//! Three strategies, slowest to fastest:
//!
//! - [`Client::list_sequential`]: one direct call per page, driven by the
//!   head response's `total`. The fallback for endpoints without a usable
//!   range filter.
//! - [`Client::list_batched`]: same head, but all tail pages go through
//!   the batch executor, `batch_size` pages per round trip. Still trusts
//!   `total` from the head call, so a dataset mutating mid-run can shift
//!   pages underneath it (documented risk, not corrected here).
//! - [`Client::list_batched_no_count`]: cursor-range traversal over a
//!   monotonic numeric id, immune to `total` staleness: two boundary reads
//!   (first page ascending, last page descending) establish the covered
//!   range, and the numeric gap between them is swept with id-range
//!   filters through the batch executor.
//!
//! Every strategy returns a lazy, pull-driven stream: nothing is fetched
//! until the consumer asks, and memory stays bounded by one in-flight
//! chunk. Items already yielded stay delivered when a later page fails.

use crmkit_core::{item_id, normalize_list, ApiError, ListRequest, ParamValue, Request, Response};
use futures::future::ready;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use serde_json::Value;

use crate::client::Client;

/// Clone a request with `start` injected.
fn with_start(request: &Request, start: i64) -> Request {
    let mut page_request = request.clone();
    page_request
        .parameters
        .insert("start".into(), ParamValue::Int(start));
    page_request
}

/// `next`, when present and non-zero, must equal the expected cumulative
/// offset; a mismatch means the server paged with a different chunk size
/// and the traversal would silently skip or repeat rows.
fn expect_next(response: &Response, expected: i64) -> Result<(), ApiError> {
    match response.next {
        Some(next) if next != 0 && next != expected => Err(ApiError::contract(format!(
            "expected next list chunk at {expected}, got {next}"
        ))),
        _ => Ok(()),
    }
}

fn ok_items(items: Vec<Value>) -> impl Stream<Item = Result<Value, ApiError>> {
    stream::iter(items.into_iter().map(Ok))
}

/// End the stream at the first error, so pages queued behind a failed one
/// never leak through after it.
fn until_first_error<S>(items: S) -> impl Stream<Item = Result<Value, ApiError>>
where
    S: Stream<Item = Result<Value, ApiError>>,
{
    items.scan(false, |failed, item| {
        if *failed {
            return ready(None);
        }
        *failed = item.is_err();
        ready(Some(item))
    })
}

/// Append `id_key` to an explicit selection; `"*"` already covers it.
fn ensure_id_selected(request: &mut ListRequest, id_key: &str) {
    let select = &mut request.parameters.select;
    if !select.iter().any(|field| field == "*" || field == id_key) {
        select.push(id_key.to_string());
    }
}

enum SeqState {
    Head(Request),
    Page {
        request: Request,
        start: i64,
        total: i64,
    },
    Done,
}

impl Client {
    /// Sequential-tail traversal: O(total / list_size) round trips.
    pub fn list_sequential(
        &self,
        request: Request,
    ) -> impl Stream<Item = Result<Value, ApiError>> + '_ {
        let list_size = self.config().list_size as i64;

        stream::try_unfold(SeqState::Head(request), move |state| async move {
            match state {
                SeqState::Head(request) => {
                    let response = self.call_response(&with_start(&request, 0)).await?;
                    expect_next(&response, list_size)?;
                    let total = response.total.unwrap_or(0);
                    let items = normalize_list(response.result)?;
                    let next = if list_size < total {
                        SeqState::Page {
                            request,
                            start: list_size,
                            total,
                        }
                    } else {
                        SeqState::Done
                    };
                    Ok(Some((items, next)))
                }
                SeqState::Page {
                    request,
                    start,
                    total,
                } => {
                    let response = self.call_response(&with_start(&request, start)).await?;
                    expect_next(&response, start + list_size)?;
                    let items = normalize_list(response.result)?;
                    let next = if start + list_size < total {
                        SeqState::Page {
                            request,
                            start: start + list_size,
                            total,
                        }
                    } else {
                        SeqState::Done
                    };
                    Ok(Some((items, next)))
                }
                SeqState::Done => Ok(None),
            }
        })
        .map_ok(|items| ok_items(items))
        .try_flatten()
    }

    /// Batched-tail traversal: the head page is fetched directly, every
    /// remaining offset is generated lazily and pushed through the batch
    /// executor.
    pub fn list_batched(
        &self,
        request: Request,
    ) -> impl Stream<Item = Result<Value, ApiError>> + '_ {
        let list_size = self.config().list_size as i64;
        let step = self.config().list_size.max(1);
        let batch_size = self.config().batch_size;

        stream::once(async move {
            let head = self.call_response(&with_start(&request, 0)).await?;
            expect_next(&head, list_size)?;
            let total = head.total.unwrap_or(0);
            let head_items = normalize_list(head.result)?;

            let tail_requests = stream::iter(
                (list_size..total)
                    .step_by(step)
                    .map(move |start| with_start(&request, start)),
            );
            let expected_nexts =
                stream::iter((list_size..total).step_by(step).map(move |start| start + list_size));
            let tail = self
                .batch_responses(tail_requests, batch_size)
                .zip(expected_nexts)
                .map(|(page, expected)| {
                    let response = page?;
                    expect_next(&response, expected)?;
                    normalize_list(response.result)
                })
                .map_ok(ok_items)
                .try_flatten();

            Ok::<_, ApiError>(until_first_error(ok_items(head_items).chain(tail)))
        })
        .try_flatten()
    }

    /// Cursor-range traversal without a row count.
    ///
    /// Requires a numeric, monotonically ordered id field and an endpoint
    /// accepting range predicates on it. The caller must leave `order` and
    /// the `>{id}`/`<{id}` filters to the algorithm. Output is id-ascending
    /// except that boundary snapshots make rows inserted beyond the tail or
    /// before the head during the run invisible.
    pub fn list_batched_no_count(
        &self,
        request: ListRequest,
    ) -> impl Stream<Item = Result<Value, ApiError>> + '_ {
        let list_size = self.config().list_size as i64;
        let batch_size = self.config().batch_size;
        let id_key = self.config().id_key.clone();

        stream::once(async move {
            let mut request = request;
            ensure_id_selected(&mut request, &id_key);

            let id_from = format!(">{id_key}");
            let id_to = format!("<{id_key}");
            if request.parameters.filter.contains_key(&id_from)
                || request.parameters.filter.contains_key(&id_to)
            {
                return Err(ApiError::contract(format!(
                    "filter keys `{id_from}` and `{id_to}` are reserved by no-count list gathering"
                )));
            }
            if !request.parameters.order.is_empty() {
                return Err(ApiError::contract(
                    "the `order` parameter is reserved by no-count list gathering",
                ));
            }

            // Boundary reads: first page ascending, last page descending,
            // both with the start=-1 no-paging sentinel, in one batch.
            let mut head_request = request.clone();
            head_request.parameters.start = Some(-1);
            head_request.parameters.order.insert(id_key.clone(), "ASC".into());
            let mut tail_request = request.clone();
            tail_request.parameters.start = Some(-1);
            tail_request.parameters.order.insert(id_key.clone(), "DESC".into());

            let boundary_pages: Vec<Value> = self
                .batch(
                    stream::iter([head_request.to_request(), tail_request.to_request()]),
                    2,
                )
                .try_collect()
                .await?;
            let mut boundary_pages = boundary_pages.into_iter();
            let head = normalize_list(boundary_pages.next().unwrap_or(Value::Array(vec![])))?;
            let tail = normalize_list(boundary_pages.next().unwrap_or(Value::Array(vec![])))?;

            let mut max_head = None;
            for item in &head {
                let id = item_id(item, &id_key)?;
                max_head = Some(max_head.map_or(id, |current: i64| current.max(id)));
            }
            let mut min_tail = None;
            for item in &tail {
                let id = item_id(item, &id_key)?;
                min_tail = Some(min_tail.map_or(id, |current: i64| current.min(id)));
            }

            // Ids strictly between the boundary pages; empty unless both
            // pages were full and disjoint.
            let gap = match (max_head, min_tail) {
                (Some(low), Some(high)) if low < high => Some((low, high)),
                _ => None,
            };
            let (gap_low, gap_high) = gap.unwrap_or((0, 0));
            let base = request.clone();
            let body_id_key = id_key.clone();
            let body_requests = stream::iter(
                (gap_low..gap_high.saturating_sub(1))
                    .step_by(list_size.max(1) as usize)
                    .map(move |start| {
                        // Exclusive bounds on both sides: (start, upper)
                        // spans at most list_size ids, so a page cannot
                        // overflow even on a dense range.
                        let upper = (start + list_size + 1).min(gap_high);
                        let mut body_request = base.clone();
                        body_request.parameters.start = Some(-1);
                        body_request
                            .parameters
                            .filter
                            .insert(id_from.clone(), ParamValue::Int(start));
                        body_request
                            .parameters
                            .filter
                            .insert(id_to.clone(), ParamValue::Int(upper));
                        body_request
                            .parameters
                            .order
                            .insert(body_id_key.clone(), "ASC".into());
                        body_request.to_request()
                    }),
            );
            let body = self
                .batch(body_requests, batch_size)
                .map(|page| page.and_then(normalize_list))
                .map_ok(ok_items)
                .try_flatten();

            // The tail was fetched descending; re-reverse it and drop
            // everything at or below max_head, which the head and body
            // already covered.
            let mut tail_items = Vec::with_capacity(tail.len());
            for item in tail.into_iter().rev() {
                if let Some(low) = max_head {
                    if item_id(&item, &id_key)? <= low {
                        continue;
                    }
                }
                tail_items.push(Ok(item));
            }

            Ok(until_first_error(
                ok_items(head).chain(body).chain(stream::iter(tail_items)),
            ))
        })
        .try_flatten()
    }
}
