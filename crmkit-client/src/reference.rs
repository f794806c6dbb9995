//! Fan-out cursor walks: many independent id-ascending traversals of one
//! list endpoint, one per reference value (e.g. per parent entity), packed
//! into shared batches.
//!
//! Unlike [`Client::list_batched_no_count`](crate::client::Client) there is
//! no tail read and no count at all: each walk advances by filtering
//! `>{id}` past the last id it has seen, and a round trip carries up to
//! `batch_size` walks at once. Items are ascending per reference but carry
//! no global order across references or rounds.

use std::collections::VecDeque;

use crmkit_core::{item_id, normalize_list, ApiError, ListRequest, ParamValue};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::client::Client;

/// An extra filter merged into the base request to pin one walk to its
/// reference value, e.g. `{"=ENTITY_ID": 7}`.
pub type FilterUpdate = IndexMap<String, ParamValue>;

struct FanOut<I> {
    updates: I,
    queue: VecDeque<ListRequest>,
}

impl Client {
    /// Walk the endpoint once per filter update, sharing batches across
    /// walks. The update stream may be lazy and unbounded; at most
    /// `batch_size` walks are in flight per round trip.
    ///
    /// A page of exactly `list_size` items is treated as continuable even
    /// when it happens to be final, so an exact-multiple walk issues one
    /// harmless empty trailing request; a shorter page ends the walk.
    pub fn reference_batched_no_count<'a, I>(
        &'a self,
        request: ListRequest,
        updates: I,
    ) -> impl Stream<Item = Result<Value, ApiError>> + 'a
    where
        I: IntoIterator<Item = FilterUpdate> + 'a,
    {
        let list_size = self.config().list_size;
        let batch_size = self.config().batch_size.max(1);
        let id_key = self.config().id_key.clone();

        stream::once(async move {
            let mut base = request;
            ensure_base_is_walkable(&mut base, &id_key)?;
            let cursor_key = format!(">{id_key}");

            let state = FanOut {
                updates: updates.into_iter(),
                queue: VecDeque::new(),
            };

            Ok::<_, ApiError>(stream::try_unfold(state, move |mut state| {
                let base = base.clone();
                let id_key = id_key.clone();
                let cursor_key = cursor_key.clone();
                async move {
                    // Refill the round: pending continuations first, then
                    // fresh walks from the reference stream.
                    let mut walks = Vec::with_capacity(batch_size);
                    while walks.len() < batch_size {
                        if let Some(walk) = state.queue.pop_front() {
                            walks.push(walk);
                            continue;
                        }
                        match state.updates.next() {
                            Some(update) => walks.push(start_walk(&base, update, &cursor_key)?),
                            None => break,
                        }
                    }
                    if walks.is_empty() {
                        return Ok(None);
                    }

                    debug!(walks = walks.len(), "reference walk round");
                    let responses = self
                        .batch_chunk(walks.iter().map(ListRequest::to_request).collect())
                        .await?;

                    let mut round_items = Vec::new();
                    for (walk, response) in walks.iter().zip(responses) {
                        let items = normalize_list(response.result)?;
                        if items.len() == list_size {
                            // Full page: this reference may have more rows
                            // past the largest id seen so far.
                            let mut max_id = None;
                            for item in &items {
                                let id = item_id(item, &id_key)?;
                                max_id = Some(max_id.map_or(id, |current: i64| current.max(id)));
                            }
                            if let Some(max_id) = max_id {
                                let mut continuation = walk.clone();
                                continuation
                                    .parameters
                                    .filter
                                    .insert(cursor_key.clone(), ParamValue::Int(max_id));
                                state.queue.push_back(continuation);
                            }
                        }
                        round_items.extend(items);
                    }
                    Ok(Some((round_items, state)))
                }
            })
            .map_ok(|items| stream::iter(items.into_iter().map(Ok)))
            .try_flatten())
        })
        .try_flatten()
    }
}

fn ensure_base_is_walkable(base: &mut ListRequest, id_key: &str) -> Result<(), ApiError> {
    let cursor_key = format!(">{id_key}");
    if base.parameters.filter.contains_key(&cursor_key) {
        return Err(ApiError::contract(format!(
            "filter key `{cursor_key}` is reserved by reference list gathering"
        )));
    }
    if !base.parameters.order.is_empty() {
        return Err(ApiError::contract(
            "the `order` parameter is reserved by reference list gathering",
        ));
    }
    let select = &mut base.parameters.select;
    if !select.iter().any(|field| field == "*" || field == id_key) {
        select.push(id_key.to_string());
    }
    base.parameters.order.insert(id_key.to_string(), "ASC".into());
    base.parameters.start = Some(-1);
    Ok(())
}

/// Merge one reference's filter update into the prepared base request.
fn start_walk(
    base: &ListRequest,
    update: FilterUpdate,
    cursor_key: &str,
) -> Result<ListRequest, ApiError> {
    if update.contains_key(cursor_key) {
        return Err(ApiError::contract(format!(
            "filter key `{cursor_key}` is reserved by reference list gathering"
        )));
    }
    let mut walk = base.clone();
    walk.parameters.filter.extend(update);
    Ok(walk)
}
