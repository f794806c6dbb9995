//! Fan-out cursor walks: one traversal per reference value, batched.

mod common;

use std::sync::{Arc, Mutex};

use crmkit_client::{ApiError, FilterUpdate, ListRequest, ParamValue};
use futures::stream::TryStreamExt;
use serde_json::{json, Value};

use common::{batch_envelope, client, lookup, parse_query};

type RequestLog = Arc<Mutex<Vec<Vec<Vec<(String, String)>>>>>;

/// Comments spread unevenly across five parent entities: none, one, an
/// exact page multiple, one page plus a remainder, and three pages' worth
/// at `list_size` 3.
const COMMENT_COUNTS: [usize; 5] = [0, 1, 3, 4, 7];

fn dataset() -> Vec<Value> {
    let mut items = Vec::new();
    let mut id = 0i64;
    for (entity, count) in COMMENT_COUNTS.iter().enumerate() {
        for _ in 0..*count {
            items.push(json!({"ID": id, "ENTITY_ID": entity, "COMMENT": format!("c{id}")}));
            id += 1;
        }
    }
    items
}

fn entity_filter(entity: i64) -> FilterUpdate {
    let mut update = FilterUpdate::new();
    update.insert("=ENTITY_ID".into(), ParamValue::Int(entity));
    update
}

/// Answer one composite call the way the comment endpoint would: pin to
/// the requested entity, apply the `>ID` cursor, cap at `list_size`.
fn comment_server(
    items: Vec<Value>,
    list_size: usize,
    log: RequestLog,
) -> impl Fn(&mockito::Request) -> Vec<u8> + Send + Sync + 'static {
    move |request| {
        let body: Value = serde_json::from_slice(request.body().unwrap()).unwrap();
        assert_eq!(body["halt"], json!(true));
        let cmd = body["cmd"].as_object().unwrap();

        let mut round = Vec::new();
        let mut output = serde_json::Map::new();
        for index in 0..cmd.len() {
            let key = format!("_{index}");
            let command = cmd[&key].as_str().unwrap();
            let (method, query) = command.split_once('?').unwrap();
            assert_eq!(method, "crm.timeline.comment.list");

            let pairs = parse_query(query);
            assert_eq!(lookup(&pairs, "start"), Some("-1"));
            assert_eq!(lookup(&pairs, "order[ID]"), Some("ASC"));
            let entity: i64 = lookup(&pairs, "filter[=ENTITY_ID]").unwrap().parse().unwrap();
            let from: i64 = lookup(&pairs, "filter[>ID]").map_or(-1, |v| v.parse().unwrap());

            let data: Vec<Value> = items
                .iter()
                .filter(|item| {
                    item["ENTITY_ID"].as_i64() == Some(entity)
                        && item["ID"].as_i64().unwrap() > from
                })
                .take(list_size)
                .cloned()
                .collect();

            output.insert(key, json!(data));
            round.push(pairs);
        }
        log.lock().unwrap().push(round);
        batch_envelope(output)
    }
}

async fn run_walks(list_size: usize, batch_size: usize) -> (Vec<Value>, RequestLog) {
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/batch")
        .with_body_from_request(comment_server(dataset(), list_size, log.clone()))
        .expect_at_least(1)
        .create_async()
        .await;

    let api = client(&server, list_size, batch_size);
    let request = ListRequest::new("crm.timeline.comment.list").select(["ID", "ENTITY_ID", "COMMENT"]);
    let updates = (0..COMMENT_COUNTS.len() as i64).map(entity_filter);
    let yielded: Vec<Value> = api
        .reference_batched_no_count(request, updates)
        .try_collect()
        .await
        .unwrap();
    (yielded, log)
}

fn sorted_by_id(mut items: Vec<Value>) -> Vec<Value> {
    items.sort_by_key(|item| item["ID"].as_i64().unwrap());
    items
}

#[tokio::test]
async fn every_reference_is_walked_to_exhaustion() {
    for batch_size in [1usize, 2, 50] {
        let (yielded, _) = run_walks(3, batch_size).await;
        assert_eq!(
            sorted_by_id(yielded),
            dataset(),
            "batch_size={batch_size}"
        );
    }
}

#[tokio::test]
async fn items_are_ascending_within_each_reference() {
    let (yielded, _) = run_walks(3, 2).await;
    for entity in 0..COMMENT_COUNTS.len() as i64 {
        let ids: Vec<i64> = yielded
            .iter()
            .filter(|item| item["ENTITY_ID"].as_i64() == Some(entity))
            .map(|item| item["ID"].as_i64().unwrap())
            .collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]), "entity {entity}: {ids:?}");
    }
}

#[tokio::test]
async fn request_counts_match_page_arithmetic() {
    let (_, log) = run_walks(3, 2).await;
    let rounds = log.lock().unwrap();

    let mut per_entity = [0usize; 5];
    for round in rounds.iter() {
        for pairs in round {
            let entity: usize = lookup(pairs, "filter[=ENTITY_ID]").unwrap().parse().unwrap();
            per_entity[entity] += 1;
        }
    }
    // An exhausted walk is only detected by a short page, so an exact page
    // multiple (entity 2) costs one extra empty read.
    assert_eq!(per_entity, [1, 1, 2, 2, 3]);
}

#[tokio::test]
async fn continuations_resume_past_the_largest_seen_id() {
    let (_, log) = run_walks(3, 2).await;
    let rounds = log.lock().unwrap();

    // Entity 4 owns ids 8..=14: pages (8,9,10), (11,12,13), (14).
    let cursors: Vec<Option<String>> = rounds
        .iter()
        .flatten()
        .filter(|pairs| lookup(pairs, "filter[=ENTITY_ID]") == Some("4"))
        .map(|pairs| lookup(pairs, "filter[>ID]").map(str::to_string))
        .collect();
    assert_eq!(
        cursors,
        [None, Some("10".to_string()), Some("13".to_string())]
    );
}

#[tokio::test]
async fn at_most_batch_size_walks_share_a_round() {
    let (_, log) = run_walks(3, 2).await;
    let rounds = log.lock().unwrap();
    assert!(rounds.iter().all(|round| round.len() <= 2));
    // Entities 0 and 1 fit one round, 2 and 3 the next.
    assert_eq!(rounds[0].len(), 2);
    assert_eq!(rounds[1].len(), 2);
}

#[tokio::test]
async fn update_with_a_cursor_filter_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/batch").expect(0).create_async().await;

    let api = client(&server, 3, 2);
    let request = ListRequest::new("crm.timeline.comment.list").select(["ID"]);
    let mut update = entity_filter(1);
    update.insert(">ID".into(), ParamValue::Int(10));
    let error = api
        .reference_batched_no_count(request, [update])
        .try_collect::<Vec<Value>>()
        .await
        .unwrap_err();
    assert!(matches!(error, ApiError::Contract(_)));
    mock.assert_async().await;
}

#[tokio::test]
async fn base_request_with_an_order_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/batch").expect(0).create_async().await;

    let api = client(&server, 3, 2);
    let request = ListRequest::new("crm.timeline.comment.list")
        .select(["ID"])
        .order("ID", "DESC");
    let error = api
        .reference_batched_no_count(request, [entity_filter(1)])
        .try_collect::<Vec<Value>>()
        .await
        .unwrap_err();
    assert!(matches!(error, ApiError::Contract(_)));
    mock.assert_async().await;
}

#[tokio::test]
async fn id_key_is_appended_to_an_explicit_selection() {
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/batch")
        .with_body_from_request(comment_server(dataset(), 3, log.clone()))
        .create_async()
        .await;

    let api = client(&server, 3, 2);
    let request = ListRequest::new("crm.timeline.comment.list").select(["COMMENT"]);
    let _: Vec<Value> = api
        .reference_batched_no_count(request, [entity_filter(1)])
        .try_collect()
        .await
        .unwrap();

    let rounds = log.lock().unwrap();
    let first = &rounds[0][0];
    assert_eq!(lookup(first, "select[0]"), Some("COMMENT"));
    assert_eq!(lookup(first, "select[1]"), Some("ID"));
}
