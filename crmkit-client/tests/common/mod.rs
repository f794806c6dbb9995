#![allow(dead_code)]

use std::time::Duration;

use crmkit_client::{ApiConfig, Client};
use serde_json::{json, Map, Value};

/// A plausible `time` block; the engine parses it but never inspects it.
pub fn default_time() -> Value {
    json!({
        "start": 1741699660.029826,
        "finish": 1741699660.111687,
        "duration": 0.08186101913452148,
        "processing": 0.0500180721282959,
        "date_start": "2025-03-11T16:27:40+03:00",
        "date_finish": "2025-03-11T16:27:40+03:00",
        "operating_reset_at": 1741700260,
        "operating": 1.8415930271148682,
    })
}

pub fn config(url: &str, list_size: usize, batch_size: usize) -> ApiConfig {
    let mut config = ApiConfig::new(format!("{url}/"));
    config.retry_delay = Duration::from_millis(1);
    config.list_size = list_size;
    config.batch_size = batch_size;
    config
}

pub fn client(server: &mockito::ServerGuard, list_size: usize, batch_size: usize) -> Client {
    init_tracing();
    Client::new(config(&server.url(), list_size, batch_size)).unwrap()
}

/// Honor `RUST_LOG` in test output; repeated calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Decode a `quote_plus`-escaped query string into key/value pairs.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (unquote(key), unquote(value))
        })
        .collect()
}

fn unquote(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_encoding::percent_decode_str(&spaced)
        .decode_utf8_lossy()
        .into_owned()
}

pub fn lookup<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(candidate, _)| candidate == key)
        .map(|(_, value)| value.as_str())
}

/// Wrap per-command outputs into a full `batch` success envelope, with a
/// `result_time` entry for every answered key and the PHP empty-list quirk
/// on the remaining maps.
pub fn batch_envelope(output: Map<String, Value>) -> Vec<u8> {
    let times: Map<String, Value> = output
        .keys()
        .map(|key| (key.clone(), default_time()))
        .collect();
    json!({
        "result": {
            "result": output,
            "result_error": [],
            "result_total": [],
            "result_next": [],
            "result_time": times,
        },
        "time": default_time(),
    })
    .to_string()
    .into_bytes()
}
