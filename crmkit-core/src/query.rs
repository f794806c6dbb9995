//! PHP-style bracketed query-string encoding.
//!
//! The API is PHP on the other end: nested parameter structures flatten to
//! `key[sub][0]=value` pairs, lists are encoded as maps keyed by index, and
//! null-valued keys disappear. Escaping follows `quote_plus` semantics:
//! `- . _ ~` stay literal, space becomes `+`, everything else is
//! percent-encoded (including `[` and `]` in the flattened keys).

use indexmap::IndexMap;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::request::ParamValue;

/// Unreserved characters plus space, which is translated to `+` afterwards.
const QUERY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b' ')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn escape(raw: &str) -> String {
    utf8_percent_encode(raw, QUERY).to_string().replace(' ', "+")
}

/// Encode an ordered parameter map into a flat query string.
pub fn encode(parameters: &IndexMap<String, ParamValue>) -> String {
    let mut pairs = Vec::new();
    for (key, value) in parameters {
        encode_value(&mut pairs, key, value);
    }
    pairs.join("&")
}

fn encode_value(pairs: &mut Vec<String>, key: &str, value: &ParamValue) {
    match value {
        ParamValue::Null => {}
        ParamValue::List(items) => {
            for (index, item) in items.iter().enumerate() {
                encode_value(pairs, &format!("{key}[{index}]"), item);
            }
        }
        ParamValue::Map(map) => {
            for (subkey, subvalue) in map {
                encode_value(pairs, &format!("{key}[{subkey}]"), subvalue);
            }
        }
        scalar => {
            if let Some(text) = scalar.scalar_string() {
                pairs.push(format!("{}={}", escape(key), escape(&text)));
            }
        }
    }
}
