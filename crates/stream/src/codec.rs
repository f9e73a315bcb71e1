/*!
 * Redis Reply Decoding
 *
 * Stream commands come back as nested `redis::Value` trees; this module
 * normalizes them into `StreamEntry` values and flat string maps. Byte
 * payloads are decoded to UTF-8 recursively through maps and lists.
 *
 * Reply shapes handled here:
 *
 * - XREADGROUP / XREAD: `Bulk([Bulk([Data(stream), Bulk([entry, ...])])])`
 * - XRANGE / XREVRANGE: `Bulk([entry, ...])`
 * - XAUTOCLAIM: `Bulk([Data(next_id), Bulk([entry, ...]), ...])`
 * - XINFO GROUPS / CONSUMERS: `Bulk([Bulk([key, value, ...]), ...])`
 *
 * where each entry is `Bulk([Data(id), Bulk([field, value, ...])])`.
 */

use std::collections::HashMap;

use pulse_domain::StreamEntry;
use redis::Value;

/// Decode a scalar reply element to a string, if it is one.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Data(bytes) => Some(String::from_utf8_lossy(bytes).to_string()),
        Value::Status(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Okay => Some("OK".to_string()),
        Value::Nil | Value::Bulk(_) => None,
    }
}

/// Decode any reply tree to JSON (for XINFO STREAM and friends).
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Nil => serde_json::Value::Null,
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Data(bytes) => serde_json::Value::from(String::from_utf8_lossy(bytes).to_string()),
        Value::Status(s) => serde_json::Value::from(s.clone()),
        Value::Okay => serde_json::Value::from("OK"),
        Value::Bulk(items) => {
            serde_json::Value::Array(items.iter().map(value_to_json).collect())
        }
    }
}

/// Decode an alternating `[key, value, key, value, ...]` reply into a flat
/// string map. Non-scalar values are skipped.
pub fn pairs_to_map(value: &Value) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Value::Bulk(items) = value {
        for chunk in items.chunks(2) {
            if chunk.len() == 2 {
                if let (Some(k), Some(v)) = (value_to_string(&chunk[0]), value_to_string(&chunk[1]))
                {
                    map.insert(k, v);
                }
            }
        }
    }
    map
}

/// Parse one `[id, [field, value, ...]]` entry.
pub fn parse_entry(value: &Value) -> Option<StreamEntry> {
    let Value::Bulk(parts) = value else {
        return None;
    };
    if parts.len() < 2 {
        return None;
    }

    let id = value_to_string(&parts[0])?;
    let data = pairs_to_map(&parts[1]);
    Some(StreamEntry { id, data })
}

/// Parse a flat entry list (XRANGE / XREVRANGE reply, or the entry list
/// inside other replies). Unparseable items are dropped.
pub fn parse_entry_list(value: &Value) -> Vec<StreamEntry> {
    let Value::Bulk(items) = value else {
        return Vec::new();
    };
    items.iter().filter_map(parse_entry).collect()
}

/// Parse an XREADGROUP / XREAD reply. The reply carries one inner list per
/// stream; we only ever ask for one stream but concatenate defensively.
pub fn parse_read_reply(value: &Value) -> Vec<StreamEntry> {
    let Value::Bulk(streams) = value else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for stream in streams {
        if let Value::Bulk(parts) = stream {
            // parts[0] = stream name, parts[1] = entries
            if let Some(entry_list) = parts.get(1) {
                entries.extend(parse_entry_list(entry_list));
            }
        }
    }
    entries
}

/// Parse an XAUTOCLAIM reply: `[next_start_id, [entry, ...], deleted_ids]`.
/// Entries that no longer exist come back as nil and are dropped.
pub fn parse_autoclaim_reply(value: &Value) -> Vec<StreamEntry> {
    let Value::Bulk(parts) = value else {
        return Vec::new();
    };
    match parts.get(1) {
        Some(entry_list) => parse_entry_list(entry_list),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(s: &str) -> Value {
        Value::Data(s.as_bytes().to_vec())
    }

    fn entry(id: &str, fields: &[(&str, &str)]) -> Value {
        let mut kv = Vec::new();
        for (k, v) in fields {
            kv.push(data(k));
            kv.push(data(v));
        }
        Value::Bulk(vec![data(id), Value::Bulk(kv)])
    }

    #[test]
    fn test_value_to_string_scalars() {
        assert_eq!(value_to_string(&data("abc")), Some("abc".to_string()));
        assert_eq!(value_to_string(&Value::Int(42)), Some("42".to_string()));
        assert_eq!(value_to_string(&Value::Nil), None);
    }

    #[test]
    fn test_parse_entry() {
        let parsed = parse_entry(&entry("1-0", &[("name", "login"), ("site", "s1")])).unwrap();
        assert_eq!(parsed.id, "1-0");
        assert_eq!(parsed.data.get("name").unwrap(), "login");
        assert_eq!(parsed.data.get("site").unwrap(), "s1");
    }

    #[test]
    fn test_parse_read_reply() {
        let reply = Value::Bulk(vec![Value::Bulk(vec![
            data("site1:pulse:events"),
            Value::Bulk(vec![
                entry("1-0", &[("name", "a")]),
                entry("1-1", &[("name", "b")]),
            ]),
        ])]);

        let entries = parse_read_reply(&reply);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "1-0");
        assert_eq!(entries[1].data.get("name").unwrap(), "b");
    }

    #[test]
    fn test_parse_read_reply_empty() {
        assert!(parse_read_reply(&Value::Nil).is_empty());
        assert!(parse_read_reply(&Value::Bulk(vec![])).is_empty());
    }

    #[test]
    fn test_parse_autoclaim_reply() {
        // [next_start_id, [entries...], deleted_ids]
        let reply = Value::Bulk(vec![
            data("0-0"),
            Value::Bulk(vec![
                entry("2-0", &[("name", "claimed")]),
                Value::Nil, // trimmed-away entry
            ]),
            Value::Bulk(vec![]),
        ]);

        let entries = parse_autoclaim_reply(&reply);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "2-0");
    }

    #[test]
    fn test_pairs_to_map_mixed_types() {
        // XINFO GROUPS group reply mixes strings and integers
        let reply = Value::Bulk(vec![
            data("name"),
            data("event_processors"),
            data("pending"),
            Value::Int(3),
            data("lag"),
            Value::Int(7),
        ]);

        let map = pairs_to_map(&reply);
        assert_eq!(map.get("name").unwrap(), "event_processors");
        assert_eq!(map.get("pending").unwrap(), "3");
        assert_eq!(map.get("lag").unwrap(), "7");
    }

    #[test]
    fn test_value_to_json_nested() {
        let reply = Value::Bulk(vec![data("length"), Value::Int(10), Value::Nil]);
        let json = value_to_json(&reply);
        assert_eq!(json[0], "length");
        assert_eq!(json[1], 10);
        assert!(json[2].is_null());
    }
}
