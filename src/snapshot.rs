//! Snapshot builder (§4.3).
//!
//! A `PgnEntry` whose every message has expired is omitted entirely — the
//! store's insertion order names every PGN ever seen, but §8 guarantees the
//! snapshot's top-level keys are only the PGNs with at least one live
//! message, so a fully-expired entry contributes nothing.

use std::fmt::Write as _;

use crate::store::{Message, Store};

pub fn build_snapshot(store: &Store, now: u64) -> String {
    let mut out = String::from("{");
    let mut wrote_prn = false;
    for &prn in store.order() {
        let Some(entry) = store.entry(prn) else {
            continue;
        };
        let live: Vec<&Message> = entry
            .messages
            .iter()
            .filter(|m| m.expires_at >= now)
            .collect();
        if live.is_empty() {
            continue;
        }
        if wrote_prn {
            out.push(',');
        }
        wrote_prn = true;

        let _ = write!(out, "\"{prn}\":{{");
        let description = entry.description.as_deref().unwrap_or("");
        let description_json =
            serde_json::to_string(description).unwrap_or_else(|_| "\"\"".to_string());
        let _ = write!(out, "\"description\":{description_json}");
        for msg in live {
            let key = match &msg.key2 {
                Some(k) => format!("{}_{}", msg.src, k),
                None => msg.src.to_string(),
            };
            let _ = write!(out, ",\"{key}\":{}", msg.text);
        }
        out.push('}');
    }
    out.push('}');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn record(src: &str, pgn: &str) -> String {
        format!(
            "{{\"timestamp\":\"t\",\"src\":\"{src}\",\"dst\":\"255\",\"pgn\":\"{pgn}\",\"description\":\"Water Depth\",\"fields\":{{\"Depth\":3.1}}}}"
        )
    }

    #[test]
    fn snapshot_contains_record_under_prn_and_src() {
        let mut store = Store::new();
        let text = record("35", "128267");
        store.update(128267, 35, None, text.clone(), 1_500, Some("Water Depth".into()), 1_000);
        let snap = build_snapshot(&store, 1_000);
        let parsed: serde_json::Value = serde_json::from_str(&snap).unwrap();
        assert_eq!(parsed["128267"]["description"], "Water Depth");
        assert_eq!(parsed["128267"]["35"]["fields"]["Depth"], 3.1);
    }

    #[test]
    fn multiple_sources_both_present() {
        let mut store = Store::new();
        store.update(128267, 35, None, record("35", "128267"), 1_500, None, 1_000);
        store.update(128267, 36, None, record("36", "128267"), 1_500, None, 1_000);
        let snap = build_snapshot(&store, 1_000);
        let parsed: serde_json::Value = serde_json::from_str(&snap).unwrap();
        assert!(parsed["128267"]["35"].is_object());
        assert!(parsed["128267"]["36"].is_object());
    }

    #[test]
    fn secondary_key_children_are_named_src_underscore_key() {
        let mut store = Store::new();
        store.update(
            129038,
            1,
            Some("366123".into()),
            record("1", "129038"),
            4_600,
            None,
            1_000,
        );
        let snap = build_snapshot(&store, 1_000);
        let parsed: serde_json::Value = serde_json::from_str(&snap).unwrap();
        assert!(parsed["129038"]["1_366123"].is_object());
    }

    #[test]
    fn fully_expired_entry_is_omitted_from_top_level() {
        let mut store = Store::new();
        store.update(129025, 1, None, record("1", "129025"), 1_100, None, 1_000);
        let snap = build_snapshot(&store, 1_200);
        let parsed: serde_json::Value = serde_json::from_str(&snap).unwrap();
        assert!(parsed.get("129025").is_none());
    }

    #[test]
    fn empty_store_yields_empty_object() {
        let store = Store::new();
        assert_eq!(build_snapshot(&store, 0), "{}");
    }
}
