//! Per-PGN state store (§3, §4.2 update rule).

use std::collections::HashMap;

/// One observed record for a given (PGN, src, key2).
#[derive(Debug, Clone)]
pub struct Message {
    pub src: u8,
    pub key2: Option<String>,
    pub expires_at: u64,
    pub text: String,
}

/// Every PGN ever observed, with its messages grown on demand.
#[derive(Debug, Clone)]
pub struct PgnEntry {
    pub prn: u32,
    pub description: Option<String>,
    pub messages: Vec<Message>,
}

/// Mapping from PGN to `PgnEntry`, with insertion order preserved for
/// snapshot iteration.
#[derive(Debug, Default)]
pub struct Store {
    entries: HashMap<u32, PgnEntry>,
    order: Vec<u32>,
}

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    pub fn order(&self) -> &[u32] {
        &self.order
    }

    pub fn entry(&self, prn: u32) -> Option<&PgnEntry> {
        self.entries.get(&prn)
    }

    /// Apply the §4.2 update rule for one ingested record.
    pub fn update(
        &mut self,
        prn: u32,
        src: u8,
        key2: Option<String>,
        text: String,
        expires_at: u64,
        description: Option<String>,
        now: u64,
    ) {
        if !self.entries.contains_key(&prn) {
            self.order.push(prn);
        }
        let entry = self.entries.entry(prn).or_insert_with(|| PgnEntry {
            prn,
            description: None,
            messages: Vec::new(),
        });
        if entry.description.is_none() {
            entry.description = description;
        }

        if let Some(slot) = entry
            .messages
            .iter_mut()
            .find(|m| m.src == src && m.key2 == key2)
        {
            slot.text = text;
            slot.expires_at = expires_at;
            return;
        }
        if let Some(slot) = entry.messages.iter_mut().find(|m| m.expires_at < now) {
            slot.src = src;
            slot.key2 = key2;
            slot.text = text;
            slot.expires_at = expires_at;
            return;
        }
        entry.messages.push(Message {
            src,
            key2,
            expires_at,
            text,
        });
    }
}
