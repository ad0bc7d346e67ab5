//! Message shape identity and schema reconstruction.
//!
//! Every decoded [`Message`](crate::Message) gets a structural
//! [`signature`]: the ordered `(field id, wire type)` pairs of the first
//! occurrence of each field id. A [`SchemaRegistry`] maps signatures to small
//! integer identifiers so that repeated occurrences of the same shape, within
//! one buffer or across many, are rendered as one `MessageN` definition.
//!
//! The registry is an explicit session value. Decode calls borrow it mutably,
//! and [`SchemaRegistry::reset`] starts an independent session.

pub mod descriptor;
mod printer;

use crate::message::Field;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as FmtWrite;
use tracing::trace;

pub use printer::{type_name, PrinterConfig, SchemaPrinter};

/// Identifier handed out to the first shape of a fresh session
pub const FIRST_SCHEMA_ID: u32 = 1;

/// Build the structural fingerprint of a field list.
///
/// Pairs are written as `id:wire` and joined with `,`, so `[(1, varint),
/// (2, length-delimited)]` becomes `"1:0,2:2"`. Values and repeat counts do
/// not contribute.
pub fn signature(fields: &[Field]) -> String {
    let mut seen = HashSet::new();
    let mut out = String::new();
    for field in fields.iter().filter(|field| seen.insert(field.id)) {
        if !out.is_empty() {
            out.push(',');
        }
        // Writing to a String cannot fail
        let _ = write!(out, "{}:{}", field.id, field.wire_type().bits());
    }
    out
}

/// Session-scoped map from signature to schema identifier
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    ids: HashMap<String, u32>,
    next_id: u32,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    /// Creates an empty registry for a new session
    pub fn new() -> Self {
        Self {
            ids: HashMap::new(),
            next_id: FIRST_SCHEMA_ID,
        }
    }

    /// Return the id for `signature`, assigning the next free one if unseen
    pub fn assign(&mut self, signature: &str) -> u32 {
        if let Some(&id) = self.ids.get(signature) {
            trace!("Signature [{}] reuses Message{}", signature, id);
            return id;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(signature.to_string(), id);
        trace!("Signature [{}] assigned Message{}", signature, id);
        id
    }

    /// Look up an already assigned id
    pub fn get(&self, signature: &str) -> Option<u32> {
        self.ids.get(signature).copied()
    }

    /// Number of distinct shapes seen this session
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if nothing was registered yet
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Identifier the next unseen shape will get
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// Forget every assignment and restart numbering
    pub fn reset(&mut self) {
        self.ids.clear();
        self.next_id = FIRST_SCHEMA_ID;
    }

    /// All assignments ordered by identifier
    pub fn entries(&self) -> Vec<(u32, &str)> {
        let mut entries: Vec<_> = self
            .ids
            .iter()
            .map(|(sig, &id)| (id, sig.as_str()))
            .collect();
        entries.sort_unstable_by_key(|(id, _)| *id);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::FieldValue;
    use crate::span::ByteSpan;

    fn field(id: u32, value: FieldValue) -> Field {
        Field {
            id,
            value,
            tag_span: ByteSpan::default(),
            value_span: ByteSpan::default(),
        }
    }

    #[test]
    fn test_signature_uses_first_occurrences() {
        let fields = vec![
            field(1, FieldValue::Varint(1)),
            field(3, FieldValue::Fixed32(1.0)),
            field(1, FieldValue::Varint(2)),
            field(2, FieldValue::Fixed64(0.5)),
        ];
        assert_eq!(signature(&fields), "1:0,3:5,2:1");
        assert_eq!(signature(&[]), "");
    }

    #[test]
    fn test_signature_ignores_values_and_counts() {
        let a = vec![field(1, FieldValue::Varint(1))];
        let b = vec![
            field(1, FieldValue::Varint(99)),
            field(1, FieldValue::Varint(100)),
        ];
        assert_eq!(signature(&a), signature(&b));
    }

    #[test]
    fn test_assign_is_stable() {
        let mut registry = SchemaRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.assign("1:0"), 1);
        assert_eq!(registry.assign("1:0,2:2"), 2);
        assert_eq!(registry.assign("1:0"), 1);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("1:0,2:2"), Some(2));
        assert_eq!(registry.next_id(), 3);
        assert_eq!(registry.entries(), vec![(1, "1:0"), (2, "1:0,2:2")]);
    }

    #[test]
    fn test_reset_starts_new_session() {
        let mut registry = SchemaRegistry::new();
        registry.assign("1:0");
        registry.assign("2:0");
        registry.reset();
        assert!(registry.is_empty());
        assert_eq!(registry.get("1:0"), None);
        assert_eq!(registry.assign("2:0"), FIRST_SCHEMA_ID);
    }
}
