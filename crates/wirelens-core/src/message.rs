//! Decoded message trees.
//!
//! A [`Message`] owns its [`Field`]s, and every length-delimited field owns
//! the nested [`Message`] decoded from its payload. All spans are absolute
//! offsets into the buffer the root was decoded from.

use crate::error::Error;
use crate::span::ByteSpan;
use crate::wire::WireType;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Value of a decoded field, keyed by wire type
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Wire type 0, up to 128 bits
    Varint(u128),
    /// Wire type 1, read as a little-endian double
    Fixed64(f64),
    /// Wire type 5, read as a little-endian float
    Fixed32(f32),
    /// Wire type 2, always attempted as a nested message
    LengthDelimited {
        /// Declared payload length in bytes
        length: usize,
        /// Best-effort decode of the payload
        message: Message,
    },
}

impl FieldValue {
    /// Wire type this value was read with
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldValue::Varint(_) => WireType::Varint,
            FieldValue::Fixed64(_) => WireType::Fixed64,
            FieldValue::Fixed32(_) => WireType::Fixed32,
            FieldValue::LengthDelimited { .. } => WireType::LengthDelimited,
        }
    }

    /// The integer value of a varint field
    pub fn as_varint(&self) -> Option<u128> {
        match self {
            FieldValue::Varint(v) => Some(*v),
            _ => None,
        }
    }

    /// The nested message of a length-delimited field
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            FieldValue::LengthDelimited { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// One decoded field with its byte provenance
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field number from the tag
    pub id: u32,
    /// Decoded value
    pub value: FieldValue,
    /// Bytes of the tag varint
    pub tag_span: ByteSpan,
    /// Bytes of the value, including the length prefix for wire type 2
    pub value_span: ByteSpan,
}

impl Field {
    /// Wire type the field was encoded with
    pub fn wire_type(&self) -> WireType {
        self.value.wire_type()
    }

    /// Tag and value together
    pub fn span(&self) -> ByteSpan {
        ByteSpan::new(self.tag_span.begin, self.value_span.end)
    }

    /// Human-readable summary of id, wire type, byte sizes and scalar value
    pub fn description(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id {}, {}, tag {} byte(s), value {} byte(s)",
            self.id,
            self.wire_type(),
            self.tag_span.len(),
            self.value_span.len()
        )?;
        match &self.value {
            FieldValue::Varint(v) => write!(f, ": {}", v),
            FieldValue::Fixed64(v) => write!(f, ": {}", v),
            FieldValue::Fixed32(v) => write!(f, ": {}", v),
            FieldValue::LengthDelimited { length, message } => {
                write!(f, ": {} byte payload, Message{}", length, message.schema_id)?;
                if !message.is_complete() {
                    write!(f, " (partial)")?;
                }
                Ok(())
            }
        }
    }
}

/// Whether a field id occurs once or several times within a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// Occurs at most once
    Optional,
    /// Occurs more than once
    Repeated,
}

impl Label {
    /// Schema keyword
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Optional => "optional",
            Label::Repeated => "repeated",
        }
    }
}

/// A decoded (possibly partial) message
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Range the message was decoded from
    pub span: ByteSpan,
    /// Fields in wire order; they cover a prefix of `span`
    pub fields: Vec<Field>,
    /// Identifier shared by every message with the same signature in a session
    pub schema_id: u32,
    /// Structural fingerprint, see [`crate::schema::signature`]
    pub signature: String,
    /// Why decoding stopped before the end of `span`, if it did
    pub error: Option<Error>,
}

impl Message {
    /// Returns true if every byte of the span was decoded
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// The prefix of `span` covered by decoded fields
    pub fn decoded_span(&self) -> ByteSpan {
        let end = self
            .fields
            .last()
            .map(|field| field.value_span.end)
            .unwrap_or(self.span.begin);
        ByteSpan::new(self.span.begin, end)
    }

    /// First occurrence of each distinct field id, in wire order
    pub fn first_occurrences(&self) -> impl Iterator<Item = &Field> + '_ {
        let mut seen = HashSet::new();
        self.fields.iter().filter(move |field| seen.insert(field.id))
    }

    /// Repetition of every field id within this message instance
    pub fn labels(&self) -> HashMap<u32, Label> {
        let mut counts: HashMap<u32, usize> = HashMap::new();
        for field in &self.fields {
            *counts.entry(field.id).or_default() += 1;
        }
        counts
            .into_iter()
            .map(|(id, count)| {
                let label = if count > 1 {
                    Label::Repeated
                } else {
                    Label::Optional
                };
                (id, label)
            })
            .collect()
    }

    /// Repetition of a single field id
    pub fn label(&self, id: u32) -> Label {
        if self.fields.iter().filter(|field| field.id == id).count() > 1 {
            Label::Repeated
        } else {
            Label::Optional
        }
    }

    /// Nested messages directly owned by this one
    pub fn nested(&self) -> impl Iterator<Item = &Message> + '_ {
        self.fields.iter().filter_map(|field| field.value.as_message())
    }

    /// Start offset of every field, the boundaries a byte view groups by
    pub fn field_starts(&self) -> Vec<usize> {
        self.fields.iter().map(|field| field.tag_span.begin).collect()
    }

    /// The field whose tag or value covers `offset`
    pub fn field_at(&self, offset: usize) -> Option<&Field> {
        // Fields are sorted and contiguous
        let idx = self
            .fields
            .partition_point(|field| field.value_span.end <= offset);
        self.fields
            .get(idx)
            .filter(|field| field.span().contains(offset))
    }

    /// Chain of fields from this message down to the innermost one covering `offset`
    pub fn path_at(&self, offset: usize) -> Vec<&Field> {
        let mut path = Vec::new();
        let mut current = self;
        while let Some(field) = current.field_at(offset) {
            path.push(field);
            match field.value.as_message() {
                Some(nested) => current = nested,
                None => break,
            }
        }
        path
    }

    /// Every decode error in this tree, outermost first, with the span of the
    /// message that reported it
    pub fn errors(&self) -> Vec<(ByteSpan, &Error)> {
        let mut out = Vec::new();
        self.collect_errors(&mut out);
        out
    }

    fn collect_errors<'a>(&'a self, out: &mut Vec<(ByteSpan, &'a Error)>) {
        if let Some(err) = &self.error {
            out.push((self.span, err));
        }
        for nested in self.nested() {
            nested.collect_errors(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varint(id: u32, value: u128, at: usize) -> Field {
        Field {
            id,
            value: FieldValue::Varint(value),
            tag_span: ByteSpan::new(at, at + 1),
            value_span: ByteSpan::new(at + 1, at + 2),
        }
    }

    fn message(span: ByteSpan, fields: Vec<Field>) -> Message {
        Message {
            span,
            fields,
            schema_id: 1,
            signature: String::new(),
            error: None,
        }
    }

    #[test]
    fn test_labels() {
        let msg = message(
            ByteSpan::new(0, 6),
            vec![varint(1, 1, 0), varint(2, 5, 2), varint(1, 2, 4)],
        );
        assert_eq!(msg.label(1), Label::Repeated);
        assert_eq!(msg.label(2), Label::Optional);
        assert_eq!(msg.labels()[&1], Label::Repeated);

        let firsts: Vec<u32> = msg.first_occurrences().map(|f| f.id).collect();
        assert_eq!(firsts, vec![1, 2]);
    }

    #[test]
    fn test_field_at_and_path() {
        let inner = message(ByteSpan::new(4, 6), vec![varint(7, 3, 4)]);
        let outer = message(
            ByteSpan::new(0, 6),
            vec![
                varint(1, 1, 0),
                Field {
                    id: 2,
                    value: FieldValue::LengthDelimited {
                        length: 2,
                        message: inner,
                    },
                    tag_span: ByteSpan::new(2, 3),
                    value_span: ByteSpan::new(3, 6),
                },
            ],
        );

        assert_eq!(outer.field_at(1).map(|f| f.id), Some(1));
        assert_eq!(outer.field_at(3).map(|f| f.id), Some(2));
        assert!(outer.field_at(6).is_none());

        let path: Vec<u32> = outer.path_at(5).iter().map(|f| f.id).collect();
        assert_eq!(path, vec![2, 7]);
        let path: Vec<u32> = outer.path_at(3).iter().map(|f| f.id).collect();
        assert_eq!(path, vec![2]);

        assert_eq!(outer.field_starts(), vec![0, 2]);
        assert_eq!(outer.decoded_span(), ByteSpan::new(0, 6));
    }

    #[test]
    fn test_description() {
        let field = varint(3, 150, 0);
        assert_eq!(
            field.description(),
            "id 3, varint, tag 1 byte(s), value 1 byte(s): 150"
        );
    }

    #[test]
    fn test_description_length_delimited() {
        let mut nested = message(ByteSpan::new(2, 7), vec![varint(13, 101, 2)]);
        nested.schema_id = 4;
        let mut field = Field {
            id: 1,
            value: FieldValue::LengthDelimited {
                length: 5,
                message: nested,
            },
            tag_span: ByteSpan::new(0, 1),
            value_span: ByteSpan::new(1, 7),
        };
        assert_eq!(
            field.to_string(),
            "id 1, length-delimited, tag 1 byte(s), value 6 byte(s): 5 byte payload, Message4"
        );

        if let FieldValue::LengthDelimited { message, .. } = &mut field.value {
            message.error = Some(Error::unsupported_wire_type(4, 4));
        }
        assert_eq!(
            field.description(),
            "id 1, length-delimited, tag 1 byte(s), value 6 byte(s): 5 byte payload, Message4 (partial)"
        );
    }
}
