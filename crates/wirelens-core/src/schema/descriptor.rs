//! Export of inferred schemas as protobuf descriptors.
//!
//! The pseudo-schema text renumbers fields for readability, which makes it
//! useless for decoding. The descriptor built here keeps the original wire
//! field numbers instead, so the inspected bytes can be re-read through
//! `prost-reflect` as [`DynamicMessage`]s or handed to other descriptor-aware
//! tooling as an encoded `FileDescriptorSet`.
//!
//! Mapping per first-occurrence field:
//!
//! | wire type        | descriptor type           |
//! |------------------|---------------------------|
//! | varint           | `int64`                   |
//! | fixed64          | `double`                  |
//! | fixed32          | `float`                   |
//! | length-delimited | `MessageN` (its schema id) |
//!
//! A length-delimited field becomes `bytes` instead when any instance of it,
//! under the same schema id, failed to decode as a message. Strings and raw
//! blobs land here.
//!
//! Field ids a `.proto` cannot declare (the reserved `19000..=19999` range
//! and anything above [`MAX_FIELD_NUMBER`]) are left out of the descriptor;
//! re-decoding keeps them as unknown fields.
//!
//! Fields are named `field<wire id>` and labelled `repeated` when the id
//! occurs more than once in the exported instance. The file uses proto2
//! syntax so both labels are explicit.

use crate::error::{Error, Result};
use crate::message::{Field, FieldValue, Label, Message};
use crate::wire::{MAX_FIELD_NUMBER, RESERVED_FIELD_NUMBERS};
use prost::Message as _;
use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor};
use prost_types::field_descriptor_proto::{Label as ProtoLabel, Type};
use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Package used when none is given
pub const DEFAULT_PACKAGE: &str = "wirelens.inferred";

/// `(schema id, field id)` pairs whose payload is exported as `bytes`
type OpaqueFields = HashSet<(u32, u32)>;

/// Build a `FileDescriptorProto` with one message per schema id reachable
/// from `roots`, ordered by schema id
pub fn export(roots: &[Message], package: &str) -> FileDescriptorProto {
    let mut opaque = OpaqueFields::new();
    for root in roots {
        find_opaque(root, &mut opaque);
    }

    let mut messages = BTreeMap::new();
    for root in roots {
        collect(root, package, &opaque, &mut messages);
    }

    let file_stem = if package.is_empty() {
        "inferred".to_string()
    } else {
        package.replace('.', "/")
    };

    FileDescriptorProto {
        name: Some(format!("{}.proto", file_stem)),
        package: (!package.is_empty()).then(|| package.to_string()),
        message_type: messages.into_values().collect(),
        syntax: Some("proto2".to_string()),
        ..Default::default()
    }
}

/// Validate an exported file into a descriptor pool
pub fn build_pool(file: &FileDescriptorProto) -> Result<DescriptorPool> {
    let fds = FileDescriptorSet {
        file: vec![file.clone()],
    };
    Ok(DescriptorPool::from_file_descriptor_set(fds)?)
}

/// Returns true if `id` may be declared in a `.proto` file
pub fn is_declarable(id: u32) -> bool {
    id != 0 && id <= MAX_FIELD_NUMBER && !RESERVED_FIELD_NUMBERS.contains(&id)
}

/// Mark every length-delimited field with at least one partial instance.
/// Partial payloads are not descended into: they are exported as `bytes`.
fn find_opaque(message: &Message, out: &mut OpaqueFields) {
    for field in &message.fields {
        if let FieldValue::LengthDelimited { message: nested, .. } = &field.value {
            if nested.error.is_some() {
                out.insert((message.schema_id, field.id));
            } else {
                find_opaque(nested, out);
            }
        }
    }
}

fn collect(
    message: &Message,
    package: &str,
    opaque: &OpaqueFields,
    out: &mut BTreeMap<u32, DescriptorProto>,
) {
    if out.contains_key(&message.schema_id) {
        return;
    }

    let exported: Vec<&Field> = message
        .first_occurrences()
        .filter(|field| {
            let declarable = is_declarable(field.id);
            if !declarable {
                debug!(
                    "Leaving field {} out of {}: not a declarable field number",
                    field.id,
                    message_name(message.schema_id)
                );
            }
            declarable
        })
        .collect();

    let labels = message.labels();
    let field = exported
        .iter()
        .map(|field| {
            let is_opaque = opaque.contains(&(message.schema_id, field.id));
            field_descriptor(field, labels[&field.id], is_opaque, package)
        })
        .collect();

    out.insert(
        message.schema_id,
        DescriptorProto {
            name: Some(message_name(message.schema_id)),
            field,
            ..Default::default()
        },
    );

    for field in exported {
        if opaque.contains(&(message.schema_id, field.id)) {
            continue;
        }
        if let Some(nested) = field.value.as_message() {
            collect(nested, package, opaque, out);
        }
    }
}

fn field_descriptor(
    field: &Field,
    label: Label,
    is_opaque: bool,
    package: &str,
) -> FieldDescriptorProto {
    let mut descriptor = FieldDescriptorProto {
        name: Some(format!("field{}", field.id)),
        number: Some(field.id as i32),
        ..Default::default()
    };

    descriptor.set_label(match label {
        Label::Optional => ProtoLabel::Optional,
        Label::Repeated => ProtoLabel::Repeated,
    });

    match &field.value {
        FieldValue::Varint(_) => descriptor.set_type(Type::Int64),
        FieldValue::Fixed64(_) => descriptor.set_type(Type::Double),
        FieldValue::Fixed32(_) => descriptor.set_type(Type::Float),
        FieldValue::LengthDelimited { .. } if is_opaque => descriptor.set_type(Type::Bytes),
        FieldValue::LengthDelimited { message, .. } => {
            descriptor.set_type(Type::Message);
            descriptor.type_name = Some(qualified_name(package, message.schema_id));
        }
    }

    descriptor
}

fn message_name(schema_id: u32) -> String {
    format!("Message{}", schema_id)
}

fn qualified_name(package: &str, schema_id: u32) -> String {
    if package.is_empty() {
        format!(".{}", message_name(schema_id))
    } else {
        format!(".{}.{}", package, message_name(schema_id))
    }
}

/// Inferred schemas resolved into a descriptor pool
#[derive(Debug, Clone)]
pub struct InferredSchema {
    file: FileDescriptorProto,
    pool: DescriptorPool,
    package: String,
}

impl InferredSchema {
    /// Export and validate the schemas reachable from `roots`
    pub fn from_messages(roots: &[Message], package: &str) -> Result<Self> {
        let file = export(roots, package);
        let pool = build_pool(&file)?;
        debug!(
            "Built descriptor {} with {} message(s)",
            file.name(),
            file.message_type.len()
        );
        Ok(Self {
            file,
            pool,
            package: package.to_string(),
        })
    }

    /// The exported file descriptor
    pub fn file(&self) -> &FileDescriptorProto {
        &self.file
    }

    /// The resolved descriptor pool
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Descriptor of `MessageN` for a schema id
    pub fn message(&self, schema_id: u32) -> Option<MessageDescriptor> {
        let name = qualified_name(&self.package, schema_id);
        self.pool.get_message_by_name(&name[1..])
    }

    /// Decode bytes against the inferred descriptor of `schema_id`
    pub fn decode(&self, schema_id: u32, data: &[u8]) -> Result<DynamicMessage> {
        let descriptor = self.message(schema_id).ok_or_else(|| {
            Error::descriptor_build(format!("{} was not exported", message_name(schema_id)))
        })?;
        Ok(DynamicMessage::decode(descriptor, data)?)
    }

    /// The file wrapped in an encoded `FileDescriptorSet`
    pub fn encode_descriptor_set(&self) -> Vec<u8> {
        FileDescriptorSet {
            file: vec![self.file.clone()],
        }
        .encode_to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Decoder, SchemaRegistry};
    use crate::wire::encode_varint;
    use pretty_assertions::assert_eq;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Point {
        #[prost(int64, tag = "1")]
        x: i64,
        #[prost(double, tag = "2")]
        y: f64,
        #[prost(float, tag = "3")]
        z: f32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    struct Path {
        #[prost(message, repeated, tag = "4")]
        points: Vec<Point>,
        #[prost(uint64, tag = "5")]
        id: u64,
    }

    fn fixture() -> Vec<u8> {
        Path {
            points: vec![
                Point { x: 1, y: 2.0, z: 3.0 },
                Point { x: -1, y: 0.5, z: 0.0 },
            ],
            id: 77,
        }
        .encode_to_vec()
    }

    #[test]
    fn test_export_structure() {
        let data = fixture();
        let message = Decoder::new().decode(&data, &mut SchemaRegistry::new());
        // first point -> 1, second point -> 2, root -> 3
        assert_eq!(message.schema_id, 3);

        let file = export(std::slice::from_ref(&message), DEFAULT_PACKAGE);
        assert_eq!(file.name(), "wirelens/inferred.proto");
        assert_eq!(file.package(), "wirelens.inferred");

        let names: Vec<_> = file.message_type.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["Message1", "Message3"]);

        let root = &file.message_type[1];
        assert_eq!(root.field[0].name(), "field4");
        assert_eq!(root.field[0].number(), 4);
        assert_eq!(root.field[0].label(), ProtoLabel::Repeated);
        assert_eq!(root.field[0].r#type(), Type::Message);
        assert_eq!(root.field[0].type_name(), ".wirelens.inferred.Message1");
        assert_eq!(root.field[1].label(), ProtoLabel::Optional);
        assert_eq!(root.field[1].r#type(), Type::Int64);

        let point = &file.message_type[0];
        let types: Vec<_> = point.field.iter().map(|f| f.r#type()).collect();
        assert_eq!(types, vec![Type::Int64, Type::Double, Type::Float]);
    }

    #[test]
    fn test_redecode_through_inferred_schema() {
        let data = fixture();
        let message = Decoder::new().decode(&data, &mut SchemaRegistry::new());
        let schema =
            InferredSchema::from_messages(std::slice::from_ref(&message), DEFAULT_PACKAGE).unwrap();

        let root = schema.decode(message.schema_id, &data).unwrap();
        assert_eq!(root.get_field_by_name("field5").unwrap().as_i64(), Some(77));

        let points = root.get_field_by_name("field4").unwrap();
        let points = points.as_list().unwrap();
        assert_eq!(points.len(), 2);

        let second = points[1].as_message().unwrap();
        assert_eq!(second.get_field_by_name("field1").unwrap().as_i64(), Some(-1));
        assert_eq!(second.get_field_by_name("field2").unwrap().as_f64(), Some(0.5));
    }

    #[test]
    fn test_unexported_schema_id() {
        let data = fixture();
        let message = Decoder::new().decode(&data, &mut SchemaRegistry::new());
        let schema = InferredSchema::from_messages(std::slice::from_ref(&message), "").unwrap();
        assert!(schema.message(3).is_some());
        // second point shape is never referenced by a first occurrence
        assert!(schema.message(2).is_none());
        assert!(schema.decode(2, &data).is_err());
    }

    #[test]
    fn test_descriptor_set_roundtrip() {
        let message = Decoder::new().decode(&[0x08, 0x01], &mut SchemaRegistry::new());
        let schema =
            InferredSchema::from_messages(std::slice::from_ref(&message), DEFAULT_PACKAGE).unwrap();

        let bytes = schema.encode_descriptor_set();
        let set = FileDescriptorSet::decode(bytes.as_slice()).unwrap();
        assert_eq!(set.file, vec![schema.file().clone()]);
        assert!(DescriptorPool::decode(bytes.as_slice()).is_ok());
    }

    fn decode(data: &[u8]) -> Message {
        Decoder::new().decode(data, &mut SchemaRegistry::new())
    }

    #[test]
    fn test_text_field_exported_as_bytes() {
        // field 1: "hello", field 2: varint 9
        let data = b"\x0a\x05hello\x10\x09";
        let message = decode(data);
        assert!(message.is_complete());
        assert!(message.fields[0].value.as_message().unwrap().error.is_some());

        let schema =
            InferredSchema::from_messages(std::slice::from_ref(&message), DEFAULT_PACKAGE).unwrap();
        let file = schema.file();
        assert_eq!(file.message_type.len(), 1);
        let root = &file.message_type[0];
        assert_eq!(root.field[0].r#type(), Type::Bytes);
        assert_eq!(root.field[0].type_name, None);
        assert_eq!(root.field[1].r#type(), Type::Int64);

        let decoded = schema.decode(message.schema_id, data).unwrap();
        let text = decoded.get_field_by_name("field1").unwrap();
        assert_eq!(text.as_bytes().map(|b| &b[..]), Some(&b"hello"[..]));
        assert_eq!(decoded.get_field_by_name("field2").unwrap().as_i64(), Some(9));
    }

    #[test]
    fn test_one_partial_instance_makes_field_bytes() {
        // field 1 twice: a clean nested message, then a truncated one
        let data = [0x0A, 0x02, 0x08, 0x01, 0x0A, 0x02, 0xFF, 0xFF];
        let message = decode(&data);
        assert!(message.fields[0].value.as_message().unwrap().is_complete());
        assert!(!message.fields[1].value.as_message().unwrap().is_complete());

        let schema =
            InferredSchema::from_messages(std::slice::from_ref(&message), DEFAULT_PACKAGE).unwrap();
        assert_eq!(schema.file().message_type.len(), 1);
        let root = &schema.file().message_type[0];
        assert_eq!(root.name(), message_name(message.schema_id).as_str());
        assert_eq!(root.field[0].label(), ProtoLabel::Repeated);
        assert_eq!(root.field[0].r#type(), Type::Bytes);

        let decoded = schema.decode(message.schema_id, &data).unwrap();
        let blobs = decoded.get_field_by_name("field1").unwrap();
        assert_eq!(blobs.as_list().unwrap().len(), 2);
    }

    #[test]
    fn test_reserved_field_number_left_out() {
        let mut data = Vec::new();
        prost::encoding::encode_key(19_000, prost::encoding::WireType::Varint, &mut data);
        data.extend([0x01, 0x08, 0x03]);

        let message = decode(&data);
        assert!(message.is_complete());
        assert_eq!(message.fields.len(), 2);

        let schema =
            InferredSchema::from_messages(std::slice::from_ref(&message), DEFAULT_PACKAGE).unwrap();
        let numbers: Vec<_> = schema.file().message_type[0]
            .field
            .iter()
            .map(|f| f.number())
            .collect();
        assert_eq!(numbers, vec![1]);

        let decoded = schema.decode(message.schema_id, &data).unwrap();
        assert_eq!(decoded.get_field_by_name("field1").unwrap().as_i64(), Some(3));
        assert!(decoded.get_field_by_number(19_000).is_none());
    }

    #[test]
    fn test_field_number_above_proto_limit_left_out() {
        let mut data = encode_varint(u128::from(MAX_FIELD_NUMBER + 1) << 3);
        data.extend([0x02, 0x08, 0x03]);

        let message = decode(&data);
        assert!(message.is_complete());

        let file = export(std::slice::from_ref(&message), DEFAULT_PACKAGE);
        let numbers: Vec<_> = file.message_type[0].field.iter().map(|f| f.number()).collect();
        assert_eq!(numbers, vec![1]);
        assert!(build_pool(&file).is_ok());
    }

    #[test]
    fn test_is_declarable() {
        assert!(is_declarable(1));
        assert!(is_declarable(18_999));
        assert!(!is_declarable(19_000));
        assert!(!is_declarable(19_999));
        assert!(is_declarable(20_000));
        assert!(is_declarable(MAX_FIELD_NUMBER));
        assert!(!is_declarable(MAX_FIELD_NUMBER + 1));
        assert!(!is_declarable(0));
    }
}
