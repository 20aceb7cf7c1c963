//! Field strategy selection.
//!
//! Every field maps to exactly one [`FieldStrategy`]. The strategy owns the
//! [`ScalarRule`]s the message generator uses for the encode, size and decode
//! expressions, so the bytes `encode_raw` writes and the count `compute_size`
//! returns come from the same table entry.

use proc_macro2::{Ident, Literal, Span, TokenStream};
use quote::{format_ident, quote};

use super::model::{Cardinality, FieldInfo, FieldType, MapType, Presence, ScalarType, TypeRef};
use crate::wire::{self, WireType};

/// How a value is held in the message struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Copy,
    String,
    Bytes,
}

/// Per-kind wire rule. `suffix` names the runtime functions: `write_{suffix}`,
/// `read_{suffix}`, `{suffix}_size`, `write_packed_{suffix}`, `read_packed_{suffix}`
/// and `packed_{suffix}_data_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarRule {
    pub wire_type: WireType,
    pub suffix: &'static str,
    pub storage: Storage,
}

const fn rule(wire_type: WireType, suffix: &'static str, storage: Storage) -> ScalarRule {
    ScalarRule {
        wire_type,
        suffix,
        storage,
    }
}

pub const ENUM_RULE: ScalarRule = rule(WireType::Varint, "enum", Storage::Copy);

pub fn scalar_rule(scalar: ScalarType) -> ScalarRule {
    match scalar {
        ScalarType::Int32 => rule(WireType::Varint, "int32", Storage::Copy),
        ScalarType::Int64 => rule(WireType::Varint, "int64", Storage::Copy),
        ScalarType::Uint32 => rule(WireType::Varint, "uint32", Storage::Copy),
        ScalarType::Uint64 => rule(WireType::Varint, "uint64", Storage::Copy),
        ScalarType::Sint32 => rule(WireType::Varint, "sint32", Storage::Copy),
        ScalarType::Sint64 => rule(WireType::Varint, "sint64", Storage::Copy),
        ScalarType::Bool => rule(WireType::Varint, "bool", Storage::Copy),
        ScalarType::Fixed32 => rule(WireType::Fixed32, "fixed32", Storage::Copy),
        ScalarType::Sfixed32 => rule(WireType::Fixed32, "sfixed32", Storage::Copy),
        ScalarType::Float => rule(WireType::Fixed32, "float", Storage::Copy),
        ScalarType::Fixed64 => rule(WireType::Fixed64, "fixed64", Storage::Copy),
        ScalarType::Sfixed64 => rule(WireType::Fixed64, "sfixed64", Storage::Copy),
        ScalarType::Double => rule(WireType::Fixed64, "double", Storage::Copy),
        ScalarType::String => rule(WireType::LengthDelimited, "string", Storage::String),
        ScalarType::Bytes => rule(WireType::LengthDelimited, "bytes", Storage::Bytes),
    }
}

/// Rust type of a scalar value.
pub fn scalar_type_tokens(scalar: ScalarType) -> TokenStream {
    match scalar {
        ScalarType::Int32 | ScalarType::Sint32 | ScalarType::Sfixed32 => quote!(i32),
        ScalarType::Int64 | ScalarType::Sint64 | ScalarType::Sfixed64 => quote!(i64),
        ScalarType::Uint32 | ScalarType::Fixed32 => quote!(u32),
        ScalarType::Uint64 | ScalarType::Fixed64 => quote!(u64),
        ScalarType::Float => quote!(f32),
        ScalarType::Double => quote!(f64),
        ScalarType::Bool => quote!(bool),
        ScalarType::String => quote!(::std::string::String),
        ScalarType::Bytes => quote!(::std::vec::Vec<u8>),
    }
}

/// A single value of a field: scalar, enum or message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Scalar(ScalarType),
    Enum(TypeRef),
    Message(TypeRef),
}

impl ValueKind {
    /// Kind of one stored value; for a map that is the entry value.
    pub fn of(field_type: &FieldType) -> ValueKind {
        match field_type {
            FieldType::Scalar(scalar) => ValueKind::Scalar(*scalar),
            FieldType::Enum(type_ref) => ValueKind::Enum(type_ref.clone()),
            FieldType::Message(type_ref) => ValueKind::Message(type_ref.clone()),
            FieldType::Map(map) => ValueKind::of(&map.value),
        }
    }

    /// The wire rule, or `None` for messages.
    pub fn rule(&self) -> Option<ScalarRule> {
        match self {
            ValueKind::Scalar(scalar) => Some(scalar_rule(*scalar)),
            ValueKind::Enum(_) => Some(ENUM_RULE),
            ValueKind::Message(_) => None,
        }
    }

    pub fn wire_type(&self) -> WireType {
        self.rule()
            .map_or(WireType::LengthDelimited, |rule| rule.wire_type)
    }

    pub fn storage(&self) -> Storage {
        self.rule().map_or(Storage::Copy, |rule| rule.storage)
    }

    pub fn is_message(&self) -> bool {
        matches!(self, ValueKind::Message(_))
    }

    /// Value type as stored: `EnumValue<E>` for enums, the message type itself
    /// for messages.
    pub fn type_tokens(&self, root: &TokenStream) -> TokenStream {
        match self {
            ValueKind::Scalar(scalar) => scalar_type_tokens(*scalar),
            ValueKind::Enum(type_ref) => {
                let path = type_ref.path.tokens(root);
                quote!(::tightbuf::EnumValue<#path>)
            }
            ValueKind::Message(type_ref) => type_ref.path.tokens(root),
        }
    }

    /// Expression writing `value` (no tag). Copy values are passed by value,
    /// strings and bytes by reference, messages by reference.
    pub fn write(&self, value: TokenStream) -> TokenStream {
        match self.rule() {
            Some(rule) => {
                let write = format_ident!("write_{}", rule.suffix);
                quote!(sink.#write(#value))
            }
            None => quote!(sink.write_message(#value)),
        }
    }

    /// Encoded size of `value` without tag. Message sizes are computed (and cached)
    /// when `compute` is set, otherwise read back from the cache.
    pub fn size(&self, value: TokenStream, compute: bool) -> TokenStream {
        match self.rule() {
            Some(rule) => {
                let size = format_ident!("{}_size", rule.suffix);
                quote!(::tightbuf::encoding::#size(#value))
            }
            None if compute => {
                quote!(::tightbuf::encoding::message_size(::tightbuf::Protobuf::compute_size(#value)))
            }
            None => {
                quote!(::tightbuf::encoding::message_size(::tightbuf::Protobuf::cached_size(#value)))
            }
        }
    }

    /// Statement reading one value into the place `target` (a `&mut` expression
    /// for strings, bytes and messages, an assignable place for copy values).
    pub fn read_into(&self, target: TokenStream) -> TokenStream {
        match self {
            ValueKind::Message(_) => quote!(source.read_message(#target)?),
            _ => match self.storage() {
                Storage::String => quote!(source.read_string_into(#target)?),
                Storage::Bytes => quote!(source.read_bytes_into(#target)?),
                Storage::Copy => {
                    let read = self.read_fn();
                    quote!(#target = source.#read()?)
                }
            },
        }
    }

    /// Expression reading one copy value.
    pub fn read_value(&self) -> TokenStream {
        let read = self.read_fn();
        quote!(source.#read()?)
    }

    fn read_fn(&self) -> Ident {
        let suffix = self.rule().map_or("message", |rule| rule.suffix);
        format_ident!("read_{}", suffix)
    }

    /// Whether the value is not the zero default, for implicit-presence omission.
    pub fn is_nonzero(&self, value: TokenStream) -> TokenStream {
        match self {
            ValueKind::Scalar(ScalarType::Bool) => value,
            ValueKind::Scalar(ScalarType::Float | ScalarType::Double) => {
                quote!(#value.to_bits() != 0)
            }
            ValueKind::Scalar(ScalarType::String | ScalarType::Bytes) => quote!(!#value.is_empty()),
            ValueKind::Scalar(_) => quote!(#value != 0),
            ValueKind::Enum(_) => quote!(#value.number() != 0),
            ValueKind::Message(_) => quote!(true),
        }
    }
}

/// Packed form of a repeated scalar: `write_packed_*`, `read_packed_*` and
/// `packed_*_data_size`.
pub fn packed_write(rule: ScalarRule, values: TokenStream) -> TokenStream {
    let write = format_ident!("write_packed_{}", rule.suffix);
    quote!(sink.#write(#values))
}

pub fn packed_read(rule: ScalarRule, values: TokenStream) -> TokenStream {
    let read = format_ident!("read_packed_{}", rule.suffix);
    quote!(source.#read(#values)?)
}

pub fn packed_data_size(rule: ScalarRule, values: TokenStream) -> TokenStream {
    let size = format_ident!("packed_{}_data_size", rule.suffix);
    quote!(::tightbuf::encoding::#size(#values))
}

/// The encode/decode/size strategy of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldStrategy {
    SingularScalar {
        value: ValueKind,
        presence: Presence,
    },
    SingularMessage {
        value: ValueKind,
    },
    /// One tag per element; decode also accepts the packed form.
    RepeatedScalar {
        value: ValueKind,
        rule: ScalarRule,
    },
    /// One length-delimited run; decode also accepts one tag per element.
    PackedScalar {
        value: ValueKind,
        rule: ScalarRule,
    },
    /// Strings and bytes: never packed.
    RepeatedLengthDelimited {
        value: ValueKind,
    },
    RepeatedMessage {
        value: ValueKind,
    },
    Map {
        key: ValueKind,
        value: ValueKind,
    },
    OneofMember {
        oneof: usize,
        value: ValueKind,
    },
}

impl FieldStrategy {
    pub fn select(field: &FieldInfo) -> FieldStrategy {
        if let FieldType::Map(map) = &field.field_type {
            let MapType { key, value, .. } = map.as_ref();
            return FieldStrategy::Map {
                key: ValueKind::Scalar(*key),
                value: ValueKind::of(value),
            };
        }
        let value = ValueKind::of(&field.field_type);
        if let Some(oneof) = field.oneof {
            return FieldStrategy::OneofMember { oneof, value };
        }
        match (field.cardinality, value.rule()) {
            (Cardinality::Singular, None) => FieldStrategy::SingularMessage { value },
            (Cardinality::Singular, Some(_)) => FieldStrategy::SingularScalar {
                value,
                presence: field.presence,
            },
            (_, None) => FieldStrategy::RepeatedMessage { value },
            (_, Some(rule)) if rule.storage != Storage::Copy => {
                FieldStrategy::RepeatedLengthDelimited { value }
            }
            (Cardinality::PackedRepeated, Some(rule)) => {
                FieldStrategy::PackedScalar { value, rule }
            }
            (_, Some(rule)) => FieldStrategy::RepeatedScalar { value, rule },
        }
    }

    /// Wire type the field is written with.
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldStrategy::SingularScalar { value, .. }
            | FieldStrategy::RepeatedScalar { value, .. }
            | FieldStrategy::OneofMember { value, .. } => value.wire_type(),
            FieldStrategy::SingularMessage { .. }
            | FieldStrategy::PackedScalar { .. }
            | FieldStrategy::RepeatedLengthDelimited { .. }
            | FieldStrategy::RepeatedMessage { .. }
            | FieldStrategy::Map { .. } => WireType::LengthDelimited,
        }
    }

    /// Rule for fields accepted in both packed and unpacked form.
    pub fn packable_rule(&self) -> Option<ScalarRule> {
        match self {
            FieldStrategy::RepeatedScalar { rule, .. }
            | FieldStrategy::PackedScalar { rule, .. } => {
                Some(*rule)
            }
            _ => None,
        }
    }
}

/// What the decoder does when a tag matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeAction {
    /// The field's own wire form: one value, one element or one entry.
    Single,
    /// A run of packed values for a repeated scalar.
    PackedRun,
    /// One unpacked element for a repeated scalar.
    UnpackedElement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchEntry {
    pub tag: u32,
    /// Index into the message's fields.
    pub field: usize,
    pub action: DecodeAction,
}

/// Decoder arms for all fields, in declaration order. Repeated scalars get two
/// entries so either wire form is accepted.
pub fn dispatch_table(fields: &[FieldInfo], strategies: &[FieldStrategy]) -> Vec<DispatchEntry> {
    let mut table = Vec::with_capacity(fields.len() + 4);
    for (index, (field, strategy)) in fields.iter().zip(strategies).enumerate() {
        match strategy.packable_rule() {
            Some(rule) => {
                table.push(DispatchEntry {
                    tag: wire::make_tag(field.number, rule.wire_type),
                    field: index,
                    action: DecodeAction::UnpackedElement,
                });
                table.push(DispatchEntry {
                    tag: wire::make_tag(field.number, WireType::LengthDelimited),
                    field: index,
                    action: DecodeAction::PackedRun,
                });
            }
            None => table.push(DispatchEntry {
                tag: wire::make_tag(field.number, strategy.wire_type()),
                field: index,
                action: DecodeAction::Single,
            }),
        }
    }
    table
}

pub fn tag_literal(tag: u32) -> Literal {
    Literal::u32_unsuffixed(tag)
}

/// Tag bytes as a `usize` literal for size expressions.
pub fn tag_size_literal(field_number: u32) -> Literal {
    Literal::usize_unsuffixed(wire::tag_size(field_number))
}

pub fn field_ident(field: &FieldInfo) -> Ident {
    super::names::ident(&super::names::sanitize_field_name(&field.member))
}

pub fn method_ident(prefix: &str, member: &str, suffix: &str) -> Ident {
    Ident::new(&format!("{prefix}{member}{suffix}"), Span::call_site())
}
