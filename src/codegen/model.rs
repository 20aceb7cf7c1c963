//! Schema model.
//!
//! Raw descriptors from the request are normalised into a typed tree of
//! [`FileInfo`] → [`MessageInfo`] / [`EnumInfo`] → [`FieldInfo`], with every type
//! reference resolved. Resolution is two-pass:
//!
//! 1. [`TypeRegistry::build`] walks every file in the request (imports included) and
//!    registers each message and enum under its fully qualified name, fixing its Rust
//!    path and the name of its nested-type module. Names are claimed per Rust scope in
//!    declaration order, so colliding names get deterministic suffixes.
//! 2. [`TypeRegistry::resolve_file`] builds the tree for one file to generate,
//!    validating field numbers and resolving `type_name` references against the
//!    registry.
//!
//! The model is immutable once built and lives for one request.

use std::collections::HashMap;

use proc_macro2::TokenStream;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto};
use quote::quote;

use super::comments::{self, Comments};
use super::defaults::{self, DefaultValue};
use super::names::{self, NameScope};
use crate::wire::{MAX_FIELD_NUMBER, MIN_FIELD_NUMBER, RESERVED_FIELD_NUMBERS};

/// A schema-level failure. Any of these aborts generation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("{field}: unresolved type reference `{type_name}`")]
    UnresolvedType { field: String, type_name: String },
    #[error("{message}: field number {number} is used by both `{first}` and `{second}`")]
    DuplicateFieldNumber {
        message: String,
        number: u32,
        first: String,
        second: String,
    },
    #[error("{field}: invalid field number {number}")]
    InvalidFieldNumber { field: String, number: i32 },
    #[error("{field}: field number {number} is in the reserved range 19000-19999")]
    ReservedFieldNumber { field: String, number: u32 },
    #[error("{field}: group fields are not supported")]
    GroupField { field: String },
    #[error("{file}: unsupported syntax `{syntax}`")]
    UnsupportedSyntax { file: String, syntax: String },
    #[error("{field}: invalid default value `{value}`: {reason}")]
    InvalidDefault {
        field: String,
        value: String,
        reason: String,
    },
    #[error("{field}: invalid map entry: {reason}")]
    InvalidMapEntry { field: String, reason: String },
    #[error("type `{0}` is defined more than once")]
    DuplicateType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Proto2,
    Proto3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Float,
    Double,
    Bool,
    String,
    Bytes,
}

impl ScalarType {
    fn from_proto(ty: Type) -> Option<ScalarType> {
        Some(match ty {
            Type::Int32 => ScalarType::Int32,
            Type::Int64 => ScalarType::Int64,
            Type::Uint32 => ScalarType::Uint32,
            Type::Uint64 => ScalarType::Uint64,
            Type::Sint32 => ScalarType::Sint32,
            Type::Sint64 => ScalarType::Sint64,
            Type::Fixed32 => ScalarType::Fixed32,
            Type::Fixed64 => ScalarType::Fixed64,
            Type::Sfixed32 => ScalarType::Sfixed32,
            Type::Sfixed64 => ScalarType::Sfixed64,
            Type::Float => ScalarType::Float,
            Type::Double => ScalarType::Double,
            Type::Bool => ScalarType::Bool,
            Type::String => ScalarType::String,
            Type::Bytes => ScalarType::Bytes,
            Type::Message | Type::Enum | Type::Group => return None,
        })
    }

    pub fn is_length_delimited(self) -> bool {
        matches!(self, ScalarType::String | ScalarType::Bytes)
    }

    /// Types allowed as map keys.
    pub fn is_valid_map_key(self) -> bool {
        !matches!(
            self,
            ScalarType::Float | ScalarType::Double | ScalarType::Bytes
        )
    }
}

/// Location of a generated type: module segments below the module root, then the
/// type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RustPath {
    pub modules: Vec<String>,
    pub name: String,
}

impl RustPath {
    /// Absolute path tokens, e.g. `crate::demo::shapes::Point`.
    pub fn tokens(&self, root: &TokenStream) -> TokenStream {
        let modules = self.modules.iter().map(|m| names::ident(m));
        let name = names::ident(&self.name);
        quote! { #root #(:: #modules)* :: #name }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    pub full_name: String,
    pub path: RustPath,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Scalar(ScalarType),
    Enum(TypeRef),
    Message(TypeRef),
    Map(Box<MapType>),
}

impl FieldType {
    pub fn is_message(&self) -> bool {
        matches!(self, FieldType::Message(_))
    }
}

/// Key and value of a map field's synthetic entry message.
#[derive(Debug, Clone, PartialEq)]
pub struct MapType {
    pub key: ScalarType,
    pub value: FieldType,
    /// Value an entry without a value field decodes to, when not the zero value.
    pub value_default: Option<DefaultValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Singular,
    Repeated,
    PackedRepeated,
    Map,
}

/// Whether a singular field tracks "set" separately from its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Proto3 singular scalars: unset and default are indistinguishable.
    Implicit,
    /// Proto2 singular fields, proto3 `optional`, messages and oneof members.
    Explicit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    /// Name as declared in the schema.
    pub name: String,
    pub full_name: String,
    pub number: u32,
    pub cardinality: Cardinality,
    pub required: bool,
    pub presence: Presence,
    pub field_type: FieldType,
    /// Index into [`MessageInfo::oneofs`].
    pub oneof: Option<usize>,
    /// Declared default, or the first enum value when that is not zero.
    pub default: Option<DefaultValue>,
    /// Index of the presence bit for explicit-presence scalars outside oneofs.
    pub has_bit: Option<u32>,
    /// Collision-free snake_case base for the field's storage and accessors.
    pub member: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OneofInfo {
    pub name: String,
    pub member: String,
    pub enum_path: RustPath,
    /// Indices into [`MessageInfo::fields`], in declaration order.
    pub fields: Vec<usize>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageInfo {
    pub name: String,
    pub full_name: String,
    pub path: RustPath,
    /// Module holding nested types and oneof enums.
    pub module: String,
    pub syntax: Syntax,
    /// Fields in declaration order, which is also the encode order.
    pub fields: Vec<FieldInfo>,
    pub oneofs: Vec<OneofInfo>,
    pub messages: Vec<MessageInfo>,
    pub enums: Vec<EnumInfo>,
    pub has_bit_words: usize,
    pub store_unknown_fields: bool,
    pub comment: Option<String>,
}

impl MessageInfo {
    pub fn has_module(&self) -> bool {
        !self.messages.is_empty() || !self.enums.is_empty() || !self.oneofs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValueInfo {
    pub name: String,
    pub number: i32,
    pub variant: String,
    pub comment: Option<String>,
}

/// A value sharing its number with an earlier one (`allow_alias`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumAlias {
    pub name: String,
    /// Variant of the first value with the same number.
    pub target: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumInfo {
    pub name: String,
    pub full_name: String,
    pub path: RustPath,
    pub values: Vec<EnumValueInfo>,
    pub aliases: Vec<EnumAlias>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub name: String,
    pub package: String,
    pub syntax: Syntax,
    pub package_modules: Vec<String>,
    pub messages: Vec<MessageInfo>,
    pub enums: Vec<EnumInfo>,
}

#[derive(Debug, Clone, Copy)]
enum RegisteredKind<'a> {
    Message(&'a DescriptorProto),
    Enum(&'a EnumDescriptorProto),
}

#[derive(Debug, Clone)]
struct RegisteredType<'a> {
    path: RustPath,
    module: String,
    kind: RegisteredKind<'a>,
}

/// Every type declared in the request, keyed by fully qualified name without the
/// leading dot.
#[derive(Debug, Default)]
pub struct TypeRegistry<'a> {
    types: HashMap<String, RegisteredType<'a>>,
    oneof_enums: HashMap<(String, usize), String>,
}

fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

pub fn package_modules(package: &str) -> Vec<String> {
    package
        .split('.')
        .filter(|segment| !segment.is_empty())
        .map(|segment| names::sanitize_module_name(&names::to_snake_case(segment)))
        .collect()
}

fn is_map_entry(message: &DescriptorProto) -> bool {
    message
        .options
        .as_ref()
        .is_some_and(|options| options.map_entry())
}

fn is_synthetic_oneof(message: &DescriptorProto, index: usize) -> bool {
    let mut members = message
        .field
        .iter()
        .filter(|field| field.oneof_index == Some(index as i32))
        .peekable();
    members.peek().is_some() && members.all(|field| field.proto3_optional())
}

fn real_oneof_indices(message: &DescriptorProto) -> Vec<usize> {
    (0..message.oneof_decl.len())
        .filter(|&index| !is_synthetic_oneof(message, index))
        .collect()
}

fn needs_module(message: &DescriptorProto) -> bool {
    message.nested_type.iter().any(|nested| !is_map_entry(nested))
        || !message.enum_type.is_empty()
        || !real_oneof_indices(message).is_empty()
}

impl<'a> TypeRegistry<'a> {
    /// Registers every message and enum of `files`.
    pub fn build(files: &'a [FileDescriptorProto]) -> Result<Self, SchemaError> {
        let mut registry = TypeRegistry::default();
        let mut scopes: HashMap<Vec<String>, NameScope> = HashMap::new();

        // Package modules come first so type modules never shadow them.
        for file in files {
            let modules = package_modules(file.package());
            for depth in 0..modules.len() {
                scopes
                    .entry(modules[..depth].to_vec())
                    .or_default()
                    .insert(&modules[depth]);
            }
        }

        for file in files {
            registry.register_scope(
                &mut scopes,
                package_modules(file.package()),
                file.package(),
                &file.message_type,
                &file.enum_type,
            )?;
        }
        Ok(registry)
    }

    fn insert(&mut self, full_name: String, entry: RegisteredType<'a>) -> Result<(), SchemaError> {
        if self.types.contains_key(&full_name) {
            return Err(SchemaError::DuplicateType(full_name));
        }
        self.types.insert(full_name, entry);
        Ok(())
    }

    fn register_scope(
        &mut self,
        scopes: &mut HashMap<Vec<String>, NameScope>,
        modules: Vec<String>,
        prefix: &str,
        messages: &'a [DescriptorProto],
        enums: &'a [EnumDescriptorProto],
    ) -> Result<(), SchemaError> {
        let mut message_entries = Vec::with_capacity(messages.len());
        {
            let scope = scopes.entry(modules.clone()).or_default();
            let mut type_names = Vec::with_capacity(messages.len());
            for message in messages {
                if is_map_entry(message) {
                    // Never emitted, so it takes no name.
                    type_names.push(names::sanitize_type_name(message.name()));
                } else {
                    type_names.push(scope.claim(&names::sanitize_type_name(message.name()), ""));
                }
            }
            for enum_type in enums {
                let name = scope.claim(&names::sanitize_type_name(enum_type.name()), "");
                let entry = RegisteredType {
                    path: RustPath {
                        modules: modules.clone(),
                        name,
                    },
                    module: String::new(),
                    kind: RegisteredKind::Enum(enum_type),
                };
                self.insert(qualify(prefix, enum_type.name()), entry)?;
            }
            for (message, name) in messages.iter().zip(type_names) {
                let snake = names::sanitize_module_name(&names::to_snake_case(message.name()));
                let module = if needs_module(message) {
                    scope.claim(&snake, "_")
                } else {
                    snake
                };
                message_entries.push((message, name, module));
            }
        }

        for (message, name, module) in message_entries {
            let full_name = qualify(prefix, message.name());
            let mut child_modules = modules.clone();
            child_modules.push(module.clone());
            self.insert(
                full_name.clone(),
                RegisteredType {
                    path: RustPath {
                        modules: modules.clone(),
                        name,
                    },
                    module,
                    kind: RegisteredKind::Message(message),
                },
            )?;
            self.register_scope(
                scopes,
                child_modules.clone(),
                &full_name,
                &message.nested_type,
                &message.enum_type,
            )?;

            let scope = scopes.entry(child_modules).or_default();
            for index in real_oneof_indices(message) {
                let pascal = names::sanitize_type_name(&names::to_pascal_case(
                    message.oneof_decl[index].name(),
                ));
                let candidate = if scope.is_taken(&pascal) {
                    format!("{pascal}Oneof")
                } else {
                    pascal
                };
                let enum_name = scope.claim(&candidate, "");
                self.oneof_enums.insert((full_name.clone(), index), enum_name);
            }
        }
        Ok(())
    }

    /// Looks up `type_name` as written in a field of a type in `scope`. Fully
    /// qualified names start with `.`; others are resolved from the innermost scope
    /// outwards.
    fn lookup(&self, type_name: &str, scope: &str) -> Option<(String, &RegisteredType<'a>)> {
        if let Some(absolute) = type_name.strip_prefix('.') {
            return self
                .types
                .get(absolute)
                .map(|entry| (absolute.to_string(), entry));
        }
        let mut scope = scope;
        loop {
            let candidate = qualify(scope, type_name);
            if let Some(entry) = self.types.get(&candidate) {
                return Some((candidate, entry));
            }
            if scope.is_empty() {
                return None;
            }
            scope = scope.rfind('.').map_or("", |dot| &scope[..dot]);
        }
    }

    /// Builds the resolved tree for one file.
    pub fn resolve_file(
        &self,
        file: &'a FileDescriptorProto,
        store_unknown_fields: bool,
    ) -> Result<FileInfo, SchemaError> {
        let syntax = match file.syntax() {
            "" | "proto2" => Syntax::Proto2,
            "proto3" => Syntax::Proto3,
            other => {
                return Err(SchemaError::UnsupportedSyntax {
                    file: file.name().to_string(),
                    syntax: other.to_string(),
                });
            }
        };
        for service in &file.service {
            tracing::warn!(
                file = file.name(),
                service = service.name(),
                "services are not generated"
            );
        }
        if !file.extension.is_empty() {
            tracing::warn!(
                file = file.name(),
                count = file.extension.len(),
                "extensions are ignored"
            );
        }

        let comments = comments::extract_comments(file);
        let resolver = FileResolver {
            registry: self,
            syntax,
            comments: &comments,
            store_unknown_fields,
        };

        let mut messages = Vec::new();
        for (index, message) in file.message_type.iter().enumerate() {
            let full_name = qualify(file.package(), message.name());
            messages.push(resolver.message(
                message,
                &full_name,
                vec![comments::FILE_MESSAGE, index as i32],
            )?);
        }
        let mut enums = Vec::new();
        for (index, enum_type) in file.enum_type.iter().enumerate() {
            let full_name = qualify(file.package(), enum_type.name());
            enums.push(resolver.enumeration(
                enum_type,
                &full_name,
                vec![comments::FILE_ENUM, index as i32],
            )?);
        }

        Ok(FileInfo {
            name: file.name().to_string(),
            package: file.package().to_string(),
            syntax,
            package_modules: package_modules(file.package()),
            messages,
            enums,
        })
    }
}

struct FileResolver<'r, 'a> {
    registry: &'r TypeRegistry<'a>,
    syntax: Syntax,
    comments: &'r Comments,
    store_unknown_fields: bool,
}

fn with_path(base: &[i32], tail: [i32; 2]) -> Vec<i32> {
    let mut path = base.to_vec();
    path.extend_from_slice(&tail);
    path
}

/// Accessor names derived from a field's base name.
fn member_names(base: &str) -> [String; 6] {
    [
        names::sanitize_field_name(base),
        format!("set_{base}"),
        format!("clear_{base}"),
        format!("has_{base}"),
        format!("{base}_mut"),
        format!("add_{base}"),
    ]
}

impl<'a> FileResolver<'_, 'a> {
    fn comment(&self, path: &[i32]) -> Option<String> {
        self.comments.get(path).map(str::to_string)
    }

    fn registered(&self, full_name: &str) -> Result<&RegisteredType<'a>, SchemaError> {
        self.registry
            .types
            .get(full_name)
            .ok_or_else(|| SchemaError::UnresolvedType {
                field: full_name.to_string(),
                type_name: full_name.to_string(),
            })
    }

    fn message(
        &self,
        message: &'a DescriptorProto,
        full_name: &str,
        location: Vec<i32>,
    ) -> Result<MessageInfo, SchemaError> {
        let entry = self.registered(full_name)?;
        if !message.extension.is_empty() {
            tracing::warn!(message = full_name, "extensions are ignored");
        }

        let mut members = NameScope::with_reserved(names::RESERVED_MEMBER_NAMES);

        let real_oneofs = real_oneof_indices(message);
        let mut oneofs = Vec::with_capacity(real_oneofs.len());
        let mut oneof_slots = HashMap::new();
        for &index in &real_oneofs {
            let decl = &message.oneof_decl[index];
            let snake = names::to_snake_case(decl.name());
            let oneof_names = |base: &str| {
                [
                    names::sanitize_field_name(base),
                    format!("clear_{base}"),
                    format!("{base}_mut"),
                ]
            };
            let member = if oneof_names(&snake).iter().any(|name| members.is_taken(name)) {
                format!("{snake}_oneof")
            } else {
                snake
            };
            for name in oneof_names(&member) {
                members.insert(&name);
            }
            let enum_name = self
                .registry
                .oneof_enums
                .get(&(full_name.to_string(), index))
                .cloned()
                .unwrap_or_else(|| names::to_pascal_case(decl.name()));
            let mut enum_modules = entry.path.modules.clone();
            enum_modules.push(entry.module.clone());
            oneof_slots.insert(index as i32, oneofs.len());
            oneofs.push(OneofInfo {
                name: decl.name().to_string(),
                member,
                enum_path: RustPath {
                    modules: enum_modules,
                    name: enum_name,
                },
                fields: Vec::new(),
                comment: self
                    .comment(&with_path(&location, [comments::MESSAGE_ONEOF, index as i32])),
            });
        }

        let mut numbers: HashMap<u32, &str> = HashMap::new();
        let mut fields = Vec::with_capacity(message.field.len());
        let mut has_bits = 0u32;
        for (index, field) in message.field.iter().enumerate() {
            let field_name = format!("{full_name}.{}", field.name());
            let number = self.field_number(field, &field_name)?;
            if let Some(first) = numbers.insert(number, field.name()) {
                return Err(SchemaError::DuplicateFieldNumber {
                    message: full_name.to_string(),
                    number,
                    first: first.to_string(),
                    second: field.name().to_string(),
                });
            }

            let mut info = self.field(field, &field_name, number, full_name)?;
            info.oneof = field
                .oneof_index
                .and_then(|slot| oneof_slots.get(&slot).copied());
            if let Some(slot) = info.oneof {
                oneofs[slot].fields.push(index);
                info.presence = Presence::Explicit;
            }
            if info.cardinality == Cardinality::Singular
                && info.presence == Presence::Explicit
                && info.oneof.is_none()
                && !info.field_type.is_message()
            {
                info.has_bit = Some(has_bits);
                has_bits += 1;
            }

            let snake = names::to_snake_case(field.name());
            let base = if member_names(&snake).iter().any(|name| members.is_taken(name)) {
                format!("{snake}_{number}")
            } else {
                snake
            };
            for name in member_names(&base) {
                members.insert(&name);
            }
            info.member = base;
            info.comment =
                self.comment(&with_path(&location, [comments::MESSAGE_FIELD, index as i32]));
            fields.push(info);
        }

        let mut messages = Vec::new();
        for (index, nested) in message.nested_type.iter().enumerate() {
            if is_map_entry(nested) {
                continue;
            }
            messages.push(self.message(
                nested,
                &qualify(full_name, nested.name()),
                with_path(&location, [comments::MESSAGE_NESTED, index as i32]),
            )?);
        }
        let mut enums = Vec::new();
        for (index, nested) in message.enum_type.iter().enumerate() {
            enums.push(self.enumeration(
                nested,
                &qualify(full_name, nested.name()),
                with_path(&location, [comments::MESSAGE_ENUM, index as i32]),
            )?);
        }

        Ok(MessageInfo {
            name: message.name().to_string(),
            full_name: full_name.to_string(),
            path: entry.path.clone(),
            module: entry.module.clone(),
            syntax: self.syntax,
            fields,
            oneofs,
            messages,
            enums,
            has_bit_words: has_bits.div_ceil(32) as usize,
            store_unknown_fields: self.store_unknown_fields,
            comment: self.comment(&location),
        })
    }

    fn field_number(
        &self,
        field: &FieldDescriptorProto,
        field_name: &str,
    ) -> Result<u32, SchemaError> {
        let raw = field.number();
        let number = u32::try_from(raw)
            .ok()
            .filter(|n| (MIN_FIELD_NUMBER..=MAX_FIELD_NUMBER).contains(n))
            .ok_or_else(|| SchemaError::InvalidFieldNumber {
                field: field_name.to_string(),
                number: raw,
            })?;
        if RESERVED_FIELD_NUMBERS.contains(&number) {
            return Err(SchemaError::ReservedFieldNumber {
                field: field_name.to_string(),
                number,
            });
        }
        Ok(number)
    }

    /// Resolves the declared type of `field`, inferring message/enum from the
    /// registry when only `type_name` is set.
    fn field_type(
        &self,
        field: &FieldDescriptorProto,
        field_name: &str,
        scope: &str,
    ) -> Result<(FieldType, Option<&RegisteredType<'a>>), SchemaError> {
        let unresolved = || SchemaError::UnresolvedType {
            field: field_name.to_string(),
            type_name: field.type_name().to_string(),
        };
        let declared = field.r#type.map(|_| field.r#type());
        if declared == Some(Type::Group) {
            return Err(SchemaError::GroupField {
                field: field_name.to_string(),
            });
        }
        if let Some(scalar) = declared.and_then(ScalarType::from_proto) {
            return Ok((FieldType::Scalar(scalar), None));
        }

        let (resolved_name, entry) = self
            .registry
            .lookup(field.type_name(), scope)
            .ok_or_else(unresolved)?;
        let type_ref = TypeRef {
            full_name: resolved_name,
            path: entry.path.clone(),
        };
        match (declared, entry.kind) {
            (None | Some(Type::Message), RegisteredKind::Message(_)) => {
                Ok((FieldType::Message(type_ref), Some(entry)))
            }
            (None | Some(Type::Enum), RegisteredKind::Enum(_)) => {
                Ok((FieldType::Enum(type_ref), Some(entry)))
            }
            _ => Err(unresolved()),
        }
    }

    fn field(
        &self,
        field: &'a FieldDescriptorProto,
        field_name: &str,
        number: u32,
        scope: &str,
    ) -> Result<FieldInfo, SchemaError> {
        let (field_type, entry) = self.field_type(field, field_name, scope)?;
        let label = field.label();

        let map_entry = match entry.map(|entry| entry.kind) {
            Some(RegisteredKind::Message(target)) if is_map_entry(target) => Some(target),
            _ => None,
        };
        let (field_type, cardinality) = match (label, map_entry) {
            (Label::Repeated, Some(entry_message)) => {
                let entry_name = match &field_type {
                    FieldType::Message(type_ref) => type_ref.full_name.clone(),
                    _ => String::new(),
                };
                let map = self.map_type(entry_message, field_name, &entry_name)?;
                (FieldType::Map(Box::new(map)), Cardinality::Map)
            }
            (Label::Repeated, None) => {
                let packable = match &field_type {
                    FieldType::Scalar(scalar) => !scalar.is_length_delimited(),
                    FieldType::Enum(_) => true,
                    _ => false,
                };
                let declared_packed = field.options.as_ref().and_then(|options| options.packed);
                let packed = packable
                    && match self.syntax {
                        Syntax::Proto3 => declared_packed != Some(false),
                        Syntax::Proto2 => declared_packed == Some(true),
                    };
                let cardinality = if packed {
                    Cardinality::PackedRepeated
                } else {
                    Cardinality::Repeated
                };
                (field_type, cardinality)
            }
            _ => (field_type, Cardinality::Singular),
        };

        let presence = if cardinality != Cardinality::Singular {
            Presence::Implicit
        } else if field_type.is_message()
            || self.syntax == Syntax::Proto2
            || field.proto3_optional()
        {
            Presence::Explicit
        } else {
            Presence::Implicit
        };

        let default = self.default_value(field, field_name, &field_type, entry)?;

        Ok(FieldInfo {
            name: field.name().to_string(),
            full_name: field_name.to_string(),
            number,
            cardinality,
            required: label == Label::Required,
            presence,
            field_type,
            oneof: None,
            default,
            has_bit: None,
            member: String::new(),
            comment: None,
        })
    }

    fn map_type(
        &self,
        entry: &'a DescriptorProto,
        field_name: &str,
        entry_name: &str,
    ) -> Result<MapType, SchemaError> {
        let invalid = |reason: &str| SchemaError::InvalidMapEntry {
            field: field_name.to_string(),
            reason: reason.to_string(),
        };
        let key = entry
            .field
            .iter()
            .find(|f| f.number() == 1)
            .ok_or_else(|| invalid("missing key field"))?;
        let value = entry
            .field
            .iter()
            .find(|f| f.number() == 2)
            .ok_or_else(|| invalid("missing value field"))?;

        let key = match self.field_type(key, field_name, entry_name)?.0 {
            FieldType::Scalar(scalar) if scalar.is_valid_map_key() => scalar,
            _ => return Err(invalid("key must be an integer, bool or string")),
        };
        let (value_type, value_entry) = self.field_type(value, field_name, entry_name)?;
        if let FieldType::Map(_) = value_type {
            return Err(invalid("value cannot be a map"));
        }
        let value_default = self.default_value(value, field_name, &value_type, value_entry)?;
        Ok(MapType {
            key,
            value: value_type,
            value_default,
        })
    }

    fn default_value(
        &self,
        field: &FieldDescriptorProto,
        field_name: &str,
        field_type: &FieldType,
        entry: Option<&RegisteredType<'a>>,
    ) -> Result<Option<DefaultValue>, SchemaError> {
        let invalid = |reason: String| SchemaError::InvalidDefault {
            field: field_name.to_string(),
            value: field.default_value().to_string(),
            reason,
        };
        match field_type {
            FieldType::Scalar(scalar) => match &field.default_value {
                Some(text) => defaults::parse_default(*scalar, text)
                    .map(Some)
                    .map_err(invalid),
                None => Ok(None),
            },
            FieldType::Enum(_) => {
                let Some(RegisteredKind::Enum(enum_type)) = entry.map(|entry| entry.kind) else {
                    return Ok(None);
                };
                match &field.default_value {
                    Some(text) => enum_type
                        .value
                        .iter()
                        .find(|value| value.name() == text)
                        .map(|value| Some(DefaultValue::Enum(value.number())))
                        .ok_or_else(|| invalid("no enum value with that name".to_string())),
                    None => Ok(enum_type
                        .value
                        .first()
                        .map(|value| value.number())
                        .filter(|&number| number != 0)
                        .map(DefaultValue::Enum)),
                }
            }
            FieldType::Message(_) | FieldType::Map(_) => match &field.default_value {
                Some(_) => Err(invalid(
                    "only scalar and enum fields can declare defaults".to_string(),
                )),
                None => Ok(None),
            },
        }
    }

    fn enumeration(
        &self,
        enum_type: &'a EnumDescriptorProto,
        full_name: &str,
        location: Vec<i32>,
    ) -> Result<EnumInfo, SchemaError> {
        let entry = self.registered(full_name)?;
        let prefix = format!("{}_", names::to_upper_snake_case(enum_type.name()));

        // Strip the enum-name prefix only when every value keeps a usable name.
        let strip = enum_type.value.iter().all(|value| {
            value
                .name()
                .strip_prefix(&prefix)
                .and_then(|rest| rest.chars().next())
                .is_some_and(|first| first.is_ascii_alphabetic())
        });

        let mut variants = NameScope::new();
        let mut by_number: HashMap<i32, String> = HashMap::new();
        let mut values = Vec::new();
        let mut aliases = Vec::new();
        for (index, value) in enum_type.value.iter().enumerate() {
            let comment = self.comment(&with_path(&location, [comments::ENUM_VALUE, index as i32]));
            if let Some(target) = by_number.get(&value.number()) {
                aliases.push(EnumAlias {
                    name: value.name().to_string(),
                    target: target.clone(),
                    comment,
                });
                continue;
            }
            let stem = if strip {
                value.name().strip_prefix(&prefix).unwrap_or(value.name())
            } else {
                value.name()
            };
            let variant = variants.claim(
                &names::sanitize_type_name(&names::upper_snake_to_pascal(stem)),
                "",
            );
            by_number.insert(value.number(), variant.clone());
            values.push(EnumValueInfo {
                name: value.name().to_string(),
                number: value.number(),
                variant,
                comment,
            });
        }

        Ok(EnumInfo {
            name: enum_type.name().to_string(),
            full_name: full_name.to_string(),
            path: entry.path.clone(),
            values,
            aliases,
            comment: self.comment(&location),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use prost_types::{
        EnumValueDescriptorProto, FieldOptions, MessageOptions, OneofDescriptorProto,
    };

    pub fn field(name: &str, number: i32, ty: Type, label: Label) -> FieldDescriptorProto {
        let mut field = FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            ..Default::default()
        };
        field.set_type(ty);
        field.set_label(label);
        field
    }

    pub fn typed_field(
        name: &str,
        number: i32,
        ty: Type,
        label: Label,
        type_name: &str,
    ) -> FieldDescriptorProto {
        FieldDescriptorProto {
            type_name: Some(type_name.to_string()),
            ..field(name, number, ty, label)
        }
    }

    pub fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
        DescriptorProto {
            name: Some(name.to_string()),
            field: fields,
            ..Default::default()
        }
    }

    pub fn enumeration(name: &str, values: &[(&str, i32)]) -> EnumDescriptorProto {
        EnumDescriptorProto {
            name: Some(name.to_string()),
            value: values
                .iter()
                .map(|&(name, number)| EnumValueDescriptorProto {
                    name: Some(name.to_string()),
                    number: Some(number),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn file(
        name: &str,
        package: &str,
        syntax: &str,
        messages: Vec<DescriptorProto>,
    ) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some(name.to_string()),
            package: Some(package.to_string()),
            syntax: Some(syntax.to_string()),
            message_type: messages,
            ..Default::default()
        }
    }

    fn resolve(files: &[FileDescriptorProto]) -> Result<FileInfo, SchemaError> {
        let registry = TypeRegistry::build(files)?;
        registry.resolve_file(&files[0], false)
    }

    #[test]
    fn resolves_forward_and_cross_file_references() {
        let files = vec![
            file(
                "a.proto",
                "pkg",
                "proto3",
                vec![message(
                    "Holder",
                    vec![
                        typed_field("later", 1, Type::Message, Label::Optional, ".pkg.Later"),
                        typed_field("other", 2, Type::Message, Label::Optional, ".other.Thing"),
                        typed_field("relative", 3, Type::Message, Label::Optional, "Later"),
                    ],
                ), message("Later", vec![])],
            ),
            file("b.proto", "other", "proto3", vec![message("Thing", vec![])]),
        ];
        let info = resolve(&files).unwrap();
        let holder = &info.messages[0];
        match &holder.fields[1].field_type {
            FieldType::Message(type_ref) => {
                assert_eq!(type_ref.full_name, "other.Thing");
                assert_eq!(type_ref.path.modules, ["other"]);
                assert_eq!(type_ref.path.name, "Thing");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(holder.fields[2].field_type, holder.fields[0].field_type);
        assert_eq!(holder.fields[0].presence, Presence::Explicit);
    }

    #[test]
    fn duplicate_field_number_is_an_error() {
        let files = vec![file(
            "dup.proto",
            "pkg",
            "proto3",
            vec![message(
                "Dup",
                vec![
                    field("a", 1, Type::Int32, Label::Optional),
                    field("b", 1, Type::String, Label::Optional),
                ],
            )],
        )];
        assert_eq!(
            resolve(&files),
            Err(SchemaError::DuplicateFieldNumber {
                message: "pkg.Dup".to_string(),
                number: 1,
                first: "a".to_string(),
                second: "b".to_string(),
            })
        );
    }

    #[test]
    fn invalid_and_reserved_numbers() {
        let single = |number| {
            let fields = vec![field("a", number, Type::Int32, Label::Optional)];
            vec![file("n.proto", "", "proto3", vec![message("N", fields)])]
        };
        assert!(matches!(
            resolve(&single(0)),
            Err(SchemaError::InvalidFieldNumber { number: 0, .. })
        ));
        assert!(matches!(
            resolve(&single(19_500)),
            Err(SchemaError::ReservedFieldNumber { number: 19_500, .. })
        ));
    }

    #[test]
    fn unresolved_and_group_fields() {
        let missing = vec![file(
            "m.proto",
            "pkg",
            "proto3",
            vec![message(
                "M",
                vec![typed_field("x", 1, Type::Message, Label::Optional, ".pkg.Nope")],
            )],
        )];
        assert!(matches!(resolve(&missing), Err(SchemaError::UnresolvedType { .. })));

        let group = vec![file(
            "g.proto",
            "pkg",
            "proto2",
            vec![message("G", vec![typed_field("g", 1, Type::Group, Label::Optional, ".pkg.G")])],
        )];
        assert!(matches!(resolve(&group), Err(SchemaError::GroupField { .. })));

        let editions = vec![file("e.proto", "pkg", "editions", vec![])];
        assert!(matches!(resolve(&editions), Err(SchemaError::UnsupportedSyntax { .. })));
    }

    #[test]
    fn packed_and_presence_rules() {
        let mut unpacked = field("c", 3, Type::Int32, Label::Repeated);
        unpacked.options = Some(FieldOptions {
            packed: Some(false),
            ..Default::default()
        });
        let mut optional = field("d", 4, Type::Int32, Label::Optional);
        optional.proto3_optional = Some(true);
        optional.oneof_index = Some(0);
        let mut holder = message(
            "P",
            vec![
                field("a", 1, Type::Int32, Label::Repeated),
                field("b", 2, Type::String, Label::Repeated),
                unpacked,
                optional,
                field("e", 5, Type::Int32, Label::Optional),
            ],
        );
        holder.oneof_decl.push(OneofDescriptorProto {
            name: Some("_d".to_string()),
            ..Default::default()
        });
        let files = vec![file("p.proto", "", "proto3", vec![holder])];
        let info = resolve(&files).unwrap();
        let fields = &info.messages[0].fields;
        assert_eq!(fields[0].cardinality, Cardinality::PackedRepeated);
        assert_eq!(fields[1].cardinality, Cardinality::Repeated);
        assert_eq!(fields[2].cardinality, Cardinality::Repeated);
        assert_eq!(fields[3].presence, Presence::Explicit);
        assert_eq!(fields[3].oneof, None);
        assert_eq!(fields[3].has_bit, Some(0));
        assert_eq!(fields[4].presence, Presence::Implicit);
        assert!(info.messages[0].oneofs.is_empty());
        assert_eq!(info.messages[0].has_bit_words, 1);

        let fields = vec![field("a", 1, Type::Int32, Label::Repeated)];
        let proto2 = vec![file("q.proto", "", "proto2", vec![message("Q", fields)])];
        assert_eq!(
            resolve(&proto2).unwrap().messages[0].fields[0].cardinality,
            Cardinality::Repeated
        );
    }

    #[test]
    fn map_fields_use_entry_types() {
        let mut entry = message(
            "CountsEntry",
            vec![
                field("key", 1, Type::String, Label::Optional),
                field("value", 2, Type::Int32, Label::Optional),
            ],
        );
        entry.options = Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        });
        let mut holder = message(
            "Holder",
            vec![typed_field(
                "counts",
                1,
                Type::Message,
                Label::Repeated,
                ".pkg.Holder.CountsEntry",
            )],
        );
        holder.nested_type.push(entry);
        let files = vec![file("m.proto", "pkg", "proto3", vec![holder])];
        let info = resolve(&files).unwrap();
        let holder = &info.messages[0];
        assert!(holder.messages.is_empty());
        assert!(!holder.has_module());
        assert_eq!(holder.fields[0].cardinality, Cardinality::Map);
        assert_eq!(
            holder.fields[0].field_type,
            FieldType::Map(Box::new(MapType {
                key: ScalarType::String,
                value: FieldType::Scalar(ScalarType::Int32),
                value_default: None,
            }))
        );
    }

    #[test]
    fn enum_map_values_default_to_the_first_value() {
        let mut entry = message(
            "LevelsEntry",
            vec![
                field("key", 1, Type::Int32, Label::Optional),
                typed_field("value", 2, Type::Enum, Label::Optional, ".pkg.Level"),
            ],
        );
        entry.options = Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        });
        let mut holder = message(
            "Holder",
            vec![typed_field(
                "levels",
                1,
                Type::Message,
                Label::Repeated,
                ".pkg.Holder.LevelsEntry",
            )],
        );
        holder.nested_type.push(entry);
        let mut files = vec![file("l.proto", "pkg", "proto2", vec![holder])];
        files[0].enum_type.push(enumeration("Level", &[("LOW", 3), ("HIGH", 9)]));
        let info = resolve(&files).unwrap();
        match &info.messages[0].fields[0].field_type {
            FieldType::Map(map) => assert_eq!(map.value_default, Some(DefaultValue::Enum(3))),
            other => panic!("expected a map field, got {other:?}"),
        }
    }

    #[test]
    fn names_are_collision_checked() {
        let mut outer = message(
            "Outer",
            vec![
                field("kind_a", 1, Type::Int32, Label::Optional),
                field("new", 2, Type::Int32, Label::Optional),
                field("value", 3, Type::Int32, Label::Optional),
                field("set_value", 4, Type::Int32, Label::Optional),
            ],
        );
        outer.field[0].oneof_index = Some(0);
        outer.oneof_decl.push(OneofDescriptorProto {
            name: Some("kind".to_string()),
            ..Default::default()
        });
        outer.nested_type.push(message("Kind", vec![]));
        let files = vec![file("n.proto", "pkg", "proto3", vec![outer, message("outer", vec![])])];
        let info = resolve(&files).unwrap();
        let outer = &info.messages[0];
        assert_eq!(outer.module, "outer_2");
        assert_eq!(outer.oneofs[0].enum_path.name, "KindOneof");
        assert_eq!(outer.oneofs[0].enum_path.modules, ["pkg", "outer_2"]);
        assert_eq!(outer.fields[1].member, "new_2");
        assert_eq!(outer.fields[3].member, "set_value_4");
        assert_eq!(outer.messages[0].path.modules, ["pkg", "outer_2"]);
    }

    #[test]
    fn enum_variants_strip_prefix_and_collect_aliases() {
        let mut color = enumeration(
            "Color",
            &[("COLOR_UNSPECIFIED", 0), ("COLOR_RED", 1), ("COLOR_CRIMSON", 1)],
        );
        color.options = Some(prost_types::EnumOptions {
            allow_alias: Some(true),
            ..Default::default()
        });
        let mut files = vec![file("e.proto", "pkg", "proto3", vec![])];
        files[0].enum_type.push(color);
        files[0].enum_type.push(enumeration("Mode", &[("MODE_1", 0), ("OTHER", 1)]));
        let info = resolve(&files).unwrap();

        let color = &info.enums[0];
        let variants: Vec<_> = color.values.iter().map(|v| v.variant.as_str()).collect();
        assert_eq!(variants, ["Unspecified", "Red"]);
        assert_eq!(color.aliases[0].name, "COLOR_CRIMSON");
        assert_eq!(color.aliases[0].target, "Red");

        let mode = &info.enums[1];
        let variants: Vec<_> = mode.values.iter().map(|v| v.variant.as_str()).collect();
        assert_eq!(variants, ["Mode1", "Other"]);
    }

    #[test]
    fn proto2_defaults() {
        let mut a = field("a", 1, Type::Int32, Label::Optional);
        a.default_value = Some("7".to_string());
        let mut level = typed_field("level", 2, Type::Enum, Label::Optional, ".pkg.Level");
        level.default_value = Some("HIGH".to_string());
        let implicit = typed_field("implicit", 3, Type::Enum, Label::Optional, ".pkg.Level");
        let mut bad = field("bad", 4, Type::Bool, Label::Optional);
        bad.default_value = Some("maybe".to_string());

        let mut files =
            vec![file("d.proto", "pkg", "proto2", vec![message("D", vec![a, level, implicit])])];
        files[0].enum_type.push(enumeration("Level", &[("LOW", 3), ("HIGH", 9)]));
        let info = resolve(&files).unwrap();
        let fields = &info.messages[0].fields;
        assert_eq!(fields[0].default, Some(DefaultValue::I32(7)));
        assert_eq!(fields[1].default, Some(DefaultValue::Enum(9)));
        assert_eq!(fields[2].default, Some(DefaultValue::Enum(3)));
        assert_eq!(fields[0].has_bit, Some(0));
        assert_eq!(fields[2].has_bit, Some(2));

        files[0].message_type[0].field.push(bad);
        assert!(matches!(resolve(&files), Err(SchemaError::InvalidDefault { .. })));
    }
}
