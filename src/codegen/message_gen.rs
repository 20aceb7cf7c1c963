//! Message generation.
//!
//! Emits, per message: the struct, `new`/`Default`, `Clear`, `PartialEq`,
//! `FieldHash`/`Hash`, accessors, and the `Protobuf` impl (`compute_size`,
//! `encode_raw`, `merge_from`, `is_initialized`). Nested types and oneof enums go
//! into a module named after the message.
//!
//! Every per-field fragment is derived from the field's [`FieldStrategy`]; the
//! decoder's match arms come from [`strategy::dispatch_table`].

use std::collections::HashMap;

use proc_macro2::{Ident, Literal, TokenStream};
use quote::quote;

use super::comments::doc_attrs;
use super::defaults::DefaultValue;
use super::enum_gen;
use super::model::{FieldInfo, FieldType, MessageInfo, OneofInfo};
use super::names::{self, NameScope};
use super::strategy::{
    self, DecodeAction, FieldStrategy, Storage, ValueKind, field_ident, method_ident,
};
use crate::wire;

pub fn generate_message(info: &MessageInfo, root: &TokenStream) -> TokenStream {
    MessageGen::new(info, root).generate()
}

struct MessageGen<'a> {
    info: &'a MessageInfo,
    root: &'a TokenStream,
    strategies: Vec<FieldStrategy>,
    /// Oneof enum variant per member field index.
    variants: HashMap<usize, Ident>,
}

/// Bit position of a presence flag: word index and mask.
struct HasBit {
    word: Literal,
    mask: Literal,
}

impl HasBit {
    fn of(field: &FieldInfo) -> Option<HasBit> {
        field.has_bit.map(|bit| HasBit {
            word: Literal::usize_unsuffixed((bit / 32) as usize),
            mask: Literal::u32_unsuffixed(1 << (bit % 32)),
        })
    }

    fn is_set(&self) -> TokenStream {
        let HasBit { word, mask } = self;
        quote!((self._has_bits[#word] & #mask) != 0)
    }

    fn is_unset(&self) -> TokenStream {
        let HasBit { word, mask } = self;
        quote!((self._has_bits[#word] & #mask) == 0)
    }

    fn set(&self) -> TokenStream {
        let HasBit { word, mask } = self;
        quote!(self._has_bits[#word] |= #mask;)
    }

    fn unset(&self) -> TokenStream {
        let HasBit { word, mask } = self;
        quote!(self._has_bits[#word] &= !#mask;)
    }
}

fn tag_of(field: &FieldInfo, wire_type: wire::WireType) -> Literal {
    strategy::tag_literal(wire::make_tag(field.number, wire_type))
}

/// Declared default of a singular value, or its zero.
fn default_of(field: &FieldInfo, value: &ValueKind) -> DefaultValue {
    if let Some(default) = &field.default {
        return default.clone();
    }
    match value {
        ValueKind::Scalar(scalar) => DefaultValue::zero(*scalar),
        ValueKind::Enum(_) | ValueKind::Message(_) => DefaultValue::Enum(0),
    }
}

/// Expression constructing a stored value equal to `default`.
fn initial_value(value: &ValueKind, default: &DefaultValue) -> TokenStream {
    let literal = default.literal();
    match (value, default.is_zero()) {
        (ValueKind::Enum(_), _) => quote!(::tightbuf::EnumValue::from_number(#literal)),
        (ValueKind::Scalar(_), true) if value.storage() == Storage::String => {
            quote!(::std::string::String::new())
        }
        (ValueKind::Scalar(_), false) if value.storage() == Storage::String => {
            quote!(::std::string::String::from(#literal))
        }
        (ValueKind::Scalar(_), true) if value.storage() == Storage::Bytes => {
            quote!(::std::vec::Vec::new())
        }
        (ValueKind::Scalar(_), false) if value.storage() == Storage::Bytes => {
            quote!(#literal.to_vec())
        }
        _ => literal,
    }
}

/// Statements resetting `self.#ident` to `default`, keeping string and byte buffers.
fn reset_value(ident: &Ident, value: &ValueKind, default: &DefaultValue) -> TokenStream {
    let literal = default.literal();
    match value.storage() {
        Storage::String if default.is_zero() => quote!(self.#ident.clear();),
        Storage::String => quote! {
            self.#ident.clear();
            self.#ident.push_str(#literal);
        },
        Storage::Bytes if default.is_zero() => quote!(self.#ident.clear();),
        Storage::Bytes => quote! {
            self.#ident.clear();
            self.#ident.extend_from_slice(#literal);
        },
        Storage::Copy => {
            let initial = initial_value(value, default);
            quote!(self.#ident = #initial;)
        }
    }
}

/// Argument form of a stored value for `write_*` and `*_size` calls.
fn value_arg(value: &ValueKind, place: TokenStream) -> TokenStream {
    match (value.storage(), value.is_message()) {
        (Storage::Copy, false) => place,
        _ => quote!(&#place),
    }
}

/// Argument form of a value bound by reference in a pattern.
fn bound_arg(value: &ValueKind, binding: &TokenStream) -> TokenStream {
    match (value.storage(), value.is_message()) {
        (Storage::Copy, false) => quote!(*#binding),
        _ => binding.clone(),
    }
}

impl<'a> MessageGen<'a> {
    fn new(info: &'a MessageInfo, root: &'a TokenStream) -> Self {
        let strategies: Vec<_> = info.fields.iter().map(FieldStrategy::select).collect();
        let mut variants = HashMap::new();
        for oneof in &info.oneofs {
            let mut scope = NameScope::new();
            for &index in &oneof.fields {
                let base =
                    names::sanitize_type_name(&names::to_pascal_case(&info.fields[index].name));
                variants.insert(index, names::ident(&scope.claim(&base, "")));
            }
        }
        MessageGen {
            info,
            root,
            strategies,
            variants,
        }
    }

    fn name(&self) -> Ident {
        names::ident(&self.info.path.name)
    }

    fn oneof_path(&self, oneof: &OneofInfo) -> TokenStream {
        oneof.enum_path.tokens(self.root)
    }

    fn oneof_ident(&self, oneof: &OneofInfo) -> Ident {
        names::ident(&names::sanitize_field_name(&oneof.member))
    }

    /// `Path::Variant` for a oneof member.
    fn variant_path(&self, index: usize, oneof: usize) -> TokenStream {
        let path = self.oneof_path(&self.info.oneofs[oneof]);
        let variant = &self.variants[&index];
        quote!(#path::#variant)
    }

    fn is_message_member(&self, index: usize) -> bool {
        match &self.strategies[index] {
            FieldStrategy::OneofMember { value, .. } => value.is_message(),
            _ => false,
        }
    }

    /// Slot that keeps a deselected message member of `oneof` allocated, if the
    /// oneof has message members.
    fn spare_ident(&self, oneof: usize) -> Option<Ident> {
        let info = &self.info.oneofs[oneof];
        let has_message = info.fields.iter().any(|&index| self.is_message_member(index));
        has_message.then(|| {
            Ident::new(&format!("_{}_spare", info.member), proc_macro2::Span::call_site())
        })
    }

    /// Moves the selected member of `oneof` into its spare slot when it is a message.
    fn stash_oneof(&self, oneof: usize, spare: &Ident) -> TokenStream {
        let storage = self.oneof_ident(&self.info.oneofs[oneof]);
        let variants: Vec<_> = self.info.oneofs[oneof]
            .fields
            .iter()
            .filter(|&&index| self.is_message_member(index))
            .map(|&index| self.variant_path(index, oneof))
            .collect();
        let pattern = match variants.as_slice() {
            [single] => quote!(#single(_)),
            _ => quote!((#(#variants(_))|*)),
        };
        quote! {
            if let ::core::option::Option::Some(value @ #pattern) = self.#storage.take() {
                self.#spare = ::core::option::Option::Some(value);
            }
        }
    }

    /// Selects the message member `index` of `oneof`, reusing a spare allocation of
    /// the same member.
    fn select_message_member(&self, index: usize, oneof: usize) -> TokenStream {
        let storage = self.oneof_ident(&self.info.oneofs[oneof]);
        let variant = self.variant_path(index, oneof);
        let Some(spare) = self.spare_ident(oneof) else {
            return TokenStream::new();
        };
        let stash = self.stash_oneof(oneof, &spare);
        quote! {
            if !matches!(self.#storage, ::core::option::Option::Some(#variant(_))) {
                #stash
                let value = match self.#spare.take() {
                    ::core::option::Option::Some(#variant(mut value)) => {
                        ::tightbuf::Clear::clear(&mut *value);
                        value
                    }
                    other => {
                        self.#spare = other;
                        ::std::boxed::Box::default()
                    }
                };
                self.#storage = ::core::option::Option::Some(#variant(value));
            }
        }
    }

    fn fields(&self) -> impl Iterator<Item = (usize, &'a FieldInfo, &FieldStrategy)> {
        self.info
            .fields
            .iter()
            .zip(&self.strategies)
            .enumerate()
            .map(|(index, (field, strategy))| (index, field, strategy))
    }

    fn generate(&self) -> TokenStream {
        let name = self.name();
        let docs = doc_attrs(self.info.comment.as_deref());
        let full_name = &self.info.full_name;

        let struct_fields = self.struct_fields();
        let constructor = self.constructor();
        let accessors = self.accessors();
        let clear = self.clear_body();
        let (eq_param, eq_body) = self.eq_body();
        let (hash_param, hash_body) = self.hash_body();
        let compute_size = self.compute_size();
        let encode_raw = self.encode_raw();
        let merge_from = self.merge_from();
        let is_initialized = self.is_initialized();
        let module = self.module();

        quote! {
            #docs
            #[derive(Clone, Debug)]
            pub struct #name {
                #struct_fields
            }

            impl #name {
                #constructor
                #accessors
            }

            impl ::core::default::Default for #name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl ::tightbuf::Clear for #name {
                fn clear(&mut self) {
                    #clear
                }
            }

            impl ::core::cmp::PartialEq for #name {
                fn eq(&self, #eq_param: &Self) -> bool {
                    #eq_body
                }
            }

            impl ::tightbuf::FieldHash for #name {
                fn field_hash<H: ::core::hash::Hasher>(&self, #hash_param: &mut H) {
                    #hash_body
                }
            }

            impl ::core::hash::Hash for #name {
                fn hash<H: ::core::hash::Hasher>(&self, state: &mut H) {
                    ::tightbuf::FieldHash::field_hash(self, state);
                }
            }

            impl ::tightbuf::Protobuf for #name {
                const NAME: &'static str = #full_name;

                #compute_size

                fn cached_size(&self) -> usize {
                    self._cached_size.get()
                }

                #encode_raw
                #merge_from
                #is_initialized
            }

            #module
        }
    }

    fn storage_type(&self, strategy: &FieldStrategy) -> Option<TokenStream> {
        let root = self.root;
        Some(match strategy {
            FieldStrategy::SingularScalar { value, .. } => value.type_tokens(root),
            FieldStrategy::SingularMessage { value } => {
                let ty = value.type_tokens(root);
                quote!(::tightbuf::MessageField<#ty>)
            }
            FieldStrategy::RepeatedScalar { value, .. }
            | FieldStrategy::PackedScalar { value, .. } => {
                let ty = value.type_tokens(root);
                quote!(::std::vec::Vec<#ty>)
            }
            FieldStrategy::RepeatedLengthDelimited { value }
            | FieldStrategy::RepeatedMessage { value } => {
                let ty = value.type_tokens(root);
                quote!(::tightbuf::RepeatedField<#ty>)
            }
            FieldStrategy::Map { key, value } => {
                let key = key.type_tokens(root);
                let value = value.type_tokens(root);
                quote!(::std::collections::HashMap<#key, #value>)
            }
            FieldStrategy::OneofMember { .. } => return None,
        })
    }

    fn struct_fields(&self) -> TokenStream {
        let mut fields = Vec::new();
        for (_, field, strategy) in self.fields() {
            if let Some(ty) = self.storage_type(strategy) {
                let ident = field_ident(field);
                fields.push(quote!(#ident: #ty,));
            }
        }
        for (index, oneof) in self.info.oneofs.iter().enumerate() {
            let ident = self.oneof_ident(oneof);
            let path = self.oneof_path(oneof);
            fields.push(quote!(#ident: ::core::option::Option<#path>,));
            if let Some(spare) = self.spare_ident(index) {
                fields.push(quote!(#spare: ::core::option::Option<#path>,));
            }
        }
        if self.info.has_bit_words > 0 {
            let words = Literal::usize_unsuffixed(self.info.has_bit_words);
            fields.push(quote!(_has_bits: [u32; #words],));
        }
        fields.push(quote!(_cached_size: ::tightbuf::CachedSize,));
        if self.info.store_unknown_fields {
            fields.push(quote!(_unknown: ::tightbuf::UnknownFields,));
        }
        quote!(#(#fields)*)
    }

    fn constructor(&self) -> TokenStream {
        let mut inits = Vec::new();
        for (_, field, strategy) in self.fields() {
            let ident = field_ident(field);
            let init = match strategy {
                FieldStrategy::SingularScalar { value, .. } => {
                    initial_value(value, &default_of(field, value))
                }
                FieldStrategy::SingularMessage { .. } => quote!(::tightbuf::MessageField::new()),
                FieldStrategy::RepeatedScalar { .. } | FieldStrategy::PackedScalar { .. } => {
                    quote!(::std::vec::Vec::new())
                }
                FieldStrategy::RepeatedLengthDelimited { .. }
                | FieldStrategy::RepeatedMessage { .. } => {
                    quote!(::tightbuf::RepeatedField::new())
                }
                FieldStrategy::Map { .. } => quote!(::std::collections::HashMap::new()),
                FieldStrategy::OneofMember { .. } => continue,
            };
            inits.push(quote!(#ident: #init,));
        }
        for (index, oneof) in self.info.oneofs.iter().enumerate() {
            let ident = self.oneof_ident(oneof);
            inits.push(quote!(#ident: ::core::option::Option::None,));
            if let Some(spare) = self.spare_ident(index) {
                inits.push(quote!(#spare: ::core::option::Option::None,));
            }
        }
        if self.info.has_bit_words > 0 {
            let words = Literal::usize_unsuffixed(self.info.has_bit_words);
            inits.push(quote!(_has_bits: [0; #words],));
        }
        inits.push(quote!(_cached_size: ::tightbuf::CachedSize::new(),));
        if self.info.store_unknown_fields {
            inits.push(quote!(_unknown: ::tightbuf::UnknownFields::new(),));
        }
        quote! {
            pub fn new() -> Self {
                Self {
                    #(#inits)*
                }
            }
        }
    }

    fn clear_body(&self) -> TokenStream {
        let mut stmts = Vec::new();
        for (_, field, strategy) in self.fields() {
            let ident = field_ident(field);
            match strategy {
                FieldStrategy::SingularScalar { value, .. } => {
                    stmts.push(reset_value(&ident, value, &default_of(field, value)));
                }
                FieldStrategy::OneofMember { .. } => {}
                _ => stmts.push(quote!(self.#ident.clear();)),
            }
        }
        for (index, oneof) in self.info.oneofs.iter().enumerate() {
            let ident = self.oneof_ident(oneof);
            match self.spare_ident(index) {
                Some(spare) => stmts.push(self.stash_oneof(index, &spare)),
                None => stmts.push(quote!(self.#ident = ::core::option::Option::None;)),
            }
        }
        if self.info.has_bit_words > 0 {
            let words = Literal::usize_unsuffixed(self.info.has_bit_words);
            stmts.push(quote!(self._has_bits = [0; #words];));
        }
        if self.info.store_unknown_fields {
            stmts.push(quote!(self._unknown.clear();));
        }
        quote!(#(#stmts)*)
    }

    /// Fields compared and hashed: storage, oneofs, presence bits, unknown bytes.
    fn compared_fields(&self) -> Vec<Ident> {
        let mut idents: Vec<_> = self
            .fields()
            .filter(|(_, _, strategy)| !matches!(strategy, FieldStrategy::OneofMember { .. }))
            .map(|(_, field, _)| field_ident(field))
            .collect();
        idents.extend(self.info.oneofs.iter().map(|oneof| self.oneof_ident(oneof)));
        if self.info.store_unknown_fields {
            idents.push(Ident::new("_unknown", proc_macro2::Span::call_site()));
        }
        idents
    }

    fn eq_body(&self) -> (Ident, TokenStream) {
        let mut idents = self.compared_fields();
        if self.info.has_bit_words > 0 {
            idents.push(Ident::new("_has_bits", proc_macro2::Span::call_site()));
        }
        if idents.is_empty() {
            return (Ident::new("_other", proc_macro2::Span::call_site()), quote!(true));
        }
        let param = Ident::new("other", proc_macro2::Span::call_site());
        (param, quote!(#(self.#idents == other.#idents)&&*))
    }

    fn hash_body(&self) -> (Ident, TokenStream) {
        let idents = self.compared_fields();
        if idents.is_empty() && self.info.has_bit_words == 0 {
            return (Ident::new("_state", proc_macro2::Span::call_site()), TokenStream::new());
        }
        let has_bits = (self.info.has_bit_words > 0)
            .then(|| quote!(::core::hash::Hash::hash(&self._has_bits, state);));
        let body = quote! {
            #(::tightbuf::FieldHash::field_hash(&self.#idents, state);)*
            #has_bits
        };
        (Ident::new("state", proc_macro2::Span::call_site()), body)
    }

    fn accessors(&self) -> TokenStream {
        let mut methods = Vec::new();
        for (index, field, strategy) in self.fields() {
            methods.push(self.field_accessors(index, field, strategy));
        }
        for (index, oneof) in self.info.oneofs.iter().enumerate() {
            let ident = self.oneof_ident(oneof);
            let path = self.oneof_path(oneof);
            let reset = match self.spare_ident(index) {
                Some(spare) => self.stash_oneof(index, &spare),
                None => quote!(self.#ident = ::core::option::Option::None;),
            };
            let clear = method_ident("clear_", &oneof.member, "");
            let mutable = method_ident("", &oneof.member, "_mut");
            let docs = doc_attrs(oneof.comment.as_deref());
            methods.push(quote! {
                #docs
                pub fn #ident(&self) -> ::core::option::Option<&#path> {
                    self.#ident.as_ref()
                }

                pub fn #mutable(&mut self) -> &mut ::core::option::Option<#path> {
                    &mut self.#ident
                }

                pub fn #clear(&mut self) {
                    #reset
                }
            });
        }
        quote!(#(#methods)*)
    }

    fn field_accessors(
        &self,
        index: usize,
        field: &FieldInfo,
        strategy: &FieldStrategy,
    ) -> TokenStream {
        let ident = field_ident(field);
        let member = &field.member;
        let set = method_ident("set_", member, "");
        let clear = method_ident("clear_", member, "");
        let has = method_ident("has_", member, "");
        let mutable = method_ident("", member, "_mut");
        let add = method_ident("add_", member, "");
        let docs = doc_attrs(field.comment.as_deref());
        let root = self.root;

        match strategy {
            FieldStrategy::SingularScalar { value, .. } => {
                let ty = value.type_tokens(root);
                let has_bit = HasBit::of(field);
                let mark = has_bit.as_ref().map(HasBit::set);
                let unmark = has_bit.as_ref().map(HasBit::unset);
                let has_method = has_bit.as_ref().map(|bit| {
                    let is_set = bit.is_set();
                    quote! {
                        pub fn #has(&self) -> bool {
                            #is_set
                        }
                    }
                });
                let reset = reset_value(&ident, value, &default_of(field, value));
                let (getter, setter) = match value.storage() {
                    Storage::String => (
                        quote! {
                            #docs
                            pub fn #ident(&self) -> &str {
                                &self.#ident
                            }

                            pub fn #mutable(&mut self) -> &mut ::std::string::String {
                                #mark
                                &mut self.#ident
                            }
                        },
                        quote! {
                            pub fn #set(&mut self, value: &str) -> &mut Self {
                                self.#ident.clear();
                                self.#ident.push_str(value);
                                #mark
                                self
                            }
                        },
                    ),
                    Storage::Bytes => (
                        quote! {
                            #docs
                            pub fn #ident(&self) -> &[u8] {
                                &self.#ident
                            }

                            pub fn #mutable(&mut self) -> &mut ::std::vec::Vec<u8> {
                                #mark
                                &mut self.#ident
                            }
                        },
                        quote! {
                            pub fn #set(&mut self, value: &[u8]) -> &mut Self {
                                self.#ident.clear();
                                self.#ident.extend_from_slice(value);
                                #mark
                                self
                            }
                        },
                    ),
                    Storage::Copy => {
                        let param = match value {
                            ValueKind::Enum(_) => quote!(impl ::core::convert::Into<#ty>),
                            _ => ty.clone(),
                        };
                        let assign = match value {
                            ValueKind::Enum(_) => quote!(self.#ident = value.into();),
                            _ => quote!(self.#ident = value;),
                        };
                        (
                            quote! {
                                #docs
                                pub fn #ident(&self) -> #ty {
                                    self.#ident
                                }
                            },
                            quote! {
                                pub fn #set(&mut self, value: #param) -> &mut Self {
                                    #assign
                                    #mark
                                    self
                                }
                            },
                        )
                    }
                };
                quote! {
                    #getter
                    #setter
                    #has_method

                    pub fn #clear(&mut self) {
                        #reset
                        #unmark
                    }
                }
            }
            FieldStrategy::SingularMessage { value } => {
                let ty = value.type_tokens(root);
                quote! {
                    #docs
                    pub fn #ident(&self) -> ::core::option::Option<&#ty> {
                        self.#ident.get()
                    }

                    /// Returns the sub-message, setting it to an empty message if absent.
                    pub fn #mutable(&mut self) -> &mut #ty {
                        self.#ident.get_or_init()
                    }

                    pub fn #set(&mut self, value: #ty) -> &mut Self {
                        self.#ident.set(value);
                        self
                    }

                    pub fn #has(&self) -> bool {
                        self.#ident.is_some()
                    }

                    pub fn #clear(&mut self) {
                        self.#ident.clear();
                    }
                }
            }
            FieldStrategy::RepeatedScalar { value, .. }
            | FieldStrategy::PackedScalar { value, .. } => {
                let ty = value.type_tokens(root);
                let (param, push) = match value {
                    ValueKind::Enum(_) => {
                        (quote!(impl ::core::convert::Into<#ty>), quote!(value.into()))
                    }
                    _ => (ty.clone(), quote!(value)),
                };
                quote! {
                    #docs
                    pub fn #ident(&self) -> &[#ty] {
                        &self.#ident
                    }

                    pub fn #mutable(&mut self) -> &mut ::std::vec::Vec<#ty> {
                        &mut self.#ident
                    }

                    pub fn #add(&mut self, value: #param) -> &mut Self {
                        self.#ident.push(#push);
                        self
                    }

                    pub fn #clear(&mut self) {
                        self.#ident.clear();
                    }
                }
            }
            FieldStrategy::RepeatedLengthDelimited { value }
            | FieldStrategy::RepeatedMessage { value } => {
                let ty = value.type_tokens(root);
                quote! {
                    #docs
                    pub fn #ident(&self) -> &[#ty] {
                        &self.#ident
                    }

                    pub fn #mutable(&mut self) -> &mut ::tightbuf::RepeatedField<#ty> {
                        &mut self.#ident
                    }

                    /// Appends an empty element and returns it.
                    pub fn #add(&mut self) -> &mut #ty {
                        self.#ident.add()
                    }

                    pub fn #clear(&mut self) {
                        self.#ident.clear();
                    }
                }
            }
            FieldStrategy::Map { key, value } => {
                let key = key.type_tokens(root);
                let value = value.type_tokens(root);
                quote! {
                    #docs
                    pub fn #ident(&self) -> &::std::collections::HashMap<#key, #value> {
                        &self.#ident
                    }

                    pub fn #mutable(&mut self) -> &mut ::std::collections::HashMap<#key, #value> {
                        &mut self.#ident
                    }

                    pub fn #clear(&mut self) {
                        self.#ident.clear();
                    }
                }
            }
            FieldStrategy::OneofMember { oneof, value } => {
                self.oneof_member_accessors(index, field, *oneof, value)
            }
        }
    }

    fn oneof_member_accessors(
        &self,
        index: usize,
        field: &FieldInfo,
        oneof: usize,
        value: &ValueKind,
    ) -> TokenStream {
        let storage = self.oneof_ident(&self.info.oneofs[oneof]);
        let variant = self.variant_path(index, oneof);
        let ident = field_ident(field);
        let member = &field.member;
        let set = method_ident("set_", member, "");
        let clear = method_ident("clear_", member, "");
        let has = method_ident("has_", member, "");
        let mutable = method_ident("", member, "_mut");
        let docs = doc_attrs(field.comment.as_deref());
        let ty = value.type_tokens(self.root);

        let (getter_ty, getter_value, param, stored) = match (value, value.storage()) {
            (ValueKind::Message(_), _) => (
                quote!(&#ty),
                quote!(&**value),
                ty.clone(),
                quote!(::std::boxed::Box::new(value)),
            ),
            (ValueKind::Enum(_), _) => (
                ty.clone(),
                quote!(*value),
                quote!(impl ::core::convert::Into<#ty>),
                quote!(value.into()),
            ),
            (_, Storage::String) => (
                quote!(&str),
                quote!(value.as_str()),
                quote!(&str),
                quote!(::std::string::String::from(value)),
            ),
            (_, Storage::Bytes) => (
                quote!(&[u8]),
                quote!(value.as_slice()),
                quote!(&[u8]),
                quote!(value.to_vec()),
            ),
            (_, Storage::Copy) => (ty.clone(), quote!(*value), ty.clone(), quote!(value)),
        };

        let deselect = match self.spare_ident(oneof) {
            Some(spare) if value.is_message() => quote!(self.#spare = self.#storage.take();),
            _ => quote!(self.#storage = ::core::option::Option::None;),
        };

        let message_mut = value.is_message().then(|| {
            let select = self.select_message_member(index, oneof);
            quote! {
                /// Selects this member, starting from an empty message unless it is
                /// already selected.
                pub fn #mutable(&mut self) -> &mut #ty {
                    #select
                    match &mut self.#storage {
                        ::core::option::Option::Some(#variant(value)) => &mut **value,
                        _ => unreachable!(),
                    }
                }
            }
        });

        quote! {
            #docs
            pub fn #ident(&self) -> ::core::option::Option<#getter_ty> {
                match &self.#storage {
                    ::core::option::Option::Some(#variant(value)) => ::core::option::Option::Some(#getter_value),
                    _ => ::core::option::Option::None,
                }
            }

            /// Selects this member, clearing any other member of the oneof.
            pub fn #set(&mut self, value: #param) -> &mut Self {
                self.#storage = ::core::option::Option::Some(#variant(#stored));
                self
            }

            pub fn #has(&self) -> bool {
                matches!(self.#storage, ::core::option::Option::Some(#variant(_)))
            }

            pub fn #clear(&mut self) {
                if self.#has() {
                    #deselect
                }
            }

            #message_mut
        }
    }

    fn compute_size(&self) -> TokenStream {
        let mut stmts = Vec::new();
        for (index, field, strategy) in self.fields() {
            stmts.push(self.size_field(index, field, strategy));
        }
        if self.info.store_unknown_fields {
            stmts.push(quote!(size += self._unknown.len();));
        }
        let declare = if stmts.is_empty() {
            quote!(let size = 0usize;)
        } else {
            quote!(let mut size = 0usize;)
        };
        quote! {
            fn compute_size(&self) -> usize {
                #declare
                #(#stmts)*
                self._cached_size.set(size);
                size
            }
        }
    }

    fn size_field(&self, index: usize, field: &FieldInfo, strategy: &FieldStrategy) -> TokenStream {
        let ident = field_ident(field);
        let tag_size = strategy::tag_size_literal(field.number);
        match strategy {
            FieldStrategy::SingularScalar { value, .. } => {
                let condition = self.presence_condition(field, value);
                let size = value.size(value_arg(value, quote!(self.#ident)), true);
                quote! {
                    if #condition {
                        size += #tag_size + #size;
                    }
                }
            }
            FieldStrategy::SingularMessage { value } => {
                let size = value.size(quote!(value), true);
                quote! {
                    if let ::core::option::Option::Some(value) = self.#ident.get() {
                        size += #tag_size + #size;
                    }
                }
            }
            FieldStrategy::RepeatedScalar { rule, .. } => {
                let data = strategy::packed_data_size(*rule, quote!(&self.#ident));
                quote! {
                    size += #tag_size * self.#ident.len() + #data;
                }
            }
            FieldStrategy::PackedScalar { rule, .. } => {
                let data = strategy::packed_data_size(*rule, quote!(&self.#ident));
                quote! {
                    if !self.#ident.is_empty() {
                        size += #tag_size + ::tightbuf::encoding::length_delimited_size(#data);
                    }
                }
            }
            FieldStrategy::RepeatedLengthDelimited { value }
            | FieldStrategy::RepeatedMessage { value } => {
                let size = value.size(quote!(value), true);
                quote! {
                    for value in self.#ident.iter() {
                        size += #tag_size + #size;
                    }
                }
            }
            FieldStrategy::Map { key, value } => {
                let entry_size = map_entry_size(key, value, true);
                quote! {
                    for (key, value) in &self.#ident {
                        let entry_size = #entry_size;
                        size += #tag_size + ::tightbuf::encoding::length_delimited_size(entry_size);
                    }
                }
            }
            FieldStrategy::OneofMember { oneof, value } => {
                let storage = self.oneof_ident(&self.info.oneofs[*oneof]);
                let variant = self.variant_path(index, *oneof);
                let binding = quote!(value);
                let arg = match value {
                    ValueKind::Message(_) => quote!(&**value),
                    _ => bound_arg(value, &binding),
                };
                let size = value.size(arg, true);
                quote! {
                    if let ::core::option::Option::Some(#variant(value)) = &self.#storage {
                        size += #tag_size + #size;
                    }
                }
            }
        }
    }

    /// Condition under which a singular scalar is written.
    fn presence_condition(&self, field: &FieldInfo, value: &ValueKind) -> TokenStream {
        match HasBit::of(field) {
            Some(bit) => bit.is_set(),
            None => {
                let ident = field_ident(field);
                value.is_nonzero(quote!(self.#ident))
            }
        }
    }

    fn encode_raw(&self) -> TokenStream {
        let mut stmts = Vec::new();
        for (index, field, strategy) in self.fields() {
            stmts.push(self.encode_field(index, field, strategy));
        }
        if self.info.store_unknown_fields {
            stmts.push(quote!(sink.write_raw_bytes(self._unknown.as_bytes());));
        }
        let param = if stmts.is_empty() {
            quote!(_sink)
        } else {
            quote!(sink)
        };
        quote! {
            fn encode_raw(&self, #param: &mut ::tightbuf::ProtoSink) {
                #(#stmts)*
            }
        }
    }

    fn encode_field(
        &self,
        index: usize,
        field: &FieldInfo,
        strategy: &FieldStrategy,
    ) -> TokenStream {
        let ident = field_ident(field);
        let tag = tag_of(field, strategy.wire_type());
        match strategy {
            FieldStrategy::SingularScalar { value, .. } => {
                let condition = self.presence_condition(field, value);
                let write = value.write(value_arg(value, quote!(self.#ident)));
                quote! {
                    if #condition {
                        sink.write_raw_tag(#tag);
                        #write;
                    }
                }
            }
            FieldStrategy::SingularMessage { .. } => quote! {
                if let ::core::option::Option::Some(value) = self.#ident.get() {
                    sink.write_raw_tag(#tag);
                    sink.write_message(value);
                }
            },
            FieldStrategy::RepeatedScalar { value, .. } => {
                let write = value.write(quote!(value));
                quote! {
                    for &value in &self.#ident {
                        sink.write_raw_tag(#tag);
                        #write;
                    }
                }
            }
            FieldStrategy::PackedScalar { rule, .. } => {
                let data = strategy::packed_data_size(*rule, quote!(&self.#ident));
                let write = strategy::packed_write(*rule, quote!(&self.#ident));
                quote! {
                    if !self.#ident.is_empty() {
                        sink.write_raw_tag(#tag);
                        sink.write_varint32(#data as u32);
                        #write;
                    }
                }
            }
            FieldStrategy::RepeatedLengthDelimited { value }
            | FieldStrategy::RepeatedMessage { value } => {
                let write = value.write(quote!(value));
                quote! {
                    for value in self.#ident.iter() {
                        sink.write_raw_tag(#tag);
                        #write;
                    }
                }
            }
            FieldStrategy::Map { key, value } => {
                let entry_size = map_entry_size(key, value, false);
                let key_tag = strategy::tag_literal(wire::make_tag(1, key.wire_type()));
                let value_tag = strategy::tag_literal(wire::make_tag(2, value.wire_type()));
                let write_key = key.write(bound_arg(key, &quote!(key)));
                let write_value = value.write(bound_arg(value, &quote!(value)));
                quote! {
                    for (key, value) in &self.#ident {
                        let entry_size = #entry_size;
                        sink.write_raw_tag(#tag);
                        sink.write_varint32(entry_size as u32);
                        sink.write_raw_tag(#key_tag);
                        #write_key;
                        sink.write_raw_tag(#value_tag);
                        #write_value;
                    }
                }
            }
            FieldStrategy::OneofMember { oneof, value } => {
                let storage = self.oneof_ident(&self.info.oneofs[*oneof]);
                let variant = self.variant_path(index, *oneof);
                let arg = match value {
                    ValueKind::Message(_) => quote!(&**value),
                    _ => bound_arg(value, &quote!(value)),
                };
                let write = value.write(arg);
                quote! {
                    if let ::core::option::Option::Some(#variant(value)) = &self.#storage {
                        sink.write_raw_tag(#tag);
                        #write;
                    }
                }
            }
        }
    }

    fn merge_from(&self) -> TokenStream {
        let table = strategy::dispatch_table(&self.info.fields, &self.strategies);
        let arms = table.iter().map(|entry| {
            let field = &self.info.fields[entry.field];
            let strategy = &self.strategies[entry.field];
            let tag = strategy::tag_literal(entry.tag);
            let body = self.decode_arm(entry.field, field, strategy, entry.action);
            quote!(#tag => #body,)
        });
        let fallback = if self.info.store_unknown_fields {
            quote!(source.read_unknown_field(tag, &mut self._unknown)?)
        } else {
            quote!(source.skip_field(tag)?)
        };
        quote! {
            fn merge_from(
                &mut self,
                source: &mut ::tightbuf::ProtoSource<'_>,
            ) -> ::core::result::Result<(), ::tightbuf::DecodeError> {
                loop {
                    let tag = source.read_tag()?;
                    match tag {
                        0 => return ::core::result::Result::Ok(()),
                        #(#arms)*
                        _ => #fallback,
                    }
                }
            }
        }
    }

    fn decode_arm(
        &self,
        index: usize,
        field: &FieldInfo,
        strategy: &FieldStrategy,
        action: DecodeAction,
    ) -> TokenStream {
        let ident = field_ident(field);
        match strategy {
            FieldStrategy::SingularScalar { value, .. } => {
                let target = match value.storage() {
                    Storage::Copy => quote!(self.#ident),
                    _ => quote!(&mut self.#ident),
                };
                let read = value.read_into(target);
                match HasBit::of(field) {
                    Some(bit) => {
                        let mark = bit.set();
                        quote!({
                            #read;
                            #mark
                        })
                    }
                    None => read,
                }
            }
            FieldStrategy::SingularMessage { value } => {
                value.read_into(quote!(self.#ident.get_or_init()))
            }
            FieldStrategy::RepeatedScalar { value, rule }
            | FieldStrategy::PackedScalar { value, rule } => {
                match action {
                    DecodeAction::PackedRun => {
                        strategy::packed_read(*rule, quote!(&mut self.#ident))
                    }
                    _ => {
                        let read = value.read_value();
                        quote!(self.#ident.push(#read))
                    }
                }
            }
            FieldStrategy::RepeatedLengthDelimited { value }
            | FieldStrategy::RepeatedMessage { value } => {
                value.read_into(quote!(self.#ident.add()))
            }
            FieldStrategy::Map { key, value } => {
                let key_ty = key.type_tokens(self.root);
                let value_ty = value.type_tokens(self.root);
                let key_tag = strategy::tag_literal(wire::make_tag(1, key.wire_type()));
                let value_tag = strategy::tag_literal(wire::make_tag(2, value.wire_type()));
                let read_key = read_local(key, quote!(key));
                let read_value = read_local(value, quote!(value));
                let value_init = match &field.field_type {
                    FieldType::Map(map) => map.value_default.as_ref(),
                    _ => None,
                }
                .map(|default| initial_value(value, default))
                .unwrap_or_else(|| quote!(::core::default::Default::default()));
                quote!({
                    let len = source.read_length()?;
                    let old_limit = source.push_limit(len)?;
                    let mut key: #key_ty = ::core::default::Default::default();
                    let mut value: #value_ty = #value_init;
                    loop {
                        match source.read_tag()? {
                            0 => break,
                            #key_tag => #read_key,
                            #value_tag => #read_value,
                            other => source.skip_field(other)?,
                        }
                    }
                    source.pop_limit(old_limit);
                    self.#ident.insert(key, value);
                })
            }
            FieldStrategy::OneofMember { oneof, value } => {
                let storage = self.oneof_ident(&self.info.oneofs[*oneof]);
                let variant = self.variant_path(index, *oneof);
                match (value, value.storage()) {
                    (ValueKind::Message(_), _) => {
                        let select = self.select_message_member(index, *oneof);
                        quote!({
                            #select
                            if let ::core::option::Option::Some(#variant(value)) = &mut self.#storage {
                                source.read_message(&mut **value)?;
                            }
                        })
                    }
                    (_, Storage::Copy) => {
                        let read = value.read_value();
                        quote!(self.#storage = ::core::option::Option::Some(#variant(#read)))
                    }
                    (_, _) => {
                        let ty = value.type_tokens(self.root);
                        let read = value.read_into(quote!(&mut value));
                        quote!({
                            let mut value = <#ty>::new();
                            #read;
                            self.#storage = ::core::option::Option::Some(#variant(value));
                        })
                    }
                }
            }
        }
    }

    fn is_initialized(&self) -> TokenStream {
        let mut checks = Vec::new();
        for (index, field, strategy) in self.fields() {
            let ident = field_ident(field);
            if field.required {
                match HasBit::of(field) {
                    Some(bit) => {
                        let is_unset = bit.is_unset();
                        checks.push(quote! {
                            if #is_unset {
                                return false;
                            }
                        });
                    }
                    None if field.field_type.is_message() => checks.push(quote! {
                        if !self.#ident.is_some() {
                            return false;
                        }
                    }),
                    None => {}
                }
            }
            match strategy {
                FieldStrategy::SingularMessage { .. } => checks.push(quote! {
                    if let ::core::option::Option::Some(value) = self.#ident.get() {
                        if !::tightbuf::Protobuf::is_initialized(value) {
                            return false;
                        }
                    }
                }),
                FieldStrategy::RepeatedMessage { .. } => checks.push(quote! {
                    if !self.#ident.iter().all(|value| ::tightbuf::Protobuf::is_initialized(value)) {
                        return false;
                    }
                }),
                FieldStrategy::Map { value, .. } if value.is_message() => checks.push(quote! {
                    if !self.#ident.values().all(|value| ::tightbuf::Protobuf::is_initialized(value)) {
                        return false;
                    }
                }),
                FieldStrategy::OneofMember { oneof, value } if value.is_message() => {
                    let storage = self.oneof_ident(&self.info.oneofs[*oneof]);
                    let variant = self.variant_path(index, *oneof);
                    checks.push(quote! {
                        if let ::core::option::Option::Some(#variant(value)) = &self.#storage {
                            if !::tightbuf::Protobuf::is_initialized(&**value) {
                                return false;
                            }
                        }
                    });
                }
                _ => {}
            }
        }
        if checks.is_empty() {
            return TokenStream::new();
        }
        quote! {
            fn is_initialized(&self) -> bool {
                #(#checks)*
                true
            }
        }
    }

    /// Nested types and oneof enums.
    fn module(&self) -> TokenStream {
        if !self.info.has_module() {
            return TokenStream::new();
        }
        let module = names::ident(&self.info.module);
        let messages = self
            .info
            .messages
            .iter()
            .map(|nested| generate_message(nested, self.root));
        let enums = self.info.enums.iter().map(enum_gen::generate_enum);
        let oneofs = self
            .info
            .oneofs
            .iter()
            .enumerate()
            .map(|(slot, oneof)| self.oneof_enum(slot, oneof));
        quote! {
            pub mod #module {
                #(#messages)*
                #(#enums)*
                #(#oneofs)*
            }
        }
    }

    fn oneof_enum(&self, slot: usize, oneof: &OneofInfo) -> TokenStream {
        let name = names::ident(&oneof.enum_path.name);
        let docs = doc_attrs(oneof.comment.as_deref());
        let mut variants = Vec::new();
        let mut hash_arms = Vec::new();
        for &index in &oneof.fields {
            let field = &self.info.fields[index];
            let FieldStrategy::OneofMember { oneof: owner, value } = &self.strategies[index] else {
                continue;
            };
            debug_assert_eq!(*owner, slot);
            let variant = &self.variants[&index];
            let ty = value.type_tokens(self.root);
            let ty = if value.is_message() {
                quote!(::std::boxed::Box<#ty>)
            } else {
                ty
            };
            let field_docs = doc_attrs(field.comment.as_deref());
            let number = Literal::u32_unsuffixed(field.number);
            variants.push(quote! {
                #field_docs
                #variant(#ty),
            });
            hash_arms.push(quote! {
                Self::#variant(value) => {
                    state.write_u32(#number);
                    ::tightbuf::FieldHash::field_hash(value, state);
                }
            });
        }
        quote! {
            #docs
            #[derive(Clone, Debug, PartialEq)]
            pub enum #name {
                #(#variants)*
            }

            impl ::tightbuf::FieldHash for #name {
                fn field_hash<H: ::core::hash::Hasher>(&self, state: &mut H) {
                    match self {
                        #(#hash_arms)*
                    }
                }
            }
        }
    }
}

/// Statement reading a map key or value into the local `binding`.
fn read_local(value: &ValueKind, binding: TokenStream) -> TokenStream {
    match (value.storage(), value.is_message()) {
        (Storage::Copy, false) => value.read_into(binding),
        _ => value.read_into(quote!(&mut #binding)),
    }
}

/// Size of one map entry body bound to `key` and `value` references.
fn map_entry_size(key: &ValueKind, value: &ValueKind, compute: bool) -> TokenStream {
    let key_size = key.size(bound_arg(key, &quote!(key)), compute);
    let value_size = value.size(bound_arg(value, &quote!(value)), compute);
    quote!(2 + #key_size + #value_size)
}
