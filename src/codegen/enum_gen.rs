// Enum generation.
//
// Each schema enum becomes a `#[repr(i32)]` Rust enum plus a `ProtoEnum` impl
// mapping numbers and names both ways. Fields never store the Rust enum
// directly: they store `EnumValue<E>`, so numbers missing from this mapping
// survive decode and re-encode.

use proc_macro2::TokenStream;
use quote::quote;

use super::comments::doc_attrs;
use super::defaults::DefaultValue;
use super::model::EnumInfo;
use super::names;

pub fn generate_enum(info: &EnumInfo) -> TokenStream {
    let name = names::ident(&info.path.name);
    let full_name = &info.full_name;
    let docs = doc_attrs(info.comment.as_deref());

    let variants = info.values.iter().enumerate().map(|(index, value)| {
        let variant = names::ident(&value.variant);
        let number = DefaultValue::Enum(value.number).literal();
        let docs = doc_attrs(value.comment.as_deref());
        let default = (index == 0).then(|| quote!(#[default]));
        quote! {
            #docs
            #default
            #variant = #number,
        }
    });

    let from_number_arms = info.values.iter().map(|value| {
        let variant = names::ident(&value.variant);
        let number = DefaultValue::Enum(value.number).literal();
        quote!(#number => ::core::option::Option::Some(Self::#variant),)
    });
    let name_arms = info.values.iter().map(|value| {
        let variant = names::ident(&value.variant);
        let proto_name = &value.name;
        quote!(Self::#variant => #proto_name,)
    });
    let from_name_arms = info
        .values
        .iter()
        .map(|value| (&value.name, &value.variant))
        .chain(info.aliases.iter().map(|alias| (&alias.name, &alias.target)))
        .map(|(proto_name, variant)| {
            let variant = names::ident(variant);
            quote!(#proto_name => ::core::option::Option::Some(Self::#variant),)
        });

    let aliases = info.aliases.iter().map(|alias| {
        let constant = names::ident(&names::sanitize_type_name(&alias.name));
        let target = names::ident(&alias.target);
        let docs = doc_attrs(alias.comment.as_deref());
        quote! {
            #docs
            pub const #constant: Self = Self::#target;
        }
    });
    let all_variants = info.values.iter().map(|value| names::ident(&value.variant));
    let values_const = (!info.aliases.iter().any(|alias| alias.name == "VALUES")).then(|| {
        quote! {
            /// Every declared value, in declaration order.
            pub const VALUES: &'static [Self] = &[#(Self::#all_variants),*];
        }
    });

    quote! {
        #docs
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(i32)]
        pub enum #name {
            #(#variants)*
        }

        impl #name {
            #values_const
            #(#aliases)*
        }

        impl ::tightbuf::ProtoEnum for #name {
            const NAME: &'static str = #full_name;

            fn from_number(number: i32) -> ::core::option::Option<Self> {
                match number {
                    #(#from_number_arms)*
                    _ => ::core::option::Option::None,
                }
            }

            fn number(self) -> i32 {
                self as i32
            }

            fn name(self) -> &'static str {
                match self {
                    #(#name_arms)*
                }
            }

            fn from_name(name: &str) -> ::core::option::Option<Self> {
                match name {
                    #(#from_name_arms)*
                    _ => ::core::option::Option::None,
                }
            }
        }

        impl ::core::convert::From<#name> for i32 {
            fn from(value: #name) -> i32 {
                value as i32
            }
        }
    }
}
