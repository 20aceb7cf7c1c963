//! Generator options parsed from the plugin parameter string.
//!
//! The parameter is a comma-separated list of `key=value` pairs; a bare `key` means
//! `key=true`. Whitespace around keys and values is ignored.

use proc_macro2::TokenStream;
use quote::ToTokens;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    #[error("unknown generator option `{0}`")]
    UnknownOption(String),
    #[error("invalid value `{value}` for generator option `{key}`: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: &'static str,
    },
}

/// Indentation of emitted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indent {
    Spaces(u8),
    Tab,
}

impl Indent {
    pub fn unit(self) -> String {
        match self {
            Indent::Spaces(n) => " ".repeat(n as usize),
            Indent::Tab => "\t".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorOptions {
    /// Generated messages keep the raw bytes of unrecognised fields.
    pub store_unknown_fields: bool,
    pub indent: Indent,
    /// One output file per top-level type instead of one per input file.
    pub generate_multiple_files: bool,
    /// Path generated code is mounted at; prefixes every absolute type path.
    pub module_root: String,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        GeneratorOptions {
            store_unknown_fields: false,
            indent: Indent::Spaces(4),
            generate_multiple_files: false,
            module_root: "crate".to_string(),
        }
    }
}

impl GeneratorOptions {
    pub fn parse(parameter: &str) -> Result<Self, OptionsError> {
        let mut options = GeneratorOptions::default();
        for pair in parameter.split(',') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (key, value) = match pair.split_once('=') {
                Some((key, value)) => (key.trim(), value.trim()),
                None => (pair, "true"),
            };
            match key {
                "store_unknown_fields" => options.store_unknown_fields = parse_bool(key, value)?,
                "generate_multiple_files" => {
                    options.generate_multiple_files = parse_bool(key, value)?
                }
                "indent" => options.indent = parse_indent(value)?,
                "module_root" => {
                    if syn::parse_str::<syn::Path>(value).is_err() {
                        return Err(invalid(
                            key,
                            value,
                            "expected a Rust path such as `crate::proto`",
                        ));
                    }
                    options.module_root = value.to_string();
                }
                _ => return Err(OptionsError::UnknownOption(key.to_string())),
            }
        }
        Ok(options)
    }

    /// The module root as a path token stream.
    pub fn module_root_tokens(&self) -> TokenStream {
        // Validated in `parse`; a default-constructed value is `crate`.
        match syn::parse_str::<syn::Path>(&self.module_root) {
            Ok(path) => path.into_token_stream(),
            Err(_) => quote::quote!(crate),
        }
    }
}

fn invalid(key: &str, value: &str, reason: &'static str) -> OptionsError {
    OptionsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, OptionsError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(invalid(key, value, "expected `true` or `false`")),
    }
}

fn parse_indent(value: &str) -> Result<Indent, OptionsError> {
    match value {
        "2" => Ok(Indent::Spaces(2)),
        "4" => Ok(Indent::Spaces(4)),
        "8" => Ok(Indent::Spaces(8)),
        "tab" => Ok(Indent::Tab),
        _ => Err(invalid("indent", value, "expected `2`, `4`, `8` or `tab`")),
    }
}
