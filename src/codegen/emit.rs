//! Turns a resolved [`FileInfo`] into formatted output files.
//!
//! The token tree of every file is parsed back with `syn` and printed with
//! `prettyplease`, so only syntactically valid Rust ever reaches a response.

use anyhow::{Context, Result};
use proc_macro2::TokenStream;
use prost_types::compiler::code_generator_response::File;

use super::enum_gen::generate_enum;
use super::message_gen::generate_message;
use super::model::FileInfo;
use super::names::{self, NameScope};
use super::options::{GeneratorOptions, Indent};

const HEADER: &str = "// Code generated by protoc-gen-tightbuf. Do not edit!";

/// Emits the output files for one input file. `paths` holds every output path
/// already used in this response.
pub fn emit_file(
    file: &FileInfo,
    options: &GeneratorOptions,
    paths: &mut NameScope,
) -> Result<Vec<File>> {
    let root = options.module_root_tokens();
    let directory = output_directory(file);

    if !options.generate_multiple_files {
        let mut tokens = TokenStream::new();
        for message in &file.messages {
            tokens.extend(generate_message(message, &root));
        }
        for enumeration in &file.enums {
            tokens.extend(generate_enum(enumeration));
        }
        let stem = file_stem(&file.name);
        let name = paths.claim(&format!("{directory}{stem}"), "_");
        let content = render(tokens, &file.name, options.indent)
            .with_context(|| format!("failed to format code for {}", file.name))?;
        return Ok(vec![output(format!("{name}.rs"), content)]);
    }

    let mut files = Vec::with_capacity(file.messages.len() + file.enums.len());
    let types = file
        .messages
        .iter()
        .map(|message| (&message.name, generate_message(message, &root)))
        .chain(
            file.enums
                .iter()
                .map(|enumeration| (&enumeration.name, generate_enum(enumeration))),
        );
    for (type_name, tokens) in types {
        let stem = names::to_snake_case(type_name);
        let name = paths.claim(&format!("{directory}{stem}"), "_");
        let content = render(tokens, &file.name, options.indent)
            .with_context(|| format!("failed to format code for {type_name} in {}", file.name))?;
        files.push(output(format!("{name}.rs"), content));
    }
    Ok(files)
}

fn output(name: String, content: String) -> File {
    File {
        name: Some(name),
        content: Some(content),
        ..Default::default()
    }
}

/// `a/b/` for package `a.b`, empty without a package.
fn output_directory(file: &FileInfo) -> String {
    file.package_modules
        .iter()
        .map(|module| format!("{}/", module.trim_start_matches("r#")))
        .collect()
}

/// `shapes` for `demo/shapes.proto`.
fn file_stem(proto_name: &str) -> String {
    let base = proto_name.rsplit('/').next().unwrap_or(proto_name);
    let base = base.strip_suffix(".proto").unwrap_or(base);
    let stem: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    names::to_snake_case(&stem)
}

fn render(tokens: TokenStream, source: &str, indent: Indent) -> Result<String> {
    let syntax: syn::File = syn::parse2(tokens).context("generated code is not valid Rust")?;
    let code = prettyplease::unparse(&syntax);
    let code = match indent {
        Indent::Spaces(4) => code,
        other => reindent(&code, &other.unit()),
    };
    Ok(format!("{HEADER}\n// source: {source}\n\n{code}"))
}

/// Rewrites prettyplease's four-space levels with `unit`. Leftover spaces from
/// continuation alignment are kept.
fn reindent(code: &str, unit: &str) -> String {
    let mut out = String::with_capacity(code.len());
    for line in code.lines() {
        let trimmed = line.trim_start_matches(' ');
        let leading = line.len() - trimmed.len();
        for _ in 0..leading / 4 {
            out.push_str(unit);
        }
        out.extend(std::iter::repeat_n(' ', leading % 4));
        out.push_str(trimmed);
        out.push('\n');
    }
    out
}
