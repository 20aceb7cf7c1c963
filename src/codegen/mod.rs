// tightbuf codegen module

use anyhow::{Context, Result};
use prost_types::compiler::CodeGeneratorRequest;
use prost_types::compiler::code_generator_response::File;

pub mod comments;
pub mod defaults;
pub mod emit;
pub mod enum_gen;
pub mod message_gen;
pub mod model;
pub mod names;
pub mod options;
pub mod plugin;
pub mod strategy;

pub use model::SchemaError;
pub use options::{GeneratorOptions, OptionsError};

/// Generate Rust code for every file in `file_to_generate`.
///
/// The whole request fails on the first error, so a response never mixes generated
/// files with an error.
pub fn generate(request: &CodeGeneratorRequest) -> Result<Vec<File>> {
    let options =
        GeneratorOptions::parse(request.parameter()).context("invalid generator parameter")?;
    let registry = model::TypeRegistry::build(&request.proto_file)?;

    let mut paths = names::NameScope::new();
    let mut files = Vec::new();
    for name in &request.file_to_generate {
        let descriptor = request
            .proto_file
            .iter()
            .find(|file| file.name() == name)
            .with_context(|| {
                format!("{name} is listed for generation but its descriptor is missing")
            })?;
        let info = registry
            .resolve_file(descriptor, options.store_unknown_fields)
            .with_context(|| format!("failed to generate {name}"))?;
        tracing::debug!(
            file = %name,
            messages = info.messages.len(),
            enums = info.enums.len(),
            "generating"
        );
        files.extend(emit::emit_file(&info, &options, &mut paths)?);
    }
    Ok(files)
}
