use std::io::{self, IsTerminal, Read, Write};

use anyhow::Context;
use prost::Message;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let args: Vec<_> = std::env::args().collect();
    let program = args.first().map_or("protoc-gen-tightbuf", String::as_str);

    if args.len() > 1 || io::stdin().is_terminal() {
        print_usage(program);
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("TIGHTBUF_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let mut request = Vec::new();
    io::stdin()
        .lock()
        .read_to_end(&mut request)
        .context("failed to read CodeGeneratorRequest from stdin")?;
    if request.is_empty() {
        print_usage(program);
        return Ok(());
    }
    tracing::debug!(bytes = request.len(), "read request");

    let response = tightbuf::codegen::plugin::handle_request_bytes(&request);

    let mut stdout = io::stdout().lock();
    stdout
        .write_all(&response.encode_to_vec())
        .context("failed to write CodeGeneratorResponse to stdout")?;
    stdout.flush()?;
    Ok(())
}

fn print_usage(program: &str) {
    println!("tightbuf protoc plugin");
    println!();
    println!("This program is run by protoc, not directly. It reads a CodeGeneratorRequest");
    println!("from stdin and writes a CodeGeneratorResponse to stdout.");
    println!();
    println!("USAGE:");
    println!("  protoc --plugin=protoc-gen-tightbuf={program} --tightbuf_out=OUT_DIR file.proto");
    println!("  protoc --tightbuf_out=store_unknown_fields=true,indent=2:OUT_DIR file.proto");
    println!();
    println!("OPTIONS:");
    println!("  store_unknown_fields=true|false     keep unknown fields (default: false)");
    println!("  indent=2|4|8|tab                    indentation of emitted code (default: 4)");
    println!("  generate_multiple_files=true|false  one file per top-level type (default: false)");
    println!("  module_root=PATH                    prefix of generated paths (default: crate)");
    println!();
    println!("Set TIGHTBUF_LOG (e.g. TIGHTBUF_LOG=debug) for diagnostics on stderr.");
}
