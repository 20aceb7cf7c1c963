//! The protoc plugin protocol: one `CodeGeneratorRequest` in, one
//! `CodeGeneratorResponse` out.
//!
//! A response carries either every generated file or a single error, never both.
//! Panics inside generation are caught and reported as an error response with the
//! panic message and a backtrace, so protoc always receives a well-formed reply.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use prost::Message;
use prost_types::compiler::code_generator_response::Feature;
use prost_types::compiler::{CodeGeneratorRequest, CodeGeneratorResponse};

use super::model::SchemaError;
use super::options::OptionsError;

const SUPPORTED_FEATURES: u64 = Feature::Proto3Optional as u64;

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
    static CAPTURED: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Decodes a serialized request and handles it.
pub fn handle_request_bytes(input: &[u8]) -> CodeGeneratorResponse {
    match CodeGeneratorRequest::decode(input) {
        Ok(request) => handle_request(&request),
        Err(err) => error_response(format!("failed to decode CodeGeneratorRequest: {err}")),
    }
}

pub fn handle_request(request: &CodeGeneratorRequest) -> CodeGeneratorResponse {
    match capture_panics(|| super::generate(request)) {
        Ok(Ok(file)) => {
            tracing::debug!(files = file.len(), "generation finished");
            CodeGeneratorResponse {
                file,
                supported_features: Some(SUPPORTED_FEATURES),
                ..Default::default()
            }
        }
        Ok(Err(err)) => {
            let message = describe(&err);
            tracing::debug!(%message, "generation failed");
            error_response(message)
        }
        Err(message) => error_response(message),
    }
}

fn error_response(message: String) -> CodeGeneratorResponse {
    CodeGeneratorResponse {
        error: Some(message),
        supported_features: Some(SUPPORTED_FEATURES),
        ..Default::default()
    }
}

/// Schema and option problems are user errors: their context chain is enough.
/// Anything else gets the debug form, which includes a backtrace when one was
/// captured.
fn describe(err: &anyhow::Error) -> String {
    let is_user_error = err
        .chain()
        .any(|cause| cause.is::<SchemaError>() || cause.is::<OptionsError>());
    if is_user_error {
        format!("{err:#}")
    } else {
        format!("{err:?}")
    }
}

/// Chains a hook in front of the existing one that records the panic message and
/// a backtrace while this thread is inside [`capture_panics`].
fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CAPTURING.with(Cell::get) {
                let backtrace = std::backtrace::Backtrace::force_capture();
                let report = format!("generator panicked: {info}\n\nstack backtrace:\n{backtrace}");
                CAPTURED.with(|slot| *slot.borrow_mut() = Some(report));
            } else {
                previous(info);
            }
        }));
    });
}

fn capture_panics<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    install_panic_hook();
    CAPTURING.with(|flag| flag.set(true));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    CAPTURING.with(|flag| flag.set(false));
    result.map_err(|payload| {
        CAPTURED
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_else(|| format!("generator panicked: {}", panic_message(payload.as_ref())))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
