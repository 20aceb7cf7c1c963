// Comment extraction from SourceCodeInfo
//
// Builds a map from SourceCodeInfo location paths to comment strings. Paths are
// the field-number/index chains protoc records, e.g. `[4, 0, 2, 1]` for the
// second field of the first top-level message.

use std::collections::HashMap;

use prost_types::FileDescriptorProto;

/// `FileDescriptorProto.message_type`
pub const FILE_MESSAGE: i32 = 4;
/// `FileDescriptorProto.enum_type`
pub const FILE_ENUM: i32 = 5;
/// `DescriptorProto.field`
pub const MESSAGE_FIELD: i32 = 2;
/// `DescriptorProto.nested_type`
pub const MESSAGE_NESTED: i32 = 3;
/// `DescriptorProto.enum_type`
pub const MESSAGE_ENUM: i32 = 4;
/// `DescriptorProto.oneof_decl`
pub const MESSAGE_ONEOF: i32 = 8;
/// `EnumDescriptorProto.value`
pub const ENUM_VALUE: i32 = 2;

#[derive(Debug, Default, Clone)]
pub struct Comments {
    by_path: HashMap<Vec<i32>, String>,
}

impl Comments {
    pub fn get(&self, path: &[i32]) -> Option<&str> {
        self.by_path.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

/// Extract comments from a FileDescriptorProto's source_code_info.
pub fn extract_comments(file: &FileDescriptorProto) -> Comments {
    let mut comments = Comments::default();

    let Some(source_code_info) = &file.source_code_info else {
        return comments;
    };

    for location in &source_code_info.location {
        // Get comment: prefer leading, fall back to trailing
        let comment = location
            .leading_comments
            .as_deref()
            .or(location.trailing_comments.as_deref());

        let Some(comment) = comment else {
            continue;
        };
        if location.path.is_empty() {
            continue;
        }

        let trimmed = trim_comment(comment);
        if !trimmed.is_empty() {
            comments.by_path.insert(location.path.clone(), trimmed);
        }
    }

    comments
}

/// Trim and clean up a comment string.
fn trim_comment(comment: &str) -> String {
    // Remove leading/trailing whitespace from each line and rejoin
    comment
        .lines()
        .map(|line| line.trim())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// One `#[doc]` attribute per comment line.
pub fn doc_attrs(comment: Option<&str>) -> proc_macro2::TokenStream {
    let Some(comment) = comment else {
        return proc_macro2::TokenStream::new();
    };
    let lines = comment.lines().map(|line| {
        let line = if line.is_empty() {
            String::new()
        } else {
            format!(" {line}")
        };
        quote::quote! { #[doc = #line] }
    });
    quote::quote! { #(#lines)* }
}
