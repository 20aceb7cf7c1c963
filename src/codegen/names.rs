// Identifier derivation for generated code.
//
// Every Rust name is a pure function of the schema name plus, when two schema
// names map to the same Rust name in one scope, a numeric suffix handed out by
// `NameScope` in declaration order.

use std::collections::HashSet;

use proc_macro2::{Ident, Span};

const RUST_KEYWORDS: &[&str] = &[
    "as", "break", "const", "continue", "crate", "else", "enum", "extern", "false", "fn", "for",
    "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref", "return",
    "self", "Self", "static", "struct", "super", "trait", "true", "type", "unsafe", "use", "where",
    "while", "async", "await", "dyn", "abstract", "become", "box", "do", "final", "macro",
    "override", "priv", "typeof", "unsized", "virtual", "yield", "try", "gen",
];

/// Keywords that cannot be written as raw identifiers.
const NON_RAW_KEYWORDS: &[&str] = &["self", "Self", "super", "crate"];

/// Member names the generated impls already use.
pub const RESERVED_MEMBER_NAMES: &[&str] = &[
    "new",
    "default",
    "clone",
    "eq",
    "ne",
    "fmt",
    "hash",
    "field_hash",
    "clear",
    "merge_from",
    "encode_raw",
    "compute_size",
    "cached_size",
    "is_initialized",
    "encode_vec",
    "encode_to_vec",
    "encode_length_delimited_vec",
    "try_encode_vec",
    "decode",
    "decode_length_delimited",
    "merge_from_bytes",
    "clear_and_merge_from_bytes",
    "decode_from_read",
    "_has_bits",
    "_cached_size",
    "_unknown",
];

pub fn is_keyword(name: &str) -> bool {
    RUST_KEYWORDS.contains(&name)
}

/// Field and method names: keywords become raw identifiers where Rust allows it.
pub fn sanitize_field_name(name: &str) -> String {
    if NON_RAW_KEYWORDS.contains(&name) || name == "_" {
        format!("{}_", name)
    } else if is_keyword(name) {
        // Use rust r# syntax for keywords
        format!("r#{}", name)
    } else {
        name.to_string()
    }
}

/// Sanitize a module name by appending underscore for keywords
/// (can't use r# prefix for modules, especially with leading underscores)
pub fn sanitize_module_name(name: &str) -> String {
    if is_keyword(name) || name == "_" {
        format!("{}_", name)
    } else {
        name.to_string()
    }
}

/// Type and variant names follow the module rule.
pub fn sanitize_type_name(name: &str) -> String {
    sanitize_module_name(name)
}

/// Convert snake_case to PascalCase (for oneof enum names)
pub fn to_pascal_case(name: &str) -> String {
    name.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().chain(chars).collect(),
            }
        })
        .collect()
}

/// Convert an UPPER_SNAKE enum value name to PascalCase.
pub fn upper_snake_to_pascal(name: &str) -> String {
    name.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
            }
        })
        .collect()
}

/// Convert CamelCase or mixedCase to snake_case. Acronyms stay together:
/// `HTTPServer` becomes `http_server`.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Convert a CamelCase type name to UPPER_SNAKE for enum prefix matching.
pub fn to_upper_snake_case(name: &str) -> String {
    to_snake_case(name).to_ascii_uppercase()
}

/// Builds an identifier from an already sanitized name, honouring `r#`.
pub fn ident(name: &str) -> Ident {
    match name.strip_prefix("r#") {
        Some(raw) => Ident::new_raw(raw, Span::call_site()),
        None => Ident::new(name, Span::call_site()),
    }
}

/// Set of names taken in one Rust scope.
#[derive(Debug, Default, Clone)]
pub struct NameScope {
    taken: HashSet<String>,
}

impl NameScope {
    pub fn new() -> Self {
        NameScope::default()
    }

    pub fn with_reserved(names: &[&str]) -> Self {
        NameScope {
            taken: names.iter().map(|name| name.to_string()).collect(),
        }
    }

    pub fn is_taken(&self, name: &str) -> bool {
        self.taken.contains(name)
    }

    /// Marks `name` taken, returning false if it already was.
    pub fn insert(&mut self, name: &str) -> bool {
        self.taken.insert(name.to_string())
    }

    /// Claims `base`, or `base{separator}N` for the smallest free N >= 2.
    pub fn claim(&mut self, base: &str, separator: &str) -> String {
        if self.insert(base) {
            return base.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}{separator}{n}");
            if self.insert(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}
