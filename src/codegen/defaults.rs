//! Parsing of declared field defaults.
//!
//! `FieldDescriptorProto.default_value` is text: decimal or hex integers, `true`/`false`,
//! floats including `inf`, `-inf` and `nan`, raw string contents, C-escaped bytes,
//! and enum defaults by value name.

use proc_macro2::{Literal, TokenStream};
use quote::quote;

use super::model::ScalarType;

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Enum default, already resolved to its number.
    Enum(i32),
}

impl DefaultValue {
    /// Zero value of a scalar type.
    pub fn zero(scalar: ScalarType) -> DefaultValue {
        use ScalarType::*;
        match scalar {
            Int32 | Sint32 | Sfixed32 => DefaultValue::I32(0),
            Int64 | Sint64 | Sfixed64 => DefaultValue::I64(0),
            Uint32 | Fixed32 => DefaultValue::U32(0),
            Uint64 | Fixed64 => DefaultValue::U64(0),
            Float => DefaultValue::F32(0.0),
            Double => DefaultValue::F64(0.0),
            Bool => DefaultValue::Bool(false),
            String => DefaultValue::String(std::string::String::new()),
            Bytes => DefaultValue::Bytes(Vec::new()),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            DefaultValue::Bool(v) => !v,
            DefaultValue::I32(v) | DefaultValue::Enum(v) => *v == 0,
            DefaultValue::I64(v) => *v == 0,
            DefaultValue::U32(v) => *v == 0,
            DefaultValue::U64(v) => *v == 0,
            DefaultValue::F32(v) => v.to_bits() == 0,
            DefaultValue::F64(v) => v.to_bits() == 0,
            DefaultValue::String(v) => v.is_empty(),
            DefaultValue::Bytes(v) => v.is_empty(),
        }
    }

    /// An expression of the field's value type. Strings and bytes evaluate to
    /// `&'static str` and `&'static [u8]`.
    pub fn literal(&self) -> TokenStream {
        match self {
            DefaultValue::Bool(v) => quote!(#v),
            DefaultValue::I32(v) => i32_literal(*v, true),
            DefaultValue::I64(v) => signed_i64_literal(*v),
            DefaultValue::U32(v) => {
                let lit = Literal::u32_suffixed(*v);
                quote!(#lit)
            }
            DefaultValue::U64(v) => {
                let lit = Literal::u64_suffixed(*v);
                quote!(#lit)
            }
            DefaultValue::F32(v) => float_literal_f32(*v),
            DefaultValue::F64(v) => float_literal_f64(*v),
            DefaultValue::String(v) => {
                let lit = Literal::string(v);
                quote!(#lit)
            }
            DefaultValue::Bytes(v) => {
                let lit = Literal::byte_string(v);
                quote!(#lit)
            }
            DefaultValue::Enum(v) => i32_literal(*v, false),
        }
    }
}

fn signed_literal(value: i64, magnitude: Literal) -> TokenStream {
    if value < 0 {
        quote!(-#magnitude)
    } else {
        quote!(#magnitude)
    }
}

fn i32_literal(value: i32, suffixed: bool) -> TokenStream {
    if value == i32::MIN {
        return quote!(i32::MIN);
    }
    let magnitude = if suffixed {
        Literal::i32_suffixed(value.abs())
    } else {
        Literal::i32_unsuffixed(value.abs())
    };
    signed_literal(value as i64, magnitude)
}

fn signed_i64_literal(value: i64) -> TokenStream {
    if value == i64::MIN {
        quote!(i64::MIN)
    } else {
        let magnitude = Literal::i64_suffixed(value.unsigned_abs() as i64);
        signed_literal(value, magnitude)
    }
}

fn float_literal_f32(value: f32) -> TokenStream {
    if value.is_nan() {
        quote!(f32::NAN)
    } else if value == f32::INFINITY {
        quote!(f32::INFINITY)
    } else if value == f32::NEG_INFINITY {
        quote!(f32::NEG_INFINITY)
    } else {
        let magnitude = Literal::f32_suffixed(value.abs());
        if value.is_sign_negative() {
            quote!(-#magnitude)
        } else {
            quote!(#magnitude)
        }
    }
}

fn float_literal_f64(value: f64) -> TokenStream {
    if value.is_nan() {
        quote!(f64::NAN)
    } else if value == f64::INFINITY {
        quote!(f64::INFINITY)
    } else if value == f64::NEG_INFINITY {
        quote!(f64::NEG_INFINITY)
    } else {
        let magnitude = Literal::f64_suffixed(value.abs());
        if value.is_sign_negative() {
            quote!(-#magnitude)
        } else {
            quote!(#magnitude)
        }
    }
}

/// Parses a non-enum default. Enum defaults are resolved by the schema model,
/// which knows the value names.
pub fn parse_default(scalar: ScalarType, text: &str) -> Result<DefaultValue, String> {
    use ScalarType::*;
    Ok(match scalar {
        Int32 | Sint32 | Sfixed32 => {
            let v = parse_signed(text)?;
            DefaultValue::I32(i32::try_from(v).map_err(|_| "out of range for a 32-bit integer")?)
        }
        Int64 | Sint64 | Sfixed64 => DefaultValue::I64(parse_signed(text)?),
        Uint32 | Fixed32 => {
            let v = parse_unsigned(text)?;
            DefaultValue::U32(u32::try_from(v).map_err(|_| "out of range for a 32-bit integer")?)
        }
        Uint64 | Fixed64 => DefaultValue::U64(parse_unsigned(text)?),
        Float => DefaultValue::F32(parse_float(text)? as f32),
        Double => DefaultValue::F64(parse_float(text)?),
        Bool => match text {
            "true" => DefaultValue::Bool(true),
            "false" => DefaultValue::Bool(false),
            _ => return Err("expected `true` or `false`".to_string()),
        },
        String => DefaultValue::String(text.to_string()),
        Bytes => DefaultValue::Bytes(unescape_bytes(text)?),
    })
}

fn parse_unsigned(text: &str) -> Result<u64, String> {
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else if text.len() > 1 && text.starts_with('0') {
        u64::from_str_radix(&text[1..], 8)
    } else {
        text.parse::<u64>()
    };
    parsed.map_err(|err| err.to_string())
}

fn parse_signed(text: &str) -> Result<i64, String> {
    match text.strip_prefix('-') {
        Some(magnitude) => {
            let magnitude = parse_unsigned(magnitude)?;
            if magnitude > i64::MIN.unsigned_abs() {
                return Err("out of range for a 64-bit integer".to_string());
            }
            Ok((magnitude as i64).wrapping_neg())
        }
        None => i64::try_from(parse_unsigned(text)?)
            .map_err(|_| "out of range for a 64-bit integer".to_string()),
    }
}

fn parse_float(text: &str) -> Result<f64, String> {
    match text {
        "inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        "nan" | "-nan" => Ok(f64::NAN),
        _ => text
            .trim_end_matches(['f', 'F'])
            .parse::<f64>()
            .map_err(|err| err.to_string()),
    }
}

/// Undoes C escaping as protoc writes it for bytes defaults.
pub fn unescape_bytes(text: &str) -> Result<Vec<u8>, String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        i += 1;
        if b != b'\\' {
            out.push(b);
            continue;
        }
        let Some(&escape) = bytes.get(i) else {
            return Err("trailing backslash".to_string());
        };
        i += 1;
        match escape {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'v' => out.push(0x0B),
            b'\\' | b'\'' | b'"' | b'?' => out.push(escape),
            b'0'..=b'7' => {
                let mut value = (escape - b'0') as u32;
                for _ in 0..2 {
                    match bytes.get(i) {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + (d - b'0') as u32;
                            i += 1;
                        }
                        _ => break,
                    }
                }
                let byte = u8::try_from(value).map_err(|_| "octal escape out of range")?;
                out.push(byte);
            }
            b'x' | b'X' => {
                let mut value = 0u32;
                let mut digits = 0;
                while digits < 2 {
                    match bytes.get(i).and_then(|&d| (d as char).to_digit(16)) {
                        Some(d) => {
                            value = value * 16 + d;
                            i += 1;
                            digits += 1;
                        }
                        None => break,
                    }
                }
                if digits == 0 {
                    return Err("`\\x` escape without hex digits".to_string());
                }
                out.push(value as u8);
            }
            other => return Err(format!("unknown escape `\\{}`", other as char)),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers() {
        assert_eq!(parse_default(ScalarType::Int32, "-7"), Ok(DefaultValue::I32(-7)));
        assert_eq!(parse_default(ScalarType::Uint32, "0x10"), Ok(DefaultValue::U32(16)));
        assert_eq!(
            parse_default(ScalarType::Int64, "-9223372036854775808"),
            Ok(DefaultValue::I64(i64::MIN))
        );
        assert!(parse_default(ScalarType::Int32, "4294967296").is_err());
        assert!(parse_default(ScalarType::Uint64, "-1").is_err());
    }

    #[test]
    fn floats_and_bools() {
        assert_eq!(parse_default(ScalarType::Double, "0.5"), Ok(DefaultValue::F64(0.5)));
        assert_eq!(
            parse_default(ScalarType::Float, "-inf"),
            Ok(DefaultValue::F32(f32::NEG_INFINITY))
        );
        assert!(matches!(
            parse_default(ScalarType::Double, "nan"),
            Ok(DefaultValue::F64(v)) if v.is_nan()
        ));
        assert_eq!(parse_default(ScalarType::Bool, "true"), Ok(DefaultValue::Bool(true)));
        assert!(parse_default(ScalarType::Bool, "1").is_err());
    }

    #[test]
    fn bytes_are_unescaped() {
        assert_eq!(
            unescape_bytes(r"a\n\001\x7f\\\'\377"),
            Ok(vec![b'a', b'\n', 1, 0x7f, b'\\', b'\'', 0xff])
        );
        assert!(unescape_bytes(r"\q").is_err());
        assert!(unescape_bytes("\\").is_err());
    }

    #[test]
    fn literals() {
        assert_eq!(DefaultValue::I32(-5).literal().to_string(), "- 5i32");
        assert_eq!(DefaultValue::F64(f64::INFINITY).literal().to_string(), "f64 :: INFINITY");
        assert_eq!(DefaultValue::I64(i64::MIN).literal().to_string(), "i64 :: MIN");
        assert_eq!(DefaultValue::U64(3).literal().to_string(), "3u64");
        assert!(!DefaultValue::F64(-0.0).is_zero());
        assert!(DefaultValue::zero(ScalarType::Bytes).is_zero());
    }
}
