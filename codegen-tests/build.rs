// build.rs
//
// Builds the test schemas as descriptors, runs them through the plugin request
// handler and writes the generated files into OUT_DIR. No protoc is needed.

use std::fs;
use std::path::Path;

use prost_types::compiler::CodeGeneratorRequest;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::source_code_info::Location;
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FieldOptions, FileDescriptorProto, MessageOptions, OneofDescriptorProto, SourceCodeInfo,
};

fn field(name: &str, number: i32, ty: Type, label: Label) -> FieldDescriptorProto {
    let mut field = FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        ..Default::default()
    };
    field.set_type(ty);
    field.set_label(label);
    field
}

fn typed(name: &str, number: i32, ty: Type, label: Label, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..field(name, number, ty, label)
    }
}

fn with_default(mut field: FieldDescriptorProto, default: &str) -> FieldDescriptorProto {
    field.default_value = Some(default.to_string());
    field
}

fn in_oneof(mut field: FieldDescriptorProto, index: i32) -> FieldDescriptorProto {
    field.oneof_index = Some(index);
    field
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

fn map_entry(
    name: &str,
    key: FieldDescriptorProto,
    value: FieldDescriptorProto,
) -> DescriptorProto {
    DescriptorProto {
        options: Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        }),
        ..message(name, vec![key, value])
    }
}

fn enumeration(name: &str, values: &[(&str, i32)]) -> EnumDescriptorProto {
    EnumDescriptorProto {
        name: Some(name.to_string()),
        value: values
            .iter()
            .map(|&(name, number)| EnumValueDescriptorProto {
                name: Some(name.to_string()),
                number: Some(number),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

fn oneof(name: &str) -> OneofDescriptorProto {
    OneofDescriptorProto {
        name: Some(name.to_string()),
        ..Default::default()
    }
}

fn comment(path: &[i32], text: &str) -> Location {
    Location {
        path: path.to_vec(),
        leading_comments: Some(text.to_string()),
        ..Default::default()
    }
}

/// syntax = "proto3"; package demo.shapes;
fn shapes_proto() -> FileDescriptorProto {
    let point = message(
        "Point",
        vec![
            field("x", 1, Type::Int32, Label::Optional),
            field("y", 2, Type::Int32, Label::Optional),
        ],
    );

    let mut offsets = field("offsets", 6, Type::Sint64, Label::Repeated);
    offsets.options = Some(FieldOptions {
        packed: Some(false),
        ..Default::default()
    });
    let mut revision = in_oneof(field("revision", 14, Type::Uint32, Label::Optional), 1);
    revision.proto3_optional = Some(true);

    let mut shape = message(
        "Shape",
        vec![
            field("name", 1, Type::String, Label::Optional),
            typed("color", 2, Type::Enum, Label::Optional, ".demo.shapes.Color"),
            typed("origin", 3, Type::Message, Label::Optional, ".demo.shapes.Point"),
            typed("vertices", 4, Type::Message, Label::Repeated, ".demo.shapes.Point"),
            field("weights", 5, Type::Int32, Label::Repeated),
            offsets,
            field("tags", 7, Type::String, Label::Repeated),
            typed("labels", 8, Type::Message, Label::Repeated, ".demo.shapes.Shape.LabelsEntry"),
            typed("anchors", 9, Type::Message, Label::Repeated, ".demo.shapes.Shape.AnchorsEntry"),
            in_oneof(field("radius", 10, Type::Double, Label::Optional), 0),
            in_oneof(typed("corner", 11, Type::Message, Label::Optional, ".demo.shapes.Point"), 0),
            in_oneof(field("caption", 12, Type::String, Label::Optional), 0),
            in_oneof(typed("tint", 13, Type::Enum, Label::Optional, ".demo.shapes.Color"), 0),
            revision,
            field("payload", 15, Type::Bytes, Label::Optional),
            field("visible", 16, Type::Bool, Label::Optional),
            field("checksum", 17, Type::Fixed64, Label::Optional),
            field("scale", 18, Type::Float, Label::Optional),
            typed("palette", 19, Type::Enum, Label::Repeated, ".demo.shapes.Color"),
            typed("children", 20, Type::Message, Label::Repeated, ".demo.shapes.Shape"),
            typed("style", 21, Type::Enum, Label::Optional, ".demo.shapes.Shape.Style"),
        ],
    );
    shape.oneof_decl = vec![oneof("kind"), oneof("_revision")];
    shape.nested_type = vec![
        map_entry(
            "LabelsEntry",
            field("key", 1, Type::String, Label::Optional),
            field("value", 2, Type::Int64, Label::Optional),
        ),
        map_entry(
            "AnchorsEntry",
            field("key", 1, Type::Int32, Label::Optional),
            typed("value", 2, Type::Message, Label::Optional, ".demo.shapes.Point"),
        ),
    ];
    shape.enum_type = vec![enumeration("Style", &[("STYLE_SOLID", 0), ("STYLE_DASHED", 1)])];

    let mut color = enumeration(
        "Color",
        &[
            ("COLOR_UNSPECIFIED", 0),
            ("COLOR_RED", 1),
            ("COLOR_GREEN", 2),
            ("COLOR_BLUE", 3),
            ("COLOR_CRIMSON", 1),
        ],
    );
    color.options = Some(prost_types::EnumOptions {
        allow_alias: Some(true),
        ..Default::default()
    });

    FileDescriptorProto {
        name: Some("demo/shapes.proto".to_string()),
        package: Some("demo.shapes".to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![point, shape],
        enum_type: vec![color],
        source_code_info: Some(SourceCodeInfo {
            location: vec![
                comment(&[4, 0], " A point on the integer grid.\n"),
                comment(&[4, 1, 2, 9], " Circle radius.\n"),
                comment(&[5, 0], " Fill colours.\n"),
            ],
        }),
        ..Default::default()
    }
}

/// syntax = "proto2"; package demo.legacy;
fn legacy_proto() -> FileDescriptorProto {
    let mut settings = message(
        "Settings",
        vec![
            with_default(field("retries", 1, Type::Int32, Label::Optional), "3"),
            with_default(field("greeting", 2, Type::String, Label::Optional), "hi"),
            with_default(field("magic", 3, Type::Bytes, Label::Optional), "\\001\\002"),
            typed("level", 4, Type::Enum, Label::Optional, ".demo.legacy.Level"),
            with_default(
                typed("fallback", 5, Type::Enum, Label::Optional, ".demo.legacy.Level"),
                "HIGH",
            ),
            field("id", 6, Type::Uint64, Label::Required),
            field("samples", 7, Type::Fixed64, Label::Repeated),
            with_default(field("ratio", 8, Type::Double, Label::Optional), "-inf"),
            with_default(field("enabled", 9, Type::Bool, Label::Optional), "true"),
            typed("nested", 10, Type::Message, Label::Optional, ".demo.legacy.Settings"),
            typed("history", 11, Type::Message, Label::Repeated, ".demo.legacy.Settings"),
            typed(
                "levels",
                12,
                Type::Message,
                Label::Repeated,
                ".demo.legacy.Settings.LevelsEntry",
            ),
        ],
    );
    settings.nested_type = vec![map_entry(
        "LevelsEntry",
        field("key", 1, Type::Int32, Label::Optional),
        typed("value", 2, Type::Enum, Label::Optional, ".demo.legacy.Level"),
    )];
    FileDescriptorProto {
        name: Some("demo/legacy.proto".to_string()),
        package: Some("demo.legacy".to_string()),
        syntax: Some("proto2".to_string()),
        message_type: vec![settings],
        enum_type: vec![enumeration("Level", &[("LOW", 1), ("HIGH", 2)])],
        ..Default::default()
    }
}

/// syntax = "proto3"; package demo.plain; generated without unknown-field storage.
fn plain_proto() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("demo/plain.proto".to_string()),
        package: Some("demo.plain".to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![
            message("Sparse", vec![field("id", 1, Type::Int32, Label::Optional)]),
            message("Empty", Vec::new()),
        ],
        ..Default::default()
    }
}

fn generate(out_dir: &Path, files: Vec<FileDescriptorProto>, parameter: &str) {
    let request = CodeGeneratorRequest {
        file_to_generate: files.iter().map(|file| file.name().to_string()).collect(),
        parameter: Some(parameter.to_string()),
        proto_file: files,
        ..Default::default()
    };
    let response = tightbuf::codegen::plugin::handle_request(&request);
    if let Some(error) = response.error {
        panic!("code generation failed: {error}");
    }
    for file in response.file {
        let path = out_dir.join(file.name());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create output directory");
        }
        fs::write(&path, file.content()).expect("failed to write generated file");
    }
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    let out_dir = std::env::var("OUT_DIR").unwrap();
    let out_dir = Path::new(&out_dir);

    generate(out_dir, vec![shapes_proto(), legacy_proto()], "store_unknown_fields=true");
    generate(out_dir, vec![plain_proto()], "indent=2");
}
