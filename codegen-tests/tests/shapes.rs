use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use codegen_tests::demo::shapes::shape::{Kind, Style};
use codegen_tests::demo::shapes::{Color, Point, Shape};
use codegen_tests::demo::plain::{Empty, Sparse};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tightbuf::test_utils::{assert_bytes_roundtrip, assert_roundtrip};
use tightbuf::{Clear, DecodeError, EnumValue, ProtoEnum, Protobuf, ProtobufExt};

fn point(x: i32, y: i32) -> Point {
    let mut point = Point::new();
    point.set_x(x).set_y(y);
    point
}

fn sample_shape() -> Shape {
    let mut shape = Shape::new();
    shape
        .set_name("triangle")
        .set_color(Color::Red)
        .set_visible(true)
        .set_checksum(0xDEAD_BEEF)
        .set_scale(1.5)
        .set_payload(b"\x00\x01\xff")
        .set_style(Style::Dashed);
    shape.origin_mut().set_x(-3).set_y(4);
    for (x, y) in [(0, 0), (10, 0), (5, 8)] {
        shape.add_vertices().set_x(x).set_y(y);
    }
    shape.add_weights(1).add_weights(-2).add_weights(300);
    shape.add_offsets(-1).add_offsets(i64::MAX);
    shape.add_tags().push_str("closed");
    shape.add_tags().push_str("");
    shape.labels_mut().insert("w".to_string(), 7);
    shape.labels_mut().insert("h".to_string(), -9);
    shape.anchors_mut().insert(1, point(1, 1));
    shape.anchors_mut().insert(-5, point(0, 0));
    shape.set_radius(2.5);
    shape.set_revision(0);
    shape.add_palette(Color::Blue).add_palette(EnumValue::from_number(42));
    shape.add_children().set_name("child").add_weights(9);
    shape
}

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[test]
fn point_encodes_to_reference_bytes() {
    let expected = point(150, 0);
    assert_eq!(expected.encode_vec(), [0x08, 0x96, 0x01]);
    assert_eq!(expected.compute_size(), 3);

    let decoded = Point::decode(&[0x08, 0x96, 0x01]).unwrap();
    assert_eq!(decoded.x(), 150);
    assert_eq!(decoded.y(), 0);
    assert_eq!(decoded, expected);
}

#[test]
fn default_message_encodes_to_nothing() {
    assert!(Shape::new().encode_vec().is_empty());
    assert!(Empty::new().encode_vec().is_empty());

    let mut shape = Shape::new();
    shape.set_visible(false).set_name("").set_color(Color::Unspecified);
    assert!(shape.encode_vec().is_empty());
}

#[test]
fn full_shape_round_trips() {
    let shape = sample_shape();
    let bytes = assert_roundtrip(&shape);
    assert_eq!(shape.compute_size(), bytes.len());

    let decoded = Shape::decode(&bytes).unwrap();
    assert_eq!(decoded.name(), "triangle");
    assert_eq!(decoded.color().get(), Some(Color::Red));
    assert_eq!(decoded.origin().map(Point::x), Some(-3));
    assert_eq!(decoded.vertices().len(), 3);
    assert_eq!(decoded.weights(), [1, -2, 300]);
    assert_eq!(decoded.offsets(), [-1, i64::MAX]);
    assert_eq!(decoded.tags(), ["closed".to_string(), String::new()]);
    assert_eq!(decoded.labels()["h"], -9);
    assert_eq!(decoded.anchors()[&1], point(1, 1));
    assert_eq!(decoded.radius(), Some(2.5));
    assert_eq!(decoded.payload(), b"\x00\x01\xff");
    assert_eq!(decoded.palette()[1].number(), 42);
    assert_eq!(decoded.children()[0].weights(), [9]);
    assert_eq!(decoded.style(), EnumValue::from(Style::Dashed));
}

#[test]
fn messages_without_maps_reencode_identically() {
    let mut shape = sample_shape();
    shape.labels_mut().clear();
    shape.anchors_mut().clear();
    assert_bytes_roundtrip(&shape);
}

#[test]
fn packed_and_unpacked_forms_decode_equal() {
    let unpacked = Shape::decode(&[0x28, 0x01, 0x28, 0x02, 0x28, 0x03]).unwrap();
    let packed = Shape::decode(&[0x2a, 0x03, 0x01, 0x02, 0x03]).unwrap();
    assert_eq!(unpacked, packed);
    assert_eq!(packed.weights(), [1, 2, 3]);
    // proto3 repeated scalars are written packed.
    assert_eq!(packed.encode_vec(), [0x2a, 0x03, 0x01, 0x02, 0x03]);

    // `offsets` is declared unpacked but still accepts a packed run.
    let shape = Shape::decode(&[0x32, 0x02, 0x01, 0x04]).unwrap();
    assert_eq!(shape.offsets(), [-1, 2]);
    assert_eq!(shape.encode_vec(), [0x30, 0x01, 0x30, 0x04]);
}

#[test]
fn mixed_packed_runs_append() {
    let shape = Shape::decode(&[0x2a, 0x01, 0x07, 0x28, 0x08, 0x2a, 0x01, 0x09]).unwrap();
    assert_eq!(shape.weights(), [7, 8, 9]);
}

#[test]
fn unknown_enum_values_round_trip() {
    let bytes = [0x10, 0x2a];
    let shape = Shape::decode(&bytes).unwrap();
    assert_eq!(shape.color().number(), 42);
    assert_eq!(shape.color().get(), None);
    assert_eq!(shape.encode_vec(), bytes);

    let negative = [0x10, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
    let shape = Shape::decode(&negative).unwrap();
    assert_eq!(shape.color().number(), -1);
    assert_eq!(shape.encode_vec(), negative);
}

#[test]
fn enum_mapping_and_aliases() {
    assert_eq!(Color::from_number(2), Some(Color::Green));
    assert_eq!(Color::from_number(7), None);
    assert_eq!(Color::Blue.name(), "COLOR_BLUE");
    assert_eq!(Color::from_name("COLOR_CRIMSON"), Some(Color::Red));
    assert_eq!(Color::COLOR_CRIMSON, Color::Red);
    assert_eq!(Color::VALUES.len(), 4);
    assert_eq!(Color::default(), Color::Unspecified);
    assert_eq!(<Color as ProtoEnum>::NAME, "demo.shapes.Color");
    assert_eq!(i32::from(Color::Blue), 3);
}

#[test]
fn setting_a_oneof_member_clears_the_others() {
    let mut shape = Shape::new();
    shape.set_radius(1.0);
    shape.set_caption("round");
    assert_eq!(shape.radius(), None);
    assert!(!shape.has_radius());
    assert_eq!(shape.caption(), Some("round"));
    assert!(matches!(shape.kind(), Some(Kind::Caption(text)) if text == "round"));

    shape.corner_mut().set_x(4);
    assert_eq!(shape.caption(), None);
    assert_eq!(shape.corner().map(Point::x), Some(4));

    shape.clear_radius();
    assert!(shape.has_corner());
    shape.clear_corner();
    assert!(shape.kind().is_none());

    shape.set_tint(Color::Green);
    assert_eq!(shape.tint().and_then(EnumValue::get), Some(Color::Green));
    shape.clear_kind();
    assert_eq!(shape.tint(), None);
}

#[test]
fn cleared_oneof_message_keeps_its_allocation() {
    let mut shape = Shape::new();
    shape.corner_mut().set_x(4).set_y(5);
    let bytes = shape.encode_vec();
    let first = shape.corner().map(|corner| corner as *const Point);

    shape.clear();
    assert!(!shape.has_corner());
    assert_eq!(shape, Shape::new());
    shape.merge_from_bytes(&bytes).unwrap();
    assert_eq!(shape.corner().map(|corner| corner as *const Point), first);
    assert_eq!(shape.corner(), Some(&point(4, 5)));

    // Reselecting after a switch starts from an empty message.
    shape.set_caption("swap");
    shape.clear_kind();
    assert_eq!(shape.corner_mut(), &Point::new());
    shape.corner_mut().set_y(1);
    shape.clear_corner();
    assert_eq!(shape.corner_mut(), &Point::new());
}

#[test]
fn last_oneof_member_on_the_wire_wins() {
    let mut bytes = vec![0x51];
    bytes.extend_from_slice(&2.0f64.to_le_bytes());
    bytes.extend_from_slice(&[0x5a, 0x02, 0x08, 0x01]);
    let shape = Shape::decode(&bytes).unwrap();
    assert_eq!(shape.radius(), None);
    assert_eq!(shape.corner(), Some(&point(1, 0)));

    // A repeated occurrence of the selected message member merges into it.
    bytes.extend_from_slice(&[0x5a, 0x02, 0x10, 0x02]);
    let shape = Shape::decode(&bytes).unwrap();
    assert_eq!(shape.corner(), Some(&point(1, 2)));

    let shape = Shape::decode(&[0x5a, 0x02, 0x08, 0x01, 0x62, 0x01, b'c']).unwrap();
    assert_eq!(shape.corner(), None);
    assert_eq!(shape.caption(), Some("c"));
}

#[test]
fn later_map_entry_replaces_earlier() {
    let bytes = [
        0x42, 0x05, 0x0a, 0x01, b'k', 0x10, 0x01, //
        0x42, 0x05, 0x0a, 0x01, b'k', 0x10, 0x02,
    ];
    let shape = Shape::decode(&bytes).unwrap();
    assert_eq!(shape.labels().len(), 1);
    assert_eq!(shape.labels()["k"], 2);
}

#[test]
fn map_entries_tolerate_reordering_and_missing_parts() {
    // value before key, then an entry with no key, then one with an extra field.
    let bytes = [
        0x42, 0x05, 0x10, 0x03, 0x0a, 0x01, b'a', //
        0x42, 0x02, 0x10, 0x04, //
        0x42, 0x07, 0x0a, 0x01, b'b', 0x18, 0x09, 0x10, 0x05,
    ];
    let shape = Shape::decode(&bytes).unwrap();
    assert_eq!(shape.labels()["a"], 3);
    assert_eq!(shape.labels()[""], 4);
    assert_eq!(shape.labels()["b"], 5);

    let anchors = [0x4a, 0x06, 0x08, 0x02, 0x12, 0x02, 0x10, 0x07];
    let shape = Shape::decode(&anchors).unwrap();
    assert_eq!(shape.anchors()[&2], point(0, 7));
}

#[test]
fn explicit_presence_survives_zero_values() {
    let mut shape = Shape::new();
    assert!(!shape.has_revision());
    shape.set_revision(0);
    assert!(shape.has_revision());
    assert_eq!(shape.encode_vec(), [0x70, 0x00]);

    let decoded = Shape::decode(&[0x70, 0x00]).unwrap();
    assert!(decoded.has_revision());
    assert_eq!(decoded, shape);

    shape.clear_revision();
    assert!(!shape.has_revision());
    assert!(shape.encode_vec().is_empty());
    assert_ne!(decoded, shape);
}

#[test]
fn unknown_fields_are_kept_when_enabled() {
    let bytes = [0x08, 0x01, 0xa0, 0x06, 0x05, 0xaa, 0x06, 0x02, b'h', b'i'];
    let decoded = Point::decode(&bytes).unwrap();
    assert_eq!(decoded.x(), 1);
    assert_eq!(decoded.encode_vec(), bytes);
    assert_eq!(decoded.compute_size(), bytes.len());
    assert_ne!(decoded, point(1, 0));
}

#[test]
fn unknown_fields_are_dropped_when_disabled() {
    let bytes = [0x08, 0x01, 0xa0, 0x06, 0x05, 0xaa, 0x06, 0x02, b'h', b'i'];
    let sparse = Sparse::decode(&bytes).unwrap();
    assert_eq!(sparse.id(), 1);
    assert_eq!(sparse.encode_vec(), [0x08, 0x01]);

    let empty = Empty::decode(&bytes).unwrap();
    assert_eq!(empty, Empty::new());
}

#[test]
fn clear_resets_and_allows_reuse() {
    let bytes = sample_shape().encode_vec();
    let mut shape = Shape::decode(&bytes).unwrap();
    shape.clear();
    assert_eq!(shape, Shape::new());
    assert!(shape.encode_vec().is_empty());
    assert!(shape.origin().is_none());

    shape.clear_and_merge_from_bytes(&bytes).unwrap();
    assert_eq!(shape, sample_shape());

    let small = point(3, 4);
    shape.clear_and_merge_from_bytes(&Shape::new().encode_vec()).unwrap();
    shape.set_origin(small.clone());
    assert_eq!(shape.origin(), Some(&small));
}

#[test]
fn merge_appends_repeated_and_overwrites_singular() {
    let mut first = Shape::new();
    first.set_name("a").add_weights(1);
    first.origin_mut().set_x(1);
    let mut second = Shape::new();
    second.set_name("b").add_weights(2);
    second.origin_mut().set_y(2);

    let mut merged = Shape::decode(&first.encode_vec()).unwrap();
    merged.merge_from_bytes(&second.encode_vec()).unwrap();
    assert_eq!(merged.name(), "b");
    assert_eq!(merged.weights(), [1, 2]);
    assert_eq!(merged.origin(), Some(&point(1, 2)));
}

#[test]
fn equal_messages_hash_equal() {
    let mut a = Shape::new();
    a.labels_mut().insert("x".to_string(), 1);
    a.labels_mut().insert("y".to_string(), 2);
    a.set_scale(0.0);
    let mut b = Shape::new();
    b.labels_mut().insert("y".to_string(), 2);
    b.labels_mut().insert("x".to_string(), 1);
    b.set_scale(-0.0);
    assert_eq!(a, b);
    assert_eq!(hash_of(&a), hash_of(&b));

    b.add_tags();
    assert_ne!(a, b);
}

#[test]
fn length_delimited_framing() {
    let shape = sample_shape();
    let mut stream = shape.encode_length_delimited_vec();
    stream.extend(point(150, 0).encode_length_delimited_vec());

    let (first, used) = Shape::decode_length_delimited(&stream).unwrap();
    assert_eq!(first, shape);
    let (second, rest) = Point::decode_length_delimited(&stream[used..]).unwrap();
    assert_eq!(second.x(), 150);
    assert_eq!(used + rest, stream.len());
}

#[test]
fn malformed_input_is_an_error() {
    assert_eq!(Point::decode(&[0x08]), Err(DecodeError::Truncated));
    assert!(matches!(
        Shape::decode(&[0x1a, 0x05, 0x08]),
        Err(DecodeError::LengthOverrun { .. })
    ));
    assert!(matches!(Shape::decode(&[0x00, 0x01]), Err(DecodeError::InvalidTag(_))));
    assert_eq!(Shape::decode(&[0x0a, 0x01, 0xff]), Err(DecodeError::InvalidUtf8));
    // Packed int32 run cut in the middle of a varint.
    assert!(Shape::decode(&[0x2a, 0x01, 0x80]).is_err());
}

#[test]
fn deep_nesting_hits_the_recursion_limit() {
    let mut shape = Shape::new();
    let mut current = &mut shape;
    for _ in 0..150 {
        current = current.add_children();
    }
    let bytes = shape.encode_vec();
    assert!(matches!(
        Shape::decode(&bytes),
        Err(DecodeError::RecursionLimitExceeded(_))
    ));
}

fn random_shape(rng: &mut StdRng, depth: u32) -> Shape {
    let mut shape = Shape::new();
    if rng.gen_bool(0.5) {
        shape.set_name(&format!("s{}", rng.gen_range(0..1000)));
    }
    shape.set_color(EnumValue::from_number(rng.gen_range(-2..6)));
    shape.set_checksum(rng.r#gen());
    shape.set_scale(rng.r#gen::<f32>());
    for _ in 0..rng.gen_range(0..4) {
        shape.add_weights(rng.r#gen());
        shape.add_offsets(rng.r#gen());
        shape.add_vertices().set_x(rng.r#gen()).set_y(rng.r#gen());
    }
    for _ in 0..rng.gen_range(0..3) {
        shape.labels_mut().insert(format!("k{}", rng.gen_range(0..10)), rng.r#gen());
        shape.anchors_mut().insert(rng.r#gen(), point(rng.r#gen(), rng.r#gen()));
    }
    match rng.gen_range(0..5) {
        0 => {
            shape.set_radius(rng.r#gen());
        }
        1 => {
            shape.corner_mut().set_y(rng.r#gen());
        }
        2 => {
            shape.set_caption("c");
        }
        3 => {
            shape.set_tint(EnumValue::from_number(rng.gen_range(0..4)));
        }
        _ => {}
    }
    if rng.gen_bool(0.3) {
        shape.set_revision(rng.r#gen());
    }
    if depth > 0 && rng.gen_bool(0.5) {
        let child = random_shape(rng, depth - 1);
        *shape.add_children() = child;
    }
    shape
}

#[test]
fn random_shapes_round_trip() {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    for _ in 0..200 {
        let shape = random_shape(&mut rng, 3);
        assert_roundtrip(&shape);
    }
}
