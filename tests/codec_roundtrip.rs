#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! End-to-end codec tests: every wire type round-trips, unknown fields and
//! type mismatches are tolerated, and adversarial inputs are rejected with
//! the right error before any large allocation happens.

use bytes::BytesMut;
use uuid::Uuid;
use wire_rpc::config::CodecConfig;
use wire_rpc::error::{Error, ProtocolError};
use wire_rpc::protocol::{
    BinaryReader, BinaryWriter, FieldSpec, StructSpec, StructValue, TypeSpec, Value, WireType,
};

fn roundtrip(value: &Value, spec: &TypeSpec) -> Value {
    let mut buf = BytesMut::new();
    BinaryWriter::new(&mut buf).write_value(value, spec).unwrap();
    BinaryReader::new(&buf).read_value(spec).unwrap()
}

// ============================================================================
// SCALAR ROUND-TRIPS
// ============================================================================

#[test]
fn scalars_roundtrip() {
    assert_eq!(roundtrip(&Value::Bool(true), &TypeSpec::Bool), Value::Bool(true));
    assert_eq!(roundtrip(&Value::Bool(false), &TypeSpec::Bool), Value::Bool(false));
    assert_eq!(roundtrip(&Value::Byte(-128), &TypeSpec::Byte), Value::Byte(-128));
    assert_eq!(roundtrip(&Value::Byte(127), &TypeSpec::Byte), Value::Byte(127));
    assert_eq!(roundtrip(&Value::I16(i16::MIN), &TypeSpec::I16), Value::I16(i16::MIN));
    assert_eq!(roundtrip(&Value::I16(i16::MAX), &TypeSpec::I16), Value::I16(i16::MAX));
    assert_eq!(roundtrip(&Value::I32(i32::MIN), &TypeSpec::I32), Value::I32(i32::MIN));
    assert_eq!(roundtrip(&Value::I32(i32::MAX), &TypeSpec::I32), Value::I32(i32::MAX));
    assert_eq!(roundtrip(&Value::I64(i64::MIN), &TypeSpec::I64), Value::I64(i64::MIN));
    assert_eq!(roundtrip(&Value::I64(i64::MAX), &TypeSpec::I64), Value::I64(i64::MAX));
    assert_eq!(
        roundtrip(&Value::Double(1.5e300), &TypeSpec::Double),
        Value::Double(1.5e300)
    );
}

#[test]
fn strings_and_binary_roundtrip() {
    assert_eq!(
        roundtrip(&Value::String("héllo wörld".to_owned()), &TypeSpec::String),
        Value::String("héllo wörld".to_owned())
    );
    assert_eq!(
        roundtrip(&Value::String(String::new()), &TypeSpec::String),
        Value::String(String::new())
    );
    let blob = Value::Binary(vec![0u8, 255, 1, 254].into());
    assert_eq!(roundtrip(&blob, &TypeSpec::Binary), blob);
}

#[test]
fn uuid_roundtrips() {
    let id = Uuid::new_v4();
    assert_eq!(roundtrip(&Value::Uuid(id), &TypeSpec::Uuid), Value::Uuid(id));
}

// ============================================================================
// CONTAINER AND STRUCT ROUND-TRIPS
// ============================================================================

#[test]
fn empty_containers_roundtrip() {
    assert_eq!(
        roundtrip(&Value::List(vec![]), &TypeSpec::list(TypeSpec::I32)),
        Value::List(vec![])
    );
    assert_eq!(
        roundtrip(&Value::Set(vec![]), &TypeSpec::set(TypeSpec::String)),
        Value::Set(vec![])
    );
    assert_eq!(
        roundtrip(&Value::Map(vec![]), &TypeSpec::map(TypeSpec::I32, TypeSpec::String)),
        Value::Map(vec![])
    );
}

#[test]
fn nested_struct_in_list_in_map_roundtrips() {
    let point = StructSpec::shared(
        "Point",
        vec![
            FieldSpec::new(1, "x", TypeSpec::I32),
            FieldSpec::new(2, "y", TypeSpec::I32),
        ],
    );
    let spec = TypeSpec::map(
        TypeSpec::String,
        TypeSpec::list(TypeSpec::Struct(point.clone())),
    );

    let p = |x: i32, y: i32| Value::Struct(StructValue::new().with(1, x).with(2, y));
    let value = Value::Map(vec![
        (
            Value::String("path".to_owned()),
            Value::List(vec![p(0, 0), p(3, 4)]),
        ),
        (Value::String("empty".to_owned()), Value::List(vec![])),
    ]);

    assert_eq!(roundtrip(&value, &spec), value);
}

#[test]
fn absent_struct_fields_stay_absent() {
    let spec = StructSpec::new(
        "Sparse",
        vec![
            FieldSpec::new(1, "required_ish", TypeSpec::I64),
            FieldSpec::new(5, "optional", TypeSpec::String),
        ],
    );
    let value = StructValue::new().with(1, 42i64);

    let mut buf = BytesMut::new();
    BinaryWriter::new(&mut buf).write_struct(&value, &spec).unwrap();
    let decoded = BinaryReader::new(&buf).read_struct(&spec).unwrap();

    assert_eq!(decoded.get(1), Some(&Value::I64(42)));
    assert_eq!(decoded.get(5), None);
    assert!(!decoded.is_set(5));
}

// ============================================================================
// FORWARD/BACKWARD COMPATIBILITY
// ============================================================================

#[test]
fn unknown_fields_are_skipped() {
    // Writer knows two fields, reader only knows one.
    let writer_spec = StructSpec::new(
        "V2",
        vec![
            FieldSpec::new(1, "kept", TypeSpec::I32),
            FieldSpec::new(2, "added", TypeSpec::list(TypeSpec::String)),
        ],
    );
    let reader_spec = StructSpec::new("V1", vec![FieldSpec::new(1, "kept", TypeSpec::I32)]);

    let value = StructValue::new()
        .with(1, 7)
        .with(2, Value::List(vec!["a".into(), "b".into()]));

    let mut buf = BytesMut::new();
    BinaryWriter::new(&mut buf)
        .write_struct(&value, &writer_spec)
        .unwrap();
    let decoded = BinaryReader::new(&buf).read_struct(&reader_spec).unwrap();

    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded.get(1), Some(&Value::I32(7)));
}

#[test]
fn type_mismatch_is_skipped_not_fatal() {
    // Field 1 is written as a string but declared as i32 by the reader.
    let mut buf = BytesMut::new();
    let mut writer = BinaryWriter::new(&mut buf);
    writer.write_field_begin(WireType::Binary, 1);
    writer.write_string("not an int").unwrap();
    writer.write_field_begin(WireType::I32, 2);
    writer.write_i32(99);
    writer.write_field_stop();

    let reader_spec = StructSpec::new(
        "S",
        vec![
            FieldSpec::new(1, "a", TypeSpec::I32),
            FieldSpec::new(2, "b", TypeSpec::I32),
        ],
    );
    let decoded = BinaryReader::new(&buf).read_struct(&reader_spec).unwrap();

    assert_eq!(decoded.get(1), None);
    assert_eq!(decoded.get(2), Some(&Value::I32(99)));
}

// ============================================================================
// ADVERSARIAL INPUT
// ============================================================================

#[test]
fn negative_string_length_rejected() {
    let mut buf = BytesMut::new();
    BinaryWriter::new(&mut buf).write_i32(-5);
    let err = BinaryReader::new(&buf).read_string().unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::NegativeSize(-5))
    ));
}

#[test]
fn declared_length_beyond_limit_rejected_before_allocation() {
    let mut config = CodecConfig::default();
    config.max_string_size = 64;

    // Header declares 1 GiB but only 4 payload bytes follow.
    let mut buf = BytesMut::new();
    BinaryWriter::new(&mut buf).write_i32(1 << 30);
    buf.extend_from_slice(b"tiny");

    let err = BinaryReader::with_config(&buf, &config)
        .read_string()
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::SizeLimit { limit: 64, .. })
    ));
}

#[test]
fn container_count_beyond_limit_rejected() {
    let mut config = CodecConfig::default();
    config.max_container_size = 10;

    let mut buf = BytesMut::new();
    BinaryWriter::new(&mut buf).write_list_begin(WireType::I32, 5).unwrap();
    // Overwrite the count with something huge.
    buf.clear();
    buf.extend_from_slice(&[WireType::I32.tag() as u8]);
    buf.extend_from_slice(&1_000_000i32.to_be_bytes());

    let err = BinaryReader::with_config(&buf, &config)
        .read_value(&TypeSpec::list(TypeSpec::I32))
        .unwrap_err();
    assert!(matches!(err, Error::Protocol(ProtocolError::SizeLimit { .. })));
}

#[test]
fn truncated_frame_is_invalid_data() {
    let mut buf = BytesMut::new();
    BinaryWriter::new(&mut buf).write_i64(1234);
    let err = BinaryReader::new(&buf[..5]).read_i64().unwrap_err();
    assert!(matches!(err, Error::Protocol(ProtocolError::InvalidData(_))));
}

#[test]
fn deep_nesting_hits_depth_limit() {
    let mut config = CodecConfig::default();
    config.max_recursion_depth = 8;

    // 16 nested list headers, each declaring one element of list type.
    let mut buf = BytesMut::new();
    let mut writer = BinaryWriter::new(&mut buf);
    for _ in 0..16 {
        writer.write_list_begin(WireType::List, 1).unwrap();
    }
    writer.write_list_begin(WireType::I32, 0).unwrap();

    let err = BinaryReader::with_config(&buf, &config)
        .skip(WireType::List)
        .unwrap_err();
    assert!(matches!(err, Error::Protocol(ProtocolError::DepthLimit)));
}

#[test]
fn skipping_stop_tag_is_invalid() {
    let buf = [0u8];
    let err = BinaryReader::new(&buf).skip(WireType::Stop).unwrap_err();
    assert!(matches!(err, Error::Protocol(ProtocolError::InvalidData(_))));
}

#[test]
fn unknown_wire_type_tag_rejected() {
    // Field header with reserved tag 7 (historical U64 slot).
    let buf = [7u8, 0, 1];
    let err = BinaryReader::new(&buf).read_field_begin().unwrap_err();
    assert!(matches!(err, Error::Protocol(ProtocolError::InvalidData(_))));
}

#[test]
fn invalid_utf8_string_rejected() {
    let mut buf = BytesMut::new();
    BinaryWriter::new(&mut buf).write_binary(&[0xff, 0xfe, 0xfd]).unwrap();
    let err = BinaryReader::new(&buf).read_string().unwrap_err();
    assert!(matches!(err, Error::Protocol(ProtocolError::InvalidData(_))));
}
