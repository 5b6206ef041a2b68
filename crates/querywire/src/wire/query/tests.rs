use alloc::{
    string::{String, ToString},
    vec,
    vec::Vec,
};
use core::time::Duration;

use chrono::NaiveDate;
use rstest::rstest;
use uuid::Uuid;

use super::{QueryWire, Separator};
use crate::{
    FaultKind, IntValue, LongArrayValues, LongValue, QueryWireOptions,
    bytes::Bytes,
    wire::{Capability, ValueIn, ValueKind, ValueOut, Wire, WireValue},
};

fn reading(text: &str) -> QueryWire {
    QueryWire::wrap(Bytes::from_text(text), QueryWireOptions::default())
}

#[test]
fn scalars_round_trip() {
    let id = Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
    let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
    let time = date.and_hms_milli_opt(23, 59, 58, 125).unwrap();

    let mut wire = QueryWire::new(1024);
    wire.write("b").bool(Some(true)).unwrap();
    wire.write("i8").int8(-128).unwrap();
    wire.write("u8").uint8(255).unwrap();
    wire.write("i16").int16(i16::MIN).unwrap();
    wire.write("u16").uint16(u16::MAX).unwrap();
    wire.write("i32").int32(i32::MIN).unwrap();
    wire.write("u32").uint32(u32::MAX).unwrap();
    wire.write("i64").int64(i64::MAX).unwrap();
    wire.write("f32").float32(0.1).unwrap();
    wire.write("f64").float64(-1.5e300).unwrap();
    wire.write("text").text(Some("hello")).unwrap();
    wire.write("ch").utf8('→').unwrap();
    wire.write("id").uuid(id).unwrap();
    wire.write("date").date(date).unwrap();
    wire.write("time").time(time.time()).unwrap();
    wire.write("at").date_time(time.and_utc()).unwrap();

    assert!(wire.read("b").unwrap().bool().unwrap());
    assert_eq!(wire.read("i8").unwrap().int8().unwrap(), -128);
    assert_eq!(wire.read("u8").unwrap().uint8().unwrap(), 255);
    assert_eq!(wire.read("i16").unwrap().int16().unwrap(), i16::MIN);
    assert_eq!(wire.read("u16").unwrap().uint16().unwrap(), u16::MAX);
    assert_eq!(wire.read("i32").unwrap().int32().unwrap(), i32::MIN);
    assert_eq!(wire.read("u32").unwrap().uint32().unwrap(), u32::MAX);
    assert_eq!(wire.read("i64").unwrap().int64().unwrap(), i64::MAX);
    assert_eq!(wire.read("f32").unwrap().float32().unwrap(), 0.1);
    assert_eq!(wire.read("f64").unwrap().float64().unwrap(), -1.5e300);
    assert_eq!(wire.read("text").unwrap().text().unwrap().as_deref(), Some("hello"));
    assert_eq!(
        wire.read("ch").unwrap().read_as(ValueKind::Char, None).unwrap(),
        WireValue::Char('→')
    );
    assert_eq!(wire.read("id").unwrap().uuid().unwrap(), id);
    assert_eq!(wire.read("date").unwrap().date().unwrap(), date);
    assert_eq!(wire.read("time").unwrap().time().unwrap(), time.time());
    assert_eq!(wire.read("at").unwrap().date_time().unwrap(), time.and_utc());
    assert!(!wire.read_value().has_next());
}

#[test]
fn fields_are_separated_by_ampersands() {
    let mut wire = QueryWire::new(64);
    wire.write("a").int32(1).unwrap();
    wire.write("b").text(Some("hello")).unwrap();
    assert_eq!(wire.to_string(), "a=1&b=hello");
}

#[test]
fn null_write_drops_the_field() {
    let mut wire = QueryWire::new(64);
    wire.write("a").int32(1).unwrap();
    let before = wire.bytes().write_position();

    wire.write("b").text(None).unwrap();
    wire.write("c").bool(None).unwrap();
    assert_eq!(wire.bytes().write_position(), before);
    assert_eq!(wire.out.separator, Separator::Field);

    wire.write("d").int32(2).unwrap();
    assert_eq!(wire.to_string(), "a=1&d=2");
}

#[test]
fn sequence_round_trip() {
    let mut wire = QueryWire::new(64);
    wire.write("list")
        .sequence(|out| {
            out.leaf().text(Some("a"))?;
            out.leaf().text(Some("b"))
        })
        .unwrap();
    wire.write("n").int32(3).unwrap();
    assert_eq!(wire.to_string(), "list=[a,b,]&n=3");

    let items = wire
        .read("list")
        .unwrap()
        .sequence(|input| {
            let mut items = Vec::new();
            while input.has_next_sequence_item()? {
                items.push(input.text()?.unwrap_or_default());
            }
            Ok(items)
        })
        .unwrap();
    assert_eq!(items, ["a", "b"]);
    assert_eq!(wire.read("n").unwrap().int32().unwrap(), 3);
}

#[test]
fn empty_sequence_has_no_trailing_comma() {
    let mut wire = QueryWire::new(32);
    wire.write("list").sequence(|_| Ok(())).unwrap();
    assert_eq!(wire.to_string(), "list=[]");

    let count = wire
        .read("list")
        .unwrap()
        .sequence(|input| {
            let mut count = 0;
            while input.has_next_sequence_item()? {
                input.text()?;
                count += 1;
            }
            Ok(count)
        })
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn structured_round_trip() {
    let mut wire = QueryWire::new(64);
    wire.write("pos")
        .structured(|out| {
            out.write_field("x").int32(1)?;
            out.write_field("y").int32(-2)
        })
        .unwrap();
    wire.write("z").int32(3).unwrap();
    assert_eq!(wire.to_string(), "pos={x=1,y=-2}&z=3");

    let (x, y) = wire
        .read("pos")
        .unwrap()
        .structured(|input| {
            let x = input.read_field("x")?.int32()?;
            let y = input.read_field("y")?.int32()?;
            Ok((x, y))
        })
        .unwrap();
    assert_eq!((x, y), (1, -2));
    assert_eq!(wire.read("z").unwrap().int32().unwrap(), 3);
}

#[test]
fn type_name_is_followed_by_a_space() {
    let mut wire = QueryWire::new(64);
    wire.write("shape")
        .typed_structured("Circle", |out| out.write_field("r").int32(3))
        .unwrap();
    wire.write("n").int32(1).unwrap();
    assert_eq!(wire.to_string(), "shape=Circle {r=3}&n=1");

    let mut input = wire.read("shape").unwrap();
    assert_eq!(input.type_name().unwrap(), "Circle");
    assert_eq!(
        input.structured(|input| input.read_field("r")?.int32()).unwrap(),
        3
    );
    assert_eq!(wire.read("n").unwrap().int32().unwrap(), 1);
}

#[test]
fn out_of_order_read_is_an_unordered_field() {
    let mut wire = reading("b=2&a=1");
    let err = wire.read("a").unwrap_err();
    assert_eq!(err.kind(), FaultKind::UnorderedField);
    assert_eq!(err.to_string(), "unordered fields not supported yet, key=a, was=b");

    // The cursor was rewound, so the fields still read in order.
    assert_eq!(wire.read("b").unwrap().int32().unwrap(), 2);
    assert_eq!(wire.read("a").unwrap().int32().unwrap(), 1);
}

#[test]
fn any_field_reports_its_name() {
    let mut wire = reading("first=1&second=2");
    let mut name = String::new();
    assert_eq!(wire.read_any_field(&mut name).unwrap().int32().unwrap(), 1);
    assert_eq!(name, "first");
    assert_eq!(wire.read_any_field(&mut name).unwrap().int32().unwrap(), 2);
    assert_eq!(name, "second");
}

#[test]
fn reserved_characters_round_trip() {
    let awkward = "a&b=c, [x]{y} 100% !!null \t→";
    let mut wire = QueryWire::new(256);
    wire.write("odd=name").text(Some(awkward)).unwrap();
    wire.write("list")
        .sequence(|out| out.leaf().text(Some(awkward)))
        .unwrap();
    wire.write("after").int32(1).unwrap();

    let text = wire.to_string();
    assert!(text.starts_with("odd%3Dname=a%26b%3Dc%2C%20%5Bx%5D"), "{text}");

    assert_eq!(wire.read("odd=name").unwrap().text().unwrap().as_deref(), Some(awkward));
    let list = wire
        .read("list")
        .unwrap()
        .sequence(|input| {
            assert!(input.has_next_sequence_item()?);
            input.text()
        })
        .unwrap();
    assert_eq!(list.as_deref(), Some(awkward));
    assert_eq!(wire.read("after").unwrap().int32().unwrap(), 1);
}

#[test]
fn escaping_can_be_turned_off() {
    let mut wire = QueryWire::with_options(
        64,
        QueryWireOptions {
            escape_text: false,
            ..Default::default()
        },
    );
    wire.write("a b").text(Some("x y")).unwrap();
    assert_eq!(wire.to_string(), "a b=x y");
}

#[rstest]
#[case(false, Some("100%zz"))]
#[case(true, None)]
fn bad_escapes(#[case] strict: bool, #[case] expected: Option<&str>) {
    let mut wire = QueryWire::wrap(
        Bytes::from_text("v=100%zz"),
        QueryWireOptions {
            strict_escapes: strict,
            ..Default::default()
        },
    );
    let result = wire.read("v").unwrap().text();
    match expected {
        Some(text) => assert_eq!(result.unwrap().as_deref(), Some(text)),
        None => assert_eq!(result.unwrap_err().kind(), FaultKind::Malformed),
    }
}

#[test]
fn null_marker_is_case_insensitive() {
    let mut wire = reading("a=!!NULL ignored&b=2");
    assert_eq!(wire.read("a").unwrap().text().unwrap(), None);
    assert_eq!(wire.read("b").unwrap().int32().unwrap(), 2);
}

#[test]
fn bool_ignores_ascii_case() {
    let mut wire = reading("a=TRUE&b=False&c=yes");
    assert!(wire.read("a").unwrap().bool().unwrap());
    assert!(!wire.read("b").unwrap().bool().unwrap());
    assert_eq!(
        wire.read("c").unwrap().bool().unwrap_err().kind(),
        FaultKind::Malformed
    );
}

#[rstest]
#[case("300", FaultKind::IllegalState)]
#[case("-129", FaultKind::IllegalState)]
#[case("12x", FaultKind::Malformed)]
#[case("", FaultKind::Malformed)]
fn int8_rejects(#[case] value: &str, #[case] kind: FaultKind) {
    let mut wire = reading(&alloc::format!("v={value}"));
    assert_eq!(wire.read("v").unwrap().int8().unwrap_err().kind(), kind);
}

#[test]
fn uint16_rejects_negative_values() {
    let mut wire = reading("v=-1");
    let err = wire.read("v").unwrap().uint16().unwrap_err();
    assert_eq!(err.kind(), FaultKind::IllegalState);
}

#[test]
fn bytes_are_base64() {
    let payload = [0_u8, 1, 2, 0xfe, 0xff, b'&'];
    let mut wire = QueryWire::new(64);
    wire.write("data").bytes(&payload).unwrap();
    wire.write("n").int32(1).unwrap();
    assert_eq!(wire.to_string(), "data=AAEC/v8m&n=1");
    assert_eq!(wire.read("data").unwrap().bytes().unwrap(), payload);
    assert_eq!(wire.read("n").unwrap().int32().unwrap(), 1);

    let mut wire = reading("data=not base64!");
    assert_eq!(
        wire.read("data").unwrap().bytes().unwrap_err().kind(),
        FaultKind::Malformed
    );
}

#[test]
fn unsupported_operations_fail_and_are_advertised() {
    let mut wire = QueryWire::new(64);
    let caps = wire.capabilities();
    for cap in [Capability::RawBytes, Capability::TypeLiteral, Capability::Map, Capability::Comments] {
        assert!(!caps.supports(cap), "{cap:?}");
    }
    assert!(caps.supports(Capability::Binding));

    let mut out = wire.write("x");
    assert_eq!(out.raw_bytes(b"x").unwrap_err().kind(), FaultKind::Unsupported);
    assert_eq!(out.type_literal("T").unwrap_err().kind(), FaultKind::Unsupported);
    assert_eq!(out.comment("hi").unwrap_err().kind(), FaultKind::Unsupported);
    assert_eq!(
        out.map(&Default::default()).unwrap_err().kind(),
        FaultKind::Unsupported
    );
    assert_eq!(wire.bytes().write_position(), 0);

    let mut wire = reading("m=x");
    assert_eq!(
        wire.read("m").unwrap().read_as(ValueKind::Map, None).unwrap_err().kind(),
        FaultKind::Unsupported
    );
}

#[test]
fn missing_open_bracket_names_the_character() {
    let mut wire = reading("list=x");
    let err = wire
        .read("list")
        .unwrap()
        .sequence(|_| Ok(()))
        .unwrap_err();
    assert_eq!(err.to_string(), "expected [ but got 'x' (120)");
}

#[test]
fn has_next_sequence_item_is_deliberately_loose() {
    // `}` is not `]`, so it still counts as another item; the close check
    // is what rejects the input.
    let mut wire = reading("v=[a}");
    let err = wire
        .read("v")
        .unwrap()
        .sequence(|input| {
            assert!(input.has_next_sequence_item()?);
            assert_eq!(input.text()?.as_deref(), Some("a"));
            assert!(input.has_next_sequence_item()?);
            Ok(())
        })
        .unwrap_err();
    assert_eq!(err.kind(), FaultKind::Malformed);
}

#[rstest]
#[timeout(Duration::from_secs(5))]
fn bound_references_are_live() {
    let mut wire = QueryWire::new(512);
    wire.write("count").int32_for_binding(5).unwrap();
    wire.write("total").int64_for_binding(-1).unwrap();
    wire.write("hist").int64_array_for_binding(3).unwrap();
    wire.write("after").text(Some("ok")).unwrap();

    let mut count = None;
    let mut total = None;
    let mut hist = None;
    wire.read("count").unwrap().bound_int32(&mut count).unwrap();
    wire.read("total").unwrap().bound_int64(&mut total).unwrap();
    wire.read("hist").unwrap().bound_int64_array(&mut hist).unwrap();
    assert_eq!(wire.read("after").unwrap().text().unwrap().as_deref(), Some("ok"));

    let (count, total, hist) = (count.unwrap(), total.unwrap(), hist.unwrap());
    assert_eq!(count.add_and_get(3).unwrap(), 8);
    assert_eq!(total.add_and_get(1).unwrap(), 0);
    hist.set_at(1, 42).unwrap();
    assert_eq!(hist.capacity(), 3);

    // The records changed in place inside the wire text.
    let text = wire.to_string();
    assert!(text.contains("value: 0000000008 }"), "{text}");
    assert!(text.contains("used: 00000000000000000002"), "{text}");
}

#[test]
fn bound_slot_is_rebound_not_replaced() {
    let mut wire = QueryWire::new(256);
    wire.write("a").int32_for_binding(1).unwrap();
    wire.write("b").int32_for_binding(2).unwrap();

    let mut slot = None;
    wire.read("a").unwrap().bound_int32(&mut slot).unwrap();
    assert_eq!(slot.as_ref().unwrap().get().unwrap(), 1);
    wire.read("b").unwrap().bound_int32(&mut slot).unwrap();
    assert_eq!(slot.as_ref().unwrap().get().unwrap(), 2);
}

#[test]
fn bound_records_inside_a_sequence() {
    let mut wire = QueryWire::new(256);
    wire.write("counters")
        .sequence(|out| {
            out.leaf().int32_for_binding(1)?;
            out.leaf().int32_for_binding(2)
        })
        .unwrap();

    let refs = wire
        .read("counters")
        .unwrap()
        .sequence(|input| {
            let mut refs = Vec::new();
            while input.has_next_sequence_item()? {
                let mut slot = None;
                input.bound_int32(&mut slot)?;
                refs.extend(slot);
            }
            Ok(refs)
        })
        .unwrap();
    let values: Vec<i32> = refs.iter().map(|r| r.get().unwrap()).collect();
    assert_eq!(values, [1, 2]);
}

#[test]
fn truncated_record_underflows() {
    let mut wire = reading("c=!!atomic { locked: false, value: 00");
    let mut slot = None;
    let err = wire.read("c").unwrap().bound_int32(&mut slot).unwrap_err();
    assert_eq!(err.kind(), FaultKind::Bounds);
    assert!(slot.is_none());
}

#[test]
fn read_as_structured_builds_a_tree() {
    let tree = WireValue::Structured(vec![
        ("a".into(), "1".into()),
        (
            "b".into(),
            WireValue::Sequence(vec!["x".into(), WireValue::Sequence(vec!["y".into()])]),
        ),
        ("c".into(), WireValue::Structured(vec![("d".into(), "e f".into())])),
    ]);
    let mut wire = QueryWire::new(128);
    wire.write("tree").object(&tree).unwrap();
    assert_eq!(wire.to_string(), "tree={a=1,b=[x,[y,],],c={d=e%20f}}");

    let read = wire
        .read("tree")
        .unwrap()
        .read_as(ValueKind::Structured, None)
        .unwrap();
    assert_eq!(read, tree);
}

#[test]
fn read_as_text_builder_reuses_the_buffer() {
    let mut wire = reading("a=hello&b=!!null &c=");
    let buf = WireValue::Text(String::with_capacity(64));
    let read = wire
        .read("a")
        .unwrap()
        .read_as(ValueKind::TextBuilder, Some(buf))
        .unwrap();
    match read {
        WireValue::Text(s) => {
            assert_eq!(s, "hello");
            assert!(s.capacity() >= 64);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(
        wire.read("b").unwrap().read_as(ValueKind::Int32, None).unwrap(),
        WireValue::Null
    );
    assert_eq!(
        wire.read("c").unwrap().read_as(ValueKind::Char, None).unwrap(),
        WireValue::Null
    );
}

#[rstest]
#[case(ValueKind::Int64, "7", WireValue::Int64(7))]
#[case(ValueKind::Int16, "-7", WireValue::Int16(-7))]
#[case(ValueKind::Float64, "2.5", WireValue::Float64(2.5))]
#[case(ValueKind::Text, "a%20b", WireValue::Text("a b".to_string()))]
#[case(ValueKind::Bytes, "AQI=", WireValue::Bytes(vec![1, 2]))]
fn read_as_dispatches(#[case] kind: ValueKind, #[case] text: &str, #[case] expected: WireValue) {
    let mut wire = reading(&alloc::format!("v={text}"));
    assert_eq!(wire.read("v").unwrap().read_as(kind, None).unwrap(), expected);
}

#[test]
fn clear_resets_separator_state() {
    let mut wire = QueryWire::new(64);
    wire.write("a").int32(1).unwrap();
    wire.clear();
    wire.write("b").int32(2).unwrap();
    assert_eq!(wire.to_string(), "b=2");
}

#[test]
fn flip_rereads_from_the_start() {
    let mut wire = QueryWire::new(64);
    wire.write("a").int32(1).unwrap();
    assert_eq!(wire.read("a").unwrap().int32().unwrap(), 1);
    wire.flip();
    assert_eq!(wire.read("a").unwrap().int32().unwrap(), 1);
}

#[test]
fn write_overflow_is_a_bounds_error() {
    let mut wire = QueryWire::new(8);
    let err = wire.write("name").text(Some("too long")).unwrap_err();
    assert_eq!(err.kind(), FaultKind::Bounds);
}

#[test]
fn deep_nesting_is_rejected() {
    let text = alloc::format!("v={}", "[".repeat(200));
    let mut wire = reading(&text);
    let err = wire
        .read("v")
        .unwrap()
        .read_as(ValueKind::Structured, None)
        .unwrap_err();
    assert_eq!(err.to_string(), "illegal state: nesting deeper than 128");
}

#[rstest]
#[case("v=[a}")]
#[case("v={a=1]")]
#[timeout(Duration::from_secs(5))]
fn mismatched_close_is_malformed(#[case] text: &str) {
    let mut wire = reading(text);
    let err = wire
        .read("v")
        .unwrap()
        .read_as(ValueKind::Structured, None)
        .unwrap_err();
    assert_eq!(err.kind(), FaultKind::Malformed);
}

#[test]
fn binding_too_wide_writes_nothing() {
    let mut wire = QueryWire::new(128);
    wire.write("a").int32(1).unwrap();
    let err = wire.write("c").int32_for_binding(i32::MIN).unwrap_err();
    assert_eq!(err.kind(), FaultKind::IllegalState);
    assert_eq!(wire.to_string(), "a=1");
}

#[rstest]
#[case("bool")]
#[case("int8")]
#[case("uint16")]
#[case("int32")]
#[case("int64")]
#[case("float64")]
#[case("date")]
#[case("time")]
#[case("date_time")]
#[case("uuid")]
#[case("bytes")]
fn null_is_illegal_for_required_readers(#[case] reader: &str) {
    let mut wire = reading("a=!!null &b=1");
    let mut input = wire.read("a").unwrap();
    let result = match reader {
        "bool" => input.bool().map(drop),
        "int8" => input.int8().map(drop),
        "uint16" => input.uint16().map(drop),
        "int32" => input.int32().map(drop),
        "int64" => input.int64().map(drop),
        "float64" => input.float64().map(drop),
        "date" => input.date().map(drop),
        "time" => input.time().map(drop),
        "date_time" => input.date_time().map(drop),
        "uuid" => input.uuid().map(drop),
        "bytes" => input.bytes().map(drop),
        other => unreachable!("no reader named {other}"),
    };
    let err = result.unwrap_err();
    assert_eq!(err.kind(), FaultKind::IllegalState);
    assert_eq!(err.to_string(), "illegal state: value is null");
    assert_eq!(wire.read("b").unwrap().int32().unwrap(), 1);
}

#[test]
fn oversized_array_capacity_is_illegal_state() {
    let mut wire = reading(
        "h={ locked: false, capacity: 00838488366986797800, used: 00000000000000000000, values: [ ] }",
    );
    let mut slot = None;
    let err = wire
        .read("h")
        .unwrap()
        .bound_int64_array(&mut slot)
        .unwrap_err();
    assert_eq!(err.kind(), FaultKind::IllegalState);
    assert!(slot.is_none());
}

#[test]
fn unpadded_record_needs_an_atomic_lock_word() {
    // The lock word lands at offset 21, which straddles an 8-byte word.
    let mut wire = reading("c=!!atomic { locked: false, value: 0000000010 }");
    let mut slot = None;
    let err = wire.read("c").unwrap().bound_int32(&mut slot).unwrap_err();
    assert_eq!(err.kind(), FaultKind::InvalidArgument);
    assert!(slot.is_none());

    // Three spaces of padding, as the sink writes them, move it to offset 24.
    let mut wire = reading("c=   !!atomic { locked: false, value: 0000000010 }");
    let mut slot = None;
    wire.read("c").unwrap().bound_int32(&mut slot).unwrap();
    assert_eq!(slot.unwrap().get().unwrap(), 10);
}

#[test]
fn empty_text_survives_in_sequences() {
    let mut wire = QueryWire::new(128);
    wire.write("l")
        .sequence(|out| {
            out.leaf().text(Some(""))?;
            out.leaf().text(Some("b"))?;
            out.leaf().text(Some("!!empty"))
        })
        .unwrap();
    wire.write("e").text(Some("")).unwrap();
    assert_eq!(wire.to_string(), "l=[!!empty,b,%21%21empty,]&e=!!empty");

    let items = wire
        .read("l")
        .unwrap()
        .sequence(|input| {
            let mut items = Vec::new();
            while input.has_next_sequence_item()? {
                items.push(input.text()?);
            }
            Ok(items)
        })
        .unwrap();
    assert_eq!(
        items,
        [Some(String::new()), Some("b".to_string()), Some("!!empty".to_string())]
    );
    let mut buf = String::from("stale");
    assert!(wire.read("e").unwrap().text_to(&mut buf).unwrap());
    assert_eq!(buf, "");
}
