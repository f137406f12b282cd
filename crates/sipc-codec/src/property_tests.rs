//! Property tests for encode/parse agreement and canonical output.

use bytes::Bytes;
use proptest::prelude::*;

use crate::entry::{build_entry, EntryType};
use crate::parser::{parse_message, Parser};
use crate::value::{Map, Value};

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        any::<u64>().prop_map(Value::Uint),
        any::<f64>().prop_map(Value::Float),
        ".*".prop_map(Value::String),
        proptest::collection::vec(any::<u8>(), 0..64).prop_map(|v| Value::Bytes(Bytes::from(v))),
    ]
}

fn arb_value() -> impl Strategy<Value = Value> {
    arb_scalar().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            proptest::collection::vec((inner.clone(), inner), 0..6)
                .prop_map(|pairs| Value::Map(pairs.into_iter().collect::<Map>())),
        ]
    })
}

fn arb_kind() -> impl Strategy<Value = EntryType> {
    proptest::sample::select(vec![
        EntryType::Request,
        EntryType::Error,
        EntryType::Success,
    ])
}

proptest! {
    #[test]
    fn parsed_entry_equals_input(kind in arb_kind(), values in proptest::collection::vec(arb_value(), 0..6)) {
        let wire = build_entry(kind, &values);
        let entries = parse_message(&wire).expect("parse");
        prop_assert_eq!(entries.len(), 1);
        prop_assert_eq!(entries[0].kind, kind);
        prop_assert_eq!(&entries[0].values, &values);
    }

    #[test]
    fn reencoding_is_byte_identical(values in proptest::collection::vec(arb_value(), 0..6)) {
        let wire = build_entry(EntryType::Success, &values);
        let entries = parse_message(&wire).expect("parse");
        let again = build_entry(EntryType::Success, &entries[0].values);
        prop_assert_eq!(&again[..], &wire[..]);
    }

    #[test]
    fn float_parses_to_equal_number(v in any::<f64>()) {
        let wire = build_entry(EntryType::Request, &[Value::Float(v)]);
        let mut parser = Parser::new(&wire);
        let values = parser.parse_entry().expect("parse");
        prop_assert_eq!(&values[0], &Value::Float(v));
        if v.is_normal() || v == 0.0 {
            prop_assert_eq!(values[0].as_f64().map(f64::to_bits), Some((v + 0.0).to_bits()));
        }
    }

    #[test]
    fn arbitrary_input_never_panics(input in proptest::collection::vec(any::<u8>(), 0..128)) {
        let _ = parse_message(&input);
    }
}
