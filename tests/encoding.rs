use std::{collections::BTreeMap, str::FromStr};

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use service_restapi::{EncodeError, Encoded, WireValue, encode_json, encode_param, encode_value};

fn naive(micros: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 5)
        .expect("valid date")
        .and_hms_micro_opt(7, 8, 9, micros)
        .expect("valid time")
}

fn encoded_string(value: impl Into<WireValue>) -> String {
    match encode_value(&value.into()).expect("value should encode") {
        Encoded::String(text) => text,
        other => panic!("expected string, got {other:?}"),
    }
}

#[test]
fn utc_timestamp_truncates_to_millis_and_uses_z() {
    let at = Utc.from_utc_datetime(&naive(123_456));
    assert_eq!(encoded_string(at), "2024-03-05T07:08:09.123Z");

    let at = Utc.from_utc_datetime(&naive(999_999));
    assert_eq!(encoded_string(at), "2024-03-05T07:08:09.999Z");
}

#[test]
fn zero_offset_fixed_timestamp_renders_z() {
    let offset = FixedOffset::east_opt(0).expect("valid offset");
    let at = offset.from_utc_datetime(&naive(1_000));
    assert_eq!(encoded_string(at), "2024-03-05T07:08:09.001Z");
}

#[test]
fn timestamp_without_subseconds_has_no_fraction() {
    let at = Utc.from_utc_datetime(&naive(0));
    assert_eq!(encoded_string(at), "2024-03-05T07:08:09Z");
}

#[test]
fn sub_millisecond_precision_truncates_to_zero_millis() {
    let at = Utc.from_utc_datetime(&naive(500));
    assert_eq!(encoded_string(at), "2024-03-05T07:08:09.000Z");
}

#[test]
fn non_zero_offsets_are_preserved() {
    let india = FixedOffset::east_opt(5 * 3600 + 30 * 60).expect("valid offset");
    let at = india
        .from_local_datetime(&naive(250_000))
        .single()
        .expect("unambiguous local time");
    assert_eq!(encoded_string(at), "2024-03-05T07:08:09.250+05:30");

    let pacific = FixedOffset::west_opt(8 * 3600).expect("valid offset");
    let at = pacific
        .from_local_datetime(&naive(0))
        .single()
        .expect("unambiguous local time");
    assert_eq!(encoded_string(at), "2024-03-05T07:08:09-08:00");
}

#[test]
fn offset_with_seconds_keeps_seconds_component() {
    let odd = FixedOffset::east_opt(3600 + 30 * 60 + 15).expect("valid offset");
    let at = odd
        .from_local_datetime(&naive(0))
        .single()
        .expect("unambiguous local time");
    assert_eq!(encoded_string(at), "2024-03-05T07:08:09+01:30:15");
}

#[test]
fn naive_timestamp_has_no_offset_suffix() {
    assert_eq!(encoded_string(naive(654_321)), "2024-03-05T07:08:09.654");
}

#[test]
fn date_renders_calendar_date() {
    let date = NaiveDate::from_ymd_opt(1999, 12, 31).expect("valid date");
    assert_eq!(encoded_string(date), "1999-12-31");
}

#[test]
fn naive_time_truncates_to_millis() {
    let time = NaiveTime::from_hms_micro_opt(12, 34, 56, 789_999).expect("valid time");
    assert_eq!(encoded_string(time), "12:34:56.789");

    let whole = NaiveTime::from_hms_opt(23, 0, 1).expect("valid time");
    assert_eq!(encoded_string(whole), "23:00:01");
}

#[test]
fn timezone_aware_time_is_rejected() {
    let time = NaiveTime::from_hms_opt(9, 30, 0).expect("valid time");
    let offset = FixedOffset::east_opt(3600).expect("valid offset");

    let err = encode_value(&WireValue::time_with_offset(time, offset))
        .expect_err("aware time must not encode");
    assert_eq!(
        err,
        EncodeError::TimezoneNotRepresentable { time, offset }
    );

    // a zero offset is still an offset
    let utc = FixedOffset::east_opt(0).expect("valid offset");
    assert!(matches!(
        encode_value(&WireValue::time_with_offset(time, utc)),
        Err(EncodeError::TimezoneNotRepresentable { .. })
    ));
}

#[test]
fn decimals_round_trip_through_their_string_form() {
    for text in ["0", "1.50", "-0.001", "12345.678900", "79228162514264337593543950335"] {
        let value = Decimal::from_str(text).expect("valid decimal");
        let encoded = encoded_string(value);
        assert_eq!(encoded, text);
        assert_eq!(Decimal::from_str(&encoded).expect("encoded decimal parses"), value);
    }
}

#[test]
fn native_values_pass_through() {
    assert_eq!(encode_value(&WireValue::Null), Ok(Encoded::Null));
    assert_eq!(encode_value(&true.into()), Ok(Encoded::Bool(true)));
    assert_eq!(encode_value(&(-7i64).into()), Ok(Encoded::Int(-7)));
    assert_eq!(encode_value(&u64::MAX.into()), Ok(Encoded::UInt(u64::MAX)));
    assert_eq!(
        encode_value(&"plain".into()),
        Ok(Encoded::String("plain".to_string()))
    );
}

#[test]
fn body_encoding_is_recursive() {
    let date = NaiveDate::from_ymd_opt(2024, 1, 2).expect("valid date");
    let at = Utc.from_utc_datetime(&naive(123_456));
    let body = WireValue::map([
        ("amount", WireValue::from(Decimal::new(1050, 2))),
        (
            "nested",
            WireValue::map([
                ("dates", WireValue::list([date, date])),
                ("seen_at", WireValue::from(at)),
            ]),
        ),
        ("note", WireValue::Null),
        ("count", WireValue::from(3)),
    ]);

    let json = encode_json(&body).expect("body should encode");
    assert_eq!(
        json,
        r#"{"amount":"10.50","count":3,"nested":{"dates":["2024-01-02","2024-01-02"],"seen_at":"2024-03-05T07:08:09.123Z"},"note":null}"#
    );
}

#[test]
fn body_errors_surface_from_any_depth() {
    let time = NaiveTime::from_hms_opt(9, 30, 0).expect("valid time");
    let offset = FixedOffset::east_opt(3600).expect("valid offset");
    let body = WireValue::map([(
        "outer",
        WireValue::list([WireValue::map([(
            "inner",
            WireValue::time_with_offset(time, offset),
        )])]),
    )]);
    assert!(matches!(
        encode_json(&body),
        Err(EncodeError::TimezoneNotRepresentable { .. })
    ));

    let body = WireValue::list([WireValue::Float(f64::NAN)]);
    assert!(matches!(
        encode_json(&body),
        Err(EncodeError::TypeNotSerializable(_))
    ));
}

#[test]
fn param_encoding_is_one_level() {
    let date = NaiveDate::from_ymd_opt(2024, 1, 2).expect("valid date");
    assert_eq!(encode_param(&date.into()), Ok(vec!["2024-01-02".to_string()]));
    assert_eq!(encode_param(&5.into()), Ok(vec!["5".to_string()]));
    assert_eq!(encode_param(&false.into()), Ok(vec!["false".to_string()]));
    assert_eq!(encode_param(&WireValue::Null), Ok(Vec::new()));

    let list = WireValue::list([WireValue::from(1), WireValue::Null, WireValue::from("b")]);
    assert_eq!(
        encode_param(&list),
        Ok(vec!["1".to_string(), "b".to_string()])
    );

    let nested = WireValue::list([WireValue::list([1, 2])]);
    assert!(matches!(
        encode_param(&nested),
        Err(EncodeError::TypeNotSerializable(_))
    ));

    let map = WireValue::Map(BTreeMap::new());
    assert!(matches!(
        encode_param(&map),
        Err(EncodeError::TypeNotSerializable(_))
    ));
}

#[test]
fn float_params_keep_a_fraction_and_allow_non_finite_values() {
    assert_eq!(encode_param(&1.0.into()), Ok(vec!["1.0".to_string()]));
    assert_eq!(encode_param(&0.25.into()), Ok(vec!["0.25".to_string()]));
    assert_eq!(encode_param(&(-3.5).into()), Ok(vec!["-3.5".to_string()]));
    assert_eq!(encode_param(&f64::NAN.into()), Ok(vec!["nan".to_string()]));
    assert_eq!(encode_param(&f64::INFINITY.into()), Ok(vec!["inf".to_string()]));
    assert_eq!(
        encode_param(&f64::NEG_INFINITY.into()),
        Ok(vec!["-inf".to_string()])
    );

    let list = WireValue::list([1.5, f64::NAN]);
    assert_eq!(
        encode_param(&list),
        Ok(vec!["1.5".to_string(), "nan".to_string()])
    );
}

#[test]
fn option_conversion_maps_none_to_null() {
    assert_eq!(WireValue::from(None::<i64>), WireValue::Null);
    assert_eq!(WireValue::from(Some(4i64)), WireValue::Int(4));
}
