
use fossil::{decode_value, encode_value, FossilResult, Schema};
use log::info;

// Literal/binary round-trips over the schema algebra: for any accepted
// literal, decoding its encoding yields the canonical rendering (sorted
// composite keys, trimmed whitespace).
//
// cargo test test_015_schema -- --nocapture
#[test]
fn test_015_schema() -> FossilResult<()> {
    let _log_handle = test_utils::init_logger();
    let start = std::time::Instant::now();

    round_trips()?;
    sizes_and_validation()?;
    rejections();

    test_utils::closing_info(start);
    Ok(())
}

fn round_trips() -> FossilResult<()> {
    info!("canonicalizing round trips");
    // (schema, accepted literal, canonical rendering)
    let cases = [
        ("boolean", "true", "true"),
        ("int8", " -5 ", "-5"),
        ("uint64", "18446744073709551615", "18446744073709551615"),
        ("float32", "1.5", "1.5"),
        ("float64", "-2.25", "-2.25"),
        ("string", "plain text, with a comma", "plain text, with a comma"),
        ("binary", "aGVsbG8=", "aGVsbG8="),
        ("[3]int16", "[3, 2, 1]", "[3, 2, 1]"),
        ("[2]float64", "0.5, 1.5", "[0.5, 1.5]"),
        (
            "{\"x\": int32, \"y\": int32,}",
            "y: 4, x: 3",
            "x: 3, y: 4",
        ),
        (
            "{\"key\": string, \"value\": int64,}",
            "key: \"id\", value: 1",
            "key: \"id\", value: 1",
        ),
        (
            "{\"b\": binary, \"n\": uint8,}",
            "n: 7, b: \"aGk=\"",
            "b: \"aGk=\", n: 7",
        ),
        (
            "{\"pos\": [2]float32, \"tag\": string,}",
            "tag: \"origin\", pos: [0.5, 2.5]",
            "pos: [0.5, 2.5], tag: \"origin\"",
        ),
    ];
    for (schema_text, literal, canonical) in cases {
        let schema = Schema::parse(schema_text)?;
        let bytes = encode_value(&schema, literal)?;
        assert_eq!(
            decode_value(&schema, &bytes)?,
            canonical,
            "schema {schema_text}, literal {literal:?}"
        );
    }
    Ok(())
}

fn sizes_and_validation() -> FossilResult<()> {
    info!("binary sizes and structural validation");
    let schema = Schema::parse("{\"a\": boolean, \"b\": [2]uint16, \"c\": string,}")?;
    let bytes = encode_value(&schema, "a: true, b: [1, 2], c: \"x\"")?;
    // boolean (1) + 2x uint16 (4) + u32 prefix (4) + "x" (1)
    assert_eq!(bytes.len(), 10);
    assert!(schema.validate(&bytes));
    assert!(!schema.validate(&bytes[..9]));

    let fixed = Schema::parse("[4]float64")?;
    assert_eq!(fixed.size(), Some(32));
    assert_eq!(Schema::parse("string")?.size(), None);
    Ok(())
}

fn rejections() {
    info!("failure modes reject cleanly");
    assert!(Schema::parse("quaternion").is_err(), "unknown keyword");
    assert!(Schema::parse("[2]binary").is_err(), "array of variable width");
    assert!(Schema::parse("{\"a\": int8, \"a\": int8,}").is_err(), "dup key");
    assert!(Schema::parse("{\"a\" int8,}").is_err(), "missing colon");

    let schema = Schema::parse("{\"a\": int8, \"b\": int8,}").unwrap();
    assert!(encode_value(&schema, "a: 1, b: 2,").is_err(), "trailing comma");
    assert!(encode_value(&schema, "a: 1, z: 2").is_err(), "unknown key");
    assert!(encode_value(&schema, "a: 1").is_err(), "missing key");
    assert!(encode_value(&schema, "a: 300, b: 1").is_err(), "overflow");

    let int32 = Schema::parse("int32").unwrap();
    assert!(decode_value(&int32, &[0, 0]).is_err(), "width mismatch");
}
