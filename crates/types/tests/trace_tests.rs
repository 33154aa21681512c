use serde::Deserialize;
use std::fs;
use types::io::trace_text;
use types::trace::BidTrace;

#[derive(Debug, Deserialize)]
struct TestVector {
    name: String,
    trace: String,
    expected: BidTrace,
}

#[test]
fn test_trace_vectors() {
    let yaml_content =
        fs::read_to_string("../../tests/traces/formats.yaml").expect("Failed to read test vectors");
    let vectors: Vec<TestVector> =
        serde_yaml::from_str(&yaml_content).expect("Failed to parse test vectors");

    for vector in vectors {
        let parsed = trace_text::parse(&vector.trace)
            .unwrap_or_else(|err| panic!("{}: parse failed: {err}", vector.name));

        assert_eq!(
            parsed, vector.expected,
            "Parsed trace mismatch for {}",
            vector.name
        );

        // Map equality ignores order; record order is part of the contract.
        let parsed_labels: Vec<_> = parsed.targeting_tree.keys().collect();
        let expected_labels: Vec<_> = vector.expected.targeting_tree.keys().collect();
        assert_eq!(
            parsed_labels, expected_labels,
            "Record order mismatch for {}",
            vector.name
        );

        // Parsing the same text again must yield the same value.
        let reparsed = trace_text::parse(&vector.trace).unwrap();
        assert_eq!(parsed, reparsed, "Parse not idempotent for {}", vector.name);
    }
}
