//! Property tests for scanning, span partitioning and operand classification.

#![allow(clippy::unwrap_used)]

use avx512_counters::fixture::FixtureScanner;
use avx512_counters::operand::{classify, memory_operand, OperandClass};
use avx512_counters::span::SpanBuilder;
use proptest::prelude::*;

const HEADER: &str = "#include \"../../../../../../runtime/textflag.h\"\n\nTEXT asmtest(SB), NOSPLIT, $0\n";

fn instruction() -> impl Strategy<Value = String> {
    (
        prop::sample::select(vec!["VADDPD", "VPABSB", "KANDNW", "VMOVDQU64.Z", "VPGATHERDD"]),
        0u8..32,
        -512i32..4096,
    )
        .prop_map(|(op, reg, disp)| format!("\t{op} {disp}(AX), Z{reg}, Z{reg} // 62f1"))
}

fn fixture(lines: &[String]) -> String {
    let mut text = HEADER.to_string();
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    text.push_str("\tRET\n");
    text
}

fn base_register() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["AX", "BX", "CX", "DX", "SI", "DI", "SP", "R8", "R15"])
}

fn scale() -> impl Strategy<Value = u8> {
    prop::sample::select(vec![1u8, 2, 4, 8])
}

proptest! {
    #[test]
    fn scanner_yields_every_line_before_ret(lines in prop::collection::vec(instruction(), 0..200)) {
        let text = fixture(&lines);
        let records: Vec<_> = FixtureScanner::from_source("prop.s", &text)
            .collect::<Result<_, _>>()
            .unwrap();
        prop_assert_eq!(records.len(), lines.len());
        for (record, line) in records.iter().zip(&lines) {
            prop_assert_eq!(&record.text, line);
        }
    }

    #[test]
    fn spans_partition_records(
        lines in prop::collection::vec(instruction(), 0..300),
        size in 1usize..120,
    ) {
        let text = fixture(&lines);
        let scanner = FixtureScanner::from_source("prop.s", &text);
        let spans: Vec<_> = SpanBuilder::new(scanner, "avx512f", size)
            .collect::<Result<_, _>>()
            .unwrap();

        prop_assert_eq!(spans.len(), lines.len().div_ceil(size));
        for (ordinal, span) in spans.iter().enumerate() {
            prop_assert_eq!(span.ordinal, ordinal);
            prop_assert!(!span.is_empty() && span.len() <= size);
            if ordinal + 1 < spans.len() {
                prop_assert_eq!(span.len(), size);
            }
        }
        let joined: Vec<&str> = spans
            .iter()
            .flat_map(|s| s.records.iter().map(|r| r.text.as_str()))
            .collect();
        let expected: Vec<&str> = lines.iter().map(String::as_str).collect();
        prop_assert_eq!(joined, expected);
    }

    #[test]
    fn based_operands_are_memory(disp in -100_000i64..100_000, base in base_register()) {
        let text = format!("{disp}({base})");
        prop_assert_eq!(classify(&text), OperandClass::Memory);
        let mem = memory_operand(&text).unwrap();
        prop_assert_eq!(mem.displacement, disp);
        prop_assert_eq!(mem.base, base);
    }

    #[test]
    fn vector_index_makes_vmem(
        disp in 0i64..4096,
        base in base_register(),
        kind in prop::sample::select(vec!['X', 'Y', 'Z']),
        n in 0u8..32,
        scale in scale(),
    ) {
        let text = format!("{disp}({base})({kind}{n}*{scale})");
        prop_assert_eq!(classify(&text), OperandClass::VectorMemory);
        prop_assert_eq!(memory_operand(&text).unwrap().index.unwrap().scale, scale);
    }

    #[test]
    fn general_index_stays_memory(base in base_register(), n in 8u8..16, scale in scale()) {
        let text = format!("({base})(R{n}*{scale})");
        prop_assert_eq!(classify(&text), OperandClass::Memory);
    }

    #[test]
    fn registers_and_immediates_are_plain(
        kind in prop::sample::select(vec!["X", "Y", "Z", "K", "R", "$"]),
        n in 0u16..64,
    ) {
        let text = format!("{kind}{n}");
        prop_assert_eq!(classify(&text), OperandClass::Plain);
    }
}
