//! Splits text holding several concatenated JSON values into top-level spans.
//!
//! The scan only tracks string and escape state while inside a value, so
//! braces inside string literals never affect depth and prose between values
//! is skipped.

/// A balanced top-level `{...}` or `[...]` span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub text: &'a str,
    /// Byte offset of the opening bracket.
    pub start: usize,
    /// Byte offset one past the closing bracket.
    pub end: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitOutcome<'a> {
    pub candidates: Vec<Candidate<'a>>,
    /// Trailing text from an opening bracket that never closed.
    pub incomplete: Option<&'a str>,
}

/// Emit every balanced top-level span in order of appearance.
pub fn split_top_level(input: &str) -> SplitOutcome<'_> {
    let mut outcome = SplitOutcome::default();
    let mut closers: Vec<u8> = Vec::new();
    let mut start = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (offset, byte) in input.bytes().enumerate() {
        if closers.is_empty() {
            match byte {
                b'{' => closers.push(b'}'),
                b'[' => closers.push(b']'),
                _ => continue,
            }
            start = offset;
            in_string = false;
            escape_next = false;
            continue;
        }

        if escape_next {
            escape_next = false;
            continue;
        }
        if in_string {
            match byte {
                b'\\' => escape_next = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => closers.push(b'}'),
            b'[' => closers.push(b']'),
            b'}' | b']' => {
                // Mismatched closers pop too.
                closers.pop();
                if closers.is_empty() {
                    let end = offset + 1;
                    outcome.candidates.push(Candidate {
                        text: &input[start..end],
                        start,
                        end,
                    });
                }
            }
            _ => {}
        }
    }

    if !closers.is_empty() {
        outcome.incomplete = Some(&input[start..]);
    }
    outcome
}

/// Parse every candidate span that is valid JSON, dropping the rest.
pub fn parse_values(input: &str) -> Vec<(Candidate<'_>, serde_json::Value)> {
    split_top_level(input)
        .candidates
        .into_iter()
        .filter_map(|candidate| {
            serde_json::from_str(candidate.text)
                .ok()
                .map(|value| (candidate, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn texts(input: &str) -> Vec<&str> {
        split_top_level(input)
            .candidates
            .into_iter()
            .map(|c| c.text)
            .collect()
    }

    #[test]
    fn splits_concatenated_objects() {
        assert_eq!(texts(r#"{"a":1}{"b":2}"#), vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[test]
    fn skips_prose_and_whitespace_between_values() {
        let input = "first {\"a\":1}\n then [1, 2] and done";
        assert_eq!(texts(input), vec![r#"{"a":1}"#, "[1, 2]"]);
    }

    #[test]
    fn braces_inside_strings_do_not_count() {
        let input = r#"{"cmd":"echo }{ \"quoted\""}{"x":"]"}"#;
        assert_eq!(
            texts(input),
            vec![r#"{"cmd":"echo }{ \"quoted\""}"#, r#"{"x":"]"}"#]
        );
    }

    #[test]
    fn quotes_in_prose_do_not_start_strings() {
        assert_eq!(texts(r#"it's "here": {"a":"b"}"#), vec![r#"{"a":"b"}"#]);
    }

    #[test]
    fn unterminated_value_is_reported_incomplete() {
        let outcome = split_top_level(r#"{"a":1} {"b":"#);
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.incomplete, Some(r#"{"b":"#));
    }

    #[test]
    fn spans_carry_byte_offsets() {
        let outcome = split_top_level(r#"xx{"a":1}"#);
        let candidate = outcome.candidates[0];
        assert_eq!((candidate.start, candidate.end), (2, 9));
    }

    #[test]
    fn parse_values_drops_invalid_spans() {
        let parsed = parse_values("see [docs] then {\"a\":1}");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].1, json!({"a": 1}));
    }
}
