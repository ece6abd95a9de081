//! End-to-end scenarios driving the filter (and, for one scenario, the
//! token-ingress layer) the way a real caller would: feed a whole decoded
//! stream through and assert on the aggregated output.

use crate::detokenizer::Detokenizer;
use crate::errors::MelodyError;
use crate::parsing::ingress::IngressFilter;
use crate::parsing::types::*;
use crate::parsing::{Filter, FilterOptions, new_filter};
use pretty_assertions::assert_eq;

#[derive(Default)]
struct Aggregate {
    text: String,
    thinking: String,
    tool_calls: Vec<FilterToolCallDelta>,
    citations: Vec<FilterCitation>,
}

fn aggregate(outputs: Vec<FilterOutput>) -> Aggregate {
    let mut agg = Aggregate::default();
    for o in outputs {
        if o.is_tools_reason {
            agg.thinking.push_str(&o.text);
        } else {
            agg.text.push_str(&o.text);
        }
        agg.citations.extend(o.citations);
        if let Some(delta) = o.tool_calls {
            agg.tool_calls.push(delta);
        }
    }
    agg
}

#[test]
fn cmd3_thinking_and_grounded_response_with_citations() {
    let options = FilterOptions::new().cmd3().stream_tool_actions();
    let mut filter = new_filter(options);

    // The mode machine recognizes at most one special-token marker per
    // `write_decoded` call, so each marker is fed in its own chunk.
    let chunks = [
        "<|START_THINKING|>",
        "This is a rainbow <co>emoji: \u{1F308}</co: 0:[1]><|END_THINKING|>",
        "\n<|START_RESPONSE|>",
        "foo <co>bar</co: 0:[1,2],1:[3,4]><|END_RESPONSE|>",
    ];
    let mut out = Vec::new();
    for chunk in chunks {
        out.extend(filter.write_decoded(chunk, TokenIdsWithLogProb::new()));
    }
    out.extend(filter.flush_partials());
    let agg = aggregate(out);

    assert_eq!(agg.thinking, "This is a rainbow emoji: \u{1F308}");
    assert_eq!(agg.text, "foo bar");
    assert_eq!(
        agg.citations,
        vec![
            FilterCitation {
                start_index: 18,
                end_index: 26,
                text: "emoji: \u{1F308}".to_string(),
                sources: vec![Source {
                    tool_call_index: 0,
                    tool_result_indices: vec![1],
                }],
                is_thinking: true,
            },
            FilterCitation {
                start_index: 4,
                end_index: 7,
                text: "bar".to_string(),
                sources: vec![
                    Source {
                        tool_call_index: 0,
                        tool_result_indices: vec![1, 2],
                    },
                    Source {
                        tool_call_index: 1,
                        tool_result_indices: vec![3, 4],
                    },
                ],
                is_thinking: false,
            },
        ]
    );
}

#[test]
fn multi_hop_legacy_single_tool_action_with_processed_params() {
    let options = FilterOptions::new()
        .handle_multi_hop()
        .stream_tool_actions()
        .stream_processed_params();
    let mut filter = new_filter(options);

    let input = r#"Action: ```json
[{"tool_name": "internet_search", "parameters": {"query": "query1"}}]
```"#;
    let mut out = filter.write_decoded(input, TokenIdsWithLogProb::new());
    out.extend(filter.flush_partials());
    let agg = aggregate(out);

    assert_eq!(agg.tool_calls[0].index, 0);
    assert_eq!(agg.tool_calls[0].name.as_deref(), Some("internet_search"));

    let param_names: Vec<&str> = agg
        .tool_calls
        .iter()
        .filter_map(|d| d.param_delta.as_ref())
        .map(|p| p.name.as_str())
        .collect();
    assert!(param_names.contains(&"query"));

    let value_deltas: String = agg
        .tool_calls
        .iter()
        .filter_map(|d| d.param_delta.as_ref())
        .map(|p| p.value_delta.as_str())
        .collect();
    assert_eq!(value_deltas, "\"query1\"");
}

#[test]
fn exclusive_stop_mid_word() {
    let options = FilterOptions::new().with_exclusive_stops(vec!["ba".to_string()]);
    let mut filter = new_filter(options);

    let mut out = filter.write_decoded("foo bar baz boo", TokenIdsWithLogProb::new());
    out.extend(filter.flush_partials());
    let agg = aggregate(out);

    assert_eq!(agg.text, "foo ");
}

#[test]
fn inclusive_stop_spanning_chunks() {
    let options = FilterOptions::new().with_inclusive_stops(vec!["ar baz".to_string()]);
    let mut filter = new_filter(options);

    let mut out = filter.write_decoded("foo b", TokenIdsWithLogProb::new());
    out.extend(filter.write_decoded("ar baz boo", TokenIdsWithLogProb::new()));
    out.extend(filter.flush_partials());
    let agg = aggregate(out);

    assert_eq!(agg.text, "foo bar baz");
}

#[test]
fn left_trim_and_prefix_trim() {
    let options = FilterOptions::new()
        .with_left_trimmed()
        .with_prefix_trim("Concept: ");
    let mut filter = new_filter(options);

    let mut out = filter.write_decoded("\nConcept: foo bar baz boo\n", TokenIdsWithLogProb::new());
    out.extend(filter.flush_partials());
    let agg = aggregate(out);

    assert_eq!(agg.text, "foo bar baz boo\n");
}

struct ScenarioSixDetokenizer;

impl Detokenizer for ScenarioSixDetokenizer {
    fn decode(&self, token_ids: &[u32], _skip_special_tokens: bool) -> Result<String, MelodyError> {
        let mut out = String::new();
        for &id in token_ids {
            match id {
                255021 => out.push_str("<|START_RESPONSE|>"),
                255022 => out.push_str("<|END_RESPONSE|>"),
                15579 => out.push_str("foo "),
                4634 => out.push_str("bar"),
                // a lone UTF-8 continuation byte: never valid on its own.
                260 => out.push('\u{FFFD}'),
                other => out.push_str(&other.to_string()),
            }
        }
        Ok(out)
    }
}

#[test]
fn bad_utf8_byte_sequence_mid_stream() {
    let options = FilterOptions::new().cmd3();
    let filter = new_filter(options);
    let mut ingress = IngressFilter::new(filter, ScenarioSixDetokenizer);

    let tokens = [255021u32, 15579, 4634, 260, 15579, 4634, 255022];
    let mut out = Vec::new();
    for token in tokens {
        out.extend(ingress.write(token, None).unwrap());
    }
    out.extend(ingress.flush_partials());
    let agg = aggregate(out);

    assert_eq!(agg.text, "foo bar\u{FFFD}foo bar");
}

#[test]
fn flush_partials_is_idempotent() {
    let mut filter = new_filter(FilterOptions::new().with_inclusive_stops(vec!["END".to_string()]));

    // "EN" is a strict prefix of the stop marker, so the whole chunk is
    // withheld pending more input rather than processed immediately.
    let written = filter.write_decoded("partial buffered text EN", TokenIdsWithLogProb::new());
    assert!(written.is_empty());

    let first = filter.flush_partials();
    let second = filter.flush_partials();

    assert!(!first.is_empty());
    assert!(second.is_empty());
}

#[test]
fn tool_call_indices_are_non_decreasing() {
    let options = FilterOptions::new()
        .cmd3()
        .stream_tool_actions()
        .stream_processed_params();
    let mut filter = new_filter(options);

    // Fed as separate chunks so only one special-token marker is ever
    // present in the buffer during a single `write_decoded` call.
    let chunks = [
        "<|START_ACTION|>",
        r#"[{"tool_call_id": "0", "tool_name": "a", "parameters": {"x": 1}},{"tool_call_id": "1", "tool_name": "b", "parameters": {"y": 2}}]<|END_ACTION|>"#,
    ];
    let mut out = Vec::new();
    for chunk in chunks {
        out.extend(filter.write_decoded(chunk, TokenIdsWithLogProb::new()));
    }
    out.extend(filter.flush_partials());

    let indices: Vec<usize> = out
        .into_iter()
        .filter_map(|o| o.tool_calls)
        .map(|d| d.index)
        .collect();

    assert_eq!(indices[0], 0);
    for pair in indices.windows(2) {
        assert!(pair[1] >= pair[0]);
    }
}
