//! Parameter value parsing for tool calls
//!
//! Parses parameter values from tool action JSON. Supports both basic types
//! (numbers, booleans, null) and complex types (strings, objects, arrays)
//! with incremental JSON-validity checks so a value's end can be detected
//! even when it arrives split across multiple chunks.

use crate::parsing::action_filter::ActionMode;
use crate::parsing::filter::{FilterImpl, find_partial};
use crate::parsing::types::FilterOutput;

/// State machine for parsing parameter values.
///
/// - `Beginning` -> sees `"` or `{` or `[` -> `ComplexType`
/// - `Beginning` -> sees a digit, `-`, `t`, `f`, or `n` -> `BasicType`
/// - `BasicType` -> sees `,` or `}` -> `End`
/// - `ComplexType` -> the buffered value parses as valid JSON -> `End`
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ParamState {
    Beginning,
    ComplexType,
    BasicType,
    End,
}

impl FilterImpl {
    pub(crate) fn handle_param_value(&mut self, s: &str) -> (Vec<FilterOutput>, usize) {
        if s.is_empty() {
            return (Vec::new(), 0);
        }

        match self.action_metadata.cur_param_state {
            ParamState::Beginning => self.handle_param_value_beginning(s),
            ParamState::ComplexType => self.handle_param_value_complex_type(s),
            ParamState::BasicType => self.handle_param_value_basic_type(s),
            ParamState::End => self.handle_param_value_end_type(s),
        }
    }

    fn handle_param_value_beginning(&mut self, s: &str) -> (Vec<FilterOutput>, usize) {
        let trim = s.trim_start();

        if trim.is_empty() {
            return (Vec::new(), 0);
        }

        let first_char = trim.chars().next().unwrap();

        match first_char {
            '"' | '{' | '[' => {
                self.action_metadata.cur_param_state = ParamState::ComplexType;
                self.handle_param_value(s)
            }
            '}' | ',' => {
                self.action_metadata.cur_param_state = ParamState::End;
                self.handle_param_value(s)
            }
            _ => {
                self.action_metadata.cur_param_state = ParamState::BasicType;
                self.handle_param_value(s)
            }
        }
    }

    fn handle_param_value_basic_type(&mut self, s: &str) -> (Vec<FilterOutput>, usize) {
        let (idx, _) = find_partial(s, ["}".to_string(), ",".to_string()].iter());

        if idx == usize::MAX {
            return self.send_param_value_chunk(s);
        }

        let (out, _) = self.send_param_value_chunk(&s[..idx]);
        self.action_metadata.cur_param_state = ParamState::End;
        let (o, r) = self.handle_param_value(&s[idx..]);
        let mut result = out;
        result.extend(o);
        (result, r + idx)
    }

    fn handle_param_value_complex_type(&mut self, s: &str) -> (Vec<FilterOutput>, usize) {
        let idx = find_valid_json_value(&self.action_metadata.param_value_buffer, s);

        if idx == usize::MAX {
            let (out, rem) = self.send_param_value_chunk(s);
            self.action_metadata.param_value_buffer.push_str(s);
            (out, rem)
        } else {
            self.action_metadata.param_value_buffer.clear();
            self.action_metadata.cur_param_state = ParamState::End;
            let (out, _) = self.send_param_value_chunk(&s[..idx]);
            let (o, r) = self.handle_param_value(&s[idx..]);
            let mut result = out;
            result.extend(o);
            (result, r + idx)
        }
    }

    fn handle_param_value_end_type(&mut self, s: &str) -> (Vec<FilterOutput>, usize) {
        let trim = s.trim_start();

        if trim.is_empty() {
            return (Vec::new(), 0);
        }

        let first_char = trim.chars().next().unwrap();
        let idx = s.find(first_char).unwrap();
        let trim_send = s[..idx].trim_end();
        let (out, _) = self.send_param_value_chunk(trim_send);

        self.action_metadata.trim_left = true;
        self.action_metadata.param_value_buffer.clear();
        self.action_metadata.cur_param_state = ParamState::Beginning;
        self.action_metadata.cur_param_name.clear();

        if first_char == '}' {
            self.action_metadata.mode = ActionMode::ToolEnd;
            self.action_metadata.cur_tool_call_index += 1;
        } else {
            self.action_metadata.mode = ActionMode::ParamValueEnd;
        }

        let (o, r) = self.parse_actions(&s[idx + 1..]);
        let mut result = out;
        result.extend(o);
        (result, r + idx + 1)
    }
}

/// Finds the byte index in `s` after which `buffer + s[..idx]` first forms a
/// complete, valid JSON value.
///
/// Tests JSON validity incrementally by Unicode scalar value (never splits a
/// multi-byte character) and returns `usize::MAX` if no prefix of `s`
/// completes a value.
///
/// # Performance
///
/// This calls `serde_json::from_str` at each scalar boundary, which
/// re-parses the whole accumulated value every time; for very large
/// parameter values a dedicated streaming JSON parser tracking nesting depth
/// and quote state directly would avoid the repeated re-parsing.
pub(crate) fn find_valid_json_value(buffer: &str, s: &str) -> usize {
    let mut whole_str = buffer.to_string();

    for (i, c) in s.char_indices() {
        whole_str.push(c);
        if serde_json::from_str::<serde_json::Value>(&whole_str).is_ok() {
            return i + c.len_utf8();
        }
    }

    usize::MAX
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::action_filter::FilterAction;
    use crate::parsing::filter::FilterImpl;

    fn starting_metadata() -> FilterAction {
        FilterAction {
            mode: ActionMode::NotStarted,
            cur_tool_call_index: 0,
            trim_left: false,
            cur_param_name: String::new(),
            cur_param_state: ParamState::Beginning,
            param_value_buffer: String::new(),
        }
    }

    fn collect_value_delta(out: Vec<FilterOutput>) -> String {
        let mut result = String::new();
        for o in out {
            if let Some(tc) = o.tool_calls {
                if let Some(param_delta) = tc.param_delta {
                    result.push_str(&param_delta.value_delta);
                }
            }
        }
        result
    }

    #[test]
    fn test_handle_param_value_empty() {
        let mut filter = FilterImpl::new();
        filter.action_metadata = starting_metadata();
        filter.stream_tool_actions = true;

        let (out, remove) = filter.handle_param_value("");
        assert_eq!(remove, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_handle_param_value_basic_with_next_parameter() {
        let mut filter = FilterImpl::new();
        filter.action_metadata = starting_metadata();
        filter.stream_tool_actions = true;

        let (out, remove) = filter.handle_param_value("30   ,");
        assert_eq!(remove, 6);
        assert_eq!(collect_value_delta(out), "30");
    }

    #[test]
    fn test_handle_param_value_basic_with_end_of_tool() {
        let mut filter = FilterImpl::new();
        filter.action_metadata = starting_metadata();
        filter.stream_tool_actions = true;

        let (out, remove) = filter.handle_param_value("1.2   \n}");
        assert_eq!(remove, 8);
        assert_eq!(collect_value_delta(out), "1.2");
    }

    #[test]
    fn test_handle_param_value_null_with_end_of_tool() {
        let mut filter = FilterImpl::new();
        filter.action_metadata = starting_metadata();
        filter.stream_tool_actions = true;

        let (out, remove) = filter.handle_param_value("null   \n}");
        assert_eq!(remove, 9);
        assert_eq!(collect_value_delta(out), "null");
    }

    #[test]
    fn test_handle_param_value_partial_string() {
        let mut filter = FilterImpl::new();
        filter.action_metadata = starting_metadata();
        filter.stream_tool_actions = true;

        let (out, remove) = filter.handle_param_value("\"testing");
        assert_eq!(remove, 8);
        assert_eq!(collect_value_delta(out), "\"testing");
    }

    #[test]
    fn test_handle_param_value_whole_string() {
        let mut filter = FilterImpl::new();
        filter.action_metadata = starting_metadata();
        filter.stream_tool_actions = true;

        let (out, remove) = filter.handle_param_value("\"testing string\"   \n}");
        assert_eq!(remove, 21);
        assert_eq!(collect_value_delta(out), "\"testing string\"");
    }

    #[test]
    fn test_handle_param_value_whole_object() {
        let mut filter = FilterImpl::new();
        filter.action_metadata = starting_metadata();
        filter.stream_tool_actions = true;

        let (out, remove) = filter.handle_param_value("{\"tes t\": [\"}\"]}   \n,");
        assert_eq!(remove, 21);
        assert_eq!(collect_value_delta(out), "{\"tes t\": [\"}\"]}");
    }

    #[test]
    fn test_handle_param_value_partial_array() {
        let mut filter = FilterImpl::new();
        filter.action_metadata = starting_metadata();
        filter.stream_tool_actions = true;

        let (out, remove) = filter.handle_param_value("[{\"test\",[\"}\",\"]    ,");
        assert_eq!(remove, 21);
        assert_eq!(collect_value_delta(out), "[{\"test\",[\"}\",\"]    ,");
    }

    #[test]
    fn test_find_valid_json_value_respects_unicode_scalar_boundaries() {
        // "é" is 2 bytes; the function must never split it mid-character.
        let idx = find_valid_json_value("", "\"é\"  ,");
        assert_eq!(&"\"é\"  ,"[..idx], "\"é\"");
    }
}
