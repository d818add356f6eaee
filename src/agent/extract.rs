//! Candidate extraction from free-form model replies
//!
//! Models wrap valid code in near-valid JSON, or drop JSON entirely for a
//! fenced block. A JSON object that parses is authoritative: without a string
//! `code` it yields no candidate. Only a parse failure reaches the fence.
//!
//! ```text
//! raw reply ──► outermost {...} as JSON ──parses──► Candidate, or NoCandidate without `code`
//!                      │ no object / parse error
//!                      ▼
//!               ```<lang> fenced block ──ok──► Candidate("Extraction Fallback")
//!                      │ fails
//!                      ▼
//!                  NoCandidate
//! ```

use regex::Regex;
use serde_json::{Map, Value};

/// Reasoning attached to candidates recovered from a fenced block
pub const FALLBACK_THOUGHT: &str = "Extraction Fallback";

/// Reasoning used when the JSON object omits `thought`
pub const MISSING_THOUGHT: &str = "No thought provided";

/// Structured result extracted from one model reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub thought: String,
    pub code: String,
}

/// Outcome of running the extraction chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Candidate(Candidate),
    NoCandidate,
}

impl Extraction {
    pub fn into_candidate(self) -> Option<Candidate> {
        match self {
            Extraction::Candidate(candidate) => Some(candidate),
            Extraction::NoCandidate => None,
        }
    }
}

/// Ordered fallback chain over a model reply.
pub struct Extractor {
    fence: Option<Regex>,
}

impl Extractor {
    /// Build an extractor whose fence strategy looks for ```` ```<language> ```` blocks.
    pub fn new(language: &str) -> Self {
        let pattern = format!(r"(?s)```{}(.*?)```", regex::escape(language));
        Self {
            fence: Regex::new(&pattern).ok(),
        }
    }

    /// Run the chain. Never fails; malformed input yields `NoCandidate`.
    pub fn extract(&self, reply: &str) -> Extraction {
        if let Some(object) = json_object(reply) {
            return match candidate_from_object(&object) {
                Some(candidate) => Extraction::Candidate(candidate),
                None => Extraction::NoCandidate,
            };
        }
        if let Some(candidate) = self.from_fenced_block(reply) {
            return Extraction::Candidate(candidate);
        }
        Extraction::NoCandidate
    }

    fn from_fenced_block(&self, reply: &str) -> Option<Candidate> {
        let captures = self.fence.as_ref()?.captures(reply)?;
        let body = captures.get(1)?.as_str().trim();
        Some(Candidate {
            thought: FALLBACK_THOUGHT.to_string(),
            code: body.to_string(),
        })
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new("python")
    }
}

/// First strategy: the greedy span from the first `{` to the last `}`,
/// parsed as a JSON object.
fn json_object(reply: &str) -> Option<Map<String, Value>> {
    let span = outermost_braces(reply)?;
    match serde_json::from_str(span).ok()? {
        Value::Object(object) => Some(object),
        _ => None,
    }
}

/// `code` must be a string; `thought` may be any JSON value.
fn candidate_from_object(object: &Map<String, Value>) -> Option<Candidate> {
    let code = object.get("code")?.as_str()?.to_string();
    let thought = match object.get("thought") {
        None | Some(Value::Null) => MISSING_THOUGHT.to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    };
    Some(Candidate { thought, code })
}

fn outermost_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(reply: &str) -> Extraction {
        Extractor::default().extract(reply)
    }

    #[test]
    fn test_well_formed_json_round_trips_code() {
        let reply = r#"{"thought": "t", "code": "print('ok')\nprint(\"x\")"}"#;
        let candidate = extract(reply).into_candidate().unwrap();
        assert_eq!(candidate.thought, "t");
        assert_eq!(candidate.code, "print('ok')\nprint(\"x\")");
    }

    #[test]
    fn test_json_surrounded_by_prose() {
        let reply = "Sure! Here it is:\n{\"thought\": \"wave\", \"code\": \"import cv2\"}\nGood luck.";
        let candidate = extract(reply).into_candidate().unwrap();
        assert_eq!(candidate.code, "import cv2");
    }

    #[test]
    fn test_nested_braces_in_code_survive_greedy_span() {
        let reply = r#"{"thought": "dict", "code": "d = {'a': {'b': 1}}"}"#;
        let candidate = extract(reply).into_candidate().unwrap();
        assert_eq!(candidate.code, "d = {'a': {'b': 1}}");
    }

    #[test]
    fn test_missing_thought_gets_default() {
        let candidate = extract(r#"{"code": "pass"}"#).into_candidate().unwrap();
        assert_eq!(candidate.thought, MISSING_THOUGHT);
    }

    #[test]
    fn test_malformed_json_falls_back_to_fence() {
        let reply = "{\"thought\": \"oops\", \"code\": \"print(\"broken\")\"}\n```python\n  print('fixed')  \n```";
        let candidate = extract(reply).into_candidate().unwrap();
        assert_eq!(candidate.thought, FALLBACK_THOUGHT);
        assert_eq!(candidate.code, "print('fixed')");
    }

    #[test]
    fn test_json_without_code_ignores_fence() {
        let reply = "{\"thought\": \"Which colour?\"}\n```python\nprint('guess')\n```";
        assert_eq!(extract(reply), Extraction::NoCandidate);
    }

    #[test]
    fn test_non_string_code_is_no_candidate() {
        assert_eq!(extract(r#"{"thought": "t", "code": 42}"#), Extraction::NoCandidate);
    }

    #[test]
    fn test_structured_thought_is_rendered_as_json() {
        let reply = r#"{"thought": ["step 1", "step 2"], "code": "print(1)"}"#;
        let candidate = extract(reply).into_candidate().unwrap();
        assert_eq!(candidate.thought, r#"["step 1","step 2"]"#);
        assert_eq!(candidate.code, "print(1)");
    }

    #[test]
    fn test_null_thought_gets_default() {
        let candidate = extract(r#"{"thought": null, "code": "pass"}"#)
            .into_candidate()
            .unwrap();
        assert_eq!(candidate.thought, MISSING_THOUGHT);
    }

    #[test]
    fn test_first_fenced_block_wins() {
        let reply = "```python\nfirst()\n```\nand\n```python\nsecond()\n```";
        let candidate = extract(reply).into_candidate().unwrap();
        assert_eq!(candidate.code, "first()");
    }

    #[test]
    fn test_fence_for_other_language_is_ignored() {
        assert_eq!(extract("```bash\necho hi\n```"), Extraction::NoCandidate);
    }

    #[test]
    fn test_custom_language_fence() {
        let extractor = Extractor::new("sh");
        let candidate = extractor
            .extract("```sh\necho hi\n```")
            .into_candidate()
            .unwrap();
        assert_eq!(candidate.code, "echo hi");
    }

    #[test]
    fn test_plain_prose_is_no_candidate() {
        assert_eq!(
            extract("Could you clarify what the stickman should do?"),
            Extraction::NoCandidate
        );
    }

    #[test]
    fn test_reversed_braces_are_no_candidate() {
        assert_eq!(extract("} nothing here {"), Extraction::NoCandidate);
    }

    #[test]
    fn test_empty_reply_is_no_candidate() {
        assert_eq!(extract(""), Extraction::NoCandidate);
    }
}
