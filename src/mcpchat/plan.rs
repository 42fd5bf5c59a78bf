//! Plan interpreter.
//!
//! Turns the raw text of a planning completion into a [`Plan`]. The model is asked for a JSON
//! object of the form
//!
//! ```json
//! {
//!   "steps": [
//!     { "type": "tool",  "tool": "weather", "input": { "city": "北京" } },
//!     { "type": "model", "input": { "messages": [ { "role": "user", "content": "..." } ] } }
//!   ],
//!   "content": "direct answer when no step is needed"
//! }
//! ```
//!
//! Models do not always comply, so decoding is deliberately loose at the edges and strict in
//! the middle: the JSON is dug out of code fences or surrounding prose, a missing `type` is
//! inferred from the step's shape, and individual bad steps are dropped with a warning. Only
//! text that contains no usable JSON object at all is a [`PlanParseError`].

use crate::mcpchat::client_wrapper::{Message, Role};
use serde_json::{Map, Value as JsonValue};
use std::error::Error;
use std::fmt;

/// One unit of a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanStep {
    /// Invoke a remote tool with the given arguments.
    Tool {
        tool: String,
        input: Map<String, JsonValue>,
    },
    /// Run a nested completion over `messages`.
    Model { messages: Vec<Message> },
}

impl PlanStep {
    /// Short label used in logs and events (`tool:weather`, `model`).
    pub fn label(&self) -> String {
        match self {
            PlanStep::Tool { tool, .. } => format!("tool:{}", tool),
            PlanStep::Model { .. } => "model".to_string(),
        }
    }
}

/// Decoded planning decision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
    pub direct_answer: Option<String>,
}

impl Plan {
    /// A plan that only carries a direct answer.
    pub fn answer(text: impl Into<String>) -> Self {
        Plan {
            steps: Vec::new(),
            direct_answer: Some(text.into()),
        }
    }

    /// `true` when neither steps nor a non-blank direct answer are present.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
            && self
                .direct_answer
                .as_deref()
                .map_or(true, |answer| answer.trim().is_empty())
    }
}

/// Raised when the planning output holds no usable plan object.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanParseError {
    /// No JSON value could be recovered from the text.
    InvalidJson(String),
    /// JSON was found, but it is neither a step list nor an object with steps or an answer.
    UnexpectedShape(String),
}

impl fmt::Display for PlanParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanParseError::InvalidJson(msg) => write!(f, "Plan is not valid JSON: {}", msg),
            PlanParseError::UnexpectedShape(msg) => write!(f, "Plan has unexpected shape: {}", msg),
        }
    }
}

impl Error for PlanParseError {}

/// Parse planning output into a [`Plan`].
///
/// A top-level array is read as the step list. A top-level object must carry `steps`
/// (array), `content` or `answer`; anything else is [`PlanParseError::UnexpectedShape`].
///
/// ```rust
/// use mcpchat::plan::{parse_plan, PlanStep};
///
/// let plan = parse_plan(r#"{"steps":[{"tool":"weather","input":{"city":"北京"}}]}"#).unwrap();
/// assert!(matches!(&plan.steps[0], PlanStep::Tool { tool, .. } if tool == "weather"));
///
/// assert!(parse_plan("I would rather just chat.").is_err());
/// ```
pub fn parse_plan(raw: &str) -> Result<Plan, PlanParseError> {
    let value = recover_json(raw)?;

    let (steps_value, answer) = match value {
        JsonValue::Array(items) => (Some(items), None),
        JsonValue::Object(mut object) => {
            let answer = ["content", "answer"]
                .iter()
                .find_map(|key| object.get(*key).and_then(JsonValue::as_str))
                .map(str::to_string);
            let steps = match object.remove("steps") {
                Some(JsonValue::Array(items)) => Some(items),
                Some(JsonValue::Null) | None => None,
                Some(other) => {
                    return Err(PlanParseError::UnexpectedShape(format!(
                        "'steps' must be an array, got {}",
                        json_kind(&other)
                    )))
                }
            };
            if steps.is_none() && answer.is_none() {
                return Err(PlanParseError::UnexpectedShape(
                    "object has neither 'steps' nor 'content'".to_string(),
                ));
            }
            (steps, answer)
        }
        other => {
            return Err(PlanParseError::UnexpectedShape(format!(
                "expected an object, got {}",
                json_kind(&other)
            )))
        }
    };

    let steps = steps_value
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match decode_step(item) {
            Ok(step) => Some(step),
            Err(reason) => {
                log::warn!("dropping plan step #{}: {}", index, reason);
                None
            }
        })
        .collect();

    Ok(Plan {
        steps,
        direct_answer: answer,
    })
}

fn recover_json(raw: &str) -> Result<JsonValue, PlanParseError> {
    let text = strip_code_fence(raw.trim());
    let first_err = match serde_json::from_str::<JsonValue>(text) {
        Ok(value) => return Ok(value),
        Err(err) => err.to_string(),
    };

    // try the object and the array span, whichever opens first
    let mut spans: Vec<(usize, usize)> = [('{', '}'), ('[', ']')]
        .iter()
        .filter_map(|&(open, close)| match (text.find(open), text.rfind(close)) {
            (Some(start), Some(end)) if start < end => Some((start, end)),
            _ => None,
        })
        .collect();
    spans.sort_unstable();

    let mut last_err = first_err;
    for (start, end) in spans {
        match serde_json::from_str(&text[start..=end]) {
            Ok(value) => return Ok(value),
            Err(err) => last_err = err.to_string(),
        }
    }
    Err(PlanParseError::InvalidJson(last_err))
}

// ```json ... ``` or ``` ... ```
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn decode_step(item: JsonValue) -> Result<PlanStep, String> {
    let mut object = match item {
        JsonValue::Object(object) => object,
        other => return Err(format!("expected an object, got {}", json_kind(&other))),
    };

    let kind = match object.get("type") {
        Some(JsonValue::String(kind)) => kind.trim().to_ascii_lowercase(),
        Some(other) => return Err(format!("'type' must be a string, got {}", json_kind(other))),
        None if object.contains_key("tool") => "tool".to_string(),
        None if object.contains_key("messages") || nested_messages(&object).is_some() => {
            "model".to_string()
        }
        None => return Err("no 'type' and no recognisable step fields".to_string()),
    };

    match kind.as_str() {
        "tool" => {
            let tool = object
                .get("tool")
                .and_then(JsonValue::as_str)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .ok_or("tool step without a tool name")?
                .to_string();
            let input = match object.remove("input") {
                Some(JsonValue::Object(map)) => map,
                Some(JsonValue::Null) | None => Map::new(),
                Some(other) => {
                    return Err(format!(
                        "input of '{}' must be an object, got {}",
                        tool,
                        json_kind(&other)
                    ))
                }
            };
            Ok(PlanStep::Tool { tool, input })
        }
        "model" => {
            let raw_messages = match object.remove("messages") {
                Some(messages) => messages,
                None => nested_messages(&object)
                    .cloned()
                    .ok_or("model step without messages")?,
            };
            let messages = decode_messages(raw_messages)?;
            Ok(PlanStep::Model { messages })
        }
        other => Err(format!("unknown step type '{}'", other)),
    }
}

fn nested_messages(object: &Map<String, JsonValue>) -> Option<&JsonValue> {
    object.get("input").and_then(|input| input.get("messages"))
}

fn decode_messages(value: JsonValue) -> Result<Vec<Message>, String> {
    let items = match value {
        JsonValue::Array(items) => items,
        other => return Err(format!("messages must be an array, got {}", json_kind(&other))),
    };
    if items.is_empty() {
        return Err("model step with an empty message list".to_string());
    }
    items
        .iter()
        .map(|item| -> Result<Message, String> {
            let role = item
                .get("role")
                .and_then(JsonValue::as_str)
                .and_then(Role::parse)
                .ok_or_else(|| format!("message with missing or unknown role: {}", item))?;
            let content = item
                .get("content")
                .and_then(JsonValue::as_str)
                .ok_or_else(|| format!("message without text content: {}", item))?;
            Ok(Message::new(role, content))
        })
        .collect()
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
