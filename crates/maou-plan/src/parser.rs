// parser.rs — Extracts and validates an ExecutionPlan from model output.
//
// Models wrap their JSON in prose, code fences, or both. Extraction tries,
// in order:
//   1. the object opening the first fence labeled `json`
//   2. the first fenced block labeled `json`
//   3. the first fenced block whose trimmed content is `{ ... }`
//   4. a balanced-brace span starting at the first `{` in the raw text
//
// Steps 1 and 4 are JSON-aware scans: they track string literals and escape
// sequences, so braces or fences inside `content` strings never end the
// object early.
//
// The candidate is decoded as a generic JSON value and converted into a
// typed plan only if every field has the expected shape. Any failure yields
// an error; a partially populated plan is never returned.

use serde_json::{Map, Value};

use crate::error::PlanError;
use crate::plan::{validate_relative_path, ActionKind, ExecutionPlan, PlanAction};

const FENCE: &str = "```";

/// Parse model text into a validated plan.
pub fn parse_plan_from_model_text(text: &str) -> Result<ExecutionPlan, PlanError> {
    let json_text = extract_plan_json(text).ok_or(PlanError::NoJsonFound)?;
    let value: Value = serde_json::from_str(json_text)?;
    let plan = plan_from_value(&value)?;
    tracing::debug!(
        actions = plan.actions.len(),
        fingerprint = %plan.fingerprint(),
        "parsed plan from model output"
    );
    Ok(plan)
}

/// Locate the JSON payload inside free-form model text.
///
/// Pure function of its input; returns a slice of `text`.
pub fn extract_plan_json(text: &str) -> Option<&str> {
    if let Some(object) = json_fence_object(text) {
        return Some(object);
    }

    let blocks = fenced_blocks(text);

    if let Some(body) = blocks.iter().find_map(|inner| json_labeled_body(inner)) {
        return Some(body);
    }

    if let Some(inner) = blocks.iter().map(|inner| inner.trim()).find(|inner| {
        inner.starts_with('{') && inner.ends_with('}')
    }) {
        return Some(inner);
    }

    let start = text.find('{')?;
    balanced_object_end(&text[start..]).map(|len| &text[start..start + len])
}

/// Inner text of every closed ``` fence, in document order.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut pos = 0;
    while let Some(open) = text[pos..].find(FENCE) {
        let inner_start = pos + open + FENCE.len();
        let Some(close) = text[inner_start..].find(FENCE) else {
            break;
        };
        blocks.push(&text[inner_start..inner_start + close]);
        pos = inner_start + close + FENCE.len();
    }
    blocks
}

/// Scan from each fence opening labeled `json` to the end of the object it
/// holds. Fences inside string values are part of the object.
fn json_fence_object(text: &str) -> Option<&str> {
    let mut pos = 0;
    while let Some(open) = text[pos..].find(FENCE) {
        let after_fence = pos + open + FENCE.len();
        pos = after_fence;

        let info = text[after_fence..].trim_start_matches(|c: char| c == ' ' || c == '\t');
        let Some(after_label) = strip_json_label(info) else {
            continue;
        };
        let body = after_label.trim_start();
        if body.starts_with('{') {
            if let Some(len) = balanced_object_end(body) {
                return Some(&body[..len]);
            }
        }
    }
    None
}

/// Text after a leading `json` info string, or `None` for any other label.
fn strip_json_label(info: &str) -> Option<&str> {
    let label = info.get(..4)?;
    if !label.eq_ignore_ascii_case("json") {
        return None;
    }
    let after_label = &info[4..];
    // "jsonc", "json5" and friends are different labels.
    if after_label
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(after_label)
}

/// If a fence's info string is `json`, return its trimmed body.
fn json_labeled_body(inner: &str) -> Option<&str> {
    let after_label = strip_json_label(inner.trim_start())?;

    let first_line = after_label.split('\n').next().unwrap_or_default();
    let body = if first_line.trim_start().starts_with('{') {
        // Single-line fence: ```json {"a": 1}```
        after_label
    } else {
        match after_label.find('\n') {
            Some(newline) => &after_label[newline + 1..],
            None => "",
        }
    };
    Some(body.trim())
}

/// Length in bytes of the JSON object that starts at `text[0] == '{'`.
///
/// Returns `None` if the object never closes.
fn balanced_object_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

fn plan_from_value(value: &Value) -> Result<ExecutionPlan, PlanError> {
    let root = value
        .as_object()
        .ok_or_else(|| PlanError::invalid("plan is not a JSON object"))?;

    let thought = root
        .get("thought")
        .and_then(Value::as_str)
        .ok_or_else(|| PlanError::invalid("missing string field `thought`"))?;

    let raw_actions = root
        .get("actions")
        .and_then(Value::as_array)
        .ok_or_else(|| PlanError::invalid("missing array field `actions`"))?;

    let actions = raw_actions
        .iter()
        .enumerate()
        .map(|(idx, raw)| action_from_value(idx, raw))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ExecutionPlan::new(thought, actions))
}

fn action_from_value(idx: usize, raw: &Value) -> Result<PlanAction, PlanError> {
    let obj: &Map<String, Value> = raw
        .as_object()
        .ok_or_else(|| PlanError::invalid(format!("actions[{}] is not an object", idx)))?;

    let kind_str = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| PlanError::invalid(format!("actions[{}] has no string `type`", idx)))?;
    let path = obj
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| PlanError::invalid(format!("actions[{}] has no string `path`", idx)))?;

    let kind = ActionKind::from_wire(kind_str).ok_or_else(|| {
        PlanError::invalid(format!("actions[{}] has unknown type '{}'", idx, kind_str))
    })?;
    validate_relative_path(path)?;

    let content = || {
        obj.get("content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                PlanError::invalid(format!(
                    "actions[{}] ({}) has no string `content`",
                    idx, kind
                ))
            })
    };

    let path = path.to_string();
    Ok(match kind {
        ActionKind::Create => PlanAction::CreateFile {
            path,
            content: content()?,
        },
        ActionKind::Update => PlanAction::UpdateFile {
            path,
            content: content()?,
        },
        ActionKind::Delete => PlanAction::DeleteFile { path },
    })
}
