//! Decode and validate raw tool-call arguments into [`ToolArgs`].
//!
//! Models are sloppy with arguments: double-encoded JSON strings, shell
//! commands as one string, several payloads glued together. Validation
//! accepts those shapes and rejects everything else with a
//! [`ValidationError`] the model can act on.

use serde_json::{Map, Value};

use super::arguments::*;
use super::names::ToolName;
use crate::error::ValidationError;
use crate::recovery::splitter::split_top_level;

const COMMAND_FIELDS: &[&str] = &["command", "cmd"];
const PATCH_FIELDS: &[&str] = &["patch", "input"];
const WORKDIR_FIELDS: &[&str] = &["workdir", "cwd", "working_directory"];
const TIMEOUT_FIELDS: &[&str] = &["timeout_ms", "timeout"];
const PATH_FIELDS: &[&str] = &["path", "file_path", "file", "filename"];
const DIR_FIELDS: &[&str] = &["path", "dir", "directory"];
const CONTENT_FIELDS: &[&str] = &["content", "contents", "text", "data"];
const PATTERN_FIELDS: &[&str] = &["pattern", "query", "regex", "q"];
const QUERY_FIELDS: &[&str] = &["query", "q", "search"];
const FACT_FIELDS: &[&str] = &["fact", "content", "memory", "text"];
const URL_FIELDS: &[&str] = &["url", "uri", "href", "link"];

/// Characters that need a real shell to mean what the model intended.
const SHELL_METACHARACTERS: &[char] = &['|', '&', ';', '<', '>', '$', '`', '(', ')', '*', '?', '\n'];

/// Validate `raw` for the canonical tool `tool`.
///
/// Returns one entry per payload; concatenated payloads form a batch and any
/// invalid member fails the whole batch.
pub fn validate(tool: &str, raw: &str) -> Result<Vec<ToolArgs>, ValidationError> {
    let values = decode_arguments(tool, raw)?;
    if values.len() == 1 {
        let value = values.into_iter().next().unwrap_or(Value::Null);
        return Ok(vec![validate_value(tool, value)?]);
    }
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            validate_value(tool, value).map_err(|source| ValidationError::Batch {
                tool: tool.to_string(),
                index,
                source: Box::new(source),
            })
        })
        .collect()
}

/// Decode raw arguments into one or more JSON payloads.
///
/// Empty input means no arguments. A JSON string holding JSON is decoded
/// again. An array of objects, or several concatenated objects, is a batch.
pub fn decode_arguments(tool: &str, raw: &str) -> Result<Vec<Value>, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(vec![Value::Object(Map::new())]);
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => Ok(explode_batch(decode_nested(value))),
        Err(err) => {
            let split = split_top_level(trimmed);
            if split.incomplete.is_none() && split.candidates.len() > 1 {
                let parsed: Result<Vec<Value>, _> = split
                    .candidates
                    .iter()
                    .map(|candidate| serde_json::from_str::<Value>(candidate.text))
                    .collect();
                if let Ok(values) = parsed {
                    return Ok(values.into_iter().map(decode_nested).collect());
                }
            }
            Err(ValidationError::MalformedJson {
                tool: tool.to_string(),
                message: err.to_string(),
            })
        }
    }
}

fn decode_nested(value: Value) -> Value {
    let mut value = value;
    for _ in 0..2 {
        let Value::String(inner) = &value else { break };
        let inner = inner.trim();
        if !(inner.starts_with('{') || inner.starts_with('[')) {
            break;
        }
        match serde_json::from_str(inner) {
            Ok(decoded) => value = decoded,
            Err(_) => break,
        }
    }
    value
}

fn explode_batch(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => items,
        other => vec![other],
    }
}

/// Validate a single decoded payload.
pub fn validate_value(tool: &str, value: Value) -> Result<ToolArgs, ValidationError> {
    let Some(known) = ToolName::from_canonical(tool) else {
        return Ok(ToolArgs::Custom(match value {
            Value::Object(map) => map,
            other => Map::from_iter([("value".to_string(), other)]),
        }));
    };

    // A bare string or array is the whole command.
    if matches!(known, ToolName::Shell | ToolName::ApplyPatch) && !value.is_object() {
        return command_args(tool, value, known == ToolName::ApplyPatch).map(ToolArgs::Command);
    }

    let mut fields = Fields::new(tool, value)?;
    let args = match known {
        ToolName::ReadFile => ToolArgs::ReadFile(ReadFileArgs {
            path: fields.required_string(PATH_FIELDS)?,
            start_line: fields.number(&["start_line"])?,
            end_line: fields.number(&["end_line"])?,
            extra: Map::new(),
        }),
        ToolName::WriteFile => {
            let path = fields.string(PATH_FIELDS)?;
            let content = fields.text(CONTENT_FIELDS)?;
            let (path, content) = match (path, content) {
                (Some(path), Some(content)) => (path, content),
                (path, content) => {
                    let mut expected = Vec::new();
                    if path.is_none() {
                        expected.extend_from_slice(PATH_FIELDS);
                    }
                    if content.is_none() {
                        expected.extend_from_slice(CONTENT_FIELDS);
                    }
                    return Err(fields.missing(expected));
                }
            };
            ToolArgs::WriteFile(WriteFileArgs {
                path,
                content,
                extra: Map::new(),
            })
        }
        ToolName::DeleteFile => ToolArgs::DeleteFile(PathArgs {
            path: fields.required_string(PATH_FIELDS)?,
            extra: Map::new(),
        }),
        ToolName::ListDirectory => ToolArgs::ListDirectory(ListDirectoryArgs {
            path: fields.string(DIR_FIELDS)?.unwrap_or_else(|| ".".to_string()),
            depth: fields.number(&["depth", "max_depth"])?,
            extra: Map::new(),
        }),
        ToolName::Search => ToolArgs::Search(SearchArgs {
            pattern: fields.required_string(PATTERN_FIELDS)?,
            path: fields.string(DIR_FIELDS)?,
            extra: Map::new(),
        }),
        ToolName::Remember => ToolArgs::Remember(RememberArgs {
            fact: fields.required_string(FACT_FIELDS)?,
            extra: Map::new(),
        }),
        ToolName::Recall => ToolArgs::Recall(RecallArgs {
            query: fields.string(QUERY_FIELDS)?,
            extra: Map::new(),
        }),
        ToolName::WebFetch => ToolArgs::WebFetch(WebFetchArgs {
            url: fields.required_string(URL_FIELDS)?,
            extra: Map::new(),
        }),
        ToolName::WebSearch => ToolArgs::WebSearch(QueryArgs {
            query: fields.required_string(QUERY_FIELDS)?,
            extra: Map::new(),
        }),
        ToolName::SemanticSearch => ToolArgs::SemanticSearch(SemanticSearchArgs {
            query: fields.required_string(QUERY_FIELDS)?,
            path: fields.string(DIR_FIELDS)?,
            limit: fields.number(&["limit", "top_k", "k"])?,
            extra: Map::new(),
        }),
        ToolName::SemanticIndex => ToolArgs::SemanticIndex(SemanticIndexArgs {
            path: fields.string(DIR_FIELDS)?,
            extra: Map::new(),
        }),
        ToolName::Shell | ToolName::ApplyPatch => {
            let patch_tool = known == ToolName::ApplyPatch;
            return command_args(tool, Value::Object(fields.into_extra()), patch_tool)
                .map(ToolArgs::Command);
        }
    };
    Ok(with_extra(args, fields.into_extra()))
}

fn with_extra(mut args: ToolArgs, rest: Map<String, Value>) -> ToolArgs {
    let slot = match &mut args {
        ToolArgs::ReadFile(a) => &mut a.extra,
        ToolArgs::WriteFile(a) => &mut a.extra,
        ToolArgs::DeleteFile(a) => &mut a.extra,
        ToolArgs::ListDirectory(a) => &mut a.extra,
        ToolArgs::Search(a) => &mut a.extra,
        ToolArgs::Remember(a) => &mut a.extra,
        ToolArgs::Recall(a) => &mut a.extra,
        ToolArgs::WebFetch(a) => &mut a.extra,
        ToolArgs::WebSearch(a) => &mut a.extra,
        ToolArgs::SemanticSearch(a) => &mut a.extra,
        ToolArgs::SemanticIndex(a) => &mut a.extra,
        ToolArgs::Command(a) => &mut a.extra,
        ToolArgs::Custom(map) => map,
    };
    *slot = rest;
    args
}

fn command_args(tool: &str, value: Value, patch_tool: bool) -> Result<CommandArgs, ValidationError> {
    let missing = || ValidationError::MissingFields {
        tool: tool.to_string(),
        expected: if patch_tool {
            vec!["patch", "input", "command", "cmd"]
        } else {
            vec!["command", "cmd", "patch"]
        },
    };

    match value {
        Value::String(command) => {
            let argv = if patch_tool {
                patch_argv(command)
            } else {
                argv_from_string(&command).ok_or_else(missing)?
            };
            Ok(CommandArgs {
                argv,
                ..Default::default()
            })
        }
        Value::Array(items) => Ok(CommandArgs {
            argv: argv_from_array(tool, "command", items)?.ok_or_else(missing)?,
            ..Default::default()
        }),
        value @ Value::Object(_) => {
            let mut fields = Fields::new(tool, value)?;
            let argv = if let Some(patch) = fields.string(PATCH_FIELDS)? {
                patch_argv(patch)
            } else {
                match fields.take(COMMAND_FIELDS) {
                    Some((_, Value::String(command))) if patch_tool => patch_argv(command),
                    Some((_, Value::String(command))) => {
                        argv_from_string(&command).ok_or_else(missing)?
                    }
                    Some((field, Value::Array(items))) => {
                        argv_from_array(tool, field, items)?.ok_or_else(missing)?
                    }
                    Some((field, _)) => {
                        return Err(ValidationError::InvalidField {
                            tool: tool.to_string(),
                            field,
                            expected: "a string or an array of strings",
                        })
                    }
                    None => return Err(missing()),
                }
            };
            Ok(CommandArgs {
                argv,
                workdir: fields.string(WORKDIR_FIELDS)?,
                timeout_ms: fields.number(TIMEOUT_FIELDS)?,
                extra: fields.into_extra(),
            })
        }
        _ => Err(ValidationError::InvalidField {
            tool: tool.to_string(),
            field: "arguments",
            expected: "a JSON object",
        }),
    }
}

fn patch_argv(patch: String) -> Vec<String> {
    vec!["apply_patch".to_string(), patch]
}

/// Tokenize a command string. Strings needing shell semantics, or with
/// unbalanced quotes, run under `bash -lc` instead.
fn argv_from_string(command: &str) -> Option<Vec<String>> {
    let command = command.trim();
    if command.is_empty() {
        return None;
    }
    if !command.contains(char::is_whitespace) {
        return Some(vec![command.to_string()]);
    }
    if !command.contains(SHELL_METACHARACTERS) {
        if let Some(argv) = shlex::split(command).filter(|argv| !argv.is_empty()) {
            return Some(argv);
        }
    }
    Some(vec!["bash".to_string(), "-lc".to_string(), command.to_string()])
}

fn argv_from_array(
    tool: &str,
    field: &'static str,
    items: Vec<Value>,
) -> Result<Option<Vec<String>>, ValidationError> {
    let mut argv = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) => argv.push(s),
            Value::Number(n) => argv.push(n.to_string()),
            Value::Bool(b) => argv.push(b.to_string()),
            _ => {
                return Err(ValidationError::InvalidField {
                    tool: tool.to_string(),
                    field,
                    expected: "a string or an array of strings",
                })
            }
        }
    }
    // ["ls -la"] is a command line, not a program name.
    if argv.len() == 1 && argv[0].trim().contains(char::is_whitespace) {
        return Ok(argv_from_string(&argv[0]));
    }
    Ok((!argv.is_empty()).then_some(argv))
}

/// Removes recognized fields from an argument object, leaving the rest as extra.
struct Fields<'a> {
    tool: &'a str,
    map: Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn new(tool: &'a str, value: Value) -> Result<Self, ValidationError> {
        match value {
            Value::Object(map) => Ok(Self { tool, map }),
            _ => Err(ValidationError::InvalidField {
                tool: tool.to_string(),
                field: "arguments",
                expected: "a JSON object",
            }),
        }
    }

    fn take(&mut self, names: &[&'static str]) -> Option<(&'static str, Value)> {
        names.iter().find_map(|name| match self.map.remove(*name) {
            Some(Value::Null) | None => None,
            Some(value) => Some((*name, value)),
        })
    }

    fn string(&mut self, names: &[&'static str]) -> Result<Option<String>, ValidationError> {
        match self.take(names) {
            None => Ok(None),
            Some((_, Value::String(s))) => Ok(Some(s)),
            Some((_, Value::Number(n))) => Ok(Some(n.to_string())),
            Some((_, Value::Bool(b))) => Ok(Some(b.to_string())),
            Some((field, _)) => Err(self.invalid(field, "a string")),
        }
    }

    /// Like [`string`](Self::string), but structured values are serialized.
    fn text(&mut self, names: &[&'static str]) -> Result<Option<String>, ValidationError> {
        match self.take(names) {
            None => Ok(None),
            Some((_, Value::String(s))) => Ok(Some(s)),
            Some((field, value)) => serde_json::to_string_pretty(&value)
                .map(Some)
                .map_err(|_| self.invalid(field, "a string")),
        }
    }

    fn required_string(&mut self, names: &[&'static str]) -> Result<String, ValidationError> {
        self.string(names)?
            .ok_or_else(|| self.missing(names.to_vec()))
    }

    fn number(&mut self, names: &[&'static str]) -> Result<Option<u64>, ValidationError> {
        match self.take(names) {
            None => Ok(None),
            Some((field, Value::Number(n))) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .map(Some)
                .ok_or_else(|| self.invalid(field, "a non-negative number")),
            Some((field, Value::String(s))) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| self.invalid(field, "a non-negative number")),
            Some((field, _)) => Err(self.invalid(field, "a non-negative number")),
        }
    }

    fn missing(&self, expected: Vec<&'static str>) -> ValidationError {
        ValidationError::MissingFields {
            tool: self.tool.to_string(),
            expected,
        }
    }

    fn invalid(&self, field: &'static str, expected: &'static str) -> ValidationError {
        ValidationError::InvalidField {
            tool: self.tool.to_string(),
            field,
            expected,
        }
    }

    fn into_extra(self) -> Map<String, Value> {
        self.map
    }
}

/// Check arguments of a custom tool against its declared JSON Schema.
///
/// Top-level only: object type, required fields, and property types.
pub fn check_schema(tool: &str, args: &Map<String, Value>, schema: &Value) -> Result<(), ValidationError> {
    let schema_error = |message: String| ValidationError::Schema {
        tool: tool.to_string(),
        message,
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !args.contains_key(name) {
                return Err(schema_error(format!("missing required field '{name}'")));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (key, value) in args {
            let expected = properties
                .get(key)
                .and_then(|prop| prop.get("type"))
                .and_then(Value::as_str);
            if let Some(expected) = expected {
                if !value_matches_type(value, expected) {
                    return Err(schema_error(format!(
                        "field '{key}' expected type '{expected}', got {}",
                        json_type_name(value)
                    )));
                }
            }
        }
    }

    Ok(())
}

fn value_matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
