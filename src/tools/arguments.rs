//! Typed tool arguments produced by validation.

use serde::Serialize;
use serde_json::{Map, Value};

/// Fields a model sent that the tool does not interpret.
pub type ExtraFields = Map<String, Value>;

/// Validated arguments, one variant per argument shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolArgs {
    /// `shell` and `apply_patch`.
    Command(CommandArgs),
    ReadFile(ReadFileArgs),
    WriteFile(WriteFileArgs),
    DeleteFile(PathArgs),
    ListDirectory(ListDirectoryArgs),
    Search(SearchArgs),
    Remember(RememberArgs),
    Recall(RecallArgs),
    WebFetch(WebFetchArgs),
    WebSearch(QueryArgs),
    SemanticSearch(SemanticSearchArgs),
    SemanticIndex(SemanticIndexArgs),
    /// Arguments for tools without a known shape, passed through untouched.
    Custom(ExtraFields),
}

impl ToolArgs {
    pub fn as_command(&self) -> Option<&CommandArgs> {
        match self {
            Self::Command(args) => Some(args),
            _ => None,
        }
    }

    /// The filesystem path these arguments name, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::ReadFile(args) => Some(&args.path),
            Self::WriteFile(args) => Some(&args.path),
            Self::DeleteFile(args) => Some(&args.path),
            Self::ListDirectory(args) => Some(&args.path),
            Self::Search(args) => args.path.as_deref(),
            Self::SemanticSearch(args) => args.path.as_deref(),
            Self::SemanticIndex(args) => args.path.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommandArgs {
    pub argv: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: ExtraFields,
}

impl CommandArgs {
    pub fn is_apply_patch(&self) -> bool {
        self.argv.first().is_some_and(|program| program == "apply_patch")
    }

    /// Patch text of an `apply_patch` invocation.
    pub fn patch_text(&self) -> Option<&str> {
        if self.is_apply_patch() {
            self.argv.get(1).map(String::as_str)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadFileArgs {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u64>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteFileArgs {
    pub path: String,
    pub content: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathArgs {
    pub path: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListDirectoryArgs {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u64>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchArgs {
    pub pattern: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RememberArgs {
    pub fact: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecallArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebFetchArgs {
    pub url: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryArgs {
    pub query: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticSearchArgs {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticIndexArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: ExtraFields,
}
