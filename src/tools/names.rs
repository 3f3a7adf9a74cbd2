//! Canonical tool names and alias normalization.

use std::collections::HashMap;

use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Every tool the dispatcher knows how to route.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ToolName {
    Shell,
    ApplyPatch,
    ReadFile,
    WriteFile,
    DeleteFile,
    ListDirectory,
    Search,
    Remember,
    Recall,
    WebFetch,
    WebSearch,
    SemanticSearch,
    SemanticIndex,
}

impl ToolName {
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Parse an already-canonical name.
    pub fn from_canonical(name: &str) -> Option<Self> {
        name.parse().ok()
    }
}

const ALIASES: &[(&str, ToolName)] = &[
    ("bash", ToolName::Shell),
    ("sh", ToolName::Shell),
    ("exec", ToolName::Shell),
    ("exec_command", ToolName::Shell),
    ("execute", ToolName::Shell),
    ("execute_command", ToolName::Shell),
    ("run", ToolName::Shell),
    ("run_command", ToolName::Shell),
    ("run_shell_command", ToolName::Shell),
    ("shell_command", ToolName::Shell),
    ("local_shell", ToolName::Shell),
    ("terminal", ToolName::Shell),
    ("container.exec", ToolName::Shell),
    ("container.run", ToolName::Shell),
    ("repo_browser.exec", ToolName::Shell),
    ("applypatch", ToolName::ApplyPatch),
    ("patch", ToolName::ApplyPatch),
    ("edit_file", ToolName::ApplyPatch),
    ("repo_browser.apply_patch", ToolName::ApplyPatch),
    ("read", ToolName::ReadFile),
    ("readfile", ToolName::ReadFile),
    ("cat", ToolName::ReadFile),
    ("open_file", ToolName::ReadFile),
    ("view_file", ToolName::ReadFile),
    ("file_read", ToolName::ReadFile),
    ("repo_browser.read_file", ToolName::ReadFile),
    ("repo_browser.open_file", ToolName::ReadFile),
    ("write", ToolName::WriteFile),
    ("create_file", ToolName::WriteFile),
    ("save_file", ToolName::WriteFile),
    ("file_write", ToolName::WriteFile),
    ("repo_browser.write_file", ToolName::WriteFile),
    ("delete", ToolName::DeleteFile),
    ("remove_file", ToolName::DeleteFile),
    ("rm", ToolName::DeleteFile),
    ("repo_browser.delete_file", ToolName::DeleteFile),
    ("ls", ToolName::ListDirectory),
    ("list", ToolName::ListDirectory),
    ("list_dir", ToolName::ListDirectory),
    ("list_files", ToolName::ListDirectory),
    ("repo_browser.ls", ToolName::ListDirectory),
    ("repo_browser.list_files", ToolName::ListDirectory),
    ("grep", ToolName::Search),
    ("rg", ToolName::Search),
    ("ripgrep", ToolName::Search),
    ("find", ToolName::Search),
    ("search_files", ToolName::Search),
    ("file_search", ToolName::Search),
    ("code_search", ToolName::Search),
    ("repo_browser.search", ToolName::Search),
    ("repo_browser.grep", ToolName::Search),
    ("memorize", ToolName::Remember),
    ("save_memory", ToolName::Remember),
    ("store_memory", ToolName::Remember),
    ("memory_store", ToolName::Remember),
    ("memory_recall", ToolName::Recall),
    ("memory_search", ToolName::Recall),
    ("search_memory", ToolName::Recall),
    ("retrieve_memory", ToolName::Recall),
    ("fetch", ToolName::WebFetch),
    ("fetch_url", ToolName::WebFetch),
    ("open_url", ToolName::WebFetch),
    ("http_get", ToolName::WebFetch),
    ("browser.open", ToolName::WebFetch),
    ("browser_open", ToolName::WebFetch),
    ("search_web", ToolName::WebSearch),
    ("internet_search", ToolName::WebSearch),
    ("browser.search", ToolName::WebSearch),
    ("vector_search", ToolName::SemanticSearch),
    ("embedding_search", ToolName::SemanticSearch),
    ("codebase_search", ToolName::SemanticSearch),
    ("index_codebase", ToolName::SemanticIndex),
    ("build_index", ToolName::SemanticIndex),
    ("reindex", ToolName::SemanticIndex),
];

/// Maps model-emitted tool names onto canonical identifiers.
///
/// Matching is case-insensitive. Normalizing a canonical name returns it
/// unchanged; unknown names come back cleaned of noise but otherwise as
/// written.
#[derive(Debug, Clone)]
pub struct NameNormalizer {
    aliases: HashMap<String, ToolName>,
}

impl Default for NameNormalizer {
    fn default() -> Self {
        let mut aliases: HashMap<String, ToolName> = ToolName::iter()
            .map(|tool| (tool.as_str().to_string(), tool))
            .collect();
        for (alias, tool) in ALIASES {
            aliases.insert((*alias).to_string(), *tool);
        }
        Self { aliases }
    }
}

impl NameNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extra alias.
    pub fn with_alias(mut self, alias: &str, tool: ToolName) -> Self {
        self.aliases.insert(alias.trim().to_ascii_lowercase(), tool);
        self
    }

    /// Resolve a raw name to a canonical tool, if it is one.
    pub fn resolve(&self, raw: &str) -> Option<ToolName> {
        let cleaned = clean(raw);
        self.aliases.get(&cleaned.to_ascii_lowercase()).copied()
    }

    /// Canonical name for known tools, the cleaned name otherwise.
    pub fn normalize(&self, raw: &str) -> String {
        let cleaned = clean(raw);
        match self.aliases.get(&cleaned.to_ascii_lowercase()) {
            Some(tool) => tool.as_str().to_string(),
            None => cleaned.to_string(),
        }
    }
}

/// Strip the noise models attach to tool names.
fn clean(raw: &str) -> &str {
    let mut name = raw.trim();
    if let Some(cut) = name.find("<|") {
        name = &name[..cut];
    }
    if let Some(cut) = name.find("---") {
        name = &name[..cut];
    }
    name = name
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`'))
        .trim();
    if name.len() > "functions.".len() && name[.."functions.".len()].eq_ignore_ascii_case("functions.") {
        name = &name["functions.".len()..];
    }
    name.trim()
}
