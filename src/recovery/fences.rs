//! Fenced code block extraction.

use std::sync::LazyLock;

use regex::Regex;

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+-]*)[^\n]*\n(.*?)(?:```|\z)")
        .expect("fence regex must compile")
});

/// Language tag of a fence the recoverer acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceKind {
    Json,
    Shell,
}

impl FenceKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "json" | "jsonc" => Some(Self::Json),
            "bash" | "shell" | "sh" | "zsh" => Some(Self::Shell),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fence<'a> {
    pub kind: FenceKind,
    pub body: &'a str,
    pub start: usize,
    pub end: usize,
}

/// Fences tagged json, bash, shell or sh, in order. An unclosed final fence
/// runs to the end of the input.
pub fn tagged_fences(content: &str) -> Vec<Fence<'_>> {
    FENCE_RE
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let kind = FenceKind::from_tag(caps.get(1).map_or("", |m| m.as_str()))?;
            let body = caps.get(2).map_or("", |m| m.as_str());
            Some(Fence {
                kind,
                body: body.trim_end_matches(['\n', '\r']),
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

pub fn has_tagged_fence(content: &str) -> bool {
    !tagged_fences(content).is_empty()
}
