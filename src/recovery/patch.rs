//! Literal `*** Begin Patch` envelopes in free text.

use std::sync::LazyLock;

use regex::Regex;

pub const BEGIN_MARKER: &str = "*** Begin Patch";
pub const END_MARKER: &str = "*** End Patch";

static PATCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\*\*\* Begin Patch.*?\*\*\* End Patch").expect("patch regex must compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchBlock<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

/// Every complete patch envelope, in order.
pub fn patch_blocks(content: &str) -> Vec<PatchBlock<'_>> {
    PATCH_RE
        .find_iter(content)
        .map(|m| PatchBlock {
            text: m.as_str(),
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

/// Files a patch leaves behind: added and updated paths, with `*** Move to:`
/// replacing the path it renames. Deleted files are not listed.
pub fn touched_files(patch: &str) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for line in patch.lines() {
        let line = line.trim_end();
        if let Some(path) = line
            .strip_prefix("*** Add File:")
            .or_else(|| line.strip_prefix("*** Update File:"))
        {
            push_unique(&mut files, path.trim());
        } else if let Some(path) = line.strip_prefix("*** Move to:") {
            files.pop();
            push_unique(&mut files, path.trim());
        }
    }
    files
}

fn push_unique(files: &mut Vec<String>, path: &str) {
    if !path.is_empty() && !files.iter().any(|f| f == path) {
        files.push(path.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATCH: &str = "*** Begin Patch\n*** Add File: a.json\n+{}\n*** Update File: src/old.rs\n*** Move to: src/new.rs\n@@\n-x\n+y\n*** Delete File: gone.toml\n*** End Patch";

    #[test]
    fn finds_patch_blocks_in_prose() {
        let content = format!("Here is the fix:\n{PATCH}\nDone.");
        let blocks = patch_blocks(&content);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, PATCH);
    }

    #[test]
    fn unterminated_patch_is_not_a_block() {
        assert!(patch_blocks("*** Begin Patch\n*** Add File: a\n").is_empty());
    }

    #[test]
    fn touched_files_follow_moves_and_skip_deletes() {
        assert_eq!(touched_files(PATCH), vec!["a.json", "src/new.rs"]);
    }
}
