//! Commit filtering for schedule triggers.

use oxide_core::Result;
use oxide_core::commit::{Commit, CommitTag};
use oxide_core::schedule::FileFilter;
use regex::Regex;

/// Filter deciding whether a commit is eligible to trigger a schedule.
pub struct CommitFilter {
    skip_directive: Regex,
}

impl CommitFilter {
    pub fn new(skip_directive_pattern: &str) -> Result<Self> {
        Ok(Self {
            skip_directive: Regex::new(skip_directive_pattern)?,
        })
    }

    /// True if the commit description asks for scheduled builds to skip it.
    pub fn is_skipped(&self, commit: &Commit) -> bool {
        self.skip_directive.is_match(&commit.description)
    }

    /// True if the commit carries one of the required tags (or none are required).
    pub fn matches_tags(&self, commit: &Commit, tags: &[CommitTag]) -> bool {
        commit.matches_tags(tags)
    }
}

/// Check a set of changed paths against a file filter.
///
/// Each path is tested against the rules in order; the last matching rule
/// decides whether it is included. The filter matches if any path is
/// included. An empty filter matches everything.
pub fn file_filter_matches(filter: &FileFilter, paths: &[String]) -> bool {
    if filter.is_empty() {
        return true;
    }
    paths.iter().any(|path| path_included(filter, path))
}

fn path_included(filter: &FileFilter, path: &str) -> bool {
    let mut included = false;
    for rule in &filter.rules {
        let (include, pattern) = match rule.strip_prefix('-') {
            Some(pattern) => (false, pattern),
            None => (true, rule.strip_prefix('+').unwrap_or(rule)),
        };
        if glob_match(pattern, path) {
            included = include;
        }
    }
    included
}

/// Match a path against a glob. `...` and `**` match any sequence including
/// separators; `*` matches within a single path segment.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.replace("...", "**");
    glob_match_bytes(pattern.as_bytes(), text.as_bytes())
}

fn glob_match_bytes(pattern: &[u8], text: &[u8]) -> bool {
    match pattern {
        [] => text.is_empty(),
        [b'*', b'*', rest @ ..] => {
            (0..=text.len()).any(|i| glob_match_bytes(rest, &text[i..]))
        }
        [b'*', rest @ ..] => {
            let segment = text.iter().position(|&c| c == b'/').unwrap_or(text.len());
            (0..=segment).any(|i| glob_match_bytes(rest, &text[i..]))
        }
        [c, rest @ ..] => match text {
            [t, text_rest @ ..] if t.eq_ignore_ascii_case(c) => glob_match_bytes(rest, text_rest),
            _ => false,
        },
    }
}
