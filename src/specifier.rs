//! Package specifier parsing.
//!
//! A specifier is the short string a user writes to declare a dependency.
//! Four grammars are recognized, tried in order:
//!
//! | Form                                | Source                               |
//! |-------------------------------------|--------------------------------------|
//! | `owner/repo[@tag\|#branch]`         | `https://github.com/owner/repo`      |
//! | `github:owner/repo[@tag\|#branch]`  | same as above                        |
//! | `git:<url>[#branch]`                | any git remote                       |
//! | `path:<dir>`                        | local directory, linked not copied   |
//!
//! Parsing is pure: no filesystem or network access.

use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static SHORTHAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([\w-]+)/([\w-]+)(?:@([^@#\s]+)|#([^@#\s]+))?$").expect("static regex")
});

static PACKAGE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.-]+$").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    RemoteGit,
    LocalPath,
}

/// Which remote ref a git source follows when it is not pinned yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionHint {
    Tag(String),
    Branch(String),
}

impl fmt::Display for RevisionHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionHint::Tag(t) => write!(f, "tag {}", t),
            RevisionHint::Branch(b) => write!(f, "branch {}", b),
        }
    }
}

/// Where a package's code lives.
///
/// Fields are private so that a local source can never carry a revision hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    kind: SourceKind,
    origin: String,
    revision_hint: Option<RevisionHint>,
}

impl SourceDescriptor {
    pub fn git(origin: impl Into<String>, revision_hint: Option<RevisionHint>) -> Self {
        Self {
            kind: SourceKind::RemoteGit,
            origin: origin.into(),
            revision_hint,
        }
    }

    pub fn local(path: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::LocalPath,
            origin: path.into(),
            revision_hint: None,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn revision_hint(&self) -> Option<&RevisionHint> {
        self.revision_hint.as_ref()
    }

    pub fn is_local(&self) -> bool {
        self.kind == SourceKind::LocalPath
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSpecifier {
    pub name: String,
    pub source: SourceDescriptor,
}

/// Parse a specifier into its derived package name and source descriptor.
pub fn parse(spec: &str) -> Result<ParsedSpecifier> {
    let trimmed = spec.trim();
    let invalid = || Error::InvalidSpecifier(spec.to_string());

    let parsed = if let Some(parsed) = parse_shorthand(trimmed) {
        parsed
    } else if let Some(rest) = trimmed.strip_prefix("github:") {
        parse_shorthand(rest).ok_or_else(invalid)?
    } else if let Some(rest) = trimmed.strip_prefix("git:") {
        parse_git_url(rest).ok_or_else(invalid)?
    } else if let Some(rest) = trimmed.strip_prefix("path:") {
        parse_local_path(rest).ok_or_else(invalid)?
    } else {
        return Err(invalid());
    };

    if !is_valid_name(&parsed.name) {
        return Err(invalid());
    }
    Ok(parsed)
}

fn parse_shorthand(input: &str) -> Option<ParsedSpecifier> {
    let caps = SHORTHAND.captures(input)?;
    let owner = &caps[1];
    let repo = &caps[2];
    let hint = match (caps.get(3), caps.get(4)) {
        (Some(tag), None) => Some(RevisionHint::Tag(tag.as_str().to_string())),
        (None, Some(branch)) => Some(RevisionHint::Branch(branch.as_str().to_string())),
        _ => None,
    };

    Some(ParsedSpecifier {
        name: repo.to_string(),
        source: SourceDescriptor::git(format!("https://github.com/{}/{}", owner, repo), hint),
    })
}

fn parse_git_url(input: &str) -> Option<ParsedSpecifier> {
    let (url, hint) = match input.rsplit_once('#') {
        Some((url, branch)) if !branch.is_empty() => {
            (url, Some(RevisionHint::Branch(branch.to_string())))
        }
        Some(_) => return None,
        None => (input, None),
    };
    if url.is_empty() {
        return None;
    }

    let last = url
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or_default();
    let name = last.strip_suffix(".git").unwrap_or(last);

    Some(ParsedSpecifier {
        name: name.to_string(),
        source: SourceDescriptor::git(url, hint),
    })
}

fn parse_local_path(input: &str) -> Option<ParsedSpecifier> {
    if input.is_empty() {
        return None;
    }
    let name = input
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    Some(ParsedSpecifier {
        name: name.to_string(),
        source: SourceDescriptor::local(input),
    })
}

pub fn is_valid_name(name: &str) -> bool {
    name != "." && name != ".." && PACKAGE_NAME.is_match(name)
}
