use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KbaseError, Result};

const MARKDOWN_EXTENSIONS: [&str; 2] = ["md", "markdown"];

const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const FORBIDDEN_NAME_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// A normalized, vault-relative path: `/`-separated segments with no `.`,
/// `..` or empty components. The empty path is the vault root.
///
/// A leading `/` in the raw input anchors the path at the vault root, so
/// `"/notes/a.md"` and `"notes/a.md"` are the same path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VaultPath(String);

impl VaultPath {
    /// Normalizes `raw` and rejects anything that could step outside the vault.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.contains('\0') {
            return Err(KbaseError::InvalidPath {
                path: raw.to_string(),
                reason: "contains a NUL byte",
            });
        }
        if raw.contains('\\') {
            return Err(KbaseError::PathTraversal(raw.to_string()));
        }

        let mut segments = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(KbaseError::PathTraversal(raw.to_string())),
                _ => segments.push(segment),
            }
        }

        if let Some(first) = segments.first() {
            if is_drive_prefix(first) {
                return Err(KbaseError::PathTraversal(raw.to_string()));
            }
        }

        Ok(Self(segments.join("/")))
    }

    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The relative form without a leading slash (`notes/a.md`).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The form the API and the file tree use (`/notes/a.md`, `/` for root).
    pub fn to_url_path(&self) -> String {
        format!("/{}", self.0)
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }

    /// Last segment, or the empty string for the root.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        let dot = name.rfind('.')?;
        (dot > 0).then(|| &name[dot + 1..])
    }

    /// File name without its extension.
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(dot) if dot > 0 => &name[..dot],
            _ => name,
        }
    }

    pub fn is_markdown(&self) -> bool {
        self.extension()
            .map(|ext| MARKDOWN_EXTENSIONS.iter().any(|md| ext.eq_ignore_ascii_case(md)))
            .unwrap_or(false)
    }

    /// Appends `.md` unless the path already carries a markdown extension.
    pub fn with_markdown_extension(&self) -> Self {
        if self.is_markdown() || self.is_root() {
            self.clone()
        } else {
            Self(format!("{}.md", self.0))
        }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(match self.0.rfind('/') {
            Some(slash) => Self(self.0[..slash].to_string()),
            None => Self::root(),
        })
    }

    /// Appends a relative path, normalizing and validating the result.
    pub fn join(&self, relative: &str) -> Result<Self> {
        let joined = Self::parse(relative)?;
        if self.is_root() {
            Ok(joined)
        } else if joined.is_root() {
            Ok(self.clone())
        } else {
            Ok(Self(format!("{}/{}", self.0, joined.0)))
        }
    }

    /// Replaces the last segment, validating `name` as a single file name.
    pub fn with_file_name(&self, name: &str) -> Result<Self> {
        validate_name(name)?;
        match self.parent() {
            Some(parent) => parent.join(name),
            None => Self::parse(name),
        }
    }

    /// Segment-aware prefix test: `a/b` starts with `a` but not with `a/b2`'s `a/b`.
    pub fn starts_with(&self, prefix: &VaultPath) -> bool {
        if prefix.is_root() {
            return true;
        }
        self.0 == prefix.0
            || (self.0.starts_with(&prefix.0) && self.0.as_bytes().get(prefix.0.len()) == Some(&b'/'))
    }

    /// Moves this path from under `from` to under `to`; `None` if it is not under `from`.
    pub fn rebase(&self, from: &VaultPath, to: &VaultPath) -> Option<Self> {
        if !self.starts_with(from) {
            return None;
        }
        let rest = self.0[from.0.len()..].trim_start_matches('/');
        if rest.is_empty() {
            Some(to.clone())
        } else if to.is_root() {
            Some(Self(rest.to_string()))
        } else {
            Some(Self(format!("{}/{}", to.0, rest)))
        }
    }
}

impl fmt::Display for VaultPath {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "/{}", self.0)
    }
}

impl TryFrom<String> for VaultPath {
    type Error = KbaseError;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl From<VaultPath> for String {
    fn from(path: VaultPath) -> Self {
        path.to_url_path()
    }
}

fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Checks a single user-supplied file or directory name before it is sent anywhere.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason| {
        Err(KbaseError::InvalidName {
            name: name.to_string(),
            reason,
        })
    };

    let trimmed = name.trim();
    if trimmed.is_empty() {
        return invalid("name is empty");
    }
    if trimmed != name {
        return invalid("name has leading or trailing whitespace");
    }
    if name == "." || name == ".." {
        return invalid("name is reserved");
    }
    if name.starts_with('.') {
        return invalid("hidden names are not shown in the vault");
    }
    if name.chars().any(|c| FORBIDDEN_NAME_CHARS.contains(&c) || c.is_control()) {
        return invalid("name contains a forbidden character");
    }
    let base = name.split('.').next().unwrap_or(name);
    if RESERVED_NAMES.iter().any(|reserved| base.eq_ignore_ascii_case(reserved)) {
        return invalid("name is reserved by the operating system");
    }
    Ok(())
}

/// Like [`validate_name`], and additionally requires a markdown extension.
pub fn validate_note_name(name: &str) -> Result<()> {
    validate_name(name)?;
    let has_extension = name
        .rsplit_once('.')
        .map(|(stem, ext)| {
            !stem.is_empty() && MARKDOWN_EXTENSIONS.iter().any(|md| ext.eq_ignore_ascii_case(md))
        })
        .unwrap_or(false);
    if !has_extension {
        return Err(KbaseError::InvalidName {
            name: name.to_string(),
            reason: "note names must end in .md or .markdown",
        });
    }
    Ok(())
}

/// Display title for a tab: the file stem.
pub fn title_for(path: &VaultPath) -> String {
    path.stem().to_string()
}
