//! Path parsing and resolution
//!
//! Paths look like `container/key/prefix?max=10&deleted=true`. The first
//! segment names a container; the remaining segments form a key prefix.
//! Empty segments produced by leading, trailing or doubled separators are
//! dropped. An optional suffix after `?` carries listing options.
//!
//! CLI paths carry the drive name in front: `drive/container/key`.

use std::fmt;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Separator between path segments
pub const DIR_SEPARATOR: char = '/';

/// Delimiter that introduces the listing-option suffix
pub const OPTION_DELIMITER: char = '?';

const OPTION_GRAMMAR: &str = "<container>/<prefix>?max=<n>&deleted=<bool>&details=<snapshots,metadata,uncommittedblobs,copy,deleted|all>";

/// Split a path into its non-empty segments
pub fn split_path(path: &str) -> Vec<&str> {
    path.split(DIR_SEPARATOR).filter(|s| !s.is_empty()).collect()
}

/// All segments after the first, rejoined with the separator
///
/// Returns an empty string for a single-segment path.
pub fn subpath(path: &str) -> String {
    split_path(path)
        .into_iter()
        .skip(1)
        .collect::<Vec<_>>()
        .join("/")
}

/// Join a child name onto a parent path without doubling separators
pub fn join_path(parent: &str, child: &str) -> String {
    let parent = parent.trim_end_matches(DIR_SEPARATOR);
    let child = child.trim_start_matches(DIR_SEPARATOR);
    match (parent.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => parent.to_string(),
        _ => format!("{parent}{DIR_SEPARATOR}{child}"),
    }
}

/// Kind of operand a path resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathCategory {
    /// Zero segments: the whole store
    Root,
    /// A single container, unfiltered
    Container,
    /// A container filtered by key prefix and/or listing options
    Query,
}

/// Extra data a listing may carry along with each entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingDetail {
    Snapshots,
    Metadata,
    UncommittedBlobs,
    Copy,
    Deleted,
}

impl ListingDetail {
    pub const ALL: [ListingDetail; 5] = [
        ListingDetail::Snapshots,
        ListingDetail::Metadata,
        ListingDetail::UncommittedBlobs,
        ListingDetail::Copy,
        ListingDetail::Deleted,
    ];

    /// Wire name used in the `include=` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingDetail::Snapshots => "snapshots",
            ListingDetail::Metadata => "metadata",
            ListingDetail::UncommittedBlobs => "uncommittedblobs",
            ListingDetail::Copy => "copy",
            ListingDetail::Deleted => "deleted",
        }
    }
}

impl std::str::FromStr for ListingDetail {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ListingDetail::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                Error::InvalidPath(format!(
                    "unknown listing detail '{s}'. Expected: {OPTION_GRAMMAR}"
                ))
            })
    }
}

/// Options that shape a blob listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingOptions {
    /// Key prefix; empty means every blob in the container
    pub prefix: String,
    /// Result cap consumed across pages; `None` is unbounded
    pub max_results: Option<NonZeroUsize>,
    /// Include soft-deleted blobs
    pub include_deleted: bool,
    /// Detail flags, kept sorted and unique
    pub details: Vec<ListingDetail>,
}

impl ListingOptions {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// Values for the `include=` query parameter
    pub fn include_list(&self) -> Vec<&'static str> {
        let mut details = self.details.clone();
        if self.include_deleted && !details.contains(&ListingDetail::Deleted) {
            details.push(ListingDetail::Deleted);
            details.sort();
        }
        details.iter().map(ListingDetail::as_str).collect()
    }

    fn add_detail(&mut self, detail: ListingDetail) {
        if !self.details.contains(&detail) {
            self.details.push(detail);
            self.details.sort();
        }
    }

    fn apply_suffix(&mut self, suffix: &str) -> Result<()> {
        for pair in suffix.split('&').filter(|p| !p.trim().is_empty()) {
            let (key, value) = match pair.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (pair.trim(), None),
            };

            match key.to_ascii_lowercase().as_str() {
                "max" | "maxresults" => {
                    let raw = value.ok_or_else(|| {
                        Error::InvalidPath(format!("'max' needs a value. Expected: {OPTION_GRAMMAR}"))
                    })?;
                    let max = raw.parse::<NonZeroUsize>().map_err(|_| {
                        Error::InvalidPath(format!(
                            "'max' must be a positive integer, got '{raw}'. Expected: {OPTION_GRAMMAR}"
                        ))
                    })?;
                    self.max_results = Some(max);
                }
                "deleted" | "hidden" => {
                    self.include_deleted = match value.map(str::to_ascii_lowercase).as_deref() {
                        None | Some("") | Some("true") | Some("1") | Some("yes") => true,
                        Some("false") | Some("0") | Some("no") => false,
                        Some(other) => {
                            return Err(Error::InvalidPath(format!(
                                "'{key}' must be a boolean, got '{other}'. Expected: {OPTION_GRAMMAR}"
                            )));
                        }
                    };
                }
                "details" | "include" => {
                    for name in value.unwrap_or_default().split(',').filter(|n| !n.trim().is_empty()) {
                        if name.trim().eq_ignore_ascii_case("all") {
                            ListingDetail::ALL.into_iter().for_each(|d| self.add_detail(d));
                        } else {
                            self.add_detail(name.parse()?);
                        }
                    }
                }
                _ => {
                    return Err(Error::InvalidPath(format!(
                        "unknown listing option '{key}'. Expected: {OPTION_GRAMMAR}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Result of resolving a path against the blob namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub category: PathCategory,
    pub container: Option<String>,
    pub options: Option<ListingOptions>,
}

impl ResolvedPath {
    /// Key prefix for query paths, empty otherwise
    pub fn prefix(&self) -> &str {
        self.options.as_ref().map(|o| o.prefix.as_str()).unwrap_or("")
    }
}

/// Maps paths onto containers, key prefixes and listing options
///
/// Resolution is a pure function of the input string; it never touches
/// the network.
pub struct BlobPathResolver;

impl BlobPathResolver {
    pub fn resolve(path: &str) -> Result<ResolvedPath> {
        let (body, suffix) = match path.split_once(OPTION_DELIMITER) {
            Some((body, suffix)) => (body, Some(suffix)),
            None => (path, None),
        };

        let segments = split_path(body);
        let Some(container) = segments.first() else {
            return Ok(ResolvedPath {
                category: PathCategory::Root,
                container: None,
                options: None,
            });
        };

        if segments.len() == 1 && suffix.is_none() {
            return Ok(ResolvedPath {
                category: PathCategory::Container,
                container: Some(container.to_string()),
                options: None,
            });
        }

        let mut options = ListingOptions::with_prefix(subpath(body));
        if let Some(suffix) = suffix {
            options.apply_suffix(suffix)?;
        }

        Ok(ResolvedPath {
            category: PathCategory::Query,
            container: Some(container.to_string()),
            options: Some(options),
        })
    }
}

/// A CLI path split into drive name and drive-relative remainder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrivePath {
    pub drive: String,
    /// Everything after the drive name, including any option suffix
    pub path: String,
}

impl DrivePath {
    pub fn new(drive: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            drive: drive.into(),
            path: path.into(),
        }
    }

    /// Path segments after the drive name, without the option suffix
    pub fn segments(&self) -> Vec<&str> {
        let body = self
            .path
            .split_once(OPTION_DELIMITER)
            .map(|(b, _)| b)
            .unwrap_or(&self.path);
        split_path(body)
    }
}

impl fmt::Display for DrivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.drive)
        } else {
            write!(f, "{}/{}", self.drive, self.path.trim_start_matches(DIR_SEPARATOR))
        }
    }
}

/// Parse a `drive/container/key?opts` path
///
/// A `drive:` prefix is accepted as well (`drive:/container/key`).
pub fn parse_drive_path(path: &str) -> Result<DrivePath> {
    let path = path.trim();
    if path.is_empty() {
        return Err(Error::InvalidPath("Path cannot be empty".into()));
    }

    let trimmed = path.trim_start_matches(DIR_SEPARATOR);
    let split_at = trimmed
        .find([DIR_SEPARATOR, ':', OPTION_DELIMITER])
        .unwrap_or(trimmed.len());
    let (drive, rest) = trimmed.split_at(split_at);

    if drive.is_empty() {
        return Err(Error::InvalidPath(format!(
            "Path '{path}' does not start with a drive name (drive/container/key)"
        )));
    }

    let rest = rest.strip_prefix(':').unwrap_or(rest);
    Ok(DrivePath::new(drive, rest.trim_start_matches(DIR_SEPARATOR)))
}
