//! Title/filename codec and path classification for mirrored notes
//!
//! A note's title is the source of truth for its filename, but titles may
//! contain `/`, which a tree-structured store treats as a directory
//! separator. This crate maps titles to path-safe filenames and back:
//!
//! - Separators are replaced with a private-use-area stand-in character
//! - Literal occurrences of the stand-ins are protected with a second,
//!   escaping stand-in
//! - Decoding is a single left-to-right scan with one character of
//!   lookahead after each escape (escape runs are unbounded in length, so
//!   fixed-width lookbehind cannot decode them)
//!
//! The mapping round-trips for every title, including titles that contain
//! the stand-in characters themselves.

use serde::{Deserialize, Serialize};

/// Stand-in for a literal `/` inside a title (private use area).
pub const SEPARATOR_MARK: char = '\u{f8fd}';

/// Escape prefix protecting a literal occurrence of either stand-in.
pub const ESCAPE_MARK: char = '\u{f8fe}';

/// File extension of markdown notes.
pub const NOTE_EXTENSION: &str = "md";

/// File extension of bookmark placeholder files.
pub const LINK_EXTENSION: &str = "link";

/// What kind of logical entry a tracked path represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentKind {
    /// Markdown note with materialized text content.
    Note,
    /// Opaque file tracked by hash only (no extension, or an unrecognized one).
    Document,
    /// Bookmark placeholder file; the filename encodes the link target.
    Link,
}

/// Classify a path by its final extension.
pub fn classify(path: &str) -> ContentKind {
    match extension(path) {
        Some(ext) if ext.eq_ignore_ascii_case(NOTE_EXTENSION) => ContentKind::Note,
        Some(ext) if ext.eq_ignore_ascii_case(LINK_EXTENSION) => ContentKind::Link,
        _ => ContentKind::Document,
    }
}

/// Return the final extension of a path's filename, if any.
///
/// A leading dot does not start an extension (".hidden" has none).
pub fn extension(path: &str) -> Option<&str> {
    let (_, filename) = split_location_and_filename(path);
    match filename.rfind('.') {
        Some(0) | None => None,
        Some(pos) => Some(&filename[pos + 1..]),
    }
}

/// Split a path at its last separator into (location, filename).
///
/// The location is empty for root-level paths and never carries a trailing
/// separator.
pub fn split_location_and_filename(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(pos) => (&path[..pos], &path[pos + 1..]),
        None => ("", path),
    }
}

/// Encode a title into a path-safe filename, appending `extension` if given.
///
/// Escaping is applied in a fixed order so stand-ins of stand-ins stay
/// unambiguous: first every literal `ESCAPE_MARK` is doubled, then every
/// literal `SEPARATOR_MARK` is prefixed with `ESCAPE_MARK`, and only then
/// are separators replaced with `SEPARATOR_MARK`.
pub fn title_to_filename(title: &str, extension: Option<&str>) -> String {
    let mut encoded = String::with_capacity(title.len());
    for ch in title.chars() {
        match ch {
            ESCAPE_MARK => {
                encoded.push(ESCAPE_MARK);
                encoded.push(ESCAPE_MARK);
            }
            SEPARATOR_MARK => {
                encoded.push(ESCAPE_MARK);
                encoded.push(SEPARATOR_MARK);
            }
            '/' => encoded.push(SEPARATOR_MARK),
            _ => encoded.push(ch),
        }
    }
    if let Some(ext) = extension {
        encoded.push('.');
        encoded.push_str(ext);
    }
    encoded
}

/// Decode a filename back into the title it was generated from.
///
/// Strips the final extension, then reverses the escaping with a
/// left-to-right scan: a character following `ESCAPE_MARK` is taken
/// literally, a bare `SEPARATOR_MARK` becomes `/`.
pub fn filename_to_title(filename: &str) -> String {
    // Unlike `extension`, a leading dot is stripped too: the encoder always
    // appends the extension, so ".md" decodes to the empty title.
    let stem = match filename.rfind('.') {
        None => filename,
        Some(pos) => &filename[..pos],
    };

    let mut title = String::with_capacity(stem.len());
    let mut chars = stem.chars();
    while let Some(ch) = chars.next() {
        match ch {
            ESCAPE_MARK => match chars.next() {
                Some(escaped) => title.push(escaped),
                // A trailing escape cannot come out of title_to_filename;
                // keep it verbatim rather than lose input.
                None => title.push(ESCAPE_MARK),
            },
            SEPARATOR_MARK => title.push('/'),
            _ => title.push(ch),
        }
    }
    title
}
