//! Naming pattern engine for generating storage references of uploads.
//!
//! Supports customizable patterns with placeholders for upload metadata.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::path::Path;
use uuid::Uuid;

use crate::config::NamingConfig;

lazy_static! {
    /// Regex to match placeholders in naming patterns, e.g. `{title}`.
    static ref PLACEHOLDER_REGEX: Regex = Regex::new(r"\{(\w+)\}").unwrap();

    /// Characters that are unsafe in filenames and object keys.
    static ref UNSAFE_CHARS: Regex = Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).unwrap();

    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// The kind of media an upload is stored as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSlot {
    Track,
    Preview,
    AlbumCover,
    ArtistImage,
}

impl MediaSlot {
    fn default_ext(self) -> &'static str {
        match self {
            MediaSlot::Track | MediaSlot::Preview => "mp3",
            MediaSlot::AlbumCover | MediaSlot::ArtistImage => "jpg",
        }
    }
}

/// Engine for generating storage references from naming patterns.
///
/// Supports the following placeholders:
/// - `{id}` - Random UUID, keeps references unique
/// - `{title}` - Track title (tracks and previews)
/// - `{album}` - Album title (album covers)
/// - `{artist}` - Artist name (artist images)
/// - `{name}` - Stem of the uploaded file name
/// - `{ext}` - File extension (without dot), taken from the uploaded file
pub struct NamingEngine {
    track_pattern: String,
    preview_pattern: String,
    cover_pattern: String,
    artist_image_pattern: String,
}

impl NamingEngine {
    /// Creates a new naming engine from configuration.
    pub fn new(config: NamingConfig) -> Self {
        Self {
            track_pattern: config.track_pattern,
            preview_pattern: config.preview_pattern,
            cover_pattern: config.cover_pattern,
            artist_image_pattern: config.artist_image_pattern,
        }
    }

    /// Generates a storage reference for an upload.
    ///
    /// `label` fills the slot's descriptive placeholder (`{title}`, `{album}`
    /// or `{artist}`); `original_name` is the client-supplied file name.
    pub fn reference_for(&self, slot: MediaSlot, label: &str, original_name: &str) -> String {
        let id = Uuid::new_v4().simple().to_string();
        self.expand(slot, &id, label, original_name)
    }

    fn expand(&self, slot: MediaSlot, id: &str, label: &str, original_name: &str) -> String {
        let pattern = match slot {
            MediaSlot::Track => &self.track_pattern,
            MediaSlot::Preview => &self.preview_pattern,
            MediaSlot::AlbumCover => &self.cover_pattern,
            MediaSlot::ArtistImage => &self.artist_image_pattern,
        };

        let original = Path::new(original_name);
        let ext = original
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| sanitize_filename(&e.to_ascii_lowercase()))
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| slot.default_ext().to_string());
        let stem = original
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();

        let label = non_empty_or_untitled(sanitize_filename(label));
        let stem = non_empty_or_untitled(sanitize_filename(stem));

        PLACEHOLDER_REGEX
            .replace_all(pattern, |caps: &Captures| match &caps[1] {
                "id" => id.to_string(),
                "title" | "album" | "artist" => label.clone(),
                "name" => stem.clone(),
                "ext" => ext.clone(),
                _ => caps[0].to_string(),
            })
            .into_owned()
    }
}

fn non_empty_or_untitled(value: String) -> String {
    if value.is_empty() {
        "untitled".to_string()
    } else {
        value
    }
}

/// Sanitizes a string for use in filenames.
///
/// Unsafe characters and whitespace runs become underscores, repeated
/// underscores collapse, and leading/trailing underscores and dots are
/// trimmed. The result is truncated to 100 bytes.
pub fn sanitize_filename(name: &str) -> String {
    let unsafe_replaced = UNSAFE_CHARS.replace_all(name.trim(), "_");
    let mut result = WHITESPACE.replace_all(&unsafe_replaced, "_").to_string();

    while result.contains("__") {
        result = result.replace("__", "_");
    }

    result = result
        .trim_matches(|c| c == '_' || c == '.')
        .to_string();

    // Truncate to 100 bytes, object keys have a length limit too
    if result.len() > 100 {
        let mut end = 100;
        while !result.is_char_boundary(end) {
            end -= 1;
        }
        result.truncate(end);
    }

    result
}
