//! Output file naming for downloads.
//!
//! Names are resolved by yt-dlp per entry, so a playlist gets one file per
//! item. The unsafe-character rule is handed to yt-dlp as a metadata
//! replacement on `title`; `sanitize_filename` is the same rule in process.
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

/// Characters that are unsafe in file names on at least one platform.
pub const UNSAFE_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*', '\''];

/// Longest title prefix kept in an output name, in characters.
pub const MAX_TITLE_CHARS: usize = 200;

const FALLBACK_STEM: &str = "download";

static UNSAFE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&unsafe_chars_pattern()).unwrap()
});

/// Character class matching any of `UNSAFE_CHARS`, valid for both the
/// `regex` crate and Python's `re`.
pub fn unsafe_chars_pattern() -> String {
    let class: String = UNSAFE_CHARS
        .iter()
        .map(|c| regex::escape(&c.to_string()))
        .collect();
    format!("[{}]", class)
}

/// Replace every unsafe character with `_`.
pub fn sanitize_filename(name: &str) -> String {
    UNSAFE_RE.replace_all(name, "_").into_owned()
}

/// yt-dlp output template writing `<title>.<ext>` into `dir`, the title
/// capped at `MAX_TITLE_CHARS`.
///
/// `%` is yt-dlp's template sigil, so literal percent signs in `dir` are
/// doubled.
pub fn output_template(dir: &Path) -> String {
    let dir = dir.display().to_string().replace('%', "%%");
    let name = format!("%(title|{}).{}s.%(ext)s", FALLBACK_STEM, MAX_TITLE_CHARS);
    Path::new(&dir).join(name).display().to_string()
}
