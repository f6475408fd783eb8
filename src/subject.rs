//! Subject line analysis for multi-part binary posts
//!
//! Binary posts encode their structure in free-form subject lines:
//!
//! ```text
//! Holiday pics - "beach.jpg" yEnc (1/3)
//! [02/15] - "archive.part02.rar" yEnc (123456)
//! ```
//!
//! The analyzer recovers the part position (`N/M` markers), an inferred
//! filename, and a normalized collection key that is stable across all
//! parts and files of one posting. Everything here is pure and
//! deterministic; the same subject always yields the same analysis. The
//! normalization heuristics are load-bearing for NZB grouping - downstream
//! equivalence classes depend on them, so behavior changes need new test
//! cases, not cleanups.

use std::sync::LazyLock;

use regex::Regex;

/// `(N/M)` or `[N/M]` part markers
static PART_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[(\[]\s*(\d+)\s*/\s*(\d+)\s*[)\]]").expect("part marker regex is valid")
});

/// Quoted tokens, the usual home of the real filename
static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("quoted token regex is valid"));

/// Bare filename-shaped tokens (name.ext with a 2-4 char extension)
static FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._-]+\.[A-Za-z0-9]{2,4}").expect("filename regex is valid")
});

/// yEnc encoding markers
static YENC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\byenc\b").expect("yEnc regex is valid"));

/// Trailing size annotations like `(123456)`
static TRAILING_SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\d+\)\s*$").expect("size annotation regex is valid"));

/// `fileNNN of MMM` numbering
static FILE_OF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bfile\s*\d+\s*of\s*\d+\b").expect("file-of regex is valid")
});

/// Multi-volume suffixes: `.partNN`, `.rNN`, `.vol000+NN`
static VOLUME_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(part\d+|r\d{2,3}|vol\d+\+\d+)\b").expect("volume suffix regex is valid")
});

/// Trailing extensions on filename-shaped tokens
static EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.[A-Za-z0-9]{2,4}\b").expect("extension regex is valid"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));

/// Everything the analyzer recovers from one subject line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectInfo {
    /// Normalized collection identifier, stable across parts and files
    pub collection_key: String,
    /// Identity of one file within a collection; empty when the subject is
    /// a bare continuation marker like `(2/3)`
    pub file_key: String,
    /// 1-based part position, `1` when no marker is present
    pub part_index: u32,
    /// Total part count, `1` when no marker is present
    pub part_total: u32,
    /// Inferred filename, when the subject carries one
    pub filename: Option<String>,
}

/// Analyze one subject line
pub fn analyze(subject: &str) -> SubjectInfo {
    let marker = rightmost_part_marker(subject);
    let (part_index, part_total) = marker.map(|m| (m.index, m.total)).unwrap_or((1, 1));

    let filename = inferred_filename(subject);

    // File key: the filename when we have one, otherwise the subject with
    // the chosen part marker removed
    let file_key = match &filename {
        Some(name) => name.clone(),
        None => {
            let without_marker = match marker {
                Some(m) => format!("{}{}", &subject[..m.start], &subject[m.end..]),
                None => subject.to_string(),
            };
            collapse(&without_marker)
        }
    };

    SubjectInfo {
        collection_key: collection_key(subject),
        file_key,
        part_index,
        part_total,
        filename,
    }
}

/// Normalized collection key for one subject line
///
/// Strips encoding noise (yEnc tokens, trailing sizes), part markers, file
/// numbering and volume/extension suffixes, then collapses whitespace,
/// trims and lowercases. An empty result falls back to the subject
/// verbatim so that bare continuation markers still produce a stable key.
pub fn collection_key(subject: &str) -> String {
    let mut key = YENC.replace_all(subject, " ").into_owned();
    key = TRAILING_SIZE.replace(&key, " ").into_owned();
    key = PART_MARKER.replace_all(&key, " ").into_owned();
    key = FILE_OF.replace_all(&key, " ").into_owned();
    key = VOLUME_SUFFIX.replace_all(&key, "").into_owned();
    key = EXTENSION.replace_all(&key, "").into_owned();

    let key = collapse(&key).to_lowercase();
    if key.is_empty() {
        subject.to_string()
    } else {
        key
    }
}

#[derive(Clone, Copy)]
struct PartMarker {
    index: u32,
    total: u32,
    start: usize,
    end: usize,
}

/// Find the rightmost valid `(N/M)` marker
///
/// Subjects often carry two markers - `[02/15]` for the file-of-set index
/// and `(1/25)` for the part index. The part index is conventionally last,
/// so the rightmost marker wins; zero-valued markers are ignored.
fn rightmost_part_marker(subject: &str) -> Option<PartMarker> {
    PART_MARKER
        .captures_iter(subject)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let index: u32 = caps.get(1)?.as_str().parse().ok()?;
            let total: u32 = caps.get(2)?.as_str().parse().ok()?;
            if index == 0 || total == 0 {
                return None;
            }
            Some(PartMarker {
                index,
                total,
                start: whole.start(),
                end: whole.end(),
            })
        })
        .last()
}

/// Infer the filename: longest quoted token, else rightmost bare
/// filename-shaped token
fn inferred_filename(subject: &str) -> Option<String> {
    let longest_quoted = QUOTED
        .captures_iter(subject)
        .filter_map(|caps| caps.get(1))
        .max_by_key(|m| m.as_str().len());
    if let Some(quoted) = longest_quoted {
        return Some(quoted.as_str().to_string());
    }

    FILENAME
        .find_iter(subject)
        .last()
        .map(|m| m.as_str().to_string())
}

fn collapse(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let subject = r#"Holiday pics - "beach.jpg" yEnc (2/5)"#;
        assert_eq!(analyze(subject), analyze(subject));
    }

    // ========================================
    // Part markers
    // ========================================

    #[test]
    fn test_part_marker_parens() {
        let info = analyze("Something (3/7)");
        assert_eq!((info.part_index, info.part_total), (3, 7));
    }

    #[test]
    fn test_part_marker_brackets() {
        let info = analyze("Something [3/7]");
        assert_eq!((info.part_index, info.part_total), (3, 7));
    }

    #[test]
    fn test_no_marker_defaults_to_single_part() {
        let info = analyze("Plain text subject");
        assert_eq!((info.part_index, info.part_total), (1, 1));
    }

    #[test]
    fn test_rightmost_marker_wins() {
        // [02/15] is the file-of-set index; (3/25) is the part index
        let info = analyze(r#"[02/15] - "archive.part02.rar" yEnc (3/25)"#);
        assert_eq!((info.part_index, info.part_total), (3, 25));
    }

    #[test]
    fn test_zero_marker_ignored() {
        let info = analyze("Broken (0/0) but (2/4) works");
        assert_eq!((info.part_index, info.part_total), (2, 4));
    }

    #[test]
    fn test_marker_with_spaces() {
        let info = analyze("Spaced ( 2 / 9 )");
        assert_eq!((info.part_index, info.part_total), (2, 9));
    }

    // ========================================
    // Filename inference
    // ========================================

    #[test]
    fn test_longest_quoted_token_is_filename() {
        let info = analyze(r#""a.txt" and "much-longer-name.tar" (1/2)"#);
        assert_eq!(info.filename.as_deref(), Some("much-longer-name.tar"));
    }

    #[test]
    fn test_unquoted_rightmost_filename() {
        let info = analyze("repost of setup.exe and readme.txt (1/1)");
        assert_eq!(info.filename.as_deref(), Some("readme.txt"));
    }

    #[test]
    fn test_no_filename() {
        let info = analyze("just chatting (1/1)");
        assert_eq!(info.filename, None);
    }

    #[test]
    fn test_file_key_prefers_filename() {
        let info = analyze(r#"Set "file.bin" (1/3) yEnc"#);
        assert_eq!(info.file_key, "file.bin");
    }

    #[test]
    fn test_file_key_without_filename_strips_marker() {
        let info = analyze("my collection vol 1 (2/9)");
        assert_eq!(info.file_key, "my collection vol 1");
    }

    #[test]
    fn test_bare_marker_has_empty_file_key() {
        let info = analyze("(2/3)");
        assert_eq!(info.file_key, "");
        assert_eq!((info.part_index, info.part_total), (2, 3));
    }

    // ========================================
    // Collection key normalization
    // ========================================

    #[test]
    fn test_collection_key_invariant_under_part_index() {
        assert_eq!(collection_key("Foo (1/10)"), collection_key("Foo (5/10)"));
    }

    #[test]
    fn test_collection_key_lowercases_and_collapses() {
        assert_eq!(collection_key("  My   COOL set  (1/2)"), "my cool set");
    }

    #[test]
    fn test_collection_key_strips_yenc_and_size() {
        assert_eq!(
            collection_key("Great stuff yEnc (123456)"),
            "great stuff"
        );
    }

    #[test]
    fn test_collection_key_strips_file_numbering() {
        assert_eq!(
            collection_key("Big post file001 of 120 (1/9)"),
            "big post"
        );
    }

    #[test]
    fn test_collection_key_strips_volume_suffixes() {
        let a = collection_key(r#""archive.part01.rar" (1/50)"#);
        let b = collection_key(r#""archive.part02.rar" (1/50)"#);
        assert_eq!(a, b);

        let a = collection_key(r#""backup.r01" (1/10)"#);
        let b = collection_key(r#""backup.r02" (1/10)"#);
        assert_eq!(a, b);
    }

    #[test]
    fn test_collection_key_strips_extension() {
        assert_eq!(
            collection_key(r#""holiday.jpg" (1/3)"#),
            r#""holiday""#
        );
    }

    #[test]
    fn test_collection_key_empty_falls_back_to_subject() {
        assert_eq!(collection_key("(2/3)"), "(2/3)");
        assert_eq!(collection_key("yEnc (1/1)"), "yEnc (1/1)");
    }

    #[test]
    fn test_collection_key_groups_rar_set_with_par2() {
        let rar = collection_key(r#"release [01/20] - "linux-iso.part01.rar" yEnc (1/100)"#);
        let vol = collection_key(r#"release [19/20] - "linux-iso.vol000+01.par2" yEnc (1/4)"#);
        assert_eq!(rar, vol);
    }
}
