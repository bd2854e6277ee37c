//! Single Markdown file parser.
//!
//! The first line is the title, with leading heading (`#`, `##`, ...) and
//! list (`-`) markers removed. A first line without markers is kept byte for
//! byte, byte order mark and `\r` included, so it serializes back unchanged.
//! Everything after the first line is the body, verbatim.

use crate::domain::{ImportError, ParsedNote};

/// Parses one Markdown file.
///
/// An empty file yields an empty note rather than an error.
///
/// # Errors
/// Returns a `PARSE_ERROR` if `bytes` is not valid UTF-8.
pub fn parse_markdown(source: &str, bytes: &[u8]) -> Result<ParsedNote, ImportError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ImportError::parse(source, format!("file is not valid UTF-8: {e}")))?;

    let (first_line, body) = text.split_once('\n').unwrap_or((text, ""));

    Ok(ParsedNote::new(title_from_line(first_line), body))
}

/// Strip leading heading/list markers from a title line.
///
/// A line without markers is returned unchanged.
fn title_from_line(line: &str) -> String {
    let trimmed = line.trim_start_matches('\u{feff}').trim_start();
    if !trimmed.starts_with(['#', '-']) {
        return line.to_string();
    }

    let mut rest = trimmed;
    loop {
        let next = rest.trim_start_matches(['#', '-']).trim_start();
        if next.len() == rest.len() {
            break;
        }
        rest = next;
    }
    rest.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_line_is_title() {
        let note = parse_markdown("a.md", b"Shopping\n- milk\n- eggs\n").unwrap();
        assert_eq!(note.title, "Shopping");
        assert_eq!(note.body, "- milk\n- eggs\n");
    }

    #[test]
    fn test_heading_markers_stripped_from_title_only() {
        let note = parse_markdown("a.md", b"## Weekly Review\n# Wins\n## Misses\n").unwrap();
        assert_eq!(note.title, "Weekly Review");
        assert_eq!(note.body, "# Wins\n## Misses\n");
    }

    #[test]
    fn test_list_marker_stripped_from_title() {
        let note = parse_markdown("a.md", b"- todo item\nrest").unwrap();
        assert_eq!(note.title, "todo item");
        assert_eq!(note.body, "rest");
    }

    #[test]
    fn test_empty_file_yields_empty_note() {
        let note = parse_markdown("empty.md", b"").unwrap();
        assert_eq!(note.title, "");
        assert_eq!(note.body, "");
    }

    #[test]
    fn test_crlf_and_bom_with_heading() {
        let note = parse_markdown("win.md", "\u{feff}# Title\r\nline\r\n".as_bytes()).unwrap();
        assert_eq!(note.title, "Title");
        assert_eq!(note.body, "line\r\n");
    }

    #[test]
    fn test_crlf_and_bom_kept_on_plain_title() {
        let note = parse_markdown("win.md", "\u{feff}Title\r\nline\r\n".as_bytes()).unwrap();
        assert_eq!(note.title, "\u{feff}Title\r");
        assert_eq!(note.body, "line\r\n");
    }

    #[test]
    fn test_invalid_utf8_is_parse_error() {
        let err = parse_markdown("bin.md", &[0xff, 0xfe, 0x00]).unwrap_err();
        assert_eq!(err.code, crate::domain::ImportErrorCode::ParseError);
        assert_eq!(err.source, "bin.md");
    }

    #[test]
    fn test_title_without_markers_kept_verbatim() {
        let note = parse_markdown("a.md", b"  indented title\nbody").unwrap();
        assert_eq!(note.title, "  indented title");
    }
}
