//! ENML (Evernote's XHTML dialect) to Markdown conversion.
//!
//! Handles the subset Evernote actually emits: block containers, headings,
//! inline emphasis, lists, links, checkboxes and `en-media` references.
//! Unknown elements are dropped while their text is kept.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Resource referenced from ENML by hash.
#[derive(Debug, Clone)]
pub struct MediaLink {
    pub filename: String,
    pub is_image: bool,
}

#[derive(Debug, Clone, Copy)]
enum ListKind {
    Bullet,
    Ordered(u32),
}

struct Converter<'a> {
    out: String,
    lists: Vec<ListKind>,
    links: Vec<Option<String>>,
    media: &'a HashMap<String, MediaLink>,
}

/// Converts an ENML document to Markdown.
///
/// # Errors
/// Returns a description of the first XML problem encountered.
pub fn enml_to_markdown(
    enml: &str,
    media: &HashMap<String, MediaLink>,
) -> Result<String, String> {
    let mut reader = Reader::from_str(enml);
    reader.config_mut().trim_text(false);

    let mut conv = Converter {
        out: String::new(),
        lists: Vec::new(),
        links: Vec::new(),
        media,
    };
    let mut depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                conv.open(&e)?;
            }
            Ok(Event::End(e)) => {
                depth = depth.saturating_sub(1);
                conv.close(e.local_name().as_ref());
            }
            Ok(Event::Empty(e)) => {
                conv.open(&e)?;
                conv.close(e.local_name().as_ref());
            }
            Ok(Event::Text(t)) => {
                let raw = std::str::from_utf8(&t).map_err(|e| e.to_string())?;
                let text = quick_xml::escape::unescape_with(raw, resolve_html_entity)
                    .map_err(|e| format!("bad entity in content: {e}"))?;
                conv.text(&text);
            }
            Ok(Event::CData(c)) => conv.text(&String::from_utf8_lossy(&c)),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "malformed content at byte {}: {e}",
                    reader.buffer_position()
                ))
            }
        }
    }

    if depth != 0 {
        return Err("content ends with unclosed elements".into());
    }

    Ok(tidy(&conv.out))
}

impl Converter<'_> {
    fn open(&mut self, e: &BytesStart<'_>) -> Result<(), String> {
        match e.local_name().as_ref() {
            b"div" | b"p" | b"blockquote" | b"table" | b"tr" => self.block_break(),
            b"br" => self.out.push('\n'),
            b"hr" => {
                self.block_break();
                self.out.push_str("---\n");
            }
            b"h1" => self.heading(1),
            b"h2" => self.heading(2),
            b"h3" => self.heading(3),
            b"h4" => self.heading(4),
            b"h5" => self.heading(5),
            b"h6" => self.heading(6),
            b"b" | b"strong" => self.out.push_str("**"),
            b"i" | b"em" => self.out.push('*'),
            b"s" | b"strike" | b"del" => self.out.push_str("~~"),
            b"code" => self.out.push('`'),
            b"ul" => {
                self.block_break();
                self.lists.push(ListKind::Bullet);
            }
            b"ol" => {
                self.block_break();
                self.lists.push(ListKind::Ordered(0));
            }
            b"li" => self.list_item(),
            b"a" => {
                let href = attribute(e, b"href")?;
                if href.is_some() {
                    self.out.push('[');
                }
                self.links.push(href);
            }
            b"en-todo" => {
                let checked = attribute(e, b"checked")?.is_some_and(|v| v == "true");
                self.out.push_str(if checked { "[x] " } else { "[ ] " });
            }
            b"en-media" => {
                if let Some(hash) = attribute(e, b"hash")? {
                    if let Some(link) = self.media.get(&hash.to_ascii_lowercase()) {
                        let bang = if link.is_image { "!" } else { "" };
                        let target = link.filename.replace(' ', "%20");
                        self.out
                            .push_str(&format!("{bang}[{}]({target})", link.filename));
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) {
        match name {
            b"div" | b"p" | b"blockquote" | b"table" | b"tr" | b"li" => self.line_break(),
            b"h1" | b"h2" | b"h3" | b"h4" | b"h5" | b"h6" => self.line_break(),
            b"b" | b"strong" => self.out.push_str("**"),
            b"i" | b"em" => self.out.push('*'),
            b"s" | b"strike" | b"del" => self.out.push_str("~~"),
            b"code" => self.out.push('`'),
            b"ul" | b"ol" => {
                self.lists.pop();
                self.line_break();
            }
            b"a" => {
                if let Some(Some(href)) = self.links.pop() {
                    self.out.push_str(&format!("]({href})"));
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        // Markup indentation between block elements is not content.
        if text.trim().is_empty() && (self.out.is_empty() || self.out.ends_with('\n')) {
            return;
        }
        self.out.push_str(text);
    }

    fn heading(&mut self, level: usize) {
        self.block_break();
        self.out.push_str(&"#".repeat(level));
        self.out.push(' ');
    }

    fn list_item(&mut self) {
        self.line_break();
        let depth = self.lists.len().saturating_sub(1);
        self.out.push_str(&"  ".repeat(depth));
        match self.lists.last_mut() {
            Some(ListKind::Ordered(n)) => {
                *n += 1;
                let marker = format!("{n}. ");
                self.out.push_str(&marker);
            }
            Some(ListKind::Bullet) | None => self.out.push_str("- "),
        }
    }

    fn line_break(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn block_break(&mut self) {
        self.line_break();
    }
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, String> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| format!("bad attribute: {e}"))?;
        if attr.key.local_name().as_ref() == key {
            let raw = String::from_utf8_lossy(&attr.value);
            let value = quick_xml::escape::unescape_with(&raw, resolve_html_entity)
                .map_err(|e| format!("bad entity in attribute: {e}"))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// XML predefined entities plus the HTML ones Evernote commonly writes.
fn resolve_html_entity(entity: &str) -> Option<&'static str> {
    let value = match entity {
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "apos" => "'",
        "quot" => "\"",
        "nbsp" => "\u{a0}",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "hellip" => "\u{2026}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "trade" => "\u{2122}",
        "bull" => "\u{2022}",
        "middot" => "\u{b7}",
        "euro" => "\u{20ac}",
        _ => return None,
    };
    Some(value)
}

/// Normalize whitespace: non-breaking spaces to spaces, trailing spaces
/// removed, at most one blank line in a row, single trailing newline.
fn tidy(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut blank_run = 0;

    for line in markdown.replace('\u{a0}', " ").lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 || out.is_empty() {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }

    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(enml: &str) -> String {
        enml_to_markdown(enml, &HashMap::new()).unwrap()
    }

    #[test]
    fn test_paragraphs_and_breaks() {
        let md = convert("<en-note><div>first</div><div>second<br/>third</div></en-note>");
        assert_eq!(md, "first\nsecond\nthird\n");
    }

    #[test]
    fn test_inline_formatting_and_links() {
        let md = convert(
            r#"<en-note><div><b>bold</b> <i>it</i> <a href="https://example.com?a=1&amp;b=2">site</a></div></en-note>"#,
        );
        assert_eq!(md, "**bold** *it* [site](https://example.com?a=1&b=2)\n");
    }

    #[test]
    fn test_headings_and_lists() {
        let md = convert(
            "<en-note><h2>Plan</h2><ul><li>one</li><li>two<ol><li>a</li><li>b</li></ol></li></ul></en-note>",
        );
        assert_eq!(md, "## Plan\n- one\n- two\n  1. a\n  2. b\n");
    }

    #[test]
    fn test_todo_and_entities() {
        let md = convert(
            r#"<en-note><div><en-todo checked="true"/>done&nbsp;&mdash; ok</div><div><en-todo/>open</div></en-note>"#,
        );
        assert_eq!(md, "[x] done \u{2014} ok\n[ ] open\n");
    }

    #[test]
    fn test_media_by_hash() {
        let mut media = HashMap::new();
        media.insert(
            "abc123".to_string(),
            MediaLink {
                filename: "my photo.png".into(),
                is_image: true,
            },
        );
        media.insert(
            "def456".to_string(),
            MediaLink {
                filename: "doc.pdf".into(),
                is_image: false,
            },
        );

        let md = enml_to_markdown(
            r#"<en-note><div><en-media hash="ABC123" type="image/png"/></div><en-media hash="def456"/><en-media hash="missing"/></en-note>"#,
            &media,
        )
        .unwrap();
        assert_eq!(md, "![my photo.png](my%20photo.png)\n[doc.pdf](doc.pdf)\n");
    }

    #[test]
    fn test_doctype_and_declaration_ignored() {
        let md = convert(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE en-note SYSTEM \"http://xml.evernote.com/pub/enml2.dtd\">\n<en-note>\n  <div>hi</div>\n</en-note>",
        );
        assert_eq!(md, "hi\n");
    }

    #[test]
    fn test_mismatched_tags_are_errors() {
        assert!(enml_to_markdown("<en-note><div>oops</span></en-note>", &HashMap::new()).is_err());
        assert!(enml_to_markdown("<en-note><div>open", &HashMap::new()).is_err());
        assert!(enml_to_markdown("<en-note>&bogus;</en-note>", &HashMap::new()).is_err());
    }
}
