//! Markdown to standalone HTML document.
//!
//! Raw HTML in the note body is never passed through: it is re-emitted as
//! escaped text. Link and image destinations with script-capable schemes
//! are replaced by `#`.

use async_trait::async_trait;
use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag};

use crate::domain::{ExportFormat, FileHandle, Note, SerializeError};
use crate::infrastructure::ExportTarget;

use super::serializer::NoteSerializer;

const STYLESHEET: &str = "\
body { font-family: -apple-system, 'Segoe UI', Helvetica, Arial, sans-serif; \
line-height: 1.6; color: #1f2328; max-width: 46rem; margin: 2rem auto; padding: 0 1rem; }
h1, h2, h3 { line-height: 1.25; }
pre { background: #f6f8fa; padding: 0.75rem; overflow-x: auto; border-radius: 6px; }
code { font-family: ui-monospace, Menlo, Consolas, monospace; font-size: 0.9em; }
blockquote { margin: 0; padding-left: 1rem; border-left: 4px solid #d0d7de; color: #59636e; }
table { border-collapse: collapse; }
th, td { border: 1px solid #d0d7de; padding: 0.3rem 0.6rem; }
img { max-width: 100%; }";

const UNSAFE_SCHEMES: [&str; 3] = ["javascript:", "vbscript:", "data:"];

/// Renders notes as HTML pages with an embedded stylesheet.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlSerializer;

impl HtmlSerializer {
    /// Full HTML document for `note`.
    #[must_use]
    pub fn render(note: &Note) -> String {
        let title = escape_html(&note.display_title());
        let body = render_body(&note.body);

        format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
             <title>{title}</title>\n<style>\n{STYLESHEET}\n</style>\n</head>\n<body>\n\
             <article>\n<h1>{title}</h1>\n{body}</article>\n</body>\n</html>\n"
        )
    }
}

#[async_trait]
impl NoteSerializer for HtmlSerializer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Html
    }

    async fn serialize_with_progress(
        &self,
        note: &Note,
        target: &ExportTarget,
        on_step: &mut (dyn FnMut(&str) + Send),
    ) -> Result<FileHandle, SerializeError> {
        on_step("rendering");
        let document = Self::render(note);

        on_step("writing");
        target
            .write(&note.title, ExportFormat::Html.extension(), document.as_bytes())
            .map_err(SerializeError::write)
    }
}

fn render_body(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let events = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Link {
            link_type,
            dest_url: sanitize_url(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Image {
            link_type,
            dest_url: sanitize_url(dest_url),
            title,
            id,
        }),
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}

fn sanitize_url(url: CowStr<'_>) -> CowStr<'_> {
    // Browsers ignore embedded whitespace and control characters in schemes.
    let normalized: String = url
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_ascii_control())
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();

    if UNSAFE_SCHEMES.iter().any(|s| normalized.starts_with(s)) {
        CowStr::Borrowed("#")
    } else {
        url
    }
}

/// Escape text for use in element content and attribute values.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::serializer::tests::note;
    use tempfile::tempdir;

    #[test]
    fn test_markdown_rendered() {
        let html = HtmlSerializer::render(&note(
            1,
            "Plan",
            "## Steps\n\n- [x] done\n- [ ] open\n\n**bold** ~~gone~~\n\n| a | b |\n|---|---|\n| 1 | 2 |\n",
        ));

        assert!(html.contains("<h2>Steps</h2>"));
        assert!(html.contains("<strong>bold</strong>"));
        assert!(html.contains("<del>gone</del>"));
        assert!(html.contains("<table>"));
        assert!(html.contains("checkbox"));
        assert!(html.contains("<title>Plan</title>"));
    }

    #[test]
    fn test_title_escaped() {
        let html = HtmlSerializer::render(&note(1, "<script>alert(1)</script> & co", ""));
        assert!(!html.contains("<script>"));
        assert!(html.contains("<h1>&lt;script&gt;alert(1)&lt;/script&gt; &amp; co</h1>"));
    }

    #[test]
    fn test_raw_html_in_body_escaped() {
        let html = HtmlSerializer::render(&note(
            1,
            "t",
            "<img src=x onerror=alert(1)>\n\ninline <b onclick=\"x()\">b</b>\n",
        ));
        assert!(!html.contains("<img src=x"));
        assert!(!html.contains("<b onclick"));
        assert!(html.contains("&lt;img src=x onerror=alert(1)&gt;"));
    }

    #[test]
    fn test_script_urls_neutralized() {
        let html = HtmlSerializer::render(&note(
            1,
            "t",
            "[a](javascript:alert(1)) [b](JavaScript%3Aalert) ![i](data:image/png;base64,AAAA) [ok](https://example.com)\n",
        ));
        assert!(!html.to_lowercase().contains("javascript:"));
        assert!(!html.contains("data:image"));
        assert!(html.contains("href=\"#\""));
        assert!(html.contains("src=\"#\""));
        assert!(html.contains("href=\"https://example.com\""));
    }

    #[tokio::test]
    async fn test_serialize_reports_steps_and_writes_html() {
        let dir = tempdir().unwrap();
        let target = ExportTarget::new(dir.path()).unwrap();
        let mut steps = Vec::new();

        let handle = HtmlSerializer
            .serialize_with_progress(&note(3, "Trip", "hello"), &target, &mut |s: &str| {
                steps.push(s.to_string());
            })
            .await
            .unwrap();

        assert_eq!(steps, vec!["rendering", "writing"]);
        assert_eq!(handle.path, dir.path().join("trip.html"));
        let written = std::fs::read_to_string(&handle.path).unwrap();
        assert!(written.contains("<p>hello</p>"));
        assert_eq!(handle.size, written.len() as u64);
    }
}
