//! Evernote ENEX archive parser.
//!
//! An archive holds any number of `<note>` entries. Entries are located by a
//! lightweight scan that skips CDATA and comments, then each one is parsed
//! on its own, so a broken entry yields one error and its siblings still
//! import.

use std::collections::{BTreeSet, HashMap};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::domain::{AttachmentRef, ImportError, ImportErrorCode, ParsedNote};
use crate::infrastructure::StagingArea;

use super::enml::{enml_to_markdown, MediaLink};

const UNTITLED: &str = "Untitled";
const ENEX_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Result for one `<note>` entry of an archive.
pub type EnexEntry = Result<ParsedNote, ImportError>;

#[derive(Debug, Default)]
struct RawNote {
    title: String,
    content: String,
    created: String,
    updated: String,
    tags: Vec<String>,
    resources: Vec<RawResource>,
}

#[derive(Debug, Default)]
struct RawResource {
    data: String,
    mime: String,
    file_name: String,
}

/// Parses an ENEX archive into one result per note entry.
///
/// Resource blobs are decoded into `staging`.
///
/// # Errors
/// Returns a `PARSE_ERROR` for the whole archive only when it is not UTF-8
/// or is not an Evernote export at all.
pub fn parse_enex(
    source: &str,
    bytes: &[u8],
    staging: &StagingArea,
) -> Result<Vec<EnexEntry>, ImportError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ImportError::parse(source, format!("archive is not valid UTF-8: {e}")))?;

    if !text.contains("<en-export") {
        return Err(ImportError::parse(
            source,
            "not an Evernote export (missing <en-export> root)",
        ));
    }

    let entries = split_note_entries(text)
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let entry_source = format!("{source} (note {})", i + 1);
            match entry {
                Ok(xml) => parse_note_entry(&entry_source, xml, staging),
                Err(message) => Err(ImportError::parse(entry_source, message)),
            }
        })
        .collect::<Vec<_>>();

    tracing::debug!(source, entries = entries.len(), "Split ENEX archive");

    Ok(entries)
}

/// Byte ranges of `<note>...</note>` elements, skipping CDATA and comments.
fn split_note_entries(xml: &str) -> Vec<Result<&str, String>> {
    let mut entries = Vec::new();
    let mut open: Option<usize> = None;
    let mut pos = 0;

    while let Some(offset) = xml[pos..].find('<') {
        let at = pos + offset;
        let rest = &xml[at..];

        let section = if rest.starts_with("<![CDATA[") {
            Some(("]]>", "CDATA section"))
        } else if rest.starts_with("<!--") {
            Some(("-->", "comment"))
        } else {
            None
        };

        if let Some((terminator, what)) = section {
            let end = rest.find(terminator).map(|i| i + terminator.len());
            // An unterminated section must not run on into the next entry.
            let boundary = open.and_then(|_| next_entry_boundary(rest));
            let end = match (end, boundary) {
                (Some(len), Some(b)) if len > b => None,
                (end, _) => end,
            };
            match (end, boundary) {
                (Some(len), _) => {
                    pos = at + len;
                    continue;
                }
                (None, Some(b)) => {
                    open = None;
                    entries.push(Err(format!("note entry has an unterminated {what}")));
                    pos = at + b;
                    continue;
                }
                (None, None) => break,
            }
        }

        if is_tag(rest, "<note") {
            if open.replace(at).is_some() {
                entries.push(Err("note entry is not closed before the next one".into()));
            }
        } else if is_tag(rest, "</note") {
            if let Some(start) = open.take() {
                let end = rest.find('>').map_or(xml.len(), |gt| at + gt + 1);
                entries.push(Ok(&xml[start..end]));
            }
        }

        pos = at + 1;
    }

    if open.is_some() {
        entries.push(Err("note entry is truncated".into()));
    }

    entries
}

/// Offset just past the first `</note>` in `rest` that is followed by
/// another entry or the end of the archive.
fn next_entry_boundary(rest: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(offset) = rest[from..].find("</note") {
        let at = from + offset;
        if is_tag(&rest[at..], "</note") {
            let close_end = at + rest[at..].find('>')? + 1;
            let next = rest[close_end..].trim_start();
            if is_tag(next, "<note") || next.starts_with("</en-export") {
                return Some(close_end);
            }
        }
        from = at + 1;
    }
    None
}

/// `rest` starts with `tag` followed by a delimiter, so `<note` does not
/// match `<note-attributes>`.
fn is_tag(rest: &str, tag: &str) -> bool {
    rest.strip_prefix(tag).is_some_and(|after| {
        after
            .chars()
            .next()
            .is_some_and(|c| c == '>' || c == '/' || c.is_whitespace())
    })
}

fn parse_note_entry(source: &str, xml: &str, staging: &StagingArea) -> EnexEntry {
    let raw = read_raw_note(xml).map_err(|message| ImportError::parse(source, message))?;

    let mut media = HashMap::new();
    let mut attachments = Vec::with_capacity(raw.resources.len());
    for (i, resource) in raw.resources.iter().enumerate() {
        let (attachment, hash) = stage_resource(source, i + 1, resource, staging)?;
        // Identical blobs share a hash; the first resource wins.
        media.entry(hash).or_insert_with(|| MediaLink {
            filename: attachment.suggested_filename.clone(),
            is_image: attachment.mime_type.starts_with("image/"),
        });
        attachments.push(attachment);
    }

    let body = if raw.content.trim().is_empty() {
        String::new()
    } else {
        enml_to_markdown(&raw.content, &media)
            .map_err(|message| ImportError::parse(source, message))?
    };

    let title = raw.title.trim();
    let tags: BTreeSet<String> = raw
        .tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    Ok(ParsedNote {
        title: if title.is_empty() {
            UNTITLED.to_string()
        } else {
            title.to_string()
        },
        body,
        tags,
        created_at: Some(parse_enex_date(&raw.created).unwrap_or_else(Utc::now)),
        updated_at: Some(parse_enex_date(&raw.updated).unwrap_or_else(Utc::now)),
        attachments,
    })
}

/// Collects the fields of one `<note>` element. Unknown elements are
/// ignored.
fn read_raw_note(xml: &str) -> Result<RawNote, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut note = RawNote::default();
    let mut path: Vec<Vec<u8>> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                match (parent(&path), name.as_slice()) {
                    (Some(b"note"), b"tag") => note.tags.push(String::new()),
                    (Some(b"note"), b"resource") => note.resources.push(RawResource::default()),
                    _ => {}
                }
                path.push(name);
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(t)) => {
                let raw = std::str::from_utf8(&t).map_err(|e| e.to_string())?;
                let text = quick_xml::escape::unescape(raw)
                    .map_err(|e| format!("bad entity: {e}"))?;
                note.push_text(&path, &text);
            }
            Ok(Event::CData(c)) => {
                note.push_text(&path, &String::from_utf8_lossy(&c));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "malformed note at byte {}: {e}",
                    reader.buffer_position()
                ))
            }
        }
    }

    if !path.is_empty() {
        return Err("note entry ends with unclosed elements".into());
    }

    Ok(note)
}

fn parent(path: &[Vec<u8>]) -> Option<&[u8]> {
    path.last().map(Vec::as_slice)
}

impl RawNote {
    fn push_text(&mut self, path: &[Vec<u8>], text: &str) {
        let Some((leaf, ancestors)) = path.split_last() else {
            return;
        };
        let in_resource = ancestors.iter().any(|a| a == b"resource");

        let field = match (leaf.as_slice(), in_resource) {
            (b"title", false) => &mut self.title,
            (b"content", false) => &mut self.content,
            (b"created", false) => &mut self.created,
            (b"updated", false) => &mut self.updated,
            (b"tag", false) => match self.tags.last_mut() {
                Some(tag) => tag,
                None => return,
            },
            (b"data", true) => match self.resources.last_mut() {
                Some(r) => &mut r.data,
                None => return,
            },
            (b"mime", true) => match self.resources.last_mut() {
                Some(r) => &mut r.mime,
                None => return,
            },
            (b"file-name", true) => match self.resources.last_mut() {
                Some(r) => &mut r.file_name,
                None => return,
            },
            _ => return,
        };
        field.push_str(text);
    }
}

/// Decodes one resource into the staging area. Returns the attachment and
/// the MD5 hex digest `en-media` elements refer to it by.
fn stage_resource(
    source: &str,
    index: usize,
    resource: &RawResource,
    staging: &StagingArea,
) -> Result<(AttachmentRef, String), ImportError> {
    let encoded: String = resource
        .data
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let bytes = STANDARD.decode(encoded.as_bytes()).map_err(|e| {
        ImportError::parse(source, format!("resource {index} has invalid base64 data: {e}"))
    })?;

    let mime_type = match resource.mime.trim() {
        "" => "application/octet-stream".to_string(),
        mime => mime.to_string(),
    };
    let suggested_filename = match resource.file_name.trim() {
        "" => {
            let ext = mime_guess::get_mime_extensions_str(&mime_type)
                .and_then(|exts| exts.first())
                .copied()
                .unwrap_or("bin");
            format!("attachment-{index}.{ext}")
        }
        name => name.to_string(),
    };

    let hash = format!("{:x}", md5::compute(&bytes));
    let source_path = staging.stage(&suggested_filename, &bytes).map_err(|e| {
        ImportError::new(
            source,
            format!("failed to stage resource {index}: {e}"),
            ImportErrorCode::IoError,
        )
    })?;

    Ok((
        AttachmentRef {
            source_path,
            suggested_filename,
            mime_type,
            size_bytes: bytes.len() as u64,
        },
        hash,
    ))
}

/// ENEX timestamps look like `20231015T123045Z`.
fn parse_enex_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), ENEX_DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn note_xml(title: &str, body: &str) -> String {
        format!(
            "<note><title>{title}</title><content><![CDATA[<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <!DOCTYPE en-note SYSTEM \"http://xml.evernote.com/pub/enml2.dtd\">\
             <en-note><div>{body}</div></en-note>]]></content>\
             <created>20231015T123045Z</created><tag>work</tag><tag>ideas</tag></note>"
        )
    }

    fn archive(notes: &[String]) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <!DOCTYPE en-export SYSTEM \"http://xml.evernote.com/pub/evernote-export3.dtd\">\n\
             <en-export export-date=\"20231020T080000Z\" application=\"Evernote\">{}</en-export>",
            notes.concat()
        )
    }

    #[test]
    fn test_parses_well_formed_notes() {
        let staging = StagingArea::new().unwrap();
        let xml = archive(&[note_xml("First", "hello"), note_xml("Second", "world")]);

        let entries = parse_enex("export.enex", xml.as_bytes(), &staging).unwrap();
        assert_eq!(entries.len(), 2);

        let first = entries[0].as_ref().unwrap();
        assert_eq!(first.title, "First");
        assert_eq!(first.body, "hello\n");
        assert_eq!(
            first.created_at,
            Some(Utc.with_ymd_and_hms(2023, 10, 15, 12, 30, 45).unwrap())
        );
        assert!(first.tags.contains("work") && first.tags.contains("ideas"));
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let staging = StagingArea::new().unwrap();
        let xml = archive(&["<note><title>  </title><unknown>x</unknown></note>".to_string()]);

        let before = Utc::now();
        let entries = parse_enex("e.enex", xml.as_bytes(), &staging).unwrap();
        let note = entries[0].as_ref().unwrap();

        assert_eq!(note.title, "Untitled");
        assert_eq!(note.body, "");
        assert!(note.tags.is_empty());
        assert!(note.created_at.unwrap() >= before);
        assert!(note.updated_at.unwrap() >= before);
    }

    #[test]
    fn test_one_malformed_entry_does_not_poison_siblings() {
        let staging = StagingArea::new().unwrap();
        let broken = "<note><title>Broken</title><content><![CDATA[<en-note><div>unclosed</en-note>]]></content></note>".to_string();
        let xml = archive(&[note_xml("A", "a"), broken, note_xml("C", "c")]);

        let entries = parse_enex("e.enex", xml.as_bytes(), &staging).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_ok());
        assert!(entries[2].is_ok());

        let err = entries[1].as_ref().unwrap_err();
        assert_eq!(err.source, "e.enex (note 2)");
        assert_eq!(err.code, ImportErrorCode::ParseError);
    }

    #[test]
    fn test_unterminated_cdata_does_not_swallow_next_entry() {
        let staging = StagingArea::new().unwrap();
        let broken =
            "<note><title>Broken</title><content><![CDATA[<en-note>never closed</content></note>"
                .to_string();
        let xml = archive(&[
            note_xml("A", "a"),
            broken,
            note_xml("C", "c"),
            note_xml("D", "d"),
        ]);

        let entries = parse_enex("e.enex", xml.as_bytes(), &staging).unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].as_ref().unwrap().title, "A");
        assert!(entries[1]
            .as_ref()
            .unwrap_err()
            .message
            .contains("unterminated CDATA"));
        assert_eq!(entries[2].as_ref().unwrap().title, "C");
        assert_eq!(entries[3].as_ref().unwrap().title, "D");
    }

    #[test]
    fn test_unterminated_cdata_in_last_entry() {
        let staging = StagingArea::new().unwrap();
        let broken = "<note><title>Last</title><content><![CDATA[oops</content></note>".to_string();
        let xml = archive(&[note_xml("A", "a"), broken]);

        let entries = parse_enex("e.enex", xml.as_bytes(), &staging).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_ok());
        assert_eq!(entries[1].as_ref().unwrap_err().source, "e.enex (note 2)");
    }

    #[test]
    fn test_malformed_outer_xml_scoped_to_entry() {
        let staging = StagingArea::new().unwrap();
        let broken = "<note><title>Bad</titel></note>".to_string();
        let xml = archive(&[broken, note_xml("Good", "ok")]);

        let entries = parse_enex("e.enex", xml.as_bytes(), &staging).unwrap();
        assert!(entries[0].is_err());
        assert_eq!(entries[1].as_ref().unwrap().title, "Good");
    }

    #[test]
    fn test_truncated_archive_reports_last_entry() {
        let staging = StagingArea::new().unwrap();
        let xml = format!(
            "<en-export>{}<note><title>cut off",
            note_xml("Whole", "fine")
        );

        let entries = parse_enex("e.enex", xml.as_bytes(), &staging).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_ok());
        assert!(entries[1].as_ref().unwrap_err().message.contains("truncated"));
    }

    #[test]
    fn test_resources_are_staged_and_linked() {
        let staging = StagingArea::new().unwrap();
        let bytes = b"\x89PNG fake image";
        let hash = format!("{:x}", md5::compute(bytes));
        let data = STANDARD.encode(bytes);
        let note = format!(
            "<note><title>Pic</title><content><![CDATA[<en-note><div>look</div><en-media type=\"image/png\" hash=\"{hash}\"/></en-note>]]></content>\
             <resource><data encoding=\"base64\">\n{}\n{}\n</data><mime>image/png</mime>\
             <resource-attributes><file-name>cat.png</file-name></resource-attributes></resource>\
             <resource><data encoding=\"base64\">{data}</data><mime>application/pdf</mime></resource></note>",
            &data[..10],
            &data[10..]
        );
        let xml = archive(&[note]);

        let entries = parse_enex("e.enex", xml.as_bytes(), &staging).unwrap();
        let parsed = entries[0].as_ref().unwrap();

        assert_eq!(parsed.attachments.len(), 2);
        let image = &parsed.attachments[0];
        assert_eq!(image.suggested_filename, "cat.png");
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.size_bytes, bytes.len() as u64);
        assert_eq!(std::fs::read(&image.source_path).unwrap(), bytes);
        assert_eq!(parsed.attachments[1].suggested_filename, "attachment-2.pdf");
        assert_eq!(parsed.body, "look\n![cat.png](cat.png)\n");
    }

    #[test]
    fn test_bad_base64_is_entry_error() {
        let staging = StagingArea::new().unwrap();
        let note = "<note><title>X</title><resource><data>!!!not base64!!!</data></resource></note>"
            .to_string();
        let xml = archive(&[note, note_xml("Y", "y")]);

        let entries = parse_enex("e.enex", xml.as_bytes(), &staging).unwrap();
        assert!(entries[0].as_ref().unwrap_err().message.contains("base64"));
        assert!(entries[1].is_ok());
    }

    #[test]
    fn test_not_an_export() {
        let staging = StagingArea::new().unwrap();
        let err = parse_enex("x.enex", b"<html></html>", &staging).unwrap_err();
        assert_eq!(err.code, ImportErrorCode::ParseError);
        assert_eq!(err.source, "x.enex");
    }

    #[test]
    fn test_split_ignores_note_markup_inside_cdata() {
        let xml = "<en-export><note><content><![CDATA[<note>fake</note>]]></content></note><note-attributes/></en-export>";
        let entries = split_note_entries(xml);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].as_ref().unwrap().ends_with("</content></note>"));
    }

    #[test]
    fn test_parse_enex_date() {
        assert_eq!(
            parse_enex_date("20200102T030405Z"),
            Some(Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap())
        );
        assert_eq!(parse_enex_date("yesterday"), None);
    }
}
