//! Minimal PDF 1.4 writer for text documents.
//!
//! Lays out a title and wrapped body lines on A4 pages. Text is encoded as
//! WinAnsi; characters outside it are written as `?`.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::infrastructure::PdfFont;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 56.0;

const TITLE_SIZE: f32 = 18.0;
const TITLE_LEADING: f32 = 24.0;
const BODY_SIZE: f32 = 11.0;
const BODY_LEADING: f32 = 15.0;
const TITLE_GAP: f32 = 10.0;

/// Average glyph width of Helvetica, in thousandths of an em.
const HELVETICA_AVG_WIDTH: f32 = 540.0;
/// Advance width declared for every glyph of an embedded font.
const EMBEDDED_WIDTH: u32 = 600;
const TAB_WIDTH: usize = 4;

/// Text to lay out.
#[derive(Debug, Clone)]
pub struct PdfContent<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Face {
    Title,
    Body,
}

#[derive(Debug, Clone)]
struct PlacedLine {
    face: Face,
    y: f32,
    text: Vec<u8>,
}

/// Render `content` to a complete PDF file.
#[must_use]
pub fn render_pdf(content: &PdfContent<'_>, font: &PdfFont) -> Vec<u8> {
    let body_width = match font {
        PdfFont::Standard { .. } => HELVETICA_AVG_WIDTH,
        PdfFont::TrueType { .. } => EMBEDDED_WIDTH as f32,
    };
    let pages = layout(content, body_width);

    let mut doc = ObjectWriter::new();
    let catalog = doc.reserve();
    let page_tree = doc.reserve();

    let body_font = match font {
        PdfFont::Standard { base_font } => doc.add(type1_font(base_font)),
        PdfFont::TrueType { name, data } => {
            let file = doc.add_stream(&format!("/Length1 {}", data.len()), data);
            let descriptor = doc.add(format!(
                "<< /Type /FontDescriptor /FontName /{name} /Flags 32 \
                 /FontBBox [-200 -250 1200 950] /ItalicAngle 0 /Ascent 900 \
                 /Descent -250 /CapHeight 700 /StemV 80 /FontFile2 {file} 0 R >>"
            ));
            let widths = vec![EMBEDDED_WIDTH.to_string(); 224].join(" ");
            doc.add(format!(
                "<< /Type /Font /Subtype /TrueType /BaseFont /{name} /FirstChar 32 \
                 /LastChar 255 /Widths [{widths}] /FontDescriptor {descriptor} 0 R \
                 /Encoding /WinAnsiEncoding >>"
            ))
        }
    };
    let title_font = doc.add(type1_font("Helvetica-Bold"));

    let mut kids = Vec::with_capacity(pages.len());
    for lines in &pages {
        let stream = content_stream(lines);
        let contents = doc.add_stream("", &stream);
        kids.push(doc.add(format!(
            "<< /Type /Page /Parent {page_tree} 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
             /Resources << /Font << /F1 {body_font} 0 R /F2 {title_font} 0 R >> >> \
             /Contents {contents} 0 R >>"
        )));
    }

    let kid_refs: Vec<String> = kids.iter().map(|id| format!("{id} 0 R")).collect();
    doc.set(
        page_tree,
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kid_refs.join(" "),
            kids.len()
        ),
    );
    doc.set(catalog, format!("<< /Type /Catalog /Pages {page_tree} 0 R >>"));

    let mut title = Vec::new();
    push_pdf_string(&mut title, content.title);
    let info = doc.add(format!(
        "<< /Title ({}) /Producer (note-porter) /ModDate (D:{}Z) >>",
        String::from_utf8_lossy(&title),
        content.modified.format("%Y%m%d%H%M%S")
    ));

    doc.finish(catalog, info)
}

fn type1_font(base_font: &str) -> String {
    format!("<< /Type /Font /Subtype /Type1 /BaseFont /{base_font} /Encoding /WinAnsiEncoding >>")
}

/// Split content into pages of positioned lines.
fn layout(content: &PdfContent<'_>, body_glyph_width: f32) -> Vec<Vec<PlacedLine>> {
    let usable = PAGE_WIDTH - 2.0 * MARGIN;
    let title_cols = columns(usable, TITLE_SIZE, HELVETICA_AVG_WIDTH + 80.0);
    let body_cols = columns(usable, BODY_SIZE, body_glyph_width);

    let mut pages = vec![Vec::new()];
    let mut y = PAGE_HEIGHT - MARGIN;

    let mut place = |face: Face, leading: f32, text: Vec<u8>, y: &mut f32| {
        if *y - leading < MARGIN {
            pages.push(Vec::new());
            *y = PAGE_HEIGHT - MARGIN;
        }
        *y -= leading;
        if let Some(page) = pages.last_mut() {
            page.push(PlacedLine { face, y: *y, text });
        }
    };

    for line in wrap(&encode_win_ansi(content.title), title_cols) {
        place(Face::Title, TITLE_LEADING, line, &mut y);
    }
    y -= TITLE_GAP;

    for source_line in content.body.lines() {
        for line in wrap(&encode_win_ansi(source_line), body_cols) {
            place(Face::Body, BODY_LEADING, line, &mut y);
        }
    }

    pages
}

fn columns(width: f32, size: f32, glyph_width: f32) -> usize {
    ((width / (size * glyph_width / 1000.0)) as usize).max(10)
}

/// Word-wrap encoded text to at most `cols` bytes per line. An empty input
/// yields one empty line so blank lines keep their space.
fn wrap(text: &[u8], cols: usize) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    let mut rest = text;

    while rest.len() > cols {
        let split = rest[..=cols]
            .iter()
            .rposition(|&b| b == b' ')
            .filter(|&pos| pos > 0)
            .unwrap_or(cols);
        lines.push(rest[..split].to_vec());
        rest = &rest[split..];
        while rest.first() == Some(&b' ') {
            rest = &rest[1..];
        }
    }
    lines.push(rest.to_vec());
    lines
}

/// Encode to WinAnsi bytes, expanding tabs.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\t' => out.extend(std::iter::repeat(b' ').take(TAB_WIDTH)),
            '\r' | '\n' => {}
            ' '..='~' => out.push(c as u8),
            '\u{a0}'..='\u{ff}' => out.push(c as u32 as u8),
            _ => out.push(win_ansi_extra(c).unwrap_or(b'?')),
        }
    }
    out
}

/// WinAnsi code points in 0x80..0x9F.
fn win_ansi_extra(c: char) -> Option<u8> {
    let byte = match c {
        '\u{20ac}' => 0x80,
        '\u{201a}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201e}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02c6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8a,
        '\u{2039}' => 0x8b,
        '\u{0152}' => 0x8c,
        '\u{017d}' => 0x8e,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201c}' => 0x93,
        '\u{201d}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02dc}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9a,
        '\u{203a}' => 0x9b,
        '\u{0153}' => 0x9c,
        '\u{017e}' => 0x9e,
        '\u{0178}' => 0x9f,
        _ => return None,
    };
    Some(byte)
}

/// Append a PDF literal string body (without parentheses). Non-ASCII bytes
/// are written as octal escapes so the output stays 7-bit.
fn push_pdf_string(out: &mut Vec<u8>, text: &str) {
    push_encoded(out, &encode_win_ansi(text));
}

fn push_encoded(out: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            }
            0x20..=0x7e => out.push(b),
            _ => out.extend_from_slice(format!("\\{b:03o}").as_bytes()),
        }
    }
}

fn content_stream(lines: &[PlacedLine]) -> Vec<u8> {
    let mut out = Vec::new();
    for line in lines {
        let (font, size) = match line.face {
            Face::Title => ("F2", TITLE_SIZE),
            Face::Body => ("F1", BODY_SIZE),
        };
        out.extend_from_slice(format!("BT /{font} {size} Tf {MARGIN} {:.2} Td (", line.y).as_bytes());
        push_encoded(&mut out, &line.text);
        out.extend_from_slice(b") Tj ET\n");
    }
    out
}

/// Numbered object table with an xref section.
struct ObjectWriter {
    objects: Vec<Vec<u8>>,
}

impl ObjectWriter {
    fn new() -> Self {
        Self {
            objects: Vec::new(),
        }
    }

    /// Allocate an object number to fill in later.
    fn reserve(&mut self) -> usize {
        self.objects.push(Vec::new());
        self.objects.len()
    }

    fn set(&mut self, id: usize, body: String) {
        if let Some(slot) = self.objects.get_mut(id - 1) {
            *slot = body.into_bytes();
        }
    }

    fn add(&mut self, body: String) -> usize {
        self.objects.push(body.into_bytes());
        self.objects.len()
    }

    fn add_stream(&mut self, extra_dict: &str, data: &[u8]) -> usize {
        let mut body = format!("<< /Length {} {extra_dict} >>\nstream\n", data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.objects.push(body);
        self.objects.len()
    }

    fn finish(self, root: usize, info: usize) -> Vec<u8> {
        let mut out: Vec<u8> = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n".to_vec();
        let mut offsets = Vec::with_capacity(self.objects.len());

        for (index, body) in self.objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n", index + 1).as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }

        let xref_offset = out.len();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", self.objects.len() + 1);
        for offset in offsets {
            let _ = writeln!(xref, "{offset:010} 00000 n ");
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {} /Root {root} 0 R /Info {info} 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
            self.objects.len() + 1
        );
        out.extend_from_slice(xref.as_bytes());
        out
    }
}
