use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use anyhow::{bail, Context, Result};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use thiserror::Error;
use tracing::debug;

const DOCUMENT_XML: &str = "word/document.xml";

#[derive(Debug, Error)]
pub enum DocxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a docx archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("malformed word/document.xml: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// Plain text (paragraphs separated by a blank line) plus an HTML rendering
/// that keeps table structure.
#[derive(Debug, Clone, Default)]
pub struct Extracted {
    pub text: String,
    pub html: Option<String>,
}

pub fn extract_docx<R: Read + Seek>(reader: R) -> Result<Extracted, DocxError> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let mut xml = String::new();
    archive.by_name(DOCUMENT_XML)?.read_to_string(&mut xml)?;
    convert_document_xml(&xml)
}

/// Stream WordprocessingML: `w:p` → paragraph, `w:t` → text run,
/// `w:tbl`/`w:tr`/`w:tc` → table markup.
pub fn convert_document_xml(xml: &str) -> Result<Extracted, DocxError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut text = String::new();
    let mut html = String::new();
    let mut para = String::new();
    let mut in_para = false;
    let mut in_run_text = false;
    // tab stop definitions live under w:pPr/w:tabs
    let mut in_ppr = false;
    let mut paragraphs = 0usize;
    let mut tables = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => {
                    in_para = true;
                    para.clear();
                }
                b"t" => in_run_text = true,
                b"pPr" => in_ppr = true,
                b"tbl" => {
                    tables += 1;
                    html.push_str("<table>");
                }
                b"tr" => html.push_str("<tr>"),
                b"tc" => html.push_str("<td>"),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" if in_para && !in_ppr => para.push('\t'),
                b"br" if in_para => para.push('\n'),
                b"p" => {
                    paragraphs += 1;
                    text.push_str("\n\n");
                }
                _ => {}
            },
            Event::Text(e) if in_run_text => {
                para.push_str(&e.unescape()?);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_run_text = false,
                b"pPr" => in_ppr = false,
                b"p" => {
                    in_para = false;
                    paragraphs += 1;
                    text.push_str(&para);
                    text.push_str("\n\n");
                    if !para.is_empty() {
                        html.push_str("<p>");
                        html.push_str(&escape(para.as_str()));
                        html.push_str("</p>");
                    }
                }
                b"tbl" => html.push_str("</table>"),
                b"tr" => html.push_str("</tr>"),
                b"tc" => html.push_str("</td>"),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    debug!("docx: {} paragraphs, {} tables", paragraphs, tables);
    Ok(Extracted {
        text,
        html: Some(html),
    })
}

/// `.docx` files are extracted; anything else is read as already-extracted
/// text, with `html` supplying the table rendering when given.
pub fn load_document(path: &Path, html: Option<&Path>) -> Result<Extracted> {
    let is_docx = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("docx"));

    let mut extracted = if is_docx {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        extract_docx(file).with_context(|| format!("Failed to extract {}", path.display()))?
    } else {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Extracted { text, html: None }
    };
    if let Some(rest) = extracted.text.strip_prefix('\u{feff}') {
        extracted.text = rest.to_string();
    }

    if let Some(html_path) = html {
        let markup = std::fs::read_to_string(html_path)
            .with_context(|| format!("Failed to read {}", html_path.display()))?;
        extracted.html = Some(markup);
    }

    if extracted.text.trim().is_empty() {
        bail!("{} appears to be empty or could not be parsed", path.display());
    }
    Ok(extracted)
}
