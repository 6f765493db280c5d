use std::io::{Cursor, Read};

use async_trait::async_trait;
use ds_core::MediaType;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::instrument;
use zip::ZipArchive;

use crate::{parse_blocking, parse_error, ExtractedText, Extractor, Result};

const DOCUMENT_PART: &str = "word/document.xml";

/// DOCX 纯文本抽取：单遍读取正文，段落之间以空行分隔，不保留分页
#[derive(Debug, Default, Clone)]
pub struct DocxExtractor;

impl DocxExtractor {
    pub fn new() -> Self {
        Self
    }

    fn extract_raw_text(data: &[u8]) -> Result<String> {
        let mut archive =
            ZipArchive::new(Cursor::new(data)).map_err(|e| parse_error("docx", e))?;

        let mut xml = String::new();
        archive
            .by_name(DOCUMENT_PART)
            .map_err(|e| parse_error("docx", format!("{}: {}", DOCUMENT_PART, e)))?
            .read_to_string(&mut xml)
            .map_err(|e| parse_error("docx", e))?;

        body_text(&xml)
    }
}

fn body_text(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text = false;
    let mut in_tab_stops = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:t" => in_text = true,
                b"w:tabs" => in_tab_stops = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:tabs" => in_tab_stops = false,
                b"w:p" => out.push_str("\n\n"),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" if !in_tab_stops => out.push('\t'),
                b"w:br" | b"w:cr" => out.push('\n'),
                b"w:p" => out.push_str("\n\n"),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(|e| parse_error("docx", e))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(parse_error(
                    "docx",
                    format!("malformed XML at {}: {}", reader.buffer_position(), e),
                ))
            }
            _ => {}
        }
    }

    Ok(out)
}

#[async_trait]
impl Extractor for DocxExtractor {
    #[instrument(skip(self, content), fields(bytes = content.len()))]
    async fn extract(&self, content: &[u8]) -> Result<ExtractedText> {
        let data = content.to_vec();
        let text = parse_blocking("docx", move || Self::extract_raw_text(&data)).await?;

        tracing::info!(chars = text.len(), "DOCX text extraction complete");
        Ok(ExtractedText {
            text,
            page_count: None,
        })
    }

    fn media_type(&self) -> MediaType {
        MediaType::Docx
    }

    fn name(&self) -> &str {
        "docx"
    }
}
