use async_trait::async_trait;
use ds_core::MediaType;
use lopdf::Document;
use tracing::instrument;

use crate::{parse_blocking, parse_error, ExtractedText, Extractor, Result};

/// 基于文本层的 PDF 抽取：逐页取文本，页内文本项以空格拼接，每页以换行结尾
#[derive(Debug, Default, Clone)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }

    fn extract_pages(data: &[u8]) -> Result<ExtractedText> {
        let document = Document::load_mem(data).map_err(|e| parse_error("pdf", e))?;
        Self::read_text(&document)
    }

    fn read_text(document: &Document) -> Result<ExtractedText> {
        if document.is_encrypted() {
            return Err(parse_error("pdf", "document is password-protected"));
        }

        // BTreeMap 按页码升序
        let pages = document.get_pages();
        let mut text = String::new();

        for page_number in pages.keys() {
            let raw = document
                .extract_text(&[*page_number])
                .map_err(|e| parse_error("pdf", format!("page {}: {}", page_number, e)))?;
            text.push_str(&join_text_items(&raw));
            text.push('\n');
        }

        Ok(ExtractedText {
            text,
            page_count: Some(pages.len()),
        })
    }
}

fn join_text_items(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl Extractor for PdfExtractor {
    #[instrument(skip(self, content), fields(bytes = content.len()))]
    async fn extract(&self, content: &[u8]) -> Result<ExtractedText> {
        let data = content.to_vec();
        let extracted = parse_blocking("pdf", move || Self::extract_pages(&data)).await?;

        tracing::info!(
            page_count = extracted.page_count.unwrap_or(0),
            "PDF text extraction complete"
        );
        Ok(extracted)
    }

    fn media_type(&self) -> MediaType {
        MediaType::Pdf
    }

    fn name(&self) -> &str {
        "pdf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ds_error::DsError;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    /// 构造每页若干文本块（BT/ET）的 PDF
    fn build_document(pages: &[&[&str]]) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for items in pages {
            let mut operations = Vec::new();
            for (i, item) in items.iter().enumerate() {
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
                operations.push(Operation::new(
                    "Td",
                    vec![72.into(), (720 - 20 * i as i64).into()],
                ));
                operations.push(Operation::new("Tj", vec![Object::string_literal(*item)]));
                operations.push(Operation::new("ET", vec![]));
            }
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    fn build_pdf(pages: &[&[&str]]) -> Vec<u8> {
        let mut doc = build_document(pages);
        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    fn encrypt(doc: &mut Document) {
        let encrypt_id = doc.add_object(dictionary! {
            "Filter" => "Standard",
            "V" => 1,
            "R" => 2,
            "P" => -4,
        });
        doc.trailer.set("Encrypt", encrypt_id);
    }

    #[tokio::test]
    async fn test_pages_in_order_with_space_joined_items() {
        let pdf = build_pdf(&[&["Hello", "World"], &["Second page"], &["Third"]]);
        let out = PdfExtractor::new().extract(&pdf).await.unwrap();
        assert_eq!(out.text, "Hello World\nSecond page\nThird\n");
        assert_eq!(out.page_count, Some(3));
    }

    #[tokio::test]
    async fn test_zero_page_document_yields_empty_text() {
        let pdf = build_pdf(&[]);
        let out = PdfExtractor::new().extract(&pdf).await.unwrap();
        assert_eq!(out.text, "");
        assert_eq!(out.page_count, Some(0));
    }

    #[tokio::test]
    async fn test_corrupt_pdf_is_parse_error() {
        let err = PdfExtractor::new()
            .extract(b"definitely not a pdf")
            .await
            .unwrap_err();
        match err {
            DsError::Parse { format, message } => {
                assert_eq!(format, "pdf");
                assert!(!message.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_password_protected_document_is_parse_error() {
        let mut doc = build_document(&[&["secret"]]);
        encrypt(&mut doc);

        match PdfExtractor::read_text(&doc).unwrap_err() {
            DsError::Parse { format, message } => {
                assert_eq!(format, "pdf");
                assert!(message.contains("password-protected"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_encrypted_bytes_never_yield_text() {
        let mut doc = build_document(&[&["secret"]]);
        encrypt(&mut doc);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let err = PdfExtractor::new().extract(&bytes).await.unwrap_err();
        assert!(matches!(err, DsError::Parse { ref format, .. } if format == "pdf"));
    }

    #[test]
    fn test_join_text_items() {
        assert_eq!(join_text_items("  a \n\n b\nc  \n"), "a b c");
        assert_eq!(join_text_items(""), "");
    }
}
