use crate::error::ExtractError;
use lopdf::Document;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Turns a file into plain text. Any failure collapses to `None`.
pub trait TextExtractor {
    fn extract(&self, path: &Path) -> Option<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl LopdfExtractor {
    pub fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, ExtractError> {
        let document =
            Document::load(path).map_err(|error| ExtractError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                Err(error) => {
                    warn!(path = %path.display(), page = page_no, %error, "skipping unreadable page");
                    continue;
                }
            };

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        if pages.is_empty() {
            return Err(ExtractError::NoText(path.to_path_buf()));
        }

        Ok(pages)
    }
}

impl TextExtractor for LopdfExtractor {
    fn extract(&self, path: &Path) -> Option<String> {
        match self.extract_pages(path) {
            Ok(pages) => Some(join_pages(&pages)),
            Err(error) => {
                warn!(path = %path.display(), %error, "text extraction failed");
                None
            }
        }
    }
}

pub fn join_pages(pages: &[PageText]) -> String {
    pages
        .iter()
        .map(|page| format!("[Page {}]\n{}", page.number, page.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
