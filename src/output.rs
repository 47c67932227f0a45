//! Result types returned by the OCR entry points.

use serde::{Deserialize, Serialize};

/// Markdown extracted from one page.
///
/// `page` is 1-indexed and matches the page's position in the uploaded
/// document. A page the engine failed on is reported with empty `markdown`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    #[serde(rename = "md_content")]
    pub markdown: String,
    #[serde(rename = "page")]
    pub page_num: usize,
}

impl PageResult {
    pub fn new(page_num: usize, markdown: impl Into<String>) -> Self {
        Self {
            markdown: markdown.into(),
            page_num,
        }
    }

    /// Placeholder for a page whose engine call failed.
    pub fn failed(page_num: usize) -> Self {
        Self::new(page_num, String::new())
    }

    /// `true` when this page carries no text.
    pub fn is_empty(&self) -> bool {
        self.markdown.is_empty()
    }
}
