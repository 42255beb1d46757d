//! Response envelopes for the two pagination styles clients consume.

use chrono::Utc;
use serde::Serialize;

use super::Page;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub message: String,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self::with_message(data, "ok")
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Offset ("page") mode payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OffsetPageData<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> OffsetPageData<T> {
    pub fn from_page(page: Page<T>, page_no: u32, limit: u32) -> Self {
        let total = page.total.unwrap_or(page.items.len() as u64);
        let limit = limit.max(1);
        Self {
            total_pages: total.div_ceil(u64::from(limit)),
            items: page.items,
            total,
            page: page_no,
            limit,
            has_next: page.has_next,
            has_prev: page_no > 1,
        }
    }
}

/// Keyset ("cursor") mode payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPageData<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    pub has_next: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl<T> From<Page<T>> for CursorPageData<T> {
    fn from(page: Page<T>) -> Self {
        Self {
            items: page.items,
            next_cursor: page.next_cursor,
            has_next: page.has_next,
            total: page.total,
        }
    }
}
