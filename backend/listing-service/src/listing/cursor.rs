//! Opaque keyset cursor codec.
//!
//! A cursor is the JSON form of `{ v: <sort value>, id }`, base64url-encoded
//! without padding. Clients must treat it as opaque; only the engine mints
//! cursors. Decoding is total: anything that does not parse back into a
//! cursor yields `None` and the caller falls back to the first page.
//!
//! Float sort values must come back bit-for-bit, otherwise a keyset page can
//! repeat or skip rows; serde_json is built with `float_roundtrip` for that.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::SortValue;

/// Tokens longer than this are rejected before any decoding work.
const MAX_CURSOR_LEN: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(rename = "v")]
    pub sort_value: SortValue,
    pub id: String,
}

pub struct CursorCodec;

impl CursorCodec {
    pub fn encode(sort_value: &SortValue, id: &str) -> String {
        #[derive(Serialize)]
        struct CursorRef<'a> {
            v: &'a SortValue,
            id: &'a str,
        }

        // Non-finite floats serialise as null and therefore decode to None.
        let json = serde_json::to_vec(&CursorRef { v: sort_value, id }).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> Option<Cursor> {
        let token = token.trim();
        if token.is_empty() || token.len() > MAX_CURSOR_LEN {
            warn!(len = token.len(), "cursor rejected: empty or oversized");
            return None;
        }

        let bytes = match URL_SAFE_NO_PAD.decode(token) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "cursor rejected: invalid base64");
                return None;
            }
        };

        match serde_json::from_slice::<Cursor>(&bytes) {
            Ok(cursor) => Some(cursor),
            Err(e) => {
                warn!(error = %e, "cursor rejected: invalid payload");
                None
            }
        }
    }
}
