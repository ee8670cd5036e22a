//! Cursor pagination shared by every `*/list` handler.

use fluxmcp_protocol::McpError;
use fluxmcp_protocol::types::{decode_cursor, encode_cursor};

/// Default page size when the builder does not override it.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Slice one page out of a snapshot.
///
/// Cursors are opaque to clients but are just base64 decimal start
/// indices; an undecodable cursor is an `InvalidParams` error.
pub fn paginate<T: Clone>(
    items: &[T],
    cursor: Option<&str>,
    page_size: usize,
) -> Result<(Vec<T>, Option<String>), McpError> {
    let start = match cursor {
        None => 0,
        Some(cursor) => decode_cursor(cursor)
            .ok_or_else(|| McpError::invalid_params(format!("invalid cursor {cursor:?}")))?,
    };

    let end = start.saturating_add(page_size).min(items.len());
    let page = items.get(start..end).unwrap_or_default().to_vec();
    let next = (end < items.len()).then(|| encode_cursor(end));
    Ok((page, next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pages_concatenate_to_the_full_list() {
        let items: Vec<u32> = (0..25).collect();
        let mut collected = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let (page, next) = paginate(&items, cursor.as_deref(), 10).unwrap();
            collected.extend(page);
            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        assert_eq!(collected, items);
    }

    #[test]
    fn empty_list_yields_one_empty_page() {
        let (page, next) = paginate::<u32>(&[], None, 10).unwrap();
        assert!(page.is_empty());
        assert!(next.is_none());
    }

    #[test]
    fn invalid_cursor_is_invalid_params() {
        let err = paginate(&[1, 2, 3], Some("!!bogus!!"), 10).unwrap_err();
        assert_eq!(err.code, fluxmcp_protocol::ErrorCode::InvalidParams);
    }

    #[test]
    fn cursor_past_the_end_is_an_empty_last_page() {
        let cursor = fluxmcp_protocol::types::encode_cursor(999);
        let (page, next) = paginate(&[1, 2, 3], Some(cursor.as_str()), 10).unwrap();
        assert!(page.is_empty());
        assert!(next.is_none());
    }
}
