//! Response header building.

use std::fmt;

/// `Content-Range` header value for a collection response, computed from the
/// requested offset/limit and the number of rows returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentRange {
    /// Start of range (0-based)
    pub start: i64,
    /// End of range (inclusive)
    pub end: i64,
    /// Total count (or None if unknown, rendered as `*`)
    pub total: Option<i64>,
}

impl ContentRange {
    pub fn new(start: i64, end: i64, total: Option<i64>) -> Self {
        Self { start, end, total }
    }

    /// Build from the request's offset/limit and the number of rows actually
    /// returned. An empty result renders as `*/total` per RFC 7233.
    pub fn from_page(offset: i64, row_count: i64, total: Option<i64>) -> Self {
        if row_count == 0 {
            return Self { start: offset, end: offset - 1, total };
        }
        Self {
            start: offset,
            end: offset + row_count - 1,
            total,
        }
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.end < self.start {
            return match self.total {
                Some(total) => write!(f, "*/{total}"),
                None => write!(f, "*/*"),
            };
        }
        match self.total {
            Some(total) => write!(f, "{}-{}/{}", self.start, self.end, total),
            None => write!(f, "{}-{}/*", self.start, self.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_range_display() {
        let range = ContentRange::new(0, 9, Some(100));
        assert_eq!(range.to_string(), "0-9/100");

        let range = ContentRange::new(10, 19, None);
        assert_eq!(range.to_string(), "10-19/*");
    }

    #[test]
    fn test_content_range_from_page() {
        let range = ContentRange::from_page(0, 10, Some(100));
        assert_eq!(range.start, 0);
        assert_eq!(range.end, 9);

        let range = ContentRange::from_page(90, 5, Some(95));
        assert_eq!(range.start, 90);
        assert_eq!(range.end, 94);
    }

    #[test]
    fn test_content_range_empty_page() {
        let range = ContentRange::from_page(10, 0, Some(10));
        assert_eq!(range.to_string(), "*/10");
    }
}
