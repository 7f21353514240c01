//! Qualifying-line rule shared by dump sizing and live import progress.
//!
//! A line qualifies when it is non-empty and does not start with the marker
//! byte (by default `-`, the SQL comment dash). A trailing `\r` alone does not
//! make a line non-empty.

/// Marker used by dump files for comment and metadata lines.
pub const DEFAULT_COMMENT_MARKER: char = '-';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRule {
    marker: u8,
}

impl LineRule {
    /// Only ASCII markers are supported; anything else falls back to the default.
    pub fn new(marker: char) -> Self {
        let marker = if marker.is_ascii() && marker != '\n' {
            marker as u8
        } else {
            DEFAULT_COMMENT_MARKER as u8
        };
        Self { marker }
    }

    pub fn marker(&self) -> char {
        self.marker as char
    }

    /// Count qualifying lines in a self-contained buffer.
    pub fn count(&self, bytes: &[u8]) -> u64 {
        let mut counter = LineCounter::new(*self);
        counter.feed(bytes);
        counter.finish()
    }
}

impl Default for LineRule {
    fn default() -> Self {
        Self::new(DEFAULT_COMMENT_MARKER)
    }
}

/// Streaming counter: feed arbitrary slices, lines may span feeds.
///
/// Holds no line buffer, so a single huge line costs nothing extra.
#[derive(Debug, Clone)]
pub struct LineCounter {
    rule: LineRule,
    count: u64,
    at_line_start: bool,
    pending_cr: bool,
}

impl LineCounter {
    pub fn new(rule: LineRule) -> Self {
        Self {
            rule,
            count: 0,
            at_line_start: true,
            pending_cr: false,
        }
    }

    /// Returns the number of qualifying lines that started in `bytes`.
    pub fn feed(&mut self, bytes: &[u8]) -> u64 {
        let before = self.count;
        for &byte in bytes {
            if self.at_line_start {
                match byte {
                    b'\n' => self.pending_cr = false,
                    b'\r' => self.pending_cr = true,
                    first => {
                        if self.pending_cr || first != self.rule.marker {
                            self.count += 1;
                        }
                        self.pending_cr = false;
                        self.at_line_start = false;
                    }
                }
            } else if byte == b'\n' {
                self.at_line_start = true;
            }
        }
        self.count - before
    }

    pub fn finish(self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_empty_and_marker_lines() {
        let dump = b"-- MySQL dump\n\nCREATE TABLE a (id int);\n-- comment\nINSERT INTO a VALUES (1);\n";
        assert_eq!(LineRule::default().count(dump), 2);
    }

    #[test]
    fn counts_final_line_without_newline() {
        assert_eq!(LineRule::default().count(b"SELECT 1;\nSELECT 2;"), 2);
    }

    #[test]
    fn crlf_blank_lines_do_not_count() {
        assert_eq!(LineRule::default().count(b"a\r\n\r\n\r\nb\r\n"), 2);
    }

    #[test]
    fn dash_inside_line_still_counts() {
        assert_eq!(LineRule::default().count(b"INSERT INTO t VALUES ('a-b');\n"), 1);
    }

    #[test]
    fn line_split_across_feeds_counts_once() {
        let mut counter = LineCounter::new(LineRule::default());
        assert_eq!(counter.feed(b"INSERT INTO t VALUES "), 1);
        assert_eq!(counter.feed(b"(1),(2)"), 0);
        assert_eq!(counter.feed(b";\n-- c"), 0);
        assert_eq!(counter.feed(b"omment\nSELECT"), 1);
        assert_eq!(counter.finish(), 2);
    }

    #[test]
    fn custom_marker() {
        let rule = LineRule::new('#');
        assert_eq!(rule.count(b"# note\n-- kept\nSELECT 1;\n"), 2);
        assert_eq!(rule.marker(), '#');
    }

    #[test]
    fn streaming_matches_whole_buffer() {
        let dump = b"-- header\nCREATE TABLE t (x int);\n\nINSERT INTO t VALUES (1);\n-- end\n";
        let rule = LineRule::default();
        let mut counter = LineCounter::new(rule);
        for piece in dump.chunks(3) {
            counter.feed(piece);
        }
        assert_eq!(counter.finish(), rule.count(dump));
    }

    #[test]
    fn non_ascii_marker_falls_back_to_dash() {
        assert_eq!(LineRule::new('é').marker(), '-');
    }
}
