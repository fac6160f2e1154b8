use std::ops::Range;

/// One `${...}` match: the byte range of the whole span (including the
/// delimiters) and the trimmed expression text between them.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprSpan<'a> {
    pub range: Range<usize>,
    pub expr: &'a str,
}

/// Scan a source text for embedded `${expr}` spans.
///
/// Matches are yielded lazily, left-to-right and non-overlapping. The
/// expression body is any run of characters not containing `}` — there is
/// no nesting support, so an expression containing a literal `}` truncates
/// at that brace (a stated limitation of the format). An empty `${}` and an
/// unterminated `${...` are not matches and stay literal text.
pub fn scan(source: &str) -> Scanner<'_> {
    Scanner { source, pos: 0 }
}

pub struct Scanner<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Iterator for Scanner<'a> {
    type Item = ExprSpan<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let open = self.pos + self.source[self.pos..].find("${")?;
            let body_start = open + 2;
            let close = body_start + self.source[body_start..].find('}')?;

            if close == body_start {
                // `${}` — not a match; keep scanning after the opener
                self.pos = body_start;
                continue;
            }

            self.pos = close + 1;
            return Some(ExprSpan {
                range: open..close + 1,
                expr: self.source[body_start..close].trim(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exprs(source: &str) -> Vec<&str> {
        scan(source).map(|s| s.expr).collect()
    }

    #[test]
    fn scan_finds_spans_in_order() {
        let source = "a: ${x}; b: ${ y + 1 }; c: ${z};";
        assert_eq!(exprs(source), vec!["x", "y + 1", "z"]);
    }

    #[test]
    fn scan_reports_full_ranges() {
        let source = "width: ${count}px;";
        let spans: Vec<_> = scan(source).collect();
        assert_eq!(spans.len(), 1);
        assert_eq!(&source[spans[0].range.clone()], "${count}");
        assert_eq!(spans[0].expr, "count");
    }

    #[test]
    fn scan_no_matches() {
        assert!(exprs("body { color: red; }").is_empty());
    }

    #[test]
    fn scan_unterminated_is_literal() {
        assert!(exprs("width: ${count").is_empty());
        // A later complete span after an unterminated one: the stray `}` of
        // the source closes the first `${`, same as the original regex.
        assert_eq!(exprs("a: ${x; b: ${y}"), vec!["x; b: ${y"]);
    }

    #[test]
    fn scan_empty_span_is_literal() {
        assert_eq!(exprs("a: ${}; b: ${x}"), vec!["x"]);
    }

    #[test]
    fn scan_literal_brace_truncates() {
        // No nesting: the first `}` ends the span.
        assert_eq!(exprs("${ pick({a: 1}) }"), vec!["pick({a: 1"]);
    }

    #[test]
    fn scan_is_restartable() {
        let source = "x: ${a}; y: ${b};";
        let first: Vec<_> = scan(source).map(|s| s.range).collect();
        let second: Vec<_> = scan(source).map(|s| s.range).collect();
        assert_eq!(first, second);
    }
}
