pub mod cursor;
pub mod lexer;
pub mod pattern;

pub use cursor::Cursor;
pub use lexer::{Cookie, LexError, Lexicon, Token, TokenKind, TokenRule};
pub use pattern::{Pattern, PatternError};

use std::fmt::Display;

/// A byte range into the source text.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Span {
    start: u32,
    end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Span {
        debug_assert!(start <= end);
        Span { start, end }
    }

    pub fn empty_at(pos: u32) -> Span {
        Span {
            start: pos,
            end: pos,
        }
    }

    pub fn start(self) -> u32 {
        self.start
    }

    pub fn end(self) -> u32 {
        self.end
    }

    pub fn len(self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(self) -> bool {
        self.start == self.end
    }

    #[track_caller]
    pub fn as_str(self, src: &str) -> &str {
        &src[self.start as usize..self.end as usize]
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[test]
fn test_span() {
    let span = Span::new(2, 5);
    assert_eq!(span.len(), 3);
    assert_eq!(span.as_str("abcdef"), "cde");
    assert!(Span::empty_at(4).is_empty());
}
