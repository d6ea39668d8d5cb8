use crate::Span;

/// A character cursor over source text. Positions are byte offsets and
/// always sit on a character boundary. Callers save a position with
/// [`Cursor::pos`] and jump back (or forward) with [`Cursor::seek`], which
/// is how pattern matching restores the entry position on a failed match.
#[derive(Clone)]
pub struct Cursor<'a> {
    src: &'a str,
    pos: u32,
}

impl<'a> Cursor<'a> {
    pub fn new(src: &'a str) -> Cursor<'a> {
        assert!(src.len() <= u32::MAX as usize);
        Cursor { src, pos: 0 }
    }

    pub fn pos(&self) -> u32 {
        self.pos
    }

    pub fn seek(&mut self, pos: u32) {
        debug_assert!(self.src.is_char_boundary(pos as usize));
        self.pos = pos;
    }

    pub fn at_end(&self) -> bool {
        self.pos as usize == self.src.len()
    }

    pub fn source(&self) -> &'a str {
        self.src
    }

    /// The text from the current position to the end of input.
    pub fn rest(&self) -> &'a str {
        &self.src[self.pos as usize..]
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8() as u32;
        Some(c)
    }

    pub fn consume(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.next();
            true
        } else {
            false
        }
    }

    pub fn consume_while(&mut self, predicate: impl Fn(char) -> bool) -> Span {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            self.next();
        }
        self.span_since(start)
    }

    pub fn span_since(&self, start: u32) -> Span {
        Span::new(start, self.pos)
    }
}

#[test]
fn test_cursor() {
    let mut c = Cursor::new("ab\u{00e9}d");
    assert_eq!(c.peek(), Some('a'));
    assert_eq!(c.next(), Some('a'));
    assert_eq!(c.next(), Some('b'));
    let mark = c.pos();
    assert_eq!(c.next(), Some('\u{00e9}'));
    assert_eq!(c.pos(), 4);
    c.seek(mark);
    assert_eq!(c.next(), Some('\u{00e9}'));
    assert_eq!(c.next(), Some('d'));
    assert_eq!(c.next(), None);
    assert!(c.at_end());
}

#[test]
fn test_consume_while() {
    let mut c = Cursor::new("aaab");
    let span = c.consume_while(|c| c == 'a');
    assert_eq!(span.as_str(c.source()), "aaa");
    assert_eq!(c.peek(), Some('b'));
}
