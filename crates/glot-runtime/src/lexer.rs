use std::collections::HashMap;

use cranelift_entity::{entity_impl, PrimaryMap};
use thiserror::Error;

use crate::cursor::Cursor;
use crate::pattern::Pattern;
use crate::Span;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TokenKind(u32);

entity_impl! { TokenKind }

/// Tokens of this kind carry no meaning for parsing (whitespace, comments)
/// and are filtered out of the stream fed to the analyser.
pub const FLAG_SKIP: u32 = 1 << 0;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub flags: u32,
}

impl Token {
    pub fn text(self, src: &str) -> &str {
        self.span.as_str(src)
    }

    pub fn offset(self) -> u32 {
        self.span.start()
    }

    pub fn len(self) -> u32 {
        self.span.len()
    }

    pub fn is_skip(self) -> bool {
        self.flags & FLAG_SKIP != 0
    }
}

/// Resumable tokenizer state, owned by the caller and threaded through
/// successive [`Lexicon::read`] calls. A fresh cookie restarts tokenization
/// in the initial state; keeping one around allows incremental relexing.
///
/// The cookie also carries the zero-length-match loop guard: how many
/// empty tokens in a row were produced at the current offset.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Cookie {
    pub state: u32,
    zero_run: u32,
    zero_offset: u32,
}

impl Cookie {
    pub const INITIAL_STATE: u32 = 0;

    pub fn new() -> Cookie {
        Cookie {
            state: Cookie::INITIAL_STATE,
            zero_run: 0,
            zero_offset: 0,
        }
    }
}

impl Default for Cookie {
    fn default() -> Cookie {
        Cookie::new()
    }
}

/// One declarative tokenizing rule: in `from_state`, text matching
/// `pattern` produces a token of `kind` and moves the lexer to `to_state`.
pub struct TokenRule {
    pub from_state: u32,
    pub kind: TokenKind,
    pub pattern: Pattern,
    pub to_state: u32,
}

struct KindInfo {
    name: String,
    flags: u32,
}

/// Tokenizer error. Both variants are fatal for the tokenizing session;
/// the caller decides whether to abort or resynchronize.
#[derive(Clone, Debug, Error)]
pub enum LexError {
    #[error("no token rule matches at offset {offset} in state {state}")]
    NoRule { offset: u32, state: u32 },
    #[error("tokenizer makes no progress at offset {offset} in state {state}")]
    NoProgress { offset: u32, state: u32 },
}

/// An immutable set of token kinds and rules, shared read-only by any
/// number of tokenizing sessions.
///
/// Rules are tried in declaration order and the first matching pattern
/// wins, mirroring the pattern engine's own declaration-order tie-break.
pub struct Lexicon {
    kinds: PrimaryMap<TokenKind, KindInfo>,
    by_name: HashMap<String, TokenKind>,
    rules: Vec<TokenRule>,
}

impl Lexicon {
    pub fn new() -> Lexicon {
        Lexicon {
            kinds: PrimaryMap::new(),
            by_name: HashMap::new(),
            rules: Vec::new(),
        }
    }

    /// Interns a token kind by name.
    pub fn kind(&mut self, name: &str) -> TokenKind {
        if let Some(&kind) = self.by_name.get(name) {
            return kind;
        }
        let kind = self.kinds.push(KindInfo {
            name: name.to_owned(),
            flags: 0,
        });
        self.by_name.insert(name.to_owned(), kind);
        kind
    }

    pub fn kind_by_name(&self, name: &str) -> Option<TokenKind> {
        self.by_name.get(name).copied()
    }

    pub fn kind_name(&self, kind: TokenKind) -> &str {
        &self.kinds[kind].name
    }

    pub fn set_skip(&mut self, kind: TokenKind) {
        self.kinds[kind].flags |= FLAG_SKIP;
    }

    pub fn is_skip(&self, kind: TokenKind) -> bool {
        self.kinds[kind].flags & FLAG_SKIP != 0
    }

    pub fn add_rule(&mut self, from_state: u32, kind: TokenKind, pattern: Pattern, to_state: u32) {
        self.rules.push(TokenRule {
            from_state,
            kind,
            pattern,
            to_state,
        });
    }

    pub fn rules(&self) -> &[TokenRule] {
        &self.rules
    }

    /// Produces the next token at the cursor, or None at end of input.
    ///
    /// A zero-length match is only allowed when it switches the lexer
    /// state, and only so many times in a row at one offset: a run of
    /// empty tokens longer than the number of rules must have revisited
    /// a state without consuming anything, so the rule set cycles and
    /// the read reports an error instead of spinning.
    pub fn read(&self, cookie: &mut Cookie, cursor: &mut Cursor) -> Result<Option<Token>, LexError> {
        if cursor.at_end() {
            return Ok(None);
        }
        let offset = cursor.pos();
        for rule in self.rules.iter().filter(|r| r.from_state == cookie.state) {
            if let Some(text) = rule.pattern.match_prefix(cursor) {
                if text.is_empty() {
                    if rule.to_state == cookie.state {
                        return Err(LexError::NoProgress {
                            offset,
                            state: cookie.state,
                        });
                    }
                    if cookie.zero_offset != offset {
                        cookie.zero_offset = offset;
                        cookie.zero_run = 0;
                    }
                    cookie.zero_run += 1;
                    if cookie.zero_run as usize > self.rules.len() {
                        return Err(LexError::NoProgress {
                            offset,
                            state: cookie.state,
                        });
                    }
                } else {
                    cookie.zero_run = 0;
                }
                cookie.state = rule.to_state;
                return Ok(Some(Token {
                    kind: rule.kind,
                    span: cursor.span_since(offset),
                    flags: self.kinds[rule.kind].flags,
                }));
            }
        }
        Err(LexError::NoRule {
            offset,
            state: cookie.state,
        })
    }

    /// Tokenizes the whole input from a fresh cookie.
    pub fn tokenize_all(&self, src: &str) -> Result<Vec<Token>, LexError> {
        let mut cookie = Cookie::new();
        let mut cursor = Cursor::new(src);
        let mut tokens = Vec::new();
        while let Some(token) = self.read(&mut cookie, &mut cursor)? {
            tokens.push(token);
        }
        Ok(tokens)
    }
}

impl Default for Lexicon {
    fn default() -> Lexicon {
        Lexicon::new()
    }
}
