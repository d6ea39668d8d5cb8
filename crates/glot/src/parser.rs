use std::fmt::Write;

use glot_runtime::{Lexicon, Span, Token};

use crate::grammar::{Grammar, NtHandle, RuleHandle, Symbol, Terminal};
use crate::lookahead::{Choice, LookaheadTable};

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ParseError {
    pub offset: u32,
    pub expected: String,
}

/// A syntax tree node. Leaves are tokens, interior nodes are completed
/// nonterminal expansions. An epsilon production yields an interior node
/// with no children rather than no node at all, so the tree shape always
/// mirrors the derivation.
#[derive(Clone, Debug)]
pub enum Node {
    Token(Token),
    Interior { nt: NtHandle, children: Vec<Node> },
}

impl Node {
    /// The byte range covered by the tokens under this node, if any.
    pub fn span(&self) -> Option<Span> {
        match self {
            Node::Token(token) => Some(token.span),
            Node::Interior { children, .. } => {
                let first = children.iter().find_map(Node::span)?;
                let last = children.iter().rev().find_map(Node::span)?;
                Some(Span::new(first.start(), last.end()))
            }
        }
    }

    pub fn print(
        &self,
        buf: &mut dyn Write,
        src: &str,
        grammar: &Grammar,
        lexicon: &Lexicon,
        level: usize,
    ) {
        for _ in 0..level {
            _ = buf.write_str("  ");
        }
        match self {
            Node::Token(token) => {
                _ = writeln!(buf, "{} {:?}", lexicon.kind_name(token.kind), token.text(src));
            }
            Node::Interior { nt, children } => {
                _ = writeln!(buf, "{}", grammar.nt_name(*nt));
                for child in children {
                    child.print(buf, src, grammar, lexicon, level + 1);
                }
            }
        }
    }

    pub fn display(&self, src: &str, grammar: &Grammar, lexicon: &Lexicon) -> String {
        let mut buf = String::new();
        self.print(&mut buf, src, grammar, lexicon, 0);
        buf
    }
}

struct TokenStream<'a> {
    tokens: &'a [Token],
    pos: u32,
}

impl<'a> TokenStream<'a> {
    fn new(tokens: &'a [Token]) -> TokenStream<'a> {
        TokenStream { tokens, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos as usize == self.tokens.len()
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos as usize).copied()
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    fn restore(&mut self, pos: u32) {
        self.pos = pos;
    }

    fn window(&self, depth: usize) -> &'a [Token] {
        let start = self.pos as usize;
        let end = (start + depth).min(self.tokens.len());
        &self.tokens[start..end]
    }

    /// The byte offset of the upcoming token, or the end of the source.
    fn offset(&self, src: &str) -> u32 {
        match self.peek() {
            Some(token) => token.offset(),
            None => src.len() as u32,
        }
    }
}

/// One pending expansion on the work stack: production `rule` with its
/// first `sym` symbols already turned into `children`. `excluded` holds
/// the productions of the same nonterminal that were already tried from
/// `start_pos` and failed.
struct Frame {
    rule: RuleHandle,
    sym: usize,
    start_pos: u32,
    children: Vec<Node>,
    excluded: Vec<RuleHandle>,
}

impl Frame {
    fn new(rule: RuleHandle, start_pos: u32) -> Frame {
        Frame {
            rule,
            sym: 0,
            start_pos,
            children: Vec::new(),
            excluded: Vec::new(),
        }
    }
}

/// A parsing session over one token stream. The grammar, lexicon and
/// lookahead table are shared read-only; all mutable state lives in the
/// explicit work stack inside [`Analyser::parse`], so deeply nested input
/// cannot overflow the native stack.
pub struct Analyser<'a> {
    grammar: &'a Grammar,
    lexicon: &'a Lexicon,
    table: &'a LookaheadTable,
}

impl<'a> Analyser<'a> {
    pub fn new(grammar: &'a Grammar, lexicon: &'a Lexicon, table: &'a LookaheadTable) -> Analyser<'a> {
        Analyser {
            grammar,
            lexicon,
            table,
        }
    }

    /// Parses `tokens` as one derivation of `root`.
    ///
    /// Syntax errors are appended to `errors` either way. Without
    /// `recover` the first unrecoverable error aborts with None; with
    /// `recover` the offending token is skipped and the current expansion
    /// restarted after it, so a tree always comes back, covering as much
    /// of the input as could be made sense of.
    pub fn parse(
        &self,
        src: &str,
        tokens: &[Token],
        root: NtHandle,
        errors: &mut Vec<ParseError>,
        recover: bool,
    ) -> Option<Node> {
        let depth = self.table.depth();
        let mut stream = TokenStream::new(tokens);
        let mut stack: Vec<Frame> = Vec::new();

        loop {
            let window = stream.window(depth);
            match self.open(root, window, src, &[]) {
                Some(rule) => {
                    stack.push(Frame::new(rule, stream.pos));
                    break;
                }
                None => {
                    self.report(errors, stream.offset(src), self.grammar.nt_name(root).to_owned());
                    if recover && stream.bump().is_some() {
                        continue;
                    }
                    return None;
                }
            }
        }

        'step: loop {
            let frame = stack.last_mut().unwrap();
            let rule = self.grammar.rule(frame.rule);

            // production complete, pop it into the parent
            if frame.sym == rule.rhs.len() {
                let done = stack.pop().unwrap();
                let node = Node::Interior {
                    nt: self.grammar.rule(done.rule).lhs,
                    children: done.children,
                };
                match stack.last_mut() {
                    Some(parent) => {
                        parent.children.push(node);
                        parent.sym += 1;
                        continue 'step;
                    }
                    None => {
                        if !stream.at_end() {
                            self.report(errors, stream.offset(src), "end of input".to_owned());
                        }
                        return Some(node);
                    }
                }
            }

            let expected = match &rule.rhs[frame.sym] {
                Symbol::Terminal(term) => {
                    if let Some(token) = stream.peek() {
                        if term.accepts(&token, src) {
                            stream.bump();
                            frame.children.push(Node::Token(token));
                            frame.sym += 1;
                            continue 'step;
                        }
                    }
                    self.describe(term)
                }
                Symbol::Nonterminal(nt) => {
                    let nt = *nt;
                    match self.open(nt, stream.window(depth), src, &[]) {
                        Some(rule) => {
                            stack.push(Frame::new(rule, stream.pos));
                            continue 'step;
                        }
                        None => self.grammar.nt_name(nt).to_owned(),
                    }
                }
            };

            let fail_pos = stream.pos;
            let fail_offset = stream.offset(src);
            'unwind: loop {
                let frame = stack.last_mut().unwrap();
                let lhs = self.grammar.rule(frame.rule).lhs;

                // backtrack to the start of this expansion and try the
                // next applicable production
                stream.restore(frame.start_pos);
                frame.excluded.push(frame.rule);
                if let Some(alt) = self.open(lhs, stream.window(depth), src, &frame.excluded) {
                    log::trace!(
                        "retrying {} with production {:?} excluded",
                        self.grammar.nt_name(lhs),
                        frame.excluded
                    );
                    frame.rule = alt;
                    frame.sym = 0;
                    frame.children.clear();
                    continue 'step;
                }

                self.report(errors, fail_offset, expected.clone());

                if recover {
                    // drop the token the expansion choked on and restart
                    // the expansion from the next one
                    stream.restore(fail_pos);
                    frame.excluded.clear();
                    while stream.bump().is_some() {
                        if let Some(rule) = self.open(lhs, stream.window(depth), src, &[]) {
                            frame.rule = rule;
                            frame.sym = 0;
                            frame.children.clear();
                            frame.start_pos = stream.pos;
                            continue 'step;
                        }
                    }
                    // out of input: close the expansion with the children
                    // it already has
                    let done = stack.pop().unwrap();
                    let node = Node::Interior {
                        nt: lhs,
                        children: done.children,
                    };
                    match stack.last_mut() {
                        Some(parent) => {
                            parent.children.push(node);
                            parent.sym += 1;
                            continue 'step;
                        }
                        None => return Some(node),
                    }
                } else {
                    stack.pop();
                    if stack.is_empty() {
                        return None;
                    }
                    continue 'unwind;
                }
            }
        }
    }

    /// The production to expand `nt` with, honoring `excluded`. A unique
    /// lookahead match is taken as-is; an ambiguous one falls back to the
    /// first candidate in declaration order and relies on backtracking to
    /// reach the others.
    fn open(
        &self,
        nt: NtHandle,
        window: &[Token],
        src: &str,
        excluded: &[RuleHandle],
    ) -> Option<RuleHandle> {
        match self.table.choose(self.grammar, nt, window, src, excluded) {
            Choice::Rule(rule) => Some(rule),
            Choice::NoMatch => None,
            Choice::Ambiguous => self.table.candidate(self.grammar, nt, window, src, excluded),
        }
    }

    fn describe(&self, term: &Terminal) -> String {
        match (&term.text, term.kind) {
            (Some(text), _) => format!("'{text}'"),
            (None, Some(kind)) => self.lexicon.kind_name(kind).to_owned(),
            (None, None) => "any token".to_owned(),
        }
    }

    fn report(&self, errors: &mut Vec<ParseError>, offset: u32, expected: String) {
        // collapse runs of identical reports from repeated retries
        if errors.last() == Some(&ParseError { offset, expected: expected.clone() }) {
            return;
        }
        log::trace!("syntax error at {offset}: expected {expected}");
        errors.push(ParseError { offset, expected });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookahead::LookaheadTable;
    use glot_runtime::{Lexicon, Pattern};

    fn lit(text: &str) -> Symbol {
        Symbol::Terminal(Terminal::literal(text))
    }

    fn significant(lexicon: &Lexicon, src: &str) -> Vec<Token> {
        lexicon
            .tokenize_all(src)
            .unwrap()
            .into_iter()
            .filter(|t| !t.is_skip())
            .collect()
    }

    /// A tiny markup language: nested elements with text between them.
    fn markup() -> (Lexicon, Grammar, NtHandle) {
        let mut lexicon = Lexicon::new();
        let open = lexicon.kind("open");
        let close = lexicon.kind("close");
        let text = lexicon.kind("text");
        let rule = |src: &str| Pattern::compile(src).unwrap();
        lexicon.add_rule(0, close, rule("'</'['a'-'z']+'>'"), 0);
        lexicon.add_rule(0, open, rule("'<'['a'-'z']+'>'"), 0);
        lexicon.add_rule(0, text, rule("[^'<']+"), 0);

        let mut grammar = Grammar::new();
        let document = grammar.nonterminal("document");
        let element = grammar.nonterminal("element");
        let content = grammar.nonterminal("content");
        let item = grammar.nonterminal("item");
        grammar.add_rule(document, vec![Symbol::Nonterminal(element)]);
        grammar.add_rule(
            element,
            vec![
                Symbol::Terminal(Terminal::of_kind(open)),
                Symbol::Nonterminal(content),
                Symbol::Terminal(Terminal::of_kind(close)),
            ],
        );
        grammar.add_rule(
            content,
            vec![Symbol::Nonterminal(item), Symbol::Nonterminal(content)],
        );
        grammar.add_rule(content, vec![]);
        grammar.add_rule(item, vec![Symbol::Terminal(Terminal::of_kind(text))]);
        grammar.add_rule(item, vec![Symbol::Nonterminal(element)]);

        (lexicon, grammar, document)
    }

    #[test]
    fn test_markup_tree() {
        let (lexicon, grammar, document) = markup();
        let table = LookaheadTable::compute(&grammar, document, 2);
        let analyser = Analyser::new(&grammar, &lexicon, &table);

        let src = "<a>hi</a>";
        let tokens = significant(&lexicon, src);
        let mut errors = Vec::new();
        let tree = analyser.parse(src, &tokens, document, &mut errors, false).unwrap();
        assert_eq!(errors, vec![]);
        assert_eq!(
            tree.display(src, &grammar, &lexicon),
            "document\n\
             \x20 element\n\
             \x20   open \"<a>\"\n\
             \x20   content\n\
             \x20     item\n\
             \x20       text \"hi\"\n\
             \x20     content\n\
             \x20   close \"</a>\"\n"
        );
        assert_eq!(tree.span(), Some(Span::new(0, src.len() as u32)));
    }

    #[test]
    fn test_markup_nested() {
        let (lexicon, grammar, document) = markup();
        let table = LookaheadTable::compute(&grammar, document, 2);
        let analyser = Analyser::new(&grammar, &lexicon, &table);

        let src = "<a>x<b>y</b>z</a>";
        let tokens = significant(&lexicon, src);
        let mut errors = Vec::new();
        let tree = analyser.parse(src, &tokens, document, &mut errors, false).unwrap();
        assert_eq!(errors, vec![]);
        let printed = tree.display(src, &grammar, &lexicon);
        assert!(printed.contains("open \"<b>\""));
        assert!(printed.contains("close \"</b>\""));
    }

    #[test]
    fn test_recovery_keeps_partial_tree() {
        let (lexicon, grammar, document) = markup();
        let table = LookaheadTable::compute(&grammar, document, 2);
        let analyser = Analyser::new(&grammar, &lexicon, &table);

        // the outer closing tag is missing
        let src = "<a>hello<b>world</b>";
        let tokens = significant(&lexicon, src);
        let mut errors = Vec::new();
        let tree = analyser
            .parse(src, &tokens, document, &mut errors, true)
            .expect("recovery must produce a tree");
        assert!(!errors.is_empty());
        let printed = tree.display(src, &grammar, &lexicon);
        assert!(printed.contains("text \"hello\""));
        assert!(printed.contains("text \"world\""));
        assert!(printed.contains("close \"</b>\""));
    }

    #[test]
    fn test_error_without_recovery() {
        let (lexicon, grammar, document) = markup();
        let table = LookaheadTable::compute(&grammar, document, 2);
        let analyser = Analyser::new(&grammar, &lexicon, &table);

        let src = "<a>hello";
        let tokens = significant(&lexicon, src);
        let mut errors = Vec::new();
        let tree = analyser.parse(src, &tokens, document, &mut errors, false);
        assert!(tree.is_none());
        assert_eq!(errors.len(), 1);
        // with the closing tag missing no production of `content` can
        // cover "hello", so the failure is reported where content starts
        assert_eq!(errors[0].offset, 3);
        assert_eq!(errors[0].expected, "content");
    }

    #[test]
    fn test_trailing_input_reported() {
        let (lexicon, grammar, document) = markup();
        let table = LookaheadTable::compute(&grammar, document, 2);
        let analyser = Analyser::new(&grammar, &lexicon, &table);

        let src = "<a></a><b></b>";
        let tokens = significant(&lexicon, src);
        let mut errors = Vec::new();
        let tree = analyser.parse(src, &tokens, document, &mut errors, false);
        assert!(tree.is_some());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].offset, 7);
        assert_eq!(errors[0].expected, "end of input");
    }

    #[test]
    fn test_backtracking_through_ambiguity() {
        // both productions look the same one token deep, so the analyser
        // opens the first and backtracks into the second when it fails
        let mut lexicon = Lexicon::new();
        let word = lexicon.kind("word");
        let ws = lexicon.kind("whitespace");
        lexicon.set_skip(ws);
        lexicon.add_rule(0, word, Pattern::compile("['a'-'z']+").unwrap(), 0);
        lexicon.add_rule(0, ws, Pattern::compile("' '+").unwrap(), 0);

        let mut grammar = Grammar::new();
        let start = grammar.nonterminal("start");
        grammar.add_rule(start, vec![lit("a"), lit("b")]);
        grammar.add_rule(start, vec![lit("a"), lit("c")]);

        let table = LookaheadTable::compute(&grammar, start, 1);
        let analyser = Analyser::new(&grammar, &lexicon, &table);

        let src = "a c";
        let tokens = significant(&lexicon, src);
        let mut errors = Vec::new();
        let tree = analyser.parse(src, &tokens, start, &mut errors, false).unwrap();
        assert_eq!(errors, vec![]);
        let printed = tree.display(src, &grammar, &lexicon);
        assert!(printed.contains("word \"c\""));
    }

    #[test]
    fn test_empty_production_node() {
        let (lexicon, grammar, document) = markup();
        let table = LookaheadTable::compute(&grammar, document, 2);
        let analyser = Analyser::new(&grammar, &lexicon, &table);

        let src = "<a></a>";
        let tokens = significant(&lexicon, src);
        let mut errors = Vec::new();
        let tree = analyser.parse(src, &tokens, document, &mut errors, false).unwrap();
        assert_eq!(errors, vec![]);
        // the empty content still shows up as a node of its own
        assert_eq!(
            tree.display(src, &grammar, &lexicon),
            "document\n\
             \x20 element\n\
             \x20   open \"<a>\"\n\
             \x20   content\n\
             \x20   close \"</a>\"\n"
        );
    }

    #[test]
    fn test_no_tokens() {
        let (lexicon, grammar, document) = markup();
        let table = LookaheadTable::compute(&grammar, document, 2);
        let analyser = Analyser::new(&grammar, &lexicon, &table);

        let mut errors = Vec::new();
        let tree = analyser.parse("", &[], document, &mut errors, false);
        assert!(tree.is_none());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].expected, "document");
    }
}
