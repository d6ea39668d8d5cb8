//! Grammar analysis over the tokenizing and pattern-matching runtime.
//!
//! A language is described twice: a [`Lexicon`] turns text into tokens,
//! and a [`Grammar`] arranges those tokens into a derivation. The
//! [`LookaheadTable`] computed from the grammar tells the [`Analyser`]
//! which production to expand for the next few upcoming tokens, and the
//! analyser drives an explicit work stack of pending expansions through
//! the token stream, backtracking and recovering where the input does not
//! cooperate.

pub mod grammar;
pub mod lookahead;
pub mod parser;

pub use grammar::{Grammar, NtHandle, Rule, RuleHandle, Symbol, Terminal};
pub use lookahead::{Choice, LookaheadTable, DEFAULT_DEPTH};
pub use parser::{Analyser, Node, ParseError};

use glot_runtime::{LexError, Lexicon, Token};

/// A complete language definition: lexicon, grammar, the lookahead table
/// computed for them, and the root nonterminal. Immutable once built and
/// shared by any number of parsing sessions.
pub struct Language {
    lexicon: Lexicon,
    grammar: Grammar,
    table: LookaheadTable,
    root: NtHandle,
}

impl Language {
    pub fn new(lexicon: Lexicon, grammar: Grammar, root: NtHandle) -> Language {
        Language::with_depth(lexicon, grammar, root, DEFAULT_DEPTH)
    }

    pub fn with_depth(
        lexicon: Lexicon,
        grammar: Grammar,
        root: NtHandle,
        depth: usize,
    ) -> Language {
        let table = LookaheadTable::compute(&grammar, root, depth);
        Language {
            lexicon,
            grammar,
            table,
            root,
        }
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn table(&self) -> &LookaheadTable {
        &self.table
    }

    pub fn root(&self) -> NtHandle {
        self.root
    }

    pub fn tokenize(&self, src: &str) -> Result<Vec<Token>, LexError> {
        self.lexicon.tokenize_all(src)
    }

    /// Tokenizes and parses `src` in one go. Skip tokens (whitespace,
    /// comments) are dropped before the analyser sees the stream.
    pub fn parse(
        &self,
        src: &str,
        errors: &mut Vec<ParseError>,
        recover: bool,
    ) -> Result<Option<Node>, LexError> {
        let tokens: Vec<Token> = self
            .tokenize(src)?
            .into_iter()
            .filter(|t| !t.is_skip())
            .collect();
        let analyser = Analyser::new(&self.grammar, &self.lexicon, &self.table);
        Ok(analyser.parse(src, &tokens, self.root, errors, recover))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glot_runtime::Pattern;

    /// Lists of comma-separated words in brackets, nested arbitrarily.
    fn list_language() -> Language {
        let mut lexicon = Lexicon::new();
        let word = lexicon.kind("word");
        let lbracket = lexicon.kind("lbracket");
        let rbracket = lexicon.kind("rbracket");
        let comma = lexicon.kind("comma");
        let ws = lexicon.kind("whitespace");
        lexicon.set_skip(ws);
        let rule = |src: &str| Pattern::compile(src).unwrap();
        lexicon.add_rule(0, word, rule("['a'-'z']+"), 0);
        lexicon.add_rule(0, lbracket, rule("'['"), 0);
        lexicon.add_rule(0, rbracket, rule("']'"), 0);
        lexicon.add_rule(0, comma, rule("','"), 0);
        lexicon.add_rule(0, ws, rule("(' '|'\\n')+"), 0);

        let mut grammar = Grammar::new();
        let list = grammar.nonterminal("list");
        let elements = grammar.nonterminal("elements");
        let rest = grammar.nonterminal("rest");
        let value = grammar.nonterminal("value");
        grammar.add_rule(
            list,
            vec![
                Symbol::Terminal(Terminal::of_kind(lbracket)),
                Symbol::Nonterminal(elements),
                Symbol::Terminal(Terminal::of_kind(rbracket)),
            ],
        );
        grammar.add_rule(
            elements,
            vec![Symbol::Nonterminal(value), Symbol::Nonterminal(rest)],
        );
        grammar.add_rule(elements, vec![]);
        grammar.add_rule(
            rest,
            vec![
                Symbol::Terminal(Terminal::of_kind(comma)),
                Symbol::Nonterminal(value),
                Symbol::Nonterminal(rest),
            ],
        );
        grammar.add_rule(rest, vec![]);
        grammar.add_rule(value, vec![Symbol::Terminal(Terminal::of_kind(word))]);
        grammar.add_rule(value, vec![Symbol::Nonterminal(list)]);

        Language::new(lexicon, grammar, list)
    }

    #[test]
    fn test_language_parse() {
        let language = list_language();
        let src = "[a, [b, c], d]";
        let mut errors = Vec::new();
        let tree = language.parse(src, &mut errors, false).unwrap().unwrap();
        assert_eq!(errors, vec![]);
        let printed = tree.display(src, language.grammar(), language.lexicon());
        assert!(printed.contains("word \"b\""));
        assert!(printed.contains("word \"d\""));
    }

    #[test]
    fn test_language_skips_whitespace() {
        let language = list_language();
        let tokens = language.tokenize("[a, b]").unwrap();
        // the raw token stream still carries the whitespace
        assert!(tokens.iter().any(|t| t.is_skip()));

        let mut errors = Vec::new();
        let tree = language.parse("[ a ,\n b ]", &mut errors, false).unwrap();
        assert!(tree.is_some());
        assert_eq!(errors, vec![]);
    }

    #[test]
    fn test_language_lex_error() {
        let language = list_language();
        let mut errors = Vec::new();
        assert!(language.parse("[a, ?]", &mut errors, true).is_err());
    }

    #[test]
    fn test_language_recovery() {
        let language = list_language();
        let src = "[a, , b]";
        let mut errors = Vec::new();
        let tree = language.parse(src, &mut errors, true).unwrap();
        assert!(tree.is_some());
        assert!(!errors.is_empty());
    }
}
