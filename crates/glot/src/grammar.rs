use std::collections::HashMap;

use cranelift_entity::{entity_impl, PrimaryMap};
use glot_runtime::{Token, TokenKind};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NtHandle(u32);

entity_impl! { NtHandle }

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct RuleHandle(u32);

entity_impl! { RuleHandle }

/// A terminal constrains the token at the head of the stream. Either side
/// may be left open: a kind-only terminal accepts any token of that kind,
/// a text-only terminal accepts any token kind with exactly that text, and
/// a terminal with both set requires both to agree.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Terminal {
    pub kind: Option<TokenKind>,
    pub text: Option<Box<str>>,
}

impl Terminal {
    pub fn of_kind(kind: TokenKind) -> Terminal {
        Terminal {
            kind: Some(kind),
            text: None,
        }
    }

    pub fn literal(text: &str) -> Terminal {
        Terminal {
            kind: None,
            text: Some(text.into()),
        }
    }

    pub fn exact(kind: TokenKind, text: &str) -> Terminal {
        Terminal {
            kind: Some(kind),
            text: Some(text.into()),
        }
    }

    pub fn accepts(&self, token: &Token, src: &str) -> bool {
        if let Some(kind) = self.kind {
            if kind != token.kind {
                return false;
            }
        }
        if let Some(text) = &self.text {
            if token.text(src) != &**text {
                return false;
            }
        }
        true
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Symbol {
    Terminal(Terminal),
    Nonterminal(NtHandle),
}

/// One production. An empty `rhs` is an epsilon production.
#[derive(Clone, Debug)]
pub struct Rule {
    pub lhs: NtHandle,
    pub rhs: Vec<Symbol>,
}

struct NtInfo {
    name: String,
    rules: Vec<RuleHandle>,
}

/// An immutable set of productions once built, shared read-only by any
/// number of analyser sessions. Productions of a nonterminal keep their
/// declaration order, which is the tie-break order everywhere a choice
/// between them has to be made.
pub struct Grammar {
    nonterminals: PrimaryMap<NtHandle, NtInfo>,
    by_name: HashMap<String, NtHandle>,
    rules: PrimaryMap<RuleHandle, Rule>,
}

impl Grammar {
    pub fn new() -> Grammar {
        Grammar {
            nonterminals: PrimaryMap::new(),
            by_name: HashMap::new(),
            rules: PrimaryMap::new(),
        }
    }

    /// Interns a nonterminal by name.
    pub fn nonterminal(&mut self, name: &str) -> NtHandle {
        if let Some(&nt) = self.by_name.get(name) {
            return nt;
        }
        let nt = self.nonterminals.push(NtInfo {
            name: name.to_owned(),
            rules: Vec::new(),
        });
        self.by_name.insert(name.to_owned(), nt);
        nt
    }

    pub fn nt_by_name(&self, name: &str) -> Option<NtHandle> {
        self.by_name.get(name).copied()
    }

    pub fn nt_name(&self, nt: NtHandle) -> &str {
        &self.nonterminals[nt].name
    }

    pub fn add_rule(&mut self, lhs: NtHandle, rhs: Vec<Symbol>) -> RuleHandle {
        let handle = self.rules.push(Rule { lhs, rhs });
        self.nonterminals[lhs].rules.push(handle);
        handle
    }

    /// The productions of a nonterminal, in declaration order.
    pub fn rules_of(&self, nt: NtHandle) -> &[RuleHandle] {
        &self.nonterminals[nt].rules
    }

    pub fn rule(&self, handle: RuleHandle) -> &Rule {
        &self.rules[handle]
    }

    pub fn rules(&self) -> impl Iterator<Item = (RuleHandle, &Rule)> {
        self.rules.iter()
    }
}

impl Default for Grammar {
    fn default() -> Grammar {
        Grammar::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glot_runtime::{Lexicon, Pattern};

    #[test]
    fn test_intern() {
        let mut grammar = Grammar::new();
        let a = grammar.nonterminal("expr");
        let b = grammar.nonterminal("expr");
        assert_eq!(a, b);
        assert_eq!(grammar.nt_name(a), "expr");
        assert_eq!(grammar.nt_by_name("expr"), Some(a));
        assert_eq!(grammar.nt_by_name("missing"), None);
    }

    #[test]
    fn test_rule_order() {
        let mut grammar = Grammar::new();
        let expr = grammar.nonterminal("expr");
        let first = grammar.add_rule(expr, vec![Symbol::Terminal(Terminal::literal("a"))]);
        let second = grammar.add_rule(expr, vec![]);
        assert_eq!(grammar.rules_of(expr), &[first, second]);
        assert!(grammar.rule(second).rhs.is_empty());
    }

    #[test]
    fn test_terminal_accepts() {
        let mut lexicon = Lexicon::new();
        let word = lexicon.kind("word");
        lexicon.add_rule(0, word, Pattern::compile("['a'-'z']+").unwrap(), 0);
        let src = "if";
        let token = lexicon.tokenize_all(src).unwrap()[0];

        assert!(Terminal::of_kind(word).accepts(&token, src));
        assert!(Terminal::literal("if").accepts(&token, src));
        assert!(Terminal::exact(word, "if").accepts(&token, src));
        assert!(!Terminal::literal("else").accepts(&token, src));

        let other = lexicon.kind("other");
        assert!(!Terminal::of_kind(other).accepts(&token, src));
    }
}
