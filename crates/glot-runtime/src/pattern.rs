use std::borrow::Cow;
use std::fmt;

use glot_graph::{Graph, NodeHandle};
use thiserror::Error;

use crate::cursor::Cursor;

/// Malformed pattern expression, reported at compile time. Matching never
/// fails with an error.
#[derive(Clone, Debug, Error)]
#[error("pattern syntax error at offset {offset}: {message}")]
pub struct PatternError {
    pub offset: u32,
    pub message: Cow<'static, str>,
}

impl PatternError {
    fn new(offset: u32, message: impl Into<Cow<'static, str>>) -> PatternError {
        PatternError {
            offset,
            message: message.into(),
        }
    }
}

/// One automaton transition. `Char`, `Class` and `Any` consume a single
/// character; `Until` consumes everything up to and including the first
/// occurrence of its literal.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Step {
    Char(char),
    Class(CharClass),
    Any,
    Until(Box<str>),
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CharClass {
    negated: bool,
    singles: Box<[char]>,
    ranges: Box<[(char, char)]>,
}

impl CharClass {
    fn accepts(&self, c: char) -> bool {
        let inside = self.singles.contains(&c)
            || self.ranges.iter().any(|&(lo, hi)| lo <= c && c <= hi);
        inside != self.negated
    }
}

/// Parse tree of a pattern expression, before automaton construction.
enum Expr {
    Step(Step),
    Seq(Vec<Expr>),
    Alt(Vec<Expr>),
    Star(Box<Expr>),
    Plus(Box<Expr>),
    Opt(Box<Expr>),
}

/// A compiled matcher for the pattern expression language.
///
/// Syntax: `'lit'` quoted literals (with `\uXXXX` and the usual escapes),
/// `[...]` / `[^...]` character classes with `'a'-'z'` ranges, `.` any
/// character, `-'lit'` span up to and including `lit`, postfix `*` `+` `?`,
/// `|` alternation, juxtaposition for concatenation, parentheses for
/// grouping. Whitespace between elements is insignificant.
///
/// Compilation builds a transition graph with shared prefixes and
/// minimizes it; matching walks the graph depth-first, trying applicable
/// edges in declaration order and backtracking on dead ends, and returns
/// the longest accepted prefix. A compiled pattern is immutable and can
/// be shared freely.
pub struct Pattern {
    graph: Graph<Step, ()>,
    source: Box<str>,
}

impl Pattern {
    pub fn compile(expression: &str) -> Result<Pattern, PatternError> {
        let expr = parse(expression)?;
        let mut graph = Graph::new();
        let start = graph.start();
        for end in insert(&mut graph, &expr, &[start], None) {
            graph.set_end(end);
        }
        Ok(Pattern {
            graph: glot_graph::reduce(&graph),
            source: expression.into(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Matches the longest accepted prefix at the cursor position. On
    /// success the cursor advances past the match, otherwise it stays put.
    pub fn match_prefix<'a>(&self, cursor: &mut Cursor<'a>) -> Option<&'a str> {
        let start = cursor.pos();
        let end = self.walk(cursor.source(), start)?;
        cursor.seek(end);
        Some(&cursor.source()[start as usize..end as usize])
    }

    /// True when the whole text is accepted.
    pub fn fully_matches(&self, text: &str) -> bool {
        self.walk(text, 0) == Some(text.len() as u32)
    }

    /// Depth-first walk over the transition graph, exploring applicable
    /// edges in declaration order and backtracking to the next untried
    /// edge on a dead end. Every edge consumes at least one character, so
    /// the walk terminates; it returns the longest position at which an
    /// end node was reached, ties going to the path tried first.
    fn walk(&self, src: &str, from: u32) -> Option<u32> {
        let mut best: Option<u32> = None;
        // (node, position, first edge index not yet tried)
        let mut trail = vec![(self.graph.start(), from as usize, 0)];

        while let Some((node, pos, from_edge)) = trail.pop() {
            if from_edge == 0 && self.graph.is_end(node) && best.map_or(true, |b| (b as usize) < pos) {
                best = Some(pos as u32);
            }
            let rest = &src[pos..];
            for (i, edge) in self.graph.edges(node).iter().enumerate().skip(from_edge) {
                let consumed = match &edge.label {
                    Step::Char(c) => rest.starts_with(*c).then(|| c.len_utf8()),
                    Step::Class(class) => match rest.chars().next() {
                        Some(c) if class.accepts(c) => Some(c.len_utf8()),
                        _ => None,
                    },
                    Step::Any => rest.chars().next().map(char::len_utf8),
                    Step::Until(lit) => rest.find(&**lit).map(|i| i + lit.len()),
                };
                if let Some(len) = consumed {
                    trail.push((node, pos, i + 1));
                    trail.push((edge.to, pos + len, 0));
                    break;
                }
            }
        }
        best
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

/// Threads `expr` into the graph starting from every node in `froms`,
/// reusing existing equally-labeled edges so alternatives share prefixes.
/// Returns the nodes reached after `expr`. When `tail` is given, freshly
/// created final transitions are directed at it; repetition uses this to
/// tie loops back onto themselves.
fn insert(
    graph: &mut Graph<Step, ()>,
    expr: &Expr,
    froms: &[NodeHandle],
    tail: Option<NodeHandle>,
) -> Vec<NodeHandle> {
    match expr {
        Expr::Step(step) => {
            let mut ends = Vec::new();
            let mut shared = tail;
            for &from in froms {
                let to = match graph.edge_target(from, step) {
                    Some(existing) => existing,
                    None => {
                        let to = *shared.get_or_insert_with(|| graph.add_node());
                        graph.add_edge(from, step.clone(), to);
                        to
                    }
                };
                push_unique(&mut ends, to);
            }
            ends
        }
        Expr::Seq(items) => {
            let mut current = froms.to_vec();
            for (i, item) in items.iter().enumerate() {
                let item_tail = if i + 1 == items.len() { tail } else { None };
                current = insert(graph, item, &current, item_tail);
            }
            current
        }
        Expr::Alt(branches) => {
            let mut ends = Vec::new();
            for branch in branches {
                for end in insert(graph, branch, froms, tail) {
                    push_unique(&mut ends, end);
                }
            }
            ends
        }
        Expr::Star(inner) => {
            let mids = insert(graph, inner, froms, None);
            for &mid in &mids {
                insert(graph, inner, &[mid], Some(mid));
            }
            let mut ends = froms.to_vec();
            for mid in mids {
                push_unique(&mut ends, mid);
            }
            ends
        }
        Expr::Plus(inner) => {
            let mids = insert(graph, inner, froms, None);
            for &mid in &mids {
                insert(graph, inner, &[mid], Some(mid));
            }
            mids
        }
        Expr::Opt(inner) => {
            let mut ends = froms.to_vec();
            for end in insert(graph, inner, froms, tail) {
                push_unique(&mut ends, end);
            }
            ends
        }
    }
}

fn push_unique(nodes: &mut Vec<NodeHandle>, node: NodeHandle) {
    if !nodes.contains(&node) {
        nodes.push(node);
    }
}

fn parse(src: &str) -> Result<Expr, PatternError> {
    let mut cursor = Cursor::new(src);
    let expr = parse_alt(&mut cursor)?;
    skip_ws(&mut cursor);
    match cursor.peek() {
        None => Ok(expr),
        Some(c) => Err(PatternError::new(
            cursor.pos(),
            format!("unexpected {c:?}"),
        )),
    }
}

fn skip_ws(cursor: &mut Cursor) {
    cursor.consume_while(char::is_whitespace);
}

fn parse_alt(cursor: &mut Cursor) -> Result<Expr, PatternError> {
    let mut branches = vec![parse_seq(cursor)?];
    loop {
        skip_ws(cursor);
        if !cursor.consume('|') {
            break;
        }
        branches.push(parse_seq(cursor)?);
    }
    if branches.len() == 1 {
        Ok(branches.pop().unwrap())
    } else {
        Ok(Expr::Alt(branches))
    }
}

fn parse_seq(cursor: &mut Cursor) -> Result<Expr, PatternError> {
    let mut items = Vec::new();
    loop {
        skip_ws(cursor);
        match cursor.peek() {
            None | Some(')') | Some('|') => break,
            Some('-') => {
                cursor.next();
                skip_ws(cursor);
                let offset = cursor.pos();
                let literal = parse_literal(cursor)?;
                if literal.is_empty() {
                    return Err(PatternError::new(offset, "empty span-until literal"));
                }
                items.push(Expr::Step(Step::Until(literal.into_boxed_str())));
            }
            Some(_) => items.push(parse_postfix(cursor)?),
        }
    }
    if items.len() == 1 {
        Ok(items.pop().unwrap())
    } else {
        Ok(Expr::Seq(items))
    }
}

fn parse_postfix(cursor: &mut Cursor) -> Result<Expr, PatternError> {
    let mut expr = parse_atom(cursor)?;
    loop {
        skip_ws(cursor);
        match cursor.peek() {
            Some('*') => expr = Expr::Star(Box::new(expr)),
            Some('+') => expr = Expr::Plus(Box::new(expr)),
            Some('?') => expr = Expr::Opt(Box::new(expr)),
            _ => break,
        }
        cursor.next();
    }
    Ok(expr)
}

fn parse_atom(cursor: &mut Cursor) -> Result<Expr, PatternError> {
    let offset = cursor.pos();
    match cursor.peek() {
        Some('\'') => {
            let literal = parse_literal(cursor)?;
            let mut chars: Vec<Expr> = literal
                .chars()
                .map(|c| Expr::Step(Step::Char(c)))
                .collect();
            if chars.len() == 1 {
                Ok(chars.pop().unwrap())
            } else {
                Ok(Expr::Seq(chars))
            }
        }
        Some('[') => parse_class(cursor),
        Some('.') => {
            cursor.next();
            Ok(Expr::Step(Step::Any))
        }
        Some('(') => {
            cursor.next();
            let expr = parse_alt(cursor)?;
            skip_ws(cursor);
            if !cursor.consume(')') {
                return Err(PatternError::new(cursor.pos(), "expected ')'"));
            }
            Ok(expr)
        }
        Some(c) => Err(PatternError::new(offset, format!("unexpected {c:?}"))),
        None => Err(PatternError::new(offset, "unexpected end of pattern")),
    }
}

fn parse_literal(cursor: &mut Cursor) -> Result<String, PatternError> {
    let offset = cursor.pos();
    if !cursor.consume('\'') {
        return Err(PatternError::new(offset, "expected literal"));
    }
    let mut text = String::new();
    loop {
        match cursor.next() {
            None => return Err(PatternError::new(offset, "unterminated literal")),
            Some('\'') => return Ok(text),
            Some('\\') => text.push(parse_escape(cursor)?),
            Some(c) => text.push(c),
        }
    }
}

fn parse_escape(cursor: &mut Cursor) -> Result<char, PatternError> {
    let offset = cursor.pos();
    match cursor.next() {
        Some('n') => Ok('\n'),
        Some('t') => Ok('\t'),
        Some('r') => Ok('\r'),
        Some('0') => Ok('\0'),
        Some('\\') => Ok('\\'),
        Some('\'') => Ok('\''),
        Some('u') => {
            let mut value = 0u32;
            for _ in 0..4 {
                let digit = cursor
                    .next()
                    .and_then(|c| c.to_digit(16))
                    .ok_or_else(|| PatternError::new(offset, "expected four hex digits"))?;
                value = value * 16 + digit;
            }
            char::from_u32(value)
                .ok_or_else(|| PatternError::new(offset, "invalid code point"))
        }
        _ => Err(PatternError::new(offset, "invalid escape")),
    }
}

fn parse_class(cursor: &mut Cursor) -> Result<Expr, PatternError> {
    let offset = cursor.pos();
    cursor.next(); // [
    let negated = cursor.consume('^');
    let mut singles = Vec::new();
    let mut ranges = Vec::new();
    loop {
        skip_ws(cursor);
        match cursor.peek() {
            None => return Err(PatternError::new(offset, "unterminated character class")),
            Some(']') => {
                cursor.next();
                break;
            }
            Some(_) => {
                let lo = parse_class_char(cursor)?;
                skip_ws(cursor);
                if cursor.consume('-') {
                    skip_ws(cursor);
                    let hi_offset = cursor.pos();
                    let hi = parse_class_char(cursor)?;
                    if lo > hi {
                        return Err(PatternError::new(hi_offset, "range out of order"));
                    }
                    ranges.push((lo, hi));
                } else {
                    singles.push(lo);
                }
            }
        }
    }
    if singles.is_empty() && ranges.is_empty() {
        return Err(PatternError::new(offset, "empty character class"));
    }
    singles.sort_unstable();
    singles.dedup();
    ranges.sort_unstable();
    ranges.dedup();
    Ok(Expr::Step(Step::Class(CharClass {
        negated,
        singles: singles.into_boxed_slice(),
        ranges: ranges.into_boxed_slice(),
    })))
}

fn parse_class_char(cursor: &mut Cursor) -> Result<char, PatternError> {
    let offset = cursor.pos();
    let literal = parse_literal(cursor)?;
    let mut chars = literal.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(PatternError::new(offset, "expected a single character")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched(pattern: &str, input: &str) -> Option<String> {
        let pattern = Pattern::compile(pattern).unwrap();
        let mut cursor = Cursor::new(input);
        let result = pattern.match_prefix(&mut cursor).map(str::to_owned);
        match &result {
            Some(text) => assert_eq!(cursor.pos() as usize, text.len()),
            None => assert_eq!(cursor.pos(), 0),
        }
        result
    }

    #[test]
    fn test_literal() {
        assert_eq!(matched("'abc'", "abcd"), Some("abc".into()));
        assert_eq!(matched("'abc'", "abd"), None);
        assert_eq!(matched("'abc'", ""), None);
    }

    #[test]
    fn test_longest_overall_alternation() {
        // alternatives share prefixes in the transition graph, so the walk
        // is free to switch loops mid-way and take the longest prefix
        assert_eq!(matched("('ab')*|('abc')*", "ababcabd"), Some("ababc".into()));
    }

    #[test]
    fn test_alternation_empty_tie() {
        assert_eq!(matched("('ab')*|('dc')*", ""), Some("".into()));
        assert_eq!(matched("('ab')*|('dc')*", "xy"), Some("".into()));
        assert_eq!(matched("('ab')*|('dc')*", "dcdc"), Some("dcdc".into()));
    }

    #[test]
    fn test_overlapping_alternation_backtracks() {
        // both alternatives share the 'a' edge but diverge on the second
        // step; a dead end on the first-declared branch must not lose the
        // other one
        assert_eq!(matched("'a'.'x'|'ab'", "ab"), Some("ab".into()));
        assert_eq!(matched("'a'.'x'|'ab'", "azx"), Some("azx".into()));
        assert_eq!(matched("['a'-'z']'x'|'ab'", "ab"), Some("ab".into()));
        assert_eq!(matched("['a'-'z']'x'|'ab'", "zx"), Some("zx".into()));
        assert_eq!(matched("['a'-'z']'x'|'ab'", "a!"), None);
    }

    #[test]
    fn test_span_until_non_greedy() {
        assert_eq!(matched("'/*'-'*/'", "/**//"), Some("/**/".into()));
        assert_eq!(matched("'/*'-'*/'", "/* a */ b */"), Some("/* a */".into()));
        assert_eq!(matched("'/*'-'*/'", "/* open"), None);
    }

    #[test]
    fn test_repetition() {
        assert_eq!(matched("'a'*", "aaab"), Some("aaa".into()));
        assert_eq!(matched("'a'*", "b"), Some("".into()));
        assert_eq!(matched("'a'+", "aaab"), Some("aaa".into()));
        assert_eq!(matched("'a'+", "b"), None);
        assert_eq!(matched("'a'?'b'", "ab"), Some("ab".into()));
        assert_eq!(matched("'a'?'b'", "b"), Some("b".into()));
        assert_eq!(matched("('ab')+", "ababx"), Some("abab".into()));
    }

    #[test]
    fn test_classes() {
        assert_eq!(matched("['a'-'z']+", "hello World"), Some("hello".into()));
        assert_eq!(matched("['a'-'z' 'A'-'Z' '_']+", "he_World!"), Some("he_World".into()));
        assert_eq!(matched("[^'<' '&']+", "text<tag"), Some("text".into()));
        assert_eq!(matched("['0'-'9']+", "x1"), None);
    }

    #[test]
    fn test_any() {
        assert_eq!(matched(".", "xyz"), Some("x".into()));
        assert_eq!(matched(".", ""), None);
        assert_eq!(matched("'a'.'c'", "abc"), Some("abc".into()));
    }

    #[test]
    fn test_escapes() {
        assert_eq!(matched("'\\n'", "\nx"), Some("\n".into()));
        assert_eq!(matched("'\\u0041'+", "AAB"), Some("AA".into()));
        assert_eq!(matched("'don\\'t'", "don't!"), Some("don't".into()));
    }

    #[test]
    fn test_whitespace_insignificant() {
        assert_eq!(matched("'a'  'b' | 'c'", "ab"), Some("ab".into()));
        assert_eq!(matched("'a'  'b' | 'c'", "c"), Some("c".into()));
    }

    #[test]
    fn test_full_match_round_trip() {
        for (pattern, input) in [
            ("('ab')*|('abc')*", "ababcabd"),
            ("['a'-'z']+", "hello World"),
            ("'/*'-'*/'", "/**//"),
            ("'a'?'b'", "b"),
        ] {
            let compiled = Pattern::compile(pattern).unwrap();
            let mut cursor = Cursor::new(input);
            if let Some(prefix) = compiled.match_prefix(&mut cursor) {
                assert!(compiled.fully_matches(prefix), "{pattern} vs {prefix:?}");
            }
        }
    }

    #[test]
    fn test_fully_matches() {
        let pattern = Pattern::compile("'a'+'b'").unwrap();
        assert!(pattern.fully_matches("aab"));
        assert!(!pattern.fully_matches("aa"));
        assert!(!pattern.fully_matches("aabx"));
    }

    #[test]
    fn test_unicode_input() {
        assert_eq!(matched("[^'x']+", "\u{00e9}\u{03b1}x"), Some("\u{00e9}\u{03b1}".into()));
    }

    #[test]
    fn test_syntax_errors() {
        for bad in ["'abc", "(", "('a'", "['a'-]", "[]", "'\\q'", "'\\u00'", "*", "['ab']"] {
            let err = Pattern::compile(bad).unwrap_err();
            let _ = err.to_string();
        }
    }

    #[test]
    fn test_compiled_graph_is_small() {
        // 'ab'|'ac' shares its first transition and merges both ends
        let pattern = Pattern::compile("'ab'|'ac'").unwrap();
        assert_eq!(pattern.graph.node_count(), 3);
    }
}
