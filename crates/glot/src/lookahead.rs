use std::collections::BTreeSet;

use cranelift_entity::SecondaryMap;
use glot_runtime::Token;

use crate::grammar::{Grammar, NtHandle, RuleHandle, Symbol, Terminal};

pub const DEFAULT_DEPTH: usize = 2;

/// The outcome of consulting the table for one nonterminal. The two
/// non-rule outcomes are deliberately distinct: `NoMatch` means no
/// production can start with the upcoming tokens, `Ambiguous` means more
/// than one can and the configured depth cannot tell them apart.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Choice {
    Rule(RuleHandle),
    NoMatch,
    Ambiguous,
}

/// One element of a lookahead sequence. `End` marks that the whole
/// derivation from the root can end here, so any sequence containing it is
/// terminated by it.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
enum Look {
    Term(Terminal),
    End,
}

/// A set of token sequences, each at most `depth` long. A sequence shorter
/// than `depth` that does not end in `End` describes a complete derivation
/// of the symbols it was computed from and is extended by whatever follows
/// them.
type SeqSet = BTreeSet<Vec<Look>>;

/// Truncated concatenation: extends every extendable sequence of `a` with
/// every sequence of `b`, cutting at `depth`.
fn concat(a: &SeqSet, b: &SeqSet, depth: usize) -> SeqSet {
    let mut out = SeqSet::new();
    for x in a {
        if x.len() == depth || x.last() == Some(&Look::End) {
            out.insert(x.clone());
            continue;
        }
        for y in b {
            let mut z = x.clone();
            for look in y {
                if z.len() == depth {
                    break;
                }
                z.push(look.clone());
            }
            out.insert(z);
        }
    }
    out
}

/// The sequences of upcoming terminals derivable from `symbols`, given the
/// per-nonterminal sets computed so far.
fn first_of_symbols(
    symbols: &[Symbol],
    depth: usize,
    first: &SecondaryMap<NtHandle, SeqSet>,
) -> SeqSet {
    let mut seqs = SeqSet::from([Vec::new()]);
    for sym in symbols {
        if seqs.iter().all(|s| s.len() == depth) {
            break;
        }
        let sym_set = match sym {
            Symbol::Terminal(term) => SeqSet::from([vec![Look::Term(term.clone())]]),
            Symbol::Nonterminal(nt) => first[*nt].clone(),
        };
        seqs = concat(&seqs, &sym_set, depth);
    }
    seqs
}

fn compute_first(grammar: &Grammar, depth: usize) -> SecondaryMap<NtHandle, SeqSet> {
    let mut first: SecondaryMap<NtHandle, SeqSet> = SecondaryMap::new();
    loop {
        let mut changed = false;
        for (_, rule) in grammar.rules() {
            let contribution = first_of_symbols(&rule.rhs, depth, &first);
            let set = &mut first[rule.lhs];
            for seq in contribution {
                changed |= set.insert(seq);
            }
        }
        if !changed {
            return first;
        }
    }
}

fn compute_follow(
    grammar: &Grammar,
    root: NtHandle,
    depth: usize,
    first: &SecondaryMap<NtHandle, SeqSet>,
) -> SecondaryMap<NtHandle, SeqSet> {
    let mut follow: SecondaryMap<NtHandle, SeqSet> = SecondaryMap::new();
    follow[root].insert(vec![Look::End]);
    loop {
        let mut changed = false;
        for (_, rule) in grammar.rules() {
            for (i, sym) in rule.rhs.iter().enumerate() {
                let Symbol::Nonterminal(nt) = sym else {
                    continue;
                };
                let tail = first_of_symbols(&rule.rhs[i + 1..], depth, first);
                let lhs_follow = follow[rule.lhs].clone();
                let contribution = concat(&tail, &lhs_follow, depth);
                let set = &mut follow[*nt];
                for seq in contribution {
                    changed |= set.insert(seq);
                }
            }
        }
        if !changed {
            return follow;
        }
    }
}

/// Checks one lookahead sequence against the upcoming tokens. `window`
/// holds at most `depth` tokens; a short window means the input ends
/// there. An `End` element accepts anything: the derivation can end here,
/// and leftover input is the analyser's trailing-input report, not a
/// reason to reject the production.
fn seq_matches(seq: &[Look], window: &[Token], src: &str) -> bool {
    for (i, look) in seq.iter().enumerate() {
        match (look, window.get(i)) {
            (Look::Term(term), Some(token)) => {
                if !term.accepts(token, src) {
                    return false;
                }
            }
            (Look::Term(_), None) => return false,
            (Look::End, _) => return true,
        }
    }
    true
}

/// Per-production lookahead sets of depth `depth`, computed once per
/// grammar as the k-truncated FIRST of the production's right-hand side
/// extended by the k-truncated FOLLOW of its left-hand side.
pub struct LookaheadTable {
    depth: usize,
    rule_lookahead: SecondaryMap<RuleHandle, SeqSet>,
}

impl LookaheadTable {
    pub fn compute(grammar: &Grammar, root: NtHandle, depth: usize) -> LookaheadTable {
        assert!(depth >= 1);
        let first = compute_first(grammar, depth);
        let follow = compute_follow(grammar, root, depth, &first);
        let mut rule_lookahead: SecondaryMap<RuleHandle, SeqSet> = SecondaryMap::new();
        for (handle, rule) in grammar.rules() {
            let rhs_first = first_of_symbols(&rule.rhs, depth, &first);
            rule_lookahead[handle] = concat(&rhs_first, &follow[rule.lhs], depth);
        }
        LookaheadTable {
            depth,
            rule_lookahead,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Picks the production of `nt` selected by the upcoming tokens.
    pub fn choose(
        &self,
        grammar: &Grammar,
        nt: NtHandle,
        window: &[Token],
        src: &str,
        excluded: &[RuleHandle],
    ) -> Choice {
        let mut matched = None;
        for &rule in grammar.rules_of(nt) {
            if excluded.contains(&rule) {
                continue;
            }
            let hit = self.rule_lookahead[rule]
                .iter()
                .any(|seq| seq_matches(seq, window, src));
            if hit {
                if matched.is_some() {
                    log::trace!("ambiguous choice for {}", grammar.nt_name(nt));
                    return Choice::Ambiguous;
                }
                matched = Some(rule);
            }
        }
        match matched {
            Some(rule) => Choice::Rule(rule),
            None => Choice::NoMatch,
        }
    }

    /// The first production of `nt` whose lookahead matches, in declaration
    /// order, ignoring how many others also match. This is what the
    /// analyser opens an expansion with when [`LookaheadTable::choose`]
    /// reports an ambiguity; failed candidates land in `excluded` and the
    /// remaining ones are tried in turn.
    pub fn candidate(
        &self,
        grammar: &Grammar,
        nt: NtHandle,
        window: &[Token],
        src: &str,
        excluded: &[RuleHandle],
    ) -> Option<RuleHandle> {
        grammar.rules_of(nt).iter().copied().find(|&rule| {
            !excluded.contains(&rule)
                && self.rule_lookahead[rule]
                    .iter()
                    .any(|seq| seq_matches(seq, window, src))
        })
    }
}
