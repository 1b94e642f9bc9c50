// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

#![cfg(test)]


use crate::expr;
use crate::General;
use crate::grammar::{listflag, Expr, ExprNode, RuleSet};

// ---------------------------------------------------------------------------------------------

/// Builds the rule set of one test grammar. The comments show the rules in source notation,
/// with `+rr` / `*rr` for right-recursive lists and `sep` for the list separator.
pub fn build_rules(id: u32) -> RuleSet<General> {
    let mut rules = RuleSet::new();
    match id {
        // 0xx = basic, sequences, choices, distribution, ?, wrappers
        // -----------------------------------------------------------------------------
        // a -> A;
        0 => {
            rules.extend_terminals(["A"]);
            rules.add_nonterm("a", expr!(t 0));
        }
        // a -> A B | C;
        1 => {
            rules.extend_terminals(["A", "B", "C"]);
            rules.add_nonterm("a", expr!(| (& (t 0), (t 1)), (t 2)));
        }
        // a -> (A | B) (C | D);
        2 => {
            rules.extend_terminals(["A", "B", "C", "D"]);
            rules.add_nonterm("a", expr!(& (| (t 0), (t 1)), (| (t 2), (t 3))));
        }
        // a -> A? B;
        3 => {
            rules.extend_terminals(["A", "B"]);
            rules.add_nonterm("a", expr!(& (? (t 0)), (t 1)));
        }
        // a -> A?;
        4 => {
            rules.extend_terminals(["A"]);
            rules.add_nonterm("a", expr!(? (t 0)));
        }
        // a -> A? | B?;
        5 => {
            rules.extend_terminals(["A", "B"]);
            rules.add_nonterm("a", expr!(| (? (t 0)), (? (t 1))));
        }
        // a -> (A | (B | C)) D;
        6 => {
            rules.extend_terminals(["A", "B", "C", "D"]);
            rules.add_nonterm("a", expr!(& (| (t 0), (| (t 1), (t 2))), (t 3)));
        }
        // a -> (A (B | C)) -> lhs;
        7 => {
            rules.extend_terminals(["A", "B", "C"]);
            rules.add_nonterm("a", expr!(arrow "lhs" (& (t 0), (| (t 1), (t 2)))));
        }
        // a -> (A | B) C %prec plus;
        8 => {
            rules.extend_terminals(["A", "B", "C", "plus"]);
            rules.add_nonterm("a", expr!(% 3, (& (| (t 0), (t 1)), (t 2))));
        }
        // a -> A %prec plus | B;
        9 => {
            rules.extend_terminals(["A", "B", "plus"]);
            rules.add_nonterm("a", expr!(| (% 2, (t 0)), (t 1)));
        }
        // a -> .greedy A {ctx.done()} (?= X & !Y);
        10 => {
            rules.extend_terminals(["A"]);
            rules.add_nonterm("a", expr!(& (st "greedy"), (t 0), (cmd "ctx.done()"), (la "X & !Y")));
        }
        // a -> A B?;
        11 => {
            rules.extend_terminals(["A", "B"]);
            rules.add_nonterm("a", expr!(& (t 0), (? (t 1))));
        }
        // a -> ε;
        12 => {
            rules.extend_terminals(["A"]);
            rules.add_nonterm("a", expr!(e));
        }
        // a -> ε A ε;
        13 => {
            rules.extend_terminals(["A"]);
            rules.add_nonterm("a", expr!(& (e), (t 0), (e)));
        }
        // a -> A x=B;
        14 => {
            rules.extend_terminals(["A", "B"]);
            rules.add_nonterm("a", expr!(& (t 0), (= "x" (t 1))));
        }

        // 1xx = lists: recursion directions, separators, choices of elements, nesting
        // -----------------------------------------------------------------------------
        // a -> A+;
        100 => {
            rules.extend_terminals(["A"]);
            rules.add_nonterm("a", expr!(+ (t 0)));
        }
        // a -> A*;
        101 => {
            rules.extend_terminals(["A"]);
            rules.add_nonterm("a", expr!(* (t 0)));
        }
        // a -> A+rr;
        102 => {
            rules.extend_terminals(["A"]);
            rules.add_nonterm("a", Expr::list(expr!(t 0), None, listflag::ONE_OR_MORE | listflag::RIGHT_RECURSIVE));
        }
        // a -> (A sep comma)+;
        103 => {
            rules.extend_terminals(["A", "comma"]);
            rules.add_nonterm("a", expr!(+ (t 0) sep (t 1)));
        }
        // a -> (A sep comma)*rr;
        104 => {
            rules.extend_terminals(["A", "comma"]);
            rules.add_nonterm("a", Expr::list(expr!(t 0), Some(expr!(t 1)), listflag::RIGHT_RECURSIVE));
        }
        // a -> (A | B)+;
        105 => {
            rules.extend_terminals(["A", "B"]);
            rules.add_nonterm("a", expr!(+ (| (t 0), (t 1))));
        }
        // a -> (A B?)+;
        106 => {
            rules.extend_terminals(["A", "B"]);
            rules.add_nonterm("a", expr!(+ (& (t 0), (? (t 1)))));
        }
        // a -> A+ A+;
        107 => {
            rules.extend_terminals(["A"]);
            rules.add_nonterm("a", expr!(& (+ (t 0)), (+ (t 0))));
        }
        // a -> A+; b -> A+ B;
        108 => {
            rules.extend_terminals(["A", "B"]);
            rules.add_nonterm("a", expr!(+ (t 0)));
            rules.add_nonterm("b", expr!(& (+ (t 0)), (t 1)));
        }
        // a -> A+ A+rr;
        109 => {
            rules.extend_terminals(["A"]);
            let rr = Expr::list(expr!(t 0), None, listflag::ONE_OR_MORE | listflag::RIGHT_RECURSIVE);
            rules.add_nonterm("a", Expr::sequence(vec![expr!(+ (t 0)), rr]));
        }
        // a -> (A+)+;
        110 => {
            rules.extend_terminals(["A"]);
            rules.add_nonterm("a", expr!(+ (+ (t 0))));
        }
        // a -> A B* C;
        111 => {
            rules.extend_terminals(["A", "B", "C"]);
            rules.add_nonterm("a", expr!(& (t 0), (* (t 1)), (t 2)));
        }
        // a -> (x=B)+;
        112 => {
            rules.extend_terminals(["B"]);
            rules.add_nonterm("a", expr!(+ (= "x" (t 0))));
        }

        // 2xx = set clauses
        // -----------------------------------------------------------------------------
        // a -> set(#0);
        200 => {
            rules.add_nonterm("a", expr!(set 0));
        }
        // a -> set(#0) set(#0) set(#1);
        201 => {
            rules.add_nonterm("a", expr!(& (set 0), (set 0), (set 1)));
        }
        _ => panic!("unknown test grammar {id}"),
    }
    rules
}

// ---------------------------------------------------------------------------------------------

/// Checks that every rule of the set is in canonical form: a choice of alternatives, each
/// alternative being `ε`, a flat sequence of leaves, a single leaf, or such a sequence
/// wrapped in a precedence annotation, with at most one `ε` alternative per choice.
pub fn is_canonical<T>(rules: &RuleSet<T>) -> bool {
    rules.get_nonterms_iter().all(|(_, nt)| match &nt.value.node {
        ExprNode::Choice(sub) => {
            let empties = sub.iter().filter(|alt| alt.node == ExprNode::Empty).count();
            empties <= 1 && sub.iter().all(is_canonical_alt)
        }
        _ => false,
    })
}

fn is_canonical_alt(alt: &Expr) -> bool {
    match &alt.node {
        ExprNode::Empty => true,
        ExprNode::Prec { arg, .. } => is_canonical_seq(arg),
        // an arrow may wrap a whole sub-sequence when it reports several symbols
        ExprNode::Arrow { arg, .. } => is_canonical_seq(arg),
        _ => is_canonical_seq(alt),
    }
}

fn is_canonical_seq(expr: &Expr) -> bool {
    match &expr.node {
        ExprNode::Sequence(sub) => sub.iter().all(is_canonical_leaf),
        _ => is_canonical_leaf(expr),
    }
}

// binding wrappers around a reference are left untouched by the expansion and may appear
// wherever a reference may
fn is_canonical_leaf(expr: &Expr) -> bool {
    match &expr.node {
        ExprNode::Reference(_) | ExprNode::StateMarker(_) | ExprNode::Command(_) | ExprNode::Lookahead(_) => true,
        ExprNode::Assign { arg, .. } | ExprNode::Append { arg, .. } | ExprNode::Arrow { arg, .. } => is_canonical_leaf(arg),
        _ => false,
    }
}
