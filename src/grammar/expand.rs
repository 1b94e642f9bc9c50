// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::mem::take;
use crate::{General, Normalized};
use crate::log::{Logger, LogStatus};
use crate::naming::NameTransformer;
use super::{listflag, Expr, ExprNode, Nonterm, Origin, RuleSet, Symbol, VarId};

// ---------------------------------------------------------------------------------------------
// Term algebra

/// Concatenates the expressions into a single sequence:
/// - nested sequences are flattened one level (their children are already flat)
/// - `ε` elements are dropped
/// - a single-element result collapses to that element, an empty result to `ε`
pub fn concat(list: Vec<Expr>) -> Expr {
    let mut sub = Vec::new();
    for el in list {
        match el.node {
            ExprNode::Sequence(children) => sub.extend(children),
            ExprNode::Empty => {}
            _ => sub.push(el),
        }
    }
    match sub.len() {
        0 => Expr::empty(),
        1 => sub.remove(0),
        _ => Expr::new(ExprNode::Sequence(sub)),
    }
}

/// Concatenates every `a` with every `b`, preserving the order of `a` then `b`:
/// `[a1, a2] × [b1, b2]` gives `[a1 b1, a1 b2, a2 b1, a2 b2]`.
///
/// This is how a sequence whose parts each expand to several alternatives produces the full
/// cross-product; the result grows combinatorially with the number of ambiguous parts, which
/// is only bounded by the structure of the grammar itself.
pub fn multi_concat(a: Vec<Expr>, b: Vec<Expr>) -> Vec<Expr> {
    let mut ret = Vec::with_capacity(a.len() * b.len());
    for a in &a {
        for b in &b {
            ret.push(concat(vec![a.clone(), b.clone()]));
        }
    }
    ret
}

/// Keeps only the first `ε` alternative when there are several; all the derivation paths to
/// "nothing" are identical and must not appear as distinct alternatives. The order of the
/// other alternatives is preserved.
pub fn collapse_empty(list: Vec<Expr>) -> Vec<Expr> {
    let empties = list.iter().filter(|r| r.node == ExprNode::Empty).count();
    if empties <= 1 {
        return list;
    }
    let mut seen = false;
    list.into_iter()
        .filter(|r| {
            if r.node == ExprNode::Empty {
                if seen {
                    return false;
                }
                seen = true;
            }
            true
        })
        .collect()
}

// ---------------------------------------------------------------------------------------------
// Provisional naming

/// Produces a candidate name for a grammar expression, used to name the nonterminals
/// synthesized during expansion. Returns `""` when no unambiguous name exists.
pub fn provisional_name<T>(expr: &Expr, rules: &RuleSet<T>) -> String {
    match &expr.node {
        ExprNode::Reference(Symbol::T(id)) => rules.sym_name(&Symbol::T(*id)).to_camelcase(),
        ExprNode::Reference(Symbol::NT(id)) => rules.sym_name(&Symbol::NT(*id)),
        ExprNode::Optional(arg) => {
            let mut ret = provisional_name(arg, rules);
            if !ret.is_empty() {
                ret.push_str("opt");
            }
            ret
        }
        ExprNode::Assign { arg, .. } | ExprNode::Append { arg, .. } | ExprNode::Arrow { arg, .. } => {
            provisional_name(arg, rules)
        }
        ExprNode::List { elem, sep, flags } => {
            let mut ret = provisional_name(elem, rules);
            if ret.is_empty() {
                return ret;
            }
            ret.push_str(if flags & listflag::ONE_OR_MORE != 0 { "_list" } else { "_optlist" });
            if let Some(sep) = sep {
                let sep_name = provisional_name(sep, rules);
                if !sep_name.is_empty() {
                    ret = format!("{ret}_{sep_name}_separated");
                } else {
                    ret.push_str("_withsep");
                }
            }
            ret
        }
        ExprNode::Choice(sub) | ExprNode::Sequence(sub) => {
            // a single substantive child gives its name to the whole expression
            let mut cand = None;
            for s in sub {
                match &s.node {
                    ExprNode::Empty | ExprNode::StateMarker(_) | ExprNode::Lookahead(_) | ExprNode::Command(_) => continue,
                    _ => {}
                }
                if cand.is_some() {
                    return String::new();
                }
                cand = Some(s);
            }
            match cand {
                Some(cand) => provisional_name(cand, rules),
                None => String::new(),
            }
        }
        ExprNode::Set(_) => "setof_".to_string(),
        _ => String::new(),
    }
}

// ---------------------------------------------------------------------------------------------
// Expansion

impl RuleSet<General> {
    /// Rewrites all the rules, substituting the extended-notation clauses with equivalent
    /// context-free production forms. After this pass, every nonterminal is a choice of
    /// sequences in the patterns described by [`Normalized`](crate::Normalized).
    ///
    /// Specifically, this method:
    /// - distributes nested choices, one alternative per branch
    /// - duplicates rules containing an optional clause, with and without the optional part
    /// - synthesizes nonterminals for list and set clauses, reusing an existing synthetic
    ///   nonterminal when the extracted expression is structurally identical
    /// - moves the synthesized nonterminals right after their first usage
    /// - unrolls the synthesized list nonterminals into recursive choices
    ///
    /// `Assign`, `Append`, and `Arrow` wrappers are distributed over the alternatives of
    /// their argument but otherwise left untouched.
    ///
    /// A set clause is extracted like a list but its expansion is not supported: unrolling
    /// reports it as an error in the log instead of producing a wrong rule silently.
    pub fn expand(&mut self) {
        let num_nt = self.get_num_nt();
        let mut ex = Expander {
            rules: self,
            curr: 0,
            extra: 0,
            perm: vec![0; num_nt],
            names: HashMap::new(),
        };
        for var in 0..num_nt {
            ex.curr = var as VarId;
            ex.perm[var] = (var + ex.extra) as VarId;
            let value = take(&mut ex.rules.nonterms[var].value);
            let origin = value.origin;
            let alts = match value.node {
                // expanding the branches independently preserves the precedence and binding
                // wrappers already attached per branch
                ExprNode::Choice(sub) => {
                    let mut out = Vec::new();
                    for rule in sub {
                        out.extend(ex.expand_rule(rule));
                    }
                    out
                }
                node => ex.expand_rule(Expr { node, origin }),
            };
            ex.rules.nonterms[var].value = Expr::with_origin(ExprNode::Choice(collapse_empty(alts)), origin);
        }
        let Expander { perm, .. } = ex;

        // moves the extracted nonterminals right after their first usage
        self.rearrange(&perm);

        // expands the top expressions of all the extracted nonterminals
        self.unroll();
    }

    /// Unrolls the placeholder values left by the extractions: an optional becomes a
    /// two-branch choice and a list becomes a recursive choice. Rules already expanded into
    /// choices are left alone.
    fn unroll(&mut self) {
        for var in 0..self.nonterms.len() {
            match &self.nonterms[var].value.node {
                ExprNode::Set(_) => {
                    let msg = format!("unroll({}): set clauses are not supported", self.nonterms[var].name);
                    self.log.add_error(msg);
                }
                ExprNode::Optional(_) | ExprNode::List { .. } => {
                    let value = take(&mut self.nonterms[var].value);
                    self.nonterms[var].value = unroll_value(var as VarId, value);
                }
                _ => {}
            }
        }
    }
}

/// Builds the recursive choice replacing the placeholder `value` of nonterminal `var`.
///
/// - `?(A)`            ->  A | ε
/// - `+(A)`            ->  Q A | A           (Q refers to `var` itself)
/// - `+(A) sep ","`    ->  Q , A | A
/// - `+rr(A) sep ","`  ->  A , Q | A
/// - `+(A | B)`        ->  Q A | Q B | A | B
///
/// At this stage every list matches at least one element: `*` lists were peeled into an
/// optional wrapping a `+` list during extraction.
fn unroll_value(var: VarId, value: Expr) -> Expr {
    let Expr { node, origin } = value;
    match node {
        ExprNode::Optional(arg) => {
            Expr::with_origin(ExprNode::Choice(vec![*arg, Expr::empty()]), origin)
        }
        ExprNode::List { elem, sep, flags } => {
            let rr = flags & listflag::RIGHT_RECURSIVE != 0;
            let mut rec = Expr::with_origin(ExprNode::Sequence(vec![Expr::reference(Symbol::NT(var))]), origin);
            if let Some(sep) = sep {
                rec = if rr { concat(vec![*sep, rec]) } else { concat(vec![rec, *sep]) };
            }
            let mut alts = Vec::new();
            let elem = *elem;
            match elem.node {
                ExprNode::Choice(sub) => {
                    if rr {
                        alts.extend(multi_concat(sub.clone(), vec![rec]));
                    } else {
                        alts.extend(multi_concat(vec![rec], sub.clone()));
                    }
                    alts.extend(sub);
                }
                node => {
                    let elem = Expr { node, origin: elem.origin };
                    if rr {
                        alts.push(concat(vec![elem.clone(), rec]));
                    } else {
                        alts.push(concat(vec![rec, elem.clone()]));
                    }
                    alts.push(elem);
                }
            }
            Expr::with_origin(ExprNode::Choice(alts), origin)
        }
        node => panic!("unroll_value: unexpected placeholder {node:?}"),
    }
}

/// Expansion context, scoped to a single [`RuleSet::expand`] invocation.
struct Expander<'a> {
    rules: &'a mut RuleSet<General>,
    /// Original nonterminal currently being expanded.
    curr: VarId,
    /// Number of nonterminals synthesized so far.
    extra: usize,
    /// Target position per nonterminal index, including the synthesized ones.
    perm: Vec<VarId>,
    /// Registered synthetic names -> index in the nonterminal list.
    names: HashMap<String, VarId>,
}

impl Expander<'_> {
    /// Returns a reference to a nonterminal whose value is `expr`: either an already
    /// registered one with a structurally identical value, or a new one appended to the
    /// rule set and scheduled to move right after its point of first use.
    ///
    /// The new nonterminal takes the provisional name of `expr` when it is free; otherwise
    /// the name gets the smallest free integer suffix, starting from `{owner}$1` when the
    /// expression has no name of its own.
    fn extract_nonterm(&mut self, expr: Expr) -> Expr {
        let mut name = provisional_name(&expr, self.rules);
        if let Some(&existing) = self.names.get(&name) {
            if self.rules.nonterms[existing as usize].value == expr {
                return Expr::reference(Symbol::NT(existing));
            }
        }

        if name.is_empty() || self.names.contains_key(&name) {
            let base = if name.is_empty() {
                format!("{}$", self.rules.nonterms[self.curr as usize].name)
            } else {
                name.clone()
            };
            let mut index = 1;
            loop {
                name = format!("{base}{index}");
                if !self.names.contains_key(&name) {
                    break;
                }
                index += 1;
            }
        }

        let var = self.rules.nonterms.len();
        assert!(var < VarId::MAX as usize);
        let var = var as VarId;
        self.names.insert(name.clone(), var);
        let origin = expr.origin;
        self.rules.nonterms.push(Nonterm { name, value: expr, origin });
        self.extra += 1;
        self.perm.push(self.curr + self.extra as VarId);
        Expr::reference(Symbol::NT(var))
    }

    /// Expands one rule into its alternatives. A precedence annotation is only meaningful at
    /// the rule level: it is expanded here and re-wrapped around each resulting alternative.
    fn expand_rule(&mut self, rule: Expr) -> Vec<Expr> {
        let Expr { node, origin } = rule;
        match node {
            ExprNode::Prec { symbol, arg } => {
                self.expand_expr(*arg)
                    .into_iter()
                    .map(|val| Expr::with_origin(ExprNode::Prec { symbol, arg: Box::new(val) }, origin))
                    .collect()
            }
            node => self.expand_expr(Expr { node, origin }),
        }
    }

    /// Expands a sub-expression into the list of its alternatives.
    fn expand_expr(&mut self, expr: Expr) -> Vec<Expr> {
        let Expr { node, origin } = expr;
        match node {
            ExprNode::Empty => vec![Expr { node: ExprNode::Empty, origin }],
            ExprNode::Optional(arg) => {
                // ?(A | B)  ->  A, B, ε
                let mut ret = self.expand_expr(*arg);
                ret.push(Expr::empty());
                ret
            }
            ExprNode::Sequence(sub) => {
                // (A | B) (C | D)  ->  A C, A D, B C, B D
                let mut ret = vec![Expr::empty()];
                for s in sub {
                    let expanded = self.expand_expr(s);
                    ret = multi_concat(ret, expanded);
                }
                ret
            }
            ExprNode::Choice(sub) => {
                // a choice never survives as the child of another choice
                let mut ret = Vec::new();
                for s in sub {
                    ret.extend(self.expand_expr(s));
                }
                ret
            }
            ExprNode::Assign { name, arg } => {
                self.rewrap(*arg, origin, |val| ExprNode::Assign { name: name.clone(), arg: Box::new(val) })
            }
            ExprNode::Append { name, arg } => {
                self.rewrap(*arg, origin, |val| ExprNode::Append { name: name.clone(), arg: Box::new(val) })
            }
            ExprNode::Arrow { name, arg } => {
                self.rewrap(*arg, origin, |val| ExprNode::Arrow { name: name.clone(), arg: Box::new(val) })
            }
            ExprNode::Set(id) => {
                // extraction only; set expansion itself is reported by the unrolling
                vec![self.extract_nonterm(Expr { node: ExprNode::Set(id), origin })]
            }
            ExprNode::List { elem, sep, flags } => {
                let mut elem_alts = self.expand_expr(*elem);
                let elem = if elem_alts.len() > 1 {
                    // we support a choice of elements
                    Expr::with_origin(ExprNode::Choice(elem_alts), origin)
                } else {
                    elem_alts.remove(0)
                };
                let sep = match sep {
                    Some(sep) => {
                        let mut sep_alts = self.expand_expr(*sep);
                        if sep_alts.len() > 1 {
                            panic!("inconsistent state: a list separator must expand to a single alternative");
                        }
                        Some(Box::new(sep_alts.remove(0)))
                    }
                    None => None,
                };
                let list = Expr::with_origin(
                    ExprNode::List { elem: Box::new(elem), sep, flags: flags | listflag::ONE_OR_MORE },
                    origin,
                );
                let mut ret = self.extract_nonterm(list);
                if flags & listflag::ONE_OR_MORE == 0 {
                    // 0..* lists: the `+` list extracted above, wrapped in an optional which
                    // is extracted in turn
                    ret = self.extract_nonterm(Expr::new(ExprNode::Optional(Box::new(ret))));
                }
                vec![ret]
            }
            // Reference, StateMarker, Command, Lookahead, and any nested Prec are already
            // canonical
            node => vec![Expr { node, origin }],
        }
    }

    /// Expands the argument of a binding wrapper and distributes the wrapper over each
    /// resulting alternative.
    fn rewrap(&mut self, arg: Expr, origin: Origin, wrap: impl Fn(Expr) -> ExprNode) -> Vec<Expr> {
        self.expand_expr(arg)
            .into_iter()
            .map(|val| Expr::with_origin(wrap(val), origin))
            .collect()
    }
}

impl From<RuleSet<General>> for RuleSet<Normalized> {
    /// Expands a `General` rule set into a `Normalized` one.
    fn from(mut rules: RuleSet<General>) -> Self {
        // We handle the errors by transmitting the log to the next construct rather than
        // returning a `Result` type. This allows to cascade the transforms without a
        // complicated error resolving system while preserving the messages.
        if rules.log.has_no_errors() {
            rules.expand();
        }
        RuleSet {
            terminals: rules.terminals,
            nonterms: rules.nonterms,
            log: rules.log,
            _phantom: PhantomData,
        }
    }
}
