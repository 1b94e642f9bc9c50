// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

pub(crate) mod tests;

pub mod expand;

use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::mem::take;
use iter_index::IndexerIterator;
use crate::{CollectJoin, General};
use crate::log::BufLog;

pub type TokenId = u16;
pub type VarId = u16;

// ---------------------------------------------------------------------------------------------

/// Reference to a symbol of the grammar: either a terminal (a token) or a nonterminal.
#[derive(Clone, Copy, PartialEq, PartialOrd, Eq, Ord, Debug, Hash)]
pub enum Symbol {
    T(TokenId),         // terminal
    NT(VarId),          // non-terminal
}

impl Symbol {
    pub fn is_t(&self) -> bool {
        matches!(self, Symbol::T(_))
    }

    pub fn is_nt(&self) -> bool {
        matches!(self, Symbol::NT(_))
    }

    pub fn to_str<T>(&self, rules: &RuleSet<T>) -> String {
        rules.sym_name(self)
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Symbol::T(id) => write!(f, ":{id}"),
            Symbol::NT(id) => write!(f, "{id}"),
        }
    }
}

// ---------------------------------------------------------------------------------------------

/// `Origin(line, col)`: position of a clause in the grammar source text. The default value
/// stands for "no position" and is used for nodes synthesized by the transforms.
///
/// The origin is carried around for messages only; it never takes part in comparisons.
#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct Origin(pub u32, pub u32);

impl Origin {
    pub fn none() -> Self {
        Origin::default()
    }

    pub fn line(&self) -> u32 {
        self.0
    }

    pub fn col(&self) -> u32 {
        self.1
    }
}

impl Display for Origin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.0, self.1)
    }
}

// ---------------------------------------------------------------------------------------------

pub mod listflag {
    /// The list matches one or more elements (`+`); without this flag, zero or more (`*`).
    pub const ONE_OR_MORE: u32     = 1 << 0;
    /// The list recurses on the right (`elem sep list`); without this flag, on the left.
    pub const RIGHT_RECURSIVE: u32 = 1 << 1;
}

/// One node of a rule expression, without its origin (see [`Expr`]).
///
/// The extended notation allows nested choices, optional clauses, repetition lists with an
/// optional separator, set clauses, precedence annotations, and semantic-binding wrappers.
/// After [expansion](RuleSet::expand), only `Choice`, `Sequence`, `Empty`, `Reference`,
/// `Prec`, and the atomic markers remain, in the canonical patterns described by
/// [`Normalized`](crate::Normalized).
#[derive(Clone, PartialEq, Debug)]
pub enum ExprNode {
    /// The empty sequence: matches without consuming anything.
    Empty,
    /// A terminal or nonterminal occurrence.
    Reference(Symbol),
    /// Ordered concatenation of the sub-expressions.
    Sequence(Vec<Expr>),
    /// Alternation between the sub-expressions.
    Choice(Vec<Expr>),
    /// Zero or one occurrence of the argument (`?`).
    Optional(Box<Expr>),
    /// Repetition of `elem`, with an optional separator between consecutive elements.
    List { elem: Box<Expr>, sep: Option<Box<Expr>>, flags: u32 },
    /// A set-valued clause (a token-class reference); `u32` is the opaque id of the set.
    Set(u32),
    /// Precedence annotation: `symbol` is the terminal whose precedence applies to `arg`.
    Prec { symbol: Symbol, arg: Box<Expr> },
    /// `name=arg` semantic binding.
    Assign { name: String, arg: Box<Expr> },
    /// `name+=arg` semantic binding (appends to a collection).
    Append { name: String, arg: Box<Expr> },
    /// `arg -> name` node-emitting binding.
    Arrow { name: String, arg: Box<Expr> },
    /// Lexer state marker; passes through expansion unchanged.
    StateMarker(String),
    /// Inline semantic-action code; passes through expansion unchanged.
    Command(String),
    /// Lookahead assertion; passes through expansion unchanged.
    Lookahead(String),
}

/// A rule expression: one node and the position of the clause it came from.
#[derive(Clone, Debug)]
pub struct Expr {
    pub node: ExprNode,
    pub origin: Origin,
}

// we only use the node structure in the equality test, so that origins are ignored at
// every depth
impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl Default for Expr {
    fn default() -> Self {
        Expr::empty()
    }
}

impl Expr {
    pub fn new(node: ExprNode) -> Self {
        Expr { node, origin: Origin::none() }
    }

    pub fn with_origin(node: ExprNode, origin: Origin) -> Self {
        Expr { node, origin }
    }

    pub fn empty() -> Self {
        Expr::new(ExprNode::Empty)
    }

    pub fn reference(sym: Symbol) -> Self {
        Expr::new(ExprNode::Reference(sym))
    }

    pub fn sequence(sub: Vec<Expr>) -> Self {
        Expr::new(ExprNode::Sequence(sub))
    }

    pub fn choice(sub: Vec<Expr>) -> Self {
        Expr::new(ExprNode::Choice(sub))
    }

    pub fn optional(arg: Expr) -> Self {
        Expr::new(ExprNode::Optional(Box::new(arg)))
    }

    pub fn list(elem: Expr, sep: Option<Expr>, flags: u32) -> Self {
        Expr::new(ExprNode::List { elem: Box::new(elem), sep: sep.map(Box::new), flags })
    }

    /// Rewrites every nonterminal reference `v` into `perm[v]`, recursively. Only references
    /// are remapped; a precedence symbol always designates a terminal.
    pub(crate) fn remap_nonterms(&mut self, perm: &[VarId]) {
        match &mut self.node {
            ExprNode::Reference(Symbol::NT(v)) => *v = perm[*v as usize],
            ExprNode::Sequence(sub) | ExprNode::Choice(sub) => {
                for s in sub {
                    s.remap_nonterms(perm);
                }
            }
            ExprNode::Optional(arg)
            | ExprNode::Prec { arg, .. }
            | ExprNode::Assign { arg, .. }
            | ExprNode::Append { arg, .. }
            | ExprNode::Arrow { arg, .. } => arg.remap_nonterms(perm),
            ExprNode::List { elem, sep, .. } => {
                elem.remap_nonterms(perm);
                if let Some(sep) = sep {
                    sep.remap_nonterms(perm);
                }
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------------------------

/// A nonterminal: its unique name, its single top-level rule, and the position of its
/// definition. Nonterminals defined by the grammar are completed by new ones when the rules
/// are adapted to the target parser; the expansion pass replaces `value` with its canonical
/// expanded form in place.
#[derive(Clone, Debug)]
pub struct Nonterm {
    pub name: String,
    pub value: Expr,
    pub origin: Origin,
}

/// Stores the rules of a grammar: the terminal names and one [`Nonterm`] per nonterminal,
/// in declaration order.
///
/// The generic parameter tracks the form of the rules: a `RuleSet<General>` may use the whole
/// extended notation, a `RuleSet<Normalized>` only contains canonical production rules. The
/// conversion between the two runs the [expansion](RuleSet::expand) and transmits
/// the [log](BufLog) rather than returning a `Result`, so that the transforms can be cascaded
/// and the messages examined at the end.
#[derive(Clone, Debug)]
pub struct RuleSet<T> {
    terminals: Vec<String>,
    nonterms: Vec<Nonterm>,
    log: BufLog,
    _phantom: PhantomData<T>,
}

impl<T> RuleSet<T> {
    pub fn get_log(&self) -> &BufLog {
        &self.log
    }

    pub fn get_num_t(&self) -> usize {
        self.terminals.len()
    }

    pub fn get_num_nt(&self) -> usize {
        self.nonterms.len()
    }

    pub fn get_terminals(&self) -> impl Iterator<Item = &String> {
        self.terminals.iter()
    }

    pub fn get_nonterms_iter(&self) -> impl Iterator<Item = (VarId, &Nonterm)> {
        self.nonterms.iter().index()
    }

    pub fn get_nonterm(&self, var: VarId) -> Option<&Nonterm> {
        self.nonterms.get(var as usize)
    }

    pub fn sym_name(&self, sym: &Symbol) -> String {
        match sym {
            Symbol::T(id) if (*id as usize) < self.terminals.len() => self.terminals[*id as usize].clone(),
            Symbol::T(id) => format!("??T({id})"),
            Symbol::NT(id) if (*id as usize) < self.nonterms.len() => self.nonterms[*id as usize].name.clone(),
            Symbol::NT(id) => format!("??NT({id})"),
        }
    }

    /// Renders an expression in source-like notation, e.g. `(A | B)? c`. The rendering is
    /// canonical and serves as reference format in the regression tests.
    pub fn expr_to_str(&self, expr: &Expr) -> String {
        self.expr_to_str_above(expr, 0)
    }

    /// Renders `expr`, wrapping it in parentheses when it binds less tightly than `min`.
    /// Levels: 0 = choice, 1 = arrow / precedence, 2 = sequence, 3 = postfix and bindings,
    /// 4 = atoms.
    fn expr_to_str_above(&self, expr: &Expr, min: u8) -> String {
        let (s, level) = match &expr.node {
            ExprNode::Empty => ("ε".to_string(), 4),
            ExprNode::Reference(sym) => (self.sym_name(sym), 4),
            ExprNode::StateMarker(name) => (format!(".{name}"), 4),
            ExprNode::Command(code) => (format!("{{{code}}}"), 4),
            ExprNode::Lookahead(text) => (format!("(?= {text})"), 4),
            ExprNode::Set(id) => (format!("set(#{id})"), 4),
            ExprNode::Sequence(sub) => (sub.iter().map(|s| self.expr_to_str_above(s, 3)).join(" "), 2),
            ExprNode::Choice(sub) => (sub.iter().map(|s| self.expr_to_str_above(s, 1)).join(" | "), 0),
            ExprNode::Optional(arg) => (format!("{}?", self.expr_to_str_above(arg, 4)), 3),
            ExprNode::List { elem, sep, flags } => {
                let op = if flags & listflag::ONE_OR_MORE != 0 { "+" } else { "*" };
                let rr = if flags & listflag::RIGHT_RECURSIVE != 0 { "rr" } else { "" };
                match sep {
                    Some(sep) => (format!("({} separator {}){op}{rr}",
                                          self.expr_to_str_above(elem, 2), self.expr_to_str_above(sep, 2)), 3),
                    None => (format!("{}{op}{rr}", self.expr_to_str_above(elem, 4)), 3),
                }
            }
            ExprNode::Prec { symbol, arg } => (format!("{} %prec {}", self.expr_to_str_above(arg, 2), self.sym_name(symbol)), 1),
            ExprNode::Assign { name, arg } => (format!("{name}={}", self.expr_to_str_above(arg, 4)), 3),
            ExprNode::Append { name, arg } => (format!("{name}+={}", self.expr_to_str_above(arg, 4)), 3),
            ExprNode::Arrow { name, arg } => (format!("{} -> {name}", self.expr_to_str_above(arg, 2)), 1),
        };
        if level < min {
            format!("({s})")
        } else {
            s
        }
    }

    pub fn rule_to_str(&self, var: VarId) -> String {
        match self.nonterms.get(var as usize) {
            Some(nt) => format!("{} -> {}", nt.name, self.expr_to_str(&nt.value)),
            None => format!("??NT({var})"),
        }
    }

    /// Renders all the rules, one per line, in declaration order.
    pub fn to_str(&self) -> String {
        self.get_nonterms_iter().map(|(var, _): (VarId, _)| self.rule_to_str(var)).join("\n")
    }

    /// Physically reorders the nonterminals so that nonterminal `i` lands at position
    /// `perm[i]`, and rewrites every nonterminal reference in every rule accordingly.
    ///
    /// `perm` must be a permutation covering all the nonterminals; anything else is a bug in
    /// the caller and panics.
    pub fn rearrange(&mut self, perm: &[VarId]) {
        assert_eq!(perm.len(), self.nonterms.len(),
                   "rearrange: permutation of length {} for {} nonterminals", perm.len(), self.nonterms.len());
        let mut out: Vec<Option<Nonterm>> = (0..perm.len()).map(|_| None).collect();
        for (i, mut nt) in take(&mut self.nonterms).into_iter().enumerate() {
            nt.value.remap_nonterms(perm);
            let target = perm[i] as usize;
            assert!(target < out.len() && out[target].is_none(), "rearrange: {perm:?} is not a permutation");
            out[target] = Some(nt);
        }
        self.nonterms = out.into_iter().flatten().collect();
    }
}

impl RuleSet<General> {
    pub fn new() -> Self {
        Self::with_log(BufLog::new())
    }

    pub fn with_log(log: BufLog) -> Self {
        RuleSet {
            terminals: Vec::new(),
            nonterms: Vec::new(),
            log,
            _phantom: PhantomData,
        }
    }

    pub fn add_terminal<S: Into<String>>(&mut self, name: S) -> TokenId {
        let token = self.terminals.len();
        assert!(token < TokenId::MAX as usize);
        self.terminals.push(name.into());
        token as TokenId
    }

    pub fn extend_terminals<I: IntoIterator<Item = S>, S: Into<String>>(&mut self, names: I) {
        for name in names {
            self.add_terminal(name);
        }
    }

    /// Adds a nonterminal defined by the rule `value` and returns its index. The definition
    /// origin is taken from the rule.
    pub fn add_nonterm<S: Into<String>>(&mut self, name: S, value: Expr) -> VarId {
        let var = self.nonterms.len();
        assert!(var < VarId::MAX as usize);
        let origin = value.origin;
        self.nonterms.push(Nonterm { name: name.into(), value, origin });
        var as VarId
    }
}

impl Default for RuleSet<General> {
    fn default() -> Self {
        RuleSet::new()
    }
}

// ---------------------------------------------------------------------------------------------
// Macros

pub mod macros {
    /// Generates an `Expr` instance. Composite forms take their sub-expressions between
    /// parentheses, with the same syntax.
    ///
    /// # Examples
    /// ```
    /// # use gramflat::expr;
    /// # use gramflat::grammar::{listflag, Expr, Symbol};
    /// assert_eq!(expr!(t 1), Expr::reference(Symbol::T(1)));
    /// assert_eq!(expr!(nt 3), Expr::reference(Symbol::NT(3)));
    /// assert_eq!(expr!(e), Expr::empty());
    /// assert_eq!(expr!(? (t 0)), Expr::optional(expr!(t 0)));
    /// assert_eq!(expr!(& (t 0), (nt 1)), Expr::sequence(vec![expr!(t 0), expr!(nt 1)]));
    /// assert_eq!(expr!(| (t 0), (t 1)), Expr::choice(vec![expr!(t 0), expr!(t 1)]));
    /// assert_eq!(expr!(+ (t 0)), Expr::list(expr!(t 0), None, listflag::ONE_OR_MORE));
    /// assert_eq!(expr!(* (t 0) sep (t 1)), Expr::list(expr!(t 0), Some(expr!(t 1)), 0));
    /// ```
    #[macro_export]
    macro_rules! expr {
        (t $id:expr) => { $crate::grammar::Expr::reference($crate::grammar::Symbol::T($id as $crate::grammar::TokenId)) };
        (nt $id:expr) => { $crate::grammar::Expr::reference($crate::grammar::Symbol::NT($id as $crate::grammar::VarId)) };
        (e) => { $crate::grammar::Expr::empty() };
        (set $id:expr) => { $crate::grammar::Expr::new($crate::grammar::ExprNode::Set($id)) };
        (st $name:literal) => { $crate::grammar::Expr::new($crate::grammar::ExprNode::StateMarker($name.to_string())) };
        (cmd $code:literal) => { $crate::grammar::Expr::new($crate::grammar::ExprNode::Command($code.to_string())) };
        (la $text:literal) => { $crate::grammar::Expr::new($crate::grammar::ExprNode::Lookahead($text.to_string())) };
        //
        (& $(($($x:tt)+)),+) => { $crate::grammar::Expr::sequence(std::vec![$($crate::expr!($($x)+)),+]) };
        (| $(($($x:tt)+)),+) => { $crate::grammar::Expr::choice(std::vec![$($crate::expr!($($x)+)),+]) };
        (? ($($x:tt)+)) => { $crate::grammar::Expr::optional($crate::expr!($($x)+)) };
        (+ ($($x:tt)+) sep ($($s:tt)+)) => {
            $crate::grammar::Expr::list($crate::expr!($($x)+), Some($crate::expr!($($s)+)), $crate::grammar::listflag::ONE_OR_MORE)
        };
        (+ ($($x:tt)+)) => { $crate::grammar::Expr::list($crate::expr!($($x)+), None, $crate::grammar::listflag::ONE_OR_MORE) };
        (* ($($x:tt)+) sep ($($s:tt)+)) => {
            $crate::grammar::Expr::list($crate::expr!($($x)+), Some($crate::expr!($($s)+)), 0)
        };
        (* ($($x:tt)+)) => { $crate::grammar::Expr::list($crate::expr!($($x)+), None, 0) };
        (% $id:expr, ($($x:tt)+)) => {
            $crate::grammar::Expr::new($crate::grammar::ExprNode::Prec {
                symbol: $crate::grammar::Symbol::T($id as $crate::grammar::TokenId),
                arg: std::boxed::Box::new($crate::expr!($($x)+)),
            })
        };
        (= $name:literal ($($x:tt)+)) => {
            $crate::grammar::Expr::new($crate::grammar::ExprNode::Assign {
                name: $name.to_string(),
                arg: std::boxed::Box::new($crate::expr!($($x)+)),
            })
        };
        (append $name:literal ($($x:tt)+)) => {
            $crate::grammar::Expr::new($crate::grammar::ExprNode::Append {
                name: $name.to_string(),
                arg: std::boxed::Box::new($crate::expr!($($x)+)),
            })
        };
        (arrow $name:literal ($($x:tt)+)) => {
            $crate::grammar::Expr::new($crate::grammar::ExprNode::Arrow {
                name: $name.to_string(),
                arg: std::boxed::Box::new($crate::expr!($($x)+)),
            })
        };
    }
}
