use std::fmt;

/// Source span for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A spanned AST node.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// A parsed proof script: top-level items in source order.
pub type Script = Vec<Spanned<ScriptItem>>;

/// Top-level item of a proof script.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptItem {
    /// `shared int x, y;`
    SharedDecl(Vec<VarDecl>),
    /// `thread int t;`
    ThreadDecl(Vec<VarDecl>),
    /// `view holdTick(int t);`
    ViewProto(ViewProtoDecl),
    /// `constraint holdTick(t) -> ticket > t;`
    Constraint(ConstraintDecl),
    /// `method lock() { ... }`
    Method(MethodDecl),
}

/// Surface type literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeLit {
    Int,
    Bool,
}

impl fmt::Display for TypeLit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeLit::Int => write!(f, "int"),
            TypeLit::Bool => write!(f, "bool"),
        }
    }
}

/// A single typed name in a declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub ty: TypeLit,
    pub name: String,
}

/// View prototype declaration.
///
/// `anonymous` records whether the prototype was written without a parameter
/// list at all (`view v;`), as opposed to an empty one (`view v();`).
#[derive(Debug, Clone, PartialEq)]
pub struct ViewProtoDecl {
    pub name: String,
    pub params: Vec<VarDecl>,
    pub iterated: bool,
    pub anonymous: bool,
}

/// One func in a constraint's view pattern, e.g. `holdTick(t)` or
/// `iter[n] holdTick(t)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SigFunc {
    pub name: String,
    pub params: Vec<String>,
    pub iterator: Option<String>,
}

/// Right-hand side of a constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintBody {
    /// `-> expr;`
    Definite(Expr),
    /// `-> ?;` — definition left to a later synthesis pass.
    Indefinite,
}

/// `constraint <pattern> -> <body>;`
///
/// An empty signature is the `emp` pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintDecl {
    pub signature: Vec<SigFunc>,
    pub body: ConstraintBody,
}

/// Method declaration with its annotated body.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: BlockAst,
}

/// `{ {|v0|} s1 {|v1|} ... sn {|vn|} }` — alternating assertions and
/// statements, starting and ending with an assertion.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockAst {
    pub pre: Spanned<ViewAssertion>,
    pub steps: Vec<(Spanned<Statement>, Spanned<ViewAssertion>)>,
}

/// A view assertion `{| v |}`, or advisory `{|? v |}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewAssertion {
    pub advisory: bool,
    pub view: ViewAst,
}

/// Surface view expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewAst {
    Emp,
    Func(FuncAst),
    /// `v1 * v2` — multiset union.
    Join(Box<ViewAst>, Box<ViewAst>),
    /// `if c then v1 else v2`; a missing else branch is `Emp`.
    If {
        cond: Expr,
        then_view: Box<ViewAst>,
        else_view: Box<ViewAst>,
    },
    /// `iter[n] f(xs)` — `n` copies of the func.
    Iterated { func: FuncAst, count: Expr },
}

/// A predicate application in a view.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncAst {
    pub name: String,
    pub args: Vec<Expr>,
}

/// A structured command.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `<stmt>;` or `<{ s1; s2; }>;`
    Atomic(Vec<AtomicStmt>),
    If {
        cond: Expr,
        then_block: BlockAst,
        else_block: Option<BlockAst>,
    },
    While {
        is_do: bool,
        cond: Expr,
        body: BlockAst,
    },
}

/// Fetch mode on a load (`x = y`, `x = y++`, `x = y--`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Direct,
    Increment,
    Decrement,
}

/// A single primitive step inside an atomic block.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomicStmt {
    /// `x = e`
    Assign { dest: String, rhs: Expr },
    /// `x = y++` / `x = y--`
    Fetch {
        dest: String,
        src: String,
        mode: FetchMode,
    },
    /// `x++` / `x--`
    Postfix { dest: String, mode: FetchMode },
    /// `CAS(dest, test, set)`
    Cas {
        dest: String,
        test: String,
        set: Expr,
    },
    /// `assume(e)`
    Assume(Expr),
    /// `%{ sym }(args)` as a command.
    SymCall { sym: String, args: Vec<Expr> },
    /// `id` — no-op.
    Skip,
}

/// Binary operator, C precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Neq,
    Gt,
    Ge,
    Lt,
    Le,
    And,
    Or,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinOp::Add => write!(f, "+"),
            BinOp::Sub => write!(f, "-"),
            BinOp::Mul => write!(f, "*"),
            BinOp::Div => write!(f, "/"),
            BinOp::Eq => write!(f, "=="),
            BinOp::Neq => write!(f, "!="),
            BinOp::Gt => write!(f, ">"),
            BinOp::Ge => write!(f, ">="),
            BinOp::Lt => write!(f, "<"),
            BinOp::Le => write!(f, "<="),
            BinOp::And => write!(f, "&&"),
            BinOp::Or => write!(f, "||"),
        }
    }
}

/// Surface expression (untyped until modelling).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLit(i64),
    BoolLit(bool),
    Var(String),
    /// `%{ name }(args)` — an uninterpreted symbol.
    Symbol { name: String, args: Vec<Expr> },
    Bin {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    Neg(Box<Expr>),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::IntLit(n) => write!(f, "{n}"),
            Expr::BoolLit(b) => write!(f, "{b}"),
            Expr::Var(v) => write!(f, "{v}"),
            Expr::Symbol { name, args } => {
                write!(f, "%{{{name}}}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            Expr::Bin { op, lhs, rhs } => write!(f, "({lhs} {op} {rhs})"),
            Expr::Not(e) => write!(f, "!{e}"),
            Expr::Neg(e) => write!(f, "-{e}"),
        }
    }
}

impl fmt::Display for FuncAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, a) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{a}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for ViewAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewAst::Emp => write!(f, "emp"),
            ViewAst::Func(func) => write!(f, "{func}"),
            ViewAst::Join(l, r) => write!(f, "{l} * {r}"),
            ViewAst::If {
                cond,
                then_view,
                else_view,
            } => write!(f, "if {cond} then ({then_view}) else ({else_view})"),
            ViewAst::Iterated { func, count } => write!(f, "iter[{count}] {func}"),
        }
    }
}

impl fmt::Display for ViewAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.advisory {
            write!(f, "{{|? {} |}}", self.view)
        } else {
            write!(f, "{{| {} |}}", self.view)
        }
    }
}

impl fmt::Display for AtomicStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtomicStmt::Assign { dest, rhs } => write!(f, "{dest} = {rhs}"),
            AtomicStmt::Fetch { dest, src, mode } => match mode {
                FetchMode::Direct => write!(f, "{dest} = {src}"),
                FetchMode::Increment => write!(f, "{dest} = {src}++"),
                FetchMode::Decrement => write!(f, "{dest} = {src}--"),
            },
            AtomicStmt::Postfix { dest, mode } => match mode {
                FetchMode::Increment => write!(f, "{dest}++"),
                FetchMode::Decrement => write!(f, "{dest}--"),
                FetchMode::Direct => write!(f, "{dest}"),
            },
            AtomicStmt::Cas { dest, test, set } => write!(f, "CAS({dest}, {test}, {set})"),
            AtomicStmt::Assume(e) => write!(f, "assume({e})"),
            AtomicStmt::SymCall { sym, args } => {
                write!(f, "%{{{sym}}}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            AtomicStmt::Skip => write!(f, "id"),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Atomic(stmts) => {
                if stmts.len() == 1 {
                    write!(f, "<{}>;", stmts[0])
                } else {
                    write!(f, "<{{ ")?;
                    for s in stmts {
                        write!(f, "{s}; ")?;
                    }
                    write!(f, "}}>;")
                }
            }
            Statement::If {
                cond,
                then_block,
                else_block,
            } => {
                write!(f, "if ({cond}) {then_block}")?;
                if let Some(e) = else_block {
                    write!(f, " else {e}")?;
                }
                Ok(())
            }
            Statement::While { is_do, cond, body } => {
                if *is_do {
                    write!(f, "do {body} while ({cond});")
                } else {
                    write!(f, "while ({cond}) {body}")
                }
            }
        }
    }
}

impl fmt::Display for BlockAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ {}", self.pre.node)?;
        for (stmt, view) in &self.steps {
            write!(f, " {} {}", stmt.node, view.node)?;
        }
        write!(f, " }}")
    }
}

impl fmt::Display for ScriptItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptItem::SharedDecl(vars) | ScriptItem::ThreadDecl(vars) => {
                let kw = if matches!(self, ScriptItem::SharedDecl(_)) {
                    "shared"
                } else {
                    "thread"
                };
                // A decl lists names of a single type.
                write!(f, "{kw} {} ", vars[0].ty)?;
                for (i, v) in vars.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v.name)?;
                }
                write!(f, ";")
            }
            ScriptItem::ViewProto(p) => {
                write!(f, "view ")?;
                if p.iterated {
                    write!(f, "iter ")?;
                }
                write!(f, "{}", p.name)?;
                if !p.anonymous {
                    write!(f, "(")?;
                    for (i, v) in p.params.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{} {}", v.ty, v.name)?;
                    }
                    write!(f, ")")?;
                }
                write!(f, ";")
            }
            ScriptItem::Constraint(c) => {
                write!(f, "constraint ")?;
                if c.signature.is_empty() {
                    write!(f, "emp")?;
                } else {
                    for (i, s) in c.signature.iter().enumerate() {
                        if i > 0 {
                            write!(f, " * ")?;
                        }
                        if let Some(it) = &s.iterator {
                            write!(f, "iter[{it}] ")?;
                        }
                        write!(f, "{}(", s.name)?;
                        for (j, p) in s.params.iter().enumerate() {
                            if j > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "{p}")?;
                        }
                        write!(f, ")")?;
                    }
                }
                match &c.body {
                    ConstraintBody::Definite(e) => write!(f, " -> {e};"),
                    ConstraintBody::Indefinite => write!(f, " -> ?;"),
                }
            }
            ScriptItem::Method(m) => {
                write!(f, "method {}(", m.name)?;
                for (i, p) in m.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") {}", m.body)
            }
        }
    }
}

/// Render a whole script; re-parsing the result yields an equivalent AST.
pub fn print_script(script: &Script) -> String {
    let mut out = String::new();
    for item in script {
        out.push_str(&item.node.to_string());
        out.push('\n');
    }
    out
}
