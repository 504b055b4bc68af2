//! The modeller: collated script → typed model.
//!
//! Resolves names over the two-layer variable space, type-checks every
//! expression, reduces view assertions to conditional views, reduces atomic
//! steps to primitive invocations, and builds the semantic relation for each
//! primitive.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use starling_dsl::ast;
use starling_dsl::Collated;

use crate::expr::{BoolExpr, Expr, IntExpr, Mark, MarkedVar, Sym, Type, TypedVar};
use crate::model::{Block, Command, CommandType, Model, PartCmd, Proto, ViewDef};
use crate::view::{map_cview_vars, CFunc, CView, DFunc, Func, Iterated, Multiset, VFunc, ViewExpr};
use crate::CViewModel;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),
    #[error("Type mismatch in {context}: expected {expected}, got {got}")]
    TypeMismatch {
        expected: Type,
        got: Type,
        context: String,
    },
    #[error("View '{proto}' applied to {got} arguments, expected {expected}")]
    ArityMismatch {
        proto: String,
        expected: usize,
        got: usize,
    },
    #[error("Malformed atomic block: {reason}")]
    BadAtomicBlock { reason: String },
    #[error("Duplicate name '{name}' in {scope} scope")]
    DuplicateName { name: String, scope: String },
    #[error("Thread-local variable '{0}' cannot appear in a constraint")]
    ConstraintScopeViolation(String),
    #[error("Duplicate view prototype '{0}'")]
    DuplicateProto(String),
    #[error("Unknown view '{0}'")]
    UnknownView(String),
    #[error("View '{0}' is not iterated")]
    NotIterated(String),
    #[error("Iteration count in an assertion must be an integer literal, got '{0}'")]
    NonConstantIteration(String),
    #[error("Unknown primitive '{0}'")]
    UnknownPrimitive(String),
}

/// A modelling error enriched with source-span information for
/// pretty-printed diagnostics.
#[derive(Debug, Error, Diagnostic)]
#[error("{inner}")]
pub struct SpannedModelError {
    #[source_code]
    pub src: NamedSource<String>,
    pub inner: ModelError,
    #[label("here")]
    pub span: Option<SourceSpan>,
}

impl SpannedModelError {
    fn new(err: ModelError, source: String, filename: String, span: Option<ast::Span>) -> Self {
        Self {
            src: NamedSource::new(filename, source),
            inner: err,
            span: span.map(|s| SourceSpan::new(s.start.into(), s.end - s.start)),
        }
    }
}

/// Model a collated script, attaching source spans to any error.
pub fn model_with_source(
    collated: &Collated,
    source: &str,
    filename: &str,
) -> Result<CViewModel, SpannedModelError> {
    model(collated).map_err(|err| {
        let span = find_span_for_error(&err, collated);
        SpannedModelError::new(err, source.to_string(), filename.to_string(), span)
    })
}

/// Best-effort span lookup for a modelling error by examining the AST.
fn find_span_for_error(err: &ModelError, collated: &Collated) -> Option<ast::Span> {
    match err {
        ModelError::UnknownView(name) | ModelError::ArityMismatch { proto: name, .. } => collated
            .constraints
            .iter()
            .find(|c| c.node.signature.iter().any(|s| s.name == *name))
            .map(|c| c.span)
            .or_else(|| collated.methods.first().map(|m| m.span)),
        ModelError::DuplicateProto(name) => collated
            .view_protos
            .iter()
            .rev()
            .find(|p| p.node.name == *name)
            .map(|p| p.span),
        ModelError::ConstraintScopeViolation(_) | ModelError::NotIterated(_) => {
            collated.constraints.first().map(|c| c.span)
        }
        ModelError::DuplicateName { name, scope } if scope == "methods" => collated
            .methods
            .iter()
            .rev()
            .find(|m| m.node.name == *name)
            .map(|m| m.span),
        _ => None,
    }
}

/// Name resolution context for an expression position.
enum Scope<'a> {
    /// Method bodies: thread-locals and shared variables.
    Method,
    /// Constraint bodies: the signature's parameters and shared variables;
    /// thread-locals are out of bounds.
    Constraint(&'a IndexMap<String, Type>),
}

struct Ctx {
    globals: IndexMap<String, Type>,
    locals: IndexMap<String, Type>,
    protos: IndexMap<String, Proto>,
}

fn lit_type(ty: ast::TypeLit) -> Type {
    match ty {
        ast::TypeLit::Int => Type::Int,
        ast::TypeLit::Bool => Type::Bool,
    }
}

/// Model a collated script into the conditional-view model.
pub fn model(collated: &Collated) -> Result<CViewModel, ModelError> {
    let mut globals = IndexMap::new();
    for v in &collated.shared {
        if globals.insert(v.name.clone(), lit_type(v.ty)).is_some() {
            return Err(ModelError::DuplicateName {
                name: v.name.clone(),
                scope: "shared".into(),
            });
        }
    }
    let mut locals = IndexMap::new();
    for v in &collated.thread {
        if globals.contains_key(&v.name) {
            return Err(ModelError::DuplicateName {
                name: v.name.clone(),
                scope: "shared/thread".into(),
            });
        }
        if locals.insert(v.name.clone(), lit_type(v.ty)).is_some() {
            return Err(ModelError::DuplicateName {
                name: v.name.clone(),
                scope: "thread".into(),
            });
        }
    }

    let mut protos = IndexMap::new();
    for p in &collated.view_protos {
        let proto = Proto {
            params: p
                .node
                .params
                .iter()
                .map(|v| TypedVar::new(v.name.clone(), lit_type(v.ty)))
                .collect(),
            iterated: p.node.iterated,
            anonymous: p.node.anonymous,
        };
        if protos.insert(p.node.name.clone(), proto).is_some() {
            return Err(ModelError::DuplicateProto(p.node.name.clone()));
        }
    }

    let ctx = Ctx {
        globals,
        locals,
        protos,
    };

    let mut view_defs = Vec::new();
    let mut constrained: BTreeSet<String> = BTreeSet::new();
    for c in &collated.constraints {
        let def = ctx.model_constraint(&c.node)?;
        for item in def.view() {
            constrained.insert(item.func.name.clone());
        }
        view_defs.push(def);
    }
    // Every prototype gets exactly one definition; unconstrained ones are
    // left for a downstream synthesis pass.
    for (name, proto) in &ctx.protos {
        if !constrained.contains(name) {
            view_defs.push(ViewDef::Indefinite {
                view: vec![Iterated::plain(Func::new(
                    name.clone(),
                    proto.params.clone(),
                ))],
            });
        }
    }

    let mut axioms = IndexMap::new();
    for m in &collated.methods {
        if axioms.contains_key(&m.node.name) {
            return Err(ModelError::DuplicateName {
                name: m.node.name.clone(),
                scope: "methods".into(),
            });
        }
        for p in &m.node.params {
            if !ctx.locals.contains_key(p) {
                return Err(ModelError::UnknownIdentifier(p.clone()));
            }
        }
        let body = ctx.model_block(&m.node.body)?;
        axioms.insert(m.node.name.clone(), body);
    }

    Ok(Model {
        globals: ctx.globals,
        locals: ctx.locals,
        axioms,
        semantics: primitive_semantics(),
        view_protos: ctx.protos,
        view_defs,
    })
}

impl Ctx {
    fn lookup(&self, scope: &Scope<'_>, name: &str) -> Result<Type, ModelError> {
        match scope {
            Scope::Method => self
                .locals
                .get(name)
                .or_else(|| self.globals.get(name))
                .copied()
                .ok_or_else(|| ModelError::UnknownIdentifier(name.to_string())),
            Scope::Constraint(params) => {
                if let Some(ty) = params.get(name).or_else(|| self.globals.get(name)) {
                    Ok(*ty)
                } else if self.locals.contains_key(name) {
                    Err(ModelError::ConstraintScopeViolation(name.to_string()))
                } else {
                    Err(ModelError::UnknownIdentifier(name.to_string()))
                }
            }
        }
    }

    /// Infer a type for `e`. A bare symbol defaults to integer type; the
    /// directed entry points below override that from context.
    fn model_expr(&self, e: &ast::Expr, scope: &Scope<'_>) -> Result<Expr<String>, ModelError> {
        match e {
            ast::Expr::IntLit(n) => Ok(Expr::Int(IntExpr::Lit(*n))),
            ast::Expr::BoolLit(b) => Ok(Expr::Bool(BoolExpr::Lit(*b))),
            ast::Expr::Var(name) => match self.lookup(scope, name)? {
                Type::Int => Ok(Expr::Int(IntExpr::var(name.clone()))),
                Type::Bool => Ok(Expr::Bool(BoolExpr::var(name.clone()))),
            },
            ast::Expr::Symbol { name, args } => Ok(Expr::Int(IntExpr::sym(
                name.clone(),
                self.model_sym_args(args, scope)?,
            ))),
            ast::Expr::Neg(inner) => Ok(Expr::Int(IntExpr::Sub(vec![
                IntExpr::Lit(0),
                self.model_int_expr(inner, scope)?,
            ]))),
            ast::Expr::Not(inner) => Ok(Expr::Bool(self.model_bool_expr(inner, scope)?.not())),
            ast::Expr::Bin { op, lhs, rhs } => self.model_bin(*op, lhs, rhs, scope),
        }
    }

    fn model_bin(
        &self,
        op: ast::BinOp,
        lhs: &ast::Expr,
        rhs: &ast::Expr,
        scope: &Scope<'_>,
    ) -> Result<Expr<String>, ModelError> {
        use ast::BinOp::*;
        match op {
            Add | Sub | Mul | Div => {
                let l = self.model_int_expr(lhs, scope)?;
                let r = self.model_int_expr(rhs, scope)?;
                Ok(Expr::Int(match op {
                    Add => IntExpr::Add(vec![l, r]),
                    Sub => IntExpr::Sub(vec![l, r]),
                    Mul => IntExpr::Mul(vec![l, r]),
                    _ => IntExpr::div(l, r),
                }))
            }
            Gt | Ge | Lt | Le => {
                let l = self.model_int_expr(lhs, scope)?;
                let r = self.model_int_expr(rhs, scope)?;
                Ok(Expr::Bool(match op {
                    Gt => BoolExpr::gt(l, r),
                    Ge => BoolExpr::ge(l, r),
                    Lt => BoolExpr::lt(l, r),
                    _ => BoolExpr::le(l, r),
                }))
            }
            And | Or => {
                let l = self.model_bool_expr(lhs, scope)?;
                let r = self.model_bool_expr(rhs, scope)?;
                Ok(Expr::Bool(match op {
                    And => BoolExpr::And(vec![l, r]),
                    _ => BoolExpr::Or(vec![l, r]),
                }))
            }
            Eq | Neq => {
                // Equality is polymorphic: the non-symbolic side fixes the
                // type; two symbols compare at integer type.
                let (l, r) = match (lhs, rhs) {
                    (ast::Expr::Symbol { .. }, other)
                        if !matches!(other, ast::Expr::Symbol { .. }) =>
                    {
                        let r = self.model_expr(other, scope)?;
                        let l = self.model_typed_expr(lhs, r.ty(), scope)?;
                        (l, r)
                    }
                    _ => {
                        let l = self.model_expr(lhs, scope)?;
                        let r = self.model_typed_expr(rhs, l.ty(), scope)?;
                        (l, r)
                    }
                };
                let eq = BoolExpr::eq(l, r);
                Ok(Expr::Bool(if op == Neq { eq.not() } else { eq }))
            }
        }
    }

    fn model_typed_expr(
        &self,
        e: &ast::Expr,
        expected: Type,
        scope: &Scope<'_>,
    ) -> Result<Expr<String>, ModelError> {
        match expected {
            Type::Int => Ok(Expr::Int(self.model_int_expr(e, scope)?)),
            Type::Bool => Ok(Expr::Bool(self.model_bool_expr(e, scope)?)),
        }
    }

    fn model_int_expr(
        &self,
        e: &ast::Expr,
        scope: &Scope<'_>,
    ) -> Result<IntExpr<String>, ModelError> {
        if let ast::Expr::Symbol { name, args } = e {
            return Ok(IntExpr::sym(name.clone(), self.model_sym_args(args, scope)?));
        }
        match self.model_expr(e, scope)? {
            Expr::Int(i) => Ok(i),
            Expr::Bool(_) => Err(ModelError::TypeMismatch {
                expected: Type::Int,
                got: Type::Bool,
                context: describe_expr(e),
            }),
        }
    }

    fn model_bool_expr(
        &self,
        e: &ast::Expr,
        scope: &Scope<'_>,
    ) -> Result<BoolExpr<String>, ModelError> {
        if let ast::Expr::Symbol { name, args } = e {
            return Ok(BoolExpr::sym(name.clone(), self.model_sym_args(args, scope)?));
        }
        match self.model_expr(e, scope)? {
            Expr::Bool(b) => Ok(b),
            Expr::Int(_) => Err(ModelError::TypeMismatch {
                expected: Type::Bool,
                got: Type::Int,
                context: describe_expr(e),
            }),
        }
    }

    fn model_sym_args(
        &self,
        args: &[ast::Expr],
        scope: &Scope<'_>,
    ) -> Result<Vec<Expr<String>>, ModelError> {
        args.iter().map(|a| self.model_expr(a, scope)).collect()
    }

    // -----------------------------------------------------------
    // Constraints
    // -----------------------------------------------------------

    fn model_constraint(&self, c: &ast::ConstraintDecl) -> Result<ViewDef, ModelError> {
        let mut view = Vec::new();
        let mut params: IndexMap<String, Type> = IndexMap::new();
        for sig in &c.signature {
            let proto = self
                .protos
                .get(&sig.name)
                .ok_or_else(|| ModelError::UnknownView(sig.name.clone()))?;
            if sig.params.len() != proto.params.len() {
                return Err(ModelError::ArityMismatch {
                    proto: sig.name.clone(),
                    expected: proto.params.len(),
                    got: sig.params.len(),
                });
            }
            let mut func_params = Vec::new();
            for (formal, actual) in proto.params.iter().zip(&sig.params) {
                if params.insert(actual.clone(), formal.ty).is_some() {
                    return Err(ModelError::DuplicateName {
                        name: actual.clone(),
                        scope: "constraint signature".into(),
                    });
                }
                func_params.push(TypedVar::new(actual.clone(), formal.ty));
            }
            let iterator = match &sig.iterator {
                Some(it) => {
                    if !proto.iterated {
                        return Err(ModelError::NotIterated(sig.name.clone()));
                    }
                    if params.insert(it.clone(), Type::Int).is_some() {
                        return Err(ModelError::DuplicateName {
                            name: it.clone(),
                            scope: "constraint signature".into(),
                        });
                    }
                    Some(TypedVar::new(it.clone(), Type::Int))
                }
                None => None,
            };
            view.push(Iterated {
                func: Func::new(sig.name.clone(), func_params),
                iterator,
            });
        }

        match &c.body {
            ast::ConstraintBody::Indefinite => Ok(ViewDef::Indefinite { view }),
            ast::ConstraintBody::Definite(body) => {
                // A body that is exactly one nullary symbol is opaque.
                if let ast::Expr::Symbol { name, args } = body {
                    if args.is_empty() {
                        return Ok(ViewDef::Uninterpreted {
                            view,
                            symbol: name.clone(),
                        });
                    }
                }
                let body = self.model_bool_expr(body, &Scope::Constraint(&params))?;
                Ok(ViewDef::Definite { view, body })
            }
        }
    }

    // -----------------------------------------------------------
    // Views in assertions
    // -----------------------------------------------------------

    fn model_assertion(
        &self,
        a: &ast::ViewAssertion,
    ) -> Result<ViewExpr<CView<MarkedVar>>, ModelError> {
        let cview = self.model_cview(&a.view)?;
        // Assertions describe the state at their program point: pre-state.
        let marked = map_cview_vars(&cview, &|v: &String| Mark::Before.var(v.as_str()));
        Ok(if a.advisory {
            ViewExpr::Advisory(marked)
        } else {
            ViewExpr::Mandatory(marked)
        })
    }

    fn model_cview(&self, v: &ast::ViewAst) -> Result<CView<String>, ModelError> {
        match v {
            ast::ViewAst::Emp => Ok(Multiset::new()),
            ast::ViewAst::Func(fa) => Ok(Multiset::singleton(CFunc::Func(self.model_vfunc(fa)?))),
            ast::ViewAst::Join(l, r) => Ok(self.model_cview(l)?.union(self.model_cview(r)?)),
            ast::ViewAst::If {
                cond,
                then_view,
                else_view,
            } => {
                let cond = self.model_bool_expr(cond, &Scope::Method)?;
                Ok(Multiset::singleton(CFunc::Ite(
                    cond,
                    self.model_cview(then_view)?,
                    self.model_cview(else_view)?,
                )))
            }
            ast::ViewAst::Iterated { func, count } => {
                let proto = self
                    .protos
                    .get(&func.name)
                    .ok_or_else(|| ModelError::UnknownView(func.name.clone()))?;
                if !proto.iterated {
                    return Err(ModelError::NotIterated(func.name.clone()));
                }
                match self.model_int_expr(count, &Scope::Method)? {
                    IntExpr::Lit(n) if n >= 0 => {
                        let mut m = Multiset::new();
                        m.insert(CFunc::Func(self.model_vfunc(func)?), n as usize);
                        Ok(m)
                    }
                    other => Err(ModelError::NonConstantIteration(other.to_string())),
                }
            }
        }
    }

    fn model_vfunc(&self, fa: &ast::FuncAst) -> Result<VFunc<String>, ModelError> {
        let proto = self
            .protos
            .get(&fa.name)
            .ok_or_else(|| ModelError::UnknownView(fa.name.clone()))?;
        if fa.args.len() != proto.params.len() {
            return Err(ModelError::ArityMismatch {
                proto: fa.name.clone(),
                expected: proto.params.len(),
                got: fa.args.len(),
            });
        }
        let mut args = Vec::new();
        for (formal, actual) in proto.params.iter().zip(&fa.args) {
            args.push(self.model_typed_expr(actual, formal.ty, &Scope::Method)?);
        }
        Ok(Func::new(fa.name.clone(), args))
    }

    // -----------------------------------------------------------
    // Method bodies
    // -----------------------------------------------------------

    fn model_block(
        &self,
        b: &ast::BlockAst,
    ) -> Result<Block<ViewExpr<CView<MarkedVar>>>, ModelError> {
        let pre = self.model_assertion(&b.pre.node)?;
        let mut steps = Vec::new();
        for (stmt, view) in &b.steps {
            let cmd = self.model_statement(&stmt.node)?;
            let post = self.model_assertion(&view.node)?;
            steps.push((cmd, post));
        }
        Ok(Block { pre, steps })
    }

    fn model_statement(
        &self,
        s: &ast::Statement,
    ) -> Result<PartCmd<ViewExpr<CView<MarkedVar>>>, ModelError> {
        match s {
            ast::Statement::Atomic(stmts) => Ok(PartCmd::Prim(self.model_atomic(stmts)?)),
            ast::Statement::If {
                cond,
                then_block,
                else_block,
            } => {
                let cond = self
                    .model_bool_expr(cond, &Scope::Method)?
                    .marked(Mark::Before);
                let then_block = self.model_block(then_block)?;
                let else_block = match else_block {
                    Some(b) => self.model_block(b)?,
                    // A missing else branch passes straight through; its
                    // synthesised view is advisory so downstream passes may
                    // elide it.
                    None => Block {
                        pre: ViewExpr::Advisory(Multiset::new()),
                        steps: Vec::new(),
                    },
                };
                Ok(PartCmd::Ite {
                    cond,
                    then_block,
                    else_block,
                })
            }
            ast::Statement::While { is_do, cond, body } => {
                let cond = self
                    .model_bool_expr(cond, &Scope::Method)?
                    .marked(Mark::Before);
                Ok(PartCmd::While {
                    is_do: *is_do,
                    cond,
                    inner: self.model_block(body)?,
                })
            }
        }
    }

    fn lvalue(&self, name: &str) -> Result<TypedVar, ModelError> {
        let ty = self.lookup(&Scope::Method, name)?;
        Ok(TypedVar::new(name, ty))
    }

    fn model_atomic(&self, stmts: &[ast::AtomicStmt]) -> Result<Command<MarkedVar>, ModelError> {
        if stmts.is_empty() {
            return Err(ModelError::BadAtomicBlock {
                reason: "atomic block contains no steps".into(),
            });
        }
        stmts.iter().map(|s| self.model_atomic_stmt(s)).collect()
    }

    fn model_atomic_stmt(&self, s: &ast::AtomicStmt) -> Result<CommandType<MarkedVar>, ModelError> {
        let scope = Scope::Method;
        match s {
            ast::AtomicStmt::Assign { dest, rhs } => {
                let dest = self.lvalue(dest)?;
                if let ast::Expr::Var(src) = rhs {
                    // A bare-variable right-hand side is a fetch.
                    let src_ty = self.lookup(&scope, src)?;
                    if src_ty != dest.ty {
                        return Err(ModelError::TypeMismatch {
                            expected: dest.ty,
                            got: src_ty,
                            context: src.clone(),
                        });
                    }
                    let prim = match dest.ty {
                        Type::Int => "load_direct_int",
                        Type::Bool => "load_direct_bool",
                    };
                    let param = var_expr(&TypedVar::new(src.clone(), src_ty), Mark::Before);
                    Ok(CommandType::new(vec![dest], prim, vec![param]))
                } else {
                    let prim = match dest.ty {
                        Type::Int => "store_int",
                        Type::Bool => "store_bool",
                    };
                    let rhs = self
                        .model_typed_expr(rhs, dest.ty, &scope)?
                        .marked(Mark::Before);
                    Ok(CommandType::new(vec![dest], prim, vec![rhs]))
                }
            }
            ast::AtomicStmt::Fetch { dest, src, mode } => {
                let dest = self.lvalue(dest)?;
                let src_ty = self.lookup(&scope, src)?;
                for (name, ty) in [(dest.name.as_str(), dest.ty), (src.as_str(), src_ty)] {
                    if ty != Type::Int {
                        return Err(ModelError::TypeMismatch {
                            expected: Type::Int,
                            got: ty,
                            context: name.to_string(),
                        });
                    }
                }
                let prim = match mode {
                    ast::FetchMode::Increment => "load_inc",
                    ast::FetchMode::Decrement => "load_dec",
                    ast::FetchMode::Direct => "load_direct_int",
                };
                let param = var_expr(&TypedVar::new(src.clone(), Type::Int), Mark::Before);
                Ok(CommandType::new(vec![dest], prim, vec![param]))
            }
            ast::AtomicStmt::Postfix { dest, mode } => {
                let dest = self.lvalue(dest)?;
                if dest.ty != Type::Int {
                    return Err(ModelError::TypeMismatch {
                        expected: Type::Int,
                        got: dest.ty,
                        context: dest.name.clone(),
                    });
                }
                let prim = match mode {
                    ast::FetchMode::Decrement => "decr",
                    _ => "incr",
                };
                Ok(CommandType::new(vec![dest], prim, vec![]))
            }
            ast::AtomicStmt::Cas { dest, test, set } => {
                let dest = self.lvalue(dest)?;
                let test = self.lvalue(test)?;
                if test.ty != dest.ty {
                    return Err(ModelError::TypeMismatch {
                        expected: dest.ty,
                        got: test.ty,
                        context: test.name.clone(),
                    });
                }
                let set = self
                    .model_typed_expr(set, dest.ty, &scope)?
                    .marked(Mark::Before);
                let prim = match dest.ty {
                    Type::Int => "cas_int",
                    Type::Bool => "cas_bool",
                };
                Ok(CommandType::new(vec![dest, test], prim, vec![set]))
            }
            ast::AtomicStmt::Assume(e) => {
                let cond = self.model_bool_expr(e, &scope)?.marked(Mark::Before);
                Ok(CommandType::new(vec![], "assume", vec![Expr::Bool(cond)]))
            }
            ast::AtomicStmt::SymCall { sym, args } => {
                let args = self.model_sym_args(args, &scope)?;
                let rel = BoolExpr::sym(sym.clone(), args).marked(Mark::Before);
                Ok(CommandType::new(vec![], "sym", vec![Expr::Bool(rel)]))
            }
            ast::AtomicStmt::Skip => Ok(CommandType::new(vec![], "id", vec![])),
        }
    }
}

/// Human-readable description of an expression position for diagnostics.
fn describe_expr(e: &ast::Expr) -> String {
    match e {
        ast::Expr::Var(name) => name.clone(),
        other => other.to_string(),
    }
}

fn var_expr(tv: &TypedVar, mark: Mark) -> Expr<MarkedVar> {
    match tv.ty {
        Type::Int => Expr::Int(IntExpr::var(mark.var(tv.name.as_str()))),
        Type::Bool => Expr::Bool(BoolExpr::var(mark.var(tv.name.as_str()))),
    }
}

// ---------------------------------------------------------------
// Primitive semantics
// ---------------------------------------------------------------

fn ib(n: &str) -> IntExpr<MarkedVar> {
    IntExpr::var(Mark::Before.var(n))
}

fn ia(n: &str) -> IntExpr<MarkedVar> {
    IntExpr::var(Mark::After.var(n))
}

fn bb(n: &str) -> BoolExpr<MarkedVar> {
    BoolExpr::var(Mark::Before.var(n))
}

fn ba(n: &str) -> BoolExpr<MarkedVar> {
    BoolExpr::var(Mark::After.var(n))
}

fn ieq(l: IntExpr<MarkedVar>, r: IntExpr<MarkedVar>) -> BoolExpr<MarkedVar> {
    BoolExpr::eq(Expr::Int(l), Expr::Int(r))
}

fn beq(l: BoolExpr<MarkedVar>, r: BoolExpr<MarkedVar>) -> BoolExpr<MarkedVar> {
    BoolExpr::eq(Expr::Bool(l), Expr::Bool(r))
}

fn cas_relation(
    eq_before: BoolExpr<MarkedVar>,
    hit: BoolExpr<MarkedVar>,
    miss: BoolExpr<MarkedVar>,
) -> BoolExpr<MarkedVar> {
    BoolExpr::And(vec![
        BoolExpr::Implies(Box::new(eq_before.clone()), Box::new(hit)),
        BoolExpr::Implies(Box::new(eq_before.not()), Box::new(miss)),
    ])
}

/// The relation defining each atomic primitive over Before/After marks.
///
/// Formals are listed results-first; instantiation substitutes actuals
/// positionally.
fn primitive_semantics() -> Vec<(DFunc, BoolExpr<MarkedVar>)> {
    let int = |n: &str| TypedVar::new(n, Type::Int);
    let boolean = |n: &str| TypedVar::new(n, Type::Bool);
    vec![
        (
            Func::new("load_direct_int", vec![int("d"), int("s")]),
            BoolExpr::And(vec![ieq(ia("d"), ib("s")), ieq(ia("s"), ib("s"))]),
        ),
        (
            Func::new("load_direct_bool", vec![boolean("d"), boolean("s")]),
            BoolExpr::And(vec![beq(ba("d"), bb("s")), beq(ba("s"), bb("s"))]),
        ),
        (
            Func::new("load_inc", vec![int("d"), int("s")]),
            BoolExpr::And(vec![
                ieq(ia("d"), ib("s")),
                ieq(ia("s"), IntExpr::Add(vec![ib("s"), IntExpr::Lit(1)])),
            ]),
        ),
        (
            Func::new("load_dec", vec![int("d"), int("s")]),
            BoolExpr::And(vec![
                ieq(ia("d"), ib("s")),
                ieq(ia("s"), IntExpr::Sub(vec![ib("s"), IntExpr::Lit(1)])),
            ]),
        ),
        (
            Func::new("store_int", vec![int("d"), int("x")]),
            ieq(ia("d"), ib("x")),
        ),
        (
            Func::new("store_bool", vec![boolean("d"), boolean("x")]),
            beq(ba("d"), bb("x")),
        ),
        (
            Func::new("incr", vec![int("x")]),
            ieq(ia("x"), IntExpr::Add(vec![ib("x"), IntExpr::Lit(1)])),
        ),
        (
            Func::new("decr", vec![int("x")]),
            ieq(ia("x"), IntExpr::Sub(vec![ib("x"), IntExpr::Lit(1)])),
        ),
        (
            Func::new("cas_int", vec![int("d"), int("t"), int("s")]),
            cas_relation(
                ieq(ib("d"), ib("t")),
                BoolExpr::And(vec![ieq(ia("d"), ib("s")), ieq(ia("t"), ib("t"))]),
                BoolExpr::And(vec![ieq(ia("d"), ib("d")), ieq(ia("t"), ib("d"))]),
            ),
        ),
        (
            Func::new("cas_bool", vec![boolean("d"), boolean("t"), boolean("s")]),
            cas_relation(
                beq(bb("d"), bb("t")),
                BoolExpr::And(vec![beq(ba("d"), bb("s")), beq(ba("t"), bb("t"))]),
                BoolExpr::And(vec![beq(ba("d"), bb("d")), beq(ba("t"), bb("d"))]),
            ),
        ),
        (Func::new("id", vec![]), BoolExpr::Lit(true)),
        (Func::new("assume", vec![boolean("b")]), bb("b")),
        // The opaque relation of a symbol command; never framed.
        (Func::new("sym", vec![boolean("b")]), bb("b")),
    ]
}

// ---------------------------------------------------------------
// Semantics instantiation
// ---------------------------------------------------------------

type SubstMap<'a> = IndexMap<&'a str, &'a Expr<MarkedVar>>;

fn subst_expr(e: &Expr<MarkedVar>, map: &SubstMap<'_>) -> Result<Expr<MarkedVar>, ModelError> {
    match e {
        Expr::Int(i) => Ok(Expr::Int(subst_int(i, map)?)),
        Expr::Bool(b) => Ok(Expr::Bool(subst_bool(b, map)?)),
    }
}

fn subst_sym_args(
    name: &str,
    args: &[Expr<MarkedVar>],
    map: &SubstMap<'_>,
) -> Result<Sym<MarkedVar>, ModelError> {
    Ok(Sym::Sym {
        name: name.to_string(),
        args: args
            .iter()
            .map(|a| subst_expr(a, map))
            .collect::<Result<_, _>>()?,
    })
}

fn subst_int(e: &IntExpr<MarkedVar>, map: &SubstMap<'_>) -> Result<IntExpr<MarkedVar>, ModelError> {
    match e {
        IntExpr::Lit(n) => Ok(IntExpr::Lit(*n)),
        IntExpr::Var(Sym::Sym { name, args }) => Ok(IntExpr::Var(subst_sym_args(name, args, map)?)),
        IntExpr::Var(Sym::Reg(mv)) => match map.get(mv.name.as_str()) {
            None => Ok(e.clone()),
            Some(Expr::Int(IntExpr::Var(Sym::Reg(av)))) => {
                // Variable actual: the occurrence keeps its own mark.
                Ok(IntExpr::var(mv.mark.var(av.name.as_str())))
            }
            Some(Expr::Int(actual)) => {
                if mv.mark == Mark::Before {
                    Ok(actual.clone())
                } else {
                    Err(ModelError::BadAtomicBlock {
                        reason: format!("assignment to read-only expression '{actual}'"),
                    })
                }
            }
            Some(Expr::Bool(actual)) => Err(ModelError::TypeMismatch {
                expected: Type::Int,
                got: Type::Bool,
                context: actual.to_string(),
            }),
        },
        IntExpr::Add(xs) => Ok(IntExpr::Add(
            xs.iter().map(|x| subst_int(x, map)).collect::<Result<_, _>>()?,
        )),
        IntExpr::Sub(xs) => Ok(IntExpr::Sub(
            xs.iter().map(|x| subst_int(x, map)).collect::<Result<_, _>>()?,
        )),
        IntExpr::Mul(xs) => Ok(IntExpr::Mul(
            xs.iter().map(|x| subst_int(x, map)).collect::<Result<_, _>>()?,
        )),
        IntExpr::Div(n, d) => Ok(IntExpr::div(subst_int(n, map)?, subst_int(d, map)?)),
    }
}

fn subst_bool(
    e: &BoolExpr<MarkedVar>,
    map: &SubstMap<'_>,
) -> Result<BoolExpr<MarkedVar>, ModelError> {
    match e {
        BoolExpr::Lit(b) => Ok(BoolExpr::Lit(*b)),
        BoolExpr::Var(Sym::Sym { name, args }) => {
            Ok(BoolExpr::Var(subst_sym_args(name, args, map)?))
        }
        BoolExpr::Var(Sym::Reg(mv)) => match map.get(mv.name.as_str()) {
            None => Ok(e.clone()),
            Some(Expr::Bool(BoolExpr::Var(Sym::Reg(av)))) => {
                Ok(BoolExpr::var(mv.mark.var(av.name.as_str())))
            }
            Some(Expr::Bool(actual)) => {
                if mv.mark == Mark::Before {
                    Ok(actual.clone())
                } else {
                    Err(ModelError::BadAtomicBlock {
                        reason: format!("assignment to read-only expression '{actual}'"),
                    })
                }
            }
            Some(Expr::Int(actual)) => Err(ModelError::TypeMismatch {
                expected: Type::Bool,
                got: Type::Int,
                context: actual.to_string(),
            }),
        },
        BoolExpr::And(xs) => Ok(BoolExpr::And(
            xs.iter().map(|x| subst_bool(x, map)).collect::<Result<_, _>>()?,
        )),
        BoolExpr::Or(xs) => Ok(BoolExpr::Or(
            xs.iter().map(|x| subst_bool(x, map)).collect::<Result<_, _>>()?,
        )),
        BoolExpr::Not(x) => Ok(subst_bool(x, map)?.not()),
        BoolExpr::Implies(l, r) => Ok(BoolExpr::Implies(
            Box::new(subst_bool(l, map)?),
            Box::new(subst_bool(r, map)?),
        )),
        BoolExpr::Eq(l, r) => Ok(BoolExpr::eq(subst_expr(l, map)?, subst_expr(r, map)?)),
        BoolExpr::Gt(l, r) => Ok(BoolExpr::gt(subst_int(l, map)?, subst_int(r, map)?)),
        BoolExpr::Ge(l, r) => Ok(BoolExpr::ge(subst_int(l, map)?, subst_int(r, map)?)),
        BoolExpr::Lt(l, r) => Ok(BoolExpr::lt(subst_int(l, map)?, subst_int(r, map)?)),
        BoolExpr::Le(l, r) => Ok(BoolExpr::le(subst_int(l, map)?, subst_int(r, map)?)),
    }
}

impl<A, D> Model<A, D> {
    /// Instantiate the semantic relation of one primitive invocation:
    /// substitute actuals for formals, then pin every shared variable the
    /// command does not write (`v!after == v!before`). Symbol commands are
    /// opaque and never framed.
    pub fn instantiate_semantics(
        &self,
        cmd: &CommandType<MarkedVar>,
    ) -> Result<BoolExpr<MarkedVar>, ModelError> {
        let (sig, relation) = self
            .semantics
            .iter()
            .find(|(s, _)| s.name == cmd.name)
            .ok_or_else(|| ModelError::UnknownPrimitive(cmd.name.clone()))?;

        let mut actuals: Vec<Expr<MarkedVar>> = cmd
            .results
            .iter()
            .map(|r| var_expr(r, Mark::Before))
            .collect();
        actuals.extend(cmd.params.iter().cloned());
        if actuals.len() != sig.params.len() {
            return Err(ModelError::ArityMismatch {
                proto: cmd.name.clone(),
                expected: sig.params.len(),
                got: actuals.len(),
            });
        }
        let map: SubstMap<'_> = sig
            .params
            .iter()
            .map(|f| f.name.as_str())
            .zip(actuals.iter())
            .collect();
        let instantiated = subst_bool(relation, &map)?;

        if cmd.name == "sym" {
            return Ok(instantiated);
        }
        let written: BTreeSet<String> = instantiated
            .free_vars()
            .into_iter()
            .filter(|v| v.mark == Mark::After)
            .map(|v| v.name)
            .collect();
        let mut conjuncts = vec![instantiated];
        for (g, ty) in &self.globals {
            if !written.contains(g) {
                conjuncts.push(match ty {
                    Type::Int => ieq(ia(g), ib(g)),
                    Type::Bool => beq(ba(g), bb(g)),
                });
            }
        }
        Ok(BoolExpr::and(conjuncts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starling_dsl::{collate, parse};

    fn model_source(src: &str) -> Result<CViewModel, ModelError> {
        let script = parse(src, "test.cvf").expect("test source must parse");
        model(&collate(script))
    }

    const TICKET_LOCK: &str = "
        shared int ticket;
        shared int serving;
        thread int t;
        thread int s;

        view holdTick(int t);
        view holdLock();

        constraint emp -> ticket >= serving;
        constraint holdTick(t) -> ticket > t;
        constraint holdLock() -> ticket != serving;

        method lock() {
            {| emp |}
              <t = ticket++>;
            {| holdTick(t) |}
              do {
                {| holdTick(t) |}
                  <s = serving>;
                {| if s == t then holdLock() else holdTick(t) |}
              } while (s != t);
            {| holdLock() |}
        }

        method unlock() {
            {| holdLock() |}
              <serving++>;
            {| emp |}
        }
    ";

    #[test]
    fn empty_script_models_to_empty_maps() {
        let m = model_source("").unwrap();
        assert!(m.globals.is_empty());
        assert!(m.locals.is_empty());
        assert!(m.axioms.is_empty());
        assert!(m.view_defs.is_empty());
    }

    #[test]
    fn ticket_lock_variable_maps() {
        let m = model_source(TICKET_LOCK).unwrap();
        let globals: Vec<_> = m.globals.iter().map(|(n, t)| (n.as_str(), *t)).collect();
        assert_eq!(
            globals,
            vec![("ticket", Type::Int), ("serving", Type::Int)]
        );
        let locals: Vec<_> = m.locals.keys().map(String::as_str).collect();
        assert_eq!(locals, vec!["t", "s"]);
    }

    #[test]
    fn ticket_lock_has_three_view_defs_and_two_axioms() {
        let m = model_source(TICKET_LOCK).unwrap();
        assert_eq!(m.view_defs.len(), 3);
        assert!(m
            .view_defs
            .iter()
            .all(|d| matches!(d, ViewDef::Definite { .. })));
        let methods: Vec<_> = m.axioms.keys().map(String::as_str).collect();
        assert_eq!(methods, vec!["lock", "unlock"]);
    }

    #[test]
    fn conditional_view_models_to_a_single_ite_cfunc() {
        let m = model_source(TICKET_LOCK).unwrap();
        let lock = &m.axioms["lock"];
        let PartCmd::While { inner, .. } = &lock.steps[1].0 else {
            panic!("expected do-while");
        };
        let view = inner.steps[0].1.view();
        assert_eq!(view.len(), 1);
        let (cfunc, _) = view.iter().next().unwrap();
        match cfunc {
            CFunc::Ite(cond, then_view, else_view) => {
                assert_eq!(
                    *cond,
                    BoolExpr::eq(
                        Expr::Int(ib("s")),
                        Expr::Int(ib("t")),
                    )
                );
                assert_eq!(then_view.len(), 1);
                assert_eq!(else_view.len(), 1);
            }
            other => panic!("expected ITE cfunc, got {other:?}"),
        }
    }

    #[test]
    fn fetch_models_to_load_inc() {
        let m = model_source(TICKET_LOCK).unwrap();
        let lock = &m.axioms["lock"];
        let PartCmd::Prim(cmd) = &lock.steps[0].0 else {
            panic!("expected prim");
        };
        assert_eq!(cmd[0].name, "load_inc");
        assert_eq!(cmd[0].results, vec![TypedVar::new("t", Type::Int)]);
    }

    #[test]
    fn boolean_context_type_error_cites_the_variable() {
        let err = model_source("shared int x; constraint emp -> x && true;").unwrap_err();
        match err {
            ModelError::TypeMismatch {
                expected,
                got,
                context,
            } => {
                assert_eq!(expected, Type::Bool);
                assert_eq!(got, Type::Int);
                assert_eq!(context, "x");
            }
            other => panic!("expected TypeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_shared_name_is_rejected() {
        let err = model_source("shared int x; shared int x;").unwrap_err();
        assert!(matches!(
            err,
            ModelError::DuplicateName { ref scope, .. } if scope == "shared"
        ));
    }

    #[test]
    fn shared_thread_clash_is_rejected() {
        let err = model_source("shared int x; thread int x;").unwrap_err();
        assert!(matches!(
            err,
            ModelError::DuplicateName { ref scope, .. } if scope == "shared/thread"
        ));
    }

    #[test]
    fn thread_local_in_constraint_is_a_scope_violation() {
        let err = model_source(
            "shared int g; thread int t; view v(); constraint v() -> g > t;",
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::ConstraintScopeViolation(ref n) if n == "t"));
    }

    #[test]
    fn unknown_view_in_constraint_is_rejected() {
        let err = model_source("constraint ghost() -> true;").unwrap_err();
        assert!(matches!(err, ModelError::UnknownView(ref n) if n == "ghost"));
    }

    #[test]
    fn view_arity_mismatch_is_rejected() {
        let err =
            model_source("view v(int a); constraint v(x, y) -> true;").unwrap_err();
        assert!(matches!(
            err,
            ModelError::ArityMismatch { ref proto, expected: 1, got: 2 } if proto == "v"
        ));
    }

    #[test]
    fn unconstrained_proto_gets_an_indefinite_def() {
        let m = model_source("view v(int a);").unwrap();
        assert_eq!(m.view_defs.len(), 1);
        match &m.view_defs[0] {
            ViewDef::Indefinite { view } => {
                assert_eq!(view[0].func.name, "v");
            }
            other => panic!("expected indefinite def, got {other:?}"),
        }
    }

    #[test]
    fn nullary_symbol_body_is_uninterpreted() {
        let m = model_source("view v(); constraint v() -> %{opaque};").unwrap();
        assert!(matches!(
            &m.view_defs[0],
            ViewDef::Uninterpreted { symbol, .. } if symbol == "opaque"
        ));
    }

    #[test]
    fn applied_symbol_body_stays_definite() {
        let m = model_source("shared int g; view v(); constraint v() -> %{bound}(g);").unwrap();
        assert!(matches!(&m.view_defs[0], ViewDef::Definite { .. }));
    }

    #[test]
    fn iterated_assertion_expands_literal_counts() {
        let m = model_source(
            "view iter handle(); method m() { {| iter[3] handle() |} <id>; {| emp |} }",
        )
        .unwrap();
        let body = &m.axioms["m"];
        let view = body.pre.view();
        assert_eq!(view.len(), 3);
    }

    #[test]
    fn iterated_assertion_on_plain_view_is_rejected() {
        let err = model_source(
            "view handle(); method m() { {| iter[3] handle() |} <id>; {| emp |} }",
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::NotIterated(ref n) if n == "handle"));
    }

    #[test]
    fn empty_atomic_block_is_rejected() {
        let err = model_source("method m() { {| emp |} <{ }>; {| emp |} }").unwrap_err();
        assert!(matches!(err, ModelError::BadAtomicBlock { .. }));
    }

    #[test]
    fn cas_models_into_the_two_branch_relation() {
        let m = model_source(
            "shared bool lock; thread bool test;
             method acquire() { {| emp |} <CAS(lock, test, true)>; {| emp |} }",
        )
        .unwrap();
        let PartCmd::Prim(cmd) = &m.axioms["acquire"].steps[0].0 else {
            panic!("expected prim");
        };
        assert_eq!(cmd[0].name, "cas_bool");
        let rel = m.instantiate_semantics(&cmd[0]).unwrap();
        // Both branches instantiated; `lock` and `test` are written, and the
        // only shared variable is `lock`, so no frame conjuncts remain.
        let BoolExpr::And(branches) = rel else {
            panic!("expected two-branch conjunction, got {rel}");
        };
        assert_eq!(branches.len(), 2);
        let BoolExpr::Implies(hit_cond, hit) = &branches[0] else {
            panic!("expected implication");
        };
        assert_eq!(
            **hit_cond,
            beq(bb("lock"), bb("test"))
        );
        assert_eq!(
            **hit,
            BoolExpr::And(vec![
                beq(ba("lock"), BoolExpr::Lit(true)),
                beq(ba("test"), bb("test")),
            ])
        );
        assert!(matches!(&branches[1], BoolExpr::Implies(..)));
    }

    #[test]
    fn store_frames_untouched_shared_variables() {
        let m = model_source(
            "shared int a; shared int b;
             method m() { {| emp |} <a = 5>; {| emp |} }",
        )
        .unwrap();
        let PartCmd::Prim(cmd) = &m.axioms["m"].steps[0].0 else {
            panic!("expected prim");
        };
        let rel = m.instantiate_semantics(&cmd[0]).unwrap();
        let BoolExpr::And(conjuncts) = rel else {
            panic!("expected conjunction");
        };
        assert_eq!(conjuncts[0], ieq(ia("a"), IntExpr::Lit(5)));
        assert_eq!(conjuncts[1], ieq(ia("b"), ib("b")));
    }

    #[test]
    fn assume_pins_every_shared_variable() {
        let m = model_source(
            "shared int g; thread int t;
             method m() { {| emp |} <assume(t < 3)>; {| emp |} }",
        )
        .unwrap();
        let PartCmd::Prim(cmd) = &m.axioms["m"].steps[0].0 else {
            panic!("expected prim");
        };
        let rel = m.instantiate_semantics(&cmd[0]).unwrap();
        let BoolExpr::And(conjuncts) = rel else {
            panic!("expected conjunction");
        };
        assert_eq!(conjuncts.len(), 2);
        assert_eq!(conjuncts[0], BoolExpr::lt(ib("t"), IntExpr::Lit(3)));
        assert_eq!(conjuncts[1], ieq(ia("g"), ib("g")));
    }

    #[test]
    fn symbol_command_is_lifted_unframed() {
        let m = model_source(
            "shared int g;
             method m() { {| emp |} <%{havoc}(g)>; {| emp |} }",
        )
        .unwrap();
        let PartCmd::Prim(cmd) = &m.axioms["m"].steps[0].0 else {
            panic!("expected prim");
        };
        let rel = m.instantiate_semantics(&cmd[0]).unwrap();
        match rel {
            BoolExpr::Var(Sym::Sym { name, args }) => {
                assert_eq!(name, "havoc");
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected bare symbol relation, got {other:?}"),
        }
    }

    #[test]
    fn unknown_method_parameter_is_rejected() {
        let err = model_source("method m(ghost) { {| emp |} <id>; {| emp |} }").unwrap_err();
        assert!(matches!(err, ModelError::UnknownIdentifier(ref n) if n == "ghost"));
    }

    #[test]
    fn duplicate_method_name_is_rejected() {
        let err = model_source(
            "method m() { {| emp |} <id>; {| emp |} }
             method m() { {| emp |} <id>; {| emp |} }",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ModelError::DuplicateName { ref scope, .. } if scope == "methods"
        ));
    }

    #[test]
    fn modelling_is_deterministic() {
        let a = model_source(TICKET_LOCK).unwrap();
        let b = model_source(TICKET_LOCK).unwrap();
        assert_eq!(a, b);
    }
}
