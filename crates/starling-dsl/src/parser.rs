// ParseError carries diagnostic spans and source fragments; boxing would lose
// the zero-copy benefit and complicate call sites throughout the crate.
#![allow(clippy::result_large_err)]

use pest::Parser;
use pest_derive::Parser;

use crate::ast::*;
use crate::errors::ParseError;

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct StarlingParser;

type Pair<'a> = pest::iterators::Pair<'a, Rule>;

fn span_from(pair: &Pair<'_>) -> Span {
    let s = pair.as_span();
    Span::new(s.start(), s.end())
}

fn syntax_error_at(pair: &Pair<'_>, message: impl Into<String>) -> ParseError {
    ParseError::syntax(message, span_from(pair), "", "")
}

/// Extract the next child from a pest iterator, returning a descriptive error
/// instead of panicking. The grammar guarantees structure, but we prefer
/// graceful errors in the pair-walking phase.
fn next_child<'a>(
    iter: &mut pest::iterators::Pairs<'a, Rule>,
    context: &str,
) -> Result<Pair<'a>, ParseError> {
    iter.next().ok_or_else(|| {
        ParseError::syntax(format!("expected child in {context}"), Span::new(0, 0), "", "")
    })
}

/// Parse a proof script into its item sequence.
///
/// # Parameters
/// - `source`: UTF-8 script text.
/// - `filename`: Logical filename used in diagnostics.
pub fn parse(source: &str, filename: &str) -> Result<Script, ParseError> {
    let pairs = StarlingParser::parse(Rule::script, source).map_err(|e| {
        let (start, end) = match e.location {
            pest::error::InputLocation::Pos(p) => (p, (p + 1).min(source.len().max(1))),
            pest::error::InputLocation::Span((s, e)) => (s, e),
        };
        ParseError::syntax(format!("{e}"), Span::new(start, end), source, filename)
    })?;

    let script_pair = pairs.into_iter().next().ok_or_else(|| {
        ParseError::syntax("empty parse tree", Span::new(0, 0), source, filename)
    })?;

    let mut items = Vec::new();
    for item in script_pair.into_inner() {
        if item.as_rule() != Rule::script_item {
            continue; // EOI
        }
        let span = span_from(&item);
        let inner = next_child(&mut item.into_inner(), "script item")?;
        let node = parse_item(inner).map_err(|e| e.with_source_context(source, filename))?;
        items.push(Spanned::new(node, span));
    }
    Ok(items)
}

fn parse_item(pair: Pair<'_>) -> Result<ScriptItem, ParseError> {
    match pair.as_rule() {
        Rule::shared_decl => Ok(ScriptItem::SharedDecl(parse_decl(pair)?)),
        Rule::thread_decl => Ok(ScriptItem::ThreadDecl(parse_decl(pair)?)),
        Rule::view_proto => Ok(ScriptItem::ViewProto(parse_view_proto(pair)?)),
        Rule::constraint_decl => Ok(ScriptItem::Constraint(parse_constraint(pair)?)),
        Rule::method_decl => Ok(ScriptItem::Method(parse_method(pair)?)),
        other => Err(syntax_error_at(
            &pair,
            format!("unexpected top-level item {other:?}"),
        )),
    }
}

fn parse_type(pair: &Pair<'_>) -> Result<TypeLit, ParseError> {
    match pair.as_str() {
        "int" => Ok(TypeLit::Int),
        "bool" => Ok(TypeLit::Bool),
        other => Err(syntax_error_at(pair, format!("unknown type '{other}'"))),
    }
}

fn parse_decl(pair: Pair<'_>) -> Result<Vec<VarDecl>, ParseError> {
    let mut inner = pair.into_inner();
    let ty = parse_type(&next_child(&mut inner, "declaration type")?)?;
    let mut decls = Vec::new();
    for name in inner {
        decls.push(VarDecl {
            ty,
            name: name.as_str().to_string(),
        });
    }
    Ok(decls)
}

fn parse_view_proto(pair: Pair<'_>) -> Result<ViewProtoDecl, ParseError> {
    let mut iterated = false;
    let mut name = String::new();
    let mut params = Vec::new();
    let mut anonymous = true;
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::kw_iter => iterated = true,
            Rule::ident => name = item.as_str().to_string(),
            Rule::proto_param_list => {
                anonymous = false;
                for p in item.into_inner() {
                    let mut pi = p.into_inner();
                    let ty = parse_type(&next_child(&mut pi, "prototype parameter")?)?;
                    let pname = next_child(&mut pi, "prototype parameter")?;
                    params.push(VarDecl {
                        ty,
                        name: pname.as_str().to_string(),
                    });
                }
            }
            _ => {}
        }
    }
    Ok(ViewProtoDecl {
        name,
        params,
        iterated,
        anonymous,
    })
}

fn parse_constraint(pair: Pair<'_>) -> Result<ConstraintDecl, ParseError> {
    let mut inner = pair.into_inner();
    let sig_pair = next_child(&mut inner, "constraint signature")?;
    let mut signature = Vec::new();
    for atom in sig_pair.into_inner() {
        for part in atom.into_inner() {
            match part.as_rule() {
                Rule::kw_emp => {}
                Rule::func_sig => signature.push(parse_sig_func(part, None)?),
                Rule::iter_sig => {
                    let mut it = part.into_inner();
                    // kw_iter is the first pair, then the iterator name.
                    let _ = next_child(&mut it, "iter signature")?;
                    let iterator = next_child(&mut it, "iter signature")?.as_str().to_string();
                    let func = next_child(&mut it, "iter signature")?;
                    signature.push(parse_sig_func(func, Some(iterator))?);
                }
                _ => {}
            }
        }
    }
    let body_pair = next_child(&mut inner, "constraint body")?;
    let body_inner = next_child(&mut body_pair.into_inner(), "constraint body")?;
    let body = match body_inner.as_rule() {
        Rule::indefinite_body => ConstraintBody::Indefinite,
        _ => ConstraintBody::Definite(parse_expr(body_inner)?),
    };
    Ok(ConstraintDecl { signature, body })
}

fn parse_sig_func(pair: Pair<'_>, iterator: Option<String>) -> Result<SigFunc, ParseError> {
    let mut inner = pair.into_inner();
    let name = next_child(&mut inner, "signature func")?.as_str().to_string();
    let mut params = Vec::new();
    if let Some(list) = inner.next() {
        for p in list.into_inner() {
            params.push(p.as_str().to_string());
        }
    }
    Ok(SigFunc {
        name,
        params,
        iterator,
    })
}

fn parse_method(pair: Pair<'_>) -> Result<MethodDecl, ParseError> {
    let mut inner = pair.into_inner();
    let name = next_child(&mut inner, "method name")?.as_str().to_string();
    let params = next_child(&mut inner, "method parameters")?
        .into_inner()
        .map(|p| p.as_str().to_string())
        .collect();
    let body = parse_block(next_child(&mut inner, "method body")?)?;
    Ok(MethodDecl { name, params, body })
}

fn parse_block(pair: Pair<'_>) -> Result<BlockAst, ParseError> {
    let mut inner = pair.into_inner();
    let pre_pair = next_child(&mut inner, "block")?;
    let pre = Spanned::new(parse_view_assertion(pre_pair.clone())?, span_from(&pre_pair));
    let mut steps = Vec::new();
    while let Some(stmt_pair) = inner.next() {
        let stmt = Spanned::new(parse_statement(stmt_pair.clone())?, span_from(&stmt_pair));
        let view_pair = next_child(&mut inner, "view assertion after statement")?;
        let view = Spanned::new(
            parse_view_assertion(view_pair.clone())?,
            span_from(&view_pair),
        );
        steps.push((stmt, view));
    }
    Ok(BlockAst { pre, steps })
}

fn parse_view_assertion(pair: Pair<'_>) -> Result<ViewAssertion, ParseError> {
    let mut advisory = false;
    let mut view = ViewAst::Emp;
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::advisory_marker => advisory = true,
            Rule::view_join => view = parse_view_join(item)?,
            _ => {}
        }
    }
    Ok(ViewAssertion { advisory, view })
}

fn parse_view_join(pair: Pair<'_>) -> Result<ViewAst, ParseError> {
    let mut inner = pair.into_inner();
    let mut result = parse_view_atom(next_child(&mut inner, "view")?)?;
    for atom in inner {
        let rhs = parse_view_atom(atom)?;
        result = ViewAst::Join(Box::new(result), Box::new(rhs));
    }
    Ok(result)
}

fn parse_view_atom(pair: Pair<'_>) -> Result<ViewAst, ParseError> {
    let inner = next_child(&mut pair.into_inner(), "view atom")?;
    match inner.as_rule() {
        Rule::kw_emp => Ok(ViewAst::Emp),
        Rule::view_join => parse_view_join(inner),
        Rule::view_func => Ok(ViewAst::Func(parse_view_func(inner)?)),
        Rule::view_iter => {
            let mut it = inner.into_inner();
            let _ = next_child(&mut it, "iterated view")?; // kw_iter
            let count = parse_expr(next_child(&mut it, "iterated view")?)?;
            let func = parse_view_func(next_child(&mut it, "iterated view")?)?;
            Ok(ViewAst::Iterated { func, count })
        }
        Rule::view_if => {
            let mut it = inner.into_inner();
            let cond = parse_expr(next_child(&mut it, "conditional view")?)?;
            let then_view = parse_view_join(next_child(&mut it, "conditional view")?)?;
            let else_view = match it.next() {
                Some(e) => parse_view_join(e)?,
                None => ViewAst::Emp,
            };
            Ok(ViewAst::If {
                cond,
                then_view: Box::new(then_view),
                else_view: Box::new(else_view),
            })
        }
        other => Err(syntax_error_at(
            &inner,
            format!("unexpected view atom {other:?}"),
        )),
    }
}

fn parse_view_func(pair: Pair<'_>) -> Result<FuncAst, ParseError> {
    let mut inner = pair.into_inner();
    let name = next_child(&mut inner, "view func")?.as_str().to_string();
    let args = match inner.next() {
        Some(list) => parse_arg_list(list)?,
        None => Vec::new(),
    };
    Ok(FuncAst { name, args })
}

fn parse_arg_list(pair: Pair<'_>) -> Result<Vec<Expr>, ParseError> {
    pair.into_inner().map(parse_expr).collect()
}

fn parse_statement(pair: Pair<'_>) -> Result<Statement, ParseError> {
    let inner = next_child(&mut pair.into_inner(), "statement")?;
    match inner.as_rule() {
        Rule::atomic => {
            let block = next_child(&mut inner.into_inner(), "atomic")?;
            let body = next_child(&mut block.into_inner(), "atomic body")?;
            let stmts: Result<Vec<_>, _> = body.into_inner().map(parse_atomic_stmt).collect();
            Ok(Statement::Atomic(stmts?))
        }
        Rule::if_stmt => {
            let mut it = inner.into_inner();
            let cond = parse_expr(next_child(&mut it, "if condition")?)?;
            let then_block = parse_block(next_child(&mut it, "if body")?)?;
            let else_block = match it.next() {
                Some(b) => Some(parse_block(b)?),
                None => None,
            };
            Ok(Statement::If {
                cond,
                then_block,
                else_block,
            })
        }
        Rule::while_stmt => {
            let mut it = inner.into_inner();
            let cond = parse_expr(next_child(&mut it, "while condition")?)?;
            let body = parse_block(next_child(&mut it, "while body")?)?;
            Ok(Statement::While {
                is_do: false,
                cond,
                body,
            })
        }
        Rule::do_while_stmt => {
            let mut it = inner.into_inner();
            let body = parse_block(next_child(&mut it, "do body")?)?;
            let cond = parse_expr(next_child(&mut it, "do-while condition")?)?;
            Ok(Statement::While {
                is_do: true,
                cond,
                body,
            })
        }
        other => Err(syntax_error_at(
            &inner,
            format!("unexpected statement {other:?}"),
        )),
    }
}

fn parse_atomic_stmt(pair: Pair<'_>) -> Result<AtomicStmt, ParseError> {
    let inner = next_child(&mut pair.into_inner(), "atomic statement")?;
    match inner.as_rule() {
        Rule::cas_stmt => {
            let mut it = inner.into_inner();
            let dest = next_child(&mut it, "CAS")?.as_str().to_string();
            let test = next_child(&mut it, "CAS")?.as_str().to_string();
            let set = parse_expr(next_child(&mut it, "CAS")?)?;
            Ok(AtomicStmt::Cas { dest, test, set })
        }
        Rule::sym_stmt => {
            let sym = next_child(&mut inner.into_inner(), "symbol command")?;
            match parse_expr(sym)? {
                Expr::Symbol { name, args } => Ok(AtomicStmt::SymCall { sym: name, args }),
                _ => unreachable!("sym_stmt always wraps a symbol"),
            }
        }
        Rule::assign_stmt => {
            let mut it = inner.into_inner();
            let dest = next_child(&mut it, "assignment")?.as_str().to_string();
            let rhs_pair = next_child(&mut it, "assignment")?;
            let rhs_inner = next_child(&mut rhs_pair.into_inner(), "assignment rhs")?;
            match rhs_inner.as_rule() {
                Rule::fetch_rhs => {
                    let mut fi = rhs_inner.into_inner();
                    let src = next_child(&mut fi, "fetch")?.as_str().to_string();
                    let mode = match next_child(&mut fi, "fetch")?.as_str() {
                        "++" => FetchMode::Increment,
                        _ => FetchMode::Decrement,
                    };
                    Ok(AtomicStmt::Fetch { dest, src, mode })
                }
                _ => Ok(AtomicStmt::Assign {
                    dest,
                    rhs: parse_expr(rhs_inner)?,
                }),
            }
        }
        Rule::postfix_stmt => {
            let mut it = inner.into_inner();
            let dest = next_child(&mut it, "postfix")?.as_str().to_string();
            let mode = match next_child(&mut it, "postfix")?.as_str() {
                "++" => FetchMode::Increment,
                _ => FetchMode::Decrement,
            };
            Ok(AtomicStmt::Postfix { dest, mode })
        }
        Rule::call_stmt => {
            let span = span_from(&inner);
            let mut it = inner.into_inner();
            let name = next_child(&mut it, "call")?.as_str().to_string();
            let args = match it.next() {
                Some(list) => parse_arg_list(list)?,
                None => Vec::new(),
            };
            if name == "assume" && args.len() == 1 {
                let mut args = args;
                Ok(AtomicStmt::Assume(args.remove(0)))
            } else {
                Err(ParseError::unknown_primitive(name, span))
            }
        }
        Rule::bare_stmt => {
            let span = span_from(&inner);
            let name = next_child(&mut inner.into_inner(), "bare statement")?
                .as_str()
                .to_string();
            if name == "id" {
                Ok(AtomicStmt::Skip)
            } else {
                Err(ParseError::unknown_primitive(name, span))
            }
        }
        other => Err(syntax_error_at(
            &inner,
            format!("unexpected atomic statement {other:?}"),
        )),
    }
}

fn parse_expr(pair: Pair<'_>) -> Result<Expr, ParseError> {
    match pair.as_rule() {
        Rule::expr => parse_expr(next_child(&mut pair.into_inner(), "expression")?),
        Rule::or_expr
        | Rule::and_expr
        | Rule::eq_expr
        | Rule::rel_expr
        | Rule::add_expr
        | Rule::mul_expr => parse_binary(pair),
        Rule::unary_expr => {
            let span = span_from(&pair);
            let inner: Vec<_> = pair.into_inner().collect();
            if inner.len() == 2 {
                let operand = parse_expr(inner[1].clone())?;
                match inner[0].as_str() {
                    "!" => Ok(Expr::Not(Box::new(operand))),
                    "-" => Ok(Expr::Neg(Box::new(operand))),
                    other => Err(ParseError::syntax(
                        format!("unknown unary operator '{other}'"),
                        span,
                        "",
                        "",
                    )),
                }
            } else if inner.len() == 1 {
                // SAFETY: inner.len() == 1 checked above
                parse_expr(inner.into_iter().next().expect("len checked"))
            } else {
                Err(ParseError::syntax(
                    format!("unexpected unary expression shape ({} children)", inner.len()),
                    span,
                    "",
                    "",
                ))
            }
        }
        Rule::primary => parse_expr(next_child(&mut pair.into_inner(), "primary expression")?),
        Rule::int_literal => {
            let n: i64 = pair
                .as_str()
                .parse()
                .map_err(|e| syntax_error_at(&pair, format!("invalid integer literal: {e}")))?;
            Ok(Expr::IntLit(n))
        }
        Rule::bool_literal => Ok(Expr::BoolLit(pair.as_str() == "true")),
        Rule::ident => Ok(Expr::Var(pair.as_str().to_string())),
        Rule::symbol => {
            let mut inner = pair.into_inner();
            let name = next_child(&mut inner, "symbol")?.as_str().trim().to_string();
            let args = match inner.next() {
                Some(list) => parse_arg_list(list)?,
                None => Vec::new(),
            };
            Ok(Expr::Symbol { name, args })
        }
        _ => {
            // Fallthrough: descend into single children.
            let span = span_from(&pair);
            let mut inner: Vec<_> = pair.into_inner().collect();
            if inner.len() == 1 {
                parse_expr(inner.remove(0))
            } else {
                Err(ParseError::syntax(
                    format!("unexpected expression shape ({} children)", inner.len()),
                    span,
                    "",
                    "",
                ))
            }
        }
    }
}

fn parse_binary(pair: Pair<'_>) -> Result<Expr, ParseError> {
    let mut inner = pair.into_inner();
    let mut result = parse_expr(next_child(&mut inner, "operand")?)?;
    while let Some(op_pair) = inner.next() {
        let rhs = parse_expr(next_child(&mut inner, "operand")?)?;
        let op = match op_pair.as_str() {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "==" => BinOp::Eq,
            "!=" => BinOp::Neq,
            ">=" => BinOp::Ge,
            "<=" => BinOp::Le,
            ">" => BinOp::Gt,
            "<" => BinOp::Lt,
            "&&" => BinOp::And,
            "||" => BinOp::Or,
            other => {
                return Err(syntax_error_at(
                    &op_pair,
                    format!("unknown binary operator '{other}'"),
                ))
            }
        };
        result = Expr::Bin {
            op,
            lhs: Box::new(result),
            rhs: Box::new(rhs),
        };
    }
    Ok(result)
}
