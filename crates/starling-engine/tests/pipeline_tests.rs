//! End-to-end pipeline scenarios over complete source programs.

use starling_engine::pipeline::{graph, run, Output, Stage, Target};
use starling_ir::expr::{BoolExpr, Expr, IntExpr, Mark, MarkedVar, Type};
use starling_ir::model::PartCmd;
use starling_ir::modeller::ModelError;
use starling_ir::view::CFunc;
use starling_engine::PipelineError;

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

fn before(name: &str) -> BoolExpr<MarkedVar> {
    BoolExpr::var(Mark::Before.var(name))
}

fn int_before(name: &str) -> IntExpr<MarkedVar> {
    IntExpr::var(Mark::Before.var(name))
}

// ---------------------------------------------------------------
// Scenario: empty program
// ---------------------------------------------------------------

#[test]
fn empty_program_runs_through_every_stage() {
    let Output::Parsed(script) = run("", "empty.cvf", Target::Parse).unwrap() else {
        panic!("expected parsed output");
    };
    assert!(script.is_empty());

    let Output::Collated(c) = run("", "empty.cvf", Target::Collate).unwrap() else {
        panic!("expected collated output");
    };
    assert!(c.shared.is_empty() && c.thread.is_empty());
    assert!(c.view_protos.is_empty() && c.constraints.is_empty() && c.methods.is_empty());

    let Output::Modelled(m) = run("", "empty.cvf", Target::Model).unwrap() else {
        panic!("expected modelled output");
    };
    assert!(m.globals.is_empty() && m.locals.is_empty());
    assert!(m.view_defs.is_empty());

    let Output::Guarded(g) = run("", "empty.cvf", Target::Guard).unwrap() else {
        panic!("expected guarded output");
    };
    assert!(g.axioms.is_empty());

    let graphed = graph("", "empty.cvf").unwrap();
    assert!(graphed.axioms.is_empty());
}

// ---------------------------------------------------------------
// Scenario: single-lock ticket lock
// ---------------------------------------------------------------

#[test]
fn ticket_lock_models_the_expected_maps() {
    let Output::Modelled(m) = run(TICKET_LOCK, "ticket.cvf", Target::Model).unwrap() else {
        panic!("expected modelled output");
    };
    let globals: Vec<_> = m.globals.iter().map(|(n, t)| (n.as_str(), *t)).collect();
    assert_eq!(globals, vec![("ticket", Type::Int), ("serving", Type::Int)]);
    let locals: Vec<_> = m.locals.iter().map(|(n, t)| (n.as_str(), *t)).collect();
    assert_eq!(locals, vec![("t", Type::Int), ("s", Type::Int)]);
    assert_eq!(m.view_defs.len(), 3);
    assert_eq!(m.axioms.len(), 2);
}

#[test]
fn ticket_lock_graphs_lock_with_a_do_while_loop() {
    let g = graph(TICKET_LOCK, "ticket.cvf").unwrap();
    let lock = &g.axioms["lock"];

    assert_eq!(lock.nodes.len(), 5);
    assert_eq!(lock.edges.len(), 5);

    let named = |prim: &str| {
        lock.edges
            .iter()
            .filter(|e| e.cmd.len() == 1 && e.cmd[0].name == prim)
            .count()
    };
    // One ticket fetch, one serving read, the unconditional loop entry, and
    // the loop's two assume edges.
    assert_eq!(named("load_inc"), 1);
    assert_eq!(named("load_direct_int"), 1);
    assert_eq!(named("id"), 1);
    assert_eq!(named("assume"), 2);

    // The back edge re-enters the body on s != t.
    let body_entry = &lock
        .edges
        .iter()
        .find(|e| e.cmd[0].name == "id")
        .unwrap()
        .dst;
    let back = lock
        .edges
        .iter()
        .find(|e| e.cmd[0].name == "assume" && e.dst == *body_entry)
        .expect("loop must have a back edge");
    assert_eq!(
        back.cmd[0].params[0],
        Expr::Bool(
            BoolExpr::eq(
                Expr::Int(int_before("s")),
                Expr::Int(int_before("t")),
            )
            .not()
        )
    );
}

#[test]
fn ticket_lock_graphs_unlock_as_a_single_increment_edge() {
    let g = graph(TICKET_LOCK, "ticket.cvf").unwrap();
    let unlock = &g.axioms["unlock"];
    assert_eq!(unlock.nodes.len(), 2);
    assert_eq!(unlock.edges.len(), 1);
    assert_eq!(unlock.edges[0].cmd[0].name, "incr");
    assert_eq!(unlock.edges[0].src, unlock.entry);
    assert_eq!(unlock.edges[0].dst, unlock.exit);
}

// ---------------------------------------------------------------
// Scenario: conditional view
// ---------------------------------------------------------------

#[test]
fn conditional_view_is_one_ite_cfunc_after_modelling() {
    let Output::Modelled(m) = run(TICKET_LOCK, "ticket.cvf", Target::Model).unwrap() else {
        panic!("expected modelled output");
    };
    let PartCmd::While { inner, .. } = &m.axioms["lock"].steps[1].0 else {
        panic!("expected do-while");
    };
    let view = inner.steps[0].1.view();
    assert_eq!(view.len(), 1);
    assert!(matches!(
        view.iter().next().unwrap().0,
        CFunc::Ite(..)
    ));
}

#[test]
fn conditional_view_guards_into_two_complementary_funcs() {
    let Output::Guarded(m) = run(TICKET_LOCK, "ticket.cvf", Target::Guard).unwrap() else {
        panic!("expected guarded output");
    };
    let PartCmd::While { inner, .. } = &m.axioms["lock"].steps[1].0 else {
        panic!("expected do-while");
    };
    let view = inner.steps[0].1.view();
    assert_eq!(view.len(), 2);

    let cond = BoolExpr::eq(
        Expr::Int(int_before("s")),
        Expr::Int(int_before("t")),
    );
    let hold_lock = view
        .iter()
        .find(|(gf, _)| gf.item.name == "holdLock")
        .expect("holdLock must be present");
    assert_eq!(hold_lock.0.guard, cond);
    let hold_tick = view
        .iter()
        .find(|(gf, _)| gf.item.name == "holdTick")
        .expect("holdTick must be present");
    assert_eq!(hold_tick.0.guard, cond.clone().not());
    assert_eq!(
        hold_tick.0.item.params,
        vec![Expr::Int(int_before("t"))]
    );
}

// ---------------------------------------------------------------
// Scenario: CAS lock
// ---------------------------------------------------------------

#[test]
fn cas_lock_reaches_the_graph_with_a_cas_edge() {
    let src = "
        shared bool lock;
        thread bool test;

        view held();
        constraint held() -> lock == true;

        method acquire() {
            {| emp |}
              <test = false>;
            {| emp |}
              <CAS(lock, test, true)>;
            {| if test == false then held() else emp |}
        }
    ";
    let g = graph(src, "cas.cvf").unwrap();
    let acquire = &g.axioms["acquire"];
    let cas_edge = acquire
        .edges
        .iter()
        .find(|e| e.cmd[0].name == "cas_bool")
        .expect("CAS edge must exist");
    // The instantiated relation has the two-branch shape.
    let rel = g.instantiate_semantics(&cas_edge.cmd[0]).unwrap();
    let BoolExpr::And(branches) = rel else {
        panic!("expected conjunction");
    };
    assert_eq!(branches.len(), 2);
    assert!(branches
        .iter()
        .all(|b| matches!(b, BoolExpr::Implies(..))));
    let BoolExpr::Implies(cond, _) = &branches[0] else {
        unreachable!();
    };
    assert_eq!(
        **cond,
        BoolExpr::eq(
            Expr::Bool(before("lock")),
            Expr::Bool(before("test")),
        )
    );
}

// ---------------------------------------------------------------
// Scenario: comments
// ---------------------------------------------------------------

#[test]
fn nested_comment_is_a_single_comment() {
    let src = "/* a /* b */ c */ shared int x;";
    let Output::Modelled(m) = run(src, "nested.cvf", Target::Model).unwrap() else {
        panic!("expected modelled output");
    };
    assert_eq!(m.globals.len(), 1);
}

#[test]
fn incomplete_syntax_fails_at_the_parse_stage() {
    // Truncated declarations and unclosed bodies are parse errors, not
    // later-stage failures.
    for src in ["shared int", "method m() { {| emp |}", "view v(int);"] {
        let err = run(src, "bad.cvf", Target::Graph).unwrap_err();
        assert_eq!(err.stage(), Stage::Parse, "source: {src}");
    }
}

// ---------------------------------------------------------------
// Scenario: type error
// ---------------------------------------------------------------

#[test]
fn int_in_boolean_context_fails_modelling() {
    let err = run(
        "shared int x; constraint emp -> x && true;",
        "t.cvf",
        Target::Graph,
    )
    .unwrap_err();
    assert_eq!(err.stage(), Stage::Model);
    let PipelineError::Model(ModelError::TypeMismatch {
        expected,
        got,
        context,
    }) = err
    else {
        panic!("expected a type mismatch");
    };
    assert_eq!(expected, Type::Bool);
    assert_eq!(got, Type::Int);
    assert_eq!(context, "x");
}

// ---------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------

#[test]
fn pipeline_output_is_deterministic() {
    let a = graph(TICKET_LOCK, "ticket.cvf").unwrap();
    let b = graph(TICKET_LOCK, "ticket.cvf").unwrap();
    assert_eq!(a, b);
}
