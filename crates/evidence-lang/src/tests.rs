use std::rc::Rc;

use crate::{
    ast::{BinOp, CmpOp, StmtKind, Type},
    ast_ext::{CompileError, Node},
    build::*,
    host::{Host, Limits},
    interpreter::Module,
    semantics::RuntimeError,
    value::{Kwargs, Value},
};

fn kwargs(pairs: &[(&str, Value)]) -> Kwargs {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn binary_search() -> crate::ast::Function {
    func(
        "search",
        [
            param("xs", Type::List(Box::new(Type::Int))),
            param("target", Type::Int),
        ],
        [
            assign("lo", int(0)),
            assign("hi", call("len", [var("xs")]) - int(1)),
            while_(
                var("lo").le(var("hi")),
                [
                    assign("mid", (var("lo") + var("hi")).floor_div(int(2))),
                    if_else(
                        var("xs").at(var("mid")).equals(var("target")),
                        [ret(var("mid"))],
                        [if_else(
                            var("xs").at(var("mid")).lt(var("target")),
                            [assign("lo", var("mid") + int(1))],
                            [assign("hi", var("mid") - int(1))],
                        )],
                    ),
                ],
            ),
            ret(int(-1)),
        ],
    )
}

#[test]
fn python_style_integer_division() {
    let div = |l, r| BinOp::FloorDiv.semantic(&Value::Int(l), &Value::Int(r));
    let rem = |l, r| BinOp::Mod.semantic(&Value::Int(l), &Value::Int(r));
    assert_eq!(div(-7, 2), Ok(Value::Int(-4)));
    assert_eq!(div(7, 2), Ok(Value::Int(3)));
    assert_eq!(rem(-7, 2), Ok(Value::Int(1)));
    assert_eq!(rem(7, -2), Ok(Value::Int(-1)));
    assert_eq!(div(1, 0), Err(RuntimeError::DivisionByZero));
}

#[test]
fn checked_arithmetic() {
    assert_eq!(
        BinOp::Add.semantic(&Value::Int(i64::MAX), &Value::Int(1)),
        Err(RuntimeError::ArithmeticOverflow)
    );
    assert_eq!(
        BinOp::BitXor.semantic(&Value::Int(5), &Value::Int(3)),
        Ok(Value::Int(6))
    );
    assert_eq!(
        BinOp::Add.semantic(&Value::str("ab"), &Value::str("c")),
        Ok(Value::str("abc"))
    );
    assert!(matches!(
        CmpOp::Lt.semantic(&Value::Int(1), &Value::str("a")),
        Err(RuntimeError::TypeError { .. })
    ));
}

#[test]
fn numbers_compare_across_kinds() {
    assert_eq!(Value::Int(1), Value::Float(1.0));
    assert_eq!(Value::set([Value::Int(1), Value::Float(1.0)]).len(), Ok(1));
    assert!(Value::Int(1) < Value::Float(1.5));
}

#[test]
fn values_print_like_python() {
    assert_eq!(Value::tuple([Value::Int(1)]).to_string(), "(1,)");
    assert_eq!(Value::set([]).to_string(), "set()");
    assert_eq!(Value::Float(2.0).to_string(), "2.0");
    assert_eq!(Value::Bool(true).to_string(), "True");
    assert_eq!(
        Value::record("Point", [("x".to_string(), Value::Int(1))]).to_string(),
        "Point(x=1)"
    );
    assert_eq!(Value::ints([1, 2]).to_string(), "[1, 2]");
}

#[test]
fn binary_search_runs() {
    let module = Module::new("search");
    let search = module.define(binary_search());
    let xs = Value::ints([1, 3, 5, 7]);
    let found = module.call(&search, &kwargs(&[("xs", xs.clone()), ("target", Value::Int(5))]));
    assert_eq!(found, Ok(Value::Int(2)));
    let missing = module.call(&search, &kwargs(&[("xs", xs), ("target", Value::Int(4))]));
    assert_eq!(missing, Ok(Value::Int(-1)));
}

#[test]
fn lines_follow_pretty_printing() {
    let search = binary_search();
    let returns = search
        .nodes()
        .into_iter()
        .filter_map(|n| match n {
            Node::Stmt(s) if matches!(s.kind, StmtKind::Return(_)) => Some(s.line),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(returns, vec![7, 13]);

    let printed = search.to_string();
    let lines = printed.lines().collect::<Vec<_>>();
    assert_eq!(lines[0], "def search(xs: list[int], target: int):");
    assert_eq!(lines[6], "            return mid");
    assert_eq!(lines[12], "    return -1");
    assert_eq!(lines.len(), 13);
}

#[test]
fn runaway_loops_run_out_of_fuel() {
    let module = Module::new("spin");
    let spin = module.define(func("spin", [], [while_(boolean(true), [pass()])]));
    let limits = Limits {
        max_steps: 1_000,
        ..Limits::default()
    };
    let res = module
        .host()
        .with_limits(limits, || module.call(&spin, &Kwargs::new()));
    assert!(matches!(res, Err(RuntimeError::FuelExhausted { .. })));
}

#[test]
fn unbounded_recursion_is_stopped() {
    let module = Module::new("rec");
    let f = module.define(func(
        "forever",
        [param("n", Type::Int)],
        [ret(call("forever", [var("n") + int(1)]))],
    ));
    let res = module.call(&f, &kwargs(&[("n", Value::Int(0))]));
    assert!(matches!(res, Err(RuntimeError::RecursionLimit { .. })));
}

#[test]
fn output_is_captured() {
    let module = Module::new("noisy");
    let f = module.define(func(
        "noisy",
        [param("x", Type::Int)],
        [
            expr(call("print", [string("hi"), var("x")])),
            expr(call("sys.stderr.write", [string("oops")])),
            ret(var("x")),
        ],
    ));
    let (res, out) = module
        .host()
        .capture(|| module.call(&f, &kwargs(&[("x", Value::Int(3))])));
    assert_eq!(res, Ok(Value::Int(3)));
    assert_eq!(out.stdout, "hi 3\n");
    assert_eq!(out.stderr, "oops");
}

#[test]
fn globals_are_shared_until_isolated() {
    let module = Module::new("state");
    module.set("counter", Value::Int(0));
    module.set("cache", Value::list([]));
    let bump = module.define(func(
        "bump",
        [],
        [
            global(["counter"]),
            assign("counter", var("counter") + int(1)),
            expr(var("cache").method("append", [var("counter")])),
            ret(var("counter")),
        ],
    ));
    assert_eq!(module.call(&bump, &Kwargs::new()), Ok(Value::Int(1)));

    let isolated = module.isolate();
    assert_eq!(isolated.call(&bump, &Kwargs::new()), Ok(Value::Int(2)));
    assert_eq!(module.get("counter"), Some(Value::Int(1)));
    assert_eq!(module.get("cache"), Some(Value::ints([1])));
    assert_eq!(isolated.get("cache"), Some(Value::ints([1, 2])));
}

#[test]
fn lists_alias_like_references() {
    let module = Module::new("alias");
    let f = module.define(func(
        "grow",
        [param("xs", Type::List(Box::new(Type::Int)))],
        [
            assign("ys", var("xs")),
            expr(var("ys").method("append", [int(9)])),
            ret(var("xs")),
        ],
    ));
    let xs = Value::ints([1]);
    let res = module.call(&f, &kwargs(&[("xs", xs.clone())]));
    assert_eq!(res, Ok(Value::ints([1, 9])));
    assert_eq!(xs, Value::ints([1, 9]));

    let copy = xs.deep_copy();
    assert!(!copy.is_same(&xs));
    assert_eq!(copy, xs);
}

#[test]
fn self_containing_lists_terminate() {
    let module = Module::new("cycles");
    let f = module.define(func(
        "selfref",
        [param("xs", Type::List(Box::new(Type::Int)))],
        [
            expr(var("xs").method("append", [var("xs")])),
            ret(var("xs")),
        ],
    ));
    let xs = module.call(&f, &kwargs(&[("xs", Value::ints([1]))])).unwrap();
    assert_eq!(xs.to_string(), "[1, [...]]");
    assert_eq!(xs.to_json(), serde_json::json!([1, "[1, [...]]"]));

    let copy = xs.deep_copy();
    assert!(!copy.is_same(&xs));
    let inner = copy.elements().unwrap()[1].clone();
    assert!(inner.is_same(&copy));
    assert_eq!(copy, xs);

    let other = module.call(&f, &kwargs(&[("xs", Value::ints([2]))])).unwrap();
    assert_ne!(other, xs);
    assert!(xs < other);
}

#[test]
fn containers_are_unhashable() {
    let module = Module::new("cycles");
    let f = module.define(func(
        "grow",
        [param("s", Type::Set(Box::new(Type::Int)))],
        [expr(var("s").method("add", [var("s")])), ret(var("s"))],
    ));
    let res = module.call(&f, &kwargs(&[("s", Value::set([Value::Int(1)]))]));
    assert_eq!(
        res,
        Err(RuntimeError::TypeError {
            message: "unhashable type: 'set'".to_string()
        })
    );
}

#[test]
fn defaults_fill_missing_arguments() {
    let module = Module::new("defaults");
    let inc = module.define(func(
        "inc",
        [
            param("x", Type::Int),
            param("by", Type::Int).with_default(1i64),
        ],
        [ret(var("x") + var("by"))],
    ));
    assert_eq!(inc.to_string().lines().next(), Some("def inc(x: int, by: int = 1):"));
    assert_eq!(
        module.call(&inc, &kwargs(&[("x", Value::Int(2))])),
        Ok(Value::Int(3))
    );
    assert!(matches!(
        module.call(&inc, &Kwargs::new()),
        Err(RuntimeError::Arity { .. })
    ));
}

#[test]
fn nested_definitions_are_callable() {
    let module = Module::new("nested");
    let outer = module.define(func(
        "outer",
        [],
        [
            def(func(
                "inner",
                [param("y", Type::Int)],
                [ret(var("y") * int(2))],
            )),
            ret(call("inner", [int(4)])),
        ],
    ));
    assert_eq!(module.call(&outer, &Kwargs::new()), Ok(Value::Int(8)));
}

#[test]
fn seeded_hosts_agree() {
    let draw = func(
        "draw",
        [],
        [ret(list([
            call("random.randint", [int(0), int(1_000_000)]),
            call("random.random", []),
        ]))],
    );
    let a = Module::with_host("a", Rc::new(Host::seeded(7)));
    let b = Module::with_host("b", Rc::new(Host::seeded(7)));
    let fa = a.define(draw.clone());
    let fb = b.define(draw);
    assert_eq!(a.call(&fa, &Kwargs::new()), b.call(&fb, &Kwargs::new()));

    a.host().reseed(3);
    let first = a.call(&fa, &Kwargs::new());
    a.host().reseed(3);
    assert_eq!(first, a.call(&fa, &Kwargs::new()));
}

#[test]
fn unknown_names_raise() {
    let module = Module::new("names");
    let f = module.define(func("f", [], [ret(var("nope"))]));
    assert_eq!(
        module.call(&f, &Kwargs::new()),
        Err(RuntimeError::NameNotFound {
            name: "nope".to_string()
        })
    );
}

#[test]
fn expressions_evaluate_against_locals() {
    let module = Module::new("eval");
    let e = var("x").gt(int(0)).and(var("x").lt(int(10)));
    assert_eq!(
        module.eval(&e, &kwargs(&[("x", Value::Int(3))])),
        Ok(Value::Bool(true))
    );
    assert_eq!(
        module.eval(&e, &kwargs(&[("x", Value::Int(30))])),
        Ok(Value::Bool(false))
    );
}

#[test]
fn validation_rejects_misplaced_break() {
    assert_eq!(
        func("bad", [], [brk()]).validate(),
        Err(CompileError::OutsideLoop {
            keyword: "break",
            line: 2
        })
    );
    assert_eq!(
        func("ok", [], [while_(boolean(true), [brk()])]).validate(),
        Ok(())
    );
    assert!(matches!(
        func("dup", [param("a", Type::Int), param("a", Type::Int)], []).validate(),
        Err(CompileError::DuplicateParameter { .. })
    ));
}

#[test]
fn json_snapshots() {
    let v = Value::map([(Value::Int(1), Value::tuple([Value::None, Value::Bool(false)]))]);
    assert_eq!(v.to_json(), serde_json::json!({ "1": [null, false] }));
    let r = Value::record("P", [("x".to_string(), Value::Int(2))]);
    assert_eq!(r.to_json(), serde_json::json!({ "__record__": "P", "x": 2 }));
}
