//! End-to-end runs over small modules with known defects.

use evidence_lang::{
    ast::{Expr, Stmt, Type},
    build::*,
    Module, Value,
};

use super::{config, verify};
use crate::{
    bundle::{PurityConfig, ReferenceSpec},
    config::VerifyConfig,
    purity::Category,
    report::{ObligationKind, Status},
    subject::{SubjectFunction, SubjectModule},
};

fn ints() -> Type {
    Type::List(Box::new(Type::Int))
}

fn as_ints(v: &serde_json::Value) -> Vec<i64> {
    v.as_array()
        .unwrap()
        .iter()
        .map(|n| n.as_i64().unwrap())
        .collect()
}

#[test]
fn xor_checksum_is_not_additive() {
    let module = Module::new("checksum");
    let additive = SubjectFunction::interpreted(
        &module,
        func(
            "additive",
            [param("data", Type::Bytes)],
            [ret(call("sum", [var("data")]) % int(256))],
        ),
    )
    .reference_only();
    let checksum = SubjectFunction::interpreted(
        &module,
        func(
            "checksum",
            [param("data", Type::Bytes)],
            [
                assign("acc", int(0)),
                for_("b", var("data"), [assign("acc", var("acc") ^ var("b"))]),
                ret(var("acc")),
            ],
        ),
    )
    .against(ReferenceSpec::of(&additive));
    let report = verify(
        &SubjectModule::new(module).with(additive).with(checksum),
        config(),
    );

    let r = report.result("checksum", ObligationKind::EquivToSpec).unwrap();
    assert_eq!(r.status, Status::Fail, "{}", r.details);
    let data = as_ints(&r.details["counterexample"]["kwargs"]["data"]);
    assert!(data.iter().filter(|b| **b != 0).count() >= 2, "{data:?}");
    assert_ne!(
        r.details["counterexample"]["impl_result"],
        r.details["counterexample"]["spec_result"]
    );
    // Listed even though its equivalence check failed.
    let trusted = report
        .trust
        .functions
        .iter()
        .map(|t| t.function.to_string())
        .collect::<Vec<_>>();
    assert_eq!(trusted, ["checksum.checksum"]);
    assert!(report.is_failure());
}

fn linear() -> Vec<Stmt> {
    vec![
        assign("i", int(0)),
        while_(
            var("i").lt(call("len", [var("xs")])),
            [
                if_(var("xs").at(var("i")).equals(var("target")), [ret(var("i"))]),
                assign("i", var("i") + int(1)),
            ],
        ),
        ret(int(-1)),
    ]
}

fn bisect(upper: fn(Expr, Expr) -> Expr) -> Vec<Stmt> {
    vec![
        assign("lo", int(0)),
        assign("hi", call("len", [var("xs")]) - int(1)),
        while_(
            upper(var("lo"), var("hi")),
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
    ]
}

fn search_module(upper: fn(Expr, Expr) -> Expr) -> SubjectModule {
    let module = Module::new("bisect");
    let params = || [param("xs", ints()), param("target", Type::Int)];
    let reference = SubjectFunction::interpreted(&module, func("linear", params(), linear()))
        .reference_only();
    let search = SubjectFunction::interpreted(&module, func("search", params(), bisect(upper)))
        .requires(var("xs").equals(call("sorted", [call("set", [var("xs")])])))
        .ensures(
            var("result")
                .equals(int(-1))
                .or(var("xs").at(var("result")).equals(var("target"))),
        )
        .against(ReferenceSpec::of(&reference));
    SubjectModule::new(module).with(reference).with(search)
}

/// Sorted inputs are rare, so search longer.
fn thorough() -> VerifyConfig {
    VerifyConfig {
        search_attempts: 2000,
        ..config()
    }
}

#[test]
fn off_by_one_binary_search() {
    let report = verify(&search_module(|lo, hi| lo.lt(hi)), thorough());
    let r = report.result("search", ObligationKind::EquivToSpec).unwrap();
    assert_eq!(r.status, Status::Fail, "{}", r.details);

    let xs = as_ints(&r.details["counterexample"]["kwargs"]["xs"]);
    assert!(xs.windows(2).all(|w| w[0] < w[1]), "{xs:?}");
    assert_eq!(r.details["counterexample"]["impl_result"], -1);
}

#[test]
fn correct_binary_search_is_trusted() {
    let report = verify(&search_module(|lo, hi| lo.le(hi)), thorough());
    let r = report.result("search", ObligationKind::EquivToSpec).unwrap();
    assert_eq!(r.status, Status::Pass, "{}", r.details);
    assert_eq!(report.trust.functions.len(), 1);
}

fn runs(keep_last: bool) -> SubjectModule {
    let module = Module::new("runs");
    let mut body = vec![
        assign("out", list([])),
        assign("cur", list([])),
        for_(
            "x",
            var("xs"),
            [
                if_(
                    call("len", [var("cur")])
                        .gt(int(0))
                        .and(var("cur").at(int(0)).not_equals(var("x"))),
                    [
                        expr(var("out").method("append", [var("cur")])),
                        assign("cur", list([])),
                    ],
                ),
                expr(var("cur").method("append", [var("x")])),
            ],
        ),
    ];
    if keep_last {
        body.push(if_(
            call("len", [var("cur")]).gt(int(0)),
            [expr(var("out").method("append", [var("cur")]))],
        ));
    }
    body.push(ret(var("out")));

    let group = SubjectFunction::interpreted(&module, func("group", [param("xs", ints())], body))
        .ensures_fn("runs cover the input", |args, result| {
            let covered = result.elements().map(|runs| {
                runs.iter()
                    .map(|run| run.len().unwrap_or(0))
                    .sum::<usize>()
            });
            args["xs"].len().ok() == covered.ok()
        });
    SubjectModule::new(module).with(group)
}

#[test]
fn dropped_final_run() {
    let report = verify(&runs(false), config());

    let smoke = report.result("group", ObligationKind::ContractsSmoke).unwrap();
    assert_eq!(smoke.status, Status::Pass);
    assert_eq!(smoke.details["example"]["xs"], serde_json::json!([]));

    // No spec, so the only other result is the skipped equivalence check.
    let equiv = report.result("group", ObligationKind::EquivToSpec).unwrap();
    assert_eq!(equiv.status, Status::Skip);
}

#[test]
fn dropped_final_run_against_spec() {
    let module = runs(false);
    let fixed = runs(true);
    let reference = fixed.get("group").unwrap().clone().reference_only();
    let group = module
        .get("group")
        .unwrap()
        .clone()
        .against(ReferenceSpec::of(&reference));
    let subjects = SubjectModule::new(module.module().clone()).with(group);
    let report = verify(&subjects, config());

    let r = report.result("group", ObligationKind::EquivToSpec).unwrap();
    assert_eq!(r.status, Status::Fail, "{}", r.details);
    let note = r.details["counterexample"]["note"].as_str().unwrap();
    assert!(note.starts_with("ensures failed"), "{note}");
    assert_eq!(
        r.details["counterexample"]["kwargs"]["xs"].as_array().unwrap().len(),
        1
    );
}

#[test]
fn doubling_is_pure_and_matches() {
    let module = Module::new("doubling");
    let twice = SubjectFunction::interpreted(
        &module,
        func("twice", [param("x", Type::Int)], [ret(var("x") + var("x"))]),
    )
    .reference_only();
    let double = SubjectFunction::interpreted(
        &module,
        func("double", [param("x", Type::Int)], [ret(var("x") * int(2))]),
    )
    .pure()
    .against(ReferenceSpec::of(&twice));
    let report = verify(&SubjectModule::new(module).with(twice).with(double), config());

    for kind in [
        ObligationKind::ContractsSmoke,
        ObligationKind::PureStatic,
        ObligationKind::PureDynamic,
        ObligationKind::EquivToSpec,
    ] {
        let r = report.result("double", kind).unwrap();
        assert_eq!(r.status, Status::Pass, "{kind}: {}", r.details);
    }
    assert_eq!(
        report.result("double", ObligationKind::EquivToSpec).unwrap().details["examples"],
        200
    );
    assert_eq!(report.summary().to_string(), "4 passed, 0 failed, 0 errors, 1 skipped");
}

#[test]
fn echo_is_impure() {
    let module = Module::new("noisy");
    let echo = SubjectFunction::interpreted(
        &module,
        func(
            "echo",
            [param("x", Type::Int)],
            [expr(call("print", [var("x")])), ret(var("x"))],
        ),
    )
    .pure();
    let report = verify(&SubjectModule::new(module).with(echo), config());

    let r = report.result("echo", ObligationKind::PureStatic).unwrap();
    assert_eq!(r.status, Status::Fail);
    assert_eq!(r.details["warnings"][0]["category"], Category::Io.to_string());
    assert_eq!(r.details["warnings"][0]["description"], "call to print");

    let r = report.result("echo", ObligationKind::PureDynamic).unwrap();
    assert_eq!(r.status, Status::Fail);
    assert!(r.details["error"]
        .as_str()
        .unwrap()
        .contains("function produced stdout output"));
    assert_eq!(report.trust.functions.len(), 1);
    assert!(report.is_failure());
}

#[test]
fn seeded_jitter_is_pure() {
    let module = Module::new("jitter");
    let jitter = SubjectFunction::interpreted(
        &module,
        func(
            "jitter",
            [param("x", Type::Int)],
            [ret(var("x") + call("random.randint", [int(0), int(9)]))],
        ),
    )
    .pure_with(PurityConfig::seeded(42));
    let report = verify(&SubjectModule::new(module).with(jitter), config());
    for kind in [ObligationKind::PureStatic, ObligationKind::PureDynamic] {
        let r = report.result("jitter", kind).unwrap();
        assert_eq!(r.status, Status::Pass, "{kind}: {}", r.details);
        assert_eq!(r.details["mode"], "seed-deterministic");
    }
    assert_eq!(
        report.result("jitter", ObligationKind::ContractsSmoke).unwrap().details["example"]["x"],
        Value::Int(0).to_json()
    );
}
