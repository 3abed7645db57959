mod scenarios;

use std::{cell::Cell, rc::Rc, time::Duration};

use evidence_lang::{
    ast::{RecordType, Type},
    build::*,
    Kwargs, Module, RuntimeError, Value,
};
use proptest::{
    prelude::*,
    strategy::ValueTree,
    test_runner::TestRunner,
};

use crate::{
    bundle::{Comparator, HealthCheck, PurityConfig, PurityMode, ReferenceSpec},
    collab::{InferredProperty, PropertyInference},
    config::{UnknownTypePolicy, VerifyConfig},
    engine::Verifier,
    equiv::Equivalence,
    error::{CallError, ContractViolation, Error},
    gn::{GeneratorRegistry, Synthesis, ValueStrategy},
    mutate::{self, Mutant, Operator},
    purity::{self, Category, DynamicOutcome},
    report::{ModuleReport, ObligationKind, Status},
    search::{Outcome, Search, Verdict},
    subject::{Callable, SubjectFunction, SubjectModule},
};

fn args(pairs: &[(&str, Value)]) -> Kwargs {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn config() -> VerifyConfig {
    VerifyConfig {
        seed: Some(7),
        search_attempts: 300,
        ..VerifyConfig::default()
    }
}

fn verify(module: &SubjectModule, config: VerifyConfig) -> ModuleReport {
    Verifier::new(config).verify_module(module, |_| {})
}

fn sample(strategy: &ValueStrategy, n: usize) -> Vec<Value> {
    let mut runner = TestRunner::deterministic();
    (0..n)
        .map(|_| strategy.new_tree(&mut runner).unwrap().current())
        .collect()
}

fn double(module: &Module) -> SubjectFunction {
    SubjectFunction::interpreted(
        module,
        func("double", [param("x", Type::Int)], [ret(var("x") * int(2))]),
    )
}

fn twice(module: &Module) -> SubjectFunction {
    SubjectFunction::interpreted(
        module,
        func("twice", [param("x", Type::Int)], [ret(var("x") + var("x"))]),
    )
    .reference_only()
}

#[test]
fn contracts_accumulate_in_attachment_order() {
    let module = Module::new("acc");
    let f = double(&module)
        .requires(var("x").gt(int(0)))
        .ensures(var("result").gt(var("x")))
        .requires(var("x").lt(int(100)))
        .pure()
        .requires_fn("even", |a| a["x"].as_int().is_ok_and(|x| x % 2 == 0));
    let bundle = f.bundle();
    assert_eq!(bundle.requires.len(), 3);
    assert_eq!(bundle.ensures.len(), 1);
    assert!(bundle.purity.is_some());
    assert!(bundle.spec.is_none());
    assert_eq!(bundle.requires[2].label(), "even");
}

#[test]
fn calls_enforce_contracts() {
    let module = Module::new("live");
    let f = SubjectFunction::interpreted(
        &module,
        func("dec", [param("x", Type::Int)], [ret(var("x") - int(1))]),
    )
    .requires(var("x").gt(int(0)))
    .ensures(var("result").gt(var("x")));

    let err = f.call(&args(&[("x", Value::Int(0))])).unwrap_err();
    assert_eq!(
        err,
        CallError::Contract(ContractViolation::Precondition {
            function: f.name().clone(),
            index: 0,
            message: "(x > 0) returned False".to_string(),
        })
    );
    assert!(matches!(
        f.call(&args(&[("x", Value::Int(3))])),
        Err(CallError::Contract(ContractViolation::Postcondition { index: 0, .. }))
    ));
    assert_eq!(f.invoke(&args(&[("x", Value::Int(3))])), Ok(Value::Int(2)));
}

#[test]
fn raising_predicates_fail() {
    let module = Module::new("raise");
    let f = SubjectFunction::interpreted(
        &module,
        func("head", [param("xs", Type::List(Box::new(Type::Int)))], [ret(var("xs").at(int(0)))]),
    )
    .requires(var("xs").at(int(0)).ge(int(0)));
    let err = f.check_requires(&args(&[("xs", Value::list([]))])).unwrap_err();
    assert!(err.message().contains("raised"), "{err}");
}

#[test]
fn runtime_errors_pass_through_calls() {
    let module = Module::new("div");
    let f = SubjectFunction::interpreted(
        &module,
        func("inv", [param("x", Type::Int)], [ret(int(1).floor_div(var("x")))]),
    );
    assert_eq!(
        f.call(&args(&[("x", Value::Int(0))])),
        Err(CallError::Runtime(RuntimeError::DivisionByZero))
    );
}

#[test]
fn approximate_comparison() {
    let approx: Comparator = "approx".parse().unwrap();
    assert!(approx.equal(&Value::Float(1.0), &Value::Float(1.0 + 1e-9)));
    assert!(approx.equal(&Value::Int(2), &Value::Float(2.0000001)));
    assert!(approx.equal(
        &Value::list([Value::Float(0.1 + 0.2)]),
        &Value::tuple([Value::Float(0.3)])
    ));
    assert!(!approx.equal(
        &Value::list([Value::Float(1.0)]),
        &Value::list([Value::Float(1.0), Value::Float(1.0)])
    ));
    assert!(!approx.equal(&Value::Float(1.0), &Value::Float(1.1)));
    assert!(!Comparator::Structural.equal(&Value::Float(0.1 + 0.2), &Value::Float(0.3)));
    assert!("fuzzy".parse::<Comparator>().is_err());
}

#[test]
fn config_from_toml() {
    let config = VerifyConfig::from_toml(
        r#"
        seed = 3
        max_mutants = 10
        unknown_types = "reject"

        [features]
        mutation = true
        "#,
    )
    .unwrap();
    assert_eq!(config.seed, Some(3));
    assert_eq!(config.max_mutants, 10);
    assert_eq!(config.unknown_types, UnknownTypePolicy::Reject);
    assert!(config.features.mutation);
    assert!(!config.features.prove);
    assert_eq!(config.max_list_size, 20);
    assert_eq!(config.mutation_threshold, 80.0);

    assert!(matches!(
        VerifyConfig::from_toml("seed = \"x\""),
        Err(Error::Config(_))
    ));
}

#[test]
fn static_purity_categories() {
    let f = func(
        "messy",
        [param("x", Type::Int)],
        [
            global(["state"]),
            expr(call("print", [var("x")])),
            expr(call("sys.stderr.write", [string("!")])),
            assign("r", call("random.random", [])),
            assign("t", call("time.time", [])),
            assign("a", call("id", [var("x")])),
            expr(call("setattr", [var("x"), string("y"), int(1)])),
            ret(var("x")),
        ],
    );
    fn count(ws: &[purity::ImpurityWarning], c: Category) -> usize {
        ws.iter().filter(|w| w.category == c).count()
    }
    let strict = purity::inspect(&f, PurityMode::Strict);
    assert_eq!(count(&strict, Category::Io), 2);
    assert_eq!(count(&strict, Category::Nondeterminism), 2);
    assert_eq!(count(&strict, Category::HashAddr), 1);
    assert_eq!(count(&strict, Category::GlobalMutation), 2);
    assert!(strict
        .iter()
        .any(|w| w.description == "global statement: state" && w.line == Some(2)));
    assert!(strict.iter().any(|w| w.description == "call to print" && w.line == Some(3)));

    let seeded = purity::inspect(&f, PurityMode::SeedDeterministic);
    assert_eq!(count(&seeded, Category::Nondeterminism), 0);
    assert_eq!(seeded.len(), strict.len() - 2);
}

#[test]
fn native_callables_are_opaque() {
    let native = Callable::native(|a: &Kwargs| Ok(a["x"].clone()));
    let warnings = purity::static_check(&native, PurityMode::Strict);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].category, Category::Unknown);

    let report = mutate::run(&native, 50, |_| Ok(true));
    assert_eq!(report.total_mutants, 0);
    assert_eq!(report.mutation_score, None);
}

#[test]
fn in_place_identity_is_dynamically_pure() {
    let module = Module::new("inplace");
    let f = SubjectFunction::interpreted(
        &module,
        func(
            "touch",
            [param("xs", Type::List(Box::new(Type::Int)))],
            [
                expr(var("xs").method("append", [int(0)])),
                expr(var("xs").method("pop", [])),
                ret(var("xs")),
            ],
        ),
    );
    let input = args(&[("xs", Value::ints([1, 2]))]);
    let outcome = purity::dynamic_check(f.callable(), &input, &PurityConfig::strict());
    assert_eq!(outcome, Ok(DynamicOutcome::Pure));
    assert_eq!(input["xs"], Value::ints([1, 2]));
}

#[test]
fn seeded_randomness_is_deterministic() {
    let module = Module::new("jitter");
    let f = SubjectFunction::interpreted(
        &module,
        func(
            "jitter",
            [param("x", Type::Int)],
            [ret(var("x") + call("random.randint", [int(0), int(1_000_000)]))],
        ),
    );
    let input = args(&[("x", Value::Int(1))]);
    assert_eq!(
        purity::dynamic_check(f.callable(), &input, &PurityConfig::seeded(42)),
        Ok(DynamicOutcome::Pure)
    );
    assert!(purity::static_check(f.callable(), PurityMode::SeedDeterministic).is_empty());
    assert_eq!(purity::static_check(f.callable(), PurityMode::Strict).len(), 1);
}

#[test]
fn console_output_is_impure() {
    let module = Module::new("echo");
    let f = SubjectFunction::interpreted(
        &module,
        func(
            "echo",
            [param("x", Type::Int)],
            [expr(call("sys.stderr.write", [string("x")])), ret(var("x"))],
        ),
    );
    let outcome = purity::dynamic_check(f.callable(), &args(&[("x", Value::Int(1))]), &PurityConfig::strict());
    assert_eq!(
        outcome,
        Ok(DynamicOutcome::Impure("function produced stderr output".to_string()))
    );
}

#[test]
fn mutants_change_exactly_one_thing() {
    let f = func(
        "clamp",
        [param("x", Type::Int)],
        [
            if_(var("x").lt(int(0)).and(boolean(true)), [ret(int(0))]),
            ret(var("x") + int(1)),
        ],
    );
    let mutants = mutate::generate(&f, 50);
    let operators = mutants.iter().map(|m| m.operator).collect::<std::collections::BTreeSet<_>>();
    for op in [
        Operator::FlipComparison,
        Operator::SwapArithmetic,
        Operator::NegateCondition,
        Operator::DeleteStatement,
        Operator::ChangeConstant,
        Operator::SwapBoolean,
        Operator::RemoveReturn,
    ] {
        assert!(operators.contains(&op), "missing {op}");
    }
    for m in &mutants {
        assert_ne!(m.function, f, "{}", m.description);
    }
    assert!(mutants.iter().any(|m| m.description == "< -> >="));
    assert!(mutants.iter().any(|m| m.description == "+ -> -"));
    assert!(mutants.iter().any(|m| m.description == "and -> or"));
    assert!(mutants.iter().any(|m| m.description == "True -> False"));
    assert!(mutants.iter().any(|m| m.description == "delete statement at line 4"));
    assert_eq!(mutate::generate(&f, 3).len(), 3);
}

#[test]
fn nested_definitions_are_not_deleted() {
    let f = func(
        "outer",
        [],
        [
            def(func("inner", [], [ret(int(1))])),
            ret(call("inner", [])),
        ],
    );
    let deletions = mutate::generate(&f, 50)
        .into_iter()
        .filter(|m| m.operator == Operator::DeleteStatement)
        .map(|m| m.line)
        .collect::<Vec<_>>();
    assert_eq!(deletions, vec![4, 3]);
}

#[test]
fn invalid_mutants_do_not_compile() {
    let module = Module::new("bad");
    let mutant = Mutant {
        operator: Operator::DeleteStatement,
        description: "manual".to_string(),
        line: 2,
        function: func("bad", [], [brk()]),
    };
    assert!(matches!(mutant.compile(&module), Err(Error::Compile(_))));
}

#[test]
fn mutation_scores() {
    let module = Module::new("score");
    let f = double(&module);
    let all = mutate::run(f.callable(), 50, |_| Ok(true));
    assert_eq!(all.mutation_score, Some(100.0));
    assert!(all.survivors.is_empty());

    let none = mutate::run(f.callable(), 50, |_| Ok(false));
    assert_eq!(none.mutation_score, Some(0.0));
    assert!(none.survivors.len() <= mutate::MAX_SURVIVORS);

    let errors = mutate::run(f.callable(), 50, |_| Err(Error::Search { reason: "x".into() }));
    assert_eq!(errors.errors, errors.total_mutants);
    assert_eq!(errors.mutation_score, None);

    let flip = Cell::new(false);
    let half = mutate::run(f.callable(), 2, |_| {
        flip.set(!flip.get());
        Ok(flip.get())
    });
    assert_eq!(half.mutation_score, Some(50.0));
}

#[test]
fn mutants_see_their_own_recursion() {
    let module = Module::new("rec");
    let fact = SubjectFunction::interpreted(
        &module,
        func(
            "fact",
            [param("n", Type::Int)],
            [
                if_(var("n").le(int(1)), [ret(int(1))]),
                ret(var("n") * call("fact", [var("n") - int(1)])),
            ],
        ),
    );
    let mutant = mutate::generate(fact.callable().function().unwrap(), 50)
        .into_iter()
        .find(|m| m.description == "1 -> 2" && m.line == 3)
        .unwrap();
    let compiled = mutant.compile(&module).unwrap();
    assert_eq!(compiled.invoke(&args(&[("n", Value::Int(3))])), Ok(Value::Int(12)));
    assert_eq!(fact.invoke(&args(&[("n", Value::Int(3))])), Ok(Value::Int(6)));
}

#[test]
fn shrinking_reaches_the_smallest_failing_size() {
    let strategy = proptest::collection::vec(0i64..100, 0..20);
    let outcome = Search::new(Some(1)).run(&strategy, 200, |xs| {
        if xs.len() >= 3 {
            Verdict::Fail("too long".to_string())
        } else {
            Verdict::Pass
        }
    });
    match outcome {
        Outcome::Failed { minimal, .. } => assert_eq!(minimal.len(), 3),
        other => panic!("expected a failure, got {other:?}"),
    }
}

#[test]
fn find_reports_absence() {
    let found = Search::new(Some(1)).find(&(0i64..10), 100, |n| *n > 50);
    assert_eq!(found.unwrap(), None);
    let found = Search::new(Some(1)).find(&(0i64..1000), 500, |n| *n >= 10);
    assert_eq!(found.unwrap(), Some(10));
}

fn contains_int(v: &Value) -> bool {
    match v {
        Value::Int(_) => true,
        Value::List(_) => v.elements().unwrap().iter().any(contains_int),
        _ => false,
    }
}

#[test]
fn deep_types_bottom_out_in_none() {
    let registry = GeneratorRegistry::new();
    let mut ty = Type::Int;
    for _ in 0..8 {
        ty = Type::List(Box::new(ty));
    }
    let strategy = Synthesis::new(&registry, 2, UnknownTypePolicy::Degrade)
        .strategy(&ty)
        .unwrap();
    assert!(sample(&strategy, 50).iter().all(|v| !contains_int(v)));
}

#[test]
fn unknown_types_follow_the_policy() {
    let registry = GeneratorRegistry::new();
    let ty = Type::Named("Widget".to_string());

    let mut degrade = Synthesis::new(&registry, 5, UnknownTypePolicy::Degrade);
    let strategy = degrade.strategy(&ty).unwrap();
    assert!(sample(&strategy, 5).iter().all(|v| *v == Value::None));
    assert!(degrade.degraded().contains("Widget"));

    let mut reject = Synthesis::new(&registry, 5, UnknownTypePolicy::Reject);
    assert!(matches!(
        reject.strategy(&ty),
        Err(Error::Synthesis { ty }) if ty == "Widget"
    ));
}

#[test]
fn registered_generators_take_precedence() {
    let mut registry = GeneratorRegistry::new();
    registry
        .register(Type::Named("Even".to_string()), (0i64..50).prop_map(|n| Value::Int(n * 2)))
        .register(Type::Int, Just(Value::Int(7)))
        .define_record(RecordType {
            name: "Point".to_string(),
            fields: vec![("x".to_string(), Type::Int), ("y".to_string(), Type::Bool)],
        });
    let mut synthesis = Synthesis::new(&registry, 5, UnknownTypePolicy::Reject);

    let evens = synthesis.strategy(&Type::Named("Even".to_string())).unwrap();
    assert!(sample(&evens, 30)
        .iter()
        .all(|v| v.as_int().is_ok_and(|n| n % 2 == 0)));

    let points = synthesis.strategy(&Type::Named("Point".to_string())).unwrap();
    for p in sample(&points, 10) {
        let Value::Record(r) = &p else {
            panic!("expected a record, got {p}");
        };
        let r = r.borrow();
        assert_eq!(r.name, "Point");
        assert_eq!(r.fields["x"], Value::Int(7));
        assert!(matches!(r.fields["y"], Value::Bool(_)));
    }
}

#[test]
fn factories_build_constructed_types() {
    let mut registry = GeneratorRegistry::new();
    registry.register_factory(crate::gn::TypeConstructor::List, |children, bounds| {
        proptest::collection::vec(children[0].clone(), bounds.max_size)
            .prop_map(Value::list)
            .boxed()
    });
    let strategy = Synthesis::new(&registry, 4, UnknownTypePolicy::Reject)
        .strategy(&Type::List(Box::new(Type::Bool)))
        .unwrap();
    assert!(sample(&strategy, 10).iter().all(|v| v.len() == Ok(4)));
}

#[test]
fn collections_respect_the_bound() {
    let registry = GeneratorRegistry::new();
    let ty = Type::Map(
        Box::new(Type::Str),
        Box::new(Type::Set(Box::new(Type::Int))),
    );
    let strategy = Synthesis::new(&registry, 4, UnknownTypePolicy::Reject)
        .strategy(&ty)
        .unwrap();
    for v in sample(&strategy, 40) {
        assert!(v.len().unwrap() <= 4);
        for key in v.elements().unwrap() {
            assert!(matches!(key, Value::Str(_)));
        }
    }
}

#[test]
fn defaults_are_sometimes_used() {
    let registry = GeneratorRegistry::new();
    let params = [param("n", Type::Int).with_default(1234i64)];
    let strategy = Synthesis::new(&registry, 5, UnknownTypePolicy::Reject)
        .kwargs(&params)
        .unwrap();
    let mut runner = TestRunner::deterministic();
    let hits = (0..100)
        .map(|_| strategy.new_tree(&mut runner).unwrap().current())
        .filter(|kw| kw["n"] == Value::Int(1234))
        .count();
    assert!(hits > 10, "{hits}");
}

#[test]
fn equivalence_is_skipped_without_a_spec() {
    let module = Module::new("nospec");
    let subjects = SubjectModule::new(module.clone()).with(double(&module));
    let report = verify(&subjects, config());
    let r = report.result("double", ObligationKind::EquivToSpec).unwrap();
    assert_eq!(r.status, Status::Skip);
    assert_eq!(r.details["reason"], "no reference spec attached");
    assert_eq!(
        report.result("double", ObligationKind::ContractsSmoke).unwrap().status,
        Status::Pass
    );
}

#[test]
fn unsatisfiable_preconditions() {
    let module = Module::new("never");
    let subjects = SubjectModule::new(module.clone())
        .with(double(&module).requires_fn("never", |_| false));
    let report = verify(&subjects, config());
    let statuses = report
        .results
        .iter()
        .map(|r| (r.obligation, r.status))
        .collect::<Vec<_>>();
    assert_eq!(
        statuses,
        vec![
            (ObligationKind::RequiresSatisfiable, Status::Fail),
            (ObligationKind::EquivToSpec, Status::Skip),
        ]
    );
    assert_eq!(report.trust.functions.len(), 1);
    assert_eq!(report.trust.functions[0].function.to_string(), "never.double");
    assert!(report.is_failure());
}

#[test]
fn failing_smoke_invocations_are_failures() {
    let module = Module::new("boom");
    let f = SubjectFunction::interpreted(
        &module,
        func("boom", [param("x", Type::Int)], [ret(call("missing", [var("x")]))]),
    );
    let report = verify(&SubjectModule::new(module).with(f), config());
    let smoke = report.result("boom", ObligationKind::ContractsSmoke).unwrap();
    assert_eq!(smoke.status, Status::Fail);
    assert!(smoke.details["error"].as_str().unwrap().contains("missing"));
}

#[test]
fn rejected_types_are_errors() {
    let module = Module::new("widgets");
    let f = SubjectFunction::interpreted(
        &module,
        func("use", [param("w", Type::Named("Widget".to_string()))], [ret(var("w"))]),
    );
    let report = verify(
        &SubjectModule::new(module).with(f),
        VerifyConfig {
            unknown_types: UnknownTypePolicy::Reject,
            ..config()
        },
    );
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].status, Status::Error);
}

#[test]
fn degraded_types_are_reported() {
    let module = Module::new("widgets");
    let f = SubjectFunction::interpreted(
        &module,
        func("use", [param("w", Type::Named("Widget".to_string()))], [ret(var("w"))]),
    );
    let report = verify(&SubjectModule::new(module).with(f), config());
    let smoke = report.result("use", ObligationKind::ContractsSmoke).unwrap();
    assert_eq!(smoke.status, Status::Pass);
    assert_eq!(smoke.details["degraded_types"], serde_json::json!(["Widget"]));
}

fn rarely_valid(spec: impl FnOnce(ReferenceSpec) -> ReferenceSpec) -> ModuleReport {
    let module = Module::new("filter");
    let reference = twice(&module);
    let f = double(&module)
        .requires(var("x").equals(int(0)))
        .against(spec(ReferenceSpec::of(&reference)));
    verify(&SubjectModule::new(module).with(reference).with(f), config())
}

#[test]
fn suppressed_filter_health_check_warns() {
    let report = rarely_valid(|s| s);
    let r = report.result("double", ObligationKind::EquivToSpec).unwrap();
    assert_eq!(r.status, Status::Pass);
    let warnings = r.details["warnings"].as_array().unwrap();
    assert!(warnings[0].as_str().unwrap().starts_with("filter_too_much"));
}

#[test]
fn unsuppressed_filter_health_check_errors() {
    let report = rarely_valid(|s| s.suppress([]));
    let r = report.result("double", ObligationKind::EquivToSpec).unwrap();
    assert_eq!(r.status, Status::Error);
    assert!(r.details["error"].as_str().unwrap().contains("filter_too_much"));
}

fn slow_spec(suppress: &[HealthCheck]) -> ModuleReport {
    let module = Module::new("slow");
    let slow = SubjectFunction::interpreted(
        &module,
        func(
            "slow",
            [param("x", Type::Int)],
            [
                assign("i", int(0)),
                while_(var("i").lt(int(1000)), [assign("i", var("i") + int(1))]),
                ret(var("x") * int(2)),
            ],
        ),
    )
    .reference_only();
    let spec = ReferenceSpec::of(&slow)
        .deadline(Duration::from_nanos(1))
        .max_examples(20)
        .suppress(suppress.iter().copied());
    let f = double(&module).against(spec);
    verify(&SubjectModule::new(module).with(slow).with(f), config())
}

#[test]
fn deadlines_make_examples_inconclusive() {
    let report = slow_spec(&[HealthCheck::TooSlow]);
    let r = report.result("double", ObligationKind::EquivToSpec).unwrap();
    assert_eq!(r.status, Status::Pass);
    assert_eq!(r.details["inconclusive"], 20);
    assert!(r.details["warnings"][0].as_str().unwrap().starts_with("too_slow"));

    let report = slow_spec(&[]);
    let r = report.result("double", ObligationKind::EquivToSpec).unwrap();
    assert_eq!(r.status, Status::Error);
}

fn slow(module: &Module, factor: i64) -> SubjectFunction {
    SubjectFunction::interpreted(
        module,
        func(
            "slow",
            [param("x", Type::Int)],
            [
                assign("i", int(0)),
                while_(var("i").lt(int(1000)), [assign("i", var("i") + int(1))]),
                ret(var("x") * int(factor)),
            ],
        ),
    )
}

#[test]
fn deadlines_do_not_hide_targeted_counterexamples() {
    let module = Module::new("slow");
    let reference = twice(&module);
    let spec = ReferenceSpec::of(&reference)
        .deadline(Duration::from_nanos(1))
        .max_examples(20);
    let f = slow(&module, 3).against(spec);
    let report = verify(&SubjectModule::new(module).with(reference).with(f), config());

    let r = report.result("slow", ObligationKind::EquivToSpec).unwrap();
    assert_eq!(r.status, Status::Fail, "{}", r.details);
    assert_eq!(r.details["error"], "counterexample found by targeted search");
    let x = r.details["counterexample"]["kwargs"]["x"].as_i64().unwrap();
    assert_eq!(r.details["counterexample"]["impl_result"], x * 3);
    assert_eq!(r.details["counterexample"]["spec_result"], x * 2);
}

#[test]
fn deadlines_do_not_kill_mutants() {
    let mutation_of = |deadline: Option<Duration>| {
        let module = Module::new("slow");
        let reference = twice(&module);
        let mut spec = ReferenceSpec::of(&reference).max_examples(20);
        if let Some(d) = deadline {
            spec = spec.deadline(d);
        }
        let f = slow(&module, 2).against(spec);
        let report = verify(
            &SubjectModule::new(module).with(reference).with(f),
            VerifyConfig {
                features: crate::config::Features {
                    mutation: true,
                    ..Default::default()
                },
                ..config()
            },
        );
        report
            .result("slow", ObligationKind::MutationScore)
            .unwrap()
            .details
            .clone()
    };
    let unbounded = mutation_of(None);
    let bounded = mutation_of(Some(Duration::from_nanos(1)));
    assert!(unbounded["total_mutants"].as_u64().unwrap() > 0);
    for key in ["total_mutants", "killed", "survived", "errors"] {
        assert_eq!(bounded[key], unbounded[key], "{key}");
    }
}

#[test]
fn randomized_confirmation_shrinks_its_counterexample() {
    let module = Module::new("short");
    let xs = || [param("xs", Type::List(Box::new(Type::Int)))];
    let reference = SubjectFunction::interpreted(
        &module,
        func("length", xs(), [ret(call("len", [var("xs")]))]),
    )
    .reference_only();
    let f = SubjectFunction::interpreted(
        &module,
        func(
            "short_length",
            xs(),
            [
                if_(call("len", [var("xs")]).lt(int(3)), [ret(call("len", [var("xs")]))]),
                ret(int(-1)),
            ],
        ),
    );
    let spec = ReferenceSpec::of(&reference);
    let registry = GeneratorRegistry::new();
    let strategy = Synthesis::new(&registry, 20, UnknownTypePolicy::Degrade)
        .kwargs(f.params())
        .unwrap();

    // No targeted attempts, so only the randomized phase can find it.
    let (status, details) = Equivalence {
        subject: &f,
        spec: &spec,
        search: Search::new(Some(7)),
        attempts: 0,
    }
    .check(&strategy);
    assert_eq!(status, Status::Fail, "{details}");
    assert_eq!(details["error"], "implementation disagrees with spec");
    let found = details["counterexample"]["kwargs"]["xs"].as_array().unwrap();
    assert_eq!(found.len(), 3, "{details}");
    assert_eq!(details["counterexample"]["impl_result"], -1);
}

#[test]
fn sampled_integers_reach_large_magnitudes() {
    let registry = GeneratorRegistry::new();
    let strategy = Synthesis::new(&registry, 5, UnknownTypePolicy::Reject)
        .strategy(&Type::Int)
        .unwrap();
    let ints = sample(&strategy, 2000)
        .iter()
        .map(|v| v.as_int().unwrap())
        .collect::<Vec<_>>();
    assert!(ints.iter().any(|n| n.unsigned_abs() > i32::MAX as u64));
    assert!(ints.iter().all(|n| n.checked_mul(2).is_some()));
    assert!(ints.iter().filter(|n| n.abs() <= 10).count() > ints.len() / 3);
}

#[test]
fn self_containing_results_are_reported() {
    let module = Module::new("cycles");
    let f = SubjectFunction::interpreted(
        &module,
        func(
            "selfref",
            [param("xs", Type::List(Box::new(Type::Int)))],
            [
                expr(var("xs").method("append", [var("xs")])),
                ret(var("xs")),
            ],
        ),
    )
    .pure();
    let other = double(&module);
    let report = verify(&SubjectModule::new(module).with(f).with(other), config());

    let smoke = report.result("selfref", ObligationKind::ContractsSmoke).unwrap();
    assert_eq!(smoke.status, Status::Pass, "{}", smoke.details);
    assert!(report.result("selfref", ObligationKind::PureDynamic).is_some());
    assert_eq!(
        report.result("double", ObligationKind::ContractsSmoke).unwrap().status,
        Status::Pass
    );
    assert_eq!(report.trust.functions.len(), 2);
}

#[test]
fn verification_restores_host_limits() {
    let module = Module::new("limits");
    let before = module.host().limits();
    let subjects = SubjectModule::new(module.clone()).with(double(&module));
    let report = verify(
        &subjects,
        VerifyConfig {
            fuel: 1234,
            ..config()
        },
    );
    assert!(!report.is_failure());
    assert_eq!(module.host().limits(), before);
}

#[test]
fn mutation_pass_scores_against_the_spec() {
    let module = Module::new("mutation");
    let reference = twice(&module);
    let f = double(&module).against(ReferenceSpec::of(&reference));
    let report = verify(
        &SubjectModule::new(module).with(reference).with(f),
        VerifyConfig {
            features: crate::config::Features {
                mutation: true,
                ..Default::default()
            },
            ..config()
        },
    );
    let r = report.result("double", ObligationKind::MutationScore).unwrap();
    let total = r.details["total_mutants"].as_u64().unwrap();
    let killed = r.details["killed"].as_u64().unwrap();
    let survived = r.details["survived"].as_u64().unwrap();
    let errors = r.details["errors"].as_u64().unwrap();
    assert!(total > 0);
    assert_eq!(total, killed + survived + errors);
    assert_eq!(r.details["threshold"], 80.0);
    assert!(r.status == Status::Pass || r.status == Status::Fail);
}

struct Idempotence;

impl PropertyInference for Idempotence {
    fn infer(&self, subject: &SubjectFunction) -> Vec<InferredProperty> {
        let x = args(&[("x", Value::Int(3))]);
        let holds = subject
            .invoke(&x)
            .and_then(|once| subject.invoke(&args(&[("x", once.clone())])).map(|t| t == once))
            .unwrap_or(false);
        vec![InferredProperty {
            name: "idempotent".to_string(),
            holds,
        }]
    }
}

#[test]
fn collaborator_passes() {
    let module = Module::new("collab");
    let subjects = SubjectModule::new(module.clone()).with(double(&module));
    let features = crate::config::Features {
        coverage: true,
        prove: true,
        infer: true,
        suggest: true,
        mutation: false,
    };
    let config = VerifyConfig {
        features,
        ..config()
    };

    let report = Verifier::new(config.clone()).verify_module(&subjects, |_| {});
    for kind in [
        ObligationKind::Coverage,
        ObligationKind::SymbolicProof,
        ObligationKind::InferredProperties,
        ObligationKind::SpecSuggestions,
    ] {
        let r = report.result("double", kind).unwrap();
        assert_eq!(r.status, Status::Skip);
        assert!(r.details["reason"].as_str().unwrap().ends_with("unavailable"));
    }

    let report = Verifier::new(config)
        .with_inference(Idempotence)
        .verify_module(&subjects, |_| {});
    let r = report.result("double", ObligationKind::InferredProperties).unwrap();
    assert_eq!(r.status, Status::Skip);
    assert_eq!(r.details["not_holding"], serde_json::json!(["idempotent"]));
}

#[test]
fn results_stream_and_persist() {
    let module = Module::new("persisted");
    let reference = twice(&module);
    let f = double(&module)
        .pure()
        .against(ReferenceSpec::of(&reference));
    let subjects = SubjectModule::new(module).with(reference).with(f);

    let seen = Rc::new(Cell::new(0));
    let counter = seen.clone();
    let report = Verifier::new(config()).verify_module(&subjects, move |_| {
        counter.set(counter.get() + 1)
    });
    assert_eq!(seen.get(), report.results.len());
    assert_eq!(report.summary().total(), report.results.len());
    assert!(!report.is_failure());
    assert_eq!(report.trust.functions.len(), 1);
    assert_eq!(report.trust.functions[0].function.to_string(), "persisted.double");

    let dir = std::env::temp_dir().join(format!("evidence-report-{}", std::process::id()));
    let (obligations, trust) = report.persist(&dir).unwrap();
    assert!(obligations.ends_with("persisted.obligations.json"));

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&obligations).unwrap()).unwrap();
    let first = &written[0];
    assert_eq!(first["function"], "persisted.twice");
    assert!(first["duration_s"].is_number());
    let trust: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&trust).unwrap()).unwrap();
    assert_eq!(trust["module"], "persisted");
    assert!(trust["timestamp"].as_str().unwrap().ends_with('Z'));
    assert_eq!(trust["functions"][0]["function"], "persisted.double");
    let _ = std::fs::remove_dir_all(&dir);
}
