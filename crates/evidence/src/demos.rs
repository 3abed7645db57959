//! Small subject modules with known defects, used to exercise the verifier
//! end to end.

use evidence_core::{ReferenceSpec, SubjectFunction, SubjectModule};
use evidence_lang::{ast::Type, build::*, Module};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Demo {
    /// XOR checksum checked against an additive spec
    Checksum,
    /// Binary search that skips its last candidate
    Bisect,
    /// Run grouping that drops the final run
    Runs,
    /// A pure doubling function
    Doubling,
    /// An identity function that prints its argument
    Echo,
}

impl Demo {
    pub fn module(self) -> SubjectModule {
        match self {
            Demo::Checksum => checksum(),
            Demo::Bisect => bisect(),
            Demo::Runs => runs(),
            Demo::Doubling => doubling(),
            Demo::Echo => echo(),
        }
    }
}

fn ints() -> Type {
    Type::List(Box::new(Type::Int))
}

fn checksum() -> SubjectModule {
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
    let xor = SubjectFunction::interpreted(
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
    .ensures(var("result").ge(int(0)).and(var("result").lt(int(256))))
    .against(ReferenceSpec::of(&additive));
    SubjectModule::new(module).with(additive).with(xor)
}

fn bisect() -> SubjectModule {
    let module = Module::new("bisect");
    let params = || [param("xs", ints()), param("target", Type::Int)];
    let linear = SubjectFunction::interpreted(
        &module,
        func(
            "linear_search",
            params(),
            [
                for_(
                    "i",
                    call("range", [call("len", [var("xs")])]),
                    [if_(
                        var("xs").at(var("i")).equals(var("target")),
                        [ret(var("i"))],
                    )],
                ),
                ret(int(-1)),
            ],
        ),
    )
    .reference_only();
    let search = SubjectFunction::interpreted(
        &module,
        func(
            "binary_search",
            params(),
            [
                assign("lo", int(0)),
                assign("hi", call("len", [var("xs")]) - int(1)),
                while_(
                    var("lo").lt(var("hi")),
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
        ),
    )
    .requires(var("xs").equals(call("sorted", [call("set", [var("xs")])])))
    .ensures(
        var("result")
            .equals(int(-1))
            .or(var("xs").at(var("result")).equals(var("target"))),
    )
    .against(ReferenceSpec::of(&linear));
    SubjectModule::new(module).with(linear).with(search)
}

fn runs() -> SubjectModule {
    let module = Module::new("runs");
    let group = SubjectFunction::interpreted(
        &module,
        func(
            "group_runs",
            [param("xs", ints())],
            [
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
                ret(var("out")),
            ],
        ),
    )
    .ensures_fn("runs cover the input", |args, result| {
        let covered = result
            .elements()
            .map(|runs| runs.iter().map(|run| run.len().unwrap_or(0)).sum::<usize>());
        args.get("xs").and_then(|xs| xs.len().ok()) == covered.ok()
    });
    SubjectModule::new(module).with(group)
}

fn doubling() -> SubjectModule {
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
    .ensures(var("result").equals(var("x") * int(2)))
    .pure()
    .against(ReferenceSpec::of(&twice));
    SubjectModule::new(module).with(twice).with(double)
}

fn echo() -> SubjectModule {
    let module = Module::new("echo");
    let echo = SubjectFunction::interpreted(
        &module,
        func(
            "echo",
            [param("x", Type::Int)],
            [expr(call("print", [var("x")])), ret(var("x"))],
        ),
    )
    .pure();
    SubjectModule::new(module).with(echo)
}
