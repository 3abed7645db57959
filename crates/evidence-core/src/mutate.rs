//! Structural mutation testing.
//!
//! Each mutant is a copy of a function's tree with exactly one change. A
//! mutant is killed when the checker notices the change; the mutation score
//! is the share of testable mutants that were killed.

use std::{fmt, ops::ControlFlow};

use evidence_lang::{
    ast::{BinOp, CmpOp, Expr, Function, Literal, LogicOp, StmtKind, UnOp},
    ast_ext::{Node, NodeMut},
    build::pass,
    Module,
};
use serde::Serialize;

use crate::{error::Result, subject::Callable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    FlipComparison,
    SwapArithmetic,
    NegateCondition,
    DeleteStatement,
    ChangeConstant,
    SwapBoolean,
    RemoveReturn,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::FlipComparison => "flip_comparison",
            Operator::SwapArithmetic => "swap_arithmetic",
            Operator::NegateCondition => "negate_condition",
            Operator::DeleteStatement => "delete_statement",
            Operator::ChangeConstant => "change_constant",
            Operator::SwapBoolean => "swap_boolean",
            Operator::RemoveReturn => "remove_return",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mutant {
    pub operator: Operator,
    pub description: String,
    pub line: u32,
    pub function: Function,
}

impl Mutant {
    /// Validates the mutated tree and binds it in an isolated copy of
    /// `module`, so that recursive calls reach the mutant too.
    pub fn compile(&self, module: &Module) -> Result<Callable> {
        self.function.validate()?;
        let module = module.isolate();
        let function = module.define(self.function.clone());
        Ok(Callable::Interpreted { module, function })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Edit {
    Compare(CmpOp),
    Arithmetic(BinOp),
    Negate,
    Delete(usize),
    Constant(Literal),
    Logic(LogicOp),
    RemoveReturn,
}

struct Candidate {
    operator: Operator,
    description: String,
    line: u32,
    edit: Edit,
}

fn flip_comparison(op: CmpOp) -> CmpOp {
    match op {
        CmpOp::Eq => CmpOp::Ne,
        CmpOp::Ne => CmpOp::Eq,
        CmpOp::Lt => CmpOp::Ge,
        CmpOp::Ge => CmpOp::Lt,
        CmpOp::Gt => CmpOp::Le,
        CmpOp::Le => CmpOp::Gt,
        CmpOp::Is => CmpOp::IsNot,
        CmpOp::IsNot => CmpOp::Is,
        CmpOp::In => CmpOp::NotIn,
        CmpOp::NotIn => CmpOp::In,
    }
}

fn swap_arithmetic(op: BinOp) -> Option<BinOp> {
    Some(match op {
        BinOp::Add => BinOp::Sub,
        BinOp::Sub => BinOp::Add,
        BinOp::Mul => BinOp::Div,
        BinOp::Div => BinOp::Mul,
        BinOp::FloorDiv => BinOp::Mod,
        BinOp::Mod => BinOp::FloorDiv,
        _ => return None,
    })
}

fn change_constant(lit: &Literal) -> Option<Literal> {
    Some(match lit {
        Literal::Bool(b) => Literal::Bool(!b),
        Literal::Int(n) => Literal::Int(n.checked_add(1)?),
        Literal::Float(f) => Literal::Float(f + 1.0),
        Literal::Str(s) if !s.is_empty() => Literal::Str(String::new()),
        _ => return None,
    })
}

fn candidates(node: Node<'_>) -> Vec<Candidate> {
    let mut out = vec![];
    match node {
        Node::Function(f) => {
            for (i, stmt) in f.body.iter().enumerate() {
                if matches!(stmt.kind, StmtKind::Def(_)) {
                    continue;
                }
                out.push(Candidate {
                    operator: Operator::DeleteStatement,
                    description: format!("delete statement at line {}", stmt.line),
                    line: stmt.line,
                    edit: Edit::Delete(i),
                });
            }
        }
        Node::Stmt(stmt) => match &stmt.kind {
            StmtKind::If(..) => out.push(Candidate {
                operator: Operator::NegateCondition,
                description: "if cond -> if not cond".to_string(),
                line: stmt.line,
                edit: Edit::Negate,
            }),
            StmtKind::Return(Some(e)) if !matches!(e, Expr::Const(Literal::None)) => {
                out.push(Candidate {
                    operator: Operator::RemoveReturn,
                    description: format!("return {e} -> return None"),
                    line: stmt.line,
                    edit: Edit::RemoveReturn,
                })
            }
            _ => {}
        },
        Node::Expr(e, line) => match e {
            Expr::Compare(_, op, _) => {
                let to = flip_comparison(*op);
                out.push(Candidate {
                    operator: Operator::FlipComparison,
                    description: format!("{op} -> {to}"),
                    line,
                    edit: Edit::Compare(to),
                });
            }
            Expr::Binary(_, op, _) => {
                if let Some(to) = swap_arithmetic(*op) {
                    out.push(Candidate {
                        operator: Operator::SwapArithmetic,
                        description: format!("{op} -> {to}"),
                        line,
                        edit: Edit::Arithmetic(to),
                    });
                }
            }
            Expr::Const(lit) => {
                if let Some(to) = change_constant(lit) {
                    out.push(Candidate {
                        operator: Operator::ChangeConstant,
                        description: format!("{lit} -> {to}"),
                        line,
                        edit: Edit::Constant(to),
                    });
                }
            }
            Expr::Logic(_, op, _) => {
                let to = match op {
                    LogicOp::And => LogicOp::Or,
                    LogicOp::Or => LogicOp::And,
                };
                out.push(Candidate {
                    operator: Operator::SwapBoolean,
                    description: format!("{op} -> {to}"),
                    line,
                    edit: Edit::Logic(to),
                });
            }
            _ => {}
        },
    }
    out
}

fn apply(node: NodeMut<'_>, edit: &Edit) {
    match (node, edit) {
        (NodeMut::Function(f), Edit::Delete(i)) => {
            if let Some(stmt) = f.body.get_mut(*i) {
                stmt.kind = pass().kind;
            }
        }
        (NodeMut::Stmt(stmt), Edit::Negate) => {
            if let StmtKind::If(cond, _, _) = &mut stmt.kind {
                let inner = std::mem::replace(cond, Expr::Const(Literal::None));
                *cond = Expr::Unary(UnOp::Not, Box::new(inner));
            }
        }
        (NodeMut::Stmt(stmt), Edit::RemoveReturn) => {
            if let StmtKind::Return(Some(e)) = &mut stmt.kind {
                *e = Expr::Const(Literal::None);
            }
        }
        (NodeMut::Expr(Expr::Compare(_, op, _), _), Edit::Compare(to)) => *op = *to,
        (NodeMut::Expr(Expr::Binary(_, op, _), _), Edit::Arithmetic(to)) => *op = *to,
        (NodeMut::Expr(Expr::Logic(_, op, _), _), Edit::Logic(to)) => *op = *to,
        (NodeMut::Expr(Expr::Const(lit), _), Edit::Constant(to)) => *lit = to.clone(),
        _ => {}
    }
}

/// Enumerates up to `max` single-change mutants in traversal order.
pub fn generate(function: &Function, max: usize) -> Vec<Mutant> {
    let mut mutants = vec![];
    for (ordinal, node) in function.nodes().into_iter().enumerate() {
        for candidate in candidates(node) {
            if mutants.len() >= max {
                return mutants;
            }
            let mut mutated = function.clone();
            let mut seen = 0;
            let _ = mutated.walk_mut(&mut |node| {
                if seen == ordinal {
                    apply(node, &candidate.edit);
                    return ControlFlow::Break(());
                }
                seen += 1;
                ControlFlow::Continue(())
            });
            mutants.push(Mutant {
                operator: candidate.operator,
                description: candidate.description,
                line: candidate.line,
                function: mutated,
            });
        }
    }
    mutants
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Survivor {
    pub operator: Operator,
    pub description: String,
    pub line: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MutationReport {
    pub total_mutants: usize,
    pub killed: usize,
    pub survived: usize,
    pub errors: usize,
    /// Percentage of testable mutants killed, or `None` when there were
    /// none.
    pub mutation_score: Option<f64>,
    /// At most [`MAX_SURVIVORS`] of the surviving mutants.
    pub survivors: Vec<Survivor>,
}

pub const MAX_SURVIVORS: usize = 5;

/// Generates the mutants of `callable` and scores them with `killed`, which
/// returns whether the change was detected. Compilation and checker errors
/// are counted separately and excluded from the score.
pub fn run(
    callable: &Callable,
    max: usize,
    mut killed: impl FnMut(&Callable) -> Result<bool>,
) -> MutationReport {
    let Callable::Interpreted { module, function } = callable else {
        return MutationReport::default();
    };
    let mutants = generate(function, max);
    let mut report = MutationReport {
        total_mutants: mutants.len(),
        ..MutationReport::default()
    };
    for mutant in mutants {
        let outcome = mutant.compile(module).and_then(|c| killed(&c));
        tracing::debug!(
            operator = %mutant.operator,
            line = mutant.line,
            description = %mutant.description,
            outcome = ?outcome,
            "mutant"
        );
        match outcome {
            Ok(true) => report.killed += 1,
            Ok(false) => {
                report.survived += 1;
                if report.survivors.len() < MAX_SURVIVORS {
                    report.survivors.push(Survivor {
                        operator: mutant.operator,
                        description: mutant.description,
                        line: mutant.line,
                    });
                }
            }
            Err(_) => report.errors += 1,
        }
    }
    let tested = report.killed + report.survived;
    if tested > 0 {
        let score = report.killed as f64 / tested as f64 * 100.0;
        report.mutation_score = Some((score * 10.0).round() / 10.0);
    }
    report
}
