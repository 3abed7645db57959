use std::{collections::BTreeSet, ops::ControlFlow};

use crate::ast::{Block, Expr, Function, Stmt, StmtKind, Target};

#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Function(&'a Function),
    Stmt(&'a Stmt),
    /// An expression together with the line of its enclosing statement.
    Expr(&'a Expr, u32),
}

#[derive(Debug)]
pub enum NodeMut<'a> {
    Function(&'a mut Function),
    Stmt(&'a mut Stmt),
    Expr(&'a mut Expr, u32),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("'{keyword}' outside loop (line {line})")]
    OutsideLoop { keyword: &'static str, line: u32 },
    #[error("duplicate argument '{name}' in function definition of '{function}'")]
    DuplicateParameter { function: String, name: String },
    #[error("invalid assignment target (line {line})")]
    InvalidTarget { line: u32 },
    #[error("name '{name}' is assigned to before global declaration (line {line})")]
    GlobalAfterUse { name: String, line: u32 },
}

impl Expr {
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Const(_) | Expr::Name(_) => vec![],
            Expr::Attr(e, _) | Expr::Unary(_, e) => vec![&**e],
            Expr::Call(f, args) => std::iter::once(&**f).chain(args).collect(),
            Expr::Binary(l, _, r) | Expr::Compare(l, _, r) | Expr::Logic(l, _, r) => {
                vec![&**l, &**r]
            }
            Expr::Index(l, r) => vec![&**l, &**r],
            Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) => items.iter().collect(),
            Expr::Dict(entries) => entries.iter().flat_map(|(k, v)| [k, v]).collect(),
            Expr::Cond(a, b, c) => vec![&**a, &**b, &**c],
        }
    }
    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::Const(_) | Expr::Name(_) => vec![],
            Expr::Attr(e, _) | Expr::Unary(_, e) => vec![&mut **e],
            Expr::Call(f, args) => std::iter::once(&mut **f).chain(args.iter_mut()).collect(),
            Expr::Binary(l, _, r) | Expr::Compare(l, _, r) | Expr::Logic(l, _, r) => {
                vec![&mut **l, &mut **r]
            }
            Expr::Index(l, r) => vec![&mut **l, &mut **r],
            Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) => {
                items.iter_mut().collect()
            }
            Expr::Dict(entries) => entries.iter_mut().flat_map(|(k, v)| [k, v]).collect(),
            Expr::Cond(a, b, c) => vec![&mut **a, &mut **b, &mut **c],
        }
    }

    /// `a.b.c` for chains of attribute accesses rooted in a name.
    pub fn dotted_name(&self) -> Option<String> {
        match self {
            Expr::Name(n) => Some(n.0.clone()),
            Expr::Attr(base, attr) => Some(format!("{}.{}", base.dotted_name()?, attr.0)),
            _ => None,
        }
    }

    fn walk<'a>(
        &'a self,
        line: u32,
        visit: &mut impl FnMut(Node<'a>) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        visit(Node::Expr(self, line))?;
        for child in self.children() {
            child.walk(line, visit)?;
        }
        ControlFlow::Continue(())
    }
    fn walk_mut(
        &mut self,
        line: u32,
        visit: &mut impl FnMut(NodeMut<'_>) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        visit(NodeMut::Expr(self, line))?;
        for child in self.children_mut() {
            child.walk_mut(line, visit)?;
        }
        ControlFlow::Continue(())
    }
}

impl Target {
    fn exprs(&self) -> Vec<&Expr> {
        match self {
            Target::Name(_) | Target::Unpack(_) => vec![],
            Target::Index(base, idx) => vec![base, idx],
            Target::Attr(base, _) => vec![base],
        }
    }
    fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Target::Name(_) | Target::Unpack(_) => vec![],
            Target::Index(base, idx) => vec![base, idx],
            Target::Attr(base, _) => vec![base],
        }
    }
}

impl Stmt {
    fn walk<'a>(&'a self, visit: &mut impl FnMut(Node<'a>) -> ControlFlow<()>) -> ControlFlow<()> {
        visit(Node::Stmt(self))?;
        let line = self.line;
        match &self.kind {
            StmtKind::Assign(target, expr) => {
                for e in target.exprs() {
                    e.walk(line, visit)?;
                }
                expr.walk(line, visit)?;
            }
            StmtKind::Expr(e) | StmtKind::Return(Some(e)) => e.walk(line, visit)?,
            StmtKind::If(cond, then, otherwise) => {
                cond.walk(line, visit)?;
                walk_block(then, visit)?;
                walk_block(otherwise, visit)?;
            }
            StmtKind::While(cond, body) | StmtKind::For(_, cond, body) => {
                cond.walk(line, visit)?;
                walk_block(body, visit)?;
            }
            StmtKind::Def(f) => f.walk(visit)?,
            StmtKind::Return(None)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Pass
            | StmtKind::Global(_) => {}
        }
        ControlFlow::Continue(())
    }
    fn walk_mut(
        &mut self,
        visit: &mut impl FnMut(NodeMut<'_>) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        visit(NodeMut::Stmt(self))?;
        let line = self.line;
        match &mut self.kind {
            StmtKind::Assign(target, expr) => {
                for e in target.exprs_mut() {
                    e.walk_mut(line, visit)?;
                }
                expr.walk_mut(line, visit)?;
            }
            StmtKind::Expr(e) | StmtKind::Return(Some(e)) => e.walk_mut(line, visit)?,
            StmtKind::If(cond, then, otherwise) => {
                cond.walk_mut(line, visit)?;
                walk_block_mut(then, visit)?;
                walk_block_mut(otherwise, visit)?;
            }
            StmtKind::While(cond, body) | StmtKind::For(_, cond, body) => {
                cond.walk_mut(line, visit)?;
                walk_block_mut(body, visit)?;
            }
            StmtKind::Def(f) => f.walk_mut(visit)?,
            StmtKind::Return(None)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Pass
            | StmtKind::Global(_) => {}
        }
        ControlFlow::Continue(())
    }
}

fn walk_block<'a>(
    block: &'a Block,
    visit: &mut impl FnMut(Node<'a>) -> ControlFlow<()>,
) -> ControlFlow<()> {
    for stmt in block {
        stmt.walk(visit)?;
    }
    ControlFlow::Continue(())
}
fn walk_block_mut(
    block: &mut Block,
    visit: &mut impl FnMut(NodeMut<'_>) -> ControlFlow<()>,
) -> ControlFlow<()> {
    for stmt in block {
        stmt.walk_mut(visit)?;
    }
    ControlFlow::Continue(())
}

impl Function {
    /// Visits every node in a fixed pre-order: the function, then each
    /// statement followed by its expressions and nested blocks.
    pub fn walk<'a>(
        &'a self,
        visit: &mut impl FnMut(Node<'a>) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        visit(Node::Function(self))?;
        walk_block(&self.body, visit)
    }
    /// Same traversal order as [`Function::walk`].
    pub fn walk_mut(
        &mut self,
        visit: &mut impl FnMut(NodeMut<'_>) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        visit(NodeMut::Function(self))?;
        walk_block_mut(&mut self.body, visit)
    }

    pub fn nodes(&self) -> Vec<Node<'_>> {
        let mut nodes = vec![];
        let _ = self.walk(&mut |n| {
            nodes.push(n);
            ControlFlow::Continue(())
        });
        nodes
    }

    /// Assigns source lines so that they match the pretty-printed form,
    /// starting at the current line of the definition (or 1).
    pub fn renumber(&mut self) {
        let start = self.line.max(1);
        self.renumber_from(start);
    }
    fn renumber_from(&mut self, start: u32) -> u32 {
        self.line = start;
        renumber_block(&mut self.body, start + 1)
    }

    /// Checks the tree is well formed enough to be executed.
    pub fn validate(&self) -> Result<(), CompileError> {
        let mut seen = BTreeSet::new();
        for p in &self.params {
            if !seen.insert(&p.name) {
                return Err(CompileError::DuplicateParameter {
                    function: self.name.0.clone(),
                    name: p.name.0.clone(),
                });
            }
        }
        let mut assigned = BTreeSet::new();
        validate_block(&self.body, false, &mut assigned)
    }
}

fn renumber_block(block: &mut Block, start: u32) -> u32 {
    if block.is_empty() {
        return start + 1;
    }
    let mut line = start;
    for stmt in block {
        stmt.line = line;
        line = match &mut stmt.kind {
            StmtKind::If(_, then, otherwise) => {
                let after_then = renumber_block(then, line + 1);
                if otherwise.is_empty() {
                    after_then
                } else {
                    renumber_block(otherwise, after_then + 1)
                }
            }
            StmtKind::While(_, body) | StmtKind::For(_, _, body) => renumber_block(body, line + 1),
            StmtKind::Def(f) => f.renumber_from(line),
            _ => line + 1,
        };
    }
    line
}

fn validate_block<'a>(
    block: &'a Block,
    in_loop: bool,
    assigned: &mut BTreeSet<&'a str>,
) -> Result<(), CompileError> {
    for stmt in block {
        match &stmt.kind {
            StmtKind::Break | StmtKind::Continue if !in_loop => {
                return Err(CompileError::OutsideLoop {
                    keyword: if matches!(stmt.kind, StmtKind::Break) {
                        "break"
                    } else {
                        "continue"
                    },
                    line: stmt.line,
                })
            }
            StmtKind::Assign(Target::Unpack(names), _) if names.is_empty() => {
                return Err(CompileError::InvalidTarget { line: stmt.line })
            }
            StmtKind::Assign(Target::Name(n), _) => {
                assigned.insert(&n.0);
            }
            StmtKind::Assign(Target::Unpack(names), _) => {
                assigned.extend(names.iter().map(|n| n.0.as_str()));
            }
            StmtKind::For(var, _, body) => {
                assigned.insert(&var.0);
                validate_block(body, true, assigned)?;
            }
            StmtKind::Global(names) => {
                if let Some(n) = names.iter().find(|n| assigned.contains(n.0.as_str())) {
                    return Err(CompileError::GlobalAfterUse {
                        name: n.0.clone(),
                        line: stmt.line,
                    });
                }
            }
            StmtKind::If(_, then, otherwise) => {
                validate_block(then, in_loop, assigned)?;
                validate_block(otherwise, in_loop, assigned)?;
            }
            StmtKind::While(_, body) => validate_block(body, true, assigned)?,
            StmtKind::Def(f) => {
                assigned.insert(&f.name.0);
                f.validate()?;
            }
            _ => {}
        }
    }
    Ok(())
}
