use std::fmt::{self, Debug, Display};

use itertools::Itertools;

use crate::{
    ast::{
        BinOp, Block, CmpOp, Expr, Function, Ident, Literal, LogicOp, Param, RecordType, Stmt,
        StmtKind, Target, Type, UnOp,
    },
    value::Value,
};

impl Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl Debug for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::from(self))
    }
}

impl Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        };
        write!(f, "{op}")
    }
}
impl Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnOp::Neg => write!(f, "-"),
            UnOp::Not => write!(f, "not "),
        }
    }
}
impl Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
        };
        write!(f, "{op}")
    }
}
impl Display for LogicOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicOp::And => write!(f, "and"),
            LogicOp::Or => write!(f, "or"),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(lit) => write!(f, "{lit}"),
            Expr::Name(n) => write!(f, "{n}"),
            Expr::Attr(base, attr) => write!(f, "{base}.{attr}"),
            Expr::Call(callee, args) => write!(f, "{callee}({})", args.iter().format(", ")),
            Expr::Binary(l, op, r) => write!(f, "({l} {op} {r})"),
            Expr::Unary(op, e) => write!(f, "({op}{e})"),
            Expr::Compare(l, op, r) => write!(f, "({l} {op} {r})"),
            Expr::Logic(l, op, r) => write!(f, "({l} {op} {r})"),
            Expr::Index(base, idx) => write!(f, "{base}[{idx}]"),
            Expr::List(items) => write!(f, "[{}]", items.iter().format(", ")),
            Expr::Tuple(items) if items.len() == 1 => write!(f, "({},)", items[0]),
            Expr::Tuple(items) => write!(f, "({})", items.iter().format(", ")),
            Expr::Set(items) if items.is_empty() => write!(f, "set()"),
            Expr::Set(items) => write!(f, "{{{}}}", items.iter().format(", ")),
            Expr::Dict(entries) => write!(
                f,
                "{{{}}}",
                entries.iter().map(|(k, v)| format!("{k}: {v}")).format(", ")
            ),
            Expr::Cond(then, test, otherwise) => write!(f, "({then} if {test} else {otherwise})"),
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Name(n) => write!(f, "{n}"),
            Target::Unpack(names) => write!(f, "{}", names.iter().format(", ")),
            Target::Index(base, idx) => write!(f, "{base}[{idx}]"),
            Target::Attr(base, attr) => write!(f, "{base}.{attr}"),
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Bool => write!(f, "bool"),
            Type::Str => write!(f, "str"),
            Type::Bytes => write!(f, "bytes"),
            Type::NoneType => write!(f, "None"),
            Type::Any => write!(f, "Any"),
            Type::Optional(t) => write!(f, "Optional[{t}]"),
            Type::Union(ts) => write!(f, "Union[{}]", ts.iter().format(", ")),
            Type::Tuple(ts) => write!(f, "tuple[{}]", ts.iter().format(", ")),
            Type::List(t) => write!(f, "list[{t}]"),
            Type::Set(t) => write!(f, "set[{t}]"),
            Type::Map(k, v) => write!(f, "dict[{k}, {v}]"),
            Type::Record(RecordType { name, .. }) => write!(f, "{name}"),
            Type::Named(name) => write!(f, "{name}"),
        }
    }
}

impl Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)?;
        if let Some(default) = &self.default {
            write!(f, " = {default}")?;
        }
        Ok(())
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, block: &Block, indent: usize) -> fmt::Result {
    if block.is_empty() {
        return writeln!(f, "{:indent$}pass", "");
    }
    for stmt in block {
        write_stmt(f, stmt, indent)?;
    }
    Ok(())
}

fn write_function(f: &mut fmt::Formatter<'_>, func: &Function, indent: usize) -> fmt::Result {
    writeln!(
        f,
        "{:indent$}def {}({}):",
        "",
        func.name,
        func.params.iter().format(", ")
    )?;
    write_block(f, &func.body, indent + 4)
}

fn write_stmt(f: &mut fmt::Formatter<'_>, stmt: &Stmt, indent: usize) -> fmt::Result {
    let pad = "";
    match &stmt.kind {
        StmtKind::Assign(target, expr) => writeln!(f, "{pad:indent$}{target} = {expr}"),
        StmtKind::Expr(e) => writeln!(f, "{pad:indent$}{e}"),
        StmtKind::If(cond, then, otherwise) => {
            writeln!(f, "{pad:indent$}if {cond}:")?;
            write_block(f, then, indent + 4)?;
            if !otherwise.is_empty() {
                writeln!(f, "{pad:indent$}else:")?;
                write_block(f, otherwise, indent + 4)?;
            }
            Ok(())
        }
        StmtKind::While(cond, body) => {
            writeln!(f, "{pad:indent$}while {cond}:")?;
            write_block(f, body, indent + 4)
        }
        StmtKind::For(var, iter, body) => {
            writeln!(f, "{pad:indent$}for {var} in {iter}:")?;
            write_block(f, body, indent + 4)
        }
        StmtKind::Return(Some(e)) => writeln!(f, "{pad:indent$}return {e}"),
        StmtKind::Return(None) => writeln!(f, "{pad:indent$}return"),
        StmtKind::Break => writeln!(f, "{pad:indent$}break"),
        StmtKind::Continue => writeln!(f, "{pad:indent$}continue"),
        StmtKind::Pass => writeln!(f, "{pad:indent$}pass"),
        StmtKind::Global(names) => writeln!(f, "{pad:indent$}global {}", names.iter().format(", ")),
        StmtKind::Def(func) => write_function(f, func, indent),
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_stmt(f, self, 0)
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_function(f, self, 0)
    }
}
