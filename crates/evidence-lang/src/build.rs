//! Constructors for assembling IR trees by hand.
//!
//! ```
//! use evidence_lang::{ast::Type, build::*};
//!
//! let double = func(
//!     "double",
//!     [param("x", Type::Int)],
//!     [ret(var("x") * int(2))],
//! );
//! assert_eq!(double.to_string(), "def double(x: int):\n    return (x * 2)\n");
//! ```

use std::ops;

use crate::{
    ast::{
        BinOp, Block, CmpOp, Expr, Function, Ident, Int, Literal, LogicOp, Param, Stmt, StmtKind,
        Target, Type, UnOp,
    },
    value::Value,
};

impl From<&str> for Ident {
    fn from(s: &str) -> Self {
        Ident(s.to_string())
    }
}
impl From<Int> for Expr {
    fn from(n: Int) -> Self {
        int(n)
    }
}
impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        boolean(b)
    }
}
impl From<f64> for Expr {
    fn from(f: f64) -> Self {
        float(f)
    }
}

/// A function definition with lines assigned from 1.
pub fn func(
    name: &str,
    params: impl IntoIterator<Item = Param>,
    body: impl IntoIterator<Item = Stmt>,
) -> Function {
    let mut f = Function {
        name: name.into(),
        params: params.into_iter().collect(),
        body: body.into_iter().collect(),
        line: 1,
    };
    f.renumber();
    f
}

pub fn param(name: &str, ty: Type) -> Param {
    Param {
        name: name.into(),
        ty,
        default: None,
    }
}

impl Param {
    pub fn with_default(mut self, value: impl Into<Value>) -> Param {
        self.default = Some(value.into());
        self
    }
}

fn stmt(kind: StmtKind) -> Stmt {
    Stmt { kind, line: 0 }
}

pub fn assign(name: &str, value: impl Into<Expr>) -> Stmt {
    stmt(StmtKind::Assign(Target::Name(name.into()), value.into()))
}
pub fn unpack<'a>(names: impl IntoIterator<Item = &'a str>, value: impl Into<Expr>) -> Stmt {
    stmt(StmtKind::Assign(
        Target::Unpack(names.into_iter().map(Ident::from).collect()),
        value.into(),
    ))
}
pub fn set_item(base: Expr, idx: impl Into<Expr>, value: impl Into<Expr>) -> Stmt {
    stmt(StmtKind::Assign(Target::Index(base, idx.into()), value.into()))
}
pub fn set_attr(base: Expr, attr: &str, value: impl Into<Expr>) -> Stmt {
    stmt(StmtKind::Assign(Target::Attr(base, attr.into()), value.into()))
}
pub fn expr(e: Expr) -> Stmt {
    stmt(StmtKind::Expr(e))
}
pub fn if_(cond: Expr, then: impl IntoIterator<Item = Stmt>) -> Stmt {
    if_else(cond, then, [])
}
pub fn if_else(
    cond: Expr,
    then: impl IntoIterator<Item = Stmt>,
    otherwise: impl IntoIterator<Item = Stmt>,
) -> Stmt {
    stmt(StmtKind::If(
        cond,
        then.into_iter().collect(),
        otherwise.into_iter().collect(),
    ))
}
pub fn while_(cond: Expr, body: impl IntoIterator<Item = Stmt>) -> Stmt {
    stmt(StmtKind::While(cond, body.into_iter().collect()))
}
pub fn for_(var: &str, iter: Expr, body: impl IntoIterator<Item = Stmt>) -> Stmt {
    stmt(StmtKind::For(var.into(), iter, body.into_iter().collect()))
}
pub fn ret(value: impl Into<Expr>) -> Stmt {
    stmt(StmtKind::Return(Some(value.into())))
}
pub fn ret_none() -> Stmt {
    stmt(StmtKind::Return(None))
}
pub fn brk() -> Stmt {
    stmt(StmtKind::Break)
}
pub fn cont() -> Stmt {
    stmt(StmtKind::Continue)
}
pub fn pass() -> Stmt {
    stmt(StmtKind::Pass)
}
pub fn global<'a>(names: impl IntoIterator<Item = &'a str>) -> Stmt {
    stmt(StmtKind::Global(names.into_iter().map(Ident::from).collect()))
}
pub fn def(f: Function) -> Stmt {
    stmt(StmtKind::Def(Box::new(f)))
}

pub fn int(n: Int) -> Expr {
    Expr::Const(Literal::Int(n))
}
pub fn float(f: f64) -> Expr {
    Expr::Const(Literal::Float(f))
}
pub fn boolean(b: bool) -> Expr {
    Expr::Const(Literal::Bool(b))
}
pub fn none() -> Expr {
    Expr::Const(Literal::None)
}
pub fn string(s: &str) -> Expr {
    Expr::Const(Literal::Str(s.to_string()))
}
pub fn bytes(b: &[u8]) -> Expr {
    Expr::Const(Literal::Bytes(b.to_vec()))
}
pub fn var(name: &str) -> Expr {
    Expr::Name(name.into())
}
/// A call to a plain or dotted name, e.g. `call("random.randint", ..)`.
pub fn call(name: &str, args: impl IntoIterator<Item = Expr>) -> Expr {
    let mut parts = name.split('.');
    let root = var(parts.next().unwrap_or_default());
    parts.fold(root, |e, p| e.attr(p)).call(args)
}
pub fn list(items: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::List(items.into_iter().collect())
}
pub fn tuple(items: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Tuple(items.into_iter().collect())
}
pub fn set(items: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Set(items.into_iter().collect())
}
pub fn dict(entries: impl IntoIterator<Item = (Expr, Expr)>) -> Expr {
    Expr::Dict(entries.into_iter().collect())
}
pub fn cond(then: impl Into<Expr>, test: Expr, otherwise: impl Into<Expr>) -> Expr {
    Expr::Cond(Box::new(then.into()), Box::new(test), Box::new(otherwise.into()))
}

impl Expr {
    pub fn binary(self, op: BinOp, rhs: impl Into<Expr>) -> Expr {
        Expr::Binary(Box::new(self), op, Box::new(rhs.into()))
    }
    pub fn compare(self, op: CmpOp, rhs: impl Into<Expr>) -> Expr {
        Expr::Compare(Box::new(self), op, Box::new(rhs.into()))
    }
    pub fn floor_div(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinOp::FloorDiv, rhs)
    }
    pub fn pow(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinOp::Pow, rhs)
    }
    pub fn equals(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CmpOp::Eq, rhs)
    }
    pub fn not_equals(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CmpOp::Ne, rhs)
    }
    pub fn lt(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CmpOp::Lt, rhs)
    }
    pub fn le(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CmpOp::Le, rhs)
    }
    pub fn gt(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CmpOp::Gt, rhs)
    }
    pub fn ge(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CmpOp::Ge, rhs)
    }
    pub fn is(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CmpOp::Is, rhs)
    }
    pub fn is_not(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CmpOp::IsNot, rhs)
    }
    pub fn within(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CmpOp::In, rhs)
    }
    pub fn and(self, rhs: impl Into<Expr>) -> Expr {
        Expr::Logic(Box::new(self), LogicOp::And, Box::new(rhs.into()))
    }
    pub fn or(self, rhs: impl Into<Expr>) -> Expr {
        Expr::Logic(Box::new(self), LogicOp::Or, Box::new(rhs.into()))
    }
    pub fn at(self, idx: impl Into<Expr>) -> Expr {
        Expr::Index(Box::new(self), Box::new(idx.into()))
    }
    pub fn attr(self, name: &str) -> Expr {
        Expr::Attr(Box::new(self), name.into())
    }
    pub fn call(self, args: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Call(Box::new(self), args.into_iter().collect())
    }
    pub fn method(self, name: &str, args: impl IntoIterator<Item = Expr>) -> Expr {
        self.attr(name).call(args)
    }
}

macro_rules! binary_ops {
    ($($trait:ident::$method:ident => $op:ident),* $(,)?) => {
        $(
            impl<R: Into<Expr>> ops::$trait<R> for Expr {
                type Output = Expr;
                fn $method(self, rhs: R) -> Expr {
                    self.binary(BinOp::$op, rhs)
                }
            }
        )*
    };
}

binary_ops! {
    Add::add => Add,
    Sub::sub => Sub,
    Mul::mul => Mul,
    Div::div => Div,
    Rem::rem => Mod,
    BitAnd::bitand => BitAnd,
    BitOr::bitor => BitOr,
    BitXor::bitxor => BitXor,
    Shl::shl => Shl,
    Shr::shr => Shr,
}

impl ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Unary(UnOp::Neg, Box::new(self))
    }
}
impl ops::Not for Expr {
    type Output = Expr;
    fn not(self) -> Expr {
        Expr::Unary(UnOp::Not, Box::new(self))
    }
}

/// Wraps statements into a block, for use where a [`Block`] is expected.
pub fn block(stmts: impl IntoIterator<Item = Stmt>) -> Block {
    stmts.into_iter().collect()
}
