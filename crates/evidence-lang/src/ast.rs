use serde::{Deserialize, Serialize};

use crate::value::Value;

pub type Int = i64;

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ident(pub String);

/// A function definition. Lines are assigned by [`Function::renumber`] and
/// match the pretty-printed form produced by its `Display` impl.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Ident,
    pub params: Vec<Param>,
    pub body: Block,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: Type,
    pub default: Option<Value>,
}

pub type Block = Vec<Stmt>;

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Assign(Target, Expr),
    Expr(Expr),
    If(Expr, Block, Block),
    While(Expr, Block),
    For(Ident, Expr, Block),
    Return(Option<Expr>),
    Break,
    Continue,
    Pass,
    Global(Vec<Ident>),
    Def(Box<Function>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(Ident),
    Unpack(Vec<Ident>),
    Index(Expr, Expr),
    Attr(Expr, Ident),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Literal),
    Name(Ident),
    Attr(Box<Expr>, Ident),
    Call(Box<Expr>, Vec<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    Unary(UnOp, Box<Expr>),
    Compare(Box<Expr>, CmpOp, Box<Expr>),
    Logic(Box<Expr>, LogicOp, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Set(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    /// `then if test else otherwise`
    Cond(Box<Expr>, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(Int),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Is,
    IsNot,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogicOp {
    And,
    Or,
}

/// Declared parameter types, used to derive input generators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Int,
    Float,
    Bool,
    Str,
    Bytes,
    NoneType,
    Any,
    Optional(Box<Type>),
    Union(Vec<Type>),
    Tuple(Vec<Type>),
    List(Box<Type>),
    Set(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Record(RecordType),
    /// A reference to a type by name, resolved at generation time.
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordType {
    pub name: String,
    pub fields: Vec<(String, Type)>,
}
