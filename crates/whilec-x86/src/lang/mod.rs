mod ast;
mod types;

pub use ast::{
    BinOp, ConstDecl, Decl, Expr, ExprKind, FunDecl, Parameter, Stmt, TypeDecl, UnOp, Value,
    VarDecl, WhileFile,
};
pub use types::Type;
