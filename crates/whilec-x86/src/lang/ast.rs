//! Typed syntax tree handed over by the front end.
//!
//! Every expression carries the type the checker resolved for it. The backend
//! trusts these annotations and does not re-check them.

use super::Type;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Char(char),
    Int(i64),
    Real(f64),
    Str(String),
}

impl Value {
    #[must_use]
    pub fn ty(&self) -> Type {
        match self {
            Value::Bool(_) => Type::Bool,
            Value::Char(_) => Type::Char,
            Value::Int(_) => Type::Int,
            Value::Real(_) => Type::Real,
            Value::Str(_) => Type::Str,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Neq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Append,
}

impl BinOp {
    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Neq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq
        )
    }

    #[must_use]
    pub const fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not,
    Neg,
    LengthOf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Constant(Value),
    Variable(String),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnOp,
        expr: Box<Expr>,
    },
    /// Cast of `source` to the expression's own annotated type.
    Cast {
        source: Box<Expr>,
    },
    IndexOf {
        source: Box<Expr>,
        index: Box<Expr>,
    },
    Invoke {
        name: String,
        args: Vec<Expr>,
    },
    ListConstructor(Vec<Expr>),
    RecordAccess {
        source: Box<Expr>,
        field: String,
    },
    RecordConstructor(Vec<(String, Expr)>),
}

impl Expr {
    #[must_use]
    pub const fn new(kind: ExprKind, ty: Type) -> Self {
        Self { kind, ty }
    }

    #[must_use]
    pub fn constant(value: Value) -> Self {
        let ty = value.ty();
        Self::new(ExprKind::Constant(value), ty)
    }

    #[must_use]
    pub fn int(value: i64) -> Self {
        Self::constant(Value::Int(value))
    }

    #[must_use]
    pub fn bool(value: bool) -> Self {
        Self::constant(Value::Bool(value))
    }

    #[must_use]
    pub fn char(value: char) -> Self {
        Self::constant(Value::Char(value))
    }

    #[must_use]
    pub fn real(value: f64) -> Self {
        Self::constant(Value::Real(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::constant(Value::Str(value.into()))
    }

    pub fn variable(name: impl Into<String>, ty: Type) -> Self {
        Self::new(ExprKind::Variable(name.into()), ty)
    }

    /// Binary expression annotated the way the checker would: comparisons and
    /// logical operators are `bool`, `++` with a string operand is `string`,
    /// everything else takes the left operand's type.
    #[must_use]
    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        let ty = if op.is_comparison() || op.is_logical() {
            Type::Bool
        } else if op == BinOp::Append && (lhs.ty.is_string() || rhs.ty.is_string()) {
            Type::Str
        } else {
            lhs.ty.clone()
        };
        Self::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty,
        )
    }

    #[must_use]
    pub fn unary(op: UnOp, expr: Expr) -> Self {
        let ty = match op {
            UnOp::Not => Type::Bool,
            UnOp::Neg => expr.ty.clone(),
            UnOp::LengthOf => Type::Int,
        };
        Self::new(
            ExprKind::Unary {
                op,
                expr: Box::new(expr),
            },
            ty,
        )
    }

    #[must_use]
    pub fn cast(ty: Type, source: Expr) -> Self {
        Self::new(
            ExprKind::Cast {
                source: Box::new(source),
            },
            ty,
        )
    }

    pub fn invoke(name: impl Into<String>, args: Vec<Expr>, ret: Type) -> Self {
        Self::new(
            ExprKind::Invoke {
                name: name.into(),
                args,
            },
            ret,
        )
    }

    pub fn record<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Expr)>,
        S: Into<String>,
    {
        let fields: Vec<(String, Expr)> = fields
            .into_iter()
            .map(|(name, expr)| (name.into(), expr))
            .collect();
        let ty = Type::record(fields.iter().map(|(name, e)| (name.clone(), e.ty.clone())));
        Self::new(ExprKind::RecordConstructor(fields), ty)
    }

    /// Field access on a record-typed expression.
    ///
    /// # Panics
    ///
    /// Panics if `source` is not annotated with a record type containing
    /// `field`. Use [`Expr::field_typed`] when the source is a named type.
    pub fn field(source: Expr, field: impl Into<String>) -> Self {
        let field = field.into();
        let ty = match &source.ty {
            Type::Record(fields) => fields.get(&field).cloned(),
            _ => None,
        };
        let Some(ty) = ty else {
            panic!("`{}` has no field `{field}`", source.ty);
        };
        Self::field_typed(source, field, ty)
    }

    pub fn field_typed(source: Expr, field: impl Into<String>, ty: Type) -> Self {
        Self::new(
            ExprKind::RecordAccess {
                source: Box::new(source),
                field: field.into(),
            },
            ty,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub ty: Type,
    pub init: Option<Expr>,
}

impl VarDecl {
    pub fn new(name: impl Into<String>, ty: Type, init: Option<Expr>) -> Self {
        Self {
            name: name.into(),
            ty,
            init,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign {
        lhs: Expr,
        rhs: Expr,
    },
    Print(Expr),
    Return(Option<Expr>),
    VariableDeclaration(VarDecl),
    IfElse {
        condition: Expr,
        true_branch: Vec<Stmt>,
        false_branch: Vec<Stmt>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    For {
        declaration: VarDecl,
        condition: Expr,
        increment: Box<Stmt>,
        body: Vec<Stmt>,
    },
    /// Invocation used as a statement; its result is discarded.
    Invoke(Expr),
}

impl Stmt {
    pub fn declare(name: impl Into<String>, ty: Type, init: Option<Expr>) -> Self {
        Self::VariableDeclaration(VarDecl::new(name, ty, init))
    }

    #[must_use]
    pub const fn assign(lhs: Expr, rhs: Expr) -> Self {
        Self::Assign { lhs, rhs }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunDecl {
    pub name: String,
    pub params: Vec<Parameter>,
    pub ret: Type,
    pub body: Vec<Stmt>,
}

impl FunDecl {
    pub fn new(name: impl Into<String>, params: Vec<Parameter>, ret: Type, body: Vec<Stmt>) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstDecl {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Function(FunDecl),
    Type(TypeDecl),
    Constant(ConstDecl),
}

impl Decl {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Decl::Function(f) => &f.name,
            Decl::Type(t) => &t.name,
            Decl::Constant(c) => &c.name,
        }
    }
}

/// A checked source file: the unit of translation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhileFile {
    pub declarations: Vec<Decl>,
}

impl WhileFile {
    #[must_use]
    pub const fn new(declarations: Vec<Decl>) -> Self {
        Self { declarations }
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunDecl> {
        self.declarations.iter().filter_map(|d| match d {
            Decl::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDecl> {
        self.declarations.iter().filter_map(|d| match d {
            Decl::Type(t) => Some(t),
            _ => None,
        })
    }

    pub fn constants(&self) -> impl Iterator<Item = &ConstDecl> {
        self.declarations.iter().filter_map(|d| match d {
            Decl::Constant(c) => Some(c),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_annotations() {
        let sum = Expr::binary(BinOp::Add, Expr::int(1), Expr::int(2));
        assert_eq!(sum.ty, Type::Int);

        let cmp = Expr::binary(BinOp::Lt, Expr::int(1), Expr::int(2));
        assert_eq!(cmp.ty, Type::Bool);

        let concat = Expr::binary(BinOp::Append, Expr::int(1), Expr::string("x"));
        assert_eq!(concat.ty, Type::Str);
    }

    #[test]
    fn record_constructor_and_field_types() {
        let rec = Expr::record([("y", Expr::bool(true)), ("x", Expr::int(4))]);
        assert_eq!(rec.ty, Type::record([("x", Type::Int), ("y", Type::Bool)]));

        let access = Expr::field(rec, "y");
        assert_eq!(access.ty, Type::Bool);
    }

    #[test]
    fn file_partitions_declarations() {
        let file = WhileFile::new(vec![
            Decl::Type(TypeDecl {
                name: "Point".into(),
                ty: Type::record([("x", Type::Int)]),
            }),
            Decl::Function(FunDecl::new("main", vec![], Type::Void, vec![])),
            Decl::Constant(ConstDecl {
                name: "TEN".into(),
                value: Expr::int(10),
            }),
        ]);
        assert_eq!(file.functions().count(), 1);
        assert_eq!(file.types().next().map(|t| t.name.as_str()), Some("Point"));
        assert_eq!(file.constants().next().map(|c| c.name.as_str()), Some("TEN"));
        assert_eq!(file.declarations[1].name(), "main");
    }
}
