use std::collections::BTreeMap;
use std::fmt;

/// Source-level types as annotated by the type checker.
///
/// Record fields live in a `BTreeMap`, so iterating a record always yields its
/// fields in canonical (lexicographic) order. Layout, descriptors and record
/// construction all rely on that order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Bool,
    Char,
    Int,
    Real,
    Str,
    Record(BTreeMap<String, Type>),
    List(Box<Type>),
    Union(Vec<Type>),
    Named(String),
}

impl Type {
    pub fn record<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Type)>,
        S: Into<String>,
    {
        Self::Record(
            fields
                .into_iter()
                .map(|(name, ty)| (name.into(), ty))
                .collect(),
        )
    }

    #[must_use]
    pub fn list(element: Type) -> Self {
        Self::List(Box::new(element))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    #[must_use]
    pub const fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    #[must_use]
    pub const fn is_string(&self) -> bool {
        matches!(self, Self::Str)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "bool"),
            Type::Char => write!(f, "char"),
            Type::Int => write!(f, "int"),
            Type::Real => write!(f, "real"),
            Type::Str => write!(f, "string"),
            Type::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{ty} {name}")?;
                }
                write!(f, "}}")
            }
            Type::List(element) => write!(f, "[{element}]"),
            Type::Union(bounds) => {
                for (i, bound) in bounds.iter().enumerate() {
                    if i != 0 {
                        write!(f, "|")?;
                    }
                    write!(f, "{bound}")?;
                }
                Ok(())
            }
            Type::Named(name) => write!(f, "{name}"),
        }
    }
}
