// Type layout: widths, field offsets, value representation and runtime
// type descriptors.
//
// Named types are resolved through the file's type declarations. Every walk
// keeps the stack of names it is currently expanding, so a declaration that
// reaches itself fails with `CyclicType` instead of recursing forever.

use std::collections::{BTreeMap, HashMap};

use crate::abi::TypeTag;
use crate::lang::{Type, WhileFile};
use crate::target::Target;
use crate::x86::Constant;
use crate::{Error, Result};

/// How a value of some type lives in a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    /// No value at all.
    Void,
    /// The value itself fits in one machine word.
    Word,
    /// The register holds a pointer to `width` bytes of inline storage.
    Compound { width: u32 },
}

pub struct TypeTable {
    target: Target,
    named: HashMap<String, Type>,
}

impl TypeTable {
    pub fn new(file: &WhileFile, target: Target) -> Self {
        let named = file
            .types()
            .map(|decl| (decl.name.clone(), decl.ty.clone()))
            .collect();
        Self { target, named }
    }

    #[must_use]
    pub const fn target(&self) -> Target {
        self.target
    }

    /// Strip named-type indirections at the top level.
    pub fn resolve(&self, ty: &Type) -> Result<Type> {
        let mut visiting: Vec<&str> = Vec::new();
        let mut current = ty;
        while let Type::Named(name) = current {
            if visiting.contains(&name.as_str()) {
                return Err(Error::CyclicType(name.clone()));
            }
            visiting.push(name);
            current = self
                .named
                .get(name)
                .ok_or_else(|| Error::UnknownType(name.clone()))?;
        }
        Ok(current.clone())
    }

    /// Resolve named types everywhere inside `ty`, giving the structural type
    /// two spellings of the same type share.
    pub fn normalize(&self, ty: &Type) -> Result<Type> {
        self.normalize_in(ty, &mut Vec::new())
    }

    fn normalize_in(&self, ty: &Type, visiting: &mut Vec<String>) -> Result<Type> {
        Ok(match ty {
            Type::Named(name) => {
                let body = self.enter(name, visiting)?;
                let normal = self.normalize_in(body, visiting)?;
                visiting.pop();
                normal
            }
            Type::Record(fields) => Type::Record(
                fields
                    .iter()
                    .map(|(name, field)| Ok((name.clone(), self.normalize_in(field, visiting)?)))
                    .collect::<Result<_>>()?,
            ),
            Type::List(element) => Type::list(self.normalize_in(element, visiting)?),
            Type::Union(bounds) => Type::Union(
                bounds
                    .iter()
                    .map(|b| self.normalize_in(b, visiting))
                    .collect::<Result<_>>()?,
            ),
            other => other.clone(),
        })
    }

    fn enter<'t>(&'t self, name: &str, visiting: &mut Vec<String>) -> Result<&'t Type> {
        if visiting.iter().any(|n| n == name) {
            return Err(Error::CyclicType(name.to_string()));
        }
        let body = self
            .named
            .get(name)
            .ok_or_else(|| Error::UnknownType(name.to_string()))?;
        visiting.push(name.to_string());
        Ok(body)
    }

    /// Number of bytes a value of `ty` occupies when stored inline.
    pub fn width(&self, ty: &Type) -> Result<u32> {
        self.width_in(ty, &mut Vec::new())
    }

    fn width_in(&self, ty: &Type, visiting: &mut Vec<String>) -> Result<u32> {
        let word = self.target.word_width();
        Ok(match ty {
            Type::Void => 0,
            Type::Bool | Type::Char | Type::Int | Type::Real | Type::Str | Type::List(_) => word,
            Type::Record(fields) => {
                let mut total = 0;
                for field in fields.values() {
                    total += self.width_in(field, visiting)?;
                }
                total
            }
            Type::Union(bounds) => {
                let mut widest = 0;
                for bound in bounds {
                    widest = widest.max(self.width_in(bound, visiting)?);
                }
                widest
            }
            Type::Named(name) => {
                let body = self.enter(name, visiting)?;
                let width = self.width_in(body, visiting)?;
                visiting.pop();
                width
            }
        })
    }

    /// Fields of a record-typed value, in canonical order.
    pub fn record_fields(&self, ty: &Type) -> Result<BTreeMap<String, Type>> {
        match self.resolve(ty)? {
            Type::Record(fields) => Ok(fields),
            other => Err(Error::Internal(format!(
                "expected a record type, found `{other}`"
            ))),
        }
    }

    pub fn field_type(&self, record: &Type, field: &str) -> Result<Type> {
        self.record_fields(record)?
            .remove(field)
            .ok_or_else(|| Error::UnknownField {
                record: record.to_string(),
                field: field.to_string(),
            })
    }

    /// Byte offset of `field` from the start of a record value.
    ///
    /// Fields are laid out in canonical order, the first at offset zero.
    pub fn field_offset(&self, record: &Type, field: &str) -> Result<u32> {
        let fields = self.record_fields(record)?;
        let mut offset = self.width(record)?;
        for (name, ty) in fields.iter().rev() {
            offset -= self.width(ty)?;
            if name == field {
                return Ok(offset);
            }
        }
        Err(Error::UnknownField {
            record: record.to_string(),
            field: field.to_string(),
        })
    }

    pub fn representation(&self, ty: &Type) -> Result<Representation> {
        Ok(match self.resolve(ty)? {
            Type::Void => Representation::Void,
            Type::Bool | Type::Char | Type::Int | Type::Real | Type::Str | Type::List(_) => {
                Representation::Word
            }
            record @ Type::Record(_) => Representation::Compound {
                width: self.width(&record)?,
            },
            union @ Type::Union(_) => {
                return Err(Error::Unsupported(format!("values of union type `{union}`")));
            }
            Type::Named(name) => {
                return Err(Error::Internal(format!("unresolved named type `{name}`")));
            }
        })
    }

    /// Serialize the runtime descriptor of `ty` as a sequence of data words.
    pub fn descriptor(&self, ty: &Type) -> Result<Vec<Constant>> {
        let mut out = Vec::new();
        self.describe(ty, &mut out, &mut Vec::new())?;
        Ok(out)
    }

    fn word(&self, value: i64) -> Constant {
        if self.target.is_64_bit() {
            Constant::Quad(value)
        } else {
            Constant::Long(value)
        }
    }

    fn describe(&self, ty: &Type, out: &mut Vec<Constant>, visiting: &mut Vec<String>) -> Result<()> {
        match ty {
            Type::Void => out.push(self.word(TypeTag::Void.code())),
            Type::Bool => out.push(self.word(TypeTag::Bool.code())),
            Type::Char => out.push(self.word(TypeTag::Char.code())),
            Type::Int => out.push(self.word(TypeTag::Int.code())),
            Type::Real => out.push(self.word(TypeTag::Real.code())),
            Type::Str => out.push(self.word(TypeTag::Str.code())),
            Type::Record(fields) => {
                out.push(self.word(TypeTag::Record.code()));
                out.push(self.word(fields.len() as i64));
                for (name, field) in fields {
                    out.push(self.word(name.len() as i64));
                    out.push(Constant::Asciz(name.clone()));
                    self.describe(field, out, visiting)?;
                }
            }
            Type::List(element) => {
                out.push(self.word(TypeTag::List.code()));
                self.describe(element, out, visiting)?;
            }
            Type::Union(_) => {
                return Err(Error::Unsupported(format!("descriptor for union type `{ty}`")));
            }
            Type::Named(name) => {
                let body = self.enter(name, visiting)?;
                self.describe(body, out, visiting)?;
                visiting.pop();
            }
        }
        Ok(())
    }
}
