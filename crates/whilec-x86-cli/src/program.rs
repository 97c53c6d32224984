// Decoding of checked programs handed over as JSON.
//
// Document shape:
//
//   { "declarations": [ { "function": {..} } | { "type": {..} } | { "constant": {..} } ] }
//
// Types are strings for primitives ("void", "bool", "char", "int", "real",
// "string"), any other string names a declared type, and single-key objects
// spell compound types: {"record": {"x": "int"}}, {"list": "int"},
// {"union": ["int", "bool"]}.
//
// Expressions and statements are objects keyed by their form. An expression
// may carry a "type" annotation; it is required where the form alone does not
// determine the type (variables, casts, indexing, list literals). Calls take
// the declared return type of the function they name.

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Map, Value as Json};
use whilec_x86::lang::{
    BinOp, ConstDecl, Decl, Expr, ExprKind, FunDecl, Parameter, Stmt, Type, TypeDecl, UnOp,
    VarDecl, WhileFile,
};

type Object = Map<String, Json>;

/// Declared return type of every function in the document.
type Signatures = HashMap<String, Type>;

pub fn parse(text: &str) -> Result<WhileFile> {
    let json: Json = serde_json::from_str(text).context("invalid JSON")?;
    let decls = object(&json)?
        .get("declarations")
        .and_then(Json::as_array)
        .ok_or_else(|| anyhow!("expected a `declarations` array"))?;
    let sigs = signatures(decls)?;
    let sigs = &sigs;
    let decls = decls
        .iter()
        .enumerate()
        .map(|(i, d)| decl(sigs, d).with_context(|| format!("declaration {i}")))
        .collect::<Result<Vec<_>>>()?;
    Ok(WhileFile::new(decls))
}

// ── Helpers ──

fn object(json: &Json) -> Result<&Object> {
    json.as_object()
        .ok_or_else(|| anyhow!("expected an object, found {json}"))
}

fn array(json: &Json) -> Result<&Vec<Json>> {
    json.as_array()
        .ok_or_else(|| anyhow!("expected an array, found {json}"))
}

fn field<'j>(obj: &'j Object, key: &str) -> Result<&'j Json> {
    obj.get(key).ok_or_else(|| anyhow!("missing `{key}`"))
}

fn string<'j>(obj: &'j Object, key: &str) -> Result<&'j str> {
    field(obj, key)?
        .as_str()
        .ok_or_else(|| anyhow!("`{key}` must be a string"))
}

fn as_str<'j>(json: &'j Json, what: &str) -> Result<&'j str> {
    json.as_str()
        .ok_or_else(|| anyhow!("{what} must be a string, found {json}"))
}

// ── Declarations ──

fn signatures(decls: &[Json]) -> Result<Signatures> {
    let mut sigs = Signatures::new();
    for f in decls.iter().filter_map(|d| d.get("function")) {
        let f = object(f)?;
        let ret = f.get("ret").map_or(Ok(Type::Void), ty)?;
        sigs.insert(string(f, "name")?.to_string(), ret);
    }
    Ok(sigs)
}

fn decl(sigs: &Signatures, json: &Json) -> Result<Decl> {
    let obj = object(json)?;
    if let Some(f) = obj.get("function") {
        return function(sigs, object(f)?).map(Decl::Function);
    }
    if let Some(t) = obj.get("type") {
        let t = object(t)?;
        return Ok(Decl::Type(TypeDecl {
            name: string(t, "name")?.to_string(),
            ty: ty(field(t, "type")?)?,
        }));
    }
    if let Some(c) = obj.get("constant") {
        let c = object(c)?;
        return Ok(Decl::Constant(ConstDecl {
            name: string(c, "name")?.to_string(),
            value: expr(sigs, field(c, "value")?)?,
        }));
    }
    bail!("unknown declaration {json}")
}

fn function(sigs: &Signatures, obj: &Object) -> Result<FunDecl> {
    let name = string(obj, "name")?;
    let params = match obj.get("params") {
        None => Vec::new(),
        Some(params) => array(params)?
            .iter()
            .map(|p| {
                let p = object(p)?;
                Ok(Parameter::new(string(p, "name")?, ty(field(p, "type")?)?))
            })
            .collect::<Result<_>>()?,
    };
    let ret = obj.get("ret").map_or(Ok(Type::Void), ty)?;
    let body = block(sigs, obj.get("body")).with_context(|| format!("function `{name}`"))?;
    Ok(FunDecl::new(name, params, ret, body))
}

// ── Types ──

fn ty(json: &Json) -> Result<Type> {
    if let Some(name) = json.as_str() {
        return Ok(match name {
            "void" => Type::Void,
            "bool" => Type::Bool,
            "char" => Type::Char,
            "int" => Type::Int,
            "real" => Type::Real,
            "string" => Type::Str,
            other => Type::named(other),
        });
    }
    let obj = object(json)?;
    if let Some(fields) = obj.get("record") {
        let fields = object(fields)?
            .iter()
            .map(|(name, t)| Ok((name.clone(), ty(t)?)))
            .collect::<Result<_>>()?;
        return Ok(Type::Record(fields));
    }
    if let Some(element) = obj.get("list") {
        return Ok(Type::list(ty(element)?));
    }
    if let Some(bounds) = obj.get("union") {
        return Ok(Type::Union(
            array(bounds)?.iter().map(ty).collect::<Result<_>>()?,
        ));
    }
    bail!("unknown type {json}")
}

// ── Expressions ──

fn binop(symbol: &str) -> Result<BinOp> {
    Ok(match symbol {
        "&&" => BinOp::And,
        "||" => BinOp::Or,
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "*" => BinOp::Mul,
        "/" => BinOp::Div,
        "%" => BinOp::Rem,
        "==" => BinOp::Eq,
        "!=" => BinOp::Neq,
        "<" => BinOp::Lt,
        "<=" => BinOp::LtEq,
        ">" => BinOp::Gt,
        ">=" => BinOp::GtEq,
        "++" => BinOp::Append,
        other => bail!("unknown binary operator `{other}`"),
    })
}

fn unop(symbol: &str) -> Result<UnOp> {
    Ok(match symbol {
        "!" => UnOp::Not,
        "-" => UnOp::Neg,
        "len" => UnOp::LengthOf,
        other => bail!("unknown unary operator `{other}`"),
    })
}

fn exprs(sigs: &Signatures, json: &Json) -> Result<Vec<Expr>> {
    array(json)?.iter().map(|e| expr(sigs, e)).collect()
}

fn expr(sigs: &Signatures, json: &Json) -> Result<Expr> {
    let obj = object(json)?;
    let annotated = obj.get("type").map(ty).transpose()?;
    let required = |form: &str| {
        annotated
            .clone()
            .ok_or_else(|| anyhow!("`{form}` expression needs a `type`"))
    };

    let mut e = if let Some(v) = obj.get("int") {
        Expr::int(v.as_i64().ok_or_else(|| anyhow!("bad integer {v}"))?)
    } else if let Some(v) = obj.get("bool") {
        Expr::bool(v.as_bool().ok_or_else(|| anyhow!("bad boolean {v}"))?)
    } else if let Some(v) = obj.get("real") {
        Expr::real(v.as_f64().ok_or_else(|| anyhow!("bad real {v}"))?)
    } else if let Some(v) = obj.get("char") {
        let s = as_str(v, "a char literal")?;
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Expr::char(c),
            _ => bail!("char literal must be one character, found {s:?}"),
        }
    } else if let Some(v) = obj.get("string") {
        Expr::string(as_str(v, "a string literal")?)
    } else if let Some(v) = obj.get("var") {
        Expr::variable(as_str(v, "a variable name")?, required("var")?)
    } else if let Some(v) = obj.get("binary") {
        Expr::binary(
            binop(as_str(v, "an operator")?)?,
            expr(sigs, field(obj, "lhs")?)?,
            expr(sigs, field(obj, "rhs")?)?,
        )
    } else if let Some(v) = obj.get("unary") {
        Expr::unary(unop(as_str(v, "an operator")?)?, expr(sigs, field(obj, "expr")?)?)
    } else if let Some(v) = obj.get("cast") {
        Expr::cast(required("cast")?, expr(sigs, v)?)
    } else if let Some(v) = obj.get("index") {
        Expr::new(
            ExprKind::IndexOf {
                source: Box::new(expr(sigs, v)?),
                index: Box::new(expr(sigs, field(obj, "at")?)?),
            },
            required("index")?,
        )
    } else if let Some(v) = obj.get("invoke") {
        let name = as_str(v, "a function name")?;
        let args = obj.get("args").map_or(Ok(Vec::new()), |a| exprs(sigs, a))?;
        let ret = annotated
            .clone()
            .or_else(|| sigs.get(name).cloned())
            .ok_or_else(|| anyhow!("call to undeclared function `{name}` needs a `type`"))?;
        Expr::invoke(name, args, ret)
    } else if let Some(v) = obj.get("list") {
        Expr::new(ExprKind::ListConstructor(exprs(sigs, v)?), required("list")?)
    } else if let Some(v) = obj.get("field") {
        let name = as_str(v, "a field name")?;
        let source = expr(sigs, field(obj, "of")?)?;
        let derived = match &source.ty {
            Type::Record(fields) => fields.get(name).cloned(),
            _ => None,
        };
        let field_ty = annotated
            .clone()
            .or(derived)
            .ok_or_else(|| anyhow!("access to field `{name}` needs a `type`"))?;
        Expr::field_typed(source, name, field_ty)
    } else if let Some(v) = obj.get("record") {
        let fields = object(v)?
            .iter()
            .map(|(name, value)| Ok((name.clone(), expr(sigs, value)?)))
            .collect::<Result<Vec<_>>>()?;
        Expr::record(fields)
    } else {
        bail!("unknown expression {json}")
    };

    if let Some(t) = annotated {
        e.ty = t;
    }
    Ok(e)
}

// ── Statements ──

fn block(sigs: &Signatures, json: Option<&Json>) -> Result<Vec<Stmt>> {
    let Some(json) = json else {
        return Ok(Vec::new());
    };
    array(json)?
        .iter()
        .enumerate()
        .map(|(i, s)| stmt(sigs, s).with_context(|| format!("statement {i}")))
        .collect()
}

fn var_decl(sigs: &Signatures, obj: &Object) -> Result<VarDecl> {
    Ok(VarDecl::new(
        string(obj, "declare")?,
        ty(field(obj, "type")?)?,
        obj.get("init").map(|e| expr(sigs, e)).transpose()?,
    ))
}

fn stmt(sigs: &Signatures, json: &Json) -> Result<Stmt> {
    let obj = object(json)?;
    Ok(if let Some(e) = obj.get("print") {
        Stmt::Print(expr(sigs, e)?)
    } else if let Some(e) = obj.get("return") {
        Stmt::Return(if e.is_null() { None } else { Some(expr(sigs, e)?) })
    } else if obj.contains_key("declare") {
        Stmt::VariableDeclaration(var_decl(sigs, obj)?)
    } else if let Some(lhs) = obj.get("assign") {
        Stmt::assign(expr(sigs, lhs)?, expr(sigs, field(obj, "value")?)?)
    } else if let Some(condition) = obj.get("if") {
        Stmt::IfElse {
            condition: expr(sigs, condition)?,
            true_branch: block(sigs, obj.get("then"))?,
            false_branch: block(sigs, obj.get("else"))?,
        }
    } else if let Some(condition) = obj.get("while") {
        Stmt::While {
            condition: expr(sigs, condition)?,
            body: block(sigs, obj.get("body"))?,
        }
    } else if let Some(declaration) = obj.get("for") {
        Stmt::For {
            declaration: var_decl(sigs, object(declaration)?)?,
            condition: expr(sigs, field(obj, "condition")?)?,
            increment: Box::new(stmt(sigs, field(obj, "increment")?)?),
            body: block(sigs, obj.get("body"))?,
        }
    } else if let Some(e) = obj.get("call") {
        Stmt::Invoke(expr(sigs, e)?)
    } else {
        bail!("unknown statement {json}")
    })
}
