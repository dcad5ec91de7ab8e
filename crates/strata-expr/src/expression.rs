//! Scalar expression trees.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use strata_types::{DataType, Scalar};

/// Scalar operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    IsNull,
    NotNull,
    /// First non-null argument.
    Coalesce,
    /// `Where(cond, then, else)`.
    Where,
    AsType(DataType),
    Abs,
    StrLen,
    Upper,
    Lower,
    StrConcat,
    ArrayLen,
}

impl ScalarOp {
    /// Expected argument count; `None` means variadic (at least one).
    pub fn arity(&self) -> Option<usize> {
        match self {
            ScalarOp::Neg
            | ScalarOp::Not
            | ScalarOp::IsNull
            | ScalarOp::NotNull
            | ScalarOp::AsType(_)
            | ScalarOp::Abs
            | ScalarOp::StrLen
            | ScalarOp::Upper
            | ScalarOp::Lower
            | ScalarOp::ArrayLen => Some(1),
            ScalarOp::Where => Some(3),
            ScalarOp::Coalesce => None,
            _ => Some(2),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarOp::Add => "add",
            ScalarOp::Sub => "sub",
            ScalarOp::Mul => "mul",
            ScalarOp::Div => "div",
            ScalarOp::Mod => "mod",
            ScalarOp::Neg => "neg",
            ScalarOp::Eq => "eq",
            ScalarOp::Ne => "ne",
            ScalarOp::Lt => "lt",
            ScalarOp::Le => "le",
            ScalarOp::Gt => "gt",
            ScalarOp::Ge => "ge",
            ScalarOp::And => "and",
            ScalarOp::Or => "or",
            ScalarOp::Not => "not",
            ScalarOp::IsNull => "isnull",
            ScalarOp::NotNull => "notnull",
            ScalarOp::Coalesce => "coalesce",
            ScalarOp::Where => "where",
            ScalarOp::AsType(_) => "astype",
            ScalarOp::Abs => "abs",
            ScalarOp::StrLen => "len",
            ScalarOp::Upper => "upper",
            ScalarOp::Lower => "lower",
            ScalarOp::StrConcat => "concat",
            ScalarOp::ArrayLen => "array_len",
        }
    }
}

/// An engine-independent scalar expression over named columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Const(Scalar),
    Var(String),
    Op(ScalarOp, Vec<Expression>),
}

impl Expression {
    pub fn var(id: impl Into<String>) -> Self {
        Expression::Var(id.into())
    }

    pub fn lit(value: impl Into<Scalar>) -> Self {
        Expression::Const(value.into())
    }

    pub fn op(op: ScalarOp, args: Vec<Expression>) -> Self {
        Expression::Op(op, args)
    }

    pub fn unary(op: ScalarOp, arg: Expression) -> Self {
        Expression::Op(op, vec![arg])
    }

    pub fn binary(op: ScalarOp, left: Expression, right: Expression) -> Self {
        Expression::Op(op, vec![left, right])
    }

    /// Column ids referenced anywhere in the tree.
    pub fn free_vars(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        self.collect_vars(&mut vars);
        vars
    }

    fn collect_vars(&self, out: &mut BTreeSet<String>) {
        match self {
            Expression::Const(_) => {}
            Expression::Var(id) => {
                out.insert(id.clone());
            }
            Expression::Op(_, args) => {
                for arg in args {
                    arg.collect_vars(out);
                }
            }
        }
    }

    /// Replace variable references found in `mapping`; others are kept.
    pub fn rename(&self, mapping: &HashMap<String, String>) -> Expression {
        match self {
            Expression::Const(value) => Expression::Const(value.clone()),
            Expression::Var(id) => match mapping.get(id) {
                Some(new_id) => Expression::Var(new_id.clone()),
                None => Expression::Var(id.clone()),
            },
            Expression::Op(op, args) => Expression::Op(
                op.clone(),
                args.iter().map(|arg| arg.rename(mapping)).collect(),
            ),
        }
    }

    /// True when the expression references no columns.
    pub fn is_const(&self) -> bool {
        match self {
            Expression::Const(_) => true,
            Expression::Var(_) => false,
            Expression::Op(_, args) => args.iter().all(Expression::is_const),
        }
    }

    pub fn as_var(&self) -> Option<&str> {
        match self {
            Expression::Var(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Const(value) => write!(f, "{}", value),
            Expression::Var(id) => write!(f, "{}", id),
            Expression::Op(op, args) => {
                write!(f, "{}(", op.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Expression {
        Expression::binary(
            ScalarOp::Add,
            Expression::var("a"),
            Expression::binary(ScalarOp::Mul, Expression::var("b"), Expression::lit(2i64)),
        )
    }

    #[test]
    fn test_free_vars() {
        let vars: Vec<_> = sample().free_vars().into_iter().collect();
        assert_eq!(vars, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_rename_partial() {
        let mapping = HashMap::from([("a".to_string(), "z".to_string())]);
        let renamed = sample().rename(&mapping);
        assert!(renamed.free_vars().contains("z"));
        assert!(renamed.free_vars().contains("b"));
        assert!(!renamed.free_vars().contains("a"));
    }

    #[test]
    fn test_is_const() {
        assert!(!sample().is_const());
        let folded = Expression::binary(ScalarOp::Add, Expression::lit(1i64), Expression::lit(2i64));
        assert!(folded.is_const());
    }

    #[test]
    fn test_display() {
        assert_eq!(sample().to_string(), "add(a, mul(b, 2))");
    }

    #[test]
    fn test_json_shape() {
        let expr: Expression =
            serde_json::from_str(r#"{"op": ["is_null", [{"var": "x"}]]}"#).unwrap();
        assert_eq!(expr, Expression::unary(ScalarOp::IsNull, Expression::var("x")));
    }
}
