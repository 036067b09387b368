//! The deferred expression evaluator.
//!
//! Sibling-field and parent-field references, and arithmetic/bitwise
//! composition of the two, are modelled as a tiny closed AST and evaluated
//! by a total function over `(self, parent)`. There is no way to express
//! anything beyond this AST, so there is no side-effect surface to
//! restrict.

use crate::error::{Error, Result};
use crate::value::Instance;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

/// A deferred expression, resolved against a struct instance and
/// (optionally) its enclosing parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Lit(i64),
    /// A sibling field of the current struct.
    SelfField(&'static str),
    /// A field of the enclosing parent struct.
    ParentField(&'static str),
    BinOp(BinOp, Box<Expr>, Box<Expr>),
    /// The bitwise OR of every listed term.
    BitOr(Vec<Expr>),
}

impl Expr {
    pub fn eval(&self, obj: &Instance, ctx: Option<&Instance>) -> Result<i64> {
        match self {
            Expr::Lit(v) => Ok(*v),
            Expr::SelfField(name) => lookup(obj, name),
            Expr::ParentField(name) => {
                let parent = ctx.ok_or_else(|| Error::MissingField {
                    field: (*name).to_string(),
                })?;
                lookup(parent, name)
            }
            Expr::BinOp(op, lhs, rhs) => {
                let l = lhs.eval(obj, ctx)?;
                let r = rhs.eval(obj, ctx)?;
                Ok(match op {
                    BinOp::Add => l.wrapping_add(r),
                    BinOp::Sub => l.wrapping_sub(r),
                    BinOp::Mul => l.wrapping_mul(r),
                    BinOp::Div => {
                        if r == 0 {
                            return Err(Error::BadSizeExpression {
                                reason: "division by zero".to_string(),
                            });
                        }
                        l / r
                    }
                    BinOp::And => l & r,
                    BinOp::Or => l | r,
                    BinOp::Xor => l ^ r,
                    BinOp::Shl => l.wrapping_shl(r as u32),
                    BinOp::Shr => l.wrapping_shr(r as u32),
                })
            }
            Expr::BitOr(terms) => {
                let mut acc = 0i64;
                for t in terms {
                    acc |= t.eval(obj, ctx)?;
                }
                Ok(acc)
            }
        }
    }

    /// Evaluates the expression and ensures the result is usable as a size,
    /// count, or pad length: a non-negative integer, or `BadSizeExpression`.
    pub fn eval_size(&self, obj: &Instance, ctx: Option<&Instance>) -> Result<usize> {
        let v = self.eval(obj, ctx)?;
        usize::try_from(v).map_err(|_| Error::BadSizeExpression {
            reason: format!("expected a non-negative integer, got {v}"),
        })
    }
}

fn lookup(obj: &Instance, name: &str) -> Result<i64> {
    let value = obj.get(name).ok_or_else(|| Error::MissingField {
        field: name.to_string(),
    })?;
    value.as_int().map(|v| v as i64).ok_or_else(|| Error::BadSizeExpression {
        reason: format!("field `{name}` is not an integer"),
    })
}

/// The selector test on a `switch` field's discriminant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchCondition {
    /// `(discriminant AND mask) != 0`.
    Mask(i64),
    /// `(discriminant AND (m1|m2|...)) != 0`.
    BitOrMask(Vec<i64>),
    /// `discriminant ∈ set`.
    ValueSet(Vec<i64>),
}

impl SwitchCondition {
    pub fn matches(&self, discriminant: i64) -> bool {
        match self {
            SwitchCondition::Mask(mask) => discriminant & mask != 0,
            SwitchCondition::BitOrMask(masks) => {
                let combined = masks.iter().fold(0i64, |acc, m| acc | m);
                discriminant & combined != 0
            }
            SwitchCondition::ValueSet(values) => values.contains(&discriminant),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ClassDescriptor, ClassKind};
    use crate::primitive::ByteOrder;
    use crate::value::Value;

    static LEAF: ClassDescriptor = ClassDescriptor {
        name: "Leaf",
        kind: ClassKind::Struct,
        fields: &[],
        declared_size: None,
    };

    fn instance_with(fields: &[(&str, i64)]) -> Instance {
        let mut inst = Instance::new(&LEAF, ByteOrder::LittleEndian);
        for (name, value) in fields {
            inst.set(*name, Value::Int(*value as i128));
        }
        inst
    }

    #[test]
    fn self_field_reference() {
        let obj = instance_with(&[("len", 3)]);
        assert_eq!(Expr::SelfField("len").eval(&obj, None).unwrap(), 3);
    }

    #[test]
    fn parent_field_reference() {
        let parent = instance_with(&[("count", 7)]);
        let obj = instance_with(&[]);
        assert_eq!(
            Expr::ParentField("count").eval(&obj, Some(&parent)).unwrap(),
            7
        );
    }

    #[test]
    fn arithmetic_composition() {
        let obj = instance_with(&[("a", 2), ("b", 3)]);
        let expr = Expr::BinOp(
            BinOp::Add,
            Box::new(Expr::SelfField("a")),
            Box::new(Expr::BinOp(
                BinOp::Mul,
                Box::new(Expr::SelfField("b")),
                Box::new(Expr::Lit(10)),
            )),
        );
        assert_eq!(expr.eval(&obj, None).unwrap(), 32);
    }

    #[test]
    fn negative_size_is_rejected() {
        let obj = instance_with(&[("n", -1)]);
        let err = Expr::SelfField("n").eval_size(&obj, None).unwrap_err();
        assert!(matches!(err, Error::BadSizeExpression { .. }));
    }

    #[test]
    fn switch_case_matching_against_bit_mask() {
        // discriminant = 0b101, cases mask 1, 2, 4
        let discriminant = 0b101;
        assert!(SwitchCondition::Mask(1).matches(discriminant));
        assert!(!SwitchCondition::Mask(2).matches(discriminant));
        assert!(SwitchCondition::Mask(4).matches(discriminant));
    }

    #[test]
    fn bitor_mask_condition() {
        assert!(SwitchCondition::BitOrMask(vec![1, 2]).matches(0b10));
        assert!(!SwitchCondition::BitOrMask(vec![1, 2]).matches(0b100));
    }

    #[test]
    fn value_set_condition() {
        assert!(SwitchCondition::ValueSet(vec![1, 3, 5]).matches(3));
        assert!(!SwitchCondition::ValueSet(vec![1, 3, 5]).matches(4));
    }
}
