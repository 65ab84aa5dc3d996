use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::{DereferenceExp, ExpNode, NarrowSubrangeExp, Operator, WidenSubrangeExp};
use crate::diagnostics::Diagnostics;

/// The internal signal raised when no legal conversion exists. Only
/// overload resolution and [`Type::coerce_exp`] observe it; it is never
/// surfaced to the user on its own.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("no conversion from {found} to {expected}")]
pub struct IncompatibleTypes {
    pub expected: String,
    pub found: String,
}

/// A named dense integer interval: the predefined `integer` and `boolean`,
/// user-declared enumeration types, and the anonymous scalars the `for`
/// checker synthesizes from literal bounds.
#[derive(Clone, Debug)]
pub struct ScalarType {
    pub name: String,
    pub size: i32,
    pub lower: i64,
    pub upper: i64,
}

/// A refinement of a scalar with tighter bounds. Narrowing into a subrange
/// carries a run-time bounds check; widening back to the base is free.
#[derive(Clone, Debug)]
pub struct SubrangeType {
    pub base: Type,
    pub lower: i64,
    pub upper: i64,
}

#[derive(Clone, Debug)]
pub struct ArrayType {
    pub index: Type,
    pub element: Type,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionType {
    pub arg: Type,
    pub result: Type,
}

/// One overload candidate of an operator, pairing the symbol with its
/// function type.
#[derive(Clone, Debug, PartialEq)]
pub struct OperatorType {
    pub op: Operator,
    pub func: FunctionType,
}

/// The advertised type of an overloaded operator: its candidates, tried in
/// order during resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct IntersectionType {
    pub types: Vec<Type>,
}

/// A tuple type, used as the argument type of multi-operand operators.
#[derive(Clone, Debug, PartialEq)]
pub struct ProductType {
    pub types: Vec<Type>,
}

/// The type of an expression or symbol entry.
///
/// `Error` absorbs cascading failures: it is the only permitted marker on a
/// node whose checking failed. An l-value's type is always `Reference(T)`;
/// an r-value's type is never a reference.
#[derive(Clone, Debug)]
pub enum Type {
    Error,
    Scalar(Rc<ScalarType>),
    Subrange(Rc<SubrangeType>),
    Reference(Rc<Type>),
    Array(Rc<ArrayType>),
    Function(Rc<FunctionType>),
    Operator(Rc<OperatorType>),
    Intersection(Rc<IntersectionType>),
    Product(Rc<ProductType>),
}

impl PartialEq for Type {
    /// Structural for scalars and subranges (name plus bounds), recursive
    /// for references, nominal (pointer identity) for arrays: each array
    /// type is minted once at its declaration.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Error, Type::Error) => true,
            (Type::Scalar(a), Type::Scalar(b)) => {
                a.name == b.name && a.lower == b.lower && a.upper == b.upper
            }
            (Type::Subrange(a), Type::Subrange(b)) => {
                a.base == b.base && a.lower == b.lower && a.upper == b.upper
            }
            (Type::Reference(a), Type::Reference(b)) => a == b,
            (Type::Array(a), Type::Array(b)) => Rc::ptr_eq(a, b),
            (Type::Function(a), Type::Function(b)) => a == b,
            (Type::Operator(a), Type::Operator(b)) => a == b,
            (Type::Intersection(a), Type::Intersection(b)) => a.types == b.types,
            (Type::Product(a), Type::Product(b)) => a.types == b.types,
            _ => false,
        }
    }
}

impl Eq for Type {}

impl Type {
    /// The predefined `integer` scalar, the widest of all scalars.
    pub fn integer() -> Type {
        Type::scalar("integer", 1, i64::from(i32::MIN), i64::from(i32::MAX))
    }

    /// The predefined `boolean` scalar: `false = 0`, `true = 1`.
    pub fn boolean() -> Type {
        Type::scalar("boolean", 1, 0, 1)
    }

    pub fn scalar(name: impl Into<String>, size: i32, lower: i64, upper: i64) -> Type {
        debug_assert!(size > 0);
        Type::Scalar(Rc::new(ScalarType {
            name: name.into(),
            size,
            lower,
            upper,
        }))
    }

    pub fn subrange(base: Type, lower: i64, upper: i64) -> Type {
        debug_assert!(lower <= upper);
        Type::Subrange(Rc::new(SubrangeType { base, lower, upper }))
    }

    /// The type of an integer literal `n`: the singleton subrange
    /// `integer[n..n]`, which silently widens wherever an integer is wanted.
    pub fn int_literal(value: i64) -> Type {
        Type::subrange(Type::integer(), value, value)
    }

    pub fn reference(base: Type) -> Type {
        Type::Reference(Rc::new(base))
    }

    pub fn array(index: Type, element: Type) -> Type {
        Type::Array(Rc::new(ArrayType { index, element }))
    }

    pub fn function(arg: Type, result: Type) -> Type {
        Type::Function(Rc::new(FunctionType { arg, result }))
    }

    pub fn operator(op: Operator, arg: Type, result: Type) -> Type {
        Type::Operator(Rc::new(OperatorType {
            op,
            func: FunctionType { arg, result },
        }))
    }

    pub fn product(types: Vec<Type>) -> Type {
        Type::Product(Rc::new(ProductType { types }))
    }

    pub fn intersection(types: Vec<Type>) -> Type {
        Type::Intersection(Rc::new(IntersectionType { types }))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    /// Storage width in words when a value of this type is held in a frame.
    pub fn space(&self) -> i32 {
        match self {
            Type::Scalar(s) => s.size,
            Type::Subrange(_) | Type::Reference(_) => 1,
            Type::Array(a) => {
                let (lower, upper) = a
                    .index
                    .bounds()
                    .expect("array index type must carry bounds");
                i32::try_from(upper - lower + 1).expect("array extent fits a word")
                    * a.element.space()
            }
            Type::Error
            | Type::Function(_)
            | Type::Operator(_)
            | Type::Intersection(_)
            | Type::Product(_) => 0,
        }
    }

    /// The interval covered by a scalar or subrange.
    pub fn bounds(&self) -> Option<(i64, i64)> {
        match self {
            Type::Scalar(s) => Some((s.lower, s.upper)),
            Type::Subrange(s) => Some((s.lower, s.upper)),
            _ => None,
        }
    }

    /// The base type held by a reference, if this is one.
    pub fn dereferenced(&self) -> Option<Type> {
        match self {
            Type::Reference(base) => Some((**base).clone()),
            _ => None,
        }
    }

    /// Search for a conversion of `exp` to this type, wrapping the
    /// expression in explicit conversion nodes. At most one conversion is
    /// chosen at each step, in fixed priority: identity, dereference (then
    /// retry), narrow into a subrange, widen out of a subrange (then
    /// retry). The input is left untouched on failure so overload
    /// resolution can try the next candidate.
    pub fn coerce_to_type(&self, exp: &ExpNode) -> Result<ExpNode, IncompatibleTypes> {
        let from = exp.ty();
        if from == *self {
            return Ok(exp.clone());
        }
        if let Type::Reference(base) = &from {
            let deref = ExpNode::Dereference(DereferenceExp {
                span: exp.span(),
                ty: (**base).clone(),
                lvalue: Box::new(exp.clone()),
            });
            return self.coerce_to_type(&deref);
        }
        if let Type::Subrange(target) = self {
            if let Ok(inner) = target.base.coerce_to_type(exp) {
                return Ok(ExpNode::NarrowSubrange(NarrowSubrangeExp {
                    span: exp.span(),
                    ty: self.clone(),
                    exp: Box::new(inner),
                }));
            }
        }
        if let Type::Subrange(sub) = &from {
            let widened = ExpNode::WidenSubrange(WidenSubrangeExp {
                span: exp.span(),
                ty: sub.base.clone(),
                exp: Box::new(exp.clone()),
            });
            return self.coerce_to_type(&widened);
        }
        Err(IncompatibleTypes {
            expected: self.to_string(),
            found: from.to_string(),
        })
    }

    /// Like [`Type::coerce_to_type`], but a mismatch is fatal to this site:
    /// it is reported as a static error and an `Error`-typed node comes
    /// back. Operands already marked `Error` stay silent so one failure is
    /// reported once.
    pub fn coerce_exp(&self, exp: ExpNode, diags: &mut Diagnostics) -> ExpNode {
        match self.coerce_to_type(&exp) {
            Ok(coerced) => coerced,
            Err(err) => {
                if !exp.ty().is_error() {
                    diags.error(
                        format!("no matching conversion of {} to {}", err.found, err.expected),
                        exp.span(),
                    );
                }
                ExpNode::error(exp.span())
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Error => write!(f, "<error>"),
            Type::Scalar(s) => write!(f, "{}", s.name),
            Type::Subrange(s) => write!(f, "{}[{}..{}]", s.base, s.lower, s.upper),
            Type::Reference(base) => write!(f, "ref({base})"),
            Type::Array(a) => write!(f, "array[{}] of {}", a.index, a.element),
            Type::Function(func) => write!(f, "{} -> {}", func.arg, func.result),
            Type::Operator(op) => write!(f, "{} -> {}", op.func.arg, op.func.result),
            Type::Intersection(i) => {
                for (idx, ty) in i.types.iter().enumerate() {
                    if idx > 0 {
                        write!(f, " & ")?;
                    }
                    write!(f, "{ty}")?;
                }
                Ok(())
            }
            Type::Product(p) => {
                for (idx, ty) in p.types.iter().enumerate() {
                    if idx > 0 {
                        write!(f, "*")?;
                    }
                    write!(f, "{ty}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::span;

    fn sp() -> crate::ast::Span {
        span(0, 0)
    }

    #[test]
    fn identity_coercion_leaves_the_expression_alone() {
        let lit = ExpNode::bool_literal(sp(), true);
        let coerced = Type::boolean().coerce_to_type(&lit).unwrap();
        assert_eq!(coerced, lit);
    }

    #[test]
    fn literal_widens_to_integer() {
        let lit = ExpNode::int_literal(sp(), 7);
        let coerced = Type::integer().coerce_to_type(&lit).unwrap();
        let ExpNode::WidenSubrange(widen) = coerced else {
            panic!("expected a widen node");
        };
        assert_eq!(widen.ty, Type::integer());
        assert_eq!(*widen.exp, lit);
    }

    #[test]
    fn integer_narrows_into_a_subrange_with_a_check() {
        let target = Type::subrange(Type::integer(), 2, 5);
        let lit = ExpNode::int_literal(sp(), 3);
        let coerced = target.coerce_to_type(&lit).unwrap();
        let ExpNode::NarrowSubrange(narrow) = coerced else {
            panic!("expected a narrow node");
        };
        assert_eq!(narrow.ty, target);
        // The literal first widens to the subrange's base.
        assert!(matches!(*narrow.exp, ExpNode::WidenSubrange(_)));
    }

    #[test]
    fn boolean_does_not_convert_to_integer() {
        let lit = ExpNode::bool_literal(sp(), false);
        let err = Type::integer().coerce_to_type(&lit).unwrap_err();
        assert_eq!(err.found, "boolean");
        assert_eq!(err.expected, "integer");
    }

    #[test]
    fn coercion_is_idempotent() {
        let target = Type::subrange(Type::integer(), 0, 9);
        let lit = ExpNode::int_literal(sp(), 4);
        let once = target.coerce_to_type(&lit).unwrap();
        let twice = target.coerce_to_type(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn array_types_are_nominal() {
        let a = Type::array(Type::subrange(Type::integer(), 1, 4), Type::integer());
        let b = Type::array(Type::subrange(Type::integer(), 1, 4), Type::integer());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn array_space_is_extent_times_element_space() {
        let a = Type::array(Type::subrange(Type::integer(), 2, 5), Type::integer());
        assert_eq!(a.space(), 4);
    }
}
