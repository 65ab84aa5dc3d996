use miette::SourceSpan;

use crate::symbols::{EntryId, ScopeId};
use crate::types::Type;

pub type Span = SourceSpan;

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

/// An operator symbol. One namespace covers binary and unary operators;
/// the symbol table keeps operator entries apart from ordinary identifiers,
/// so `+` can never be shadowed by a declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Neg,
    Pred,
    Succ,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Neg => "-",
            Operator::Pred => "pred",
            Operator::Succ => "succ",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// An expression tree node.
///
/// The parser produces `Const`, `Identifier`, `Binary`, `Unary` and
/// `ArrayIndexing` nodes; the static checker rewrites the tree in place,
/// replacing identifiers with constants or variables and inserting
/// `Dereference` / `NarrowSubrange` / `WidenSubrange` conversions until
/// every node carries an exact type.
#[derive(Clone, Debug, PartialEq)]
pub enum ExpNode {
    Error(ErrorExp),
    Const(ConstExp),
    Identifier(IdentifierExp),
    Variable(VariableExp),
    Binary(BinaryExp),
    Unary(UnaryExp),
    ArrayIndexing(ArrayIndexingExp),
    Dereference(DereferenceExp),
    NarrowSubrange(NarrowSubrangeExp),
    WidenSubrange(WidenSubrangeExp),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ErrorExp {
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConstExp {
    pub span: Span,
    pub ty: Type,
    pub value: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IdentifierExp {
    pub span: Span,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariableExp {
    pub span: Span,
    pub ty: Type,
    pub entry: EntryId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BinaryExp {
    pub span: Span,
    pub ty: Type,
    pub op: Operator,
    pub left: Box<ExpNode>,
    pub right: Box<ExpNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnaryExp {
    pub span: Span,
    pub ty: Type,
    pub op: Operator,
    pub arg: Box<ExpNode>,
    /// Frame offset of the hidden word reserved by the checker; pred/succ
    /// use it as scratch space at run time.
    pub idx_offset: Option<i32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ArrayIndexingExp {
    pub span: Span,
    pub ty: Type,
    pub base: Box<ExpNode>,
    pub index: Box<ExpNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DereferenceExp {
    pub span: Span,
    pub ty: Type,
    pub lvalue: Box<ExpNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NarrowSubrangeExp {
    pub span: Span,
    /// The subrange being narrowed into; its bounds drive the run-time check.
    pub ty: Type,
    pub exp: Box<ExpNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WidenSubrangeExp {
    pub span: Span,
    /// The base type the subrange widens to.
    pub ty: Type,
    pub exp: Box<ExpNode>,
}

impl ExpNode {
    pub fn error(span: Span) -> ExpNode {
        ExpNode::Error(ErrorExp { span })
    }

    /// An integer literal: a constant of the singleton subrange `integer[n..n]`.
    pub fn int_literal(span: Span, value: i64) -> ExpNode {
        ExpNode::Const(ConstExp {
            span,
            ty: Type::int_literal(value),
            value,
        })
    }

    /// A boolean literal: a constant of the predefined `boolean` scalar.
    pub fn bool_literal(span: Span, value: bool) -> ExpNode {
        ExpNode::Const(ConstExp {
            span,
            ty: Type::boolean(),
            value: i64::from(value),
        })
    }

    pub fn identifier(span: Span, name: impl Into<String>) -> ExpNode {
        ExpNode::Identifier(IdentifierExp {
            span,
            name: name.into(),
        })
    }

    pub fn binary(span: Span, op: Operator, left: ExpNode, right: ExpNode) -> ExpNode {
        ExpNode::Binary(BinaryExp {
            span,
            ty: Type::Error,
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn unary(span: Span, op: Operator, arg: ExpNode) -> ExpNode {
        ExpNode::Unary(UnaryExp {
            span,
            ty: Type::Error,
            op,
            arg: Box::new(arg),
            idx_offset: None,
        })
    }

    pub fn array_indexing(span: Span, base: ExpNode, index: ExpNode) -> ExpNode {
        ExpNode::ArrayIndexing(ArrayIndexingExp {
            span,
            ty: Type::Error,
            base: Box::new(base),
            index: Box::new(index),
        })
    }

    pub fn span(&self) -> Span {
        match self {
            ExpNode::Error(n) => n.span,
            ExpNode::Const(n) => n.span,
            ExpNode::Identifier(n) => n.span,
            ExpNode::Variable(n) => n.span,
            ExpNode::Binary(n) => n.span,
            ExpNode::Unary(n) => n.span,
            ExpNode::ArrayIndexing(n) => n.span,
            ExpNode::Dereference(n) => n.span,
            ExpNode::NarrowSubrange(n) => n.span,
            ExpNode::WidenSubrange(n) => n.span,
        }
    }

    /// The type assigned by elaboration. Unresolved identifiers and error
    /// nodes report [`Type::Error`].
    pub fn ty(&self) -> Type {
        match self {
            ExpNode::Error(_) | ExpNode::Identifier(_) => Type::Error,
            ExpNode::Const(n) => n.ty.clone(),
            ExpNode::Variable(n) => n.ty.clone(),
            ExpNode::Binary(n) => n.ty.clone(),
            ExpNode::Unary(n) => n.ty.clone(),
            ExpNode::ArrayIndexing(n) => n.ty.clone(),
            ExpNode::Dereference(n) => n.ty.clone(),
            ExpNode::NarrowSubrange(n) => n.ty.clone(),
            ExpNode::WidenSubrange(n) => n.ty.clone(),
        }
    }

    pub fn set_ty(&mut self, ty: Type) {
        match self {
            ExpNode::Error(_) | ExpNode::Identifier(_) => {}
            ExpNode::Const(n) => n.ty = ty,
            ExpNode::Variable(n) => n.ty = ty,
            ExpNode::Binary(n) => n.ty = ty,
            ExpNode::Unary(n) => n.ty = ty,
            ExpNode::ArrayIndexing(n) => n.ty = ty,
            ExpNode::Dereference(n) => n.ty = ty,
            ExpNode::NarrowSubrange(n) => n.ty = ty,
            ExpNode::WidenSubrange(n) => n.ty = ty,
        }
    }

    /// Take this node out of its slot, leaving an error placeholder behind.
    /// The checker's rewriting primitive: take, elaborate, store back.
    pub fn take(&mut self) -> ExpNode {
        let span = self.span();
        std::mem::replace(self, ExpNode::error(span))
    }
}

/// A statement node. Statement kinds are never rewritten; only their
/// expression children are.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Error(ErrorStmt),
    Assignment(AssignmentStmt),
    Read(ReadStmt),
    Write(WriteStmt),
    Call(CallStmt),
    If(IfStmt),
    While(WhileStmt),
    For(ForStmt),
    List(ListStmt),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ErrorStmt {
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssignmentStmt {
    pub span: Span,
    pub lvalue: ExpNode,
    pub rvalue: ExpNode,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReadStmt {
    pub span: Span,
    pub lvalue: ExpNode,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WriteStmt {
    pub span: Span,
    pub exp: ExpNode,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CallStmt {
    pub span: Span,
    pub name: String,
    /// Resolved by the checker; code generation requires it.
    pub entry: Option<EntryId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IfStmt {
    pub span: Span,
    pub cond: ExpNode,
    pub then_stmt: Box<Statement>,
    pub else_stmt: Box<Statement>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WhileStmt {
    pub span: Span,
    pub cond: ExpNode,
    pub body: Box<Statement>,
}

/// `for control := lower to upper do body`.
///
/// The parser pre-builds `scope`, a nested scope sharing the enclosing
/// procedure's frame; the checker allocates the two hidden bound slots in
/// it and records their offsets here for code generation.
#[derive(Clone, Debug, PartialEq)]
pub struct ForStmt {
    pub span: Span,
    pub scope: ScopeId,
    pub control: ExpNode,
    pub lower: ExpNode,
    pub upper: ExpNode,
    pub body: Box<Statement>,
    pub low_offset: Option<i32>,
    pub high_offset: Option<i32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListStmt {
    pub span: Span,
    pub statements: Vec<Statement>,
}

impl Statement {
    pub fn list(span: Span, statements: Vec<Statement>) -> Statement {
        Statement::List(ListStmt { span, statements })
    }

    pub fn span(&self) -> Span {
        match self {
            Statement::Error(n) => n.span,
            Statement::Assignment(n) => n.span,
            Statement::Read(n) => n.span,
            Statement::Write(n) => n.span,
            Statement::Call(n) => n.span,
            Statement::If(n) => n.span,
            Statement::While(n) => n.span,
            Statement::For(n) => n.span,
            Statement::List(n) => n.span,
        }
    }
}

/// A procedure declaration: the pre-built symbol entry plus the body block.
/// The main program is the outermost `ProcedureDecl`.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcedureDecl {
    pub span: Span,
    pub entry: EntryId,
    pub block: Block,
}

/// A block: nested procedure declarations plus the body statement.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub span: Span,
    pub procedures: Vec<ProcedureDecl>,
    pub body: Statement,
}
