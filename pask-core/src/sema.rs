//! Static checker / type elaborator.
//!
//! Walks the raw tree the parser built, resolves identifiers against the
//! scope tree, assigns a type to every expression node and inserts the
//! explicit conversions (dereference, widen, narrow) that make the tree
//! type-exact. Statement kinds stay put; expression children are replaced
//! by their elaborated forms. User errors are queued on the sink and
//! checking continues; internal invariant violations are fatal.

use crate::ast::{
    ArrayIndexingExp, BinaryExp, Block, ConstExp, DereferenceExp, ExpNode, ForStmt,
    IdentifierExp, Operator, ProcedureDecl, Span, Statement, UnaryExp, VariableExp,
};
use crate::diagnostics::Diagnostics;
use crate::symbols::{ScopeId, SymEntry, SymbolTable};
use crate::types::{FunctionType, Type};

pub struct Checker<'a> {
    table: &'a mut SymbolTable,
    diags: &'a mut Diagnostics,
    scope: ScopeId,
}

impl<'a> Checker<'a> {
    pub fn new(table: &'a mut SymbolTable, diags: &'a mut Diagnostics) -> Self {
        let scope = table.predefined_scope();
        Checker {
            table,
            diags,
            scope,
        }
    }

    /// Check the main program; it is a special case of a procedure.
    pub fn check_program(&mut self, program: &mut ProcedureDecl) {
        self.check_procedure(program);
    }

    fn check_procedure(&mut self, node: &mut ProcedureDecl) {
        let proc_scope = self.table.procedure(node.entry).scope;
        if let SymEntry::Procedure(entry) = self.table.entry_mut(node.entry) {
            entry.defined = true;
        }
        // Resolve pending declarations, then check the block in the local
        // scope. The current scope is restored on every path out.
        self.table.resolve_scope(proc_scope);
        let saved = self.scope;
        self.scope = proc_scope;
        self.check_block(&mut node.block);
        self.scope = saved;
    }

    fn check_block(&mut self, block: &mut Block) {
        for procedure in &mut block.procedures {
            self.check_procedure(procedure);
        }
        self.check_statement(&mut block.body);
    }

    fn check_statement(&mut self, stmt: &mut Statement) {
        match stmt {
            Statement::Error(_) => {}
            Statement::Assignment(node) => {
                let left = self.check_exp(node.lvalue.take());
                let exp = self.check_exp(node.rvalue.take());
                if let ExpNode::Variable(var) = &left {
                    if self.table.variable(var.entry).read_only {
                        self.diags
                            .error("cannot assign to read-only variable", left.span());
                    }
                }
                match left.ty() {
                    Type::Reference(base) => {
                        // The right side must be assignment compatible with
                        // the base type of the left value.
                        node.rvalue = (*base).coerce_exp(exp, self.diags);
                    }
                    Type::Error => node.rvalue = exp,
                    _ => {
                        self.diags.error("variable expected", left.span());
                        node.rvalue = exp;
                    }
                }
                node.lvalue = left;
            }
            Statement::Read(node) => {
                let lvalue = self.check_exp(node.lvalue.take());
                match lvalue.ty() {
                    Type::Reference(base) => {
                        if *base != Type::integer() {
                            self.diags
                                .error("integer variable expected", lvalue.span());
                        }
                    }
                    Type::Error => {}
                    _ => self.diags.error("variable expected", lvalue.span()),
                }
                node.lvalue = lvalue;
            }
            Statement::Write(node) => {
                let exp = self.check_exp(node.exp.take());
                node.exp = Type::integer().coerce_exp(exp, self.diags);
            }
            Statement::Call(node) => match self.table.lookup(self.scope, &node.name) {
                Some(id) if matches!(self.table.entry(id), SymEntry::Procedure(_)) => {
                    node.entry = Some(id);
                }
                _ => self
                    .diags
                    .error("Procedure identifier required", node.span),
            },
            Statement::If(node) => {
                node.cond = self.check_condition(node.cond.take());
                self.check_statement(&mut node.then_stmt);
                self.check_statement(&mut node.else_stmt);
            }
            Statement::While(node) => {
                node.cond = self.check_condition(node.cond.take());
                self.check_statement(&mut node.body);
            }
            Statement::For(node) => self.check_for(node),
            Statement::List(node) => {
                for stmt in &mut node.statements {
                    self.check_statement(stmt);
                }
            }
        }
    }

    fn check_condition(&mut self, cond: ExpNode) -> ExpNode {
        let cond = self.check_exp(cond);
        Type::boolean().coerce_exp(cond, self.diags)
    }

    /// The `for` loop. Bounds are elaborated in the enclosing scope; the
    /// pre-built inner scope then receives the enclosing procedure as its
    /// owner and two hidden single-word slots for the bounds snapshot. The
    /// controlling scalar type comes from a scalar-typed bound if there is
    /// one, is synthesized from two literal bounds otherwise, and falls
    /// back to the control variable's base type.
    fn check_for(&mut self, node: &mut ForStmt) {
        let mut upper = self.check_exp(node.upper.take());
        let mut lower = self.check_exp(node.lower.take());

        let owner = self.table.scope_owner(self.scope);
        self.table.set_scope_owner(node.scope, owner);
        let saved = self.scope;
        self.scope = node.scope;

        node.low_offset = Some(self.table.alloc_variable_space(self.scope, 1));
        node.high_offset = Some(self.table.alloc_variable_space(self.scope, 1));

        let mut control = self.check_exp(node.control.take());
        // The control variable is read-only for the whole loop, body
        // included, so writes inside the body are rejected.
        if let ExpNode::Variable(var) = &control {
            self.table.set_read_only(var.entry);
        }
        self.check_statement(&mut node.body);

        let mut scalar = match control.ty() {
            Type::Reference(base) => (*base).clone(),
            Type::Error => Type::Error,
            _ => {
                self.diags.error("variable expected", control.span());
                Type::Error
            }
        };
        let upper_ty = upper.ty();
        let lower_ty = lower.ty();
        let mut adopted = false;
        if matches!(upper_ty, Type::Scalar(_)) {
            scalar = upper_ty;
            adopted = true;
        }
        if matches!(lower_ty, Type::Scalar(_)) {
            scalar = lower_ty;
            adopted = true;
        }
        if !adopted {
            // Two literal bounds: the control variable runs over an
            // anonymous scalar covering exactly the written interval.
            if let (ExpNode::Const(lo), ExpNode::Const(hi)) = (&lower, &upper) {
                scalar = Type::scalar("ScalarTypeFor", 1, lo.value, hi.value);
            }
        }

        let ref_ty = Type::reference(scalar.clone());
        control.set_ty(ref_ty.clone());
        if matches!(upper, ExpNode::Variable(_)) {
            upper.set_ty(ref_ty.clone());
        } else {
            upper.set_ty(scalar.clone());
        }
        if matches!(lower, ExpNode::Variable(_)) {
            lower.set_ty(ref_ty);
        } else {
            lower.set_ty(scalar.clone());
        }

        node.control = control;
        node.upper = scalar.coerce_exp(upper, self.diags);
        node.lower = scalar.coerce_exp(lower, self.diags);

        self.scope = saved;
    }

    fn check_exp(&mut self, exp: ExpNode) -> ExpNode {
        match exp {
            // Types already set up, or already invalid.
            ExpNode::Error(_)
            | ExpNode::Const(_)
            | ExpNode::Variable(_)
            | ExpNode::NarrowSubrange(_)
            | ExpNode::WidenSubrange(_) => exp,
            ExpNode::Identifier(node) => self.check_identifier(node),
            ExpNode::Dereference(node) => self.check_dereference(node),
            ExpNode::Binary(node) => self.check_binary(node),
            ExpNode::Unary(node) => self.check_unary(node),
            ExpNode::ArrayIndexing(node) => self.check_array_indexing(node),
        }
    }

    /// The parser cannot tell a constant from a variable; resolve the
    /// identifier and rewrite it to the matching node kind.
    fn check_identifier(&mut self, node: IdentifierExp) -> ExpNode {
        let Some(id) = self.table.lookup(self.scope, &node.name) else {
            self.diags
                .error("Constant or variable identifier required", node.span);
            return ExpNode::error(node.span);
        };
        match self.table.entry(id) {
            SymEntry::Constant(entry) => ExpNode::Const(ConstExp {
                span: node.span,
                ty: entry.ty.clone(),
                value: entry.value,
            }),
            SymEntry::Variable(entry) => ExpNode::Variable(VariableExp {
                span: node.span,
                ty: Type::reference(entry.ty.clone()),
                entry: id,
            }),
            _ => {
                self.diags
                    .error("Constant or variable identifier required", node.span);
                ExpNode::error(node.span)
            }
        }
    }

    fn check_dereference(&mut self, mut node: DereferenceExp) -> ExpNode {
        let lvalue = self.check_exp(node.lvalue.take());
        match lvalue.ty() {
            Type::Reference(base) => node.ty = (*base).clone(),
            Type::Error => node.ty = Type::Error,
            _ => {
                self.diags.error(
                    "cannot dereference an expression which isn't a reference",
                    node.span,
                );
                node.ty = Type::Error;
            }
        }
        node.lvalue = Box::new(lvalue);
        ExpNode::Dereference(node)
    }

    /// Binary operators can be overloaded. A plain operator type coerces
    /// both operands to its parameter types; an intersection tries each
    /// candidate in order and the first whose operands both coerce wins.
    fn check_binary(&mut self, mut node: BinaryExp) -> ExpNode {
        let left = self.check_exp(node.left.take());
        let right = self.check_exp(node.right.take());
        let op_ty = self.operator_type(node.op, node.span);
        match &op_ty {
            Type::Operator(opr) => {
                let (first, second) = self.binary_params(&opr.func, node.span);
                node.left = Box::new(first.coerce_exp(left, self.diags));
                node.right = Box::new(second.coerce_exp(right, self.diags));
                node.ty = opr.func.result.clone();
                node.op = opr.op;
            }
            Type::Intersection(inter) => {
                self.diags
                    .debug_message(format!("coercing operands of {} to {}", node.op, op_ty));
                self.diags.inc_debug();
                for cand in &inter.types {
                    let Type::Operator(opr) = cand else {
                        self.diags.fatal("invalid operator type", node.span)
                    };
                    let (first, second) = self.binary_params(&opr.func, node.span);
                    let Ok(new_left) = first.coerce_to_type(&left) else {
                        continue;
                    };
                    let Ok(new_right) = second.coerce_to_type(&right) else {
                        continue;
                    };
                    node.left = Box::new(new_left);
                    node.right = Box::new(new_right);
                    node.ty = opr.func.result.clone();
                    node.op = opr.op;
                    self.diags.dec_debug();
                    return ExpNode::Binary(node);
                }
                self.diags.dec_debug();
                if !left.ty().is_error() && !right.ty().is_error() {
                    self.diags.error(
                        format!(
                            "Type of argument ({}*{}) does not match {}",
                            left.ty(),
                            right.ty(),
                            op_ty
                        ),
                        node.span,
                    );
                }
                node.left = Box::new(left);
                node.right = Box::new(right);
                node.ty = Type::Error;
            }
            _ => self.diags.fatal("invalid operator type", node.span),
        }
        ExpNode::Binary(node)
    }

    /// Unary operators follow the same overloading scheme. Every unary
    /// node additionally reserves one hidden word in the current frame;
    /// pred/succ use it as scratch space when wrapping.
    fn check_unary(&mut self, mut node: UnaryExp) -> ExpNode {
        node.idx_offset = Some(self.table.alloc_variable_space(self.scope, 1));

        let arg = self.check_exp(node.arg.take());
        let op_ty = self.operator_type(node.op, node.span);
        match &op_ty {
            Type::Operator(opr) => {
                node.arg = Box::new(opr.func.arg.coerce_exp(arg, self.diags));
                node.ty = opr.func.result.clone();
                node.op = opr.op;
            }
            Type::Intersection(inter) => {
                self.diags
                    .debug_message(format!("coercing argument of {} to {}", node.op, op_ty));
                self.diags.inc_debug();
                for cand in &inter.types {
                    let Type::Operator(opr) = cand else {
                        self.diags.fatal("invalid operator type", node.span)
                    };
                    let Ok(new_arg) = opr.func.arg.coerce_to_type(&arg) else {
                        continue;
                    };
                    node.arg = Box::new(new_arg);
                    node.ty = opr.func.result.clone();
                    node.op = opr.op;
                    self.diags.dec_debug();
                    return ExpNode::Unary(node);
                }
                self.diags.dec_debug();
                if !arg.ty().is_error() {
                    self.diags.error(
                        format!("Type of argument {} does not match {}", arg.ty(), op_ty),
                        node.span,
                    );
                }
                node.arg = Box::new(arg);
                node.ty = Type::Error;
            }
            _ => self.diags.fatal("invalid operator type", node.span),
        }
        ExpNode::Unary(node)
    }

    /// Array indexing: the base must be a reference to an array; the node
    /// becomes a reference to the element type and the index is coerced to
    /// the array's index type. The shape checks run before any access to
    /// the index type, so a non-array base exits early.
    fn check_array_indexing(&mut self, mut node: ArrayIndexingExp) -> ExpNode {
        let base = self.check_exp(node.base.take());
        let index = self.check_exp(node.index.take());
        match base.ty() {
            Type::Reference(inner) => match &*inner {
                Type::Array(array) => {
                    node.ty = Type::reference(array.element.clone());
                    node.index = Box::new(array.index.coerce_exp(index, self.diags));
                }
                _ => {
                    self.diags.error("must be an array type", base.span());
                    node.ty = Type::Error;
                    node.index = Box::new(index);
                }
            },
            Type::Error => {
                node.ty = Type::Error;
                node.index = Box::new(index);
            }
            _ => {
                self.diags.error("Should be ReferenceType", base.span());
                node.ty = Type::Error;
                node.index = Box::new(index);
            }
        }
        node.base = Box::new(base);
        ExpNode::ArrayIndexing(node)
    }

    fn operator_type(&self, op: Operator, span: Span) -> Type {
        match self.table.lookup_operator(self.scope, op) {
            Some(id) => match self.table.entry(id) {
                SymEntry::Operator(entry) => entry.ty.clone(),
                _ => self.diags.fatal("operator entry is not an operator", span),
            },
            None => self.diags.fatal("unknown operator", span),
        }
    }

    fn binary_params(&self, func: &FunctionType, span: Span) -> (Type, Type) {
        match &func.arg {
            Type::Product(product) if product.types.len() == 2 => {
                (product.types[0].clone(), product.types[1].clone())
            }
            _ => self
                .diags
                .fatal("binary operator type is not a two-argument product", span),
        }
    }
}
