//! Code generator.
//!
//! Walks the elaborated tree and lowers it to stack-machine code, one blob
//! per procedure. Branch offsets are computed from the sizes of fragments
//! already assembled; nothing is patched after the fact. Reaching an
//! unresolved identifier or an error node here means the driver ran code
//! generation on a tree the checker rejected, which is fatal.

use pask_code::{Code, Instruction, Procedures, SIZE_JUMP_ALWAYS};

use crate::ast::{
    ArrayIndexingExp, BinaryExp, Block, ExpNode, ForStmt, Operator, ProcedureDecl, Statement,
    UnaryExp, WhileStmt,
};
use crate::diagnostics::Diagnostics;
use crate::symbols::{ScopeId, SymbolTable};

pub struct CodeGenerator<'a> {
    table: &'a SymbolTable,
    diags: &'a mut Diagnostics,
    /// Static level of the frame code is currently generated for.
    level: u32,
    procedures: Procedures,
}

/// Generate code for the whole program: the main program and, recursively,
/// every nested procedure.
pub fn generate_program(
    table: &SymbolTable,
    diags: &mut Diagnostics,
    program: &ProcedureDecl,
) -> Procedures {
    let level = table.scope_level(table.procedure(program.entry).scope);
    debug_assert_eq!(level, 1, "main program is at static level 1");
    let mut gen = CodeGenerator {
        table,
        diags,
        level,
        procedures: Procedures::new(),
    };
    gen.gen_procedure(program);
    gen.procedures
}

impl<'a> CodeGenerator<'a> {
    fn gen_procedure(&mut self, node: &ProcedureDecl) {
        let entry = self.table.procedure(node.entry);
        let (scope, proc) = (entry.scope, entry.proc);
        let mut code = self.gen_block(&node.block, scope);
        code.emit(Instruction::Return);
        self.procedures.add_procedure(proc, code);
    }

    fn gen_block(&mut self, block: &Block, scope: ScopeId) -> Code {
        let mut code = Code::new();
        // Space for locals, hidden slots included, on procedure entry.
        code.alloc_stack(self.table.variable_space(scope));
        code.append(self.gen_statement(&block.body));
        // Nested procedures sit one static level deeper.
        self.level += 1;
        for procedure in &block.procedures {
            self.gen_procedure(procedure);
        }
        self.level -= 1;
        code
    }

    fn gen_statement(&mut self, stmt: &Statement) -> Code {
        match stmt {
            Statement::Error(node) => self
                .diags
                .fatal("code generation reached an error statement", node.span),
            Statement::Assignment(node) => {
                let mut code = self.gen_exp(&node.rvalue);
                code.append(self.gen_exp(&node.lvalue));
                code.store(node.rvalue.ty().space());
                code
            }
            Statement::Read(node) => {
                let mut code = Code::new();
                code.emit(Instruction::Read);
                code.append(self.gen_exp(&node.lvalue));
                let base = match node.lvalue.ty().dereferenced() {
                    Some(base) => base,
                    None => self
                        .diags
                        .fatal("read target is not a reference", node.span),
                };
                code.store(base.space());
                code
            }
            Statement::Write(node) => {
                let mut code = self.gen_exp(&node.exp);
                code.emit(Instruction::Write);
                code
            }
            Statement::Call(node) => {
                let Some(id) = node.entry else {
                    self.diags.fatal("call was not resolved", node.span)
                };
                let proc = self.table.procedure(id);
                let mut code = Code::new();
                code.call(self.level - proc.level, proc.proc);
                code
            }
            Statement::If(node) => {
                let cond = self.gen_exp(&node.cond);
                let then_code = self.gen_statement(&node.then_stmt);
                let else_code = self.gen_statement(&node.else_stmt);
                let mut code = Code::new();
                code.if_then_else(cond, then_code, else_code);
                code
            }
            Statement::While(node) => self.gen_while(node),
            Statement::For(node) => self.gen_for(node),
            Statement::List(node) => {
                let mut code = Code::new();
                for stmt in &node.statements {
                    code.append(self.gen_statement(stmt));
                }
                code
            }
        }
    }

    /// Test-first loop: condition, exit branch over the body, body, branch
    /// back to the condition.
    fn gen_while(&mut self, node: &WhileStmt) -> Code {
        let mut code = self.gen_exp(&node.cond);
        let body = self.gen_statement(&node.body);
        code.jump_if_false(body.size() + SIZE_JUMP_ALWAYS);
        code.append(body);
        code.jump_always(-(code.size() + SIZE_JUMP_ALWAYS));
        code
    }

    /// Bounds-snapshotted, inclusive, ascending unit step.
    ///
    /// The initial lower bound goes into the control variable; lower and
    /// upper are snapshotted into the hidden slots. The loop head checks
    /// `lowSlot <= var` and `var <= highSlot`, each exiting past the body
    /// and the back-branch; the body ends with `var := var + 1`.
    fn gen_for(&mut self, node: &ForStmt) -> Code {
        let (Some(low_offset), Some(high_offset)) = (node.low_offset, node.high_offset) else {
            self.diags
                .fatal("for loop was not elaborated", node.span)
        };
        let base = match node.control.ty().dereferenced() {
            Some(base) => base,
            None => self
                .diags
                .fatal("for control variable is not a reference", node.span),
        };
        let words = base.space();

        let lower = self.gen_exp(&node.lower);
        let upper = self.gen_exp(&node.upper);
        let control = self.gen_exp(&node.control);

        let mut init = Code::new();
        init.append(lower.clone());
        init.append(control.clone());
        init.store(words);
        init.append(lower);
        init.load_constant(i64::from(low_offset));
        init.store(words);
        init.append(upper);
        init.load_constant(i64::from(high_offset));
        init.store(words);

        let mut body = self.gen_statement(&node.body);
        let mut step = Code::new();
        step.append(control.clone());
        step.load(words);
        step.load_constant(1);
        step.emit(Instruction::Add);
        step.append(control.clone());
        step.store(words);
        body.append(step);

        let mut upper_check = Code::new();
        upper_check.append(control.clone());
        upper_check.load(words);
        upper_check.load_constant(i64::from(high_offset));
        upper_check.load(words);
        upper_check.emit(Instruction::LessEq);
        upper_check.jump_if_false(body.size() + SIZE_JUMP_ALWAYS);

        let mut lower_check = Code::new();
        lower_check.load_constant(i64::from(low_offset));
        lower_check.load(words);
        lower_check.append(control);
        lower_check.load(words);
        lower_check.emit(Instruction::LessEq);
        lower_check.jump_if_false(upper_check.size() + body.size() + SIZE_JUMP_ALWAYS);

        let head_and_body = lower_check.size() + upper_check.size() + body.size();
        let mut code = init;
        code.append(lower_check);
        code.append(upper_check);
        code.append(body);
        code.jump_always(-(head_and_body + SIZE_JUMP_ALWAYS));
        code
    }

    fn gen_exp(&mut self, exp: &ExpNode) -> Code {
        match exp {
            ExpNode::Error(node) => self
                .diags
                .fatal("code generation reached an error expression", node.span),
            ExpNode::Identifier(node) => self
                .diags
                .fatal("code generation reached an unresolved identifier", node.span),
            ExpNode::Const(node) => {
                let mut code = Code::new();
                match node.value {
                    0 => code.emit(Instruction::Zero),
                    1 => code.emit(Instruction::One),
                    value => code.load_constant(value),
                }
                code
            }
            ExpNode::Variable(node) => {
                let var = self.table.variable(node.entry);
                let Some(offset) = var.offset else {
                    self.diags
                        .fatal("variable has no frame offset", node.span)
                };
                let mut code = Code::new();
                code.mem_ref(self.level - var.level, offset);
                code
            }
            ExpNode::Binary(node) => self.gen_binary(node),
            ExpNode::Unary(node) => self.gen_unary(node),
            ExpNode::ArrayIndexing(node) => self.gen_array_indexing(node),
            ExpNode::Dereference(node) => {
                let mut code = self.gen_exp(&node.lvalue);
                code.load(node.ty.space());
                code
            }
            ExpNode::NarrowSubrange(node) => {
                let mut code = self.gen_exp(&node.exp);
                let Some((lower, upper)) = node.ty.bounds() else {
                    self.diags
                        .fatal("narrow target is not a subrange", node.span)
                };
                code.bounds_check(lower, upper);
                code
            }
            // Widening needs no code beyond its expression.
            ExpNode::WidenSubrange(node) => self.gen_exp(&node.exp),
        }
    }

    fn gen_args(&mut self, left: &ExpNode, right: &ExpNode) -> Code {
        let mut code = self.gen_exp(left);
        code.append(self.gen_exp(right));
        code
    }

    fn gen_binary(&mut self, node: &BinaryExp) -> Code {
        let left = &node.left;
        let right = &node.right;
        let mut code;
        match node.op {
            Operator::Add => {
                code = self.gen_args(left, right);
                code.emit(Instruction::Add);
            }
            Operator::Sub => {
                code = self.gen_args(left, right);
                code.emit(Instruction::Negate);
                code.emit(Instruction::Add);
            }
            Operator::Mul => {
                code = self.gen_args(left, right);
                code.emit(Instruction::Mpy);
            }
            Operator::Div => {
                code = self.gen_args(left, right);
                code.emit(Instruction::Div);
            }
            Operator::Eq => {
                code = self.gen_args(left, right);
                code.emit(Instruction::Equal);
            }
            Operator::Ne => {
                code = self.gen_args(left, right);
                code.emit(Instruction::Equal);
                code.bool_not();
            }
            Operator::Lt => {
                code = self.gen_args(left, right);
                code.emit(Instruction::Less);
            }
            Operator::Le => {
                code = self.gen_args(left, right);
                code.emit(Instruction::LessEq);
            }
            // Arguments in reverse order, then the mirrored comparison.
            Operator::Gt => {
                code = self.gen_args(right, left);
                code.emit(Instruction::Less);
            }
            Operator::Ge => {
                code = self.gen_args(right, left);
                code.emit(Instruction::LessEq);
            }
            _ => self.diags.fatal("unknown binary operator", node.span),
        }
        code
    }

    /// Negation is a single opcode. pred/succ wrap cyclically over the
    /// argument's scalar range: step the value, spill it into the hidden
    /// slot, add or subtract the range width when it left the range, and
    /// load the corrected value back.
    fn gen_unary(&mut self, node: &UnaryExp) -> Code {
        let mut code = self.gen_exp(&node.arg);
        match node.op {
            Operator::Neg => {
                code.emit(Instruction::Negate);
                return code;
            }
            Operator::Pred | Operator::Succ => {}
            _ => self.diags.fatal("unknown unary operator", node.span),
        }

        let arg_ty = node.arg.ty();
        let Some((lower, upper)) = arg_ty.bounds() else {
            self.diags
                .fatal("pred/succ argument is not scalar", node.span)
        };
        let Some(idx_offset) = node.idx_offset else {
            self.diags
                .fatal("unary node has no hidden slot", node.span)
        };
        let idx = i64::from(idx_offset);
        let words = arg_ty.space();
        let width = upper - lower + 1;

        match node.op {
            Operator::Pred => {
                // slot := arg - 1
                code.load_constant(1);
                code.emit(Instruction::Negate);
                code.emit(Instruction::Add);
                code.load_constant(idx);
                code.store(words);

                let mut wrap = Code::new();
                wrap.load_constant(idx);
                wrap.load(words);
                wrap.load_constant(width);
                wrap.emit(Instruction::Add);
                wrap.load_constant(idx);
                wrap.store(words);

                // In range when lower <= slot; otherwise fall into the wrap.
                code.load_constant(lower);
                code.load_constant(idx);
                code.load(words);
                code.emit(Instruction::LessEq);
                code.jump_if_false(SIZE_JUMP_ALWAYS);
                code.jump_always(wrap.size());
                code.append(wrap);
            }
            Operator::Succ => {
                // slot := arg + 1
                code.load_constant(1);
                code.emit(Instruction::Add);
                code.load_constant(idx);
                code.store(words);

                let mut wrap = Code::new();
                wrap.load_constant(idx);
                wrap.load(words);
                wrap.load_constant(width);
                wrap.emit(Instruction::Negate);
                wrap.emit(Instruction::Add);
                wrap.load_constant(idx);
                wrap.store(words);

                // In range when slot <= upper; otherwise fall into the wrap.
                code.load_constant(idx);
                code.load(words);
                code.load_constant(upper);
                code.emit(Instruction::LessEq);
                code.jump_if_false(SIZE_JUMP_ALWAYS);
                code.jump_always(wrap.size());
                code.append(wrap);
            }
            _ => unreachable!(),
        }

        code.load_constant(idx);
        code.load(words);
        code
    }

    /// Element address: base address, plus (index - indexLower) times the
    /// element size.
    fn gen_array_indexing(&mut self, node: &ArrayIndexingExp) -> Code {
        let mut code = self.gen_exp(&node.base);

        let index_ty = node.index.ty();
        let Some((index_lower, _)) = index_ty.bounds() else {
            self.diags
                .fatal("array index type is not scalar", node.span)
        };
        code.append(self.gen_exp(&node.index));
        code.load_constant(index_lower);
        code.emit(Instruction::Negate);
        code.emit(Instruction::Add);

        let element = match node.ty.dereferenced() {
            Some(element) => element,
            None => self
                .diags
                .fatal("array indexing is not a reference", node.span),
        };
        code.load_constant(i64::from(element.space()));
        code.emit(Instruction::Mpy);
        code.emit(Instruction::Add);
        code
    }
}
