#![allow(dead_code)]

use std::collections::HashSet;

use pask_code::{Code, Instruction, Procedures};
use pask_core::ast::{
    span, AssignmentStmt, Block, CallStmt, ExpNode, ForStmt, IfStmt, ProcedureDecl, ReadStmt,
    Span, Statement, WhileStmt, WriteStmt,
};
use pask_core::symbols::{EntryId, ScopeId};
use pask_core::{generate_program, Checker, Diagnostics, SymbolTable};

pub fn sp() -> Span {
    span(0, 0)
}

/// A program under construction: the symbol table a parser would have
/// pre-built, with the main program's entry and local scope at level 1.
pub struct Fixture {
    pub table: SymbolTable,
    pub main: EntryId,
    pub scope: ScopeId,
}

impl Fixture {
    pub fn new() -> Self {
        let mut table = SymbolTable::new();
        let main = table.new_procedure(table.predefined_scope(), "main");
        let scope = table.procedure(main).scope;
        Fixture { table, main, scope }
    }

    pub fn program(&self, body: Statement) -> ProcedureDecl {
        self.program_with_procedures(Vec::new(), body)
    }

    pub fn program_with_procedures(
        &self,
        procedures: Vec<ProcedureDecl>,
        body: Statement,
    ) -> ProcedureDecl {
        ProcedureDecl {
            span: sp(),
            entry: self.main,
            block: Block {
                span: sp(),
                procedures,
                body,
            },
        }
    }

    /// Run the static checker, returning whatever it reported.
    pub fn check(&mut self, program: &mut ProcedureDecl) -> Diagnostics {
        let mut diags = Diagnostics::new();
        Checker::new(&mut self.table, &mut diags).check_program(program);
        diags
    }

    /// Check (expecting a clean tree) and generate code.
    pub fn compile(&mut self, program: &mut ProcedureDecl) -> Procedures {
        let diags = self.check(program);
        assert!(
            !diags.has_errors(),
            "unexpected static errors: {:?}",
            diags.errors()
        );
        let mut diags = Diagnostics::new();
        generate_program(&self.table, &mut diags, program)
    }

    /// The main program's code blob.
    pub fn main_code<'a>(&self, procedures: &'a Procedures) -> &'a Code {
        procedures
            .get(self.table.procedure(self.main).proc)
            .expect("main has code")
    }

    /// A `for` statement with its pre-built inner scope, as the parser
    /// would deliver it.
    pub fn for_stmt(
        &mut self,
        control: ExpNode,
        lower: ExpNode,
        upper: ExpNode,
        body: Statement,
    ) -> Statement {
        let scope = self.table.new_nested_scope(self.scope);
        Statement::For(ForStmt {
            span: sp(),
            scope,
            control,
            lower,
            upper,
            body: Box::new(body),
            low_offset: None,
            high_offset: None,
        })
    }
}

pub fn ident(name: &str) -> ExpNode {
    ExpNode::identifier(sp(), name)
}

pub fn lit(value: i64) -> ExpNode {
    ExpNode::int_literal(sp(), value)
}

pub fn assign(lvalue: ExpNode, rvalue: ExpNode) -> Statement {
    Statement::Assignment(AssignmentStmt {
        span: sp(),
        lvalue,
        rvalue,
    })
}

pub fn write(exp: ExpNode) -> Statement {
    Statement::Write(WriteStmt { span: sp(), exp })
}

pub fn read(lvalue: ExpNode) -> Statement {
    Statement::Read(ReadStmt { span: sp(), lvalue })
}

pub fn call(name: &str) -> Statement {
    Statement::Call(CallStmt {
        span: sp(),
        name: name.to_string(),
        entry: None,
    })
}

pub fn if_stmt(cond: ExpNode, then_stmt: Statement, else_stmt: Statement) -> Statement {
    Statement::If(IfStmt {
        span: sp(),
        cond,
        then_stmt: Box::new(then_stmt),
        else_stmt: Box::new(else_stmt),
    })
}

pub fn while_stmt(cond: ExpNode, body: Statement) -> Statement {
    Statement::While(WhileStmt {
        span: sp(),
        cond,
        body: Box::new(body),
    })
}

pub fn stmt_list(statements: Vec<Statement>) -> Statement {
    Statement::list(sp(), statements)
}

/// Decode every branch in `code` and require its target to land exactly on
/// an instruction boundary inside the blob.
pub fn assert_jumps_land_on_boundaries(code: &Code) {
    let mut boundaries = HashSet::new();
    let mut offset = 0;
    for inst in code.instructions() {
        boundaries.insert(offset);
        offset += inst.words();
    }
    boundaries.insert(offset);

    let mut at = 0;
    for inst in code.instructions() {
        let next = at + inst.words();
        if let Instruction::JumpAlways(rel) | Instruction::JumpIfFalse(rel) = inst {
            let target = next + rel;
            assert!(
                (0..=code.size()).contains(&target) && boundaries.contains(&target),
                "branch at word {at} targets {target}, which is not an instruction boundary"
            );
        }
        at = next;
    }
    assert_eq!(at, code.size(), "size bookkeeping matches emitted words");
}
