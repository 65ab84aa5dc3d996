//! Code-generation tests: exact instruction sequences for statements and
//! expressions, branch offsets, frame addressing across static levels.

mod common;

use common::*;
use pask_code::Instruction::*;
use pask_core::ast::{Block, ExpNode, Operator, ProcedureDecl};
use pask_core::types::Type;

#[test]
fn write_of_a_sum_uses_the_short_constants() {
    let mut fx = Fixture::new();
    let mut program = fx.program(write(ExpNode::binary(sp(), Operator::Add, lit(1), lit(2))));
    let procedures = fx.compile(&mut program);
    let code = fx.main_code(&procedures);
    assert_eq!(
        code.instructions(),
        &[AllocStack(0), One, LoadConst(2), Add, Write, Return]
    );
}

#[test]
fn assignment_stores_then_reloads_through_the_frame() {
    let mut fx = Fixture::new();
    fx.table.declare_variable(fx.scope, "x", Type::integer());
    let mut program = fx.program(stmt_list(vec![
        assign(ident("x"), lit(5)),
        write(ident("x")),
    ]));
    let procedures = fx.compile(&mut program);
    let code = fx.main_code(&procedures);
    assert_eq!(
        code.instructions(),
        &[
            AllocStack(1),
            LoadConst(5),
            MemRef { levels: 0, offset: 3 },
            Store { words: 1 },
            MemRef { levels: 0, offset: 3 },
            Load { words: 1 },
            Write,
            Return,
        ]
    );
}

#[test]
fn subtraction_negates_the_right_operand() {
    let mut fx = Fixture::new();
    let mut program = fx.program(write(ExpNode::binary(sp(), Operator::Sub, lit(7), lit(3))));
    let procedures = fx.compile(&mut program);
    let code = fx.main_code(&procedures);
    assert_eq!(
        code.instructions(),
        &[AllocStack(0), LoadConst(7), LoadConst(3), Negate, Add, Write, Return]
    );
}

#[test]
fn greater_than_swaps_operands_and_uses_less() {
    let mut fx = Fixture::new();
    fx.table.declare_variable(fx.scope, "x", Type::integer());
    fx.table.declare_variable(fx.scope, "y", Type::integer());
    let cond = ExpNode::binary(sp(), Operator::Gt, ident("x"), ident("y"));
    let mut program = fx.program(if_stmt(cond, write(lit(1)), write(lit(0))));
    let procedures = fx.compile(&mut program);
    let code = fx.main_code(&procedures);
    assert_eq!(
        code.instructions(),
        &[
            AllocStack(2),
            // y first, then x, so LESS computes y < x.
            MemRef { levels: 0, offset: 4 },
            Load { words: 1 },
            MemRef { levels: 0, offset: 3 },
            Load { words: 1 },
            Less,
            JumpIfFalse(4),
            One,
            Write,
            JumpAlways(2),
            Zero,
            Write,
            Return,
        ]
    );
    assert_jumps_land_on_boundaries(code);
}

#[test]
fn not_equal_is_equal_then_boolean_not() {
    let mut fx = Fixture::new();
    fx.table.declare_variable(fx.scope, "x", Type::integer());
    let cond = ExpNode::binary(sp(), Operator::Ne, ident("x"), lit(0));
    let mut program = fx.program(if_stmt(cond, write(lit(1)), write(lit(0))));
    let procedures = fx.compile(&mut program);
    let code = fx.main_code(&procedures);
    assert_eq!(
        &code.instructions()[..6],
        &[
            AllocStack(1),
            MemRef { levels: 0, offset: 3 },
            Load { words: 1 },
            Zero,
            Equal,
            BoolNot,
        ]
    );
    assert_jumps_land_on_boundaries(code);
}

#[test]
fn while_loop_tests_first_and_branches_back() {
    let mut fx = Fixture::new();
    fx.table.declare_variable(fx.scope, "i", Type::integer());
    let cond = ExpNode::binary(sp(), Operator::Lt, ident("i"), lit(3));
    let mut program = fx.program(while_stmt(cond, write(ident("i"))));
    let procedures = fx.compile(&mut program);
    let code = fx.main_code(&procedures);
    assert_eq!(
        code.instructions(),
        &[
            AllocStack(1),
            MemRef { levels: 0, offset: 3 },
            Load { words: 1 },
            LoadConst(3),
            Less,
            JumpIfFalse(8),
            MemRef { levels: 0, offset: 3 },
            Load { words: 1 },
            Write,
            JumpAlways(-18),
            Return,
        ]
    );
    assert_jumps_land_on_boundaries(code);
}

#[test]
fn array_assignment_scales_the_index_and_checks_bounds() {
    let mut fx = Fixture::new();
    let index_ty = Type::subrange(Type::integer(), 2, 5);
    let arr = fx
        .table
        .declare_array(fx.scope, "row", index_ty, Type::integer());
    fx.table.declare_variable(fx.scope, "a", arr);
    fx.table.declare_variable(fx.scope, "i", Type::integer());

    let lvalue = ExpNode::array_indexing(
        sp(),
        ident("a"),
        ExpNode::binary(sp(), Operator::Add, ident("i"), lit(1)),
    );
    let mut program = fx.program(assign(lvalue, lit(0)));
    let procedures = fx.compile(&mut program);
    let code = fx.main_code(&procedures);
    assert_eq!(
        code.instructions(),
        &[
            // a spans four words (offsets 3..6), i sits at 7.
            AllocStack(5),
            Zero,
            MemRef { levels: 0, offset: 3 },
            MemRef { levels: 0, offset: 7 },
            Load { words: 1 },
            One,
            Add,
            BoundsCheck { lower: 2, upper: 5 },
            LoadConst(2),
            Negate,
            Add,
            LoadConst(1),
            Mpy,
            Add,
            Store { words: 1 },
            Return,
        ]
    );
}

#[test]
fn read_stores_through_the_reference() {
    let mut fx = Fixture::new();
    fx.table.declare_variable(fx.scope, "x", Type::integer());
    let mut program = fx.program(read(ident("x")));
    let procedures = fx.compile(&mut program);
    let code = fx.main_code(&procedures);
    assert_eq!(
        code.instructions(),
        &[
            AllocStack(1),
            Read,
            MemRef { levels: 0, offset: 3 },
            Store { words: 1 },
            Return,
        ]
    );
}

#[test]
fn nested_procedure_reaches_outer_locals_through_the_static_link() {
    let mut fx = Fixture::new();
    fx.table.declare_variable(fx.scope, "x", Type::integer());
    let inner = fx.table.new_procedure(fx.scope, "inner");
    let inner_decl = ProcedureDecl {
        span: sp(),
        entry: inner,
        block: Block {
            span: sp(),
            procedures: Vec::new(),
            body: assign(ident("x"), lit(1)),
        },
    };

    let mut program = fx.program_with_procedures(vec![inner_decl], call("inner"));
    let procedures = fx.compile(&mut program);
    assert_eq!(procedures.len(), 2);

    let inner_entry = fx.table.procedure(inner);
    let main_code = fx.main_code(&procedures);
    assert_eq!(
        main_code.instructions(),
        &[
            AllocStack(1),
            Call {
                levels: 0,
                proc: inner_entry.proc
            },
            Return,
        ]
    );

    let inner_code = procedures.get(inner_entry.proc).expect("inner has code");
    assert_eq!(
        inner_code.instructions(),
        &[
            AllocStack(0),
            One,
            // One static level out, into main's frame.
            MemRef { levels: 1, offset: 3 },
            Store { words: 1 },
            Return,
        ]
    );
}
