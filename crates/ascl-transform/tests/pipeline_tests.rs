use ascl_core::{
    AstBuilder, BaseType, BinaryOp, CompileError, CompileOptions, DiagnosticKind, ExprKind,
    IdentId, MemRef, Meta, StmtKind, SysLib, Terminator, Value,
};
use ascl_transform::{
    compile, CheckPass, CompileUnit, LayoutPass, TransformationPipeline, TranslatePass,
};
use pretty_assertions::assert_eq;

struct Wallet {
    builder: AstBuilder,
    flag: IdentId,
    total: IdentId,
    owner: IdentId,
}

/// Contract with three globals and two functions that each return the same
/// string literal.
fn wallet() -> Wallet {
    let mut b = AstBuilder::new();
    let (_, cblk) = b.contract("Wallet");
    let flag = b.global(cblk, "flag", Meta::new(BaseType::Bool));
    let total = b.global(cblk, "total", Meta::new(BaseType::Int64));
    let owner = b.global(cblk, "owner", Meta::new(BaseType::String));

    for name in ["describe", "describe_again"] {
        let (_, body) = b.function(cblk, name, vec![], vec![Meta::new(BaseType::String)]);
        let text = b.string("wallet");
        let stmt = b.ret(Some(text));
        b.push(body, stmt);
    }

    let (_, body) = b.function(
        cblk,
        "deposit",
        vec![("amount", Meta::new(BaseType::Int64))],
        vec![],
    );
    let total_ref = b.id(total);
    let one = b.typed_int(1, BaseType::Int64);
    let sum = b.binary(BinaryOp::Add, total_ref, one);
    let total_ref = b.id(total);
    let set = b.assign(total_ref, sum);
    let stmt = b.exp(set);
    b.push(body, stmt);

    Wallet {
        builder: b,
        flag,
        total,
        owner,
    }
}

#[test]
fn test_compile_lays_out_globals_and_translates_every_function() {
    let w = wallet();
    let module = compile(w.builder.finish(), SysLib::new(), CompileOptions::default()).unwrap();

    assert_eq!(module.ast.ident(w.flag).addr, Some(0));
    assert_eq!(module.ast.ident(w.total).addr, Some(8));
    assert_eq!(module.ast.ident(w.owner).addr, Some(16));

    let names: Vec<_> = module.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["describe", "describe_again", "deposit"]);

    assert_eq!(module.segment.len(), 1);
    assert_eq!(module.segment.lookup(0).unwrap(), b"wallet\0");

    let deposit = module.function("deposit").unwrap();
    let entry = &deposit.blocks[0];
    assert_eq!(entry.stmts.len(), 1);
    assert_eq!(entry.terminator, Terminator::Return(None));

    let describe = module.function("describe").unwrap();
    let Terminator::Return(Some(value)) = describe.blocks[0].terminator else {
        panic!("describe should return its string");
    };
    assert_eq!(
        module.ast.expr(value).kind,
        ExprKind::Lit(Value::Addr(0))
    );
}

#[test]
fn test_globals_are_addressed_through_the_receiver() {
    let w = wallet();
    let module = compile(w.builder.finish(), SysLib::new(), CompileOptions::default()).unwrap();
    let deposit = module.function("deposit").unwrap();

    let stmt = deposit.blocks[0].stmts[0];
    let StmtKind::Exp(set) = module.ast.stmt(stmt).kind else {
        panic!("expected the update statement");
    };
    let ExprKind::Binary { lhs, .. } = module.ast.expr(set).kind else {
        panic!("expected an assignment");
    };
    assert_eq!(
        module.ast.expr(lhs).kind,
        ExprKind::Memory(MemRef::new(0, 8, 0))
    );
}

#[test]
fn test_check_errors_surface_through_compile() {
    let mut b = AstBuilder::new();
    let (_, cblk) = b.contract("Broken");
    let (_, body) = b.function(cblk, "f", vec![], vec![]);
    b.at(2, 5);
    let cond = b.int(1);
    let stmt = b.if_stmt(cond, None, vec![], None);
    b.push(body, stmt);

    let err = compile(b.finish(), SysLib::new(), CompileOptions::default()).unwrap_err();

    let compile_err = err.downcast_ref::<CompileError>().unwrap();
    assert_eq!(
        compile_err.kind(),
        Some(&DiagnosticKind::InvalidCondType("int64".to_string()))
    );
    assert_eq!(err.to_string(), "pass 'check' failed");
    assert!(format!("{:#}", err).ends_with("2:5: invalid condition type: 'int64'"));
}

#[test]
fn test_translation_requires_earlier_passes() {
    let w = wallet();
    let mut unit = CompileUnit::new(w.builder.finish(), SysLib::new(), CompileOptions::default());

    let mut pipeline = TransformationPipeline::new().with_pass(Box::new(TranslatePass));
    let err = pipeline.run(&mut unit).unwrap_err();
    assert_eq!(err.to_string(), "pass 'translate' cannot run");
    assert!(unit.functions.is_empty());

    let mut pipeline = TransformationPipeline::new()
        .with_pass(Box::new(LayoutPass))
        .with_pass(Box::new(CheckPass))
        .with_pass(Box::new(TranslatePass));
    assert_eq!(pipeline.pass_names(), vec!["layout", "check", "translate"]);
    pipeline.run(&mut unit).unwrap();
    assert_eq!(unit.into_module().functions.len(), 3);
}
