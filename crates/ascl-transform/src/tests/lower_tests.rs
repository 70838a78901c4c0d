use crate::lower::{ExpressionLowering, LowerCtx, CALL_RESULT_NAME};
use ascl_core::{
    Ast, AstBuilder, BaseType, BinaryOp, CompileOptions, DataSegment, DiagnosticKind, DynOffset,
    ExprId, ExprKind, Helper, IdentId, IrFn, MemRef, Meta, Result, StmtId, StmtKind, Value,
};
use pretty_assertions::assert_eq;

/// Lowering state for a function with no parameters: the receiver is r0,
/// the stack base r1 and the heap base r2.
struct Fixture {
    ast: Ast,
    segment: DataSegment,
    func: IrFn,
    options: CompileOptions,
}

impl Fixture {
    fn new(ast: Ast) -> Self {
        Self {
            ast,
            segment: DataSegment::new(),
            func: IrFn::new("f", IdentId(0), Meta::void(), Vec::<(String, Meta)>::new()),
            options: CompileOptions::default(),
        }
    }

    fn local(&mut self, ident: IdentId) -> u32 {
        let decl = self.ast.ident(ident);
        let reg = self.func.add_reg(decl.name.clone(), decl.meta.clone());
        self.ast.ident_mut(ident).slot = Some(reg);
        reg
    }

    fn lower(&mut self, id: ExprId) -> Result<()> {
        let mut ctx = LowerCtx::new(
            &mut self.ast,
            &mut self.segment,
            &mut self.func,
            &self.options,
        );
        ExpressionLowering::new().lower(&mut ctx, id)
    }

    fn kind(&self, id: ExprId) -> ExprKind {
        self.ast.expr(id).kind.clone()
    }

    fn stmts(&self) -> Vec<StmtId> {
        self.func.current_block().stmts.clone()
    }

    fn assign(&self, stmt: StmtId) -> (ExprKind, ExprKind) {
        match self.ast.stmt(stmt).kind {
            StmtKind::Assign { lhs, rhs } => (self.kind(lhs), self.kind(rhs)),
            ref other => panic!("expected an assignment, found {:?}", other),
        }
    }
}

fn int32() -> Meta {
    Meta::new(BaseType::Int32)
}

fn mem(base: u32, addr: u32, offset: u32) -> ExprKind {
    ExprKind::Memory(MemRef::new(base, addr, offset))
}

#[test]
fn test_postfix_increments_are_deferred() {
    let mut b = AstBuilder::new();
    let x = b.var("x", int32(), None);
    let y = b.var("y", int32(), None);
    let x_ref = b.id(x);
    let first = b.post_inc(x_ref);
    let x_ref = b.id(x);
    let second = b.post_inc(x_ref);
    let sum = b.binary(BinaryOp::Add, first, second);
    let y_ref = b.id(y);
    let assign = b.assign(y_ref, sum);

    let mut fx = Fixture::new(b.finish());
    let xr = fx.local(x);
    let yr = fx.local(y);
    fx.lower(assign).unwrap();

    assert_eq!(fx.kind(first), ExprKind::Register(xr));
    assert_eq!(fx.kind(second), ExprKind::Register(xr));
    assert_eq!(fx.ast.expr(first).meta, int32());
    assert_eq!(fx.kind(y_ref), ExprKind::Register(yr));
    assert!(fx.stmts().is_empty());

    let pending = fx.func.current_block().piggybacks.clone();
    assert_eq!(pending.len(), 2);
    for stmt in pending {
        let (lhs, rhs) = fx.assign(stmt);
        assert_eq!(lhs, ExprKind::Register(xr));
        let ExprKind::Binary {
            op: BinaryOp::Add,
            lhs: read,
            rhs: one,
        } = rhs
        else {
            panic!("expected an increment");
        };
        assert_eq!(fx.kind(read), ExprKind::Register(xr));
        assert_eq!(fx.kind(one), ExprKind::Lit(Value::Int(1)));
    }
}

#[test]
fn test_prefix_increment_runs_first() {
    let mut b = AstBuilder::new();
    let x = b.var("x", int32(), None);
    let x_ref = b.id(x);
    let inc = b.pre_inc(x_ref);

    let mut fx = Fixture::new(b.finish());
    let xr = fx.local(x);
    fx.lower(inc).unwrap();

    assert_eq!(fx.kind(inc), ExprKind::Register(xr));
    assert!(!fx.func.has_piggybacks());
    assert_eq!(fx.stmts().len(), 1);
    let (lhs, rhs) = fx.assign(fx.stmts()[0]);
    assert_eq!(lhs, ExprKind::Register(xr));
    assert!(matches!(
        rhs,
        ExprKind::Binary {
            op: BinaryOp::Add,
            ..
        }
    ));
}

#[test]
fn test_literal_indexes_fold_into_the_offset() {
    let mut b = AstBuilder::new();
    let grid = b.var("grid", Meta::array(int32(), vec![2, 3]), None);
    let g = b.id(grid);
    let one = b.int(1);
    let row = b.index(g, one);
    let two = b.int(2);
    let cell = b.index(row, two);

    let mut fx = Fixture::new(b.finish());
    let gr = fx.local(grid);
    fx.lower(cell).unwrap();

    assert_eq!(fx.kind(row), mem(gr, 0, 12));
    assert_eq!(fx.kind(cell), mem(gr, 0, 20));
    assert_eq!(fx.ast.expr(cell).meta, int32());
}

#[test]
fn test_dynamic_index_keeps_its_stride() {
    let mut b = AstBuilder::new();
    let grid = b.var("grid", Meta::array(int32(), vec![2, 3]), None);
    let i = b.var("i", int32(), None);
    let g = b.id(grid);
    let i_ref = b.id(i);
    let row = b.index(g, i_ref);
    let one = b.int(1);
    let cell = b.index(row, one);

    let mut fx = Fixture::new(b.finish());
    let gr = fx.local(grid);
    let ir = fx.local(i);
    fx.lower(cell).unwrap();

    let ExprKind::Memory(cell_mem) = fx.kind(cell) else {
        panic!("element was not placed in memory");
    };
    assert_eq!((cell_mem.base, cell_mem.addr, cell_mem.offset), (gr, 0, 4));
    assert_eq!(
        cell_mem.dynamic,
        vec![DynOffset {
            index: i_ref,
            stride: 12
        }]
    );
    assert!(!cell_mem.is_static());
    assert_eq!(fx.kind(i_ref), ExprKind::Register(ir));
}

#[test]
fn test_globals_live_in_the_contract_instance() {
    let mut b = AstBuilder::new();
    let (_, cblk) = b.contract("C");
    let totals = b.global(cblk, "totals", Meta::array(Meta::new(BaseType::Int64), vec![4]));
    let t = b.id(totals);
    let two = b.int(2);
    let elem = b.index(t, two);

    let mut fx = Fixture::new(b.finish());
    fx.ast.ident_mut(totals).addr = Some(8);
    fx.lower(elem).unwrap();

    assert_eq!(fx.kind(t), mem(0, 8, 0));
    assert_eq!(fx.kind(elem), mem(0, 8, 16));
}

#[test]
fn test_map_indexing_is_not_supported() {
    let mut b = AstBuilder::new();
    let m = b.var("m", Meta::new(BaseType::Map), None);
    let m_ref = b.id(m);
    let key = b.int(1);
    let elem = b.index(m_ref, key);

    let mut fx = Fixture::new(b.finish());
    fx.local(m);
    let err = fx.lower(elem).unwrap_err();

    assert_eq!(
        err.kind(),
        Some(&DiagnosticKind::NotSupported("map indexing".to_string()))
    );
}

#[test]
fn test_literal_index_past_the_dimension_is_rejected() {
    let mut b = AstBuilder::new();
    let xs = b.var("xs", Meta::array(int32(), vec![3]), None);
    let x = b.id(xs);
    b.at(4, 9);
    let three = b.int(3);
    let elem = b.index(x, three);
    let far = b.int(2_000_000_000);
    let x = b.id(xs);
    let far_elem = b.index(x, far);

    let mut fx = Fixture::new(b.finish());
    fx.local(xs);

    let err = fx.lower(elem).unwrap_err();
    assert_eq!(err.to_string(), "4:9: index out of range: 3 is not below 3");

    let err = fx.lower(far_elem).unwrap_err();
    assert_eq!(
        err.kind(),
        Some(&DiagnosticKind::IndexOutOfRange {
            index: 2_000_000_000,
            size: 3
        })
    );
}

#[test]
fn test_overflowing_literal_offset_is_an_error() {
    let mut b = AstBuilder::new();
    let xs = b.var("xs", Meta::array(int32(), vec![u32::MAX]), None);
    let x = b.id(xs);
    let far = b.int(2_000_000_000);
    let elem = b.index(x, far);

    let mut fx = Fixture::new(b.finish());
    fx.local(xs);
    let err = fx.lower(elem).unwrap_err();

    assert!(err.is_fatal());
    assert!(err.to_string().contains("array offset overflows"));
}

#[test]
fn test_indexing_a_non_array_is_left_unresolved() {
    let mut b = AstBuilder::new();
    let s = b.var("s", Meta::new(BaseType::String), None);
    let s_ref = b.id(s);
    let one = b.int(1);
    let elem = b.index(s_ref, one);

    let mut fx = Fixture::new(b.finish());
    let sr = fx.local(s);
    fx.lower(elem).unwrap();

    assert_eq!(fx.kind(s_ref), ExprKind::Register(sr));
    assert_eq!(
        fx.kind(elem),
        ExprKind::Array {
            base: s_ref,
            index: one
        }
    );
}

#[test]
fn test_ternary_with_literal_condition_folds() {
    let mut b = AstBuilder::new();
    let x = b.var("x", int32(), None);
    let y = b.var("y", int32(), None);
    let cond = b.boolean(false);
    let x_ref = b.id(x);
    let y_ref = b.id(y);
    let folded = b.ternary(cond, x_ref, y_ref);
    let flag = b.var("flag", Meta::new(BaseType::Bool), None);
    let cond = b.id(flag);
    let x_ref = b.id(x);
    let y_ref = b.id(y);
    let kept = b.ternary(cond, x_ref, y_ref);

    let mut fx = Fixture::new(b.finish());
    fx.local(x);
    let yr = fx.local(y);
    fx.local(flag);
    fx.lower(folded).unwrap();
    fx.lower(kept).unwrap();

    assert_eq!(fx.kind(folded), ExprKind::Register(yr));
    assert!(matches!(fx.kind(kept), ExprKind::Ternary { .. }));
}

fn returning(ret: Meta) -> (Fixture, ExprId, ExprId) {
    let mut b = AstBuilder::new();
    let (_, cblk) = b.contract("C");
    let ret = if ret.is_void() { vec![] } else { vec![ret] };
    let (make, _) = b.function(cblk, "make", vec![], ret);
    let callee = b.id(make);
    let call = b.call(callee, vec![]);
    (Fixture::new(b.finish()), call, callee)
}

#[test]
fn test_struct_call_result_is_copied_per_field() {
    let pair = Meta::structure(
        "pair",
        vec![Meta::new(BaseType::Int64), Meta::array(int32(), vec![2])],
    );
    let (mut fx, call, callee) = returning(pair.clone());
    fx.lower(call).unwrap();

    let stack = fx.func.stack_idx;
    assert_eq!(fx.kind(call), mem(stack, 0, 0));
    assert_eq!(fx.ast.expr(call).meta, pair);
    assert_eq!(fx.func.stack_usage, 16);
    assert_eq!(fx.kind(callee), ExprKind::Register(0));

    let tmp = fx.func.registers.len() as u32 - 1;
    assert_eq!(fx.func.register(tmp).unwrap().name, CALL_RESULT_NAME);

    let stmts = fx.stmts();
    assert_eq!(stmts.len(), 4);
    let (lhs, rhs) = fx.assign(stmts[0]);
    assert_eq!(lhs, ExprKind::Register(tmp));
    let ExprKind::Call { args, .. } = rhs else {
        panic!("expected the call itself");
    };
    assert_eq!(args.len(), 1);
    assert_eq!(fx.kind(args[0]), ExprKind::Register(0));

    let copies: Vec<_> = stmts[1..].iter().map(|&s| fx.assign(s)).collect();
    assert_eq!(
        copies,
        vec![
            (mem(stack, 0, 0), mem(tmp, 0, 0)),
            (mem(stack, 0, 8), mem(tmp, 0, 8)),
            (mem(stack, 0, 12), mem(tmp, 0, 12)),
        ]
    );
}

#[test]
fn test_array_call_result_copies_every_element() {
    let (mut fx, call, _) = returning(Meta::array(int32(), vec![2, 3]));
    fx.lower(call).unwrap();

    let stmts = fx.stmts();
    assert_eq!(stmts.len(), 7);

    let offsets: Vec<_> = stmts[1..]
        .iter()
        .map(|&s| match fx.assign(s).0 {
            ExprKind::Memory(m) => m.offset,
            other => panic!("unexpected copy target {:?}", other),
        })
        .collect();
    assert_eq!(offsets, vec![0, 4, 8, 12, 16, 20]);
    assert_eq!(fx.func.stack_usage, 24);
}

#[test]
fn test_scalar_call_result_lands_in_a_register() {
    let (mut fx, call, _) = returning(Meta::new(BaseType::Bool));
    fx.lower(call).unwrap();

    let tmp = fx.func.registers.len() as u32 - 1;
    assert_eq!(fx.kind(call), ExprKind::Register(tmp));
    assert_eq!(fx.stmts().len(), 1);
    assert_eq!(fx.func.stack_usage, 0);
}

#[test]
fn test_call_adjusts_the_stack_pointer_past_the_frame() {
    let (mut fx, call, _) = returning(Meta::void());
    fx.func.alloc(&Meta::array(int32(), vec![3]));
    fx.lower(call).unwrap();

    let stmts = fx.stmts();
    assert_eq!(stmts.len(), 2);

    let (lhs, rhs) = fx.assign(stmts[0]);
    assert_eq!(lhs, ExprKind::Global("stack$offset".to_string()));
    let ExprKind::Binary {
        op: BinaryOp::Sub,
        lhs: base,
        rhs: size,
    } = rhs
    else {
        panic!("expected the frame subtraction");
    };
    assert_eq!(fx.kind(base), ExprKind::Register(fx.func.stack_idx));
    assert_eq!(fx.kind(size), ExprKind::Lit(Value::Int(16)));

    assert_eq!(fx.ast.stmt(stmts[1]).kind, StmtKind::Exp(call));
    assert!(matches!(fx.kind(call), ExprKind::Call { .. }));
}

#[test]
fn test_method_call_passes_the_qualifier_as_receiver() {
    let mut b = AstBuilder::new();
    let (_, cblk) = b.contract("Bank");
    let peer = b.global(cblk, "peer", Meta::new(BaseType::Account).named("Bank"));
    let (ping, _) = b.function(cblk, "ping", vec![("n", int32())], vec![]);
    let qual = b.id(peer);
    let callee = b.method(qual, ping);
    let n = b.int(3);
    let call = b.call(callee, vec![n]);

    let mut fx = Fixture::new(b.finish());
    fx.ast.ident_mut(peer).addr = Some(4);
    fx.lower(call).unwrap();

    let ExprKind::Call { args, .. } = fx.kind(call) else {
        panic!("void call should stay a call");
    };
    assert_eq!(args, vec![qual, n]);
    assert_eq!(fx.kind(qual), mem(0, 4, 0));
    assert_eq!(fx.kind(callee), ExprKind::Register(0));
    assert_eq!(fx.ast.expr(callee).meta, Meta::new(BaseType::Uint32));
}

#[test]
fn test_constructor_and_system_calls_take_no_receiver() {
    let mut b = AstBuilder::new();
    let (_, cblk) = b.contract("C");
    let (ctor, _) = b.constructor(cblk, "C", vec![("v", int32())]);
    let callee = b.id(ctor);
    let v = b.int(1);
    let ctor_call = b.call(callee, vec![v]);
    let sys = b.name("system.now");
    let sys_call = b.call(sys, vec![]);

    let mut fx = Fixture::new(b.finish());
    fx.ast.expr_mut(sys_call).meta = Meta::new(BaseType::Uint64);
    fx.lower(ctor_call).unwrap();
    fx.lower(sys_call).unwrap();

    let ExprKind::Call { args, .. } = fx.kind(ctor_call) else {
        panic!("constructor call should stay a call");
    };
    assert_eq!(args, vec![v]);

    assert_eq!(fx.kind(sys), ExprKind::Id("system.now".to_string()));
    let tmp = fx.func.registers.len() as u32 - 1;
    assert_eq!(fx.kind(sys_call), ExprKind::Register(tmp));
}

#[test]
fn test_literal_initializers_are_packed_and_shared() {
    let mut b = AstBuilder::new();
    let shape = Meta::array(int32(), vec![3]);
    let elems = (1..=3).map(|v| b.int(v)).collect();
    let first = b.init(elems, shape.clone());
    let elems = (1..=3).map(|v| b.int(v)).collect();
    let second = b.init(elems, shape);

    let mut fx = Fixture::new(b.finish());
    fx.lower(first).unwrap();
    fx.lower(second).unwrap();

    assert_eq!(fx.kind(first), ExprKind::Lit(Value::Addr(0)));
    assert_eq!(fx.kind(second), ExprKind::Lit(Value::Addr(0)));
    assert_eq!(fx.segment.len(), 1);
    assert_eq!(
        fx.segment.lookup(0).unwrap(),
        &[1u8, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0]
    );
    assert_eq!(fx.func.stack_usage, 0);
}

#[test]
fn test_nested_literal_initializer_is_one_blob() {
    let mut b = AstBuilder::new();
    let row = Meta::array(int32(), vec![2]);
    let elems = vec![b.int(1), b.int(2)];
    let top = b.init(elems, row.clone());
    let elems = vec![b.int(3), b.int(4)];
    let bottom = b.init(elems, row);
    let grid = b.init(vec![top, bottom], Meta::array(int32(), vec![2, 2]));

    let mut fx = Fixture::new(b.finish());
    fx.lower(grid).unwrap();

    assert_eq!(fx.kind(grid), ExprKind::Lit(Value::Addr(0)));
    assert_eq!(fx.segment.len(), 1);
    assert_eq!(
        fx.segment.lookup(0).unwrap(),
        &[1u8, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0, 4, 0, 0, 0]
    );
}

#[test]
fn test_initializer_with_variables_gets_a_frame_slot() {
    let mut b = AstBuilder::new();
    let x = b.var("x", int32(), None);
    let x_ref = b.id(x);
    let two = b.int(2);
    let init = b.init(vec![x_ref, two], Meta::array(int32(), vec![2]));

    let mut fx = Fixture::new(b.finish());
    let xr = fx.local(x);
    fx.lower(init).unwrap();

    let stack = fx.func.stack_idx;
    assert_eq!(
        fx.kind(init),
        ExprKind::Init {
            elems: vec![x_ref, two],
            slot: Some(MemRef::new(stack, 0, 0)),
        }
    );
    assert_eq!(fx.kind(x_ref), ExprKind::Register(xr));
    assert_eq!(fx.func.stack_usage, 8);
    assert!(fx.segment.is_empty());
}

#[test]
fn test_string_operations_are_tagged() {
    let mut b = AstBuilder::new();
    let n = b.var("n", int32(), None);
    let n_ref = b.id(n);
    let text = b.cast(n_ref, Meta::new(BaseType::String));
    let prefix = b.string("id:");
    let joined = b.binary(BinaryOp::Add, prefix, text);

    let mut fx = Fixture::new(b.finish());
    fx.local(n);
    fx.lower(joined).unwrap();

    assert_eq!(fx.ast.expr(text).helper, Some(Helper::StringConvert));
    assert_eq!(fx.ast.expr(joined).helper, Some(Helper::StringConcat));
    assert_eq!(fx.kind(prefix), ExprKind::Lit(Value::Addr(0)));
    assert_eq!(fx.segment.lookup(0).unwrap(), b"id:\0");
}

#[test]
fn test_located_expressions_are_left_alone() {
    let mut b = AstBuilder::new();
    let x = b.var("x", int32(), None);
    let x_ref = b.id(x);

    let mut fx = Fixture::new(b.finish());
    let xr = fx.local(x);
    fx.lower(x_ref).unwrap();
    fx.lower(x_ref).unwrap();

    assert_eq!(fx.kind(x_ref), ExprKind::Register(xr));
    assert!(fx.stmts().is_empty());
}
