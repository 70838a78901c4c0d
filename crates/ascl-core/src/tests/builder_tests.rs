use crate::ast::{BinaryOp, ExprKind, IdentKind, Scope, StmtKind};
use crate::builder::AstBuilder;
use crate::types::{BaseType, Meta};
use pretty_assertions::assert_eq;

#[test]
fn test_contract_declarations() {
    let mut b = AstBuilder::new();
    let (cont, cblk) = b.contract("Wallet");
    let balance = b.global(cblk, "balance", Meta::new(BaseType::Int64));
    let (func, body) = b.function(
        cblk,
        "deposit",
        vec![("amount", Meta::new(BaseType::Int64))],
        vec![Meta::new(BaseType::Bool)],
    );
    let ast = b.finish();

    assert_eq!(ast.contracts, vec![cont]);
    assert_eq!(ast.block(cblk).ids, vec![balance, func]);
    assert_eq!(ast.block(body).up, Some(cblk));
    assert_eq!(ast.ident(balance).scope, Scope::Global);

    let decl = ast.ident(func).func().unwrap();
    assert_eq!(decl.params.len(), 1);
    assert_eq!(ast.ident(decl.params[0]).scope, Scope::Param);
    assert_eq!(ast.ident(func).meta, Meta::new(BaseType::Bool));
    assert!(matches!(ast.ident(cont).kind, IdentKind::Contract { .. }));
}

#[test]
fn test_expression_shapes() {
    let mut b = AstBuilder::new();
    let (_, cblk) = b.contract("C");
    let (_, body) = b.function(cblk, "f", vec![], vec![]);
    let grid = b.local(
        body,
        "grid",
        Meta::array(Meta::new(BaseType::Int32), vec![2, 3]),
        None,
    );

    let g = b.id(grid);
    let one = b.int(1);
    let row = b.index(g, one);
    let two = b.int(2);
    let cell = b.index(row, two);
    let zero = b.int(0);
    let cmp = b.binary(BinaryOp::Lt, cell, zero);
    let ast = b.finish();

    assert_eq!(ast.expr(row).meta.dims, vec![3]);
    assert_eq!(ast.expr(cell).meta, Meta::new(BaseType::Int32));
    assert!(ast.expr(cmp).meta.is_bool());
}

#[test]
fn test_labels_and_positions() {
    let mut b = AstBuilder::new();
    b.at(4, 2);
    let null = b.null_stmt();
    b.label(null, "retry");
    let jump = b.goto("retry");
    let ast = b.finish();

    assert_eq!(ast.stmt_label(null), Some("retry"));
    assert_eq!(ast.stmt(jump).kind, StmtKind::Goto("retry".to_string()));
    assert_eq!(ast.stmt(jump).pos.to_string(), "4:2");
}

#[test]
fn test_field_access_takes_element_shape() {
    let point = Meta::structure(
        "point",
        vec![
            Meta::new(BaseType::Int32).named("x"),
            Meta::new(BaseType::Int64).named("y"),
        ],
    );

    let mut b = AstBuilder::new();
    let (_, cblk) = b.contract("C");
    let p = b.global(cblk, "p", point);
    let pe = b.id(p);
    let y = b.field(pe, "y", 1);
    let ast = b.finish();

    assert_eq!(ast.expr(y).meta.offset, 8);
    assert!(matches!(ast.expr(y).kind, ExprKind::Access { .. }));
}
