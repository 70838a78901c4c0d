use ascl_core::{AstBuilder, BaseType, BinaryOp, CompileOptions, Meta, SysLib};
use ascl_emit::{EmitterConfig, Emitter, TextEmitter};
use ascl_transform::compile;
use pretty_assertions::assert_eq;

fn ledger() -> ascl_core::LoweredModule {
    let mut b = AstBuilder::new();
    let (_, cblk) = b.contract("Ledger");
    let total = b.global(cblk, "total", Meta::new(BaseType::Int64));
    b.global(cblk, "ready", Meta::new(BaseType::Bool));

    let (_, body) = b.function(cblk, "name", vec![], vec![Meta::new(BaseType::String)]);
    let text = b.string("ledger");
    let stmt = b.ret(Some(text));
    b.push(body, stmt);

    let (_, body) = b.function(
        cblk,
        "add",
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

    compile(b.finish(), SysLib::new(), CompileOptions::default()).unwrap()
}

#[test]
fn test_module_text() {
    let module = ledger();
    let text = TextEmitter::new(EmitterConfig::plain())
        .emit_to_string(&module)
        .unwrap();

    assert!(text.starts_with("data[7] {\n    @0: 6c656467657200\n}\n\n"));
    assert!(text.contains("function name() -> string {\n"));
    assert!(text.contains("    bb0:\n        ret @0\n"));
    assert!(text.contains("function add(amount: int64) {\n"));
    assert!(text.contains("        r1 amount: int64\n"));
    assert!(text.contains("        mem[r0 + 0 + 0] = mem[r0 + 0 + 0] + 1\n"));
}

#[test]
fn test_segment_can_be_left_out() {
    let module = ledger();
    let emitter = TextEmitter::new(EmitterConfig {
        include_segment: false,
        ..EmitterConfig::plain()
    });
    let text = emitter.emit_to_string(&module).unwrap();

    assert!(text.starts_with("function name()"));
    assert_eq!(text.matches("function ").count(), 2);
}

#[test]
fn test_config_from_json_drives_indentation() {
    let config =
        EmitterConfig::from_json(r#"{"use_colors": false, "indent_style": "Tabs"}"#).unwrap();
    let text = TextEmitter::new(config).emit_to_string(&ledger()).unwrap();

    assert!(text.contains("\tbb0:\n\t\tret @0\n"));
}
