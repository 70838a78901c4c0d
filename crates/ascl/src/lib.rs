/*! Unified interface for the ASCL compiler middle stage.
 *
 * One import for the whole path from a parsed contract tree to lowered functions: the shared data
 * structures, the checking and lowering pipeline, and the text emitter for inspecting the result.
 */

pub use ascl_core as core;
pub use ascl_emit as emit;
pub use ascl_transform as transform;

pub use ascl_core::{
    ir_persist::{load_module, save_module, summarize_module},
    Ast, AstBuilder, BasicBlock, BasicBlockId, CompileError, CompileOptions, DataSegment,
    Diagnostic, DiagnosticKind, IrFn, Location, LoweredModule, MemRef, Meta, SysLib, Terminator,
    Value,
};
pub use ascl_emit::{EmitterConfig, Emitter, TextEmitter};
pub use ascl_transform::{compile, TransformationPipeline};

use tracing::info;

/// Compiles `ast` with the default options.
pub fn compile_module(ast: Ast, syslib: SysLib) -> anyhow::Result<LoweredModule> {
    let module = compile(ast, syslib, CompileOptions::default())?;
    info!(
        functions = module.functions.len(),
        segment_size = module.segment.size(),
        "module lowered"
    );
    Ok(module)
}

/// Renders `module` as uncolored text.
pub fn emit_module(module: &LoweredModule) -> anyhow::Result<String> {
    TextEmitter::new(EmitterConfig::plain()).emit_to_string(module)
}
