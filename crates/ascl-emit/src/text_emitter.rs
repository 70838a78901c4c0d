use crate::config::EmitterConfig;
use crate::emitter::{EmitContext, EmitResult, Emitter, LineRole};
use crate::formatter::{block_name, IrFormatter};
use ascl_core::{AllocMode, BasicBlock, DataSegment, IrFn, LoweredModule};
use std::io::Write;

fn format_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
}

/// Prints a lowered module: the data segment, then every function with its
/// register table and basic blocks.
pub struct TextEmitter {
    config: EmitterConfig,
}

impl TextEmitter {
    pub fn new(config: EmitterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EmitterConfig {
        &self.config
    }

    fn emit_segment<W: Write>(
        &self,
        segment: &DataSegment,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult {
        let header = format!("data[{}]", segment.size());
        context.block(writer, &header, |w, c| {
            for entry in segment.entries() {
                c.line(w, &format!("@{}: {}", entry.addr, format_bytes(&entry.bytes)))?;
            }
            Ok(())
        })
    }

    fn emit_function<W: Write>(
        &self,
        module: &LoweredModule,
        func: &IrFn,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult {
        let params = func.registers[1..=func.param_count() as usize]
            .iter()
            .map(|r| format!("{}: {}", r.name, r.meta))
            .collect::<Vec<_>>()
            .join(", ");
        let mut header = format!("function {}({})", func.name, params);
        if !func.ret.is_void() {
            header.push_str(&format!(" -> {}", func.ret));
        }

        context.block(writer, &header, |w, c| {
            self.emit_registers(func, w, c)?;

            let mode = match func.alloc_mode {
                AllocMode::Stack => "stack",
                AllocMode::Heap => "heap",
            };
            c.comment(
                w,
                &format!(
                    "frame: stack {}, heap {}, mode {}",
                    func.stack_usage, func.heap_usage, mode
                ),
            )?;

            let formatter = IrFormatter::new(&module.ast);
            for block in &func.blocks {
                self.emit_block(&formatter, func, block, w, c)?;
            }
            Ok(())
        })
    }

    fn emit_registers<W: Write>(
        &self,
        func: &IrFn,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult {
        context.block(writer, "registers", |w, c| {
            for (idx, reg) in func.registers.iter().enumerate() {
                let line = if self.config.include_types {
                    format!("r{} {}: {}", idx, reg.name, reg.meta)
                } else {
                    format!("r{} {}", idx, reg.name)
                };
                c.line(w, &line)?;
            }
            Ok(())
        })
    }

    fn emit_block<W: Write>(
        &self,
        formatter: &IrFormatter<'_>,
        func: &IrFn,
        block: &BasicBlock,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult {
        let label = format!("{}:", block_name(func, block.id));
        context.write(writer, LineRole::Label, &label)?;

        context.nest(writer, |w, c| {
            for &stmt in &block.stmts {
                c.line(w, &formatter.stmt(stmt))?;
            }
            for &stmt in &block.piggybacks {
                c.comment(w, &format!("pending {}", formatter.stmt(stmt)))?;
            }
            let term = formatter.terminator(func, &block.terminator);
            c.write(w, LineRole::Terminator, &term)
        })
    }
}

impl Default for TextEmitter {
    fn default() -> Self {
        Self::new(EmitterConfig::default())
    }
}

impl Emitter for TextEmitter {
    type Item = LoweredModule;

    fn emit<W: Write>(
        &self,
        module: &LoweredModule,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult {
        let mut first = true;

        if self.config.include_segment && !module.segment.is_empty() {
            self.emit_segment(&module.segment, writer, context)?;
            first = false;
        }

        for func in &module.functions {
            if !first {
                writeln!(writer)?;
            }
            first = false;
            self.emit_function(module, func, writer, context)?;
        }

        Ok(())
    }

    fn context(&self) -> EmitContext {
        EmitContext::from_config(&self.config)
    }
}
