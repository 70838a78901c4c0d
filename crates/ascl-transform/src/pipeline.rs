/*! Module-level pass pipeline.
 *
 * A compilation unit goes through global layout, checking, then per-function translation. Each pass
 * states what it needs from the passes before it, so custom pipelines fail early when misordered.
 */

use crate::check::check_module;
use crate::translate::translate_function;
use anyhow::{bail, Context, Result};
use ascl_core::{
    align_to, Ast, CompileOptions, DataSegment, IdentKind, IrFn, LoweredModule, Scope, SysLib,
};
use tracing::debug;

/// State shared by the passes of one compilation.
#[derive(Debug, Default)]
pub struct CompileUnit {
    pub ast: Ast,
    pub syslib: SysLib,
    pub options: CompileOptions,
    pub segment: DataSegment,
    pub functions: Vec<IrFn>,
    pub laid_out: bool,
    pub checked: bool,
}

impl CompileUnit {
    pub fn new(ast: Ast, syslib: SysLib, options: CompileOptions) -> Self {
        Self {
            ast,
            syslib,
            options,
            ..Default::default()
        }
    }

    pub fn into_module(self) -> LoweredModule {
        LoweredModule::new(self.ast, self.functions, self.segment)
    }
}

pub trait Pass {
    fn name(&self) -> &str;

    fn run(&mut self, unit: &mut CompileUnit) -> Result<()>;

    fn check_prerequisites(&self, _unit: &CompileUnit) -> Result<()> {
        Ok(())
    }
}

/// Assigns every contract global an aligned address inside the contract
/// instance, in declaration order.
#[derive(Debug, Default)]
pub struct LayoutPass;

impl Pass for LayoutPass {
    fn name(&self) -> &str {
        "layout"
    }

    fn run(&mut self, unit: &mut CompileUnit) -> Result<()> {
        let ast = &mut unit.ast;

        for contract in ast.contracts.clone() {
            let IdentKind::Contract { blk } = ast.ident(contract).kind else {
                bail!("'{}' is not a contract", ast.ident(contract).name);
            };

            let mut offset = 0;
            for id in ast.block(blk).ids.clone() {
                let ident = ast.ident_mut(id);
                if !ident.is_var() || ident.scope != Scope::Global {
                    continue;
                }
                let addr = align_to(offset, ident.meta.align.max(1));
                ident.addr = Some(addr);
                offset = addr + ident.meta.size();
            }

            debug!(contract = %ast.ident(contract).name, size = offset, "laid out globals");
        }

        unit.laid_out = true;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct CheckPass;

impl Pass for CheckPass {
    fn name(&self) -> &str {
        "check"
    }

    fn run(&mut self, unit: &mut CompileUnit) -> Result<()> {
        check_module(&mut unit.ast, &unit.syslib)?;
        unit.checked = true;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct TranslatePass;

impl Pass for TranslatePass {
    fn name(&self) -> &str {
        "translate"
    }

    fn check_prerequisites(&self, unit: &CompileUnit) -> Result<()> {
        if !unit.laid_out {
            bail!("globals have not been laid out");
        }
        if !unit.checked {
            bail!("the tree has not been checked");
        }
        Ok(())
    }

    fn run(&mut self, unit: &mut CompileUnit) -> Result<()> {
        for contract in unit.ast.contracts.clone() {
            let IdentKind::Contract { blk } = unit.ast.ident(contract).kind else {
                bail!("'{}' is not a contract", unit.ast.ident(contract).name);
            };

            for id in unit.ast.block(blk).ids.clone() {
                if unit.ast.ident(id).func().is_none() {
                    continue;
                }
                let func = translate_function(&mut unit.ast, &mut unit.segment, &unit.options, id)
                    .with_context(|| format!("translating '{}'", unit.ast.ident(id).name))?;
                unit.functions.push(func);
            }
        }
        Ok(())
    }
}

pub struct TransformationPipeline {
    passes: Vec<Box<dyn Pass>>,
}

impl Default for TransformationPipeline {
    fn default() -> Self {
        Self {
            passes: vec![
                Box::new(LayoutPass),
                Box::new(CheckPass),
                Box::new(TranslatePass),
            ],
        }
    }
}

impl TransformationPipeline {
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    pub fn with_pass(mut self, pass: Box<dyn Pass>) -> Self {
        self.passes.push(pass);
        self
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn run(&mut self, unit: &mut CompileUnit) -> Result<()> {
        for pass in &mut self.passes {
            pass.check_prerequisites(unit)
                .with_context(|| format!("pass '{}' cannot run", pass.name()))?;

            debug!(pass = pass.name(), "running pass");
            pass.run(unit)
                .with_context(|| format!("pass '{}' failed", pass.name()))?;
        }
        Ok(())
    }
}

/// Runs the standard pipeline over `ast` and returns the lowered module.
pub fn compile(ast: Ast, syslib: SysLib, options: CompileOptions) -> Result<LoweredModule> {
    let mut unit = CompileUnit::new(ast, syslib, options);
    TransformationPipeline::default().run(&mut unit)?;
    Ok(unit.into_module())
}
