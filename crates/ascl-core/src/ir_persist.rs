use crate::module::LoweredModule;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

pub fn save_module(module: &LoweredModule, path: impl AsRef<Path>) -> io::Result<()> {
    let json = serde_json::to_string_pretty(module)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    fs::write(path, json)?;
    Ok(())
}

pub fn load_module(path: impl AsRef<Path>) -> io::Result<LoweredModule> {
    let json = fs::read_to_string(path)?;
    let module =
        serde_json::from_str(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    Ok(module)
}

/// Flat per-function summary, handy for diffing two builds of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub functions: Vec<FunctionSummary>,
    pub segment_entries: usize,
    pub segment_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSummary {
    pub name: String,
    pub registers: usize,
    pub blocks: usize,
    pub stmts: usize,
    pub stack_usage: u32,
    pub heap_usage: u32,
}

pub fn summarize_module(module: &LoweredModule) -> ModuleSummary {
    let functions = module
        .functions
        .iter()
        .map(|func| FunctionSummary {
            name: func.name.clone(),
            registers: func.registers.len(),
            blocks: func.blocks.len(),
            stmts: func.stmt_count(),
            stack_usage: func.stack_usage,
            heap_usage: func.heap_usage,
        })
        .collect();

    ModuleSummary {
        functions,
        segment_entries: module.segment.len(),
        segment_size: module.segment.size(),
    }
}

pub fn save_summary(module: &LoweredModule, path: impl AsRef<Path>) -> io::Result<()> {
    let json = serde_json::to_string_pretty(&summarize_module(module))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::IdentId;
    use crate::function::IrFn;
    use crate::types::Meta;
    use tempfile::NamedTempFile;

    #[test]
    fn test_save_load_module() {
        let mut module = LoweredModule::default();
        module.segment.add_blob(b"persisted\0");
        module
            .functions
            .push(IrFn::new("run", IdentId(0), Meta::void(), Vec::new()));

        let temp_file = NamedTempFile::new().unwrap();
        save_module(&module, temp_file.path()).unwrap();

        let loaded = load_module(temp_file.path()).unwrap();
        assert_eq!(loaded, module);
        assert_eq!(summarize_module(&loaded).functions[0].registers, 3);
    }
}
