use crate::types::BaseType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Module prefix of every system function name.
pub const SYSLIB_MODULE: &str = "system";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SysFn {
    pub name: String,
    pub params: Vec<BaseType>,
    pub result: BaseType,
}

impl SysFn {
    /// Name as written in source, e.g. `system.print`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", SYSLIB_MODULE, self.name)
    }
}

/// Read-only table of runtime-provided functions, keyed by qualified name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SysLib {
    fns: IndexMap<String, SysFn>,
}

impl SysLib {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, params: Vec<BaseType>, result: BaseType) {
        let func = SysFn {
            name: name.into(),
            params,
            result,
        };
        self.fns.insert(func.qualified_name(), func);
    }

    pub fn lookup(&self, qualified_name: &str) -> Option<&SysFn> {
        self.fns.get(qualified_name)
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.fns.contains_key(qualified_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SysFn> {
        self.fns.values()
    }

    pub fn len(&self) -> usize {
        self.fns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fns.is_empty()
    }
}
