use serde::{Deserialize, Serialize};

/// Knobs of the lowering passes. Missing JSON fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Global the callee reads its frame position from.
    pub stack_offset_symbol: String,
    /// Alignment of the caller frame size when the stack pointer is adjusted.
    pub frame_align: u32,
    /// Lower returned values with heap allocation so aggregates outlive the frame.
    pub heap_return_values: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            stack_offset_symbol: "stack$offset".to_string(),
            frame_align: 8,
            heap_return_values: true,
        }
    }
}

impl CompileOptions {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options = CompileOptions::from_json(r#"{ "frame_align": 16 }"#).unwrap();

        assert_eq!(options.frame_align, 16);
        assert_eq!(options.stack_offset_symbol, "stack$offset");
        assert!(options.heap_return_values);
    }
}
