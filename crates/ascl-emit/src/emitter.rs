use crate::config::EmitterConfig;
use anyhow::Result;
use colored::{Color, Colorize};
use std::io::Write;

pub type EmitResult = Result<()>;

/// What a printed line shows. Decides its color when colors are on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRole {
    Plain,
    Label,
    Terminator,
    Comment,
}

impl LineRole {
    fn color(self) -> Option<Color> {
        match self {
            LineRole::Plain => None,
            LineRole::Label => Some(Color::Cyan),
            LineRole::Terminator => Some(Color::Yellow),
            LineRole::Comment => Some(Color::Green),
        }
    }
}

/// Nesting depth and styling shared by every line of one emission.
#[derive(Debug, Clone)]
pub struct EmitContext {
    depth: usize,
    indent_unit: String,
    use_colors: bool,
}

impl EmitContext {
    pub fn from_config(config: &EmitterConfig) -> Self {
        Self {
            depth: 0,
            indent_unit: config.indent_style.unit(),
            use_colors: config.use_colors,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn write<W: Write>(&self, writer: &mut W, role: LineRole, text: &str) -> EmitResult {
        let indent = self.indent_unit.repeat(self.depth);
        match role.color().filter(|_| self.use_colors) {
            Some(color) => writeln!(writer, "{}{}", indent, text.color(color))?,
            None => writeln!(writer, "{}{}", indent, text)?,
        }
        Ok(())
    }

    pub fn line<W: Write>(&self, writer: &mut W, text: &str) -> EmitResult {
        self.write(writer, LineRole::Plain, text)
    }

    pub fn comment<W: Write>(&self, writer: &mut W, text: &str) -> EmitResult {
        self.write(writer, LineRole::Comment, &format!("// {}", text))
    }

    /// Runs `body` one level deeper. The depth is restored even when the
    /// body fails.
    pub fn nest<W: Write, F>(&mut self, writer: &mut W, body: F) -> EmitResult
    where
        F: FnOnce(&mut W, &mut EmitContext) -> EmitResult,
    {
        self.depth += 1;
        let out = body(writer, self);
        self.depth -= 1;
        out
    }

    /// `header {`, the nested body, then `}`.
    pub fn block<W: Write, F>(&mut self, writer: &mut W, header: &str, body: F) -> EmitResult
    where
        F: FnOnce(&mut W, &mut EmitContext) -> EmitResult,
    {
        self.line(writer, &format!("{} {{", header))?;
        self.nest(writer, body)?;
        self.line(writer, "}")
    }
}

impl Default for EmitContext {
    fn default() -> Self {
        Self::from_config(&EmitterConfig::default())
    }
}

pub trait Emitter {
    type Item;

    fn emit<W: Write>(
        &self,
        item: &Self::Item,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult;

    /// Context a fresh emission starts from.
    fn context(&self) -> EmitContext {
        EmitContext::default()
    }

    fn emit_to_string(&self, item: &Self::Item) -> Result<String> {
        let mut buffer = Vec::new();
        let mut context = self.context();
        self.emit(item, &mut buffer, &mut context)?;
        Ok(String::from_utf8(buffer)?)
    }
}
