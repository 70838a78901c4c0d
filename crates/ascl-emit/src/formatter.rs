use ascl_core::{
    Ast, BasicBlockId, BinaryOp, ExprId, ExprKind, Helper, IrFn, MemRef, StmtId, StmtKind,
    Terminator,
};

/// Renders lowered tree nodes as single lines of text.
pub struct IrFormatter<'a> {
    ast: &'a Ast,
}

impl<'a> IrFormatter<'a> {
    pub fn new(ast: &'a Ast) -> Self {
        Self { ast }
    }

    pub fn expr(&self, id: ExprId) -> String {
        let expr = self.ast.expr(id);

        match &expr.kind {
            ExprKind::Null => "null".to_string(),
            ExprKind::Lit(value) => value.to_string(),
            ExprKind::Id(name) => name.clone(),
            ExprKind::Array { base, index } => {
                format!("{}[{}]", self.operand(*base), self.expr(*index))
            }
            ExprKind::Cast { operand, to } => match expr.helper {
                Some(Helper::StringConvert) => format!("str_convert({})", self.expr(*operand)),
                _ => format!("({}) {}", to, self.operand(*operand)),
            },
            ExprKind::Unary {
                op,
                operand,
                prefix: true,
            } => format!("{}{}", op.symbol(), self.operand(*operand)),
            ExprKind::Unary { op, operand, .. } => {
                format!("{}{}", self.operand(*operand), op.symbol())
            }
            ExprKind::Binary { lhs, rhs, .. } if expr.helper == Some(Helper::StringConcat) => {
                format!("str_concat({}, {})", self.expr(*lhs), self.expr(*rhs))
            }
            ExprKind::Binary {
                op: BinaryOp::Assign,
                lhs,
                rhs,
            } => format!("{} = {}", self.expr(*lhs), self.expr(*rhs)),
            ExprKind::Binary { op, lhs, rhs } => format!(
                "{} {} {}",
                self.operand(*lhs),
                op.symbol(),
                self.operand(*rhs)
            ),
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => format!(
                "{} ? {} : {}",
                self.operand(*cond),
                self.operand(*then),
                self.operand(*otherwise)
            ),
            ExprKind::Access { qual, field } => format!("{}.{}", self.operand(*qual), field),
            ExprKind::Call { callee, args } => {
                format!("call {}({})", self.expr(*callee), self.list(args))
            }
            ExprKind::Tuple(elems) => format!("({})", self.list(elems)),
            ExprKind::Init { elems, slot } => match slot {
                Some(mem) => format!("{{{}}} in {}", self.list(elems), self.memref(mem)),
                None => format!("{{{}}}", self.list(elems)),
            },
            ExprKind::Alloc { slot } => match slot {
                Some(mem) => format!("alloc {} in {}", expr.meta, self.memref(mem)),
                None => format!("alloc {}", expr.meta),
            },
            ExprKind::Global(name) => format!("${}", name),
            ExprKind::Register(idx) => format!("r{}", idx),
            ExprKind::Memory(mem) => self.memref(mem),
        }
    }

    /// Like `expr`, with compound expressions parenthesized.
    fn operand(&self, id: ExprId) -> String {
        match self.ast.expr(id).kind {
            ExprKind::Binary { .. } | ExprKind::Ternary { .. }
                if self.ast.expr(id).helper.is_none() =>
            {
                format!("({})", self.expr(id))
            }
            _ => self.expr(id),
        }
    }

    fn list(&self, ids: &[ExprId]) -> String {
        ids.iter()
            .map(|&id| self.expr(id))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Memory operand with dynamic terms spelled out as the index expressions
    /// they scale.
    pub fn memref(&self, mem: &MemRef) -> String {
        let mut text = format!("mem[r{} + {} + {}", mem.base, mem.addr, mem.offset);
        for term in &mem.dynamic {
            text.push_str(&format!(" + {}*{}", self.operand(term.index), term.stride));
        }
        text.push(']');
        text
    }

    pub fn stmt(&self, id: StmtId) -> String {
        match &self.ast.stmt(id).kind {
            StmtKind::Assign { lhs, rhs } => format!("{} = {}", self.expr(*lhs), self.expr(*rhs)),
            StmtKind::Exp(e) => self.expr(*e),
            StmtKind::Null => "nop".to_string(),
            StmtKind::Goto(label) => format!("goto {}", label),
            StmtKind::Return(Some(e)) => format!("return {}", self.expr(*e)),
            StmtKind::Return(None) => "return".to_string(),
            StmtKind::Break => "break".to_string(),
            StmtKind::Continue => "continue".to_string(),
            StmtKind::Block(blk) => format!("block {}", blk),
            other => format!("<{}>", stmt_kind_name(other)),
        }
    }

    pub fn terminator(&self, func: &IrFn, term: &Terminator) -> String {
        match term {
            Terminator::Fallthrough => "fallthrough".to_string(),
            Terminator::Jump(target) => format!("jump {}", block_name(func, *target)),
            Terminator::Branch {
                cond,
                then_bb,
                else_bb,
            } => format!(
                "br {}, {}, {}",
                self.expr(*cond),
                block_name(func, *then_bb),
                block_name(func, *else_bb)
            ),
            Terminator::Return(Some(value)) => format!("ret {}", self.expr(*value)),
            Terminator::Return(None) => "ret".to_string(),
        }
    }
}

/// Label of a labeled block, otherwise its id.
pub fn block_name(func: &IrFn, id: BasicBlockId) -> String {
    match func.blocks.get(id.0 as usize).and_then(|b| b.label.as_deref()) {
        Some(label) => label.to_string(),
        None => id.to_string(),
    }
}

fn stmt_kind_name(kind: &StmtKind) -> &'static str {
    match kind {
        StmtKind::If { .. } => "if",
        StmtKind::For { .. } => "for",
        StmtKind::Each { .. } => "each",
        StmtKind::Switch { .. } => "switch",
        StmtKind::Case { .. } => "case",
        _ => "stmt",
    }
}
