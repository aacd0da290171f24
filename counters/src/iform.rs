//! Instruction form identity.
//!
//! An instruction form is an opcode plus the [`OperandClass`] of each operand.
//! `VADDPD 7(SI)(DI*8), Z2, K1, Z3` and `VADDPD -15(R14), Z5, K2, Z9` are the
//! same form, `VADDPD mem, reg, reg, reg`.
//!
//! [`OperandClass`]: crate::operand::OperandClass

use std::fmt;

use serde::Serialize;

use crate::fixture::InstructionRecord;
use crate::span::Span;

/// Normalized instruction form, e.g. `VPGATHERDD vmem, reg, reg`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Iform(String);

impl Iform {
    /// Normalizes one instruction.
    #[must_use]
    pub fn of(record: &InstructionRecord) -> Self {
        let mut form = record.op.clone();
        for (i, class) in record.operand_classes().enumerate() {
            form.push_str(if i == 0 { " " } else { ", " });
            form.push_str(class.as_str());
        }
        Self(form)
    }

    /// Rendered form text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Iform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Aggregation key: one statistics record exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IformKey {
    /// Extension name.
    pub extension: String,
    /// Instruction form.
    pub iform: Iform,
}

/// Distinct forms exercised by a span, in order of first appearance.
#[must_use]
pub fn span_iforms(span: &Span) -> Vec<Iform> {
    let mut forms: Vec<Iform> = Vec::new();
    for record in &span.records {
        let form = Iform::of(record);
        if !forms.contains(&form) {
            forms.push(form);
        }
    }
    forms
}
