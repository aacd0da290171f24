//! Operand classification.
//!
//! Go assembler memory operands have the shape
//!
//! ```text
//! [disp](base)[(index*scale)]
//! ```
//!
//! where `disp` is an optional signed decimal integer and `scale` is one of
//! 1, 2, 4 or 8. A vector memory operand (VSIB addressing, used by gathers and
//! scatters) has a mandatory index taken from the X/Y/Z register file.
//!
//! Matching is unanchored: an operand is a memory operand if a memory
//! expression occurs anywhere inside it.

use std::fmt;

/// Addressing shape of a single instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperandClass {
    /// Register, immediate, mask or anything else without a memory expression.
    Plain,
    /// `[disp](base)[(index*scale)]` with a general purpose (or absent) index.
    Memory,
    /// `[disp](base)(Vn*scale)` where `V` is X, Y or Z.
    VectorMemory,
}

impl OperandClass {
    /// Short name used when rendering instruction forms.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "reg",
            Self::Memory => "mem",
            Self::VectorMemory => "vmem",
        }
    }
}

impl fmt::Display for OperandClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(index*scale)` suffix of a memory operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexExpr<'a> {
    /// Index register name, e.g. `R8` or `Z17`.
    pub register: &'a str,
    /// Scale factor: 1, 2, 4 or 8.
    pub scale: u8,
}

impl IndexExpr<'_> {
    /// Returns true if the index register belongs to the vector register file.
    #[must_use]
    pub fn is_vector(&self) -> bool {
        is_vector_register(self.register)
    }
}

/// A decoded memory expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryOperand<'a> {
    /// Signed displacement, zero when absent. Saturates on overflow.
    pub displacement: i64,
    /// Base register name, e.g. `AX` or `SP`.
    pub base: &'a str,
    /// Optional index expression.
    pub index: Option<IndexExpr<'a>>,
}

impl MemoryOperand<'_> {
    /// The class this memory expression gives its operand.
    #[must_use]
    pub fn class(&self) -> OperandClass {
        match self.index {
            Some(index) if index.is_vector() => OperandClass::VectorMemory,
            _ => OperandClass::Memory,
        }
    }
}

/// Classifies operand text.
///
/// ```
/// use avx512_counters::operand::{classify, OperandClass};
///
/// assert_eq!(classify("(AX)"), OperandClass::Memory);
/// assert_eq!(classify("8(AX)(X1*4)"), OperandClass::VectorMemory);
/// assert_eq!(classify("8(AX)(R1*4)"), OperandClass::Memory);
/// assert_eq!(classify("AX"), OperandClass::Plain);
/// ```
#[must_use]
pub fn classify(text: &str) -> OperandClass {
    match memory_operand(text) {
        Some(mem) => mem.class(),
        None => OperandClass::Plain,
    }
}

/// Finds the memory expression that determines the operand's class.
///
/// A vector memory expression anywhere in the text takes precedence over an
/// earlier plain memory expression; otherwise the leftmost match is returned.
#[must_use]
pub fn memory_operand(text: &str) -> Option<MemoryOperand<'_>> {
    let mut first = None;
    for start in 0..text.len() {
        if !text.is_char_boundary(start) {
            continue;
        }
        if let Some(mem) = match_at(text, start) {
            if mem.class() == OperandClass::VectorMemory {
                return Some(mem);
            }
            first.get_or_insert(mem);
        }
    }
    first
}

/// Returns true for `X<n>`, `Y<n>` and `Z<n>` register names.
#[must_use]
pub fn is_vector_register(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some('X' | 'Y' | 'Z'))
        && !chars.as_str().is_empty()
        && chars.all(|c| c.is_ascii_digit())
}

/// Byte cursor over operand text.
struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        &self.text[start..self.pos]
    }

    /// `-?\d+`, restoring the position when absent.
    fn displacement(&mut self) -> Option<i64> {
        let saved = self.pos;
        let negative = self.eat(b'-');
        let digits = self.take_while(|b| b.is_ascii_digit());
        if digits.is_empty() {
            self.pos = saved;
            return None;
        }
        let magnitude = digits.bytes().fold(0i64, |acc, d| {
            acc.saturating_mul(10).saturating_add(i64::from(d - b'0'))
        });
        Some(if negative { -magnitude } else { magnitude })
    }

    /// `\(\w+\)`
    fn base(&mut self) -> Option<&'a str> {
        let saved = self.pos;
        if self.eat(b'(') {
            let name = self.take_while(is_word);
            if !name.is_empty() && self.eat(b')') {
                return Some(name);
            }
        }
        self.pos = saved;
        None
    }

    /// `\(\w+\*[1248]\)`, restoring the position when absent.
    fn index(&mut self) -> Option<IndexExpr<'a>> {
        let saved = self.pos;
        if self.eat(b'(') {
            let register = self.take_while(is_word);
            if !register.is_empty() && self.eat(b'*') {
                if let Some(scale @ (b'1' | b'2' | b'4' | b'8')) = self.peek() {
                    self.pos += 1;
                    if self.eat(b')') {
                        return Some(IndexExpr {
                            register,
                            scale: scale - b'0',
                        });
                    }
                }
            }
        }
        self.pos = saved;
        None
    }
}

fn is_word(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn match_at(text: &str, start: usize) -> Option<MemoryOperand<'_>> {
    let mut cur = Cursor { text, pos: start };
    let displacement = cur.displacement().unwrap_or(0);
    let base = cur.base()?;
    let index = cur.index();
    Some(MemoryOperand {
        displacement,
        base,
        index,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn plain_operands() {
        for text in ["AX", "Z31", "K1", "$7", "$-1", "X0", "[Z1-Z4]"] {
            assert_eq!(classify(text), OperandClass::Plain, "{text}");
        }
    }

    #[test]
    fn memory_operands() {
        for text in ["(AX)", "-7(DI)", "99(R15)(R15*1)", "15(DX)(BX*2)", "17(SP)"] {
            assert_eq!(classify(text), OperandClass::Memory, "{text}");
        }
    }

    #[test]
    fn vector_memory_operands() {
        for text in ["8(AX)(X1*4)", "(SP)(Y20*8)", "-17(BP)(Z9*1)"] {
            assert_eq!(classify(text), OperandClass::VectorMemory, "{text}");
        }
    }

    #[test]
    fn bad_scale_drops_index() {
        let mem = memory_operand("8(AX)(X1*3)").unwrap();
        assert_eq!(mem.class(), OperandClass::Memory);
        assert_eq!(mem.base, "AX");
        assert_eq!(mem.index, None);
    }

    #[test]
    fn decodes_fields() {
        let mem = memory_operand("-15(R14)(Z3*4)").unwrap();
        assert_eq!(mem.displacement, -15);
        assert_eq!(mem.base, "R14");
        assert_eq!(
            mem.index,
            Some(IndexExpr {
                register: "Z3",
                scale: 4
            })
        );
    }

    #[test]
    fn lone_minus_is_not_displacement() {
        let mem = memory_operand("-(AX)").unwrap();
        assert_eq!(mem.displacement, 0);
        assert_eq!(mem.base, "AX");
    }

    #[test]
    fn huge_displacement_saturates() {
        let mem = memory_operand("99999999999999999999999(AX)").unwrap();
        assert_eq!(mem.displacement, i64::MAX);
    }

    #[test]
    fn vector_register_names() {
        assert!(is_vector_register("X0"));
        assert!(is_vector_register("Z31"));
        assert!(!is_vector_register("X"));
        assert!(!is_vector_register("R8"));
        assert!(!is_vector_register("XAX"));
    }
}
