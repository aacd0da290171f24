//! Go assembler encoder test fixture scanner.
//!
//! A fixture (`<extension>.s`) starts with a free-form header, followed by
//! tab-indented instruction lines and a final `RET`:
//!
//! ```text
//! // Code generated by avx512test. DO NOT EDIT.
//!
//! TEXT asmtest_avx512f(SB), NOSPLIT, $0
//! 	KANDNW K4, K4, K6                                  // c5dc42f4
//! 	VADDPD 7(SI)(DI*8), Z2, K1, Z3                     // 62f1ed49585cfe07
//! 	RET
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::FixtureError;
use crate::operand::{classify, OperandClass};

/// Line that terminates every fixture.
pub const SENTINEL: &str = "\tRET";

/// A decoded fixture line: one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionRecord {
    /// Opcode, including any suffix such as `.BCST` or `.RU_SAE`.
    pub op: String,
    /// Operands in source order, trimmed.
    pub args: Vec<String>,
    /// The whole source line.
    pub text: String,
    /// 1-based line number within the fixture.
    pub line_no: usize,
}

impl InstructionRecord {
    /// Instruction text without the encoding comment, ready to be assembled.
    #[must_use]
    pub fn asm(&self) -> String {
        if self.args.is_empty() {
            self.op.clone()
        } else {
            format!("{} {}", self.op, self.args.join(", "))
        }
    }

    /// Operand classes in source order.
    pub fn operand_classes(&self) -> impl Iterator<Item = OperandClass> + '_ {
        self.args.iter().map(|arg| classify(arg))
    }
}

/// Lazily decodes a fixture into [`InstructionRecord`]s.
///
/// Yields `Ok` records until the `RET` sentinel, or a single `Err` if the
/// fixture is malformed. The scanner is fused after either.
#[derive(Debug)]
pub struct FixtureScanner {
    path: PathBuf,
    lines: Vec<String>,
    pos: usize,
    done: bool,
}

impl FixtureScanner {
    /// Reads the fixture at `path` and positions the scanner at its first
    /// instruction line.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Read`] if the file cannot be read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| FixtureError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_source(path, &source))
    }

    /// Builds a scanner over in-memory fixture text. `path` is only used in
    /// error messages.
    #[must_use]
    pub fn from_source(path: impl Into<PathBuf>, source: &str) -> Self {
        let lines: Vec<String> = source.lines().map(str::to_string).collect();
        // Instruction lines start with a tab. Skip everything before them.
        let pos = lines
            .iter()
            .position(|line| line.starts_with('\t'))
            .unwrap_or(lines.len());
        Self {
            path: path.into(),
            lines,
            pos,
            done: false,
        }
    }

    /// Fixture path this scanner reads.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn advance(&mut self) -> Option<Result<InstructionRecord, FixtureError>> {
        let Some(line) = self.lines.get(self.pos) else {
            return Some(Err(FixtureError::UnexpectedEof {
                path: self.path.clone(),
            }));
        };
        if line == SENTINEL {
            return None;
        }
        let line_no = self.pos + 1;
        let Some((op, args)) = parse_line(line) else {
            return Some(Err(FixtureError::Parse {
                path: self.path.clone(),
                line_no,
                line: line.clone(),
            }));
        };
        let record = InstructionRecord {
            op: op.to_string(),
            args: split_args(args),
            text: line.clone(),
            line_no,
        };
        self.pos += 1;
        Some(Ok(record))
    }
}

impl Iterator for FixtureScanner {
    type Item = Result<InstructionRecord, FixtureError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.advance();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}

/// Splits an instruction line into opcode and operand list text.
///
/// Grammar: `\t<opcode> <operands> // <hex>...`. The operand list may be
/// empty; the encoding must start with at least one lowercase hex digit.
fn parse_line(line: &str) -> Option<(&str, &str)> {
    let body = line.strip_prefix('\t')?;
    let (code, comment) = body.split_once(" // ")?;
    if !comment.starts_with(|c: char| matches!(c, '0'..='9' | 'a'..='f')) {
        return None;
    }
    let code = code.trim_end();
    let (op, args) = match code.split_once(' ') {
        Some((op, args)) => (op, args.trim()),
        None => (code, ""),
    };
    if op.is_empty() || op.chars().any(char::is_whitespace) {
        return None;
    }
    Some((op, args))
}

fn split_args(args: &str) -> Vec<String> {
    if args.is_empty() {
        return Vec::new();
    }
    args.split(',').map(|arg| arg.trim().to_string()).collect()
}
