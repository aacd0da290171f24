//! Probe synthesis.
//!
//! A probe is a tiny Go program: a driver (`main.go`) that loops `loop_count`
//! times, refilling a scratch buffer and calling an assembly routine
//! (`routine_amd64.s`) that executes one span's instructions in order, each
//! preceded by the register loads that point its memory operand into the
//! buffer.
//! The fixture syntax is Go assembler syntax, so the Go toolchain builds it.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::ToolError;
use crate::exec;
use crate::fixture::InstructionRecord;
use crate::operand::{is_vector_register, memory_operand};
use crate::span::Span;

/// Smallest scratch buffer handed to a probe routine.
pub const MIN_BUFFER_SIZE: usize = 1024;

/// Widest single memory access (a ZMM register).
const ACCESS_WIDTH: usize = 64;

/// Name of the built probe executable inside the probe directory.
pub const PROBE_BINARY: &str = "probe";

/// Pseudo-registers and the stack pointer are never seeded.
const UNSEEDED_BASES: [&str; 4] = ["SP", "SB", "FP", "PC"];

/// Replacements for an index register that is also the operand's base.
const SCRATCH_INDEXES: [&str; 4] = ["R11", "R12", "R13", "DX"];

/// Scratch memory geometry shared by every probe of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeLayout {
    /// Total buffer size in bytes. A multiple of 64, at least 1024.
    pub buffer_size: usize,
    /// Offset of the pointer passed to the routine, leaving room for negative
    /// displacements.
    pub base_offset: usize,
    /// Routine stack frame size, covering `SP`-relative operands. Never zero,
    /// so the assembler saves and restores `BP` around the routine.
    pub frame_size: usize,
}

impl Default for ProbeLayout {
    fn default() -> Self {
        Self {
            buffer_size: MIN_BUFFER_SIZE,
            base_offset: 0,
            frame_size: ACCESS_WIDTH,
        }
    }
}

impl ProbeLayout {
    /// Computes a layout large enough for every memory operand in `spans`.
    pub fn for_spans<'a>(spans: impl IntoIterator<Item = &'a Span>) -> Self {
        let mut extent = Extent::default();
        for span in spans {
            extent.add(span);
        }
        extent.layout()
    }
}

/// Largest displacements seen so far, folded one span at a time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    below: usize,
    above: usize,
    stack: usize,
}

impl Extent {
    /// Widens the extent to cover every memory operand of `span`.
    pub fn add(&mut self, span: &Span) {
        for mem in span
            .records
            .iter()
            .flat_map(|r| &r.args)
            .filter_map(|arg| memory_operand(arg))
        {
            let disp = mem.displacement.clamp(i64::from(i32::MIN), i64::from(i32::MAX));
            let magnitude = usize::try_from(disp.unsigned_abs()).unwrap_or(usize::MAX);
            if mem.base == "SP" {
                if disp >= 0 {
                    self.stack = self.stack.max(magnitude);
                }
            } else if disp < 0 {
                self.below = self.below.max(magnitude);
            } else {
                self.above = self.above.max(magnitude);
            }
        }
    }

    /// The smallest layout covering this extent.
    #[must_use]
    pub fn layout(&self) -> ProbeLayout {
        let base_offset = round_up(self.below, ACCESS_WIDTH);
        let buffer_size = round_up(
            base_offset.saturating_add(self.above).saturating_add(ACCESS_WIDTH),
            ACCESS_WIDTH,
        )
        .max(MIN_BUFFER_SIZE);
        let frame_size = round_up(self.stack.saturating_add(ACCESS_WIDTH), ACCESS_WIDTH);
        ProbeLayout {
            buffer_size,
            base_offset,
            frame_size,
        }
    }
}

fn round_up(n: usize, to: usize) -> usize {
    n.div_ceil(to).saturating_mul(to)
}

/// Generated probe sources for one span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSource {
    /// Go driver program.
    pub driver: String,
    /// Go assembly routine.
    pub routine: String,
}

/// Files of a probe written to disk.
#[derive(Debug, Clone)]
pub struct ProbeFiles {
    /// Directory holding the probe module.
    pub dir: PathBuf,
}

const GO_MOD: &str = "module avx512probe\n\ngo 1.17\n";

/// Generates the driver and routine sources for `span`.
#[must_use]
pub fn synthesize(span: &Span, loop_count: u64, layout: &ProbeLayout) -> ProbeSource {
    ProbeSource {
        driver: driver_source(loop_count, layout),
        routine: routine_source(span, layout),
    }
}

fn driver_source(loop_count: u64, layout: &ProbeLayout) -> String {
    format!(
        "// Code generated by avx512counters. DO NOT EDIT.\n\
         package main\n\
         \n\
         func probeRoutine(mem *byte)\n\
         \n\
         var memory [{size}]byte\n\
         \n\
         func main() {{\n\
         \tfor i := 0; i < {loop_count}; i++ {{\n\
         \t\t// Fill memory argument with some values.\n\
         \t\tfor j := range memory {{\n\
         \t\t\tmemory[j] = byte(j)\n\
         \t\t}}\n\
         \t\tprobeRoutine(&memory[{base}])\n\
         \t}}\n\
         }}\n",
        size = layout.buffer_size,
        base = layout.base_offset,
    )
}

/// Registers an instruction's memory operands need initialized, and the
/// instruction text to run once they are.
#[derive(Debug, Default, PartialEq, Eq)]
struct Seeded {
    bases: BTreeSet<String>,
    indexes: BTreeSet<String>,
    vector_indexes: BTreeSet<String>,
    asm: String,
}

/// Seeds every memory operand of `record` onto the buffer pointer.
///
/// Bases get the pointer and indexes get zero, so each effective address is
/// `pointer + displacement`. An index that is also a base is renamed to a
/// free scratch register; the operand class and the instruction form stay
/// the same.
fn seed(record: &InstructionRecord) -> Seeded {
    let mut seeded = Seeded::default();
    let operands: Vec<_> = record.args.iter().map(|arg| memory_operand(arg)).collect();
    for mem in operands.iter().flatten() {
        if !UNSEEDED_BASES.contains(&mem.base) {
            seeded.bases.insert(mem.base.to_string());
        }
    }

    let mut args = Vec::with_capacity(record.args.len());
    for (arg, mem) in record.args.iter().zip(&operands) {
        let Some(index) = mem.as_ref().and_then(|mem| mem.index) else {
            args.push(arg.clone());
            continue;
        };
        if is_vector_register(index.register) {
            seeded.vector_indexes.insert(index.register[1..].to_string());
            args.push(arg.clone());
        } else if seeded.bases.contains(index.register) {
            let scratch = scratch_index(record);
            seeded.indexes.insert(scratch.to_string());
            args.push(arg.replacen(
                &format!("({}*", index.register),
                &format!("({scratch}*"),
                1,
            ));
        } else {
            seeded.indexes.insert(index.register.to_string());
            args.push(arg.clone());
        }
    }

    seeded.asm = if args.is_empty() {
        record.op.clone()
    } else {
        format!("{} {}", record.op, args.join(", "))
    };
    seeded
}

fn scratch_index(record: &InstructionRecord) -> &'static str {
    SCRATCH_INDEXES
        .into_iter()
        .find(|reg| !record.args.iter().any(|arg| arg.contains(reg)))
        .unwrap_or(SCRATCH_INDEXES[0])
}

fn routine_source(span: &Span, layout: &ProbeLayout) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "// Code generated by avx512counters. DO NOT EDIT.");
    let _ = writeln!(
        out,
        "// {} span {}: {} instructions.",
        span.extension,
        span.ordinal,
        span.len()
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "TEXT ·probeRoutine(SB), 0, ${}-8", layout.frame_size);
    // Instructions may overwrite any register, so seeds are reloaded before
    // every instruction that addresses memory.
    for record in &span.records {
        let seeded = seed(record);
        for base in &seeded.bases {
            let _ = writeln!(out, "\tMOVQ mem+0(FP), {base}");
        }
        for index in &seeded.indexes {
            let _ = writeln!(out, "\tXORQ {index}, {index}");
        }
        for n in &seeded.vector_indexes {
            let _ = writeln!(out, "\tVPXORQ Z{n}, Z{n}, Z{n}");
        }
        let _ = writeln!(out, "\t{}", seeded.asm);
    }
    let _ = writeln!(out, "\tVZEROUPPER");
    let _ = writeln!(out, "\tRET");
    out
}

impl ProbeSource {
    /// Writes the probe module into `dir`, overwriting any previous probe.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Io`] if the directory or a file cannot be written.
    pub fn write(&self, dir: &Path) -> Result<ProbeFiles, ToolError> {
        fs::create_dir_all(dir).map_err(|source| ToolError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        for (name, content) in [
            ("go.mod", GO_MOD),
            ("main.go", self.driver.as_str()),
            ("routine_amd64.s", self.routine.as_str()),
        ] {
            let path = dir.join(name);
            fs::write(&path, content).map_err(|source| ToolError::Io { path, source })?;
        }
        Ok(ProbeFiles {
            dir: dir.to_path_buf(),
        })
    }
}

/// Builds a written probe into an executable.
pub trait ProbeBuilder {
    /// Compiles the probe and returns the path of the executable.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] if the build tool is missing or fails.
    fn build(&self, probe: &ProbeFiles) -> Result<PathBuf, ToolError>;
}

/// Builds probes with `go build`.
#[derive(Debug, Clone)]
pub struct GoBuilder {
    /// Go tool binary name or path.
    pub go: String,
}

impl ProbeBuilder for GoBuilder {
    fn build(&self, probe: &ProbeFiles) -> Result<PathBuf, ToolError> {
        exec::run(
            Command::new(&self.go)
                .args(["build", "-o", PROBE_BINARY])
                .current_dir(&probe.dir)
                .env("GOARCH", "amd64"),
            &self.go,
        )?;
        Ok(probe.dir.join(PROBE_BINARY))
    }
}
