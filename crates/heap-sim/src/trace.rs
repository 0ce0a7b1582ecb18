//! Line-oriented allocation traces.
//!
//! ```text
//! # comment
//! alloc <words>
//! free <start> <words>
//! reset
//! verify
//! dump
//! ```

use std::{num::ParseIntError, str::SplitWhitespace};

use mark_bitmap::HeapWord;
use snafu::{OptionExt as _, ResultExt as _, Snafu, ensure};
use snafu_utils::Location;

#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum TraceError {
    #[snafu(display("line {line}: unknown command `{command}`"))]
    #[snafu(provide(ref, priority, Location => location))]
    UnknownCommand {
        line: usize,
        command: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("line {line}: `{command}` is missing its {name} argument"))]
    #[snafu(provide(ref, priority, Location => location))]
    MissingArgument {
        line: usize,
        command: &'static str,
        name: &'static str,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("line {line}: invalid {name} `{value}`"))]
    #[snafu(provide(ref, priority, Location => location))]
    InvalidNumber {
        line: usize,
        name: &'static str,
        value: String,
        #[snafu(implicit)]
        location: Location,
        #[snafu(source)]
        source: ParseIntError,
    },
    #[snafu(display("line {line}: unexpected argument `{value}`"))]
    #[snafu(provide(ref, priority, Location => location))]
    TrailingArgument {
        line: usize,
        value: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("line {line}: `alloc` needs at least one word"))]
    #[snafu(provide(ref, priority, Location => location))]
    ZeroAlloc {
        line: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Alloc { words: usize },
    Free { start: HeapWord, words: usize },
    Reset,
    Verify,
    Dump,
}

/// An [`Op`] with the 1-based line number it was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub line: usize,
    pub op: Op,
}

pub fn parse(text: &str) -> Result<Vec<Step>, TraceError> {
    let mut steps = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let content = raw.split_once('#').map_or(raw, |(content, _)| content);
        let mut args = Args {
            line,
            words: content.split_whitespace(),
        };
        let Some(command) = args.words.next() else {
            continue;
        };

        let op = match command {
            "alloc" => {
                let words = args.number("alloc", "word count")?;
                ensure!(words > 0, trace_error::ZeroAllocSnafu { line });
                Op::Alloc { words }
            }
            "free" => {
                let start = HeapWord::new(args.number("free", "start address")?);
                let words = args.number("free", "word count")?;
                Op::Free { start, words }
            }
            "reset" => Op::Reset,
            "verify" => Op::Verify,
            "dump" => Op::Dump,
            _ => {
                return trace_error::UnknownCommandSnafu { line, command }.fail();
            }
        };
        args.finish()?;
        steps.push(Step { line, op });
    }
    Ok(steps)
}

struct Args<'a> {
    line: usize,
    words: SplitWhitespace<'a>,
}

impl Args<'_> {
    fn number(&mut self, command: &'static str, name: &'static str) -> Result<usize, TraceError> {
        let line = self.line;
        let value = self
            .words
            .next()
            .context(trace_error::MissingArgumentSnafu {
                line,
                command,
                name,
            })?;
        value
            .parse::<usize>()
            .context(trace_error::InvalidNumberSnafu { line, name, value })
    }

    fn finish(mut self) -> Result<(), TraceError> {
        if let Some(value) = self.words.next() {
            return trace_error::TrailingArgumentSnafu {
                line: self.line,
                value,
            }
            .fail();
        }
        Ok(())
    }
}
