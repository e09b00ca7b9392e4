// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The line-oriented postfix format shared by the translator, the
//! compiler and the decompiler:
//!
//! ```text
//! READ <identifier>
//! WRITE <identifier>
//! CONST [<type-name>] <literal>
//! CAST <type-name>
//! <opcode-name>
//! ```

use smallvec::SmallVec;

use crate::common::Result;
use crate::{compile_err, var_err};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Instruction<'a> {
    Read(&'a str),
    Write(&'a str),
    Const {
        type_name: Option<&'a str>,
        literal: &'a str,
    },
    Cast(&'a str),
    Op(&'a str),
}

impl<'a> Instruction<'a> {
    /// Parses one non-blank line; `line` is its 1-based number, for
    /// error details.
    pub(crate) fn parse(text: &'a str, line: usize) -> Result<Instruction<'a>> {
        let tokens: SmallVec<[&str; 3]> = text.split_whitespace().collect();
        let instruction = match tokens.as_slice() {
            ["READ", name] => Instruction::Read(*name),
            ["WRITE", name] => Instruction::Write(*name),
            ["READ"] | ["WRITE"] => {
                return var_err!(MissingName, format!("line {line}: {text}"));
            }
            ["CONST", literal] => Instruction::Const {
                type_name: None,
                literal: *literal,
            },
            ["CONST", type_name, literal] => Instruction::Const {
                type_name: Some(*type_name),
                literal: *literal,
            },
            ["CAST", type_name] => Instruction::Cast(*type_name),
            [op] if !matches!(*op, "READ" | "WRITE" | "CONST" | "CAST") => Instruction::Op(*op),
            _ => {
                return compile_err!(BadInstruction, format!("line {line}: {text}"));
            }
        };
        Ok(instruction)
    }
}

/// Iterates over the instructions of `text` with their 1-based line
/// numbers, skipping blank lines.
pub(crate) fn instructions(text: &str) -> impl Iterator<Item = (usize, Result<Instruction<'_>>)> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| (i + 1, Instruction::parse(line, i + 1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;

    #[test]
    fn test_parse_lines() {
        assert_eq!(Instruction::Read("G"), Instruction::parse("READ G", 1).unwrap());
        assert_eq!(
            Instruction::Write("F"),
            Instruction::parse("  WRITE   F ", 1).unwrap()
        );
        assert_eq!(
            Instruction::Const {
                type_name: Some("float32"),
                literal: "0.99"
            },
            Instruction::parse("CONST float32 0.99", 1).unwrap()
        );
        assert_eq!(
            Instruction::Const {
                type_name: None,
                literal: "2"
            },
            Instruction::parse("CONST 2", 1).unwrap()
        );
        assert_eq!(Instruction::Cast("bool"), Instruction::parse("CAST bool", 1).unwrap());
        assert_eq!(Instruction::Op("MUL"), Instruction::parse("MUL", 1).unwrap());
    }

    #[test]
    fn test_parse_errors() {
        let err = Instruction::parse("WRITE", 4).unwrap_err();
        assert_eq!(ErrorCode::MissingName, err.code);
        assert_eq!(Some("line 4: WRITE".to_owned()), err.get_details());

        for bad in ["CONST", "CAST", "CAST a b", "READ a b", "MUL 2", "CONST a b c"] {
            let err = Instruction::parse(bad, 1).unwrap_err();
            assert_eq!(ErrorCode::BadInstruction, err.code, "{bad}");
        }
    }

    #[test]
    fn test_instructions_skip_blank_lines() {
        let parsed: Vec<_> = instructions("READ a\n\n  \nWRITE b\n")
            .map(|(line, inst)| (line, inst.unwrap()))
            .collect();
        assert_eq!(
            vec![(1, Instruction::Read("a")), (4, Instruction::Write("b"))],
            parsed
        );
    }
}
