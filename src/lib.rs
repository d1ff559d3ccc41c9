//! # jar-sentry
//!
//! Detects known malicious bytecode sequences in Java class files and jars.
//!
//! ## Architecture
//!
//! - **classfile**: Class-file structure decoding (constant pool, methods, `Code`)
//! - **constant_pool**: Pool entries and their resolution to display strings
//! - **bytecode**: Method body decoding into opcodes and raw operands
//! - **opcode**: The JVM opcode table
//! - **instruction**: Operand resolution into comparable inline instructions
//! - **signature**: The built-in signature catalog
//! - **matcher**: Approximate ordered matching of signatures against a method
//! - **status**: Scan units, their lifecycle and status aggregation
//! - **detect**: Entry point driving a unit to its terminal status
//! - **archive**: Parallel scanning of jar entries
//! - **scan**: Discovery of scannable files on disk
//! - **report**: JSON and text reports of settled units
//! - **cli** / **config**: Command-line surface and option resolution

pub mod archive;
pub mod bytecode;
pub mod classfile;
pub mod cli;
pub mod config;
pub mod constant_pool;
pub mod detect;
pub mod error;
pub mod instruction;
pub mod matcher;
pub mod opcode;
pub mod report;
pub mod scan;
pub mod signature;
pub mod status;

#[cfg(test)]
mod testing;
