//! # Kernel ELF handling
//!
//! [`parser`] reads the program headers, [`loader`] places each `PT_LOAD`
//! segment at its physical load address.

pub mod loader;
pub mod parser;
