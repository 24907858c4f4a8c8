//!
//! lsql-core - Core Host Runtime Types
//!
//! This crate provides the fundamental types shared by the lsql crates that
//! hand values across the host boundary:
//!
//! - `HeapHeader` and `HeapTag` for reference-counted heap objects
//! - `LsqlString` for heap-allocated strings
//! - `LsqlBytes` for heap-allocated byte buffers (blob columns)
//! - Exception handling primitives the host inspects after each call
//!
//! All heap objects use atomic reference counting. Ownership of every object
//! returned to the host passes to the host, which releases it through the
//! matching `*_decref` function.
//!

pub mod value;
pub mod bytes;
pub mod exception;

pub use value::*;
pub use bytes::*;
pub use exception::*;
