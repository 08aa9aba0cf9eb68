//! # Domain Layer
//!
//! Operations, handlers, freezes and partner statistics, with the pure
//! rules that govern them. Nothing here performs I/O except through the
//! ports declared in [`services`].

pub mod entities;
pub mod errors;
pub mod services;
pub mod value_objects;
