//! IO modules - side effects shared by the stdlib and install bindings.

pub mod ar;
pub mod extract;
