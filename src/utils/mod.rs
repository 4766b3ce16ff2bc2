//! Support utilities: diagnostic reporting on block vectors.

pub mod report;
