//! Textual workflow front ends.

pub mod yaml;
