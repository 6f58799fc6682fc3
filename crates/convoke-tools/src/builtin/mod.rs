//! Built-in tools shipped with the core.

pub mod calculator;
pub mod file_reader;
pub mod json_parser;

pub use calculator::Calculator;
pub use file_reader::FileReader;
pub use json_parser::JsonParser;
