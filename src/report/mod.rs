//! Report assembly and rendering.

pub mod assembler;
pub mod generator;

pub use assembler::{ReportAssembler, DEFAULT_SAMPLE_SIZE};
pub use generator::{
    generate_history_table, generate_json_report, generate_markdown_report, RenderOptions,
};
