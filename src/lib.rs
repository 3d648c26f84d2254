pub mod assets;
pub mod chunk_plan;
pub mod cli;
pub mod compose;
pub mod config;
pub mod filename;
pub mod geometry;
pub mod package;
pub mod pipeline;
pub mod progress;
pub mod qr;
pub mod record;
pub mod render;
pub mod report;
pub mod text;
pub mod util;
