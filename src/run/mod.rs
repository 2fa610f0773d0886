// src/run/mod.rs

//! Sequencing runs: where they are, what they contain, and how far the
//! instrument got.

pub mod descriptor;
pub mod discovery;
pub mod metadata;
pub mod transfer;

pub use descriptor::RunDescriptor;
pub use discovery::find_runs;
pub use metadata::{CommandMetadataReader, MetadataReader, RunMetadata};
pub use transfer::{are_all_files_transferred, get_transferred_files, is_file_transferred, TransferPolicy};
