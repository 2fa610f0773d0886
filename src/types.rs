// src/types.rs

use std::fmt;

use clap::ValueEnum;
use serde::Deserialize;

/// How a raw pod5 file is judged to be completely written.
///
/// - `Signature`: the file starts and ends with the pod5 signature. This does
///   not depend on the clock and is the default.
/// - `Age`: the file has not been modified for at least the configured
///   quiescence period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransferCheck {
    #[default]
    Signature,
    Age,
}

/// Pipeline stages of a run, in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Basecalling,
    Merging,
    Demultiplexing,
    Cleanup,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Basecalling,
        Stage::Merging,
        Stage::Demultiplexing,
        Stage::Cleanup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Basecalling => "basecalling",
            Stage::Merging => "merging",
            Stage::Demultiplexing => "demultiplexing",
            Stage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
