use std::fmt;

/// The pipeline stage a fatal error originated from.
///
/// Every stage is a physical precondition for the next, so no error is
/// locally recovered; the stage tag is what distinguishes the process exit
/// code and the operator-facing report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preflight,
    Device,
    Partition,
    Crypto,
    Volume,
    Filesystem,
    Package,
    GuestConfig,
}

impl Stage {
    pub fn exit_code(self) -> i32 {
        match self {
            Stage::Preflight => 10,
            Stage::Partition => 11,
            Stage::Crypto => 12,
            Stage::Volume => 13,
            Stage::Filesystem => 14,
            Stage::Package => 15,
            Stage::GuestConfig => 16,
            Stage::Device => 17,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Preflight => "preflight",
            Stage::Device => "device",
            Stage::Partition => "partition",
            Stage::Crypto => "crypto",
            Stage::Volume => "volume",
            Stage::Filesystem => "filesystem",
            Stage::Package => "package",
            Stage::GuestConfig => "guest-config",
        };
        f.write_str(name)
    }
}

/// A fatal error tagged with the stage it aborted.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: anyhow::Error,
}

impl StageError {
    pub fn new(stage: Stage, source: anyhow::Error) -> Self {
        Self { stage, source }
    }
}

/// Tags the error side of a stage result with its originating stage.
pub trait WithStage<T> {
    fn stage(self, stage: Stage) -> Result<T, StageError>;
}

impl<T> WithStage<T> for anyhow::Result<T> {
    fn stage(self, stage: Stage) -> Result<T, StageError> {
        self.map_err(|source| StageError::new(stage, source))
    }
}
