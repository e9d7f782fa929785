use {std::io, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    #[error("block size must be non-zero")]
    ZeroBlockSize,
    #[error("block size {block} does not divide matrix side length {side}")]
    BlockSizeMismatch { side: usize, block: usize },
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidSetting {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("could not spawn worker thread")]
    Spawn(#[source] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
