use thiserror::Error;

/// Errors surfaced by the blob index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("sqlite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store is read-only")]
    ReadOnly,

    #[error("store not found: {0}")]
    NotFound(String),

    #[error("chunk {rtype:?}/{major_id} is pinned and cannot grow")]
    Pinned {
        rtype: crate::record::RecordType,
        major_id: i64,
    },

    #[error("record {rtype:?}/{id} does not belong to chunk {major_id}")]
    WrongChunk {
        rtype: crate::record::RecordType,
        id: i64,
        major_id: i64,
    },
}

pub type IndexResult<T> = Result<T, IndexError>;

/// Errors surfaced when decoding a tile blob.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TileError {
    #[error("bad tile magic {0:#010x}")]
    BadMagic(u32),

    #[error("unsupported tile version {0}")]
    BadVersion(u32),

    #[error("truncated tile blob at offset {0}")]
    Truncated(usize),

    #[error("tile name is not valid ascii")]
    BadName,
}
