pub mod decoder;
pub mod discovery;
pub mod error;
mod models;
mod path;

#[cfg(any(test, feature = "mock"))]
pub use crate::decoder::{MockArchive, MockCounters, MockDecoder};
pub use crate::decoder::{Archive, ArchiveDecoder, ArchiveHitStream, HitStream};
pub use crate::discovery::{DirectoryDiscovery, Discovery};
pub use crate::models::{
    ArchiveFile, ArchiveHit, ArchiveId, ArchiveMetadata, EntryInfo, EntryPayload, SearchHit, format_file_size,
};
pub use crate::path::{ARCHIVE_EXTENSION, archive_id, is_archive, validate as validate_path};
use std::sync::Arc;

pub type DecoderHandle = Arc<dyn ArchiveDecoder + Send + Sync>;
pub type DiscoveryHandle = Arc<dyn Discovery + Send + Sync>;
