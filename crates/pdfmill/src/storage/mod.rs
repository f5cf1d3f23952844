pub mod archive;
pub mod layout;

pub use archive::{checksum_file, pack_directory, ArchiveError, PackedArchive};
pub use layout::InstanceLayout;
