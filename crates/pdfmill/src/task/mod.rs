//! Task records and their lifecycle rules.

pub mod codes;
pub mod model;
pub mod store;

pub use codes::{ErrorCode, Phase, Status, UnknownCode};
pub use model::{validate_file_id, InvalidFileId, NewTask, Task, TransitionError, FILE_ID_MAX_LEN};
pub use store::TaskStore;
