use crate::db::DatabaseError;

use super::codes::Status;
use super::model::{NewTask, Task};

/// Durable record store shared by the dispatcher, orchestrators and tooling.
///
/// `save` must refuse to overwrite a record whose persisted status is already
/// terminal and report [`DatabaseError::TerminalRecord`] instead.
pub trait TaskStore: Send + Sync {
    fn insert(&self, task: NewTask) -> Result<Task, DatabaseError>;

    fn load(&self, id: i64) -> Result<Option<Task>, DatabaseError>;

    fn find_by_uuid(&self, uuid: &str) -> Result<Option<Task>, DatabaseError>;

    fn save(&self, task: &Task) -> Result<(), DatabaseError>;

    /// Ids of tasks in `status`, oldest first.
    fn list_ids(&self, status: Status, limit: usize) -> Result<Vec<i64>, DatabaseError>;
}
