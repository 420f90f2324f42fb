//! Todo Repository
//!
//! Maps Todo records onto the `todos` bucket. Every operation is exactly
//! one engine transaction, so each one is atomic on its own.

use std::sync::Arc;

use crate::engine::Database;
use crate::error::{Result, TodoKvError};
use crate::keys::{decode_id, encode_id};
use crate::model::{Todo, TodoPatch};

/// Bucket holding all Todo records
pub const TODO_BUCKET: &str = "todos";

/// CRUD access to Todo records
#[derive(Clone)]
pub struct TodoRepository {
    db: Arc<Database>,
}

impl TodoRepository {
    /// Wrap a database handle, creating the Todo bucket if needed
    pub fn open(db: Arc<Database>) -> Result<Self> {
        db.ensure_bucket(TODO_BUCKET)?;
        Ok(Self { db })
    }

    /// Wrap a database handle without writing anything
    ///
    /// If the Todo bucket is missing, every operation fails with
    /// `BucketNotFound`.
    pub fn attach(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// All Todos in ascending id order, as of one snapshot
    ///
    /// Keys that are not 8 bytes long are not Todos and are skipped.
    pub fn list(&self) -> Result<Vec<Todo>> {
        self.db.view(|tx| {
            let bucket = tx.bucket(TODO_BUCKET)?;
            let mut todos = Vec::with_capacity(bucket.len());
            for (key, value) in bucket.iter() {
                if decode_id(key).is_none() {
                    continue;
                }
                todos.push(serde_json::from_slice(value)?);
            }
            Ok(todos)
        })
    }

    /// Store a new Todo under a freshly minted id
    pub fn create(&self, text: String) -> Result<Todo> {
        let todo = self.db.update(|tx| {
            let mut bucket = tx.bucket_mut(TODO_BUCKET)?;
            let id = bucket.next_sequence()?;
            let todo = Todo {
                id,
                text,
                done: false,
            };
            bucket.put(&encode_id(id), &serde_json::to_vec(&todo)?)?;
            Ok(todo)
        })?;

        tracing::info!(id = todo.id, "todo created");
        Ok(todo)
    }

    /// Fetch one Todo
    pub fn get(&self, id: u64) -> Result<Todo> {
        self.db.view(|tx| {
            let bucket = tx.bucket(TODO_BUCKET)?;
            let value = bucket.get(&encode_id(id)).ok_or(TodoKvError::NotFound(id))?;
            Ok(serde_json::from_slice(value)?)
        })
    }

    /// Merge `patch` into an existing Todo
    ///
    /// The read and the write share one write transaction, so no other
    /// writer can slip in between.
    pub fn update(&self, id: u64, patch: &TodoPatch) -> Result<Todo> {
        if patch.is_empty() {
            return self.get(id);
        }

        let todo = self.db.update(|tx| {
            let mut bucket = tx.bucket_mut(TODO_BUCKET)?;
            let key = encode_id(id);
            let value = bucket.get(&key).ok_or(TodoKvError::NotFound(id))?;

            let mut todo: Todo = serde_json::from_slice(value)?;
            patch.apply_to(&mut todo);

            bucket.put(&key, &serde_json::to_vec(&todo)?)?;
            Ok(todo)
        })?;

        tracing::info!(id, done = todo.done, "todo updated");
        Ok(todo)
    }

    /// Remove a Todo; its id is never handed out again
    pub fn delete(&self, id: u64) -> Result<()> {
        self.db.update(|tx| {
            let mut bucket = tx.bucket_mut(TODO_BUCKET)?;
            if !bucket.delete(&encode_id(id))? {
                return Err(TodoKvError::NotFound(id));
            }
            Ok(())
        })?;

        tracing::info!(id, "todo deleted");
        Ok(())
    }

    /// Check that the store answers and the Todo bucket exists
    pub fn health(&self) -> Result<()> {
        self.db.view(|tx| tx.bucket(TODO_BUCKET).map(|_| ()))
    }

    /// The underlying database handle
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}
