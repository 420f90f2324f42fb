//! Todo record types

use serde::{Deserialize, Serialize};

/// A stored Todo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: u64,
    pub text: String,
    pub done: bool,
}

/// Body of a create request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewTodo {
    pub text: String,
}

/// Body of an update request
///
/// `None` means "leave as is"; `Some(String::new())` really clears the text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

impl TodoPatch {
    /// Overwrite the fields that are present
    pub fn apply_to(&self, todo: &mut Todo) {
        if let Some(text) = &self.text {
            todo.text = text.clone();
        }
        if let Some(done) = self.done {
            todo.done = done;
        }
    }

    /// True if the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.done.is_none()
    }
}
