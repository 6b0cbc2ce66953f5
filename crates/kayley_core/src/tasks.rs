//! Task list boundary.

use crate::Timestamp;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub text: String,
    pub completed: bool,
    pub priority: TaskPriority,
    pub created_at: Timestamp,
}

#[async_trait]
pub trait TaskClient: Send + Sync {
    async fn create(&self, text: &str, priority: TaskPriority) -> Result<Task>;
    async fn complete(&self, task_id: &str) -> Result<()>;
    async fn delete(&self, task_id: &str) -> Result<()>;
    async fn list(&self) -> Result<Vec<Task>>;
}

#[derive(Default)]
pub struct InMemoryTaskList {
    tasks: Mutex<Vec<Task>>,
}

impl InMemoryTaskList {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Task>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl TaskClient for InMemoryTaskList {
    async fn create(&self, text: &str, priority: TaskPriority) -> Result<Task> {
        let task = Task {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            completed: false,
            priority,
            created_at: Utc::now(),
        };
        self.lock().push(task.clone());
        Ok(task)
    }

    async fn complete(&self, task_id: &str) -> Result<()> {
        let mut tasks = self.lock();
        match tasks.iter_mut().find(|t| t.id == task_id) {
            Some(t) => {
                t.completed = true;
                Ok(())
            }
            None => anyhow::bail!("No task with id {}", task_id),
        }
    }

    async fn delete(&self, task_id: &str) -> Result<()> {
        let mut tasks = self.lock();
        let before = tasks.len();
        tasks.retain(|t| t.id != task_id);
        if tasks.len() == before {
            anyhow::bail!("No task with id {}", task_id);
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Task>> {
        Ok(self.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_task_lifecycle() {
        let tasks = InMemoryTaskList::new();
        let t = tasks.create("buy ring light", TaskPriority::High).await.unwrap();
        tasks.complete(&t.id).await.unwrap();
        assert!(tasks.list().await.unwrap()[0].completed);
        tasks.delete(&t.id).await.unwrap();
        assert!(tasks.list().await.unwrap().is_empty());
        assert!(tasks.complete("missing").await.is_err());
    }
}
