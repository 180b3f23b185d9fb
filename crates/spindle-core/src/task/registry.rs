//! TaskRegistry - タスク名とハンドラ・シグネチャの対応表
//!
//! # 設計
//! - 起動時に構築（mutable）
//! - 実行時は `Arc<TaskRegistry>` で共有（immutable、ロック不要）

use std::collections::HashMap;

use crate::domain::TaskSignature;
use crate::error::RegistryError;

use super::handler::TaskHandler;

/// A task as the worker knows it: name, handler and declared parameters.
#[derive(Debug, Clone)]
pub struct RegisteredTask {
    pub name: String,
    pub handler: TaskHandler,
    pub signature: TaskSignature,
}

impl RegisteredTask {
    pub fn new(name: impl Into<String>, handler: TaskHandler, signature: TaskSignature) -> Self {
        Self {
            name: name.into(),
            handler,
            signature,
        }
    }
}

/// # 使用例
/// ```ignore
/// let mut registry = TaskRegistry::new();
/// registry.register(RegisteredTask::new("math.add", add_handler, add_signature))?;
/// let task = registry.get("math.add");
/// ```
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, RegisteredTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    pub fn register(&mut self, task: RegisteredTask) -> Result<(), RegistryError> {
        if self.tasks.contains_key(&task.name) {
            return Err(RegistryError::AlreadyRegistered(task.name));
        }
        self.tasks.insert(task.name.clone(), task);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTask> {
        self.tasks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Registered task names, sorted.
    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
