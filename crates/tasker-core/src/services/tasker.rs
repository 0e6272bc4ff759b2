//! Account, project and task operations on top of the store facade.

use std::sync::Arc;

use crate::cipher::FieldCipher;
use crate::error::{Error, Result};
use crate::facade::StoreFacade;
use crate::models::{
    validate_username, EntityId, Priority, Project, SyncEntity, Task, User, WorkStatus,
};
use crate::password::{hash_password, validate_password, verify_password};
use crate::util::now_millis;

const MAX_FAILED_LOGINS: i64 = 5;
const LOCKOUT_MILLIS: i64 = 15 * 60 * 1000;

/// Fields for a new task
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub project_id: Option<EntityId>,
    pub priority: Priority,
    pub due_date: Option<i64>,
    pub time_estimate_minutes: Option<i64>,
}

/// Partial edit of a task; `None` leaves a field alone
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<WorkStatus>,
    pub due_date: Option<Option<i64>>,
    pub assigned_to: Option<Option<String>>,
    pub time_estimate_minutes: Option<Option<i64>>,
}

/// Application-level operations; descriptions are sealed with the field cipher.
pub struct TaskerService {
    facade: Arc<StoreFacade>,
    cipher: Arc<dyn FieldCipher>,
}

impl TaskerService {
    pub fn new(facade: Arc<StoreFacade>, cipher: Arc<dyn FieldCipher>) -> Self {
        Self { facade, cipher }
    }

    pub const fn facade(&self) -> &Arc<StoreFacade> {
        &self.facade
    }

    pub async fn register_user(&self, username: &str, password: &str) -> Result<User> {
        let username = validate_username(username)?;
        validate_password(password)?;
        if self.facade.username_exists(&username).await? {
            return Err(Error::Conflict(format!("username '{username}' is taken")));
        }

        let mut user = User::new(&username, hash_password(password))?;
        self.facade.add(&mut user).await?;
        tracing::info!("Registered user {username}");
        Ok(user)
    }

    /// Check credentials, counting failures toward a temporary lockout.
    ///
    /// Returns `Ok(None)` for an unknown user or a wrong password.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Option<User>> {
        let Some(mut user) = self.facade.user_by_username(username).await? else {
            return Ok(None);
        };

        let now = now_millis();
        if let Some(until) = user.lockout_end_time.filter(|until| *until > now) {
            return Err(Error::LockedOut { until });
        }

        if verify_password(password, &user.password_hash) {
            if user.failed_login_attempts > 0 || user.lockout_end_time.is_some() {
                user.failed_login_attempts = 0;
                user.lockout_end_time = None;
                self.facade.update(&mut user).await?;
            }
            return Ok(Some(user));
        }

        user.failed_login_attempts += 1;
        if user.failed_login_attempts >= MAX_FAILED_LOGINS {
            user.lockout_end_time = Some(now + LOCKOUT_MILLIS);
            tracing::warn!("Locking account {} after repeated failures", user.username);
        }
        self.facade.update(&mut user).await?;
        Ok(None)
    }

    pub async fn create_project(
        &self,
        owner_id: EntityId,
        name: &str,
        description: &str,
        priority: Priority,
    ) -> Result<Project> {
        let mut project = Project::new(owner_id, name, description)?;
        project.priority = priority;
        if self.facade.project_name_exists(&project.name, owner_id).await? {
            return Err(Error::Conflict(format!(
                "project '{}' already exists",
                project.name
            )));
        }

        let mut sealed = self.seal_project(&project)?;
        self.facade.add(&mut sealed).await?;
        project.envelope = sealed.envelope;
        Ok(project)
    }

    /// Live projects of `owner_id`, oldest first
    pub async fn projects(&self, owner_id: EntityId) -> Result<Vec<Project>> {
        let mut projects = self
            .facade
            .get_all::<Project>(Some(owner_id))
            .await?
            .into_iter()
            .map(|project| self.open_project(project))
            .collect::<Result<Vec<_>>>()?;
        projects.sort_by_key(|project| project.created_on);
        Ok(projects)
    }

    /// Find one of the owner's projects by exact name
    pub async fn project_named(&self, owner_id: EntityId, name: &str) -> Result<Project> {
        let name = name.trim();
        self.projects(owner_id)
            .await?
            .into_iter()
            .find(|project| project.name == name)
            .ok_or_else(|| Error::NotFound(format!("project '{name}'")))
    }

    /// Tombstone a project; its tasks keep their link and stay listed.
    pub async fn delete_project(&self, owner_id: EntityId, project_id: EntityId) -> Result<()> {
        self.owned_project(owner_id, project_id).await?;
        self.facade.delete::<Project>(project_id).await?;
        Ok(())
    }

    pub async fn add_task(&self, owner_id: EntityId, new_task: NewTask) -> Result<Task> {
        let mut task = Task::new(owner_id, &new_task.title)?;
        if let Some(project_id) = new_task.project_id {
            self.owned_project(owner_id, project_id).await?;
            task = task.in_project(project_id);
        }
        if self
            .facade
            .task_title_exists(&task.title, owner_id, task.project_id)
            .await?
        {
            return Err(Error::Conflict(format!("task '{}' already exists", task.title)));
        }

        task.description = new_task.description;
        task.priority = new_task.priority;
        task.due_date = new_task.due_date;
        task.time_estimate_minutes = new_task.time_estimate_minutes;

        let mut sealed = self.seal_task(&task)?;
        self.facade.add(&mut sealed).await?;
        task.envelope = sealed.envelope;
        Ok(task)
    }

    /// Live tasks of `owner_id`, optionally only those in one project
    pub async fn tasks(&self, owner_id: EntityId, project_id: Option<EntityId>) -> Result<Vec<Task>> {
        let tasks = match project_id {
            Some(project_id) => {
                self.owned_project(owner_id, project_id).await?;
                self.facade.tasks_for_project(project_id).await?
            }
            None => self.facade.get_all::<Task>(Some(owner_id)).await?,
        };

        let mut tasks = tasks
            .into_iter()
            .map(|task| self.open_task(task))
            .collect::<Result<Vec<_>>>()?;
        tasks.sort_by_key(|task| task.created_on);
        Ok(tasks)
    }

    pub async fn update_task(
        &self,
        owner_id: EntityId,
        task_id: EntityId,
        changes: TaskChanges,
    ) -> Result<Task> {
        let mut task = self.owned_task(owner_id, task_id).await?;
        let now = now_millis();

        if let Some(title) = changes.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(Error::InvalidInput("task title cannot be empty".into()));
            }
            if title != task.title
                && self
                    .facade
                    .task_title_exists(&title, owner_id, task.project_id)
                    .await?
            {
                return Err(Error::Conflict(format!("task '{title}' already exists")));
            }
            task.title = title;
        }
        if let Some(description) = changes.description {
            task.description = description;
        }
        if let Some(priority) = changes.priority {
            task.priority = priority;
        }
        if let Some(status) = changes.status {
            if status != task.status {
                task.transition(status, now);
            }
        }
        if let Some(due_date) = changes.due_date {
            task.due_date = due_date;
        }
        if let Some(assigned_to) = changes.assigned_to {
            task.assigned_to = assigned_to;
        }
        if let Some(estimate) = changes.time_estimate_minutes {
            task.time_estimate_minutes = estimate;
        }
        task.updated_on = Some(now);

        let mut sealed = self.seal_task(&task)?;
        self.facade.update(&mut sealed).await?;
        task.envelope = sealed.envelope;
        Ok(task)
    }

    pub async fn complete_task(&self, owner_id: EntityId, task_id: EntityId) -> Result<Task> {
        self.update_task(
            owner_id,
            task_id,
            TaskChanges {
                status: Some(WorkStatus::Finished),
                ..TaskChanges::default()
            },
        )
        .await
    }

    pub async fn delete_task(&self, owner_id: EntityId, task_id: EntityId) -> Result<()> {
        self.owned_task(owner_id, task_id).await?;
        self.facade.delete::<Task>(task_id).await?;
        Ok(())
    }

    async fn owned_project(&self, owner_id: EntityId, project_id: EntityId) -> Result<Project> {
        self.facade
            .get::<Project>(project_id)
            .await?
            .filter(|project| project.owner_id == owner_id)
            .ok_or_else(|| Error::NotFound(format!("project {project_id}")))
    }

    async fn owned_task(&self, owner_id: EntityId, task_id: EntityId) -> Result<Task> {
        let task = self
            .facade
            .get::<Task>(task_id)
            .await?
            .filter(|task| task.user_id == owner_id)
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
        self.open_task(task)
    }

    fn seal_task(&self, task: &Task) -> Result<Task> {
        let mut sealed = task.clone();
        sealed.description = self.cipher.encrypt(&task.description, task.user_id)?;
        Ok(sealed)
    }

    fn open_task(&self, mut task: Task) -> Result<Task> {
        task.description = self.cipher.decrypt(&task.description, task.user_id)?;
        Ok(task)
    }

    fn seal_project(&self, project: &Project) -> Result<Project> {
        let mut sealed = project.clone();
        sealed.description = self.cipher.encrypt(&project.description, project.owner_id)?;
        Ok(sealed)
    }

    fn open_project(&self, mut project: Project) -> Result<Project> {
        project.description = self.cipher.decrypt(&project.description, project.owner_id)?;
        Ok(project)
    }
}
