//! Environment CRUD and selection. All of it shares the workspace queue key.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLockWriteGuard};

use tracing::info;

use apiclient_core::environment::{Environment, Variable};
use apiclient_core::error::{ApiError, NodeKind, Result};
use apiclient_core::paths;
use apiclient_core::tree;

use crate::queue::WORKSPACE_KEY;
use crate::storage::to_json;
use crate::store::CollectionStore;

fn environment_not_found(name: &str) -> ApiError {
    ApiError::NotFound(format!("environment '{name}'"))
}

impl CollectionStore {
    /// # Errors
    ///
    /// Returns a naming error if another environment claims the name or its
    /// storage key.
    pub async fn create_environment(&self, name: &str, variables: Vec<Variable>) -> Result<Environment> {
        let _turn = self.queue.enter(&[WORKSPACE_KEY]).await;
        let result = self.create_environment_locked(name, variables).await;
        self.record(result)
    }

    async fn create_environment_locked(&self, name: &str, variables: Vec<Variable>) -> Result<Environment> {
        paths::validate_name(name)?;
        self.check_environment_name(name, None)?;
        let environment = Environment::new(name, variables);
        self.write_environment(&environment).await?;
        self.environments_mut()
            .insert(name.to_string(), environment.clone());
        self.touch_locked().await;
        info!(environment = name, "created environment");
        Ok(environment)
    }

    /// Replace an environment's variables.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] for an unknown environment.
    pub async fn update_environment(&self, name: &str, variables: Vec<Variable>) -> Result<Environment> {
        let _turn = self.queue.enter(&[WORKSPACE_KEY]).await;
        let result = self.update_environment_locked(name, variables).await;
        self.record(result)
    }

    async fn update_environment_locked(&self, name: &str, variables: Vec<Variable>) -> Result<Environment> {
        let mut environment = self
            .environment(name)
            .ok_or_else(|| environment_not_found(name))?;
        environment.variables = variables;
        self.write_environment(&environment).await?;
        self.environments_mut()
            .insert(name.to_string(), environment.clone());
        info!(environment = name, "updated environment");
        Ok(environment)
    }

    /// Rename an environment. A selection of the old name follows it.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] for an unknown environment, or a naming
    /// error if `new_name` is taken.
    pub async fn rename_environment(&self, old_name: &str, new_name: &str) -> Result<()> {
        let _turn = self.queue.enter(&[WORKSPACE_KEY]).await;
        let result = self.rename_environment_locked(old_name, new_name).await;
        self.record(result)
    }

    async fn rename_environment_locked(&self, old_name: &str, new_name: &str) -> Result<()> {
        paths::validate_name(new_name)?;
        let mut environment = self
            .environment(old_name)
            .ok_or_else(|| environment_not_found(old_name))?;
        if old_name == new_name {
            return Ok(());
        }
        self.check_environment_name(new_name, Some(old_name))?;

        environment.name = new_name.to_string();
        self.write_environment(&environment).await?;
        if paths::sanitize(old_name) != paths::sanitize(new_name) {
            self.storage
                .delete_file(&paths::environment_path(old_name))
                .await?;
        }
        {
            let mut environments = self.environments_mut();
            environments.remove(old_name);
            environments.insert(new_name.to_string(), environment);
        }

        let follows = self.workspace().selected_environment.as_deref() == Some(old_name);
        if follows {
            self.save_workspace_locked(|ws| ws.selected_environment = Some(new_name.to_string()))
                .await?;
        } else {
            self.touch_locked().await;
        }
        info!(from = old_name, to = new_name, "renamed environment");
        Ok(())
    }

    /// Delete an environment and its document. Deleting the selected
    /// environment clears the selection.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] for an unknown environment.
    pub async fn delete_environment(&self, name: &str) -> Result<()> {
        let _turn = self.queue.enter(&[WORKSPACE_KEY]).await;
        let result = self.delete_environment_locked(name).await;
        self.record(result)
    }

    async fn delete_environment_locked(&self, name: &str) -> Result<()> {
        if self.environment(name).is_none() {
            return Err(environment_not_found(name));
        }
        self.storage
            .delete_file(&paths::environment_path(name))
            .await?;
        self.environments_mut().remove(name);

        if self.workspace().selected_environment.as_deref() == Some(name) {
            self.save_workspace_locked(|ws| ws.selected_environment = None)
                .await?;
        } else {
            self.touch_locked().await;
        }
        info!(environment = name, "deleted environment");
        Ok(())
    }

    /// Select the active environment, or clear the selection with `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] when selecting an unknown environment.
    pub async fn select_environment(&self, name: Option<&str>) -> Result<()> {
        let _turn = self.queue.enter(&[WORKSPACE_KEY]).await;
        let result = self.select_environment_locked(name).await;
        self.record(result)
    }

    async fn select_environment_locked(&self, name: Option<&str>) -> Result<()> {
        if let Some(name) = name {
            if self.environment(name).is_none() {
                return Err(environment_not_found(name));
            }
        }
        self.save_workspace_locked(|ws| ws.selected_environment = name.map(str::to_string))
            .await?;
        info!(environment = ?name, "selected environment");
        Ok(())
    }

    /// The selected environment, if one is selected and still exists.
    pub fn selected_environment(&self) -> Option<Environment> {
        let name = self.workspace().selected_environment?;
        self.environment(&name)
    }

    fn check_environment_name(&self, name: &str, renaming: Option<&str>) -> Result<()> {
        let environments = self
            .environments
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        tree::check_sibling(
            environments.keys().map(String::as_str),
            name,
            NodeKind::Environment,
            renaming,
        )
    }

    async fn write_environment(&self, environment: &Environment) -> Result<()> {
        self.storage
            .write_file(
                &paths::environment_path(&environment.name),
                &to_json(environment)?,
            )
            .await?;
        Ok(())
    }

    fn environments_mut(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Environment>> {
        self.environments
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
