//! Pushes a rotated password to everything that stores a copy of it.
//!
//! Runs only after the engine accepted the new password, so every failure
//! here is a [`PanelError::PartialFailure`]: the engine and the earlier
//! rewrites already carry the new value.

use crate::error::PanelError;
use crate::models::{InstallParam, LogicalDatabase, Origin, POSTGRESQL_TYPE};
use crate::services::ServiceContext;

/// Rewrites linked application credentials, first failure aborts.
pub struct CredentialPropagator<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> CredentialPropagator<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Rewrite the `user-password` param of every app linked to `database`
    /// and restart it, in link insertion order.
    ///
    /// `link_scope` restricts the links to one engine installation (local
    /// engines); `None` considers every link. Returns how many apps were
    /// updated.
    pub async fn propagate_database(
        &self,
        database: &LogicalDatabase,
        link_scope: Option<i64>,
        new_password: &str,
    ) -> Result<usize, PanelError> {
        let links = self.ctx.apps.list_resources(link_scope, database.id).map_err(|e| {
            PanelError::partial_failure(
                format!("password of {} changed but its linked apps could not be listed", database.name),
                e,
            )
        })?;
        if links.is_empty() {
            return Ok(0);
        }

        let encrypted = self.ctx.cipher.encrypt(new_password).map_err(|e| {
            PanelError::partial_failure(format!("password of {} changed but not re-encrypted", database.name), e)
        })?;

        for (updated, link) in links.iter().enumerate() {
            let install = match self.ctx.apps.get(link.app_install_id) {
                Ok(Some(install)) => install,
                Ok(None) => {
                    return Err(PanelError::partial_failure(
                        format!("{updated} linked apps updated before app install {} was missing", link.app_install_id),
                        PanelError::not_found(format!("app install {}", link.app_install_id)),
                    ));
                }
                Err(e) => {
                    return Err(PanelError::partial_failure(
                        format!("{updated} linked apps updated before app install {} failed to load", link.app_install_id),
                        e,
                    ));
                }
            };

            tracing::info!(
                app = %install.app_key,
                install = %install.name,
                database = %database.name,
                "Updating password used by linked app"
            );
            let rewritten = self.ctx.apps.update_param(install.id, InstallParam::UserPassword, &encrypted);
            let result = match rewritten {
                Ok(()) => {
                    let compose = install.compose_path(&self.ctx.config.app_install_dir);
                    self.ctx.restarter.restart(&compose).await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                return Err(PanelError::partial_failure(
                    format!("{updated} linked apps updated before app {} failed", install.name),
                    e,
                ));
            }
        }

        Ok(links.len())
    }

    /// Persist a rotated administrative password of engine `engine_name`.
    ///
    /// Local engines also get the `password` param of their install
    /// rewritten. Nothing is restarted.
    pub fn propagate_engine(&self, engine_name: &str, from: &Origin, new_password: &str) -> Result<(), PanelError> {
        let partial = |e: PanelError| {
            PanelError::partial_failure(format!("admin password of {engine_name} changed but not recorded"), e)
        };
        let encrypted = self.ctx.cipher.encrypt(new_password).map_err(partial)?;

        if from.is_local() {
            let base = self.ctx.apps.load_base_info(POSTGRESQL_TYPE, engine_name).map_err(partial)?;
            self.ctx.apps.update_param(base.id, InstallParam::Password, &encrypted).map_err(partial)?;
        }

        match self.ctx.catalog.get_engine_by_name(engine_name).map_err(partial)? {
            Some(engine) => self.ctx.catalog.update_engine_password(engine.id, &encrypted).map_err(partial)?,
            None => tracing::warn!(engine = %engine_name, "Engine record vanished during password rotation"),
        }

        tracing::info!(engine = %engine_name, "Admin password recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ROOT_PASSWORD_ENV, USER_PASSWORD_ENV};
    use crate::repository::{AppInstallRepository, CatalogRepository, SecretCipher};
    use crate::services::CatalogSynchronizer;
    use crate::test_support::Harness;

    fn user_password(h: &Harness, app: i64) -> Option<String> {
        let install = h.catalog.get(app).unwrap().unwrap();
        install.env.get(USER_PASSWORD_ENV).map(|v| h.cipher.decrypt(v).unwrap())
    }

    #[tokio::test]
    async fn test_propagates_in_insertion_order() {
        let h = Harness::new();
        let engine_app = h.local_engine("pgA");
        let db = CatalogSynchronizer::new(&h.ctx)
            .record_created("app_db", "pgA", "app_user", "old", Origin::Local, "")
            .unwrap();
        let shop = h.linked_app("shop", engine_app, db.id, "local");
        let blog = h.linked_app("blog", engine_app, db.id, "local");
        let other_engine = h.linked_app("wiki", engine_app + 100, db.id, "local");

        let count = CredentialPropagator::new(&h.ctx)
            .propagate_database(&db, Some(engine_app), "new")
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(user_password(&h, shop).as_deref(), Some("new"));
        assert_eq!(user_password(&h, blog).as_deref(), Some("new"));
        assert_eq!(user_password(&h, other_engine), None);

        let restarted = h.restarter.restarted.lock().clone();
        assert_eq!(restarted.len(), 2);
        assert!(restarted[0].ends_with("wordpress/shop/docker-compose.yml"));
        assert!(restarted[1].ends_with("wordpress/blog/docker-compose.yml"));
    }

    #[tokio::test]
    async fn test_kth_failure_keeps_earlier_rewrites() {
        let h = Harness::new();
        h.remote_engine("pgR", "aws");
        let db = CatalogSynchronizer::new(&h.ctx)
            .record_created("app_db", "pgR", "app_user", "old", Origin::Remote("aws".into()), "")
            .unwrap();
        let apps: Vec<i64> =
            ["a1", "a2", "a3", "a4"].iter().map(|name| h.linked_app(name, 0, db.id, "aws")).collect();
        *h.restarter.fail_marker.lock() = Some("/a3/".to_string());

        let err = CredentialPropagator::new(&h.ctx).propagate_database(&db, None, "new").await.unwrap_err();
        assert!(matches!(err, PanelError::PartialFailure { ref message, .. } if message.contains("a3")));

        // a1 and a2 fully updated, a3 rewritten but not restarted, a4 untouched
        assert_eq!(user_password(&h, apps[0]).as_deref(), Some("new"));
        assert_eq!(user_password(&h, apps[1]).as_deref(), Some("new"));
        assert_eq!(user_password(&h, apps[2]).as_deref(), Some("new"));
        assert_eq!(user_password(&h, apps[3]), None);
        assert_eq!(h.restarter.restarted.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_no_links_is_a_no_op() {
        let h = Harness::new();
        let db = CatalogSynchronizer::new(&h.ctx)
            .record_created("app_db", "pgR", "app_user", "old", Origin::Remote("aws".into()), "")
            .unwrap();
        let count = CredentialPropagator::new(&h.ctx).propagate_database(&db, None, "new").await.unwrap();
        assert_eq!(count, 0);
        assert!(h.restarter.restarted.lock().is_empty());
    }

    #[test]
    fn test_engine_rotation_local_and_remote() {
        let h = Harness::new();
        let install = h.local_engine("pgA");
        h.remote_engine("pgR", "aws");
        let propagator = CredentialPropagator::new(&h.ctx);

        propagator.propagate_engine("pgA", &Origin::Local, "root2").unwrap();
        let env = h.catalog.get(install).unwrap().unwrap().env;
        assert_eq!(h.cipher.decrypt(&env[ROOT_PASSWORD_ENV]).unwrap(), "root2");

        propagator.propagate_engine("pgR", &Origin::Remote("aws".into()), "admin2").unwrap();
        let engine = h.catalog.get_engine_by_name("pgR").unwrap().unwrap();
        assert_eq!(h.cipher.decrypt(&engine.password).unwrap(), "admin2");
        assert!(h.restarter.restarted.lock().is_empty());
    }
}
