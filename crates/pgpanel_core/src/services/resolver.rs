//! Maps an engine name to connection parameters and an open client session.

use crate::admin::ClientSession;
use crate::error::PanelError;
use crate::models::{ConnectionParams, Origin};
use crate::services::ServiceContext;

/// An open session plus the parameters it was opened with.
pub struct ResolvedBackend {
    /// Administrative session, closed on drop
    pub session: ClientSession,
    /// Parameters the session was opened with
    pub params: ConnectionParams,
    /// Recorded version; empty for local engines
    pub version: String,
}

/// Resolves engine names through the catalog.
///
/// Every call re-reads the engine record; nothing is cached between calls.
pub struct BackendResolver<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> BackendResolver<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Connection parameters and recorded version for engine `name`.
    ///
    /// Remote engines report their recorded version. Local engines report an
    /// empty version so the client detects it on first use.
    pub fn resolve_params(&self, name: &str) -> Result<(ConnectionParams, String), PanelError> {
        let engine = self
            .ctx
            .catalog
            .get_engine_by_name(name)?
            .ok_or_else(|| PanelError::not_found(format!("engine instance {name}")))?;

        let (mut params, version) = match &engine.from {
            Origin::Remote(_) => {
                let password = self.ctx.cipher.decrypt(&engine.password)?;
                let params = ConnectionParams::network(
                    name,
                    engine.from.clone(),
                    engine.address.as_str(),
                    engine.port,
                    engine.username.as_str(),
                    password,
                    engine.tls.clone(),
                );
                (params, engine.version.clone())
            }
            Origin::Local => {
                let base = self.ctx.apps.load_base_info(&engine.db_type, name)?;
                let port = u16::try_from(base.port).map_err(|_| {
                    PanelError::transform(format!("app install {} has invalid port {}", base.name, base.port))
                })?;
                let password = self.ctx.cipher.decrypt(&base.password)?;
                let params = ConnectionParams::container(
                    name,
                    base.container_name.as_str(),
                    port,
                    base.user_name.as_str(),
                    password,
                );
                (params, String::new())
            }
        };
        params.timeout = self.ctx.config.admin_timeout();

        tracing::debug!(
            engine = %name,
            from = %engine.from.as_str(),
            target = %params.display_target(),
            "Resolved engine"
        );
        Ok((params, version))
    }

    /// Open an administrative session for engine `name`.
    pub async fn resolve(&self, name: &str) -> Result<ClientSession, PanelError> {
        Ok(self.resolve_backend(name).await?.session)
    }

    /// Like [`resolve`](Self::resolve), keeping the parameters and version.
    pub async fn resolve_backend(&self, name: &str) -> Result<ResolvedBackend, PanelError> {
        let (params, version) = self.resolve_params(name)?;
        let client = self.ctx.connector.connect(&params, &version).await?;
        Ok(ResolvedBackend { session: ClientSession::new(name, client), params, version })
    }
}
