use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use lab_core::{AuditChannel, AuditContext, AuditDeliveryError, AuditMessage, Delivery};
use log::debug;
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;

type CredentialFn = dyn Fn() -> Result<String, String> + Send + Sync;

/// Credencial opcional del endpoint.
#[derive(Clone, Default)]
pub enum RemoteAuth {
    #[default]
    None,
    Basic { user: String, password: Option<String> },
    Bearer(String),
    /// Valor completo del header `Authorization`, calculado en cada envío.
    Computed(Arc<CredentialFn>),
}

impl fmt::Debug for RemoteAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Basic { user, .. } => f.debug_struct("Basic").field("user", user).finish_non_exhaustive(),
            Self::Bearer(_) => f.write_str("Bearer(..)"),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl RemoteAuth {
    pub fn computed<F>(f: F) -> Self
        where F: Fn() -> Result<String, String> + Send + Sync + 'static
    {
        Self::Computed(Arc::new(f))
    }
}

/// POST del mensaje JSON a `endpoint`; devuelve el código HTTP obtenido.
#[derive(Debug, Clone)]
pub struct RemoteChannel {
    endpoint: String,
    auth: RemoteAuth,
    client: Client,
}

impl RemoteChannel {
    pub const NAME: &'static str = "remote";
    const TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(endpoint: impl Into<String>) -> Result<Self, AuditDeliveryError> {
        let client = Client::builder().timeout(Self::TIMEOUT)
                                      .build()
                                      .map_err(|e| transport(e.to_string()))?;
        Ok(Self { endpoint: endpoint.into(),
                  auth: RemoteAuth::None,
                  client })
    }

    pub fn with_auth(mut self, auth: RemoteAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl AuditChannel for RemoteChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn send(&self, message: &AuditMessage, context: &AuditContext) -> Result<Delivery, AuditDeliveryError> {
        let mut request = self.client.post(&self.endpoint).json(message);
        request = match &self.auth {
            RemoteAuth::None => request,
            RemoteAuth::Basic { user, password } => request.basic_auth(user, password.as_ref()),
            RemoteAuth::Bearer(token) => request.bearer_auth(token),
            RemoteAuth::Computed(credential) => request.header(AUTHORIZATION, credential().map_err(transport)?),
        };
        let response = request.send().map_err(|e| transport(e.to_string()))?;
        let status = response.status().as_u16();
        debug!("audit message for '{}' posted to {} -> {status}", context.task, self.endpoint);
        Ok(Delivery::Posted { status })
    }
}

fn transport(reason: String) -> AuditDeliveryError {
    AuditDeliveryError::Transport { channel: RemoteChannel::NAME.to_string(),
                                    reason }
}
