//! Auditoría best-effort alrededor de la ejecución.
//!
//! Un `AuditChannel` sólo sabe "enviar un mensaje a algún lado". El `Auditor`
//! reparte cada mensaje a todos los canales configurados y registra (sin
//! propagar) los fallos de entrega: la auditoría no es transaccional con la
//! ejecución.

mod channels;
mod message;

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use log::warn;

pub use channels::{LogChannel, MemoryChannel};
pub use message::{new_audit_id, now_timestamp, AuditFlags, AuditMessage};

use crate::constants::DEFAULT_AUDIT_CONTEXT;
use crate::errors::AuditDeliveryError;
use crate::model::Fingerprint;

/// Datos de la ejecución que acompañan a cada envío.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditContext {
    pub task: String,
    pub fingerprint: Option<Fingerprint>,
}

/// Qué hizo el canal con el mensaje.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Logged,
    Stored,
    Written(PathBuf),
    /// Código HTTP devuelto por el endpoint remoto.
    Posted { status: u16 },
}

pub trait AuditChannel: Send + Sync + Debug {
    /// Nombre corto para logs.
    fn name(&self) -> &str;

    fn send(&self, message: &AuditMessage, context: &AuditContext) -> Result<Delivery, AuditDeliveryError>;
}

/// Conjunto inmutable de canales + flags habilitados para un runner.
#[derive(Debug, Clone)]
pub struct Auditor {
    flags: AuditFlags,
    context_uri: String,
    channels: Vec<Arc<dyn AuditChannel>>,
}

impl Default for Auditor {
    fn default() -> Self {
        Self::disabled()
    }
}

impl Auditor {
    pub fn new(flags: AuditFlags) -> Self {
        Self { flags,
               context_uri: DEFAULT_AUDIT_CONTEXT.to_string(),
               channels: Vec::new() }
    }

    pub fn disabled() -> Self {
        Self::new(AuditFlags::NONE)
    }

    pub fn with_context(mut self, uri: impl Into<String>) -> Self {
        self.context_uri = uri.into();
        self
    }

    pub fn with_channel(mut self, channel: Arc<dyn AuditChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn flags(&self) -> AuditFlags {
        self.flags
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn is_enabled(&self, category: AuditFlags) -> bool {
        self.flags.contains(category) && !self.channels.is_empty()
    }

    /// Mensaje vacío con el contexto del auditor.
    pub fn message(&self, id: &str, category: AuditFlags) -> AuditMessage {
        AuditMessage::new(self.context_uri.clone(), id, category)
    }

    /// Envía a todos los canales si la categoría está habilitada. Devuelve la
    /// cantidad de entregas exitosas; los errores sólo se registran.
    pub fn audit(&self, message: &AuditMessage, context: &AuditContext) -> usize {
        if !self.is_enabled(message.category) {
            return 0;
        }
        let mut delivered = 0;
        for channel in &self.channels {
            match channel.send(message, context) {
                Ok(Delivery::Posted { status }) if !(200..300).contains(&status) => {
                    warn!("audit channel '{}' answered HTTP {status} for {}", channel.name(), message.id);
                }
                Ok(_) => delivered += 1,
                Err(e) => warn!("audit delivery failed for task '{}': {e}", context.task),
            }
        }
        delivered
    }
}
