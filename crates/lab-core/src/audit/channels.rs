use std::sync::Mutex;

use log::info;

use super::{AuditChannel, AuditContext, AuditMessage, Delivery};
use crate::errors::AuditDeliveryError;

/// Escribe cada mensaje en el log (`info`) como JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogChannel;

impl AuditChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    fn send(&self, message: &AuditMessage, context: &AuditContext) -> Result<Delivery, AuditDeliveryError> {
        let body = serde_json::to_string(message).map_err(|e| AuditDeliveryError::Serialize { channel: "log".into(),
                                                                                              reason: e.to_string() })?;
        info!(target: "labflow::audit", "[{}] {body}", context.task);
        Ok(Delivery::Logged)
    }
}

/// Guarda los mensajes en memoria; útil en tests y para embebido.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    inner: Mutex<Vec<AuditMessage>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<AuditMessage> {
        self.inner.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut m) = self.inner.lock() {
            m.clear();
        }
    }
}

impl AuditChannel for MemoryChannel {
    fn name(&self) -> &str {
        "memory"
    }

    fn send(&self, message: &AuditMessage, _context: &AuditContext) -> Result<Delivery, AuditDeliveryError> {
        let mut guard = self.inner.lock().map_err(|_| AuditDeliveryError::Transport { channel: "memory".into(),
                                                                                      reason: "poisoned".into() })?;
        guard.push(message.clone());
        Ok(Delivery::Stored)
    }
}
