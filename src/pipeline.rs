//! Armado del runner del proceso a partir de `AppConfig`.

use lab_audit::{configured_auditor, AuditTargets};
use lab_core::runner::TaskRunnerBuilder;
use lab_core::{TaskRunner, WorkerRegistry};
use lab_workers::standard_registry;

use crate::config::AppConfig;
use crate::errors::CoreError;

/// Runner con el backend `LABFLOW_WORKER` (resuelto contra
/// `standard_registry()`), el hash scope y los canales de auditoría
/// configurados.
pub fn build_runner(config: &AppConfig) -> Result<TaskRunner, CoreError> {
    build_runner_with(config, &standard_registry())
}

pub fn build_runner_with(config: &AppConfig, registry: &WorkerRegistry) -> Result<TaskRunner, CoreError> {
    let targets = AuditTargets { dir: config.audit_dir.clone(),
                                 url: config.audit_url.clone(),
                                 ..AuditTargets::default() };
    let auditor = configured_auditor(&config.runner, targets).map_err(|e| CoreError::Internal(e.to_string()))?;
    Ok(TaskRunnerBuilder::from_config(&config.runner, registry)?.auditor(auditor)
                                                                .build())
}
