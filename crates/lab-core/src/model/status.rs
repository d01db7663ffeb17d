/// Estado de una ejecución de `TaskRunner::run`.
///
/// Las transiciones válidas son:
/// - `Pending` -> `CacheCheck`
/// - `CacheCheck` -> `Done` (cache hit)
/// - `CacheCheck` -> `Running` (cache miss)
/// - `Running` -> `Done`
/// - `Running` -> `Failed`
///
/// `Done` y `Failed` son terminales. No hay reintentos internos: reintentar es
/// volver a llamar a `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Pending,
    CacheCheck,
    Running,
    Done,
    Failed,
}

impl RunState {
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!((self, next),
                 (Pending, CacheCheck) | (CacheCheck, Done) | (CacheCheck, Running) | (Running, Done) | (Running, Failed))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}
