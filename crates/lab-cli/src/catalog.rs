//! Tareas de demostración disponibles desde la línea de comandos.

use std::fs;

use lab_core::{EngineResult, FieldDecl, FieldType, Task, TaskContext, TaskFailure};
use serde_json::{json, Value};

pub const TASK_NAMES: [&str; 5] = ["add", "scale", "word-count", "sleep", "abort"];

/// Construye la tarea `name`; `None` si no está en el catálogo.
pub fn task(name: &str) -> Option<EngineResult<Task>> {
    let built = match name {
        "add" => add(),
        "scale" => scale(),
        "word-count" => word_count(),
        "sleep" => sleep(),
        "abort" => abort(),
        _ => return None,
    };
    Some(built)
}

fn add() -> EngineResult<Task> {
    Task::builder("add").version("1")
                        .help("Suma a + b.")
                        .input(FieldDecl::required("a", FieldType::Int))
                        .input(FieldDecl::with_default("b", FieldType::Float, json!(0.1)))
                        .output(FieldDecl::required("out", FieldType::Float))
                        .body(|ctx: &TaskContext<'_>| {
                            let a: i64 = ctx.input("a")?;
                            let b: f64 = ctx.input("b")?;
                            Ok(json!(a as f64 + b))
                        })
                        .build()
}

fn scale() -> EngineResult<Task> {
    Task::builder("scale").version("1")
                          .help("Multiplica cada valor de la lista por factor.")
                          .input(FieldDecl::required("values", FieldType::List))
                          .input(FieldDecl::with_default("factor", FieldType::Float, json!(1.0)))
                          .output(FieldDecl::required("scaled", FieldType::List))
                          .output(FieldDecl::required("total", FieldType::Float))
                          .body(|ctx: &TaskContext<'_>| {
                              let values: Vec<f64> = ctx.input("values")?;
                              let factor: f64 = ctx.input("factor")?;
                              let scaled: Vec<f64> = values.iter().map(|v| v * factor).collect();
                              let total: f64 = scaled.iter().sum();
                              Ok(json!([scaled, total]))
                          })
                          .build()
}

fn word_count() -> EngineResult<Task> {
    Task::builder("word-count").version("1")
                               .help("Cuenta líneas y palabras de un archivo; el hash usa su contenido.")
                               .input(FieldDecl::required("path", FieldType::File))
                               .output(FieldDecl::required("lines", FieldType::Int))
                               .output(FieldDecl::required("words", FieldType::Int))
                               .body(|ctx: &TaskContext<'_>| {
                                   let path: String = ctx.input("path")?;
                                   let text = fs::read_to_string(&path)?;
                                   Ok(json!({
                                       "lines": text.lines().count(),
                                       "words": text.split_whitespace().count(),
                                   }))
                               })
                               .build()
}

fn sleep() -> EngineResult<Task> {
    Task::builder("sleep").help("Duerme ms milisegundos; falla si ms es negativo.")
                          .input(FieldDecl::required("ms", FieldType::Int))
                          .body(|ctx: &TaskContext<'_>| -> Result<Value, TaskFailure> {
                              let ms: i64 = ctx.input("ms")?;
                              let ms = u64::try_from(ms).map_err(|_| TaskFailure::new(format!("negative duration {ms}")))?;
                              std::thread::sleep(std::time::Duration::from_millis(ms));
                              Ok(json!(ms))
                          })
                          .build()
}

fn abort() -> EngineResult<Task> {
    Task::builder("abort").help("Termina el proceso con abort(). Con el backend pool sólo muere el proceso worker.")
                          .body(|_: &TaskContext<'_>| -> Result<Value, TaskFailure> { std::process::abort() })
                          .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_catalog_entry_builds() {
        for name in TASK_NAMES {
            let task = task(name).unwrap().unwrap();
            assert_eq!(task.name(), name);
        }
        assert!(task("quantum").is_none());
    }

    #[test]
    fn scale_shapes_two_outputs() {
        let t = task("scale").unwrap().unwrap();
        assert_eq!(t.output_names(), vec!["scaled", "total"]);
        let shaped = t.shape_output(json!([[2.0, 4.0], 6.0])).unwrap();
        assert_eq!(shaped["total"], json!(6.0));
    }
}
