//! Forward steps with compensations, for multi-record writes on a store
//! without multi-document transactions.

use std::future::Future;
use std::pin::Pin;

use crate::errors::AppError;

type Compensation<'a> = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

/// An ordered list of completed steps and their compensations.
///
/// When a step fails, the compensations of all earlier steps run in reverse
/// order before the step's error is returned. Dropping a saga without
/// calling [`Saga::commit`] does not compensate anything.
pub struct Saga<'a> {
    name: &'static str,
    completed: Vec<(&'static str, Compensation<'a>)>,
}

impl<'a> Saga<'a> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            completed: Vec::new(),
        }
    }

    /// Run a forward step. On success, register `compensate` (built from
    /// the step's output) to undo it if a later step fails.
    pub async fn step<T, F, C, CF>(
        &mut self,
        step: &'static str,
        action: F,
        compensate: C,
    ) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
        C: FnOnce(&T) -> CF,
        CF: Future<Output = Result<(), AppError>> + Send + 'a,
    {
        match action.await {
            Ok(output) => {
                self.completed.push((step, Box::pin(compensate(&output))));
                Ok(output)
            }
            Err(err) => {
                tracing::warn!(saga = self.name, step, "Saga step failed: {}", err);
                self.unwind().await;
                Err(err)
            }
        }
    }

    /// Finish the saga, discarding all compensations.
    pub fn commit(self) {
        tracing::debug!(saga = self.name, steps = self.completed.len(), "Saga committed");
    }

    async fn unwind(&mut self) {
        while let Some((step, compensation)) = self.completed.pop() {
            match compensation.await {
                Ok(()) => tracing::info!(saga = self.name, step, "Compensated saga step"),
                Err(e) => {
                    tracing::error!(saga = self.name, step, "Compensation failed: {}", e)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_failure_unwinds_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut saga = Saga::new("test");

        let l = log.clone();
        let first = saga
            .step("first", async { Ok::<_, AppError>(1) }, move |v: &i32| {
                let v = *v;
                async move {
                    l.lock().unwrap().push(format!("undo first {}", v));
                    Ok(())
                }
            })
            .await
            .unwrap();
        assert_eq!(first, 1);

        let l = log.clone();
        saga.step("second", async { Ok::<_, AppError>(2) }, move |_| async move {
            l.lock().unwrap().push("undo second".to_string());
            Ok(())
        })
        .await
        .unwrap();

        let result: Result<(), AppError> = saga
            .step(
                "third",
                async { Err(AppError::Conflict("duplicate".to_string())) },
                |_| async { Ok(()) },
            )
            .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["undo second".to_string(), "undo first 1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_commit_skips_compensation() {
        let log = Arc::new(Mutex::new(Vec::<String>::new()));
        let mut saga = Saga::new("test");

        let l = log.clone();
        saga.step("only", async { Ok::<_, AppError>(()) }, move |_| async move {
            l.lock().unwrap().push("undo".to_string());
            Ok(())
        })
        .await
        .unwrap();
        saga.commit();

        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_compensation_still_returns_step_error() {
        let mut saga = Saga::new("test");
        saga.step("first", async { Ok::<_, AppError>(()) }, |_| async {
            Err(AppError::Database("gone".to_string()))
        })
        .await
        .unwrap();

        let result: Result<(), AppError> = saga
            .step(
                "second",
                async { Err(AppError::Validation("bad".to_string())) },
                |_| async { Ok(()) },
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
