//! The fallback executor: one generic dispatch loop over ordered adapter
//! chains.
//!
//! The source of truth for "which backend handles this operation" is the
//! [`BackendRegistry`]'s static per-operation chain, fixed at engine
//! construction. The executor walks the chain in declared order, gives each
//! adapter exactly one attempt, and returns on the first success. Every
//! failed attempt is recorded; if the chain is exhausted the full log comes
//! back inside [`EngineError::AllBackendsFailed`].
//!
//! The executor holds no locks and keeps no history — given the same inputs
//! and the same set of available backends, the same adapter wins every time,
//! and the diagnostics are byte-identical in ordering. There is no adaptive
//! re-scoring and no same-adapter retry.

use crate::backend::{BackendRegistry, Invocation, Outcome};
use crate::document::Workspace;
use crate::error::{AttemptFailure, EngineError};
use tracing::{debug, warn};

pub struct FallbackExecutor {
    registry: BackendRegistry,
}

impl FallbackExecutor {
    pub fn new(registry: BackendRegistry) -> Self {
        Self { registry }
    }

    /// Run `request` against its operation's chain. Output documents are
    /// created inside `workspace`.
    pub async fn execute(
        &self,
        request: Invocation<'_>,
        workspace: &Workspace,
    ) -> Result<Outcome, EngineError> {
        let operation = request.operation();
        let chain = self.registry.chain(operation);
        let mut attempts: Vec<AttemptFailure> = Vec::new();

        for backend in chain {
            debug!("{operation}: trying {}", backend.kind());
            match backend.invoke(request, workspace).await {
                Ok(outcome) => {
                    if !attempts.is_empty() {
                        debug!(
                            "{operation}: {} succeeded after {} failed attempt(s)",
                            backend.kind(),
                            attempts.len()
                        );
                    }
                    return Ok(outcome);
                }
                Err(failure) => {
                    warn!("{operation}: {} failed: {failure}", backend.kind());
                    attempts.push(AttemptFailure {
                        backend: backend.kind(),
                        failure,
                    });
                }
            }
        }

        Err(EngineError::AllBackendsFailed {
            operation,
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, BackendKind, Operation};
    use crate::error::BackendFailure;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted adapter: answers PageCount with a fixed result and counts
    /// how often it was invoked.
    struct Scripted {
        name: &'static str,
        result: Option<usize>,
        calls: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn ok(name: &'static str, count: usize) -> (Arc<dyn Backend>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Arc::new(Self {
                    name,
                    result: Some(count),
                    calls: Arc::clone(&calls),
                }),
                calls,
            )
        }

        fn failing(name: &'static str) -> (Arc<dyn Backend>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Arc::new(Self {
                    name,
                    result: None,
                    calls: Arc::clone(&calls),
                }),
                calls,
            )
        }
    }

    #[async_trait]
    impl Backend for Scripted {
        fn kind(&self) -> BackendKind {
            BackendKind::Custom(self.name)
        }

        fn supports(&self, op: Operation) -> bool {
            op == Operation::PageCount
        }

        async fn invoke(
            &self,
            _request: Invocation<'_>,
            _workspace: &Workspace,
        ) -> Result<Outcome, BackendFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.result {
                Some(n) => Ok(Outcome::Count(n)),
                None => Err(BackendFailure::Unavailable {
                    reason: format!("{} is down", self.name),
                }),
            }
        }
    }

    fn doc_in(ws: &Workspace) -> crate::document::DocumentHandle {
        crate::document::DocumentHandle::from_bytes(b"%PDF-1.7\n", ws, "in.pdf").unwrap()
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let ws = Workspace::new(None, "test").unwrap();
        let doc = doc_in(&ws);

        let (primary, primary_calls) = Scripted::ok("primary", 7);
        let (secondary, secondary_calls) = Scripted::ok("secondary", 99);

        let mut registry = BackendRegistry::new();
        registry.register(Operation::PageCount, primary).unwrap();
        registry.register(Operation::PageCount, secondary).unwrap();
        let executor = FallbackExecutor::new(registry);

        let outcome = executor
            .execute(Invocation::PageCount { doc: &doc }, &ws)
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Count(7)));
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(secondary_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_falls_through_to_next_adapter() {
        let ws = Workspace::new(None, "test").unwrap();
        let doc = doc_in(&ws);

        let (broken, broken_calls) = Scripted::failing("broken");
        let (fallback, _) = Scripted::ok("fallback", 3);

        let mut registry = BackendRegistry::new();
        registry.register(Operation::PageCount, broken).unwrap();
        registry.register(Operation::PageCount, fallback).unwrap();
        let executor = FallbackExecutor::new(registry);

        let outcome = executor
            .execute(Invocation::PageCount { doc: &doc }, &ws)
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Count(3)));
        // Exactly one attempt on the broken adapter, no retry.
        assert_eq!(broken_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_chain_reports_every_cause_in_order() {
        let ws = Workspace::new(None, "test").unwrap();
        let doc = doc_in(&ws);

        let (a, _) = Scripted::failing("alpha");
        let (b, _) = Scripted::failing("beta");

        let mut registry = BackendRegistry::new();
        registry.register(Operation::PageCount, a).unwrap();
        registry.register(Operation::PageCount, b).unwrap();
        let executor = FallbackExecutor::new(registry);

        let err = executor
            .execute(Invocation::PageCount { doc: &doc }, &ws)
            .await
            .unwrap_err();
        match err {
            EngineError::AllBackendsFailed {
                operation,
                attempts,
            } => {
                assert_eq!(operation, Operation::PageCount);
                assert_eq!(attempts.len(), 2);
                assert_eq!(attempts[0].backend, BackendKind::Custom("alpha"));
                assert_eq!(attempts[1].backend, BackendKind::Custom("beta"));
            }
            other => panic!("expected AllBackendsFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_chain_is_all_backends_failed_with_no_attempts() {
        let ws = Workspace::new(None, "test").unwrap();
        let doc = doc_in(&ws);
        let executor = FallbackExecutor::new(BackendRegistry::new());

        let err = executor
            .execute(Invocation::PageCount { doc: &doc }, &ws)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::AllBackendsFailed { attempts, .. } if attempts.is_empty()
        ));
    }
}
