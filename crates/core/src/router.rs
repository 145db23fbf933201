use crate::session::{Session, SessionSummary};
use crate::traits::{with_storages, SemanticIndex};
use crate::{Interrupt, PreconditionError, QueryError, SearchMode};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::AsyncBufRead;
use tracing::info;

/// Validates queries and forwards them to the semantic index, one-shot or as a session.
pub struct QueryRouter<S> {
    service: S,
    storage_dir: PathBuf,
}

impl<S> QueryRouter<S>
where
    S: SemanticIndex,
{
    pub fn new(service: S, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            service,
            storage_dir: storage_dir.into(),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn check_preconditions(&self) -> Result<(), PreconditionError> {
        if let Some(variable) = self.service.missing_credential() {
            return Err(PreconditionError::MissingCredential { variable });
        }
        if !self.storage_dir.is_dir() {
            return Err(PreconditionError::MissingStorage(self.storage_dir.clone()));
        }
        Ok(())
    }

    /// Answers one query. `mode` is validated before the service is touched.
    pub async fn query(&self, text: &str, mode: &str) -> Result<String, QueryError> {
        self.check_preconditions()?;
        let mode: SearchMode = mode.parse()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        info!(%mode, storage_dir = %self.storage_dir.display(), "one-shot query");
        Ok(with_storages(&self.service, self.service.query(text, mode)).await?)
    }

    /// Runs an interactive session with storages held open for its whole lifetime.
    pub async fn session<R, W>(
        &self,
        initial_mode: SearchMode,
        input: R,
        out: &mut W,
        interrupt: &Interrupt,
    ) -> Result<SessionSummary, QueryError>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        self.check_preconditions()?;

        let mut session = Session::open(&self.storage_dir, initial_mode);
        session.write_banner(out)?;

        let summary = with_storages(
            &self.service,
            session.run(&self.service, input, out, interrupt),
        )
        .await?;

        info!(
            answered = summary.answered,
            failed = summary.failed,
            "session closed"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::{wrap_with_header, FULL_DOCS_STORE};
    use crate::ServiceError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct ScriptedIndex {
        calls: Mutex<Vec<String>>,
        credential_missing: bool,
    }

    impl ScriptedIndex {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
        }

        fn record(&self, call: String) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call);
            }
        }
    }

    #[async_trait]
    impl SemanticIndex for ScriptedIndex {
        fn missing_credential(&self) -> Option<&'static str> {
            self.credential_missing.then_some("TEST_API_KEY")
        }

        async fn initialize_storages(&self) -> Result<(), ServiceError> {
            self.record("initialize".to_string());
            Ok(())
        }

        async fn finalize_storages(&self) -> Result<(), ServiceError> {
            self.record("finalize".to_string());
            Ok(())
        }

        async fn insert(&self, _text: &str) -> Result<(), ServiceError> {
            Ok(())
        }

        async fn query(&self, text: &str, mode: SearchMode) -> Result<String, ServiceError> {
            self.record(format!("query {mode} {text}"));
            if text.contains("explode") {
                return Err(ServiceError::Request("upstream timeout".to_string()));
            }
            Ok(format!("answer to {text}"))
        }
    }

    fn router_with_docs(
        index: ScriptedIndex,
    ) -> Result<(QueryRouter<ScriptedIndex>, tempfile::TempDir), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let records = json!({
            "doc-a": wrap_with_header("a.pdf", "alpha"),
            "doc-b": wrap_with_header("b.pdf", "beta"),
        });
        std::fs::write(dir.path().join(FULL_DOCS_STORE), records.to_string())?;
        Ok((QueryRouter::new(index, dir.path()), dir))
    }

    async fn run_session(
        router: &QueryRouter<ScriptedIndex>,
        script: &str,
        interrupt: &Interrupt,
    ) -> Result<(SessionSummary, String), QueryError> {
        let mut out = Vec::new();
        let summary = router
            .session(SearchMode::Hybrid, script.as_bytes(), &mut out, interrupt)
            .await?;
        Ok((summary, String::from_utf8_lossy(&out).into_owned()))
    }

    #[tokio::test]
    async fn invalid_modes_never_reach_the_service() -> Result<(), Box<dyn std::error::Error>> {
        let (router, _dir) = router_with_docs(ScriptedIndex::default())?;

        for bogus in ["bogus", "HYBRID!", ""] {
            let error = router.query("what is RAG?", bogus).await.expect_err("invalid mode");
            assert!(matches!(error, QueryError::InvalidMode(_)));
            assert!(error.to_string().contains("invalid mode"));
        }
        assert!(router.service.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn one_shot_query_brackets_a_single_call() -> Result<(), Box<dyn std::error::Error>> {
        let (router, _dir) = router_with_docs(ScriptedIndex::default())?;

        let answer = router.query("  what is RAG? ", "Local").await?;

        assert_eq!(answer, "answer to what is RAG?");
        assert_eq!(
            router.service.calls(),
            vec!["initialize", "query local what is RAG?", "finalize"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn preconditions_are_reported_before_any_call() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let missing = QueryRouter::new(ScriptedIndex::default(), dir.path().join("absent"));
        assert!(matches!(
            missing.query("q", "hybrid").await,
            Err(QueryError::Precondition(PreconditionError::MissingStorage(_)))
        ));

        let keyless = QueryRouter::new(
            ScriptedIndex {
                credential_missing: true,
                ..Default::default()
            },
            dir.path(),
        );
        assert!(matches!(
            keyless.query("q", "hybrid").await,
            Err(QueryError::Precondition(PreconditionError::MissingCredential { .. }))
        ));
        assert!(matches!(keyless.query("   ", "hybrid").await, Err(QueryError::Precondition(_))));

        let (router, _docs) = router_with_docs(ScriptedIndex::default())?;
        assert!(matches!(router.query("   ", "hybrid").await, Err(QueryError::EmptyQuery)));
        assert!(missing.service.calls().is_empty());
        assert!(keyless.service.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn bogus_mode_in_session_keeps_the_previous_mode() -> Result<(), Box<dyn std::error::Error>> {
        let (router, _dir) = router_with_docs(ScriptedIndex::default())?;

        let (summary, out) = run_session(
            &router,
            "/mode global\n/mode bogus\nwhat changed?\n/quit\nnever asked\n",
            &Interrupt::new(),
        )
        .await?;

        assert!(out.contains("Mode changed to: global"));
        assert!(out.contains("Invalid mode. Use: naive, local, global, or hybrid"));
        assert_eq!(summary, SessionSummary { answered: 1, failed: 0 });
        assert_eq!(
            router.service.calls(),
            vec!["initialize", "query global what changed?", "finalize"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn session_commands_use_the_snapshot_taken_at_start(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (router, dir) = router_with_docs(ScriptedIndex::default())?;
        let mut session = Session::open(router.storage_dir(), SearchMode::Naive);
        std::fs::remove_file(dir.path().join(FULL_DOCS_STORE))?;

        let mut out = Vec::new();
        let script = "/docs\n/info\n/help\n/frobnicate\n\n";
        let summary = with_storages(
            &router.service,
            session.run(&router.service, script.as_bytes(), &mut out, &Interrupt::new()),
        )
        .await?;
        let out = String::from_utf8_lossy(&out);

        assert_eq!(summary, SessionSummary::default());
        assert!(out.contains("Indexed Documents:\n  - a.pdf\n  - b.pdf"));
        assert!(out.contains("Documents: 2"));
        assert!(out.contains("Mode: naive"));
        assert!(out.contains("/mode hybrid"));
        assert!(out.contains("Unknown command: /frobnicate"));
        assert_eq!(router.service.calls(), vec!["initialize", "finalize"]);
        Ok(())
    }

    #[tokio::test]
    async fn failed_queries_are_reported_and_the_session_continues(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (router, _dir) = router_with_docs(ScriptedIndex::default())?;

        let (summary, out) =
            run_session(&router, "please explode\nstill here?\n", &Interrupt::new()).await?;

        assert!(out.contains("Error: service request failed: upstream timeout"));
        assert!(out.contains("answer to still here?"));
        assert_eq!(summary, SessionSummary { answered: 1, failed: 1 });
        assert_eq!(router.service.calls().last().map(String::as_str), Some("finalize"));
        Ok(())
    }

    #[tokio::test]
    async fn interrupted_session_still_finalizes() -> Result<(), Box<dyn std::error::Error>> {
        let (router, _dir) = router_with_docs(ScriptedIndex::default())?;
        let interrupt = Interrupt::new();
        interrupt.trigger();

        let (_writer, pending_input) = tokio::io::duplex(64);
        let mut out = Vec::new();
        let summary = router
            .session(
                SearchMode::Hybrid,
                tokio::io::BufReader::new(pending_input),
                &mut out,
                &interrupt,
            )
            .await?;

        assert_eq!(summary, SessionSummary::default());
        assert_eq!(router.service.calls(), vec!["initialize", "finalize"]);
        Ok(())
    }
}
