//! Adaptive web-search fallback.
//!
//! ```text
//! LocalOnly ─► Grading ─┬─► Sufficient                    (terminal)
//!                       └─► Insufficient ─┬─► Augmented   (terminal)
//!                                         └─► Done        (terminal, incomplete)
//! ```
//!
//! At most one augmentation pass runs per query. The external call is
//! bounded by a timeout; a timeout, a failing provider chain, or an empty
//! response all end in `Done` with `complete = false`. Only local retrieval
//! errors reach the caller.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use docshelf_core::grade::{Grade, RelevanceGrader, ThresholdGrader};
use docshelf_core::models::{HitSource, RetrievalHit, RetrievalResult};
use docshelf_core::retrieve::Retriever;
use docshelf_core::store::Store;
use docshelf_core::{Error, Result};

use crate::config::Config;
use crate::llm::{ChatClient, ChatModel};
use crate::websearch::{self, WebResult, WebSearchChain};

/// Score given to externally sourced hits so they always rank below local
/// context.
pub const EXTERNAL_SCORE: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackState {
    LocalOnly,
    Grading,
    Sufficient,
    Insufficient,
    Augmented,
    Done,
}

/// Result of [`FallbackController::answer`].
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub query: String,
    pub hits: Vec<RetrievalHit>,
    /// False when external augmentation was needed but did not happen.
    pub complete: bool,
    pub grade: Option<Grade>,
    /// Every state visited, in order.
    pub trace: Vec<FallbackState>,
    /// Provider that supplied external hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_provider: Option<String>,
}

impl Answer {
    pub fn final_state(&self) -> FallbackState {
        self.trace.last().copied().unwrap_or(FallbackState::LocalOnly)
    }

    pub fn result(&self) -> RetrievalResult {
        RetrievalResult {
            hits: self.hits.clone(),
        }
    }
}

pub struct FallbackController<S: Store + ?Sized> {
    retriever: Retriever<S>,
    grader: Arc<dyn RelevanceGrader>,
    chain: Arc<WebSearchChain>,
    timeout: Duration,
    enabled: bool,
}

impl<S: Store + ?Sized> FallbackController<S> {
    pub fn new(
        retriever: Retriever<S>,
        grader: Arc<dyn RelevanceGrader>,
        chain: WebSearchChain,
        timeout: Duration,
    ) -> Self {
        Self {
            retriever,
            grader,
            chain: Arc::new(chain),
            timeout,
            enabled: true,
        }
    }

    /// Controller that never grades or searches externally.
    pub fn local_only(retriever: Retriever<S>) -> Self {
        Self {
            retriever,
            grader: Arc::new(ThresholdGrader::default()),
            chain: Arc::new(WebSearchChain::new()),
            timeout: Duration::ZERO,
            enabled: false,
        }
    }

    /// Build from `[fallback]` and `[llm]`.
    pub fn from_config(retriever: Retriever<S>, config: &Config) -> anyhow::Result<Self> {
        let fallback = &config.fallback;
        if !fallback.enabled {
            return Ok(Self::local_only(retriever));
        }
        let grader: Arc<dyn RelevanceGrader> = match fallback.grader.as_str() {
            "llm" => {
                let model = ChatClient::new(&config.llm).context("llm grader")?;
                Arc::new(LlmGrader::new(Arc::new(model)))
            }
            _ => Arc::new(ThresholdGrader::new(fallback.min_score)?),
        };
        let chain = websearch::build_chain(fallback)?;
        Ok(Self::new(
            retriever,
            grader,
            chain,
            Duration::from_secs(fallback.timeout_secs),
        ))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Retrieve locally, grade, and augment from the web at most once.
    pub async fn answer(&self, query: &str, top_k: usize) -> Result<Answer> {
        let mut trace = vec![FallbackState::LocalOnly];
        let local = self.retriever.retrieve(query, top_k).await?;
        let mut answer = Answer {
            query: query.to_string(),
            hits: local.hits,
            complete: true,
            grade: None,
            trace: Vec::new(),
            external_provider: None,
        };

        if !self.enabled {
            trace.push(FallbackState::Done);
            answer.trace = trace;
            return Ok(answer);
        }

        trace.push(FallbackState::Grading);
        let graded = RetrievalResult {
            hits: answer.hits.clone(),
        };
        let grade = match self.grader.grade(query, &graded).await {
            Ok(grade) => grade,
            Err(e) => {
                warn!(grader = self.grader.name(), error = %e, "grading failed, treating as insufficient");
                Grade::Insufficient
            }
        };
        answer.grade = Some(grade);

        if grade == Grade::Sufficient {
            trace.push(FallbackState::Sufficient);
            answer.trace = trace;
            return Ok(answer);
        }
        trace.push(FallbackState::Insufficient);

        match self.search_external(query).await {
            Ok((provider, results)) => {
                debug!(provider = %provider, results = results.len(), "augmented with web results");
                answer.hits.extend(results.into_iter().map(|r| external_hit(r, &provider)));
                answer.external_provider = Some(provider);
                trace.push(FallbackState::Augmented);
            }
            Err(e) => {
                warn!(query, error = %e, "web fallback unavailable, returning local results");
                answer.complete = false;
                trace.push(FallbackState::Done);
            }
        }
        answer.trace = trace;
        Ok(answer)
    }

    async fn search_external(&self, query: &str) -> Result<(String, Vec<WebResult>)> {
        if self.chain.is_empty() {
            return Err(Error::ExternalSearch("no search providers configured".to_string()));
        }
        let outcome = tokio::time::timeout(self.timeout, self.chain.run(query))
            .await
            .map_err(|_| {
                Error::ExternalSearch(format!("timed out after {}ms", self.timeout.as_millis()))
            })?;
        match (outcome.value, outcome.tier) {
            (Some(results), Some(provider)) => Ok((provider, results)),
            _ if !outcome.failures.is_empty() => {
                let reasons: Vec<String> = outcome
                    .failures
                    .iter()
                    .map(|f| format!("{}: {}", f.tier, f.error))
                    .collect();
                Err(Error::ExternalSearch(reasons.join("; ")))
            }
            _ => Err(Error::ExternalSearch("no results".to_string())),
        }
    }
}

fn external_hit(result: WebResult, provider: &str) -> RetrievalHit {
    RetrievalHit {
        score: EXTERNAL_SCORE,
        source: HitSource::External {
            title: result.title,
            url: result.url,
            snippet: result.snippet,
            provider: provider.to_string(),
        },
    }
}

/// Characters of each passage shown to the model grader.
const GRADER_PASSAGE_CHARS: usize = 800;

const GRADER_SYSTEM_PROMPT: &str = "You judge whether retrieved passages contain enough \
information to answer a question. Reply with exactly one word: yes or no.";

/// Asks a chat model whether the local context answers the query.
pub struct LlmGrader {
    model: Arc<dyn ChatModel>,
}

impl LlmGrader {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl RelevanceGrader for LlmGrader {
    fn name(&self) -> &str {
        "llm"
    }

    async fn grade(&self, query: &str, result: &RetrievalResult) -> Result<Grade> {
        if result.is_empty() {
            return Ok(Grade::Insufficient);
        }
        let mut prompt = format!("Question: {}\n\nPassages:\n", query);
        for (i, hit) in result.hits.iter().enumerate() {
            let passage: String = hit.text().chars().take(GRADER_PASSAGE_CHARS).collect();
            prompt.push_str(&format!("[{}] {}\n\n", i + 1, passage));
        }
        let reply = self
            .model
            .complete(GRADER_SYSTEM_PROMPT, &prompt)
            .await
            .map_err(|e| Error::ExternalSearch(format!("grader model: {:#}", e)))?;
        parse_verdict(&reply)
    }
}

fn parse_verdict(reply: &str) -> Result<Grade> {
    let word: String = reply
        .trim()
        .chars()
        .take_while(|c| c.is_alphabetic())
        .collect::<String>()
        .to_lowercase();
    match word.as_str() {
        "yes" => Ok(Grade::Sufficient),
        "no" => Ok(Grade::Insufficient),
        _ => Err(Error::invalid(format!("unexpected grader reply: {:?}", reply.trim()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docshelf_core::chain::Tier;
    use docshelf_core::chunk::ChunkParams;
    use docshelf_core::embedding::HashEmbedder;
    use docshelf_core::store::memory::InMemoryStore;

    use crate::library::{IngestRequest, Library};

    enum Web {
        Results,
        Fail,
        Slow,
        Empty,
    }

    struct StubWeb(Web);

    #[async_trait]
    impl Tier<str, Vec<WebResult>> for StubWeb {
        fn name(&self) -> &str {
            "stub"
        }

        async fn attempt(&self, query: &str) -> anyhow::Result<Option<Vec<WebResult>>> {
            match self.0 {
                Web::Results => Ok(Some(vec![WebResult {
                    title: "Web".to_string(),
                    url: "https://example.com".to_string(),
                    snippet: format!("about {}", query),
                }])),
                Web::Fail => anyhow::bail!("provider down"),
                Web::Slow => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(None)
                }
                Web::Empty => Ok(Some(Vec::new())),
            }
        }
    }

    struct Scripted(&'static str);

    #[async_trait]
    impl ChatModel for Scripted {
        async fn complete(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    async fn retriever() -> Retriever<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        let embedder = Arc::new(HashEmbedder::new(128));
        let lib = Library::new(Arc::clone(&store), embedder.clone(), ChunkParams::default());
        lib.ingest(IngestRequest::text(
            "rust.md",
            "# Ownership\n\nRust ownership and borrowing rules prevent data races.",
        ))
        .await
        .unwrap();
        Retriever::new(store, embedder)
    }

    async fn controller(web: Web, min_score: f64) -> FallbackController<InMemoryStore> {
        FallbackController::new(
            retriever().await,
            Arc::new(ThresholdGrader::new(min_score).unwrap()),
            WebSearchChain::new().push(Box::new(StubWeb(web))),
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn test_sufficient_skips_web() {
        let c = controller(Web::Fail, 0.1).await;
        let answer = c.answer("rust ownership borrowing", 3).await.unwrap();
        assert_eq!(
            answer.trace,
            vec![FallbackState::LocalOnly, FallbackState::Grading, FallbackState::Sufficient]
        );
        assert!(answer.complete);
        assert!(answer.hits.iter().all(|h| !h.is_external()));
    }

    #[tokio::test]
    async fn test_insufficient_augments() {
        let c = controller(Web::Results, 2.0).await;
        let answer = c.answer("sourdough starter", 3).await.unwrap();
        assert_eq!(answer.final_state(), FallbackState::Augmented);
        assert!(answer.complete);
        assert_eq!(answer.external_provider.as_deref(), Some("stub"));
        let external: Vec<_> = answer.hits.iter().filter(|h| h.is_external()).collect();
        assert_eq!(external.len(), 1);
        assert_eq!(external[0].score, EXTERNAL_SCORE);
        assert_eq!(answer.hits.last().map(|h| h.is_external()), Some(true));
    }

    #[tokio::test]
    async fn test_failure_degrades_to_incomplete() {
        for web in [Web::Fail, Web::Empty, Web::Slow] {
            let c = controller(web, 2.0).await;
            let answer = c.answer("sourdough starter", 3).await.unwrap();
            assert_eq!(answer.final_state(), FallbackState::Done);
            assert!(!answer.complete);
            assert!(answer.hits.iter().all(|h| !h.is_external()));
            assert!(answer.trace.contains(&FallbackState::Insufficient));
        }
    }

    #[tokio::test]
    async fn test_local_only_never_grades() {
        let c = FallbackController::local_only(retriever().await);
        let answer = c.answer("anything", 2).await.unwrap();
        assert_eq!(answer.trace, vec![FallbackState::LocalOnly, FallbackState::Done]);
        assert!(answer.grade.is_none());
        assert!(answer.complete);
    }

    #[tokio::test]
    async fn test_local_errors_propagate() {
        let c = controller(Web::Results, 0.1).await;
        assert!(matches!(c.answer("q", 0).await, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_llm_grader() {
        let result = retriever().await.retrieve("ownership", 2).await.unwrap();
        let yes = LlmGrader::new(Arc::new(Scripted("Yes.")));
        let no = LlmGrader::new(Arc::new(Scripted("no")));
        let odd = LlmGrader::new(Arc::new(Scripted("maybe")));
        assert_eq!(yes.grade("q", &result).await.unwrap(), Grade::Sufficient);
        assert_eq!(no.grade("q", &result).await.unwrap(), Grade::Insufficient);
        assert!(odd.grade("q", &result).await.is_err());
        assert_eq!(
            yes.grade("q", &RetrievalResult::default()).await.unwrap(),
            Grade::Insufficient
        );
    }

    #[tokio::test]
    async fn test_grader_error_counts_as_insufficient() {
        let c = FallbackController::new(
            retriever().await,
            Arc::new(LlmGrader::new(Arc::new(Scripted("unsure")))),
            WebSearchChain::new().push(Box::new(StubWeb(Web::Results))),
            Duration::from_millis(100),
        );
        let answer = c.answer("rust ownership", 2).await.unwrap();
        assert_eq!(answer.grade, Some(Grade::Insufficient));
        assert_eq!(answer.final_state(), FallbackState::Augmented);
    }
}
