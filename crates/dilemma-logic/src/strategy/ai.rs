//! AI-backed strategy
//!
//! Each decision goes through a budget check, up to `max_retries` gateway
//! attempts, and a cooperative fallback when no usable answer arrives.
//! Nothing in here returns an error to the game.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::{HistoryView, Move, Side, Strategy, StrategyKind};
use crate::gateway::{CompletionRequest, GatewayError, LlmGateway, TokenUsage};
use crate::payoff::PayoffMatrix;

/// Tunables for an AI-backed strategy
#[derive(Clone, Debug, PartialEq)]
pub struct AiSettings {
    /// Tokens a single game may spend
    pub token_budget: u32,
    pub max_retries: u32,
    /// Pause between failed attempts
    pub retry_delay: Duration,
    /// Headroom required before a request is even attempted
    pub safety_margin: u32,
    /// Completion length cap sent with each request
    pub max_tokens: u32,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            token_budget: 4000,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            safety_margin: 200,
            max_tokens: 150,
        }
    }
}

/// One decision as recorded in the transcript
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// 1-based round the decision was made for
    pub round: u32,
    #[serde(rename = "move")]
    pub chosen: Move,
    pub reasoning: String,
    pub token_usage: TokenUsage,
}

/// Borrowed view of an AI strategy's bookkeeping
#[derive(Clone, Copy, Debug)]
pub struct AiMetadata<'a> {
    pub model: &'a str,
    pub total_tokens: u32,
    pub transcript: &'a [TranscriptEntry],
    pub last_error: Option<&'a str>,
}

impl<'a> AiMetadata<'a> {
    pub fn last_entry(&self) -> Option<&'a TranscriptEntry> {
        self.transcript.last()
    }
}

/// Why a decision fell back to cooperation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FallbackCause {
    #[error("Token budget exceeded")]
    BudgetExceeded,

    #[error("Token budget would be exceeded")]
    BudgetWouldBeExceeded,

    #[error("Failed after {attempts} attempts. Last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

/// A single failed attempt; always retryable
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttemptError {
    #[error(transparent)]
    Service(#[from] GatewayError),

    #[error("Failed to parse AI response: {0}")]
    Malformed(String),
}

/// A parsed, not yet accepted, model decision
#[derive(Clone, Debug, PartialEq)]
struct Decision {
    chosen: Move,
    reasoning: String,
    usage: TokenUsage,
}

/// Strategy that asks a language model for every move
pub struct AiStrategy {
    side: Side,
    gateway: Arc<dyn LlmGateway>,
    settings: AiSettings,
    system_prompt: String,
    total_tokens_used: u32,
    transcript: Vec<TranscriptEntry>,
    last_error: Option<String>,
}

impl AiStrategy {
    pub fn new(
        side: Side,
        gateway: Arc<dyn LlmGateway>,
        settings: AiSettings,
        matrix: &PayoffMatrix,
    ) -> Self {
        Self {
            side,
            gateway,
            settings,
            system_prompt: system_prompt(matrix),
            total_tokens_used: 0,
            transcript: Vec::new(),
            last_error: None,
        }
    }

    pub fn settings(&self) -> &AiSettings {
        &self.settings
    }

    pub fn total_tokens_used(&self) -> u32 {
        self.total_tokens_used
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    async fn attempt(&self, request: &CompletionRequest) -> Result<Decision, AttemptError> {
        let completion = self.gateway.complete(request).await?;
        let (chosen, reasoning) = parse_decision(&completion.text)?;
        Ok(Decision {
            chosen,
            reasoning,
            usage: completion.usage,
        })
    }

    fn fallback(&mut self, round: u32, cause: FallbackCause) -> Move {
        let reason = cause.to_string();
        warn!(round, side = %self.side, "AI decision fell back to cooperation: {}", reason);

        self.transcript.push(TranscriptEntry {
            round,
            chosen: Move::Cooperate,
            reasoning: format!("Fallback cooperation due to: {}", reason),
            token_usage: TokenUsage::default(),
        });
        self.last_error = Some(reason);
        Move::Cooperate
    }
}

#[async_trait]
impl Strategy for AiStrategy {
    fn name(&self) -> &str {
        StrategyKind::ClaudeHaiku.display_name()
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::ClaudeHaiku
    }

    fn side(&self) -> Side {
        self.side
    }

    async fn get_move(&mut self, current_round: u32, history: HistoryView<'_>) -> Move {
        let round = current_round.saturating_add(1);

        if self.total_tokens_used.saturating_add(self.settings.safety_margin)
            > self.settings.token_budget
        {
            return self.fallback(round, FallbackCause::BudgetExceeded);
        }

        let request = CompletionRequest {
            system: self.system_prompt.clone(),
            prompt: user_prompt(current_round, history),
            max_tokens: self.settings.max_tokens,
        };

        let attempts = self.settings.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            debug!(round, attempt, model = self.gateway.model(), "Requesting AI move");

            match self.attempt(&request).await {
                Ok(decision) => {
                    let projected = self
                        .total_tokens_used
                        .saturating_add(decision.usage.total_tokens);
                    if projected > self.settings.token_budget {
                        return self.fallback(round, FallbackCause::BudgetWouldBeExceeded);
                    }

                    self.total_tokens_used = projected;
                    self.transcript.push(TranscriptEntry {
                        round,
                        chosen: decision.chosen,
                        reasoning: decision.reasoning,
                        token_usage: decision.usage,
                    });
                    self.last_error = None;
                    return decision.chosen;
                }
                Err(e) => {
                    warn!(round, attempt, "AI attempt failed: {}", e);
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.retry_delay).await;
                    }
                }
            }
        }

        self.fallback(
            round,
            FallbackCause::RetriesExhausted {
                attempts,
                last_error,
            },
        )
    }

    fn reset(&mut self) {
        self.total_tokens_used = 0;
        self.transcript.clear();
        self.last_error = None;
    }

    fn ai_metadata(&self) -> Option<AiMetadata<'_>> {
        Some(AiMetadata {
            model: self.gateway.model(),
            total_tokens: self.total_tokens_used,
            transcript: &self.transcript,
            last_error: self.last_error.as_deref(),
        })
    }
}

/// Rules preamble rendered from the active matrix
pub fn system_prompt(matrix: &PayoffMatrix) -> String {
    let (cc, _) = matrix.payoff(Move::Cooperate, Move::Cooperate);
    let (dd, _) = matrix.payoff(Move::Defect, Move::Defect);
    let (sucker, temptation) = matrix.payoff(Move::Cooperate, Move::Defect);

    format!(
        "You are playing an iterated prisoner's dilemma game.\n\
         In each round, you must choose to either COOPERATE or DEFECT.\n\
         \n\
         The payoffs for each round are:\n\
         - If both players cooperate: Both get {cc} points\n\
         - If both players defect: Both get {dd} points\n\
         - If one cooperates and one defects: The defector gets {temptation} points, \
         the cooperator gets {sucker}\n\
         \n\
         Your goal is to maximize your total points across all rounds.\n\
         Always respond with a JSON object containing:\n\
         {{\n    \"reasoning\": \"Your explanation for the move\",\n    \"move\": \"COOPERATE\" or \"DEFECT\"\n}}"
    )
}

fn user_prompt(current_round: u32, history: HistoryView<'_>) -> String {
    format!(
        "Current round: {}\nGame history:\n{}\n\n\
         What is your next move? Remember to respond with a JSON object \
         containing your move and reasoning.",
        current_round.saturating_add(1),
        render_history(history)
    )
}

/// History from the viewing side's perspective
pub fn render_history(history: HistoryView<'_>) -> String {
    if history.is_empty() {
        return "No previous rounds played.".to_string();
    }

    let side = history.side();
    let opponent = side.opponent();
    history
        .rounds()
        .iter()
        .map(|r| {
            format!(
                "Round {}:\n- You played: {}\n- Opponent played: {}\n- Scores: You: {}, Opponent: {}",
                r.round_number,
                r.move_of(side),
                r.move_of(opponent),
                r.score_of(side),
                r.score_of(opponent)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract `{"move": ..., "reasoning": ...}` from a reply, tolerating
/// surrounding prose.
pub fn parse_decision(text: &str) -> Result<(Move, String), AttemptError> {
    let start = text
        .find('{')
        .ok_or_else(|| AttemptError::Malformed("no JSON object in response".to_string()))?;
    let end = text[start..]
        .rfind('}')
        .ok_or_else(|| AttemptError::Malformed("unterminated JSON object".to_string()))?;

    let value: serde_json::Value = serde_json::from_str(&text[start..start + end + 1])
        .map_err(|e| AttemptError::Malformed(e.to_string()))?;

    let chosen = value
        .get("move")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AttemptError::Malformed("missing \"move\"".to_string()))?
        .parse::<Move>()
        .map_err(|e| AttemptError::Malformed(e.to_string()))?;

    let reasoning = value
        .get("reasoning")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AttemptError::Malformed("missing \"reasoning\"".to_string()))?;

    Ok((chosen, reasoning.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::game::RoundResult;
    use crate::gateway::Completion;
    use crate::strategy::tests::round;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // ==================== Test Mocks ====================

    pub(crate) struct MockGateway {
        responses: Mutex<VecDeque<Result<Completion, GatewayError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
        calls: AtomicUsize,
    }

    impl MockGateway {
        pub(crate) fn new(responses: Vec<Result<Completion, GatewayError>>) -> Self {
            Self {
                responses: Mutex::new(VecDeque::from(responses)),
                requests: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_request(&self) -> Option<CompletionRequest> {
            self.requests.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl LlmGateway for MockGateway {
        fn model(&self) -> &str {
            "mock-haiku"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<Completion, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(GatewayError::RequestFailed("No more responses".to_string()))
                })
        }
    }

    pub(crate) fn reply(chosen: &str, total: u32) -> Result<Completion, GatewayError> {
        Ok(Completion {
            text: format!(r#"{{"move": "{}", "reasoning": "because"}}"#, chosen),
            usage: TokenUsage::new(total - total / 4, total / 4),
        })
    }

    pub(crate) fn fast_settings() -> AiSettings {
        AiSettings {
            retry_delay: Duration::ZERO,
            ..AiSettings::default()
        }
    }

    fn strategy(gateway: &Arc<MockGateway>, settings: AiSettings) -> AiStrategy {
        AiStrategy::new(
            Side::One,
            gateway.clone(),
            settings,
            &PayoffMatrix::classic(),
        )
    }

    async fn decide(ai: &mut AiStrategy, rounds: &[RoundResult]) -> Move {
        let side = ai.side();
        ai.get_move(rounds.len() as u32, HistoryView::new(rounds, side))
            .await
    }

    // ==================== Decisions ====================

    #[tokio::test]
    async fn test_successful_decision_is_charged_and_recorded() {
        let gateway = Arc::new(MockGateway::new(vec![reply("DEFECT", 120)]));
        let mut ai = strategy(&gateway, fast_settings());

        assert_eq!(decide(&mut ai, &[]).await, Move::Defect);
        assert_eq!(ai.total_tokens_used(), 120);

        let meta = ai.ai_metadata().unwrap();
        assert_eq!(meta.model, "mock-haiku");
        let entry = meta.last_entry().unwrap();
        assert_eq!(entry.round, 1);
        assert_eq!(entry.chosen, Move::Defect);
        assert_eq!(entry.reasoning, "because");
        assert_eq!(entry.token_usage.total_tokens, 120);
        assert!(meta.last_error.is_none());
    }

    #[tokio::test]
    async fn test_all_attempts_fail_falls_back_to_cooperate() {
        let gateway = Arc::new(MockGateway::new(vec![
            Err(GatewayError::Timeout),
            Err(GatewayError::Connection("reset".to_string())),
            Err(GatewayError::Http {
                status: 500,
                body: "boom".to_string(),
            }),
        ]));
        let mut ai = strategy(&gateway, fast_settings());

        assert_eq!(decide(&mut ai, &[]).await, Move::Cooperate);
        assert_eq!(gateway.calls(), 3);
        assert_eq!(ai.total_tokens_used(), 0);

        let meta = ai.ai_metadata().unwrap();
        let entry = meta.last_entry().unwrap();
        assert!(entry.reasoning.contains("Fallback"));
        assert_eq!(entry.token_usage, TokenUsage::default());
        assert_eq!(
            meta.last_error,
            Some("Failed after 3 attempts. Last error: HTTP 500: boom")
        );
    }

    #[tokio::test]
    async fn test_malformed_reply_is_retried() {
        let gateway = Arc::new(MockGateway::new(vec![
            Ok(Completion {
                text: "I think I will cooperate.".to_string(),
                usage: TokenUsage::new(80, 10),
            }),
            reply("cooperate", 100),
        ]));
        let mut ai = strategy(&gateway, fast_settings());

        assert_eq!(decide(&mut ai, &[]).await, Move::Cooperate);
        assert_eq!(gateway.calls(), 2);
        // Only the accepted reply is charged
        assert_eq!(ai.total_tokens_used(), 100);
        assert!(ai.last_error().is_none());
    }

    #[tokio::test]
    async fn test_preflight_budget_skips_gateway() {
        let gateway = Arc::new(MockGateway::new(vec![reply("defect", 100)]));
        let settings = AiSettings {
            token_budget: 150,
            ..fast_settings()
        };
        let mut ai = strategy(&gateway, settings);

        assert_eq!(decide(&mut ai, &[]).await, Move::Cooperate);
        assert_eq!(gateway.calls(), 0);
        assert_eq!(ai.last_error(), Some("Token budget exceeded"));
    }

    #[tokio::test]
    async fn test_reply_over_budget_is_rejected_uncharged() {
        let gateway = Arc::new(MockGateway::new(vec![reply("defect", 900)]));
        let settings = AiSettings {
            token_budget: 500,
            ..fast_settings()
        };
        let mut ai = strategy(&gateway, settings);

        assert_eq!(decide(&mut ai, &[]).await, Move::Cooperate);
        assert_eq!(gateway.calls(), 1);
        assert_eq!(ai.total_tokens_used(), 0);
        assert_eq!(ai.last_error(), Some("Token budget would be exceeded"));
        assert_eq!(
            ai.transcript()[0].reasoning,
            "Fallback cooperation due to: Token budget would be exceeded"
        );
    }

    #[tokio::test]
    async fn test_budget_runs_out_over_a_game() {
        let gateway = Arc::new(MockGateway::new(vec![
            reply("defect", 1500),
            reply("defect", 1500),
            reply("defect", 1500),
        ]));
        let mut ai = strategy(&gateway, fast_settings());

        assert_eq!(decide(&mut ai, &[]).await, Move::Defect);
        assert_eq!(decide(&mut ai, &[]).await, Move::Defect);
        // 3000 + 200 margin is still within 4000, but 3000 + 1500 is not
        assert_eq!(decide(&mut ai, &[]).await, Move::Cooperate);
        assert_eq!(ai.total_tokens_used(), 3000);
        assert!(ai.total_tokens_used() <= ai.settings().token_budget);
    }

    #[tokio::test]
    async fn test_last_error_cleared_on_success() {
        let gateway = Arc::new(MockGateway::new(vec![
            Err(GatewayError::Timeout),
            Err(GatewayError::Timeout),
            Err(GatewayError::Timeout),
            reply("defect", 100),
        ]));
        let mut ai = strategy(&gateway, fast_settings());

        assert_eq!(decide(&mut ai, &[]).await, Move::Cooperate);
        assert!(ai.last_error().is_some());

        assert_eq!(decide(&mut ai, &[]).await, Move::Defect);
        assert!(ai.last_error().is_none());
        assert_eq!(ai.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_reset_clears_bookkeeping() {
        let gateway = Arc::new(MockGateway::new(vec![
            reply("defect", 300),
            Err(GatewayError::Timeout),
            Err(GatewayError::Timeout),
            Err(GatewayError::Timeout),
        ]));
        let mut ai = strategy(&gateway, fast_settings());
        decide(&mut ai, &[]).await;
        decide(&mut ai, &[]).await;
        assert!(ai.last_error().is_some());

        ai.reset();
        assert_eq!(ai.total_tokens_used(), 0);
        assert!(ai.transcript().is_empty());
        assert!(ai.last_error().is_none());
    }

    #[tokio::test]
    async fn test_prompt_uses_own_perspective() {
        let gateway = Arc::new(MockGateway::new(vec![reply("cooperate", 100)]));
        let mut ai = AiStrategy::new(
            Side::Two,
            gateway.clone(),
            fast_settings(),
            &PayoffMatrix::classic(),
        );

        let rounds = vec![round(1, Move::Defect, Move::Cooperate)];
        ai.get_move(1, HistoryView::new(&rounds, Side::Two)).await;

        let request = gateway.last_request().unwrap();
        assert!(request.prompt.starts_with("Current round: 2\n"));
        assert!(request.prompt.contains("- You played: cooperate"));
        assert!(request.prompt.contains("- Opponent played: defect"));
        assert!(request.prompt.contains("- Scores: You: 0, Opponent: 5"));
        assert_eq!(request.max_tokens, 150);
    }

    // ==================== Rendering & parsing ====================

    #[test]
    fn test_render_empty_history() {
        assert_eq!(
            render_history(HistoryView::new(&[], Side::One)),
            "No previous rounds played."
        );
    }

    #[test]
    fn test_system_prompt_reflects_matrix() {
        let prompt = system_prompt(&crate::payoff::MatrixType::StagHunt.matrix());
        assert!(prompt.contains("Both get 4 points"));
        assert!(prompt.contains("Both get 2 points"));
        assert!(prompt.contains("The defector gets 3 points"));
    }

    #[test]
    fn test_parse_decision_case_insensitive() {
        let (chosen, reasoning) =
            parse_decision(r#"{"reasoning": "trust", "move": "CoOpErAtE"}"#).unwrap();
        assert_eq!(chosen, Move::Cooperate);
        assert_eq!(reasoning, "trust");
    }

    #[test]
    fn test_parse_decision_embedded_in_prose() {
        let text = "Here is my answer:\n```json\n{\"move\": \"DEFECT\", \"reasoning\": \"they defected\"}\n```";
        let (chosen, _) = parse_decision(text).unwrap();
        assert_eq!(chosen, Move::Defect);
    }

    #[test]
    fn test_parse_decision_rejects_bad_shapes() {
        assert!(matches!(parse_decision("cooperate"), Err(AttemptError::Malformed(_))));
        assert!(matches!(
            parse_decision(r#"{"move": "abstain", "reasoning": "x"}"#),
            Err(AttemptError::Malformed(_))
        ));
        assert!(matches!(
            parse_decision(r#"{"move": "defect"}"#),
            Err(AttemptError::Malformed(_))
        ));
    }
}
