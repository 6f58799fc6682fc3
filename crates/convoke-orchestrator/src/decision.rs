//! Two-phase decision engine.
//!
//! Phase A is a deterministic rule cascade over the lowercased, trimmed
//! message: configured rules first (in declared order), then the built-in
//! seed rules (greeting, arithmetic, file read, JSON, code analysis, data
//! processing, task management, knowledge questions), then the
//! conversational default.  Phase A is a pure function of the message and
//! rule set.
//!
//! Phase B fires only when Phase A's confidence is below the configured
//! threshold and `llm_assisted` is on: a one-word classification prompt is
//! sent through the cascade and may upgrade the strategy.  A TTL-bounded
//! LRU short-circuits repeated messages either way.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use aho_corasick::AhoCorasick;
use moka::sync::Cache;
use regex::Regex;
use serde_json::{Value, json};

use convoke_config::{AgentConfig, DecisionConfig, RuleConfig, RuleStrategy};
use convoke_provider::{ChatMessage, CompletionRequest, ProviderCascade};

use crate::error::{OrchestratorError, Result};
use crate::types::{Decision, Route};

// ---------------------------------------------------------------------------
// Seed vocabulary
// ---------------------------------------------------------------------------

/// Words that make up a pure greeting (English + Portuguese).
const GREETING_WORDS: &[&str] = &[
    "hi", "hello", "hey", "yo", "thanks", "thank", "you", "good", "morning", "afternoon",
    "evening", "oi", "ola", "olá", "eai", "opa", "bom", "dia", "boa", "tarde", "noite",
    "obrigado", "obrigada", "valeu",
];

/// Phrases that mark a knowledge-seeking question.
const KNOWLEDGE_PHRASES: &[&str] = &[
    "what is", "what are", "how does", "how do", "explain", "describe", "documentation",
    "docs", "api", "o que é", "o que e", "o que são", "como funciona", "como funcionam",
    "explique", "descreva", "documentação",
];

/// Long messages with any of these tokens also route to retrieval.
const KNOWLEDGE_TOKENS: &[&str] = &[
    "why", "how", "when", "where", "which", "por que", "porque", "como", "quando", "onde",
    "qual", "quais",
];

/// Message length (chars) above which knowledge tokens trigger retrieval.
const KNOWLEDGE_LENGTH_THRESHOLD: usize = 120;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct CompiledRule {
    pattern: Regex,
    strategy: RuleStrategy,
    confidence: f32,
    component: Option<String>,
    reasoning: String,
}

/// One agent's routing hints, taken from its descriptor.
struct AgentRoute {
    agent_id: String,
    keywords: Vec<String>,
    min_confidence: f32,
}

/// Confidence assigned to a routing-keyword match.
const AGENT_KEYWORD_CONFIDENCE: f32 = 0.8;

/// Cache-effectiveness counters, surfaced through introspection.
#[derive(Debug, Default)]
pub struct DecisionCacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DecisionCacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Hit rate between 0.0 and 1.0; 0.0 when no lookups happened.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            return 0.0;
        }
        self.hits() as f64 / total as f64
    }
}

/// The decision engine.  Construction compiles every pattern once.
pub struct DecisionEngine {
    config: DecisionConfig,
    rules: Vec<CompiledRule>,
    agent_routes: Vec<AgentRoute>,
    greetings: AhoCorasick,
    knowledge: AhoCorasick,
    arithmetic: Regex,
    read_file: Regex,
    json_body: Regex,
    code_intent: Regex,
    data_intent: Regex,
    task_intent: Regex,
    cache: Cache<String, Arc<Decision>>,
    cache_stats: Arc<DecisionCacheStats>,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig, agents: &[AgentConfig]) -> Result<Self> {
        let compile = |pattern: &str| -> Result<Regex> {
            Regex::new(pattern).map_err(|e| OrchestratorError::Validation {
                reason: format!("invalid decision pattern `{pattern}`: {e}"),
            })
        };

        let rules = config
            .rules
            .iter()
            .map(|rule| compile_rule(rule))
            .collect::<Result<Vec<_>>>()?;

        let automaton = |phrases: &[&str]| -> Result<AhoCorasick> {
            AhoCorasick::new(phrases).map_err(|e| OrchestratorError::Validation {
                reason: format!("automaton build failed: {e}"),
            })
        };

        let cache = Cache::builder()
            .max_capacity(config.decision_cache_size)
            .time_to_live(Duration::from_secs(config.decision_cache_ttl_s.max(1)))
            .build();

        // Routing keywords from agent descriptors, highest priority first.
        let mut routed: Vec<&AgentConfig> = agents
            .iter()
            .filter(|a| a.enabled && !a.routing.keywords.is_empty())
            .collect();
        routed.sort_by(|a, b| b.routing.priority.cmp(&a.routing.priority));
        let agent_routes = routed
            .into_iter()
            .map(|a| AgentRoute {
                agent_id: a.id.clone(),
                keywords: a
                    .routing
                    .keywords
                    .iter()
                    .map(|k| k.to_lowercase())
                    .collect(),
                min_confidence: a.routing.min_confidence,
            })
            .collect();

        Ok(Self {
            rules,
            agent_routes,
            greetings: automaton(GREETING_WORDS)?,
            knowledge: automaton(KNOWLEDGE_PHRASES)?,
            arithmetic: compile(
                r"^(?:quanto é|quanto e|how much is|what is|whats|calcule|calcula|calculate)?\s*(-?\d+(?:[.,]\d+)?)\s*(\+|-|\*|x|×|/|÷|mais|menos|vezes|times|plus|minus|dividido por|divided by)\s*(-?\d+(?:[.,]\d+)?)\s*\??$",
            )?,
            read_file: compile(
                r#"^(?:read|open|show|leia|abra)\s+(?:the\s+|o\s+)?(?:file|arquivo)\s+['"]?([^'"]+?)['"]?$"#,
            )?,
            json_body: compile(r"^(?:parse|validate|valide|check)\s+(?:this\s+|the\s+|o\s+)?json:?\s*([\{\[].*)$")?,
            code_intent: compile(r"\b(?:analyze|analyse|analise|lint|review|check syntax|verifique)\b")?,
            data_intent: compile(r"\b(?:validate|transform|aggregate|process|valide|transforme|agregue|processe)\b.*\b(?:data|dados)\b")?,
            task_intent: compile(r"\b(?:schedule|execute|report|list|agendar|executar|listar)\b.*\b(?:tasks?|tarefas?)\b")?,
            cache,
            cache_stats: Arc::new(DecisionCacheStats::default()),
            config,
        })
    }

    pub fn cache_stats(&self) -> &DecisionCacheStats {
        &self.cache_stats
    }

    /// Decide a strategy for `message`.
    ///
    /// Phase A is pure; the cache and the optional Phase B upgrade never
    /// change a cached verdict within its TTL.
    pub async fn decide(
        &self,
        message: &str,
        cascade: Option<&ProviderCascade>,
        trace_id: &str,
    ) -> Decision {
        let normalized = message.trim().to_lowercase();

        if let Some(cached) = self.cache.get(&normalized) {
            self.cache_stats.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(trace = trace_id, "decision cache hit");
            return cached.as_ref().clone();
        }
        self.cache_stats.misses.fetch_add(1, Ordering::Relaxed);

        let mut decision = self.phase_a(&normalized);

        if decision.confidence < self.config.confidence_threshold && self.config.llm_assisted {
            if let Some(cascade) = cascade {
                decision = self.phase_b(&normalized, decision, cascade, trace_id).await;
            }
        }

        self.cache
            .insert(normalized, Arc::new(decision.clone()));
        decision
    }

    // -- Phase A ------------------------------------------------------------

    /// Deterministic rule cascade.  `normalized` must be trimmed and
    /// lowercased.
    pub fn phase_a(&self, normalized: &str) -> Decision {
        // Slash commands never reach the strategies below.
        if let Some(name) = normalized.strip_prefix('/') {
            let name = name.split_whitespace().next().unwrap_or_default();
            return Decision {
                route: Route::Command { name: name.to_string() },
                confidence: 1.0,
                reasoning: "command".into(),
            };
        }

        // Configured rules run ahead of the seed rules, in declared order.
        for rule in &self.rules {
            if let Some(decision) = apply_rule(rule, normalized) {
                return decision;
            }
        }

        if let Some(decision) = self.match_greeting(normalized) {
            return decision;
        }
        if let Some(decision) = self.match_arithmetic(normalized) {
            return decision;
        }
        if let Some(decision) = self.match_read_file(normalized) {
            return decision;
        }
        if let Some(decision) = self.match_json(normalized) {
            return decision;
        }
        if let Some(decision) = self.match_code(normalized) {
            return decision;
        }
        if let Some(decision) = self.match_data(normalized) {
            return decision;
        }
        if let Some(decision) = self.match_tasks(normalized) {
            return decision;
        }
        if let Some(decision) = self.match_agent_keywords(normalized) {
            return decision;
        }
        if let Some(decision) = self.match_knowledge(normalized) {
            return decision;
        }

        Decision {
            route: Route::Llm,
            confidence: 0.5,
            reasoning: "default conversational".into(),
        }
    }

    fn match_greeting(&self, normalized: &str) -> Option<Decision> {
        let words: Vec<&str> = normalized
            .split(|c: char| c.is_whitespace() || c == ',' || c == '!' || c == '.')
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() || words.len() > 4 {
            return None;
        }
        let all_greeting = words.iter().all(|word| {
            self.greetings
                .find(*word)
                .map(|m| m.start() == 0 && m.end() == word.len())
                .unwrap_or(false)
        });
        all_greeting.then(|| Decision {
            route: Route::Llm,
            confidence: 0.95,
            reasoning: "greeting".into(),
        })
    }

    fn match_arithmetic(&self, normalized: &str) -> Option<Decision> {
        let caps = self.arithmetic.captures(normalized)?;
        let a = parse_number(&caps[1])?;
        let b = parse_number(&caps[3])?;
        let tool_id = match &caps[2] {
            "+" | "mais" | "plus" => "soma",
            "-" | "menos" | "minus" => "subtracao",
            "*" | "x" | "×" | "vezes" | "times" => "multiplicacao",
            _ => "divisao",
        };
        Some(Decision {
            route: Route::Tool {
                tool_id: tool_id.to_string(),
                action: String::new(),
                params: json!({"a": a, "b": b}),
            },
            confidence: 0.95,
            reasoning: "arithmetic expression".into(),
        })
    }

    fn match_read_file(&self, normalized: &str) -> Option<Decision> {
        let caps = self.read_file.captures(normalized)?;
        Some(Decision {
            route: Route::Tool {
                tool_id: "file_reader".into(),
                action: "read".into(),
                params: json!({"path": caps[1].trim()}),
            },
            confidence: 0.95,
            reasoning: "file read request".into(),
        })
    }

    fn match_json(&self, normalized: &str) -> Option<Decision> {
        let caps = self.json_body.captures(normalized)?;
        Some(Decision {
            route: Route::Tool {
                tool_id: "json_parser".into(),
                action: "parse".into(),
                params: json!({"json": caps[1].trim()}),
            },
            confidence: 0.95,
            reasoning: "json parse request".into(),
        })
    }

    fn match_code(&self, normalized: &str) -> Option<Decision> {
        if !self.code_intent.is_match(normalized) {
            return None;
        }
        let code_like = normalized.contains('\n')
            || normalized.contains("fn ")
            || normalized.contains("def ")
            || normalized.contains("function ")
            || normalized.contains("class ")
            || normalized.contains("```");
        code_like.then(|| Decision {
            route: Route::Agent {
                agent_id: "code_analyzer".into(),
            },
            confidence: 0.90,
            reasoning: "code analysis request".into(),
        })
    }

    fn match_data(&self, normalized: &str) -> Option<Decision> {
        if !self.data_intent.is_match(normalized) {
            return None;
        }
        let structured = normalized.contains('{') || normalized.contains('[');
        structured.then(|| Decision {
            route: Route::Agent {
                agent_id: "data_processor".into(),
            },
            confidence: 0.90,
            reasoning: "data processing request".into(),
        })
    }

    fn match_tasks(&self, normalized: &str) -> Option<Decision> {
        self.task_intent.is_match(normalized).then(|| Decision {
            route: Route::Agent {
                agent_id: "task_manager".into(),
            },
            confidence: 0.85,
            reasoning: "task management request".into(),
        })
    }

    /// Route on the keywords agents declared in their descriptors, highest
    /// priority first.  An agent demanding more confidence than a keyword
    /// match carries is skipped.
    fn match_agent_keywords(&self, normalized: &str) -> Option<Decision> {
        for route in &self.agent_routes {
            if route.min_confidence > AGENT_KEYWORD_CONFIDENCE {
                continue;
            }
            let hit = route.keywords.iter().any(|keyword| {
                normalized
                    .split(|c: char| !c.is_alphanumeric() && c != '_')
                    .any(|word| word == keyword)
            });
            if hit {
                return Some(Decision {
                    route: Route::Agent {
                        agent_id: route.agent_id.clone(),
                    },
                    confidence: AGENT_KEYWORD_CONFIDENCE,
                    reasoning: format!("routing keyword for `{}`", route.agent_id),
                });
            }
        }
        None
    }

    fn match_knowledge(&self, normalized: &str) -> Option<Decision> {
        let phrase_hit = self.knowledge.is_match(normalized);
        let long_with_tokens = normalized.chars().count() > KNOWLEDGE_LENGTH_THRESHOLD
            && KNOWLEDGE_TOKENS.iter().any(|t| normalized.contains(t));
        (phrase_hit || long_with_tokens).then(|| Decision {
            route: Route::Rag,
            confidence: 0.85,
            reasoning: "knowledge question".into(),
        })
    }

    // -- Phase B ------------------------------------------------------------

    /// LLM-assisted upgrade.  Only `llm` / `rag` verdicts are accepted; a
    /// failed or unusable classification keeps Phase A's decision.
    async fn phase_b(
        &self,
        normalized: &str,
        phase_a: Decision,
        cascade: &ProviderCascade,
        trace_id: &str,
    ) -> Decision {
        const CLASSIFY_PROMPT: &str = "You are a routing classifier for a chat gateway. \
            Given a user message, respond with EXACTLY one word: \
            LLM for ordinary conversation, or RAG for questions that need \
            the knowledge base. No explanation.";

        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(CLASSIFY_PROMPT),
                ChatMessage::user(normalized),
            ],
            model: None,
            max_tokens: Some(8),
            temperature: Some(0.0),
        };

        match cascade.complete(&request, trace_id).await {
            Ok(completion) => {
                let answer = completion.text.trim().to_uppercase();
                if answer.contains("RAG") {
                    Decision {
                        route: Route::Rag,
                        confidence: 0.75,
                        reasoning: "llm-assisted: knowledge question".into(),
                    }
                } else if answer.contains("LLM") {
                    Decision {
                        route: Route::Llm,
                        confidence: 0.75,
                        reasoning: "llm-assisted: conversational".into(),
                    }
                } else {
                    phase_a
                }
            }
            Err(e) => {
                tracing::debug!(trace = trace_id, error = %e, "phase b classification failed");
                phase_a
            }
        }
    }
}

fn compile_rule(rule: &RuleConfig) -> Result<CompiledRule> {
    let pattern = Regex::new(&rule.pattern).map_err(|e| OrchestratorError::Validation {
        reason: format!("invalid rule pattern `{}`: {e}", rule.pattern),
    })?;
    Ok(CompiledRule {
        pattern,
        strategy: rule.strategy,
        confidence: rule.confidence,
        component: rule.component.clone(),
        reasoning: rule
            .reasoning
            .clone()
            .unwrap_or_else(|| "configured rule".into()),
    })
}

fn apply_rule(rule: &CompiledRule, normalized: &str) -> Option<Decision> {
    let caps = rule.pattern.captures(normalized)?;

    // Named captures become extracted params.
    let mut params = serde_json::Map::new();
    for name in rule.pattern.capture_names().flatten() {
        if let Some(m) = caps.name(name) {
            params.insert(name.to_string(), Value::String(m.as_str().to_string()));
        }
    }

    let route = match (rule.strategy, &rule.component) {
        (RuleStrategy::Llm, _) => Route::Llm,
        (RuleStrategy::Rag, _) => Route::Rag,
        (RuleStrategy::Agent, Some(id)) => Route::Agent {
            agent_id: id.clone(),
        },
        (RuleStrategy::Tool, Some(id)) => Route::Tool {
            tool_id: id.clone(),
            action: String::new(),
            params: Value::Object(params),
        },
        // A rule naming agent/tool strategy without a component cannot be
        // dispatched; treat it as conversational.
        _ => Route::Llm,
    };

    Some(Decision {
        route,
        confidence: rule.confidence,
        reasoning: rule.reasoning.clone(),
    })
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', ".").parse().ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
