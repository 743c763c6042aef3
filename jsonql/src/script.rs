//! Statement runner
//!
//! Evaluates top-level statements one at a time against a shared
//! [`Context`]. Each statement starts from a reset context, may be checked
//! against its inferred schema, and fails on its own without stopping the
//! rest of the script.
//!
//! [`ScriptRunner::run_passes`] evaluates one statement three ways: as
//! given, after a decompile and reparse round trip, and after rewriting.
//! Each pass owns a separate copy of the keyed random state, so the same
//! query consumes the same random sequence in all three.

use crate::config::EngineConfig;
use crate::ir::Expr;
use crate::rewrite::{RewriteEngine, RewriteEnv, RewriteStats};
use crate::runtime::context::Context;
use crate::runtime::error::EngineError;
use crate::runtime::rng::RngSnapshot;
use crate::runtime::values::Value;
use crate::runtime::var::VarMap;
use indexmap::IndexMap;
use itertools::Itertools;

/// Turns surface text back into an expression tree. The grammar lives
/// outside this crate; callers inject it here.
pub trait QueryParser {
    fn parse(&self, text: &str) -> Result<Expr, EngineError>;
}

#[derive(Debug)]
pub struct StatementOutcome {
    pub index: usize,
    pub result: Result<Value, EngineError>,
    /// Everything `write` recorded while the statement ran.
    pub outputs: IndexMap<String, Vec<Value>>,
}

#[derive(Debug, Default)]
pub struct ScriptReport {
    pub outcomes: Vec<StatementOutcome>,
}

impl ScriptReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Results of the plain, decompiled and rewritten passes over one statement.
#[derive(Debug)]
pub struct PassResults {
    pub plain: Result<Value, EngineError>,
    pub decompiled: Result<Value, EngineError>,
    pub rewritten: Result<Value, EngineError>,
    pub rewrite_stats: RewriteStats,
}

impl PassResults {
    /// True when every pass produced the same value.
    pub fn agree(&self) -> bool {
        match (&self.plain, &self.decompiled, &self.rewritten) {
            (Ok(a), Ok(b), Ok(c)) => a == b && a == c,
            _ => false,
        }
    }
}

pub struct ScriptRunner {
    config: EngineConfig,
    context: Context,
    rewriter: RewriteEngine,
    // Random state of the plain, decompiled and rewritten universes while
    // another one is active.
    q_rng: RngSnapshot,
    d_rng: RngSnapshot,
    r_rng: RngSnapshot,
}

impl ScriptRunner {
    pub fn new(config: EngineConfig) -> Self {
        let context = Context::from_config(&config);
        let rewriter = RewriteEngine::new(RewriteEnv::from_config(&config));
        ScriptRunner {
            config,
            context,
            rewriter,
            q_rng: RngSnapshot::default(),
            d_rng: RngSnapshot::default(),
            r_rng: RngSnapshot::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    pub fn rewriter(&self) -> &RewriteEngine {
        &self.rewriter
    }

    /// Evaluate one top-level statement.
    pub fn run_statement(&mut self, expr: &Expr) -> Result<Value, EngineError> {
        self.context.reset();
        let value = expr.eval(&mut self.context)?;
        if self.config.engine.check_schema {
            let schema = expr.schema();
            if !schema.matches(&value) {
                return Err(EngineError::SchemaConformance {
                    value: value.to_string(),
                    schema: schema.to_string(),
                });
            }
        }
        Ok(value)
    }

    /// Evaluate every statement in order. A failing statement is reported
    /// and the next one still runs.
    pub fn run_script(&mut self, statements: &[Expr]) -> ScriptReport {
        let mut report = ScriptReport::default();
        for (index, statement) in statements.iter().enumerate() {
            let result = self.run_statement(statement);
            if let Err(e) = &result {
                log::warn!("statement {} failed: {}", index, e);
            }
            report.outcomes.push(StatementOutcome {
                index,
                result,
                outputs: self.context.outputs().clone(),
            });
        }
        let failed = report
            .outcomes
            .iter()
            .filter(|o| o.result.is_err())
            .map(|o| o.index)
            .join(", ");
        log::info!(
            "script finished: {} succeeded, {} failed{}",
            report.succeeded(),
            report.failed(),
            if failed.is_empty() {
                String::new()
            } else {
                format!(" (statements {})", failed)
            }
        );
        report
    }

    /// Evaluate `expr` as given, after decompiling and reparsing it with
    /// `parser`, and after rewriting a clone of it.
    pub fn run_passes(&mut self, expr: &Expr, parser: &dyn QueryParser) -> PassResults {
        self.context
            .rngs_mut()
            .swap(&mut self.r_rng, &self.q_rng);
        let plain = self.run_statement(expr);

        self.context
            .rngs_mut()
            .swap(&mut self.q_rng, &self.d_rng);
        let text = expr.to_text();
        let decompiled = parser
            .parse(&text)
            .and_then(|reparsed| self.run_statement(&reparsed));

        self.context
            .rngs_mut()
            .swap(&mut self.d_rng, &self.r_rng);
        let mut rewritten_expr = expr.clone_with(&mut VarMap::new());
        let rewrite_stats = self.rewriter.rewrite(&mut rewritten_expr);
        log::debug!(
            "rewrite used {} pass(es), {} firing(s)",
            rewrite_stats.passes,
            rewrite_stats.total()
        );
        let rewritten = self.run_statement(&rewritten_expr);

        PassResults {
            plain,
            decompiled,
            rewritten,
            rewrite_stats,
        }
    }
}

impl Default for ScriptRunner {
    fn default() -> Self {
        ScriptRunner::new(EngineConfig::default())
    }
}
