//! Rewrite engine
//!
//! Applies local, semantics-preserving rules bottom-up over an expression
//! tree, pass after pass, until a pass changes nothing or the pass budget is
//! spent. A rule whose preconditions do not hold simply reports that it did
//! not fire.

pub mod rules;

use crate::config::EngineConfig;
use crate::ir::Expr;
use indexmap::IndexMap;

/// A single tree-to-tree transformation applied at one node.
pub trait RewriteRule {
    fn name(&self) -> &'static str;

    /// Rewrite `expr` in place; return whether anything changed.
    fn rewrite(&self, expr: &mut Expr, env: &RewriteEnv) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewriteEnv {
    pub max_passes: usize,
}

impl RewriteEnv {
    pub fn from_config(config: &EngineConfig) -> Self {
        RewriteEnv {
            max_passes: config.rewrite.max_passes,
        }
    }
}

impl Default for RewriteEnv {
    fn default() -> Self {
        RewriteEnv::from_config(&EngineConfig::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewriteStats {
    pub passes: usize,
    pub firings: IndexMap<&'static str, usize>,
    pub reached_fixpoint: bool,
}

impl RewriteStats {
    pub fn fired(&self, rule: &str) -> usize {
        self.firings.get(rule).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.firings.values().sum()
    }
}

pub struct RewriteEngine {
    env: RewriteEnv,
    rules: Vec<Box<dyn RewriteRule>>,
}

impl RewriteEngine {
    /// Engine with the standard rule set.
    pub fn new(env: RewriteEnv) -> Self {
        RewriteEngine::with_rules(env, rules::standard_rules())
    }

    pub fn with_rules(env: RewriteEnv, rules: Vec<Box<dyn RewriteRule>>) -> Self {
        RewriteEngine { env, rules }
    }

    pub fn env(&self) -> &RewriteEnv {
        &self.env
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn rewrite(&self, expr: &mut Expr) -> RewriteStats {
        let mut stats = RewriteStats::default();
        while stats.passes < self.env.max_passes {
            stats.passes += 1;
            if self.pass(expr, &mut stats) == 0 {
                stats.reached_fixpoint = true;
                break;
            }
        }
        if !stats.reached_fixpoint {
            log::debug!(
                "rewrite stopped after {} passes without reaching a fixpoint",
                stats.passes
            );
        }
        stats
    }

    /// Owned variant of [`RewriteEngine::rewrite`].
    pub fn rewrite_owned(&self, mut expr: Expr) -> (Expr, RewriteStats) {
        let stats = self.rewrite(&mut expr);
        (expr, stats)
    }

    fn pass(&self, expr: &mut Expr, stats: &mut RewriteStats) -> usize {
        let mut fired = 0;
        for child in expr.children_mut() {
            fired += self.pass(child, stats);
        }
        for rule in &self.rules {
            if rule.rewrite(expr, &self.env) {
                log::debug!("rewrite rule {} fired", rule.name());
                *stats.firings.entry(rule.name()).or_insert(0) += 1;
                fired += 1;
            }
        }
        fired
    }
}

impl Default for RewriteEngine {
    fn default() -> Self {
        RewriteEngine::new(RewriteEnv::default())
    }
}
