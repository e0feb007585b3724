//! Pluggable frontier ordering strategies.
//!
//! A strategy assigns every entry a score (higher pops first) and may
//! override the full comparison for orderings a single float cannot
//! express. All strategies are deterministic: the same queue contents
//! always pop in the same order.

use std::cmp::Ordering;

use regex::Regex;

use crate::config::{CompositeWeights, CrawlConfig, PatternPriority, StrategyKind};

use super::FrontierEntry;

pub trait PriorityStrategy: Send + Sync {
    fn score(&self, entry: &FrontierEntry) -> f64;

    /// Ordering between two entries; `Less` pops first. The default
    /// orders by descending score with insertion order breaking ties.
    fn compare(&self, a: &FrontierEntry, b: &FrontierEntry) -> Ordering {
        let sa = self.score(a);
        let sb = self.score(b);
        sb.partial_cmp(&sa)
            .unwrap_or(Ordering::Equal)
            .then(a.seq.cmp(&b.seq))
    }
}

/// FIFO across depths; within a depth, insertion order.
pub struct BreadthFirst;

impl PriorityStrategy for BreadthFirst {
    fn score(&self, entry: &FrontierEntry) -> f64 {
        -(entry.depth as f64)
    }
}

/// LIFO: the most recently discovered URL pops first.
pub struct DepthFirst;

impl PriorityStrategy for DepthFirst {
    fn score(&self, _entry: &FrontierEntry) -> f64 {
        0.0
    }

    fn compare(&self, a: &FrontierEntry, b: &FrontierEntry) -> Ordering {
        b.seq.cmp(&a.seq)
    }
}

/// Sitemap-declared priority, descending; shallower entries break ties.
pub struct SitemapPriority;

impl PriorityStrategy for SitemapPriority {
    fn score(&self, entry: &FrontierEntry) -> f64 {
        entry.priority_score
    }

    fn compare(&self, a: &FrontierEntry, b: &FrontierEntry) -> Ordering {
        self.score(b)
            .partial_cmp(&self.score(a))
            .unwrap_or(Ordering::Equal)
            .then(a.depth.cmp(&b.depth))
            .then(a.seq.cmp(&b.seq))
    }
}

/// Score accumulated from regex matches against the URL string.
pub struct UrlPattern {
    patterns: Vec<(Regex, f64)>,
}

impl UrlPattern {
    /// Patterns are expected to be pre-validated by the config builder;
    /// any that still fail to compile are skipped.
    #[must_use]
    pub fn new(patterns: &[PatternPriority]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .filter_map(|p| Regex::new(&p.pattern).ok().map(|r| (r, p.score)))
                .collect(),
        }
    }
}

impl PriorityStrategy for UrlPattern {
    fn score(&self, entry: &FrontierEntry) -> f64 {
        self.patterns
            .iter()
            .filter(|(re, _)| re.is_match(entry.url.as_str()))
            .map(|(_, score)| score)
            .sum()
    }
}

/// Weighted sum of sub-strategy scores; insertion order breaks ties.
pub struct Composite {
    parts: Vec<(Box<dyn PriorityStrategy>, f64)>,
}

impl Composite {
    #[must_use]
    pub fn new(parts: Vec<(Box<dyn PriorityStrategy>, f64)>) -> Self {
        Self { parts }
    }
}

impl PriorityStrategy for Composite {
    fn score(&self, entry: &FrontierEntry) -> f64 {
        self.parts
            .iter()
            .map(|(strategy, weight)| strategy.score(entry) * weight)
            .sum()
    }
}

/// Construct the strategy selected by the config.
#[must_use]
pub fn from_config(config: &CrawlConfig) -> Box<dyn PriorityStrategy> {
    match config.strategy() {
        StrategyKind::Bfs => Box::new(BreadthFirst),
        StrategyKind::Dfs => Box::new(DepthFirst),
        StrategyKind::Sitemap => Box::new(SitemapPriority),
        StrategyKind::Pattern => Box::new(UrlPattern::new(config.priority_patterns())),
        StrategyKind::Composite => {
            let CompositeWeights {
                sitemap,
                pattern,
                depth,
            } = config.composite_weights();
            Box::new(Composite::new(vec![
                (Box::new(SitemapPriority), sitemap),
                (
                    Box::new(UrlPattern::new(config.priority_patterns())),
                    pattern,
                ),
                (Box::new(BreadthFirst), depth),
            ]))
        }
    }
}
