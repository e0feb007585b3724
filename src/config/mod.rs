//! Configuration for crawl runs
//!
//! Split into focused submodules: core types, the typestate builder, and
//! getter methods.

mod builder;
mod getters;
mod types;

pub use builder::{CrawlConfigBuilder, WithStartUrl};
pub use types::{
    BrowserType, CompositeWeights, CrawlConfig, PatternPriority, StrategyKind,
};
