pub mod metrics_defs;

// Re-exported so the metric macros resolve without every caller depending on `metrics`.
#[doc(hidden)]
pub use metrics;
