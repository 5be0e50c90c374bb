pub mod catalog;
pub mod context;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod incremental;
pub mod meta;
pub mod pipeline;
pub mod scope;
pub mod stages;

pub use context::{BuildContext, BuildFlags};
pub use pipeline::{BuildOptions, BuildStats};
