//! Stream combinators for classifier output

mod latest;

pub use latest::{LatestExt, SampleLatest};
