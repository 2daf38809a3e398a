//! Streaming batch execution: jobs, sinks and the ordered result stream.

pub(crate) mod job;
pub(crate) mod processor;
pub(crate) mod sink;
