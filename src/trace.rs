//! Concurrency trace logger.
//!
//! Reader caching, discards, writer sessions, queries and buffer flushes are logged
//! at debug level under the [`TARGET`] target so they can be enabled
//! independently, e.g. `RUST_LOG=phalanx::trace=debug`.

/// Log target of the concurrency trace.
pub const TARGET: &str = "phalanx::trace";

/// Operation class of a trace line, printed as a short prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceOp {
    /// Reader and writer connections.
    Connection,
    /// Query execution.
    Query,
    Delete,
    Update,
    /// Unexpected conditions worth a second look.
    Problem,
}

impl TraceOp {
    pub fn tag(self) -> &'static str {
        match self {
            TraceOp::Connection => "CON",
            TraceOp::Query => "QUE",
            TraceOp::Delete => "DEL",
            TraceOp::Update => "UPD",
            TraceOp::Problem => "!!!",
        }
    }
}

macro_rules! trace_op {
    ($op:expr, $($arg:tt)+) => {
        log::debug!(
            target: $crate::trace::TARGET,
            "{} {}",
            $crate::trace::TraceOp::tag($op),
            format_args!($($arg)+)
        )
    };
}

pub(crate) use trace_op;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        assert_eq!(TraceOp::Connection.tag(), "CON");
        assert_eq!(TraceOp::Problem.tag(), "!!!");
    }
}
