//! Span collaborator wrapped around each server-side dispatch.
//!
//! Spans are a side effect only: starting, failing or ending one never
//! changes what a dispatch returns.

use std::sync::Arc;

/// Creates one span per dispatched operation.
pub trait Tracer: Send + Sync {
    /// Start a span named after the operation.
    fn start_span(&self, operation: &str) -> Box<dyn Span>;
}

/// A started span.
pub trait Span: Send {
    /// Mark the span as failed.
    fn record_error(&mut self, message: &str);

    /// Finish the span.
    fn end(self: Box<Self>);
}

/// A tracer that records nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTracer;

struct NoopSpan;

impl Span for NoopSpan {
    fn record_error(&mut self, _message: &str) {}

    fn end(self: Box<Self>) {}
}

impl Tracer for NoopTracer {
    fn start_span(&self, _operation: &str) -> Box<dyn Span> {
        Box::new(NoopSpan)
    }
}

/// A tracer backed by `tracing` spans.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingTracer;

struct TracingSpan {
    span: tracing::Span,
}

impl Tracer for TracingTracer {
    fn start_span(&self, operation: &str) -> Box<dyn Span> {
        let span = tracing::info_span!(
            target: "horizon_lattice_graphql::server",
            "graphql",
            operation = %operation,
            otel.status_code = tracing::field::Empty,
            error = tracing::field::Empty,
        );
        Box::new(TracingSpan { span })
    }
}

impl Span for TracingSpan {
    fn record_error(&mut self, message: &str) {
        self.span.record("otel.status_code", "ERROR");
        self.span.record("error", message);
    }

    fn end(self: Box<Self>) {
        drop(self.span);
    }
}

impl<T: Tracer + ?Sized> Tracer for Arc<T> {
    fn start_span(&self, operation: &str) -> Box<dyn Span> {
        (**self).start_span(operation)
    }
}
