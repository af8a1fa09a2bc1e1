/*!
 * Monitoring
 * Tracing setup for the guard library and demo binary
 */

mod tracer;

pub use tracer::{generate_trace_id, init_tracing, span_operation, TRACE_JSON_ENV_VAR};
