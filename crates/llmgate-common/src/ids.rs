use uuid::Uuid;

/// Per-request trace identifier, matching the family's existing
/// `trace_id = Uuid::new_v4()` convention in the request path.
pub fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}
