pub mod time;

/// Random url-safe id for executions, events, logs and records.
pub fn longid() -> String {
    nanoid::nanoid!()
}
