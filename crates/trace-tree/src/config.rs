use crate::guards;

/// Tree behaviour that depends on the environment the trace was captured in
#[derive(Clone, Debug)]
pub struct TreeConfig {
    /// Whether events sent by the given SDK may lack spans for parts of their duration
    pub platform_may_have_missing_spans: fn(Option<&str>) -> bool,

    /// Number of linked traces fetched concurrently by `fetch_additional_traces`
    pub additional_traces_batch_size: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            platform_may_have_missing_spans: guards::platform_may_have_missing_spans,
            additional_traces_batch_size: 3,
        }
    }
}
