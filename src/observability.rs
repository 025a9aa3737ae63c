use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("geminus.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("geminus.client.request_errors");
pub(crate) static CLIENT_REQUEST_RETRIES: Counter = Counter::new("geminus.client.retries");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("geminus.client.request_duration_seconds");
pub(crate) static CLIENT_RETRY_BACKOFF: Moments =
    Moments::new("geminus.client.retry_backoff_seconds");

pub(crate) static STREAM_CHUNKS: Counter = Counter::new("geminus.stream.chunks");

pub(crate) static CONTEXT_FILES_INCLUDED: Counter = Counter::new("geminus.context.files_included");
pub(crate) static CONTEXT_FILES_SKIPPED: Counter = Counter::new("geminus.context.files_skipped");
pub(crate) static CONTEXT_BYTES: Counter = Counter::new("geminus.context.bytes");

pub(crate) static CHAT_TURNS: Counter = Counter::new("geminus.chat.turns");
pub(crate) static CHAT_TURN_ERRORS: Counter = Counter::new("geminus.chat.turn_errors");
pub(crate) static CHAT_TURN_DURATION: Moments = Moments::new("geminus.chat.turn_duration_seconds");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_counter(&CLIENT_REQUEST_RETRIES);
    collector.register_moments(&CLIENT_REQUEST_DURATION);
    collector.register_moments(&CLIENT_RETRY_BACKOFF);

    collector.register_counter(&STREAM_CHUNKS);

    collector.register_counter(&CONTEXT_FILES_INCLUDED);
    collector.register_counter(&CONTEXT_FILES_SKIPPED);
    collector.register_counter(&CONTEXT_BYTES);

    collector.register_counter(&CHAT_TURNS);
    collector.register_counter(&CHAT_TURN_ERRORS);
    collector.register_moments(&CHAT_TURN_DURATION);
}
