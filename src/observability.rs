use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("docchat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("docchat.client.request_errors");
pub(crate) static CLIENT_TOKEN_REFRESHES: Counter = Counter::new("docchat.client.token_refreshes");
pub(crate) static CLIENT_TOKEN_REFRESH_FAILURES: Counter =
    Counter::new("docchat.client.token_refresh_failures");
pub(crate) static CLIENT_REQUEST_RETRIES: Counter = Counter::new("docchat.client.retries");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("docchat.client.request_duration_seconds");

pub(crate) static STORAGE_GUEST_REFUSALS: Counter = Counter::new("docchat.storage.guest_refusals");

pub(crate) static BACKGROUND_TASKS: Counter = Counter::new("docchat.background.tasks");
pub(crate) static BACKGROUND_FAILURES: Counter = Counter::new("docchat.background.failures");

pub(crate) static SESSIONS_CREATED: Counter = Counter::new("docchat.app.sessions_created");
pub(crate) static SESSIONS_AUTO_RENAMED: Counter = Counter::new("docchat.app.sessions_auto_renamed");
pub(crate) static UPLOADS_REJECTED: Counter = Counter::new("docchat.app.uploads_rejected");
pub(crate) static UPLOADS_FAILED: Counter = Counter::new("docchat.app.uploads_failed");
pub(crate) static UPLOAD_BYTES: Counter = Counter::new("docchat.app.upload_bytes");
pub(crate) static MESSAGES_SENT: Counter = Counter::new("docchat.app.messages_sent");
pub(crate) static ANSWER_DURATION: Moments = Moments::new("docchat.app.answer_duration_seconds");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_counter(&CLIENT_TOKEN_REFRESHES);
    collector.register_counter(&CLIENT_TOKEN_REFRESH_FAILURES);
    collector.register_counter(&CLIENT_REQUEST_RETRIES);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STORAGE_GUEST_REFUSALS);

    collector.register_counter(&BACKGROUND_TASKS);
    collector.register_counter(&BACKGROUND_FAILURES);

    collector.register_counter(&SESSIONS_CREATED);
    collector.register_counter(&SESSIONS_AUTO_RENAMED);
    collector.register_counter(&UPLOADS_REJECTED);
    collector.register_counter(&UPLOADS_FAILED);
    collector.register_counter(&UPLOAD_BYTES);
    collector.register_counter(&MESSAGES_SENT);
    collector.register_moments(&ANSWER_DURATION);
}
