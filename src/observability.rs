use biometrics::{Collector, Counter, Moments};

pub(crate) static BACKEND_REQUESTS: Counter = Counter::new("zuschat.backend.requests");
pub(crate) static BACKEND_REQUEST_ERRORS: Counter = Counter::new("zuschat.backend.request_errors");
pub(crate) static BACKEND_REQUEST_DURATION: Moments =
    Moments::new("zuschat.backend.request_duration_seconds");

pub(crate) static STORE_WRITES: Counter = Counter::new("zuschat.store.writes");
pub(crate) static STORE_WRITE_ERRORS: Counter = Counter::new("zuschat.store.write_errors");
pub(crate) static STORE_RESETS: Counter = Counter::new("zuschat.store.resets");
pub(crate) static STORE_LOAD_FALLBACKS: Counter = Counter::new("zuschat.store.load_fallbacks");

pub(crate) static SESSION_TURNS: Counter = Counter::new("zuschat.session.turns");
pub(crate) static SESSION_TURN_ERRORS: Counter = Counter::new("zuschat.session.turn_errors");
pub(crate) static SESSION_DISCARDED_ANSWERS: Counter =
    Counter::new("zuschat.session.discarded_answers");
pub(crate) static SESSION_TURN_DURATION: Moments =
    Moments::new("zuschat.session.turn_duration_seconds");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&BACKEND_REQUESTS);
    collector.register_counter(&BACKEND_REQUEST_ERRORS);
    collector.register_moments(&BACKEND_REQUEST_DURATION);

    collector.register_counter(&STORE_WRITES);
    collector.register_counter(&STORE_WRITE_ERRORS);
    collector.register_counter(&STORE_RESETS);
    collector.register_counter(&STORE_LOAD_FALLBACKS);

    collector.register_counter(&SESSION_TURNS);
    collector.register_counter(&SESSION_TURN_ERRORS);
    collector.register_counter(&SESSION_DISCARDED_ANSWERS);
    collector.register_moments(&SESSION_TURN_DURATION);
}
