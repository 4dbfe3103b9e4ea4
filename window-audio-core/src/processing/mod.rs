pub mod coercion;
pub mod sample_queue;
