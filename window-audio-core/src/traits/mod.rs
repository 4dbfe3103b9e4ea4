pub mod capture_delegate;
pub mod capture_engine;
pub mod consumer_transport;
