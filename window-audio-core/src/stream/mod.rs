pub mod reconstructor;
pub mod window_stream;
