pub mod frame_relay;
