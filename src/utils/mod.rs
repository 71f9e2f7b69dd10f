//! Small self-contained helpers shared across the server core.

pub mod binary;
pub mod timestamp;

pub use binary::{
    buf_recv_i16, buf_recv_i32, buf_recv_i64, buf_recv_u16, buf_recv_u32, buf_recv_u64,
    buf_send_i16, buf_send_i32, buf_send_i64, buf_send_u16, buf_send_u32, buf_send_u64,
};
