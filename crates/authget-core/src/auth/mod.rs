pub mod basic;
pub mod ntlm;

pub use ntlm::{NtlmClient, NtlmCodec};
