// Periodic single-flight push scheduling
pub mod push;
