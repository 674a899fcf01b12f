//! Utterance assembly: crossfaded accumulation while speaking, then the
//! discard/trim/normalize policy once an episode ends.

pub mod assembler;
pub mod finalize;
