// src/io/miner/mod.rs
//
// Text protocol of the KaleSP miner firmware.
// Lines from the device are classified into ProtocolEvents; user intents are
// encoded into Command lines; Session drives both over a serial Transport.

mod codec;
mod commands;
mod session;

pub use codec::{classify, classify_line, ProtocolEvent, RESET_BANNER};
pub use commands::Command;
pub use session::Session;
