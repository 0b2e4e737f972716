//! Identity Codec Module
//!
//! Process identifiers (PIDs) name a participant at a step of a workflow by
//! embedding the participant's public key: `<base64-public-key>_<sequence>`.

mod pid;

pub use pid::{format_pid, key_component, parse_pid, MalformedPidError, Pid};
