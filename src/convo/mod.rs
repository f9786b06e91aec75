//! Conversation membership, naming, attachments and per-member read/typing
//! state, plus the send-message pipeline.

pub mod members;
pub mod ops;

pub use members::{ConvoFile, ConvoMember, FileList, MemberList};
pub use ops::{SendOutcome, AUTOREPLY_PREFIX, PAGE_SIZE};
