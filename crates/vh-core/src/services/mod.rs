//! The three managers callers drive: projects, comment threads, votes.

pub mod comments;
pub mod projects;
pub mod votes;

pub use comments::CommentTree;
pub use projects::ProjectLifecycle;
pub use votes::VoteLedger;
