//! Unattended answers to conflict prompts.

use async_trait::async_trait;
use clap::ValueEnum;
use rtsave_engine::collab::{ConflictChoice, ConflictPrompt, DecisionPrompt};

/// What to do when the wiki reports a merge conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConflictPolicy {
    /// Keep the local file and save it over the conflict
    KeepLocal,
    /// Replace the local file with the saved wiki page
    KeepRemote,
    /// Leave the conflict for the next cycle
    Defer,
}

impl From<ConflictPolicy> for ConflictChoice {
    fn from(policy: ConflictPolicy) -> Self {
        match policy {
            ConflictPolicy::KeepLocal => ConflictChoice::KeepLocal,
            ConflictPolicy::KeepRemote => ConflictChoice::KeepRemote,
            ConflictPolicy::Defer => ConflictChoice::Dismissed,
        }
    }
}

pub struct PolicyPrompt {
    policy: ConflictPolicy,
}

impl PolicyPrompt {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl DecisionPrompt for PolicyPrompt {
    async fn choose(&self, prompt: &ConflictPrompt) -> ConflictChoice {
        log::warn!("merge conflict ({}), applying {:?}", prompt.details, self.policy);
        self.policy.into()
    }
}
