use std::hash::{DefaultHasher, Hash, Hasher};

use tokio::sync::Mutex;

const DEFAULT_SHARDS: usize = 64;

/// Per-chat mutual exclusion with bounded memory.
///
/// Chat keys hash onto a fixed shard array rather than growing one lock per
/// chat ever seen. Two chats landing on the same shard serialize with each
/// other; that costs a little concurrency, never correctness.
pub struct ChatLocks {
    shards: Vec<Mutex<()>>,
}

impl ChatLocks {
    pub fn new(shard_count: usize) -> Self {
        Self {
            shards: (0..shard_count.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    /// The lock serializing processing for `chat_key`.
    pub fn shard(&self, chat_key: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        chat_key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }
}

impl Default for ChatLocks {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}
