//! Key-value store over a three-column sheet (`key | value | _ts`).

mod codec;
mod store;

pub use codec::{codec_for, Base64Codec, BasicCodec, ValueCodec};
pub use store::{KvStore, RecoveryOutcome};
