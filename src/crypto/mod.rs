//! secp256k1 key pairs and recoverable signatures.

pub mod key_pair;
