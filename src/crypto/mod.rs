pub mod password;

pub use password::{generate_salt, hash_password, normalize_answer, verify_password, Digest};
