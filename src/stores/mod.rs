pub mod credential_store;

pub use credential_store::{CredentialKey, CredentialRecord, CredentialStore, RefreshLease};
