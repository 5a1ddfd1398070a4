//! Service-level retrieval tests over a temporary local store.
