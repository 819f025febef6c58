//! Client-side state stores for the Harvest Market UI.
//!
//! Each store holds one mutable state struct and a list of subscribers.
//! Mutations apply optimistically, then push to the remote backend; the
//! backend's reply is the authoritative full state and overwrites the local
//! copy, while a failed push rolls the local copy back to the pre-mutation
//! snapshot.

pub mod cart;
pub mod favorites;
