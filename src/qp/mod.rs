//! The block QP assembly (§4.D) and the opaque QP-solver capability it
//! feeds (§4.E/§6): packing constraints into per-stage tensors, and the
//! dense active-set backend the reachability solver drives through those
//! tensors.

pub mod assembly;
pub mod backend;
