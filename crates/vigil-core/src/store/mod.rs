// ── Authoritative state store ──
//
// One watch-guarded slot per domain. Writers diff under the slot's lock;
// readers receive immutable copies.

mod state_store;

pub use state_store::StateStore;
