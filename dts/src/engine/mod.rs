//! Background scheduling engine: the tick loop (`scheduler`) and the
//! per-claim execution body (`worker`). Both consume `dts-store`'s
//! repository directly; this module persists nothing of its own.

mod scheduler;
mod worker;

pub use scheduler::Scheduler;
