pub mod unit_ctx;
pub mod unit_flow;

#[cfg(test)]
pub(crate) mod testing;

pub use unit_ctx::UnitCtx;
pub use unit_flow::UnitFlow;
