pub mod calls;
pub mod imports;

pub use calls::CallRecord;
pub use imports::ImportRecord;
