pub mod class;
pub mod function;

pub use class::{ClassRecord, MethodRecord};
pub use function::FunctionRecord;

pub(crate) fn unknown_name() -> String {
    "unknown".to_string()
}
