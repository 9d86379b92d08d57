pub mod guard;
pub mod target;

pub use guard::{Disposition, INPUT_GUARD_TIMEOUT, InputGuard};
pub use target::{Element, InputTarget, InputType, Mark, PendingInput};
