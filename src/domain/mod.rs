//! Domain layer: todo records and input constraints.

pub mod todo;
pub mod validation;

pub use todo::{ClientId, NewTodo, ParseTodoIdError, Timestamp, Todo, TodoId, TodoPatch};
pub use validation::{
    FieldError, TodoConstraints, ValidationError, normalize_due_date_input, parse_due_date,
};
