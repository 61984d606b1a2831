//! Concrete projections: a scalar value and a keyed list.

pub(crate) mod list;
pub(crate) mod value;

pub use list::ObservableList;
pub use value::ObservableValue;
