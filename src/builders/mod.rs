mod values;

pub use values::ValuesBuilder;
