mod driver;

pub use driver::SessionDriver;
