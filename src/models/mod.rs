pub mod appointment;
pub mod enums;
pub mod forecast;

pub use appointment::*;
pub use enums::*;
pub use forecast::*;
