pub mod alert;
pub mod clinic_need;
pub mod enums;
pub mod lab_order;
pub mod medication;
pub mod money;
pub mod patient;
pub mod payment;
pub mod tooth;
pub mod treatment;

pub use alert::*;
pub use clinic_need::*;
pub use enums::*;
pub use lab_order::*;
pub use medication::*;
pub use money::Money;
pub use patient::*;
pub use payment::*;
pub use tooth::ToothNumber;
pub use treatment::*;

/// Storage format for every timestamp column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Storage format for calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
