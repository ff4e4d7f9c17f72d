//! Message interface of the package
//!
//! The package declares a single schema, `msg/UWBMsg.msg`, which depends on the
//! `std_msgs` and `builtin_interfaces` vocabularies. [`UwbMsg`] is the native
//! mirror of that schema and carries its ROS 2 CDR encoding.

pub mod uwb_msg;

pub use uwb_msg::{field_names, Header, InterfaceError, Time, UwbMsg};

/// Package name under which the interface is generated
pub const INTERFACE_PACKAGE: &str = "uwb_sensor_interfaces";

/// Message vocabularies the schema depends on
pub const INTERFACE_DEPENDENCIES: [&str; 2] = ["std_msgs", "builtin_interfaces"];

/// Schema files declared by the package, relative to the package root
pub const INTERFACE_FILES: [&str; 1] = ["msg/UWBMsg.msg"];
