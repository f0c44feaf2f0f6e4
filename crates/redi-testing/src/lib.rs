//! Testing utilities and harness for redi

pub mod harness;
pub mod recording;

pub use harness::*;
pub use recording::*;

pub mod prelude {
    pub use crate::harness::*;
    pub use crate::recording::*;
}

#[cfg(test)]
#[path = "tests/harness_tests.rs"]
mod harness_tests;

#[cfg(test)]
#[path = "tests/scheduler_properties_tests.rs"]
mod scheduler_properties_tests;

#[cfg(test)]
#[path = "tests/keyed_properties_tests.rs"]
mod keyed_properties_tests;

#[cfg(test)]
#[path = "tests/transition_tests.rs"]
mod transition_tests;
