mod process;
mod startup;
mod supervisor;

#[cfg(test)]
mod tests;

pub use process::{Child, ChildGroup};
pub use startup::{build_input, build_sink, prepare, Prepared};
pub use supervisor::{exit_code, Supervisor};
