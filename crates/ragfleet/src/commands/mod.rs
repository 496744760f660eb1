pub mod cleanup;
pub mod deploy;
pub mod dry_run;
pub mod update;

mod phases;
