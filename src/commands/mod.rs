pub mod profile;
pub mod run;
